use anyhow::Result;
use colored::{Color, Colorize};
use geoalert::types::{EventType, HistoryEvent, HistoryQuery};
use geoalert::GeoAlertClient;
use std::fmt::Write;
use time::macros::format_description;
use time::UtcOffset;

pub async fn show_history(
    client: &GeoAlertClient,
    query: HistoryQuery,
    pages: usize,
) -> Result<()> {
    let page = client.fetch_history_pages(query, pages.max(1)).await?;

    if page.events.is_empty() {
        println!("No history yet.");
    }
    for event in &page.events {
        println!("{}", format_event(event));
    }

    if let Some(cursor) = page.next_before {
        println!("\nMore: geoline history --before {cursor}");
    }
    Ok(())
}

fn event_color(event: &HistoryEvent) -> Color {
    match event.kind() {
        Some(EventType::Emergency) => Color::Red,
        Some(EventType::Night) => Color::Blue,
        Some(EventType::Manual) => Color::Green,
        Some(EventType::Auto | EventType::StoppedConfirmed) => Color::Cyan,
        None => Color::White,
    }
}

fn format_time(event: &HistoryEvent) -> String {
    let Ok(created_at) = event.created_at() else {
        return event.created_at_iso.clone();
    };
    let local = UtcOffset::current_local_offset()
        .map_or(created_at, |offset| created_at.to_offset(offset));
    local
        .format(format_description!("[year]-[month]-[day] [hour]:[minute]"))
        .unwrap_or_else(|_| event.created_at_iso.clone())
}

fn format_event(event: &HistoryEvent) -> String {
    let mut line = format!(
        "{:18} {}  {:.5}, {:.5}",
        event.event_type,
        format_time(event),
        event.lat,
        event.lng
    );
    if let Some(battery) = event.battery {
        let _ = write!(line, "  battery {:.0}%", battery * 100.0);
    }
    let line = line.color(event_color(event)).to_string();
    match event.notes.as_deref().filter(|notes| !notes.trim().is_empty()) {
        Some(notes) => format!("{line}\n    Notes: {notes}"),
        None => line,
    }
}
