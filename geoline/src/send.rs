use anyhow::{bail, Context, Result};
use colored::Colorize;
use geoalert::types::{ApiResponse, EventPayload, EventType, SubmitOutcome};
use geoalert::{Error as GeoAlertError, GeoAlertClient};
use geoconfig::LastSuccess;
use std::io::{self, IsTerminal, Write};
use std::time::Duration;
use time::macros::format_description;
use tracing::warn;

const RETRY_PAUSE: Duration = Duration::from_secs(2);

pub struct SendRequest {
    pub lat: f64,
    pub lng: f64,
    pub event_type: EventType,
    pub confirmed: bool,
    pub retries: u32,
    pub debug: bool,
}

pub async fn send_location(client: &GeoAlertClient, request: &SendRequest) -> Result<()> {
    let payload = EventPayload::new(request.lat, request.lng, request.event_type)?;

    if payload.event_type() == EventType::Emergency && !request.confirmed {
        confirm_emergency(&payload)?;
    }

    if request.debug {
        eprintln!("payload: {}", serde_json::to_string(&payload)?);
    }

    let mut attempt = 0;
    let outcome = loop {
        let result = client.submit(&payload).await;
        if let Ok(outcome) = &result {
            if request.debug {
                print_debug(outcome);
            }
        }

        match result {
            Ok(outcome) if outcome.is_success() => break outcome,
            Ok(outcome) if attempt >= request.retries => {
                return Err(GeoAlertError::BackendError {
                    status: outcome.status,
                    body: outcome.raw_text,
                }
                .into());
            }
            Err(err) if attempt >= request.retries => return Err(err.into()),
            Ok(outcome) => {
                let message = format!("Backend error ({}), retrying…", outcome.status);
                eprintln!("{}", message.yellow());
            }
            Err(err) => eprintln!("{}", format!("{err}, retrying…").yellow()),
        }

        attempt += 1;
        tokio::time::sleep(RETRY_PAUSE).await;
    };

    println!("{}", success_message(&outcome.body.api_response()).green());

    let last = LastSuccess::now(payload.event_type(), payload.lat(), payload.lng());
    if let Err(err) = last.store() {
        warn!(error = %err, "could not store last-success marker");
    }

    Ok(())
}

fn success_message(response: &ApiResponse) -> String {
    match response {
        ApiResponse::Success {
            emailed: Some(false),
            reason,
            ..
        } => format!(
            "Logged (email skipped): {}",
            reason.as_deref().unwrap_or("rule")
        ),
        _ => "Sent successfully".to_string(),
    }
}

fn print_debug(outcome: &SubmitOutcome) {
    eprintln!("status: {}", outcome.status);
    match serde_json::to_string_pretty(&outcome.body.api_response()) {
        Ok(parsed) => eprintln!("body: {parsed}"),
        Err(err) => eprintln!("body: <{err}>"),
    }
    eprintln!("raw: {}", outcome.raw_text);
}

fn confirm_emergency(payload: &EventPayload) -> Result<()> {
    if !io::stdin().is_terminal() {
        bail!("emergency sends need confirmation; pass --yes when stdin is not interactive");
    }

    eprint!(
        "{} Send EMERGENCY alert from {:.5}, {:.5}? [y/N] ",
        "🚨".red(),
        payload.lat(),
        payload.lng()
    );
    io::stderr().flush()?;

    let mut input = String::new();
    io::stdin()
        .read_line(&mut input)
        .with_context(|| "Failed to read confirmation")?;
    if !matches!(input.trim().to_ascii_lowercase().as_str(), "y" | "yes") {
        bail!("emergency send cancelled");
    }
    Ok(())
}

pub fn format_last_success(last: &LastSuccess) -> String {
    let when = last
        .local_time()
        .format(format_description!(
            "[year]-[month]-[day] [hour]:[minute]:[second]"
        ))
        .unwrap_or_else(|_| last.ts.unix_timestamp().to_string());
    format!(
        "Last sent: {when} ({})\nLat: {:.5}, Lng: {:.5}",
        last.event_type, last.lat, last.lng
    )
}
