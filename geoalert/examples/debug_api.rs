use geoalert::types::{EventPayload, EventType, HistoryQuery, ResponseBody};
use geoalert::GeoAlertClient;

fn banner(title: &str) {
    println!("\n{}", "=".repeat(60));
    println!("{title}");
    println!("{}", "=".repeat(60));
}

#[tokio::main]
async fn main() {
    let client = GeoAlertClient::from_env().expect("BACKEND_ORIGIN environment variable not set");

    banner("TEST 1: GET /auth/issue-token");
    match client.token().await {
        Ok(token) => println!("Token ({} chars) cached for this session", token.len()),
        Err(e) => {
            println!("FAILED: {e}");
            return;
        }
    }

    banner("TEST 2: POST /v1/events (manual)");
    let payload = EventPayload::new(37.1, -122.1, EventType::Manual).expect("finite coordinates");
    match client.submit(&payload).await {
        Ok(outcome) => {
            println!("Status: {}", outcome.status);
            match &outcome.body {
                ResponseBody::Parsed(response) => println!("Parsed: {response:?}"),
                ResponseBody::Unparsed(_) => println!("Body is not JSON"),
            }
            println!("Raw: {}", outcome.raw_text);
            println!("Success: {}", outcome.is_success());
        }
        Err(e) => println!("Request failed: {e}"),
    }

    banner("TEST 3: GET /v1/history?limit=5");
    match client.fetch_history(&HistoryQuery::new(5)).await {
        Ok(page) => {
            println!("{} events, next cursor: {:?}", page.events.len(), page.next_before);
            for event in page.events {
                println!("  {event:?}");
            }
        }
        Err(e) => println!("FAILED: {e}"),
    }
}
