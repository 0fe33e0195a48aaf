mod common;

use common::mock_server::GeoAlertMock;
use geoalert::types::{ApiResponse, EventPayload, EventType, ResponseBody};
use geoalert::Error;
use serde_json::json;
use wiremock::matchers::{body_json, header, method, path};
use wiremock::{Mock, ResponseTemplate};

fn manual_payload() -> EventPayload {
    EventPayload::new(37.1, -122.1, EventType::Manual).unwrap()
}

#[tokio::test]
async fn test_submit_sends_bearer_token_and_json_body() {
    let mock = GeoAlertMock::start().await;
    mock.mount_fixture("auth/issue_token_valid.json").await;
    Mock::given(method("POST"))
        .and(path("/v1/events"))
        .and(header("authorization", "Bearer abc"))
        .and(header("content-type", "application/json"))
        .and(body_json(json!({ "lat": 37.1, "lng": -122.1, "eventType": "manual" })))
        .respond_with(ResponseTemplate::new(200).set_body_string(r#"{"ok":true,"emailed":true}"#))
        .expect(2)
        .mount(&mock.server)
        .await;

    let client = mock.client();
    let outcome = client.submit(&manual_payload()).await.unwrap();

    assert_eq!(outcome.status, 200);
    assert!(outcome.is_success());
    assert_eq!(
        outcome.body,
        ResponseBody::Parsed(ApiResponse::Success {
            emailed: Some(true),
            accepted: None,
            reason: None,
        })
    );

    // second send reuses the cached token
    assert!(client.submit(&manual_payload()).await.unwrap().is_success());
}

#[tokio::test]
async fn test_submit_echo_scenario() {
    let mock = GeoAlertMock::start().await;
    mock.mount_fixture("auth/issue_token_valid.json").await;
    mock.mount_fixture("events/submit_emailed.json").await;

    let outcome = mock.client().submit(&manual_payload()).await.unwrap();
    assert_eq!(outcome.status, 200);
    assert!(outcome.body.api_response().is_ok());
    assert_eq!(outcome.raw_text, r#"{"ok":true,"emailed":true}"#);
}

#[tokio::test]
async fn test_submit_email_skipped_is_still_success() {
    let mock = GeoAlertMock::start().await;
    mock.mount_fixture("auth/issue_token_valid.json").await;
    mock.mount_fixture("events/submit_email_skipped.json").await;

    let payload = EventPayload::new(51.5, -0.12, EventType::Night).unwrap();
    let outcome = mock.client().submit(&payload).await.unwrap();
    let response = outcome.into_result().unwrap();
    assert_eq!(
        response,
        ApiResponse::Success {
            emailed: Some(false),
            accepted: Some(true),
            reason: Some("night window".to_string()),
        }
    );
}

#[tokio::test]
async fn test_submit_bad_token_is_reported_not_raised() {
    let mock = GeoAlertMock::start().await;
    mock.mount_fixture("auth/issue_token_valid.json").await;
    mock.mount_fixture("events/submit_bad_token.json").await;

    let outcome = mock.client().submit(&manual_payload()).await.unwrap();
    assert_eq!(outcome.status, 401);
    assert!(!outcome.is_success());
    let response = outcome.body.api_response();
    assert!(!response.is_ok());
    assert_eq!(response.error_message().as_deref(), Some("bad token"));

    let err = outcome.into_result().unwrap_err();
    assert!(matches!(err, Error::BackendError { status: 401, .. }));
}

#[tokio::test]
async fn test_submit_plain_text_error_keeps_raw_text() {
    let mock = GeoAlertMock::start().await;
    mock.mount_fixture("auth/issue_token_valid.json").await;
    mock.mount_fixture("events/submit_internal_error.json").await;

    let outcome = mock.client().submit(&manual_payload()).await.unwrap();
    assert_eq!(outcome.status, 500);
    assert_eq!(outcome.raw_text, "Internal Server Error");
    assert_eq!(
        outcome.body,
        ResponseBody::Unparsed("Internal Server Error".to_string())
    );
    assert_eq!(
        serde_json::to_value(outcome.body.api_response()).unwrap(),
        json!({ "ok": false, "error": "Internal Server Error" })
    );
}

#[tokio::test]
async fn test_submit_raw_text_is_verbatim_for_json_bodies() {
    let mock = GeoAlertMock::start().await;
    mock.mount_fixture("auth/issue_token_valid.json").await;
    mock.mount_fixture("events/submit_validation_error.json").await;

    let expected = GeoAlertMock::load_fixture("events/submit_validation_error.json")
        .response
        .text
        .unwrap();

    let outcome = mock.client().submit(&manual_payload()).await.unwrap();
    assert_eq!(outcome.status, 400);
    assert_eq!(outcome.raw_text, expected);
    assert_eq!(
        outcome.body.api_response().error_message().as_deref(),
        Some(r#"{"fieldErrors":{"lat":["Expected number"]}}"#)
    );
}

#[tokio::test]
async fn test_submit_propagates_token_failure() {
    let mock = GeoAlertMock::start().await;
    mock.mount_fixture("auth/issue_token_unavailable.json").await;
    Mock::given(method("POST"))
        .and(path("/v1/events"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&mock.server)
        .await;

    let err = mock.client().submit(&manual_payload()).await.unwrap_err();
    assert!(matches!(err, Error::TokenRequestFailed { status: 503 }));
}

#[tokio::test]
async fn test_non_finite_coordinates_are_never_posted() {
    let mock = GeoAlertMock::start().await;
    mock.mount_token("abc", 3600, 0).await;
    Mock::given(method("POST"))
        .and(path("/v1/events"))
        .respond_with(ResponseTemplate::new(200).set_body_string(r#"{"ok":true}"#))
        .expect(0)
        .mount(&mock.server)
        .await;

    for (lat, lng) in [(f64::NAN, -122.1), (37.1, f64::INFINITY), (f64::NEG_INFINITY, f64::NAN)] {
        let err = EventPayload::new(lat, lng, EventType::Manual).unwrap_err();
        assert!(matches!(err, Error::InvalidCoordinates { .. }));
    }

    let payload = manual_payload();
    assert_eq!(payload.lat(), 37.1);
    assert_eq!(payload.lng(), -122.1);
    assert_eq!(payload.event_type(), EventType::Manual);
    assert!(mock.server.received_requests().await.unwrap().is_empty());
}
