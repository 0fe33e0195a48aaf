use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;

use crate::Error;

// =============================================================================
// REQUEST TYPES - Location reports
// =============================================================================

/// Classification attached to a location report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    Manual,
    Night,
    Emergency,
    Auto,
    StoppedConfirmed,
}

impl EventType {
    /// Canonical string values accepted by the API.
    pub const VALUES: [&'static str; 5] =
        ["manual", "night", "emergency", "auto", "stopped_confirmed"];

    /// Returns the canonical API string for this event type.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Manual => "manual",
            Self::Night => "night",
            Self::Emergency => "emergency",
            Self::Auto => "auto",
            Self::StoppedConfirmed => "stopped_confirmed",
        }
    }
}

impl std::fmt::Display for EventType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone)]
pub struct EventTypeParseError {
    value: String,
}

impl std::fmt::Display for EventTypeParseError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "invalid event type '{}'; expected one of: {}",
            self.value,
            EventType::VALUES.join(", ")
        )
    }
}

impl std::error::Error for EventTypeParseError {}

impl std::str::FromStr for EventType {
    type Err = EventTypeParseError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let normalized = value.trim().to_ascii_lowercase().replace(['-', ' '], "_");
        let event_type = match normalized.as_str() {
            "manual" => Self::Manual,
            "night" => Self::Night,
            "emergency" => Self::Emergency,
            "auto" => Self::Auto,
            "stopped_confirmed" => Self::StoppedConfirmed,
            _ => {
                return Err(EventTypeParseError {
                    value: value.to_string(),
                })
            }
        };
        Ok(event_type)
    }
}

impl From<EventType> for String {
    fn from(value: EventType) -> Self {
        value.as_str().to_string()
    }
}

/// A single location report, posted to `/v1/events`.
///
/// Only [`EventPayload::new`] builds one, so both coordinates are finite.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EventPayload {
    lat: f64,
    lng: f64,
    event_type: EventType,
}

impl EventPayload {
    /// Builds a payload after checking that both coordinates are finite.
    ///
    /// # Errors
    /// Returns `Error::InvalidCoordinates` if `lat` or `lng` is NaN or infinite.
    pub fn new(lat: f64, lng: f64, event_type: EventType) -> Result<Self, Error> {
        let payload = Self {
            lat,
            lng,
            event_type,
        };
        payload.ensure_finite()?;
        Ok(payload)
    }

    #[must_use]
    pub const fn lat(&self) -> f64 {
        self.lat
    }

    #[must_use]
    pub const fn lng(&self) -> f64 {
        self.lng
    }

    #[must_use]
    pub const fn event_type(&self) -> EventType {
        self.event_type
    }

    pub(crate) fn ensure_finite(&self) -> Result<(), Error> {
        if self.lat.is_finite() && self.lng.is_finite() {
            Ok(())
        } else {
            Err(Error::InvalidCoordinates {
                lat: self.lat,
                lng: self.lng,
            })
        }
    }

    /// Skips the coordinate check, for exercising `submit` with bad input.
    #[cfg(test)]
    pub(crate) const fn unchecked(lat: f64, lng: f64, event_type: EventType) -> Self {
        Self {
            lat,
            lng,
            event_type,
        }
    }
}

// =============================================================================
// RESPONSE TYPES - Event ingestion
// =============================================================================

/// Response returned by the event endpoint.
///
/// Any JSON object with `"ok": true` is a `Success`; every other JSON value
/// is a `Failure` carrying whatever was under `"error"`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "Value", into = "Value")]
pub enum ApiResponse {
    Success {
        /// Whether the backend sent a notification email
        emailed: Option<bool>,
        /// Whether the backend accepted the event into its log
        accepted: Option<bool>,
        /// Why the email was skipped, when it was
        reason: Option<String>,
    },
    Failure {
        error: Option<Value>,
    },
}

impl ApiResponse {
    #[must_use]
    pub const fn is_ok(&self) -> bool {
        matches!(self, Self::Success { .. })
    }

    /// Human-readable form of the `error` field, if any.
    #[must_use]
    pub fn error_message(&self) -> Option<String> {
        match self {
            Self::Failure {
                error: Some(Value::String(text)),
            } => Some(text.clone()),
            Self::Failure { error: Some(other) } => Some(other.to_string()),
            _ => None,
        }
    }
}

impl From<Value> for ApiResponse {
    fn from(value: Value) -> Self {
        if value.get("ok") == Some(&Value::Bool(true)) {
            Self::Success {
                emailed: value.get("emailed").and_then(Value::as_bool),
                accepted: value.get("accepted").and_then(Value::as_bool),
                reason: value
                    .get("reason")
                    .and_then(Value::as_str)
                    .map(str::to_string),
            }
        } else {
            Self::Failure {
                error: value.get("error").cloned(),
            }
        }
    }
}

impl From<ApiResponse> for Value {
    fn from(value: ApiResponse) -> Self {
        let mut map = Map::new();
        match value {
            ApiResponse::Success {
                emailed,
                accepted,
                reason,
            } => {
                map.insert("ok".into(), Self::Bool(true));
                if let Some(emailed) = emailed {
                    map.insert("emailed".into(), Self::Bool(emailed));
                }
                if let Some(accepted) = accepted {
                    map.insert("accepted".into(), Self::Bool(accepted));
                }
                if let Some(reason) = reason {
                    map.insert("reason".into(), Self::String(reason));
                }
            }
            ApiResponse::Failure { error } => {
                map.insert("ok".into(), Self::Bool(false));
                if let Some(error) = error {
                    map.insert("error".into(), error);
                }
            }
        }
        Self::Object(map)
    }
}

/// Result of decoding a response body that may or may not be JSON.
#[derive(Debug, Clone, PartialEq)]
pub enum ResponseBody {
    Parsed(ApiResponse),
    Unparsed(String),
}

impl ResponseBody {
    /// Decodes `text` as JSON, keeping the raw text when that fails.
    #[must_use]
    pub fn decode(text: &str) -> Self {
        match serde_json::from_str::<Value>(text) {
            Ok(value) => Self::Parsed(value.into()),
            Err(_) => Self::Unparsed(text.to_string()),
        }
    }

    /// The body as an `ApiResponse`; unparsed text becomes `{ ok: false, error: <text> }`.
    #[must_use]
    pub fn api_response(&self) -> ApiResponse {
        match self {
            Self::Parsed(response) => response.clone(),
            Self::Unparsed(text) => ApiResponse::Failure {
                error: Some(Value::String(text.clone())),
            },
        }
    }

    #[must_use]
    pub fn is_ok(&self) -> bool {
        matches!(self, Self::Parsed(response) if response.is_ok())
    }
}

/// Everything the event endpoint returned for one submission.
#[derive(Debug, Clone)]
pub struct SubmitOutcome {
    pub status: u16,
    pub body: ResponseBody,
    pub raw_text: String,
}

impl SubmitOutcome {
    /// A submission succeeded when the status is 2xx and the body says `ok: true`.
    #[must_use]
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status) && self.body.is_ok()
    }

    /// Converts a rejected submission into `Error::BackendError`.
    ///
    /// # Errors
    /// Returns `Error::BackendError` with the status and raw body unless
    /// [`Self::is_success`] holds.
    pub fn into_result(self) -> Result<ApiResponse, Error> {
        if self.is_success() {
            Ok(self.body.api_response())
        } else {
            Err(Error::BackendError {
                status: self.status,
                body: self.raw_text,
            })
        }
    }
}

/// Body of a successful `/auth/issue-token` response.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IssuedToken {
    pub token: String,
    pub expires_in_sec: f64,
}

// =============================================================================
// HISTORY TYPES
// =============================================================================

/// A previously reported event, as listed by `/v1/history`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryEvent {
    pub id: String,
    /// Creation time as sent by the backend (RFC 3339)
    pub created_at_iso: String,
    pub lat: f64,
    pub lng: f64,
    /// Event type string; may name a type this client does not know
    pub event_type: String,
    #[serde(default)]
    pub battery: Option<f64>,
    #[serde(default)]
    pub notes: Option<String>,
}

impl HistoryEvent {
    /// The event type, if it is one this client knows.
    #[must_use]
    pub fn kind(&self) -> Option<EventType> {
        self.event_type.parse().ok()
    }

    /// Parses `created_at_iso`.
    ///
    /// # Errors
    /// Returns an error if the backend sent a timestamp that is not RFC 3339.
    pub fn created_at(&self) -> Result<OffsetDateTime, time::error::Parse> {
        OffsetDateTime::parse(&self.created_at_iso, &Rfc3339)
    }
}

/// One page of history, newest first.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryPage {
    #[serde(default)]
    pub ok: bool,
    pub events: Vec<HistoryEvent>,
    /// Cursor for the next (older) page
    #[serde(default)]
    pub next_before: Option<String>,
}

impl HistoryPage {
    /// The query for the page after this one, if the backend returned a cursor.
    #[must_use]
    pub fn next_query(&self, limit: u32) -> Option<HistoryQuery> {
        self.next_before
            .as_deref()
            .map(|cursor| HistoryQuery::new(limit).with_before(cursor))
    }
}

/// Query parameters for `/v1/history`.
#[must_use]
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HistoryQuery {
    pub limit: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub before: Option<String>,
}

impl HistoryQuery {
    pub const DEFAULT_LIMIT: u32 = 50;

    pub const fn new(limit: u32) -> Self {
        Self {
            limit,
            before: None,
        }
    }

    /// Only return events older than `cursor`
    pub fn with_before(mut self, cursor: impl Into<String>) -> Self {
        self.before = Some(cursor.into());
        self
    }
}

impl Default for HistoryQuery {
    fn default() -> Self {
        Self::new(Self::DEFAULT_LIMIT)
    }
}
