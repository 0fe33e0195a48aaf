#![allow(clippy::multiple_crate_versions)]

use serde::{Deserialize, Serialize};
use time::{OffsetDateTime, UtcOffset};
use tracing::debug;

pub const APP_NAME: &str = "geoalert";

/// confy config name of the file holding the last successful send.
pub const LAST_SUCCESS_NAME: &str = "last-success";

pub const DEFAULT_ORIGIN_ENV: &str = "BACKEND_ORIGIN";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum OriginSource {
    Literal(String),
    Env { env: String },
}

impl Default for OriginSource {
    fn default() -> Self {
        Self::Env {
            env: DEFAULT_ORIGIN_ENV.to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SendConfig {
    #[serde(default = "default_event_type")]
    pub default_event_type: String,
    /// Extra attempts after a failed send
    #[serde(default)]
    pub retries: u32,
}

impl Default for SendConfig {
    fn default() -> Self {
        Self {
            default_event_type: default_event_type(),
            retries: 0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryConfig {
    #[serde(default = "default_history_limit")]
    pub limit: u32,
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            limit: default_history_limit(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GeoConfig {
    #[serde(default)]
    pub backend_origin: OriginSource,
    #[serde(default)]
    pub send: SendConfig,
    #[serde(default)]
    pub history: HistoryConfig,
}

fn default_event_type() -> String {
    "manual".to_string()
}

const fn default_history_limit() -> u32 {
    50
}

#[derive(Debug, thiserror::Error)]
pub enum GeoConfigError {
    #[error("config error: {0}")]
    Confy(#[from] confy::ConfyError),
    #[error("missing backend origin; set `backend_origin` in the geoalert config file")]
    MissingOrigin,
    #[error("environment variable '{env}' not found")]
    MissingEnv { env: String },
}

pub type Result<T> = std::result::Result<T, GeoConfigError>;

impl GeoConfig {
    /// Loads the config file from the standard OS location.
    ///
    /// # Errors
    /// Returns an error if the config file cannot be read or deserialized.
    pub fn load() -> Result<Self> {
        Ok(confy::load(APP_NAME, None)?)
    }

    /// Resolves the backend origin from the configured source.
    ///
    /// # Errors
    /// Returns an error if the origin cannot be resolved or is empty.
    pub fn backend_origin(&self) -> Result<String> {
        self.backend_origin.resolve()
    }
}

impl OriginSource {
    fn resolve(&self) -> Result<String> {
        let value = match self {
            Self::Literal(value) => value.clone(),
            Self::Env { env } => std::env::var(env)
                .map_err(|_| GeoConfigError::MissingEnv { env: env.clone() })?,
        };
        let trimmed = value.trim();
        if trimmed.is_empty() {
            return Err(GeoConfigError::MissingOrigin);
        }
        Ok(trimmed.to_string())
    }
}

/// Marker for the most recent send the backend accepted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LastSuccess {
    #[serde(with = "time::serde::timestamp")]
    pub ts: OffsetDateTime,
    pub event_type: String,
    pub lat: f64,
    pub lng: f64,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct LastSuccessFile {
    last: Option<LastSuccess>,
}

impl LastSuccess {
    /// A marker stamped with the current time.
    #[must_use]
    pub fn now(event_type: impl Into<String>, lat: f64, lng: f64) -> Self {
        Self {
            ts: OffsetDateTime::now_utc(),
            event_type: event_type.into(),
            lat,
            lng,
        }
    }

    /// Reads the stored marker. A missing or unreadable file yields `None`.
    #[must_use]
    pub fn load() -> Option<Self> {
        match confy::load::<LastSuccessFile>(APP_NAME, Some(LAST_SUCCESS_NAME)) {
            Ok(file) => file.last,
            Err(err) => {
                debug!(error = %err, "ignoring unreadable last-success marker");
                None
            }
        }
    }

    /// Overwrites the stored marker.
    ///
    /// # Errors
    /// Returns an error if the marker cannot be written.
    pub fn store(&self) -> Result<()> {
        let file = LastSuccessFile {
            last: Some(self.clone()),
        };
        confy::store(APP_NAME, Some(LAST_SUCCESS_NAME), file)?;
        Ok(())
    }

    /// Timestamp in the local offset when it can be determined, UTC otherwise.
    #[must_use]
    pub fn local_time(&self) -> OffsetDateTime {
        UtcOffset::current_local_offset().map_or(self.ts, |offset| self.ts.to_offset(offset))
    }
}
