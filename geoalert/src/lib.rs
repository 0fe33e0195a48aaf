pub mod token;
pub mod types;

use crate::token::TokenProvider;
use crate::types::{
    EventPayload, HistoryPage, HistoryQuery, ResponseBody, SubmitOutcome,
};
use reqwest::{Client, RequestBuilder, StatusCode};
use tracing::{debug, warn};

/// Environment variable consulted by [`BackendOrigin::from_env`].
pub const ORIGIN_ENV: &str = "BACKEND_ORIGIN";

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("missing required configuration value: {name}")]
    ConfigMissing { name: String },
    #[error("invalid backend origin '{value}'")]
    InvalidOrigin { value: String },
    #[error("failed to obtain auth token ({status})")]
    TokenRequestFailed { status: u16 },
    #[error("invalid auth token response from backend")]
    InvalidTokenResponse,
    #[error("HTTP error: {0}")]
    Network(#[from] reqwest::Error),
    #[error("backend error ({status}): {body}")]
    BackendError { status: u16, body: String },
    #[error("invalid coordinates: lat={lat} lng={lng}")]
    InvalidCoordinates { lat: f64, lng: f64 },
    #[error("invalid history response: {0}")]
    InvalidHistoryResponse(#[source] serde_json::Error),
}

/// Scheme and host of the Geo Alert backend, without a trailing slash.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackendOrigin(String);

impl BackendOrigin {
    /// Validates an origin such as `https://geo-alert.example.com`.
    ///
    /// # Errors
    /// Returns `Error::ConfigMissing` for a blank value and
    /// `Error::InvalidOrigin` if it is not an absolute http(s) URL.
    pub fn new(value: impl AsRef<str>) -> Result<Self, Error> {
        let trimmed = value.as_ref().trim();
        if trimmed.is_empty() {
            return Err(Error::ConfigMissing {
                name: ORIGIN_ENV.to_string(),
            });
        }

        let invalid = || Error::InvalidOrigin {
            value: trimmed.to_string(),
        };
        let url = reqwest::Url::parse(trimmed).map_err(|_| invalid())?;
        if !matches!(url.scheme(), "http" | "https") || url.host_str().is_none() {
            return Err(invalid());
        }

        Ok(Self(trimmed.trim_end_matches('/').to_string()))
    }

    /// Reads the origin from the `BACKEND_ORIGIN` environment variable.
    ///
    /// # Errors
    /// Returns `Error::ConfigMissing` if the variable is unset or blank.
    pub fn from_env() -> Result<Self, Error> {
        let value = std::env::var(ORIGIN_ENV).map_err(|_| Error::ConfigMissing {
            name: ORIGIN_ENV.to_string(),
        })?;
        Self::new(value)
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Absolute URL for `path` on this origin.
    #[must_use]
    pub fn endpoint(&self, path: &str) -> String {
        format!("{}/{}", self.0, path.trim_start_matches('/'))
    }
}

impl std::fmt::Display for BackendOrigin {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

pub struct GeoAlertClient {
    client: Client,
    origin: BackendOrigin,
    tokens: TokenProvider,
}

impl GeoAlertClient {
    /// Sends `request` with a bearer token and reads the whole body as text.
    async fn send_authorized(
        &self,
        request: RequestBuilder,
    ) -> Result<(StatusCode, String), Error> {
        let token = self.tokens.token().await?;
        let response = request.bearer_auth(token).send().await?;
        let status = response.status();
        let text = response.text().await?;
        Ok((status, text))
    }

    /// Creates a new `GeoAlertClient` talking to `origin`.
    #[must_use]
    pub fn new(origin: BackendOrigin) -> Self {
        let client = Client::new();
        Self {
            tokens: TokenProvider::new(client.clone(), origin.clone()),
            client,
            origin,
        }
    }

    /// Creates a client for the origin named by `BACKEND_ORIGIN`.
    ///
    /// # Errors
    /// Returns `Error::ConfigMissing` if the variable is unset or blank.
    pub fn from_env() -> Result<Self, Error> {
        Ok(Self::new(BackendOrigin::from_env()?))
    }

    #[must_use]
    pub const fn origin(&self) -> &BackendOrigin {
        &self.origin
    }

    /// Returns a valid bearer token, fetching one if the cached token is stale.
    ///
    /// # Errors
    /// See [`TokenProvider::token`].
    pub async fn token(&self) -> Result<String, Error> {
        self.tokens.token().await
    }

    /// Posts a location report to `/v1/events`.
    ///
    /// The outcome is returned whatever the status; use
    /// [`SubmitOutcome::is_success`] or [`SubmitOutcome::into_result`] to judge it.
    ///
    /// # Errors
    /// Returns `Error::InvalidCoordinates` before any request if a coordinate
    /// is not finite, otherwise an error if no token can be obtained or the
    /// request cannot be sent.
    pub async fn submit(&self, payload: &EventPayload) -> Result<SubmitOutcome, Error> {
        payload.ensure_finite()?;
        debug!(event_type = %payload.event_type(), "submitting event");
        let request = self
            .client
            .post(self.origin.endpoint("v1/events"))
            .json(payload);
        let (status, raw_text) = self.send_authorized(request).await?;

        let outcome = SubmitOutcome {
            status: status.as_u16(),
            body: ResponseBody::decode(&raw_text),
            raw_text,
        };
        if !outcome.is_success() {
            warn!(status = outcome.status, "event rejected by backend");
        }
        Ok(outcome)
    }

    /// Retrieves one page of previously reported events.
    ///
    /// # Errors
    /// Returns `Error::BackendError` on a non-2xx status and
    /// `Error::InvalidHistoryResponse` if the body is not a history page.
    pub async fn fetch_history(&self, query: &HistoryQuery) -> Result<HistoryPage, Error> {
        let request = self
            .client
            .get(self.origin.endpoint("v1/history"))
            .query(query);
        let (status, text) = self.send_authorized(request).await?;

        if !status.is_success() {
            warn!(status = status.as_u16(), "history request failed");
            return Err(Error::BackendError {
                status: status.as_u16(),
                body: text,
            });
        }
        serde_json::from_str(&text).map_err(Error::InvalidHistoryResponse)
    }

    /// Reads up to `max_pages` pages starting at `start`, following
    /// `nextBefore` from page to page.
    ///
    /// The events of every page are merged into one `HistoryPage` whose
    /// `next_before` is the cursor where the walk stopped, or `None` once the
    /// feed is exhausted.
    ///
    /// # Errors
    /// Returns the first error hit by [`Self::fetch_history`].
    pub async fn fetch_history_pages(
        &self,
        start: HistoryQuery,
        max_pages: usize,
    ) -> Result<HistoryPage, Error> {
        let limit = start.limit;
        let mut merged = HistoryPage {
            ok: true,
            events: Vec::new(),
            next_before: start.before.clone(),
        };
        let mut next = Some(start);
        let mut pages = 0;

        while let Some(query) = next.take() {
            if pages == max_pages {
                break;
            }
            let page = self.fetch_history(&query).await?;
            pages += 1;
            debug!(pages, events = page.events.len(), "history page received");
            next = page.next_query(limit);
            merged.ok &= page.ok;
            merged.next_before = page.next_before;
            merged.events.extend(page.events);
        }

        Ok(merged)
    }
}
