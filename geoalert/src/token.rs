use std::sync::{Mutex, PoisonError};
use std::time::{Duration, Instant};

use reqwest::Client;
use tracing::{debug, warn};

use crate::types::IssuedToken;
use crate::{BackendOrigin, Error};

/// Subtracted from the lifetime the backend reports for every token.
pub const SAFETY_MARGIN: Duration = Duration::from_secs(5);

/// Upper bound on a token lifetime, keeps `Instant` arithmetic in range.
const MAX_LIFETIME: Duration = Duration::from_secs(365 * 24 * 60 * 60);

const ISSUE_TOKEN_PATH: &str = "auth/issue-token";

#[derive(Debug, Clone)]
struct CachedToken {
    value: String,
    expires_at: Instant,
}

/// Fetches bearer tokens from `/auth/issue-token` and caches them in memory.
///
/// Two callers that both find the cache empty may both fetch; whichever
/// finishes last ends up in the cache. Either token is valid.
#[derive(Debug)]
pub struct TokenProvider {
    client: Client,
    origin: BackendOrigin,
    cache: Mutex<Option<CachedToken>>,
}

impl TokenProvider {
    #[must_use]
    pub fn new(client: Client, origin: BackendOrigin) -> Self {
        Self {
            client,
            origin,
            cache: Mutex::new(None),
        }
    }

    /// Returns the cached token while it is fresh, otherwise requests a new one.
    ///
    /// # Errors
    /// Returns `Error::Network` if the request cannot be sent,
    /// `Error::TokenRequestFailed` on a non-2xx status and
    /// `Error::InvalidTokenResponse` if the body lacks a string `token` or a
    /// numeric `expiresInSec`. The cache is untouched on error.
    pub async fn token(&self) -> Result<String, Error> {
        let fetched_at = Instant::now();
        if let Some(token) = self.cached(fetched_at) {
            debug!("using cached auth token");
            return Ok(token);
        }

        debug!(origin = %self.origin, "requesting auth token");
        let response = self
            .client
            .get(self.origin.endpoint(ISSUE_TOKEN_PATH))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            warn!(status = status.as_u16(), "auth token request failed");
            return Err(Error::TokenRequestFailed {
                status: status.as_u16(),
            });
        }

        let text = response.text().await?;
        let issued = parse_issued_token(&text)?;
        let expires_at = expiry_for(fetched_at, issued.expires_in_sec);
        debug!(
            expires_in_sec = issued.expires_in_sec,
            "received auth token"
        );

        self.store(CachedToken {
            value: issued.token.clone(),
            expires_at,
        });
        Ok(issued.token)
    }

    fn cached(&self, now: Instant) -> Option<String> {
        let cache = self.cache.lock().unwrap_or_else(PoisonError::into_inner);
        cache
            .as_ref()
            .filter(|cached| now < cached.expires_at)
            .map(|cached| cached.value.clone())
    }

    fn store(&self, token: CachedToken) {
        let mut cache = self.cache.lock().unwrap_or_else(PoisonError::into_inner);
        *cache = Some(token);
    }
}

fn parse_issued_token(text: &str) -> Result<IssuedToken, Error> {
    match serde_json::from_str::<IssuedToken>(text) {
        Ok(issued) if !issued.token.is_empty() => Ok(issued),
        Ok(_) => {
            warn!("auth token response carried an empty token");
            Err(Error::InvalidTokenResponse)
        }
        Err(err) => {
            warn!(error = %err, "malformed auth token response");
            Err(Error::InvalidTokenResponse)
        }
    }
}

/// `fetched_at + expires_in_sec - SAFETY_MARGIN`, never earlier than `fetched_at`.
fn expiry_for(fetched_at: Instant, expires_in_sec: f64) -> Instant {
    let lifetime = if expires_in_sec.is_finite() && expires_in_sec > 0.0 {
        Duration::from_secs_f64(expires_in_sec.min(MAX_LIFETIME.as_secs_f64()))
    } else {
        Duration::ZERO
    };
    fetched_at + lifetime.saturating_sub(SAFETY_MARGIN)
}
