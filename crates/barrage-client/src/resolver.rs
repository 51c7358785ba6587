//! Connection-info lookup: room → channel URLs.
//!
//! [`ConnectionResolver`] is the seam the session calls. [`HttpResolver`]
//! implements it against `GET /api/v1/connect`.

use std::time::Duration;

use async_trait::async_trait;
use barrage_core::{ApiResponse, ConnectionInfo, RoomTarget};
use thiserror::Error;
use tracing::debug;

/// Lookup failures.
#[derive(Debug, Error)]
pub enum ResolveError {
    /// The request could not be sent or the body not read.
    #[error("lookup request failed: {0}")]
    Http(#[from] reqwest::Error),
    /// The backend answered with a non-success status.
    #[error("lookup returned HTTP {status}: {body}")]
    Status {
        /// HTTP status code.
        status: u16,
        /// Response body, possibly empty.
        body: String,
    },
    /// The body is not the expected envelope.
    #[error("lookup response could not be decoded: {0}")]
    Decode(#[from] serde_json::Error),
    /// The envelope reports failure (`code != 0` or no `data`).
    #[error("lookup rejected: {0}")]
    Rejected(String),
}

/// Resolves a room to its three channel URLs.
#[async_trait]
pub trait ConnectionResolver: Send + Sync {
    /// Look up connection info for `target`.
    async fn resolve(&self, target: &RoomTarget) -> Result<ConnectionInfo, ResolveError>;
}

/// [`ConnectionResolver`] over HTTP.
#[derive(Clone, Debug)]
pub struct HttpResolver {
    client: reqwest::Client,
    base_url: String,
    region: Option<String>,
    timeout: Duration,
}

impl HttpResolver {
    /// Resolver against `base_url` (scheme and host, no trailing path).
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            region: None,
            timeout: Duration::from_secs(10),
        }
    }

    /// Ask the backend for a specific region.
    #[must_use]
    pub fn with_region(mut self, region: Option<String>) -> Self {
        self.region = region.filter(|r| !r.is_empty());
        self
    }

    /// Per-request timeout.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Use a preconfigured client.
    #[must_use]
    pub fn with_client(mut self, client: reqwest::Client) -> Self {
        self.client = client;
        self
    }

    /// Backend base URL.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Probe `GET /api/v1/health`.
    #[tracing::instrument(skip_all, fields(base_url = %self.base_url))]
    pub async fn health(&self) -> Result<(), ResolveError> {
        let resp = self
            .client
            .get(format!("{}/api/v1/health", self.base_url))
            .timeout(self.timeout)
            .send()
            .await?;

        let status = resp.status();
        let body = resp.text().await?;
        if !status.is_success() {
            return Err(ResolveError::Status {
                status: status.as_u16(),
                body,
            });
        }

        // Some deployments wrap the health reply in the standard envelope.
        if let Ok(value) = serde_json::from_str::<serde_json::Value>(&body) {
            if let Some(code) = value.get("code").and_then(serde_json::Value::as_i64) {
                if code != 0 {
                    return Err(ResolveError::Rejected(format!("health code {code}")));
                }
            }
        }
        debug!("backend healthy");
        Ok(())
    }
}

#[async_trait]
impl ConnectionResolver for HttpResolver {
    #[tracing::instrument(skip_all, fields(room = %target.room_id))]
    async fn resolve(&self, target: &RoomTarget) -> Result<ConnectionInfo, ResolveError> {
        let mut query: Vec<(&str, &str)> = vec![("roomId", target.room_id.as_str())];
        if let Some(user) = &target.user_id {
            query.push(("userId", user.as_str()));
        }
        if let Some(region) = &self.region {
            query.push(("region", region.as_str()));
        }

        let resp = self
            .client
            .get(format!("{}/api/v1/connect", self.base_url))
            .query(&query)
            .timeout(self.timeout)
            .send()
            .await?;

        let status = resp.status();
        let body = resp.text().await?;
        if !status.is_success() {
            return Err(ResolveError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let envelope: ApiResponse<ConnectionInfo> = serde_json::from_str(&body)?;
        let info = envelope.into_data().map_err(ResolveError::Rejected)?;
        debug!(region = ?info.region, "connection info resolved");
        Ok(info)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
