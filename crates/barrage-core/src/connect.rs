//! Model of the `/api/v1/connect` lookup.
//!
//! The lookup answers with the standard backend envelope
//! `{ code, message, data }`. `code == 0` with a present `data` is success;
//! anything else is a resolution failure.

use serde::{Deserialize, Serialize};

use crate::channel::ChannelKind;

/// Backend response envelope.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiResponse<T> {
    /// `0` on success.
    pub code: i64,
    /// Human-readable status.
    #[serde(default)]
    pub message: String,
    /// Payload, absent on failure.
    pub data: Option<T>,
}

impl<T> ApiResponse<T> {
    /// Extract the payload of a successful response.
    ///
    /// Returns the message (or a placeholder) on a non-zero code or missing
    /// data.
    pub fn into_data(self) -> Result<T, String> {
        if self.code != 0 {
            return Err(if self.message.is_empty() {
                format!("code {}", self.code)
            } else {
                format!("code {}: {}", self.code, self.message)
            });
        }
        self.data
            .ok_or_else(|| "response carried no data".to_string())
    }
}

/// Channel URLs for one room.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerInfo {
    /// Keep-alive channel.
    pub heartbeat_url: String,
    /// Overlay channel.
    pub danmaku_url: String,
    /// CDN metadata channel.
    pub cdn_url: String,
}

impl ServerInfo {
    /// URL of the channel of `kind`.
    #[must_use]
    pub fn url_for(&self, kind: ChannelKind) -> &str {
        match kind {
            ChannelKind::Heartbeat => &self.heartbeat_url,
            ChannelKind::Overlay => &self.danmaku_url,
            ChannelKind::CdnInfo => &self.cdn_url,
        }
    }
}

/// Everything the lookup returns for a room.
///
/// The token is already embedded in the channel URLs; it is kept here only
/// so callers can inspect expiry.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionInfo {
    /// Room the URLs belong to.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub room_id: Option<String>,
    /// Channel URLs.
    pub server_info: ServerInfo,
    /// Connection token.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
    /// Token expiry, epoch milliseconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expire_at: Option<i64>,
    /// Region that served the lookup.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub region: Option<String>,
    /// User the backend bound the token to (a `guest_*` ID for anonymous viewers).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
}

impl ConnectionInfo {
    /// Whether the token expired before `now_ms`. Unknown expiry never expires.
    #[must_use]
    pub fn is_expired_at(&self, now_ms: i64) -> bool {
        self.expire_at.is_some_and(|at| at <= now_ms)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
