//! Resolver, channel and reconnect settings.

use barrage_core::reconnect::{
    DEFAULT_BASE_DELAY_MS, DEFAULT_GROWTH_FACTOR, DEFAULT_MAX_ATTEMPTS, ReconnectPolicy,
    ReconnectScope,
};
use serde::{Deserialize, Serialize};

/// Connection-info lookup settings.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ResolverSettings {
    /// Base URL of the barrage backend.
    pub base_url: String,
    /// Preferred region passed to the lookup.
    pub region: Option<String>,
    /// Lookup request timeout in milliseconds.
    pub request_timeout_ms: u64,
}

impl Default for ResolverSettings {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8080".to_string(),
            region: None,
            request_timeout_ms: 10_000,
        }
    }
}

/// Per-channel settings.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ChannelSettings {
    /// Keep-alive interval on the heartbeat channel in milliseconds.
    pub heartbeat_interval_ms: u64,
    /// Transport connect timeout in milliseconds.
    pub connect_timeout_ms: u64,
}

impl Default for ChannelSettings {
    fn default() -> Self {
        Self {
            heartbeat_interval_ms: 20_000,
            connect_timeout_ms: 10_000,
        }
    }
}

/// Reconnect settings.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ReconnectSettings {
    /// Delay before the first attempt in milliseconds.
    pub base_delay_ms: u64,
    /// Multiplier per further attempt.
    pub growth_factor: f64,
    /// Attempt budget.
    pub max_attempts: u32,
    /// Whether the budget is shared by the session or kept per channel.
    pub scope: ReconnectScope,
}

impl Default for ReconnectSettings {
    fn default() -> Self {
        Self {
            base_delay_ms: DEFAULT_BASE_DELAY_MS,
            growth_factor: DEFAULT_GROWTH_FACTOR,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            scope: ReconnectScope::default(),
        }
    }
}

impl ReconnectSettings {
    /// The policy these settings describe.
    pub fn policy(&self) -> ReconnectPolicy {
        ReconnectPolicy {
            base_delay_ms: self.base_delay_ms,
            growth_factor: self.growth_factor,
            max_attempts: self.max_attempts,
        }
    }
}
