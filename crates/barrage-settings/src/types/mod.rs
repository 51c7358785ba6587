//! Settings type definitions.
//!
//! All types use `#[serde(rename_all = "camelCase")]` and `#[serde(default)]`
//! so a settings file may contain any subset of fields.

mod connection;

pub use connection::*;

use serde::{Deserialize, Serialize};

use crate::errors::{Result, SettingsError};

/// Root settings type.
///
/// ```json
/// {
///   "resolver": { "baseUrl": "https://barrage.example.com", "region": "cn-east" },
///   "reconnect": { "maxAttempts": 8, "scope": "channel" }
/// }
/// ```
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct BarrageSettings {
    /// Connection-info lookup.
    pub resolver: ResolverSettings,
    /// Per-channel behavior.
    pub channel: ChannelSettings,
    /// Reconnect budget and delays.
    pub reconnect: ReconnectSettings,
    /// Log output.
    pub logging: LoggingSettings,
}

impl BarrageSettings {
    /// Reject values the client cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.resolver.base_url.trim().is_empty() {
            return Err(SettingsError::InvalidValue(
                "resolver.baseUrl must not be empty".into(),
            ));
        }
        if self.channel.heartbeat_interval_ms == 0 {
            return Err(SettingsError::InvalidValue(
                "channel.heartbeatIntervalMs must be positive".into(),
            ));
        }
        if !(self.reconnect.growth_factor >= 1.0 && self.reconnect.growth_factor.is_finite()) {
            return Err(SettingsError::InvalidValue(format!(
                "reconnect.growthFactor must be a finite number >= 1, got {}",
                self.reconnect.growth_factor
            )));
        }
        Ok(())
    }
}

/// Logging settings.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LoggingSettings {
    /// `EnvFilter` directive used when `RUST_LOG` is unset.
    pub level: String,
    /// Emit JSON lines instead of compact text.
    pub json: bool,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}
