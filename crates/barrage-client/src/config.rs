//! Runtime configuration, built from [`BarrageSettings`] or by hand.

use std::time::Duration;

use barrage_core::{ReconnectPolicy, ReconnectScope};
use barrage_settings::{BarrageSettings, ResolverSettings};

use crate::channel::ChannelConfig;
use crate::resolver::HttpResolver;

/// Everything a [`RoomSession`](crate::RoomSession) needs besides its
/// collaborators.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct SessionConfig {
    /// Per-channel timing.
    pub channel: ChannelConfig,
    /// Reconnect delays and budget.
    pub reconnect: ReconnectPolicy,
    /// Budget sharing.
    pub scope: ReconnectScope,
}

impl SessionConfig {
    /// Runtime config from loaded settings.
    pub fn from_settings(settings: &BarrageSettings) -> Self {
        Self {
            channel: ChannelConfig {
                heartbeat_interval: Duration::from_millis(settings.channel.heartbeat_interval_ms),
                connect_timeout: Duration::from_millis(settings.channel.connect_timeout_ms),
            },
            reconnect: settings.reconnect.policy(),
            scope: settings.reconnect.scope,
        }
    }
}

impl HttpResolver {
    /// Resolver configured from the `resolver` settings section.
    pub fn from_settings(settings: &ResolverSettings) -> Self {
        Self::new(settings.base_url.clone())
            .with_region(settings.region.clone())
            .with_timeout(Duration::from_millis(settings.request_timeout_ms))
    }
}
