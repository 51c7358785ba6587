//! Channel kinds and the per-channel state machine.

use std::fmt;

use serde::{Deserialize, Serialize};

/// The three persistent channels a room session keeps open.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ChannelKind {
    /// Keep-alive ticks and acknowledgements.
    Heartbeat,
    /// Overlay events: content posts, joins, leaves.
    Overlay,
    /// CDN failover metadata.
    CdnInfo,
}

impl ChannelKind {
    /// Every kind, in the order channels are opened.
    pub const ALL: [Self; 3] = [Self::Heartbeat, Self::Overlay, Self::CdnInfo];

    /// Short name used in logs and diagnostics.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Heartbeat => "heartbeat",
            Self::Overlay => "overlay",
            Self::CdnInfo => "cdn",
        }
    }
}

impl fmt::Display for ChannelKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lifecycle of a single channel instance.
///
/// `Disconnected → Connecting → Open → Closed`. `Closed` can also be entered
/// from `Disconnected` or `Connecting` and is terminal: a reconnect builds a
/// new instance.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ChannelState {
    /// Created, `open` not yet called.
    #[default]
    Disconnected,
    /// Transport connect in flight.
    Connecting,
    /// Transport established; frames flow.
    Open,
    /// Terminal.
    Closed,
}

impl ChannelState {
    /// Whether moving from `self` to `next` is a legal transition.
    #[must_use]
    pub const fn can_transition_to(self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Disconnected, Self::Connecting | Self::Closed)
                | (Self::Connecting, Self::Open | Self::Closed)
                | (Self::Open, Self::Closed)
        )
    }

    /// Whether the state is terminal.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Closed)
    }
}

impl fmt::Display for ChannelState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Disconnected => write!(f, "disconnected"),
            Self::Connecting => write!(f, "connecting"),
            Self::Open => write!(f, "open"),
            Self::Closed => write!(f, "closed"),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
