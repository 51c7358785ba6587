//! Events a room session publishes to subscribers.

use std::time::Duration;

use barrage_core::{CdnInfo, ChannelKind, FailureKind, OverlayEvent};
use serde::Serialize;

/// Subscription key: which events a callback receives.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum EventKind {
    /// Overlay content posts.
    Overlay,
    /// Viewer joins.
    UserJoin,
    /// Viewer leaves.
    UserLeave,
    /// CDN line updates.
    CdnInfo,
    /// Session diagnostics.
    Diagnostic,
}

/// A published event.
#[derive(Clone, Debug, PartialEq)]
pub enum SessionEvent {
    /// A `DANMAKU` frame.
    Overlay(OverlayEvent),
    /// A `JOIN` frame.
    UserJoin(OverlayEvent),
    /// A `LEAVE` frame.
    UserLeave(OverlayEvent),
    /// A `CDN_INFO` frame.
    CdnInfo(CdnInfo),
    /// Lifecycle and failure reports.
    Diagnostic(Diagnostic),
}

impl SessionEvent {
    /// Subscription key for this event.
    pub fn kind(&self) -> EventKind {
        match self {
            Self::Overlay(_) => EventKind::Overlay,
            Self::UserJoin(_) => EventKind::UserJoin,
            Self::UserLeave(_) => EventKind::UserLeave,
            Self::CdnInfo(_) => EventKind::CdnInfo,
            Self::Diagnostic(_) => EventKind::Diagnostic,
        }
    }
}

/// Lifecycle and failure reports.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Diagnostic {
    /// The connection-info lookup failed.
    ResolutionFailed {
        /// Error text.
        reason: String,
    },
    /// A channel reached `Open`.
    ChannelOpened {
        /// Channel kind.
        kind: ChannelKind,
    },
    /// A channel closed without being asked to.
    ChannelClosed {
        /// Channel kind.
        kind: ChannelKind,
        /// Close reason.
        reason: String,
    },
    /// Socket-level failure on a channel.
    TransportError {
        /// Channel kind.
        kind: ChannelKind,
        /// Error text.
        message: String,
    },
    /// A frame was dropped because it could not be decoded.
    MalformedMessage {
        /// Channel kind.
        kind: ChannelKind,
        /// Decode error text.
        error: String,
    },
    /// A reconnect was scheduled.
    ReconnectScheduled {
        /// 1-based attempt number.
        attempt: u32,
        /// Wait before it runs.
        delay: Duration,
        /// Channel whose close triggered it.
        trigger: ChannelKind,
    },
    /// The reconnect budget is spent; channels were torn down.
    ReconnectExhausted {
        /// Attempts that were made.
        attempts: u32,
    },
    /// `send` was refused.
    SendRejected {
        /// Why.
        reason: String,
    },
    /// The server sent an `ERROR` notice.
    ServerError {
        /// Channel kind.
        kind: ChannelKind,
        /// Notice text.
        message: String,
    },
}

impl Diagnostic {
    /// Failure class, for reports that are failures.
    pub fn failure_kind(&self) -> Option<FailureKind> {
        match self {
            Self::ResolutionFailed { .. } => Some(FailureKind::ResolutionFailure),
            Self::TransportError { .. } => Some(FailureKind::TransportError),
            Self::MalformedMessage { .. } => Some(FailureKind::MalformedMessage),
            Self::ReconnectExhausted { .. } => Some(FailureKind::ReconnectExhausted),
            Self::SendRejected { .. } => Some(FailureKind::SendRejected),
            Self::ServerError { .. } => Some(FailureKind::ServerError),
            Self::ChannelOpened { .. }
            | Self::ChannelClosed { .. }
            | Self::ReconnectScheduled { .. } => None,
        }
    }
}
