//! Error types for frame decoding and the failure taxonomy.
//!
//! - [`MessageError`]: why an inbound frame could not be decoded
//! - [`FailureKind`]: classification used by diagnostics and logs
//!
//! Nothing here crosses the public session API as an `Err`. Session methods
//! report failure through return values and surface the detail via
//! `tracing` and diagnostic events.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// An inbound frame that could not be decoded.
#[derive(Debug, Error)]
pub enum MessageError {
    /// The frame is not JSON.
    #[error("frame is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),

    /// The frame is JSON but has no string `type` discriminator.
    #[error("frame has no \"type\" field")]
    MissingType,

    /// The `type` is known but the payload does not match its shape.
    #[error("invalid {kind} payload: {source}")]
    InvalidPayload {
        /// The `type` value of the frame.
        kind: String,
        /// Underlying decode error.
        #[source]
        source: serde_json::Error,
    },

    /// A binary frame arrived on a text protocol.
    #[error("unexpected binary frame ({len} bytes)")]
    Binary {
        /// Frame size.
        len: usize,
    },
}

/// Failure classes reported by a room session.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// Connection-info lookup failed; the connect attempt was aborted.
    ResolutionFailure,
    /// Socket-level error. Always followed by a close.
    TransportError,
    /// Undecodable frame, dropped. The channel stays open.
    MalformedMessage,
    /// Reconnect budget used up; no further automatic action.
    ReconnectExhausted,
    /// `send` was called while the overlay channel was not open.
    SendRejected,
    /// The server answered with an `ERROR` notice.
    ServerError,
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ResolutionFailure => write!(f, "resolution_failure"),
            Self::TransportError => write!(f, "transport_error"),
            Self::MalformedMessage => write!(f, "malformed_message"),
            Self::ReconnectExhausted => write!(f, "reconnect_exhausted"),
            Self::SendRejected => write!(f, "send_rejected"),
            Self::ServerError => write!(f, "server_error"),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
