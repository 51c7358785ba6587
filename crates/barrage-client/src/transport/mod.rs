//! Transport seam between channels and the network.
//!
//! A [`Connector`] opens a [`Transport`] for a URL. Production code uses
//! [`WsConnector`] (tokio-tungstenite); tests use [`MemoryConnector`], which
//! hands the test the server side of every connection.

mod memory;
mod ws;

pub use memory::{ConnectBehavior, MemoryConnector, MemoryPeer};
pub use ws::WsConnector;

use async_trait::async_trait;
use thiserror::Error;

/// A frame read from a transport.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Frame {
    /// UTF-8 text frame.
    Text(String),
    /// Binary frame.
    Binary(Vec<u8>),
    /// The peer started a close handshake.
    Close(Option<CloseInfo>),
}

/// Close code and reason sent by the peer.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CloseInfo {
    /// WebSocket close code.
    pub code: u16,
    /// Close reason text.
    pub reason: String,
}

/// Transport failures.
#[derive(Debug, Error)]
pub enum TransportError {
    /// The connection could not be established.
    #[error("connect to {url} failed: {reason}")]
    Connect {
        /// Target URL.
        url: String,
        /// Underlying error text.
        reason: String,
    },
    /// Connect did not finish in time.
    #[error("connect to {url} timed out after {timeout_ms} ms")]
    ConnectTimeout {
        /// Target URL.
        url: String,
        /// Configured timeout.
        timeout_ms: u64,
    },
    /// Reading or writing failed on an established connection.
    #[error("websocket error: {0}")]
    Io(String),
    /// The connection is already gone.
    #[error("connection closed")]
    Closed,
}

/// An established bidirectional connection.
#[async_trait]
pub trait Transport: Send {
    /// Write one text frame.
    async fn send_text(&mut self, text: String) -> Result<(), TransportError>;

    /// Read the next frame. `None` means the stream ended.
    async fn next_frame(&mut self) -> Option<Result<Frame, TransportError>>;

    /// Close the connection. Errors are swallowed.
    async fn close(&mut self);
}

/// Opens transports.
#[async_trait]
pub trait Connector: Send + Sync {
    /// Connect to `url`.
    async fn connect(&self, url: &str) -> Result<Box<dyn Transport>, TransportError>;
}
