//! # barrage-client
//!
//! Viewer-side client for one live room. A [`RoomSession`] resolves the
//! room's channel URLs, keeps the heartbeat, overlay and CDN channels open,
//! reconnects them after failure and publishes decoded events to
//! subscribers.
//!
//! - [`session`]: the orchestrating actor and its handle
//! - [`channel`]: one persistent channel and its state machine
//! - [`dispatcher`]: ordered subscriber registry
//! - [`resolver`]: room → URLs lookup
//! - [`transport`]: WebSocket and in-memory transports

#![deny(unsafe_code)]

pub mod channel;
pub mod config;
pub mod dispatcher;
pub mod events;
pub mod resolver;
pub mod session;
pub mod transport;

pub use channel::{ChannelConfig, ChannelConnection, ChannelEvent, ChannelEventBody, ChannelId};
pub use config::SessionConfig;
pub use dispatcher::{EventDispatcher, SubscriptionId};
pub use events::{Diagnostic, EventKind, SessionEvent};
pub use resolver::{ConnectionResolver, HttpResolver, ResolveError};
pub use session::{ChannelStatus, RoomSession, SessionStatus};
pub use transport::{Connector, MemoryConnector, Transport, TransportError, WsConnector};
