//! # barrage-core
//!
//! Foundation types shared by every barrage crate:
//!
//! - **IDs**: `RoomId`, `UserId` newtypes and the [`RoomTarget`] they form
//! - **Channels**: [`ChannelKind`] and the [`ChannelState`] machine
//! - **Wire messages**: client/server frame envelopes and the decoder
//! - **Connection info**: the `/api/v1/connect` response model
//! - **Reconnect**: [`ReconnectPolicy`] math and the [`ReconnectTracker`]
//! - **Errors**: [`MessageError`] and the [`FailureKind`] taxonomy
//! - **Logging**: `tracing` subscriber setup and test capture helpers

#![deny(unsafe_code)]

pub mod channel;
pub mod connect;
pub mod errors;
pub mod ids;
pub mod logging;
pub mod messages;
pub mod reconnect;

pub use channel::{ChannelKind, ChannelState};
pub use connect::{ApiResponse, ConnectionInfo, ServerInfo};
pub use errors::{FailureKind, MessageError};
pub use ids::{RoomId, RoomTarget, UserId};
pub use messages::{
    CdnInfo, CdnLine, ClientMessage, DanmakuMode, DanmakuPayload, HeartbeatAck, InboundMessage,
    NoticeKind, OverlayEvent, OverlayKind, ServerNotice, parse_inbound,
};
pub use reconnect::{
    ReconnectPolicy, ReconnectScope, ReconnectState, ReconnectTracker, ScheduledAttempt,
};
