//! Wire frames exchanged on the three room channels.
//!
//! Every frame is a JSON text message discriminated by a `type` field.
//!
//! Outbound ([`ClientMessage`]):
//! - `{"type":"HEARTBEAT"}` on the heartbeat channel
//! - `{"type":"DANMAKU","data":{content,color,fontSize,mode}}` on the overlay channel
//!
//! Inbound frames are decoded by [`parse_inbound`] into [`InboundMessage`].
//! Overlay events keep the raw frame next to the typed fields so nothing the
//! server sent is lost on the way to subscribers.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use crate::errors::MessageError;

// ─────────────────────────────────────────────────────────────────────────────
// Outbound
// ─────────────────────────────────────────────────────────────────────────────

/// Frames the client sends.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ClientMessage {
    /// Keep-alive tick.
    Heartbeat,
    /// Post an overlay message to the room.
    Danmaku {
        /// Content and styling.
        data: DanmakuPayload,
    },
}

impl ClientMessage {
    /// Serialize to the JSON text frame.
    pub fn encode(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

/// Placement of an overlay message.
///
/// Carried as the raw wire integer so values this client does not know are
/// still passed through untouched.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DanmakuMode(pub i64);

impl DanmakuMode {
    /// Scrolls across the video.
    pub const SCROLL: Self = Self(1);
    /// Pinned to the top.
    pub const TOP: Self = Self(2);
    /// Pinned to the bottom.
    pub const BOTTOM: Self = Self(3);

    /// Whether this is one of the three defined placements.
    #[must_use]
    pub const fn is_known(self) -> bool {
        matches!(self.0, 1..=3)
    }
}

impl Default for DanmakuMode {
    fn default() -> Self {
        Self::SCROLL
    }
}

/// Default text color.
pub const DEFAULT_COLOR: &str = "#FFFFFF";
/// Default font size in pixels.
pub const DEFAULT_FONT_SIZE: u32 = 24;

fn default_color() -> String {
    DEFAULT_COLOR.to_string()
}
fn default_font_size() -> u32 {
    DEFAULT_FONT_SIZE
}

// Inbound styling is advisory: `null` or a value of the wrong shape falls
// back to the default instead of failing the whole frame.

fn color_or_default<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    Ok(match Value::deserialize(deserializer)? {
        Value::String(color) => color,
        _ => default_color(),
    })
}

fn font_size_or_default<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u32, D::Error> {
    Ok(Value::deserialize(deserializer)?
        .as_u64()
        .and_then(|n| u32::try_from(n).ok())
        .unwrap_or(DEFAULT_FONT_SIZE))
}

fn mode_or_default<'de, D: Deserializer<'de>>(deserializer: D) -> Result<DanmakuMode, D::Error> {
    Ok(Value::deserialize(deserializer)?
        .as_i64()
        .map_or_else(DanmakuMode::default, DanmakuMode))
}

/// Overlay message content and styling.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DanmakuPayload {
    /// Message text.
    pub content: String,
    /// CSS color string.
    #[serde(default = "default_color", deserialize_with = "color_or_default")]
    pub color: String,
    /// Font size in pixels.
    #[serde(default = "default_font_size", deserialize_with = "font_size_or_default")]
    pub font_size: u32,
    /// Placement.
    #[serde(default, deserialize_with = "mode_or_default")]
    pub mode: DanmakuMode,
}

impl DanmakuPayload {
    /// White, 24px, scrolling.
    pub fn new(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            color: default_color(),
            font_size: DEFAULT_FONT_SIZE,
            mode: DanmakuMode::SCROLL,
        }
    }

    /// Override the color.
    #[must_use]
    pub fn with_color(mut self, color: impl Into<String>) -> Self {
        self.color = color.into();
        self
    }

    /// Override the font size.
    #[must_use]
    pub fn with_font_size(mut self, font_size: u32) -> Self {
        self.font_size = font_size;
        self
    }

    /// Override the placement.
    #[must_use]
    pub fn with_mode(mut self, mode: DanmakuMode) -> Self {
        self.mode = mode;
        self
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Inbound
// ─────────────────────────────────────────────────────────────────────────────

/// A decoded server frame.
#[derive(Clone, Debug, PartialEq)]
pub enum InboundMessage {
    /// Heartbeat acknowledgement.
    Heartbeat(HeartbeatAck),
    /// Overlay content, join or leave.
    Overlay(OverlayEvent),
    /// CDN line advertisement.
    CdnInfo(CdnInfo),
    /// `ERROR`, `SUCCESS`, `ACK` or `PONG`.
    Notice(ServerNotice),
    /// A `type` this client does not handle.
    Unknown {
        /// The `type` value.
        kind: String,
    },
}

impl InboundMessage {
    /// The wire `type` of the frame.
    #[must_use]
    pub fn type_name(&self) -> &str {
        match self {
            Self::Heartbeat(_) => "HEARTBEAT",
            Self::Overlay(event) => event.kind.wire_name(),
            Self::CdnInfo(_) => "CDN_INFO",
            Self::Notice(notice) => notice.kind.wire_name(),
            Self::Unknown { kind } => kind,
        }
    }
}

/// Heartbeat acknowledgement.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct HeartbeatAck {
    /// Server time, epoch milliseconds.
    pub timestamp: Option<i64>,
}

/// Which overlay event a frame carries.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum OverlayKind {
    /// `DANMAKU`: a posted message.
    Content,
    /// `JOIN`: a viewer entered the room.
    Join,
    /// `LEAVE`: a viewer left the room.
    Leave,
}

impl OverlayKind {
    /// The wire `type` value.
    #[must_use]
    pub const fn wire_name(self) -> &'static str {
        match self {
            Self::Content => "DANMAKU",
            Self::Join => "JOIN",
            Self::Leave => "LEAVE",
        }
    }
}

/// An event from the overlay channel.
#[derive(Clone, Debug, PartialEq)]
pub struct OverlayEvent {
    /// Event kind.
    pub kind: OverlayKind,
    /// Viewer the event concerns (string or numeric on the wire).
    pub user_id: Option<String>,
    /// Display name, when the server includes one.
    pub username: Option<String>,
    /// Message content, present for [`OverlayKind::Content`].
    pub danmaku: Option<DanmakuPayload>,
    /// Server time, epoch milliseconds.
    pub timestamp: Option<i64>,
    /// The complete decoded frame.
    pub raw: Value,
}

/// One CDN line.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CdnLine {
    /// Line name.
    pub name: String,
    /// Stream URL on this line.
    pub url: String,
}

/// CDN metadata: the active line and every available line.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CdnInfo {
    /// Name of the line currently in use.
    pub current: String,
    /// All advertised lines.
    #[serde(default)]
    pub lines: Vec<CdnLine>,
}

impl CdnInfo {
    /// The line named by `current`, if advertised.
    #[must_use]
    pub fn active_line(&self) -> Option<&CdnLine> {
        self.lines.iter().find(|line| line.name == self.current)
    }
}

/// Kind of server notice.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum NoticeKind {
    /// The server rejected something.
    Error,
    /// The server confirmed an update.
    Success,
    /// The server acknowledged a posted message.
    Ack,
    /// Application-level pong.
    Pong,
}

impl NoticeKind {
    /// The wire `type` value.
    #[must_use]
    pub const fn wire_name(self) -> &'static str {
        match self {
            Self::Error => "ERROR",
            Self::Success => "SUCCESS",
            Self::Ack => "ACK",
            Self::Pong => "PONG",
        }
    }
}

/// A status frame from the server.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ServerNotice {
    /// Notice kind.
    pub kind: NoticeKind,
    /// Text from `message`, or from `data` when it is a string.
    pub message: Option<String>,
    /// Acknowledged message ID.
    pub message_id: Option<String>,
    /// Server time, epoch milliseconds.
    pub timestamp: Option<i64>,
}

/// Decode one inbound text frame.
///
/// Unknown `type` values decode to [`InboundMessage::Unknown`]; only frames
/// that are not JSON, lack a `type`, or carry a payload that does not fit
/// their `type` are errors.
pub fn parse_inbound(text: &str) -> Result<InboundMessage, MessageError> {
    let value: Value = serde_json::from_str(text)?;
    let kind = value
        .get("type")
        .and_then(Value::as_str)
        .ok_or(MessageError::MissingType)?
        .to_owned();

    match kind.as_str() {
        "HEARTBEAT" => Ok(InboundMessage::Heartbeat(HeartbeatAck {
            timestamp: timestamp_of(&value),
        })),
        "DANMAKU" => decode_overlay(OverlayKind::Content, kind, value),
        "JOIN" => decode_overlay(OverlayKind::Join, kind, value),
        "LEAVE" => decode_overlay(OverlayKind::Leave, kind, value),
        "CDN_INFO" => {
            let data = value.get("data").cloned().unwrap_or(Value::Null);
            serde_json::from_value(data)
                .map(InboundMessage::CdnInfo)
                .map_err(|source| MessageError::InvalidPayload { kind, source })
        }
        "ERROR" => Ok(InboundMessage::Notice(decode_notice(NoticeKind::Error, &value))),
        "SUCCESS" => Ok(InboundMessage::Notice(decode_notice(NoticeKind::Success, &value))),
        "ACK" => Ok(InboundMessage::Notice(decode_notice(NoticeKind::Ack, &value))),
        "PONG" => Ok(InboundMessage::Notice(decode_notice(NoticeKind::Pong, &value))),
        _ => Ok(InboundMessage::Unknown { kind }),
    }
}

fn decode_overlay(
    overlay_kind: OverlayKind,
    kind: String,
    value: Value,
) -> Result<InboundMessage, MessageError> {
    let data = value.get("data");
    let danmaku = match overlay_kind {
        OverlayKind::Content => {
            let data = data.cloned().unwrap_or(Value::Null);
            Some(
                serde_json::from_value::<DanmakuPayload>(data)
                    .map_err(|source| MessageError::InvalidPayload { kind, source })?,
            )
        }
        OverlayKind::Join | OverlayKind::Leave => None,
    };

    let field = |name: &str| {
        value
            .get(name)
            .or_else(|| data.and_then(|d| d.get(name)))
            .and_then(id_string)
    };

    Ok(InboundMessage::Overlay(OverlayEvent {
        kind: overlay_kind,
        user_id: field("userId"),
        username: field("username"),
        danmaku,
        timestamp: timestamp_of(&value),
        raw: value,
    }))
}

fn decode_notice(kind: NoticeKind, value: &Value) -> ServerNotice {
    let message = value
        .get("message")
        .and_then(Value::as_str)
        .or_else(|| value.get("data").and_then(Value::as_str))
        .map(str::to_owned);
    ServerNotice {
        kind,
        message,
        message_id: value.get("messageId").and_then(id_string),
        timestamp: timestamp_of(value),
    }
}

/// Top-level `timestamp`, falling back to `data.timestamp`.
fn timestamp_of(value: &Value) -> Option<i64> {
    value
        .get("timestamp")
        .or_else(|| value.pointer("/data/timestamp"))
        .and_then(Value::as_i64)
}

/// IDs arrive as strings or as JSON numbers.
fn id_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use serde_json::json;

    // -- outbound --

    #[test]
    fn heartbeat_encodes_bare_type() {
        let text = ClientMessage::Heartbeat.encode().unwrap();
        assert_eq!(text, r#"{"type":"HEARTBEAT"}"#);
    }

    #[test]
    fn danmaku_encodes_camel_case_payload() {
        let msg = ClientMessage::Danmaku {
            data: DanmakuPayload::new("hello")
                .with_color("#FF0000")
                .with_font_size(30)
                .with_mode(DanmakuMode::TOP),
        };
        let value: Value = serde_json::from_str(&msg.encode().unwrap()).unwrap();
        assert_eq!(
            value,
            json!({
                "type": "DANMAKU",
                "data": {"content": "hello", "color": "#FF0000", "fontSize": 30, "mode": 2}
            })
        );
    }

    #[test]
    fn payload_defaults_match_web_client() {
        let payload = DanmakuPayload::new("x");
        assert_eq!(payload.color, "#FFFFFF");
        assert_eq!(payload.font_size, 24);
        assert_eq!(payload.mode, DanmakuMode::SCROLL);
    }

    // -- inbound: heartbeat / cdn --

    #[test]
    fn heartbeat_ack_reads_data_timestamp() {
        let msg = parse_inbound(r#"{"type":"HEARTBEAT","data":{"timestamp":1700000000123}}"#)
            .unwrap();
        assert_eq!(
            msg,
            InboundMessage::Heartbeat(HeartbeatAck {
                timestamp: Some(1_700_000_000_123)
            })
        );
    }

    #[test]
    fn cdn_info_and_active_line() {
        let msg = parse_inbound(
            &json!({
                "type": "CDN_INFO",
                "data": {
                    "current": "backup",
                    "lines": [
                        {"name": "main", "url": "https://main/live.flv"},
                        {"name": "backup", "url": "https://backup/live.flv"}
                    ]
                }
            })
            .to_string(),
        )
        .unwrap();
        let info = assert_matches!(msg, InboundMessage::CdnInfo(info) => info);
        assert_eq!(info.lines.len(), 2);
        assert_eq!(info.active_line().unwrap().url, "https://backup/live.flv");
    }

    #[test]
    fn cdn_info_unknown_current_line() {
        let info = CdnInfo {
            current: "gone".into(),
            lines: vec![CdnLine {
                name: "main".into(),
                url: "u".into(),
            }],
        };
        assert!(info.active_line().is_none());
    }

    #[test]
    fn cdn_info_without_data_is_invalid() {
        let err = parse_inbound(r#"{"type":"CDN_INFO"}"#).unwrap_err();
        assert_matches!(err, MessageError::InvalidPayload { kind, .. } if kind == "CDN_INFO");
    }

    // -- inbound: overlay --

    #[test]
    fn danmaku_preserves_mode_verbatim() {
        let text = json!({
            "type": "DANMAKU",
            "userId": 42,
            "data": {"content": "hi", "color": "#00FF00", "fontSize": 18, "mode": 3}
        })
        .to_string();
        let event = assert_matches!(parse_inbound(&text).unwrap(), InboundMessage::Overlay(e) => e);
        assert_eq!(event.kind, OverlayKind::Content);
        assert_eq!(event.user_id.as_deref(), Some("42"));
        let danmaku = event.danmaku.unwrap();
        assert_eq!(danmaku.mode, DanmakuMode::BOTTOM);
        assert_eq!(danmaku.font_size, 18);
        assert_eq!(event.raw["data"]["color"], "#00FF00");
    }

    #[test]
    fn unknown_mode_passes_through() {
        let text = r#"{"type":"DANMAKU","data":{"content":"x","mode":9}}"#;
        let event = assert_matches!(parse_inbound(text).unwrap(), InboundMessage::Overlay(e) => e);
        let mode = event.danmaku.unwrap().mode;
        assert_eq!(mode, DanmakuMode(9));
        assert!(!mode.is_known());
    }

    #[test]
    fn join_reads_user_from_data() {
        let text = r#"{"type":"JOIN","data":{"userId":"u7","username":"Ann"},"timestamp":5}"#;
        let event = assert_matches!(parse_inbound(text).unwrap(), InboundMessage::Overlay(e) => e);
        assert_eq!(event.kind, OverlayKind::Join);
        assert_eq!(event.user_id.as_deref(), Some("u7"));
        assert_eq!(event.username.as_deref(), Some("Ann"));
        assert_eq!(event.timestamp, Some(5));
        assert!(event.danmaku.is_none());
    }

    #[test]
    fn leave_without_data() {
        let text = r#"{"type":"LEAVE","userId":"u7"}"#;
        let msg = parse_inbound(text).unwrap();
        assert_eq!(msg.type_name(), "LEAVE");
    }

    #[test]
    fn null_styling_falls_back_to_defaults() {
        let text = r#"{"type":"DANMAKU","data":{"content":"hi","color":null,"fontSize":null,"mode":null}}"#;
        let event = assert_matches!(parse_inbound(text).unwrap(), InboundMessage::Overlay(e) => e);
        let danmaku = event.danmaku.unwrap();
        assert_eq!(danmaku.content, "hi");
        assert_eq!(danmaku.color, DEFAULT_COLOR);
        assert_eq!(danmaku.font_size, DEFAULT_FONT_SIZE);
        assert_eq!(danmaku.mode, DanmakuMode::SCROLL);
        assert!(event.raw["data"]["color"].is_null());
    }

    #[test]
    fn wide_mode_is_kept() {
        let text = r#"{"type":"DANMAKU","data":{"content":"x","mode":300}}"#;
        let event = assert_matches!(parse_inbound(text).unwrap(), InboundMessage::Overlay(e) => e);
        assert_eq!(event.danmaku.unwrap().mode, DanmakuMode(300));
    }

    #[test]
    fn odd_styling_shapes_are_tolerated() {
        let text = r#"{"type":"DANMAKU","data":{"content":"x","color":7,"fontSize":-3,"mode":"top"}}"#;
        let event = assert_matches!(parse_inbound(text).unwrap(), InboundMessage::Overlay(e) => e);
        let danmaku = event.danmaku.unwrap();
        assert_eq!(danmaku.color, DEFAULT_COLOR);
        assert_eq!(danmaku.font_size, DEFAULT_FONT_SIZE);
        assert_eq!(danmaku.mode, DanmakuMode::SCROLL);
        assert_eq!(event.raw["data"]["mode"], "top");
    }

    #[test]
    fn backend_shaped_frame_is_accepted() {
        let text = json!({
            "type": "DANMAKU",
            "messageId": 17,
            "roomId": "1001",
            "userId": "u1",
            "timestamp": 1_700_000_000_000_i64,
            "data": {
                "content": "hello",
                "color": null,
                "size": null,
                "position": null,
                "extra": null
            }
        })
        .to_string();
        let event = assert_matches!(parse_inbound(&text).unwrap(), InboundMessage::Overlay(e) => e);
        assert_eq!(event.user_id.as_deref(), Some("u1"));
        assert_eq!(event.danmaku.unwrap().content, "hello");
    }

    #[test]
    fn null_content_is_invalid() {
        let err = parse_inbound(r#"{"type":"DANMAKU","data":{"content":null}}"#).unwrap_err();
        assert_matches!(err, MessageError::InvalidPayload { .. });
    }

    #[test]
    fn danmaku_without_content_is_invalid() {
        let err = parse_inbound(r##"{"type":"DANMAKU","data":{"color":"#fff"}}"##).unwrap_err();
        assert_matches!(err, MessageError::InvalidPayload { .. });
    }

    // -- inbound: notices / errors --

    #[test]
    fn error_notice_from_message_or_data() {
        let a = parse_inbound(r#"{"type":"ERROR","message":"muted","timestamp":1}"#).unwrap();
        let a = assert_matches!(a, InboundMessage::Notice(n) => n);
        assert_eq!(a.kind, NoticeKind::Error);
        assert_eq!(a.message.as_deref(), Some("muted"));

        let b = parse_inbound(r#"{"type":"ERROR","data":"bad format"}"#).unwrap();
        let b = assert_matches!(b, InboundMessage::Notice(n) => n);
        assert_eq!(b.message.as_deref(), Some("bad format"));
    }

    #[test]
    fn ack_carries_message_id() {
        let msg = parse_inbound(r#"{"type":"ACK","messageId":991,"timestamp":3}"#).unwrap();
        let notice = assert_matches!(msg, InboundMessage::Notice(n) => n);
        assert_eq!(notice.message_id.as_deref(), Some("991"));
    }

    #[test]
    fn unknown_type_is_not_an_error() {
        let msg = parse_inbound(r#"{"type":"HISTORY","messages":[]}"#).unwrap();
        assert_eq!(msg, InboundMessage::Unknown { kind: "HISTORY".into() });
    }

    #[test]
    fn not_json_is_rejected() {
        assert_matches!(parse_inbound("{not json"), Err(MessageError::Json(_)));
    }

    #[test]
    fn missing_type_is_rejected() {
        assert_matches!(
            parse_inbound(r#"{"data":{}}"#),
            Err(MessageError::MissingType)
        );
        assert_matches!(parse_inbound(r#"{"type":7}"#), Err(MessageError::MissingType));
    }
}
