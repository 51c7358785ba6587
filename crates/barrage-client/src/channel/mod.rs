//! One persistent channel: state machine, owned driver task, heartbeat.
//!
//! A [`ChannelConnection`] is single-use. Once `Closed` it stays closed;
//! reconnecting means building a new instance with a new [`ChannelId`].
//! Everything the driver observes is reported to the owner as a
//! [`ChannelEvent`] tagged with that ID, so the owner can ignore events from
//! instances it has already replaced.

mod driver;

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use barrage_core::{ChannelKind, ChannelState, ClientMessage, InboundMessage, MessageError};
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::transport::Connector;

/// Identity of one channel instance.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ChannelId(pub u64);

impl fmt::Display for ChannelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Timing knobs for a channel.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ChannelConfig {
    /// Keep-alive interval (heartbeat channel only).
    pub heartbeat_interval: Duration,
    /// Transport connect timeout.
    pub connect_timeout: Duration,
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            heartbeat_interval: Duration::from_secs(20),
            connect_timeout: Duration::from_secs(10),
        }
    }
}

/// Something a channel driver observed.
#[derive(Debug)]
pub struct ChannelEvent {
    /// Instance that produced the event.
    pub channel_id: ChannelId,
    /// Kind of that instance.
    pub kind: ChannelKind,
    /// What happened.
    pub body: ChannelEventBody,
}

/// Payload of a [`ChannelEvent`].
#[derive(Debug)]
pub enum ChannelEventBody {
    /// Transport established; state is `Open`.
    Opened,
    /// A decoded inbound frame.
    Message(InboundMessage),
    /// An inbound frame that could not be decoded. The channel stays open.
    Malformed(MessageError),
    /// Socket-level failure. A `Closed` follows.
    TransportError(String),
    /// The channel closed without its owner asking.
    Closed {
        /// Why.
        reason: String,
    },
}

type EventSender = mpsc::UnboundedSender<ChannelEvent>;

/// Shortest heartbeat period a channel will tick at.
pub const MIN_HEARTBEAT_INTERVAL: Duration = Duration::from_millis(1);

/// Move `state` to `next` if the machine allows it.
fn transition(state: &Mutex<ChannelState>, next: ChannelState) -> bool {
    let mut guard = state.lock();
    if guard.can_transition_to(next) {
        *guard = next;
        true
    } else {
        false
    }
}

/// A single persistent channel.
pub struct ChannelConnection {
    id: ChannelId,
    kind: ChannelKind,
    url: String,
    config: ChannelConfig,
    state: Arc<Mutex<ChannelState>>,
    events: EventSender,
    outbound: Option<mpsc::UnboundedSender<String>>,
    cancel: CancellationToken,
    task: Option<JoinHandle<()>>,
}

impl ChannelConnection {
    /// A `Disconnected` channel that will report to `events`.
    ///
    /// A heartbeat interval below [`MIN_HEARTBEAT_INTERVAL`] is raised to it.
    pub fn new(
        id: ChannelId,
        kind: ChannelKind,
        url: impl Into<String>,
        events: EventSender,
        mut config: ChannelConfig,
    ) -> Self {
        if config.heartbeat_interval < MIN_HEARTBEAT_INTERVAL {
            warn!(
                %kind,
                requested = ?config.heartbeat_interval,
                "heartbeat interval too short, clamping"
            );
            config.heartbeat_interval = MIN_HEARTBEAT_INTERVAL;
        }
        Self {
            id,
            kind,
            url: url.into(),
            config,
            state: Arc::new(Mutex::new(ChannelState::Disconnected)),
            events,
            outbound: None,
            cancel: CancellationToken::new(),
            task: None,
        }
    }

    /// Instance ID.
    pub fn id(&self) -> ChannelId {
        self.id
    }

    /// Channel kind.
    pub fn kind(&self) -> ChannelKind {
        self.kind
    }

    /// Target URL.
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Current state.
    pub fn state(&self) -> ChannelState {
        *self.state.lock()
    }

    /// Start connecting. Only valid from `Disconnected`; otherwise a no-op
    /// returning `false`.
    ///
    /// Must be called inside a tokio runtime.
    pub fn open(&mut self, connector: Arc<dyn Connector>) -> bool {
        if !transition(&self.state, ChannelState::Connecting) {
            debug!(kind = %self.kind, channel_id = %self.id, state = %self.state(), "open ignored");
            return false;
        }

        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        self.outbound = Some(outbound_tx);

        let driver = driver::Driver {
            id: self.id,
            kind: self.kind,
            url: self.url.clone(),
            config: self.config.clone(),
            state: Arc::clone(&self.state),
            events: self.events.clone(),
            cancel: self.cancel.clone(),
            outbound: outbound_rx,
            connector,
        };
        self.task = Some(tokio::spawn(driver.run()));
        debug!(kind = %self.kind, channel_id = %self.id, url = %self.url, "channel connecting");
        true
    }

    /// Queue a frame. Returns `false` without touching the transport unless
    /// the channel is `Open`.
    pub fn send(&self, message: &ClientMessage) -> bool {
        if self.state() != ChannelState::Open {
            return false;
        }
        let Some(outbound) = &self.outbound else {
            return false;
        };
        let text = match message.encode() {
            Ok(text) => text,
            Err(error) => {
                warn!(kind = %self.kind, %error, "failed to encode frame");
                return false;
            }
        };
        outbound.send(text).is_ok()
    }

    /// Close from any non-terminal state. Idempotent; returns whether this
    /// call did the closing.
    ///
    /// The driver stops (and with it the heartbeat ticker) and closes the
    /// transport. No `Closed` event is reported for an owner-initiated close.
    pub fn close(&mut self) -> bool {
        let closed = transition(&self.state, ChannelState::Closed);
        self.cancel.cancel();
        self.outbound = None;
        if closed {
            debug!(kind = %self.kind, channel_id = %self.id, "channel closed by owner");
        }
        closed
    }

    /// Whether the driver task has finished.
    pub fn is_finished(&self) -> bool {
        self.task.as_ref().is_none_or(JoinHandle::is_finished)
    }
}

impl Drop for ChannelConnection {
    fn drop(&mut self) {
        let _ = transition(&self.state, ChannelState::Closed);
        self.cancel.cancel();
    }
}

impl fmt::Debug for ChannelConnection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChannelConnection")
            .field("id", &self.id)
            .field("kind", &self.kind)
            .field("url", &self.url)
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::{ConnectBehavior, MemoryConnector};
    use assert_matches::assert_matches;
    use barrage_core::{DanmakuPayload, logging::capture_logs};
    use tokio::time::timeout;
    use tracing::Level;

    const WAIT: Duration = Duration::from_secs(5);

    fn channel(kind: ChannelKind, config: ChannelConfig) -> (ChannelConnection, mpsc::UnboundedReceiver<ChannelEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (ChannelConnection::new(ChannelId(1), kind, "mem://test", tx, config), rx)
    }

    async fn next_event(rx: &mut mpsc::UnboundedReceiver<ChannelEvent>) -> ChannelEvent {
        timeout(WAIT, rx.recv()).await.unwrap().unwrap()
    }

    fn danmaku(text: &str) -> ClientMessage {
        ClientMessage::Danmaku {
            data: DanmakuPayload::new(text),
        }
    }

    // ── state machine ───────────────────────────────────────────────

    #[tokio::test]
    async fn send_before_open_is_rejected_without_transport_call() {
        let (connector, _peers) = MemoryConnector::new();
        let (ch, _rx) = channel(ChannelKind::Overlay, ChannelConfig::default());
        assert_eq!(ch.state(), ChannelState::Disconnected);
        assert!(!ch.send(&danmaku("x")));
        assert_eq!(connector.connect_count(), 0);
    }

    #[tokio::test]
    async fn send_while_connecting_is_rejected() {
        let (connector, _peers) = MemoryConnector::new();
        connector.set_behavior(ConnectBehavior::Hang);
        let (mut ch, _rx) = channel(ChannelKind::Overlay, ChannelConfig::default());
        assert!(ch.open(Arc::new(connector)));
        assert_eq!(ch.state(), ChannelState::Connecting);
        assert!(!ch.send(&danmaku("x")));
    }

    #[tokio::test]
    async fn open_then_send_reaches_peer() {
        let (connector, mut peers) = MemoryConnector::new();
        let (mut ch, mut rx) = channel(ChannelKind::Overlay, ChannelConfig::default());
        assert!(ch.open(Arc::new(connector.clone())));
        let mut peer = peers.recv().await.unwrap();
        assert_matches!(next_event(&mut rx).await.body, ChannelEventBody::Opened);
        assert_eq!(ch.state(), ChannelState::Open);

        assert!(ch.send(&danmaku("hi")));
        let sent = timeout(WAIT, peer.recv()).await.unwrap().unwrap();
        assert!(sent.contains(r#""content":"hi""#));

        // a second open is a no-op
        assert!(!ch.open(Arc::new(connector)));
    }

    #[tokio::test]
    async fn close_twice_is_harmless() {
        let (connector, mut peers) = MemoryConnector::new();
        let (mut ch, mut rx) = channel(ChannelKind::CdnInfo, ChannelConfig::default());
        let _ = ch.open(Arc::new(connector));
        let mut peer = peers.recv().await.unwrap();
        let _ = next_event(&mut rx).await;

        assert!(ch.close());
        assert!(!ch.close());
        assert_eq!(ch.state(), ChannelState::Closed);
        assert!(!ch.send(&danmaku("late")));

        // the transport is released once
        assert!(timeout(WAIT, peer.recv()).await.unwrap().is_none());
        // owner close is not reported as unexpected
        assert!(timeout(Duration::from_millis(100), rx.recv()).await.unwrap_or(None).is_none());
    }

    #[tokio::test]
    async fn close_stops_the_driver() {
        let (connector, mut peers) = MemoryConnector::new();
        let (mut ch, mut rx) = channel(ChannelKind::Overlay, ChannelConfig::default());
        assert!(ch.is_finished());

        let _ = ch.open(Arc::new(connector));
        let _peer = peers.recv().await.unwrap();
        assert_matches!(next_event(&mut rx).await.body, ChannelEventBody::Opened);
        assert!(!ch.is_finished());

        assert!(ch.close());
        timeout(WAIT, async {
            while !ch.is_finished() {
                tokio::time::sleep(Duration::from_millis(1)).await;
            }
        })
        .await
        .unwrap();
    }

    #[tokio::test]
    async fn close_before_open_is_terminal() {
        let (connector, _peers) = MemoryConnector::new();
        let (mut ch, _rx) = channel(ChannelKind::Heartbeat, ChannelConfig::default());
        assert!(ch.close());
        assert!(!ch.open(Arc::new(connector.clone())));
        assert_eq!(connector.connect_count(), 0);
    }

    // ── inbound ─────────────────────────────────────────────────────

    #[tokio::test]
    async fn malformed_frame_keeps_channel_open() {
        let (logs, _guard) = capture_logs();
        let (connector, mut peers) = MemoryConnector::new();
        let (mut ch, mut rx) = channel(ChannelKind::Overlay, ChannelConfig::default());
        let _ = ch.open(Arc::new(connector));
        let peer = peers.recv().await.unwrap();
        let _ = next_event(&mut rx).await;

        assert!(peer.send_text("{not json"));
        assert_matches!(next_event(&mut rx).await.body, ChannelEventBody::Malformed(_));
        assert!(peer.send_binary(vec![1, 2, 3]));
        assert_matches!(
            next_event(&mut rx).await.body,
            ChannelEventBody::Malformed(MessageError::Binary { len: 3 })
        );

        assert!(peer.send_text(r#"{"type":"LEAVE","userId":"u1"}"#));
        assert_matches!(next_event(&mut rx).await.body, ChannelEventBody::Message(_));
        assert_eq!(ch.state(), ChannelState::Open);
        assert!(logs.has_event(Level::WARN, "malformed"));
        drop(peer);
    }

    #[tokio::test]
    async fn peer_close_is_reported_once() {
        let (connector, mut peers) = MemoryConnector::new();
        let (mut ch, mut rx) = channel(ChannelKind::Overlay, ChannelConfig::default());
        let _ = ch.open(Arc::new(connector));
        let peer = peers.recv().await.unwrap();
        let _ = next_event(&mut rx).await;

        assert!(peer.close(1001, "going away"));
        let event = next_event(&mut rx).await;
        assert_matches!(event.body, ChannelEventBody::Closed { reason } if reason.contains("1001"));
        assert_eq!(ch.state(), ChannelState::Closed);
        assert!(!ch.close());
    }

    #[tokio::test]
    async fn transport_error_precedes_close() {
        let (connector, mut peers) = MemoryConnector::new();
        let (mut ch, mut rx) = channel(ChannelKind::CdnInfo, ChannelConfig::default());
        let _ = ch.open(Arc::new(connector));
        let peer = peers.recv().await.unwrap();
        let _ = next_event(&mut rx).await;

        assert!(peer.fail("reset by peer"));
        assert_matches!(next_event(&mut rx).await.body, ChannelEventBody::TransportError(_));
        assert_matches!(next_event(&mut rx).await.body, ChannelEventBody::Closed { .. });
    }

    #[tokio::test]
    async fn refused_connect_is_an_unexpected_close() {
        let (connector, _peers) = MemoryConnector::new();
        connector.set_behavior(ConnectBehavior::Refuse);
        let (mut ch, mut rx) = channel(ChannelKind::Heartbeat, ChannelConfig::default());
        let _ = ch.open(Arc::new(connector));
        assert_matches!(next_event(&mut rx).await.body, ChannelEventBody::Closed { .. });
        assert_eq!(ch.state(), ChannelState::Closed);
    }

    #[tokio::test(start_paused = true)]
    async fn connect_timeout_closes_channel() {
        let (connector, _peers) = MemoryConnector::new();
        connector.set_behavior(ConnectBehavior::Hang);
        let config = ChannelConfig {
            connect_timeout: Duration::from_millis(500),
            ..ChannelConfig::default()
        };
        let (mut ch, mut rx) = channel(ChannelKind::Overlay, config);
        let _ = ch.open(Arc::new(connector));
        let event = rx.recv().await.unwrap();
        assert_matches!(event.body, ChannelEventBody::Closed { reason } if reason.contains("timed out"));
    }

    // ── heartbeat ───────────────────────────────────────────────────

    #[tokio::test(start_paused = true)]
    async fn heartbeat_ticks_after_one_interval_and_stops_on_close() {
        let (connector, mut peers) = MemoryConnector::new();
        let (mut ch, mut rx) = channel(ChannelKind::Heartbeat, ChannelConfig::default());
        let _ = ch.open(Arc::new(connector));
        let mut peer = peers.recv().await.unwrap();
        let _ = rx.recv().await;

        tokio::time::sleep(Duration::from_millis(19_900)).await;
        assert!(peer.try_recv().is_none());

        assert_eq!(peer.recv().await.as_deref(), Some(r#"{"type":"HEARTBEAT"}"#));
        assert_eq!(peer.recv().await.as_deref(), Some(r#"{"type":"HEARTBEAT"}"#));

        assert!(ch.close());
        // no tick outlives the channel
        assert!(peer.recv().await.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn zero_heartbeat_interval_is_clamped() {
        let (logs, _guard) = capture_logs();
        let (connector, mut peers) = MemoryConnector::new();
        let config = ChannelConfig {
            heartbeat_interval: Duration::ZERO,
            ..ChannelConfig::default()
        };
        let (mut ch, mut rx) = channel(ChannelKind::Heartbeat, config);
        assert!(logs.has_event(Level::WARN, "clamping"));

        let _ = ch.open(Arc::new(connector));
        let mut peer = peers.recv().await.unwrap();
        assert_matches!(next_event(&mut rx).await.body, ChannelEventBody::Opened);

        for _ in 0..3 {
            assert_eq!(peer.recv().await.as_deref(), Some(r#"{"type":"HEARTBEAT"}"#));
        }
        assert_eq!(ch.state(), ChannelState::Open);

        assert!(ch.close());
        while peer.recv().await.is_some() {}
    }

    #[tokio::test(start_paused = true)]
    async fn non_heartbeat_channels_do_not_tick() {
        let (connector, mut peers) = MemoryConnector::new();
        let (mut ch, mut rx) = channel(ChannelKind::Overlay, ChannelConfig::default());
        let _ = ch.open(Arc::new(connector));
        let mut peer = peers.recv().await.unwrap();
        let _ = rx.recv().await;

        tokio::time::sleep(Duration::from_secs(61)).await;
        assert!(peer.try_recv().is_none());
        drop(ch);
    }
}
