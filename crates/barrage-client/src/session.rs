//! Room session: owns the three channels of one room and keeps them alive.
//!
//! [`RoomSession`] is a handle. All mutable state lives in a single actor
//! task; handle methods send it a command and await the reply. Channel
//! drivers report to the same actor over an mpsc, so channel events,
//! commands and the reconnect deadline are processed one at a time.

use std::collections::BTreeMap;
use std::sync::Arc;

use barrage_core::{
    CdnInfo, ChannelKind, ChannelState, ClientMessage, ConnectionInfo, DanmakuPayload,
    InboundMessage, NoticeKind, OverlayEvent, OverlayKind, ReconnectScope, ReconnectTracker,
    RoomTarget,
};
use chrono::{DateTime, Utc};
use tokio::sync::{mpsc, oneshot};
use tokio::time::Instant;
use tracing::{Instrument, debug, info, info_span, warn};

use crate::channel::{ChannelConnection, ChannelEvent, ChannelEventBody, ChannelId};
use crate::config::SessionConfig;
use crate::dispatcher::{EventDispatcher, SubscriptionId};
use crate::events::{Diagnostic, EventKind, SessionEvent};
use crate::resolver::ConnectionResolver;
use crate::transport::Connector;

// ─────────────────────────────────────────────────────────────────────────────
// Status
// ─────────────────────────────────────────────────────────────────────────────

/// Snapshot of one channel.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ChannelStatus {
    /// Channel kind.
    pub kind: ChannelKind,
    /// Current instance.
    pub id: ChannelId,
    /// Instance state.
    pub state: ChannelState,
    /// Instance URL.
    pub url: String,
    /// Reconnect attempts used in the budget governing this kind.
    pub attempts_used: u32,
}

/// Snapshot of a session.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SessionStatus {
    /// Between `connect()` and `close()`, and not exhausted.
    pub live: bool,
    /// The reconnect budget ran out; waiting for `connect()`.
    pub exhausted: bool,
    /// Current channel instances, in open order.
    pub channels: Vec<ChannelStatus>,
    /// A reconnect is scheduled.
    pub reconnect_pending: bool,
    /// When the last heartbeat acknowledgement arrived.
    pub last_heartbeat_ack: Option<DateTime<Utc>>,
    /// Server time carried by that acknowledgement, epoch milliseconds.
    pub last_server_time: Option<i64>,
}

impl SessionStatus {
    /// State of the channel of `kind`, if one exists.
    pub fn channel_state(&self, kind: ChannelKind) -> Option<ChannelState> {
        self.channels
            .iter()
            .find(|c| c.kind == kind)
            .map(|c| c.state)
    }

    /// Whether all three channels are open.
    pub fn all_open(&self) -> bool {
        ChannelKind::ALL
            .iter()
            .all(|kind| self.channel_state(*kind) == Some(ChannelState::Open))
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Handle
// ─────────────────────────────────────────────────────────────────────────────

enum Command {
    Connect(oneshot::Sender<bool>),
    Send(DanmakuPayload, oneshot::Sender<bool>),
    Close(oneshot::Sender<()>),
    Status(oneshot::Sender<SessionStatus>),
}

/// Client session for one room.
///
/// Dropping the handle tears the session down: the actor sees its command
/// channel close, closes every channel and exits.
pub struct RoomSession {
    target: RoomTarget,
    dispatcher: EventDispatcher,
    commands: mpsc::UnboundedSender<Command>,
}

impl RoomSession {
    /// Create a session and spawn its actor. Nothing connects until
    /// [`connect`](Self::connect).
    ///
    /// Must be called inside a tokio runtime.
    pub fn new(
        target: RoomTarget,
        resolver: Arc<dyn ConnectionResolver>,
        connector: Arc<dyn Connector>,
        config: SessionConfig,
    ) -> Self {
        let dispatcher = EventDispatcher::new();
        let (commands_tx, commands_rx) = mpsc::unbounded_channel();
        let (events_tx, events_rx) = mpsc::unbounded_channel();

        let span = info_span!("room_session", room = %target.room_id);
        let actor = Actor {
            target: target.clone(),
            resolver,
            connector,
            tracker: ReconnectTracker::new(config.reconnect.clone(), config.scope),
            config,
            dispatcher: dispatcher.clone(),
            events_tx,
            live: false,
            exhausted: false,
            channels: BTreeMap::new(),
            pending: Vec::new(),
            next_channel_id: 0,
            last_heartbeat_ack: None,
            last_server_time: None,
        };
        let _ = tokio::spawn(actor.run(commands_rx, events_rx).instrument(span));

        Self {
            target,
            dispatcher,
            commands: commands_tx,
        }
    }

    /// Room and viewer this session serves.
    pub fn target(&self) -> &RoomTarget {
        &self.target
    }

    /// Resolve the room and open all three channels.
    ///
    /// Starts a fresh reconnect cycle. Returns `false` if the lookup failed;
    /// no retry is scheduled in that case.
    pub async fn connect(&self) -> bool {
        self.request(Command::Connect).await.unwrap_or(false)
    }

    /// Post an overlay message. Returns `false` unless the overlay channel
    /// is open.
    pub async fn send(&self, payload: DanmakuPayload) -> bool {
        self.request(|reply| Command::Send(payload, reply))
            .await
            .unwrap_or(false)
    }

    /// Close every channel and cancel any pending reconnect. Idempotent.
    pub async fn close(&self) {
        let _ = self.request(Command::Close).await;
    }

    /// Current snapshot.
    pub async fn status(&self) -> SessionStatus {
        self.request(Command::Status).await.unwrap_or_default()
    }

    async fn request<T>(&self, make: impl FnOnce(oneshot::Sender<T>) -> Command) -> Option<T> {
        let (tx, rx) = oneshot::channel();
        self.commands.send(make(tx)).ok()?;
        rx.await.ok()
    }

    // ── Subscriptions ───────────────────────────────────────────────

    /// Shared registry behind the typed helpers.
    pub fn dispatcher(&self) -> &EventDispatcher {
        &self.dispatcher
    }

    /// Register a callback for every event of `kind`.
    pub fn subscribe<F>(&self, kind: EventKind, callback: F) -> SubscriptionId
    where
        F: Fn(&SessionEvent) + Send + Sync + 'static,
    {
        self.dispatcher.subscribe(kind, callback)
    }

    /// Remove a subscription.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.dispatcher.unsubscribe(id)
    }

    /// Overlay content posts.
    pub fn on_overlay_event<F>(&self, callback: F) -> SubscriptionId
    where
        F: Fn(&OverlayEvent) + Send + Sync + 'static,
    {
        self.subscribe(EventKind::Overlay, move |event| {
            if let SessionEvent::Overlay(e) = event {
                callback(e);
            }
        })
    }

    /// Viewer joins.
    pub fn on_user_join<F>(&self, callback: F) -> SubscriptionId
    where
        F: Fn(&OverlayEvent) + Send + Sync + 'static,
    {
        self.subscribe(EventKind::UserJoin, move |event| {
            if let SessionEvent::UserJoin(e) = event {
                callback(e);
            }
        })
    }

    /// Viewer leaves.
    pub fn on_user_leave<F>(&self, callback: F) -> SubscriptionId
    where
        F: Fn(&OverlayEvent) + Send + Sync + 'static,
    {
        self.subscribe(EventKind::UserLeave, move |event| {
            if let SessionEvent::UserLeave(e) = event {
                callback(e);
            }
        })
    }

    /// CDN line updates.
    pub fn on_cdn_info<F>(&self, callback: F) -> SubscriptionId
    where
        F: Fn(&CdnInfo) + Send + Sync + 'static,
    {
        self.subscribe(EventKind::CdnInfo, move |event| {
            if let SessionEvent::CdnInfo(info) = event {
                callback(info);
            }
        })
    }

    /// Lifecycle and failure reports.
    pub fn on_diagnostic<F>(&self, callback: F) -> SubscriptionId
    where
        F: Fn(&Diagnostic) + Send + Sync + 'static,
    {
        self.subscribe(EventKind::Diagnostic, move |event| {
            if let SessionEvent::Diagnostic(d) = event {
                callback(d);
            }
        })
    }
}

impl std::fmt::Debug for RoomSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RoomSession")
            .field("target", &self.target)
            .finish_non_exhaustive()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Actor
// ─────────────────────────────────────────────────────────────────────────────

struct PendingReconnect {
    at: Instant,
    trigger: ChannelKind,
}

struct Actor {
    target: RoomTarget,
    resolver: Arc<dyn ConnectionResolver>,
    connector: Arc<dyn Connector>,
    config: SessionConfig,
    dispatcher: EventDispatcher,
    events_tx: mpsc::UnboundedSender<ChannelEvent>,
    live: bool,
    exhausted: bool,
    channels: BTreeMap<ChannelKind, ChannelConnection>,
    tracker: ReconnectTracker,
    pending: Vec<PendingReconnect>,
    next_channel_id: u64,
    last_heartbeat_ack: Option<DateTime<Utc>>,
    last_server_time: Option<i64>,
}

impl Actor {
    async fn run(
        mut self,
        mut commands: mpsc::UnboundedReceiver<Command>,
        mut events: mpsc::UnboundedReceiver<ChannelEvent>,
    ) {
        loop {
            let deadline = self.pending.iter().map(|p| p.at).min();
            tokio::select! {
                biased;
                command = commands.recv() => match command {
                    Some(command) => self.handle_command(command).await,
                    None => break,
                },
                Some(event) = events.recv() => self.handle_channel_event(event),
                () = sleep_until(deadline) => self.fire_reconnect().await,
            }
        }
        self.close();
        debug!("session actor stopped");
    }

    async fn handle_command(&mut self, command: Command) {
        match command {
            Command::Connect(reply) => {
                let ok = self.connect().await;
                let _ = reply.send(ok);
            }
            Command::Send(payload, reply) => {
                let _ = reply.send(self.send(payload));
            }
            Command::Close(reply) => {
                self.close();
                let _ = reply.send(());
            }
            Command::Status(reply) => {
                let _ = reply.send(self.status());
            }
        }
    }

    // ── Lifecycle ───────────────────────────────────────────────────

    async fn connect(&mut self) -> bool {
        info!(target_room = %self.target, "connecting");
        self.live = true;
        self.exhausted = false;
        self.pending.clear();
        self.tracker.reset_all();
        self.discard_channels();

        let Some(info) = self.resolve().await else {
            self.live = false;
            return false;
        };
        self.open_channels(&info, &ChannelKind::ALL);
        true
    }

    fn close(&mut self) {
        let was_active = self.live || !self.channels.is_empty() || !self.pending.is_empty();
        self.live = false;
        self.pending.clear();
        self.tracker.reset_all();
        self.discard_channels();
        if was_active {
            info!("session closed");
        }
    }

    fn send(&mut self, payload: DanmakuPayload) -> bool {
        let state = self
            .channels
            .get(&ChannelKind::Overlay)
            .map(ChannelConnection::state);
        if state != Some(ChannelState::Open) {
            let reason = match state {
                Some(state) => format!("overlay channel is {state}"),
                None => "overlay channel does not exist".to_string(),
            };
            return self.reject_send(reason);
        }

        let message = ClientMessage::Danmaku { data: payload };
        let sent = self
            .channels
            .get(&ChannelKind::Overlay)
            .is_some_and(|channel| channel.send(&message));
        if !sent {
            return self.reject_send("overlay channel refused the frame".to_string());
        }
        true
    }

    fn reject_send(&self, reason: String) -> bool {
        warn!(%reason, "send rejected");
        self.publish_diagnostic(Diagnostic::SendRejected { reason });
        false
    }

    fn status(&self) -> SessionStatus {
        SessionStatus {
            live: self.live,
            exhausted: self.exhausted,
            channels: self
                .channels
                .values()
                .map(|c| ChannelStatus {
                    kind: c.kind(),
                    id: c.id(),
                    state: c.state(),
                    url: c.url().to_string(),
                    attempts_used: self.tracker.attempts_used(c.kind()),
                })
                .collect(),
            reconnect_pending: !self.pending.is_empty(),
            last_heartbeat_ack: self.last_heartbeat_ack,
            last_server_time: self.last_server_time,
        }
    }

    // ── Channels ────────────────────────────────────────────────────

    async fn resolve(&self) -> Option<ConnectionInfo> {
        match self.resolver.resolve(&self.target).await {
            Ok(info) => Some(info),
            Err(error) => {
                warn!(%error, "connection info lookup failed");
                self.publish_diagnostic(Diagnostic::ResolutionFailed {
                    reason: error.to_string(),
                });
                None
            }
        }
    }

    fn open_channels(&mut self, info: &ConnectionInfo, kinds: &[ChannelKind]) {
        for &kind in kinds {
            if let Some(mut stale) = self.channels.remove(&kind) {
                let _ = stale.close();
            }
            self.next_channel_id += 1;
            let mut channel = ChannelConnection::new(
                ChannelId(self.next_channel_id),
                kind,
                info.server_info.url_for(kind),
                self.events_tx.clone(),
                self.config.channel.clone(),
            );
            let _ = channel.open(Arc::clone(&self.connector));
            let _ = self.channels.insert(kind, channel);
        }
    }

    fn discard_channels(&mut self) {
        for (_, mut channel) in std::mem::take(&mut self.channels) {
            let _ = channel.close();
        }
    }

    fn handle_channel_event(&mut self, event: ChannelEvent) {
        let ChannelEvent {
            channel_id,
            kind,
            body,
        } = event;
        let current = self
            .channels
            .get(&kind)
            .is_some_and(|c| c.id() == channel_id);
        if !current {
            debug!(%kind, %channel_id, "ignoring event from replaced channel");
            return;
        }

        match body {
            ChannelEventBody::Opened => {
                if self.tracker.on_channel_open(kind) {
                    debug!(%kind, "reconnect budget reset");
                }
                self.publish_diagnostic(Diagnostic::ChannelOpened { kind });
            }
            ChannelEventBody::Message(message) => self.route(kind, message),
            ChannelEventBody::Malformed(error) => {
                self.publish_diagnostic(Diagnostic::MalformedMessage {
                    kind,
                    error: error.to_string(),
                });
            }
            ChannelEventBody::TransportError(message) => {
                self.publish_diagnostic(Diagnostic::TransportError { kind, message });
            }
            ChannelEventBody::Closed { reason } => {
                self.publish_diagnostic(Diagnostic::ChannelClosed { kind, reason });
                self.on_unexpected_close(kind);
            }
        }
    }

    fn route(&mut self, kind: ChannelKind, message: InboundMessage) {
        match (kind, message) {
            (ChannelKind::Heartbeat, InboundMessage::Heartbeat(ack)) => {
                debug!(server_time = ?ack.timestamp, "heartbeat acknowledged");
                self.last_heartbeat_ack = Some(Utc::now());
                self.last_server_time = ack.timestamp;
            }
            (ChannelKind::Overlay, InboundMessage::Overlay(event)) => {
                let event = match event.kind {
                    OverlayKind::Content => SessionEvent::Overlay(event),
                    OverlayKind::Join => SessionEvent::UserJoin(event),
                    OverlayKind::Leave => SessionEvent::UserLeave(event),
                };
                let _ = self.dispatcher.publish(&event);
            }
            (ChannelKind::CdnInfo, InboundMessage::CdnInfo(cdn)) => {
                debug!(current = %cdn.current, lines = cdn.lines.len(), "cdn info");
                let _ = self.dispatcher.publish(&SessionEvent::CdnInfo(cdn));
            }
            (_, InboundMessage::Notice(notice)) => match notice.kind {
                NoticeKind::Error => {
                    let message = notice.message.unwrap_or_default();
                    warn!(%kind, notice = %message, "server reported an error");
                    self.publish_diagnostic(Diagnostic::ServerError { kind, message });
                }
                NoticeKind::Success | NoticeKind::Ack | NoticeKind::Pong => {
                    debug!(%kind, notice = notice.kind.wire_name(), message_id = ?notice.message_id, "server notice");
                }
            },
            (_, other) => {
                debug!(%kind, frame_type = other.type_name(), "ignoring frame not handled on this channel");
            }
        }
    }

    // ── Reconnect ───────────────────────────────────────────────────

    fn has_pending_for(&self, kind: ChannelKind) -> bool {
        match self.tracker.scope() {
            ReconnectScope::Session => !self.pending.is_empty(),
            ReconnectScope::Channel => self.pending.iter().any(|p| p.trigger == kind),
        }
    }

    fn on_unexpected_close(&mut self, kind: ChannelKind) {
        if !self.live {
            return;
        }
        if self.has_pending_for(kind) {
            debug!(%kind, "reconnect already scheduled");
            return;
        }

        match self.tracker.next_attempt(kind) {
            Some(scheduled) => {
                #[allow(clippy::cast_possible_truncation)]
                let delay_ms = scheduled.delay.as_millis() as u64;
                info!(%kind, attempt = scheduled.attempt, delay_ms, "reconnect scheduled");
                self.pending.push(PendingReconnect {
                    at: Instant::now() + scheduled.delay,
                    trigger: kind,
                });
                self.publish_diagnostic(Diagnostic::ReconnectScheduled {
                    attempt: scheduled.attempt,
                    delay: scheduled.delay,
                    trigger: kind,
                });
            }
            None => {
                let attempts = self.tracker.attempts_used(kind);
                warn!(%kind, attempts, "reconnect attempts exhausted");
                self.live = false;
                self.exhausted = true;
                self.pending.clear();
                self.discard_channels();
                self.publish_diagnostic(Diagnostic::ReconnectExhausted { attempts });
            }
        }
    }

    async fn fire_reconnect(&mut self) {
        let now = Instant::now();
        let Some(index) = self
            .pending
            .iter()
            .enumerate()
            .filter(|(_, p)| p.at <= now)
            .min_by_key(|(_, p)| p.at)
            .map(|(i, _)| i)
        else {
            return;
        };
        let trigger = self.pending.remove(index).trigger;
        if !self.live {
            return;
        }

        let kinds: Vec<ChannelKind> = match self.tracker.scope() {
            ReconnectScope::Session => ChannelKind::ALL.to_vec(),
            ReconnectScope::Channel => vec![trigger],
        };
        info!(%trigger, attempt = self.tracker.attempts_used(trigger), "reconnecting");

        for kind in &kinds {
            if let Some(mut stale) = self.channels.remove(kind) {
                let _ = stale.close();
            }
        }

        match self.resolve().await {
            Some(info) => self.open_channels(&info, &kinds),
            // a failed lookup inside a cycle counts as another failed attempt
            None => self.on_unexpected_close(trigger),
        }
    }

    fn publish_diagnostic(&self, diagnostic: Diagnostic) {
        let _ = self.dispatcher.publish(&SessionEvent::Diagnostic(diagnostic));
    }
}

async fn sleep_until(deadline: Option<Instant>) {
    match deadline {
        Some(at) => tokio::time::sleep_until(at).await,
        None => std::future::pending().await,
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
