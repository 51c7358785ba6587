use std::sync::Arc;

use barrage_core::{ChannelKind, ChannelState, ClientMessage, MessageError, parse_inbound};
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::time::{Instant, Interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::{ChannelConfig, ChannelEvent, ChannelEventBody, ChannelId, EventSender, transition};
use crate::transport::{Connector, Frame, Transport, TransportError};

/// Task body behind a [`ChannelConnection`](super::ChannelConnection).
///
/// Owns the transport. Exits when cancelled (owner close, no event) or when
/// the connection is lost (reported as `Closed`).
pub(super) struct Driver {
    pub(super) id: ChannelId,
    pub(super) kind: ChannelKind,
    pub(super) url: String,
    pub(super) config: ChannelConfig,
    pub(super) state: Arc<Mutex<ChannelState>>,
    pub(super) events: EventSender,
    pub(super) cancel: CancellationToken,
    pub(super) outbound: mpsc::UnboundedReceiver<String>,
    pub(super) connector: Arc<dyn Connector>,
}

impl Driver {
    pub(super) async fn run(mut self) {
        let connect = tokio::time::timeout(
            self.config.connect_timeout,
            self.connector.connect(&self.url),
        );
        let connected = tokio::select! {
            biased;
            () = self.cancel.cancelled() => return,
            result = connect => result,
        };

        let mut transport = match connected {
            Ok(Ok(transport)) => transport,
            Ok(Err(error)) => {
                self.finish(error.to_string());
                return;
            }
            Err(_) => {
                #[allow(clippy::cast_possible_truncation)]
                let timeout_ms = self.config.connect_timeout.as_millis() as u64;
                let error = TransportError::ConnectTimeout {
                    url: self.url.clone(),
                    timeout_ms,
                };
                self.finish(error.to_string());
                return;
            }
        };

        if !transition(&self.state, ChannelState::Open) {
            // closed by the owner while the handshake was in flight
            transport.close().await;
            return;
        }
        info!(kind = %self.kind, channel_id = %self.id, "channel open");
        self.emit(ChannelEventBody::Opened);

        let mut ticker = (self.kind == ChannelKind::Heartbeat).then(|| {
            let period = self.config.heartbeat_interval;
            let mut interval = tokio::time::interval_at(Instant::now() + period, period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            interval
        });

        let reason = loop {
            tokio::select! {
                biased;
                () = self.cancel.cancelled() => {
                    transport.close().await;
                    return;
                }
                Some(text) = self.outbound.recv() => {
                    if let Err(error) = self.write(&mut *transport, text).await {
                        break error;
                    }
                }
                () = tick(ticker.as_mut()) => {
                    match ClientMessage::Heartbeat.encode() {
                        Ok(text) => {
                            debug!(channel_id = %self.id, "heartbeat tick");
                            if let Err(error) = self.write(&mut *transport, text).await {
                                break error;
                            }
                        }
                        Err(error) => warn!(%error, "failed to encode heartbeat"),
                    }
                }
                frame = transport.next_frame() => match frame {
                    Some(Ok(Frame::Text(text))) => self.on_text(&text),
                    Some(Ok(Frame::Binary(bytes))) => {
                        self.on_malformed(MessageError::Binary { len: bytes.len() });
                    }
                    Some(Ok(Frame::Close(info))) => {
                        break match info {
                            Some(info) => format!("closed by peer ({} {})", info.code, info.reason),
                            None => "closed by peer".to_string(),
                        };
                    }
                    Some(Err(error)) => {
                        let message = error.to_string();
                        self.emit(ChannelEventBody::TransportError(message.clone()));
                        break message;
                    }
                    None => break "stream ended".to_string(),
                },
            }
        };

        transport.close().await;
        self.finish(reason);
    }

    async fn write(&self, transport: &mut dyn Transport, text: String) -> Result<(), String> {
        match transport.send_text(text).await {
            Ok(()) => Ok(()),
            Err(error) => {
                let message = error.to_string();
                self.emit(ChannelEventBody::TransportError(message.clone()));
                Err(message)
            }
        }
    }

    fn on_text(&self, text: &str) {
        match parse_inbound(text) {
            Ok(message) => {
                debug!(kind = %self.kind, channel_id = %self.id, frame_type = message.type_name(), "frame");
                self.emit(ChannelEventBody::Message(message));
            }
            Err(error) => self.on_malformed(error),
        }
    }

    fn on_malformed(&self, error: MessageError) {
        warn!(kind = %self.kind, channel_id = %self.id, %error, "dropping malformed frame");
        self.emit(ChannelEventBody::Malformed(error));
    }

    /// Enter `Closed` and report it, unless the owner got there first.
    fn finish(&self, reason: String) {
        if transition(&self.state, ChannelState::Closed) {
            warn!(kind = %self.kind, channel_id = %self.id, %reason, "channel closed unexpectedly");
            self.emit(ChannelEventBody::Closed { reason });
        }
    }

    fn emit(&self, body: ChannelEventBody) {
        let _ = self.events.send(ChannelEvent {
            channel_id: self.id,
            kind: self.kind,
            body,
        });
    }
}

async fn tick(ticker: Option<&mut Interval>) {
    match ticker {
        Some(interval) => {
            let _ = interval.tick().await;
        }
        None => std::future::pending().await,
    }
}
