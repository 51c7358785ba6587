use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::mpsc;

use super::{CloseInfo, Connector, Frame, Transport, TransportError};

/// What [`MemoryConnector::connect`] does.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub enum ConnectBehavior {
    /// Hand out a connected transport.
    #[default]
    Accept,
    /// Fail immediately.
    Refuse,
    /// Never complete.
    Hang,
}

struct Rule {
    url_contains: String,
    behavior: ConnectBehavior,
}

struct Inner {
    peers: mpsc::UnboundedSender<MemoryPeer>,
    connects: AtomicUsize,
    urls: Mutex<Vec<String>>,
    default_behavior: Mutex<ConnectBehavior>,
    rules: Mutex<Vec<Rule>>,
}

/// In-process connector.
///
/// Every accepted connect yields a [`MemoryPeer`] on the receiver returned
/// by [`MemoryConnector::new`]. The peer plays the server.
#[derive(Clone)]
pub struct MemoryConnector {
    inner: Arc<Inner>,
}

impl MemoryConnector {
    /// Connector plus the stream of server-side peers.
    pub fn new() -> (Self, mpsc::UnboundedReceiver<MemoryPeer>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let inner = Inner {
            peers: tx,
            connects: AtomicUsize::new(0),
            urls: Mutex::new(Vec::new()),
            default_behavior: Mutex::new(ConnectBehavior::Accept),
            rules: Mutex::new(Vec::new()),
        };
        (
            Self {
                inner: Arc::new(inner),
            },
            rx,
        )
    }

    /// Behavior for URLs no rule matches.
    pub fn set_behavior(&self, behavior: ConnectBehavior) {
        *self.inner.default_behavior.lock() = behavior;
    }

    /// Behavior for URLs containing `pattern`. Later rules win.
    pub fn set_behavior_for(&self, pattern: impl Into<String>, behavior: ConnectBehavior) {
        self.inner.rules.lock().push(Rule {
            url_contains: pattern.into(),
            behavior,
        });
    }

    /// Connect calls made so far, accepted or not.
    pub fn connect_count(&self) -> usize {
        self.inner.connects.load(Ordering::SeqCst)
    }

    /// URLs passed to `connect`, in call order.
    pub fn connected_urls(&self) -> Vec<String> {
        self.inner.urls.lock().clone()
    }

    fn behavior_for(&self, url: &str) -> ConnectBehavior {
        self.inner
            .rules
            .lock()
            .iter()
            .rev()
            .find(|rule| url.contains(&rule.url_contains))
            .map_or_else(
                || self.inner.default_behavior.lock().clone(),
                |rule| rule.behavior.clone(),
            )
    }
}

#[async_trait]
impl Connector for MemoryConnector {
    async fn connect(&self, url: &str) -> Result<Box<dyn Transport>, TransportError> {
        let _ = self.inner.connects.fetch_add(1, Ordering::SeqCst);
        self.inner.urls.lock().push(url.to_owned());

        match self.behavior_for(url) {
            ConnectBehavior::Accept => {}
            ConnectBehavior::Refuse => {
                return Err(TransportError::Connect {
                    url: url.to_owned(),
                    reason: "connection refused".into(),
                });
            }
            ConnectBehavior::Hang => std::future::pending::<()>().await,
        }

        let (to_client, inbound) = mpsc::unbounded_channel();
        let (outbound, from_client) = mpsc::unbounded_channel();
        let peer = MemoryPeer {
            url: url.to_owned(),
            to_client,
            from_client,
        };
        self.inner
            .peers
            .send(peer)
            .map_err(|_| TransportError::Connect {
                url: url.to_owned(),
                reason: "peer receiver dropped".into(),
            })?;
        Ok(Box::new(MemoryTransport {
            inbound,
            outbound: Some(outbound),
        }))
    }
}

/// Server side of an in-memory connection.
///
/// Dropping the peer ends the client's stream, which the client treats as an
/// unexpected close.
pub struct MemoryPeer {
    url: String,
    to_client: mpsc::UnboundedSender<Result<Frame, TransportError>>,
    from_client: mpsc::UnboundedReceiver<String>,
}

impl MemoryPeer {
    /// URL the client connected to.
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Push a text frame to the client. Returns `false` once the client is gone.
    pub fn send_text(&self, text: impl Into<String>) -> bool {
        self.to_client.send(Ok(Frame::Text(text.into()))).is_ok()
    }

    /// Push a binary frame to the client.
    pub fn send_binary(&self, bytes: Vec<u8>) -> bool {
        self.to_client.send(Ok(Frame::Binary(bytes))).is_ok()
    }

    /// Start a close handshake from the server side.
    pub fn close(&self, code: u16, reason: &str) -> bool {
        self.to_client
            .send(Ok(Frame::Close(Some(CloseInfo {
                code,
                reason: reason.to_owned(),
            }))))
            .is_ok()
    }

    /// Inject a transport error.
    pub fn fail(&self, message: &str) -> bool {
        self.to_client
            .send(Err(TransportError::Io(message.to_owned())))
            .is_ok()
    }

    /// Next text frame the client sent. `None` once the client closed.
    pub async fn recv(&mut self) -> Option<String> {
        self.from_client.recv().await
    }

    /// A frame the client already sent, without waiting.
    pub fn try_recv(&mut self) -> Option<String> {
        self.from_client.try_recv().ok()
    }

    /// Whether the client has closed its side.
    pub fn is_client_closed(&self) -> bool {
        self.from_client.is_closed()
    }
}

struct MemoryTransport {
    inbound: mpsc::UnboundedReceiver<Result<Frame, TransportError>>,
    outbound: Option<mpsc::UnboundedSender<String>>,
}

#[async_trait]
impl Transport for MemoryTransport {
    async fn send_text(&mut self, text: String) -> Result<(), TransportError> {
        let sender = self.outbound.as_ref().ok_or(TransportError::Closed)?;
        sender.send(text).map_err(|_| TransportError::Closed)
    }

    async fn next_frame(&mut self) -> Option<Result<Frame, TransportError>> {
        self.inbound.recv().await
    }

    async fn close(&mut self) {
        self.outbound = None;
        self.inbound.close();
    }
}
