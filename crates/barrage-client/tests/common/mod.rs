//! Shared fixtures for the integration tests.

#![allow(dead_code)]

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use barrage_client::{
    ConnectionResolver, Diagnostic, EventKind, ResolveError, RoomSession, SessionEvent,
    SessionStatus,
};
use barrage_core::{ConnectionInfo, RoomTarget, ServerInfo};
use parking_lot::Mutex;

/// Resolver returning a fixed answer and counting calls.
pub struct FakeResolver {
    answer: Mutex<Result<ConnectionInfo, String>>,
    calls: AtomicUsize,
}

impl FakeResolver {
    pub fn ok(info: ConnectionInfo) -> Arc<Self> {
        Arc::new(Self {
            answer: Mutex::new(Ok(info)),
            calls: AtomicUsize::new(0),
        })
    }

    pub fn failing(reason: &str) -> Arc<Self> {
        Arc::new(Self {
            answer: Mutex::new(Err(reason.to_string())),
            calls: AtomicUsize::new(0),
        })
    }

    pub fn set_failing(&self, reason: &str) {
        *self.answer.lock() = Err(reason.to_string());
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ConnectionResolver for FakeResolver {
    async fn resolve(&self, _target: &RoomTarget) -> Result<ConnectionInfo, ResolveError> {
        let _ = self.calls.fetch_add(1, Ordering::SeqCst);
        self.answer.lock().clone().map_err(ResolveError::Rejected)
    }
}

/// Connection info with the given channel URLs.
pub fn info(heartbeat: &str, danmaku: &str, cdn: &str) -> ConnectionInfo {
    ConnectionInfo {
        room_id: Some("1001".into()),
        server_info: ServerInfo {
            heartbeat_url: heartbeat.into(),
            danmaku_url: danmaku.into(),
            cdn_url: cdn.into(),
        },
        token: Some("t".into()),
        expire_at: None,
        region: None,
        user_id: Some("42".into()),
    }
}

/// In-memory URLs; `MemoryConnector` rules match on the path word.
pub fn memory_info() -> ConnectionInfo {
    info("mem://heartbeat/1001", "mem://danmaku/1001", "mem://cdn/1001")
}

pub fn target() -> RoomTarget {
    RoomTarget::new("1001").with_user("42")
}

/// Records every published event.
#[derive(Clone, Default)]
pub struct Recorder {
    events: Arc<Mutex<Vec<SessionEvent>>>,
}

impl Recorder {
    pub fn attach(session: &RoomSession) -> Self {
        let recorder = Self::default();
        for kind in [
            EventKind::Overlay,
            EventKind::UserJoin,
            EventKind::UserLeave,
            EventKind::CdnInfo,
            EventKind::Diagnostic,
        ] {
            let events = Arc::clone(&recorder.events);
            let _ = session.subscribe(kind, move |event| events.lock().push(event.clone()));
        }
        recorder
    }

    pub fn events(&self) -> Vec<SessionEvent> {
        self.events.lock().clone()
    }

    pub fn count(&self, kind: EventKind) -> usize {
        self.events.lock().iter().filter(|e| e.kind() == kind).count()
    }

    pub fn diagnostics(&self) -> Vec<Diagnostic> {
        self.events
            .lock()
            .iter()
            .filter_map(|e| match e {
                SessionEvent::Diagnostic(d) => Some(d.clone()),
                _ => None,
            })
            .collect()
    }

    pub fn has_diagnostic(&self, pred: impl Fn(&Diagnostic) -> bool) -> bool {
        self.diagnostics().iter().any(pred)
    }

    /// `(attempt, delay_ms)` of every scheduled reconnect.
    pub fn scheduled(&self) -> Vec<(u32, u128)> {
        self.diagnostics()
            .iter()
            .filter_map(|d| match d {
                Diagnostic::ReconnectScheduled { attempt, delay, .. } => {
                    Some((*attempt, delay.as_millis()))
                }
                _ => None,
            })
            .collect()
    }
}

/// Poll `cond` every `step` until it holds, up to `max_steps` times.
pub async fn wait_for<F>(step: Duration, max_steps: usize, mut cond: F) -> bool
where
    F: FnMut() -> bool,
{
    for _ in 0..max_steps {
        if cond() {
            return true;
        }
        tokio::time::sleep(step).await;
    }
    cond()
}

/// Poll the session status every `step` until `cond` holds.
pub async fn wait_for_status<F>(
    session: &RoomSession,
    step: Duration,
    max_steps: usize,
    cond: F,
) -> SessionStatus
where
    F: Fn(&SessionStatus) -> bool,
{
    let mut status = session.status().await;
    for _ in 0..max_steps {
        if cond(&status) {
            break;
        }
        tokio::time::sleep(step).await;
        status = session.status().await;
    }
    status
}
