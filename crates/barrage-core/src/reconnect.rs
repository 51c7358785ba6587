//! Reconnect policy and attempt bookkeeping.
//!
//! Delays grow geometrically: attempt `n` (1-based) waits
//! `base_delay_ms * growth_factor^(n-1)`. With the defaults that is
//! 2000, 3000, 4500, 6750 and 10125 ms, after which the budget is spent.
//!
//! - [`ReconnectPolicy`]: parameters and the delay formula
//! - [`ReconnectScope`]: one shared budget per session, or one per channel
//! - [`ReconnectTracker`]: counts attempts and decides when to reset
//!
//! Sync only. Timers live in the client crate.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::channel::ChannelKind;

// ─────────────────────────────────────────────────────────────────────────────
// Policy
// ─────────────────────────────────────────────────────────────────────────────

/// Default delay before the first attempt.
pub const DEFAULT_BASE_DELAY_MS: u64 = 2000;
/// Default per-attempt growth.
pub const DEFAULT_GROWTH_FACTOR: f64 = 1.5;
/// Default attempt budget.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 5;

fn default_base_delay_ms() -> u64 {
    DEFAULT_BASE_DELAY_MS
}
fn default_growth_factor() -> f64 {
    DEFAULT_GROWTH_FACTOR
}
fn default_max_attempts() -> u32 {
    DEFAULT_MAX_ATTEMPTS
}

/// Reconnect parameters.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReconnectPolicy {
    /// Delay before attempt 1 in ms (default: 2000).
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,
    /// Multiplier applied per further attempt (default: 1.5).
    #[serde(default = "default_growth_factor")]
    pub growth_factor: f64,
    /// Attempts allowed before giving up (default: 5).
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            base_delay_ms: DEFAULT_BASE_DELAY_MS,
            growth_factor: DEFAULT_GROWTH_FACTOR,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
        }
    }
}

impl ReconnectPolicy {
    /// Delay before the 1-based `attempt`. `0` is treated as `1`.
    #[must_use]
    #[allow(
        clippy::cast_precision_loss,
        clippy::cast_possible_truncation,
        clippy::cast_sign_loss
    )]
    pub fn delay(&self, attempt: u32) -> Duration {
        let exponent = i32::try_from(attempt.saturating_sub(1)).unwrap_or(i32::MAX);
        let ms = (self.base_delay_ms as f64) * self.growth_factor.powi(exponent);
        Duration::from_millis(ms.round().max(0.0) as u64)
    }

    /// Whether another attempt is allowed after `attempts_used`.
    #[must_use]
    pub const fn should_retry(&self, attempts_used: u32) -> bool {
        attempts_used < self.max_attempts
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Scope
// ─────────────────────────────────────────────────────────────────────────────

/// How reconnect budgets are shared between channels.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ReconnectScope {
    /// One budget for the session. Any unexpected close rebuilds every
    /// channel; only the overlay channel opening resets the budget.
    #[default]
    Session,
    /// One budget per channel. Only the channel that closed is rebuilt, and
    /// its own open resets its budget.
    Channel,
}

impl fmt::Display for ReconnectScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Session => write!(f, "session"),
            Self::Channel => write!(f, "channel"),
        }
    }
}

impl FromStr for ReconnectScope {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "session" => Ok(Self::Session),
            "channel" => Ok(Self::Channel),
            other => Err(format!("unknown reconnect scope: {other}")),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tracker
// ─────────────────────────────────────────────────────────────────────────────

/// Attempts consumed in one budget.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ReconnectState {
    /// Attempts scheduled since the last reset.
    pub attempts_used: u32,
}

/// A reconnect that has been granted a slot in the budget.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ScheduledAttempt {
    /// 1-based attempt number.
    pub attempt: u32,
    /// Wait before running it.
    pub delay: Duration,
}

/// Reconnect budget bookkeeping for one session.
#[derive(Clone, Debug)]
pub struct ReconnectTracker {
    policy: ReconnectPolicy,
    scope: ReconnectScope,
    session: ReconnectState,
    channels: HashMap<ChannelKind, ReconnectState>,
}

impl ReconnectTracker {
    /// Fresh tracker with nothing used.
    #[must_use]
    pub fn new(policy: ReconnectPolicy, scope: ReconnectScope) -> Self {
        Self {
            policy,
            scope,
            session: ReconnectState::default(),
            channels: HashMap::new(),
        }
    }

    /// Policy in use.
    #[must_use]
    pub fn policy(&self) -> &ReconnectPolicy {
        &self.policy
    }

    /// Scope in use.
    #[must_use]
    pub fn scope(&self) -> ReconnectScope {
        self.scope
    }

    fn slot(&mut self, kind: ChannelKind) -> &mut ReconnectState {
        match self.scope {
            ReconnectScope::Session => &mut self.session,
            ReconnectScope::Channel => self.channels.entry(kind).or_default(),
        }
    }

    /// Claim the next attempt for a close on `kind`.
    ///
    /// Returns `None` once the budget is spent; the counter does not move
    /// past `max_attempts`.
    pub fn next_attempt(&mut self, kind: ChannelKind) -> Option<ScheduledAttempt> {
        let policy = self.policy.clone();
        let state = self.slot(kind);
        if !policy.should_retry(state.attempts_used) {
            return None;
        }
        state.attempts_used += 1;
        let attempt = state.attempts_used;
        Some(ScheduledAttempt {
            attempt,
            delay: policy.delay(attempt),
        })
    }

    /// Record that `kind` opened. Returns whether a budget was reset.
    pub fn on_channel_open(&mut self, kind: ChannelKind) -> bool {
        match self.scope {
            ReconnectScope::Session if kind == ChannelKind::Overlay => {
                self.session = ReconnectState::default();
                true
            }
            ReconnectScope::Session => false,
            ReconnectScope::Channel => {
                let _ = self.channels.insert(kind, ReconnectState::default());
                true
            }
        }
    }

    /// Clear every budget. Used when the caller starts a fresh connect.
    pub fn reset_all(&mut self) {
        self.session = ReconnectState::default();
        self.channels.clear();
    }

    /// Attempts used in the budget that governs `kind`.
    #[must_use]
    pub fn attempts_used(&self, kind: ChannelKind) -> u32 {
        match self.scope {
            ReconnectScope::Session => self.session.attempts_used,
            ReconnectScope::Channel => self
                .channels
                .get(&kind)
                .map_or(0, |state| state.attempts_used),
        }
    }

    /// Whether the budget that governs `kind` is spent.
    #[must_use]
    pub fn is_exhausted(&self, kind: ChannelKind) -> bool {
        !self.policy.should_retry(self.attempts_used(kind))
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
