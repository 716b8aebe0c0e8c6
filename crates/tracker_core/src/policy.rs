//! Reconnection policy state machine.
//!
//! Pure bookkeeping: the connection driver reports what happened and the
//! state machine answers whether and when to try again. Every scheduled
//! retry carries a generation token; only the latest generation is live.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::connection::CloseReason;

pub const DEFAULT_MAX_ATTEMPTS: u32 = 5;
pub const DEFAULT_RECONNECT_INTERVAL_MS: u64 = 3000;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReconnectPolicy {
    pub max_attempts: u32,
    pub interval_ms: u64,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            interval_ms: DEFAULT_RECONNECT_INTERVAL_MS,
        }
    }
}

impl ReconnectPolicy {
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }
}

/// How a connection ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseKind {
    /// Client-initiated close.
    Requested,
    /// Normal close frame from the producer.
    RemoteClean,
    /// Connect failure, transport error or abnormal close.
    Abnormal,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconnectDecision {
    Retry {
        attempt: u32,
        delay: Duration,
        generation: u64,
    },
    Stop(CloseReason),
}

#[derive(Debug, Clone)]
pub struct ReconnectState {
    policy: ReconnectPolicy,
    attempts: u32,
    generation: u64,
    stopped: bool,
}

impl ReconnectState {
    pub fn new(policy: ReconnectPolicy) -> Self {
        Self {
            policy,
            attempts: 0,
            generation: 0,
            stopped: false,
        }
    }

    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped
    }

    /// The producer delivered a well-formed message for this task, so the
    /// attempt budget refills. Opening a connection alone does not refill it.
    pub fn on_message(&mut self) {
        self.attempts = 0;
    }

    pub fn on_closed(&mut self, kind: CloseKind) -> ReconnectDecision {
        if self.stopped {
            return ReconnectDecision::Stop(CloseReason::Requested);
        }
        match kind {
            CloseKind::Requested => {
                self.cancel();
                ReconnectDecision::Stop(CloseReason::Requested)
            }
            CloseKind::RemoteClean => {
                self.cancel();
                ReconnectDecision::Stop(CloseReason::RemoteClosed)
            }
            CloseKind::Abnormal if self.attempts < self.policy.max_attempts => {
                self.attempts += 1;
                self.generation += 1;
                ReconnectDecision::Retry {
                    attempt: self.attempts,
                    delay: self.policy.interval(),
                    generation: self.generation,
                }
            }
            CloseKind::Abnormal => {
                self.cancel();
                ReconnectDecision::Stop(CloseReason::AttemptsExhausted)
            }
        }
    }

    /// Stop for good and invalidate any outstanding retry.
    pub fn cancel(&mut self) -> u64 {
        self.stopped = true;
        self.generation += 1;
        self.generation
    }

    /// Whether a retry scheduled with `generation` may still act.
    pub fn is_current(&self, generation: u64) -> bool {
        !self.stopped && generation == self.generation
    }
}
