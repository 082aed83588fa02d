use std::fmt;
use std::time::Duration;

use serde_json::{json, Value};

pub const DEFAULT_INTERVAL_MS: u64 = 1_000;
pub const DEFAULT_LIVENESS: u32 = 3;
pub const MIN_INTERVAL_MS: u64 = 100;
pub const MAX_INTERVAL_MS: u64 = 60_000;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct HeartbeatConfig {
    pub interval_ms: u64,
    pub liveness: u32,
}

impl Default for HeartbeatConfig {
    fn default() -> Self {
        Self {
            interval_ms: DEFAULT_INTERVAL_MS,
            liveness: DEFAULT_LIVENESS,
        }
    }
}

impl HeartbeatConfig {
    pub fn liveness_window_ms(&self) -> u64 {
        self.interval_ms.saturating_mul(u64::from(self.liveness))
    }
}

#[derive(Debug, PartialEq, Eq)]
pub enum HeartbeatError {
    InvalidInterval { provided_ms: u64 },
    InvalidLiveness { provided: u32 },
}

impl fmt::Display for HeartbeatError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidInterval { provided_ms } => write!(
                f,
                "heartbeat interval must be between {MIN_INTERVAL_MS}ms and {MAX_INTERVAL_MS}ms, got {provided_ms}ms"
            ),
            Self::InvalidLiveness { provided } => {
                write!(f, "heartbeat liveness must be at least 1, got {provided}")
            }
        }
    }
}

impl std::error::Error for HeartbeatError {}

#[derive(Clone, Debug)]
pub struct HeartbeatSchedule {
    config: HeartbeatConfig,
    next_at_ms: u64,
}

impl HeartbeatSchedule {
    pub fn new(config: HeartbeatConfig, now_ms: u64) -> Result<Self, HeartbeatError> {
        Self::validate(config)?;

        Ok(Self {
            config,
            next_at_ms: now_ms.saturating_add(config.interval_ms),
        })
    }

    // Due only once the clock is strictly past the scheduled instant.
    pub fn is_due(&self, now_ms: u64) -> bool {
        now_ms > self.next_at_ms
    }

    pub fn reschedule(&mut self, now_ms: u64) {
        self.next_at_ms = now_ms.saturating_add(self.config.interval_ms);
    }

    #[cfg(test)]
    pub fn next_at_ms(&self) -> u64 {
        self.next_at_ms
    }

    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.config.interval_ms)
    }

    pub fn liveness_window_ms(&self) -> u64 {
        self.config.liveness_window_ms()
    }

    pub fn metadata_payload(&self) -> Value {
        json!({
            "interval_ms": self.config.interval_ms,
            "liveness": self.config.liveness,
            "liveness_window_ms": self.config.liveness_window_ms()
        })
    }

    fn validate(config: HeartbeatConfig) -> Result<(), HeartbeatError> {
        if !(MIN_INTERVAL_MS..=MAX_INTERVAL_MS).contains(&config.interval_ms) {
            return Err(HeartbeatError::InvalidInterval {
                provided_ms: config.interval_ms,
            });
        }
        if config.liveness == 0 {
            return Err(HeartbeatError::InvalidLiveness {
                provided: config.liveness,
            });
        }

        Ok(())
    }
}
