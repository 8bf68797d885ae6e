// SPDX-License-Identifier: Apache-2.0
//! Wall-clock time source.
//!
//! Wall-clock is consulted only for cron/schedule triggers and the `now`
//! transform — this engine is not itself a real-time clock source.
//! Abstracting it behind a trait, rather than calling `chrono::Utc::now()`
//! directly, keeps cron/schedule logic testable without sleeping.

use chrono::{DateTime, Utc};

/// A source of wall-clock time.
pub trait Clock: Send + Sync {
    /// Current wall-clock time.
    fn now(&self) -> DateTime<Utc>;

    /// Current wall-clock time as milliseconds since the Unix epoch.
    fn now_ms(&self) -> i64 {
        self.now().timestamp_millis()
    }
}

/// Default clock backed by the system clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Test double returning a fixed, settable instant.
#[derive(Debug, Clone)]
pub struct FixedClock {
    instant: std::sync::Arc<std::sync::Mutex<DateTime<Utc>>>,
}

impl FixedClock {
    /// Constructs a fixed clock starting at `instant`.
    #[must_use]
    pub fn new(instant: DateTime<Utc>) -> Self {
        Self {
            instant: std::sync::Arc::new(std::sync::Mutex::new(instant)),
        }
    }

    /// Advances the clock by `duration`.
    ///
    /// # Panics
    /// Panics if the internal mutex is poisoned (only possible if a prior
    /// holder panicked while holding the lock).
    pub fn advance(&self, duration: chrono::Duration) {
        #[allow(clippy::unwrap_used)]
        let mut guard = self.instant.lock().unwrap();
        *guard += duration;
    }
}

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        #[allow(clippy::unwrap_used)]
        *self.instant.lock().unwrap()
    }
}
