use chrono::{DateTime, Duration, Utc};
use std::sync::{Arc, Mutex as StdMutex};
use thiserror::Error;
use tokio::sync::{Mutex, MutexGuard};

/// Source of the current time, injectable so cooldowns can be tested.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// A clock that only moves when told to.
#[derive(Debug, Clone)]
pub struct ManualClock {
    now: Arc<StdMutex<DateTime<Utc>>>,
}

impl ManualClock {
    pub fn new(start: DateTime<Utc>) -> Self {
        Self { now: Arc::new(StdMutex::new(start)) }
    }

    pub fn advance(&self, by: Duration) {
        let mut now = self.now.lock().unwrap_or_else(|e| e.into_inner());
        *now += by;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("cooling period, {remaining_secs}s remaining")]
pub struct CooldownActive {
    pub remaining_secs: i64,
}

/// Allows one invocation per window, process-wide.
///
/// Holding a [`CooldownPermit`] serializes callers, so the check, the work
/// and the timestamp update happen as one step.
pub struct Cooldown {
    window: Duration,
    clock: Arc<dyn Clock>,
    last_call: Mutex<Option<DateTime<Utc>>>,
}

impl Cooldown {
    pub fn new(window: Duration, clock: Arc<dyn Clock>) -> Self {
        Self { window, clock, last_call: Mutex::new(None) }
    }

    pub async fn acquire(&self) -> Result<CooldownPermit<'_>, CooldownActive> {
        let guard = self.last_call.lock().await;
        let now = self.clock.now();

        if let Some(last) = *guard {
            let elapsed = now - last;
            if elapsed < self.window {
                let remaining_ms = (self.window - elapsed).num_milliseconds();
                return Err(CooldownActive { remaining_secs: remaining_ms / 1000 });
            }
        }

        Ok(CooldownPermit { guard, started_at: now })
    }
}

/// Exclusive access to the cooldown until dropped.
pub struct CooldownPermit<'a> {
    guard: MutexGuard<'a, Option<DateTime<Utc>>>,
    started_at: DateTime<Utc>,
}

impl CooldownPermit<'_> {
    /// Starts the next window at the moment this permit was granted.
    pub fn record(mut self) {
        *self.guard = Some(self.started_at);
    }
}
