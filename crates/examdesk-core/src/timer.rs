//! Countdown timer synchronized with the server-issued start instant.
//!
//! [`Countdown`] is the pure state machine: it decrements once per tick but
//! never reports more time than `duration - (now - start)` allows, so a
//! suspended process or a slow tick cannot extend the deadline.
//! [`CountdownTimer`] drives it from a tokio interval and reports events to a
//! [`TimerListener`].

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};

use crate::sync::lock;
use crate::time::Clock;

/// Remaining seconds at which the one-shot warning fires.
pub const DEFAULT_WARNING_THRESHOLD_SECS: u64 = 300;

const TICK: Duration = Duration::from_secs(1);

/// Seconds left before the deadline: `max(0, duration*60 - elapsed)`.
///
/// A start instant in the future (clock skew) never yields more than the
/// full duration.
pub fn remaining_seconds(start: DateTime<Utc>, duration_minutes: u32, now: DateTime<Utc>) -> u64 {
    let total_ms = i64::from(duration_minutes) * 60_000;
    let elapsed_ms = (now - start).num_milliseconds().max(0);
    let left_ms = (total_ms - elapsed_ms).max(0);
    (left_ms / 1000) as u64
}

/// Render remaining time as `H:MM:SS`, or `M:SS` under an hour.
pub fn format_remaining(seconds: u64) -> String {
    let hours = seconds / 3600;
    let minutes = (seconds % 3600) / 60;
    let secs = seconds % 60;
    if hours > 0 {
        format!("{hours}:{minutes:02}:{secs:02}")
    } else {
        format!("{minutes}:{secs:02}")
    }
}

/// What a single tick produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TickOutcome {
    pub remaining: u64,
    /// First tick at or below the warning threshold.
    pub warning: bool,
    /// Remaining time reached zero on this tick.
    pub expired: bool,
}

/// Pure countdown state.
#[derive(Debug, Clone)]
pub struct Countdown {
    start: DateTime<Utc>,
    duration_minutes: u32,
    remaining: u64,
    warning_threshold: u64,
    warning_issued: bool,
}

impl Countdown {
    /// Derive the countdown from the server start instant.
    pub fn new(
        start: DateTime<Utc>,
        duration_minutes: u32,
        now: DateTime<Utc>,
        warning_threshold: u64,
    ) -> Self {
        Self {
            start,
            duration_minutes,
            remaining: remaining_seconds(start, duration_minutes, now),
            warning_threshold,
            warning_issued: false,
        }
    }

    pub fn remaining(&self) -> u64 {
        self.remaining
    }

    pub fn warning_issued(&self) -> bool {
        self.warning_issued
    }

    pub fn is_expired(&self) -> bool {
        self.remaining == 0
    }

    /// Advance by one second.
    ///
    /// Returns `None` once the countdown has already expired.
    pub fn tick(&mut self, now: DateTime<Utc>) -> Option<TickOutcome> {
        if self.is_expired() {
            return None;
        }
        let bound = remaining_seconds(self.start, self.duration_minutes, now);
        self.remaining = self.remaining.saturating_sub(1).min(bound);

        let warning = !self.warning_issued && self.remaining <= self.warning_threshold;
        if warning {
            self.warning_issued = true;
        }
        Some(TickOutcome {
            remaining: self.remaining,
            warning,
            expired: self.remaining == 0,
        })
    }
}

/// Receives countdown events. Called from the timer task.
pub trait TimerListener: Send + Sync {
    fn on_tick(&self, remaining: u64);
    fn on_warning(&self, remaining: u64);
    fn on_expire(&self);
}

/// Whether [`CountdownTimer::start`] began ticking.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerStart {
    Running,
    /// No time was left; the expire event has already been raised.
    Expired,
}

/// Periodic ticker owned by a session.
///
/// Every `start` opens a new epoch; `stop` closes it. A tick from a closed
/// epoch is discarded, so nothing fires after `stop` returns.
pub struct CountdownTimer {
    countdown: Arc<Mutex<Countdown>>,
    clock: Clock,
    listener: Arc<dyn TimerListener>,
    epoch: Arc<AtomicU64>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl CountdownTimer {
    pub fn new(countdown: Countdown, clock: Clock, listener: Arc<dyn TimerListener>) -> Self {
        Self {
            countdown: Arc::new(Mutex::new(countdown)),
            clock,
            listener,
            epoch: Arc::new(AtomicU64::new(0)),
            task: Mutex::new(None),
        }
    }

    pub fn remaining(&self) -> u64 {
        lock(&self.countdown).remaining()
    }

    pub fn is_running(&self) -> bool {
        lock(&self.task).as_ref().is_some_and(|task| !task.is_finished())
    }

    /// Start ticking from the current remaining time.
    ///
    /// After a `stop`, ticking resumes from the value at which it stopped.
    /// If no time is left, raises the expire event immediately without
    /// spawning a ticker.
    pub fn start(&self) -> TimerStart {
        self.stop();
        if lock(&self.countdown).is_expired() {
            self.listener.on_expire();
            return TimerStart::Expired;
        }

        let epoch = self.epoch.load(Ordering::SeqCst);
        let countdown = Arc::clone(&self.countdown);
        let current = Arc::clone(&self.epoch);
        let listener = Arc::clone(&self.listener);
        let clock = self.clock;

        let handle = tokio::spawn(async move {
            let mut ticker = interval_at(Instant::now() + TICK, TICK);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                ticker.tick().await;
                if current.load(Ordering::SeqCst) != epoch {
                    break;
                }
                let Some(outcome) = lock(&countdown).tick(clock.now()) else {
                    break;
                };
                listener.on_tick(outcome.remaining);
                if outcome.warning {
                    listener.on_warning(outcome.remaining);
                }
                if outcome.expired {
                    listener.on_expire();
                    break;
                }
            }
        });
        *lock(&self.task) = Some(handle);
        TimerStart::Running
    }

    /// Cancel all pending ticks.
    pub fn stop(&self) {
        self.epoch.fetch_add(1, Ordering::SeqCst);
        if let Some(task) = lock(&self.task).take() {
            task.abort();
        }
    }
}

impl Drop for CountdownTimer {
    fn drop(&mut self) {
        self.stop();
    }
}
