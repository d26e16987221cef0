//! Cooperative pause/cancel control shared between a job's engine and the
//! scheduler.
//!
//! Engines call [`JobControl::checkpoint`] at chunk and file boundaries. A
//! paused engine parks there, polling the flag with a short sleep; a
//! cancelled engine gets [`EngineError::Cancelled`] back and unwinds the
//! current file.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use crate::error::{EngineError, Result};

/// Default sleep between pause-flag polls.
pub const DEFAULT_PAUSE_POLL: Duration = Duration::from_millis(200);

#[derive(Debug, Default)]
struct Flags {
    paused: AtomicBool,
    cancelled: AtomicBool,
    parked_nanos: AtomicU64,
}

/// Cloneable handle to one job's pause/cancel flags.
#[derive(Debug, Clone)]
pub struct JobControl {
    flags: Arc<Flags>,
    poll_interval: Duration,
}

impl Default for JobControl {
    fn default() -> Self {
        Self::new()
    }
}

impl JobControl {
    pub fn new() -> Self {
        Self::with_poll_interval(DEFAULT_PAUSE_POLL)
    }

    pub fn with_poll_interval(poll_interval: Duration) -> Self {
        JobControl {
            flags: Arc::new(Flags::default()),
            poll_interval,
        }
    }

    pub fn pause(&self) {
        self.flags.paused.store(true, Ordering::SeqCst);
    }

    pub fn resume(&self) {
        self.flags.paused.store(false, Ordering::SeqCst);
    }

    /// Request cancellation. Also lifts a pause so a parked engine wakes up
    /// and observes the cancel.
    pub fn cancel(&self) {
        self.flags.cancelled.store(true, Ordering::SeqCst);
        self.flags.paused.store(false, Ordering::SeqCst);
    }

    pub fn is_paused(&self) -> bool {
        self.flags.paused.load(Ordering::SeqCst)
    }

    pub fn is_cancelled(&self) -> bool {
        self.flags.cancelled.load(Ordering::SeqCst)
    }

    /// Park while paused, then fail if cancelled.
    ///
    /// Returns how long this call was parked.
    pub fn checkpoint(&self) -> Result<Duration> {
        let mut parked = Duration::ZERO;
        if self.is_paused() {
            let since = Instant::now();
            while self.is_paused() && !self.is_cancelled() {
                thread::sleep(self.poll_interval);
            }
            parked = since.elapsed();
            let nanos = u64::try_from(parked.as_nanos()).unwrap_or(u64::MAX);
            self.flags.parked_nanos.fetch_add(nanos, Ordering::SeqCst);
        }
        if self.is_cancelled() {
            return Err(EngineError::Cancelled);
        }
        Ok(parked)
    }

    /// Total time spent parked at checkpoints of this job.
    pub fn parked_total(&self) -> Duration {
        Duration::from_nanos(self.flags.parked_nanos.load(Ordering::SeqCst))
    }

    /// Start measuring active time from now. Only time parked after this
    /// call is left out of [`ActiveTimer::elapsed`].
    pub fn start_timer(&self) -> ActiveTimer {
        ActiveTimer {
            flags: Arc::clone(&self.flags),
            started: Instant::now(),
            parked_before: self.parked_total(),
        }
    }
}

/// Wall-clock timer that skips time its job spent parked.
#[derive(Debug, Clone)]
pub struct ActiveTimer {
    flags: Arc<Flags>,
    started: Instant,
    parked_before: Duration,
}

impl ActiveTimer {
    pub fn elapsed(&self) -> Duration {
        let parked_total = Duration::from_nanos(self.flags.parked_nanos.load(Ordering::SeqCst));
        let parked_since = parked_total.saturating_sub(self.parked_before);
        self.started.elapsed().saturating_sub(parked_since)
    }
}
