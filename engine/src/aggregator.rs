//! Rolling-window throughput and ETA.
//!
//! Samples are `(instant, cumulative bytes)`. Speed is taken between the
//! oldest and newest sample still inside the window, which smooths over the
//! stop/start at file boundaries that a lifetime average would smear across
//! the whole run.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

/// Default sliding window length.
pub const SPEED_WINDOW: Duration = Duration::from_secs(10);

#[derive(Debug, Clone)]
pub struct ProgressAggregator {
    window: Duration,
    samples: VecDeque<(Instant, u64)>,
}

impl Default for ProgressAggregator {
    fn default() -> Self {
        Self::new(SPEED_WINDOW)
    }
}

impl ProgressAggregator {
    pub fn new(window: Duration) -> Self {
        ProgressAggregator {
            window,
            samples: VecDeque::new(),
        }
    }

    /// Record a cumulative byte count observed now.
    pub fn record(&mut self, cumulative_bytes: u64) {
        self.record_at(Instant::now(), cumulative_bytes);
    }

    /// Record a cumulative byte count observed at `at`, then drop samples
    /// that fell out of the window.
    pub fn record_at(&mut self, at: Instant, cumulative_bytes: u64) {
        self.samples.push_back((at, cumulative_bytes));
        while let Some(&(oldest, _)) = self.samples.front() {
            if at.saturating_duration_since(oldest) > self.window {
                self.samples.pop_front();
            } else {
                break;
            }
        }
    }

    /// Bytes per second across the window; 0 without two samples spanning
    /// a positive interval.
    pub fn speed(&self) -> f64 {
        let (Some(&(first_at, first_bytes)), Some(&(last_at, last_bytes))) =
            (self.samples.front(), self.samples.back())
        else {
            return 0.0;
        };
        if self.samples.len() < 2 {
            return 0.0;
        }
        let elapsed = last_at.saturating_duration_since(first_at).as_secs_f64();
        if elapsed <= 0.0 {
            return 0.0;
        }
        last_bytes.saturating_sub(first_bytes) as f64 / elapsed
    }

    /// Seconds until `total` is reached from `processed`, `None` while the
    /// speed is unknown.
    pub fn eta_secs(&self, total: u64, processed: u64) -> Option<f64> {
        let speed = self.speed();
        if speed > 0.0 {
            Some(total.saturating_sub(processed) as f64 / speed)
        } else {
            None
        }
    }

    /// Move every sample forward by `by`, so an idle stretch (a pause) does
    /// not count as zero throughput.
    pub fn shift(&mut self, by: Duration) {
        for (at, _) in self.samples.iter_mut() {
            *at += by;
        }
    }

    pub fn reset(&mut self) {
        self.samples.clear();
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MIB: u64 = 1024 * 1024;

    #[test]
    fn test_no_samples_is_unknown() {
        let agg = ProgressAggregator::default();
        assert_eq!(agg.speed(), 0.0);
        assert_eq!(agg.eta_secs(100, 0), None);
    }

    #[test]
    fn test_single_sample_is_unknown() {
        let mut agg = ProgressAggregator::default();
        agg.record_at(Instant::now(), 10 * MIB);
        assert_eq!(agg.speed(), 0.0);
        assert_eq!(agg.eta_secs(100 * MIB, 10 * MIB), None);
    }

    #[test]
    fn test_zero_interval_is_unknown() {
        let mut agg = ProgressAggregator::default();
        let now = Instant::now();
        agg.record_at(now, 0);
        agg.record_at(now, 5 * MIB);
        assert_eq!(agg.speed(), 0.0);
        assert_eq!(agg.eta_secs(10 * MIB, 5 * MIB), None);
    }

    #[test]
    fn test_speed_and_eta_from_window_edges() {
        let mut agg = ProgressAggregator::default();
        let t0 = Instant::now();
        agg.record_at(t0, 0);
        agg.record_at(t0 + Duration::from_secs(1), 10 * MIB);
        agg.record_at(t0 + Duration::from_secs(2), 20 * MIB);

        let speed = agg.speed();
        assert!((speed - 10.0 * MIB as f64).abs() < 1.0);

        let eta = agg.eta_secs(100 * MIB, 20 * MIB).expect("speed is known");
        assert!((eta - 8.0).abs() < 1e-6);
    }

    #[test]
    fn test_old_samples_leave_the_window() {
        let mut agg = ProgressAggregator::new(Duration::from_secs(10));
        let t0 = Instant::now();
        agg.record_at(t0, 0);
        // A long stall followed by a fast burst: only the recent part counts
        agg.record_at(t0 + Duration::from_secs(20), 0);
        agg.record_at(t0 + Duration::from_secs(25), 50 * MIB);

        assert_eq!(agg.len(), 2);
        assert!((agg.speed() - 10.0 * MIB as f64).abs() < 1.0);
    }

    #[test]
    fn test_positive_progress_gives_positive_speed() {
        let mut agg = ProgressAggregator::default();
        let t0 = Instant::now();
        agg.record_at(t0, 100);
        agg.record_at(t0 + Duration::from_millis(500), 101);
        assert!(agg.speed() > 0.0);
        assert!(agg.eta_secs(1000, 101).unwrap() >= 0.0);
        // Already past the total: nothing remaining
        assert_eq!(agg.eta_secs(50, 101), Some(0.0));
    }

    #[test]
    fn test_shift_moves_samples_forward() {
        let mut agg = ProgressAggregator::new(Duration::from_secs(10));
        let t0 = Instant::now();
        agg.record_at(t0, 0);
        agg.record_at(t0 + Duration::from_secs(2), 20 * MIB);

        // Paused for 30s; without the shift the next sample would evict both
        agg.shift(Duration::from_secs(30));
        agg.record_at(t0 + Duration::from_secs(34), 40 * MIB);

        assert_eq!(agg.len(), 3);
        assert!((agg.speed() - 10.0 * MIB as f64).abs() < 1.0);

        agg.reset();
        assert!(agg.is_empty());
    }
}
