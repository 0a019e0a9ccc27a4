use std::time::{Duration, Instant};

use crate::search::PortfolioCandidate;

/// Point-in-time view of a running search, for display only.
#[derive(Clone, Debug)]
pub struct ProgressSnapshot {
    pub processed: usize,
    pub total: usize,
    pub elapsed: Duration,
    pub remaining: Option<Duration>,
    pub best: Option<PortfolioCandidate>,
}

impl ProgressSnapshot {
    pub fn percent(&self) -> f64 {
        if self.total == 0 {
            100.0
        } else {
            self.processed as f64 * 100.0 / self.total as f64
        }
    }

    pub fn best_sharpe(&self) -> Option<f64> {
        self.best.as_ref().map(|b| b.metrics.sharpe_ratio)
    }
}

/// Counts processed combinations and decides when a snapshot is due: every
/// `every` combinations, after `max_quiet` without one, and at completion.
#[derive(Debug)]
pub struct ProgressTracker {
    processed: usize,
    total: usize,
    every: usize,
    max_quiet: Duration,
    started: Instant,
    last_report: Instant,
}

impl ProgressTracker {
    pub fn starting_at(started: Instant, total: usize, every: usize, max_quiet: Duration) -> Self {
        Self {
            processed: 0,
            total,
            every,
            max_quiet,
            started,
            last_report: started,
        }
    }

    pub fn processed(&self) -> usize {
        self.processed
    }

    /// Count one finished combination. True when a snapshot should be emitted.
    pub fn record_at(&mut self, now: Instant) -> bool {
        self.processed += 1;
        let by_count = self.every > 0 && self.processed % self.every == 0;
        let by_time = now.saturating_duration_since(self.last_report) >= self.max_quiet;
        let done = self.processed == self.total;
        if by_count || by_time || done {
            self.last_report = now;
            true
        } else {
            false
        }
    }

    pub fn elapsed_at(&self, now: Instant) -> Duration {
        now.saturating_duration_since(self.started)
    }

    /// Linear extrapolation from the average time per combination so far.
    pub fn remaining_at(&self, now: Instant) -> Option<Duration> {
        if self.processed == 0 {
            return None;
        }
        let left = self.total.saturating_sub(self.processed);
        let per_item = self.elapsed_at(now).as_secs_f64() / self.processed as f64;
        Some(Duration::from_secs_f64(per_item * left as f64))
    }

    pub fn snapshot_at(&self, now: Instant, best: Option<PortfolioCandidate>) -> ProgressSnapshot {
        ProgressSnapshot {
            processed: self.processed,
            total: self.total,
            elapsed: self.elapsed_at(now),
            remaining: self.remaining_at(now),
            best,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const QUIET: Duration = Duration::from_secs(300);

    #[test]
    fn reports_on_count_interval_and_completion() {
        let t0 = Instant::now();
        let mut tracker = ProgressTracker::starting_at(t0, 7, 3, QUIET);
        let due: Vec<bool> = (0..7).map(|_| tracker.record_at(t0)).collect();
        assert_eq!(due, vec![false, false, true, false, false, true, true]);
        assert_eq!(tracker.processed(), 7);
    }

    #[test]
    fn reports_after_quiet_period() {
        let t0 = Instant::now();
        let mut tracker = ProgressTracker::starting_at(t0, 1_000, 500, QUIET);
        assert!(!tracker.record_at(t0 + Duration::from_secs(10)));
        assert!(tracker.record_at(t0 + Duration::from_secs(301)));
        // The quiet window restarts from the last report.
        assert!(!tracker.record_at(t0 + Duration::from_secs(400)));
        assert!(tracker.record_at(t0 + Duration::from_secs(602)));
    }

    #[test]
    fn zero_interval_only_uses_time_and_completion() {
        let t0 = Instant::now();
        let mut tracker = ProgressTracker::starting_at(t0, 2, 0, QUIET);
        assert!(!tracker.record_at(t0));
        assert!(tracker.record_at(t0));
    }

    #[test]
    fn remaining_time_extrapolates() {
        let t0 = Instant::now();
        let mut tracker = ProgressTracker::starting_at(t0, 10, 1, QUIET);
        assert!(tracker.remaining_at(t0).is_none());
        for _ in 0..4 {
            tracker.record_at(t0);
        }
        let later = t0 + Duration::from_secs(8);
        let snap = tracker.snapshot_at(later, None);
        assert_eq!(snap.elapsed, Duration::from_secs(8));
        let remaining = snap.remaining.unwrap().as_secs_f64();
        assert!((remaining - 12.0).abs() < 1e-6);
        assert!((snap.percent() - 40.0).abs() < 1e-12);
        assert!(snap.best_sharpe().is_none());
    }
}
