//! Statistics snapshot owned by the engine and passed by reference to every
//! subsystem. Grounded on the teacher's [`crate::callback::ConvergenceOutput`]
//! formatted iteration line, generalised from per-iteration primal/dual
//! infeasibility to the pivot/split/restoration counters this engine cares
//! about.

use std::fmt;
use std::time::{Duration, Instant};

/// Pivot counts, split-stack depth, restoration count, and elapsed wall time
/// for a single solver run.
#[derive(Debug, Clone)]
pub struct Statistics {
    pub stable_pivots: usize,
    pub unstable_pivots: usize,
    pub fake_pivots: usize,
    pub splits_performed: usize,
    pub splits_popped: usize,
    pub split_stack_high_water_mark: usize,
    pub restorations: usize,
    pub soi_local_search_steps: usize,
    pub bound_tightening_rounds: usize,
    start: Instant,
    elapsed: Duration,
}

impl Statistics {
    pub fn new() -> Self {
        Self {
            stable_pivots: 0,
            unstable_pivots: 0,
            fake_pivots: 0,
            splits_performed: 0,
            splits_popped: 0,
            split_stack_high_water_mark: 0,
            restorations: 0,
            soi_local_search_steps: 0,
            bound_tightening_rounds: 0,
            start: Instant::now(),
            elapsed: Duration::ZERO,
        }
    }

    pub fn record_split_stack_depth(&mut self, depth: usize) {
        self.split_stack_high_water_mark = self.split_stack_high_water_mark.max(depth);
    }

    /// Freezes `elapsed` at the time of the call; read via [`Statistics::elapsed`].
    pub fn stop_clock(&mut self) {
        self.elapsed = self.start.elapsed();
    }

    pub fn elapsed(&self) -> Duration {
        self.elapsed
    }

    pub fn total_pivots(&self) -> usize {
        self.stable_pivots + self.unstable_pivots + self.fake_pivots
    }
}

impl Default for Statistics {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for Statistics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "| pivots: {:>6} (stable {:>6}, unstable {:>5}, fake {:>5}) | splits: {:>5} | restorations: {:>3} | {:>7.3}s |",
            self.total_pivots(),
            self.stable_pivots,
            self.unstable_pivots,
            self.fake_pivots,
            self.splits_performed,
            self.restorations,
            self.elapsed.as_secs_f64(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_total_pivots_sums_all_kinds() {
        let mut stats = Statistics::new();
        stats.stable_pivots = 3;
        stats.unstable_pivots = 1;
        stats.fake_pivots = 2;
        assert_eq!(stats.total_pivots(), 6);
    }

    #[test]
    fn test_high_water_mark_only_increases() {
        let mut stats = Statistics::new();
        stats.record_split_stack_depth(3);
        stats.record_split_stack_depth(1);
        assert_eq!(stats.split_stack_high_water_mark, 3);
        stats.record_split_stack_depth(5);
        assert_eq!(stats.split_stack_high_water_mark, 5);
    }
}
