//! Run metrics
//!
//! The collector is shared by every in-flight iteration. Counters are
//! lock-free; latencies go into an HDR histogram behind a short-lived lock.
//! `Dropped` arrivals never ran, so they are counted but contribute no
//! latency sample.

use crate::clock::Instant;
use hdrhistogram::Histogram;
use parking_lot::Mutex;
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

/// Longest latency tracked at full precision (one hour, in microseconds)
const MAX_TRACKED_MICROS: u64 = 3_600_000_000;
const SIGNIFICANT_FIGURES: u8 = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum IterationOutcome {
    Success,
    Failure,
    /// No worker slot was free when the arrival was due
    Dropped,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IterationResult {
    pub start: Instant,
    pub end: Instant,
    pub outcome: IterationOutcome,
}

impl IterationResult {
    pub fn new(start: Instant, end: Instant, outcome: IterationOutcome) -> Self {
        Self {
            start,
            end,
            outcome,
        }
    }

    pub fn dropped(at: Instant) -> Self {
        Self::new(at, at, IterationOutcome::Dropped)
    }

    pub fn latency(&self) -> Duration {
        self.end.saturating_duration_since(self.start)
    }
}

#[derive(Debug)]
pub struct MetricsCollector {
    success: AtomicU64,
    failed: AtomicU64,
    dropped: AtomicU64,
    interrupted: AtomicU64,
    latency: Mutex<Histogram<u64>>,
}

impl MetricsCollector {
    pub fn new() -> Self {
        let histogram =
            Histogram::<u64>::new_with_bounds(1, MAX_TRACKED_MICROS, SIGNIFICANT_FIGURES)
                .expect("constant histogram bounds are valid");

        Self {
            success: AtomicU64::new(0),
            failed: AtomicU64::new(0),
            dropped: AtomicU64::new(0),
            interrupted: AtomicU64::new(0),
            latency: Mutex::new(histogram),
        }
    }

    pub fn record(&self, result: IterationResult) {
        let counter = match result.outcome {
            IterationOutcome::Success => &self.success,
            IterationOutcome::Failure => &self.failed,
            IterationOutcome::Dropped => {
                self.dropped.fetch_add(1, Ordering::Relaxed);
                return;
            }
        };

        let micros = u64::try_from(result.latency().as_micros()).unwrap_or(u64::MAX);
        self.latency.lock().saturating_record(micros);
        counter.fetch_add(1, Ordering::Relaxed);
    }

    /// Record an iteration that was aborted by a forced shutdown
    ///
    /// Counted as a failure, and separately as interrupted.
    pub fn record_interrupted(&self, start: Instant, end: Instant) {
        self.record(IterationResult::new(start, end, IterationOutcome::Failure));
        self.interrupted.fetch_add(1, Ordering::Relaxed);
    }

    /// Consistent copy of the current state
    pub fn snapshot(&self) -> Metrics {
        let latency = self.latency.lock().clone();
        let success_count = self.success.load(Ordering::Relaxed);
        let failed_count = self.failed.load(Ordering::Relaxed);
        let dropped_count = self.dropped.load(Ordering::Relaxed);

        Metrics {
            total_iterations: success_count + failed_count + dropped_count,
            success_count,
            failed_count,
            dropped_count,
            interrupted_count: self.interrupted.load(Ordering::Relaxed),
            latency,
            elapsed: Duration::ZERO,
        }
    }
}

impl Default for MetricsCollector {
    fn default() -> Self {
        Self::new()
    }
}

/// Aggregated run statistics
#[derive(Debug, Clone)]
pub struct Metrics {
    pub total_iterations: u64,
    pub success_count: u64,
    pub failed_count: u64,
    pub dropped_count: u64,
    pub interrupted_count: u64,
    /// Latencies of completed iterations, in microseconds
    pub latency: Histogram<u64>,
    /// Wall time the run took; zero until the run finishes
    pub elapsed: Duration,
}

impl Metrics {
    pub fn with_elapsed(mut self, elapsed: Duration) -> Self {
        self.elapsed = elapsed;
        self
    }

    /// Iterations that were actually started
    pub fn completed_iterations(&self) -> u64 {
        self.success_count + self.failed_count
    }

    /// Failed share of all arrivals, dropped ones included; 0 for an empty run
    pub fn failed_rate(&self) -> f64 {
        ratio(self.failed_count, self.total_iterations)
    }

    pub fn success_rate(&self) -> f64 {
        ratio(self.success_count, self.total_iterations)
    }

    pub fn dropped_rate(&self) -> f64 {
        ratio(self.dropped_count, self.total_iterations)
    }

    /// Per-second rate of `count` over the elapsed time
    pub fn per_second(&self, count: u64) -> f64 {
        let secs = self.elapsed.as_secs_f64();
        if secs > 0.0 {
            count as f64 / secs
        } else {
            0.0
        }
    }

    /// Latency at `percentile` (0-100) in milliseconds; 0 with no samples
    pub fn latency_percentile_ms(&self, percentile: f64) -> f64 {
        if self.latency.len() == 0 {
            return 0.0;
        }
        micros_to_ms(self.latency.value_at_percentile(percentile))
    }

    pub fn latency_min_ms(&self) -> f64 {
        if self.latency.len() == 0 {
            return 0.0;
        }
        micros_to_ms(self.latency.min())
    }

    pub fn latency_max_ms(&self) -> f64 {
        if self.latency.len() == 0 {
            return 0.0;
        }
        micros_to_ms(self.latency.max())
    }

    pub fn latency_avg_ms(&self) -> f64 {
        if self.latency.len() == 0 {
            return 0.0;
        }
        self.latency.mean() / 1000.0
    }

    pub fn latency_summary(&self) -> LatencySummary {
        if self.latency.len() == 0 {
            return LatencySummary::default();
        }

        LatencySummary {
            min_ms: self.latency_min_ms(),
            max_ms: self.latency_max_ms(),
            avg_ms: self.latency_avg_ms(),
            p50_ms: self.latency_percentile_ms(50.0),
            p90_ms: self.latency_percentile_ms(90.0),
            p95_ms: self.latency_percentile_ms(95.0),
            p99_ms: self.latency_percentile_ms(99.0),
        }
    }
}

/// Latency distribution in milliseconds
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct LatencySummary {
    pub min_ms: f64,
    pub max_ms: f64,
    pub avg_ms: f64,
    pub p50_ms: f64,
    pub p90_ms: f64,
    pub p95_ms: f64,
    pub p99_ms: f64,
}

fn ratio(part: u64, whole: u64) -> f64 {
    if whole == 0 {
        0.0
    } else {
        part as f64 / whole as f64
    }
}

fn micros_to_ms(micros: u64) -> f64 {
    micros as f64 / 1000.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn result(latency_ms: u64, outcome: IterationOutcome) -> IterationResult {
        let start = Instant::now();
        IterationResult::new(start, start + Duration::from_millis(latency_ms), outcome)
    }

    #[test]
    fn test_empty_snapshot() {
        let metrics = MetricsCollector::new().snapshot();
        assert_eq!(metrics.total_iterations, 0);
        assert_eq!(metrics.failed_rate(), 0.0);
        assert_eq!(metrics.latency_percentile_ms(95.0), 0.0);
        assert_eq!(metrics.latency_summary(), LatencySummary::default());
        assert_eq!(metrics.per_second(10), 0.0);
    }

    #[test]
    fn test_counts_partition_total() {
        let collector = MetricsCollector::new();
        for _ in 0..7 {
            collector.record(result(5, IterationOutcome::Success));
        }
        collector.record(result(5, IterationOutcome::Failure));
        collector.record(IterationResult::dropped(Instant::now()));
        collector.record(IterationResult::dropped(Instant::now()));

        let metrics = collector.snapshot();
        assert_eq!(metrics.total_iterations, 10);
        assert_eq!(metrics.success_count, 7);
        assert_eq!(metrics.failed_count, 1);
        assert_eq!(metrics.dropped_count, 2);
        assert_eq!(metrics.completed_iterations(), 8);
        assert!((metrics.failed_rate() - 0.1).abs() < 1e-12);
        assert!((metrics.dropped_rate() - 0.2).abs() < 1e-12);
    }

    #[test]
    fn test_dropped_has_no_latency_sample() {
        let collector = MetricsCollector::new();
        collector.record(IterationResult::dropped(Instant::now()));
        assert_eq!(collector.snapshot().latency.len(), 0);
    }

    #[test]
    fn test_latency_percentiles() {
        let collector = MetricsCollector::new();
        for ms in 1..=100 {
            collector.record(result(ms, IterationOutcome::Success));
        }

        let summary = collector.snapshot().latency_summary();
        assert!((summary.min_ms - 1.0).abs() < 0.01);
        assert!((summary.max_ms - 100.0).abs() < 0.1);
        assert!((summary.p50_ms - 50.0).abs() < 0.1);
        assert!((summary.p95_ms - 95.0).abs() < 0.1);
        assert!((summary.avg_ms - 50.5).abs() < 0.1);
    }

    #[test]
    fn test_interrupted_counts_as_failure() {
        let collector = MetricsCollector::new();
        let start = Instant::now();
        collector.record_interrupted(start, start + Duration::from_millis(3));

        let metrics = collector.snapshot();
        assert_eq!(metrics.failed_count, 1);
        assert_eq!(metrics.interrupted_count, 1);
        assert_eq!(metrics.total_iterations, 1);
    }

    #[test]
    fn test_per_second_uses_elapsed() {
        let collector = MetricsCollector::new();
        for _ in 0..50 {
            collector.record(result(1, IterationOutcome::Success));
        }
        let metrics = collector.snapshot().with_elapsed(Duration::from_secs(5));
        assert!((metrics.per_second(metrics.total_iterations) - 10.0).abs() < 1e-12);
    }

    #[test]
    fn test_concurrent_recording() {
        let collector = Arc::new(MetricsCollector::new());
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let collector = Arc::clone(&collector);
                std::thread::spawn(move || {
                    for i in 0..1000 {
                        let outcome = if i % 10 == 0 {
                            IterationOutcome::Failure
                        } else {
                            IterationOutcome::Success
                        };
                        collector.record(result(1, outcome));
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        let metrics = collector.snapshot();
        assert_eq!(metrics.total_iterations, 8000);
        assert_eq!(metrics.failed_count, 800);
        assert_eq!(metrics.latency.len(), 8000);
    }

    proptest::proptest! {
        #[test]
        fn prop_total_is_sum_of_outcomes(outcomes in proptest::collection::vec(0u8..4, 0..500)) {
            let collector = MetricsCollector::new();
            let start = Instant::now();
            for kind in &outcomes {
                match kind {
                    0 => collector.record(result(2, IterationOutcome::Success)),
                    1 => collector.record(result(2, IterationOutcome::Failure)),
                    2 => collector.record(IterationResult::dropped(start)),
                    _ => collector.record_interrupted(start, start + Duration::from_millis(1)),
                }
            }

            let metrics = collector.snapshot();
            proptest::prop_assert_eq!(metrics.total_iterations, outcomes.len() as u64);
            proptest::prop_assert_eq!(
                metrics.total_iterations,
                metrics.success_count + metrics.failed_count + metrics.dropped_count
            );
            proptest::prop_assert_eq!(
                metrics.latency.len(),
                metrics.success_count + metrics.failed_count
            );
        }
    }
}
