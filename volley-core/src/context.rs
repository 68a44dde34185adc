//! Per-run wiring
//!
//! A [`RunContext`] owns everything mutable about one run: the worker pool,
//! the metrics collector and the shutdown coordinator. Nothing is shared
//! between runs; the context is consumed by [`RunContext::run`].

use crate::clock::{ClockSource, TokioClock};
use crate::driver::LoadDriver;
use crate::error::ConfigurationError;
use crate::metrics::{LatencySummary, Metrics, MetricsCollector};
use crate::pool::{PoolStats, WorkerPool};
use crate::schedule::Schedule;
use crate::scheduler::ArrivalScheduler;
use crate::task::IterationTask;
use crate::threshold::{ThresholdEvaluator, Verdict};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use uuid::Uuid;
use volley_config::VolleyConfig;
use volley_resilience::ShutdownCoordinator;

pub struct RunContext<T> {
    run_id: Uuid,
    scheduler: ArrivalScheduler,
    evaluator: ThresholdEvaluator,
    task: Arc<T>,
    pool: WorkerPool,
    metrics: Arc<MetricsCollector>,
    shutdown: Arc<ShutdownCoordinator>,
    clock: Arc<dyn ClockSource>,
}

impl<T: IterationTask> RunContext<T> {
    pub fn new(schedule: Schedule, evaluator: ThresholdEvaluator, task: T) -> Self {
        let pool = WorkerPool::new(schedule.pre_allocated(), schedule.max_concurrent());

        Self {
            run_id: Uuid::new_v4(),
            scheduler: ArrivalScheduler::new(schedule),
            evaluator,
            task: Arc::new(task),
            pool,
            metrics: Arc::new(MetricsCollector::new()),
            shutdown: Arc::new(ShutdownCoordinator::new()),
            clock: Arc::new(TokioClock),
        }
    }

    /// Validate the configuration and prepare a run from it
    ///
    /// Schedule and threshold problems are reported here, before any
    /// traffic is generated.
    pub fn from_config(config: &VolleyConfig, task: T) -> Result<Self, ConfigurationError> {
        config.validate_all()?;
        let schedule = Schedule::try_from(&config.scenario)?;
        let evaluator = ThresholdEvaluator::from_config(&config.thresholds)?;

        Ok(Self::new(schedule, evaluator, task).with_grace_period(config.scenario.graceful_stop))
    }

    /// Time in-flight iterations get to finish after a cancellation
    pub fn with_grace_period(mut self, grace_period: Duration) -> Self {
        self.shutdown = Arc::new(ShutdownCoordinator::with_grace_period(grace_period));
        self
    }

    pub fn with_tick(mut self, tick: Duration) -> Self {
        self.scheduler = self.scheduler.with_tick(tick);
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn ClockSource>) -> Self {
        self.clock = clock;
        self
    }

    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    pub fn schedule(&self) -> &Schedule {
        self.scheduler.schedule()
    }

    pub fn pool(&self) -> &WorkerPool {
        &self.pool
    }

    /// Handle for cancelling the run from outside, e.g. on Ctrl-C
    pub fn shutdown_handle(&self) -> Arc<ShutdownCoordinator> {
        Arc::clone(&self.shutdown)
    }

    pub async fn run(self) -> RunSummary {
        let started_at = Utc::now();
        let schedule = self.scheduler.schedule();
        info!(
            run_id = %self.run_id,
            start_rate = schedule.start_rate(),
            stages = schedule.stages().len(),
            pre_allocated = schedule.pre_allocated(),
            max_workers = schedule.max_concurrent(),
            thresholds = self.evaluator.thresholds().len(),
            "Starting run"
        );

        let report = LoadDriver::new(
            self.scheduler,
            self.pool.clone(),
            Arc::clone(&self.metrics),
            self.task,
        )
        .with_clock(self.clock)
        .with_shutdown(self.shutdown.subscribe())
        .run()
        .await;

        let metrics = self.metrics.snapshot().with_elapsed(report.elapsed);
        let verdict = self.evaluator.evaluate(&metrics);

        RunSummary {
            run_id: self.run_id,
            started_at,
            elapsed_secs: report.elapsed.as_secs_f64(),
            stopped_by: report.stopped_by.map(|signal| signal.to_string()),
            passed: verdict.passed(),
            iterations: IterationCounts::from_metrics(&metrics),
            latency: metrics.latency_summary(),
            workers: self.pool.stats(),
            verdict,
            metrics,
        }
    }
}

/// Iteration counters as reported in the summary
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct IterationCounts {
    pub total: u64,
    pub success: u64,
    pub failed: u64,
    pub dropped: u64,
    pub interrupted: u64,
    pub failed_rate: f64,
    /// Started iterations per second of run
    pub rate: f64,
}

impl IterationCounts {
    fn from_metrics(metrics: &Metrics) -> Self {
        Self {
            total: metrics.total_iterations,
            success: metrics.success_count,
            failed: metrics.failed_count,
            dropped: metrics.dropped_count,
            interrupted: metrics.interrupted_count,
            failed_rate: metrics.failed_rate(),
            rate: metrics.per_second(metrics.completed_iterations()),
        }
    }
}

/// Final report of a run
#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub elapsed_secs: f64,
    /// `graceful` or `forced` when the run was cancelled
    pub stopped_by: Option<String>,
    pub passed: bool,
    pub iterations: IterationCounts,
    pub latency: LatencySummary,
    pub workers: PoolStats,
    pub verdict: Verdict,
    #[serde(skip)]
    pub metrics: Metrics,
}

impl RunSummary {
    pub fn exit_code(&self) -> i32 {
        self.verdict.exit_code()
    }

    /// Emit the summary through tracing
    pub fn log(&self) {
        info!(
            run_id = %self.run_id,
            total = self.iterations.total,
            success = self.iterations.success,
            failed = self.iterations.failed,
            dropped = self.iterations.dropped,
            interrupted = self.iterations.interrupted,
            elapsed_secs = self.elapsed_secs,
            "Run complete"
        );
        info!(
            p50_ms = self.latency.p50_ms,
            p95_ms = self.latency.p95_ms,
            p99_ms = self.latency.p99_ms,
            max_ms = self.latency.max_ms,
            peak_busy_workers = self.workers.peak_busy,
            workers_created = self.workers.created,
            "Latency and worker usage"
        );

        if let Some(signal) = &self.stopped_by {
            warn!(stopped_by = %signal, "Run was cancelled before the schedule completed");
        }
        for violation in self.verdict.violations() {
            warn!(
                metric = %violation.metric,
                expression = %violation.expression,
                actual = violation.actual,
                "Threshold crossed"
            );
        }
    }
}
