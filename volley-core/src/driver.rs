//! Open-loop dispatch loop
//!
//! The driver walks the arrival sequence in real time. Each due arrival
//! either gets a worker slot and is spawned, or is recorded as dropped on
//! the spot; the loop never waits for an iteration to finish. Once the
//! arrivals are exhausted (or a shutdown signal stops them early) the
//! driver waits for every in-flight iteration, aborting them if a forced
//! shutdown arrives first.

use crate::clock::{ClockSource, Instant, TokioClock};
use crate::metrics::{IterationOutcome, IterationResult, MetricsCollector};
use crate::pool::{WorkerPool, WorkerSlot};
use crate::scheduler::ArrivalScheduler;
use crate::task::IterationTask;
use futures::FutureExt;
use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::{Id, JoinError, JoinSet};
use tracing::{debug, info, trace, warn};
use volley_resilience::{ShutdownListener, ShutdownSignal};

/// What the driver did during a run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DriverReport {
    /// Arrivals that came due before the loop stopped
    pub arrivals: u64,
    pub dispatched: u64,
    pub dropped: u64,
    /// Iterations aborted by a forced shutdown
    pub interrupted: u64,
    pub elapsed: Duration,
    /// Most urgent shutdown signal observed, if the run was cancelled
    pub stopped_by: Option<ShutdownSignal>,
}

pub struct LoadDriver<T> {
    scheduler: ArrivalScheduler,
    pool: WorkerPool,
    metrics: Arc<MetricsCollector>,
    task: Arc<T>,
    clock: Arc<dyn ClockSource>,
    shutdown: Option<ShutdownListener>,
}

impl<T: IterationTask> LoadDriver<T> {
    pub fn new(
        scheduler: ArrivalScheduler,
        pool: WorkerPool,
        metrics: Arc<MetricsCollector>,
        task: Arc<T>,
    ) -> Self {
        Self {
            scheduler,
            pool,
            metrics,
            task,
            clock: Arc::new(TokioClock),
            shutdown: None,
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn ClockSource>) -> Self {
        self.clock = clock;
        self
    }

    /// Stop emitting arrivals on `Graceful`, abort in-flight work on `Forced`
    pub fn with_shutdown(mut self, listener: ShutdownListener) -> Self {
        self.shutdown = Some(listener);
        self
    }

    /// Drive the run to completion
    ///
    /// Returns once the arrival sequence is exhausted or stopped and no
    /// iteration is left in flight.
    pub async fn run(self) -> DriverReport {
        let LoadDriver {
            scheduler,
            pool,
            metrics,
            task,
            clock,
            mut shutdown,
        } = self;

        let mut report = DriverReport::default();
        let mut in_flight = InFlight::new(Arc::clone(&metrics), Arc::clone(&clock));
        let started = clock.now();

        info!(
            horizon = ?scheduler.horizon(),
            expected_arrivals = scheduler.schedule().expected_arrivals().round(),
            "Starting arrival phase"
        );

        for event in scheduler.events() {
            let due = started + event.scheduled_at;
            tokio::select! {
                biased;
                signal = next_signal(&mut shutdown) => {
                    info!(%signal, arrivals = report.arrivals, "Shutdown requested, no further arrivals");
                    report.stopped_by = Some(signal);
                    break;
                }
                _ = tokio::time::sleep_until(due) => {}
            }

            in_flight.reap();
            report.arrivals += 1;

            match pool.try_acquire() {
                Some(slot) => {
                    report.dispatched += 1;
                    in_flight.spawn(Arc::clone(&task), event.sequence, slot);
                }
                None => {
                    report.dropped += 1;
                    trace!(sequence = event.sequence, "No free worker, arrival dropped");
                    metrics.record(IterationResult::dropped(clock.now()));
                }
            }
        }

        let forced = report.stopped_by == Some(ShutdownSignal::Forced);
        if forced {
            in_flight.abort_all();
        }

        debug!(in_flight = in_flight.len(), "Arrival phase over, draining");
        let (interrupted, signal_in_drain) = in_flight.drain(&mut shutdown, forced).await;

        report.interrupted = interrupted;
        report.elapsed = clock.now().saturating_duration_since(started);
        report.stopped_by = report.stopped_by.max(signal_in_drain);

        info!(
            arrivals = report.arrivals,
            dispatched = report.dispatched,
            dropped = report.dropped,
            interrupted = report.interrupted,
            elapsed = ?report.elapsed,
            "Load driver finished"
        );
        report
    }
}

/// Resolves with the next shutdown signal; never resolves without a listener
async fn next_signal(listener: &mut Option<ShutdownListener>) -> ShutdownSignal {
    match listener {
        Some(listener) => listener.recv().await,
        None => std::future::pending().await,
    }
}

/// Spawned iterations and their start times
///
/// Iterations record their own result. The start time is kept here only so
/// an iteration that is aborted before it could record is still counted.
struct InFlight {
    tasks: JoinSet<()>,
    started: HashMap<Id, Instant>,
    metrics: Arc<MetricsCollector>,
    clock: Arc<dyn ClockSource>,
}

impl InFlight {
    fn new(metrics: Arc<MetricsCollector>, clock: Arc<dyn ClockSource>) -> Self {
        Self {
            tasks: JoinSet::new(),
            started: HashMap::new(),
            metrics,
            clock,
        }
    }

    fn len(&self) -> usize {
        self.tasks.len()
    }

    fn spawn<T: IterationTask>(&mut self, task: Arc<T>, sequence: u64, slot: WorkerSlot) {
        let metrics = Arc::clone(&self.metrics);
        let clock = Arc::clone(&self.clock);
        let start = clock.now();

        let handle = self.tasks.spawn(async move {
            let outcome = match AssertUnwindSafe(task.run(sequence)).catch_unwind().await {
                Ok(Ok(())) => IterationOutcome::Success,
                Ok(Err(err)) => {
                    debug!(sequence, error = %err, "Iteration failed");
                    IterationOutcome::Failure
                }
                Err(_) => {
                    warn!(sequence, "Iteration panicked");
                    IterationOutcome::Failure
                }
            };
            metrics.record(IterationResult::new(start, clock.now(), outcome));
            // Slot goes back only after the result is recorded
            drop(slot);
        });

        self.started.insert(handle.id(), start);
    }

    /// Collect already-finished iterations without waiting
    fn reap(&mut self) {
        while let Some(joined) = self.tasks.try_join_next_with_id() {
            self.settle(joined);
        }
    }

    fn abort_all(&mut self) {
        if !self.tasks.is_empty() {
            warn!(remaining = self.tasks.len(), "Aborting in-flight iterations");
        }
        self.tasks.abort_all();
    }

    /// Returns true if the iteration was aborted before recording
    fn settle(&mut self, joined: Result<(Id, ()), JoinError>) -> bool {
        match joined {
            Ok((id, ())) => {
                self.started.remove(&id);
                false
            }
            Err(err) => {
                let start = self.started.remove(&err.id());
                match start {
                    Some(start) if err.is_cancelled() => {
                        self.metrics.record_interrupted(start, self.clock.now());
                        true
                    }
                    _ => false,
                }
            }
        }
    }

    /// Wait for every iteration, aborting the rest on a forced shutdown
    ///
    /// Returns the number of interrupted iterations and the most urgent
    /// shutdown signal received while draining.
    async fn drain(
        &mut self,
        shutdown: &mut Option<ShutdownListener>,
        already_forced: bool,
    ) -> (u64, Option<ShutdownSignal>) {
        let mut forced = already_forced;
        let mut seen = None;
        let mut interrupted = 0;

        loop {
            tokio::select! {
                biased;
                signal = next_signal(shutdown), if !forced => {
                    debug!(%signal, "Shutdown requested while draining");
                    seen = seen.max(Some(signal));
                    if signal == ShutdownSignal::Forced {
                        forced = true;
                        self.abort_all();
                    }
                }
                joined = self.tasks.join_next_with_id() => match joined {
                    Some(joined) => {
                        if self.settle(joined) {
                            interrupted += 1;
                        }
                    }
                    None => break,
                }
            }
        }

        (interrupted, seen)
    }
}
