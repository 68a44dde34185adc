//! Volley load generation engine
//!
//! An open-loop traffic generator: an [`ArrivalScheduler`] turns a
//! piecewise-linear rate profile into timestamped arrivals, the
//! [`LoadDriver`] dispatches each arrival onto a bounded [`WorkerPool`]
//! without waiting for completion, a [`MetricsCollector`] aggregates
//! outcomes, and a [`ThresholdEvaluator`] turns the final metrics into a
//! pass/fail [`Verdict`].
//!
//! [`RunContext`] wires these together for a single run.

pub mod clock;
pub mod context;
pub mod driver;
pub mod error;
pub mod metrics;
pub mod pool;
pub mod schedule;
pub mod scheduler;
pub mod task;
pub mod threshold;

// Re-export main types
pub use clock::{ClockSource, Instant, TokioClock};
pub use context::{IterationCounts, RunContext, RunSummary};
pub use driver::{DriverReport, LoadDriver};
pub use error::ConfigurationError;
pub use metrics::{
    IterationOutcome, IterationResult, LatencySummary, Metrics, MetricsCollector,
};
pub use pool::{PoolStats, SlotState, WorkerPool, WorkerSlot};
pub use schedule::{Schedule, Stage};
pub use scheduler::{ArrivalEvent, ArrivalEvents, ArrivalScheduler, DEFAULT_TICK};
pub use task::{task_fn, FnTask, HttpGetTask, IterationTask, TaskError};
pub use threshold::{
    Aggregation, Comparison, MetricName, Threshold, ThresholdEvaluator, ThresholdExpr,
    ThresholdResult, Verdict,
};
