//! Monotonic time source

use std::fmt;

pub use tokio::time::Instant;

/// Provides the current monotonic time to the driver and metrics
///
/// Backed by tokio's clock so paused-time tests and timer sleeps agree.
pub trait ClockSource: Send + Sync + fmt::Debug {
    fn now(&self) -> Instant;
}

/// Default clock reading `tokio::time::Instant::now()`
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioClock;

impl ClockSource for TokioClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}
