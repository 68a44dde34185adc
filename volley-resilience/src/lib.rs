//! Resilience patterns for Volley
//!
//! Currently provides run-level shutdown coordination: a graceful stop that
//! escalates to a forced stop once the grace period runs out.

pub mod shutdown;

// Re-export commonly used types
pub use shutdown::{ShutdownCoordinator, ShutdownError, ShutdownListener, ShutdownSignal};
