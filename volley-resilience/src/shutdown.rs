//! Graceful shutdown coordination
//!
//! A run is stopped in two phases. `Graceful` tells the driver to stop
//! emitting arrivals and let in-flight iterations finish; if they have not
//! finished when the grace period expires the coordinator escalates to
//! `Forced` and the driver aborts whatever is still running.

use log::{info, warn};
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;

const RUNNING: u8 = 0;
const GRACEFUL: u8 = 1;
const FORCED: u8 = 2;

/// Shutdown signal types with escalating urgency
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ShutdownSignal {
    /// Stop starting new iterations, let current ones complete
    Graceful,
    /// Abort in-flight iterations immediately
    Forced,
}

impl ShutdownSignal {
    fn from_level(level: u8) -> Option<Self> {
        match level {
            GRACEFUL => Some(ShutdownSignal::Graceful),
            FORCED => Some(ShutdownSignal::Forced),
            _ => None,
        }
    }
}

impl std::fmt::Display for ShutdownSignal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ShutdownSignal::Graceful => write!(f, "graceful"),
            ShutdownSignal::Forced => write!(f, "forced"),
        }
    }
}

/// Run-scoped shutdown coordinator
#[derive(Debug)]
pub struct ShutdownCoordinator {
    sender: broadcast::Sender<ShutdownSignal>,
    state: Arc<AtomicU8>,
    grace_period: Duration,
}

impl ShutdownCoordinator {
    /// Create a new shutdown coordinator with the default 30s grace period
    pub fn new() -> Self {
        Self::with_grace_period(Duration::from_secs(30))
    }

    /// Create a new shutdown coordinator with a custom grace period
    pub fn with_grace_period(grace_period: Duration) -> Self {
        let (sender, _) = broadcast::channel(16);

        Self {
            sender,
            state: Arc::new(AtomicU8::new(RUNNING)),
            grace_period,
        }
    }

    /// Subscribe to shutdown signals
    ///
    /// Listeners created after a signal was published still observe it.
    pub fn subscribe(&self) -> ShutdownListener {
        ShutdownListener {
            receiver: self.sender.subscribe(),
            state: Arc::clone(&self.state),
            seen: RUNNING,
        }
    }

    /// Check if shutdown is in progress
    pub fn is_shutting_down(&self) -> bool {
        self.state.load(Ordering::SeqCst) != RUNNING
    }

    /// The most urgent signal published so far
    pub fn current(&self) -> Option<ShutdownSignal> {
        ShutdownSignal::from_level(self.state.load(Ordering::SeqCst))
    }

    pub fn grace_period(&self) -> Duration {
        self.grace_period
    }

    /// Initiate graceful shutdown, escalating to forced after the grace period
    ///
    /// Must be called from within a tokio runtime.
    pub fn shutdown(self: &Arc<Self>) -> Result<(), ShutdownError> {
        // Prevent multiple simultaneous shutdowns
        if self
            .state
            .compare_exchange(RUNNING, GRACEFUL, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Err(ShutdownError::AlreadyShuttingDown);
        }

        info!(
            "Starting graceful shutdown, in-flight iterations have {:?} to finish",
            self.grace_period
        );
        self.publish(ShutdownSignal::Graceful);

        let coordinator = Arc::clone(self);
        tokio::spawn(async move {
            tokio::time::sleep(coordinator.grace_period).await;
            if coordinator.current() == Some(ShutdownSignal::Graceful) {
                warn!("Grace period expired, escalating to forced shutdown");
                coordinator.force();
            }
        });

        Ok(())
    }

    /// Force shutdown immediately
    pub fn force(&self) {
        let previous = self.state.swap(FORCED, Ordering::SeqCst);
        if previous != FORCED {
            warn!("Forcing shutdown");
            self.publish(ShutdownSignal::Forced);
        }
    }

    /// Graceful stop on the first Ctrl-C, forced stop on the second
    pub fn spawn_ctrl_c_handler(self: &Arc<Self>) -> tokio::task::JoinHandle<()> {
        let coordinator = Arc::clone(self);
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_err() {
                warn!("Unable to listen for Ctrl-C, interactive cancellation disabled");
                return;
            }
            info!("Received Ctrl-C, stopping run (press again to force)");
            let _ = coordinator.shutdown();

            if tokio::signal::ctrl_c().await.is_ok() {
                coordinator.force();
            }
        })
    }

    fn publish(&self, signal: ShutdownSignal) {
        // No listeners is fine: late subscribers read the state instead
        let _ = self.sender.send(signal);
    }
}

impl Default for ShutdownCoordinator {
    fn default() -> Self {
        Self::new()
    }
}

/// Receiving side of a [`ShutdownCoordinator`]
#[derive(Debug)]
pub struct ShutdownListener {
    receiver: broadcast::Receiver<ShutdownSignal>,
    state: Arc<AtomicU8>,
    seen: u8,
}

impl ShutdownListener {
    /// Wait for a signal more urgent than the last one returned
    ///
    /// Never resolves if the coordinator is dropped without signalling.
    pub async fn recv(&mut self) -> ShutdownSignal {
        loop {
            let level = self.state.load(Ordering::SeqCst);
            if level > self.seen {
                self.seen = level;
                if let Some(signal) = ShutdownSignal::from_level(level) {
                    return signal;
                }
            }

            match self.receiver.recv().await {
                Ok(_) | Err(broadcast::error::RecvError::Lagged(_)) => continue,
                Err(broadcast::error::RecvError::Closed) => std::future::pending::<()>().await,
            }
        }
    }

    /// Non-blocking check for a pending signal
    pub fn try_recv(&mut self) -> Option<ShutdownSignal> {
        let level = self.state.load(Ordering::SeqCst);
        if level > self.seen {
            self.seen = level;
            ShutdownSignal::from_level(level)
        } else {
            None
        }
    }
}

/// Shutdown error types
#[derive(Debug, thiserror::Error)]
pub enum ShutdownError {
    /// Shutdown already in progress
    #[error("Shutdown already in progress")]
    AlreadyShuttingDown,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_shutdown_coordinator_basic() {
        let coordinator = Arc::new(ShutdownCoordinator::new());
        assert!(!coordinator.is_shutting_down());
        assert_eq!(coordinator.current(), None);

        coordinator.shutdown().unwrap();
        assert!(coordinator.is_shutting_down());
        assert_eq!(coordinator.current(), Some(ShutdownSignal::Graceful));
    }

    #[tokio::test]
    async fn test_double_shutdown_prevented() {
        let coordinator = Arc::new(ShutdownCoordinator::new());
        coordinator.shutdown().unwrap();
        assert!(matches!(
            coordinator.shutdown(),
            Err(ShutdownError::AlreadyShuttingDown)
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_escalates_after_grace_period() {
        let coordinator = Arc::new(ShutdownCoordinator::with_grace_period(
            Duration::from_secs(5),
        ));
        let mut listener = coordinator.subscribe();

        coordinator.shutdown().unwrap();
        assert_eq!(listener.recv().await, ShutdownSignal::Graceful);

        let started = tokio::time::Instant::now();
        assert_eq!(listener.recv().await, ShutdownSignal::Forced);
        assert!(started.elapsed() >= Duration::from_secs(5));
    }

    #[tokio::test]
    async fn test_late_subscriber_sees_signal() {
        let coordinator = Arc::new(ShutdownCoordinator::new());
        coordinator.force();

        let mut listener = coordinator.subscribe();
        assert_eq!(listener.try_recv(), Some(ShutdownSignal::Forced));
        assert_eq!(listener.try_recv(), None);
    }

    #[tokio::test]
    async fn test_force_skips_graceful() {
        let coordinator = Arc::new(ShutdownCoordinator::new());
        let mut listener = coordinator.subscribe();

        coordinator.force();
        assert_eq!(listener.recv().await, ShutdownSignal::Forced);

        // Escalation timer must not downgrade a forced stop
        assert!(coordinator.shutdown().is_err());
        assert_eq!(coordinator.current(), Some(ShutdownSignal::Forced));
    }
}
