//! HTTP response types

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Outcome of a completed request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HttpResponse {
    pub status: u16,
    pub body_bytes: usize,
}

impl HttpResponse {
    /// Statuses 200-399 count as success; anything else is a failed request
    pub fn is_expected(&self) -> bool {
        (200..400).contains(&self.status)
    }
}

/// Canned response served in offline mode
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MockResponse {
    pub status: u16,
    pub latency: Duration,
}

impl MockResponse {
    pub fn status(status: u16) -> Self {
        Self {
            status,
            latency: Duration::ZERO,
        }
    }

    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }
}
