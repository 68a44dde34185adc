//! HTTP client functionality for Volley
//!
//! Each load-test iteration issues one GET through an [`HttpClient`]. The
//! [`HttpManager`] implementation keeps a single pooled connection client for
//! the whole run and supports an offline mode that answers from registered
//! mocks instead of the network.

pub mod client;
pub mod config;
pub mod errors;
pub mod types;

// Re-export main types for convenience
pub use client::{HttpClient, HttpManager};
pub use config::HttpConfig;
pub use errors::HttpError;
pub use types::{HttpResponse, MockResponse};
