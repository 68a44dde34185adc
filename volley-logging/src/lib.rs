//! Logging infrastructure for Volley
//!
//! Installs a global `tracing` subscriber configured from the logging domain
//! of the configuration. Installation is idempotent: if a subscriber is
//! already set (tests, embedding applications) the call is a no-op.

pub mod init;

pub use init::{build_env_filter, init_logging_from_config, init_simple_tracing};
