//! Domain-driven configuration management for Volley
//!
//! Configuration is split by functional domain (scenario, thresholds, HTTP,
//! logging), each with its own defaults and validation, and loaded from YAML
//! with environment variable overrides.

pub mod error;
pub mod loader;
pub mod validation;

// Domain-specific configuration modules
pub mod domains;

// Re-export main types
pub use error::{ConfigError, ConfigResult};
pub use loader::ConfigLoader;
pub use validation::Validatable;

// Re-export domain configurations
pub use domains::{
    http::HttpConfig,
    logging::{LogFormat, LogLevel, LoggingConfig},
    scenario::{ScenarioConfig, StageConfig},
    thresholds::{ThresholdExpressions, ThresholdsConfig},
    VolleyConfig,
};
