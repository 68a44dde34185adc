//! Error types for run preparation
//!
//! Only configuration problems are fatal. Everything that happens during a
//! run (task failures, pool exhaustion, threshold violations) is recorded in
//! the metrics and the verdict instead of being returned as an error.

use thiserror::Error;
use volley_config::ConfigError;

/// Invalid schedule or threshold definition, reported before a run starts
#[derive(Error, Debug)]
pub enum ConfigurationError {
    #[error("{field} must be a finite rate >= 0, got {value}")]
    InvalidRate { field: String, value: f64 },

    #[error("stage {index} has zero duration")]
    ZeroDurationStage { index: usize },

    #[error("stage durations overflow at stage {index}")]
    DurationOverflow { index: usize },

    #[error("pre-allocated workers ({pre_allocated}) exceed max workers ({max})")]
    PreallocatedExceedsMax { pre_allocated: usize, max: usize },

    #[error("max workers must be at least 1")]
    NoWorkers,

    #[error("schedule has no stages and no run duration")]
    NoDuration,

    #[error("invalid threshold '{expression}' on {metric}: {reason}")]
    InvalidThreshold {
        metric: String,
        expression: String,
        reason: String,
    },

    #[error(transparent)]
    Config(#[from] ConfigError),
}
