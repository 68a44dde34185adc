//! Arrival-rate scenario configuration
//!
//! Rates are expressed as iterations per `time_unit`. Field aliases accept the
//! camelCase option names used by ramping-arrival-rate scenario scripts
//! (`startRate`, `preAllocatedVUs`, `maxVUs`, ...).

use crate::error::ConfigResult;
use crate::validation::{validate_positive, validate_rate, validate_url, Validatable};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Ramping arrival-rate scenario
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScenarioConfig {
    /// Arrival rate at the start of the run, per `time_unit`
    #[serde(alias = "startRate", default)]
    pub start_rate: f64,

    /// Unit of time the rates are expressed in
    #[serde(
        alias = "timeUnit",
        with = "humantime_serde",
        default = "default_time_unit"
    )]
    pub time_unit: Duration,

    /// Piecewise-linear ramp of the target rate
    pub stages: Vec<StageConfig>,

    /// Worker slots created before the run starts
    #[serde(
        alias = "preAllocatedVUs",
        alias = "preAllocatedWorkers",
        default = "default_pre_allocated_workers"
    )]
    pub pre_allocated_workers: usize,

    /// Upper bound on concurrently busy worker slots
    #[serde(
        alias = "maxVUs",
        alias = "maxWorkers",
        default = "default_max_workers"
    )]
    pub max_workers: usize,

    /// Run length when no stages are configured (the start rate is held)
    #[serde(
        with = "humantime_serde",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub duration: Option<Duration>,

    /// Time in-flight iterations get to finish after cancellation
    #[serde(
        alias = "gracefulStop",
        with = "humantime_serde",
        default = "default_graceful_stop"
    )]
    pub graceful_stop: Duration,

    /// URL each iteration requests; usually supplied through the environment
    #[serde(alias = "targetURL", skip_serializing_if = "Option::is_none")]
    pub target_url: Option<String>,
}

/// A single ramp segment
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageConfig {
    /// Rate reached at the end of the stage, per `time_unit`
    #[serde(alias = "targetRate")]
    pub target: f64,

    /// Length of the stage
    #[serde(with = "humantime_serde")]
    pub duration: Duration,
}

impl StageConfig {
    pub fn new(target: f64, duration: Duration) -> Self {
        Self { target, duration }
    }
}

impl Default for ScenarioConfig {
    fn default() -> Self {
        Self {
            start_rate: 10.0,
            time_unit: default_time_unit(),
            stages: Vec::new(),
            pre_allocated_workers: default_pre_allocated_workers(),
            max_workers: default_max_workers(),
            duration: Some(Duration::from_secs(30)),
            graceful_stop: default_graceful_stop(),
            target_url: None,
        }
    }
}

impl ScenarioConfig {
    /// Convert a configured rate into iterations per second
    pub fn per_second(&self, rate: f64) -> f64 {
        rate / self.time_unit.as_secs_f64()
    }

    /// Total length of the ramp, or the explicit duration for stage-less runs
    ///
    /// Saturates at `Duration::MAX`; validation rejects stages that overflow.
    pub fn total_duration(&self) -> Duration {
        if self.stages.is_empty() {
            self.duration.unwrap_or_default()
        } else {
            self.stages
                .iter()
                .fold(Duration::ZERO, |total, s| total.saturating_add(s.duration))
        }
    }
}

impl Validatable for ScenarioConfig {
    fn validate(&self) -> ConfigResult<()> {
        validate_rate(self.start_rate, "start_rate", self.domain_name())?;
        validate_positive(self.time_unit.as_nanos(), "time_unit", self.domain_name())?;

        let mut ramp = Duration::ZERO;
        for (index, stage) in self.stages.iter().enumerate() {
            stage.validate().map_err(|_| {
                self.validation_error(format!(
                    "stage {} is invalid: target must be >= 0 and duration > 0 (target={}, duration={:?})",
                    index, stage.target, stage.duration
                ))
            })?;
            ramp = ramp.checked_add(stage.duration).ok_or_else(|| {
                self.validation_error(format!("stage durations overflow at stage {}", index))
            })?;
        }

        if self.stages.is_empty() {
            match self.duration {
                Some(duration) if !duration.is_zero() => {}
                _ => {
                    return Err(self.validation_error(
                        "either stages or a non-zero duration must be configured",
                    ))
                }
            }
        }

        validate_positive(self.max_workers, "max_workers", self.domain_name())?;
        if self.pre_allocated_workers > self.max_workers {
            return Err(self.validation_error(format!(
                "pre_allocated_workers ({}) cannot exceed max_workers ({})",
                self.pre_allocated_workers, self.max_workers
            )));
        }

        if let Some(ref url) = self.target_url {
            validate_url(url, "target_url", self.domain_name())?;
        }

        Ok(())
    }

    fn domain_name(&self) -> &'static str {
        "scenario"
    }
}

impl Validatable for StageConfig {
    fn validate(&self) -> ConfigResult<()> {
        validate_rate(self.target, "target", self.domain_name())?;
        validate_positive(self.duration.as_nanos(), "duration", self.domain_name())?;
        Ok(())
    }

    fn domain_name(&self) -> &'static str {
        "scenario.stages"
    }
}

// Default value functions
fn default_time_unit() -> Duration {
    Duration::from_secs(1)
}

fn default_pre_allocated_workers() -> usize {
    10
}

fn default_max_workers() -> usize {
    100
}

fn default_graceful_stop() -> Duration {
    Duration::from_secs(30)
}
