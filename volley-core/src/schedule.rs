//! Rate profile definition
//!
//! A [`Schedule`] is the immutable description of a run: the rate at t=0,
//! the ramp stages, and the worker pool bounds. Rates are iterations per
//! second.

use crate::error::ConfigurationError;
use std::time::Duration;
use volley_config::ScenarioConfig;

/// A ramp segment: the rate moves linearly to `target_rate` over `duration`
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Stage {
    pub target_rate: f64,
    pub duration: Duration,
}

impl Stage {
    pub fn new(target_rate: f64, duration: Duration) -> Self {
        Self {
            target_rate,
            duration,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Schedule {
    start_rate: f64,
    stages: Vec<Stage>,
    pre_allocated: usize,
    max_concurrent: usize,
    ramp: Duration,
    hold: Option<Duration>,
}

impl Schedule {
    pub fn new(
        start_rate: f64,
        stages: Vec<Stage>,
        pre_allocated: usize,
        max_concurrent: usize,
    ) -> Result<Self, ConfigurationError> {
        check_rate("start rate", start_rate)?;
        let mut ramp = Duration::ZERO;
        for (index, stage) in stages.iter().enumerate() {
            check_rate(&format!("stage {} target rate", index), stage.target_rate)?;
            if stage.duration.is_zero() {
                return Err(ConfigurationError::ZeroDurationStage { index });
            }
            ramp = ramp
                .checked_add(stage.duration)
                .ok_or(ConfigurationError::DurationOverflow { index })?;
        }
        if max_concurrent == 0 {
            return Err(ConfigurationError::NoWorkers);
        }
        if pre_allocated > max_concurrent {
            return Err(ConfigurationError::PreallocatedExceedsMax {
                pre_allocated,
                max: max_concurrent,
            });
        }

        Ok(Self {
            start_rate,
            stages,
            pre_allocated,
            max_concurrent,
            ramp,
            hold: None,
        })
    }

    /// Hold the start rate for `duration`; used when there are no stages
    pub fn with_hold(mut self, duration: Duration) -> Result<Self, ConfigurationError> {
        if duration.is_zero() {
            return Err(ConfigurationError::NoDuration);
        }
        self.hold = Some(duration);
        Ok(self)
    }

    pub fn start_rate(&self) -> f64 {
        self.start_rate
    }

    pub fn stages(&self) -> &[Stage] {
        &self.stages
    }

    pub fn pre_allocated(&self) -> usize {
        self.pre_allocated
    }

    pub fn max_concurrent(&self) -> usize {
        self.max_concurrent
    }

    /// Length of the arrival phase
    ///
    /// The sum of stage durations; a stage-less schedule runs for its hold
    /// duration (zero if none was set, which yields no arrivals).
    pub fn total_duration(&self) -> Duration {
        if self.stages.is_empty() {
            self.hold.unwrap_or_default()
        } else {
            self.ramp
        }
    }

    /// Highest rate reached anywhere in the profile
    pub fn peak_rate(&self) -> f64 {
        self.stages
            .iter()
            .map(|s| s.target_rate)
            .fold(self.start_rate, f64::max)
    }

    /// Integral of the rate profile over the run: the expected arrival count
    pub fn expected_arrivals(&self) -> f64 {
        if self.stages.is_empty() {
            return self.start_rate * self.total_duration().as_secs_f64();
        }

        let mut previous = self.start_rate;
        self.stages
            .iter()
            .map(|stage| {
                let area = (previous + stage.target_rate) / 2.0 * stage.duration.as_secs_f64();
                previous = stage.target_rate;
                area
            })
            .sum()
    }
}

impl TryFrom<&ScenarioConfig> for Schedule {
    type Error = ConfigurationError;

    fn try_from(config: &ScenarioConfig) -> Result<Self, Self::Error> {
        let stages = config
            .stages
            .iter()
            .map(|s| Stage::new(config.per_second(s.target), s.duration))
            .collect();

        let schedule = Schedule::new(
            config.per_second(config.start_rate),
            stages,
            config.pre_allocated_workers,
            config.max_workers,
        )?;

        if config.stages.is_empty() {
            schedule.with_hold(config.duration.ok_or(ConfigurationError::NoDuration)?)
        } else {
            Ok(schedule)
        }
    }
}

fn check_rate(field: &str, value: f64) -> Result<(), ConfigurationError> {
    if value.is_finite() && value >= 0.0 {
        Ok(())
    } else {
        Err(ConfigurationError::InvalidRate {
            field: field.to_string(),
            value,
        })
    }
}
