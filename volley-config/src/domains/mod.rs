//! Domain-specific configuration modules

pub mod http;
pub mod logging;
pub mod scenario;
pub mod thresholds;
pub mod utils;

use crate::error::{ConfigError, ConfigResult};
use crate::validation::Validatable;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Main Volley configuration combining all domains
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct VolleyConfig {
    /// Arrival-rate scenario
    #[serde(default)]
    pub scenario: scenario::ScenarioConfig,

    /// Pass/fail thresholds evaluated at the end of the run
    #[serde(default, skip_serializing_if = "thresholds::ThresholdsConfig::is_empty")]
    pub thresholds: thresholds::ThresholdsConfig,

    /// HTTP client configuration
    #[serde(default)]
    pub http: http::HttpConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: logging::LoggingConfig,
}

impl VolleyConfig {
    /// Validate all domain configurations
    pub fn validate_all(&self) -> ConfigResult<()> {
        self.scenario.validate()?;
        self.thresholds.validate()?;
        self.http.validate()?;
        self.logging.validate()?;
        Ok(())
    }

    /// The URL iterations request; a run cannot start without one
    pub fn target_url(&self) -> ConfigResult<&str> {
        self.scenario.target_url.as_deref().ok_or_else(|| {
            ConfigError::ValidationError(
                "no target URL configured (set scenario.target_url, VOLLEY_TARGET_URL or URL)"
                    .to_string(),
            )
        })
    }

    /// Generate a sample configuration file
    pub fn generate_sample() -> String {
        let mut config = VolleyConfig::default();
        config.scenario = scenario::ScenarioConfig {
            start_rate: 500.0,
            stages: vec![
                scenario::StageConfig::new(500.0, Duration::from_secs(10)),
                scenario::StageConfig::new(2000.0, Duration::from_secs(10)),
                scenario::StageConfig::new(500.0, Duration::from_secs(10)),
            ],
            pre_allocated_workers: 200,
            max_workers: 4000,
            duration: None,
            ..Default::default()
        };
        config.thresholds.insert("http_req_failed", "rate<0.01");
        config.thresholds.insert("http_req_duration", "p(95)<500");

        serde_yaml::to_string(&config)
            .unwrap_or_else(|_| "# Failed to generate sample config".to_string())
    }
}
