//! Pass/fail threshold configuration
//!
//! Maps a metric name to one expression (`"rate<0.01"`) or a list of
//! expressions (`["p(95)<500", "avg<200"]`). Expressions are kept as strings
//! here; they are parsed into comparisons when a run is prepared.

use crate::error::ConfigResult;
use crate::validation::{validate_required_string, Validatable};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Threshold expressions keyed by metric name
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ThresholdsConfig {
    pub metrics: BTreeMap<String, ThresholdExpressions>,
}

/// One or more expressions attached to a metric
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ThresholdExpressions {
    Single(String),
    Many(Vec<String>),
}

impl ThresholdExpressions {
    pub fn iter(&self) -> impl Iterator<Item = &str> {
        let slice: &[String] = match self {
            ThresholdExpressions::Single(expr) => std::slice::from_ref(expr),
            ThresholdExpressions::Many(exprs) => exprs.as_slice(),
        };
        slice.iter().map(String::as_str)
    }
}

impl ThresholdsConfig {
    /// Add an expression for a metric, keeping any existing ones
    pub fn insert(&mut self, metric: impl Into<String>, expression: impl Into<String>) {
        let metric = metric.into();
        let mut exprs = match self.metrics.remove(&metric) {
            Some(ThresholdExpressions::Single(existing)) => vec![existing],
            Some(ThresholdExpressions::Many(existing)) => existing,
            None => Vec::new(),
        };
        exprs.push(expression.into());
        self.metrics.insert(metric, ThresholdExpressions::Many(exprs));
    }

    /// Iterate `(metric, expression)` pairs in metric-name order
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.metrics
            .iter()
            .flat_map(|(metric, exprs)| exprs.iter().map(move |expr| (metric.as_str(), expr)))
    }

    pub fn is_empty(&self) -> bool {
        self.iter().next().is_none()
    }
}

impl Validatable for ThresholdsConfig {
    fn validate(&self) -> ConfigResult<()> {
        for (metric, exprs) in &self.metrics {
            validate_required_string(metric, "metric name", self.domain_name())?;
            if exprs.iter().next().is_none() {
                return Err(self.validation_error(format!(
                    "metric '{}' has no threshold expressions",
                    metric
                )));
            }
            for expr in exprs.iter() {
                validate_required_string(expr, metric, self.domain_name())?;
            }
        }
        Ok(())
    }

    fn domain_name(&self) -> &'static str {
        "thresholds"
    }
}
