//! Pass/fail thresholds over run metrics
//!
//! Expressions use the `aggregation operator bound` form, e.g. `rate<0.01`
//! or `p(95) <= 500`. They are parsed once, when the run is prepared, into
//! a [`ThresholdExpr`]; evaluation is a pure function of the metrics
//! snapshot.

use crate::error::ConfigurationError;
use crate::metrics::Metrics;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;
use std::fmt;
use std::str::FromStr;
use volley_config::ThresholdsConfig;

static EXPRESSION: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"^\s*(rate|count|avg|min|max|med|p\(\s*([0-9]+(?:\.[0-9]+)?)\s*\))\s*(<=|>=|==|!=|<|>)\s*(-?[0-9]+(?:\.[0-9]+)?(?:[eE][-+]?[0-9]+)?)\s*$",
    )
    .expect("threshold expression pattern is valid")
});

/// Metrics a threshold can be attached to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MetricName {
    /// Share (or count) of iterations that failed
    HttpReqFailed,
    /// Iteration latency in milliseconds
    HttpReqDuration,
    /// Iterations that were started
    Iterations,
    /// Arrivals dropped for lack of a worker
    DroppedIterations,
}

impl MetricName {
    pub fn as_str(&self) -> &'static str {
        match self {
            MetricName::HttpReqFailed => "http_req_failed",
            MetricName::HttpReqDuration => "http_req_duration",
            MetricName::Iterations => "iterations",
            MetricName::DroppedIterations => "dropped_iterations",
        }
    }

    fn supports(&self, aggregation: Aggregation) -> bool {
        use Aggregation::*;
        match self {
            MetricName::HttpReqFailed => matches!(aggregation, Rate | Count),
            MetricName::HttpReqDuration => !matches!(aggregation, Rate),
            MetricName::Iterations | MetricName::DroppedIterations => {
                matches!(aggregation, Rate | Count)
            }
        }
    }
}

impl fmt::Display for MetricName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MetricName {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "http_req_failed" => Ok(MetricName::HttpReqFailed),
            "http_req_duration" => Ok(MetricName::HttpReqDuration),
            "iterations" => Ok(MetricName::Iterations),
            "dropped_iterations" => Ok(MetricName::DroppedIterations),
            other => Err(format!("unknown metric '{}'", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Aggregation {
    Rate,
    Count,
    Avg,
    Min,
    Max,
    Med,
    /// Percentile in (0, 100]
    Percentile(f64),
}

impl fmt::Display for Aggregation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Aggregation::Rate => f.write_str("rate"),
            Aggregation::Count => f.write_str("count"),
            Aggregation::Avg => f.write_str("avg"),
            Aggregation::Min => f.write_str("min"),
            Aggregation::Max => f.write_str("max"),
            Aggregation::Med => f.write_str("med"),
            Aggregation::Percentile(p) => write!(f, "p({})", p),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Comparison {
    LessThan,
    LessOrEqual,
    GreaterThan,
    GreaterOrEqual,
    Equal,
    NotEqual,
}

impl Comparison {
    pub fn holds(&self, actual: f64, bound: f64) -> bool {
        match self {
            Comparison::LessThan => actual < bound,
            Comparison::LessOrEqual => actual <= bound,
            Comparison::GreaterThan => actual > bound,
            Comparison::GreaterOrEqual => actual >= bound,
            Comparison::Equal => actual == bound,
            Comparison::NotEqual => actual != bound,
        }
    }

    fn parse(op: &str) -> Option<Self> {
        match op {
            "<" => Some(Comparison::LessThan),
            "<=" => Some(Comparison::LessOrEqual),
            ">" => Some(Comparison::GreaterThan),
            ">=" => Some(Comparison::GreaterOrEqual),
            "==" => Some(Comparison::Equal),
            "!=" => Some(Comparison::NotEqual),
            _ => None,
        }
    }
}

impl fmt::Display for Comparison {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let op = match self {
            Comparison::LessThan => "<",
            Comparison::LessOrEqual => "<=",
            Comparison::GreaterThan => ">",
            Comparison::GreaterOrEqual => ">=",
            Comparison::Equal => "==",
            Comparison::NotEqual => "!=",
        };
        f.write_str(op)
    }
}

/// Parsed `aggregation operator bound`
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ThresholdExpr {
    pub aggregation: Aggregation,
    pub comparison: Comparison,
    pub bound: f64,
}

impl FromStr for ThresholdExpr {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let caps = EXPRESSION
            .captures(s)
            .ok_or_else(|| "expected '<aggregation><operator><number>'".to_string())?;

        let aggregation = match &caps[1] {
            "rate" => Aggregation::Rate,
            "count" => Aggregation::Count,
            "avg" => Aggregation::Avg,
            "min" => Aggregation::Min,
            "max" => Aggregation::Max,
            "med" => Aggregation::Med,
            _ => {
                let p: f64 = caps[2]
                    .parse()
                    .map_err(|_| format!("invalid percentile '{}'", &caps[2]))?;
                if !(p > 0.0 && p <= 100.0) {
                    return Err(format!("percentile {} outside (0, 100]", p));
                }
                Aggregation::Percentile(p)
            }
        };

        let comparison = Comparison::parse(&caps[3])
            .ok_or_else(|| format!("unknown operator '{}'", &caps[3]))?;
        let bound: f64 = caps[4]
            .parse()
            .map_err(|_| format!("invalid bound '{}'", &caps[4]))?;

        Ok(Self {
            aggregation,
            comparison,
            bound,
        })
    }
}

impl fmt::Display for ThresholdExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}{}", self.aggregation, self.comparison, self.bound)
    }
}

/// A metric paired with one parsed expression
#[derive(Debug, Clone, PartialEq)]
pub struct Threshold {
    pub metric: MetricName,
    pub expr: ThresholdExpr,
    /// Expression as written in the configuration
    pub source: String,
}

impl Threshold {
    pub fn parse(metric: &str, expression: &str) -> Result<Self, ConfigurationError> {
        let invalid = |reason: String| ConfigurationError::InvalidThreshold {
            metric: metric.to_string(),
            expression: expression.to_string(),
            reason,
        };

        let name: MetricName = metric.parse().map_err(invalid)?;
        let expr: ThresholdExpr = expression.parse().map_err(invalid)?;
        if !name.supports(expr.aggregation) {
            return Err(invalid(format!(
                "{} does not support '{}'",
                name, expr.aggregation
            )));
        }

        Ok(Self {
            metric: name,
            expr,
            source: expression.trim().to_string(),
        })
    }

    /// Parse every expression in the configuration, failing on the first bad one
    pub fn from_config(config: &ThresholdsConfig) -> Result<Vec<Self>, ConfigurationError> {
        config
            .iter()
            .map(|(metric, expression)| Threshold::parse(metric, expression))
            .collect()
    }

    /// The metric value this threshold compares against its bound
    pub fn actual(&self, metrics: &Metrics) -> f64 {
        use Aggregation::*;
        match (self.metric, self.expr.aggregation) {
            (MetricName::HttpReqFailed, Rate) => metrics.failed_rate(),
            (MetricName::HttpReqFailed, _) => metrics.failed_count as f64,

            (MetricName::HttpReqDuration, Count) => metrics.latency.len() as f64,
            (MetricName::HttpReqDuration, Avg) => metrics.latency_avg_ms(),
            (MetricName::HttpReqDuration, Min) => metrics.latency_min_ms(),
            (MetricName::HttpReqDuration, Max) => metrics.latency_max_ms(),
            (MetricName::HttpReqDuration, Med) => metrics.latency_percentile_ms(50.0),
            (MetricName::HttpReqDuration, Percentile(p)) => metrics.latency_percentile_ms(p),
            (MetricName::HttpReqDuration, _) => 0.0,

            (MetricName::Iterations, Rate) => metrics.per_second(metrics.completed_iterations()),
            (MetricName::Iterations, _) => metrics.completed_iterations() as f64,

            (MetricName::DroppedIterations, Rate) => metrics.per_second(metrics.dropped_count),
            (MetricName::DroppedIterations, _) => metrics.dropped_count as f64,
        }
    }

    pub fn check(&self, metrics: &Metrics) -> ThresholdResult {
        let actual = self.actual(metrics);
        ThresholdResult {
            metric: self.metric,
            expression: self.source.clone(),
            actual,
            passed: self.expr.comparison.holds(actual, self.expr.bound),
        }
    }
}

impl fmt::Display for Threshold {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.metric, self.source)
    }
}

/// Outcome of one threshold
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ThresholdResult {
    pub metric: MetricName,
    pub expression: String,
    pub actual: f64,
    pub passed: bool,
}

impl fmt::Display for ThresholdResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mark = if self.passed { "PASS" } else { "FAIL" };
        write!(
            f,
            "{} {}: {} (actual {:.4})",
            mark, self.metric, self.expression, self.actual
        )
    }
}

/// Run verdict: every threshold with its result
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Verdict {
    pub results: Vec<ThresholdResult>,
}

impl Verdict {
    /// Process exit code for a run that failed its thresholds
    pub const FAILED_EXIT_CODE: i32 = 99;

    /// True when every threshold held; a run without thresholds passes
    pub fn passed(&self) -> bool {
        self.results.iter().all(|r| r.passed)
    }

    pub fn violations(&self) -> impl Iterator<Item = &ThresholdResult> {
        self.results.iter().filter(|r| !r.passed)
    }

    pub fn exit_code(&self) -> i32 {
        if self.passed() {
            0
        } else {
            Self::FAILED_EXIT_CODE
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct ThresholdEvaluator {
    thresholds: Vec<Threshold>,
}

impl ThresholdEvaluator {
    pub fn new(thresholds: Vec<Threshold>) -> Self {
        Self { thresholds }
    }

    pub fn from_config(config: &ThresholdsConfig) -> Result<Self, ConfigurationError> {
        Threshold::from_config(config).map(Self::new)
    }

    pub fn thresholds(&self) -> &[Threshold] {
        &self.thresholds
    }

    /// Check every threshold; no short-circuit on the first failure
    pub fn evaluate(&self, metrics: &Metrics) -> Verdict {
        Verdict {
            results: self.thresholds.iter().map(|t| t.check(metrics)).collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::Instant;
    use crate::metrics::{IterationOutcome, IterationResult, MetricsCollector};
    use std::time::Duration;

    fn metrics(success: u64, failed: u64, dropped: u64, latency_ms: u64) -> Metrics {
        let collector = MetricsCollector::new();
        let start = Instant::now();
        let end = start + Duration::from_millis(latency_ms);
        for _ in 0..success {
            collector.record(IterationResult::new(start, end, IterationOutcome::Success));
        }
        for _ in 0..failed {
            collector.record(IterationResult::new(start, end, IterationOutcome::Failure));
        }
        for _ in 0..dropped {
            collector.record(IterationResult::dropped(start));
        }
        collector.snapshot().with_elapsed(Duration::from_secs(10))
    }

    #[test]
    fn test_parse_expressions() {
        let expr: ThresholdExpr = "rate<0.01".parse().unwrap();
        assert_eq!(expr.aggregation, Aggregation::Rate);
        assert_eq!(expr.comparison, Comparison::LessThan);
        assert_eq!(expr.bound, 0.01);

        let expr: ThresholdExpr = " p(99.9) >= 1.5e3 ".parse().unwrap();
        assert_eq!(expr.aggregation, Aggregation::Percentile(99.9));
        assert_eq!(expr.comparison, Comparison::GreaterOrEqual);
        assert_eq!(expr.bound, 1500.0);

        let expr: ThresholdExpr = "count!=0".parse().unwrap();
        assert_eq!(expr.comparison, Comparison::NotEqual);
    }

    #[test]
    fn test_parse_rejects_garbage() {
        for bad in ["", "rate", "rate<", "rate<<1", "rates<1", "p(0)<1", "p(101)<1", "avg<abc"] {
            assert!(bad.parse::<ThresholdExpr>().is_err(), "accepted {:?}", bad);
        }
    }

    #[test]
    fn test_metric_aggregation_compatibility() {
        assert!(Threshold::parse("http_req_failed", "rate<0.01").is_ok());
        assert!(Threshold::parse("http_req_duration", "p(95)<500").is_ok());
        assert!(Threshold::parse("dropped_iterations", "count==0").is_ok());

        let err = Threshold::parse("http_req_failed", "p(95)<1").unwrap_err();
        assert!(err.to_string().contains("does not support"));
        let err = Threshold::parse("http_req_duration", "rate<1").unwrap_err();
        assert!(matches!(err, ConfigurationError::InvalidThreshold { .. }));
        assert!(Threshold::parse("vus", "max<10").is_err());
    }

    #[test]
    fn test_failed_rate_threshold() {
        let threshold = Threshold::parse("http_req_failed", "rate<0.01").unwrap();

        let result = threshold.check(&metrics(990, 10, 0, 1));
        assert!((result.actual - 0.01).abs() < 1e-12);
        assert!(!result.passed);

        assert!(threshold.check(&metrics(999, 1, 0, 1)).passed);
    }

    #[test]
    fn test_empty_run_rate_is_zero() {
        let threshold = Threshold::parse("http_req_failed", "rate<0.01").unwrap();
        let result = threshold.check(&metrics(0, 0, 0, 0));
        assert_eq!(result.actual, 0.0);
        assert!(result.passed);
    }

    #[test]
    fn test_duration_and_iteration_values() {
        let m = metrics(40, 0, 10, 20);

        let p95 = Threshold::parse("http_req_duration", "p(95)<25").unwrap();
        assert!((p95.actual(&m) - 20.0).abs() < 0.05);
        let avg = Threshold::parse("http_req_duration", "avg<25").unwrap();
        assert!((avg.actual(&m) - 20.0).abs() < 0.05);

        let iterations = Threshold::parse("iterations", "count==40").unwrap();
        assert!(iterations.check(&m).passed);
        let rate = Threshold::parse("iterations", "rate>=4").unwrap();
        assert!((rate.actual(&m) - 4.0).abs() < 1e-12);

        let dropped = Threshold::parse("dropped_iterations", "rate<1").unwrap();
        assert!((dropped.actual(&m) - 1.0).abs() < 1e-12);
        assert!(!dropped.check(&m).passed);
    }

    #[test]
    fn test_duration_extremes_match_summary() {
        let collector = MetricsCollector::new();
        let start = Instant::now();
        for micros in [1_234u64, 5_000, 80_017] {
            let end = start + Duration::from_micros(micros);
            collector.record(IterationResult::new(start, end, IterationOutcome::Success));
        }
        let m = collector.snapshot();
        let summary = m.latency_summary();

        let min = Threshold::parse("http_req_duration", "min>1").unwrap();
        assert_eq!(min.actual(&m), summary.min_ms);
        let max = Threshold::parse("http_req_duration", "max<100").unwrap();
        assert_eq!(max.actual(&m), summary.max_ms);
        let avg = Threshold::parse("http_req_duration", "avg<100").unwrap();
        assert_eq!(avg.actual(&m), summary.avg_ms);

        let empty = MetricsCollector::new().snapshot();
        assert_eq!(min.actual(&empty), 0.0);
    }

    #[test]
    fn test_verdict_reports_every_violation() {
        let mut config = ThresholdsConfig::default();
        config.insert("http_req_failed", "rate<0.01");
        config.insert("http_req_failed", "count<5");
        config.insert("http_req_duration", "p(95)<500");

        let evaluator = ThresholdEvaluator::from_config(&config).unwrap();
        assert_eq!(evaluator.thresholds().len(), 3);

        let verdict = evaluator.evaluate(&metrics(90, 10, 0, 5));
        assert!(!verdict.passed());
        assert_eq!(verdict.exit_code(), Verdict::FAILED_EXIT_CODE);
        let violated: Vec<_> = verdict.violations().map(|r| r.expression.as_str()).collect();
        assert_eq!(violated, vec!["rate<0.01", "count<5"]);
    }

    #[test]
    fn test_no_thresholds_passes() {
        let verdict = ThresholdEvaluator::default().evaluate(&metrics(0, 5, 0, 1));
        assert!(verdict.passed());
        assert_eq!(verdict.exit_code(), 0);
    }

    #[test]
    fn test_evaluation_is_deterministic() {
        let evaluator = ThresholdEvaluator::new(vec![
            Threshold::parse("http_req_failed", "rate<0.05").unwrap(),
            Threshold::parse("http_req_duration", "med<=10").unwrap(),
        ]);
        let m = metrics(95, 5, 3, 10);
        assert_eq!(evaluator.evaluate(&m), evaluator.evaluate(&m));
    }
}
