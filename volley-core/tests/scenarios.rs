//! End-to-end load scenarios on a paused tokio clock

use std::sync::Arc;
use std::time::Duration;
use volley_core::*;

fn secs(s: u64) -> Duration {
    Duration::from_secs(s)
}

fn burst_schedule() -> Schedule {
    Schedule::new(
        500.0,
        vec![
            Stage::new(500.0, secs(10)),
            Stage::new(2000.0, secs(10)),
            Stage::new(500.0, secs(10)),
        ],
        200,
        4000,
    )
    .unwrap()
}

/// Succeeds after `latency_ms`, failing one iteration in `fail_every`
fn task(latency_ms: u64, fail_every: u64) -> impl IterationTask {
    task_fn(move |i| async move {
        tokio::time::sleep(Duration::from_millis(latency_ms)).await;
        if fail_every > 0 && i % fail_every == 0 {
            Err(TaskError::UnexpectedStatus(500))
        } else {
            Ok(())
        }
    })
}

fn failed_rate_evaluator() -> ThresholdEvaluator {
    ThresholdEvaluator::new(vec![Threshold::parse("http_req_failed", "rate<0.01").unwrap()])
}

#[tokio::test(start_paused = true)]
async fn burst_with_fast_iterations_drops_nothing() {
    let summary = RunContext::new(burst_schedule(), failed_rate_evaluator(), task(2, 0))
        .run()
        .await;

    assert_eq!(summary.iterations.dropped, 0);
    assert!((summary.iterations.total as i64 - 30_000).abs() <= 1);
    assert_eq!(summary.iterations.success, summary.iterations.total);
    assert!(summary.passed);
    assert!(summary.workers.peak_busy <= 4000);
}

#[tokio::test(start_paused = true)]
async fn burst_with_one_percent_failures_fails_threshold() {
    let summary = RunContext::new(burst_schedule(), failed_rate_evaluator(), task(2, 100))
        .run()
        .await;

    assert!(summary.iterations.failed_rate >= 0.01);
    assert!(!summary.passed);
    assert_eq!(summary.exit_code(), 99);

    let violations: Vec<_> = summary.verdict.violations().collect();
    assert_eq!(violations.len(), 1);
    assert_eq!(violations[0].metric, MetricName::HttpReqFailed);
    assert_eq!(violations[0].expression, "rate<0.01");
}

#[tokio::test(start_paused = true)]
async fn saturated_pool_drops_the_burst() {
    // 100 arrivals inside a single 10ms tick against five slow workers
    let schedule = Schedule::new(10_000.0, vec![], 5, 5)
        .unwrap()
        .with_hold(Duration::from_millis(10))
        .unwrap();
    let pool = WorkerPool::new(5, 5);
    let metrics = Arc::new(MetricsCollector::new());

    let report = LoadDriver::new(
        ArrivalScheduler::new(schedule),
        pool.clone(),
        Arc::clone(&metrics),
        Arc::new(task(1_000, 0)),
    )
    .run()
    .await;

    let snapshot = metrics.snapshot();
    assert_eq!(report.arrivals, 100);
    assert!(snapshot.dropped_count >= 95, "dropped {}", snapshot.dropped_count);
    assert_eq!(pool.stats().peak_busy, 5);
    assert_eq!(pool.stats().created, 5);
    assert_eq!(
        snapshot.total_iterations,
        snapshot.success_count + snapshot.failed_count + snapshot.dropped_count
    );
}

#[tokio::test(start_paused = true)]
async fn stage_less_schedule_holds_start_rate() {
    let schedule = Schedule::new(100.0, vec![], 5, 5)
        .unwrap()
        .with_hold(secs(1))
        .unwrap();

    let summary = RunContext::new(schedule, ThresholdEvaluator::default(), task(1, 0))
        .run()
        .await;

    assert!((summary.iterations.total as i64 - 100).abs() <= 1);
    assert_eq!(summary.iterations.dropped, 0);
    assert!(summary.passed);
}

#[tokio::test(start_paused = true)]
async fn cancelled_run_keeps_recorded_metrics() {
    let context = RunContext::new(burst_schedule(), failed_rate_evaluator(), task(50, 0))
        .with_grace_period(secs(5));
    let shutdown = context.shutdown_handle();

    tokio::spawn(async move {
        tokio::time::sleep(secs(2)).await;
        shutdown.shutdown().unwrap();
    });

    let summary = context.run().await;

    assert_eq!(summary.stopped_by.as_deref(), Some("graceful"));
    // Roughly two seconds at 500/s were issued before the stop
    assert!(
        (990..=1010).contains(&summary.iterations.total),
        "total {}",
        summary.iterations.total
    );
    assert_eq!(summary.iterations.interrupted, 0);
    assert_eq!(summary.iterations.success, summary.iterations.total);
    assert!(summary.elapsed_secs < 3.0);
}

#[test]
fn invalid_schedules_are_rejected_before_running() {
    assert!(Schedule::new(-5.0, vec![], 1, 1).is_err());
    assert!(Schedule::new(1.0, vec![Stage::new(1.0, Duration::ZERO)], 1, 1).is_err());
    assert!(Schedule::new(1.0, vec![], 10, 5).is_err());
    assert!(Threshold::parse("http_req_failed", "rate<<0.01").is_err());
}
