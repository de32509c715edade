//! Worker-loop behavior under virtual time: scheduling, retry budget,
//! classification, and the reporting contract, all against scripted
//! collectors and a scripted platform client.

mod helpers;

use std::sync::atomic::Ordering;
use std::time::Duration;

use tokio::time::Instant;

use camguard_collector::error::CollectorError;
use camguard_collector::models::check::CheckStatus;
use camguard_collector::services::queue::LOW_PRIORITY;
use camguard_collector::services::worker::{run_worker_pool, worker};

use helpers::*;

#[tokio::test(start_paused = true)]
async fn liveness_check_reports_once_without_comparison() {
    let api = MockApi::new();
    let ctx = make_context(test_registry(), Duration::from_secs(60));
    ctx.queue.push(0, make_job(&api, "ping", 2));

    let handle = tokio::spawn(worker("test-worker".to_string(), ctx.clone()));
    wait_for("one liveness report", || api.report_count() == 1).await;

    // Give the worker room to misbehave before asserting.
    tokio::time::sleep(Duration::from_secs(10)).await;
    handle.abort();

    assert_eq!(api.report_count(), 1);
    let report = api.nth_report(0);
    assert!(!report.has_image);
    assert_eq!(report.status, Some(CheckStatus::NoChange));
    assert_eq!(report.status.map(CheckStatus::code), Some(0));
    assert_eq!(report.detail, None);
    assert_eq!(api.compare_calls.load(Ordering::SeqCst), 0);
    assert!(api.inserted_images.lock().unwrap().is_empty());
    assert!(ctx.queue.is_empty());
}

#[tokio::test(start_paused = true)]
async fn missing_reference_bootstraps_and_reports_nochange() {
    let api = MockApi::new();
    *api.reference.lock().unwrap() = None;
    let ctx = make_context(test_registry(), Duration::from_secs(60));
    ctx.queue.push(1, make_job(&api, "cam", 2));

    let handle = tokio::spawn(worker("test-worker".to_string(), ctx.clone()));
    wait_for("bootstrap report", || api.report_count() == 1).await;
    tokio::time::sleep(Duration::from_secs(10)).await;
    handle.abort();

    assert_eq!(api.bootstrap_calls.load(Ordering::SeqCst), 1);
    assert_eq!(api.compare_calls.load(Ordering::SeqCst), 0);

    let report = api.nth_report(0);
    assert_eq!(report.status, Some(CheckStatus::NoChange));
    assert!(report.has_image);
    // Bootstrap already persisted the capture; no second insert.
    assert!(report.image_id.is_some());
    assert!(api.inserted_images.lock().unwrap().is_empty());
    assert_eq!(
        report.detail.as_deref(),
        Some("No reference image for camera")
    );
    // The no-reference condition is terminal: nothing was requeued.
    assert_eq!(api.report_count(), 1);
    assert!(ctx.queue.is_empty());
}

#[tokio::test(start_paused = true)]
async fn comparison_error_requeues_with_reduced_budget() {
    let api = MockApi::new();
    api.compare_always_fails.store(true, Ordering::SeqCst);
    // Retry period far in the future so the requeued job stays parked.
    let ctx = make_context(test_registry(), Duration::from_secs(3600));
    ctx.queue.push(1, make_job(&api, "cam", 2));

    let handle = tokio::spawn(worker("test-worker".to_string(), ctx.clone()));
    wait_for("first failure report", || api.report_count() == 1).await;
    wait_for("job parked back in queue", || ctx.queue.len() == 1).await;
    handle.abort();

    let parked = ctx.queue.try_pop().expect("requeued job");
    assert_eq!(parked.retries_remaining, 1);
    let not_before = parked.not_before.expect("retry delay set");
    assert!(not_before > Instant::now());

    let report = api.nth_report(0);
    assert_eq!(report.status, Some(CheckStatus::BadQuality));
    assert!(report.has_image);
    assert!(report.image_id.is_some());
    assert_eq!(api.report_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn exhausted_budget_drops_job_after_two_reports() {
    let api = MockApi::new();
    // The service would succeed on a third attempt, but a budget of 2
    // allows only one requeue: the third scripted result must never be
    // consumed.
    {
        let mut script = api.compare_script.lock().unwrap();
        script.push_back(Err(CollectorError::ComparisonService(
            "detector rejected the request".to_string(),
        )));
        script.push_back(Err(CollectorError::ComparisonService(
            "detector rejected the request".to_string(),
        )));
        script.push_back(Ok(Default::default()));
    }
    let ctx = make_context(test_registry(), Duration::from_millis(200));
    ctx.queue.push(1, make_job(&api, "cam", 2));

    let handle = tokio::spawn(worker("test-worker".to_string(), ctx.clone()));
    wait_for("two failure reports", || api.report_count() == 2).await;
    wait_for("queue drained", || ctx.queue.is_empty()).await;

    // The job must never reappear.
    tokio::time::sleep(Duration::from_secs(30)).await;
    handle.abort();

    assert_eq!(api.report_count(), 2);
    assert_eq!(api.compare_calls.load(Ordering::SeqCst), 2);
    assert_eq!(api.compare_script.lock().unwrap().len(), 1);
    // One persisted capture per attempt.
    assert_eq!(api.inserted_images.lock().unwrap().len(), 2);
    assert!(ctx.queue.is_empty());
}

#[tokio::test(start_paused = true)]
async fn future_job_is_rescheduled_without_touching_budget() {
    let api = MockApi::new();
    let ctx = make_context(test_registry(), Duration::from_secs(60));
    let not_before = Instant::now() + Duration::from_secs(3600);
    let mut job = make_job(&api, "ping", 2);
    job.not_before = Some(not_before);
    ctx.queue.push(LOW_PRIORITY, job);

    let handle = tokio::spawn(worker("test-worker".to_string(), ctx.clone()));

    // Plenty of delay-gate cycles, far short of the execution time.
    tokio::time::sleep(Duration::from_secs(30)).await;
    assert_eq!(api.report_count(), 0);

    wait_for("job parked back in queue", || ctx.queue.len() == 1).await;
    handle.abort();

    let parked = ctx.queue.try_pop().expect("rescheduled job");
    assert_eq!(parked.retries_remaining, 2);
    assert_eq!(parked.not_before, Some(not_before));
}

#[tokio::test(start_paused = true)]
async fn transport_failure_is_terminal_unavailable() {
    let api = MockApi::new();
    api.compare_script.lock().unwrap().push_back(Err(
        CollectorError::Transport("TimeoutError".to_string()),
    ));
    let ctx = make_context(test_registry(), Duration::from_secs(60));
    ctx.queue.push(1, make_job(&api, "cam", 2));

    let handle = tokio::spawn(worker("test-worker".to_string(), ctx.clone()));
    wait_for("one transport report", || api.report_count() == 1).await;
    tokio::time::sleep(Duration::from_secs(10)).await;
    handle.abort();

    assert_eq!(api.report_count(), 1);
    let report = api.nth_report(0);
    assert_eq!(report.status, Some(CheckStatus::Unavailable));
    assert_eq!(api.compare_calls.load(Ordering::SeqCst), 1);
    // Transport failures never consume retry budget.
    assert!(ctx.queue.is_empty());
}

#[tokio::test(start_paused = true)]
async fn unauthorized_device_reports_forbidden() {
    let api = MockApi::new();
    let ctx = make_context(test_registry(), Duration::from_secs(60));
    ctx.queue.push(1, make_job(&api, "cam-unauthorized", 2));

    let handle = tokio::spawn(worker("test-worker".to_string(), ctx.clone()));
    wait_for("forbidden report", || api.report_count() == 1).await;
    handle.abort();

    let report = api.nth_report(0);
    assert_eq!(report.status, Some(CheckStatus::Forbidden));
    assert_eq!(report.status.map(CheckStatus::code), Some(5));
    assert!(!report.has_image);
    assert!(report
        .detail
        .as_deref()
        .unwrap()
        .contains("Unauthorized, type of authentication: Basic"));
    assert!(ctx.queue.is_empty());
}

#[tokio::test(start_paused = true)]
async fn reported_detail_is_truncated() {
    let api = MockApi::new();
    let ctx = make_context(test_registry(), Duration::from_secs(60));
    ctx.queue.push(1, make_job(&api, "cam-noisy", 2));

    let handle = tokio::spawn(worker("test-worker".to_string(), ctx.clone()));
    wait_for("noisy report", || api.report_count() == 1).await;
    handle.abort();

    let report = api.nth_report(0);
    assert_eq!(report.detail.as_deref().map(|d| d.chars().count()), Some(500));
}

#[tokio::test(start_paused = true)]
async fn pool_recovers_after_total_worker_death() {
    let api = MockApi::new();
    let ctx = make_context(test_registry(), Duration::from_secs(60));

    let handle = tokio::spawn(run_worker_pool(ctx.clone(), 1));

    // An unknown collect type is a configuration error: it kills the
    // only worker and with it the whole cohort.
    ctx.queue.push(0, make_job(&api, "bogus", 2));
    wait_for("poison job consumed", || ctx.queue.is_empty()).await;

    // The supervisor must respawn the cohort and keep serving.
    ctx.queue.push(0, make_job(&api, "ping", 2));
    wait_for("report after restart", || api.report_count() == 1).await;
    handle.abort();

    assert_eq!(api.report_count(), 1);
    assert_eq!(api.nth_report(0).status, Some(CheckStatus::NoChange));
}
