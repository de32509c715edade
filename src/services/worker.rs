//! The worker loop and its supervising pool.
//!
//! Each worker drains the shared queue forever: dequeue, gate on the
//! job's earliest execution time, collect, compare, classify any
//! failure, report exactly once. Failures are translated at this
//! boundary and never escape a single attempt; only a
//! comparison-service failure consumes the job's retry budget.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinSet;
use tokio::time::{sleep, Instant};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::collectors::{Collector, CollectorRegistry};
use crate::error::CollectorError;
use crate::models::check::{CheckReport, CheckResult, CheckStatus};
use crate::models::comparison::ComparisonOutcome;
use crate::models::job::Job;
use crate::services::queue::{JobQueue, LOW_PRIORITY};

/// Sleep between polls of an empty queue.
const IDLE_POLL: Duration = Duration::from_secs(1);
/// Pause after rescheduling a not-yet-eligible job.
const DELAY_GATE_PAUSE: Duration = Duration::from_millis(100);
/// Pause before respawning a fully dead cohort.
const RESTART_PAUSE: Duration = Duration::from_millis(100);
/// Reported detail strings are bounded to this many characters.
const MAX_DETAIL_LEN: usize = 500;

/// Shared dependencies of every worker in the pool.
#[derive(Clone)]
pub struct WorkerContext {
    pub queue: Arc<JobQueue>,
    pub registry: Arc<CollectorRegistry>,
    /// Delay before a retryable job becomes eligible again.
    pub retry_period: Duration,
}

struct AttemptOutput {
    result: CheckResult,
    image_id: Option<Uuid>,
    outcome: Option<ComparisonOutcome>,
}

struct AttemptFailure {
    error: CollectorError,
    /// Whether an image was captured before the failure; the report
    /// still goes to the image-check endpoint in that case.
    has_image: bool,
    image_id: Option<Uuid>,
}

impl From<CollectorError> for AttemptFailure {
    fn from(error: CollectorError) -> Self {
        Self {
            error,
            has_image: false,
            image_id: None,
        }
    }
}

/// Spawn `workers_count` workers on the shared queue and keep them
/// alive: when every worker has exited, the whole cohort is restarted
/// after a short pause.
pub async fn run_worker_pool(ctx: WorkerContext, workers_count: usize) {
    loop {
        let mut cohort = JoinSet::new();
        for i in 0..workers_count {
            let ctx = ctx.clone();
            cohort.spawn(worker(format!("worker-{i}"), ctx));
        }
        debug!(count = workers_count, "Worker cohort spawned");

        while let Some(joined) = cohort.join_next().await {
            if let Err(err) = joined {
                error!(error = %err, "Worker task terminated abnormally");
            }
        }
        warn!("All workers have died");
        sleep(RESTART_PAUSE).await;
    }
}

/// One worker: loops until an unrecoverable configuration error.
pub async fn worker(name: String, ctx: WorkerContext) {
    loop {
        let Some(mut job) = ctx.queue.try_pop() else {
            sleep(IDLE_POLL).await;
            continue;
        };

        // Delay gate: pure rescheduling, invisible to the retry budget
        // and never reported.
        if let Some(not_before) = job.not_before {
            if Instant::now() < not_before {
                ctx.queue.push(LOW_PRIORITY, job);
                sleep(DELAY_GATE_PAUSE).await;
                continue;
            }
        }

        info!(
            worker = %name,
            sensor_id = %job.sensor_id,
            collect_type = %job.collect_type,
            "Making request for collect type"
        );

        let started = Instant::now();
        let report = match run_attempt(&ctx, &job).await {
            Ok(output) => {
                metrics::counter!("collector_checks_total", "outcome" => "completed").increment(1);
                CheckReport {
                    collect_type_id: job.collect_type_id,
                    detail: None,
                    status: output.result.status,
                    image_id: output.image_id,
                    has_image: output.result.has_image(),
                    outcome: output.outcome,
                }
            }
            Err(failure) => {
                if let CollectorError::Config(ref msg) = failure.error {
                    // Wiring problem, not a device condition: stop this
                    // worker and let the supervisor account for it.
                    error!(worker = %name, error = %msg, "Collector resolution failed, stopping worker");
                    return;
                }
                metrics::counter!("collector_checks_total", "outcome" => "failed").increment(1);

                let status = failure.error.status();
                let detail = truncate_detail(failure.error.detail());
                log_failure(&name, &failure.error, status, &detail);

                if failure.error.is_retryable() {
                    job.retries_remaining = job.retries_remaining.saturating_sub(1);
                    if job.retries_remaining > 0 {
                        let mut retry = job.clone();
                        retry.not_before = Some(Instant::now() + ctx.retry_period);
                        ctx.queue.push(LOW_PRIORITY, retry);
                        debug!(
                            worker = %name,
                            sensor_id = %job.sensor_id,
                            retries_remaining = job.retries_remaining,
                            "Requeued job after comparison service error"
                        );
                    } else {
                        debug!(
                            worker = %name,
                            sensor_id = %job.sensor_id,
                            "Retry budget exhausted, dropping job"
                        );
                    }
                }

                CheckReport {
                    collect_type_id: job.collect_type_id,
                    detail: Some(detail),
                    status: Some(status),
                    image_id: failure.image_id,
                    has_image: failure.has_image,
                    outcome: None,
                }
            }
        };

        metrics::histogram!("collector_check_duration_seconds")
            .record(started.elapsed().as_secs_f64());

        // Reporting is best-effort: failures are logged, never retried,
        // never propagated.
        match job.client.submit_check(&report).await {
            Ok(()) => info!(worker = %name, "Check completed"),
            Err(err) => error!(worker = %name, error = %err, "Failed to submit check record"),
        }
    }
}

/// Run collection and (for image evidence) comparison for one job.
async fn run_attempt(ctx: &WorkerContext, job: &Job) -> Result<AttemptOutput, AttemptFailure> {
    let collector = ctx
        .registry
        .build(
            &job.collect_type,
            job.sensor_id,
            job.collect_type_id,
            Arc::clone(&job.client),
        )
        .await?;

    let result = collect_from_source(collector.as_ref(), job.use_db).await?;

    let Some(image) = result.image.clone() else {
        warn!(sensor_id = %job.sensor_id, "Could not find image in check result");
        return Ok(AttemptOutput {
            result,
            image_id: None,
            outcome: None,
        });
    };
    let extension = result.extension.clone().unwrap_or_else(|| "jpg".to_string());

    let comparison = match job.client.reference_image().await {
        Ok((reference, masks)) => job.client.compare(&image, &reference, masks).await,
        Err(err @ CollectorError::NoReferenceImage) => {
            // Bootstrap: the current capture becomes the reference; the
            // distinguished no-reference condition still classifies the
            // attempt.
            match job.client.bootstrap_reference(&image, &extension).await {
                Ok(()) => Err(err),
                Err(bootstrap_err) => Err(bootstrap_err),
            }
        }
        Err(err) => Err(err),
    };

    // The captured image is persisted exactly once per attempt, whether
    // or not the comparison succeeded.
    let image_id = match job.client.image_id() {
        Some(id) => Some(id),
        None => match job.client.insert_image(&image, &extension).await {
            Ok(id) => Some(id),
            Err(persist_err) => {
                return Err(AttemptFailure {
                    error: persist_err,
                    has_image: true,
                    image_id: None,
                })
            }
        },
    };

    match comparison {
        Ok(outcome) => Ok(AttemptOutput {
            result,
            image_id,
            outcome: Some(outcome),
        }),
        Err(error) => Err(AttemptFailure {
            error,
            has_image: true,
            image_id,
        }),
    }
}

/// Route collection through the stored-reference path when requested
/// and supported; an absent stored asset is a device-level failure.
async fn collect_from_source(
    collector: &dyn Collector,
    use_db: bool,
) -> Result<CheckResult, CollectorError> {
    if use_db && collector.supports_stored() {
        match collector.collect_stored().await? {
            Some(result) => Ok(result),
            None => Err(CollectorError::SourceUnavailable(
                "no stored image for sensor".to_string(),
            )),
        }
    } else {
        collector.collect().await
    }
}

fn truncate_detail(detail: String) -> String {
    if detail.chars().count() <= MAX_DETAIL_LEN {
        detail
    } else {
        detail.chars().take(MAX_DETAIL_LEN).collect()
    }
}

fn log_failure(worker: &str, error: &CollectorError, status: CheckStatus, detail: &str) {
    match error {
        CollectorError::Transport(_) => warn!(worker, status = %status, detail, "Http error"),
        CollectorError::Unauthorized { .. }
        | CollectorError::Forbidden
        | CollectorError::NoReferenceImage
        | CollectorError::SourceUnavailable(_)
        | CollectorError::ComparisonService(_) => {
            warn!(worker, status = %status, detail, "Check failed")
        }
        CollectorError::Config(_) | CollectorError::Other(_) => {
            error!(worker, status = %status, detail, "Unclassified check failure")
        }
    }
}
