use std::sync::Arc;

use tokio::time::Instant;
use uuid::Uuid;

use crate::services::client::ComparisonApi;

/// One unit of scheduled work: a single sensor check.
///
/// A job is owned by exactly one worker at a time; the queue never
/// hands the same job to two workers. The bound client handle carries
/// the sensor's session state and the per-job image id slot.
#[derive(Clone)]
pub struct Job {
    pub sensor_id: Uuid,
    pub collect_type_id: Option<Uuid>,
    /// Key selecting the collector implementation ("ping", "countmax", ...).
    pub collect_type: String,
    /// Decremented only on a retryable-classified failure; the job is
    /// dropped, not requeued, once it reaches zero.
    pub retries_remaining: u32,
    /// The job is ineligible for execution until this instant.
    pub not_before: Option<Instant>,
    /// Routes collection through the stored-reference path instead of
    /// a live capture.
    pub use_db: bool,
    pub client: Arc<dyn ComparisonApi>,
}

impl std::fmt::Debug for Job {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Job")
            .field("sensor_id", &self.sensor_id)
            .field("collect_type_id", &self.collect_type_id)
            .field("collect_type", &self.collect_type)
            .field("retries_remaining", &self.retries_remaining)
            .field("not_before", &self.not_before)
            .field("use_db", &self.use_db)
            .finish_non_exhaustive()
    }
}
