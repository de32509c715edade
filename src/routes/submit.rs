use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use tracing::{debug, info};

use crate::app_state::AppState;
use crate::models::job::Job;
use crate::models::submit::{SubmitRequest, SubmitResponse};
use crate::services::client::{ApiClient, ComparisonApi};
use crate::services::queue::priority_for;

/// POST /api/v1/collector/start — schedule a check for one sensor.
///
/// Resolves the collect type through the platform catalog, assigns the
/// type's fixed priority, binds a fresh client handle to the sensor and
/// enqueues the job with the configured initial retry budget.
pub async fn start_collection(
    State(state): State<AppState>,
    Json(request): Json<SubmitRequest>,
) -> Result<Json<SubmitResponse>, (StatusCode, String)> {
    debug!(sensor_id = %request.sensor_id, "Collection requested");

    let client: Arc<dyn ComparisonApi> = Arc::new(ApiClient::new(
        &state.config,
        state.http.clone(),
        state.tokens.clone(),
        request.sensor_id,
    ));

    let catalog = client.collect_types().await.map_err(|err| {
        (
            StatusCode::BAD_GATEWAY,
            format!("collect type catalog unavailable: {}", err.detail()),
        )
    })?;

    let collect_type = request
        .collect_type_id
        .and_then(|wanted| {
            catalog
                .iter()
                .find(|entry| entry.id == wanted)
                .map(|entry| entry.collect_type.clone())
        })
        .ok_or_else(|| {
            (
                StatusCode::UNPROCESSABLE_ENTITY,
                "unknown collect type id".to_string(),
            )
        })?;

    let priority = priority_for(&collect_type);
    state.queue.push(
        priority,
        Job {
            sensor_id: request.sensor_id,
            collect_type_id: request.collect_type_id,
            collect_type: collect_type.clone(),
            retries_remaining: state.config.retries_number,
            not_before: None,
            use_db: request.use_db,
            client,
        },
    );
    metrics::counter!("collector_jobs_submitted_total").increment(1);

    info!(
        sensor_id = %request.sensor_id,
        collect_type = %collect_type,
        priority,
        "Job enqueued"
    );

    Ok(Json(SubmitResponse {
        sensor_id: request.sensor_id,
        collect_type_id: request.collect_type_id,
        use_db: request.use_db,
        collect_type,
        priority,
    }))
}
