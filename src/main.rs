mod app_state;
mod collectors;
mod config;
mod error;
mod models;
mod routes;
mod services;

use std::sync::Arc;

use axum::{routing::get, routing::post, Router};
use metrics_exporter_prometheus::PrometheusBuilder;
use tower_http::compression::CompressionLayer;
use tower_http::cors::CorsLayer;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;

use app_state::AppState;
use collectors::{BoxedCollector, CollectorRegistry};
use collectors::ping::PingCollector;
use collectors::snapshot::SnapshotCollector;
use config::AppConfig;
use services::queue::JobQueue;
use services::storage::ImageStore;
use services::token::{self, TokenProvider};
use services::worker::{self, WorkerContext};

#[tokio::main]
async fn main() {
    // Initialize structured logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .json()
        .init();

    // Load configuration from environment
    let config = Arc::new(AppConfig::from_env().expect("Failed to load configuration"));

    tracing::info!("Initializing camguard-collector");

    // Initialize Prometheus metrics recorder
    let prometheus_handle = PrometheusBuilder::new()
        .install_recorder()
        .expect("Failed to install Prometheus metrics recorder");
    let prometheus_handle = Arc::new(prometheus_handle);

    metrics::describe_counter!(
        "collector_jobs_submitted_total",
        "Total check jobs accepted by the submission endpoint"
    );
    metrics::describe_counter!(
        "collector_checks_total",
        "Total check attempts by outcome"
    );
    metrics::describe_gauge!(
        "collector_queue_depth",
        "Current number of jobs in the queue"
    );
    metrics::describe_histogram!(
        "collector_check_duration_seconds",
        "Time spent on a single check attempt"
    );

    // One outbound HTTP client with the configured per-call timeout,
    // shared by the platform client, the token loop and the collectors.
    let http = reqwest::Client::builder()
        .timeout(config.sensor_timeout())
        .build()
        .expect("Failed to build HTTP client");

    // Session token for the platform API, refreshed in the background.
    let tokens = TokenProvider::new();
    tokio::spawn(token::run_refresh_loop(
        tokens.clone(),
        http.clone(),
        Arc::clone(&config),
    ));

    // Image store for the stored-reference collection path.
    tracing::info!("Initializing image store client");
    let store = Arc::new(
        ImageStore::new(
            &config.s3_bucket,
            &config.s3_endpoint,
            &config.s3_region,
            &config.s3_access_key,
            &config.s3_secret_key,
        )
        .expect("Failed to initialize image store"),
    );

    let registry = Arc::new(build_registry(&config, &http, &store));
    tracing::info!(?registry, "Collector registry ready");

    let queue = Arc::new(JobQueue::new());

    // Worker pool: cooperative tasks sharing the in-process queue.
    tokio::spawn(worker::run_worker_pool(
        WorkerContext {
            queue: Arc::clone(&queue),
            registry,
            retry_period: config.retry_period(),
        },
        config.workers_count,
    ));

    let state = AppState::new(Arc::clone(&config), queue, tokens, http);

    let app = Router::new()
        .route("/health", get(routes::health::health_check))
        .route(
            "/api/v1/collector/start",
            post(routes::submit::start_collection),
        )
        .with_state(state)
        .route(
            "/metrics",
            get(routes::metrics::prometheus_metrics).with_state(prometheus_handle),
        )
        .layer(TraceLayer::new_for_http())
        .layer(CompressionLayer::new())
        .layer(CorsLayer::permissive())
        .layer(RequestBodyLimitLayer::new(1024 * 1024)); // 1 MB limit

    tracing::info!("Starting camguard-collector on {}", config.bind_addr);

    let listener = tokio::net::TcpListener::bind(&config.bind_addr)
        .await
        .expect("Failed to bind to address");

    axum::serve(listener, app).await.expect("Server error");
}

/// Wire up one constructor per supported collect type. Snapshot-style
/// devices differ only in the path of their still-image endpoint.
fn build_registry(
    config: &Arc<AppConfig>,
    http: &reqwest::Client,
    store: &Arc<ImageStore>,
) -> CollectorRegistry {
    let mut registry = CollectorRegistry::new();

    let connect_timeout = config.sensor_timeout();
    registry.register("ping", move |sensor_id, collect_type_id, client| async move {
        let collector =
            PingCollector::create(sensor_id, collect_type_id, client, connect_timeout).await?;
        Ok(Box::new(collector) as BoxedCollector)
    });

    for (collect_type, snapshot_path) in [
        ("http", "/snapshot.jpg"),
        ("countmax", "/api/scene/rectl"),
        ("wectech", "/rightImage.jpg"),
    ] {
        let http = http.clone();
        let store = Arc::clone(store);
        registry.register(collect_type, move |sensor_id, collect_type_id, client| {
            let http = http.clone();
            let store = Arc::clone(&store);
            async move {
                let collector = SnapshotCollector::create(
                    sensor_id,
                    collect_type_id,
                    client,
                    http,
                    store,
                    snapshot_path,
                )
                .await?;
                Ok(Box::new(collector) as BoxedCollector)
            }
        });
    }

    registry
}
