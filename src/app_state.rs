use std::sync::Arc;

use crate::config::AppConfig;
use crate::services::queue::JobQueue;
use crate::services::token::TokenProvider;

/// Shared application state passed to all route handlers.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub queue: Arc<JobQueue>,
    pub tokens: TokenProvider,
    pub http: reqwest::Client,
}

impl AppState {
    pub fn new(
        config: Arc<AppConfig>,
        queue: Arc<JobQueue>,
        tokens: TokenProvider,
        http: reqwest::Client,
    ) -> Self {
        Self {
            config,
            queue,
            tokens,
            http,
        }
    }
}
