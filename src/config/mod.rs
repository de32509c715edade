use std::time::Duration;

use serde::Deserialize;

use crate::services::retry::RetryPolicy;

#[derive(Debug, Deserialize)]
pub struct AppConfig {
    /// Server bind address.
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,

    /// Base URL of the Camera Guard platform API.
    pub camera_guard_base: String,

    /// Base URL of the change-detection service; the API version and
    /// endpoint path are appended per request.
    pub image_api_url: String,

    /// Ordered detector API versions to try.
    #[serde(default = "default_api_versions")]
    pub api_versions: Vec<u32>,

    /// Timeout applied to every outbound network call.
    #[serde(default = "default_sensor_timeout_secs")]
    pub sensor_timeout_secs: u64,

    /// Number of workers draining the shared queue.
    #[serde(default = "default_workers_count")]
    pub workers_count: usize,

    /// Initial retry budget given to every submitted job.
    #[serde(default = "default_retries_number")]
    pub retries_number: u32,

    /// Delay before a retried job becomes eligible again.
    #[serde(default = "default_retry_period_secs")]
    pub retry_period_secs: u64,

    /// Attempt ceiling for individual outbound calls.
    #[serde(default = "default_http_client_retries")]
    pub http_client_retries: u32,

    /// Base backoff delay between outbound-call attempts.
    #[serde(default = "default_backoff_base_ms")]
    pub backoff_base_ms: u64,

    /// Platform token refresh interval.
    #[serde(default = "default_token_refresh_secs")]
    pub token_refresh_secs: u64,

    /// Platform API credentials.
    pub camguard_login: String,
    pub camguard_password: String,

    /// S3-compatible store holding persisted sensor images.
    pub s3_endpoint: String,
    pub s3_bucket: String,
    #[serde(default = "default_s3_region")]
    pub s3_region: String,
    pub s3_access_key: String,
    pub s3_secret_key: String,
}

fn default_bind_addr() -> String {
    "0.0.0.0:8003".to_string()
}

fn default_api_versions() -> Vec<u32> {
    vec![2]
}

fn default_sensor_timeout_secs() -> u64 {
    10
}

fn default_workers_count() -> usize {
    8
}

fn default_retries_number() -> u32 {
    3
}

fn default_retry_period_secs() -> u64 {
    60
}

fn default_http_client_retries() -> u32 {
    5
}

fn default_backoff_base_ms() -> u64 {
    500
}

fn default_token_refresh_secs() -> u64 {
    300
}

fn default_s3_region() -> String {
    "msk".to_string()
}

impl AppConfig {
    pub fn from_env() -> Result<Self, envy::Error> {
        dotenvy::dotenv().ok();
        envy::from_env()
    }

    pub fn sensor_timeout(&self) -> Duration {
        Duration::from_secs(self.sensor_timeout_secs)
    }

    pub fn retry_period(&self) -> Duration {
        Duration::from_secs(self.retry_period_secs)
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(
            self.http_client_retries,
            Duration::from_millis(self.backoff_base_ms),
        )
    }
}
