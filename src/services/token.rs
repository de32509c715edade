//! Session token for the Camera Guard platform API.
//!
//! The token is owned by an injectable provider rather than
//! process-global state: clients hold a cheap clone of the provider and
//! read the current token per request, while a background task keeps it
//! fresh.

use std::sync::Arc;
use std::time::Duration;

use serde::Deserialize;
use tokio::sync::RwLock;
use tracing::{info, warn};

use crate::config::AppConfig;

#[derive(Debug, Clone, Deserialize)]
pub struct AuthToken {
    pub access_token: String,
    pub token_type: String,
}

/// Shared, refreshable token slot.
#[derive(Clone, Default)]
pub struct TokenProvider {
    inner: Arc<RwLock<Option<AuthToken>>>,
}

impl TokenProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current `Authorization` header value, if a token has been
    /// obtained yet.
    pub async fn authorization(&self) -> Option<String> {
        self.inner
            .read()
            .await
            .as_ref()
            .map(|t| format!("{} {}", t.token_type, t.access_token))
    }

    pub async fn store(&self, token: AuthToken) {
        *self.inner.write().await = Some(token);
    }
}

/// Periodically obtain a fresh platform token. Failures are logged and
/// the previous token stays in place until the next cycle.
pub async fn run_refresh_loop(provider: TokenProvider, http: reqwest::Client, config: Arc<AppConfig>) {
    let url = format!("{}/api/v1/auth/token", config.camera_guard_base);
    let period = Duration::from_secs(config.token_refresh_secs);
    loop {
        let form = [
            ("username", config.camguard_login.as_str()),
            ("password", config.camguard_password.as_str()),
        ];
        match http.post(&url).form(&form).send().await {
            Ok(resp) if resp.status().is_success() => match resp.json::<AuthToken>().await {
                Ok(token) => {
                    provider.store(token).await;
                    info!("Obtained new platform token");
                }
                Err(err) => warn!(error = %err, "Token response was not valid JSON"),
            },
            Ok(resp) => warn!(status = %resp.status(), "Token request rejected"),
            Err(err) => warn!(error = %err, "Token request failed"),
        }
        tokio::time::sleep(period).await;
    }
}
