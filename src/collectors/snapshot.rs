//! Still-image collector for devices that expose a plain HTTP snapshot
//! URL, plus the stored-reference path backed by the platform's image
//! store.

use std::sync::Arc;

use uuid::Uuid;

use crate::collectors::Collector;
use crate::error::CollectorError;
use crate::models::check::CheckResult;
use crate::services::client::{ComparisonApi, DeviceInfo};
use crate::services::storage::ImageStore;

pub struct SnapshotCollector {
    sensor_id: Uuid,
    device: DeviceInfo,
    /// Device-local path of the snapshot endpoint, e.g. "/snapshot.jpg".
    snapshot_path: String,
    http: reqwest::Client,
    client: Arc<dyn ComparisonApi>,
    store: Arc<ImageStore>,
}

impl SnapshotCollector {
    pub async fn create(
        sensor_id: Uuid,
        _collect_type_id: Option<Uuid>,
        client: Arc<dyn ComparisonApi>,
        http: reqwest::Client,
        store: Arc<ImageStore>,
        snapshot_path: impl Into<String>,
    ) -> Result<Self, CollectorError> {
        let device = client.sensor_device().await?;
        Ok(Self {
            sensor_id,
            device,
            snapshot_path: snapshot_path.into(),
            http,
            client,
            store,
        })
    }
}

/// File extension for a snapshot response content type.
fn extension_for(content_type: Option<&str>) -> &'static str {
    match content_type {
        Some(ct) if ct.contains("png") => "png",
        Some(ct) if ct.contains("bmp") => "bmp",
        _ => "jpg",
    }
}

/// File extension embedded in a stored image URL.
fn extension_from_url(url: &str) -> &str {
    url.rsplit_once('.').map(|(_, ext)| ext).unwrap_or("jpg")
}

#[async_trait::async_trait]
impl Collector for SnapshotCollector {
    async fn collect(&self) -> Result<CheckResult, CollectorError> {
        let url = format!("http://{}{}", self.device.ip, self.snapshot_path);
        let mut req = self.http.get(&url);
        if let Some(login) = self.device.login.as_deref() {
            req = req.basic_auth(login, self.device.password.as_deref());
        }
        let resp = req.send().await?;

        match resp.status().as_u16() {
            401 => {
                let auth_type = resp
                    .headers()
                    .get(reqwest::header::WWW_AUTHENTICATE)
                    .and_then(|v| v.to_str().ok())
                    .unwrap_or("unknown")
                    .to_string();
                Err(CollectorError::Unauthorized { auth_type })
            }
            403 => Err(CollectorError::Forbidden),
            status if !(200..300).contains(&status) => {
                Err(CollectorError::Transport(format!("HttpError: status {status}")))
            }
            _ => {
                let extension = extension_for(
                    resp.headers()
                        .get(reqwest::header::CONTENT_TYPE)
                        .and_then(|v| v.to_str().ok()),
                );
                let bytes = resp.bytes().await?.to_vec();
                if bytes.is_empty() {
                    return Err(CollectorError::SourceUnavailable(format!(
                        "empty snapshot from {url}"
                    )));
                }
                tracing::debug!(sensor_id = %self.sensor_id, bytes = bytes.len(), "Snapshot captured");
                Ok(CheckResult::with_image(bytes, extension))
            }
        }
    }

    fn supports_stored(&self) -> bool {
        true
    }

    async fn collect_stored(&self) -> Result<Option<CheckResult>, CollectorError> {
        let Some(record) = self.client.latest_image_record().await? else {
            return Ok(None);
        };
        let extension = extension_from_url(&record.image_url).to_string();
        let key = format!("{}.{}", record.image_id, extension);
        let bytes = self
            .store
            .fetch(&key)
            .await
            .map_err(|e| CollectorError::Other(e.to_string()))?;
        let Some(bytes) = bytes else {
            return Ok(None);
        };
        self.client.set_image_id(record.image_id);
        Ok(Some(CheckResult::with_image(bytes, extension)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extension_follows_content_type() {
        assert_eq!(extension_for(Some("image/png")), "png");
        assert_eq!(extension_for(Some("image/jpeg")), "jpg");
        assert_eq!(extension_for(None), "jpg");
    }

    #[test]
    fn extension_parsed_from_stored_url() {
        assert_eq!(extension_from_url("http://s3/bucket/abc.png"), "png");
        assert_eq!(extension_from_url("no-extension"), "jpg");
    }
}
