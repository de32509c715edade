//! Client for the Camera Guard platform API and the change-detection
//! service.
//!
//! One handle is bound per sensor and travels with the job through the
//! queue. The worker and the collectors talk to it exclusively through
//! the [`ComparisonApi`] trait so tests can substitute the whole
//! network surface.

use std::sync::Mutex;

use base64::Engine;
use serde::Deserialize;
use serde_json::json;
use uuid::Uuid;

use crate::config::AppConfig;
use crate::error::CollectorError;
use crate::models::check::{CheckReport, ImageCheckRecord, LivenessCheckRecord};
use crate::models::comparison::ComparisonOutcome;
use crate::services::retry::RetryPolicy;
use crate::services::token::TokenProvider;

/// Device coordinates and credentials for one sensor.
#[derive(Debug, Clone, Deserialize)]
pub struct DeviceInfo {
    pub ip: String,
    pub port: u16,
    pub login: Option<String>,
    pub password: Option<String>,
}

/// Catalog entry mapping a collect-type id to its string key.
#[derive(Debug, Clone, Deserialize)]
pub struct CollectTypeEntry {
    pub id: Uuid,
    pub collect_type: String,
}

/// Persisted image record as returned by the platform.
#[derive(Debug, Clone, Deserialize)]
pub struct ImageRecord {
    pub image_id: Uuid,
    pub image_url: String,
    #[serde(default)]
    pub mask: Option<serde_json::Value>,
}

/// Everything a worker or collector may ask of the platform and the
/// change-detection service, bound to one sensor.
#[async_trait::async_trait]
pub trait ComparisonApi: Send + Sync {
    fn sensor_id(&self) -> Uuid;

    /// Device metadata (address, credentials) for collector construction.
    async fn sensor_device(&self) -> Result<DeviceInfo, CollectorError>;

    /// The collect-type catalog.
    async fn collect_types(&self) -> Result<Vec<CollectTypeEntry>, CollectorError>;

    /// The sensor's reference image and optional exclusion masks.
    /// Fails with [`CollectorError::NoReferenceImage`] when none is
    /// registered yet.
    async fn reference_image(&self)
        -> Result<(Vec<u8>, Option<serde_json::Value>), CollectorError>;

    /// Latest persisted image record for the sensor, reference or not.
    async fn latest_image_record(&self) -> Result<Option<ImageRecord>, CollectorError>;

    /// Download image bytes from a platform-provided URL.
    async fn fetch_image(&self, url: &str) -> Result<Vec<u8>, CollectorError>;

    /// Persist an image, returning its new id.
    async fn insert_image(&self, image: &[u8], ext: &str) -> Result<Uuid, CollectorError>;

    /// Persist the given capture and register it as the sensor's
    /// reference image. Records the new id in the image-id slot.
    async fn bootstrap_reference(&self, image: &[u8], ext: &str) -> Result<(), CollectorError>;

    /// Submit a comparison request, walking the configured API versions.
    async fn compare(
        &self,
        test_image: &[u8],
        reference_image: &[u8],
        masks: Option<serde_json::Value>,
    ) -> Result<ComparisonOutcome, CollectorError>;

    /// Record the outcome of one attempt. Image-bearing reports go to
    /// the image-check endpoint, status-only reports to the liveness
    /// endpoint.
    async fn submit_check(&self, report: &CheckReport) -> Result<(), CollectorError>;

    /// Per-job slot for the id of the image this attempt produced.
    fn image_id(&self) -> Option<Uuid>;
    fn set_image_id(&self, id: Uuid);
}

/// HTTP implementation of [`ComparisonApi`].
pub struct ApiClient {
    http: reqwest::Client,
    camguard_base: String,
    image_api_base: String,
    api_versions: Vec<u32>,
    retry: RetryPolicy,
    tokens: TokenProvider,
    sensor_id: Uuid,
    image_id: Mutex<Option<Uuid>>,
}

impl ApiClient {
    pub fn new(
        config: &AppConfig,
        http: reqwest::Client,
        tokens: TokenProvider,
        sensor_id: Uuid,
    ) -> Self {
        Self {
            http,
            camguard_base: config.camera_guard_base.clone(),
            image_api_base: config.image_api_url.clone(),
            api_versions: config.api_versions.clone(),
            retry: config.retry_policy(),
            tokens,
            sensor_id,
            image_id: Mutex::new(None),
        }
    }

    async fn get_json<T: serde::de::DeserializeOwned>(
        &self,
        what: &str,
        url: &str,
        params: &[(&str, String)],
    ) -> Result<T, CollectorError> {
        self.retry
            .run(what, || async {
                let mut req = self.http.get(url).query(params);
                if let Some(auth) = self.tokens.authorization().await {
                    req = req.header(reqwest::header::AUTHORIZATION, auth);
                }
                let resp = req.send().await?.error_for_status()?;
                Ok::<T, CollectorError>(resp.json().await?)
            })
            .await
    }

    /// POST a payload; a non-success response is logged, not raised.
    /// Only transport failures surface (after the retry budget).
    async fn post_json(
        &self,
        what: &str,
        url: &str,
        payload: &serde_json::Value,
    ) -> Result<(), CollectorError> {
        self.retry
            .run(what, || async {
                let mut req = self.http.post(url).json(payload);
                if let Some(auth) = self.tokens.authorization().await {
                    req = req.header(reqwest::header::AUTHORIZATION, auth);
                }
                let resp = req.send().await?;
                if !resp.status().is_success() {
                    let status = resp.status();
                    let body = resp.text().await.unwrap_or_default();
                    tracing::warn!(call = what, %status, body, "Platform rejected request");
                }
                Ok::<(), CollectorError>(())
            })
            .await
    }

    async fn image_records(&self, reference: bool) -> Result<Vec<ImageRecord>, CollectorError> {
        let mut url = format!("{}/api/v1/images/", self.camguard_base);
        if reference {
            url.push_str("reference/");
        }
        self.get_json(
            "image_records",
            &url,
            &[("sensor_id", self.sensor_id.to_string())],
        )
        .await
    }

    /// One request against a specific detector API version.
    async fn request_detector(
        &self,
        payload: &serde_json::Value,
        api_version: u32,
    ) -> Result<ComparisonOutcome, DetectorFailure> {
        let url = format!("{}{}/movement", self.image_api_base, api_version);
        tracing::debug!(%url, "Comparison request");
        let resp = self
            .http
            .post(&url)
            .json(payload)
            .send()
            .await
            .map_err(|e| DetectorFailure::Transport(CollectorError::from(e)))?;

        let status = resp.status();
        let body: serde_json::Value = resp
            .json()
            .await
            .map_err(|e| DetectorFailure::Transport(CollectorError::from(e)))?;

        if !status.is_success() {
            let detail = body
                .get("detail")
                .and_then(|d| d.as_str())
                .unwrap_or("image_api_error")
                .to_string();
            return Err(DetectorFailure::Rejected(CollectorError::ComparisonService(
                detail,
            )));
        }

        let mut outcome: ComparisonOutcome = serde_json::from_value(body)
            .map_err(|e| DetectorFailure::Rejected(CollectorError::ComparisonService(e.to_string())))?;
        outcome.api_version = api_version;
        Ok(outcome)
    }
}

/// Distinguishes transport failures (fall through to the next API
/// version) from application-level rejections (raised immediately).
enum DetectorFailure {
    Transport(CollectorError),
    Rejected(CollectorError),
}

/// Strip an optional `data:image/...;base64,` prefix.
fn strip_image_prefix(data: &str) -> &str {
    match data.split_once(',') {
        Some((_, payload)) => payload,
        None => data,
    }
}

fn image_dimensions(image: &[u8]) -> (Option<u32>, Option<u32>) {
    use image::GenericImageView;
    match image::load_from_memory(image) {
        Ok(decoded) => {
            let (width, height) = decoded.dimensions();
            (Some(width), Some(height))
        }
        Err(err) => {
            tracing::warn!(error = %err, "Could not read test image dimensions");
            (None, None)
        }
    }
}

#[async_trait::async_trait]
impl ComparisonApi for ApiClient {
    fn sensor_id(&self) -> Uuid {
        self.sensor_id
    }

    async fn sensor_device(&self) -> Result<DeviceInfo, CollectorError> {
        let url = format!("{}/api/v1/cameras/", self.camguard_base);
        self.get_json(
            "sensor_device",
            &url,
            &[("camera_id", self.sensor_id.to_string())],
        )
        .await
    }

    async fn collect_types(&self) -> Result<Vec<CollectTypeEntry>, CollectorError> {
        let url = format!("{}/api/v1/collects/", self.camguard_base);
        self.get_json("collect_types", &url, &[]).await
    }

    async fn reference_image(
        &self,
    ) -> Result<(Vec<u8>, Option<serde_json::Value>), CollectorError> {
        let records = self.image_records(true).await?;
        let Some(record) = records.first() else {
            return Err(CollectorError::NoReferenceImage);
        };
        tracing::debug!(image_id = %record.image_id, "Fetching reference image");
        let image = self.fetch_image(&record.image_url).await?;
        Ok((image, record.mask.clone()))
    }

    async fn latest_image_record(&self) -> Result<Option<ImageRecord>, CollectorError> {
        let records = self.image_records(false).await?;
        Ok(records.into_iter().next())
    }

    async fn fetch_image(&self, url: &str) -> Result<Vec<u8>, CollectorError> {
        self.retry
            .run("fetch_image", || async {
                let resp = self.http.get(url).send().await?.error_for_status()?;
                Ok::<Vec<u8>, CollectorError>(resp.bytes().await?.to_vec())
            })
            .await
    }

    async fn insert_image(&self, image: &[u8], ext: &str) -> Result<Uuid, CollectorError> {
        let image_id = Uuid::new_v4();
        let url = format!("{}/api/v1/images/", self.camguard_base);
        let payload = json!({
            "id": image_id,
            "image": base64::engine::general_purpose::STANDARD.encode(image),
            "ext": ext,
        });
        self.post_json("insert_image", &url, &payload).await?;
        Ok(image_id)
    }

    async fn bootstrap_reference(&self, image: &[u8], ext: &str) -> Result<(), CollectorError> {
        let image_id = self.insert_image(image, ext).await?;
        self.set_image_id(image_id);
        let url = format!("{}/api/v1/images/reference/", self.camguard_base);
        let payload = json!({ "sensor_id": self.sensor_id, "image_id": image_id });
        self.post_json("insert_reference_image", &url, &payload).await
    }

    async fn compare(
        &self,
        test_image: &[u8],
        reference_image: &[u8],
        masks: Option<serde_json::Value>,
    ) -> Result<ComparisonOutcome, CollectorError> {
        let (width, height) = image_dimensions(test_image);
        let engine = &base64::engine::general_purpose::STANDARD;
        let payload = json!({
            "ref_image": engine.encode(reference_image),
            "test_image": engine.encode(test_image),
            "return_matches": true,
            "mask": masks.unwrap_or_else(|| json!([])),
        });

        let last = self.api_versions.len().saturating_sub(1);
        for (i, &version) in self.api_versions.iter().enumerate() {
            match self.request_detector(&payload, version).await {
                Ok(mut outcome) => {
                    outcome.image_width = width;
                    outcome.image_height = height;
                    if let Some(matches) = outcome.matches.as_deref() {
                        let evidence = base64::engine::general_purpose::STANDARD
                            .decode(strip_image_prefix(matches))
                            .map_err(|e| {
                                CollectorError::ComparisonService(format!(
                                    "invalid match evidence: {e}"
                                ))
                            })?;
                        let match_id = self.insert_image(&evidence, "jpg").await?;
                        outcome.match_image_id = Some(match_id);
                    }
                    return Ok(outcome);
                }
                // Application-level rejection: no version fallthrough.
                Err(DetectorFailure::Rejected(err)) => return Err(err),
                Err(DetectorFailure::Transport(err)) => {
                    tracing::warn!(version, error = %err, "Comparison request failed");
                    if i == last {
                        return Err(CollectorError::ComparisonService(
                            "image_api_error".to_string(),
                        ));
                    }
                }
            }
        }
        Err(CollectorError::ComparisonService(
            "no comparison API versions configured".to_string(),
        ))
    }

    async fn submit_check(&self, report: &CheckReport) -> Result<(), CollectorError> {
        let id = Uuid::new_v4();
        let check_status = report.status.map(|s| s.code());
        if report.has_image {
            let url = format!("{}/api/v1/checks/insert_check", self.camguard_base);
            let record = ImageCheckRecord {
                id,
                sensor_id: self.sensor_id,
                collect_type_id: report.collect_type_id,
                detail: report.detail.clone(),
                check_status,
                image_id: report.image_id,
                outcome: report.outcome.clone().unwrap_or_default(),
            };
            let payload = serde_json::to_value(&record)
                .map_err(|e| CollectorError::Other(e.to_string()))?;
            self.post_json("insert_check", &url, &payload).await
        } else {
            let url = format!("{}/api/v1/checks/insert_ping_check", self.camguard_base);
            let record = LivenessCheckRecord {
                id,
                sensor_id: self.sensor_id,
                collect_type_id: report.collect_type_id,
                detail: report.detail.clone(),
                check_status,
                image: false,
            };
            let payload = serde_json::to_value(&record)
                .map_err(|e| CollectorError::Other(e.to_string()))?;
            self.post_json("insert_ping_check", &url, &payload).await
        }
    }

    fn image_id(&self) -> Option<Uuid> {
        *self.image_id.lock().expect("image id slot poisoned")
    }

    fn set_image_id(&self, id: Uuid) {
        *self.image_id.lock().expect("image id slot poisoned") = Some(id);
    }
}
