//! Shared test doubles: a scriptable platform client and canned
//! collectors, wired into a registry the way `main` does it.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use uuid::Uuid;

use camguard_collector::collectors::{BoxedCollector, Collector, CollectorRegistry};
use camguard_collector::error::CollectorError;
use camguard_collector::models::check::{CheckReport, CheckResult, CheckStatus};
use camguard_collector::models::comparison::ComparisonOutcome;
use camguard_collector::models::job::Job;
use camguard_collector::services::client::{
    CollectTypeEntry, ComparisonApi, DeviceInfo, ImageRecord,
};
use camguard_collector::services::queue::JobQueue;
use camguard_collector::services::worker::WorkerContext;

pub const TEST_IMAGE: &[u8] = b"test-image-bytes";
pub const REFERENCE_IMAGE: &[u8] = b"reference-image-bytes";

/// Scriptable [`ComparisonApi`] recording every interaction.
pub struct MockApi {
    sensor_id: Uuid,
    /// Reference image returned by `reference_image`; `None` yields the
    /// distinguished no-reference condition.
    pub reference: Mutex<Option<Vec<u8>>>,
    /// Scripted comparison results, consumed front to back. When the
    /// script is empty, `compare_always_fails` decides the outcome.
    pub compare_script: Mutex<VecDeque<Result<ComparisonOutcome, CollectorError>>>,
    pub compare_always_fails: AtomicBool,
    pub compare_calls: AtomicUsize,
    pub bootstrap_calls: AtomicUsize,
    /// Extensions of directly persisted images (not via bootstrap).
    pub inserted_images: Mutex<Vec<String>>,
    pub reports: Mutex<Vec<CheckReport>>,
    image_id_slot: Mutex<Option<Uuid>>,
}

impl MockApi {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            sensor_id: Uuid::new_v4(),
            reference: Mutex::new(Some(REFERENCE_IMAGE.to_vec())),
            compare_script: Mutex::new(VecDeque::new()),
            compare_always_fails: AtomicBool::new(false),
            compare_calls: AtomicUsize::new(0),
            bootstrap_calls: AtomicUsize::new(0),
            inserted_images: Mutex::new(Vec::new()),
            reports: Mutex::new(Vec::new()),
            image_id_slot: Mutex::new(None),
        })
    }

    pub fn report_count(&self) -> usize {
        self.reports.lock().unwrap().len()
    }

    pub fn nth_report(&self, n: usize) -> CheckReport {
        self.reports.lock().unwrap()[n].clone()
    }
}

#[async_trait::async_trait]
impl ComparisonApi for MockApi {
    fn sensor_id(&self) -> Uuid {
        self.sensor_id
    }

    async fn sensor_device(&self) -> Result<DeviceInfo, CollectorError> {
        Ok(DeviceInfo {
            ip: "127.0.0.1".to_string(),
            port: 554,
            login: Some("admin".to_string()),
            password: Some("admin".to_string()),
        })
    }

    async fn collect_types(&self) -> Result<Vec<CollectTypeEntry>, CollectorError> {
        Ok(Vec::new())
    }

    async fn reference_image(
        &self,
    ) -> Result<(Vec<u8>, Option<serde_json::Value>), CollectorError> {
        match self.reference.lock().unwrap().clone() {
            Some(bytes) => Ok((bytes, None)),
            None => Err(CollectorError::NoReferenceImage),
        }
    }

    async fn latest_image_record(&self) -> Result<Option<ImageRecord>, CollectorError> {
        Ok(None)
    }

    async fn fetch_image(&self, _url: &str) -> Result<Vec<u8>, CollectorError> {
        Ok(REFERENCE_IMAGE.to_vec())
    }

    async fn insert_image(&self, _image: &[u8], ext: &str) -> Result<Uuid, CollectorError> {
        self.inserted_images.lock().unwrap().push(ext.to_string());
        Ok(Uuid::new_v4())
    }

    async fn bootstrap_reference(&self, _image: &[u8], _ext: &str) -> Result<(), CollectorError> {
        self.bootstrap_calls.fetch_add(1, Ordering::SeqCst);
        *self.image_id_slot.lock().unwrap() = Some(Uuid::new_v4());
        Ok(())
    }

    async fn compare(
        &self,
        _test_image: &[u8],
        _reference_image: &[u8],
        _masks: Option<serde_json::Value>,
    ) -> Result<ComparisonOutcome, CollectorError> {
        self.compare_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(scripted) = self.compare_script.lock().unwrap().pop_front() {
            return scripted;
        }
        if self.compare_always_fails.load(Ordering::SeqCst) {
            Err(CollectorError::ComparisonService(
                "detector rejected the request".to_string(),
            ))
        } else {
            Ok(ComparisonOutcome::default())
        }
    }

    async fn submit_check(&self, report: &CheckReport) -> Result<(), CollectorError> {
        self.reports.lock().unwrap().push(report.clone());
        Ok(())
    }

    fn image_id(&self) -> Option<Uuid> {
        *self.image_id_slot.lock().unwrap()
    }

    fn set_image_id(&self, id: Uuid) {
        *self.image_id_slot.lock().unwrap() = Some(id);
    }
}

struct LivenessCollector;

#[async_trait::async_trait]
impl Collector for LivenessCollector {
    async fn collect(&self) -> Result<CheckResult, CollectorError> {
        Ok(CheckResult::with_status(CheckStatus::NoChange))
    }
}

struct ImageCollector;

#[async_trait::async_trait]
impl Collector for ImageCollector {
    async fn collect(&self) -> Result<CheckResult, CollectorError> {
        Ok(CheckResult::with_image(TEST_IMAGE.to_vec(), "png"))
    }
}

struct FailingCollector(fn() -> CollectorError);

#[async_trait::async_trait]
impl Collector for FailingCollector {
    async fn collect(&self) -> Result<CheckResult, CollectorError> {
        Err((self.0)())
    }
}

/// Registry with one canned collector per scenario key.
pub fn test_registry() -> Arc<CollectorRegistry> {
    let mut registry = CollectorRegistry::new();
    registry.register("ping", |_, _, _| async {
        Ok(Box::new(LivenessCollector) as BoxedCollector)
    });
    registry.register("cam", |_, _, _| async {
        Ok(Box::new(ImageCollector) as BoxedCollector)
    });
    registry.register("cam-unauthorized", |_, _, _| async {
        Ok(Box::new(FailingCollector(|| CollectorError::Unauthorized {
            auth_type: "Basic".to_string(),
        })) as BoxedCollector)
    });
    registry.register("cam-noisy", |_, _, _| async {
        Ok(Box::new(FailingCollector(|| {
            CollectorError::SourceUnavailable("x".repeat(700))
        })) as BoxedCollector)
    });
    Arc::new(registry)
}

pub fn make_context(registry: Arc<CollectorRegistry>, retry_period: Duration) -> WorkerContext {
    WorkerContext {
        queue: Arc::new(JobQueue::new()),
        registry,
        retry_period,
    }
}

pub fn make_job(api: &Arc<MockApi>, collect_type: &str, retries: u32) -> Job {
    Job {
        sensor_id: api.sensor_id(),
        collect_type_id: Some(Uuid::new_v4()),
        collect_type: collect_type.to_string(),
        retries_remaining: retries,
        not_before: None,
        use_db: false,
        client: Arc::clone(api) as Arc<dyn ComparisonApi>,
    }
}

/// Poll a condition under virtual time. Panics if it does not hold
/// within the (virtual) deadline.
pub async fn wait_for(what: &str, cond: impl Fn() -> bool) {
    let deadline = Duration::from_secs(600);
    let poll = async {
        while !cond() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    };
    if tokio::time::timeout(deadline, poll).await.is_err() {
        panic!("condition not met in time: {what}");
    }
}
