//! Liveness probe: a plain TCP connect to the device's service port.
//!
//! Never produces an image; a successful connect reports NOCHANGE, an
//! unreachable port surfaces as a collector-declared failure.

use std::sync::Arc;
use std::time::Duration;

use tokio::net::TcpStream;
use tokio::time::timeout;
use uuid::Uuid;

use crate::collectors::Collector;
use crate::error::CollectorError;
use crate::models::check::{CheckResult, CheckStatus};
use crate::services::client::{ComparisonApi, DeviceInfo};

pub struct PingCollector {
    sensor_id: Uuid,
    device: DeviceInfo,
    connect_timeout: Duration,
}

impl PingCollector {
    pub async fn create(
        sensor_id: Uuid,
        _collect_type_id: Option<Uuid>,
        client: Arc<dyn ComparisonApi>,
        connect_timeout: Duration,
    ) -> Result<Self, CollectorError> {
        let device = client.sensor_device().await?;
        Ok(Self {
            sensor_id,
            device,
            connect_timeout,
        })
    }
}

#[async_trait::async_trait]
impl Collector for PingCollector {
    async fn collect(&self) -> Result<CheckResult, CollectorError> {
        let addr = (self.device.ip.clone(), self.device.port);
        match timeout(self.connect_timeout, TcpStream::connect(addr)).await {
            Ok(Ok(stream)) => {
                drop(stream);
                tracing::debug!(sensor_id = %self.sensor_id, "Liveness probe succeeded");
                Ok(CheckResult::with_status(CheckStatus::NoChange))
            }
            Ok(Err(err)) => Err(CollectorError::SourceUnavailable(format!(
                "port {}:{} is not reachable: {err}",
                self.device.ip, self.device.port
            ))),
            Err(_) => Err(CollectorError::SourceUnavailable(format!(
                "port {}:{} is not reachable: connect timed out",
                self.device.ip, self.device.port
            ))),
        }
    }
}
