//! Collector capability: protocol-specific evidence gathering.
//!
//! Each collect type maps to a constructor in the [`CollectorRegistry`];
//! construction is async because it resolves device metadata through
//! the sensor's client handle. Collection yields a [`CheckResult`] —
//! either image evidence for comparison or a bare liveness status.

pub mod ping;
pub mod registry;
pub mod snapshot;

pub use registry::{BoxedCollector, CollectorRegistry};

use crate::error::CollectorError;
use crate::models::check::CheckResult;

/// A device-protocol collector bound to one sensor.
#[async_trait::async_trait]
pub trait Collector: Send + Sync {
    /// Perform a live collection against the device.
    async fn collect(&self) -> Result<CheckResult, CollectorError>;

    /// Whether this collector can serve the stored-reference path.
    fn supports_stored(&self) -> bool {
        false
    }

    /// Collect from the platform's stored assets instead of the
    /// device. `Ok(None)` means no stored asset exists for the sensor.
    async fn collect_stored(&self) -> Result<Option<CheckResult>, CollectorError> {
        Ok(None)
    }
}

impl std::fmt::Debug for dyn Collector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("dyn Collector")
    }
}
