//! Maps collect-type keys to collector constructors.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use uuid::Uuid;

use crate::collectors::Collector;
use crate::error::CollectorError;
use crate::services::client::ComparisonApi;

pub type BoxedCollector = Box<dyn Collector>;

type BuildFuture = Pin<Box<dyn Future<Output = Result<BoxedCollector, CollectorError>> + Send>>;
type Builder = Box<dyn Fn(Uuid, Option<Uuid>, Arc<dyn ComparisonApi>) -> BuildFuture + Send + Sync>;

/// Registry of collector constructors keyed by collect type.
///
/// Populated once at startup; resolving an unknown key is a
/// configuration error, never a per-job retryable condition.
#[derive(Default)]
pub struct CollectorRegistry {
    builders: HashMap<String, Builder>,
}

impl CollectorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<F, Fut>(&mut self, collect_type: impl Into<String>, build: F)
    where
        F: Fn(Uuid, Option<Uuid>, Arc<dyn ComparisonApi>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<BoxedCollector, CollectorError>> + Send + 'static,
    {
        self.builders.insert(
            collect_type.into(),
            Box::new(move |sensor_id, collect_type_id, client| -> BuildFuture {
                Box::pin(build(sensor_id, collect_type_id, client))
            }),
        );
    }

    /// Construct a collector for the given type, binding it to the
    /// sensor through the client handle.
    pub async fn build(
        &self,
        collect_type: &str,
        sensor_id: Uuid,
        collect_type_id: Option<Uuid>,
        client: Arc<dyn ComparisonApi>,
    ) -> Result<BoxedCollector, CollectorError> {
        let builder = self.builders.get(collect_type).ok_or_else(|| {
            CollectorError::Config(format!("unknown collector type {collect_type}"))
        })?;
        builder(sensor_id, collect_type_id, client).await
    }

    pub fn contains(&self, collect_type: &str) -> bool {
        self.builders.contains_key(collect_type)
    }

    pub fn len(&self) -> usize {
        self.builders.len()
    }

    pub fn is_empty(&self) -> bool {
        self.builders.is_empty()
    }
}

impl std::fmt::Debug for CollectorRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CollectorRegistry")
            .field("collect_types", &self.builders.keys().collect::<Vec<_>>())
            .finish()
    }
}
