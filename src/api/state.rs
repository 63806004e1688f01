//! Shared state for API handlers.

use crate::collector::HistoryCollector;
use crate::config::CollectorConfig;
use crate::llm::TipClassifier;
use crate::messaging::SessionConnectorDyn;
use crate::storage::MediaStore;

use std::sync::Arc;
use std::time::Instant;

/// State shared across all API handlers. Immutable after startup; every
/// request opens its own messaging session through `connector`.
pub struct ApiState {
    pub started_at: Instant,
    /// Secret callers must present as a bearer token.
    pub service_api_key: String,
    pub connector: Arc<dyn SessionConnectorDyn>,
    pub media_store: Arc<dyn MediaStore>,
    pub collector: HistoryCollector,
    pub limits: CollectorConfig,
}

impl ApiState {
    pub fn new(
        service_api_key: impl Into<String>,
        connector: Arc<dyn SessionConnectorDyn>,
        classifier: Arc<dyn TipClassifier>,
        media_store: Arc<dyn MediaStore>,
        limits: CollectorConfig,
    ) -> Self {
        let collector = HistoryCollector::new(classifier, media_store.clone(), limits.batch_size);
        Self {
            started_at: Instant::now(),
            service_api_key: service_api_key.into(),
            connector,
            media_store,
            collector,
            limits,
        }
    }
}
