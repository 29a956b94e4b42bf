use crate::domain::{IngestionMetrics, TelemetryIngestionService, TelemetryQueryService};
use common::domain::DatastoreHealth;
use std::sync::Arc;

/// Shared state handed to every handler
#[derive(Clone)]
pub struct AppState {
    pub ingestion_service: Arc<TelemetryIngestionService>,
    pub query_service: Arc<TelemetryQueryService>,
    pub metrics: Arc<IngestionMetrics>,
    pub datastore_health: Arc<dyn DatastoreHealth>,
}
