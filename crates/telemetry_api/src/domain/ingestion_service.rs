use crate::domain::{
    validate_batch, IngestionMetrics, OutboxWriter, TelemetryBatchRequest, TryEmitInput,
    ValidatedEvent,
};
use chrono::Utc;
use common::domain::{DomainResult, InsertRawReadingInput, RawReadingRepository};
use std::sync::Arc;
use tracing::{debug, instrument, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IngestBatchResult {
    pub ingested_count: usize,
    pub failed_count: usize,
}

/// Ingestion orchestrator
///
/// Flow per batch:
/// 1. Validate the whole batch (any structural error rejects it, nothing is written)
/// 2. For each event in order: parse the metric value, append the raw reading,
///    emit the outbox entry
/// 3. Report how many readings were durably stored
///
/// A failure on one event is logged and skipped; it never aborts the rest of
/// the batch. Outbox failures do not affect the count.
pub struct TelemetryIngestionService {
    reading_repository: Arc<dyn RawReadingRepository>,
    outbox_writer: Arc<OutboxWriter>,
    metrics: Arc<IngestionMetrics>,
    max_batch_size: usize,
}

impl TelemetryIngestionService {
    pub fn new(
        reading_repository: Arc<dyn RawReadingRepository>,
        outbox_writer: Arc<OutboxWriter>,
        metrics: Arc<IngestionMetrics>,
        max_batch_size: usize,
    ) -> Self {
        Self {
            reading_repository,
            outbox_writer,
            metrics,
            max_batch_size,
        }
    }

    #[instrument(skip(self, request), fields(events = request.events.len()))]
    pub async fn ingest_batch(
        &self,
        request: TelemetryBatchRequest,
    ) -> DomainResult<IngestBatchResult> {
        let events = match validate_batch(request, self.max_batch_size) {
            Ok(events) => events,
            Err(e) => {
                self.metrics.record_rejected_batch();
                return Err(e);
            }
        };
        self.metrics.record_batch(events.len());

        let mut result = IngestBatchResult {
            ingested_count: 0,
            failed_count: 0,
        };

        for event in events {
            if self.ingest_event(event).await {
                result.ingested_count += 1;
            } else {
                result.failed_count += 1;
            }
        }

        debug!(
            ingested = result.ingested_count,
            failed = result.failed_count,
            "batch processed"
        );

        Ok(result)
    }

    /// Returns whether the reading was stored; errors are logged here
    async fn ingest_event(&self, event: ValidatedEvent) -> bool {
        let metric_value = match event.metric_value() {
            Ok(value) => value,
            Err(e) => {
                warn!(
                    event_id = %event.event_id,
                    trace_id = event.trace_id.as_deref().unwrap_or(""),
                    error = %e,
                    "skipping event with unusable metric value"
                );
                self.metrics.record_failed();
                return false;
            }
        };

        let ingested_at = Utc::now();
        let input = InsertRawReadingInput {
            id: xid::new().to_string(),
            tenant_id: event.tenant_id.clone(),
            farm_id: event.farm_id.clone(),
            barn_id: event.barn_id.clone(),
            device_id: event.device_id.clone(),
            metric_type: event.metric_type().to_string(),
            metric_value,
            unit: event.reading.unit.clone(),
            occurred_at: event.occurred_at,
            ingested_at,
        };

        let reading = match self.reading_repository.insert_reading(input).await {
            Ok(reading) => reading,
            Err(e) => {
                warn!(
                    event_id = %event.event_id,
                    trace_id = event.trace_id.as_deref().unwrap_or(""),
                    error = %e,
                    "failed to persist raw reading, skipping event"
                );
                self.metrics.record_failed();
                return false;
            }
        };
        self.metrics.record_ingested(ingested_at);

        let payload = serde_json::json!({
            "readingId": reading.id,
            "metric": reading.metric_type,
            "value": reading.metric_value,
            "unit": reading.unit,
        });

        let outcome = self
            .outbox_writer
            .try_emit(TryEmitInput {
                event_id: event.event_id,
                tenant_id: event.tenant_id,
                farm_id: event.farm_id,
                barn_id: event.barn_id,
                device_id: event.device_id,
                event_type: event.event_type,
                occurred_at: event.occurred_at,
                trace_id: event.trace_id,
                payload,
            })
            .await;
        self.metrics.record_emit(outcome);

        true
    }
}
