use crate::domain::{
    DomainError, DomainResult, EnqueueOutboxInput, EnqueueOutcome, OutboxEntry, OutboxRepository,
};
use crate::postgres::PostgresClient;
use async_trait::async_trait;
use chrono::Utc;
use tracing::{debug, instrument};

/// PostgreSQL adapter over the shared `outbox_events` table
///
/// The table schema is owned by the propagation subsystem; this adapter only
/// inserts pending rows and reads them back by id.
#[derive(Clone)]
pub struct PostgresOutboxRepository {
    client: PostgresClient,
}

impl PostgresOutboxRepository {
    pub fn new(client: PostgresClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl OutboxRepository for PostgresOutboxRepository {
    #[instrument(skip(self, input), fields(event_id = %input.id, tenant_id = %input.tenant_id, device_id = %input.device_id))]
    async fn enqueue(&self, input: EnqueueOutboxInput) -> DomainResult<EnqueueOutcome> {
        let conn = self
            .client
            .get_connection()
            .await
            .map_err(DomainError::RepositoryError)?;

        let entry = input.into_pending_entry(Utc::now());

        let inserted = conn
            .execute(
                "INSERT INTO outbox_events (id, tenant_id, farm_id, barn_id, device_id, event_type, occurred_at, trace_id, payload_json, status, next_attempt_at, priority, attempt_count, created_at, updated_at)
                 VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15)
                 ON CONFLICT (id) DO NOTHING",
                &[
                    &entry.id,
                    &entry.tenant_id,
                    &entry.farm_id,
                    &entry.barn_id,
                    &entry.device_id,
                    &entry.event_type,
                    &entry.occurred_at,
                    &entry.trace_id,
                    &entry.payload,
                    &entry.status.as_str(),
                    &entry.next_attempt_at,
                    &entry.priority,
                    &entry.attempt_count,
                    &entry.created_at,
                    &entry.updated_at,
                ],
            )
            .await
            .map_err(|e| DomainError::RepositoryError(e.into()))?;

        if inserted == 0 {
            debug!("outbox entry already exists, skipping");
            return Ok(EnqueueOutcome::Duplicate);
        }

        debug!("enqueued outbox entry");
        Ok(EnqueueOutcome::Inserted)
    }

    #[instrument(skip(self))]
    async fn get_entry(&self, id: &str) -> DomainResult<Option<OutboxEntry>> {
        let conn = self
            .client
            .get_connection()
            .await
            .map_err(DomainError::RepositoryError)?;

        let row = conn
            .query_opt(
                "SELECT id, tenant_id, farm_id, barn_id, device_id, event_type, occurred_at, trace_id, payload_json, status, next_attempt_at, priority, attempt_count, created_at, updated_at
                 FROM outbox_events
                 WHERE id = $1",
                &[&id],
            )
            .await
            .map_err(|e| DomainError::RepositoryError(e.into()))?;

        let Some(row) = row else {
            return Ok(None);
        };

        let status: String = row.get(9);
        Ok(Some(OutboxEntry {
            id: row.get(0),
            tenant_id: row.get(1),
            farm_id: row.get(2),
            barn_id: row.get(3),
            device_id: row.get(4),
            event_type: row.get(5),
            occurred_at: row.get(6),
            trace_id: row.get(7),
            payload: row.get(8),
            status: status.parse()?,
            next_attempt_at: row.get(10),
            priority: row.get(11),
            attempt_count: row.get(12),
            created_at: row.get(13),
            updated_at: row.get(14),
        }))
    }
}
