use crate::domain::{
    Aggregate, AggregateRepository, DomainError, DomainResult, QueryAggregatesRepoInput,
    UpsertAggregateInput,
};
use crate::postgres::PostgresClient;
use async_trait::async_trait;
use tokio_postgres::Row;
use tracing::{debug, instrument};

const RETURNING_COLUMNS: &str = "id, tenant_id, device_id, time_window, bucket_start_at, bucket_end_at, metric_type, avg_value, min_value, max_value, sample_count";

fn aggregate_from_row(row: &Row) -> DomainResult<Aggregate> {
    let window: String = row.get(3);
    Ok(Aggregate {
        id: row.get(0),
        tenant_id: row.get(1),
        device_id: row.get(2),
        window: window.parse()?,
        bucket_start_at: row.get(4),
        bucket_end_at: row.get(5),
        metric_type: row.get(6),
        avg_value: row.get(7),
        min_value: row.get(8),
        max_value: row.get(9),
        count: row.get(10),
    })
}

/// PostgreSQL implementation of AggregateRepository trait
#[derive(Clone)]
pub struct PostgresAggregateRepository {
    client: PostgresClient,
}

impl PostgresAggregateRepository {
    pub fn new(client: PostgresClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl AggregateRepository for PostgresAggregateRepository {
    #[instrument(skip(self, input), fields(tenant_id = %input.tenant_id, device_id = %input.device_id, window = %input.window, bucket_start_at = %input.bucket_start_at, metric_type = %input.metric_type))]
    async fn upsert_aggregate(&self, input: UpsertAggregateInput) -> DomainResult<Aggregate> {
        let conn = self
            .client
            .get_connection()
            .await
            .map_err(DomainError::RepositoryError)?;

        let row = conn
            .query_one(
                &format!(
                    "INSERT INTO telemetry_aggregates (id, tenant_id, device_id, time_window, bucket_start_at, bucket_end_at, metric_type, avg_value, min_value, max_value, sample_count, updated_at)
                     VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, NOW())
                     ON CONFLICT (tenant_id, device_id, time_window, bucket_start_at, metric_type)
                     DO UPDATE SET bucket_end_at = EXCLUDED.bucket_end_at,
                                   avg_value = EXCLUDED.avg_value,
                                   min_value = EXCLUDED.min_value,
                                   max_value = EXCLUDED.max_value,
                                   sample_count = EXCLUDED.sample_count,
                                   updated_at = NOW()
                     RETURNING {RETURNING_COLUMNS}"
                ),
                &[
                    &input.id,
                    &input.tenant_id,
                    &input.device_id,
                    &input.window.as_str(),
                    &input.bucket_start_at,
                    &input.bucket_end_at,
                    &input.metric_type,
                    &input.avg_value,
                    &input.min_value,
                    &input.max_value,
                    &input.count,
                ],
            )
            .await
            .map_err(|e| DomainError::RepositoryError(e.into()))?;

        let aggregate = aggregate_from_row(&row)?;
        debug!(aggregate_id = %aggregate.id, count = aggregate.count, "upserted aggregate");

        Ok(aggregate)
    }

    #[instrument(skip(self, input), fields(tenant_id = %input.tenant_id, window = %input.window, limit = input.limit))]
    async fn query_aggregates(
        &self,
        input: QueryAggregatesRepoInput,
    ) -> DomainResult<Vec<Aggregate>> {
        let conn = self
            .client
            .get_connection()
            .await
            .map_err(DomainError::RepositoryError)?;

        let limit = i64::from(input.limit);
        let rows = conn
            .query(
                &format!(
                    "SELECT {RETURNING_COLUMNS}
                     FROM telemetry_aggregates
                     WHERE tenant_id = $1
                       AND time_window = $2
                       AND ($3::TEXT IS NULL OR device_id = $3)
                       AND ($4::TIMESTAMPTZ IS NULL OR bucket_start_at >= $4)
                       AND ($5::TIMESTAMPTZ IS NULL OR bucket_start_at <= $5)
                     ORDER BY bucket_start_at DESC
                     LIMIT $6"
                ),
                &[
                    &input.tenant_id,
                    &input.window.as_str(),
                    &input.device_id,
                    &input.start_time,
                    &input.end_time,
                    &limit,
                ],
            )
            .await
            .map_err(|e| DomainError::RepositoryError(e.into()))?;

        debug!(
            "found {} {} aggregates for tenant: {}",
            rows.len(),
            input.window,
            input.tenant_id
        );

        rows.iter().map(aggregate_from_row).collect()
    }
}
