use crate::domain::{
    DomainError, DomainResult, InsertRawReadingInput, ListReadingsInRangeRepoInput,
    ListSeriesInRangeRepoInput, QueryRawReadingsRepoInput, RawReading, RawReadingRepository,
    ReadingSeries,
};
use crate::postgres::PostgresClient;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio_postgres::Row;
use tracing::{debug, instrument};

const SELECT_COLUMNS: &str = "id, tenant_id, farm_id, barn_id, device_id, metric_type, metric_value, unit, occurred_at, ingested_at";

/// Raw reading row as stored in `telemetry_readings`
#[derive(Debug, Clone)]
pub struct RawReadingRow {
    pub id: String,
    pub tenant_id: String,
    pub farm_id: Option<String>,
    pub barn_id: Option<String>,
    pub device_id: String,
    pub metric_type: String,
    pub metric_value: f64,
    pub unit: Option<String>,
    pub occurred_at: DateTime<Utc>,
    pub ingested_at: DateTime<Utc>,
}

impl From<&Row> for RawReadingRow {
    fn from(row: &Row) -> Self {
        RawReadingRow {
            id: row.get(0),
            tenant_id: row.get(1),
            farm_id: row.get(2),
            barn_id: row.get(3),
            device_id: row.get(4),
            metric_type: row.get(5),
            metric_value: row.get(6),
            unit: row.get(7),
            occurred_at: row.get(8),
            ingested_at: row.get(9),
        }
    }
}

impl From<RawReadingRow> for RawReading {
    fn from(row: RawReadingRow) -> Self {
        RawReading {
            id: row.id,
            tenant_id: row.tenant_id,
            farm_id: row.farm_id,
            barn_id: row.barn_id,
            device_id: row.device_id,
            metric_type: row.metric_type,
            metric_value: row.metric_value,
            unit: row.unit,
            occurred_at: row.occurred_at,
            ingested_at: row.ingested_at,
        }
    }
}

/// PostgreSQL implementation of RawReadingRepository trait
#[derive(Clone)]
pub struct PostgresRawReadingRepository {
    client: PostgresClient,
}

impl PostgresRawReadingRepository {
    pub fn new(client: PostgresClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl RawReadingRepository for PostgresRawReadingRepository {
    #[instrument(skip(self, input), fields(reading_id = %input.id, tenant_id = %input.tenant_id, device_id = %input.device_id))]
    async fn insert_reading(&self, input: InsertRawReadingInput) -> DomainResult<RawReading> {
        let conn = self
            .client
            .get_connection()
            .await
            .map_err(DomainError::RepositoryError)?;

        conn.execute(
            "INSERT INTO telemetry_readings (id, tenant_id, farm_id, barn_id, device_id, metric_type, metric_value, unit, occurred_at, ingested_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)",
            &[
                &input.id,
                &input.tenant_id,
                &input.farm_id,
                &input.barn_id,
                &input.device_id,
                &input.metric_type,
                &input.metric_value,
                &input.unit,
                &input.occurred_at,
                &input.ingested_at,
            ],
        )
        .await
        .map_err(|e| DomainError::RepositoryError(e.into()))?;

        debug!(metric_type = %input.metric_type, "stored raw reading");

        Ok(input.into())
    }

    #[instrument(skip(self, input), fields(tenant_id = %input.tenant_id, limit = input.limit))]
    async fn query_readings(
        &self,
        input: QueryRawReadingsRepoInput,
    ) -> DomainResult<Vec<RawReading>> {
        let conn = self
            .client
            .get_connection()
            .await
            .map_err(DomainError::RepositoryError)?;

        let limit = i64::from(input.limit);
        let rows = conn
            .query(
                &format!(
                    "SELECT {SELECT_COLUMNS}
                     FROM telemetry_readings
                     WHERE tenant_id = $1
                       AND ($2::TEXT IS NULL OR device_id = $2)
                       AND ($3::TIMESTAMPTZ IS NULL OR occurred_at >= $3)
                       AND ($4::TIMESTAMPTZ IS NULL OR occurred_at <= $4)
                     ORDER BY occurred_at DESC
                     LIMIT $5"
                ),
                &[
                    &input.tenant_id,
                    &input.device_id,
                    &input.start_time,
                    &input.end_time,
                    &limit,
                ],
            )
            .await
            .map_err(|e| DomainError::RepositoryError(e.into()))?;

        debug!(
            "found {} readings for tenant: {}",
            rows.len(),
            input.tenant_id
        );

        Ok(rows
            .iter()
            .map(|row| RawReadingRow::from(row).into())
            .collect())
    }

    #[instrument(skip(self, input), fields(start = %input.start, end = %input.end))]
    async fn list_series_in_range(
        &self,
        input: ListSeriesInRangeRepoInput,
    ) -> DomainResult<Vec<ReadingSeries>> {
        let conn = self
            .client
            .get_connection()
            .await
            .map_err(DomainError::RepositoryError)?;

        let rows = conn
            .query(
                "SELECT DISTINCT tenant_id, device_id, metric_type
                 FROM telemetry_readings
                 WHERE occurred_at >= $1
                   AND occurred_at < $2
                 ORDER BY tenant_id, device_id, metric_type",
                &[&input.start, &input.end],
            )
            .await
            .map_err(|e| DomainError::RepositoryError(e.into()))?;

        debug!("found {} series in aggregation range", rows.len());

        Ok(rows
            .iter()
            .map(|row| ReadingSeries {
                tenant_id: row.get(0),
                device_id: row.get(1),
                metric_type: row.get(2),
            })
            .collect())
    }

    #[instrument(skip(self, input), fields(tenant_id = %input.series.tenant_id, device_id = %input.series.device_id, metric_type = %input.series.metric_type, start = %input.start, end = %input.end))]
    async fn list_readings_in_range(
        &self,
        input: ListReadingsInRangeRepoInput,
    ) -> DomainResult<Vec<RawReading>> {
        let conn = self
            .client
            .get_connection()
            .await
            .map_err(DomainError::RepositoryError)?;

        let rows = conn
            .query(
                &format!(
                    "SELECT {SELECT_COLUMNS}
                     FROM telemetry_readings
                     WHERE tenant_id = $1
                       AND device_id = $2
                       AND metric_type = $3
                       AND occurred_at >= $4
                       AND occurred_at < $5
                     ORDER BY occurred_at"
                ),
                &[
                    &input.series.tenant_id,
                    &input.series.device_id,
                    &input.series.metric_type,
                    &input.start,
                    &input.end,
                ],
            )
            .await
            .map_err(|e| DomainError::RepositoryError(e.into()))?;

        debug!("loaded {} readings for series bucket", rows.len());

        Ok(rows
            .iter()
            .map(|row| RawReadingRow::from(row).into())
            .collect())
    }
}
