use crate::domain::result::DomainResult;
use async_trait::async_trait;
use chrono::{DateTime, Utc};

/// A single persisted metric reading derived from a validated telemetry event
#[derive(Debug, Clone, PartialEq)]
pub struct RawReading {
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

/// Input for appending a reading (id and ingestion time are assigned by the caller)
#[derive(Debug, Clone, PartialEq)]
pub struct InsertRawReadingInput {
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

impl From<InsertRawReadingInput> for RawReading {
    fn from(input: InsertRawReadingInput) -> Self {
        RawReading {
            id: input.id,
            tenant_id: input.tenant_id,
            farm_id: input.farm_id,
            barn_id: input.barn_id,
            device_id: input.device_id,
            metric_type: input.metric_type,
            metric_value: input.metric_value,
            unit: input.unit,
            occurred_at: input.occurred_at,
            ingested_at: input.ingested_at,
        }
    }
}

/// Filters for reading raw readings back out of the store
///
/// `start_time` and `end_time` are both inclusive and apply to `occurred_at`.
#[derive(Debug, Clone, PartialEq)]
pub struct QueryRawReadingsRepoInput {
    pub tenant_id: String,
    pub device_id: Option<String>,
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
    pub limit: u32,
}

/// One (tenant, device, metric) stream of readings
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ReadingSeries {
    pub tenant_id: String,
    pub device_id: String,
    pub metric_type: String,
}

/// Half-open `[start, end)` range whose distinct series the aggregation sweep walks
#[derive(Debug, Clone, PartialEq)]
pub struct ListSeriesInRangeRepoInput {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

/// Readings of a single series with `occurred_at` in `[start, end)`
#[derive(Debug, Clone, PartialEq)]
pub struct ListReadingsInRangeRepoInput {
    pub series: ReadingSeries,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

/// Repository trait for the append-only raw reading store
#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
#[async_trait]
pub trait RawReadingRepository: Send + Sync {
    /// Append a reading. No uniqueness is enforced on content.
    async fn insert_reading(&self, input: InsertRawReadingInput) -> DomainResult<RawReading>;

    /// Readings for a tenant ordered by `occurred_at` descending, bounded by `limit`
    async fn query_readings(&self, input: QueryRawReadingsRepoInput)
        -> DomainResult<Vec<RawReading>>;

    /// Distinct series with at least one reading in `[start, end)`, ordered
    async fn list_series_in_range(
        &self,
        input: ListSeriesInRangeRepoInput,
    ) -> DomainResult<Vec<ReadingSeries>>;

    /// Readings of one series in `[start, end)` ordered by `occurred_at`
    async fn list_readings_in_range(
        &self,
        input: ListReadingsInRangeRepoInput,
    ) -> DomainResult<Vec<RawReading>>;
}
