use crate::domain::result::{DomainError, DomainResult};
use async_trait::async_trait;
use chrono::{DateTime, Duration, Timelike, Utc};
use std::fmt;
use std::str::FromStr;

/// Fixed-width, UTC-aligned aggregation granularity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AggregateWindow {
    OneMinute,
    OneHour,
    OneDay,
}

impl AggregateWindow {
    pub const ALL: [AggregateWindow; 3] = [
        AggregateWindow::OneMinute,
        AggregateWindow::OneHour,
        AggregateWindow::OneDay,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            AggregateWindow::OneMinute => "1m",
            AggregateWindow::OneHour => "1h",
            AggregateWindow::OneDay => "1d",
        }
    }

    pub fn width(&self) -> Duration {
        match self {
            AggregateWindow::OneMinute => Duration::minutes(1),
            AggregateWindow::OneHour => Duration::hours(1),
            AggregateWindow::OneDay => Duration::days(1),
        }
    }

    /// Start of the bucket containing `ts`
    pub fn align(&self, ts: DateTime<Utc>) -> DateTime<Utc> {
        let width_secs = self.width().num_seconds();
        let into_bucket = ts.timestamp().rem_euclid(width_secs);
        let sub_second = i64::from(ts.nanosecond() % 1_000_000_000);
        ts - Duration::seconds(into_bucket) - Duration::nanoseconds(sub_second)
    }

    /// Exclusive end of the bucket starting at `bucket_start`
    pub fn bucket_end(&self, bucket_start: DateTime<Utc>) -> DateTime<Utc> {
        bucket_start + self.width()
    }
}

impl fmt::Display for AggregateWindow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AggregateWindow {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "1m" => Ok(AggregateWindow::OneMinute),
            "1h" => Ok(AggregateWindow::OneHour),
            "1d" => Ok(AggregateWindow::OneDay),
            other => Err(DomainError::InvalidWindow(format!(
                "'{}' (expected one of 1m, 1h, 1d)",
                other
            ))),
        }
    }
}

/// Pre-computed statistics for one (tenant, device, window, bucket, metric) tuple
#[derive(Debug, Clone, PartialEq)]
pub struct Aggregate {
    pub id: String,
    pub tenant_id: String,
    pub device_id: String,
    pub window: AggregateWindow,
    pub bucket_start_at: DateTime<Utc>,
    pub bucket_end_at: DateTime<Utc>,
    pub metric_type: String,
    pub avg_value: f64,
    pub min_value: f64,
    pub max_value: f64,
    pub count: i64,
}

/// Input for upserting an aggregate row
///
/// `id` is only used when the tuple has no row yet; an existing row keeps its id.
#[derive(Debug, Clone, PartialEq)]
pub struct UpsertAggregateInput {
    pub id: String,
    pub tenant_id: String,
    pub device_id: String,
    pub window: AggregateWindow,
    pub bucket_start_at: DateTime<Utc>,
    pub bucket_end_at: DateTime<Utc>,
    pub metric_type: String,
    pub avg_value: f64,
    pub min_value: f64,
    pub max_value: f64,
    pub count: i64,
}

/// Filters for aggregate reads; the time range applies to `bucket_start_at` inclusively
#[derive(Debug, Clone, PartialEq)]
pub struct QueryAggregatesRepoInput {
    pub tenant_id: String,
    pub window: AggregateWindow,
    pub device_id: Option<String>,
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
    pub limit: u32,
}

/// Repository trait for aggregate storage
#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
#[async_trait]
pub trait AggregateRepository: Send + Sync {
    /// Create or overwrite the row identified by
    /// (tenant_id, device_id, window, bucket_start_at, metric_type)
    async fn upsert_aggregate(&self, input: UpsertAggregateInput) -> DomainResult<Aggregate>;

    /// Aggregates for a tenant and window ordered by `bucket_start_at` descending
    async fn query_aggregates(&self, input: QueryAggregatesRepoInput)
        -> DomainResult<Vec<Aggregate>>;
}
