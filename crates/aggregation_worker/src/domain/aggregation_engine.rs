use chrono::{DateTime, Utc};
use common::domain::{
    Aggregate, AggregateRepository, AggregateWindow, DomainError, DomainResult, RawReading,
    UpsertAggregateInput,
};
use std::sync::Arc;
use tracing::{debug, instrument};

/// avg/min/max/count over a non-empty set of values
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BucketStats {
    pub avg_value: f64,
    pub min_value: f64,
    pub max_value: f64,
    pub count: i64,
}

impl BucketStats {
    pub fn from_values(values: &[f64]) -> DomainResult<Self> {
        if values.is_empty() {
            return Err(DomainError::EmptyBucket);
        }

        let n = values.len() as f64;
        let mut sum = 0.0;
        let mut min_value = f64::INFINITY;
        let mut max_value = f64::NEG_INFINITY;
        for &v in values {
            sum += v;
            min_value = min_value.min(v);
            max_value = max_value.max(v);
        }

        // each v / n is bounded by max |v| / n, so this sum stays finite
        let avg_value = if sum.is_finite() {
            sum / n
        } else {
            values.iter().map(|v| v / n).sum()
        };

        Ok(Self {
            avg_value,
            min_value,
            max_value,
            count: values.len() as i64,
        })
    }
}

/// Recompute request for one (tenant, device, window, bucket, metric) tuple
#[derive(Debug, Clone, PartialEq)]
pub struct ComputeAggregateInput {
    pub tenant_id: String,
    pub device_id: String,
    pub window: AggregateWindow,
    pub metric_type: String,
    pub bucket_start_at: DateTime<Utc>,
    pub bucket_end_at: DateTime<Utc>,
    pub readings: Vec<RawReading>,
}

impl ComputeAggregateInput {
    /// Values of the readings that belong to this tuple and fall in `[start, end)`
    fn bucket_values(&self) -> Vec<f64> {
        self.readings
            .iter()
            .filter(|r| {
                r.tenant_id == self.tenant_id
                    && r.device_id == self.device_id
                    && r.metric_type == self.metric_type
                    && r.occurred_at >= self.bucket_start_at
                    && r.occurred_at < self.bucket_end_at
            })
            .map(|r| r.metric_value)
            .collect()
    }
}

/// Full recomputation of a single bucket followed by an upsert
///
/// Stored rows are never folded into; every call starts from the readings.
pub struct AggregationEngine {
    repository: Arc<dyn AggregateRepository>,
}

impl AggregationEngine {
    pub fn new(repository: Arc<dyn AggregateRepository>) -> Self {
        Self { repository }
    }

    /// Returns `None` without touching the store when the bucket has no readings
    #[instrument(skip(self, input), fields(tenant_id = %input.tenant_id, device_id = %input.device_id, window = %input.window, metric_type = %input.metric_type, bucket_start_at = %input.bucket_start_at))]
    pub async fn compute_aggregate(
        &self,
        input: ComputeAggregateInput,
    ) -> DomainResult<Option<Aggregate>> {
        if input.bucket_end_at <= input.bucket_start_at {
            return Err(DomainError::InvalidTimeRange(format!(
                "bucket end {} is not after bucket start {}",
                input.bucket_end_at, input.bucket_start_at
            )));
        }

        let values = input.bucket_values();
        if values.is_empty() {
            debug!("no readings in bucket, skipping");
            return Ok(None);
        }
        let stats = BucketStats::from_values(&values)?;

        let aggregate = self
            .repository
            .upsert_aggregate(UpsertAggregateInput {
                id: xid::new().to_string(),
                tenant_id: input.tenant_id,
                device_id: input.device_id,
                window: input.window,
                bucket_start_at: input.bucket_start_at,
                bucket_end_at: input.bucket_end_at,
                metric_type: input.metric_type,
                avg_value: stats.avg_value,
                min_value: stats.min_value,
                max_value: stats.max_value,
                count: stats.count,
            })
            .await?;

        debug!(aggregate_id = %aggregate.id, count = aggregate.count, "aggregate recomputed");
        Ok(Some(aggregate))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};
    use common::domain::MockAggregateRepository;
    use common::memory::InMemoryTelemetryStore;

    fn bucket_start() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap()
    }

    fn reading(value: f64, offset_secs: i64) -> RawReading {
        RawReading {
            id: xid::new().to_string(),
            tenant_id: "t1".to_string(),
            farm_id: None,
            barn_id: None,
            device_id: "d1".to_string(),
            metric_type: "temperature".to_string(),
            metric_value: value,
            unit: Some("C".to_string()),
            occurred_at: bucket_start() + Duration::seconds(offset_secs),
            ingested_at: Utc::now(),
        }
    }

    fn input(readings: Vec<RawReading>) -> ComputeAggregateInput {
        ComputeAggregateInput {
            tenant_id: "t1".to_string(),
            device_id: "d1".to_string(),
            window: AggregateWindow::OneMinute,
            metric_type: "temperature".to_string(),
            bucket_start_at: bucket_start(),
            bucket_end_at: AggregateWindow::OneMinute.bucket_end(bucket_start()),
            readings,
        }
    }

    #[test]
    fn test_bucket_stats() {
        let stats = BucketStats::from_values(&[10.0, 20.0, 30.0]).unwrap();
        assert_eq!(stats.avg_value, 20.0);
        assert_eq!(stats.min_value, 10.0);
        assert_eq!(stats.max_value, 30.0);
        assert_eq!(stats.count, 3);
    }

    #[test]
    fn test_bucket_stats_mean_of_extreme_values_is_finite() {
        let stats = BucketStats::from_values(&[1e308, 1e308]).unwrap();
        assert_eq!(stats.avg_value, 1e308);
        assert_eq!(stats.min_value, 1e308);
        assert_eq!(stats.max_value, 1e308);

        let stats = BucketStats::from_values(&[f64::MAX, f64::MAX, -f64::MAX]).unwrap();
        assert!(stats.avg_value.is_finite());
        assert!((stats.avg_value - f64::MAX / 3.0).abs() <= f64::MAX * 1e-12);
    }

    #[test]
    fn test_bucket_stats_empty() {
        assert!(matches!(
            BucketStats::from_values(&[]),
            Err(DomainError::EmptyBucket)
        ));
    }

    #[tokio::test]
    async fn test_compute_aggregate_correctness() {
        let store = InMemoryTelemetryStore::new();
        let engine = AggregationEngine::new(Arc::new(store.clone()));

        let aggregate = engine
            .compute_aggregate(input(vec![reading(10.0, 0), reading(20.0, 15), reading(30.0, 59)]))
            .await
            .unwrap()
            .unwrap();

        assert_eq!(aggregate.avg_value, 20.0);
        assert_eq!(aggregate.min_value, 10.0);
        assert_eq!(aggregate.max_value, 30.0);
        assert_eq!(aggregate.count, 3);
        assert_eq!(aggregate.bucket_end_at, bucket_start() + Duration::minutes(1));
    }

    #[tokio::test]
    async fn test_compute_aggregate_is_idempotent() {
        let store = InMemoryTelemetryStore::new();
        let engine = AggregationEngine::new(Arc::new(store.clone()));
        let readings = vec![reading(10.0, 0), reading(20.0, 15), reading(30.0, 59)];

        let first = engine
            .compute_aggregate(input(readings.clone()))
            .await
            .unwrap()
            .unwrap();
        let second = engine
            .compute_aggregate(input(readings))
            .await
            .unwrap()
            .unwrap();

        assert_eq!(first, second);
        assert_eq!(store.aggregates().await.len(), 1);
    }

    #[tokio::test]
    async fn test_empty_bucket_is_a_noop() {
        // no upsert expectation: any call would panic
        let repo = MockAggregateRepository::new();
        let engine = AggregationEngine::new(Arc::new(repo));

        let result = engine.compute_aggregate(input(vec![])).await.unwrap();
        assert!(result.is_none());
    }

    #[tokio::test]
    async fn test_readings_outside_tuple_are_ignored() {
        let store = InMemoryTelemetryStore::new();
        let engine = AggregationEngine::new(Arc::new(store.clone()));

        let mut other_device = reading(1000.0, 10);
        other_device.device_id = "d2".to_string();
        let mut other_metric = reading(1000.0, 10);
        other_metric.metric_type = "humidity".to_string();
        let next_bucket = reading(1000.0, 60);
        let before_bucket = reading(1000.0, -1);

        let aggregate = engine
            .compute_aggregate(input(vec![
                reading(5.0, 30),
                other_device,
                other_metric,
                next_bucket,
                before_bucket,
            ]))
            .await
            .unwrap()
            .unwrap();

        assert_eq!(aggregate.count, 1);
        assert_eq!(aggregate.avg_value, 5.0);
    }

    #[tokio::test]
    async fn test_only_foreign_readings_is_a_noop() {
        let store = InMemoryTelemetryStore::new();
        let engine = AggregationEngine::new(Arc::new(store.clone()));

        let result = engine
            .compute_aggregate(input(vec![reading(1.0, 120)]))
            .await
            .unwrap();
        assert!(result.is_none());
        assert!(store.aggregates().await.is_empty());
    }

    #[tokio::test]
    async fn test_recompute_picks_up_late_readings() {
        let store = InMemoryTelemetryStore::new();
        let engine = AggregationEngine::new(Arc::new(store.clone()));

        engine
            .compute_aggregate(input(vec![reading(10.0, 0)]))
            .await
            .unwrap();
        let updated = engine
            .compute_aggregate(input(vec![reading(10.0, 0), reading(30.0, 45)]))
            .await
            .unwrap()
            .unwrap();

        assert_eq!(updated.count, 2);
        assert_eq!(updated.avg_value, 20.0);
        assert_eq!(store.aggregates().await.len(), 1);
    }

    #[tokio::test]
    async fn test_inverted_bucket_is_rejected() {
        let engine = AggregationEngine::new(Arc::new(MockAggregateRepository::new()));
        let mut bad = input(vec![reading(1.0, 0)]);
        bad.bucket_end_at = bad.bucket_start_at;

        assert!(matches!(
            engine.compute_aggregate(bad).await,
            Err(DomainError::InvalidTimeRange(_))
        ));
    }
}
