use chrono::{DateTime, Utc};
use common::domain::{
    Aggregate, AggregateRepository, AggregateWindow, DomainError, DomainResult,
    QueryAggregatesRepoInput, QueryRawReadingsRepoInput, RawReading, RawReadingRepository,
};
use garde::Validate;
use std::sync::Arc;
use tracing::instrument;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueryLimits {
    pub default_limit: u32,
    pub max_limit: u32,
}

impl Default for QueryLimits {
    fn default() -> Self {
        Self {
            default_limit: 100,
            max_limit: 1000,
        }
    }
}

#[derive(Debug, Clone, Validate)]
pub struct QueryReadingsInput {
    #[garde(length(min = 1))]
    pub tenant_id: String,
    #[garde(inner(length(min = 1)))]
    pub device_id: Option<String>,
    #[garde(skip)]
    pub start_time: Option<DateTime<Utc>>,
    #[garde(skip)]
    pub end_time: Option<DateTime<Utc>>,
    #[garde(skip)]
    pub limit: Option<u32>,
}

#[derive(Debug, Clone, Validate)]
pub struct QueryAggregatesInput {
    #[garde(length(min = 1))]
    pub tenant_id: String,
    #[garde(skip)]
    pub window: AggregateWindow,
    #[garde(inner(length(min = 1)))]
    pub device_id: Option<String>,
    #[garde(skip)]
    pub start_time: Option<DateTime<Utc>>,
    #[garde(skip)]
    pub end_time: Option<DateTime<Utc>>,
    #[garde(skip)]
    pub limit: Option<u32>,
}

/// Read-only access to raw readings and aggregates
pub struct TelemetryQueryService {
    reading_repository: Arc<dyn RawReadingRepository>,
    aggregate_repository: Arc<dyn AggregateRepository>,
    limits: QueryLimits,
}

impl TelemetryQueryService {
    pub fn new(
        reading_repository: Arc<dyn RawReadingRepository>,
        aggregate_repository: Arc<dyn AggregateRepository>,
        limits: QueryLimits,
    ) -> Self {
        Self {
            reading_repository,
            aggregate_repository,
            limits,
        }
    }

    #[instrument(skip(self, input), fields(tenant_id = %input.tenant_id))]
    pub async fn query_readings(&self, input: QueryReadingsInput) -> DomainResult<Vec<RawReading>> {
        common::garde::validate_struct(&input)?;
        check_range(input.start_time, input.end_time)?;
        let limit = self.resolve_limit(input.limit)?;

        self.reading_repository
            .query_readings(QueryRawReadingsRepoInput {
                tenant_id: input.tenant_id,
                device_id: input.device_id,
                start_time: input.start_time,
                end_time: input.end_time,
                limit,
            })
            .await
    }

    #[instrument(skip(self, input), fields(tenant_id = %input.tenant_id, window = %input.window))]
    pub async fn query_aggregates(
        &self,
        input: QueryAggregatesInput,
    ) -> DomainResult<Vec<Aggregate>> {
        common::garde::validate_struct(&input)?;
        check_range(input.start_time, input.end_time)?;
        let limit = self.resolve_limit(input.limit)?;

        self.aggregate_repository
            .query_aggregates(QueryAggregatesRepoInput {
                tenant_id: input.tenant_id,
                window: input.window,
                device_id: input.device_id,
                start_time: input.start_time,
                end_time: input.end_time,
                limit,
            })
            .await
    }

    fn resolve_limit(&self, limit: Option<u32>) -> DomainResult<u32> {
        match limit {
            None => Ok(self.limits.default_limit),
            Some(l) if (1..=self.limits.max_limit).contains(&l) => Ok(l),
            Some(l) => Err(DomainError::InvalidQuery(format!(
                "limit must be between 1 and {}, got {}",
                self.limits.max_limit, l
            ))),
        }
    }
}

fn check_range(start: Option<DateTime<Utc>>, end: Option<DateTime<Utc>>) -> DomainResult<()> {
    match (start, end) {
        (Some(s), Some(e)) if s > e => Err(DomainError::InvalidTimeRange(format!(
            "start_time {} is after end_time {}",
            s.to_rfc3339(),
            e.to_rfc3339()
        ))),
        _ => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};
    use common::domain::{
        InsertRawReadingInput, MockAggregateRepository, MockRawReadingRepository,
        UpsertAggregateInput,
    };
    use common::memory::InMemoryTelemetryStore;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap()
    }

    fn readings_input() -> QueryReadingsInput {
        QueryReadingsInput {
            tenant_id: "t1".to_string(),
            device_id: None,
            start_time: None,
            end_time: None,
            limit: None,
        }
    }

    fn mock_service(
        readings: MockRawReadingRepository,
        aggregates: MockAggregateRepository,
    ) -> TelemetryQueryService {
        TelemetryQueryService::new(
            Arc::new(readings),
            Arc::new(aggregates),
            QueryLimits::default(),
        )
    }

    #[tokio::test]
    async fn test_default_limit_is_applied() {
        let mut readings = MockRawReadingRepository::new();
        readings
            .expect_query_readings()
            .withf(|input: &QueryRawReadingsRepoInput| input.limit == 100 && input.tenant_id == "t1")
            .times(1)
            .return_once(|_| Ok(vec![]));

        let service = mock_service(readings, MockAggregateRepository::new());
        assert!(service.query_readings(readings_input()).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_limit_out_of_range() {
        let service = mock_service(MockRawReadingRepository::new(), MockAggregateRepository::new());

        for limit in [0, 1001] {
            let mut input = readings_input();
            input.limit = Some(limit);
            assert!(matches!(
                service.query_readings(input).await,
                Err(DomainError::InvalidQuery(_))
            ));
        }
    }

    #[tokio::test]
    async fn test_inverted_time_range() {
        let service = mock_service(MockRawReadingRepository::new(), MockAggregateRepository::new());
        let mut input = readings_input();
        input.start_time = Some(t0() + Duration::minutes(1));
        input.end_time = Some(t0());

        assert!(matches!(
            service.query_readings(input).await,
            Err(DomainError::InvalidTimeRange(_))
        ));
    }

    #[tokio::test]
    async fn test_empty_tenant_is_rejected() {
        let service = mock_service(MockRawReadingRepository::new(), MockAggregateRepository::new());
        let input = QueryAggregatesInput {
            tenant_id: String::new(),
            window: AggregateWindow::OneHour,
            device_id: None,
            start_time: None,
            end_time: None,
            limit: None,
        };
        assert!(matches!(
            service.query_aggregates(input).await,
            Err(DomainError::ValidationError(_))
        ));
    }

    #[tokio::test]
    async fn test_aggregates_pass_window_through() {
        let mut aggregates = MockAggregateRepository::new();
        aggregates
            .expect_query_aggregates()
            .withf(|input: &QueryAggregatesRepoInput| {
                input.window == AggregateWindow::OneDay
                    && input.device_id.as_deref() == Some("d1")
                    && input.limit == 5
            })
            .times(1)
            .return_once(|_| Ok(vec![]));

        let service = mock_service(MockRawReadingRepository::new(), aggregates);
        let input = QueryAggregatesInput {
            tenant_id: "t1".to_string(),
            window: AggregateWindow::OneDay,
            device_id: Some("d1".to_string()),
            start_time: None,
            end_time: None,
            limit: Some(5),
        };
        service.query_aggregates(input).await.unwrap();
    }

    #[tokio::test]
    async fn test_time_range_filter_uses_occurred_at() {
        let store = InMemoryTelemetryStore::new();
        // ingested far from when they occurred, in reverse order
        for (id, offset) in [("late", 120), ("inside-b", 60), ("inside-a", 30), ("early", 0)] {
            store
                .insert_reading(InsertRawReadingInput {
                    id: id.to_string(),
                    tenant_id: "t1".to_string(),
                    farm_id: None,
                    barn_id: None,
                    device_id: "d1".to_string(),
                    metric_type: "temperature".to_string(),
                    metric_value: 1.0,
                    unit: None,
                    occurred_at: t0() + Duration::seconds(offset),
                    ingested_at: t0() + Duration::days(1),
                })
                .await
                .unwrap();
        }

        let service = TelemetryQueryService::new(
            Arc::new(store.clone()),
            Arc::new(store),
            QueryLimits::default(),
        );
        let mut input = readings_input();
        input.start_time = Some(t0() + Duration::seconds(30));
        input.end_time = Some(t0() + Duration::seconds(60));

        let ids: Vec<String> = service
            .query_readings(input)
            .await
            .unwrap()
            .into_iter()
            .map(|r| r.id)
            .collect();
        assert_eq!(ids, vec!["inside-b", "inside-a"]);
    }

    async fn store_hourly_aggregates(store: &InMemoryTelemetryStore) {
        for device in ["d1", "d2"] {
            for hour in 0..5 {
                let start = t0() + Duration::hours(hour);
                store
                    .upsert_aggregate(UpsertAggregateInput {
                        id: format!("{}-{}", device, hour),
                        tenant_id: "t1".to_string(),
                        device_id: device.to_string(),
                        window: AggregateWindow::OneHour,
                        bucket_start_at: start,
                        bucket_end_at: AggregateWindow::OneHour.bucket_end(start),
                        metric_type: "temperature".to_string(),
                        avg_value: hour as f64,
                        min_value: hour as f64,
                        max_value: hour as f64,
                        count: 1,
                    })
                    .await
                    .unwrap();
            }
        }
    }

    #[tokio::test]
    async fn test_aggregates_filter_by_device_and_bucket_range() {
        let store = InMemoryTelemetryStore::new();
        store_hourly_aggregates(&store).await;
        let service = TelemetryQueryService::new(
            Arc::new(store.clone()),
            Arc::new(store),
            QueryLimits::default(),
        );
        let input = QueryAggregatesInput {
            tenant_id: "t1".to_string(),
            window: AggregateWindow::OneHour,
            device_id: Some("d1".to_string()),
            start_time: Some(t0() + Duration::hours(1)),
            end_time: Some(t0() + Duration::hours(3)),
            limit: None,
        };

        let ids: Vec<String> = service
            .query_aggregates(input.clone())
            .await
            .unwrap()
            .into_iter()
            .map(|a| a.id)
            .collect();
        assert_eq!(ids, vec!["d1-3", "d1-2", "d1-1"]);

        let truncated: Vec<String> = service
            .query_aggregates(QueryAggregatesInput {
                limit: Some(2),
                ..input
            })
            .await
            .unwrap()
            .into_iter()
            .map(|a| a.id)
            .collect();
        assert_eq!(truncated, vec!["d1-3", "d1-2"]);
    }

    #[tokio::test]
    async fn test_aggregates_without_device_span_all_devices() {
        let store = InMemoryTelemetryStore::new();
        store_hourly_aggregates(&store).await;
        let service = TelemetryQueryService::new(
            Arc::new(store.clone()),
            Arc::new(store),
            QueryLimits::default(),
        );

        let rows = service
            .query_aggregates(QueryAggregatesInput {
                tenant_id: "t1".to_string(),
                window: AggregateWindow::OneHour,
                device_id: None,
                start_time: Some(t0() + Duration::hours(4)),
                end_time: None,
                limit: None,
            })
            .await
            .unwrap();

        let mut devices: Vec<&str> = rows.iter().map(|a| a.device_id.as_str()).collect();
        devices.sort();
        assert_eq!(devices, vec!["d1", "d2"]);
        assert!(rows.iter().all(|a| a.bucket_start_at == t0() + Duration::hours(4)));
    }
}
