//! In-memory repository doubles used by service and HTTP tests.

use crate::domain::{
    Aggregate, AggregateRepository, DatastoreHealth, DomainError, DomainResult,
    EnqueueOutboxInput, EnqueueOutcome, InsertRawReadingInput, ListReadingsInRangeRepoInput,
    ListSeriesInRangeRepoInput, OutboxEntry, OutboxRepository, QueryAggregatesRepoInput,
    QueryRawReadingsRepoInput, RawReading, RawReadingRepository, ReadingSeries,
    UpsertAggregateInput,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::{BTreeSet, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::RwLock;

type AggregateKey = (String, String, &'static str, DateTime<Utc>, String);

/// In-memory implementation of the raw reading, outbox and aggregate repositories
///
/// Clones share state, so one store can be handed to several services.
#[derive(Clone, Default)]
pub struct InMemoryTelemetryStore {
    readings: Arc<RwLock<Vec<RawReading>>>,
    outbox: Arc<RwLock<HashMap<String, OutboxEntry>>>,
    aggregates: Arc<RwLock<HashMap<AggregateKey, Aggregate>>>,
    fail_readings: Arc<AtomicBool>,
    fail_outbox: Arc<AtomicBool>,
    unavailable: Arc<AtomicBool>,
}

impl InMemoryTelemetryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent reading insert fail
    pub fn set_fail_readings(&self, fail: bool) {
        self.fail_readings.store(fail, Ordering::SeqCst);
    }

    /// Make every subsequent outbox enqueue fail
    pub fn set_fail_outbox(&self, fail: bool) {
        self.fail_outbox.store(fail, Ordering::SeqCst);
    }

    /// Make the health probe report the datastore as unreachable
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    pub async fn readings(&self) -> Vec<RawReading> {
        self.readings.read().await.clone()
    }

    pub async fn outbox_entries(&self) -> Vec<OutboxEntry> {
        self.outbox.read().await.values().cloned().collect()
    }

    pub async fn aggregates(&self) -> Vec<Aggregate> {
        self.aggregates.read().await.values().cloned().collect()
    }
}

fn within(ts: DateTime<Utc>, start: Option<DateTime<Utc>>, end: Option<DateTime<Utc>>) -> bool {
    start.map_or(true, |s| ts >= s) && end.map_or(true, |e| ts <= e)
}

#[async_trait]
impl RawReadingRepository for InMemoryTelemetryStore {
    async fn insert_reading(&self, input: InsertRawReadingInput) -> DomainResult<RawReading> {
        if self.fail_readings.load(Ordering::SeqCst) {
            return Err(DomainError::RepositoryError(anyhow::anyhow!(
                "raw reading store unavailable"
            )));
        }
        let reading: RawReading = input.into();
        self.readings.write().await.push(reading.clone());
        Ok(reading)
    }

    async fn query_readings(
        &self,
        input: QueryRawReadingsRepoInput,
    ) -> DomainResult<Vec<RawReading>> {
        let readings = self.readings.read().await;
        let mut matched: Vec<RawReading> = readings
            .iter()
            .filter(|r| r.tenant_id == input.tenant_id)
            .filter(|r| input.device_id.as_ref().map_or(true, |d| &r.device_id == d))
            .filter(|r| within(r.occurred_at, input.start_time, input.end_time))
            .cloned()
            .collect();
        matched.sort_by(|a, b| b.occurred_at.cmp(&a.occurred_at));
        matched.truncate(input.limit as usize);
        Ok(matched)
    }

    async fn list_series_in_range(
        &self,
        input: ListSeriesInRangeRepoInput,
    ) -> DomainResult<Vec<ReadingSeries>> {
        let readings = self.readings.read().await;
        let series: BTreeSet<ReadingSeries> = readings
            .iter()
            .filter(|r| r.occurred_at >= input.start && r.occurred_at < input.end)
            .map(|r| ReadingSeries {
                tenant_id: r.tenant_id.clone(),
                device_id: r.device_id.clone(),
                metric_type: r.metric_type.clone(),
            })
            .collect();
        Ok(series.into_iter().collect())
    }

    async fn list_readings_in_range(
        &self,
        input: ListReadingsInRangeRepoInput,
    ) -> DomainResult<Vec<RawReading>> {
        let readings = self.readings.read().await;
        let series = &input.series;
        let mut matched: Vec<RawReading> = readings
            .iter()
            .filter(|r| r.occurred_at >= input.start && r.occurred_at < input.end)
            .filter(|r| {
                r.tenant_id == series.tenant_id
                    && r.device_id == series.device_id
                    && r.metric_type == series.metric_type
            })
            .cloned()
            .collect();
        matched.sort_by(|a, b| a.occurred_at.cmp(&b.occurred_at));
        Ok(matched)
    }
}

#[async_trait]
impl OutboxRepository for InMemoryTelemetryStore {
    async fn enqueue(&self, input: EnqueueOutboxInput) -> DomainResult<EnqueueOutcome> {
        if self.fail_outbox.load(Ordering::SeqCst) {
            return Err(DomainError::RepositoryError(anyhow::anyhow!(
                "outbox table unavailable"
            )));
        }
        let mut outbox = self.outbox.write().await;
        if outbox.contains_key(&input.id) {
            return Ok(EnqueueOutcome::Duplicate);
        }
        let entry = input.into_pending_entry(Utc::now());
        outbox.insert(entry.id.clone(), entry);
        Ok(EnqueueOutcome::Inserted)
    }

    async fn get_entry(&self, id: &str) -> DomainResult<Option<OutboxEntry>> {
        Ok(self.outbox.read().await.get(id).cloned())
    }
}

#[async_trait]
impl AggregateRepository for InMemoryTelemetryStore {
    async fn upsert_aggregate(&self, input: UpsertAggregateInput) -> DomainResult<Aggregate> {
        let key = (
            input.tenant_id.clone(),
            input.device_id.clone(),
            input.window.as_str(),
            input.bucket_start_at,
            input.metric_type.clone(),
        );
        let mut aggregates = self.aggregates.write().await;
        let id = aggregates
            .get(&key)
            .map(|existing| existing.id.clone())
            .unwrap_or(input.id);
        let aggregate = Aggregate {
            id,
            tenant_id: input.tenant_id,
            device_id: input.device_id,
            window: input.window,
            bucket_start_at: input.bucket_start_at,
            bucket_end_at: input.bucket_end_at,
            metric_type: input.metric_type,
            avg_value: input.avg_value,
            min_value: input.min_value,
            max_value: input.max_value,
            count: input.count,
        };
        aggregates.insert(key, aggregate.clone());
        Ok(aggregate)
    }

    async fn query_aggregates(
        &self,
        input: QueryAggregatesRepoInput,
    ) -> DomainResult<Vec<Aggregate>> {
        let aggregates = self.aggregates.read().await;
        let mut matched: Vec<Aggregate> = aggregates
            .values()
            .filter(|a| a.tenant_id == input.tenant_id && a.window == input.window)
            .filter(|a| input.device_id.as_ref().map_or(true, |d| &a.device_id == d))
            .filter(|a| within(a.bucket_start_at, input.start_time, input.end_time))
            .cloned()
            .collect();
        matched.sort_by(|a, b| b.bucket_start_at.cmp(&a.bucket_start_at));
        matched.truncate(input.limit as usize);
        Ok(matched)
    }
}

#[async_trait]
impl DatastoreHealth for InMemoryTelemetryStore {
    async fn ping(&self) -> DomainResult<()> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(DomainError::DatastoreUnavailable(
                "in-memory store marked unavailable".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::AggregateWindow;
    use chrono::TimeZone;

    fn reading(id: &str, device: &str, at: DateTime<Utc>) -> InsertRawReadingInput {
        InsertRawReadingInput {
            id: id.to_string(),
            tenant_id: "t1".to_string(),
            farm_id: None,
            barn_id: None,
            device_id: device.to_string(),
            metric_type: "temperature".to_string(),
            metric_value: 1.0,
            unit: None,
            occurred_at: at,
            ingested_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_query_orders_by_occurred_at_desc() {
        let store = InMemoryTelemetryStore::new();
        let t0 = Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap();
        store.insert_reading(reading("a", "d1", t0)).await.unwrap();
        store
            .insert_reading(reading("b", "d1", t0 + chrono::Duration::seconds(10)))
            .await
            .unwrap();

        let result = store
            .query_readings(QueryRawReadingsRepoInput {
                tenant_id: "t1".to_string(),
                device_id: None,
                start_time: None,
                end_time: None,
                limit: 10,
            })
            .await
            .unwrap();

        assert_eq!(
            result.iter().map(|r| r.id.as_str()).collect::<Vec<_>>(),
            vec!["b", "a"]
        );
    }

    #[tokio::test]
    async fn test_upsert_keeps_original_id() {
        let store = InMemoryTelemetryStore::new();
        let start = Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap();
        let input = |id: &str, count: i64| UpsertAggregateInput {
            id: id.to_string(),
            tenant_id: "t1".to_string(),
            device_id: "d1".to_string(),
            window: AggregateWindow::OneMinute,
            bucket_start_at: start,
            bucket_end_at: AggregateWindow::OneMinute.bucket_end(start),
            metric_type: "temperature".to_string(),
            avg_value: 1.0,
            min_value: 1.0,
            max_value: 1.0,
            count,
        };

        let first = store.upsert_aggregate(input("agg-1", 1)).await.unwrap();
        let second = store.upsert_aggregate(input("agg-2", 2)).await.unwrap();

        assert_eq!(first.id, "agg-1");
        assert_eq!(second.id, "agg-1");
        assert_eq!(second.count, 2);
        assert_eq!(store.aggregates().await.len(), 1);
    }

    #[tokio::test]
    async fn test_series_listing_is_distinct_and_half_open() {
        let store = InMemoryTelemetryStore::new();
        let t0 = Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap();
        let end = t0 + chrono::Duration::minutes(1);
        store.insert_reading(reading("a", "d2", t0)).await.unwrap();
        store.insert_reading(reading("b", "d1", t0)).await.unwrap();
        store
            .insert_reading(reading("c", "d1", t0 + chrono::Duration::seconds(30)))
            .await
            .unwrap();
        store.insert_reading(reading("d", "d3", end)).await.unwrap();

        let series = store
            .list_series_in_range(ListSeriesInRangeRepoInput { start: t0, end })
            .await
            .unwrap();
        let devices: Vec<_> = series.iter().map(|s| s.device_id.as_str()).collect();
        assert_eq!(devices, vec!["d1", "d2"]);

        let readings = store
            .list_readings_in_range(ListReadingsInRangeRepoInput {
                series: series[0].clone(),
                start: t0,
                end,
            })
            .await
            .unwrap();
        let ids: Vec<_> = readings.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec!["b", "c"]);
    }
}
