use chrono::{DateTime, TimeZone, Utc};
use serde::Serialize;
use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use std::time::Instant;

/// Process-wide ingestion counters
///
/// Counters are relaxed atomics; a snapshot is not a consistent cut across
/// counters, only per counter.
#[derive(Debug)]
pub struct IngestionMetrics {
    started_at: Instant,
    batches_received: AtomicU64,
    batches_rejected: AtomicU64,
    events_received: AtomicU64,
    events_ingested: AtomicU64,
    events_failed: AtomicU64,
    outbox_inserted: AtomicU64,
    outbox_duplicates: AtomicU64,
    outbox_failed: AtomicU64,
    // unix millis, 0 = never
    last_ingested_at: AtomicI64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IngestionMetricsSnapshot {
    pub batches_received: u64,
    pub batches_rejected: u64,
    pub events_received: u64,
    pub events_ingested: u64,
    pub events_failed: u64,
    pub outbox_inserted: u64,
    pub outbox_duplicates: u64,
    pub outbox_failed: u64,
    pub uptime_secs: u64,
    pub events_per_second: f64,
    pub last_ingested_at: Option<DateTime<Utc>>,
}

impl Default for IngestionMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl IngestionMetrics {
    pub fn new() -> Self {
        Self {
            started_at: Instant::now(),
            batches_received: AtomicU64::new(0),
            batches_rejected: AtomicU64::new(0),
            events_received: AtomicU64::new(0),
            events_ingested: AtomicU64::new(0),
            events_failed: AtomicU64::new(0),
            outbox_inserted: AtomicU64::new(0),
            outbox_duplicates: AtomicU64::new(0),
            outbox_failed: AtomicU64::new(0),
            last_ingested_at: AtomicI64::new(0),
        }
    }

    pub fn record_batch(&self, events: usize) {
        self.batches_received.fetch_add(1, Ordering::Relaxed);
        self.events_received
            .fetch_add(events as u64, Ordering::Relaxed);
    }

    /// A batch that never reached per-event processing
    pub fn record_rejected_batch(&self) {
        self.batches_received.fetch_add(1, Ordering::Relaxed);
        self.batches_rejected.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_ingested(&self, at: DateTime<Utc>) {
        self.events_ingested.fetch_add(1, Ordering::Relaxed);
        self.last_ingested_at
            .fetch_max(at.timestamp_millis(), Ordering::Relaxed);
    }

    pub fn record_failed(&self) {
        self.events_failed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_emit(&self, outcome: crate::domain::EmitOutcome) {
        use crate::domain::EmitOutcome;
        let counter = match outcome {
            EmitOutcome::Inserted => &self.outbox_inserted,
            EmitOutcome::Duplicate => &self.outbox_duplicates,
            EmitOutcome::Failed => &self.outbox_failed,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> IngestionMetricsSnapshot {
        let uptime = self.started_at.elapsed();
        let events_ingested = self.events_ingested.load(Ordering::Relaxed);
        let uptime_secs_f = uptime.as_secs_f64();
        let events_per_second = if uptime_secs_f > 0.0 {
            events_ingested as f64 / uptime_secs_f
        } else {
            0.0
        };
        let last = self.last_ingested_at.load(Ordering::Relaxed);

        IngestionMetricsSnapshot {
            batches_received: self.batches_received.load(Ordering::Relaxed),
            batches_rejected: self.batches_rejected.load(Ordering::Relaxed),
            events_received: self.events_received.load(Ordering::Relaxed),
            events_ingested,
            events_failed: self.events_failed.load(Ordering::Relaxed),
            outbox_inserted: self.outbox_inserted.load(Ordering::Relaxed),
            outbox_duplicates: self.outbox_duplicates.load(Ordering::Relaxed),
            outbox_failed: self.outbox_failed.load(Ordering::Relaxed),
            uptime_secs: uptime.as_secs(),
            events_per_second,
            last_ingested_at: (last > 0)
                .then(|| Utc.timestamp_millis_opt(last).single())
                .flatten(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::EmitOutcome;

    #[test]
    fn test_counters() {
        let metrics = IngestionMetrics::new();
        metrics.record_batch(3);
        metrics.record_rejected_batch();
        metrics.record_ingested(Utc::now());
        metrics.record_ingested(Utc::now());
        metrics.record_failed();
        metrics.record_emit(EmitOutcome::Inserted);
        metrics.record_emit(EmitOutcome::Duplicate);
        metrics.record_emit(EmitOutcome::Failed);

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.batches_received, 2);
        assert_eq!(snapshot.batches_rejected, 1);
        assert_eq!(snapshot.events_received, 3);
        assert_eq!(snapshot.events_ingested, 2);
        assert_eq!(snapshot.events_failed, 1);
        assert_eq!(snapshot.outbox_inserted, 1);
        assert_eq!(snapshot.outbox_duplicates, 1);
        assert_eq!(snapshot.outbox_failed, 1);
        assert!(snapshot.last_ingested_at.is_some());
    }

    #[test]
    fn test_last_ingested_at_is_monotonic() {
        let metrics = IngestionMetrics::new();
        let later = Utc.with_ymd_and_hms(2025, 1, 1, 0, 1, 0).unwrap();
        let earlier = Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap();
        metrics.record_ingested(later);
        metrics.record_ingested(earlier);
        assert_eq!(metrics.snapshot().last_ingested_at, Some(later));
    }

    #[test]
    fn test_empty_snapshot() {
        let snapshot = IngestionMetrics::new().snapshot();
        assert_eq!(snapshot.events_ingested, 0);
        assert_eq!(snapshot.last_ingested_at, None);
    }
}
