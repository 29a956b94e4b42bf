use crate::domain::{AggregationEngine, ComputeAggregateInput};
use chrono::{DateTime, Utc};
use common::domain::{
    Aggregate, AggregateWindow, DomainError, DomainResult, ListReadingsInRangeRepoInput,
    ListSeriesInRangeRepoInput, RawReadingRepository, ReadingSeries,
};
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

/// How many trailing buckets (current one included) each window recomputes per sweep
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SweepConfig {
    pub lookback: Vec<(AggregateWindow, u32)>,
}

impl Default for SweepConfig {
    fn default() -> Self {
        Self {
            lookback: vec![
                (AggregateWindow::OneMinute, 15),
                (AggregateWindow::OneHour, 3),
                (AggregateWindow::OneDay, 2),
            ],
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub buckets_computed: usize,
    pub buckets_failed: usize,
}

impl SweepReport {
    fn merge(&mut self, other: SweepReport) {
        self.buckets_computed += other.buckets_computed;
        self.buckets_failed += other.buckets_failed;
    }
}

/// Selects buckets and readings and drives the aggregation engine over them
pub struct AggregationSweep {
    reading_repository: Arc<dyn RawReadingRepository>,
    engine: Arc<AggregationEngine>,
    config: SweepConfig,
}

impl AggregationSweep {
    pub fn new(
        reading_repository: Arc<dyn RawReadingRepository>,
        engine: Arc<AggregationEngine>,
        config: SweepConfig,
    ) -> Self {
        Self {
            reading_repository,
            engine,
            config,
        }
    }

    /// Recompute the trailing buckets of every configured window relative to `now`
    ///
    /// A window whose scan fails is logged and counted; the remaining windows still run.
    #[instrument(skip(self))]
    pub async fn sweep_at(&self, now: DateTime<Utc>) -> SweepReport {
        let mut report = SweepReport::default();

        for &(window, lookback) in &self.config.lookback {
            let Some((from, to)) = lookback_range(window, lookback, now) else {
                continue;
            };

            match self.recompute_range(window, from, to).await {
                Ok(window_report) => report.merge(window_report),
                Err(e) => {
                    warn!(window = %window, error = %e, "aggregation sweep failed for window");
                    report.buckets_failed += 1;
                }
            }
        }

        info!(
            buckets_computed = report.buckets_computed,
            buckets_failed = report.buckets_failed,
            "aggregation sweep finished"
        );
        report
    }

    /// Recompute every non-empty `window` bucket that intersects `[from, to)`
    ///
    /// Buckets are walked one at a time and each series is loaded on its own, so
    /// only a single (series, bucket) slice of readings is held at once. A failed
    /// series is logged and counted; a failed series listing aborts the range.
    #[instrument(skip(self), fields(window = %window))]
    pub async fn recompute_range(
        &self,
        window: AggregateWindow,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> DomainResult<SweepReport> {
        if to <= from {
            return Err(DomainError::InvalidTimeRange(format!(
                "range end {} is not after start {}",
                to, from
            )));
        }

        let mut report = SweepReport::default();
        let mut bucket_start_at = window.align(from);
        while bucket_start_at < to {
            let bucket_end_at = window.bucket_end(bucket_start_at);
            report.merge(
                self.recompute_bucket(window, bucket_start_at, bucket_end_at)
                    .await?,
            );
            bucket_start_at = bucket_end_at;
        }

        Ok(report)
    }

    async fn recompute_bucket(
        &self,
        window: AggregateWindow,
        bucket_start_at: DateTime<Utc>,
        bucket_end_at: DateTime<Utc>,
    ) -> DomainResult<SweepReport> {
        let series = self
            .reading_repository
            .list_series_in_range(ListSeriesInRangeRepoInput {
                start: bucket_start_at,
                end: bucket_end_at,
            })
            .await?;

        debug!(
            series = series.len(),
            %bucket_start_at,
            "recomputing bucket"
        );

        let mut report = SweepReport::default();
        for series in series {
            match self
                .recompute_series(window, &series, bucket_start_at, bucket_end_at)
                .await
            {
                Ok(Some(_)) => report.buckets_computed += 1,
                Ok(None) => {}
                Err(e) => {
                    warn!(
                        tenant_id = %series.tenant_id,
                        device_id = %series.device_id,
                        metric_type = %series.metric_type,
                        bucket_start_at = %bucket_start_at,
                        error = %e,
                        "failed to recompute aggregate"
                    );
                    report.buckets_failed += 1;
                }
            }
        }

        Ok(report)
    }

    async fn recompute_series(
        &self,
        window: AggregateWindow,
        series: &ReadingSeries,
        bucket_start_at: DateTime<Utc>,
        bucket_end_at: DateTime<Utc>,
    ) -> DomainResult<Option<Aggregate>> {
        let readings = self
            .reading_repository
            .list_readings_in_range(ListReadingsInRangeRepoInput {
                series: series.clone(),
                start: bucket_start_at,
                end: bucket_end_at,
            })
            .await?;

        self.engine
            .compute_aggregate(ComputeAggregateInput {
                tenant_id: series.tenant_id.clone(),
                device_id: series.device_id.clone(),
                window,
                metric_type: series.metric_type.clone(),
                bucket_start_at,
                bucket_end_at,
                readings,
            })
            .await
    }
}

/// `[align(now) - (lookback-1)*width, align(now) + width)`, or `None` for a zero lookback
pub fn lookback_range(
    window: AggregateWindow,
    lookback: u32,
    now: DateTime<Utc>,
) -> Option<(DateTime<Utc>, DateTime<Utc>)> {
    if lookback == 0 {
        return None;
    }
    let current = window.align(now);
    let trailing = i32::try_from(lookback - 1).ok()?;
    Some((current - window.width() * trailing, window.bucket_end(current)))
}
