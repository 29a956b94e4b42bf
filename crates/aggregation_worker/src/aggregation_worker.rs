use crate::domain::AggregationSweep;
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::info;

pub struct AggregationWorkerConfig {
    pub sweep_interval: Duration,
}

/// Runs the aggregation sweep on a fixed interval until cancelled
pub struct AggregationWorker {
    sweep: Arc<AggregationSweep>,
    config: AggregationWorkerConfig,
}

impl AggregationWorker {
    pub fn new(sweep: Arc<AggregationSweep>, config: AggregationWorkerConfig) -> Self {
        info!(
            interval_secs = config.sweep_interval.as_secs(),
            "Initializing aggregation worker"
        );
        Self { sweep, config }
    }

    pub async fn run(&self, ctx: CancellationToken) -> anyhow::Result<()> {
        info!(
            interval_secs = self.config.sweep_interval.as_secs(),
            "starting aggregation sweep loop"
        );

        loop {
            tokio::select! {
                _ = ctx.cancelled() => {
                    info!("aggregation sweep loop shutting down");
                    break;
                }
                _ = tokio::time::sleep(self.config.sweep_interval) => {
                    self.sweep.sweep_at(Utc::now()).await;
                }
            }
        }

        Ok(())
    }

    pub fn into_runner_process(
        self,
    ) -> impl FnOnce(
        CancellationToken,
    ) -> std::pin::Pin<
        Box<dyn std::future::Future<Output = anyhow::Result<()>> + Send>,
    > {
        move |ctx| Box::pin(async move { self.run(ctx).await })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{AggregationEngine, SweepConfig};
    use common::domain::{InsertRawReadingInput, RawReadingRepository};
    use common::memory::InMemoryTelemetryStore;

    #[tokio::test]
    async fn test_worker_stops_on_cancellation() {
        let store = InMemoryTelemetryStore::new();
        let sweep = Arc::new(AggregationSweep::new(
            Arc::new(store.clone()),
            Arc::new(AggregationEngine::new(Arc::new(store))),
            SweepConfig::default(),
        ));
        let worker = AggregationWorker::new(
            sweep,
            AggregationWorkerConfig {
                sweep_interval: Duration::from_secs(3600),
            },
        );

        let ctx = CancellationToken::new();
        ctx.cancel();

        let result = tokio::time::timeout(Duration::from_secs(1), worker.run(ctx)).await;
        assert!(matches!(result, Ok(Ok(()))));
    }

    #[tokio::test]
    async fn test_worker_sweeps_on_interval() {
        let store = InMemoryTelemetryStore::new();
        store
            .insert_reading(InsertRawReadingInput {
                id: "r1".to_string(),
                tenant_id: "t1".to_string(),
                farm_id: None,
                barn_id: None,
                device_id: "d1".to_string(),
                metric_type: "temperature".to_string(),
                metric_value: 21.5,
                unit: None,
                occurred_at: Utc::now(),
                ingested_at: Utc::now(),
            })
            .await
            .unwrap();

        let sweep = Arc::new(AggregationSweep::new(
            Arc::new(store.clone()),
            Arc::new(AggregationEngine::new(Arc::new(store.clone()))),
            SweepConfig::default(),
        ));
        let worker = AggregationWorker::new(
            sweep,
            AggregationWorkerConfig {
                sweep_interval: Duration::from_millis(20),
            },
        );

        let ctx = CancellationToken::new();
        let handle = tokio::spawn(worker.into_runner_process()(ctx.clone()));

        let mut computed = false;
        for _ in 0..50 {
            if store.aggregates().await.len() == 3 {
                computed = true;
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        ctx.cancel();
        handle.await.unwrap().unwrap();

        assert!(computed, "expected one aggregate per window");
    }
}
