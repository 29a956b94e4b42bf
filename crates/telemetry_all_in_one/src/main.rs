mod config;

use aggregation_worker::{
    AggregationEngine, AggregationSweep, AggregationWorker, AggregationWorkerConfig,
};
use common::postgres::{
    PostgresAggregateRepository, PostgresClient, PostgresConfig, PostgresOutboxRepository,
    PostgresRawReadingRepository,
};
use common::telemetry::{init_telemetry, shutdown_telemetry, TelemetryProviders};
use crate::config::ServiceConfig;
use goose::MigrationRunner;
use std::sync::Arc;
use std::time::Duration;
use telemetry_api::{
    AppState, IngestionMetrics, OutboxWriter, TelemetryApi, TelemetryIngestionService,
    TelemetryQueryService,
};
use telemetry_runner::Runner;
use tracing::{debug, error, info};

#[tokio::main]
async fn main() {
    let config = match ServiceConfig::from_env() {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("Failed to load configuration: {}", e);
            std::process::exit(1);
        }
    };

    let telemetry_providers: Option<TelemetryProviders> =
        match init_telemetry(&config.telemetry_config()) {
            Ok(providers) => providers,
            Err(e) => {
                eprintln!("Failed to initialize telemetry: {}", e);
                std::process::exit(1);
            }
        };

    info!(
        otel_enabled = config.otel_enabled,
        otel_endpoint = %config.otel_endpoint,
        "Starting telemetry-all-in-one service"
    );
    debug!("Configuration: {:?}", config);

    let postgres_client = match initialize_postgres(&config).await {
        Ok(client) => client,
        Err(e) => {
            error!("Failed to initialize PostgreSQL: {}", e);
            std::process::exit(1);
        }
    };

    let reading_repository = Arc::new(PostgresRawReadingRepository::new(postgres_client.clone()));
    let outbox_repository = Arc::new(PostgresOutboxRepository::new(postgres_client.clone()));
    let aggregate_repository = Arc::new(PostgresAggregateRepository::new(postgres_client.clone()));

    // Ingestion and query path
    let metrics = Arc::new(IngestionMetrics::new());
    let outbox_writer = Arc::new(OutboxWriter::with_default_policy(outbox_repository));
    let ingestion_service = Arc::new(TelemetryIngestionService::new(
        reading_repository.clone(),
        outbox_writer,
        metrics.clone(),
        config.max_batch_size,
    ));
    let query_service = Arc::new(TelemetryQueryService::new(
        reading_repository.clone(),
        aggregate_repository.clone(),
        config.query_limits(),
    ));

    let telemetry_api = TelemetryApi::new(
        AppState {
            ingestion_service,
            query_service,
            metrics,
            datastore_health: Arc::new(postgres_client),
        },
        config.http_config(),
    );

    let mut runner = Runner::new().with_named_process(
        "telemetry_api",
        telemetry_api.into_runner_process(),
    );

    if config.aggregation_enabled {
        let engine = Arc::new(AggregationEngine::new(aggregate_repository));
        let sweep = Arc::new(AggregationSweep::new(
            reading_repository,
            engine,
            config.sweep_config(),
        ));
        let worker = AggregationWorker::new(
            sweep,
            AggregationWorkerConfig {
                sweep_interval: Duration::from_secs(config.aggregation_interval_secs),
            },
        );
        runner = runner.with_named_process("aggregation_sweep", worker.into_runner_process());
    } else {
        info!("Aggregation sweep disabled");
    }

    runner = runner
        .with_closer(move || async move {
            info!("Running cleanup tasks...");
            // Shutdown telemetry and flush pending traces and logs
            shutdown_telemetry(telemetry_providers);
            info!("Cleanup complete");
            Ok(())
        })
        .with_closer_timeout(Duration::from_secs(10));

    runner.run().await;
}

async fn initialize_postgres(config: &ServiceConfig) -> anyhow::Result<PostgresClient> {
    info!("Initializing PostgreSQL...");
    let postgres_config = config.postgres_config();
    run_postgres_migrations(&postgres_config).await?;

    let client = PostgresClient::from_config(&postgres_config)?;
    let timeout = Duration::from_secs(config.startup_timeout_secs);
    match tokio::time::timeout(timeout, client.ping()).await {
        Ok(result) => result?,
        Err(_) => anyhow::bail!("PostgreSQL did not respond within {:?}", timeout),
    }

    Ok(client)
}

async fn run_postgres_migrations(config: &PostgresConfig) -> anyhow::Result<()> {
    let runner = MigrationRunner::new(
        config.goose_binary_path.clone(),
        config.migrations_dir.clone(),
        "postgres".to_string(),
        config.dsn(),
    );
    runner.run_migrations().await
}
