use aggregation_worker::SweepConfig;
use common::domain::AggregateWindow;
use common::postgres::PostgresConfig;
use common::telemetry::TelemetryConfig;
use config::{Config, ConfigError, Environment};
use serde::{Deserialize, Serialize};
use telemetry_api::{HttpServerConfig, QueryLimits};

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ServiceConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,

    // OpenTelemetry configuration
    #[serde(default = "default_otel_service_name")]
    pub otel_service_name: String,

    #[serde(default = "default_otel_endpoint")]
    pub otel_endpoint: String,

    #[serde(default)]
    pub otel_enabled: bool,

    // PostgreSQL configuration
    #[serde(default = "default_postgres_host")]
    pub postgres_host: String,

    #[serde(default = "default_postgres_port")]
    pub postgres_port: u16,

    #[serde(default = "default_postgres_database")]
    pub postgres_database: String,

    #[serde(default = "default_postgres_username")]
    pub postgres_username: String,

    #[serde(default = "default_postgres_password")]
    pub postgres_password: String,

    #[serde(default = "default_postgres_max_pool_size")]
    pub postgres_max_pool_size: usize,

    /// Directory holding the goose SQL migrations
    #[serde(default = "default_postgres_migrations_dir")]
    pub postgres_migrations_dir: String,

    #[serde(default = "default_goose_binary_path")]
    pub postgres_goose_binary_path: String,

    // HTTP configuration
    #[serde(default = "default_http_host")]
    pub http_host: String,

    #[serde(default = "default_http_port")]
    pub http_port: u16,

    // Ingestion and query limits
    #[serde(default = "default_max_batch_size")]
    pub max_batch_size: usize,

    #[serde(default = "default_query_default_limit")]
    pub query_default_limit: u32,

    #[serde(default = "default_query_max_limit")]
    pub query_max_limit: u32,

    // Aggregation sweep
    #[serde(default = "default_aggregation_enabled")]
    pub aggregation_enabled: bool,

    #[serde(default = "default_aggregation_interval_secs")]
    pub aggregation_interval_secs: u64,

    /// Trailing 1m buckets recomputed per sweep, current bucket included
    #[serde(default = "default_aggregation_lookback_minutes")]
    pub aggregation_lookback_minutes: u32,

    #[serde(default = "default_aggregation_lookback_hours")]
    pub aggregation_lookback_hours: u32,

    #[serde(default = "default_aggregation_lookback_days")]
    pub aggregation_lookback_days: u32,

    /// Startup timeout for initialization operations in seconds
    #[serde(default = "default_startup_timeout_secs")]
    pub startup_timeout_secs: u64,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_otel_service_name() -> String {
    "telemetry-ingest".to_string()
}

fn default_otel_endpoint() -> String {
    "http://localhost:4317".to_string()
}

fn default_postgres_host() -> String {
    "localhost".to_string()
}

fn default_postgres_port() -> u16 {
    5432
}

fn default_postgres_database() -> String {
    "telemetry".to_string()
}

fn default_postgres_username() -> String {
    "telemetry".to_string()
}

fn default_postgres_password() -> String {
    "telemetry".to_string()
}

fn default_postgres_max_pool_size() -> usize {
    10
}

fn default_postgres_migrations_dir() -> String {
    "crates/common/migrations/postgres".to_string()
}

fn default_goose_binary_path() -> String {
    "goose".to_string()
}

fn default_http_host() -> String {
    "0.0.0.0".to_string()
}

fn default_http_port() -> u16 {
    8080
}

fn default_max_batch_size() -> usize {
    1000
}

fn default_query_default_limit() -> u32 {
    100
}

fn default_query_max_limit() -> u32 {
    1000
}

fn default_aggregation_enabled() -> bool {
    true
}

fn default_aggregation_interval_secs() -> u64 {
    60
}

fn default_aggregation_lookback_minutes() -> u32 {
    15
}

fn default_aggregation_lookback_hours() -> u32 {
    3
}

fn default_aggregation_lookback_days() -> u32 {
    2
}

fn default_startup_timeout_secs() -> u64 {
    30
}

impl ServiceConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Config::builder()
            .add_source(Environment::with_prefix("TELEMETRY"))
            .build()?
            .try_deserialize()
    }

    pub fn telemetry_config(&self) -> TelemetryConfig {
        TelemetryConfig {
            service_name: self.otel_service_name.clone(),
            otel_endpoint: self.otel_endpoint.clone(),
            otel_enabled: self.otel_enabled,
            log_level: self.log_level.clone(),
        }
    }

    pub fn postgres_config(&self) -> PostgresConfig {
        PostgresConfig {
            host: self.postgres_host.clone(),
            port: self.postgres_port,
            database: self.postgres_database.clone(),
            username: self.postgres_username.clone(),
            password: self.postgres_password.clone(),
            max_pool_size: self.postgres_max_pool_size,
            migrations_dir: self.postgres_migrations_dir.clone(),
            goose_binary_path: self.postgres_goose_binary_path.clone(),
        }
    }

    pub fn http_config(&self) -> HttpServerConfig {
        HttpServerConfig {
            host: self.http_host.clone(),
            port: self.http_port,
        }
    }

    pub fn query_limits(&self) -> QueryLimits {
        QueryLimits {
            default_limit: self.query_default_limit,
            max_limit: self.query_max_limit,
        }
    }

    pub fn sweep_config(&self) -> SweepConfig {
        SweepConfig {
            lookback: vec![
                (AggregateWindow::OneMinute, self.aggregation_lookback_minutes),
                (AggregateWindow::OneHour, self.aggregation_lookback_hours),
                (AggregateWindow::OneDay, self.aggregation_lookback_days),
            ],
        }
    }
}
