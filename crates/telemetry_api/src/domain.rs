mod ingestion_metrics;
mod ingestion_service;
mod outbox_writer;
mod query_service;
mod telemetry_event;

pub use ingestion_metrics::*;
pub use ingestion_service::*;
pub use outbox_writer::*;
pub use query_service::*;
pub use telemetry_event::*;
