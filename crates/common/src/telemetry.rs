//! Tracing subscriber and OpenTelemetry export setup.

mod config;
mod init;

pub use config::*;
pub use init::*;
