mod aggregate_repository;
mod client;
mod config;
mod outbox_repository;
mod raw_reading_repository;

pub use aggregate_repository::*;
pub use client::*;
pub use config::*;
pub use outbox_repository::*;
pub use raw_reading_repository::*;
