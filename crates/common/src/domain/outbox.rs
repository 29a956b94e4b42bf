use crate::domain::result::{DomainError, DomainResult};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::fmt;
use std::str::FromStr;

/// Delivery state of an outbox row; transitions past `Pending` belong to the dispatcher
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutboxStatus {
    Pending,
    Dispatched,
    Failed,
}

impl OutboxStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            OutboxStatus::Pending => "pending",
            OutboxStatus::Dispatched => "dispatched",
            OutboxStatus::Failed => "failed",
        }
    }
}

impl fmt::Display for OutboxStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OutboxStatus {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(OutboxStatus::Pending),
            "dispatched" => Ok(OutboxStatus::Dispatched),
            "failed" => Ok(OutboxStatus::Failed),
            other => Err(DomainError::RepositoryError(anyhow::anyhow!(
                "unknown outbox status: {}",
                other
            ))),
        }
    }
}

/// A propagation record in the shared outbox table
#[derive(Debug, Clone, PartialEq)]
pub struct OutboxEntry {
    pub id: String,
    pub tenant_id: String,
    pub farm_id: Option<String>,
    pub barn_id: Option<String>,
    pub device_id: String,
    pub event_type: String,
    pub occurred_at: DateTime<Utc>,
    pub trace_id: Option<String>,
    pub payload: serde_json::Value,
    pub status: OutboxStatus,
    pub next_attempt_at: DateTime<Utc>,
    pub priority: i32,
    pub attempt_count: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Input for enqueueing a new propagation record
///
/// `id` is the caller's event id and acts as the idempotency key.
#[derive(Debug, Clone, PartialEq)]
pub struct EnqueueOutboxInput {
    pub id: String,
    pub tenant_id: String,
    pub farm_id: Option<String>,
    pub barn_id: Option<String>,
    pub device_id: String,
    pub event_type: String,
    pub occurred_at: DateTime<Utc>,
    pub trace_id: Option<String>,
    pub payload: serde_json::Value,
}

impl EnqueueOutboxInput {
    /// Materialise the row as it is first written: pending, due now, never attempted
    pub fn into_pending_entry(self, now: DateTime<Utc>) -> OutboxEntry {
        OutboxEntry {
            id: self.id,
            tenant_id: self.tenant_id,
            farm_id: self.farm_id,
            barn_id: self.barn_id,
            device_id: self.device_id,
            event_type: self.event_type,
            occurred_at: self.occurred_at,
            trace_id: self.trace_id,
            payload: self.payload,
            status: OutboxStatus::Pending,
            next_attempt_at: now,
            priority: 0,
            attempt_count: 0,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Result of an idempotent enqueue
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnqueueOutcome {
    Inserted,
    /// A row with the same id already exists; nothing was written
    Duplicate,
}

/// Message-queue style interface over the shared outbox table
#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
#[async_trait]
pub trait OutboxRepository: Send + Sync {
    /// Insert a pending row keyed by `input.id`, doing nothing if the id already exists
    async fn enqueue(&self, input: EnqueueOutboxInput) -> DomainResult<EnqueueOutcome>;

    /// Fetch a row by id
    async fn get_entry(&self, id: &str) -> DomainResult<Option<OutboxEntry>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_round_trips_through_str() {
        for status in [
            OutboxStatus::Pending,
            OutboxStatus::Dispatched,
            OutboxStatus::Failed,
        ] {
            assert_eq!(status.as_str().parse::<OutboxStatus>().unwrap(), status);
        }
        assert!("queued".parse::<OutboxStatus>().is_err());
    }

    #[test]
    fn test_pending_entry_defaults() {
        let now = Utc::now();
        let entry = EnqueueOutboxInput {
            id: "e1".to_string(),
            tenant_id: "t1".to_string(),
            farm_id: None,
            barn_id: None,
            device_id: "d1".to_string(),
            event_type: "telemetry.reading".to_string(),
            occurred_at: now,
            trace_id: None,
            payload: serde_json::json!({}),
        }
        .into_pending_entry(now);

        assert_eq!(entry.status, OutboxStatus::Pending);
        assert_eq!(entry.attempt_count, 0);
        assert_eq!(entry.priority, 0);
        assert_eq!(entry.next_attempt_at, now);
    }
}
