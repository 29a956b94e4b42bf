use chrono::{DateTime, Utc};
use common::domain::{DomainError, EnqueueOutboxInput, EnqueueOutcome, OutboxRepository};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, error, instrument};

/// Input for emitting a propagation record for one ingested reading
#[derive(Debug, Clone, PartialEq)]
pub struct TryEmitInput {
    pub event_id: String,
    pub tenant_id: String,
    pub farm_id: Option<String>,
    pub barn_id: Option<String>,
    pub device_id: String,
    pub event_type: String,
    pub occurred_at: DateTime<Utc>,
    pub trace_id: Option<String>,
    pub payload: serde_json::Value,
}

/// What happened to a propagation attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EmitOutcome {
    Inserted,
    Duplicate,
    Failed,
}

/// Receives outbox failures that the writer refuses to propagate
pub trait PropagationFailurePolicy: Send + Sync {
    fn on_failure(&self, input: &TryEmitInput, error: &DomainError);
}

/// Default policy: log at error level and count
#[derive(Debug, Default)]
pub struct LogPropagationFailure {
    failures: AtomicU64,
}

impl LogPropagationFailure {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failures(&self) -> u64 {
        self.failures.load(Ordering::Relaxed)
    }
}

impl PropagationFailurePolicy for LogPropagationFailure {
    fn on_failure(&self, input: &TryEmitInput, error: &DomainError) {
        self.failures.fetch_add(1, Ordering::Relaxed);
        error!(
            event_id = %input.event_id,
            trace_id = input.trace_id.as_deref().unwrap_or(""),
            tenant_id = %input.tenant_id,
            error = %error,
            "failed to enqueue outbox entry, propagation signal dropped"
        );
    }
}

/// Fire-and-log writer over the shared outbox table
///
/// `try_emit` never returns an error: a failed insert is handed to the
/// configured [`PropagationFailurePolicy`] and reported as [`EmitOutcome::Failed`].
pub struct OutboxWriter {
    repository: Arc<dyn OutboxRepository>,
    failure_policy: Arc<dyn PropagationFailurePolicy>,
}

impl OutboxWriter {
    pub fn new(
        repository: Arc<dyn OutboxRepository>,
        failure_policy: Arc<dyn PropagationFailurePolicy>,
    ) -> Self {
        Self {
            repository,
            failure_policy,
        }
    }

    /// Writer using [`LogPropagationFailure`]
    pub fn with_default_policy(repository: Arc<dyn OutboxRepository>) -> Self {
        Self::new(repository, Arc::new(LogPropagationFailure::new()))
    }

    #[instrument(skip(self, input), fields(event_id = %input.event_id, tenant_id = %input.tenant_id, device_id = %input.device_id))]
    pub async fn try_emit(&self, input: TryEmitInput) -> EmitOutcome {
        let enqueue = EnqueueOutboxInput {
            id: input.event_id.clone(),
            tenant_id: input.tenant_id.clone(),
            farm_id: input.farm_id.clone(),
            barn_id: input.barn_id.clone(),
            device_id: input.device_id.clone(),
            event_type: input.event_type.clone(),
            occurred_at: input.occurred_at,
            trace_id: input.trace_id.clone(),
            payload: input.payload.clone(),
        };

        match self.repository.enqueue(enqueue).await {
            Ok(EnqueueOutcome::Inserted) => EmitOutcome::Inserted,
            Ok(EnqueueOutcome::Duplicate) => {
                debug!("event already has an outbox entry");
                EmitOutcome::Duplicate
            }
            Err(e) => {
                self.failure_policy.on_failure(&input, &e);
                EmitOutcome::Failed
            }
        }
    }
}
