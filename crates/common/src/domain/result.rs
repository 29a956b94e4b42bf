use thiserror::Error;

pub type DomainResult<T> = Result<T, DomainError>;

#[derive(Error, Debug)]
pub enum DomainError {
    #[error("Validation error: {}", .0.join(", "))]
    ValidationError(Vec<String>),

    #[error("Invalid metric value for event {event_id}: {value}")]
    InvalidMetricValue { event_id: String, value: String },

    #[error("Invalid time range: {0}")]
    InvalidTimeRange(String),

    #[error("Invalid query: {0}")]
    InvalidQuery(String),

    #[error("Invalid aggregate window: {0}")]
    InvalidWindow(String),

    #[error("Cannot aggregate an empty bucket")]
    EmptyBucket,

    #[error("Datastore unavailable: {0}")]
    DatastoreUnavailable(String),

    #[error("Repository error: {0}")]
    RepositoryError(#[from] anyhow::Error),
}

impl DomainError {
    /// Returns true for errors caused by the caller's input rather than infrastructure
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            DomainError::ValidationError(_)
                | DomainError::InvalidMetricValue { .. }
                | DomainError::InvalidTimeRange(_)
                | DomainError::InvalidQuery(_)
                | DomainError::InvalidWindow(_)
        )
    }
}
