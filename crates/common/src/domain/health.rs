use crate::domain::result::DomainResult;
use async_trait::async_trait;

/// Connectivity probe for the backing datastore, used by readiness checks
#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
#[async_trait]
pub trait DatastoreHealth: Send + Sync {
    async fn ping(&self) -> DomainResult<()>;
}
