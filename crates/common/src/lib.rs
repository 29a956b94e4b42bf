pub mod domain;
pub mod garde;
pub mod postgres;
pub mod telemetry;

#[cfg(any(test, feature = "testing"))]
pub mod memory;

// Re-export mocks when testing feature is enabled
#[cfg(any(test, feature = "testing"))]
pub use domain::MockAggregateRepository;
#[cfg(any(test, feature = "testing"))]
pub use domain::MockDatastoreHealth;
#[cfg(any(test, feature = "testing"))]
pub use domain::MockOutboxRepository;
#[cfg(any(test, feature = "testing"))]
pub use domain::MockRawReadingRepository;
