pub mod aggregation_worker;
pub mod domain;

pub use aggregation_worker::*;
pub use domain::*;
