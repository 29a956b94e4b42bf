mod aggregation_engine;
mod aggregation_sweep;

pub use aggregation_engine::*;
pub use aggregation_sweep::*;
