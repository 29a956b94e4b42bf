pub mod domain;
pub mod http;
pub mod telemetry_api;

pub use domain::*;
pub use http::*;
pub use telemetry_api::*;
