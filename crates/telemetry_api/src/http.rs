mod error;
mod ops_routes;
mod server;
mod state;
mod telemetry_routes;

pub use error::*;
pub use ops_routes::*;
pub use server::*;
pub use state::*;
pub use telemetry_routes::*;
