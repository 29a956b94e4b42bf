mod aggregate;
mod health;
mod outbox;
mod raw_reading;
mod result;

pub use aggregate::*;
pub use health::*;
pub use outbox::*;
pub use raw_reading::*;
pub use result::*;
