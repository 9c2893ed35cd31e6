pub mod rate_limit;
pub mod security_event;

pub use rate_limit::*;
pub use security_event::*;
