pub mod ids;
pub mod policy;
pub mod rate_limit;
pub mod request;
pub mod event;
pub mod validation;

pub use ids::*;
pub use policy::*;
pub use rate_limit::*;
pub use request::*;
pub use event::*;
pub use validation::*;
