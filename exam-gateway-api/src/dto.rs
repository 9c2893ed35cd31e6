pub mod csrf;
pub mod feedback;

pub use csrf::*;
pub use feedback::*;
