pub mod clock;
pub mod domain;
pub mod error;
pub mod traits;

pub use clock::*;
pub use domain::*;
pub use error::*;
pub use traits::*;
