pub mod csrf;
pub mod feedback;
