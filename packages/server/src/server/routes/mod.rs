// HTTP routes
pub mod health;
pub mod mining;

pub use health::*;
