//! REST API request handlers

mod definitions;
mod health;
mod instances;
mod pending;

pub use definitions::*;
pub use health::*;
pub use instances::*;
pub use pending::*;
