// Common types and utilities shared across the operator

pub mod entity_ids;
pub mod errors;
pub mod id;
pub mod utils;

pub use entity_ids::*;
pub use errors::OperatorError;
pub use id::Id;
