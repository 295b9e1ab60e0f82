//! Types and helpers shared across the index, the adapters, and the command/change model.

pub mod types;
pub mod utils;
