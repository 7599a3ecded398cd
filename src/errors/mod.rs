//! Error types shared across the collection engine.

mod types;

pub use types::{AppError, AppResult};
