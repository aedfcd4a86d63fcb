pub mod classify;
pub mod config;
pub mod error;
pub mod models;
pub mod prompt;
pub mod response;
pub mod validate;

pub use error::{AppError, Result};
pub use models::{ErrorResponse, ReviewRequest, ReviewResponse, ReviewResult};
