//! Centralized error handling module
//!
//! Structured, typed errors for the library surface; the binary boundary uses
//! `anyhow::Result` and converts as needed.

pub mod types;

pub use types::{AppError, AppResult};

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        AppError::Other {
            message: err.to_string(),
            source: None,
        }
    }
}
