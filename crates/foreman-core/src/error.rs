//! Error types for Foreman.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("invalid label expression '{expression}': {message}")]
    InvalidLabel { expression: String, message: String },

    #[error("launch failed: {0}")]
    LaunchFailed(String),
}

pub type Result<T> = std::result::Result<T, Error>;
