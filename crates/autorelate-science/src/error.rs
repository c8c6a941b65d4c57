use thiserror::Error;

#[derive(Debug, Error)]
pub enum ScienceError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("API error from {0}: {1}")]
    ApiError(String, String),

    #[error("not found at {0}")]
    NotFound(String),

    #[error("parse error: {0}")]
    Parse(String),

    #[error("library error: {0}")]
    Library(#[from] autorelate_core::AutoRelateError),
}

pub type Result<T> = std::result::Result<T, ScienceError>;
