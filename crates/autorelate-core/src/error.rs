use thiserror::Error;

/// All errors that can occur in autorelate-core.
#[derive(Debug, Error)]
pub enum AutoRelateError {
    #[error("Library not found: {0}")]
    LibraryNotFound(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),

    #[error("TOML serialize error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),
}

/// Exit codes used by the CLI.
#[repr(i32)]
pub enum ExitCode {
    NotFound = 2,
    InvalidArgs = 3,
}

pub type Result<T> = std::result::Result<T, AutoRelateError>;
