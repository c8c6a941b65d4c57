pub mod config;
pub mod error;
pub mod models;
pub mod storage;

pub use config::AppConfig;
pub use error::{AutoRelateError, Result};
pub use models::*;

pub use storage::json_library::{LibraryFile, load_library, save_library};

#[cfg(feature = "async")]
pub use storage::LibraryStore;
#[cfg(feature = "async")]
pub use storage::json_library::JsonLibraryStore;
