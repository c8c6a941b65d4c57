pub mod document;
pub mod event;

pub use document::*;
pub use event::*;
