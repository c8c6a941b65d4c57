pub mod json_library;

#[cfg(feature = "async")]
use crate::error::Result;
#[cfg(feature = "async")]
use crate::models::{Document, DocumentId, LibraryId};

/// Read/write access to the host reference library.
///
/// `save` is transactional: either the whole document is persisted or
/// nothing is.
#[cfg(feature = "async")]
#[async_trait::async_trait]
pub trait LibraryStore: Send + Sync {
    /// Every item of the library, including attachments and notes.
    async fn all_documents(&self, library: LibraryId) -> Result<Vec<Document>>;

    async fn document(&self, id: DocumentId) -> Result<Option<Document>>;

    async fn save(&self, document: &Document) -> Result<()>;
}
