use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::models::{Document, DocumentId, LibraryId};

/// On-disk shape of a JSON library: one file holding every document.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LibraryFile {
    #[serde(default)]
    pub library_id: LibraryId,

    #[serde(default)]
    pub documents: Vec<Document>,
}

impl LibraryFile {
    pub fn document(&self, id: DocumentId) -> Option<&Document> {
        self.documents.iter().find(|d| d.id == id)
    }

    pub fn document_by_key(&self, key: &str) -> Option<&Document> {
        self.documents.iter().find(|d| d.key == key)
    }

    /// Replace the stored copy of `doc`, or append it when unknown.
    pub fn upsert(&mut self, doc: &Document) {
        match self.documents.iter_mut().find(|d| d.id == doc.id) {
            Some(existing) => *existing = doc.clone(),
            None => self.documents.push(doc.clone()),
        }
    }
}

/// Load a library file. A missing file is an empty library.
pub fn load_library(path: &Path) -> Result<LibraryFile> {
    if !path.exists() {
        return Ok(LibraryFile::default());
    }
    let contents = fs::read_to_string(path)?;
    let library: LibraryFile = serde_json::from_str(&contents)?;
    Ok(library)
}

/// Write the library atomically: serialize to a sibling temp file, then rename.
pub fn save_library(path: &Path, library: &LibraryFile) -> Result<()> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        fs::create_dir_all(parent)?;
    }
    let tmp = temp_path(path);
    let json = serde_json::to_string_pretty(library)?;
    fs::write(&tmp, json)?;
    fs::rename(&tmp, path)?;
    Ok(())
}

fn temp_path(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_else(|| "library.json".into());
    name.push(".tmp");
    path.with_file_name(name)
}

/// File-backed store. Every read loads the file again, so documents written
/// by other processes are seen; saves re-read, upsert and rewrite the file
/// while holding the write lock.
#[cfg(feature = "async")]
pub struct JsonLibraryStore {
    path: PathBuf,
    write_lock: tokio::sync::Mutex<()>,
}

#[cfg(feature = "async")]
impl JsonLibraryStore {
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let library = load_library(&path)?;
        tracing::debug!(
            path = %path.display(),
            documents = library.documents.len(),
            "opened JSON library"
        );
        Ok(Self {
            path,
            write_lock: tokio::sync::Mutex::new(()),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// The library as currently stored on disk.
    pub async fn snapshot(&self) -> Result<LibraryFile> {
        load_library(&self.path)
    }
}

#[cfg(feature = "async")]
#[async_trait::async_trait]
impl super::LibraryStore for JsonLibraryStore {
    async fn all_documents(&self, library: LibraryId) -> Result<Vec<Document>> {
        let current = load_library(&self.path)?;
        if current.library_id != library {
            return Err(crate::error::AutoRelateError::LibraryNotFound(library.to_string()));
        }
        Ok(current.documents)
    }

    async fn document(&self, id: DocumentId) -> Result<Option<Document>> {
        let current = load_library(&self.path)?;
        Ok(current.document(id).cloned())
    }

    async fn save(&self, document: &Document) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        let mut current = load_library(&self.path)?;
        current.upsert(document);
        save_library(&self.path, &current)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn sample() -> LibraryFile {
        LibraryFile {
            library_id: LibraryId(1),
            documents: vec![
                Document::new(1, "AAAA1111", "Attention Is All You Need")
                    .with_doi("10.48550/arXiv.1706.03762"),
                Document::new(2, "BBBB2222", "Deep Residual Learning"),
            ],
        }
    }

    #[test]
    fn test_save_and_load_library() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("lib").join("library.json");

        save_library(&path, &sample()).unwrap();
        let loaded = load_library(&path).unwrap();

        assert_eq!(loaded.documents.len(), 2);
        assert_eq!(
            loaded.document(DocumentId(1)).unwrap().title,
            "Attention Is All You Need"
        );
        assert!(!temp_path(&path).exists());
    }

    #[test]
    fn test_load_missing_file_is_empty() {
        let dir = TempDir::new().unwrap();
        let loaded = load_library(&dir.path().join("missing.json")).unwrap();
        assert!(loaded.documents.is_empty());
        assert_eq!(loaded.library_id, LibraryId(1));
    }

    #[test]
    fn test_upsert_replaces_existing() {
        let mut lib = sample();
        let mut doc = lib.document(DocumentId(2)).unwrap().clone();
        doc.related.push("AAAA1111".to_string());
        lib.upsert(&doc);
        lib.upsert(&Document::new(3, "CCCC3333", "New"));

        assert_eq!(lib.documents.len(), 3);
        assert!(lib.document(DocumentId(2)).unwrap().is_related_to("AAAA1111"));
        assert!(lib.document_by_key("CCCC3333").is_some());
    }

    #[tokio::test]
    async fn test_store_save_persists_to_disk() {
        use crate::storage::LibraryStore;

        let dir = TempDir::new().unwrap();
        let path = dir.path().join("library.json");
        save_library(&path, &sample()).unwrap();

        let store = JsonLibraryStore::open(&path).unwrap();
        let mut doc = store.document(DocumentId(1)).await.unwrap().unwrap();
        doc.related.push("BBBB2222".to_string());
        store.save(&doc).await.unwrap();

        let reloaded = load_library(&path).unwrap();
        assert!(reloaded.document(DocumentId(1)).unwrap().is_related_to("BBBB2222"));
        assert_eq!(store.all_documents(LibraryId(1)).await.unwrap().len(), 2);
        assert!(store.all_documents(LibraryId(9)).await.is_err());
    }

    #[tokio::test]
    async fn test_store_sees_and_keeps_external_writes() {
        use crate::storage::LibraryStore;

        let dir = TempDir::new().unwrap();
        let path = dir.path().join("library.json");
        save_library(&path, &sample()).unwrap();
        let store = JsonLibraryStore::open(&path).unwrap();

        // Another writer adds an item after the store was opened.
        let mut external = load_library(&path).unwrap();
        external.upsert(&Document::new(3, "CCCC3333", "Added Elsewhere").with_doi("10.1/c"));
        save_library(&path, &external).unwrap();

        assert!(store.document(DocumentId(3)).await.unwrap().is_some());
        assert_eq!(store.all_documents(LibraryId(1)).await.unwrap().len(), 3);

        let mut doc = store.document(DocumentId(1)).await.unwrap().unwrap();
        doc.related.push("CCCC3333".to_string());
        store.save(&doc).await.unwrap();

        let on_disk = load_library(&path).unwrap();
        assert_eq!(on_disk.documents.len(), 3);
        assert!(on_disk.document(DocumentId(1)).unwrap().is_related_to("CCCC3333"));
        assert!(on_disk.document_by_key("CCCC3333").is_some());
    }

    #[tokio::test]
    async fn test_store_sees_external_removals() {
        use crate::storage::LibraryStore;

        let dir = TempDir::new().unwrap();
        let path = dir.path().join("library.json");
        save_library(&path, &sample()).unwrap();
        let store = JsonLibraryStore::open(&path).unwrap();

        let mut external = load_library(&path).unwrap();
        external.documents.retain(|d| d.id != DocumentId(2));
        save_library(&path, &external).unwrap();

        assert!(store.document(DocumentId(2)).await.unwrap().is_none());
        assert_eq!(store.snapshot().await.unwrap().documents.len(), 1);
    }
}
