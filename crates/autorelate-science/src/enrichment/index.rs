use std::collections::HashMap;
use std::time::Duration;

use autorelate_core::{Document, DocumentId, LibraryId, LibraryStore};
use tokio::time::Instant;

use crate::error::Result;
use crate::identifiers::doi::{Doi, normalize_doi};

/// Two library documents claiming the same DOI. The later one wins.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DoiConflict {
    pub doi: Doi,
    pub kept: DocumentId,
    pub replaced: DocumentId,
}

/// DOI → document map over the regular documents of one library.
#[derive(Debug, Clone)]
pub struct LibraryIndex {
    by_doi: HashMap<Doi, Document>,
    conflicts: Vec<DoiConflict>,
    built_at: Instant,
}

impl LibraryIndex {
    /// Index every regular document with a resolvable DOI.
    pub fn build(documents: impl IntoIterator<Item = Document>) -> Self {
        let mut by_doi: HashMap<Doi, Document> = HashMap::new();
        let mut conflicts = Vec::new();

        for doc in documents {
            if !doc.is_regular() {
                continue;
            }
            let Some(doi) = normalize_doi(doc.field("DOI")) else {
                continue;
            };
            let id = doc.id;
            if let Some(previous) = by_doi.insert(doi.clone(), doc)
                && previous.id != id
            {
                tracing::warn!(
                    %doi,
                    kept = %id,
                    replaced = %previous.id,
                    "two documents share a DOI; keeping the later one"
                );
                conflicts.push(DoiConflict {
                    doi,
                    kept: id,
                    replaced: previous.id,
                });
            }
        }

        Self {
            by_doi,
            conflicts,
            built_at: Instant::now(),
        }
    }

    pub fn get(&self, doi: &Doi) -> Option<&Document> {
        self.by_doi.get(doi)
    }

    pub fn get_mut(&mut self, doi: &Doi) -> Option<&mut Document> {
        self.by_doi.get_mut(doi)
    }

    /// The indexed copy of `doc`, if `doc` is the document its DOI maps to.
    pub fn current(&self, doc: &Document) -> Option<&Document> {
        let doi = normalize_doi(doc.field("DOI"))?;
        self.by_doi.get(&doi).filter(|indexed| indexed.id == doc.id)
    }

    /// Write `doc`'s in-memory state back over its indexed copy.
    pub fn update(&mut self, doc: &Document) {
        let Some(doi) = normalize_doi(doc.field("DOI")) else {
            return;
        };
        if let Some(indexed) = self.by_doi.get_mut(&doi)
            && indexed.id == doc.id
        {
            *indexed = doc.clone();
        }
    }

    pub fn len(&self) -> usize {
        self.by_doi.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_doi.is_empty()
    }

    pub fn conflicts(&self) -> &[DoiConflict] {
        &self.conflicts
    }

    pub fn age(&self) -> Duration {
        self.built_at.elapsed()
    }

    pub fn built_at(&self) -> Instant {
        self.built_at
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Doi, &Document)> {
        self.by_doi.iter()
    }
}

/// Lazily built [`LibraryIndex`] that is reused until it is `ttl` old.
pub struct IndexCache {
    library: LibraryId,
    ttl: Duration,
    cached: Option<LibraryIndex>,
    builds: u64,
}

impl IndexCache {
    pub fn new(library: LibraryId, ttl: Duration) -> Self {
        Self {
            library,
            ttl,
            cached: None,
            builds: 0,
        }
    }

    /// The cached index while it is fresh, otherwise a full rescan.
    pub async fn get(&mut self, store: &dyn LibraryStore) -> Result<&mut LibraryIndex> {
        let index = match self.cached.take() {
            Some(index) if index.age() < self.ttl => index,
            _ => {
                tracing::debug!(library = %self.library, "building DOI index");
                let documents = store.all_documents(self.library).await?;
                let index = LibraryIndex::build(documents);
                tracing::info!(documents = index.len(), "DOI index built");
                self.builds += 1;
                index
            }
        };
        Ok(self.cached.insert(index))
    }

    /// Drop the cached index; the next `get` rescans.
    pub fn invalidate(&mut self) {
        self.cached = None;
    }

    pub fn is_cached(&self) -> bool {
        self.cached.is_some()
    }

    /// Number of full rescans performed so far.
    pub fn builds(&self) -> u64 {
        self.builds
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::enrichment::testing::MemoryStore;
    use autorelate_core::ItemKind;

    fn doi(s: &str) -> Doi {
        Doi::normalize(s).unwrap()
    }

    #[test]
    fn build_skips_non_regular_and_doi_less_documents() {
        let index = LibraryIndex::build(vec![
            Document::new(1, "A", "Paper A").with_doi("https://doi.org/10.1/A"),
            Document::new(2, "B", "No DOI"),
            Document::new(3, "C", "Blank DOI").with_doi("  "),
            Document::new(4, "D", "Attachment")
                .with_doi("10.1/d")
                .with_kind(ItemKind::Attachment),
            Document::new(5, "E", "Note").with_doi("10.1/e").with_kind(ItemKind::Note),
        ]);

        assert_eq!(index.len(), 1);
        assert_eq!(index.get(&doi("10.1/a")).unwrap().key, "A");
        assert!(index.get(&doi("10.1/d")).is_none());
    }

    #[test]
    fn duplicate_doi_keeps_last_and_records_conflict() {
        let index = LibraryIndex::build(vec![
            Document::new(1, "A", "First").with_doi("10.1/dup"),
            Document::new(2, "B", "Second").with_doi("10.1/DUP"),
        ]);

        assert_eq!(index.len(), 1);
        assert_eq!(index.get(&doi("10.1/dup")).unwrap().id, DocumentId(2));
        assert_eq!(
            index.conflicts(),
            &[DoiConflict {
                doi: doi("10.1/dup"),
                kept: DocumentId(2),
                replaced: DocumentId(1),
            }]
        );
    }

    #[test]
    fn update_only_touches_the_same_document() {
        let mut index = LibraryIndex::build(vec![Document::new(1, "A", "A").with_doi("10.1/a")]);

        let mut impostor = Document::new(9, "Z", "Z").with_doi("10.1/a");
        impostor.related.push("X".to_string());
        index.update(&impostor);
        assert!(index.get(&doi("10.1/a")).unwrap().related.is_empty());

        let mut same = Document::new(1, "A", "A").with_doi("10.1/a");
        same.related.push("X".to_string());
        index.update(&same);
        assert!(index.get(&doi("10.1/a")).unwrap().is_related_to("X"));
        assert!(index.current(&same).is_some());
        assert!(index.current(&impostor).is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn cache_is_reused_within_ttl_and_rebuilt_after() {
        let store = MemoryStore::new(vec![Document::new(1, "A", "A").with_doi("10.1/a")]);
        let mut cache = IndexCache::new(LibraryId(1), Duration::from_millis(60_000));

        let first_built = cache.get(&store).await.unwrap().built_at();
        tokio::time::advance(Duration::from_millis(59_999)).await;
        store.insert(Document::new(2, "B", "B").with_doi("10.1/b"));

        let again = cache.get(&store).await.unwrap();
        assert_eq!(again.built_at(), first_built);
        assert_eq!(again.len(), 1);
        assert_eq!(cache.builds(), 1);
        assert_eq!(store.scans(), 1);

        tokio::time::advance(Duration::from_millis(1)).await;
        let rebuilt = cache.get(&store).await.unwrap();
        assert_eq!(rebuilt.len(), 2);
        assert!(rebuilt.get(&doi("10.1/b")).is_some());
        assert_eq!(cache.builds(), 2);
        assert_eq!(store.scans(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn rebuild_reflects_removed_documents() {
        let store = MemoryStore::new(vec![
            Document::new(1, "A", "A").with_doi("10.1/a"),
            Document::new(2, "B", "B").with_doi("10.1/b"),
        ]);
        let mut cache = IndexCache::new(LibraryId(1), Duration::from_secs(60));
        assert_eq!(cache.get(&store).await.unwrap().len(), 2);

        store.remove(DocumentId(2));
        tokio::time::advance(Duration::from_secs(61)).await;
        let rebuilt = cache.get(&store).await.unwrap();
        assert_eq!(rebuilt.len(), 1);
        assert!(rebuilt.get(&doi("10.1/b")).is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn invalidate_forces_rescan() {
        let store = MemoryStore::new(vec![Document::new(1, "A", "A").with_doi("10.1/a")]);
        let mut cache = IndexCache::new(LibraryId(1), Duration::from_secs(60));
        cache.get(&store).await.unwrap();
        cache.invalidate();
        assert!(!cache.is_cached());
        cache.get(&store).await.unwrap();
        assert_eq!(store.scans(), 2);
    }
}
