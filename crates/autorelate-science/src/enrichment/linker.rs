use std::collections::BTreeSet;

use autorelate_core::{Document, LibraryStore};

use crate::enrichment::index::LibraryIndex;
use crate::error::Result;
use crate::identifiers::doi::Doi;

/// Links `source` with every library document whose DOI is in `related`.
///
/// Links are written to both sides. Each touched target is saved right
/// away; the source is saved once at the end, and only if something was
/// added. Duplicates are detected against the in-memory `related` list of
/// `source`, never by re-reading the store. Returns the number of new links.
pub async fn apply_relations(
    store: &dyn LibraryStore,
    source: &mut Document,
    related: &BTreeSet<Doi>,
    index: &mut LibraryIndex,
) -> Result<usize> {
    let mut added = 0;

    for doi in related {
        let Some(target) = index.get_mut(doi) else {
            continue;
        };
        if target.id == source.id || source.is_related_to(&target.key) {
            continue;
        }

        source.add_related(target);
        target.add_related(source);
        store.save(target).await?;
        added += 1;
        tracing::debug!(source = %source.key, target = %target.key, %doi, "relation added");
    }

    if added > 0 {
        store.save(source).await?;
        index.update(source);
    }

    Ok(added)
}
