use std::collections::BTreeSet;
use std::sync::Arc;

use autorelate_core::{Document, LibraryStore};
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::enrichment::index::LibraryIndex;
use crate::enrichment::linker::apply_relations;
use crate::error::Result;
use crate::identifiers::doi::{Doi, normalize_doi};
use crate::sources::{CitationGraph, Lookup};

const LOG_TITLE_CHARS: usize = 60;

/// Totals of one sequential pass over a set of documents.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunTotals {
    pub processed: usize,
    pub failed: usize,
    pub relations_added: usize,
}

/// Per-document relation discovery: DOI → OpenAlex work → related DOIs →
/// library matches → links.
#[derive(Clone)]
pub struct Pipeline {
    store: Arc<dyn LibraryStore>,
    graph: Arc<dyn CitationGraph>,
}

impl Pipeline {
    pub fn new(store: Arc<dyn LibraryStore>, graph: Arc<dyn CitationGraph>) -> Self {
        Self { store, graph }
    }

    pub fn store(&self) -> &dyn LibraryStore {
        self.store.as_ref()
    }

    /// Discover and link related documents for `doc`. Returns the number of
    /// relations added; lookups that fail or find nothing yield `0`.
    pub async fn process_document(
        &self,
        doc: &mut Document,
        index: &mut LibraryIndex,
    ) -> Result<usize> {
        let title = doc.short_title(LOG_TITLE_CHARS).to_string();
        let Some(doi) = normalize_doi(doc.field("DOI")) else {
            debug!(id = %doc.id, "no DOI, nothing to look up");
            return Ok(0);
        };

        info!(%title, %doi, "processing");

        // The index copy may already carry links made earlier in this run.
        if let Some(current) = index.current(doc) {
            let known = current.related.clone();
            doc.merge_related(&known);
        }

        let work = match self.graph.fetch_work(&doi).await {
            Lookup::Found(work) => work,
            Lookup::Missing => {
                info!(%doi, "OpenAlex lookup found no work");
                return Ok(0);
            }
            Lookup::Failed(e) => {
                warn!(%doi, error = %e, "OpenAlex lookup failed");
                return Ok(0);
            }
        };

        let mut related: BTreeSet<Doi> = BTreeSet::new();
        match self.graph.resolve_references(&work).await {
            Lookup::Found(dois) => related.extend(dois),
            Lookup::Missing => {}
            Lookup::Failed(e) => warn!(%doi, error = %e, "error fetching references"),
        }
        match self.graph.resolve_citing_works(&work).await {
            Lookup::Found(dois) => related.extend(dois),
            Lookup::Missing => {}
            Lookup::Failed(e) => warn!(%doi, error = %e, "error fetching cited_by"),
        }

        info!(%title, count = related.len(), "found related DOIs");

        let added = apply_relations(self.store.as_ref(), doc, &related, index).await?;
        if added > 0 {
            info!(%title, added, "added relations");
        } else {
            info!(%title, "no new relations");
        }
        Ok(added)
    }

    /// Process `documents` strictly one after another. A failing document is
    /// logged and counted; it never stops the run. `on_done` is called after
    /// each document with its position and the run size.
    pub async fn run<F>(
        &self,
        documents: Vec<Document>,
        index: &mut LibraryIndex,
        on_done: F,
    ) -> RunTotals
    where
        F: FnMut(usize, usize, &Document) + Send,
    {
        self.run_until(documents, index, None, on_done).await
    }

    /// Like [`Pipeline::run`], but `stop` is checked before each document.
    /// Once it is set the remaining documents are dropped; the document in
    /// progress always completes, so its links are written on both sides.
    pub async fn run_until<F>(
        &self,
        documents: Vec<Document>,
        index: &mut LibraryIndex,
        stop: Option<&watch::Receiver<bool>>,
        mut on_done: F,
    ) -> RunTotals
    where
        F: FnMut(usize, usize, &Document) + Send,
    {
        let total = documents.len();
        let mut totals = RunTotals::default();

        for (position, mut doc) in documents.into_iter().enumerate() {
            if stop_requested(stop) {
                info!(remaining = total - position, "stop requested; remaining documents dropped");
                break;
            }
            match self.process_document(&mut doc, index).await {
                Ok(added) => totals.relations_added += added,
                Err(e) => {
                    totals.failed += 1;
                    warn!(title = %doc.short_title(LOG_TITLE_CHARS), error = %e, "error processing document");
                }
            }
            totals.processed += 1;
            on_done(position + 1, total, &doc);
        }

        totals
    }
}

fn stop_requested(stop: Option<&watch::Receiver<bool>>) -> bool {
    stop.is_some_and(|rx| *rx.borrow())
}
