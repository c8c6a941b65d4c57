use std::sync::Arc;
use std::time::Duration;

use autorelate_core::Document;
use tokio::sync::Mutex;
use tracing::{info, warn};

use crate::enrichment::index::IndexCache;
use crate::enrichment::pipeline::Pipeline;
use crate::identifiers::doi::normalize_doi;

const HEADLINE_RUNNING: &str = "Auto-Relate: Finding related items...";
const HEADLINE_DONE: &str = "Auto-Relate: Done";
const PROGRESS_TITLE_CHARS: usize = 60;

/// Where a manual run reports to the user.
pub trait ProgressReporter: Send + Sync {
    fn headline(&self, text: &str);
    /// One progress row; `percent` is cumulative over the run.
    fn line(&self, text: &str, percent: u8);
    /// A standalone message shown when there is nothing to do.
    fn notice(&self, text: &str);
    fn close_after(&self, delay: Duration);
}

/// The documents the user currently has selected.
pub trait SelectionSource: Send + Sync {
    fn selected_documents(&self) -> Vec<Document>;
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ManualRunReport {
    pub processed: usize,
    pub relations_added: usize,
}

/// User-initiated runs over an explicit set of documents. No debounce and
/// no settle delay.
#[derive(Clone)]
pub struct ManualTrigger {
    pipeline: Pipeline,
    index: Arc<Mutex<IndexCache>>,
    close_delay: Duration,
}

impl ManualTrigger {
    pub fn new(pipeline: Pipeline, index: Arc<Mutex<IndexCache>>, close_delay: Duration) -> Self {
        Self {
            pipeline,
            index,
            close_delay,
        }
    }

    pub async fn process_selected(
        &self,
        selection: &dyn SelectionSource,
        progress: &dyn ProgressReporter,
    ) -> ManualRunReport {
        let selected = selection.selected_documents();
        if selected.is_empty() {
            info!("no items selected");
            return ManualRunReport::default();
        }
        self.run_manual(selected, progress).await
    }

    pub async fn run_manual(
        &self,
        documents: Vec<Document>,
        progress: &dyn ProgressReporter,
    ) -> ManualRunReport {
        let documents: Vec<Document> = documents
            .into_iter()
            .filter(|doc| doc.is_regular() && normalize_doi(doc.field("DOI")).is_some())
            .collect();

        if documents.is_empty() {
            info!("no selected items have DOIs");
            progress.notice("Auto-Relate: none of the selected items has a DOI");
            return ManualRunReport::default();
        }

        info!(count = documents.len(), "manual run");
        progress.headline(HEADLINE_RUNNING);

        let mut cache = self.index.lock().await;
        let index = match cache.get(self.pipeline.store()).await {
            Ok(index) => index,
            Err(e) => {
                warn!(error = %e, "could not build DOI index");
                progress.notice(&format!("Auto-Relate: could not read the library ({e})"));
                return ManualRunReport::default();
            }
        };

        let totals = self
            .pipeline
            .run(documents, index, |position, total, doc| {
                let percent = (position * 100 / total.max(1)) as u8;
                progress.line(doc.short_title(PROGRESS_TITLE_CHARS), percent);
            })
            .await;

        let report = ManualRunReport {
            processed: totals.processed,
            relations_added: totals.relations_added,
        };

        progress.headline(HEADLINE_DONE);
        progress.line(
            &format!(
                "{} items processed, {} relations added",
                report.processed, report.relations_added
            ),
            100,
        );
        progress.close_after(self.close_delay);

        info!(
            processed = report.processed,
            relations_added = report.relations_added,
            "manual run complete"
        );
        report
    }
}
