use std::sync::Arc;

use autorelate_core::config::RelateConfig;
use autorelate_core::{AppConfig, Document, ItemEvent, LibraryStore};
use tokio::sync::{Mutex, mpsc};
use tracing::{debug, info};

use crate::enrichment::batch::{BatchCoordinator, BatchProcessor, BatchReport};
use crate::enrichment::index::{IndexCache, LibraryIndex};
use crate::enrichment::manual::{ManualRunReport, ManualTrigger, ProgressReporter, SelectionSource};
use crate::enrichment::pipeline::Pipeline;
use crate::error::Result;
use crate::sources::CitationGraph;

/// One plugin lifetime: owns the pending batch, its timer and the index
/// cache. Nothing outlives [`Session::shutdown`].
pub struct Session {
    relate: RelateConfig,
    pipeline: Pipeline,
    index: Arc<Mutex<IndexCache>>,
    manual: ManualTrigger,
    coordinator: Option<BatchCoordinator>,
    reports: Option<mpsc::UnboundedSender<BatchReport>>,
}

impl Session {
    pub fn new(
        config: &AppConfig,
        store: Arc<dyn LibraryStore>,
        graph: Arc<dyn CitationGraph>,
    ) -> Self {
        let relate = config.relate.clone();
        let pipeline = Pipeline::new(store, graph);
        let index = Arc::new(Mutex::new(IndexCache::new(
            config.core.library_id,
            relate.index_ttl(),
        )));
        let manual = ManualTrigger::new(pipeline.clone(), index.clone(), relate.progress_close());

        Self {
            relate,
            pipeline,
            index,
            manual,
            coordinator: None,
            reports: None,
        }
    }

    /// Publish every finished batch on `tx`. Takes effect on the next `start`.
    pub fn with_reports(mut self, tx: mpsc::UnboundedSender<BatchReport>) -> Self {
        self.reports = Some(tx);
        self
    }

    /// Begin listening for add-events. Calling it again is a no-op.
    pub fn start(&mut self) {
        if self.coordinator.is_some() {
            return;
        }
        let processor = BatchProcessor::new(
            self.pipeline.clone(),
            self.index.clone(),
            self.relate.settle_delay(),
        );
        self.coordinator = Some(BatchCoordinator::spawn(
            processor,
            self.relate.batch_window(),
            self.reports.clone(),
        ));
        info!("auto-relate started");
    }

    pub fn is_running(&self) -> bool {
        self.coordinator.is_some()
    }

    /// Queue the ids of newly added items. Other events are ignored.
    /// Returns whether anything was queued.
    pub fn notify(&self, event: &ItemEvent) -> bool {
        if !event.is_item_add() {
            return false;
        }
        let Some(coordinator) = &self.coordinator else {
            debug!("session not started; event ignored");
            return false;
        };
        debug!(count = event.ids.len(), "items added");
        coordinator.enqueue(event.ids.clone())
    }

    pub async fn run_manual(
        &self,
        documents: Vec<Document>,
        progress: &dyn ProgressReporter,
    ) -> ManualRunReport {
        self.manual.run_manual(documents, progress).await
    }

    pub async fn process_selected(
        &self,
        selection: &dyn SelectionSource,
        progress: &dyn ProgressReporter,
    ) -> ManualRunReport {
        self.manual.process_selected(selection, progress).await
    }

    /// A copy of the current DOI index, rebuilt first if stale.
    pub async fn index_snapshot(&self) -> Result<LibraryIndex> {
        let mut cache = self.index.lock().await;
        Ok(cache.get(self.pipeline.store()).await?.clone())
    }

    /// Stop the coordinator, discard pending ids and drop the cached index.
    pub async fn shutdown(&mut self) {
        if let Some(coordinator) = self.coordinator.take() {
            coordinator.shutdown().await;
        }
        self.index.lock().await.invalidate();
        info!("auto-relate stopped");
    }
}
