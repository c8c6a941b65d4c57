use std::sync::Arc;
use std::time::Duration;

use autorelate_core::{Document, DocumentId};
use tokio::sync::{Mutex, mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::enrichment::index::IndexCache;
use crate::enrichment::pipeline::Pipeline;
use crate::identifiers::doi::normalize_doi;

const BATCH_QUEUE_DEPTH: usize = 16;

// ─── Debouncer ────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DebounceState {
    Idle,
    Accumulating { deadline: Instant },
}

/// Collects ids until no new ones have arrived for `window`.
///
/// Pure: the caller supplies the clock.
#[derive(Debug)]
pub struct Debouncer {
    window: Duration,
    pending: Vec<DocumentId>,
    deadline: Option<Instant>,
}

impl Debouncer {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            pending: Vec::new(),
            deadline: None,
        }
    }

    pub fn state(&self) -> DebounceState {
        match self.deadline {
            Some(deadline) => DebounceState::Accumulating { deadline },
            None => DebounceState::Idle,
        }
    }

    /// Append `ids` (first occurrence wins) and restart the window.
    pub fn push(&mut self, ids: impl IntoIterator<Item = DocumentId>, now: Instant) {
        for id in ids {
            if !self.pending.contains(&id) {
                self.pending.push(id);
            }
        }
        if !self.pending.is_empty() {
            self.deadline = Some(now + self.window);
        }
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// The accumulated batch once the window has elapsed.
    pub fn take_due(&mut self, now: Instant) -> Option<Vec<DocumentId>> {
        match self.deadline {
            Some(deadline) if now >= deadline => {
                self.deadline = None;
                Some(std::mem::take(&mut self.pending))
            }
            _ => None,
        }
    }

    /// Drop the buffer without flushing it.
    pub fn cancel(&mut self) {
        self.pending.clear();
        self.deadline = None;
    }

    pub fn pending(&self) -> &[DocumentId] {
        &self.pending
    }
}

// ─── BatchProcessor ───────────────────────────────────────────────────────────

/// Outcome of one debounced batch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatchReport {
    /// Ids handed to the batch.
    pub queued: usize,
    /// Documents run through the pipeline.
    pub processed: usize,
    /// Ids dropped before processing (unreadable, missing, not regular, no DOI).
    pub skipped: usize,
    pub failed: usize,
    pub relations_added: usize,
}

#[derive(Clone)]
pub struct BatchProcessor {
    pipeline: Pipeline,
    index: Arc<Mutex<IndexCache>>,
    settle: Duration,
}

impl BatchProcessor {
    pub fn new(pipeline: Pipeline, index: Arc<Mutex<IndexCache>>, settle: Duration) -> Self {
        Self {
            pipeline,
            index,
            settle,
        }
    }

    /// Wait for the library to settle, then relate every eligible document
    /// in `ids`, one at a time.
    ///
    /// `stop` is honoured between documents only. A document whose links are
    /// being written is always finished.
    pub async fn process_batch(
        &self,
        ids: Vec<DocumentId>,
        stop: &watch::Receiver<bool>,
    ) -> BatchReport {
        let mut report = BatchReport {
            queued: ids.len(),
            ..Default::default()
        };
        info!(queued = report.queued, "processing batch of new items");

        // Attachments and metadata of freshly imported items land late.
        if !self.settle.is_zero() {
            tokio::select! {
                _ = tokio::time::sleep(self.settle) => {}
                _ = stopped(stop.clone()) => {
                    info!("stopped while settling; batch dropped");
                    return report;
                }
            }
        }

        let documents = self.resolve(ids, &mut report).await;
        if documents.is_empty() {
            info!(skipped = report.skipped, "nothing to relate in batch");
            return report;
        }

        let mut cache = tokio::select! {
            cache = self.index.lock() => cache,
            _ = stopped(stop.clone()) => {
                info!("stopped while waiting for the index; batch dropped");
                return report;
            }
        };
        let index = match cache.get(self.pipeline.store()).await {
            Ok(index) => index,
            Err(e) => {
                warn!(error = %e, "could not build DOI index; batch dropped");
                report.failed = documents.len();
                return report;
            }
        };

        let totals = self
            .pipeline
            .run_until(documents, index, Some(stop), |_, _, _| {})
            .await;
        report.processed = totals.processed;
        report.failed = totals.failed;
        report.relations_added = totals.relations_added;

        info!(
            processed = report.processed,
            skipped = report.skipped,
            failed = report.failed,
            relations_added = report.relations_added,
            "batch complete"
        );
        report
    }

    async fn resolve(&self, ids: Vec<DocumentId>, report: &mut BatchReport) -> Vec<Document> {
        let mut documents = Vec::with_capacity(ids.len());
        for id in ids {
            match self.pipeline.store().document(id).await {
                Ok(Some(doc)) if !doc.is_regular() => {
                    debug!(%id, kind = ?doc.kind, "not a regular item, skipping");
                    report.skipped += 1;
                }
                Ok(Some(doc)) if normalize_doi(doc.field("DOI")).is_none() => {
                    debug!(%id, "no DOI, skipping");
                    report.skipped += 1;
                }
                Ok(Some(doc)) => documents.push(doc),
                Ok(None) => {
                    info!(%id, "item no longer exists, skipping");
                    report.skipped += 1;
                }
                Err(e) => {
                    warn!(%id, error = %e, "error fetching item");
                    report.skipped += 1;
                }
            }
        }
        documents
    }
}

// ─── BatchCoordinator ─────────────────────────────────────────────────────────

/// Debounces add-events into batches and feeds them to a single worker, so
/// batches never overlap.
pub struct BatchCoordinator {
    events: mpsc::UnboundedSender<Vec<DocumentId>>,
    stop: watch::Sender<bool>,
    debounce: JoinHandle<()>,
    worker: JoinHandle<()>,
}

impl BatchCoordinator {
    /// Spawn the debounce and worker tasks. Every finished batch is also
    /// published on `reports` when given.
    pub fn spawn(
        processor: BatchProcessor,
        window: Duration,
        reports: Option<mpsc::UnboundedSender<BatchReport>>,
    ) -> Self {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let (stop_tx, stop_rx) = watch::channel(false);
        let (batches_tx, batches_rx) = mpsc::channel(BATCH_QUEUE_DEPTH);

        let debounce = tokio::spawn(debounce_loop(
            window,
            events_rx,
            stop_rx.clone(),
            batches_tx,
        ));
        let worker = tokio::spawn(worker_loop(processor, batches_rx, stop_rx, reports));

        Self {
            events: events_tx,
            stop: stop_tx,
            debounce,
            worker,
        }
    }

    /// Queue `ids` for the next batch. Returns `false` once stopped.
    pub fn enqueue(&self, ids: Vec<DocumentId>) -> bool {
        self.events.send(ids).is_ok()
    }

    /// Cancel the pending window and discard buffered ids. A batch in
    /// flight stops before its next document; the document being linked is
    /// finished first, so no relation is left one-sided.
    pub async fn shutdown(self) {
        self.stop.send_replace(true);
        for (task, handle) in [("debounce", self.debounce), ("worker", self.worker)] {
            if let Err(e) = handle.await {
                warn!(task, error = %e, "batch task ended abnormally");
            }
        }
        debug!("batch coordinator stopped");
    }
}

async fn debounce_loop(
    window: Duration,
    mut events: mpsc::UnboundedReceiver<Vec<DocumentId>>,
    stop: watch::Receiver<bool>,
    batches: mpsc::Sender<Vec<DocumentId>>,
) {
    let mut debouncer = Debouncer::new(window);

    loop {
        tokio::select! {
            biased;

            _ = stopped(stop.clone()) => {
                if !debouncer.pending().is_empty() {
                    debug!(dropped = debouncer.pending().len(), "discarding pending items");
                }
                debouncer.cancel();
                break;
            }
            received = events.recv() => match received {
                Some(ids) => {
                    debouncer.push(ids, Instant::now());
                    debug!(pending = debouncer.pending().len(), "items queued");
                }
                None => break,
            },
            _ = wait_for(debouncer.deadline()) => {
                let Some(batch) = debouncer.take_due(Instant::now()) else {
                    continue;
                };
                // The worker may be busy with a full queue; stay stoppable.
                tokio::select! {
                    biased;

                    _ = stopped(stop.clone()) => {
                        debug!("stopped while handing off a batch; batch dropped");
                        break;
                    }
                    sent = batches.send(batch) => {
                        if sent.is_err() {
                            break;
                        }
                    }
                }
            }
        }
    }
}

async fn worker_loop(
    processor: BatchProcessor,
    mut batches: mpsc::Receiver<Vec<DocumentId>>,
    stop: watch::Receiver<bool>,
    reports: Option<mpsc::UnboundedSender<BatchReport>>,
) {
    loop {
        let ids = tokio::select! {
            biased;

            _ = stopped(stop.clone()) => break,
            received = batches.recv() => match received {
                Some(ids) => ids,
                None => break,
            },
        };
        let report = processor.process_batch(ids, &stop).await;
        if is_stopped(&stop) {
            debug!("batch cut short by shutdown; report dropped");
            break;
        }
        if let Some(tx) = &reports {
            let _ = tx.send(report);
        }
    }
}

/// Resolves once `stop` is set or its sender is gone.
async fn stopped(mut stop: watch::Receiver<bool>) {
    let _ = stop.wait_for(|stopped| *stopped).await;
}

fn is_stopped(stop: &watch::Receiver<bool>) -> bool {
    *stop.borrow()
}

/// Sleeps until `deadline`, or forever when there is none.
async fn wait_for(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}
