//! In-memory collaborators shared by the enrichment tests.

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use autorelate_core::{AutoRelateError, Document, DocumentId, LibraryId, LibraryStore};

use crate::enrichment::{ProgressReporter, SelectionSource};
use crate::error::ScienceError;
use crate::identifiers::doi::Doi;
use crate::sources::openalex::OpenAlexWork;
use crate::sources::{CitationGraph, Lookup};

#[derive(Default)]
struct StoreState {
    documents: BTreeMap<DocumentId, Document>,
    saves: HashMap<DocumentId, usize>,
    broken: HashSet<DocumentId>,
    scans: usize,
}

pub struct MemoryStore {
    state: Mutex<StoreState>,
    save_delay: Duration,
}

impl MemoryStore {
    pub fn new(documents: Vec<Document>) -> Self {
        let state = StoreState {
            documents: documents.into_iter().map(|d| (d.id, d)).collect(),
            ..Default::default()
        };
        Self {
            state: Mutex::new(state),
            save_delay: Duration::ZERO,
        }
    }

    /// Each save sleeps this long before it lands.
    pub fn with_save_delay(mut self, delay: Duration) -> Self {
        self.save_delay = delay;
        self
    }

    pub fn insert(&self, doc: Document) {
        self.state.lock().unwrap().documents.insert(doc.id, doc);
    }

    pub fn remove(&self, id: DocumentId) {
        self.state.lock().unwrap().documents.remove(&id);
    }

    /// Make `document(id)` fail with an I/O error.
    pub fn break_fetch(&self, id: DocumentId) {
        self.state.lock().unwrap().broken.insert(id);
    }

    pub fn get(&self, id: DocumentId) -> Option<Document> {
        self.state.lock().unwrap().documents.get(&id).cloned()
    }

    pub fn scans(&self) -> usize {
        self.state.lock().unwrap().scans
    }

    pub fn saves_of(&self, id: DocumentId) -> usize {
        self.state.lock().unwrap().saves.get(&id).copied().unwrap_or(0)
    }

    pub fn total_saves(&self) -> usize {
        self.state.lock().unwrap().saves.values().sum()
    }
}

#[async_trait]
impl LibraryStore for MemoryStore {
    async fn all_documents(&self, _library: LibraryId) -> autorelate_core::Result<Vec<Document>> {
        let mut state = self.state.lock().unwrap();
        state.scans += 1;
        Ok(state.documents.values().cloned().collect())
    }

    async fn document(&self, id: DocumentId) -> autorelate_core::Result<Option<Document>> {
        let state = self.state.lock().unwrap();
        if state.broken.contains(&id) {
            return Err(AutoRelateError::Io(std::io::Error::other("disk on fire")));
        }
        Ok(state.documents.get(&id).cloned())
    }

    async fn save(&self, document: &Document) -> autorelate_core::Result<()> {
        if !self.save_delay.is_zero() {
            tokio::time::sleep(self.save_delay).await;
        }
        let mut state = self.state.lock().unwrap();
        *state.saves.entry(document.id).or_default() += 1;
        state.documents.insert(document.id, document.clone());
        Ok(())
    }
}

/// Citation graph answering from a fixed script.
#[derive(Default)]
pub struct ScriptedGraph {
    works: HashMap<Doi, OpenAlexWork>,
    references: HashMap<String, BTreeSet<Doi>>,
    citing: HashMap<String, BTreeSet<Doi>>,
    failing: HashSet<Doi>,
    calls: AtomicUsize,
    call_delay: Duration,
}

impl ScriptedGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a work for `doi` that references `refs` and is cited by `citing`.
    pub fn with_work(mut self, doi: &str, refs: &[&str], citing: &[&str]) -> Self {
        let doi = Doi::normalize(doi).unwrap();
        let id = format!("https://openalex.org/W-{doi}");
        let work = OpenAlexWork {
            id: id.clone(),
            doi: Some(doi.url()),
            title: Some(format!("Work {doi}")),
            referenced_works: refs.iter().map(|r| format!("https://openalex.org/R-{r}")).collect(),
            cited_by_api_url: (!citing.is_empty())
                .then(|| format!("https://api.openalex.org/works?filter=cites:{id}")),
            cited_by_count: citing.len() as u32,
        };
        self.references
            .insert(id.clone(), refs.iter().filter_map(|r| Doi::normalize(r)).collect());
        self.citing
            .insert(id, citing.iter().filter_map(|r| Doi::normalize(r)).collect());
        self.works.insert(doi, work);
        self
    }

    /// Lookups for `doi` fail like a transport error would.
    pub fn with_failure(mut self, doi: &str) -> Self {
        self.failing.insert(Doi::normalize(doi).unwrap());
        self
    }

    /// Each call sleeps this long, standing in for the client's pacing.
    pub fn with_call_delay(mut self, delay: Duration) -> Self {
        self.call_delay = delay;
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    async fn record_call(&self) {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if !self.call_delay.is_zero() {
            tokio::time::sleep(self.call_delay).await;
        }
    }
}

#[async_trait]
impl CitationGraph for ScriptedGraph {
    async fn fetch_work(&self, doi: &Doi) -> Lookup<OpenAlexWork> {
        self.record_call().await;
        if self.failing.contains(doi) {
            return Lookup::Failed(ScienceError::ApiError(
                "/works".to_string(),
                "HTTP 503".to_string(),
            ));
        }
        match self.works.get(doi) {
            Some(work) => Lookup::Found(work.clone()),
            None => Lookup::Missing,
        }
    }

    async fn resolve_references(&self, work: &OpenAlexWork) -> Lookup<BTreeSet<Doi>> {
        if work.referenced_works.is_empty() {
            return Lookup::Missing;
        }
        self.record_call().await;
        Lookup::Found(self.references.get(&work.id).cloned().unwrap_or_default())
    }

    async fn resolve_citing_works(&self, work: &OpenAlexWork) -> Lookup<BTreeSet<Doi>> {
        if work.cited_by_api_url.is_none() {
            return Lookup::Missing;
        }
        self.record_call().await;
        Lookup::Found(self.citing.get(&work.id).cloned().unwrap_or_default())
    }
}

/// Progress surface that records everything shown to the user.
#[derive(Default)]
pub struct RecordingProgress {
    pub events: Mutex<Vec<String>>,
}

impl RecordingProgress {
    pub fn events(&self) -> Vec<String> {
        self.events.lock().unwrap().clone()
    }
}

impl ProgressReporter for RecordingProgress {
    fn headline(&self, text: &str) {
        self.events.lock().unwrap().push(format!("headline: {text}"));
    }

    fn line(&self, text: &str, percent: u8) {
        self.events.lock().unwrap().push(format!("line {percent}%: {text}"));
    }

    fn notice(&self, text: &str) {
        self.events.lock().unwrap().push(format!("notice: {text}"));
    }

    fn close_after(&self, delay: Duration) {
        self.events
            .lock()
            .unwrap()
            .push(format!("close after {}ms", delay.as_millis()));
    }
}

pub struct FixedSelection(pub Vec<Document>);

impl SelectionSource for FixedSelection {
    fn selected_documents(&self) -> Vec<Document> {
        self.0.clone()
    }
}
