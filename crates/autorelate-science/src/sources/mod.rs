use std::collections::BTreeSet;

use async_trait::async_trait;

use crate::error::ScienceError;
use crate::identifiers::doi::Doi;
use crate::sources::openalex::OpenAlexWork;

pub mod openalex;

/// Outcome of one external query.
///
/// `Missing` covers both "nothing to ask" (no call was made) and "the
/// service has no such record". Failures carry the error so callers can log
/// it; the pipeline treats them like `Missing` and never retries.
#[derive(Debug)]
pub enum Lookup<T> {
    Found(T),
    Missing,
    Failed(ScienceError),
}

impl<T> Lookup<T> {
    pub fn found(self) -> Option<T> {
        match self {
            Self::Found(value) => Some(value),
            Self::Missing | Self::Failed(_) => None,
        }
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, Self::Failed(_))
    }
}

impl<T> From<crate::error::Result<T>> for Lookup<T> {
    fn from(result: crate::error::Result<T>) -> Self {
        match result {
            Ok(value) => Self::Found(value),
            Err(ScienceError::NotFound(_)) => Self::Missing,
            Err(err) => Self::Failed(err),
        }
    }
}

/// The citation-graph queries relation discovery needs.
#[async_trait]
pub trait CitationGraph: Send + Sync {
    /// The work registered under `doi`.
    async fn fetch_work(&self, doi: &Doi) -> Lookup<OpenAlexWork>;

    /// DOIs of the works `work` references. No call when it references nothing.
    async fn resolve_references(&self, work: &OpenAlexWork) -> Lookup<BTreeSet<Doi>>;

    /// DOIs of the works citing `work`. No call without a citing-works handle.
    async fn resolve_citing_works(&self, work: &OpenAlexWork) -> Lookup<BTreeSet<Doi>>;
}
