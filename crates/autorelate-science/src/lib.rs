//! autorelate science: DOI normalization, OpenAlex lookups and relation discovery.

pub mod error;
pub mod http;
pub mod identifiers;
pub mod sources;
pub mod enrichment;

pub use error::{Result, ScienceError};
pub use identifiers::doi::{Doi, normalize_doi};
pub use sources::{CitationGraph, Lookup};
pub use sources::openalex::{OpenAlexSource, OpenAlexWork};
pub use enrichment::{
    BatchReport, ManualRunReport, Pipeline, ProgressReporter, SelectionSource, Session,
};
