//! Relation discovery: the per-document pipeline and the two ways of
//! driving it (debounced add-events and manual runs).

pub mod batch;
pub mod index;
pub mod linker;
pub mod manual;
pub mod pipeline;
pub mod session;

#[cfg(test)]
pub(crate) mod testing;

pub use batch::{BatchCoordinator, BatchProcessor, BatchReport, DebounceState, Debouncer};
pub use index::{DoiConflict, IndexCache, LibraryIndex};
pub use linker::apply_relations;
pub use manual::{ManualRunReport, ManualTrigger, ProgressReporter, SelectionSource};
pub use pipeline::{Pipeline, RunTotals};
pub use session::Session;
