//! Persisted cover-learning feedback loop: the distilled pattern sets, the
//! per-image analysis records, and the markdown document that holds both.

mod document;
mod patterns;
mod record;
mod store;

pub use document::{parse_document, render_document, LearningDocument, LOG_MARKER};
pub use patterns::DistilledPatternSet;
pub use record::{extract_json_object, render_entry, LearningElements, LearningRecord};
pub use store::{LearningStore, DEFAULT_LEARNINGS_RELATIVE, LEARNINGS_FILE_ENV};
