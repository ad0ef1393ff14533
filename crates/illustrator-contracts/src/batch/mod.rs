mod config;
mod state;

pub use config::{derive_filename, normalize_id, BatchConfig, BatchItem, BatchPlan, DEFAULT_PREFIX};
pub use state::{parse_regenerate_ids, BatchItemStatus, BatchTally, ItemDecision, Pacer, ResumePolicy};
