mod registry;
mod selectors;

pub use registry::{Capability, ModelRegistry, ModelSpec};
pub use selectors::{translate_model_id, ModelSelection, ModelSelector};
