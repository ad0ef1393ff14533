pub mod batch;
pub mod error;
pub mod events;
pub mod learning;
pub mod models;
pub mod prompt;
pub mod providers;
pub mod request;
pub mod runs;

pub use error::{IllustratorError, IllustratorResult, ProviderError, ProviderErrorKind};
