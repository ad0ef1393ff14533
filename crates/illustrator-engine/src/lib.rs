//! Backend-facing half of the illustrator: provider transports, response
//! normalization, candidate fan-out, resumable batches and cover analysis.

pub mod adapter;
pub mod batch;
pub mod candidates;
pub mod learner;
pub mod output;
pub mod providers;
pub mod references;
pub mod response;
pub mod transport;

pub use adapter::{AdapterOptions, ImageSource, ProviderAdapter};
pub use batch::{BatchOptions, BatchReport, BatchRunner, ItemOutcome, DEFAULT_DELAY};
pub use candidates::{candidate_paths, CandidateGenerator, CandidateJob, CandidateReport};
pub use learner::{load_analysis_prompt, CoverAnalyzer};
pub use references::load_reference_images;
pub use response::{resolve_image_response, CanonicalImage, ImageOutcome};
pub use transport::{HttpTransport, JsonTransport};
