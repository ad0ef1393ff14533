use std::path::PathBuf;

use crate::error::{IllustratorError, IllustratorResult};
use crate::prompt::ComposedPrompt;

pub const MAX_REFERENCE_IMAGES: usize = 3;

/// A conditioning image already read from disk and base64-encoded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReferenceImage {
    pub path: PathBuf,
    pub mime_type: String,
    pub data_base64: String,
}

impl ReferenceImage {
    pub fn data_url(&self) -> String {
        format!("data:{};base64,{}", self.mime_type, self.data_base64)
    }
}

/// Number of independent candidates generated per logical item (1..=4).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct CandidateCount(u8);

impl CandidateCount {
    pub const MIN: u8 = 1;
    pub const MAX: u8 = 4;
    pub const ONE: CandidateCount = CandidateCount(1);

    pub fn new(value: u8) -> IllustratorResult<Self> {
        if !(Self::MIN..=Self::MAX).contains(&value) {
            return Err(IllustratorError::config(format!(
                "candidate count must be between {} and {} (got {value})",
                Self::MIN,
                Self::MAX
            )));
        }
        Ok(Self(value))
    }

    pub fn get(self) -> u8 {
        self.0
    }

    pub fn is_single(self) -> bool {
        self.0 == 1
    }
}

impl Default for CandidateCount {
    fn default() -> Self {
        Self::ONE
    }
}

/// Everything a provider needs for one generation call. Built once, then read-only.
#[derive(Debug, Clone)]
pub struct GenerationRequest {
    pub prompt: ComposedPrompt,
    pub model: Option<String>,
    pub size: Option<String>,
    pub reference_images: Vec<ReferenceImage>,
    pub candidates: CandidateCount,
}

impl GenerationRequest {
    pub fn new(prompt: ComposedPrompt) -> Self {
        Self {
            prompt,
            model: None,
            size: None,
            reference_images: Vec::new(),
            candidates: CandidateCount::ONE,
        }
    }

    pub fn needs_reference_support(&self) -> bool {
        !self.reference_images.is_empty()
    }
}
