mod composer;
mod topic;
mod variation;

pub use composer::{compose, legacy_style_block, PromptInput, REFERENCE_INSTRUCTION, TRANSITION_INSTRUCTION};
pub use topic::{is_cover_topic, COVER_VOCABULARY};
pub use variation::{VariationHints, BUILTIN_VARIATION_HINTS};

use std::fmt;

/// One ordered piece of a composed prompt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PromptPart {
    Text(String),
    /// Placeholder where the request's reference images are spliced in, in order.
    ReferenceImages,
}

/// Final prompt as an ordered list of parts; reference images travel out of band.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ComposedPrompt {
    parts: Vec<PromptPart>,
}

impl ComposedPrompt {
    pub fn from_parts(parts: Vec<PromptPart>) -> Self {
        Self { parts }
    }

    pub fn text_only(text: impl Into<String>) -> Self {
        Self {
            parts: vec![PromptPart::Text(text.into())],
        }
    }

    pub fn parts(&self) -> &[PromptPart] {
        &self.parts
    }

    pub fn has_reference_slot(&self) -> bool {
        self.parts
            .iter()
            .any(|part| matches!(part, PromptPart::ReferenceImages))
    }

    /// Text segments joined by blank lines, image slots omitted.
    pub fn text(&self) -> String {
        self.parts
            .iter()
            .filter_map(|part| match part {
                PromptPart::Text(text) => Some(text.as_str()),
                PromptPart::ReferenceImages => None,
            })
            .collect::<Vec<&str>>()
            .join("\n\n")
    }
}

impl fmt::Display for ComposedPrompt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.text())
    }
}
