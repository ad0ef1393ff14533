use super::topic::is_cover_topic;
use super::{ComposedPrompt, PromptPart};

pub const REFERENCE_INSTRUCTION: &str = "Use the following reference images as style references. \
Match their color palette, line quality, lighting and overall visual language; do not copy their subject matter.";

pub const TRANSITION_INSTRUCTION: &str =
    "Now create a new image in exactly that style, following the instructions below.";

const VARIATION_LEAD: &str = "Style variation for this candidate:";

/// Inputs to [`compose`]. Borrowed so batch items can be composed per candidate
/// without cloning their content.
#[derive(Debug, Clone, Copy, Default)]
pub struct PromptInput<'a> {
    pub base: &'a str,
    pub style: Option<&'a str>,
    /// Extra text consulted by the cover heuristic, never emitted.
    pub topic: Option<&'a str>,
    /// Forces cover classification regardless of the heuristic.
    pub cover: bool,
    pub reference_count: usize,
    pub learnings: Option<&'a str>,
    pub variation: Option<&'a str>,
}

impl<'a> PromptInput<'a> {
    pub fn new(base: &'a str) -> Self {
        Self {
            base,
            ..Self::default()
        }
    }

    pub fn is_cover(&self) -> bool {
        self.cover
            || self.topic.map(is_cover_topic).unwrap_or(false)
            || is_cover_topic(self.base)
    }
}

/// Assembles the final prompt. Pure: equal inputs give equal output.
///
/// With reference images the order is: style-reference instruction, the
/// images, a transition line, the base instruction, then the optional
/// learned-pattern block (covers only) and the optional variation hint.
pub fn compose(input: &PromptInput<'_>) -> ComposedPrompt {
    let mut parts = Vec::new();
    if input.reference_count > 0 {
        parts.push(PromptPart::Text(REFERENCE_INSTRUCTION.to_string()));
        parts.push(PromptPart::ReferenceImages);
        parts.push(PromptPart::Text(TRANSITION_INSTRUCTION.to_string()));
    }

    let base = input.base.trim();
    let instruction = match non_blank(input.style) {
        Some(style) => format!("Style: {style}\n\nGenerate an image: {base}"),
        None => format!("Generate an image: {base}"),
    };
    parts.push(PromptPart::Text(instruction));

    if input.is_cover() {
        if let Some(learnings) = non_blank(input.learnings) {
            parts.push(PromptPart::Text(learnings.to_string()));
        }
    }
    if let Some(hint) = non_blank(input.variation) {
        parts.push(PromptPart::Text(format!("{VARIATION_LEAD} {hint}")));
    }

    ComposedPrompt::from_parts(parts)
}

/// Renders the legacy `{mode, background, primary, accent[]}` style object.
pub fn legacy_style_block(
    mode: Option<&str>,
    background: Option<&str>,
    primary: Option<&str>,
    accent: &[String],
) -> String {
    let mut block = format!(
        "{} mode, background {}, primary color {}",
        non_blank(mode).unwrap_or("light"),
        non_blank(background).unwrap_or("#F8F9FA"),
        non_blank(primary).unwrap_or("#2F2B42"),
    );
    if !accent.is_empty() {
        block.push_str(", accent colors ");
        block.push_str(&accent.join(", "));
    }
    block.push('.');
    block
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|text| !text.is_empty())
}
