use std::path::Path;
use std::sync::Arc;

use chrono::Utc;
use illustrator_contracts::learning::LearningRecord;
use illustrator_contracts::models::{Capability, ModelSelector};
use illustrator_contracts::providers::{Credentials, ProviderKind};
use tracing::{info, warn};

use crate::providers::{vision_provider, VisionProvider};
use crate::references::load_reference_image;
use crate::transport::JsonTransport;

const USER_NOTE_PLACEHOLDER: &str = "{{USER_NOTE}}";

pub const DEFAULT_ANALYSIS_INSTRUCTION: &str = r#"You are a YouTube cover image analysis expert. Analyze this cover image and extract patterns valuable for future cover design.

Output in the following JSON format:

{
  "composition": "Composition description (e.g., left person + right text, center focus, comparison layout)",
  "colorScheme": "Color scheme (e.g., dark background + orange accent, high-contrast warm-cool pairing)",
  "textUsage": "Text usage (e.g., no text, 3-5 large words, prominent numbers)",
  "emotion": "Conveyed emotion (e.g., curiosity, urgency, professionalism, shock)",
  "focusPoint": "Visual focal point (e.g., facial expression, product logo, comparison elements)",
  "patterns": ["Pattern worth learning 1", "Pattern worth learning 2"],
  "avoidPatterns": ["If there are issues, list patterns to avoid"]
}

{{USER_NOTE}}

Output JSON only, no other content."#;

/// Analysis instruction from a template file. The usable text sits between
/// the first two `---` lines; without both markers the whole file is used.
/// Falls back to the built-in instruction when the file cannot be read.
pub fn load_analysis_prompt(template: Option<&Path>, note: Option<&str>) -> String {
    let raw = match template.map(std::fs::read_to_string) {
        Some(Ok(text)) => extract_template_body(&text),
        Some(Err(err)) => {
            warn!(error = %err, "failed to load analysis prompt; using built-in instruction");
            DEFAULT_ANALYSIS_INSTRUCTION.to_string()
        }
        None => DEFAULT_ANALYSIS_INSTRUCTION.to_string(),
    };
    apply_note(&raw, note)
}

fn extract_template_body(text: &str) -> String {
    let Some(start) = text.find("---") else {
        return text.trim().to_string();
    };
    let body_start = start + 3;
    match text[body_start..].find("---") {
        Some(end) => text[body_start..body_start + end].trim().to_string(),
        None => text.trim().to_string(),
    }
}

fn apply_note(instruction: &str, note: Option<&str>) -> String {
    match note.map(str::trim).filter(|value| !value.is_empty()) {
        Some(note) => instruction.replacen(USER_NOTE_PLACEHOLDER, &format!("User note: {note}"), 1),
        None => {
            let cleaned: Vec<&str> = instruction
                .split(USER_NOTE_PLACEHOLDER)
                .map(|piece| piece.trim_matches('\n'))
                .collect();
            cleaned.join("\n\n").trim().to_string()
        }
    }
}

/// Reads an image with a vision model and maps the reply to a record.
pub struct CoverAnalyzer {
    provider: Box<dyn VisionProvider>,
    kind: ProviderKind,
    model: String,
}

impl CoverAnalyzer {
    pub fn new(provider: Box<dyn VisionProvider>, kind: ProviderKind, model: impl Into<String>) -> Self {
        Self {
            provider,
            kind,
            model: model.into(),
        }
    }

    /// Prefers Gemini, then OpenRouter. `None` (with a warning) when neither
    /// key is present.
    pub fn from_credentials(
        credentials: &Credentials,
        model: Option<&str>,
        transport: Arc<dyn JsonTransport>,
    ) -> Option<Self> {
        let Some(kind) = [ProviderKind::Gemini, ProviderKind::OpenRouter]
            .into_iter()
            .find(|kind| credentials.has(*kind))
        else {
            warn!("cover analysis needs GEMINI_API_KEY or OPENROUTER_API_KEY; skipping");
            return None;
        };
        let api_key = credentials.key_for(kind)?;
        let selection = match ModelSelector::default().select(model, kind, Capability::Vision) {
            Ok(selection) => selection,
            Err(reason) => {
                warn!("{reason}");
                return None;
            }
        };
        if let Some(reason) = selection.fallback_reason.as_deref() {
            warn!("{reason}");
        }
        Some(Self::new(vision_provider(kind, api_key, transport), kind, selection.model))
    }

    pub fn provider(&self) -> ProviderKind {
        self.kind
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    /// Never fails: a missing file, a backend error or an unparsable reply
    /// is logged and yields `None`.
    pub fn analyze(&self, image: &Path, instruction: &str) -> Option<LearningRecord> {
        let reference = match load_reference_image(image) {
            Ok(reference) => reference,
            Err(err) => {
                warn!(error = %err, "cover analysis skipped");
                return None;
            }
        };
        info!(image = %image.display(), provider = %self.kind, model = %self.model, "analyzing cover image");

        let reply = match self.provider.describe_image(&self.model, &reference, instruction) {
            Ok(reply) => reply,
            Err(err) => {
                warn!(error = %err, "cover analysis failed");
                return None;
            }
        };
        let source = image
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| image.display().to_string());
        let today = Utc::now().format("%Y-%m-%d").to_string();
        let record = LearningRecord::from_analysis_text(&reply, &today, &source);
        if record.is_none() {
            warn!(reply = %illustrator_contracts::error::truncate_text(&reply, 200), "analysis reply had no JSON object");
        }
        record
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::transport::testing::ScriptedTransport;

    fn credentials(gemini: bool, openrouter: bool) -> Credentials {
        Credentials {
            gemini: gemini.then(|| "g".to_string()),
            openrouter: openrouter.then(|| "o".to_string()),
        }
    }

    #[test]
    fn template_body_sits_between_markers() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let path = temp.path().join("learning-analysis.md");
        std::fs::write(
            &path,
            "# README\nedit below\n\n---\nAnalyze the cover.\n\n{{USER_NOTE}}\n\nJSON only.\n---\nfooter",
        )?;

        assert_eq!(
            load_analysis_prompt(Some(&path), Some("high CTR")),
            "Analyze the cover.\n\nUser note: high CTR\n\nJSON only."
        );
        assert_eq!(
            load_analysis_prompt(Some(&path), None),
            "Analyze the cover.\n\nJSON only."
        );
        Ok(())
    }

    #[test]
    fn missing_template_uses_builtin() {
        let prompt = load_analysis_prompt(Some(Path::new("/no/such/template.md")), None);
        assert!(prompt.starts_with("You are a YouTube cover image analysis expert."));
        assert!(!prompt.contains("{{USER_NOTE}}"));
        assert!(prompt.ends_with("Output JSON only, no other content."));
    }

    #[test]
    fn analyzer_prefers_gemini_and_falls_back_to_openrouter() {
        let transport: Arc<dyn JsonTransport> = Arc::new(ScriptedTransport::default());
        let gemini = CoverAnalyzer::from_credentials(&credentials(true, true), None, transport.clone());
        assert_eq!(gemini.as_ref().map(CoverAnalyzer::model), Some("gemini-2.0-flash"));

        let openrouter = CoverAnalyzer::from_credentials(&credentials(false, true), None, transport.clone());
        assert_eq!(openrouter.as_ref().map(CoverAnalyzer::provider), Some(ProviderKind::OpenRouter));
        assert_eq!(openrouter.as_ref().map(CoverAnalyzer::model), Some("google/gemini-2.0-flash-001"));

        assert!(CoverAnalyzer::from_credentials(&Credentials::default(), None, transport).is_none());
    }

    #[test]
    fn analyze_maps_reply_into_record() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let image = temp.path().join("ep42.png");
        std::fs::write(&image, [0x89, b'P', b'N', b'G'])?;
        let transport = Arc::new(ScriptedTransport::replying(vec![json!({
            "candidates": [{"content": {"parts": [{"text": "Analysis:\n{\"emotion\": \"curiosity\", \"patterns\": [\"huge number\"]}"}]}}]
        })]));
        let analyzer = CoverAnalyzer::from_credentials(&credentials(true, false), None, transport)
            .ok_or_else(|| anyhow::anyhow!("analyzer"))?;

        let record = analyzer
            .analyze(&image, DEFAULT_ANALYSIS_INSTRUCTION)
            .ok_or_else(|| anyhow::anyhow!("record"))?;
        assert_eq!(record.source, "ep42.png");
        assert_eq!(record.elements.emotion, "curiosity");
        assert_eq!(record.patterns, vec!["huge number"]);
        assert_eq!(record.date.len(), 10);
        Ok(())
    }

    #[test]
    fn analyze_fails_softly() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let image = temp.path().join("cover.png");
        std::fs::write(&image, [0x89, b'P', b'N', b'G'])?;
        let transport = Arc::new(ScriptedTransport::replying(vec![
            json!({"error": {"message": "quota exceeded"}}),
            json!({"candidates": [{"content": {"parts": [{"text": "I cannot help with that."}]}}]}),
        ]));
        let analyzer = CoverAnalyzer::from_credentials(&credentials(true, false), None, transport)
            .ok_or_else(|| anyhow::anyhow!("analyzer"))?;

        assert!(analyzer.analyze(&temp.path().join("missing.png"), "x").is_none());
        assert!(analyzer.analyze(&image, "x").is_none());
        assert!(analyzer.analyze(&image, "x").is_none());
        Ok(())
    }
}
