mod gemini;
mod openrouter;

use std::sync::Arc;

use illustrator_contracts::providers::ProviderKind;
use illustrator_contracts::request::{GenerationRequest, ReferenceImage};
use illustrator_contracts::IllustratorResult;
use serde_json::Value;

use crate::response::ImageOutcome;
use crate::transport::JsonTransport;

pub use gemini::{GeminiProvider, DEFAULT_GEMINI_API_BASE};
pub use openrouter::{OpenRouterProvider, DEFAULT_OPENROUTER_API_BASE};

pub trait ImageProvider: Send + Sync {
    fn kind(&self) -> ProviderKind;
    fn generate(&self, request: &GenerationRequest, model: &str) -> IllustratorResult<ImageOutcome>;
}

/// Backends that can read an image and answer in text.
pub trait VisionProvider: Send + Sync {
    fn describe_image(
        &self,
        model: &str,
        image: &ReferenceImage,
        instruction: &str,
    ) -> IllustratorResult<String>;
}

pub fn image_provider(
    kind: ProviderKind,
    api_key: &str,
    transport: Arc<dyn JsonTransport>,
) -> Box<dyn ImageProvider> {
    match kind {
        ProviderKind::Gemini => Box::new(GeminiProvider::from_env(api_key, transport)),
        ProviderKind::OpenRouter => Box::new(OpenRouterProvider::from_env(api_key, transport)),
    }
}

pub fn vision_provider(
    kind: ProviderKind,
    api_key: &str,
    transport: Arc<dyn JsonTransport>,
) -> Box<dyn VisionProvider> {
    match kind {
        ProviderKind::Gemini => Box::new(GeminiProvider::from_env(api_key, transport)),
        ProviderKind::OpenRouter => Box::new(OpenRouterProvider::from_env(api_key, transport)),
    }
}

const SUPPORTED_RATIOS: [(&str, f64); 10] = [
    ("1:1", 1.0),
    ("2:3", 2.0 / 3.0),
    ("3:2", 3.0 / 2.0),
    ("3:4", 3.0 / 4.0),
    ("4:3", 4.0 / 3.0),
    ("4:5", 4.0 / 5.0),
    ("5:4", 5.0 / 4.0),
    ("9:16", 9.0 / 16.0),
    ("16:9", 16.0 / 9.0),
    ("21:9", 21.0 / 9.0),
];

/// Snaps `WxH`, `W:H` or a named orientation to the nearest supported ratio.
pub fn aspect_ratio_for_size(size: &str) -> Option<String> {
    let normalized = size.trim().to_ascii_lowercase();
    match normalized.as_str() {
        "" => return None,
        "portrait" | "tall" => return Some("9:16".to_string()),
        "landscape" | "wide" => return Some("16:9".to_string()),
        "square" => return Some("1:1".to_string()),
        _ => {}
    }

    let target = if let Some((left, right)) = parse_ratio(&normalized) {
        let direct = format!("{left}:{right}");
        if SUPPORTED_RATIOS.iter().any(|(label, _)| *label == direct) {
            return Some(direct);
        }
        left as f64 / right as f64
    } else if let Some((width, height)) = parse_dims(&normalized) {
        width as f64 / height as f64
    } else {
        return None;
    };

    let mut best = "1:1";
    let mut best_delta = f64::MAX;
    for (label, ratio) in SUPPORTED_RATIOS {
        let delta = (ratio - target).abs();
        if delta < best_delta {
            best = label;
            best_delta = delta;
        }
    }
    Some(best.to_string())
}

fn parse_dims(raw: &str) -> Option<(u32, u32)> {
    let (left, right) = raw.split_once('x')?;
    let width = left.trim().parse::<u32>().ok()?;
    let height = right.trim().parse::<u32>().ok()?;
    (width > 0 && height > 0).then_some((width, height))
}

fn parse_ratio(raw: &str) -> Option<(u32, u32)> {
    let (left, right) = raw.split_once(':').or_else(|| raw.split_once('/'))?;
    let first = left.trim().parse::<u32>().ok()?;
    let second = right.trim().parse::<u32>().ok()?;
    (first > 0 && second > 0).then_some((first, second))
}

/// Concatenated text of the first completion in either envelope.
pub(crate) fn completion_text(payload: &Value) -> Option<String> {
    let mut pieces: Vec<&str> = Vec::new();
    if let Some(choice) = payload
        .get("choices")
        .and_then(Value::as_array)
        .and_then(|rows| rows.first())
    {
        match choice.get("message").and_then(|message| message.get("content")) {
            Some(Value::String(text)) => pieces.push(text),
            Some(Value::Array(parts)) => {
                pieces.extend(parts.iter().filter_map(|part| part.get("text").and_then(Value::as_str)));
            }
            _ => {}
        }
    }
    if let Some(parts) = payload
        .get("candidates")
        .and_then(Value::as_array)
        .and_then(|rows| rows.first())
        .and_then(|candidate| candidate.get("content"))
        .and_then(|content| content.get("parts"))
        .and_then(Value::as_array)
    {
        pieces.extend(parts.iter().filter_map(|part| part.get("text").and_then(Value::as_str)));
    }
    let joined = pieces.join("\n");
    (!joined.trim().is_empty()).then_some(joined)
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn sizes_snap_to_supported_ratios() {
        assert_eq!(aspect_ratio_for_size("1280x720").as_deref(), Some("16:9"));
        assert_eq!(aspect_ratio_for_size("1000x1500").as_deref(), Some("2:3"));
        assert_eq!(aspect_ratio_for_size("4:5").as_deref(), Some("4:5"));
        assert_eq!(aspect_ratio_for_size("7:3").as_deref(), Some("21:9"));
        assert_eq!(aspect_ratio_for_size("Portrait").as_deref(), Some("9:16"));
        assert_eq!(aspect_ratio_for_size(""), None);
        assert_eq!(aspect_ratio_for_size("huge"), None);
    }

    #[test]
    fn completion_text_reads_both_envelopes() {
        let chat = json!({"choices": [{"message": {"content": "{\"a\": 1}"}}]});
        assert_eq!(completion_text(&chat).as_deref(), Some("{\"a\": 1}"));

        let native = json!({"candidates": [{"content": {"parts": [{"text": "one"}, {"text": "two"}]}}]});
        assert_eq!(completion_text(&native).as_deref(), Some("one\ntwo"));

        assert_eq!(completion_text(&json!({"choices": []})), None);
    }
}
