use std::sync::Arc;

use illustrator_contracts::prompt::PromptPart;
use illustrator_contracts::providers::{api_base_from_env, ProviderKind};
use illustrator_contracts::request::{GenerationRequest, ReferenceImage};
use illustrator_contracts::{IllustratorResult, ProviderError, ProviderErrorKind};
use serde_json::{json, Map, Value};

use super::{aspect_ratio_for_size, completion_text, ImageProvider, VisionProvider};
use crate::response::{resolve_image_response, upstream_error, ImageOutcome};
use crate::transport::{Auth, JsonRequest, JsonTransport};

pub const DEFAULT_GEMINI_API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta";
const PROVIDER: &str = "gemini";

/// Native `generateContent` backend. Accepts reference images as inline parts.
pub struct GeminiProvider {
    api_base: String,
    api_key: String,
    transport: Arc<dyn JsonTransport>,
}

impl GeminiProvider {
    pub fn new(api_base: impl Into<String>, api_key: impl Into<String>, transport: Arc<dyn JsonTransport>) -> Self {
        Self {
            api_base: api_base.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            transport,
        }
    }

    /// Uses `GEMINI_API_BASE` when set.
    pub fn from_env(api_key: &str, transport: Arc<dyn JsonTransport>) -> Self {
        Self::new(
            api_base_from_env("GEMINI_API_BASE", DEFAULT_GEMINI_API_BASE),
            api_key,
            transport,
        )
    }

    fn endpoint_for_model(&self, model: &str) -> String {
        let trimmed = model.trim();
        let model_path = if trimmed.starts_with("models/") {
            trimmed.to_string()
        } else {
            format!("models/{trimmed}")
        };
        format!("{}/{}:generateContent", self.api_base, model_path)
    }

    fn post(&self, model: &str, payload: Value) -> IllustratorResult<Value> {
        let request = JsonRequest {
            provider: PROVIDER,
            endpoint: self.endpoint_for_model(model),
            auth: Auth::ApiKey(self.api_key.clone()),
            headers: Vec::new(),
            payload,
        };
        Ok(self.transport.post_json(&request)?)
    }

    pub fn build_payload(request: &GenerationRequest) -> Value {
        let mut parts = Vec::new();
        let slotted = request.prompt.has_reference_slot();
        if !slotted {
            parts.extend(request.reference_images.iter().map(inline_part));
        }
        for part in request.prompt.parts() {
            match part {
                PromptPart::Text(text) => parts.push(json!({ "text": text })),
                PromptPart::ReferenceImages => {
                    parts.extend(request.reference_images.iter().map(inline_part));
                }
            }
        }

        let mut generation_config = Map::new();
        generation_config.insert("responseModalities".to_string(), json!(["IMAGE", "TEXT"]));
        if let Some(ratio) = request.size.as_deref().and_then(aspect_ratio_for_size) {
            generation_config.insert("imageConfig".to_string(), json!({ "aspectRatio": ratio }));
        }

        json!({
            "contents": [{ "role": "user", "parts": parts }],
            "generationConfig": generation_config,
        })
    }
}

fn inline_part(image: &ReferenceImage) -> Value {
    json!({
        "inlineData": {
            "mimeType": image.mime_type,
            "data": image.data_base64,
        }
    })
}

impl ImageProvider for GeminiProvider {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Gemini
    }

    fn generate(&self, request: &GenerationRequest, model: &str) -> IllustratorResult<ImageOutcome> {
        let response = self.post(model, Self::build_payload(request))?;
        Ok(resolve_image_response(PROVIDER, &response)?)
    }
}

impl VisionProvider for GeminiProvider {
    fn describe_image(
        &self,
        model: &str,
        image: &ReferenceImage,
        instruction: &str,
    ) -> IllustratorResult<String> {
        let payload = json!({
            "contents": [{
                "role": "user",
                "parts": [inline_part(image), { "text": instruction }],
            }],
            "generationConfig": {
                "temperature": 0.3,
                "maxOutputTokens": 1024,
            },
        });
        let response = self.post(model, payload)?;
        if let Some(err) = upstream_error(PROVIDER, &response) {
            return Err(err.into());
        }
        completion_text(&response).ok_or_else(|| {
            ProviderError::new(
                ProviderErrorKind::UnrecognizedResponse,
                PROVIDER,
                "no analysis text in response",
            )
            .with_snapshot(&response.to_string())
            .into()
        })
    }
}

#[cfg(test)]
mod tests {
    use illustrator_contracts::prompt::{compose, ComposedPrompt, PromptInput};
    use serde_json::json;

    use super::*;
    use crate::transport::testing::ScriptedTransport;

    fn reference(name: &str) -> ReferenceImage {
        ReferenceImage {
            path: name.into(),
            mime_type: "image/png".to_string(),
            data_base64: "iVBORw0KGgo=".to_string(),
        }
    }

    #[test]
    fn reference_images_fill_the_prompt_slot() {
        let prompt = compose(&PromptInput {
            reference_count: 2,
            ..PromptInput::new("A lighthouse")
        });
        let mut request = GenerationRequest::new(prompt);
        request.reference_images = vec![reference("a.png"), reference("b.png")];
        request.size = Some("1920x1080".to_string());

        let payload = GeminiProvider::build_payload(&request);
        let parts = payload["contents"][0]["parts"].as_array().cloned().unwrap_or_default();
        assert_eq!(parts.len(), 5);
        assert!(parts[0].get("text").is_some());
        assert_eq!(parts[1]["inlineData"]["mimeType"], "image/png");
        assert_eq!(parts[2]["inlineData"]["data"], "iVBORw0KGgo=");
        assert_eq!(parts[4]["text"], "Generate an image: A lighthouse");
        assert_eq!(payload["generationConfig"]["responseModalities"], json!(["IMAGE", "TEXT"]));
        assert_eq!(payload["generationConfig"]["imageConfig"]["aspectRatio"], "16:9");
    }

    #[test]
    fn generate_posts_to_model_endpoint_with_query_key() -> anyhow::Result<()> {
        let transport = Arc::new(ScriptedTransport::replying(vec![json!({
            "candidates": [{"content": {"parts": [{"inlineData": {"mimeType": "image/png", "data": "iVBORw0KGgo="}}]}}]
        })]));
        let provider = GeminiProvider::new("https://example.test/v1beta/", "k-123", transport.clone());
        let request = GenerationRequest::new(ComposedPrompt::text_only("Generate an image: x"));

        let outcome = provider.generate(&request, "gemini-3-pro-image-preview")?;
        assert!(matches!(outcome, ImageOutcome::Found(_)));

        let sent = transport.recorded();
        assert_eq!(
            sent[0].endpoint,
            "https://example.test/v1beta/models/gemini-3-pro-image-preview:generateContent"
        );
        assert_eq!(sent[0].auth, Auth::ApiKey("k-123".to_string()));
        assert!(sent[0].payload["generationConfig"].get("imageConfig").is_none());
        Ok(())
    }

    #[test]
    fn describe_image_returns_text_or_upstream_error() -> anyhow::Result<()> {
        let transport = Arc::new(ScriptedTransport::replying(vec![
            json!({"candidates": [{"content": {"parts": [{"text": "{\"emotion\": \"calm\"}"}]}}]}),
            json!({"error": {"message": "quota", "code": 429}}),
        ]));
        let provider = GeminiProvider::new(DEFAULT_GEMINI_API_BASE, "k", transport.clone());
        let text = provider.describe_image("gemini-2.0-flash", &reference("c.png"), "Analyze")?;
        assert_eq!(text, "{\"emotion\": \"calm\"}");
        assert_eq!(transport.recorded()[0].payload["generationConfig"]["temperature"], 0.3);

        assert!(provider
            .describe_image("gemini-2.0-flash", &reference("c.png"), "Analyze")
            .is_err());
        Ok(())
    }
}
