use std::sync::Arc;

use illustrator_contracts::providers::{api_base_from_env, non_empty_env, ProviderKind};
use illustrator_contracts::request::{GenerationRequest, ReferenceImage};
use illustrator_contracts::{IllustratorError, IllustratorResult, ProviderError, ProviderErrorKind};
use serde_json::{json, Value};

use super::{aspect_ratio_for_size, completion_text, ImageProvider, VisionProvider};
use crate::response::{resolve_image_response, upstream_error, ImageOutcome};
use crate::transport::{Auth, JsonRequest, JsonTransport};

pub const DEFAULT_OPENROUTER_API_BASE: &str = "https://openrouter.ai/api/v1";
const PROVIDER: &str = "openrouter";

/// OpenAI-style chat completions backend. Prompt input is text only.
pub struct OpenRouterProvider {
    api_base: String,
    api_key: String,
    headers: Vec<(String, String)>,
    transport: Arc<dyn JsonTransport>,
}

impl OpenRouterProvider {
    pub fn new(api_base: impl Into<String>, api_key: impl Into<String>, transport: Arc<dyn JsonTransport>) -> Self {
        Self {
            api_base: api_base.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            headers: Vec::new(),
            transport,
        }
    }

    /// Uses `OPENROUTER_API_BASE` and the optional attribution headers
    /// `OPENROUTER_HTTP_REFERER` / `OPENROUTER_X_TITLE`.
    pub fn from_env(api_key: &str, transport: Arc<dyn JsonTransport>) -> Self {
        let mut provider = Self::new(
            api_base_from_env("OPENROUTER_API_BASE", DEFAULT_OPENROUTER_API_BASE),
            api_key,
            transport,
        );
        if let Some(referer) = non_empty_env("OPENROUTER_HTTP_REFERER") {
            provider = provider.with_header("HTTP-Referer", referer);
        }
        if let Some(title) = non_empty_env("OPENROUTER_X_TITLE") {
            provider = provider.with_header("X-Title", title);
        }
        provider
    }

    pub fn with_header(mut self, name: &str, value: impl Into<String>) -> Self {
        self.headers.push((name.to_string(), value.into()));
        self
    }

    fn post(&self, payload: Value) -> IllustratorResult<Value> {
        let request = JsonRequest {
            provider: PROVIDER,
            endpoint: format!("{}/chat/completions", self.api_base),
            auth: Auth::Bearer(self.api_key.clone()),
            headers: self.headers.clone(),
            payload,
        };
        Ok(self.transport.post_json(&request)?)
    }

    pub fn build_payload(request: &GenerationRequest, model: &str) -> Value {
        let mut payload = json!({
            "model": model,
            "messages": [{ "role": "user", "content": request.prompt.text() }],
            "modalities": ["image", "text"],
        });
        if let Some(ratio) = request.size.as_deref().and_then(aspect_ratio_for_size) {
            payload["image_config"] = json!({ "aspect_ratio": ratio });
        }
        payload
    }
}

impl ImageProvider for OpenRouterProvider {
    fn kind(&self) -> ProviderKind {
        ProviderKind::OpenRouter
    }

    fn generate(&self, request: &GenerationRequest, model: &str) -> IllustratorResult<ImageOutcome> {
        if request.needs_reference_support() {
            return Err(IllustratorError::config(
                "openrouter image transport cannot carry reference images",
            ));
        }
        let response = self.post(Self::build_payload(request, model))?;
        Ok(resolve_image_response(PROVIDER, &response)?)
    }
}

impl VisionProvider for OpenRouterProvider {
    fn describe_image(
        &self,
        model: &str,
        image: &ReferenceImage,
        instruction: &str,
    ) -> IllustratorResult<String> {
        let payload = json!({
            "model": model,
            "messages": [{
                "role": "user",
                "content": [
                    { "type": "text", "text": instruction },
                    { "type": "image_url", "image_url": { "url": image.data_url() } },
                ],
            }],
            "temperature": 0.3,
            "max_tokens": 1024,
        });
        let response = self.post(payload)?;
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
