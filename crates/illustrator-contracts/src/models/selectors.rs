use crate::providers::ProviderKind;

use super::registry::{Capability, ModelRegistry, ModelSpec};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelSelection {
    /// Model id in the provider's own namespace.
    pub model: String,
    pub requested: Option<String>,
    pub fallback_reason: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct ModelSelector {
    pub registry: ModelRegistry,
}

impl ModelSelector {
    /// Resolves the model id to send to `provider`.
    ///
    /// A requested id is translated into the provider's namespace. Known ids
    /// without the capability fall back to the provider default; unknown ids
    /// pass through untouched.
    pub fn select(
        &self,
        requested: Option<&str>,
        provider: ProviderKind,
        capability: Capability,
    ) -> Result<ModelSelection, String> {
        let requested = requested.map(str::trim).filter(|value| !value.is_empty());
        let fallback_reason = if let Some(requested_value) = requested {
            let translated = translate_model_id(requested_value, provider);
            match self.registry.get(&translated) {
                Some(spec) if spec.provider == provider && spec.supports(capability) => {
                    return Ok(ModelSelection {
                        model: translated,
                        requested: Some(requested_value.to_string()),
                        fallback_reason: None,
                    });
                }
                Some(_) => Some(format!(
                    "Requested model '{requested_value}' unavailable for capability '{}' on {provider}.",
                    capability.as_str()
                )),
                None => {
                    return Ok(ModelSelection {
                        model: translated,
                        requested: Some(requested_value.to_string()),
                        fallback_reason: None,
                    });
                }
            }
        } else {
            None
        };

        let Some(model) = self
            .registry
            .by_capability(provider, capability)
            .into_iter()
            .next()
            .map(|spec: ModelSpec| spec.name)
        else {
            return Err(format!(
                "No {provider} models available for capability '{}'.",
                capability.as_str()
            ));
        };
        Ok(ModelSelection {
            model,
            requested: requested.map(str::to_string),
            fallback_reason,
        })
    }
}

/// Maps a model id between the Gemini and OpenRouter namespaces.
pub fn translate_model_id(raw: &str, provider: ProviderKind) -> String {
    let trimmed = raw.trim();
    match provider {
        ProviderKind::Gemini => trimmed
            .strip_prefix("google/")
            .map(|rest| match rest {
                "gemini-2.5-flash-image-preview" => "gemini-2.5-flash-image".to_string(),
                "gemini-2.0-flash-001" => "gemini-2.0-flash".to_string(),
                other => other.to_string(),
            })
            .unwrap_or_else(|| trimmed.to_string()),
        ProviderKind::OpenRouter => {
            if trimmed.contains('/') {
                return trimmed.to_string();
            }
            let lowered = trimmed.to_ascii_lowercase();
            if lowered.starts_with("gemini-") || lowered.starts_with("imagen-") {
                let normalized = match lowered.as_str() {
                    "gemini-2.0-flash" => "gemini-2.0-flash-001",
                    "gemini-2.5-flash-image" => "gemini-2.5-flash-image-preview",
                    _ => trimmed,
                };
                return format!("google/{normalized}");
            }
            trimmed.to_string()
        }
    }
}
