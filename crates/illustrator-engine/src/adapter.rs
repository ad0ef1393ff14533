use std::sync::Arc;

use illustrator_contracts::models::{Capability, ModelSelection, ModelSelector};
use illustrator_contracts::providers::{select_provider, Credentials, ProviderKind, ProviderSelection};
use illustrator_contracts::request::GenerationRequest;
use illustrator_contracts::{IllustratorError, IllustratorResult};
use tracing::{debug, warn};

use crate::providers::{image_provider, ImageProvider};
use crate::response::CanonicalImage;
use crate::transport::JsonTransport;

/// Anything that turns a request into at most one image.
pub trait ImageSource {
    fn name(&self) -> &str;
    fn generate(&self, request: &GenerationRequest) -> IllustratorResult<Option<CanonicalImage>>;
}

#[derive(Debug, Clone, Default)]
pub struct AdapterOptions {
    pub provider: Option<ProviderKind>,
    pub model: Option<String>,
    pub needs_reference_images: bool,
}

/// Routes requests to one backend chosen at startup.
///
/// Reference images move the run to a backend that accepts them, or fail
/// with a credential error before any call is made.
pub struct ProviderAdapter {
    selection: ProviderSelection,
    model: ModelSelection,
    provider: Box<dyn ImageProvider>,
}

impl ProviderAdapter {
    pub fn connect(
        credentials: &Credentials,
        options: &AdapterOptions,
        transport: Arc<dyn JsonTransport>,
    ) -> IllustratorResult<Self> {
        let selection = select_provider(credentials, options.provider, options.needs_reference_images)?;
        if let Some(reason) = selection.fallback_reason.as_deref() {
            warn!(provider = %selection.kind, "{reason}");
        }

        let capability = if options.needs_reference_images {
            Capability::ReferenceImages
        } else {
            Capability::Image
        };
        let model = ModelSelector::default()
            .select(options.model.as_deref(), selection.kind, capability)
            .map_err(IllustratorError::config)?;
        if let Some(reason) = model.fallback_reason.as_deref() {
            warn!(model = %model.model, "{reason}");
        }

        let api_key = credentials.key_for(selection.kind).ok_or_else(|| {
            IllustratorError::credential(selection.kind.credential_env(), format!("the {} provider", selection.kind))
        })?;
        debug!(provider = %selection.kind, model = %model.model, "provider adapter ready");
        Ok(Self {
            provider: image_provider(selection.kind, api_key, transport),
            selection,
            model,
        })
    }

    /// Wraps an already-built provider; used when the caller owns routing.
    pub fn with_provider(provider: Box<dyn ImageProvider>, model: impl Into<String>) -> Self {
        Self {
            selection: ProviderSelection {
                kind: provider.kind(),
                fallback_reason: None,
            },
            model: ModelSelection {
                model: model.into(),
                requested: None,
                fallback_reason: None,
            },
            provider,
        }
    }

    pub fn provider(&self) -> ProviderKind {
        self.selection.kind
    }

    pub fn model(&self) -> &str {
        &self.model.model
    }

    /// Provider and model fallback reasons, in that order.
    pub fn fallback_reasons(&self) -> Vec<&str> {
        self.selection
            .fallback_reason
            .as_deref()
            .into_iter()
            .chain(self.model.fallback_reason.as_deref())
            .collect()
    }
}

impl ImageSource for ProviderAdapter {
    fn name(&self) -> &str {
        self.selection.kind.name()
    }

    fn generate(&self, request: &GenerationRequest) -> IllustratorResult<Option<CanonicalImage>> {
        if request.needs_reference_support() && !self.selection.kind.supports_reference_images() {
            return Err(IllustratorError::credential(
                ProviderKind::Gemini.credential_env(),
                "reference image conditioning",
            ));
        }
        let model = request
            .model
            .as_deref()
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .unwrap_or(&self.model.model);
        Ok(self.provider.generate(request, model)?.into_image())
    }
}
