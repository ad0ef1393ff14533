use indexmap::IndexMap;

use crate::providers::ProviderKind;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Capability {
    /// Produces images from a prompt.
    Image,
    /// Accepts reference images as extra input parts.
    ReferenceImages,
    /// Reads an image and answers in text.
    Vision,
}

impl Capability {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Image => "image",
            Self::ReferenceImages => "reference_images",
            Self::Vision => "vision",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelSpec {
    pub name: String,
    pub provider: ProviderKind,
    pub capabilities: Vec<Capability>,
}

impl ModelSpec {
    pub fn supports(&self, capability: Capability) -> bool {
        self.capabilities.contains(&capability)
    }
}

/// Known models in preference order; the first match per provider and
/// capability is that provider's default.
#[derive(Debug, Clone)]
pub struct ModelRegistry {
    models: IndexMap<String, ModelSpec>,
}

impl ModelRegistry {
    pub fn new(models: Option<IndexMap<String, ModelSpec>>) -> Self {
        Self {
            models: models.unwrap_or_else(default_models),
        }
    }

    pub fn get(&self, name: &str) -> Option<&ModelSpec> {
        self.models.get(name)
    }

    pub fn by_capability(&self, provider: ProviderKind, capability: Capability) -> Vec<ModelSpec> {
        self.models
            .values()
            .filter(|model| model.provider == provider && model.supports(capability))
            .cloned()
            .collect()
    }
}

impl Default for ModelRegistry {
    fn default() -> Self {
        Self::new(None)
    }
}

fn default_models() -> IndexMap<String, ModelSpec> {
    use Capability::{Image, ReferenceImages, Vision};

    let mut map = IndexMap::new();
    let mut insert = |name: &str, provider: ProviderKind, capabilities: &[Capability]| {
        map.insert(
            name.to_string(),
            ModelSpec {
                name: name.to_string(),
                provider,
                capabilities: capabilities.to_vec(),
            },
        );
    };

    insert(
        "gemini-3-pro-image-preview",
        ProviderKind::Gemini,
        &[Image, ReferenceImages],
    );
    insert(
        "gemini-2.5-flash-image",
        ProviderKind::Gemini,
        &[Image, ReferenceImages],
    );
    insert("gemini-2.0-flash", ProviderKind::Gemini, &[Vision]);
    insert("gemini-2.5-flash", ProviderKind::Gemini, &[Vision]);
    insert(
        "google/gemini-3-pro-image-preview",
        ProviderKind::OpenRouter,
        &[Image],
    );
    insert(
        "google/gemini-2.5-flash-image-preview",
        ProviderKind::OpenRouter,
        &[Image],
    );
    insert(
        "google/gemini-2.0-flash-001",
        ProviderKind::OpenRouter,
        &[Vision],
    );
    map
}
