use std::collections::BTreeSet;
use std::path::{Component, Path};

use serde::Deserialize;
use serde_json::Value;

use crate::error::{IllustratorError, IllustratorResult};
use crate::prompt::legacy_style_block;

pub const DEFAULT_PREFIX: &str = "illustration";

/// Batch file in either supported shape. The unified shape is recognized by
/// its `pictures` field.
#[derive(Debug, Clone, PartialEq)]
pub enum BatchConfig {
    Unified(UnifiedConfig),
    Legacy(LegacyConfig),
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct UnifiedConfig {
    #[serde(default)]
    pub style: String,
    pub pictures: Vec<UnifiedPicture>,
    #[serde(default)]
    pub batch_rules: Option<Value>,
    #[serde(default)]
    pub instruction: Option<String>,
    /// Body used for pictures whose `content` is blank.
    #[serde(default)]
    pub fallback: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct UnifiedPicture {
    pub id: RawId,
    #[serde(default)]
    pub topic: String,
    #[serde(default)]
    pub content: String,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct LegacyConfig {
    #[serde(default)]
    pub style: Option<LegacyStyle>,
    pub illustrations: Vec<LegacyIllustration>,
}

#[derive(Debug, Clone, PartialEq, Default, Deserialize)]
pub struct LegacyStyle {
    pub mode: Option<String>,
    pub background: Option<String>,
    pub primary: Option<String>,
    #[serde(default)]
    pub accent: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct LegacyIllustration {
    pub id: RawId,
    pub prompt: Value,
    #[serde(default)]
    pub filename: String,
    #[serde(rename = "type", default)]
    pub kind: Option<String>,
    #[serde(default)]
    pub position: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum RawId {
    Number(u64),
    Text(String),
}

impl RawId {
    fn normalized(&self) -> String {
        match self {
            Self::Number(value) => value.to_string(),
            Self::Text(value) => normalize_id(value),
        }
    }
}

/// One unit of work in a batch. Identity is `id`; `filename` is stable across runs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchItem {
    pub id: String,
    pub topic: Option<String>,
    pub content: String,
    pub filename: String,
    pub cover: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchPlan {
    pub style_block: Option<String>,
    pub items: Vec<BatchItem>,
}

impl BatchConfig {
    pub fn load(path: &Path) -> IllustratorResult<Self> {
        let raw = std::fs::read_to_string(path).map_err(|err| {
            IllustratorError::config(format!("cannot read batch config {}: {err}", path.display()))
        })?;
        Self::parse(&raw)
    }

    pub fn parse(raw: &str) -> IllustratorResult<Self> {
        let value: Value = serde_json::from_str(raw)
            .map_err(|err| IllustratorError::config(format!("batch config is not valid JSON: {err}")))?;
        if !value.is_object() {
            return Err(IllustratorError::config("batch config must be a JSON object"));
        }
        if value.get("pictures").is_some() {
            serde_json::from_value(value)
                .map(Self::Unified)
                .map_err(|err| IllustratorError::config(format!("invalid unified batch config: {err}")))
        } else {
            serde_json::from_value(value)
                .map(Self::Legacy)
                .map_err(|err| IllustratorError::config(format!("invalid legacy batch config: {err}")))
        }
    }

    /// Flattens the config into ordered work items with resolved filenames.
    pub fn plan(&self, prefix: &str) -> IllustratorResult<BatchPlan> {
        let plan = match self {
            Self::Unified(config) => config.plan(prefix)?,
            Self::Legacy(config) => config.plan(prefix)?,
        };
        if plan.items.is_empty() {
            return Err(IllustratorError::config("batch config contains no items"));
        }
        let mut seen_ids = BTreeSet::new();
        let mut seen_files = BTreeSet::new();
        for item in &plan.items {
            if !seen_ids.insert(item.id.as_str()) {
                return Err(IllustratorError::config(format!(
                    "duplicate batch item id '{}'",
                    item.id
                )));
            }
            // Two items sharing a target would make the second look finished.
            if !seen_files.insert(item.filename.as_str()) {
                return Err(IllustratorError::config(format!(
                    "batch items resolve to the same file '{}' (item '{}')",
                    item.filename, item.id
                )));
            }
        }
        Ok(plan)
    }
}

impl UnifiedConfig {
    fn plan(&self, prefix: &str) -> IllustratorResult<BatchPlan> {
        let mut style_lines = Vec::new();
        if let Some(style) = non_blank(&self.style) {
            style_lines.push(style.to_string());
        }
        match &self.batch_rules {
            Some(Value::String(rules)) if !rules.trim().is_empty() => {
                style_lines.push(format!("Rules: {}", rules.trim()));
            }
            Some(rules @ (Value::Object(_) | Value::Array(_))) => {
                style_lines.push(format!("Rules: {rules}"));
            }
            _ => {}
        }

        let instruction = self.instruction.as_deref().and_then(non_blank);
        let fallback = self.fallback.as_deref().and_then(non_blank);
        let mut items = Vec::with_capacity(self.pictures.len());
        for picture in &self.pictures {
            let id = picture.id.normalized();
            let topic = non_blank(&picture.topic);
            let body = non_blank(&picture.content).or(fallback);
            let described = match (topic, body) {
                (Some(topic), Some(body)) => format!("Topic: {topic}\n\n{body}"),
                (Some(topic), None) => format!("Topic: {topic}"),
                (None, Some(body)) => body.to_string(),
                (None, None) => {
                    return Err(IllustratorError::config(format!(
                        "picture '{id}' has neither topic nor content"
                    )))
                }
            };
            let content = match instruction {
                Some(instruction) => format!("{instruction}\n\n{described}"),
                None => described,
            };
            items.push(BatchItem {
                filename: derive_filename(prefix, &id),
                topic: topic.map(str::to_string),
                content,
                cover: false,
                id,
            });
        }

        Ok(BatchPlan {
            style_block: (!style_lines.is_empty()).then(|| style_lines.join("\n")),
            items,
        })
    }
}

impl LegacyConfig {
    fn plan(&self, prefix: &str) -> IllustratorResult<BatchPlan> {
        let style_block = self.style.as_ref().map(|style| {
            legacy_style_block(
                style.mode.as_deref(),
                style.background.as_deref(),
                style.primary.as_deref(),
                &style.accent,
            )
        });
        let mut items = Vec::with_capacity(self.illustrations.len());
        for illustration in &self.illustrations {
            let id = illustration.id.normalized();
            let content = match &illustration.prompt {
                Value::String(text) => text.trim().to_string(),
                Value::Null => String::new(),
                other => other.to_string(),
            };
            if content.is_empty() {
                return Err(IllustratorError::config(format!(
                    "illustration '{id}' has an empty prompt"
                )));
            }
            let filename = match non_blank(&illustration.filename) {
                Some(name) => validate_filename(name)?,
                None => derive_filename(prefix, &id),
            };
            items.push(BatchItem {
                cover: illustration
                    .kind
                    .as_deref()
                    .map(|kind| kind.trim().eq_ignore_ascii_case("cover"))
                    .unwrap_or(false),
                topic: illustration.position.as_deref().and_then(non_blank).map(str::to_string),
                content,
                filename,
                id,
            });
        }
        Ok(BatchPlan { style_block, items })
    }
}

/// `<prefix>-<id>.png`; numeric ids are zero-padded to two digits.
pub fn derive_filename(prefix: &str, id: &str) -> String {
    let prefix = non_blank(prefix).unwrap_or(DEFAULT_PREFIX);
    match id.parse::<u64>() {
        Ok(number) => format!("{prefix}-{number:02}.png"),
        Err(_) => {
            let slug: String = id
                .chars()
                .map(|ch| {
                    if ch.is_ascii_alphanumeric() || ch == '-' || ch == '_' {
                        ch
                    } else {
                        '-'
                    }
                })
                .collect();
            format!("{prefix}-{slug}.png")
        }
    }
}

/// Canonical id text: trimmed, numeric ids without leading zeros.
pub fn normalize_id(raw: &str) -> String {
    let trimmed = raw.trim();
    match trimmed.parse::<u64>() {
        Ok(number) => number.to_string(),
        Err(_) => trimmed.to_string(),
    }
}

fn validate_filename(name: &str) -> IllustratorResult<String> {
    let path = Path::new(name);
    let escapes = path
        .components()
        .any(|part| !matches!(part, Component::Normal(_)));
    if escapes {
        return Err(IllustratorError::config(format!(
            "filename '{name}' must be a relative path inside the output directory"
        )));
    }
    Ok(name.to_string())
}

fn non_blank(value: &str) -> Option<&str> {
    let trimmed = value.trim();
    (!trimmed.is_empty()).then_some(trimmed)
}
