use std::path::Path;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::batch::BatchItemStatus;
use crate::error::{IllustratorError, IllustratorResult};
use crate::events::now_utc_iso;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ItemSummary {
    pub id: String,
    pub status: String,
    #[serde(default)]
    pub files: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ItemSummary {
    pub fn new(id: impl Into<String>, status: BatchItemStatus) -> Self {
        Self {
            id: id.into(),
            status: status.as_str().to_string(),
            files: Vec::new(),
            error: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchSummary {
    pub run_id: String,
    pub started_at: String,
    pub finished_at: String,
    pub provider: String,
    pub model: String,
    pub succeeded: usize,
    pub skipped: usize,
    pub failed: usize,
    pub items: Vec<ItemSummary>,
}

/// Writes the pretty-printed summary; `extra` keys are merged last.
pub fn write_summary(
    path: &Path,
    summary: &BatchSummary,
    extra: Option<&Map<String, Value>>,
) -> IllustratorResult<()> {
    let encode = |err: serde_json::Error| IllustratorError::io("encoding run summary", err.into());
    let mut payload = match serde_json::to_value(summary).map_err(encode)? {
        Value::Object(map) => map,
        _ => Map::new(),
    };
    payload.insert("ts".to_string(), Value::String(now_utc_iso()));
    if let Some(extra) = extra {
        for (key, value) in extra {
            payload.insert(key.clone(), value.clone());
        }
    }

    if let Some(parent) = path.parent().filter(|dir| !dir.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(|err| IllustratorError::write(parent, err))?;
    }
    let text = serde_json::to_string_pretty(&Value::Object(payload)).map_err(encode)?;
    std::fs::write(path, text).map_err(|err| IllustratorError::write(path, err))
}
