use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::{SecondsFormat, Utc};
use serde_json::{Map, Value};

use crate::error::{IllustratorError, IllustratorResult};

pub type EventPayload = Map<String, Value>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    BatchStarted,
    ItemSkipped,
    ItemGenerated,
    ItemFailed,
    BatchFinished,
    LearningRecorded,
}

impl EventKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::BatchStarted => "batch_started",
            Self::ItemSkipped => "item_skipped",
            Self::ItemGenerated => "item_generated",
            Self::ItemFailed => "item_failed",
            Self::BatchFinished => "batch_finished",
            Self::LearningRecorded => "learning_recorded",
        }
    }
}

/// Append-only writer for a run's `events.jsonl`.
///
/// - default fields are `type`, `run_id`, `ts`
/// - caller payload is merged last and can override defaults
/// - one compact JSON object per line
#[derive(Debug, Clone)]
pub struct EventWriter {
    path: PathBuf,
    run_id: String,
}

impl EventWriter {
    pub fn new(path: impl Into<PathBuf>, run_id: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            run_id: run_id.into(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    pub fn emit(&self, kind: EventKind, payload: EventPayload) -> IllustratorResult<Value> {
        let mut event = Map::new();
        event.insert("type".to_string(), Value::String(kind.as_str().to_string()));
        event.insert("run_id".to_string(), Value::String(self.run_id.clone()));
        event.insert("ts".to_string(), Value::String(now_utc_iso()));
        for (key, value) in payload {
            event.insert(key, value);
        }

        if let Some(parent) = self.path.parent().filter(|dir| !dir.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|err| IllustratorError::write(parent, err))?;
        }
        let line = serde_json::to_string(&event)
            .map_err(|err| IllustratorError::io("encoding event", err.into()))?;
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .map_err(|err| IllustratorError::write(&self.path, err))?;
        file.write_all(line.as_bytes())
            .and_then(|()| file.write_all(b"\n"))
            .map_err(|err| IllustratorError::write(&self.path, err))?;

        Ok(Value::Object(event))
    }
}

pub fn now_utc_iso() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Micros, false)
}
