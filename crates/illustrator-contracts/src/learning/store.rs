use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use tracing::{debug, info};

use super::document::{parse_document, render_document, LearningDocument};
use super::patterns::DistilledPatternSet;
use super::record::{render_entry, LearningRecord};
use crate::error::{IllustratorError, IllustratorResult};
use crate::providers::non_empty_env;

pub const LEARNINGS_FILE_ENV: &str = "ILLUSTRATOR_LEARNINGS_FILE";
pub const DEFAULT_LEARNINGS_RELATIVE: &str = ".illustrator/cover-learnings.md";

/// Handle to one learning document. Single writer; callers serialize access.
#[derive(Debug, Clone)]
pub struct LearningStore {
    path: PathBuf,
}

impl LearningStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// `$ILLUSTRATOR_LEARNINGS_FILE`, else `~/.illustrator/cover-learnings.md`.
    pub fn default_path() -> IllustratorResult<PathBuf> {
        if let Some(path) = non_empty_env(LEARNINGS_FILE_ENV) {
            return Ok(PathBuf::from(path));
        }
        dirs::home_dir()
            .map(|home| home.join(DEFAULT_LEARNINGS_RELATIVE))
            .ok_or_else(|| {
                IllustratorError::config(format!(
                    "cannot resolve a home directory for the learning document; set {LEARNINGS_FILE_ENV}"
                ))
            })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Raw document text, `None` when the file does not exist yet.
    pub fn raw(&self) -> IllustratorResult<Option<String>> {
        match std::fs::read_to_string(&self.path) {
            Ok(text) => Ok(Some(text)),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(None),
            Err(err) => Err(IllustratorError::read(&self.path, err)),
        }
    }

    /// Missing file loads as an empty document.
    pub fn load(&self) -> IllustratorResult<LearningDocument> {
        let document = self
            .raw()?
            .map(|text| parse_document(&text))
            .unwrap_or_default();
        debug!(
            path = %self.path.display(),
            recommended = document.patterns.recommended.len(),
            avoid = document.patterns.avoid.len(),
            "loaded learning document"
        );
        Ok(document)
    }

    /// Prompt appendix for cover generation, if any pattern has been learned.
    pub fn prompt_block(&self) -> IllustratorResult<Option<String>> {
        Ok(self.load()?.patterns.prompt_block())
    }

    /// Folds a record's patterns into the distilled sets; returns how many were new.
    pub fn merge(patterns: &mut DistilledPatternSet, record: &LearningRecord) -> usize {
        patterns.merge(&record.patterns, &record.avoid_patterns)
    }

    pub fn render(document: &LearningDocument, updated: &str, entry: Option<&str>) -> String {
        render_document(&document.patterns, updated, entry, &document.log_tail)
    }

    /// Load, merge, render with the record as newest log entry, write back.
    pub fn record(&self, record: &LearningRecord) -> IllustratorResult<LearningDocument> {
        let mut document = self.load()?;
        let added = Self::merge(&mut document.patterns, record);
        let entry = render_entry(record);
        let text = Self::render(&document, &record.date, Some(&entry));

        if let Some(parent) = self.path.parent().filter(|dir| !dir.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|err| IllustratorError::write(parent, err))?;
        }
        std::fs::write(&self.path, &text).map_err(|err| IllustratorError::write(&self.path, err))?;
        info!(
            path = %self.path.display(),
            source = %record.source,
            new_patterns = added,
            "recorded cover learning"
        );
        Ok(parse_document(&text))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(date: &str, source: &str, patterns: &[&str], avoid: &[&str]) -> LearningRecord {
        LearningRecord {
            date: date.to_string(),
            source: source.to_string(),
            patterns: patterns.iter().map(|p| p.to_string()).collect(),
            avoid_patterns: avoid.iter().map(|p| p.to_string()).collect(),
            ..LearningRecord::default()
        }
    }

    #[test]
    fn missing_document_is_empty_not_an_error() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let store = LearningStore::new(temp.path().join("nested/learnings.md"));
        assert!(store.raw()?.is_none());
        assert!(store.load()?.patterns.is_empty());
        assert_eq!(store.prompt_block()?, None);
        Ok(())
    }

    #[test]
    fn record_accumulates_patterns_and_log() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let store = LearningStore::new(temp.path().join("nested/learnings.md"));

        store.record(&record(
            "2026-03-01",
            "a.png",
            &["dark background with warm accent"],
            &[],
        ))?;
        let document = store.record(&record(
            "2026-03-02",
            "b.png",
            &["dark background with warm accent", "one huge number"],
            &["small text"],
        ))?;

        assert_eq!(
            document.patterns.recommended.iter().collect::<Vec<_>>(),
            ["dark background with warm accent", "one huge number"]
        );
        assert_eq!(document.last_updated.as_deref(), Some("2026-03-02"));
        let newest = document.log_tail.find("### 2026-03-02: b.png").expect("newest entry");
        let oldest = document.log_tail.find("### 2026-03-01: a.png").expect("oldest entry");
        assert!(newest < oldest);

        let block = store.prompt_block()?.expect("block");
        assert!(block.contains("- one huge number"));
        assert!(block.contains("### Patterns to Avoid\n- small text"));
        Ok(())
    }

    #[test]
    fn merging_same_record_twice_adds_nothing() {
        let mut patterns = DistilledPatternSet::default();
        let learned = record("2026-03-01", "a.png", &["dark background with warm accent"], &[]);
        assert_eq!(LearningStore::merge(&mut patterns, &learned), 1);
        assert_eq!(LearningStore::merge(&mut patterns, &learned), 0);
        assert_eq!(patterns.recommended.len(), 1);
    }
}
