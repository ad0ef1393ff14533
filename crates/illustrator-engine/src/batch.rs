use std::path::PathBuf;
use std::time::Duration;

use illustrator_contracts::batch::{BatchItem, BatchItemStatus, BatchPlan, BatchTally, ItemDecision, Pacer, ResumePolicy};
use illustrator_contracts::events::{EventKind, EventPayload, EventWriter};
use illustrator_contracts::prompt::PromptInput;
use illustrator_contracts::request::ReferenceImage;
use illustrator_contracts::{IllustratorError, IllustratorResult};
use serde_json::{json, Value};
use tracing::{info, warn};

use crate::adapter::ImageSource;
use crate::candidates::{CandidateGenerator, CandidateJob};

pub const DEFAULT_DELAY: Duration = Duration::from_millis(1000);

pub type Sleeper = Box<dyn Fn(Duration)>;

#[derive(Debug, Clone)]
pub struct BatchOptions {
    pub output_dir: PathBuf,
    pub policy: ResumePolicy,
    pub delay: Duration,
    pub candidates: CandidateGenerator,
    pub references: Vec<ReferenceImage>,
    pub model: Option<String>,
    pub size: Option<String>,
    /// Learned-pattern block, injected for cover items only.
    pub learnings: Option<String>,
}

impl BatchOptions {
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        Self {
            output_dir: output_dir.into(),
            policy: ResumePolicy::default(),
            delay: DEFAULT_DELAY,
            candidates: CandidateGenerator::default(),
            references: Vec::new(),
            model: None,
            size: None,
            learnings: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ItemOutcome {
    pub id: String,
    pub status: BatchItemStatus,
    pub files: Vec<PathBuf>,
    pub reason: Option<String>,
    pub regenerated: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchReport {
    pub outcomes: Vec<ItemOutcome>,
    pub tally: BatchTally,
}

/// Processes a plan strictly in order. Provider failures are recorded per
/// item and the loop moves on; I/O errors stop the run.
pub struct BatchRunner<'a> {
    source: &'a dyn ImageSource,
    options: BatchOptions,
    events: Option<&'a EventWriter>,
    sleep: Sleeper,
}

impl<'a> BatchRunner<'a> {
    pub fn new(source: &'a dyn ImageSource, options: BatchOptions) -> Self {
        Self {
            source,
            options,
            events: None,
            sleep: Box::new(std::thread::sleep),
        }
    }

    pub fn with_events(mut self, events: &'a EventWriter) -> Self {
        self.events = Some(events);
        self
    }

    pub fn with_sleeper(mut self, sleep: impl Fn(Duration) + 'static) -> Self {
        self.sleep = Box::new(sleep);
        self
    }

    pub fn run(&self, plan: &BatchPlan, mut on_item: impl FnMut(&ItemOutcome)) -> IllustratorResult<BatchReport> {
        let mut report = BatchReport::default();
        let mut pacer = Pacer::new(self.options.delay);
        self.emit(
            EventKind::BatchStarted,
            json!({
                "items": plan.items.len(),
                "candidates": self.options.candidates.count().get(),
                "output_dir": self.options.output_dir.display().to_string(),
                "provider": self.source.name(),
            }),
        )?;

        for item in &plan.items {
            let outcome = self.run_item(item, plan.style_block.as_deref(), &mut pacer)?;
            report.tally.record(outcome.status);
            on_item(&outcome);
            report.outcomes.push(outcome);
        }

        let tally = report.tally;
        info!(
            succeeded = tally.succeeded,
            skipped = tally.skipped,
            failed = tally.failed,
            "batch finished"
        );
        self.emit(
            EventKind::BatchFinished,
            json!({
                "succeeded": tally.succeeded,
                "skipped": tally.skipped,
                "failed": tally.failed,
            }),
        )?;
        Ok(report)
    }

    fn run_item(&self, item: &BatchItem, style: Option<&str>, pacer: &mut Pacer) -> IllustratorResult<ItemOutcome> {
        let output = self.options.output_dir.join(&item.filename);
        let paths = self.options.candidates.paths(&output);
        let exists = paths.iter().all(|path| path.exists());

        let regenerated = match self.options.policy.decide(&item.id, exists) {
            ItemDecision::Skip => {
                self.emit(EventKind::ItemSkipped, json!({ "id": item.id, "files": display_all(&paths) }))?;
                return Ok(ItemOutcome {
                    id: item.id.clone(),
                    status: BatchItemStatus::Skipped,
                    files: paths,
                    reason: Some("exists".to_string()),
                    regenerated: false,
                });
            }
            ItemDecision::Generate { regenerate } => regenerate,
        };

        if let Some(delay) = pacer.next_delay() {
            (self.sleep)(delay);
        }

        let job = CandidateJob {
            prompt: PromptInput {
                style,
                topic: item.topic.as_deref(),
                cover: item.cover,
                learnings: self.options.learnings.as_deref(),
                ..PromptInput::new(&item.content)
            },
            references: &self.options.references,
            model: self.options.model.as_deref(),
            size: self.options.size.as_deref(),
            output: &output,
        };
        let report = match self.options.candidates.run(self.source, &job) {
            Ok(report) => report,
            Err(err @ IllustratorError::Io { .. }) => return Err(err),
            Err(err) => {
                warn!(id = %item.id, error = %err, "item failed");
                let reason = err.short_reason();
                self.emit(EventKind::ItemFailed, json!({ "id": item.id, "error": reason }))?;
                return Ok(ItemOutcome {
                    id: item.id.clone(),
                    status: BatchItemStatus::Failed,
                    files: Vec::new(),
                    reason: Some(reason),
                    regenerated,
                });
            }
        };

        if !report.succeeded() {
            let reason = report.first_failure().unwrap_or("no image produced").to_string();
            self.emit(EventKind::ItemFailed, json!({ "id": item.id, "error": reason }))?;
            return Ok(ItemOutcome {
                id: item.id.clone(),
                status: BatchItemStatus::Failed,
                files: Vec::new(),
                reason: Some(reason),
                regenerated,
            });
        }

        let files: Vec<Value> = report
            .written
            .iter()
            .map(|written| {
                json!({
                    "path": written.path.display().to_string(),
                    "bytes": written.bytes,
                    "sha256": written.sha256,
                    "mime_type": written.mime_type,
                })
            })
            .collect();
        self.emit(
            EventKind::ItemGenerated,
            json!({
                "id": item.id,
                "regenerated": regenerated,
                "files": files,
                "failed_candidates": report.failures.len(),
            }),
        )?;
        Ok(ItemOutcome {
            id: item.id.clone(),
            status: BatchItemStatus::Succeeded,
            files: report.written.into_iter().map(|written| written.path).collect(),
            reason: report.failures.first().map(|failure| failure.reason.clone()),
            regenerated,
        })
    }

    fn emit(&self, kind: EventKind, payload: Value) -> IllustratorResult<()> {
        let Some(events) = self.events else {
            return Ok(());
        };
        let payload = match payload {
            Value::Object(map) => map,
            _ => EventPayload::new(),
        };
        events.emit(kind, payload).map(|_| ())
    }
}

fn display_all(paths: &[PathBuf]) -> Vec<String> {
    paths.iter().map(|path| path.display().to_string()).collect()
}

#[cfg(test)]
mod tests {
    use std::cell::{Cell, RefCell};
    use std::rc::Rc;

    use illustrator_contracts::batch::BatchConfig;
    use illustrator_contracts::request::{CandidateCount, GenerationRequest};

    use super::*;
    use crate::response::CanonicalImage;

    const PNG_SIGNATURE: [u8; 8] = [0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A];

    #[derive(Default)]
    struct CountingSource {
        calls: Cell<usize>,
        prompts: RefCell<Vec<String>>,
        fail_on: Option<usize>,
    }

    impl ImageSource for CountingSource {
        fn name(&self) -> &str {
            "counting"
        }

        fn generate(&self, request: &GenerationRequest) -> IllustratorResult<Option<CanonicalImage>> {
            let call = self.calls.get() + 1;
            self.calls.set(call);
            self.prompts.borrow_mut().push(request.prompt.text());
            if self.fail_on == Some(call) {
                return Ok(None);
            }
            Ok(Some(CanonicalImage {
                bytes: PNG_SIGNATURE.to_vec(),
                mime_type: "image/png".to_string(),
            }))
        }
    }

    fn plan() -> anyhow::Result<BatchPlan> {
        let raw = r#"{
            "style": "flat vector",
            "pictures": [
                {"id": 1, "topic": "Intro", "content": "Welcome slide"},
                {"id": 2, "topic": "YouTube thumbnail", "content": "Big bold title"},
                {"id": 3, "topic": "Outro", "content": "Thanks"}
            ]
        }"#;
        Ok(BatchConfig::parse(raw)?.plan("illustration")?)
    }

    fn recording_sleeper() -> (Rc<RefCell<Vec<Duration>>>, impl Fn(Duration) + 'static) {
        let slept = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&slept);
        (slept, move |delay| sink.borrow_mut().push(delay))
    }

    #[test]
    fn delay_applies_between_generated_items_only() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        std::fs::write(temp.path().join("illustration-02.png"), PNG_SIGNATURE)?;
        let source = CountingSource::default();
        let (slept, sleeper) = recording_sleeper();

        let runner = BatchRunner::new(&source, BatchOptions::new(temp.path())).with_sleeper(sleeper);
        let report = runner.run(&plan()?, |_| {})?;

        assert_eq!(source.calls.get(), 2);
        assert_eq!(*slept.borrow(), vec![DEFAULT_DELAY]);
        assert_eq!(
            report.tally,
            BatchTally {
                succeeded: 2,
                skipped: 1,
                failed: 0
            }
        );
        assert_eq!(report.outcomes[1].status, BatchItemStatus::Skipped);
        Ok(())
    }

    #[test]
    fn learnings_reach_cover_items_only() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let source = CountingSource::default();
        let mut options = BatchOptions::new(temp.path());
        options.delay = Duration::ZERO;
        options.learnings = Some("## Patterns Learned\n- giant numerals".to_string());

        BatchRunner::new(&source, options).run(&plan()?, |_| {})?;
        let prompts = source.prompts.borrow();
        assert!(!prompts[0].contains("giant numerals"));
        assert!(prompts[1].contains("giant numerals"));
        assert!(prompts[1].starts_with("Style: flat vector\n\nGenerate an image: Topic: YouTube thumbnail"));
        Ok(())
    }

    #[test]
    fn failures_are_recorded_and_the_loop_continues() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let source = CountingSource {
            fail_on: Some(1),
            ..CountingSource::default()
        };
        let mut options = BatchOptions::new(temp.path());
        options.delay = Duration::ZERO;
        let events = EventWriter::new(temp.path().join("events.jsonl"), "run-1");

        let mut seen = Vec::new();
        let report = BatchRunner::new(&source, options)
            .with_events(&events)
            .run(&plan()?, |outcome| seen.push(outcome.id.clone()))?;

        assert_eq!(seen, vec!["1", "2", "3"]);
        assert_eq!(report.outcomes[0].status, BatchItemStatus::Failed);
        assert_eq!(report.outcomes[0].reason.as_deref(), Some("counting returned no image"));
        assert!(report.tally.has_failures());
        assert!(!temp.path().join("illustration-01.png").exists());

        let log = std::fs::read_to_string(temp.path().join("events.jsonl"))?;
        let kinds: Vec<String> = log
            .lines()
            .filter_map(|line| serde_json::from_str::<Value>(line).ok())
            .filter_map(|row| row["type"].as_str().map(str::to_string))
            .collect();
        assert_eq!(
            kinds,
            vec!["batch_started", "item_failed", "item_generated", "item_generated", "batch_finished"]
        );
        Ok(())
    }

    #[test]
    fn multi_candidate_items_skip_only_when_all_candidates_exist() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        std::fs::write(temp.path().join("illustration-01-1.png"), PNG_SIGNATURE)?;
        let source = CountingSource::default();
        let mut options = BatchOptions::new(temp.path());
        options.delay = Duration::ZERO;
        options.candidates = CandidateGenerator::new(CandidateCount::new(2)?);

        let report = BatchRunner::new(&source, options).run(&plan()?, |_| {})?;
        assert_eq!(report.tally.skipped, 0);
        assert_eq!(source.calls.get(), 6);
        assert_eq!(report.outcomes[0].files.len(), 2);
        Ok(())
    }
}
