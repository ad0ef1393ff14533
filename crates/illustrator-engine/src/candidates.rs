use std::path::{Path, PathBuf};

use illustrator_contracts::prompt::{compose, PromptInput, VariationHints};
use illustrator_contracts::request::{CandidateCount, GenerationRequest, ReferenceImage};
use illustrator_contracts::{IllustratorError, IllustratorResult};
use tracing::{debug, warn};

use crate::adapter::ImageSource;
use crate::output::{write_image, WrittenImage};

/// Output paths for `count` candidates: `base` itself for one, otherwise
/// `<stem>-<n><ext>` for n in 1..=count.
pub fn candidate_paths(base: &Path, count: CandidateCount) -> Vec<PathBuf> {
    if count.is_single() {
        return vec![base.to_path_buf()];
    }
    let stem = base
        .file_stem()
        .map(|value| value.to_string_lossy().into_owned())
        .unwrap_or_default();
    let ext = base
        .extension()
        .map(|value| format!(".{}", value.to_string_lossy()))
        .unwrap_or_default();
    (1..=count.get())
        .map(|index| base.with_file_name(format!("{stem}-{index}{ext}")))
        .collect()
}

/// Inputs shared by every candidate of one logical item.
#[derive(Debug, Clone, Copy)]
pub struct CandidateJob<'a> {
    pub prompt: PromptInput<'a>,
    pub references: &'a [ReferenceImage],
    pub model: Option<&'a str>,
    pub size: Option<&'a str>,
    pub output: &'a Path,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CandidateFailure {
    pub index: u8,
    pub path: PathBuf,
    pub reason: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CandidateReport {
    pub written: Vec<WrittenImage>,
    pub failures: Vec<CandidateFailure>,
}

impl CandidateReport {
    pub fn succeeded(&self) -> bool {
        !self.written.is_empty()
    }

    pub fn first_failure(&self) -> Option<&str> {
        self.failures.first().map(|failure| failure.reason.as_str())
    }
}

/// Issues one independent call per candidate. Selection among the written
/// files is left to a human.
#[derive(Debug, Clone, Default)]
pub struct CandidateGenerator {
    count: CandidateCount,
    hints: Option<VariationHints>,
}

impl CandidateGenerator {
    pub fn new(count: CandidateCount) -> Self {
        Self { count, hints: None }
    }

    /// Varied mode: candidate n gets variation hint n.
    pub fn varied(mut self, hints: VariationHints) -> Self {
        self.hints = Some(hints);
        self
    }

    pub fn count(&self) -> CandidateCount {
        self.count
    }

    pub fn paths(&self, output: &Path) -> Vec<PathBuf> {
        candidate_paths(output, self.count)
    }

    /// Provider failures and empty replies are recorded per candidate; I/O,
    /// credential and configuration errors abort the item.
    pub fn run(&self, source: &dyn ImageSource, job: &CandidateJob<'_>) -> IllustratorResult<CandidateReport> {
        let mut report = CandidateReport::default();
        for (offset, path) in self.paths(job.output).into_iter().enumerate() {
            let index = offset as u8 + 1;
            let variation = self.hints.as_ref().map(|hints| hints.hint_for(usize::from(index)));
            let prompt = compose(&PromptInput {
                reference_count: job.references.len(),
                variation,
                ..job.prompt
            });
            let request = GenerationRequest {
                prompt,
                model: job.model.map(str::to_string),
                size: job.size.map(str::to_string),
                reference_images: job.references.to_vec(),
                candidates: self.count,
            };

            let failure = match source.generate(&request) {
                Ok(Some(image)) => match write_image(&path, &image, source.name()) {
                    Ok(written) => {
                        debug!(candidate = index, path = %written.path.display(), "candidate written");
                        report.written.push(written);
                        continue;
                    }
                    Err(err @ IllustratorError::Provider(_)) => err.short_reason(),
                    Err(other) => return Err(other),
                },
                Ok(None) => format!("{} returned no image", source.name()),
                Err(err @ IllustratorError::Provider(_)) => err.short_reason(),
                Err(other) => return Err(other),
            };
            warn!(candidate = index, path = %path.display(), reason = %failure, "candidate failed");
            report.failures.push(CandidateFailure {
                index,
                path,
                reason: failure,
            });
        }
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;

    use super::*;
    use crate::response::CanonicalImage;
    use illustrator_contracts::ProviderError;

    const PNG_SIGNATURE: [u8; 8] = [0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A];

    #[derive(Default)]
    struct FakeSource {
        prompts: RefCell<Vec<String>>,
        replies: RefCell<Vec<IllustratorResult<Option<CanonicalImage>>>>,
    }

    impl FakeSource {
        fn always_png() -> Self {
            Self::default()
        }

        fn scripted(replies: Vec<IllustratorResult<Option<CanonicalImage>>>) -> Self {
            Self {
                prompts: RefCell::default(),
                replies: RefCell::new(replies.into_iter().rev().collect()),
            }
        }
    }

    impl ImageSource for FakeSource {
        fn name(&self) -> &str {
            "fake"
        }

        fn generate(&self, request: &GenerationRequest) -> IllustratorResult<Option<CanonicalImage>> {
            self.prompts.borrow_mut().push(request.prompt.text());
            self.replies.borrow_mut().pop().unwrap_or_else(|| {
                Ok(Some(CanonicalImage {
                    bytes: PNG_SIGNATURE.to_vec(),
                    mime_type: "image/png".to_string(),
                }))
            })
        }
    }

    fn job<'a>(output: &'a Path) -> CandidateJob<'a> {
        CandidateJob {
            prompt: PromptInput::new("A chart"),
            references: &[],
            model: None,
            size: None,
            output,
        }
    }

    #[test]
    fn fan_out_paths_are_suffixed_only_for_multiple_candidates() -> anyhow::Result<()> {
        let three = candidate_paths(Path::new("out.png"), CandidateCount::new(3)?);
        assert_eq!(
            three,
            vec![PathBuf::from("out-1.png"), PathBuf::from("out-2.png"), PathBuf::from("out-3.png")]
        );
        assert_eq!(
            candidate_paths(Path::new("out.png"), CandidateCount::ONE),
            vec![PathBuf::from("out.png")]
        );
        assert_eq!(
            candidate_paths(Path::new("dir/cover"), CandidateCount::new(2)?),
            vec![PathBuf::from("dir/cover-1"), PathBuf::from("dir/cover-2")]
        );
        Ok(())
    }

    #[test]
    fn writes_every_candidate_with_varied_hints() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let output = temp.path().join("out.png");
        let source = FakeSource::always_png();
        let generator = CandidateGenerator::new(CandidateCount::new(3)?).varied(VariationHints::builtin());

        let report = generator.run(&source, &job(&output))?;
        assert!(report.succeeded());
        assert_eq!(report.written.len(), 3);
        for name in ["out-1.png", "out-2.png", "out-3.png"] {
            assert!(temp.path().join(name).exists());
        }
        assert!(!output.exists());

        let prompts = source.prompts.borrow();
        assert_eq!(prompts.len(), 3);
        assert_ne!(prompts[0], prompts[1]);
        assert!(prompts.iter().all(|prompt| prompt.contains("Style variation for this candidate:")));
        Ok(())
    }

    #[test]
    fn failed_candidates_are_reported_not_fatal() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let output = temp.path().join("item.png");
        let source = FakeSource::scripted(vec![
            Err(ProviderError::upstream("fake", "quota exceeded", Some("429".to_string())).into()),
            Ok(None),
        ]);
        let generator = CandidateGenerator::new(CandidateCount::new(3)?);

        let report = generator.run(&source, &job(&output))?;
        assert_eq!(report.written.len(), 1);
        assert_eq!(report.failures.len(), 2);
        assert_eq!(report.first_failure(), Some("quota exceeded (429)"));
        assert_eq!(report.failures[1].reason, "fake returned no image");
        assert!(temp.path().join("item-3.png").exists());
        Ok(())
    }

    #[test]
    fn io_errors_abort_the_item() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let output = temp.path().join("x.png");
        let source = FakeSource::scripted(vec![Err(IllustratorError::io(
            "reading prompt",
            std::io::Error::other("disk gone"),
        ))]);
        let result = CandidateGenerator::new(CandidateCount::ONE).run(&source, &job(&output));
        assert!(matches!(result, Err(IllustratorError::Io { .. })));
        Ok(())
    }
}
