use std::collections::BTreeSet;
use std::time::Duration;

use super::config::normalize_id;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchItemStatus {
    Pending,
    Skipped,
    Succeeded,
    Failed,
}

impl BatchItemStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Skipped => "skipped",
            Self::Succeeded => "succeeded",
            Self::Failed => "failed",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ItemDecision {
    Skip,
    Generate { regenerate: bool },
}

/// Decides which items a run touches. Existing outputs are skipped unless the
/// run is forced or the item id was named for regeneration.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResumePolicy {
    pub force: bool,
    pub regenerate_ids: BTreeSet<String>,
}

impl ResumePolicy {
    pub fn new(force: bool, regenerate: Option<&str>) -> Self {
        Self {
            force,
            regenerate_ids: regenerate.map(parse_regenerate_ids).unwrap_or_default(),
        }
    }

    pub fn decide(&self, id: &str, outputs_exist: bool) -> ItemDecision {
        let named = self.regenerate_ids.contains(&normalize_id(id));
        if named {
            ItemDecision::Generate { regenerate: true }
        } else if self.force {
            ItemDecision::Generate {
                regenerate: outputs_exist,
            }
        } else if outputs_exist {
            ItemDecision::Skip
        } else {
            ItemDecision::Generate { regenerate: false }
        }
    }
}

/// Parses `--regenerate 3,5,intro` into normalized ids.
pub fn parse_regenerate_ids(raw: &str) -> BTreeSet<String> {
    raw.split(',')
        .map(normalize_id)
        .filter(|id| !id.is_empty())
        .collect()
}

/// Spaces out generation calls. Skipped items never consume a delay and the
/// first generated item starts immediately.
#[derive(Debug, Clone, Copy)]
pub struct Pacer {
    delay: Duration,
    generated: usize,
}

impl Pacer {
    pub fn new(delay: Duration) -> Self {
        Self { delay, generated: 0 }
    }

    pub fn next_delay(&mut self) -> Option<Duration> {
        let wait = (self.generated > 0 && !self.delay.is_zero()).then_some(self.delay);
        self.generated += 1;
        wait
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatchTally {
    pub succeeded: usize,
    pub skipped: usize,
    pub failed: usize,
}

impl BatchTally {
    pub fn record(&mut self, status: BatchItemStatus) {
        match status {
            BatchItemStatus::Succeeded => self.succeeded += 1,
            BatchItemStatus::Skipped => self.skipped += 1,
            BatchItemStatus::Failed => self.failed += 1,
            BatchItemStatus::Pending => {}
        }
    }

    pub fn total(&self) -> usize {
        self.succeeded + self.skipped + self.failed
    }

    pub fn has_failures(&self) -> bool {
        self.failed > 0
    }
}
