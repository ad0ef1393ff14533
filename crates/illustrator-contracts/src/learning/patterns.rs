use indexmap::IndexSet;

/// Deduplicated recommended/avoid patterns in first-seen order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DistilledPatternSet {
    pub recommended: IndexSet<String>,
    pub avoid: IndexSet<String>,
}

impl DistilledPatternSet {
    pub fn is_empty(&self) -> bool {
        self.recommended.is_empty() && self.avoid.is_empty()
    }

    /// Appends unseen patterns by exact string equality and returns how many
    /// were new. Patterns are trimmed and blank ones dropped first, matching
    /// how the learning document reads its bullets back. Merging the same
    /// input twice is a no-op the second time.
    pub fn merge<P, A>(&mut self, patterns: P, avoids: A) -> usize
    where
        P: IntoIterator,
        P::Item: AsRef<str>,
        A: IntoIterator,
        A::Item: AsRef<str>,
    {
        insert_all(&mut self.recommended, patterns) + insert_all(&mut self.avoid, avoids)
    }

    /// Prompt appendix for cover generation; `None` until at least one
    /// recommended pattern exists.
    pub fn prompt_block(&self) -> Option<String> {
        if self.recommended.is_empty() {
            return None;
        }
        let mut block = String::from("## Patterns Learned from High-Performing Covers (for reference)\n\n");
        block.push_str("### Recommended Patterns\n");
        block.push_str(&bullets(&self.recommended));
        if !self.avoid.is_empty() {
            block.push_str("\n\n### Patterns to Avoid\n");
            block.push_str(&bullets(&self.avoid));
        }
        Some(block)
    }
}

fn insert_all<I>(set: &mut IndexSet<String>, items: I) -> usize
where
    I: IntoIterator,
    I::Item: AsRef<str>,
{
    let mut added = 0;
    for item in items {
        let item = item.as_ref().trim();
        if !item.is_empty() && set.insert(item.to_string()) {
            added += 1;
        }
    }
    added
}

pub(crate) fn bullets(set: &IndexSet<String>) -> String {
    set.iter()
        .map(|pattern| format!("- {pattern}"))
        .collect::<Vec<_>>()
        .join("\n")
}
