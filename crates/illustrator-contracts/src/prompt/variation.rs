use std::collections::BTreeMap;
use std::path::Path;

use tracing::{debug, warn};

/// Used whenever the template is missing, unreadable, or lacks a variant.
pub const BUILTIN_VARIATION_HINTS: [&str; 4] = [
    "High contrast and dramatic: deep shadows, saturated accent color, bold focal point.",
    "Minimal and professional: generous whitespace, restrained palette, clean geometry.",
    "Warm and approachable: soft lighting, rounded shapes, friendly hand-drawn details.",
    "Bold editorial: strong typography-like shapes, flat graphic blocks, magazine layout.",
];

const VARIANT_HEADING: &str = "## Variant ";

/// Per-candidate style hints, keyed by 1-based candidate index.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct VariationHints {
    hints: BTreeMap<usize, String>,
}

impl VariationHints {
    pub fn builtin() -> Self {
        Self::default()
    }

    /// Never fails: any problem with the template yields the built-in hints.
    pub fn load(path: &Path) -> Self {
        match std::fs::read_to_string(path) {
            Ok(raw) => {
                let parsed = Self::parse(&raw);
                if parsed.hints.is_empty() {
                    warn!(
                        path = %path.display(),
                        "variation template has no '## Variant <n>' sections; using built-in hints"
                    );
                }
                parsed
            }
            Err(err) => {
                debug!(path = %path.display(), error = %err, "variation template unavailable; using built-in hints");
                Self::builtin()
            }
        }
    }

    /// Reads `## Variant <n>` sections; each body runs to the next heading.
    pub fn parse(raw: &str) -> Self {
        let mut hints = BTreeMap::new();
        let mut current: Option<(usize, Vec<&str>)> = None;
        for line in raw.lines() {
            if line.starts_with('#') {
                if let Some((index, body)) = current.take() {
                    insert_hint(&mut hints, index, &body);
                }
                current = line
                    .strip_prefix(VARIANT_HEADING)
                    .and_then(|rest| rest.trim().parse::<usize>().ok())
                    .filter(|index| *index > 0)
                    .map(|index| (index, Vec::new()));
                continue;
            }
            if let Some((_, body)) = current.as_mut() {
                body.push(line);
            }
        }
        if let Some((index, body)) = current {
            insert_hint(&mut hints, index, &body);
        }
        Self { hints }
    }

    pub fn hint_for(&self, index: usize) -> &str {
        if let Some(hint) = self.hints.get(&index) {
            return hint;
        }
        let slot = index.saturating_sub(1) % BUILTIN_VARIATION_HINTS.len();
        BUILTIN_VARIATION_HINTS[slot]
    }

    pub fn is_builtin(&self) -> bool {
        self.hints.is_empty()
    }
}

fn insert_hint(hints: &mut BTreeMap<usize, String>, index: usize, body: &[&str]) {
    let text = body.join("\n").trim().to_string();
    if !text.is_empty() {
        hints.insert(index, text);
    }
}
