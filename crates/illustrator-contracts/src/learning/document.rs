use super::patterns::{bullets, DistilledPatternSet};

pub const LOG_MARKER: &str = "## Learning Log";

const TITLE: &str = "# Cover Image Learning Log";
const LAST_UPDATED: &str = "**Last updated**:";
const DISTILLED_HEADING: &str = "## Distilled Patterns (auto-summarized)";
const RECOMMENDED_HEADING: &str = "### Recommended Patterns";
const LEGACY_RECOMMENDED_HEADING: &str = "### High CTR Patterns";
const AVOID_HEADING: &str = "### Patterns to Avoid";
const PLACEHOLDER: &str = "(No records yet)";

/// Parsed learning document. Absent markers leave the matching field empty.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LearningDocument {
    pub patterns: DistilledPatternSet,
    pub last_updated: Option<String>,
    /// Everything after the log marker, trimmed of blank lines.
    pub log_tail: String,
}

/// Reads the distilled sections (only above the log marker) and keeps the log
/// verbatim. Only `- ` bullets count as patterns.
pub fn parse_document(raw: &str) -> LearningDocument {
    let (head, tail) = match find_marker_line(raw, LOG_MARKER) {
        Some((line_start, line_end)) => (&raw[..line_start], &raw[line_end..]),
        None => (raw, ""),
    };

    let mut document = LearningDocument {
        log_tail: tail.trim_matches(['\n', '\r']).trim_end().to_string(),
        ..LearningDocument::default()
    };
    let mut section: Option<Section> = None;
    for line in head.lines() {
        let trimmed = line.trim_end();
        if let Some(date) = trimmed.strip_prefix(LAST_UPDATED) {
            let date = date.trim();
            if !date.is_empty() {
                document.last_updated = Some(date.to_string());
            }
            continue;
        }
        if trimmed == RECOMMENDED_HEADING || trimmed == LEGACY_RECOMMENDED_HEADING {
            section = Some(Section::Recommended);
            continue;
        }
        if trimmed == AVOID_HEADING {
            section = Some(Section::Avoid);
            continue;
        }
        if ends_section(trimmed) {
            section = None;
            continue;
        }
        let Some(active) = section else {
            continue;
        };
        let Some(pattern) = trimmed.strip_prefix("- ").map(str::trim) else {
            continue;
        };
        if pattern.is_empty() || pattern == PLACEHOLDER {
            continue;
        }
        match active {
            Section::Recommended => document.patterns.merge([pattern], [""; 0]),
            Section::Avoid => document.patterns.merge([""; 0], [pattern]),
        };
    }
    document
}

/// Full document text. `entry` lands directly under the log marker, ahead of
/// the previously logged entries in `tail`.
pub fn render_document(
    patterns: &DistilledPatternSet,
    updated: &str,
    entry: Option<&str>,
    tail: &str,
) -> String {
    let mut out = format!("{TITLE}\n\n{LAST_UPDATED} {updated}\n\n---\n\n{DISTILLED_HEADING}\n\n");
    out.push_str(RECOMMENDED_HEADING);
    out.push('\n');
    out.push_str(&section_body(&patterns.recommended));
    out.push_str("\n\n");
    out.push_str(AVOID_HEADING);
    out.push('\n');
    out.push_str(&section_body(&patterns.avoid));
    out.push_str("\n\n---\n\n");
    out.push_str(LOG_MARKER);
    out.push('\n');

    let log: Vec<&str> = [entry.unwrap_or(""), tail]
        .into_iter()
        .map(str::trim)
        .filter(|chunk| !chunk.is_empty())
        .collect();
    if !log.is_empty() {
        out.push('\n');
        out.push_str(&log.join("\n\n"));
        out.push('\n');
    }
    out
}

#[derive(Debug, Clone, Copy)]
enum Section {
    Recommended,
    Avoid,
}

fn ends_section(line: &str) -> bool {
    line.starts_with("###") || line.starts_with("## ") || line.starts_with("---")
}

fn section_body(set: &indexmap::IndexSet<String>) -> String {
    if set.is_empty() {
        format!("- {PLACEHOLDER}")
    } else {
        bullets(set)
    }
}

/// Byte range of the first line equal to `marker`.
fn find_marker_line(raw: &str, marker: &str) -> Option<(usize, usize)> {
    let mut offset = 0;
    for line in raw.split_inclusive('\n') {
        if line.trim_end() == marker {
            return Some((offset, offset + line.len()));
        }
        offset += line.len();
    }
    None
}
