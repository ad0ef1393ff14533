use serde_json::{Map, Value};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LearningElements {
    pub composition: String,
    pub color_scheme: String,
    pub text_usage: String,
    pub emotion: String,
    pub focus_point: String,
}

/// One analyzed image. Append-only once written to the log.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LearningRecord {
    pub date: String,
    pub source: String,
    pub elements: LearningElements,
    pub patterns: Vec<String>,
    pub avoid_patterns: Vec<String>,
}

impl LearningRecord {
    /// Maps the first JSON object embedded in a model reply. Missing or
    /// mistyped fields default to empty rather than rejecting the record.
    pub fn from_analysis_text(text: &str, date: &str, source: &str) -> Option<Self> {
        let fields = extract_json_object(text)?;
        Some(Self {
            date: date.to_string(),
            source: source.to_string(),
            elements: LearningElements {
                composition: string_field(&fields, "composition"),
                color_scheme: string_field(&fields, "colorScheme"),
                text_usage: string_field(&fields, "textUsage"),
                emotion: string_field(&fields, "emotion"),
                focus_point: string_field(&fields, "focusPoint"),
            },
            patterns: list_field(&fields, "patterns"),
            avoid_patterns: list_field(&fields, "avoidPatterns"),
        })
    }
}

/// Finds the first balanced `{...}` span that parses as a JSON object.
/// Braces inside string literals are ignored; prose around the object is
/// tolerated.
pub fn extract_json_object(text: &str) -> Option<Map<String, Value>> {
    let bytes = text.as_bytes();
    for (start, _) in text.match_indices('{') {
        let Some(end) = balanced_end(bytes, start) else {
            continue;
        };
        if let Ok(Value::Object(map)) = serde_json::from_str::<Value>(&text[start..=end]) {
            return Some(map);
        }
    }
    None
}

fn balanced_end(bytes: &[u8], start: usize) -> Option<usize> {
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;
    for (offset, &byte) in bytes[start..].iter().enumerate() {
        if in_string {
            match byte {
                _ if escaped => escaped = false,
                b'\\' => escaped = true,
                b'"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match byte {
            b'"' => in_string = true,
            b'{' => depth += 1,
            b'}' => {
                depth = depth.checked_sub(1)?;
                if depth == 0 {
                    return Some(start + offset);
                }
            }
            _ => {}
        }
    }
    None
}

fn string_field(fields: &Map<String, Value>, key: &str) -> String {
    fields
        .get(key)
        .and_then(Value::as_str)
        .map(|value| value.trim().to_string())
        .unwrap_or_default()
}

fn list_field(fields: &Map<String, Value>, key: &str) -> Vec<String> {
    match fields.get(key) {
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(Value::as_str)
            .map(str::trim)
            .filter(|item| !item.is_empty())
            .map(str::to_string)
            .collect(),
        Some(Value::String(single)) if !single.trim().is_empty() => vec![single.trim().to_string()],
        _ => Vec::new(),
    }
}

/// Markdown log entry, without surrounding blank lines.
pub fn render_entry(record: &LearningRecord) -> String {
    let elements = &record.elements;
    let mut lines = vec![
        format!("### {}: {}", record.date, record.source),
        format!("- **Composition**: {}", elements.composition),
        format!("- **Color scheme**: {}", elements.color_scheme),
        format!("- **Text usage**: {}", elements.text_usage),
        format!("- **Emotion**: {}", elements.emotion),
        format!("- **Focal point**: {}", elements.focus_point),
        "- **Patterns learned**:".to_string(),
    ];
    lines.extend(record.patterns.iter().map(|pattern| format!("  - {pattern}")));
    if !record.avoid_patterns.is_empty() {
        lines.push("- **To avoid**:".to_string());
        lines.extend(record.avoid_patterns.iter().map(|pattern| format!("  - {pattern}")));
    }
    lines.join("\n")
}
