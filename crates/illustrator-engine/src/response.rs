use std::sync::OnceLock;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use illustrator_contracts::{ProviderError, ProviderErrorKind};
use regex::Regex;
use serde_json::Value;

/// Normalized image produced by any backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CanonicalImage {
    pub bytes: Vec<u8>,
    pub mime_type: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImageOutcome {
    Found(CanonicalImage),
    /// The backend answered normally but included no image.
    NotFound,
}

impl ImageOutcome {
    pub fn into_image(self) -> Option<CanonicalImage> {
        match self {
            Self::Found(image) => Some(image),
            Self::NotFound => None,
        }
    }
}

fn data_uri_exact() -> Option<&'static Regex> {
    static PATTERN: OnceLock<Option<Regex>> = OnceLock::new();
    PATTERN
        .get_or_init(|| Regex::new(r"(?s)^data:image/([^;]+);base64,(.+)$").ok())
        .as_ref()
}

fn data_uri_embedded() -> Option<&'static Regex> {
    static PATTERN: OnceLock<Option<Regex>> = OnceLock::new();
    PATTERN
        .get_or_init(|| Regex::new(r"data:image/([A-Za-z0-9.+-]+);base64,([A-Za-z0-9+/=\r\n]+)").ok())
        .as_ref()
}

/// Resolves one response payload into an image, `NotFound`, or a typed error.
///
/// An `error` field short-circuits. Otherwise the locations are tried in
/// order: dedicated image list, data-URI content parts, inline binary
/// parts, then data URIs embedded in free text.
pub fn resolve_image_response(provider: &str, payload: &Value) -> Result<ImageOutcome, ProviderError> {
    if let Some(err) = upstream_error(provider, payload) {
        return Err(err);
    }

    let messages = chat_messages(payload);
    let parts = content_parts(payload, &messages);

    let image_lists = messages
        .iter()
        .copied()
        .chain(std::iter::once(payload))
        .filter_map(|holder| holder.get("images").and_then(Value::as_array))
        .flatten();
    for entry in image_lists {
        if let Some(uri) = image_url_field(entry) {
            if let Some(image) = decode_exact_data_uri(provider, uri)? {
                return Ok(ImageOutcome::Found(image));
            }
        }
    }

    for part in &parts {
        if let Some(uri) = image_url_field(part) {
            if let Some(image) = decode_exact_data_uri(provider, uri)? {
                return Ok(ImageOutcome::Found(image));
            }
        }
    }

    for part in &parts {
        let Some(inline) = part
            .get("inlineData")
            .or_else(|| part.get("inline_data"))
            .and_then(Value::as_object)
        else {
            continue;
        };
        let data = inline.get("data").and_then(Value::as_str).unwrap_or_default();
        if data.trim().is_empty() {
            continue;
        }
        let mime_type = inline
            .get("mimeType")
            .or_else(|| inline.get("mime_type"))
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|mime| !mime.is_empty())
            .unwrap_or("image/png");
        let bytes = decode_base64(provider, data)?;
        return Ok(ImageOutcome::Found(CanonicalImage {
            bytes,
            mime_type: mime_type.to_string(),
        }));
    }

    let texts = messages
        .iter()
        .filter_map(|message| message.get("content").and_then(Value::as_str))
        .chain(parts.iter().filter_map(|part| part.get("text").and_then(Value::as_str)));
    for text in texts {
        if let Some(captures) = data_uri_embedded().and_then(|pattern| pattern.captures(text)) {
            let format = captures.get(1).map(|m| m.as_str()).unwrap_or("png");
            let data = captures.get(2).map(|m| m.as_str()).unwrap_or_default();
            let bytes = decode_base64(provider, data)?;
            return Ok(ImageOutcome::Found(CanonicalImage {
                bytes,
                mime_type: format!("image/{format}"),
            }));
        }
    }

    if has_envelope(payload) {
        return Ok(ImageOutcome::NotFound);
    }
    Err(ProviderError::new(
        ProviderErrorKind::UnrecognizedResponse,
        provider,
        "response contains no recognizable image or completion envelope",
    )
    .with_snapshot(&payload.to_string()))
}

/// Explicit `error` field, or a prompt blocked before any candidate was made.
pub fn upstream_error(provider: &str, payload: &Value) -> Option<ProviderError> {
    match payload.get("error") {
        None | Some(Value::Null) => {}
        Some(Value::String(message)) => {
            return Some(ProviderError::upstream(provider, message.trim(), None));
        }
        Some(Value::Object(err)) => {
            let message = err
                .get("message")
                .and_then(Value::as_str)
                .map(str::to_string)
                .unwrap_or_else(|| Value::Object(err.clone()).to_string());
            let code = err.get("code").and_then(code_text).or_else(|| {
                err.get("status")
                    .and_then(Value::as_str)
                    .map(str::to_string)
            });
            return Some(ProviderError::upstream(provider, message, code));
        }
        Some(other) => {
            return Some(ProviderError::upstream(provider, other.to_string(), None));
        }
    }

    let no_candidates = payload
        .get("candidates")
        .and_then(Value::as_array)
        .map(|rows| rows.is_empty())
        .unwrap_or(true);
    let block_reason = payload
        .get("promptFeedback")
        .and_then(|feedback| feedback.get("blockReason"))
        .and_then(Value::as_str)
        .filter(|reason| !reason.trim().is_empty());
    match block_reason {
        Some(reason) if no_candidates => Some(ProviderError::upstream(
            provider,
            format!("prompt blocked: {reason}"),
            Some(reason.to_string()),
        )),
        _ => None,
    }
}

fn code_text(value: &Value) -> Option<String> {
    match value {
        Value::Number(number) => Some(number.to_string()),
        Value::String(text) if !text.trim().is_empty() => Some(text.trim().to_string()),
        _ => None,
    }
}

fn chat_messages(payload: &Value) -> Vec<&Value> {
    payload
        .get("choices")
        .and_then(Value::as_array)
        .into_iter()
        .flatten()
        .filter_map(|choice| choice.get("message").or_else(|| choice.get("delta")))
        .collect()
}

/// Chat content arrays plus `candidates[].content.parts`.
fn content_parts<'a>(payload: &'a Value, messages: &[&'a Value]) -> Vec<&'a Value> {
    let chat = messages
        .iter()
        .filter_map(|message| message.get("content").and_then(Value::as_array))
        .flatten();
    let native = payload
        .get("candidates")
        .and_then(Value::as_array)
        .into_iter()
        .flatten()
        .filter_map(|candidate| {
            candidate
                .get("content")
                .and_then(|content| content.get("parts"))
                .and_then(Value::as_array)
        })
        .flatten();
    chat.chain(native).collect()
}

/// `"data:..."`, `{"image_url": "..."}`, `{"image_url": {"url": "..."}}` or `{"url": "..."}`.
fn image_url_field(value: &Value) -> Option<&str> {
    match value {
        Value::String(raw) => Some(raw.as_str()),
        Value::Object(obj) => obj
            .get("image_url")
            .and_then(|inner| match inner {
                Value::String(raw) => Some(raw.as_str()),
                Value::Object(nested) => nested.get("url").and_then(Value::as_str),
                _ => None,
            })
            .or_else(|| obj.get("url").and_then(Value::as_str)),
        _ => None,
    }
}

fn decode_exact_data_uri(provider: &str, raw: &str) -> Result<Option<CanonicalImage>, ProviderError> {
    let Some(captures) = data_uri_exact().and_then(|pattern| pattern.captures(raw.trim())) else {
        return Ok(None);
    };
    let format = captures.get(1).map(|m| m.as_str().trim()).unwrap_or("png");
    let data = captures.get(2).map(|m| m.as_str()).unwrap_or_default();
    let bytes = decode_base64(provider, data)?;
    Ok(Some(CanonicalImage {
        bytes,
        mime_type: format!("image/{format}"),
    }))
}

fn decode_base64(provider: &str, data: &str) -> Result<Vec<u8>, ProviderError> {
    let compact: String = data.chars().filter(|ch| !ch.is_whitespace()).collect();
    let bytes = BASE64.decode(compact.as_bytes()).map_err(|err| {
        ProviderError::new(
            ProviderErrorKind::MalformedImage,
            provider,
            format!("image base64 decode failed: {err}"),
        )
    })?;
    if bytes.is_empty() {
        return Err(ProviderError::new(
            ProviderErrorKind::MalformedImage,
            provider,
            "image payload decoded to zero bytes",
        ));
    }
    Ok(bytes)
}

fn has_envelope(payload: &Value) -> bool {
    ["choices", "candidates"].iter().any(|key| {
        payload
            .get(*key)
            .and_then(Value::as_array)
            .is_some_and(|rows| !rows.is_empty())
    })
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    const PNG_B64: &str = "iVBORw0KGgo=";

    fn found(outcome: ImageOutcome) -> CanonicalImage {
        match outcome {
            ImageOutcome::Found(image) => image,
            ImageOutcome::NotFound => panic!("expected an image"),
        }
    }

    #[test]
    fn family_a_image_list_data_uri() -> anyhow::Result<()> {
        let payload = json!({
            "choices": [{"message": {
                "content": "Here you go",
                "images": [{"type": "image_url", "image_url": {"url": format!("data:image/png;base64,{PNG_B64}")}}]
            }}]
        });
        let image = found(resolve_image_response("openrouter", &payload)?);
        assert_eq!(image.mime_type, "image/png");
        assert_eq!(image.bytes[..4], [0x89, b'P', b'N', b'G']);
        Ok(())
    }

    #[test]
    fn family_a_content_part_data_uri() -> anyhow::Result<()> {
        let payload = json!({
            "choices": [{"message": {"content": [
                {"type": "text", "text": "done"},
                {"type": "image_url", "image_url": format!("data:image/webp;base64,{PNG_B64}")}
            ]}}]
        });
        assert_eq!(
            found(resolve_image_response("openrouter", &payload)?).mime_type,
            "image/webp"
        );
        Ok(())
    }

    #[test]
    fn family_b_inline_binary_part() -> anyhow::Result<()> {
        let payload = json!({
            "candidates": [{"content": {"parts": [
                {"text": "An illustration"},
                {"inline_data": {"mime_type": "image/jpeg", "data": PNG_B64}}
            ]}}]
        });
        let image = found(resolve_image_response("gemini", &payload)?);
        assert_eq!(image.mime_type, "image/jpeg");
        Ok(())
    }

    #[test]
    fn data_uri_embedded_in_prose() -> anyhow::Result<()> {
        let payload = json!({
            "choices": [{"message": {"content": format!("![image](data:image/png;base64,{PNG_B64}) enjoy")}}]
        });
        let image = found(resolve_image_response("openrouter", &payload)?);
        assert_eq!(image.bytes.len(), 8);
        Ok(())
    }

    #[test]
    fn prose_error_field_is_upstream_error() {
        let payload = json!({"error": {"message": "API key not valid", "code": 400}});
        let err = resolve_image_response("gemini", &payload).expect_err("upstream error");
        assert_eq!(err.kind, ProviderErrorKind::Upstream);
        assert_eq!(err.message, "API key not valid");
        assert_eq!(err.code.as_deref(), Some("400"));

        let bare = json!({"error": "rate limited", "choices": [{"message": {"content": "x"}}]});
        let err = resolve_image_response("openrouter", &bare).expect_err("upstream error");
        assert_eq!(err.kind, ProviderErrorKind::Upstream);
        assert_eq!(err.code, None);
    }

    #[test]
    fn error_wins_even_when_an_image_is_present() {
        let payload = json!({
            "error": {"message": "partial failure", "code": "RESOURCE_EXHAUSTED"},
            "candidates": [{"content": {"parts": [{"inlineData": {"mimeType": "image/png", "data": PNG_B64}}]}}]
        });
        let err = resolve_image_response("gemini", &payload).expect_err("upstream error");
        assert_eq!(err.code.as_deref(), Some("RESOURCE_EXHAUSTED"));
    }

    #[test]
    fn null_error_is_ignored_and_text_only_reply_is_not_found() -> anyhow::Result<()> {
        let payload = json!({
            "error": null,
            "candidates": [{"content": {"parts": [{"text": "I can only describe it."}]}}]
        });
        assert_eq!(resolve_image_response("gemini", &payload)?, ImageOutcome::NotFound);
        Ok(())
    }

    #[test]
    fn blocked_prompt_is_upstream_error() {
        let payload = json!({"promptFeedback": {"blockReason": "SAFETY"}});
        let err = resolve_image_response("gemini", &payload).expect_err("blocked");
        assert_eq!(err.kind, ProviderErrorKind::Upstream);
        assert_eq!(err.code.as_deref(), Some("SAFETY"));
    }

    #[test]
    fn unknown_shape_keeps_bounded_snapshot() {
        let payload = json!({"result": "x".repeat(2000)});
        let err = resolve_image_response("openrouter", &payload).expect_err("unrecognized");
        assert_eq!(err.kind, ProviderErrorKind::UnrecognizedResponse);
        let snapshot = err.snapshot.unwrap_or_default();
        assert!(snapshot.chars().count() <= ProviderError::SNAPSHOT_MAX_CHARS + 1);
    }

    #[test]
    fn undecodable_payload_is_malformed() {
        let payload = json!({
            "candidates": [{"content": {"parts": [{"inlineData": {"mimeType": "image/png", "data": "!!!"}}]}}]
        });
        let err = resolve_image_response("gemini", &payload).expect_err("malformed");
        assert_eq!(err.kind, ProviderErrorKind::MalformedImage);
    }
}
