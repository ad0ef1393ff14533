use std::fmt;
use std::path::Path;

use thiserror::Error;

pub type IllustratorResult<T> = Result<T, IllustratorError>;

/// Failure taxonomy shared by every crate in the workspace.
///
/// `Config` and `Credential` are fatal at startup; `Provider` is recorded per
/// batch item and never aborts the loop; `Io` is surfaced immediately.
#[derive(Debug, Error)]
pub enum IllustratorError {
    #[error("config error: {0}")]
    Config(String),
    #[error("missing credential {credential} (required for {purpose})")]
    Credential { credential: String, purpose: String },
    #[error(transparent)]
    Provider(#[from] ProviderError),
    #[error("I/O error while {context}: {source}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },
}

impl IllustratorError {
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    pub fn credential(credential: impl Into<String>, purpose: impl Into<String>) -> Self {
        Self::Credential {
            credential: credential.into(),
            purpose: purpose.into(),
        }
    }

    pub fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            context: context.into(),
            source,
        }
    }

    pub fn read(path: &Path, source: std::io::Error) -> Self {
        Self::io(format!("reading {}", path.display()), source)
    }

    pub fn write(path: &Path, source: std::io::Error) -> Self {
        Self::io(format!("writing {}", path.display()), source)
    }

    /// Short single-line reason for per-item status lines.
    pub fn short_reason(&self) -> String {
        match self {
            Self::Provider(err) => match err.code.as_deref() {
                Some(code) => format!("{} ({code})", err.message),
                None => err.message.clone(),
            },
            other => other.to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderErrorKind {
    /// The backend answered with an explicit `error` object.
    Upstream,
    /// A successful response carried no image shape we know how to read.
    UnrecognizedResponse,
    /// The request never produced a parseable response.
    Transport,
    /// An image payload was found but its bytes are unusable.
    MalformedImage,
}

impl fmt::Display for ProviderErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Upstream => "upstream error",
            Self::UnrecognizedResponse => "unrecognized response",
            Self::Transport => "transport error",
            Self::MalformedImage => "malformed image",
        };
        f.write_str(label)
    }
}

#[derive(Debug, Clone, Error)]
#[error("{provider} {kind}: {message}")]
pub struct ProviderError {
    pub kind: ProviderErrorKind,
    pub provider: String,
    pub message: String,
    pub code: Option<String>,
    /// Truncated raw response kept for diagnostics.
    pub snapshot: Option<String>,
}

impl ProviderError {
    pub const SNAPSHOT_MAX_CHARS: usize = 512;

    pub fn new(kind: ProviderErrorKind, provider: &str, message: impl Into<String>) -> Self {
        Self {
            kind,
            provider: provider.to_string(),
            message: message.into(),
            code: None,
            snapshot: None,
        }
    }

    pub fn upstream(provider: &str, message: impl Into<String>, code: Option<String>) -> Self {
        Self {
            code,
            ..Self::new(ProviderErrorKind::Upstream, provider, message)
        }
    }

    pub fn with_snapshot(mut self, raw: &str) -> Self {
        self.snapshot = Some(truncate_text(raw, Self::SNAPSHOT_MAX_CHARS));
        self
    }
}

pub fn truncate_text(value: &str, max_chars: usize) -> String {
    if value.chars().count() <= max_chars {
        return value.to_string();
    }
    value.chars().take(max_chars).collect::<String>() + "…"
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn snapshot_is_bounded() {
        let raw = "x".repeat(2000);
        let err = ProviderError::new(ProviderErrorKind::UnrecognizedResponse, "gemini", "no image")
            .with_snapshot(&raw);
        let snapshot = err.snapshot.unwrap_or_default();
        assert_eq!(snapshot.chars().count(), ProviderError::SNAPSHOT_MAX_CHARS + 1);
        assert!(snapshot.ends_with('…'));
    }

    #[test]
    fn short_reason_includes_upstream_code() {
        let err: IllustratorError =
            ProviderError::upstream("gemini", "quota exceeded", Some("429".to_string())).into();
        assert_eq!(err.short_reason(), "quota exceeded (429)");
        assert_eq!(
            err.to_string(),
            "gemini upstream error: quota exceeded"
        );
    }

    #[test]
    fn credential_error_names_missing_key() {
        let err = IllustratorError::credential("GEMINI_API_KEY", "reference image conditioning");
        assert!(err.to_string().contains("GEMINI_API_KEY"));
    }
}
