use std::env;
use std::fmt;

use crate::error::{IllustratorError, IllustratorResult};

pub const GEMINI_KEY_ENV: &str = "GEMINI_API_KEY";
pub const OPENROUTER_KEY_ENV: &str = "OPENROUTER_API_KEY";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ProviderKind {
    /// Native `generateContent`; images come back as inline binary parts.
    Gemini,
    /// OpenAI-style chat completions; images come back as data URIs.
    OpenRouter,
}

impl ProviderKind {
    pub fn name(self) -> &'static str {
        match self {
            Self::Gemini => "gemini",
            Self::OpenRouter => "openrouter",
        }
    }

    pub fn credential_env(self) -> &'static str {
        match self {
            Self::Gemini => GEMINI_KEY_ENV,
            Self::OpenRouter => OPENROUTER_KEY_ENV,
        }
    }

    /// Whether the backend accepts image parts alongside the prompt.
    pub fn supports_reference_images(self) -> bool {
        matches!(self, Self::Gemini)
    }

    pub fn parse(raw: &str) -> IllustratorResult<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "gemini" | "google" => Ok(Self::Gemini),
            "openrouter" => Ok(Self::OpenRouter),
            other => Err(IllustratorError::config(format!(
                "unknown provider '{other}' (expected gemini or openrouter)"
            ))),
        }
    }
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Static API keys, read once at startup. Blank values count as absent.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct Credentials {
    pub gemini: Option<String>,
    pub openrouter: Option<String>,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("gemini", &self.gemini.is_some())
            .field("openrouter", &self.openrouter.is_some())
            .finish()
    }
}

impl Credentials {
    pub fn from_env() -> Self {
        Self {
            gemini: non_empty_env(GEMINI_KEY_ENV),
            openrouter: non_empty_env(OPENROUTER_KEY_ENV),
        }
    }

    pub fn key_for(&self, kind: ProviderKind) -> Option<&str> {
        match kind {
            ProviderKind::Gemini => self.gemini.as_deref(),
            ProviderKind::OpenRouter => self.openrouter.as_deref(),
        }
    }

    pub fn has(&self, kind: ProviderKind) -> bool {
        self.key_for(kind).is_some()
    }

    pub fn require_any(&self) -> IllustratorResult<()> {
        if self.gemini.is_none() && self.openrouter.is_none() {
            return Err(IllustratorError::credential(
                format!("{GEMINI_KEY_ENV} or {OPENROUTER_KEY_ENV}"),
                "image generation",
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderSelection {
    pub kind: ProviderKind,
    pub fallback_reason: Option<String>,
}

/// Picks the backend for one request.
///
/// An explicit preference must have its own credential. Without one, the
/// single present credential decides and Gemini wins a tie. Reference images
/// force a capable backend, or fail naming the credential that would enable it.
pub fn select_provider(
    credentials: &Credentials,
    preferred: Option<ProviderKind>,
    needs_reference_images: bool,
) -> IllustratorResult<ProviderSelection> {
    let base = match preferred {
        Some(kind) => {
            if !credentials.has(kind) {
                return Err(IllustratorError::credential(
                    kind.credential_env(),
                    format!("the {kind} provider"),
                ));
            }
            kind
        }
        None => {
            credentials.require_any()?;
            if credentials.has(ProviderKind::Gemini) {
                ProviderKind::Gemini
            } else {
                ProviderKind::OpenRouter
            }
        }
    };

    if !needs_reference_images || base.supports_reference_images() {
        return Ok(ProviderSelection {
            kind: base,
            fallback_reason: None,
        });
    }

    let capable = ProviderKind::Gemini;
    if !credentials.has(capable) {
        return Err(IllustratorError::credential(
            capable.credential_env(),
            "reference image conditioning",
        ));
    }
    Ok(ProviderSelection {
        kind: capable,
        fallback_reason: Some(format!(
            "{base} cannot accept reference images; switched to {capable}."
        )),
    })
}

pub fn non_empty_env(key: &str) -> Option<String> {
    env::var(key)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

/// Reads an endpoint base from the environment, trimming any trailing `/`.
pub fn api_base_from_env(key: &str, default: &str) -> String {
    non_empty_env(key)
        .map(|value| value.trim_end_matches('/').to_string())
        .filter(|value| !value.is_empty())
        .unwrap_or_else(|| default.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn creds(gemini: bool, openrouter: bool) -> Credentials {
        Credentials {
            gemini: gemini.then(|| "g-key".to_string()),
            openrouter: openrouter.then(|| "o-key".to_string()),
        }
    }

    #[test]
    fn single_credential_determines_provider() -> anyhow::Result<()> {
        assert_eq!(
            select_provider(&creds(false, true), None, false)?.kind,
            ProviderKind::OpenRouter
        );
        assert_eq!(
            select_provider(&creds(true, false), None, false)?.kind,
            ProviderKind::Gemini
        );
        assert_eq!(
            select_provider(&creds(true, true), None, false)?.kind,
            ProviderKind::Gemini
        );
        Ok(())
    }

    #[test]
    fn no_credentials_is_fatal() {
        let err = select_provider(&creds(false, false), None, false);
        assert!(matches!(err, Err(IllustratorError::Credential { .. })));
    }

    #[test]
    fn explicit_provider_requires_its_own_key() {
        let err = select_provider(&creds(true, false), Some(ProviderKind::OpenRouter), false);
        match err {
            Err(IllustratorError::Credential { credential, .. }) => {
                assert_eq!(credential, OPENROUTER_KEY_ENV)
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn reference_images_switch_to_capable_backend_when_key_present() -> anyhow::Result<()> {
        let selection = select_provider(&creds(true, true), Some(ProviderKind::OpenRouter), true)?;
        assert_eq!(selection.kind, ProviderKind::Gemini);
        assert!(selection
            .fallback_reason
            .as_deref()
            .unwrap_or_default()
            .contains("switched to gemini"));
        Ok(())
    }

    #[test]
    fn reference_images_without_capable_key_fail_fast() {
        let err = select_provider(&creds(false, true), None, true);
        match err {
            Err(IllustratorError::Credential { credential, purpose }) => {
                assert_eq!(credential, GEMINI_KEY_ENV);
                assert_eq!(purpose, "reference image conditioning");
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn provider_names_parse() -> anyhow::Result<()> {
        assert_eq!(ProviderKind::parse("OpenRouter")?, ProviderKind::OpenRouter);
        assert_eq!(ProviderKind::parse("gemini")?, ProviderKind::Gemini);
        assert!(ProviderKind::parse("dall-e").is_err());
        Ok(())
    }
}
