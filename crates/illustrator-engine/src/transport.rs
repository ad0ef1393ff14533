use std::fmt;
use std::time::Duration;

use illustrator_contracts::{ProviderError, ProviderErrorKind};
use reqwest::blocking::{Client as HttpClient, Response as HttpResponse};
use serde_json::Value;
use tracing::debug;

pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(180);
const API_KEY_HEADER: &str = "x-goog-api-key";

#[derive(Clone, PartialEq, Eq)]
pub enum Auth {
    Bearer(String),
    /// Sent as the `x-goog-api-key` header, never in the URL.
    ApiKey(String),
}

impl fmt::Debug for Auth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bearer(_) => f.write_str("Bearer(<redacted>)"),
            Self::ApiKey(_) => f.write_str("ApiKey(<redacted>)"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct JsonRequest {
    pub provider: &'static str,
    pub endpoint: String,
    pub auth: Auth,
    pub headers: Vec<(String, String)>,
    pub payload: Value,
}

/// One POST in, one JSON document out. Implementations never retry.
pub trait JsonTransport: Send + Sync {
    fn post_json(&self, request: &JsonRequest) -> Result<Value, ProviderError>;
}

#[derive(Debug, Clone, Default)]
pub struct HttpTransport {
    http: HttpClient,
}

impl HttpTransport {
    pub fn new() -> Self {
        Self {
            http: HttpClient::new(),
        }
    }
}

impl JsonTransport for HttpTransport {
    fn post_json(&self, request: &JsonRequest) -> Result<Value, ProviderError> {
        let mut builder = self
            .http
            .post(&request.endpoint)
            .timeout(REQUEST_TIMEOUT)
            .json(&request.payload);
        builder = match &request.auth {
            Auth::Bearer(token) => builder.bearer_auth(token),
            Auth::ApiKey(key) => builder.header(API_KEY_HEADER, key.as_str()),
        };
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        debug!(provider = request.provider, endpoint = %request.endpoint, "posting request");

        let response = builder
            .send()
            .map_err(|err| send_failure(request.provider, &request.endpoint, err))?;
        response_json_or_error(request.provider, response)
    }
}

/// Error text ends up in status lines, events and summaries, so it carries
/// neither the request URL nor its query string.
fn send_failure(provider: &'static str, endpoint: &str, err: reqwest::Error) -> ProviderError {
    let endpoint = endpoint.split('?').next().unwrap_or_default();
    let err = err.without_url();
    ProviderError::new(
        ProviderErrorKind::Transport,
        provider,
        format!("request failed ({endpoint}): {err}"),
    )
}

/// Parses the body as JSON regardless of status so an upstream `error` object
/// reaches the resolver. Non-2xx without one is a transport failure.
fn response_json_or_error(provider: &'static str, response: HttpResponse) -> Result<Value, ProviderError> {
    let status = response.status();
    let code = status.as_u16();
    let body = response.text().map_err(|err| {
        ProviderError::new(
            ProviderErrorKind::Transport,
            provider,
            format!("response body read failed: {err}"),
        )
    })?;
    classify_body(provider, code, status.is_success(), &body)
}

fn classify_body(provider: &'static str, code: u16, success: bool, body: &str) -> Result<Value, ProviderError> {
    match serde_json::from_str::<Value>(body) {
        Ok(parsed) if success => Ok(parsed),
        Ok(parsed) if parsed.get("error").is_some_and(|err| !err.is_null()) => Ok(parsed),
        Err(_) if success => Err(ProviderError::new(
            ProviderErrorKind::UnrecognizedResponse,
            provider,
            "response body is not JSON",
        )
        .with_snapshot(body)),
        _ => Err(http_failure(provider, code, body)),
    }
}

fn http_failure(provider: &'static str, code: u16, body: &str) -> ProviderError {
    ProviderError {
        code: Some(code.to_string()),
        ..ProviderError::new(
            ProviderErrorKind::Transport,
            provider,
            format!("request failed with HTTP {code}"),
        )
    }
    .with_snapshot(body)
}


#[cfg(test)]
pub(crate) mod testing {
    use std::collections::VecDeque;
    use std::sync::Mutex;

    use super::*;

    /// Replays canned responses in order and records every request.
    #[derive(Default)]
    pub(crate) struct ScriptedTransport {
        responses: Mutex<VecDeque<Result<Value, ProviderError>>>,
        pub(crate) requests: Mutex<Vec<JsonRequest>>,
    }

    impl ScriptedTransport {
        pub(crate) fn replying(responses: Vec<Value>) -> Self {
            Self {
                responses: Mutex::new(responses.into_iter().map(Ok).collect()),
                requests: Mutex::new(Vec::new()),
            }
        }

        pub(crate) fn recorded(&self) -> Vec<JsonRequest> {
            self.requests.lock().map(|rows| rows.clone()).unwrap_or_default()
        }
    }

    impl JsonTransport for ScriptedTransport {
        fn post_json(&self, request: &JsonRequest) -> Result<Value, ProviderError> {
            if let Ok(mut rows) = self.requests.lock() {
                rows.push(request.clone());
            }
            self.responses
                .lock()
                .ok()
                .and_then(|mut queue| queue.pop_front())
                .unwrap_or_else(|| {
                    Err(ProviderError::new(
                        ProviderErrorKind::Transport,
                        request.provider,
                        "no scripted response left",
                    ))
                })
        }
    }
}
