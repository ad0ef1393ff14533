#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use illustrator_contracts::request::GenerationRequest;
use illustrator_contracts::{IllustratorResult, ProviderError, ProviderErrorKind};
use illustrator_engine::transport::JsonRequest;
use illustrator_engine::{CanonicalImage, ImageSource, JsonTransport};
use serde_json::Value;

pub const PNG_SIGNATURE: [u8; 8] = [0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A];
pub const PNG_B64: &str = "iVBORw0KGgo=";

/// Image source that always succeeds and counts calls.
#[derive(Default)]
pub struct CountingSource {
    pub calls: AtomicUsize,
    pub prompts: Mutex<Vec<String>>,
}

impl CountingSource {
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl ImageSource for CountingSource {
    fn name(&self) -> &str {
        "counting"
    }

    fn generate(&self, request: &GenerationRequest) -> IllustratorResult<Option<CanonicalImage>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Ok(mut prompts) = self.prompts.lock() {
            prompts.push(request.prompt.text());
        }
        Ok(Some(CanonicalImage {
            bytes: PNG_SIGNATURE.to_vec(),
            mime_type: "image/png".to_string(),
        }))
    }
}

/// Transport that replays canned JSON and records requests.
#[derive(Default)]
pub struct FakeTransport {
    replies: Mutex<VecDeque<Value>>,
    pub requests: Mutex<Vec<JsonRequest>>,
}

impl FakeTransport {
    pub fn replying(replies: Vec<Value>) -> Self {
        Self {
            replies: Mutex::new(replies.into()),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn request_count(&self) -> usize {
        self.requests.lock().map(|rows| rows.len()).unwrap_or(0)
    }
}

impl JsonTransport for FakeTransport {
    fn post_json(&self, request: &JsonRequest) -> Result<Value, ProviderError> {
        if let Ok(mut rows) = self.requests.lock() {
            rows.push(request.clone());
        }
        self.replies
            .lock()
            .ok()
            .and_then(|mut queue| queue.pop_front())
            .ok_or_else(|| ProviderError::new(ProviderErrorKind::Transport, request.provider, "no reply queued"))
    }
}
