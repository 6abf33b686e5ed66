//! Test doubles shared by the in-crate test modules.

use std::sync::Mutex;

use async_trait::async_trait;

use crate::backend::{BackendError, CompletionBackend, CompletionRequest};

/// Backend that answers every request with canned text, or fails.
#[derive(Debug)]
pub(crate) struct StubBackend {
    reply: Option<String>,
    requests: Mutex<Vec<CompletionRequest>>,
}

impl StubBackend {
    pub(crate) fn replying(reply: impl Into<String>) -> Self {
        Self {
            reply: Some(reply.into()),
            requests: Mutex::default(),
        }
    }

    pub(crate) fn failing() -> Self {
        Self {
            reply: None,
            requests: Mutex::default(),
        }
    }

    pub(crate) fn requests(&self) -> Vec<CompletionRequest> {
        self.requests.lock().map(|r| r.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl CompletionBackend for StubBackend {
    fn name(&self) -> &'static str {
        "stub"
    }

    async fn complete(&self, request: CompletionRequest) -> Result<String, BackendError> {
        if let Ok(mut requests) = self.requests.lock() {
            requests.push(request);
        }
        self.reply.clone().ok_or(BackendError::Status {
            status: 503,
            body: "service unavailable".to_owned(),
        })
    }
}
