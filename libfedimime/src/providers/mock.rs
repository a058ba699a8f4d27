//! Scripted chat backend for tests
//!
//! Replies are consumed front to back; once the script runs dry the
//! fallback reply (if any) answers every further call. Like the mock
//! status source, this compiles for all builds so integration tests can
//! select it by registry name.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use super::{parse_structured, ChatRequest, StructuredPost};
use crate::error::{ProviderError, Result};

/// One scripted outcome for a [`MockChat`] invocation.
#[derive(Debug, Clone)]
pub enum MockReply {
    /// Succeed with this completion text.
    Text(String),
    /// Fail with an API error.
    ApiError(String),
    /// Fail as a recitation refusal.
    Recitation,
}

/// Clones share the script and the request log, so a test can keep a
/// handle on a mock it has moved into a backend.
#[derive(Debug, Clone)]
pub struct MockChat {
    name: String,
    script: Arc<Mutex<VecDeque<MockReply>>>,
    fallback: Option<MockReply>,
    requests: Arc<Mutex<Vec<ChatRequest>>>,
}

impl MockChat {
    /// A backend that answers every call with a canned completion.
    pub fn new() -> Self {
        Self::replying("mock reply")
    }

    /// Always succeed with `text`.
    pub fn replying(text: &str) -> Self {
        Self {
            name: "mock".to_string(),
            script: Arc::new(Mutex::new(VecDeque::new())),
            fallback: Some(MockReply::Text(text.to_string())),
            requests: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Play `replies` in order; calls past the end fail.
    pub fn scripted(replies: Vec<MockReply>) -> Self {
        Self {
            name: "mock".to_string(),
            script: Arc::new(Mutex::new(replies.into())),
            fallback: None,
            requests: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Always fail with an API error.
    pub fn failing(message: &str) -> Self {
        Self {
            name: "mock".to_string(),
            script: Arc::new(Mutex::new(VecDeque::new())),
            fallback: Some(MockReply::ApiError(message.to_string())),
            requests: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Relabel this backend, so tests can tell two mocks apart.
    pub fn named(mut self, name: &str) -> Self {
        self.name = name.to_string();
        self
    }

    pub fn provider(&self) -> &str {
        &self.name
    }

    /// Every request seen so far, in call order.
    pub fn requests(&self) -> Vec<ChatRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn calls(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    pub async fn invoke(&self, request: &ChatRequest) -> Result<String> {
        self.requests.lock().unwrap().push(request.clone());

        match self.next_reply() {
            MockReply::Text(text) => Ok(text),
            MockReply::ApiError(message) => Err(ProviderError::Api {
                provider: self.name.clone(),
                message,
            }
            .into()),
            MockReply::Recitation => Err(ProviderError::Recitation {
                provider: self.name.clone(),
            }
            .into()),
        }
    }

    pub async fn invoke_structured(&self, request: &ChatRequest) -> Result<StructuredPost> {
        let text = self.invoke(request).await?;
        parse_structured(&self.name, &text)
    }

    fn next_reply(&self) -> MockReply {
        if let Some(reply) = self.script.lock().unwrap().pop_front() {
            return reply;
        }
        match &self.fallback {
            Some(reply) => reply.clone(),
            None => MockReply::ApiError("script exhausted".to_string()),
        }
    }
}

impl Default for MockChat {
    fn default() -> Self {
        Self::new()
    }
}
