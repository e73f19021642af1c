//! Scripted providers for tests.
//!
//! Enabled for this crate's own tests and, via the `testing` feature, for
//! the dev-dependencies of downstream crates.

use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::Mutex;

use crate::error::ProviderError;
use crate::message::Message;
use crate::provider::{Provider, ProviderRequest, ProviderResponse, Usage};

/// A provider that returns a queue of scripted replies in order.
///
/// Panics when the queue runs dry unless a fallback reply was set.
pub struct ScriptedProvider {
    replies: Mutex<VecDeque<Result<String, ProviderError>>>,
    fallback: Option<String>,
    requests: Mutex<Vec<ProviderRequest>>,
}

impl ScriptedProvider {
    pub fn new(replies: Vec<Result<String, ProviderError>>) -> Self {
        Self {
            replies: Mutex::new(replies.into()),
            fallback: None,
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Every reply succeeds with the given texts.
    pub fn texts(replies: &[&str]) -> Self {
        Self::new(replies.iter().map(|r| Ok(r.to_string())).collect())
    }

    /// Answer every call with the same text.
    pub fn always(text: &str) -> Self {
        Self::new(Vec::new()).with_fallback(text)
    }

    /// Reply used once the scripted queue is exhausted.
    pub fn with_fallback(mut self, text: &str) -> Self {
        self.fallback = Some(text.to_string());
        self
    }

    pub fn call_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    /// Snapshot of every request received so far.
    pub fn requests(&self) -> Vec<ProviderRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl Provider for ScriptedProvider {
    fn name(&self) -> &str {
        "scripted_mock"
    }

    async fn complete(&self, request: ProviderRequest) -> Result<ProviderResponse, ProviderError> {
        let call = {
            let mut requests = self.requests.lock().unwrap();
            requests.push(request.clone());
            requests.len()
        };

        let next = self.replies.lock().unwrap().pop_front();
        let reply = match (next, &self.fallback) {
            (Some(reply), _) => reply,
            (None, Some(text)) => Ok(text.clone()),
            (None, None) => panic!("ScriptedProvider: no more replies (call #{call})"),
        };
        reply.map(|text| text_response(&text, &request.model))
    }
}

type Responder = dyn Fn(&ProviderRequest) -> Result<String, ProviderError> + Send + Sync;

/// A provider that answers each request by inspecting it.
///
/// Useful when call order is incidental and the reply depends on which
/// role is speaking.
pub struct RuleProvider {
    responder: Box<Responder>,
    requests: Mutex<Vec<ProviderRequest>>,
}

impl RuleProvider {
    pub fn new(
        responder: impl Fn(&ProviderRequest) -> Result<String, ProviderError>
        + Send
        + Sync
        + 'static,
    ) -> Self {
        Self {
            responder: Box::new(responder),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn call_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    pub fn requests(&self) -> Vec<ProviderRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl Provider for RuleProvider {
    fn name(&self) -> &str {
        "rule_mock"
    }

    async fn complete(&self, request: ProviderRequest) -> Result<ProviderResponse, ProviderError> {
        self.requests.lock().unwrap().push(request.clone());
        (self.responder)(&request).map(|text| text_response(&text, &request.model))
    }
}

/// System prompt of a request (first message), or "".
pub fn system_prompt_of(request: &ProviderRequest) -> &str {
    request
        .messages
        .first()
        .map(|m| m.content.as_str())
        .unwrap_or_default()
}

/// User input of a request (last message), or "".
pub fn user_input_of(request: &ProviderRequest) -> &str {
    request
        .messages
        .last()
        .map(|m| m.content.as_str())
        .unwrap_or_default()
}

/// Create a simple text response.
pub fn text_response(text: &str, model: &str) -> ProviderResponse {
    ProviderResponse {
        message: Message::assistant(text),
        usage: Some(Usage {
            prompt_tokens: 10,
            completion_tokens: 5,
            total_tokens: 15,
        }),
        model: model.to_string(),
    }
}

/// A generic completion-service failure.
pub fn service_error(message: &str) -> ProviderError {
    ProviderError::ApiError {
        status_code: 500,
        message: message.to_string(),
    }
}
