//! Scripted provider and message builders for tests.
//!
//! Enabled for this crate's own tests and, through the `test-util`
//! feature, for downstream integration tests.

use std::collections::VecDeque;
use std::sync::Mutex;

use taskwright_core::error::ProviderError;
use taskwright_core::message::{Message, MessageToolCall};
use taskwright_core::provider::{Provider, ProviderRequest, ProviderResponse, Usage};

/// A mock provider that returns a sequence of scripted responses.
///
/// Each call to `complete` pops the next scripted reply. Once the script
/// runs out every further call fails with an API error, which lets tests
/// exercise the provider-failure path.
pub struct SequentialMockProvider {
    replies: Mutex<VecDeque<Result<ProviderResponse, ProviderError>>>,
    requests: Mutex<Vec<ProviderRequest>>,
}

impl SequentialMockProvider {
    pub fn new(responses: Vec<ProviderResponse>) -> Self {
        Self::scripted(responses.into_iter().map(Ok).collect())
    }

    /// Script successes and failures in order.
    pub fn scripted(replies: Vec<Result<ProviderResponse, ProviderError>>) -> Self {
        Self {
            replies: Mutex::new(replies.into()),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Create a provider that returns text replies in order.
    pub fn texts(texts: &[&str]) -> Self {
        Self::new(texts.iter().map(|t| make_text_response(t)).collect())
    }

    /// How many completions have been requested.
    pub fn call_count(&self) -> usize {
        self.requests.lock().map(|r| r.len()).unwrap_or(0)
    }

    /// Every request received so far.
    pub fn requests(&self) -> Vec<ProviderRequest> {
        self.requests.lock().map(|r| r.clone()).unwrap_or_default()
    }
}

#[async_trait::async_trait]
impl Provider for SequentialMockProvider {
    fn name(&self) -> &str {
        "sequential_mock"
    }

    async fn complete(&self, request: ProviderRequest) -> Result<ProviderResponse, ProviderError> {
        let call = {
            let mut requests = self
                .requests
                .lock()
                .map_err(|_| ProviderError::Network("mock poisoned".into()))?;
            requests.push(request);
            requests.len()
        };

        let next = self
            .replies
            .lock()
            .map_err(|_| ProviderError::Network("mock poisoned".into()))?
            .pop_front();

        next.unwrap_or_else(|| {
            Err(ProviderError::ApiError {
                status_code: 500,
                message: format!("no scripted response for call #{call}"),
            })
        })
    }
}

fn usage() -> Option<Usage> {
    Some(Usage {
        prompt_tokens: 10,
        completion_tokens: 5,
        total_tokens: 15,
    })
}

/// Create a simple text response (no tool calls).
pub fn make_text_response(text: &str) -> ProviderResponse {
    ProviderResponse {
        message: Message::assistant(text),
        usage: usage(),
        model: "mock-model".into(),
    }
}

/// Create a response with tool calls and optional thought content.
pub fn make_tool_call_response(tool_calls: Vec<MessageToolCall>, thought: &str) -> ProviderResponse {
    ProviderResponse {
        message: Message::assistant_with_calls(Some(thought.to_string()), tool_calls),
        usage: usage(),
        model: "mock-model".into(),
    }
}

/// Helper to create a tool call. The id is derived from the tool name and `n`.
pub fn make_tool_call(name: &str, n: usize, args: serde_json::Value) -> MessageToolCall {
    MessageToolCall {
        id: format!("call_{name}_{n}"),
        name: name.to_string(),
        arguments: args.to_string(),
    }
}
