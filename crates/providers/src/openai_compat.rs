//! Client for OpenAI-compatible `/chat/completions` and `/embeddings`.
//!
//! Works against OpenAI, OpenRouter, Ollama, vLLM and any other service that
//! speaks the same wire format.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use reqwest::header::RETRY_AFTER;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use taskwright_core::error::ProviderError;
use taskwright_core::message::{Message, MessageToolCall, Role};
use taskwright_core::provider::{
    EmbeddingRequest, EmbeddingResponse, Provider, ProviderRequest, ProviderResponse, ToolDefinition, Usage,
};
use tracing::{debug, warn};

use crate::endpoint::Endpoint;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(120);
const DEFAULT_RETRY_AFTER_SECS: u64 = 5;

pub struct OpenAiCompatProvider {
    endpoint: Endpoint,
    client: reqwest::Client,
}

impl OpenAiCompatProvider {
    pub fn new(endpoint: Endpoint) -> Self {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .unwrap_or_else(|e| {
                warn!(error = %e, "Falling back to default HTTP client");
                reqwest::Client::new()
            });
        Self { endpoint, client }
    }

    async fn post<B, R>(&self, path: &str, body: &B) -> Result<R, ProviderError>
    where
        B: Serialize + ?Sized,
        R: DeserializeOwned,
    {
        let url = format!("{}/{path}", self.endpoint.base_url);
        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.endpoint.api_key)
            .header("X-Title", "Taskwright")
            .json(body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    ProviderError::Timeout(e.to_string())
                } else {
                    ProviderError::Network(e.to_string())
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let retry_after = response
                .headers()
                .get(RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.trim().parse().ok());
            let body = response.text().await.unwrap_or_default();
            warn!(provider = %self.endpoint.name, status = status.as_u16(), "Provider returned error");
            return Err(status_error(status, retry_after, body));
        }

        response.json().await.map_err(|e| ProviderError::ApiError {
            status_code: status.as_u16(),
            message: format!("Unreadable response from {path}: {e}"),
        })
    }
}

fn status_error(status: StatusCode, retry_after: Option<u64>, body: String) -> ProviderError {
    match status {
        StatusCode::TOO_MANY_REQUESTS => ProviderError::RateLimited {
            retry_after_secs: retry_after.unwrap_or(DEFAULT_RETRY_AFTER_SECS),
        },
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
            ProviderError::AuthenticationFailed("Invalid API key or insufficient permissions".into())
        }
        _ => ProviderError::ApiError {
            status_code: status.as_u16(),
            message: body,
        },
    }
}

#[async_trait]
impl Provider for OpenAiCompatProvider {
    fn name(&self) -> &str {
        &self.endpoint.name
    }

    async fn complete(&self, request: ProviderRequest) -> Result<ProviderResponse, ProviderError> {
        debug!(
            provider = %self.endpoint.name,
            model = %request.model,
            messages = request.messages.len(),
            tools = request.tools.len(),
            "Sending completion request"
        );
        let body = ChatBody::from(&request);
        let reply: ChatReply = self.post("chat/completions", &body).await?;
        reply.into_response()
    }

    async fn embed(&self, request: EmbeddingRequest) -> Result<EmbeddingResponse, ProviderError> {
        debug!(
            provider = %self.endpoint.name,
            model = %request.model,
            count = request.inputs.len(),
            "Sending embedding request"
        );
        let body = EmbedBody {
            model: &request.model,
            input: &request.inputs,
            encoding_format: "float",
        };
        let reply: EmbedReply = self.post("embeddings", &body).await?;
        Ok(reply.into_response())
    }
}

// --- Request bodies ---

#[derive(Serialize)]
struct ChatBody<'a> {
    model: &'a str,
    messages: Vec<WireMessage<'a>>,
    temperature: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tools: Vec<WireTool<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_choice: Option<&'static str>,
    stream: bool,
}

impl<'a> From<&'a ProviderRequest> for ChatBody<'a> {
    fn from(request: &'a ProviderRequest) -> Self {
        Self {
            model: &request.model,
            messages: request.messages.iter().map(WireMessage::from).collect(),
            temperature: request.temperature,
            max_tokens: request.max_tokens,
            tools: request.tools.iter().map(WireTool::from).collect(),
            tool_choice: (!request.tools.is_empty()).then_some("auto"),
            stream: false,
        }
    }
}

/// An outgoing message. `content` is always written, as `null` when absent.
#[derive(Serialize)]
struct WireMessage<'a> {
    role: &'static str,
    content: Option<&'a str>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tool_calls: Vec<WireCall<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_call_id: Option<&'a str>,
}

impl<'a> From<&'a Message> for WireMessage<'a> {
    fn from(message: &'a Message) -> Self {
        Self {
            role: match message.role {
                Role::System => "system",
                Role::User => "user",
                Role::Assistant => "assistant",
                Role::Tool => "tool",
            },
            content: message.content.as_deref(),
            tool_calls: message
                .tool_calls
                .iter()
                .map(|tc| WireCall {
                    id: &tc.id,
                    kind: "function",
                    function: WireFunction {
                        name: &tc.name,
                        arguments: &tc.arguments,
                    },
                })
                .collect(),
            tool_call_id: message.tool_call_id.as_deref(),
        }
    }
}

#[derive(Serialize)]
struct WireCall<'a> {
    id: &'a str,
    #[serde(rename = "type")]
    kind: &'static str,
    function: WireFunction<'a>,
}

#[derive(Serialize)]
struct WireFunction<'a> {
    name: &'a str,
    arguments: &'a str,
}

#[derive(Serialize)]
struct WireTool<'a> {
    #[serde(rename = "type")]
    kind: &'static str,
    function: &'a ToolDefinition,
}

impl<'a> From<&'a ToolDefinition> for WireTool<'a> {
    fn from(definition: &'a ToolDefinition) -> Self {
        Self {
            kind: "function",
            function: definition,
        }
    }
}

#[derive(Serialize)]
struct EmbedBody<'a> {
    model: &'a str,
    input: &'a [String],
    encoding_format: &'static str,
}

// --- Replies ---

#[derive(Deserialize)]
struct ChatReply {
    #[serde(default)]
    model: String,
    #[serde(default)]
    choices: Vec<ChatChoice>,
    usage: Option<Usage>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ReplyMessage,
}

#[derive(Deserialize)]
struct ReplyMessage {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    tool_calls: Option<Vec<ReplyCall>>,
}

#[derive(Deserialize)]
struct ReplyCall {
    id: String,
    function: ReplyFunction,
}

#[derive(Deserialize)]
struct ReplyFunction {
    name: String,
    #[serde(default)]
    arguments: String,
}

impl ChatReply {
    fn into_response(self) -> Result<ProviderResponse, ProviderError> {
        let choice = self.choices.into_iter().next().ok_or_else(|| ProviderError::ApiError {
            status_code: 200,
            message: "No choices in response".into(),
        })?;

        let calls = choice
            .message
            .tool_calls
            .unwrap_or_default()
            .into_iter()
            .map(|tc| MessageToolCall {
                id: tc.id,
                name: tc.function.name,
                arguments: tc.function.arguments,
            })
            .collect();

        Ok(ProviderResponse {
            message: Message::assistant_with_calls(choice.message.content, calls),
            usage: self.usage,
            model: self.model,
        })
    }
}

#[derive(Deserialize)]
struct EmbedReply {
    data: Vec<EmbedItem>,
    #[serde(default)]
    model: String,
    usage: Option<EmbedUsage>,
}

#[derive(Deserialize)]
struct EmbedItem {
    embedding: Vec<f32>,
    #[serde(default)]
    index: usize,
}

#[derive(Deserialize)]
struct EmbedUsage {
    prompt_tokens: u32,
    total_tokens: u32,
}

impl EmbedReply {
    fn into_response(mut self) -> EmbeddingResponse {
        self.data.sort_by_key(|item| item.index);
        EmbeddingResponse {
            embeddings: self.data.into_iter().map(|item| item.embedding).collect(),
            model: self.model,
            usage: self.usage.map(|u| Usage {
                prompt_tokens: u.prompt_tokens,
                completion_tokens: 0,
                total_tokens: u.total_tokens,
            }),
        }
    }
}
