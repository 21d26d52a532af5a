//! Chat-completions wire types and the shared HTTP transport used by every provider client.

use crate::client_wrapper::{ClientError, Message, Role, TokenUsage};
use lazy_static::lazy_static;
use serde::{Deserialize, Serialize};
use std::sync::Mutex;
use std::time::Duration;

lazy_static! {
    /// One connection pool for the whole process.
    static ref SHARED_HTTP_CLIENT: reqwest::Client = reqwest::Client::builder()
        .pool_idle_timeout(Some(Duration::from_secs(90)))
        .pool_max_idle_per_host(10)
        .tcp_keepalive(Some(Duration::from_secs(60)))
        .timeout(Duration::from_secs(300))
        .build()
        .unwrap_or_else(|e| {
            log::warn!("falling back to default HTTP client: {}", e);
            reqwest::Client::new()
        });
}

pub fn get_shared_http_client() -> &'static reqwest::Client {
    &SHARED_HTTP_CLIENT
}

/// How the API key travels with the request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthStyle {
    /// `Authorization: Bearer <key>` (OpenAI, Anthropic and Gemini compatibility layers).
    Bearer(String),
    /// `api-key: <key>` (Azure OpenAI).
    ApiKeyHeader(String),
    /// No credentials (local Ollama).
    None,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl From<&Message> for ChatMessage {
    fn from(message: &Message) -> Self {
        let role = match message.role {
            Role::System => "system",
            Role::User => "user",
            Role::Assistant => "assistant",
        };
        Self {
            role: role.to_string(),
            content: message.content.to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ChatRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    pub messages: Vec<ChatMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<usize>,
}

impl ChatRequest {
    pub fn new(model: Option<&str>, messages: &[Message], max_tokens: Option<usize>) -> Self {
        Self {
            model: model.map(str::to_string),
            messages: messages.iter().map(ChatMessage::from).collect(),
            max_tokens,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct ChatResponse {
    pub choices: Vec<ChatChoice>,
    #[serde(default)]
    pub usage: Option<ChatUsage>,
}

#[derive(Debug, Deserialize)]
pub struct ChatChoice {
    pub message: ChatResponseMessage,
}

#[derive(Debug, Deserialize)]
pub struct ChatResponseMessage {
    #[serde(default)]
    pub content: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ChatUsage {
    #[serde(default)]
    pub prompt_tokens: usize,
    #[serde(default)]
    pub completion_tokens: usize,
    #[serde(default)]
    pub total_tokens: usize,
}

impl From<&ChatUsage> for TokenUsage {
    fn from(usage: &ChatUsage) -> Self {
        TokenUsage {
            input_tokens: usage.prompt_tokens,
            output_tokens: usage.completion_tokens,
            total_tokens: usage.total_tokens,
        }
    }
}

/// Pull the first choice's text out of a response body.
pub fn first_choice_content(response: &ChatResponse) -> Result<String, ClientError> {
    response
        .choices
        .first()
        .map(|choice| choice.message.content.clone().unwrap_or_default())
        .ok_or_else(|| "chat completion returned no choices".into())
}

/// Send a chat request, record its usage, and return the assistant's content.
pub async fn send_and_track(
    url: &str,
    auth: &AuthStyle,
    request: &ChatRequest,
    usage_slot: &Mutex<Option<TokenUsage>>,
) -> Result<String, ClientError> {
    let mut builder = get_shared_http_client().post(url).json(request);
    builder = match auth {
        AuthStyle::Bearer(key) => builder.bearer_auth(key),
        AuthStyle::ApiKeyHeader(key) => builder.header("api-key", key),
        AuthStyle::None => builder,
    };

    let response = builder.send().await.map_err(|e| {
        log::error!("palette::clients::common::send_and_track: connection error: {}", e);
        e
    })?;

    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        log::error!(
            "palette::clients::common::send_and_track: API error {} from {}: {}",
            status,
            url,
            body
        );
        return Err(format!("API error {}: {}", status, body).into());
    }

    let parsed: ChatResponse = response.json().await?;
    if let Some(usage) = &parsed.usage {
        if let Ok(mut slot) = usage_slot.lock() {
            *slot = Some(TokenUsage::from(usage));
        }
    }
    first_choice_content(&parsed)
}
