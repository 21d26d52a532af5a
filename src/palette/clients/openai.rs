//! The `OpenAIClient` struct implements `ClientWrapper` for the OpenAI Chat Completions API and
//! for every endpoint that speaks the same wire format (Azure OpenAI deployments, a local Ollama
//! server, self-hosted gateways).
//!
//! The latest [`TokenUsage`] reported by the server is kept in an internal slot; read it with
//! `get_last_usage()` after `send_message()`.
//!
//! # Example
//!
//! ```rust,no_run
//! use palette::client_wrapper::{ClientWrapper, Message, Role};
//! use palette::clients::openai::OpenAIClient;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
//!     let key = std::env::var("OPENAI_API_KEY")?;
//!     let client = OpenAIClient::new_with_model_string(&key, "gpt-4o-mini").with_max_tokens(256);
//!
//!     let reply = client
//!         .send_message(&[
//!             Message::new(Role::System, "You are an assistant."),
//!             Message::new(Role::User, "Hello!"),
//!         ])
//!         .await?;
//!     println!("Assistant: {}", reply.content);
//!
//!     if let Some(usage) = client.get_last_usage() {
//!         println!("tokens: {} in / {} out", usage.input_tokens, usage.output_tokens);
//!     }
//!     Ok(())
//! }
//! ```

use crate::client_wrapper::{ClientError, ClientWrapper, Message, Role, TokenUsage};
use crate::palette::clients::common::{send_and_track, AuthStyle, ChatRequest};
use async_trait::async_trait;
use std::sync::Mutex;

pub const OPENAI_BASE_URL: &str = "https://api.openai.com/v1";
pub const OLLAMA_BASE_URL: &str = "http://localhost:11434/v1";
pub const AZURE_API_VERSION: &str = "2024-06-01";

/// `{base}/chat/completions`, tolerating a trailing slash on `base`.
pub fn chat_completions_url(base_url: &str) -> String {
    format!("{}/chat/completions", base_url.trim_end_matches('/'))
}

/// Client wrapper for OpenAI-compatible chat endpoints.
pub struct OpenAIClient {
    /// Full chat-completions URL.
    url: String,
    auth: AuthStyle,
    /// Model name injected into each request.
    model: String,
    max_tokens: Option<usize>,
    /// Storage for the token usage returned by the most recent request.
    token_usage: Mutex<Option<TokenUsage>>,
}

impl OpenAIClient {
    /// OpenAI's public API with an explicit model name.
    pub fn new_with_model_string(secret_key: &str, model_name: &str) -> Self {
        Self::new_with_base_url(secret_key, model_name, OPENAI_BASE_URL)
    }

    /// Any OpenAI-compatible base URL with bearer authentication.
    pub fn new_with_base_url(secret_key: &str, model_name: &str, base_url: &str) -> Self {
        Self::from_parts(
            chat_completions_url(base_url),
            AuthStyle::Bearer(secret_key.to_string()),
            model_name,
        )
    }

    /// A local (or remote, via `base_url`) Ollama server. No credentials are sent.
    pub fn ollama(model_name: &str, base_url: Option<&str>) -> Self {
        Self::from_parts(
            chat_completions_url(base_url.unwrap_or(OLLAMA_BASE_URL)),
            AuthStyle::None,
            model_name,
        )
    }

    /// An Azure OpenAI deployment. `deployment` doubles as the model name.
    pub fn azure(endpoint: &str, secret_key: &str, deployment: &str) -> Self {
        let url = format!(
            "{}/openai/deployments/{}/chat/completions?api-version={}",
            endpoint.trim_end_matches('/'),
            deployment,
            AZURE_API_VERSION
        );
        Self::from_parts(url, AuthStyle::ApiKeyHeader(secret_key.to_string()), deployment)
    }

    fn from_parts(url: String, auth: AuthStyle, model_name: &str) -> Self {
        OpenAIClient {
            url,
            auth,
            model: model_name.to_string(),
            max_tokens: None,
            token_usage: Mutex::new(None),
        }
    }

    /// Cap the completion length of every request.
    pub fn with_max_tokens(mut self, max_tokens: usize) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn auth(&self) -> &AuthStyle {
        &self.auth
    }

    pub fn max_tokens(&self) -> Option<usize> {
        self.max_tokens
    }

    pub fn build_request(&self, messages: &[Message]) -> ChatRequest {
        ChatRequest::new(Some(&self.model), messages, self.max_tokens)
    }
}

#[async_trait]
impl ClientWrapper for OpenAIClient {
    async fn send_message(&self, messages: &[Message]) -> Result<Message, ClientError> {
        let request = self.build_request(messages);
        let content = send_and_track(&self.url, &self.auth, &request, &self.token_usage).await?;
        Ok(Message::new(Role::Assistant, content))
    }

    fn model_name(&self) -> &str {
        &self.model
    }

    fn usage_slot(&self) -> Option<&Mutex<Option<TokenUsage>>> {
        Some(&self.token_usage)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn urls_per_flavour() {
        let openai = OpenAIClient::new_with_model_string("sk", "gpt-4o");
        assert_eq!(openai.url(), "https://api.openai.com/v1/chat/completions");
        assert_eq!(openai.auth(), &AuthStyle::Bearer("sk".into()));

        let ollama = OpenAIClient::ollama("llama3", None);
        assert_eq!(ollama.url(), "http://localhost:11434/v1/chat/completions");
        assert_eq!(ollama.auth(), &AuthStyle::None);

        let remote = OpenAIClient::ollama("llama3", Some("http://gpu-box:11434/v1/"));
        assert_eq!(remote.url(), "http://gpu-box:11434/v1/chat/completions");

        let azure = OpenAIClient::azure("https://acme.openai.azure.com/", "k", "gpt4o-prod");
        assert_eq!(
            azure.url(),
            "https://acme.openai.azure.com/openai/deployments/gpt4o-prod/chat/completions?api-version=2024-06-01"
        );
        assert_eq!(azure.auth(), &AuthStyle::ApiKeyHeader("k".into()));
        assert_eq!(azure.model_name(), "gpt4o-prod");
    }

    #[test]
    fn max_tokens_is_forwarded() {
        let client = OpenAIClient::ollama("llama3", None).with_max_tokens(128);
        let request = client.build_request(&[Message::new(Role::User, "hi")]);
        assert_eq!(request.max_tokens, Some(128));
        assert_eq!(request.model.as_deref(), Some("llama3"));
        assert!(client.get_last_usage().is_none());
    }
}
