//! Anthropic Claude client wrapper built on the OpenAI-compatible transport.
//!
//! The wrapper delegates HTTP concerns to [`OpenAIClient`], so switching a worker from OpenAI to
//! Claude only changes the constructor.
//!
//! # Example
//!
//! ```rust,no_run
//! use palette::client_wrapper::{ClientWrapper, Message, Role};
//! use palette::clients::claude::ClaudeClient;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
//!     let key = std::env::var("ANTHROPIC_API_KEY")?;
//!     let client = ClaudeClient::new_with_model_string(&key, "claude-sonnet-4-5");
//!     let reply = client
//!         .send_message(&[Message::new(Role::User, "List three review criteria.")])
//!         .await?;
//!     println!("{}", reply.content);
//!     Ok(())
//! }
//! ```

use crate::client_wrapper::{ClientError, ClientWrapper, Message, TokenUsage};
use crate::palette::clients::openai::OpenAIClient;
use async_trait::async_trait;
use std::sync::Mutex;

pub const ANTHROPIC_BASE_URL: &str = "https://api.anthropic.com/v1";

/// Client wrapper for Anthropic's Claude API routed through the OpenAI compatible surface.
pub struct ClaudeClient {
    delegate_client: OpenAIClient,
}

impl ClaudeClient {
    pub fn new_with_model_string(secret_key: &str, model_name: &str) -> Self {
        Self::new_with_base_url(secret_key, model_name, ANTHROPIC_BASE_URL)
    }

    pub fn new_with_base_url(secret_key: &str, model_name: &str, base_url: &str) -> Self {
        ClaudeClient {
            delegate_client: OpenAIClient::new_with_base_url(secret_key, model_name, base_url),
        }
    }

    pub fn with_max_tokens(mut self, max_tokens: usize) -> Self {
        self.delegate_client = self.delegate_client.with_max_tokens(max_tokens);
        self
    }

    pub fn url(&self) -> &str {
        self.delegate_client.url()
    }
}

#[async_trait]
impl ClientWrapper for ClaudeClient {
    async fn send_message(&self, messages: &[Message]) -> Result<Message, ClientError> {
        self.delegate_client.send_message(messages).await
    }

    fn model_name(&self) -> &str {
        self.delegate_client.model_name()
    }

    fn usage_slot(&self) -> Option<&Mutex<Option<TokenUsage>>> {
        self.delegate_client.usage_slot()
    }
}
