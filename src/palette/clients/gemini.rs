//! Google Gemini through its OpenAI-compatible endpoint.

use crate::client_wrapper::{ClientError, ClientWrapper, Message, TokenUsage};
use crate::palette::clients::openai::OpenAIClient;
use async_trait::async_trait;
use std::sync::Mutex;

pub const GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta/openai";

pub struct GeminiClient {
    delegate_client: OpenAIClient,
}

impl GeminiClient {
    pub fn new_with_model_string(secret_key: &str, model_name: &str) -> Self {
        Self::new_with_base_url(secret_key, model_name, GEMINI_BASE_URL)
    }

    pub fn new_with_base_url(secret_key: &str, model_name: &str, base_url: &str) -> Self {
        GeminiClient {
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
impl ClientWrapper for GeminiClient {
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
