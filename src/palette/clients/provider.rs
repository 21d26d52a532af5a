//! Provider selection: turns a resolved slot's `provider_i` / `agent_i` / `api_key_i` /
//! `endpoint_i` / `max_tokens_i` into a live [`ClientWrapper`].
//!
//! | provider       | credentials                | endpoint                                  |
//! |----------------|----------------------------|-------------------------------------------|
//! | `ollama`       | none                       | `http://localhost:11434/v1` or `endpoint_i` |
//! | `openai`       | `api_key_i` required       | OpenAI, or `endpoint_i` for gateways      |
//! | `azure_openai` | `api_key_i` required       | `endpoint_i` required                     |
//! | `anthropic`    | `api_key_i` required       | Anthropic, or `endpoint_i`                |
//! | `gemini`       | `api_key_i` required       | Gemini, or `endpoint_i`                   |
//!
//! Team construction goes through the [`ClientFactory`] trait so tests (and embedders with their
//! own transports) can supply clients without touching the network.

use crate::client_wrapper::ClientWrapper;
use crate::palette::clients::claude::ClaudeClient;
use crate::palette::clients::gemini::GeminiClient;
use crate::palette::clients::openai::OpenAIClient;
use crate::palette::error::ConfigurationError;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ModelProvider {
    Ollama,
    OpenAI,
    AzureOpenAI,
    Anthropic,
    Gemini,
}

impl ModelProvider {
    pub fn as_str(&self) -> &'static str {
        match self {
            ModelProvider::Ollama => "ollama",
            ModelProvider::OpenAI => "openai",
            ModelProvider::AzureOpenAI => "azure_openai",
            ModelProvider::Anthropic => "anthropic",
            ModelProvider::Gemini => "gemini",
        }
    }
}

impl fmt::Display for ModelProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ModelProvider {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "ollama" => Ok(ModelProvider::Ollama),
            "openai" => Ok(ModelProvider::OpenAI),
            "azure_openai" | "azure" => Ok(ModelProvider::AzureOpenAI),
            "anthropic" | "claude" => Ok(ModelProvider::Anthropic),
            "gemini" | "google" => Ok(ModelProvider::Gemini),
            other => Err(format!("Unsupported provider: {}", other)),
        }
    }
}

/// Everything needed to build one worker's client.
#[derive(Debug, Clone, PartialEq)]
pub struct ClientSpec {
    pub provider: ModelProvider,
    pub model: String,
    pub api_key: Option<String>,
    pub endpoint: Option<String>,
    pub max_tokens: Option<usize>,
}

/// Builds the client for a roster slot (1-based `slot`, used in error messages).
pub trait ClientFactory: Send + Sync {
    fn create(
        &self,
        slot: usize,
        spec: &ClientSpec,
    ) -> Result<Arc<dyn ClientWrapper>, ConfigurationError>;
}

/// Default factory: HTTP chat-completions clients per [`ModelProvider`].
#[derive(Debug, Clone, Copy, Default)]
pub struct ProviderClientFactory;

impl ProviderClientFactory {
    fn require<'a>(
        slot: usize,
        spec: &'a ClientSpec,
        need_endpoint: bool,
    ) -> Result<(&'a str, Option<&'a str>), ConfigurationError> {
        let mut missing = Vec::new();
        if spec.api_key.is_none() {
            missing.push(format!("api_key_{}", slot));
        }
        if need_endpoint && spec.endpoint.is_none() {
            missing.push(format!("endpoint_{}", slot));
        }
        match spec.api_key.as_deref() {
            Some(key) if missing.is_empty() => Ok((key, spec.endpoint.as_deref())),
            _ => {
                log::error!(
                    "slot {} ({}) is missing credentials: {}",
                    slot,
                    spec.provider,
                    missing.join(", ")
                );
                Err(ConfigurationError::MissingFields(missing))
            }
        }
    }
}

impl ClientFactory for ProviderClientFactory {
    fn create(
        &self,
        slot: usize,
        spec: &ClientSpec,
    ) -> Result<Arc<dyn ClientWrapper>, ConfigurationError> {
        let model = spec.model.as_str();
        let client: Arc<dyn ClientWrapper> = match spec.provider {
            ModelProvider::Ollama => {
                let client = OpenAIClient::ollama(model, spec.endpoint.as_deref());
                Arc::new(match spec.max_tokens {
                    Some(n) => client.with_max_tokens(n),
                    None => client,
                })
            }
            ModelProvider::OpenAI => {
                let (key, endpoint) = Self::require(slot, spec, false)?;
                let client = match endpoint {
                    Some(base_url) => OpenAIClient::new_with_base_url(key, model, base_url),
                    None => OpenAIClient::new_with_model_string(key, model),
                };
                Arc::new(match spec.max_tokens {
                    Some(n) => client.with_max_tokens(n),
                    None => client,
                })
            }
            ModelProvider::AzureOpenAI => {
                let (key, endpoint) = Self::require(slot, spec, true)?;
                let client = OpenAIClient::azure(endpoint.unwrap_or_default(), key, model);
                Arc::new(match spec.max_tokens {
                    Some(n) => client.with_max_tokens(n),
                    None => client,
                })
            }
            ModelProvider::Anthropic => {
                let (key, endpoint) = Self::require(slot, spec, false)?;
                let client = match endpoint {
                    Some(base_url) => ClaudeClient::new_with_base_url(key, model, base_url),
                    None => ClaudeClient::new_with_model_string(key, model),
                };
                Arc::new(match spec.max_tokens {
                    Some(n) => client.with_max_tokens(n),
                    None => client,
                })
            }
            ModelProvider::Gemini => {
                let (key, endpoint) = Self::require(slot, spec, false)?;
                let client = match endpoint {
                    Some(base_url) => GeminiClient::new_with_base_url(key, model, base_url),
                    None => GeminiClient::new_with_model_string(key, model),
                };
                Arc::new(match spec.max_tokens {
                    Some(n) => client.with_max_tokens(n),
                    None => client,
                })
            }
        };
        log::debug!("slot {}: {} client for '{}'", slot, spec.provider, model);
        Ok(client)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spec(provider: ModelProvider) -> ClientSpec {
        ClientSpec {
            provider,
            model: "m".into(),
            api_key: None,
            endpoint: None,
            max_tokens: None,
        }
    }

    #[test]
    fn parses_case_insensitively() {
        assert_eq!("Ollama".parse::<ModelProvider>(), Ok(ModelProvider::Ollama));
        assert_eq!(
            " AZURE_OPENAI ".parse::<ModelProvider>(),
            Ok(ModelProvider::AzureOpenAI)
        );
        assert!("watsonx".parse::<ModelProvider>().is_err());
    }

    #[test]
    fn ollama_needs_no_credentials() {
        let client = ProviderClientFactory
            .create(1, &spec(ModelProvider::Ollama))
            .unwrap();
        assert_eq!(client.model_name(), "m");
    }

    #[test]
    fn keyed_providers_report_missing_fields() {
        for provider in [
            ModelProvider::OpenAI,
            ModelProvider::Anthropic,
            ModelProvider::Gemini,
        ] {
            match ProviderClientFactory.create(2, &spec(provider)) {
                Err(ConfigurationError::MissingFields(fields)) => {
                    assert_eq!(fields, vec!["api_key_2"])
                }
                _ => panic!("{} should require a key", provider),
            }
        }

        let mut azure = spec(ModelProvider::AzureOpenAI);
        azure.api_key = Some("k".into());
        match ProviderClientFactory.create(3, &azure) {
            Err(ConfigurationError::MissingFields(fields)) => {
                assert_eq!(fields, vec!["endpoint_3"])
            }
            _ => panic!("azure should require an endpoint"),
        }
        azure.endpoint = Some("https://acme.openai.azure.com".into());
        assert!(ProviderClientFactory.create(3, &azure).is_ok());
    }
}
