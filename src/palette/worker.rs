//! Worker: one named conversational participant.
//!
//! A [`Worker`] pairs a [`ClientWrapper`] with identity (a behaviour label used as its
//! transcript name), a human description and a system prompt. Workers are immutable once
//! built and shared by `Arc` between the roster, schedulers and the supervisor.
//!
//! Unlike a session-backed agent, a worker keeps no private history. On every turn it renders
//! the shared [`Transcript`](crate::Transcript) into an LLM request from its own point of view:
//!
//! - its system prompt goes first,
//! - the task and other workers' messages become `User` messages (others are prefixed with
//!   `[name]: ` so the model can tell speakers apart),
//! - its own earlier messages become `Assistant` messages.
//!
//! # Example
//!
//! ```rust,no_run
//! use palette::clients::openai::OpenAIClient;
//! use palette::Worker;
//! use std::sync::Arc;
//!
//! let worker = Worker::new(
//!     "Coding_Assistant",
//!     "Writes C++ solutions with no explanation",
//!     "You answer leetcode problems in C++ with no explanation.",
//!     Arc::new(OpenAIClient::new_with_model_string("key", "gpt-4o-mini")),
//! );
//! assert_eq!(worker.name, "Coding_Assistant");
//! ```

use crate::client_wrapper::{ClientError, ClientWrapper, Message, Role};
use crate::palette::transcript::{MessageSource, TranscriptMessage};
use std::fmt;
use std::sync::Arc;

pub struct Worker {
    /// Behaviour label; doubles as the worker's name in the transcript.
    pub name: String,
    /// Free-form description of what this worker is for.
    pub description: String,
    /// System prompt sent first on every turn.
    pub system_message: String,
    client: Arc<dyn ClientWrapper>,
}

impl Worker {
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        system_message: impl Into<String>,
        client: Arc<dyn ClientWrapper>,
    ) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            system_message: system_message.into(),
            client,
        }
    }

    /// Model identifier reported by the underlying client.
    pub fn model(&self) -> &str {
        self.client.model_name()
    }

    pub fn client(&self) -> &Arc<dyn ClientWrapper> {
        &self.client
    }

    /// Render the transcript into the request this worker sends to its model.
    pub fn build_request(&self, history: &[TranscriptMessage]) -> Vec<Message> {
        let mut request = Vec::with_capacity(history.len() + 1);
        request.push(Message::new(Role::System, &self.system_message));

        for entry in history {
            let message = match &entry.source {
                MessageSource::Worker(name) if *name == self.name => {
                    Message::new(Role::Assistant, &entry.content)
                }
                MessageSource::Worker(name) => {
                    Message::new(Role::User, format!("[{}]: {}", name, entry.content))
                }
                MessageSource::User | MessageSource::System => {
                    Message::new(Role::User, &entry.content)
                }
            };
            request.push(message);
        }
        request
    }

    /// Produce this worker's message for the current turn.
    ///
    /// Client errors are returned untouched; the scheduler wraps them with the worker name.
    pub async fn generate(
        &self,
        history: &[TranscriptMessage],
    ) -> Result<TranscriptMessage, ClientError> {
        let request = self.build_request(history);
        let response = self.client.send_message(&request).await?;

        if let Some(usage) = self.client.get_last_usage() {
            log::debug!(
                "worker '{}' ({}) used {} tokens ({} in / {} out)",
                self.name,
                self.model(),
                usage.total_tokens,
                usage.input_tokens,
                usage.output_tokens
            );
        }

        Ok(TranscriptMessage::from_worker(
            self.name.clone(),
            response.content,
        ))
    }
}

impl fmt::Debug for Worker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Worker")
            .field("name", &self.name)
            .field("model", &self.model())
            .field("description", &self.description)
            .finish()
    }
}
