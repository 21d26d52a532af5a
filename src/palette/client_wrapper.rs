use async_trait::async_trait;
use std::error::Error;
use std::sync::{Arc, Mutex};

/// A ClientWrapper is a wrapper around a specific LLM backend.
/// It provides the single capability the team engine needs from a model: given an ordered
/// history, produce the next message. It does not keep track of the conversation; the
/// [`Worker`](crate::Worker) that owns it rebuilds the history from the shared transcript on
/// every turn.
// src/palette/client_wrapper.rs

/// Represents the possible roles for a message.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Role {
    System,
    // set by the worker's system prompt to steer the model's responses
    User,
    // the task, or another worker's contribution relayed to this worker
    Assistant, // lets the model know the content was generated by itself on an earlier turn
}

/// How many tokens were spent on prompt vs. completion.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct TokenUsage {
    pub input_tokens: usize,
    pub output_tokens: usize,
    pub total_tokens: usize,
}

/// Represents a generic message to be sent to an LLM.
#[derive(Clone, Debug)]
pub struct Message {
    /// The role associated with the message.
    pub role: Role,
    /// The actual content of the message. Stored as `Arc<str>` so cloning is cheap.
    pub content: Arc<str>,
}

impl Message {
    pub fn new(role: Role, content: impl AsRef<str>) -> Self {
        Self {
            role,
            content: Arc::from(content.as_ref()),
        }
    }
}

/// Error type returned by client calls. Client failures (network, auth, quota) are
/// surfaced verbatim to the caller of [`Team::run`](crate::Team::run).
pub type ClientError = Box<dyn Error + Send + Sync>;

/// Trait defining the interface to interact with various LLM services.
#[async_trait]
pub trait ClientWrapper: Send + Sync {
    /// Send the ordered history to the LLM and get the next message back.
    /// - `messages`: system prompt first, then the conversation in order.
    async fn send_message(&self, messages: &[Message]) -> Result<Message, ClientError>;

    /// Model identifier, used in logs and roster displays.
    fn model_name(&self) -> &str;

    /// Hook to retrieve usage from the *last* send_message() call.
    /// Default impl reads the slot exposed by [`usage_slot`](ClientWrapper::usage_slot).
    fn get_last_usage(&self) -> Option<TokenUsage> {
        self.usage_slot()
            .and_then(|slot| slot.lock().ok().and_then(|u| u.clone()))
    }

    fn usage_slot(&self) -> Option<&Mutex<Option<TokenUsage>>> {
        // Clients that track usage return their slot by overriding this method.
        None
    }
}
