//! The shared, append-only conversation record of one run.
//!
//! A [`Transcript`] is written by exactly one [`TurnScheduler`](crate::TurnScheduler) and read
//! concurrently by the [`HealthSupervisor`](crate::HealthSupervisor). Appends take a write lock
//! for the duration of a single `Vec::push`, so readers never observe a torn message; they may
//! observe a transcript that is one append behind.
//!
//! Transcripts are never cleared in place. A roster reset swaps in a new scheduler that owns
//! a fresh transcript, and anything still holding the old `Arc` keeps a consistent view.
//!
//! # Example
//!
//! ```
//! use palette::{MessageSource, Transcript, TranscriptMessage};
//!
//! let transcript = Transcript::new();
//! transcript.append(TranscriptMessage::user("Write fizzbuzz"));
//! transcript.append(TranscriptMessage::from_worker("coder", "for i in 1..=100 { ... }"));
//!
//! assert_eq!(transcript.len(), 2);
//! assert_eq!(transcript.last().unwrap().source, MessageSource::Worker("coder".into()));
//! ```

use chrono::{DateTime, Utc};
use std::fmt;
use std::sync::{Arc, PoisonError, RwLock};

/// Who produced a transcript message.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum MessageSource {
    /// The caller's task.
    User,
    /// Engine-generated notices.
    System,
    /// A worker, identified by its roster name.
    Worker(String),
}

impl MessageSource {
    pub fn name(&self) -> &str {
        match self {
            MessageSource::User => "user",
            MessageSource::System => "system",
            MessageSource::Worker(name) => name,
        }
    }
}

impl fmt::Display for MessageSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// One immutable entry of a [`Transcript`].
#[derive(Debug, Clone)]
pub struct TranscriptMessage {
    pub source: MessageSource,
    /// Stored as `Arc<str>` so snapshots are cheap.
    pub content: Arc<str>,
    pub timestamp: DateTime<Utc>,
}

impl TranscriptMessage {
    pub fn new(source: MessageSource, content: impl AsRef<str>) -> Self {
        Self {
            source,
            content: Arc::from(content.as_ref()),
            timestamp: Utc::now(),
        }
    }

    pub fn user(content: impl AsRef<str>) -> Self {
        Self::new(MessageSource::User, content)
    }

    pub fn system(content: impl AsRef<str>) -> Self {
        Self::new(MessageSource::System, content)
    }

    pub fn from_worker(name: impl Into<String>, content: impl AsRef<str>) -> Self {
        Self::new(MessageSource::Worker(name.into()), content)
    }
}

/// Ordered, append-only sequence of [`TranscriptMessage`]s.
#[derive(Debug, Default)]
pub struct Transcript {
    messages: RwLock<Vec<TranscriptMessage>>,
}

impl Transcript {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append one message. Insertion order is conversation order.
    pub fn append(&self, message: TranscriptMessage) {
        self.messages
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(message);
    }

    /// Copy of every message in order.
    pub fn snapshot(&self) -> Vec<TranscriptMessage> {
        self.messages
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Copy of the last `n` messages (fewer if the transcript is shorter).
    pub fn tail(&self, n: usize) -> Vec<TranscriptMessage> {
        let messages = self.messages.read().unwrap_or_else(PoisonError::into_inner);
        let start = messages.len().saturating_sub(n);
        messages[start..].to_vec()
    }

    pub fn last(&self) -> Option<TranscriptMessage> {
        self.messages
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .last()
            .cloned()
    }

    pub fn len(&self) -> usize {
        self.messages
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tail_returns_most_recent_in_order() {
        let t = Transcript::new();
        for i in 0..5 {
            t.append(TranscriptMessage::from_worker("w", format!("m{}", i)));
        }
        let tail: Vec<String> = t.tail(3).iter().map(|m| m.content.to_string()).collect();
        assert_eq!(tail, vec!["m2", "m3", "m4"]);
        assert_eq!(t.tail(10).len(), 5);
    }

    #[test]
    fn source_names() {
        assert_eq!(MessageSource::User.name(), "user");
        assert_eq!(MessageSource::System.to_string(), "system");
        assert_eq!(MessageSource::Worker("critic".into()).name(), "critic");
    }
}
