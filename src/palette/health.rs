//! Health classification of a live transcript.
//!
//! A [`HealthClassifier`] turns the current transcript into a [`HealthStatus`]. The
//! [`LexicalClassifier`] is always available and is what the supervisor uses by default:
//!
//! 1. **Deadlock detection** over the last 6 messages: for every pair of messages two
//!    positions apart with the same source, the Jaccard index of their lowercase word sets is
//!    computed; any pair strictly above `0.7` is a `team_deadlock` warning (auto-recoverable).
//! 2. **Error-signature scan** over the last 3 messages, oldest first: the lowercased content
//!    is tested for substring membership against [`ERROR_SIGNATURES`], kinds in table order,
//!    first match wins. The result is an error; only `api_failure` is auto-recoverable.
//! 3. Otherwise `Ok`.
//!
//! [`ModelDeadlockClassifier`] replaces step 1 with a yes/no question to an LLM and falls back
//! to the lexical detector whenever the model cannot answer.
//!
//! # Example
//!
//! ```
//! use palette::health::jaccard_similarity;
//!
//! assert_eq!(jaccard_similarity("a b c d", "A B C D"), 1.0);
//! assert_eq!(jaccard_similarity("a b", "c d"), 0.0);
//! assert!((jaccard_similarity("a b c", "b c d") - 0.5).abs() < 1e-9);
//! ```

use crate::client_wrapper::{ClientWrapper, Message, Role};
use crate::palette::transcript::TranscriptMessage;
use async_trait::async_trait;
use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

/// Number of trailing messages inspected for stalled exchanges.
pub const DEADLOCK_WINDOW: usize = 6;
/// Similarity a same-source pair must exceed to count as a repeat.
pub const DEADLOCK_SIMILARITY: f64 = 0.7;
/// Number of trailing messages scanned for error signatures.
pub const ERROR_SCAN_WINDOW: usize = 3;

/// Failure signatures, lowercase, in match-priority order.
pub const ERROR_SIGNATURES: &[(HealthKind, &[&str])] = &[
    (
        HealthKind::TokenLimit,
        &["token limit exceeded", "context length", "too many tokens"],
    ),
    (
        HealthKind::ApiFailure,
        &["api error", "rate limit", "connection error", "timeout"],
    ),
    (
        HealthKind::ModelError,
        &["content policy violation", "model error", "failed to generate"],
    ),
    (
        HealthKind::TeamDeadlock,
        &["agents not making progress", "circular conversation"],
    ),
];

/// Category of a detected issue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HealthKind {
    TokenLimit,
    ApiFailure,
    ModelError,
    TeamDeadlock,
    InputTooLong,
}

impl HealthKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            HealthKind::TokenLimit => "token_limit",
            HealthKind::ApiFailure => "api_failure",
            HealthKind::ModelError => "model_error",
            HealthKind::TeamDeadlock => "team_deadlock",
            HealthKind::InputTooLong => "input_too_long",
        }
    }

    /// Standard remediation text shown alongside a status of this kind.
    pub fn standard_solution(&self) -> &'static str {
        match self {
            HealthKind::TokenLimit => {
                "Try reducing input size or using models with larger context windows."
            }
            HealthKind::ApiFailure => "Check API keys, connection status, or try again later.",
            HealthKind::ModelError => "Consider changing the model or rephrasing your input.",
            HealthKind::TeamDeadlock => {
                "Try modifying agent system prompts or adding termination conditions."
            }
            HealthKind::InputTooLong => "Please shorten your input or increase the token limit.",
        }
    }
}

impl fmt::Display for HealthKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of one health check.
#[derive(Debug, Clone, PartialEq)]
pub enum HealthStatus {
    Ok,
    Warning {
        kind: HealthKind,
        solution: String,
    },
    Error {
        kind: HealthKind,
        solution: String,
        auto_recoverable: bool,
    },
}

impl HealthStatus {
    pub fn is_ok(&self) -> bool {
        matches!(self, HealthStatus::Ok)
    }

    pub fn kind(&self) -> Option<HealthKind> {
        match self {
            HealthStatus::Ok => None,
            HealthStatus::Warning { kind, .. } | HealthStatus::Error { kind, .. } => Some(*kind),
        }
    }

    pub fn solution(&self) -> Option<&str> {
        match self {
            HealthStatus::Ok => None,
            HealthStatus::Warning { solution, .. } | HealthStatus::Error { solution, .. } => {
                Some(solution)
            }
        }
    }

    /// Whether the supervisor may act on this status on its own.
    /// Deadlock warnings are recoverable; errors carry their own flag.
    pub fn auto_recoverable(&self) -> bool {
        match self {
            HealthStatus::Ok => false,
            HealthStatus::Warning { kind, .. } => *kind == HealthKind::TeamDeadlock,
            HealthStatus::Error {
                auto_recoverable, ..
            } => *auto_recoverable,
        }
    }

    fn deadlock() -> Self {
        HealthStatus::Warning {
            kind: HealthKind::TeamDeadlock,
            solution: HealthKind::TeamDeadlock.standard_solution().to_string(),
        }
    }

    fn error(kind: HealthKind) -> Self {
        HealthStatus::Error {
            kind,
            solution: kind.standard_solution().to_string(),
            auto_recoverable: kind == HealthKind::ApiFailure,
        }
    }
}

impl fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HealthStatus::Ok => write!(f, "ok"),
            HealthStatus::Warning { kind, .. } => write!(f, "warning: {}", kind),
            HealthStatus::Error { kind, .. } => write!(f, "error: {}", kind),
        }
    }
}

/// Jaccard index of the lowercase whitespace-delimited word sets of two texts.
/// Returns `0.0` when either text has no words.
pub fn jaccard_similarity(text1: &str, text2: &str) -> f64 {
    let lower1 = text1.to_lowercase();
    let lower2 = text2.to_lowercase();
    let words1: HashSet<&str> = lower1.split_whitespace().collect();
    let words2: HashSet<&str> = lower2.split_whitespace().collect();

    if words1.is_empty() || words2.is_empty() {
        return 0.0;
    }

    let intersection = words1.intersection(&words2).count();
    let union = words1.union(&words2).count();
    intersection as f64 / union as f64
}

/// True when the last [`DEADLOCK_WINDOW`] messages contain a same-source pair two positions
/// apart whose similarity exceeds [`DEADLOCK_SIMILARITY`].
pub fn detect_deadlock(messages: &[TranscriptMessage]) -> bool {
    if messages.len() < DEADLOCK_WINDOW {
        return false;
    }
    let window = &messages[messages.len() - DEADLOCK_WINDOW..];
    window.windows(3).any(|triple| {
        triple[0].source == triple[2].source
            && jaccard_similarity(&triple[0].content, &triple[2].content) > DEADLOCK_SIMILARITY
    })
}

/// First error signature contained in `text`, if any.
pub fn detect_error(text: &str) -> Option<HealthKind> {
    if text.is_empty() {
        return None;
    }
    let lower = text.to_lowercase();
    ERROR_SIGNATURES
        .iter()
        .find(|(_, patterns)| patterns.iter().any(|p| lower.contains(p)))
        .map(|(kind, _)| *kind)
}

/// Turns a transcript into a [`HealthStatus`].
#[async_trait]
pub trait HealthClassifier: Send + Sync {
    async fn classify(&self, transcript: &[TranscriptMessage]) -> HealthStatus;

    fn name(&self) -> &str;
}

/// Keyword and word-overlap heuristics. Deterministic and dependency free.
#[derive(Debug, Clone, Copy, Default)]
pub struct LexicalClassifier;

impl LexicalClassifier {
    /// Step 2 alone: error signatures over the last [`ERROR_SCAN_WINDOW`] messages.
    pub fn scan_errors(&self, transcript: &[TranscriptMessage]) -> Option<HealthStatus> {
        let start = transcript.len().saturating_sub(ERROR_SCAN_WINDOW);
        transcript[start..]
            .iter()
            .find_map(|m| detect_error(&m.content))
            .map(HealthStatus::error)
    }

    /// Both steps, synchronously.
    pub fn check(&self, transcript: &[TranscriptMessage]) -> HealthStatus {
        if detect_deadlock(transcript) {
            return HealthStatus::deadlock();
        }
        self.scan_errors(transcript).unwrap_or(HealthStatus::Ok)
    }
}

#[async_trait]
impl HealthClassifier for LexicalClassifier {
    async fn classify(&self, transcript: &[TranscriptMessage]) -> HealthStatus {
        self.check(transcript)
    }

    fn name(&self) -> &str {
        "lexical"
    }
}

/// Asks a model whether the recent exchange is looping; the error scan stays lexical.
///
/// Any client failure falls back to [`detect_deadlock`].
pub struct ModelDeadlockClassifier {
    client: Arc<dyn ClientWrapper>,
    lexical: LexicalClassifier,
}

impl ModelDeadlockClassifier {
    pub fn new(client: Arc<dyn ClientWrapper>) -> Self {
        Self {
            client,
            lexical: LexicalClassifier,
        }
    }

    fn prompt(window: &[TranscriptMessage]) -> String {
        let snippet = window
            .iter()
            .map(|m| {
                let preview: String = m.content.chars().take(200).collect();
                format!("{}: {}", m.source, preview)
            })
            .collect::<Vec<_>>()
            .join("\n");
        format!(
            "Analyze this conversation snippet and determine if the agents are stuck in a loop or deadlock:\n{}\n\nRespond only with 'yes' or 'no'.",
            snippet
        )
    }

    async fn model_detects_deadlock(&self, transcript: &[TranscriptMessage]) -> bool {
        if transcript.len() < DEADLOCK_WINDOW {
            return false;
        }
        let window = &transcript[transcript.len() - DEADLOCK_WINDOW..];
        let request = [Message::new(Role::User, Self::prompt(window))];

        match self.client.send_message(&request).await {
            Ok(reply) => reply.content.trim().eq_ignore_ascii_case("yes"),
            Err(e) => {
                log::warn!(
                    "deadlock classifier '{}' failed, using lexical fallback: {}",
                    self.client.model_name(),
                    e
                );
                detect_deadlock(transcript)
            }
        }
    }
}

#[async_trait]
impl HealthClassifier for ModelDeadlockClassifier {
    async fn classify(&self, transcript: &[TranscriptMessage]) -> HealthStatus {
        if self.model_detects_deadlock(transcript).await {
            return HealthStatus::deadlock();
        }
        self.lexical
            .scan_errors(transcript)
            .unwrap_or(HealthStatus::Ok)
    }

    fn name(&self) -> &str {
        "model"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn jaccard_ignores_case_and_duplicates() {
        assert_eq!(jaccard_similarity("The the THE cat", "the cat"), 1.0);
        assert_eq!(jaccard_similarity("", "anything"), 0.0);
        assert_eq!(jaccard_similarity("   ", ""), 0.0);
    }

    #[test]
    fn signatures_match_in_table_order() {
        // Both a token_limit and an api_failure signature: token_limit comes first.
        assert_eq!(
            detect_error("Rate limit hit, then Context length overflow"),
            Some(HealthKind::TokenLimit)
        );
        assert_eq!(detect_error("API Error 500"), Some(HealthKind::ApiFailure));
        assert_eq!(detect_error("all fine"), None);
        assert_eq!(detect_error(""), None);
    }

    #[test]
    fn only_api_failure_is_recoverable() {
        assert!(HealthStatus::error(HealthKind::ApiFailure).auto_recoverable());
        assert!(!HealthStatus::error(HealthKind::ModelError).auto_recoverable());
        assert!(!HealthStatus::error(HealthKind::TeamDeadlock).auto_recoverable());
        assert!(HealthStatus::deadlock().auto_recoverable());
        assert!(!HealthStatus::Ok.auto_recoverable());
    }
}
