//! Termination conditions evaluated after every worker turn.
//!
//! Two primitives compose with logical OR:
//!
//! - [`TerminationCondition::TextMention`] fires when the **latest** message contains a literal.
//!   Matching is a plain, case-sensitive substring test: `"APPROVE"` does not match
//!   `"approve"`. Reviewers are prompted to emit the exact token.
//! - [`TerminationCondition::External`] fires when an [`ExternalTermination`] flag is set,
//!   typically by [`Team::request_stop`](crate::Team::request_stop).
//!
//! # Example
//!
//! ```
//! use palette::{ExternalTermination, TerminationCondition, TranscriptMessage};
//!
//! let stop = ExternalTermination::new();
//! let condition = TerminationCondition::text_mention("APPROVE").or(stop.condition());
//!
//! assert!(!condition.is_met(&TranscriptMessage::from_worker("critic", "needs work")));
//! assert!(condition.is_met(&TranscriptMessage::from_worker("critic", "APPROVE")));
//!
//! stop.set();
//! assert!(condition.is_met(&TranscriptMessage::from_worker("coder", "anything")));
//! ```

use crate::palette::transcript::TranscriptMessage;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// A settable stop flag shared between the caller and every scheduler built for a team.
///
/// Cloning shares the flag.
#[derive(Debug, Clone, Default)]
pub struct ExternalTermination {
    flag: Arc<AtomicBool>,
}

impl ExternalTermination {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request termination at the next turn boundary.
    pub fn set(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn is_set(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }

    /// Clear the flag. Only call this before a run starts: the flag stays set after it fires
    /// so every later check of the same run still sees the stop.
    pub fn reset(&self) {
        self.flag.store(false, Ordering::SeqCst);
    }

    /// A condition that observes this flag.
    pub fn condition(&self) -> TerminationCondition {
        TerminationCondition::External(self.clone())
    }
}

/// Predicate over the latest message (or an external signal) that ends a run.
#[derive(Debug, Clone)]
pub enum TerminationCondition {
    /// Latest message content contains the literal (case-sensitive).
    TextMention(String),
    /// The shared flag has been set.
    External(ExternalTermination),
    /// Any of the inner conditions.
    Any(Vec<TerminationCondition>),
}

impl TerminationCondition {
    pub fn text_mention(text: impl Into<String>) -> Self {
        TerminationCondition::TextMention(text.into())
    }

    /// Compose with another condition using logical OR, flattening nested `Any`s.
    pub fn or(self, other: TerminationCondition) -> Self {
        match (self, other) {
            (TerminationCondition::Any(mut left), TerminationCondition::Any(right)) => {
                left.extend(right);
                TerminationCondition::Any(left)
            }
            (TerminationCondition::Any(mut left), other) => {
                left.push(other);
                TerminationCondition::Any(left)
            }
            (this, TerminationCondition::Any(mut right)) => {
                right.insert(0, this);
                TerminationCondition::Any(right)
            }
            (this, other) => TerminationCondition::Any(vec![this, other]),
        }
    }

    /// Evaluate against the most recent message only.
    pub fn is_met(&self, latest: &TranscriptMessage) -> bool {
        match self {
            TerminationCondition::TextMention(text) => latest.content.contains(text.as_str()),
            TerminationCondition::External(flag) => flag.is_set(),
            TerminationCondition::Any(conditions) => conditions.iter().any(|c| c.is_met(latest)),
        }
    }

    /// Human-readable name of the first condition that fires, used in events and logs.
    pub fn reason(&self, latest: &TranscriptMessage) -> Option<String> {
        match self {
            TerminationCondition::TextMention(text) if latest.content.contains(text.as_str()) => {
                Some(format!("text mention '{}'", text))
            }
            TerminationCondition::External(flag) if flag.is_set() => {
                Some("external stop".to_string())
            }
            TerminationCondition::Any(conditions) => {
                conditions.iter().find_map(|c| c.reason(latest))
            }
            _ => None,
        }
    }

    /// True when any external flag inside this condition has been set.
    pub fn stop_requested(&self) -> bool {
        match self {
            TerminationCondition::TextMention(_) => false,
            TerminationCondition::External(flag) => flag.is_set(),
            TerminationCondition::Any(conditions) => conditions.iter().any(|c| c.stop_requested()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn msg(content: &str) -> TranscriptMessage {
        TranscriptMessage::from_worker("w", content)
    }

    #[test]
    fn text_mention_is_case_sensitive() {
        let c = TerminationCondition::text_mention("APPROVE");
        assert!(c.is_met(&msg("Looks good. APPROVE")));
        assert!(!c.is_met(&msg("looks good, approve")));
        assert!(!c.is_met(&msg("Approve")));
    }

    #[test]
    fn or_flattens() {
        let stop = ExternalTermination::new();
        let c = TerminationCondition::text_mention("A")
            .or(TerminationCondition::text_mention("B"))
            .or(stop.condition());
        match &c {
            TerminationCondition::Any(inner) => assert_eq!(inner.len(), 3),
            other => panic!("expected Any, got {:?}", other),
        }
        assert_eq!(c.reason(&msg("xBx")).as_deref(), Some("text mention 'B'"));
    }

    #[test]
    fn external_flag_stays_set_until_cleared() {
        let stop = ExternalTermination::new();
        let c = TerminationCondition::text_mention("DONE").or(stop.condition());
        assert!(!c.stop_requested());
        stop.set();
        assert!(c.is_met(&msg("still going")));
        assert!(c.is_met(&msg("still going")));
        assert!(c.stop_requested());
        assert!(!TerminationCondition::text_mention("DONE").stop_requested());

        stop.reset();
        assert!(!c.is_met(&msg("still going")));
    }
}
