//! Pre-flight input gate.
//!
//! Before any turn is scheduled, the task text is tokenized exactly and compared with a fixed
//! maximum input size (independent of the governor's run threshold):
//!
//! | Token count                     | Result                                   |
//! |---------------------------------|------------------------------------------|
//! | `> max_input_tokens`            | [`InputTokenCheck::Error`], run refused  |
//! | `> max_input_tokens * 0.9`      | [`InputTokenCheck::Warning`], run allowed |
//! | otherwise                       | [`InputTokenCheck::Ok`]                  |
//!
//! Tokenization goes through the [`Tokenizer`] capability; [`Cl100kTokenizer`] (tiktoken's
//! `cl100k_base`) is the default.

use crate::client_wrapper::ClientError;
use crate::palette::health::HealthKind;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, OnceLock};
use tiktoken_rs::CoreBPE;

/// Default maximum number of input tokens accepted by the gate.
pub const DEFAULT_MAX_INPUT_TOKENS: usize = 4000;
/// Fraction of the limit above which a warning is issued.
pub const TOKEN_WARNING_RATIO: f64 = 0.9;

/// Exact tokenization capability used only by the pre-flight gate.
pub trait Tokenizer: Send + Sync {
    fn encode(&self, text: &str) -> Result<Vec<u32>, ClientError>;
}

static CL100K: OnceLock<Result<CoreBPE, String>> = OnceLock::new();

/// tiktoken `cl100k_base` encoding. The BPE tables are loaded once per process.
#[derive(Debug, Clone, Copy, Default)]
pub struct Cl100kTokenizer;

impl Tokenizer for Cl100kTokenizer {
    fn encode(&self, text: &str) -> Result<Vec<u32>, ClientError> {
        let bpe = CL100K
            .get_or_init(|| tiktoken_rs::cl100k_base().map_err(|e| e.to_string()))
            .as_ref()
            .map_err(|e| -> ClientError { format!("failed to load cl100k_base: {}", e).into() })?;
        Ok(bpe
            .encode_with_special_tokens(text)
            .into_iter()
            .map(|token| token as u32)
            .collect())
    }
}

/// Outcome of [`InputGate::check_input_tokens`].
#[derive(Debug, Clone, PartialEq)]
pub enum InputTokenCheck {
    Ok {
        token_count: usize,
        max_limit: usize,
    },
    Warning {
        token_count: usize,
        max_limit: usize,
        message: String,
    },
    Error {
        kind: InputErrorKind,
        token_count: usize,
        max_limit: usize,
        message: String,
        suggestion: String,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputErrorKind {
    /// The task is larger than the limit.
    InputTooLong,
    /// The tokenizer itself failed.
    TokenCountError,
}

impl InputTokenCheck {
    /// Whether the run must be refused.
    pub fn is_error(&self) -> bool {
        matches!(self, InputTokenCheck::Error { .. })
    }

    pub fn token_count(&self) -> usize {
        match self {
            InputTokenCheck::Ok { token_count, .. }
            | InputTokenCheck::Warning { token_count, .. }
            | InputTokenCheck::Error { token_count, .. } => *token_count,
        }
    }

    pub fn max_limit(&self) -> usize {
        match self {
            InputTokenCheck::Ok { max_limit, .. }
            | InputTokenCheck::Warning { max_limit, .. }
            | InputTokenCheck::Error { max_limit, .. } => *max_limit,
        }
    }

    /// Human-readable diagnostic, if any.
    pub fn message(&self) -> Option<&str> {
        match self {
            InputTokenCheck::Ok { .. } => None,
            InputTokenCheck::Warning { message, .. } | InputTokenCheck::Error { message, .. } => {
                Some(message)
            }
        }
    }
}

/// Exact-tokenizer gate with an adjustable limit.
pub struct InputGate {
    tokenizer: Arc<dyn Tokenizer>,
    max_input_tokens: AtomicUsize,
}

impl InputGate {
    pub fn new(tokenizer: Arc<dyn Tokenizer>, max_input_tokens: usize) -> Self {
        Self {
            tokenizer,
            max_input_tokens: AtomicUsize::new(max_input_tokens),
        }
    }

    pub fn max_input_tokens(&self) -> usize {
        self.max_input_tokens.load(Ordering::SeqCst)
    }

    pub fn set_max_input_tokens(&self, max: usize) {
        self.max_input_tokens.store(max, Ordering::SeqCst);
        log::info!("input token limit set to {}", max);
    }

    pub fn check_input_tokens(&self, text: &str) -> InputTokenCheck {
        let max_limit = self.max_input_tokens();
        let token_count = match self.tokenizer.encode(text) {
            Ok(tokens) => tokens.len(),
            Err(e) => {
                let message = format!("Token counting error: {}", e);
                log::error!("{}", message);
                return InputTokenCheck::Error {
                    kind: InputErrorKind::TokenCountError,
                    token_count: 0,
                    max_limit,
                    message,
                    suggestion: HealthKind::InputTooLong.standard_solution().to_string(),
                };
            }
        };

        if token_count > max_limit {
            let message = token_limit_message(token_count, max_limit);
            log::warn!(
                "input exceeds token limit ({}/{})",
                token_count,
                max_limit
            );
            return InputTokenCheck::Error {
                kind: InputErrorKind::InputTooLong,
                token_count,
                max_limit,
                message,
                suggestion: HealthKind::InputTooLong.standard_solution().to_string(),
            };
        }

        if token_count as f64 > max_limit as f64 * TOKEN_WARNING_RATIO {
            let message = format!(
                "Warning: Input approaching token limit ({}/{})",
                token_count, max_limit
            );
            log::warn!("{}", message);
            return InputTokenCheck::Warning {
                token_count,
                max_limit,
                message,
            };
        }

        InputTokenCheck::Ok {
            token_count,
            max_limit,
        }
    }
}

/// Diagnostic for an oversized input: limit, count, overage and a suggested reduction.
pub fn token_limit_message(token_count: usize, max_limit: usize) -> String {
    let over_by = token_count.saturating_sub(max_limit);
    let reduction_pct = if token_count == 0 {
        0
    } else {
        over_by * 100 / token_count + 10
    };
    format!(
        "Your input exceeds the maximum token limit of {}.\n\
         Current token count: {} (over by {})\n\
         Suggested actions:\n\
         1. Shorten your input by about {}%\n\
         2. Raise the input token limit if your models allow it\n\
         3. Split your query into multiple smaller requests",
        max_limit, token_count, over_by, reduction_pct
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Words;

    impl Tokenizer for Words {
        fn encode(&self, text: &str) -> Result<Vec<u32>, ClientError> {
            Ok(text.split_whitespace().map(|_| 0).collect())
        }
    }

    struct Broken;

    impl Tokenizer for Broken {
        fn encode(&self, _text: &str) -> Result<Vec<u32>, ClientError> {
            Err("vocabulary missing".into())
        }
    }

    #[test]
    fn bands() {
        let gate = InputGate::new(Arc::new(Words), 10);
        assert!(matches!(
            gate.check_input_tokens("one two three"),
            InputTokenCheck::Ok { token_count: 3, .. }
        ));
        assert!(matches!(
            gate.check_input_tokens("a b c d e f g h i j"),
            InputTokenCheck::Warning { token_count: 10, .. }
        ));
        let err = gate.check_input_tokens("a b c d e f g h i j k l");
        assert!(err.is_error());
        assert_eq!(err.token_count(), 12);
    }

    #[test]
    fn message_reports_overage_and_reduction() {
        // over by 1000 of 5000 → 20% + 10% buffer
        let msg = token_limit_message(5000, 4000);
        assert!(msg.contains("maximum token limit of 4000"));
        assert!(msg.contains("Current token count: 5000 (over by 1000)"));
        assert!(msg.contains("about 30%"));
    }

    #[test]
    fn tokenizer_failure_is_an_error() {
        let gate = InputGate::new(Arc::new(Broken), 10);
        match gate.check_input_tokens("hi") {
            InputTokenCheck::Error { kind, message, .. } => {
                assert_eq!(kind, InputErrorKind::TokenCountError);
                assert!(message.contains("vocabulary missing"));
            }
            other => panic!("expected error, got {:?}", other),
        }
    }

    #[test]
    fn limit_is_adjustable() {
        let gate = InputGate::new(Arc::new(Words), 1);
        assert!(gate.check_input_tokens("a b").is_error());
        gate.set_max_input_tokens(100);
        assert!(!gate.check_input_tokens("a b").is_error());
    }

    #[test]
    fn cl100k_counts_tokens() {
        let tokens = Cl100kTokenizer.encode("Hello, world!").unwrap();
        assert!(!tokens.is_empty());
        assert!(tokens.len() < "Hello, world!".len());
    }
}
