//! Provider specific [`ClientWrapper`](crate::client_wrapper::ClientWrapper) implementations.
//!
//! Every provider is reached through an OpenAI-compatible chat-completions endpoint, so the
//! concrete clients share one transport in [`common`]. [`provider`] maps configuration onto
//! them.

pub mod common;

pub mod claude;
pub mod gemini;
pub mod openai;
pub mod provider;
