//! LLM provider layer for Quill.
//!
//! # Architecture
//!
//! - [`traits::LlmProvider`] — the call contract the agent loop depends on
//! - [`traits::ProviderError`] — failures, with cancellation kept distinct
//! - [`http_provider::HttpProvider`] — OpenAI-compatible `/chat/completions` client

pub mod http_provider;
pub mod traits;

pub use http_provider::HttpProvider;
pub use traits::{ChatOptions, LlmProvider, LlmRequestConfig, ProviderError};
