//! # Palaver Providers
//!
//! LM provider adapters implementing the `palaver-core` provider
//! contract:
//! - [`OpenAiClient`]: any OpenAI-compatible chat-completions endpoint
//! - [`MockProvider`]: scripted responses for tests and examples

mod mock;
mod openai;

pub use mock::MockProvider;
pub use openai::{OpenAiClient, OpenAiConfig};
