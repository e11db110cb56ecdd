//! Uniform completion client over three hosted LLM backends.

pub mod anthropic;
pub mod any;
pub mod azure;
pub mod bedrock;
pub mod error;
pub mod http;
mod messages;
#[cfg(feature = "mock")]
pub mod mock;
pub mod provider;

pub use any::AnyProvider;
pub use error::{LlmError, ProviderError};
pub use provider::{LlmProvider, Message, Prompt, Role};
