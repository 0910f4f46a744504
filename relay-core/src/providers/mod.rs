//! Vendor-specific [`CompletionProvider`](crate::provider::CompletionProvider)
//! implementations.

pub mod anthropic;
pub mod openai;

pub use anthropic::AnthropicProvider;
pub use openai::OpenAiProvider;
