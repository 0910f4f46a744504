//! Core library for the chat relay: provider clients, the demo fallback, the
//! SSE stream relay and its client-side reader, text-to-speech dispatch, and
//! the orchestrator that ties them together.
//!
//! The binary crate owns the HTTP surface; everything here is transport
//! agnostic apart from speaking SSE bytes at the relay boundary.

pub mod config;
pub mod demo;
pub mod error;
pub mod http_client;
pub mod model;
pub mod orchestrator;
pub mod personality;
pub mod provider;
pub mod providers;
pub mod reader;
pub mod relay;
pub mod tts;

pub use config::Config;
pub use error::{CoreResult, RelayError};
pub use orchestrator::Orchestrator;
pub use relay::StreamEvent;
