//! Coordinates provider selection, demo fallback, personalities, and error
//! translation. One orchestrator instance is built at startup and shared via
//! `Arc`; it holds no global state.

use std::sync::Arc;

use futures::StreamExt;
use futures::stream::BoxStream;
use serde::Serialize;

use crate::config::Config;
use crate::demo::DemoProvider;
use crate::error::{CoreResult, RelayError};
use crate::http_client::HttpClient;
use crate::model::{CompletionRequest, Message, Role, TokenUsage, now_ms};
use crate::personality;
use crate::provider::CompletionProvider;
use crate::providers::{AnthropicProvider, OpenAiProvider};
use crate::relay::{self, StreamEvent};
use crate::tts::{TtsEngine, TtsOutcome};

/// Caller-facing chat parameters. Personality defaults to
/// [`personality::DEFAULT_PERSONALITY`]; an explicit system prompt or
/// temperature overrides the personality's.
#[derive(Debug, Clone, Default)]
pub struct ChatParams {
    pub messages: Vec<Message>,
    pub personality: Option<String>,
    pub system_prompt: Option<String>,
    pub temperature: Option<f32>,
}

/// Terminal result of a non-streaming chat or analysis call. Provider errors
/// never escape as `Err`; they come back translated as the `Failure` variant
/// so callers can show them verbatim.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(untagged)]
pub enum ChatOutcome {
    Success {
        success: bool,
        message: Message,
        metadata: ChatMetadata,
    },
    Failure {
        success: bool,
        code: &'static str,
        error: String,
    },
}

impl ChatOutcome {
    fn ok(message: Message, metadata: ChatMetadata) -> Self {
        Self::Success {
            success: true,
            message,
            metadata,
        }
    }

    fn fail(code: &'static str, error: impl Into<String>) -> Self {
        Self::Failure {
            success: false,
            code,
            error: error.into(),
        }
    }
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ChatMetadata {
    pub model: String,
    pub personality: String,
    pub demo_mode: bool,
    pub latency_ms: u32,
    pub usage: TokenUsage,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct HealthReport {
    pub healthy: bool,
    pub status: &'static str,
    pub timestamp: i64,
    pub services: HealthServices,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct HealthServices {
    pub chat: &'static str,
    pub streaming: &'static str,
    pub voice: &'static str,
}

pub struct Orchestrator {
    provider: Option<Arc<dyn CompletionProvider>>,
    demo: DemoProvider,
    tts: TtsEngine,
    tts_configured: bool,
}

impl Orchestrator {
    /// Wires up the live provider (OpenAI preferred, Anthropic next) or, with
    /// no usable credentials, leaves chat in demo mode.
    pub fn from_config(cfg: &Config) -> CoreResult<Self> {
        let http = HttpClient::new(&cfg.http)?;
        let provider: Option<Arc<dyn CompletionProvider>> = if let Some(openai) = &cfg.openai {
            Some(Arc::new(OpenAiProvider::new(http.clone(), openai)))
        } else if let Some(anthropic) = &cfg.anthropic {
            Some(Arc::new(AnthropicProvider::new(http.clone(), anthropic)))
        } else {
            None
        };
        match &provider {
            Some(p) => tracing::info!(provider = p.name(), "chat provider configured"),
            None => tracing::info!("no provider credentials found, running in demo mode"),
        }

        let tts_configured = cfg.tts.elevenlabs_key.is_some() || cfg.tts.azure_key.is_some();
        Ok(Self {
            provider,
            demo: DemoProvider::new(&cfg.demo),
            tts: TtsEngine::new(&cfg.tts, &cfg.http)?,
            tts_configured,
        })
    }

    pub fn demo_mode(&self) -> bool {
        self.provider.is_none()
    }

    fn resolve_persona(params: &ChatParams) -> CoreResult<&'static personality::Personality> {
        match params.personality.as_deref() {
            None => Ok(personality::default()),
            Some(id) => personality::get(id)
                .ok_or_else(|| RelayError::Validation(format!("unknown personality: {id}"))),
        }
    }

    fn build_request(&self, params: &ChatParams) -> CoreResult<(CompletionRequest, String)> {
        if params.messages.is_empty() {
            return Err(RelayError::Validation(
                "at least one message is required".into(),
            ));
        }
        let persona = Self::resolve_persona(params)?;

        let mut req = CompletionRequest::new(params.messages.clone());
        req.system_prompt = Some(
            params
                .system_prompt
                .clone()
                .unwrap_or_else(|| persona.system_prompt.to_string()),
        );
        req.temperature = params.temperature.unwrap_or(persona.creativity);
        Ok((req, persona.id.to_string()))
    }

    /// Non-streaming chat. Demo fallback applies when no provider is
    /// configured; live provider errors come back translated.
    pub async fn process_chat(&self, params: ChatParams) -> ChatOutcome {
        let (req, persona) = match self.build_request(&params) {
            Ok(pair) => pair,
            Err(e) => return error_outcome(&e),
        };

        let provider: &dyn CompletionProvider = match &self.provider {
            Some(p) => p.as_ref(),
            None => &self.demo,
        };
        match provider.complete_once(&req).await {
            Ok(resp) => ChatOutcome::ok(
                Message::new(Role::Assistant, resp.content),
                ChatMetadata {
                    model: resp.model,
                    personality: persona,
                    demo_mode: self.demo_mode(),
                    latency_ms: resp.latency_ms,
                    usage: resp.usage,
                },
            ),
            Err(e) => {
                tracing::error!(error = %e, provider = provider.name(), "chat completion failed");
                error_outcome(&e)
            }
        }
    }

    /// Streaming chat as a framed event sequence: start, chunks, then exactly
    /// one terminal. All failure paths, including validation and connect
    /// errors, surface as an in-stream error event with a translated message.
    pub async fn chat_stream(&self, params: ChatParams) -> BoxStream<'static, StreamEvent> {
        let source = match self.build_request(&params) {
            Ok((req, _)) => match &self.provider {
                Some(p) => p.complete_stream(&req).await,
                None => Ok(self.demo.token_stream(&req)),
            },
            Err(e) => Err(e),
        };

        let tokens = match source {
            Ok(stream) => stream.map(|item| item.map_err(|e| translated(&e))).boxed(),
            Err(e) => futures::stream::once(async move { Err(translated(&e)) }).boxed(),
        };
        relay::events(tokens).boxed()
    }

    /// Conversation analysis. Deliberately no demo fallback: canned analysis
    /// of a real conversation would be misleading, so an unconfigured
    /// provider is reported as such.
    pub async fn process_analysis(&self, content: &str, analysis_type: Option<&str>) -> ChatOutcome {
        if content.trim().is_empty() {
            return ChatOutcome::fail("validation", "content must not be empty");
        }
        let Some(provider) = &self.provider else {
            return ChatOutcome::fail(
                "configuration",
                "Analysis requires a configured AI provider. Add your OPENAI_API_KEY to enable it.",
            );
        };

        let mut req = CompletionRequest::new(vec![Message::new(Role::User, content)]);
        req.system_prompt = Some(analysis_prompt(analysis_type).to_string());
        req.temperature = 0.3;
        match provider.complete_once(&req).await {
            Ok(resp) => ChatOutcome::ok(
                Message::new(Role::Assistant, resp.content),
                ChatMetadata {
                    model: resp.model,
                    personality: "analyst".into(),
                    demo_mode: false,
                    latency_ms: resp.latency_ms,
                    usage: resp.usage,
                },
            ),
            Err(e) => {
                tracing::error!(error = %e, "analysis failed");
                error_outcome(&e)
            }
        }
    }

    /// Voice-optimized chat: same routing and fallback as `process_chat`,
    /// with a speech-friendly instruction appended to the system prompt since
    /// the reply will be spoken aloud.
    pub async fn process_voice(&self, mut params: ChatParams) -> ChatOutcome {
        let persona = match Self::resolve_persona(&params) {
            Ok(p) => p,
            Err(e) => return error_outcome(&e),
        };
        let base = params
            .system_prompt
            .take()
            .unwrap_or_else(|| persona.system_prompt.to_string());
        params.system_prompt = Some(format!("{base}{VOICE_PROMPT_SUFFIX}"));
        self.process_chat(params).await
    }

    /// Speech synthesis via the vendor fallback chain.
    pub async fn process_tts(&self, text: &str, voice: Option<&str>) -> CoreResult<TtsOutcome> {
        let trimmed = text.trim();
        if trimmed.is_empty() {
            return Err(RelayError::Validation("text must not be empty".into()));
        }
        Ok(self.tts.speak(trimmed, voice).await)
    }

    /// Liveness summary. Demo mode is healthy as-is; with a live provider a
    /// tiny synthetic completion probes the real path. Never fails.
    pub async fn health_check(&self) -> HealthReport {
        let (healthy, chat) = match &self.provider {
            None => (true, "demo"),
            Some(p) => {
                let mut req =
                    CompletionRequest::new(vec![Message::new(Role::User, "health check")]);
                req.max_tokens = 5;
                match p.complete_once(&req).await {
                    Ok(_) => (true, "live"),
                    Err(e) => {
                        tracing::warn!(error = %e, "health probe failed");
                        (false, "error")
                    }
                }
            }
        };
        HealthReport {
            healthy,
            status: if healthy { "healthy" } else { "degraded" },
            timestamp: now_ms(),
            services: HealthServices {
                chat,
                streaming: chat,
                voice: if self.tts_configured { "live" } else { "browser" },
            },
        }
    }
}

const VOICE_PROMPT_SUFFIX: &str = " Keep responses conversational and concise, as they will be spoken aloud. Avoid markdown, bullet lists, and code blocks.";

fn analysis_prompt(analysis_type: Option<&str>) -> &'static str {
    match analysis_type {
        Some("summary") => {
            "You are an expert summarizer. Condense the content into its essential points, preserving tone and intent. Be concise and faithful."
        }
        Some("sentiment") => {
            "You are an expert in sentiment analysis. Describe the emotional tone of the content, notable shifts, and what drives them. Be specific."
        }
        _ => {
            "You are an expert conversation analyst. Review the content and provide deep insights: key themes, emotional tone, unresolved questions, and concrete suggested next steps. Be specific and reference the actual content."
        }
    }
}

/// Maps an internal error to a short machine code and a message safe to show
/// to end users. Vendor details stay in the logs.
pub fn translate_error(err: &RelayError) -> (&'static str, String) {
    let raw = err.to_string().to_lowercase();
    match err {
        RelayError::Validation(msg) => ("validation", msg.clone()),
        RelayError::Configuration(_) => ("configuration", CONFIG_MSG.into()),
        RelayError::RateLimited { .. } => ("rate_limited", RATE_MSG.into()),
        RelayError::Timeout { .. } => ("timeout", TIMEOUT_MSG.into()),
        RelayError::Unavailable { .. } => ("unavailable", NETWORK_MSG.into()),
        _ if raw.contains("api key") || raw.contains("configuration") => {
            ("configuration", CONFIG_MSG.into())
        }
        _ if raw.contains("rate limit") => ("rate_limited", RATE_MSG.into()),
        _ if raw.contains("timeout") || raw.contains("timed out") => {
            ("timeout", TIMEOUT_MSG.into())
        }
        _ if raw.contains("network") || raw.contains("connection") => {
            ("unavailable", NETWORK_MSG.into())
        }
        _ => ("internal", GENERIC_MSG.into()),
    }
}

const CONFIG_MSG: &str =
    "The AI service is not configured correctly. Please check the API key settings.";
const RATE_MSG: &str = "Too many requests right now. Please wait a moment and try again.";
const TIMEOUT_MSG: &str = "The AI service took too long to respond. Please try again.";
const NETWORK_MSG: &str =
    "Unable to reach the AI service. Please check your connection and try again.";
const GENERIC_MSG: &str = "Something went wrong while generating a response. Please try again.";

fn error_outcome(err: &RelayError) -> ChatOutcome {
    let (code, message) = translate_error(err);
    ChatOutcome::fail(code, message)
}

fn translated(err: &RelayError) -> RelayError {
    let (_, message) = translate_error(err);
    RelayError::Other(anyhow::anyhow!(message))
}
