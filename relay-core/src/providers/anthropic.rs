//! Anthropic messages client. One-shot only; streaming goes through the
//! trait's single-delta fallback.

use async_trait::async_trait;
use secrecy::ExposeSecret;
use serde::{Deserialize, Serialize};

use crate::config::ProviderCfg;
use crate::error::CoreResult;
use crate::http_client::HttpClient;
use crate::model::{CompletionRequest, CompletionResponse, Role, TokenUsage};
use crate::provider::CompletionProvider;

const PROVIDER: &str = "anthropic";
const API_VERSION: &str = "2023-06-01";

pub struct AnthropicProvider {
    http: HttpClient,
    api_key: secrecy::SecretString,
    base: String,
    model: String,
}

impl AnthropicProvider {
    pub fn new(http: HttpClient, cfg: &ProviderCfg) -> Self {
        Self {
            http,
            api_key: cfg.api_key.clone(),
            base: cfg.base.trim_end_matches('/').to_string(),
            model: cfg.model.clone(),
        }
    }

    fn body(&self, req: &CompletionRequest) -> MessagesBody {
        // System content rides in the top-level field, not the message list.
        let mut system = req.system_prompt.clone();
        let mut messages = Vec::with_capacity(req.messages.len());
        for m in &req.messages {
            match m.role {
                Role::System => {
                    if system.is_none() {
                        system = Some(m.content.clone());
                    }
                }
                Role::User => messages.push(WireMessage {
                    role: "user",
                    content: m.content.clone(),
                }),
                Role::Assistant => messages.push(WireMessage {
                    role: "assistant",
                    content: m.content.clone(),
                }),
            }
        }
        MessagesBody {
            model: self.model.clone(),
            max_tokens: req.max_tokens,
            temperature: req.temperature,
            system,
            messages,
        }
    }
}

#[derive(Serialize)]
struct WireMessage {
    role: &'static str,
    content: String,
}

#[derive(Serialize)]
struct MessagesBody {
    model: String,
    max_tokens: u32,
    temperature: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<String>,
    messages: Vec<WireMessage>,
}

#[derive(Deserialize)]
struct MessagesResponse {
    model: String,
    content: Vec<ContentBlock>,
    #[serde(default)]
    usage: Option<WireUsage>,
}

#[derive(Deserialize)]
struct ContentBlock {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    text: Option<String>,
}

#[derive(Deserialize, Default)]
struct WireUsage {
    #[serde(default)]
    input_tokens: u32,
    #[serde(default)]
    output_tokens: u32,
}

#[async_trait]
impl CompletionProvider for AnthropicProvider {
    fn name(&self) -> &str {
        PROVIDER
    }

    async fn complete_once(&self, req: &CompletionRequest) -> CoreResult<CompletionResponse> {
        let url = format!("{}/v1/messages", self.base);
        let key = self.api_key.expose_secret().to_string();
        let (resp, latency) = self
            .http
            .post_json::<_, MessagesResponse>(
                PROVIDER,
                &url,
                &self.body(req),
                &[
                    ("x-api-key", key.as_str()),
                    ("anthropic-version", API_VERSION),
                ],
            )
            .await?;

        let content: String = resp
            .content
            .iter()
            .filter(|b| b.kind == "text")
            .filter_map(|b| b.text.as_deref())
            .collect();
        let usage = resp.usage.unwrap_or_default();
        Ok(CompletionResponse {
            content,
            model: resp.model,
            usage: TokenUsage {
                prompt: usage.input_tokens,
                completion: usage.output_tokens,
                total: usage.input_tokens + usage.output_tokens,
            },
            latency_ms: latency,
        })
    }
}
