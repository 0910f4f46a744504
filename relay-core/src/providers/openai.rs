//! OpenAI chat-completions client, one-shot and streaming.

use async_trait::async_trait;
use futures::StreamExt;
use secrecy::ExposeSecret;
use serde::{Deserialize, Serialize};

use crate::config::ProviderCfg;
use crate::error::CoreResult;
use crate::http_client::{HttpClient, SseLine};
use crate::model::{CompletionRequest, CompletionResponse, Message, Role, TokenUsage};
use crate::provider::{CompletionProvider, TokenStream};

const PROVIDER: &str = "openai";

pub struct OpenAiProvider {
    http: HttpClient,
    api_key: secrecy::SecretString,
    base: String,
    model: String,
}

impl OpenAiProvider {
    pub fn new(http: HttpClient, cfg: &ProviderCfg) -> Self {
        Self {
            http,
            api_key: cfg.api_key.clone(),
            base: cfg.base.trim_end_matches('/').to_string(),
            model: cfg.model.clone(),
        }
    }

    fn url(&self) -> String {
        format!("{}/v1/chat/completions", self.base)
    }

    fn auth(&self) -> String {
        format!("Bearer {}", self.api_key.expose_secret())
    }

    fn body(&self, req: &CompletionRequest, stream: bool) -> ChatBody {
        let mut messages = Vec::with_capacity(req.messages.len() + 1);
        if let Some(sys) = &req.system_prompt {
            messages.push(WireMessage {
                role: "system",
                content: sys.clone(),
            });
        }
        messages.extend(req.messages.iter().map(|m: &Message| WireMessage {
            role: match m.role {
                Role::System => "system",
                Role::User => "user",
                Role::Assistant => "assistant",
            },
            content: m.content.clone(),
        }));
        ChatBody {
            model: self.model.clone(),
            messages,
            temperature: req.temperature,
            max_tokens: req.max_tokens,
            stream,
        }
    }
}

#[derive(Serialize)]
struct WireMessage {
    role: &'static str,
    content: String,
}

#[derive(Serialize)]
struct ChatBody {
    model: String,
    messages: Vec<WireMessage>,
    temperature: f32,
    max_tokens: u32,
    stream: bool,
}

#[derive(Deserialize)]
struct ChatResponse {
    model: String,
    choices: Vec<Choice>,
    #[serde(default)]
    usage: Option<WireUsage>,
}

#[derive(Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Deserialize)]
struct ChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Deserialize, Default)]
struct WireUsage {
    #[serde(default)]
    prompt_tokens: u32,
    #[serde(default)]
    completion_tokens: u32,
    #[serde(default)]
    total_tokens: u32,
}

#[derive(Deserialize)]
struct StreamChunk {
    choices: Vec<StreamChoice>,
}

#[derive(Deserialize)]
struct StreamChoice {
    delta: Delta,
}

#[derive(Deserialize, Default)]
struct Delta {
    #[serde(default)]
    content: Option<String>,
}

/// What one SSE line contributes to the token stream.
enum Piece {
    Delta(String),
    Done,
    Skip,
}

fn parse_stream_line(line: &str) -> Piece {
    let Some(payload) = line.strip_prefix("data: ") else {
        return Piece::Skip; // blank keep-alives and event: lines
    };
    if payload.trim() == "[DONE]" {
        return Piece::Done;
    }
    match serde_json::from_str::<StreamChunk>(payload) {
        Ok(chunk) => chunk
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.delta.content)
            .map_or(Piece::Skip, Piece::Delta),
        Err(e) => {
            // Role-only and finish_reason deltas land here too; not worth
            // failing the stream over.
            tracing::debug!(error = %e, "unparseable stream line");
            Piece::Skip
        }
    }
}

#[async_trait]
impl CompletionProvider for OpenAiProvider {
    fn name(&self) -> &str {
        PROVIDER
    }

    async fn complete_once(&self, req: &CompletionRequest) -> CoreResult<CompletionResponse> {
        let auth = self.auth();
        let (resp, latency) = self
            .http
            .post_json::<_, ChatResponse>(
                PROVIDER,
                &self.url(),
                &self.body(req, false),
                &[("Authorization", auth.as_str())],
            )
            .await?;

        let content = resp
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .unwrap_or_default();
        let usage = resp.usage.unwrap_or_default();
        Ok(CompletionResponse {
            content,
            model: resp.model,
            usage: TokenUsage {
                prompt: usage.prompt_tokens,
                completion: usage.completion_tokens,
                total: usage.total_tokens,
            },
            latency_ms: latency,
        })
    }

    async fn complete_stream(&self, req: &CompletionRequest) -> CoreResult<TokenStream> {
        let auth = self.auth();
        let lines = self
            .http
            .post_sse_lines(
                PROVIDER,
                &self.url(),
                &self.body(req, true),
                &[("Authorization", auth.as_str())],
            )
            .await?;

        let stream = lines
            .map(|item| item.map(|SseLine { line }| parse_stream_line(&line)))
            .take_while(|item| {
                futures::future::ready(!matches!(item, Ok(Piece::Done)))
            })
            .filter_map(|item| async move {
                match item {
                    Ok(Piece::Delta(d)) => Some(Ok(d)),
                    Ok(_) => None,
                    Err(e) => Some(Err(e)),
                }
            })
            .boxed();
        Ok(stream)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::HttpCfg;
    use httpmock::Method::POST;
    use httpmock::MockServer;
    use serde_json::json;

    fn provider(base: &str) -> OpenAiProvider {
        OpenAiProvider::new(
            HttpClient::new(&HttpCfg::default()).expect("client"),
            &ProviderCfg {
                api_key: "sk-test".into(),
                base: base.to_string(),
                model: "gpt-4o".into(),
            },
        )
    }

    fn req(content: &str) -> CompletionRequest {
        CompletionRequest::new(vec![Message::new(Role::User, content)])
    }

    #[tokio::test]
    async fn one_shot_parses_content_and_usage() {
        let server = MockServer::start();
        let m = server.mock(|when, then| {
            when.method(POST)
                .path("/v1/chat/completions")
                .header("authorization", "Bearer sk-test")
                .json_body_partial(r#"{"model":"gpt-4o","stream":false}"#);
            then.status(200).json_body(json!({
                "model": "gpt-4o-2024",
                "choices": [{"message": {"role": "assistant", "content": "hi there"}}],
                "usage": {"prompt_tokens": 9, "completion_tokens": 3, "total_tokens": 12}
            }));
        });

        let resp = provider(&server.base_url())
            .complete_once(&req("hello"))
            .await
            .expect("response");

        assert_eq!(resp.content, "hi there");
        assert_eq!(resp.model, "gpt-4o-2024");
        assert_eq!(resp.usage.total, 12);
        m.assert();
    }

    #[tokio::test]
    async fn system_prompt_is_prepended() {
        let server = MockServer::start();
        let m = server.mock(|when, then| {
            when.method(POST).path("/v1/chat/completions").json_body_partial(
                r#"{"messages":[{"role":"system","content":"be terse"},{"role":"user","content":"hello"}]}"#,
            );
            then.status(200).json_body(json!({
                "model": "gpt-4o",
                "choices": [{"message": {"content": "ok"}}]
            }));
        });

        let mut request = req("hello");
        request.system_prompt = Some("be terse".into());
        provider(&server.base_url())
            .complete_once(&request)
            .await
            .expect("response");
        m.assert();
    }

    #[tokio::test]
    async fn stream_collects_deltas_until_done() {
        let server = MockServer::start();
        let body = concat!(
            "data: {\"choices\":[{\"delta\":{\"role\":\"assistant\"}}]}\n\n",
            "data: {\"choices\":[{\"delta\":{\"content\":\"Hel\"}}]}\n\n",
            "data: {\"choices\":[{\"delta\":{\"content\":\"lo\"}}]}\n\n",
            "data: [DONE]\n\n",
            "data: {\"choices\":[{\"delta\":{\"content\":\"never\"}}]}\n\n",
        );
        let _m = server.mock(|when, then| {
            when.method(POST)
                .path("/v1/chat/completions")
                .json_body_partial(r#"{"stream":true}"#);
            then.status(200)
                .header("content-type", "text/event-stream")
                .body(body);
        });

        let stream = provider(&server.base_url())
            .complete_stream(&req("hello"))
            .await
            .expect("stream");
        let deltas: Vec<String> = stream.map(|r| r.expect("delta")).collect().await;
        assert_eq!(deltas, vec!["Hel", "lo"]);
    }

    #[tokio::test]
    async fn stream_skips_malformed_lines() {
        let server = MockServer::start();
        let body = concat!(
            "data: garbage\n\n",
            "data: {\"choices\":[{\"delta\":{\"content\":\"ok\"}}]}\n\n",
            "data: [DONE]\n\n",
        );
        let _m = server.mock(|when, then| {
            when.method(POST).path("/v1/chat/completions");
            then.status(200)
                .header("content-type", "text/event-stream")
                .body(body);
        });

        let stream = provider(&server.base_url())
            .complete_stream(&req("hello"))
            .await
            .expect("stream");
        let deltas: Vec<String> = stream.map(|r| r.expect("delta")).collect().await;
        assert_eq!(deltas, vec!["ok"]);
    }

    #[tokio::test]
    async fn stream_request_error_surfaces_before_streaming() {
        let server = MockServer::start();
        let _m = server.mock(|when, then| {
            when.method(POST).path("/v1/chat/completions");
            then.status(401).body("bad key");
        });

        match provider(&server.base_url()).complete_stream(&req("hello")).await {
            Err(crate::error::RelayError::Upstream { code, .. }) => assert_eq!(code, "401"),
            Err(other) => panic!("expected Upstream, got {other:?}"),
            Ok(_) => panic!("request must fail before any tokens stream"),
        }
    }
}
