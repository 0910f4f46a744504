//! HTTP surface: chat (one-shot and streaming), analysis, speech synthesis,
//! and health.

use std::convert::Infallible;
use std::sync::Arc;

use axum::{
    Json, Router,
    body::Body,
    extract::State,
    extract::rejection::JsonRejection,
    http::{StatusCode, header},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use futures::StreamExt;
use serde::Deserialize;
use serde_json::json;

use relay_core::Orchestrator;
use relay_core::model::Message;
use relay_core::orchestrator::{ChatOutcome, ChatParams};
use relay_core::relay::{StreamEvent, frame_events};
use relay_core::tts::TtsOutcome;

#[derive(Clone)]
pub struct AppState {
    pub orchestrator: Arc<Orchestrator>,
}

pub fn router(orchestrator: Arc<Orchestrator>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/chat", post(chat))
        .route("/analysis", post(analysis))
        .route("/voice/tts", post(voice))
        .with_state(AppState { orchestrator })
}

#[derive(Debug, Deserialize)]
struct ChatRequest {
    messages: Vec<Message>,
    #[serde(default)]
    personality: Option<String>,
    #[serde(default)]
    system_prompt: Option<String>,
    #[serde(default)]
    temperature: Option<f32>,
    #[serde(default)]
    streaming: bool,
}

impl ChatRequest {
    fn into_params(self) -> ChatParams {
        ChatParams {
            messages: self.messages,
            personality: self.personality,
            system_prompt: self.system_prompt,
            temperature: self.temperature,
        }
    }
}

#[derive(Debug, Deserialize)]
struct AnalysisRequest {
    content: String,
    #[serde(rename = "analysisType", default)]
    analysis_type: Option<String>,
}

#[derive(Debug, Deserialize)]
struct VoiceRequest {
    text: String,
    #[serde(default)]
    voice: Option<String>,
    #[serde(default)]
    settings: Option<serde_json::Value>,
}

async fn chat(
    State(state): State<AppState>,
    body: Result<Json<ChatRequest>, JsonRejection>,
) -> Response {
    let Json(req) = match body {
        Ok(json) => json,
        Err(rejection) => return malformed(rejection),
    };
    if req.streaming {
        let events = state.orchestrator.chat_stream(req.into_params()).await;
        return sse_response(events);
    }
    let outcome = state.orchestrator.process_chat(req.into_params()).await;
    outcome_response(outcome)
}

async fn analysis(
    State(state): State<AppState>,
    body: Result<Json<AnalysisRequest>, JsonRejection>,
) -> Response {
    let Json(req) = match body {
        Ok(json) => json,
        Err(rejection) => return malformed(rejection),
    };
    let outcome = state
        .orchestrator
        .process_analysis(&req.content, req.analysis_type.as_deref())
        .await;
    // Analysis responses carry the text directly instead of a message object.
    match outcome {
        ChatOutcome::Success {
            message, metadata, ..
        } => Json(json!({
            "success": true,
            "content": message.content,
            "metadata": metadata,
        }))
        .into_response(),
        failure => outcome_response(failure),
    }
}

async fn voice(
    State(state): State<AppState>,
    body: Result<Json<VoiceRequest>, JsonRejection>,
) -> Response {
    let Json(req) = match body {
        Ok(json) => json,
        Err(rejection) => return malformed(rejection),
    };
    match state
        .orchestrator
        .process_tts(&req.text, req.voice.as_deref())
        .await
    {
        Ok(TtsOutcome::Audio {
            bytes,
            content_type,
            vendor,
        }) => (
            [
                (header::CONTENT_TYPE, content_type),
                (
                    header::HeaderName::from_static("x-tts-vendor"),
                    vendor.to_string(),
                ),
            ],
            bytes,
        )
            .into_response(),
        Ok(TtsOutcome::Browser) => Json(json!({
            "useBrowserTTS": true,
            "text": req.text,
            "voice": req.voice,
            "settings": req.settings,
        }))
        .into_response(),
        Err(e) => AppError(e).into_response(),
    }
}

async fn health(State(state): State<AppState>) -> Response {
    let report = state.orchestrator.health_check().await;
    let status = if report.healthy {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (status, Json(report)).into_response()
}

/// Body extraction failures are validation errors, status 400.
fn malformed(rejection: JsonRejection) -> Response {
    (
        StatusCode::BAD_REQUEST,
        Json(json!({
            "success": false,
            "code": "validation",
            "error": rejection.body_text(),
        })),
    )
        .into_response()
}

/// Wraps a relayed event sequence as an SSE body: one frame per event, plus
/// the `[DONE]` sentinel frame right after `complete`.
fn sse_response(events: futures::stream::BoxStream<'static, StreamEvent>) -> Response {
    let frames = frame_events(events).map(Ok::<_, Infallible>);
    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, "text/event-stream")
        .header(header::CACHE_CONTROL, "no-cache")
        .header(header::CONNECTION, "keep-alive")
        .body(Body::from_stream(frames))
        .unwrap_or_else(|_| StatusCode::INTERNAL_SERVER_ERROR.into_response())
}

fn outcome_response(outcome: ChatOutcome) -> Response {
    let status = match &outcome {
        ChatOutcome::Success { .. } => StatusCode::OK,
        ChatOutcome::Failure { code, .. } => status_for(code),
    };
    (status, Json(outcome)).into_response()
}

/// Upstream failures (timeouts, rate limits, network errors) all surface as
/// 500 so clients see one retriable bucket; only bad requests and missing
/// configuration get their own statuses.
fn status_for(code: &str) -> StatusCode {
    match code {
        "validation" => StatusCode::BAD_REQUEST,
        "configuration" => StatusCode::SERVICE_UNAVAILABLE,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

/// Error wrapper for core errors escaping a handler.
struct AppError(relay_core::RelayError);

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (code, message) = relay_core::orchestrator::translate_error(&self.0);
        tracing::error!(error = %self.0, "request failed");
        (
            status_for(code),
            Json(json!({ "success": false, "code": code, "error": message })),
        )
            .into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::Request;
    use http_body_util::BodyExt;
    use relay_core::Config;
    use relay_core::config::DemoCfg;
    use relay_core::demo::RESPONSES;
    use tower::ServiceExt;

    fn demo_router() -> Router {
        let cfg = Config {
            demo: DemoCfg {
                initial_delay_ms: 1,
                chunk_delay_ms: 0,
            },
            ..Default::default()
        };
        router(Arc::new(
            Orchestrator::from_config(&cfg).expect("orchestrator"),
        ))
    }

    fn post_json(path: &str, body: serde_json::Value) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(path)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .expect("request")
    }

    async fn body_json(resp: Response) -> serde_json::Value {
        let bytes = resp.into_body().collect().await.expect("body").to_bytes();
        serde_json::from_slice(&bytes).expect("json body")
    }

    #[tokio::test]
    async fn health_reports_demo_services() {
        let resp = demo_router()
            .oneshot(Request::get("/health").body(Body::empty()).expect("request"))
            .await
            .expect("response");
        assert_eq!(resp.status(), StatusCode::OK);
        let json = body_json(resp).await;
        assert_eq!(json["status"], "healthy");
        assert_eq!(json["services"]["chat"], "demo");
        assert_eq!(json["services"]["voice"], "browser");
        assert!(json["timestamp"].as_i64().unwrap_or(0) > 0);
    }

    #[tokio::test]
    async fn chat_returns_demo_greeting() {
        let resp = demo_router()
            .oneshot(post_json(
                "/chat",
                serde_json::json!({
                    "messages": [{"id": "m1", "role": "user", "content": "hello"}]
                }),
            ))
            .await
            .expect("response");
        assert_eq!(resp.status(), StatusCode::OK);
        let json = body_json(resp).await;
        assert_eq!(json["success"], true);
        assert_eq!(json["message"]["content"], RESPONSES[0]);
        assert_eq!(json["metadata"]["demoMode"], true);
    }

    #[tokio::test]
    async fn chat_with_no_messages_is_bad_request() {
        let resp = demo_router()
            .oneshot(post_json("/chat", serde_json::json!({ "messages": [] })))
            .await
            .expect("response");
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        let json = body_json(resp).await;
        assert_eq!(json["success"], false);
        assert_eq!(json["code"], "validation");
    }

    #[tokio::test]
    async fn chat_with_malformed_body_is_bad_request() {
        let resp = demo_router()
            .oneshot(post_json("/chat", serde_json::json!({ "bogus": 1 })))
            .await
            .expect("response");
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        let json = body_json(resp).await;
        assert_eq!(json["code"], "validation");
    }

    #[tokio::test]
    async fn streaming_chat_emits_framed_events() {
        let resp = demo_router()
            .oneshot(post_json(
                "/chat",
                serde_json::json!({
                    "messages": [{"id": "m1", "role": "user", "content": "hello"}],
                    "streaming": true
                }),
            ))
            .await
            .expect("response");
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(
            resp.headers()
                .get(header::CONTENT_TYPE)
                .and_then(|v| v.to_str().ok()),
            Some("text/event-stream")
        );
        let body = resp.into_body().collect().await.expect("body").to_bytes();
        let text = String::from_utf8(body.to_vec()).expect("utf8");
        assert!(text.starts_with("data: {\"type\":\"start\"}\n\n"));
        assert!(text.contains("\"type\":\"chunk\""));
        assert!(text.contains("\"type\":\"complete\""));
        assert!(text.ends_with("data: [DONE]\n\n"));
    }

    #[tokio::test]
    async fn streamed_chunks_reassemble_via_reader() {
        let resp = demo_router()
            .oneshot(post_json(
                "/chat",
                serde_json::json!({
                    "messages": [{"id": "m1", "role": "user", "content": "what can you do"}],
                    "streaming": true
                }),
            ))
            .await
            .expect("response");
        let stream = resp
            .into_body()
            .into_data_stream()
            .map(|r| r.map_err(|e| relay_core::RelayError::Other(e.into())));
        let mut chunks = 0;
        let outcome = relay_core::reader::read_stream(Box::pin(stream), |_| chunks += 1)
            .await
            .expect("outcome");
        assert!(chunks > 1);
        assert_eq!(
            outcome,
            relay_core::reader::ReadOutcome::Complete {
                content: RESPONSES[2].to_string()
            }
        );
    }

    #[tokio::test]
    async fn analysis_without_provider_is_service_unavailable() {
        let resp = demo_router()
            .oneshot(post_json(
                "/analysis",
                serde_json::json!({ "content": "recap this conversation" }),
            ))
            .await
            .expect("response");
        assert_eq!(resp.status(), StatusCode::SERVICE_UNAVAILABLE);
        let json = body_json(resp).await;
        assert_eq!(json["code"], "configuration");
    }

    #[tokio::test]
    async fn analysis_with_missing_content_is_bad_request() {
        let resp = demo_router()
            .oneshot(post_json(
                "/analysis",
                serde_json::json!({ "analysisType": "summary" }),
            ))
            .await
            .expect("response");
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        let json = body_json(resp).await;
        assert_eq!(json["code"], "validation");
    }

    #[test]
    fn upstream_failures_map_to_internal_error() {
        assert_eq!(status_for("validation"), StatusCode::BAD_REQUEST);
        assert_eq!(status_for("configuration"), StatusCode::SERVICE_UNAVAILABLE);
        for code in ["timeout", "rate_limited", "unavailable", "internal"] {
            assert_eq!(status_for(code), StatusCode::INTERNAL_SERVER_ERROR);
        }
    }

    #[tokio::test]
    async fn voice_without_vendors_uses_browser_synthesis() {
        let resp = demo_router()
            .oneshot(post_json(
                "/voice/tts",
                serde_json::json!({ "text": "hi", "voice": "rachel" }),
            ))
            .await
            .expect("response");
        assert_eq!(resp.status(), StatusCode::OK);
        let json = body_json(resp).await;
        assert_eq!(json["useBrowserTTS"], true);
        assert_eq!(json["text"], "hi");
        assert_eq!(json["voice"], "rachel");
    }

    #[tokio::test]
    async fn voice_with_empty_text_is_bad_request() {
        let resp = demo_router()
            .oneshot(post_json("/voice/tts", serde_json::json!({ "text": "  " })))
            .await
            .expect("response");
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        let json = body_json(resp).await;
        assert_eq!(json["code"], "validation");
    }
}
