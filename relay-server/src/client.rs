//! Terminal client for a running relay, used by the `chat` and `chat-stream`
//! subcommands.

use std::io::Write;

use anyhow::{Context, bail};
use futures::StreamExt;
use serde_json::json;

use relay_core::RelayError;
use relay_core::reader::{ReadOutcome, read_stream};

fn chat_body(message: &str, personality: Option<&str>, streaming: bool) -> serde_json::Value {
    json!({
        "messages": [{"id": "cli-1", "role": "user", "content": message}],
        "personality": personality,
        "streaming": streaming,
    })
}

/// One-shot chat: prints the assistant reply and exits.
pub async fn chat_once(base: &str, message: &str, personality: Option<&str>) -> anyhow::Result<()> {
    let resp = reqwest::Client::new()
        .post(format!("{base}/chat"))
        .json(&chat_body(message, personality, false))
        .send()
        .await
        .context("request failed")?;

    let body: serde_json::Value = resp.json().await.context("invalid response body")?;
    if body["success"].as_bool() == Some(true) {
        println!("{}", body["message"]["content"].as_str().unwrap_or(""));
        if body["metadata"]["demoMode"].as_bool() == Some(true) {
            eprintln!("(demo mode: no provider credentials configured)");
        }
        Ok(())
    } else {
        bail!(
            "server error: {}",
            body["error"].as_str().unwrap_or("unknown")
        )
    }
}

/// Streaming chat: prints chunks as they arrive, flushing per chunk so the
/// text appears incrementally.
pub async fn chat_streaming(
    base: &str,
    message: &str,
    personality: Option<&str>,
) -> anyhow::Result<()> {
    let resp = reqwest::Client::new()
        .post(format!("{base}/chat"))
        .json(&chat_body(message, personality, true))
        .send()
        .await
        .context("request failed")?;
    if !resp.status().is_success() {
        bail!("server returned {}", resp.status());
    }

    let bytes = resp
        .bytes_stream()
        .map(|r| r.map_err(|e| RelayError::Other(e.into())));
    let outcome = read_stream(Box::pin(bytes), |chunk| {
        print!("{chunk}");
        let _ = std::io::stdout().flush();
    })
    .await
    .context("stream failed")?;

    match outcome {
        ReadOutcome::Complete { .. } => {
            println!();
            Ok(())
        }
        ReadOutcome::Error { message } => {
            println!();
            bail!("stream error: {message}")
        }
    }
}
