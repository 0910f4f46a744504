use std::time::Instant;

use http::{HeaderMap, StatusCode};
use reqwest::Client;
use serde::{Serialize, de::DeserializeOwned};

use crate::config::HttpCfg;
use crate::error::{CoreResult, RelayError};

/// One raw line of a Server-Sent-Events body (already split on `\n`).
#[derive(Debug, Clone)]
pub struct SseLine {
    pub line: String,
}

/// A boxed stream of `SseLine` results.
pub type SseStream =
    std::pin::Pin<Box<dyn futures_util::stream::Stream<Item = CoreResult<SseLine>> + Send>>;

/// Thin wrapper around reqwest::Client with defaults and helpers.
#[derive(Debug, Clone)]
pub struct HttpClient {
    inner: Client,
    user_agent: String,
}

impl HttpClient {
    pub fn new(cfg: &HttpCfg) -> CoreResult<Self> {
        let inner = Client::builder()
            .connect_timeout(std::time::Duration::from_millis(cfg.connect_timeout_ms))
            .timeout(std::time::Duration::from_millis(cfg.request_timeout_ms))
            .pool_max_idle_per_host(8)
            .build()
            .map_err(|e| RelayError::Other(anyhow::anyhow!("http client build failed: {e}")))?;
        Ok(Self {
            inner,
            user_agent: "chat-relay/0.1".to_string(),
        })
    }

    pub fn new_default() -> CoreResult<Self> {
        Self::new(&HttpCfg::default())
    }

    /// POST JSON, expect a 2xx JSON response. Returns the parsed body and the
    /// wall-clock latency in milliseconds.
    pub async fn post_json<T: Serialize, R: DeserializeOwned>(
        &self,
        provider: &str,
        url: &str,
        body: &T,
        headers: &[(&str, &str)],
    ) -> CoreResult<(R, u32)> {
        let start = Instant::now();
        let mut req = self
            .inner
            .post(url)
            .json(body)
            .header("User-Agent", &self.user_agent);
        for (k, v) in headers {
            req = req.header(*k, *v);
        }

        let resp = req.send().await.map_err(|e| map_send_error(provider, &e))?;
        let latency = start.elapsed().as_millis() as u32;
        let status = resp.status();
        let retry_after = parse_retry_after(resp.headers());

        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            return Err(map_http_error(provider, status, retry_after, &text));
        }

        let parsed = resp.json::<R>().await.map_err(|e| RelayError::Protocol {
            provider: provider.to_string(),
            message: format!("json decode error: {e}"),
        })?;
        Ok((parsed, latency))
    }

    /// POST JSON and return the response body as an SSE line stream.
    /// Each yielded item is one raw line (trim not applied) from the channel.
    pub async fn post_sse_lines<T: Serialize + ?Sized>(
        &self,
        provider: &str,
        url: &str,
        body: &T,
        headers: &[(&str, &str)],
    ) -> CoreResult<SseStream> {
        let mut req = self
            .inner
            .post(url)
            .json(body)
            .header("User-Agent", &self.user_agent)
            .header("Accept", "text/event-stream");
        for (k, v) in headers {
            req = req.header(*k, *v);
        }

        let resp = req.send().await.map_err(|e| map_send_error(provider, &e))?;
        let status = resp.status();
        if !status.is_success() {
            let retry_after = parse_retry_after(resp.headers());
            let body = resp.text().await.unwrap_or_default();
            return Err(map_http_error(provider, status, retry_after, &body));
        }

        let provider = provider.to_string();
        let byte_stream = resp.bytes_stream();
        let line_stream = LineStream::new(Box::pin(byte_stream), provider);
        Ok(Box::pin(line_stream))
    }

    /// POST a pre-serialized body, expect a 2xx binary response (audio).
    /// Returns the body bytes and the response content type.
    pub async fn post_bytes(
        &self,
        provider: &str,
        url: &str,
        body: String,
        content_type: &str,
        headers: &[(&str, &str)],
    ) -> CoreResult<(bytes::Bytes, String)> {
        let mut req = self
            .inner
            .post(url)
            .header("User-Agent", &self.user_agent)
            .header("Content-Type", content_type)
            .body(body);
        for (k, v) in headers {
            req = req.header(*k, *v);
        }

        let resp = req.send().await.map_err(|e| map_send_error(provider, &e))?;
        let status = resp.status();
        let retry_after = parse_retry_after(resp.headers());
        let ct = resp
            .headers()
            .get("content-type")
            .and_then(|v| v.to_str().ok())
            .unwrap_or("application/octet-stream")
            .to_string();

        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            return Err(map_http_error(provider, status, retry_after, &text));
        }

        let bytes = resp.bytes().await.map_err(|e| RelayError::Protocol {
            provider: provider.to_string(),
            message: format!("body read error: {e}"),
        })?;
        Ok((bytes, ct))
    }
}

fn map_send_error(provider: &str, e: &reqwest::Error) -> RelayError {
    if e.is_timeout() {
        RelayError::Timeout {
            provider: provider.to_string(),
        }
    } else {
        RelayError::Unavailable {
            provider: provider.to_string(),
        }
    }
}

fn parse_retry_after(headers: &HeaderMap) -> Option<u64> {
    if let Some(v) = headers.get("retry-after")
        && let Ok(s) = v.to_str()
        && let Ok(secs) = s.trim().parse::<u64>()
    {
        return Some(secs);
    }
    // HTTP-date forms are ignored; numeric seconds cover the vendors we call.
    None
}

fn map_http_error(
    provider: &str,
    status: StatusCode,
    retry_after: Option<u64>,
    body: &str,
) -> RelayError {
    match status {
        StatusCode::TOO_MANY_REQUESTS => RelayError::RateLimited {
            provider: provider.to_string(),
            retry_after,
        },
        s if s.is_server_error() => RelayError::Unavailable {
            provider: provider.to_string(),
        },
        s => RelayError::Upstream {
            provider: provider.to_string(),
            code: s.as_u16().to_string(),
            message: truncate(body, 300),
        },
    }
}

fn truncate(s: &str, max: usize) -> String {
    if s.len() > max {
        // Back off to a char boundary so multibyte text cannot split a char.
        let mut end = max;
        while !s.is_char_boundary(end) {
            end -= 1;
        }
        let mut t = s[..end].to_string();
        t.push_str("...");
        t
    } else {
        s.to_string()
    }
}

/// Internal line splitter over a bytes stream; yields `SseLine`s split on '\n'.
struct LineStream {
    inner: std::pin::Pin<
        Box<dyn futures_util::stream::Stream<Item = Result<bytes::Bytes, reqwest::Error>> + Send>,
    >,
    provider: String,
    buf: String,
    flushed_tail: bool,
}

impl LineStream {
    fn new(
        inner: std::pin::Pin<
            Box<
                dyn futures_util::stream::Stream<Item = Result<bytes::Bytes, reqwest::Error>>
                    + Send,
            >,
        >,
        provider: String,
    ) -> Self {
        Self {
            inner,
            provider,
            buf: String::new(),
            flushed_tail: false,
        }
    }
}

impl futures_util::stream::Stream for LineStream {
    type Item = CoreResult<SseLine>;

    fn poll_next(
        mut self: std::pin::Pin<&mut Self>,
        cx: &mut std::task::Context<'_>,
    ) -> std::task::Poll<Option<Self::Item>> {
        use std::task::Poll;
        loop {
            // If we already have a newline in the buffer, split and yield immediately.
            if let Some(idx) = self.buf.find('\n') {
                let mut line = self.buf.drain(..=idx).collect::<String>();
                if line.ends_with('\n') {
                    if line.ends_with("\r\n") {
                        line.truncate(line.len() - 2);
                    } else {
                        line.truncate(line.len() - 1);
                    }
                }
                return Poll::Ready(Some(Ok(SseLine { line })));
            }

            match self.inner.as_mut().poll_next(cx) {
                Poll::Ready(Some(Ok(chunk))) => {
                    let s = String::from_utf8_lossy(&chunk);
                    self.buf.push_str(&s);
                    continue;
                }
                Poll::Ready(Some(Err(e))) => {
                    let provider = self.provider.clone();
                    return Poll::Ready(Some(Err(if e.is_timeout() {
                        RelayError::Timeout { provider }
                    } else {
                        RelayError::Unavailable { provider }
                    })));
                }
                Poll::Ready(None) => {
                    if !self.flushed_tail && !self.buf.is_empty() {
                        self.flushed_tail = true;
                        let line = std::mem::take(&mut self.buf);
                        return Poll::Ready(Some(Ok(SseLine { line })));
                    } else {
                        return Poll::Ready(None);
                    }
                }
                Poll::Pending => return Poll::Pending,
            }
        }
    }
}
