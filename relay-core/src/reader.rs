//! Consumer side of the framed SSE contract: incremental frame decoding over
//! arbitrary byte boundaries, plus a driver that reduces a byte stream to a
//! single terminal outcome while surfacing chunks as they arrive.

use bytes::Bytes;
use futures_util::stream::{Stream, StreamExt};

use crate::error::{CoreResult, RelayError};
use crate::relay::{DONE_SENTINEL, StreamEvent};

/// Incremental SSE frame splitter. Transport reads land in an internal buffer
/// via [`push`](Self::push); [`next_frame`](Self::next_frame) yields each
/// complete `data:` payload as soon as its blank-line delimiter has arrived.
/// Tolerates CRLF line endings and frames split at any byte boundary.
#[derive(Debug, Default)]
pub struct FrameDecoder {
    buf: Vec<u8>,
}

impl FrameDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }

    /// Next complete frame payload (text after `data: `), or `None` until
    /// more bytes arrive. Non-`data:` lines inside a frame are dropped.
    pub fn next_frame(&mut self) -> Option<String> {
        loop {
            let lf = self.buf.windows(2).position(|w| w == b"\n\n");
            let crlf = self.buf.windows(4).position(|w| w == b"\r\n\r\n");
            let (end, delim) = match (lf, crlf) {
                (Some(a), Some(b)) if b < a => (b, 4),
                (Some(a), _) => (a, 2),
                (None, Some(b)) => (b, 4),
                (None, None) => return None,
            };
            let frame: Vec<u8> = self.buf.drain(..end + delim).take(end).collect();
            let text = String::from_utf8_lossy(&frame);
            for line in text.lines() {
                let line = line.strip_suffix('\r').unwrap_or(line);
                if let Some(payload) = line.strip_prefix("data: ") {
                    return Some(payload.to_string());
                }
            }
            // Frame had no data line (e.g. a comment or bare CR); keep going.
        }
    }
}

/// Terminal state of a consumed stream.
#[derive(Debug, Clone, PartialEq)]
pub enum ReadOutcome {
    /// The stream finished; `content` is the full response text. When the
    /// sender supplied a `complete` event its content wins over the local
    /// chunk accumulation.
    Complete { content: String },
    /// The sender reported a terminal error.
    Error { message: String },
}

/// Drives a byte stream to its terminal outcome. `on_chunk` fires once per
/// chunk event, in order. Exactly one outcome is returned per stream: either
/// `Complete` or `Error`, never both. A transport error or a stream that ends
/// without any terminal frame yields `Err(StreamAborted)`.
pub async fn read_stream<S, F>(mut bytes: S, mut on_chunk: F) -> CoreResult<ReadOutcome>
where
    S: Stream<Item = CoreResult<Bytes>> + Unpin,
    F: FnMut(&str),
{
    let mut decoder = FrameDecoder::new();
    let mut accumulated = String::new();

    while let Some(read) = bytes.next().await {
        let data = read?;
        decoder.push(&data);
        while let Some(payload) = decoder.next_frame() {
            if payload == DONE_SENTINEL {
                // Sentinel without a preceding complete: the local
                // accumulation is all we have.
                return Ok(ReadOutcome::Complete {
                    content: accumulated,
                });
            }
            match serde_json::from_str::<StreamEvent>(&payload) {
                Ok(StreamEvent::Start) => {}
                Ok(StreamEvent::Chunk { content }) => {
                    accumulated.push_str(&content);
                    on_chunk(&content);
                }
                Ok(StreamEvent::Complete { content }) => {
                    return Ok(ReadOutcome::Complete { content });
                }
                Ok(StreamEvent::Error { message }) => {
                    return Ok(ReadOutcome::Error { message });
                }
                Err(e) => {
                    tracing::warn!(error = %e, frame = %payload, "skipping malformed frame");
                }
            }
        }
    }

    Err(RelayError::StreamAborted)
}
