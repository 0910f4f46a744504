//! Stream relay: bridges a pull-based token source to framed events.
//!
//! Contract:
//! - The first event is always `start`, emitted before the source is polled.
//! - Every source delta becomes one `chunk` event, in arrival order; no
//!   batching or reordering, since the receiver reconstructs text by naive
//!   concatenation.
//! - The sequence terminates with exactly one terminal event: `complete` or
//!   `error`. Nothing follows the terminal.
//! - On the wire each event is one SSE frame, and a successful stream closes
//!   with an extra `[DONE]` sentinel frame right after `complete`.
//! - Dropping the relay drops the source, aborting its in-flight request; a
//!   closed sink never leaves a dangling upstream connection.

use std::collections::VecDeque;
use std::pin::Pin;
use std::task::{Context, Poll};

use bytes::Bytes;
use futures_util::stream::Stream;
use serde::{Deserialize, Serialize};

use crate::provider::TokenStream;

/// Wire sentinel closing every successful stream, distinct from `complete`.
pub const DONE_SENTINEL: &str = "[DONE]";

/// Framed event; on the wire each one rides in a single SSE `data:` line.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum StreamEvent {
    Start,
    Chunk { content: String },
    Complete { content: String },
    Error { message: String },
}

impl StreamEvent {
    /// True if this event terminates the stream.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Complete { .. } | Self::Error { .. })
    }
}

/// Serializes one event as a self-delimited SSE frame (`data: <json>\n\n`),
/// independently parseable by receivers that buffer partial frames.
pub fn encode_frame(event: &StreamEvent) -> Bytes {
    let json = serde_json::to_string(event).unwrap_or_else(|_| {
        // Only reachable if serde_json itself fails on plain strings.
        r#"{"type":"error","message":"frame encoding failed"}"#.to_string()
    });
    Bytes::from(format!("data: {json}\n\n"))
}

/// The sentinel as a wire frame.
pub fn done_frame() -> Bytes {
    Bytes::from(format!("data: {DONE_SENTINEL}\n\n"))
}

/// Republishes a token source as an event sequence honoring the relay
/// contract.
pub fn events(source: TokenStream) -> EventStream {
    EventStream {
        source: Some(source),
        buffer: String::new(),
        started: false,
    }
}

/// Republishes a token source as encoded SSE frames, sentinel included.
pub fn sse_frames(source: TokenStream) -> FrameStream {
    frame_events(events(source))
}

/// Encodes an already-relayed event sequence as SSE frames, sentinel
/// included. Shared by [`sse_frames`] and server handlers that stream
/// events built elsewhere.
pub fn frame_events<S>(events: S) -> FrameStream<S>
where
    S: Stream<Item = StreamEvent> + Unpin,
{
    FrameStream {
        events,
        pending: VecDeque::new(),
    }
}

/// State machine: start, chunks while the source yields, then exactly one
/// terminal event and the end of the stream.
pub struct EventStream {
    source: Option<TokenStream>,
    buffer: String,
    started: bool,
}

impl Stream for EventStream {
    type Item = StreamEvent;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        if !self.started {
            self.started = true;
            return Poll::Ready(Some(StreamEvent::Start));
        }

        let Some(source) = self.source.as_mut() else {
            return Poll::Ready(None);
        };

        match Pin::new(source).poll_next(cx) {
            Poll::Ready(Some(Ok(delta))) => {
                self.buffer.push_str(&delta);
                Poll::Ready(Some(StreamEvent::Chunk { content: delta }))
            }
            Poll::Ready(Some(Err(e))) => {
                // Fatal: release the source, emit nothing after the error.
                self.source = None;
                tracing::warn!(error = %e, "token source failed mid-stream");
                Poll::Ready(Some(StreamEvent::Error {
                    message: e.to_string(),
                }))
            }
            Poll::Ready(None) => {
                self.source = None;
                let content = std::mem::take(&mut self.buffer);
                Poll::Ready(Some(StreamEvent::Complete { content }))
            }
            Poll::Pending => Poll::Pending,
        }
    }
}

/// Byte-level view of an event sequence: every event encoded as an SSE
/// frame, with the sentinel frame queued right behind `complete` so the
/// pair is never split by the terminal check.
pub struct FrameStream<S = EventStream> {
    events: S,
    pending: VecDeque<Bytes>,
}

impl<S> Stream for FrameStream<S>
where
    S: Stream<Item = StreamEvent> + Unpin,
{
    type Item = Bytes;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        if let Some(frame) = self.pending.pop_front() {
            return Poll::Ready(Some(frame));
        }
        match Pin::new(&mut self.events).poll_next(cx) {
            Poll::Ready(Some(event)) => {
                let frame = encode_frame(&event);
                if matches!(event, StreamEvent::Complete { .. }) {
                    self.pending.push_back(done_frame());
                }
                Poll::Ready(Some(frame))
            }
            Poll::Ready(None) => Poll::Ready(None),
            Poll::Pending => Poll::Pending,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::RelayError;
    use futures::StreamExt;

    fn source(items: Vec<crate::error::CoreResult<String>>) -> TokenStream {
        futures::stream::iter(items).boxed()
    }

    async fn collect_frames(source: TokenStream) -> Vec<String> {
        sse_frames(source)
            .map(|b| String::from_utf8(b.to_vec()).expect("utf8 frame"))
            .collect()
            .await
    }

    fn parse(frame: &str) -> StreamEvent {
        let payload = frame
            .strip_prefix("data: ")
            .and_then(|f| f.strip_suffix("\n\n"))
            .expect("framed");
        serde_json::from_str(payload).expect("event json")
    }

    #[tokio::test]
    async fn events_follow_the_contract() {
        let got: Vec<StreamEvent> = events(source(vec![Ok("a".into()), Ok("b".into())]))
            .collect()
            .await;
        assert_eq!(
            got,
            vec![
                StreamEvent::Start,
                StreamEvent::Chunk { content: "a".into() },
                StreamEvent::Chunk { content: "b".into() },
                StreamEvent::Complete {
                    content: "ab".into()
                },
            ]
        );
    }

    #[tokio::test]
    async fn happy_path_frames_in_order() {
        let frames =
            collect_frames(source(vec![Ok("Hel".into()), Ok("lo ".into()), Ok("!".into())])).await;
        assert_eq!(frames.len(), 6); // start, 3 chunks, complete, sentinel
        assert_eq!(parse(&frames[0]), StreamEvent::Start);
        assert_eq!(
            parse(&frames[1]),
            StreamEvent::Chunk { content: "Hel".into() }
        );
        assert_eq!(
            parse(&frames[4]),
            StreamEvent::Complete {
                content: "Hello !".into()
            }
        );
        assert_eq!(frames[5], format!("data: {DONE_SENTINEL}\n\n"));
    }

    #[tokio::test]
    async fn chunks_concatenate_to_complete_content() {
        let frames = collect_frames(source(vec![
            Ok("a ".into()),
            Ok("b ".into()),
            Ok("c".into()),
        ]))
        .await;
        let mut acc = String::new();
        let mut complete = None;
        for f in &frames {
            if f == &format!("data: {DONE_SENTINEL}\n\n") {
                continue;
            }
            match parse(f) {
                StreamEvent::Chunk { content } => acc.push_str(&content),
                StreamEvent::Complete { content } => complete = Some(content),
                _ => {}
            }
        }
        assert_eq!(complete.as_deref(), Some(acc.as_str()));
    }

    #[tokio::test]
    async fn error_is_terminal_and_final() {
        let frames = collect_frames(source(vec![
            Ok("partial ".into()),
            Err(RelayError::Unavailable {
                provider: "openai".into(),
            }),
            // Never reached: the relay stops polling after an error.
            Ok("never".into()),
        ]))
        .await;
        assert_eq!(frames.len(), 3); // start, chunk, error
        match parse(&frames[2]) {
            StreamEvent::Error { message } => assert!(message.contains("openai")),
            other => panic!("expected error event, got {other:?}"),
        }
        // No sentinel and no complete after an error.
        assert!(!frames.iter().any(|f| f.contains(DONE_SENTINEL)));
    }

    #[tokio::test]
    async fn empty_source_still_completes() {
        let frames = collect_frames(source(vec![])).await;
        assert_eq!(frames.len(), 3);
        assert_eq!(parse(&frames[0]), StreamEvent::Start);
        assert_eq!(
            parse(&frames[1]),
            StreamEvent::Complete { content: "".into() }
        );
        assert_eq!(frames[2], format!("data: {DONE_SENTINEL}\n\n"));
    }

    #[tokio::test]
    async fn exactly_one_terminal_event() {
        for items in [
            vec![Ok("x".into())],
            vec![Err(RelayError::StreamAborted)],
            vec![],
        ] {
            let got: Vec<StreamEvent> = events(source(items)).collect().await;
            let terminals = got.iter().filter(|e| e.is_terminal()).count();
            assert_eq!(terminals, 1);
            assert!(got.last().expect("nonempty").is_terminal());
        }
    }

    #[tokio::test]
    async fn frame_events_appends_sentinel_after_complete() {
        // Framing a pre-built event sequence matches framing from a source.
        let prebuilt = futures::stream::iter(vec![
            StreamEvent::Start,
            StreamEvent::Chunk { content: "hi".into() },
            StreamEvent::Complete { content: "hi".into() },
        ]);
        let frames: Vec<String> = frame_events(prebuilt)
            .map(|b| String::from_utf8(b.to_vec()).expect("utf8 frame"))
            .collect()
            .await;
        assert_eq!(frames, collect_frames(source(vec![Ok("hi".into())])).await);
        assert_eq!(frames.last().unwrap(), &format!("data: {DONE_SENTINEL}\n\n"));
    }

    #[tokio::test]
    async fn dropping_frames_drops_source() {
        use std::sync::Arc;
        use std::sync::atomic::{AtomicBool, Ordering};

        struct DropFlag(Arc<AtomicBool>);
        impl Drop for DropFlag {
            fn drop(&mut self) {
                self.0.store(true, Ordering::SeqCst);
            }
        }

        let dropped = Arc::new(AtomicBool::new(false));
        let flag = DropFlag(dropped.clone());
        let src: TokenStream = futures::stream::unfold(Some(flag), |state| async move {
            let _keep = state?;
            // Pretend to be a never-ending upstream.
            futures::future::pending::<()>().await;
            unreachable!()
        })
        .boxed();

        let mut frames = sse_frames(src);
        // Pull only the start frame, then abandon the stream.
        let first = frames.next().await.expect("start frame");
        assert!(String::from_utf8_lossy(&first).contains("start"));
        drop(frames);
        assert!(dropped.load(Ordering::SeqCst));
    }
}
