use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;

use crate::config::DemoCfg;
use crate::error::CoreResult;
use crate::model::{CompletionRequest, CompletionResponse, TokenUsage};
use crate::provider::{CompletionProvider, TokenStream};

/// Canned response pool. Index 0 is the demo-mode greeting.
pub const RESPONSES: [&str; 5] = [
    "Hello! I'm the AI assistant for this platform. I'm currently running in demo mode. To enable real AI responses, add your OPENAI_API_KEY to the environment variables.",
    "I understand you're testing the platform. The streaming feature you're seeing is working perfectly! All animations, voice, and avatar features are production-ready.",
    "This is a fully functional AI platform with:\n\n• Real-time streaming chat\n• Voice synthesis\n• Animated avatar\n• Multiple AI personalities\n• Deep analysis mode\n\nJust add your OpenAI API key to unlock real AI intelligence!",
    "Great question! The architecture includes:\n\n1. An orchestrator for coordination\n2. Modular provider system\n3. Streaming SSE responses\n4. Complete error handling\n5. Production-ready deployment\n\nEverything is built and ready to go!",
    "I can help with that! The platform supports:\n\n✓ Chat with streaming\n✓ Voice input/output\n✓ Avatar animations\n✓ Dark mode design\n✓ Real-time updates\n\nAdd OPENAI_API_KEY to enable full AI capabilities.",
];

/// Ordered trigger table; first match against the last user message wins.
const TRIGGERS: [(&[&str], usize); 4] = [
    (&["hello", "hi"], 0),
    (&["test", "demo"], 1),
    (&["feature", "what can"], 2),
    (&["how", "architecture"], 3),
];

/// Canned response producer used when no provider credentials are present.
/// Supports both one-shot and streaming with the same contract as a live
/// provider. The round-robin cursor is the only mutable state in the core;
/// concurrent no-match calls may interleave advances, which is accepted for
/// a fallback path.
pub struct DemoProvider {
    cursor: AtomicUsize,
    initial_delay: Duration,
    chunk_delay: Duration,
}

impl DemoProvider {
    pub fn new(cfg: &DemoCfg) -> Self {
        Self {
            cursor: AtomicUsize::new(0),
            initial_delay: Duration::from_millis(cfg.initial_delay_ms),
            chunk_delay: Duration::from_millis(cfg.chunk_delay_ms),
        }
    }

    /// The fixed demo-mode greeting (trigger: "hello"/"hi").
    pub fn greeting() -> &'static str {
        RESPONSES[0]
    }

    /// Selects the response for a conversation. Trigger matches are
    /// idempotent; only the no-match path consults and advances the cursor.
    fn select_response(&self, last_user: &str) -> &'static str {
        let needle = last_user.to_lowercase();
        for (phrases, idx) in TRIGGERS {
            if phrases.iter().any(|p| needle.contains(p)) {
                return RESPONSES[idx];
            }
        }
        let i = self.cursor.fetch_add(1, Ordering::Relaxed);
        RESPONSES[i % RESPONSES.len()]
    }

    /// One-shot canned response, after the simulated thinking delay.
    pub async fn generate_once(&self, req: &CompletionRequest) -> String {
        tokio::time::sleep(self.initial_delay).await;
        self.select_response(req.last_user_content().unwrap_or(""))
            .to_string()
    }

    /// Lazy, finite, non-restartable stream of word-sized fragments. The
    /// response (and so the cursor) is evaluated once, here, not per
    /// fragment. Each fragment keeps its trailing space except the last, so
    /// the concatenation equals the one-shot text exactly.
    pub fn token_stream(&self, req: &CompletionRequest) -> TokenStream {
        let response = self.select_response(req.last_user_content().unwrap_or(""));
        let fragments = split_fragments(response);
        let initial = self.initial_delay;
        let gap = self.chunk_delay;

        futures::stream::unfold(
            (fragments.into_iter(), true),
            move |(mut it, first)| async move {
                let frag = it.next()?;
                tokio::time::sleep(if first { initial } else { gap }).await;
                Some((Ok(frag), (it, false)))
            },
        )
        .boxed()
    }
}

/// Word-sized fragments with trailing separators attached, last one bare.
fn split_fragments(text: &str) -> Vec<String> {
    let words: Vec<&str> = text.split(' ').collect();
    let last = words.len().saturating_sub(1);
    words
        .iter()
        .enumerate()
        .map(|(i, w)| {
            if i == last {
                (*w).to_string()
            } else {
                format!("{w} ")
            }
        })
        .collect()
}

#[async_trait]
impl CompletionProvider for DemoProvider {
    fn name(&self) -> &str {
        "demo-mode"
    }

    async fn complete_once(&self, req: &CompletionRequest) -> CoreResult<CompletionResponse> {
        let content = self.generate_once(req).await;
        Ok(CompletionResponse {
            content,
            model: "demo-mode".into(),
            usage: TokenUsage::default(),
            latency_ms: self.initial_delay.as_millis() as u32,
        })
    }

    async fn complete_stream(&self, req: &CompletionRequest) -> CoreResult<TokenStream> {
        Ok(self.token_stream(req))
    }
}
