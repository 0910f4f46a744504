use async_trait::async_trait;
use futures::StreamExt;
use futures::stream::BoxStream;

use crate::error::CoreResult;
use crate::model::{CompletionRequest, CompletionResponse};

/// Incremental text deltas from a streaming completion. The stream ends after
/// the last delta; an `Err` item is terminal and no further items follow it.
pub type TokenStream = BoxStream<'static, CoreResult<String>>;

/// Capability interface for remote text-completion vendors. Callers depend on
/// this trait only; one implementing type per vendor.
#[async_trait]
pub trait CompletionProvider: Send + Sync {
    fn name(&self) -> &str;

    /// One-shot completion. Fails with `Upstream` on non-2xx and `Protocol`
    /// when the body does not match the vendor schema.
    async fn complete_once(&self, req: &CompletionRequest) -> CoreResult<CompletionResponse>;

    /// Incremental completion. Vendors without a streaming endpoint fall back
    /// to one-shot and yield the full text as a single delta.
    async fn complete_stream(&self, req: &CompletionRequest) -> CoreResult<TokenStream> {
        let single = self.complete_once(req).await?;
        Ok(futures::stream::once(async move { Ok(single.content) }).boxed())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Message, Role, TokenUsage};

    /// Minimal provider used to exercise the streaming default.
    struct Canned;

    #[async_trait]
    impl CompletionProvider for Canned {
        fn name(&self) -> &str {
            "canned"
        }

        async fn complete_once(&self, req: &CompletionRequest) -> CoreResult<CompletionResponse> {
            Ok(CompletionResponse {
                content: format!("echo: {}", req.last_user_content().unwrap_or("")),
                model: "canned".into(),
                usage: TokenUsage::default(),
                latency_ms: 0,
            })
        }
    }

    #[tokio::test]
    async fn default_stream_yields_single_delta() {
        let prov = Canned;
        let req = CompletionRequest::new(vec![Message::new(Role::User, "hi")]);
        let stream = prov.complete_stream(&req).await.expect("stream");
        let deltas: Vec<_> = stream.collect::<Vec<_>>().await;
        assert_eq!(deltas.len(), 1);
        assert_eq!(deltas[0].as_ref().unwrap(), "echo: hi");
    }
}
