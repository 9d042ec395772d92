//! Engine trait seams consumed by the turn orchestrator.

use bn_domain::cancel::CancelToken;
use bn_domain::stream::{BoxStream, SamplingParams, TokenChunk};
use bn_domain::Result;

/// One generation request, already fully resolved (prompt assembled,
/// sampling clamped).
#[derive(Debug, Clone)]
pub struct GenerateRequest {
    pub prompt: String,
    pub sampling: SamplingParams,
    /// Scheduling priority hint passed through to the engine; interactive
    /// chat turns run above background work.
    pub priority: i32,
}

/// Handle to one in-flight generation, used for best-effort abort.
///
/// The embedded cancel token is shared with the engine's stream task; the
/// orchestrator and the abort hook both observe the same flag.
#[derive(Clone)]
pub struct StreamHandle {
    pub request_id: uuid::Uuid,
    cancel: CancelToken,
}

impl StreamHandle {
    pub fn new() -> Self {
        Self {
            request_id: uuid::Uuid::new_v4(),
            cancel: CancelToken::new(),
        }
    }

    pub fn cancel_token(&self) -> &CancelToken {
        &self.cancel
    }
}

impl Default for StreamHandle {
    fn default() -> Self {
        Self::new()
    }
}

/// A token stream plus the handle that can abort it.
pub type Generation = (StreamHandle, BoxStream<'static, Result<TokenChunk>>);

/// The streaming chat model.
///
/// Implementations must be safe to call concurrently from many sessions;
/// batching is the engine's own concern.
#[async_trait::async_trait]
pub trait ChatEngine: Send + Sync {
    /// Start a streaming generation. Chunks carry plain text; the final
    /// chunk has `done == true`.
    async fn generate_stream(&self, req: GenerateRequest) -> Result<Generation>;

    /// Best-effort abort of an in-flight generation. The default signals
    /// the handle's cancel token, which the stream task observes.
    async fn abort(&self, handle: &StreamHandle) {
        handle.cancel_token().cancel();
    }
}

/// The tool-classifier model: one small bounded completion per call.
#[async_trait::async_trait]
pub trait ToolClassifier: Send + Sync {
    async fn generate(&self, req: GenerateRequest) -> Result<String>;
}
