//! Client used when no provider can be reached

use async_trait::async_trait;
use tokio::sync::mpsc;
use tracing::debug;

use super::{CompletionRequest, CompletionResponse, LlmClient, LlmError, StreamChunk};

/// Reports every call as unavailable
pub struct OfflineClient {
    reason: String,
}

impl OfflineClient {
    pub fn new(reason: impl Into<String>) -> Self {
        Self { reason: reason.into() }
    }
}

#[async_trait]
impl LlmClient for OfflineClient {
    async fn complete(&self, _request: CompletionRequest) -> Result<CompletionResponse, LlmError> {
        debug!(reason = %self.reason, "OfflineClient::complete: called");
        Err(LlmError::Unavailable(self.reason.clone()))
    }

    async fn stream(
        &self,
        _request: CompletionRequest,
        _chunk_tx: mpsc::Sender<StreamChunk>,
    ) -> Result<CompletionResponse, LlmError> {
        debug!(reason = %self.reason, "OfflineClient::stream: called");
        Err(LlmError::Unavailable(self.reason.clone()))
    }
}
