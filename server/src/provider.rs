use std::pin::Pin;

use anyhow::Result;
use async_trait::async_trait;
use futures::Stream;
use shared::ChatMessage;

/// Ordered text deltas of one completion. Finite and not restartable.
pub type DeltaStream = Pin<Box<dyn Stream<Item = Result<String>> + Send>>;

/// A chat-completion backend that can answer in streaming mode.
#[async_trait]
pub trait ChatProvider: Send + Sync {
    /// Starts a streaming completion. An `Err` here means no stream was
    /// opened at all (connection, auth or status failure).
    async fn chat_stream(&self, messages: Vec<ChatMessage>) -> Result<DeltaStream>;
}
