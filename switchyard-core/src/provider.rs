//! Capability traits implemented by provider adapters.
//!
//! Every adapter is a [`TextGenerator`]. Streaming and embeddings are separate
//! traits the adapter exposes through [`TextGenerator::as_streaming`] and
//! [`TextGenerator::as_embedder`], so a missing capability is a `None` rather
//! than a runtime property check.

use async_trait::async_trait;
use futures::stream::BoxStream;

use crate::error::ProviderError;
use crate::types::{Capabilities, CompletionRequest};

/// Lazy, finite, one-shot sequence of text chunks.
///
/// Consuming it twice is not possible; calling
/// [`StreamingGenerator::complete_stream`] again re-issues the request.
pub type TextStream = BoxStream<'static, Result<String, ProviderError>>;

/// A backend that can generate text.
#[async_trait]
pub trait TextGenerator: Send + Sync {
    /// Unique provider name (from configuration).
    fn name(&self) -> &str;

    /// Model used when the request carries no override.
    fn model(&self) -> &str;

    /// Static capability description.
    fn capabilities(&self) -> Capabilities;

    /// Liveness probe. `Ok(())` means healthy.
    async fn health(&self) -> Result<(), ProviderError>;

    /// Generate a full completion.
    ///
    /// The adapter uses `request.model` when set and [`model`](Self::model)
    /// otherwise.
    async fn complete(&self, request: &CompletionRequest) -> Result<String, ProviderError>;

    /// Streaming capability, if any.
    fn as_streaming(&self) -> Option<&dyn StreamingGenerator> {
        None
    }

    /// Embedding capability, if any.
    fn as_embedder(&self) -> Option<&dyn Embedder> {
        None
    }

    /// Release owned resources (child processes, connections).
    async fn shutdown(&self) {}
}

/// A backend that can stream text incrementally.
#[async_trait]
pub trait StreamingGenerator: Send + Sync {
    /// Open a chunk stream for `request`.
    async fn complete_stream(&self, request: &CompletionRequest) -> Result<TextStream, ProviderError>;
}

/// A backend that can produce embeddings.
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Embedding model identifier.
    fn embedding_model(&self) -> &str;

    /// Embed a single text.
    async fn embed(&self, text: &str) -> Result<Vec<f32>, ProviderError>;
}

/// Capabilities with the streaming and embedding flags forced to match the
/// trait accessors.
#[must_use]
pub fn effective_capabilities(adapter: &dyn TextGenerator) -> Capabilities {
    Capabilities {
        streaming: adapter.as_streaming().is_some(),
        embeddings: adapter.as_embedder().is_some(),
        ..adapter.capabilities()
    }
}

// Object safety is required: the registry stores `Arc<dyn TextGenerator>`.
const _: () = {
    fn _assert_object_safe(_: &dyn TextGenerator, _: &dyn StreamingGenerator, _: &dyn Embedder) {}
};
