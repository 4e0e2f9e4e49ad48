//! Scripted in-process providers for router tests.

#![allow(dead_code)]

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use futures::{StreamExt, stream};
use switchyard_core::config::RouterConfig;
use switchyard_core::events::RouterEvent;
use switchyard_core::{
    Capabilities, CompletionRequest, Embedder, ProviderError, StreamingGenerator, TextGenerator,
    TextStream,
};
use tokio::sync::broadcast;

/// How `complete` behaves.
#[derive(Clone)]
pub enum Script {
    /// Always answer with this text.
    Answer(String),
    /// Always fail with this error.
    Fail(ProviderError),
    /// Fail the first `n` calls, then answer.
    FailThenAnswer(u32, String),
    /// Sleep, then answer.
    Slow(Duration, String),
}

pub struct Stub {
    name: String,
    script: Script,
    healthy: AtomicBool,
    stream: Option<(Vec<String>, Option<usize>)>,
    chunk_delay: Option<Duration>,
    stall: bool,
    embedding: Option<Vec<f32>>,
    pub calls: AtomicU32,
    pub stream_calls: AtomicU32,
    pub embed_calls: AtomicU32,
    pub shutdowns: AtomicU32,
}

impl Stub {
    pub fn new(name: &str, script: Script) -> Self {
        Self {
            name: name.to_string(),
            script,
            healthy: AtomicBool::new(true),
            stream: None,
            chunk_delay: None,
            stall: false,
            embedding: None,
            calls: AtomicU32::new(0),
            stream_calls: AtomicU32::new(0),
            embed_calls: AtomicU32::new(0),
            shutdowns: AtomicU32::new(0),
        }
    }

    pub fn answering(name: &str, text: &str) -> Self {
        Self::new(name, Script::Answer(text.to_string()))
    }

    pub fn failing(name: &str) -> Self {
        Self::new(name, Script::Fail(ProviderError::from_status(503, "overloaded")))
    }

    /// Stream `chunks`; if `fail_after` is set, error after that many chunks.
    pub fn streaming(mut self, chunks: &[&str], fail_after: Option<usize>) -> Self {
        self.stream = Some((chunks.iter().map(ToString::to_string).collect(), fail_after));
        self
    }

    /// Wait this long before each streamed chunk.
    pub fn chunk_delay(mut self, delay: Duration) -> Self {
        self.chunk_delay = Some(delay);
        self
    }

    /// Never end the stream after its chunks.
    pub fn stalling(mut self) -> Self {
        self.stall = true;
        self
    }

    pub fn embedding(mut self, vector: Vec<f32>) -> Self {
        self.embedding = Some(vector);
        self
    }

    pub fn unhealthy(self) -> Self {
        self.healthy.store(false, Ordering::SeqCst);
        self
    }

    pub fn set_healthy(&self, healthy: bool) {
        self.healthy.store(healthy, Ordering::SeqCst);
    }

    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TextGenerator for Stub {
    fn name(&self) -> &str {
        &self.name
    }

    fn model(&self) -> &str {
        "stub-model"
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities::default()
    }

    async fn health(&self) -> Result<(), ProviderError> {
        if self.healthy.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(ProviderError::Unavailable("probe refused".into()))
        }
    }

    async fn complete(&self, _request: &CompletionRequest) -> Result<String, ProviderError> {
        let n = self.calls.fetch_add(1, Ordering::SeqCst);
        match &self.script {
            Script::Answer(text) => Ok(text.clone()),
            Script::Fail(err) => Err(err.clone()),
            Script::FailThenAnswer(failures, text) => {
                if n < *failures {
                    Err(ProviderError::Timeout(5))
                } else {
                    Ok(text.clone())
                }
            }
            Script::Slow(delay, text) => {
                tokio::time::sleep(*delay).await;
                Ok(text.clone())
            }
        }
    }

    fn as_streaming(&self) -> Option<&dyn StreamingGenerator> {
        if self.stream.is_some() { Some(self) } else { None }
    }

    fn as_embedder(&self) -> Option<&dyn Embedder> {
        if self.embedding.is_some() { Some(self) } else { None }
    }

    async fn shutdown(&self) {
        self.shutdowns.fetch_add(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl StreamingGenerator for Stub {
    async fn complete_stream(&self, _request: &CompletionRequest) -> Result<TextStream, ProviderError> {
        self.stream_calls.fetch_add(1, Ordering::SeqCst);
        let Some((chunks, fail_after)) = self.stream.clone() else {
            return Err(ProviderError::Unsupported("stream".into()));
        };
        let mut items: Vec<Result<String, ProviderError>> = match fail_after {
            Some(k) => chunks.into_iter().take(k).map(Ok).collect(),
            None => chunks.into_iter().map(Ok).collect(),
        };
        if fail_after.is_some() {
            items.push(Err(ProviderError::RequestFailed("connection reset".into())));
        }
        let delay = self.chunk_delay.unwrap_or_default();
        let chunks = stream::iter(items).then(move |item| async move {
            tokio::time::sleep(delay).await;
            item
        });
        if self.stall {
            Ok(Box::pin(chunks.chain(stream::pending())))
        } else {
            Ok(Box::pin(chunks))
        }
    }
}

#[async_trait]
impl Embedder for Stub {
    fn embedding_model(&self) -> &str {
        "stub-embed"
    }

    async fn embed(&self, _text: &str) -> Result<Vec<f32>, ProviderError> {
        self.embed_calls.fetch_add(1, Ordering::SeqCst);
        match &self.script {
            Script::Fail(err) => Err(err.clone()),
            _ => Ok(self.embedding.clone().unwrap_or_default()),
        }
    }
}

/// Config with instant-ish backoff and a health interval far beyond any test.
pub fn config(max_retries: u32) -> RouterConfig {
    RouterConfig {
        max_retries,
        health_check_interval_ms: 3_600_000,
        timeout_ms: 1000,
        backoff_base_ms: 1000,
        max_backoff_ms: 30_000,
        ..RouterConfig::default()
    }
}

pub fn arc(stub: Stub) -> Arc<Stub> {
    Arc::new(stub)
}

/// Everything currently buffered on `rx`.
pub fn drain(rx: &mut broadcast::Receiver<RouterEvent>) -> Vec<RouterEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}

pub fn unhealthy_names(events: &[RouterEvent]) -> Vec<String> {
    events
        .iter()
        .filter_map(|e| match e {
            RouterEvent::ProviderUnhealthy { name, .. } => Some(name.clone()),
            _ => None,
        })
        .collect()
}
