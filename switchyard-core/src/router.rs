//! Router: ordered failover across providers.
//!
//! Per request the router takes a snapshot of the registry, orders it with the
//! configured [`Selector`], and walks the candidates strictly in that order:
//!
//! ```text
//! selecting → attempting(candidate, n) → succeeded
//!                    │  fail, n < max_retries, retryable → backoff → attempting(candidate, n+1)
//!                    │  fail otherwise                    → attempting(next, 1)
//!                    └  no candidates left                → exhausted
//! ```
//!
//! Completions retry each candidate with exponential backoff. Streams and
//! embeddings get one attempt per candidate: once a chunk has reached the
//! caller a retry could duplicate output.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::task::{Context, Poll};
use std::time::Instant;

use futures::stream::{BoxStream, Stream, StreamExt};
use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::config::RouterConfig;
use crate::error::{ProviderError, Result, RouterError};
use crate::events::{EventBus, RouterEvent};
use crate::health::{HealthMonitor, HealthReport};
use crate::metrics::{MetricsSnapshot, RouterCounters, bump};
use crate::provider::TextGenerator;
use crate::registry::{ProviderEntry, ProviderRegistry, ProviderStatus, Transition};
use crate::selection::Selector;
use crate::types::{
    CompletionMetadata, CompletionRequest, CompletionResult, EmbeddingResult, FinishReason,
    approximate_tokens,
};

const OP_COMPLETE: &str = "complete";
const OP_STREAM: &str = "stream";
const OP_EMBED: &str = "embed";

/// Collects adapters and starts a [`Router`].
pub struct RouterBuilder {
    config: RouterConfig,
    events: EventBus,
    adapters: Vec<(Arc<dyn TextGenerator>, i32)>,
}

impl RouterBuilder {
    /// Start building with `config`.
    #[must_use]
    pub fn new(config: RouterConfig) -> Self {
        let events = EventBus::new(config.event_capacity);
        Self {
            config,
            events,
            adapters: Vec::new(),
        }
    }

    /// Add an adapter with its priority (lower is preferred).
    #[must_use]
    pub fn provider(mut self, adapter: Arc<dyn TextGenerator>, priority: i32) -> Self {
        self.adapters.push((adapter, priority));
        self
    }

    /// Subscribe before start so the `Initialized` event is observed.
    #[must_use]
    pub fn subscribe(&self) -> tokio::sync::broadcast::Receiver<RouterEvent> {
        self.events.subscribe()
    }

    /// Number of adapters added so far.
    #[must_use]
    pub fn len(&self) -> usize {
        self.adapters.len()
    }

    /// Whether no adapter was added.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.adapters.is_empty()
    }

    /// Probe every adapter once, register it, emit `Initialized` and start
    /// the background health monitor.
    ///
    /// An adapter whose first probe fails is still registered, as unavailable,
    /// and can recover on a later health round. A duplicate name is skipped.
    ///
    /// # Errors
    /// Returns `RouterError::Config` if the configuration is invalid.
    pub async fn start(self) -> Result<Router> {
        self.config.validate()?;
        let registry = Arc::new(ProviderRegistry::new());
        let timeout = self.config.timeout();

        for (adapter, priority) in self.adapters {
            let name = adapter.name().to_string();
            let available = match tokio::time::timeout(timeout, adapter.health()).await {
                Ok(Ok(())) => true,
                Ok(Err(e)) => {
                    warn!(provider = %name, error = %e, "Initial health probe failed");
                    false
                }
                Err(_) => {
                    warn!(provider = %name, timeout_ms = self.config.timeout_ms, "Initial health probe timed out");
                    false
                }
            };
            match registry.register(adapter, priority, available) {
                Ok(()) => info!(provider = %name, priority, available, "Registered provider"),
                Err(e) => warn!(provider = %name, error = %e, "Skipping provider"),
            }
        }

        let monitor = HealthMonitor::new(
            Arc::clone(&registry),
            self.events.clone(),
            self.config.health_check_interval(),
            timeout,
        );
        let token = CancellationToken::new();
        let handle = monitor.clone().spawn(token.clone());

        let inner = Arc::new(RouterInner {
            selector: Selector::new(self.config.fallback_strategy),
            config: self.config,
            registry,
            events: self.events,
            monitor,
            counters: RouterCounters::default(),
            shut_down: AtomicBool::new(false),
        });

        let providers = inner.registry.names();
        info!(
            providers = providers.len(),
            strategy = ?inner.config.fallback_strategy,
            "Router initialized"
        );
        inner.events.emit(RouterEvent::Initialized { providers });

        Ok(Router {
            inner,
            token,
            monitor: Mutex::new(Some(handle)),
        })
    }
}

/// One piece of streamed output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamChunk {
    /// Text delta.
    pub text: String,
    /// Provider that produced this chunk.
    pub provider: String,
}

/// Chunks of a routed streaming completion.
///
/// If a provider fails mid-stream the next streaming candidate takes over,
/// so the caller may see partial output from one provider followed by the
/// full output of another. After the last candidate fails the stream yields a
/// single [`RouterError::Exhausted`] and ends.
pub struct CompletionStream {
    inner: BoxStream<'static, Result<StreamChunk>>,
}

impl Stream for CompletionStream {
    type Item = Result<StreamChunk>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.inner.poll_next_unpin(cx)
    }
}

impl CompletionStream {
    /// Drain the stream into one string, failing on the terminal error.
    ///
    /// # Errors
    /// Returns the router error the stream ended with, if any.
    pub async fn collect_text(mut self) -> Result<String> {
        let mut text = String::new();
        while let Some(chunk) = self.next().await {
            text.push_str(&chunk?.text);
        }
        Ok(text)
    }
}

struct RouterInner {
    config: RouterConfig,
    registry: Arc<ProviderRegistry>,
    selector: Selector,
    events: EventBus,
    monitor: HealthMonitor,
    counters: RouterCounters,
    shut_down: AtomicBool,
}

impl RouterInner {
    fn ensure_running(&self) -> Result<()> {
        if self.shut_down.load(Ordering::Acquire) {
            Err(RouterError::ShutDown)
        } else {
            Ok(())
        }
    }

    fn candidates(&self) -> Vec<ProviderEntry> {
        let ordered = self.selector.order(&self.registry.snapshot());
        debug!(
            order = ?ordered.iter().map(ProviderEntry::name).collect::<Vec<_>>(),
            "Selected candidates"
        );
        ordered
    }

    /// Run one adapter call under the configured timeout.
    async fn timed<T, F>(&self, call: F) -> std::result::Result<T, ProviderError>
    where
        F: Future<Output = std::result::Result<T, ProviderError>>,
    {
        match tokio::time::timeout(self.config.timeout(), call).await {
            Ok(result) => result,
            Err(_) => Err(ProviderError::Timeout(self.config.timeout_ms)),
        }
    }

    fn record_success(&self, entry: &ProviderEntry) {
        bump(&entry.counters.successes);
        if self.registry.mark(entry.name(), true, None, &self.events) == Some(Transition::BecameHealthy) {
            info!(provider = %entry.name(), "Provider recovered");
        }
    }

    /// Pessimistic mark-down: one failed call makes the provider unavailable
    /// until a probe or a later success says otherwise.
    fn record_failure(&self, entry: &ProviderEntry, operation: &'static str, err: &ProviderError) {
        bump(&entry.counters.failures);
        warn!(provider = %entry.name(), operation, error = %err, "Provider call failed");
        self.registry.mark(entry.name(), false, Some(err), &self.events);
    }

    fn fall_through(&self, operation: &'static str, entry: &ProviderEntry, attempts: u32) {
        bump(&self.counters.fallbacks);
        debug!(provider = %entry.name(), operation, attempts, "Falling through to next provider");
        self.events.emit(RouterEvent::Fallback {
            operation,
            from: entry.name().to_string(),
            attempts,
        });
    }

    fn exhausted(&self, operation: &'static str, attempts: u32, last_error: Option<ProviderError>) -> RouterError {
        bump(&self.counters.exhausted);
        let last_error =
            last_error.unwrap_or_else(|| ProviderError::Unavailable("no candidate was attempted".into()));
        error!(operation, attempts, error = %last_error, "All providers failed");
        RouterError::Exhausted {
            operation,
            attempts,
            last_error,
        }
    }
}

/// Routes completions, streams and embeddings across registered providers.
///
/// Owns the background health monitor; call [`Router::shutdown`] to stop it
/// and release adapter resources. Dropping the router stops the monitor but
/// does not wait for adapters to shut down.
pub struct Router {
    inner: Arc<RouterInner>,
    token: CancellationToken,
    monitor: Mutex<Option<JoinHandle<()>>>,
}

impl Router {
    /// Start building a router.
    #[must_use]
    pub fn builder(config: RouterConfig) -> RouterBuilder {
        RouterBuilder::new(config)
    }

    /// Generate a completion, failing over across providers.
    ///
    /// # Errors
    /// `NoProvidersAvailable` if nothing is available when the call starts,
    /// `Exhausted` if every candidate failed, `ShutDown` after shutdown.
    pub async fn complete(&self, request: &CompletionRequest) -> Result<CompletionResult> {
        let inner = &self.inner;
        inner.ensure_running()?;
        bump(&inner.counters.requests);
        let started = Instant::now();

        let candidates = inner.candidates();
        if candidates.is_empty() {
            return Err(RouterError::NoProvidersAvailable { operation: OP_COMPLETE });
        }

        let max_retries = inner.config.max_retries;
        let mut attempts = 0u32;
        let mut last_error = None;

        for (index, candidate) in candidates.iter().enumerate() {
            let mut tried = 0u32;
            for attempt in 1..=max_retries {
                attempts += 1;
                tried += 1;
                bump(&candidate.counters.attempts);

                match inner.timed(candidate.adapter.complete(request)).await {
                    Ok(text) => {
                        inner.record_success(candidate);
                        let model = request
                            .model
                            .clone()
                            .unwrap_or_else(|| candidate.adapter.model().to_string());
                        return Ok(CompletionResult {
                            tokens: approximate_tokens(&text),
                            text,
                            provider: candidate.name().to_string(),
                            model,
                            finish_reason: FinishReason::Stop,
                            metadata: CompletionMetadata {
                                duration_ms: u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX),
                                attempts,
                                fallbacks: u32::try_from(index).unwrap_or(u32::MAX),
                            },
                        });
                    }
                    Err(e) => {
                        inner.record_failure(candidate, OP_COMPLETE, &e);
                        let retry = attempt < max_retries && e.is_retryable();
                        last_error = Some(e);
                        if !retry {
                            break;
                        }
                        let delay = inner.config.backoff_delay(attempt);
                        debug!(
                            provider = %candidate.name(),
                            attempt,
                            delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                            "Backing off before retry"
                        );
                        tokio::time::sleep(delay).await;
                    }
                }
            }
            if index + 1 < candidates.len() {
                inner.fall_through(OP_COMPLETE, candidate, tried);
            }
        }

        Err(inner.exhausted(OP_COMPLETE, attempts, last_error))
    }

    /// Stream a completion from the first streaming-capable provider that
    /// works. Candidates without streaming support are skipped.
    ///
    /// # Errors
    /// `NoProvidersAvailable` if no available provider can stream,
    /// `ShutDown` after shutdown. Later failures arrive through the stream.
    pub fn complete_stream(&self, request: CompletionRequest) -> Result<CompletionStream> {
        self.inner.ensure_running()?;
        bump(&self.inner.counters.requests);

        let candidates: Vec<ProviderEntry> = self
            .inner
            .candidates()
            .into_iter()
            .filter(|c| c.adapter.as_streaming().is_some())
            .collect();
        if candidates.is_empty() {
            return Err(RouterError::NoProvidersAvailable { operation: OP_STREAM });
        }

        let inner = Arc::clone(&self.inner);
        let stream = async_stream::stream! {
            let total = candidates.len();
            let mut attempts = 0u32;
            let mut last_error = None;

            for (index, candidate) in candidates.into_iter().enumerate() {
                if inner.ensure_running().is_err() {
                    yield Err(RouterError::ShutDown);
                    return;
                }
                let Some(streamer) = candidate.adapter.as_streaming() else {
                    continue;
                };
                attempts += 1;
                bump(&candidate.counters.attempts);

                let failure = match inner.timed(streamer.complete_stream(&request)).await {
                    Err(e) => Some(e),
                    Ok(mut chunks) => {
                        let mut failure = None;
                        loop {
                            match inner.timed(async { chunks.next().await.transpose() }).await {
                                Ok(Some(text)) => {
                                    yield Ok(StreamChunk {
                                        text,
                                        provider: candidate.name().to_string(),
                                    });
                                }
                                Ok(None) => break,
                                Err(e) => {
                                    failure = Some(e);
                                    break;
                                }
                            }
                        }
                        failure
                    }
                };

                match failure {
                    None => {
                        inner.record_success(&candidate);
                        return;
                    }
                    Some(e) => {
                        inner.record_failure(&candidate, OP_STREAM, &e);
                        last_error = Some(e);
                        if index + 1 < total {
                            inner.fall_through(OP_STREAM, &candidate, 1);
                        }
                    }
                }
            }

            yield Err(inner.exhausted(OP_STREAM, attempts, last_error));
        };

        Ok(CompletionStream {
            inner: Box::pin(stream),
        })
    }

    /// Embed `text` with the first embedding-capable provider that works.
    ///
    /// Only providers exposing an embedder are considered, whatever their
    /// priority relative to text-only providers.
    ///
    /// # Errors
    /// `NoProvidersAvailable` if no available provider embeds, `Exhausted` if
    /// all of them failed, `ShutDown` after shutdown.
    pub async fn embed(&self, text: &str) -> Result<EmbeddingResult> {
        let inner = &self.inner;
        inner.ensure_running()?;
        bump(&inner.counters.requests);

        let candidates: Vec<ProviderEntry> = inner
            .candidates()
            .into_iter()
            .filter(|c| c.adapter.as_embedder().is_some())
            .collect();
        if candidates.is_empty() {
            return Err(RouterError::NoProvidersAvailable { operation: OP_EMBED });
        }

        let mut attempts = 0u32;
        let mut last_error = None;
        for (index, candidate) in candidates.iter().enumerate() {
            let Some(embedder) = candidate.adapter.as_embedder() else {
                continue;
            };
            attempts += 1;
            bump(&candidate.counters.attempts);

            match inner.timed(embedder.embed(text)).await {
                Ok(embedding) => {
                    inner.record_success(candidate);
                    return Ok(EmbeddingResult {
                        dimensions: embedding.len(),
                        embedding,
                        provider: candidate.name().to_string(),
                        model: embedder.embedding_model().to_string(),
                    });
                }
                Err(e) => {
                    inner.record_failure(candidate, OP_EMBED, &e);
                    last_error = Some(e);
                    if index + 1 < candidates.len() {
                        inner.fall_through(OP_EMBED, candidate, 1);
                    }
                }
            }
        }

        Err(inner.exhausted(OP_EMBED, attempts, last_error))
    }

    /// Run a probe round now instead of waiting for the next tick.
    pub async fn check_health(&self) -> HealthReport {
        self.inner.monitor.check_all().await
    }

    /// Monitoring rows for every provider.
    #[must_use]
    pub fn providers(&self) -> Vec<ProviderStatus> {
        self.inner.registry.statuses()
    }

    /// Current counter values.
    #[must_use]
    pub fn metrics(&self) -> MetricsSnapshot {
        MetricsSnapshot::collect(&self.inner.counters, self.inner.registry.counter_snapshots())
    }

    /// Observe lifecycle events from now on.
    #[must_use]
    pub fn subscribe(&self) -> tokio::sync::broadcast::Receiver<RouterEvent> {
        self.inner.events.subscribe()
    }

    /// The configuration the router was built with.
    #[must_use]
    pub fn config(&self) -> &RouterConfig {
        &self.inner.config
    }

    /// Whether [`shutdown`](Self::shutdown) has run.
    #[must_use]
    pub fn is_shut_down(&self) -> bool {
        self.inner.shut_down.load(Ordering::Acquire)
    }

    /// Stop the health monitor, release every adapter and emit `Shutdown`.
    ///
    /// Each adapter's shutdown is awaited up to `shutdown_timeout`. Calling
    /// this more than once is a no-op.
    pub async fn shutdown(&self) {
        if self.inner.shut_down.swap(true, Ordering::AcqRel) {
            return;
        }
        self.token.cancel();
        let handle = self.monitor.lock().take();
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                warn!(error = %e, "Health monitor task ended abnormally");
            }
        }

        let limit = self.inner.config.shutdown_timeout();
        for entry in self.inner.registry.snapshot() {
            if tokio::time::timeout(limit, entry.adapter.shutdown()).await.is_err() {
                warn!(provider = %entry.name(), "Provider shutdown timed out");
            }
        }

        info!("Router shut down");
        self.inner.events.emit(RouterEvent::Shutdown);
    }
}

impl Drop for Router {
    fn drop(&mut self) {
        self.token.cancel();
    }
}
