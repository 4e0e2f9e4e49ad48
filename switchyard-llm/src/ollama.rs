//! Ollama adapter.
//!
//! Talks to a local Ollama daemon: `/api/generate` for completions (one JSON
//! object, or NDJSON when streaming), `/api/tags` as the liveness probe and
//! `/api/embeddings` when an embedding model is configured.

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::{Map, Value, json};
use switchyard_core::{
    Capabilities, CompletionRequest, Embedder, ProviderError, StreamingGenerator, TextGenerator,
    TextStream,
};
use tracing::debug;

use crate::error::BackendError;
use crate::factory::parse_settings;
use crate::http;

/// `[[providers]]` keys for `kind = "ollama"`.
#[derive(Debug, Clone, Deserialize)]
pub struct OllamaSettings {
    /// Daemon address.
    #[serde(default = "default_base_url")]
    pub base_url: String,
    /// Default generation model.
    pub model: String,
    /// Enables embeddings when set.
    #[serde(default)]
    pub embedding_model: Option<String>,
    /// Context window advertised in capabilities.
    #[serde(default = "default_context")]
    pub max_context_tokens: u32,
    /// Model is tuned for source code.
    #[serde(default)]
    pub code_optimized: bool,
}

fn default_base_url() -> String { "http://localhost:11434".into() }
fn default_context() -> u32 { 4096 }

#[derive(Deserialize)]
struct GenerateChunk {
    #[serde(default)]
    response: String,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Deserialize)]
struct EmbeddingResponse {
    embedding: Vec<f32>,
}

/// Ollama-backed provider.
pub struct OllamaProvider {
    name: String,
    settings: OllamaSettings,
    http: Client,
}

impl OllamaProvider {
    /// Create an adapter.
    ///
    /// # Errors
    /// Returns `BackendError::Http` if the HTTP client cannot be built.
    pub fn new(name: impl Into<String>, mut settings: OllamaSettings) -> Result<Self, BackendError> {
        settings.base_url = settings.base_url.trim_end_matches('/').to_string();
        Ok(Self {
            name: name.into(),
            settings,
            http: http::client()?,
        })
    }

    /// Create an adapter from a provider's settings table.
    ///
    /// # Errors
    /// Returns `BackendError::InvalidSettings` if required keys are missing.
    pub fn from_table(name: &str, table: &toml::Table) -> Result<Self, BackendError> {
        Self::new(name, parse_settings(name, table)?)
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.settings.base_url)
    }

    fn generate_body(&self, request: &CompletionRequest, stream: bool) -> Value {
        let opts = &request.options;
        let mut options = Map::new();
        if let Some(n) = opts.max_tokens {
            options.insert("num_predict".into(), json!(n));
        }
        if let Some(t) = opts.temperature {
            options.insert("temperature".into(), json!(t));
        }
        if let Some(p) = opts.top_p {
            options.insert("top_p".into(), json!(p));
        }
        if !opts.stop.is_empty() {
            options.insert("stop".into(), json!(opts.stop));
        }

        let mut body = json!({
            "model": request.model.as_deref().unwrap_or(&self.settings.model),
            "prompt": request.prompt,
            "stream": stream,
            "options": options,
        });
        if let Some(system) = &opts.system_prompt {
            body["system"] = json!(system);
        }
        body
    }
}

/// An `error` field in a 200 body (unknown model, bad options) fails the same
/// way on every retry.
fn body_error(message: String) -> ProviderError {
    ProviderError::InvalidResponse(message)
}

fn parse_chunk(line: &str) -> Option<Result<String, ProviderError>> {
    match http::parse_line::<GenerateChunk>(line) {
        Ok(GenerateChunk { error: Some(e), .. }) => Some(Err(body_error(e))),
        Ok(chunk) if chunk.response.is_empty() => None,
        Ok(chunk) => Some(Ok(chunk.response)),
        Err(e) => Some(Err(e)),
    }
}

#[async_trait]
impl TextGenerator for OllamaProvider {
    fn name(&self) -> &str {
        &self.name
    }

    fn model(&self) -> &str {
        &self.settings.model
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities {
            streaming: true,
            embeddings: self.settings.embedding_model.is_some(),
            max_context_tokens: self.settings.max_context_tokens,
            code_optimized: self.settings.code_optimized,
            ..Capabilities::default()
        }
    }

    async fn health(&self) -> Result<(), ProviderError> {
        http::send(self.http.get(self.url("/api/tags"))).await.map(drop)
    }

    async fn complete(&self, request: &CompletionRequest) -> Result<String, ProviderError> {
        debug!(provider = %self.name, "Ollama generate");
        let chunk: GenerateChunk = http::send_json(
            self.http
                .post(self.url("/api/generate"))
                .json(&self.generate_body(request, false)),
        )
        .await?;
        match chunk.error {
            Some(e) => Err(body_error(e)),
            None => Ok(chunk.response),
        }
    }

    fn as_streaming(&self) -> Option<&dyn StreamingGenerator> {
        Some(self)
    }

    fn as_embedder(&self) -> Option<&dyn Embedder> {
        self.settings.embedding_model.is_some().then_some(self as &dyn Embedder)
    }
}

#[async_trait]
impl StreamingGenerator for OllamaProvider {
    async fn complete_stream(&self, request: &CompletionRequest) -> Result<TextStream, ProviderError> {
        let response = http::send(
            self.http
                .post(self.url("/api/generate"))
                .json(&self.generate_body(request, true)),
        )
        .await?;
        Ok(http::text_stream(response, parse_chunk))
    }
}

#[async_trait]
impl Embedder for OllamaProvider {
    fn embedding_model(&self) -> &str {
        self.settings.embedding_model.as_deref().unwrap_or(&self.settings.model)
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>, ProviderError> {
        let body = json!({ "model": self.embedding_model(), "prompt": text });
        let response: EmbeddingResponse =
            http::send_json(self.http.post(self.url("/api/embeddings")).json(&body)).await?;
        if response.embedding.is_empty() {
            return Err(ProviderError::InvalidResponse("empty embedding".into()));
        }
        Ok(response.embedding)
    }
}
