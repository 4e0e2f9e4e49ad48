//! OpenAI-compatible chat completions adapter.
//!
//! Serves both LM Studio's local server and Groq's hosted API; they differ
//! only in default address and whether a key is required.

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder};
use serde::Deserialize;
use serde_json::{Value, json};
use switchyard_core::{
    Capabilities, CompletionRequest, Embedder, ProviderError, ProviderKind, StreamingGenerator,
    TextGenerator, TextStream,
};
use tracing::debug;

use crate::error::BackendError;
use crate::factory::parse_settings;
use crate::http;

const LM_STUDIO_URL: &str = "http://localhost:1234";
const GROQ_URL: &str = "https://api.groq.com/openai";
const GROQ_KEY_VAR: &str = "GROQ_API_KEY";

/// `[[providers]]` keys for `kind = "lm_studio"` and `kind = "groq"`.
#[derive(Debug, Clone, Deserialize)]
pub struct OpenAiCompatSettings {
    /// Server address without the `/v1` suffix. Defaults per kind.
    #[serde(default)]
    pub base_url: Option<String>,
    /// Default chat model.
    pub model: String,
    /// Bearer token. Groq falls back to `GROQ_API_KEY`.
    #[serde(default)]
    pub api_key: Option<String>,
    /// Enables `/v1/embeddings` when set.
    #[serde(default)]
    pub embedding_model: Option<String>,
    /// Context window advertised in capabilities.
    #[serde(default = "default_context")]
    pub max_context_tokens: u32,
    /// Model is tuned for source code.
    #[serde(default)]
    pub code_optimized: bool,
}

fn default_context() -> u32 { 8192 }

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Deserialize)]
struct ChatMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Deserialize)]
struct ChatChunk {
    choices: Vec<ChunkChoice>,
}

#[derive(Deserialize)]
struct ChunkChoice {
    delta: ChunkDelta,
}

#[derive(Deserialize)]
struct ChunkDelta {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Deserialize)]
struct EmbeddingData {
    embedding: Vec<f32>,
}

/// Provider speaking the OpenAI `/v1` wire format.
pub struct OpenAiCompatProvider {
    name: String,
    base_url: String,
    api_key: Option<String>,
    settings: OpenAiCompatSettings,
    http: Client,
}

impl OpenAiCompatProvider {
    /// Create an adapter with an explicit address and optional key.
    ///
    /// # Errors
    /// Returns `BackendError::Http` if the HTTP client cannot be built.
    pub fn new(
        name: impl Into<String>,
        base_url: &str,
        api_key: Option<String>,
        settings: OpenAiCompatSettings,
    ) -> Result<Self, BackendError> {
        Ok(Self {
            name: name.into(),
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
            settings,
            http: http::client()?,
        })
    }

    /// Create an LM Studio or Groq adapter from a provider's settings table.
    ///
    /// # Errors
    /// `InvalidSettings` for malformed tables, `MissingSetting` when Groq has
    /// no key in the table or the environment.
    pub fn from_table(name: &str, kind: ProviderKind, table: &toml::Table) -> Result<Self, BackendError> {
        let settings: OpenAiCompatSettings = parse_settings(name, table)?;
        let (default_url, api_key) = match kind {
            ProviderKind::Groq => {
                let key = settings
                    .api_key
                    .clone()
                    .or_else(|| std::env::var(GROQ_KEY_VAR).ok())
                    .filter(|k| !k.is_empty())
                    .ok_or_else(|| BackendError::MissingSetting {
                        provider: name.to_string(),
                        setting: "api_key",
                    })?;
                (GROQ_URL, Some(key))
            }
            _ => (LM_STUDIO_URL, settings.api_key.clone()),
        };
        let base_url = settings.base_url.clone().unwrap_or_else(|| default_url.to_string());
        Self::new(name, &base_url, api_key, settings)
    }

    fn request(&self, builder: RequestBuilder) -> RequestBuilder {
        match &self.api_key {
            Some(key) => builder.bearer_auth(key),
            None => builder,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}/v1{path}", self.base_url)
    }

    fn chat_body(&self, request: &CompletionRequest, stream: bool) -> Value {
        let opts = &request.options;
        let mut messages = Vec::with_capacity(2);
        if let Some(system) = &opts.system_prompt {
            messages.push(json!({ "role": "system", "content": system }));
        }
        messages.push(json!({ "role": "user", "content": request.prompt }));

        let mut body = json!({
            "model": request.model.as_deref().unwrap_or(&self.settings.model),
            "messages": messages,
            "stream": stream,
        });
        if let Some(n) = opts.max_tokens {
            body["max_tokens"] = json!(n);
        }
        if let Some(t) = opts.temperature {
            body["temperature"] = json!(t);
        }
        if let Some(p) = opts.top_p {
            body["top_p"] = json!(p);
        }
        if !opts.stop.is_empty() {
            body["stop"] = json!(opts.stop);
        }
        body
    }
}

fn parse_chunk(line: &str) -> Option<Result<String, ProviderError>> {
    let data = http::sse_data(line)?;
    match http::parse_line::<ChatChunk>(data) {
        Ok(chunk) => chunk
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.delta.content)
            .filter(|c| !c.is_empty())
            .map(Ok),
        Err(e) => Some(Err(e)),
    }
}

#[async_trait]
impl TextGenerator for OpenAiCompatProvider {
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
        http::send(self.request(self.http.get(self.url("/models")))).await.map(drop)
    }

    async fn complete(&self, request: &CompletionRequest) -> Result<String, ProviderError> {
        debug!(provider = %self.name, "Chat completion");
        let response: ChatResponse = http::send_json(
            self.request(self.http.post(self.url("/chat/completions")))
                .json(&self.chat_body(request, false)),
        )
        .await?;
        response
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| ProviderError::InvalidResponse("no choices in completion".into()))
    }

    fn as_streaming(&self) -> Option<&dyn StreamingGenerator> {
        Some(self)
    }

    fn as_embedder(&self) -> Option<&dyn Embedder> {
        self.settings.embedding_model.is_some().then_some(self as &dyn Embedder)
    }
}

#[async_trait]
impl StreamingGenerator for OpenAiCompatProvider {
    async fn complete_stream(&self, request: &CompletionRequest) -> Result<TextStream, ProviderError> {
        let response = http::send(
            self.request(self.http.post(self.url("/chat/completions")))
                .json(&self.chat_body(request, true)),
        )
        .await?;
        Ok(http::text_stream(response, parse_chunk))
    }
}

#[async_trait]
impl Embedder for OpenAiCompatProvider {
    fn embedding_model(&self) -> &str {
        self.settings.embedding_model.as_deref().unwrap_or(&self.settings.model)
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>, ProviderError> {
        let body = json!({ "model": self.embedding_model(), "input": text });
        let response: EmbeddingResponse =
            http::send_json(self.request(self.http.post(self.url("/embeddings"))).json(&body)).await?;
        response
            .data
            .into_iter()
            .next()
            .map(|d| d.embedding)
            .filter(|e| !e.is_empty())
            .ok_or_else(|| ProviderError::InvalidResponse("empty embedding".into()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table(src: &str) -> toml::Table {
        toml::from_str(src).expect("toml")
    }

    #[test]
    fn lm_studio_needs_no_key() {
        let p = OpenAiCompatProvider::from_table("studio", ProviderKind::LmStudio, &table("model = \"qwen\""))
            .expect("provider");
        assert_eq!(p.base_url, LM_STUDIO_URL);
        assert!(p.api_key.is_none());
    }

    #[test]
    fn groq_takes_key_from_table() {
        let p = OpenAiCompatProvider::from_table(
            "groq",
            ProviderKind::Groq,
            &table("model = \"llama-3.1-8b-instant\"\napi_key = \"gsk_test\""),
        )
        .expect("provider");
        assert_eq!(p.base_url, GROQ_URL);
        assert_eq!(p.api_key.as_deref(), Some("gsk_test"));
    }

    #[test]
    fn system_prompt_becomes_first_message() {
        let p = OpenAiCompatProvider::from_table("studio", ProviderKind::LmStudio, &table("model = \"qwen\""))
            .expect("provider");
        let body = p.chat_body(&CompletionRequest::new("hi").with_system("terse").with_temperature(0.2), false);
        assert_eq!(body["messages"][0]["role"], "system");
        assert_eq!(body["messages"][1]["content"], "hi");
        assert!(body.get("max_tokens").is_none());
        assert!(body["temperature"].as_f64().is_some());
    }

    #[test]
    fn sse_chunks() {
        let line = r#"data: {"choices":[{"delta":{"content":"Hi"}}]}"#;
        assert_eq!(parse_chunk(line).map(Result::ok), Some(Some("Hi".into())));
        assert!(parse_chunk(r#"data: {"choices":[{"delta":{"role":"assistant"}}]}"#).is_none());
        assert!(parse_chunk("data: [DONE]").is_none());
    }
}
