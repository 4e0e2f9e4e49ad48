//! HuggingFace Inference API adapter. Text generation and feature extraction
//! only; the API offers no streaming here.

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder};
use serde::Deserialize;
use serde_json::{Map, Value, json};
use switchyard_core::{Capabilities, CompletionRequest, Embedder, ProviderError, TextGenerator};
use tracing::debug;

use crate::error::BackendError;
use crate::factory::parse_settings;
use crate::http;

const TOKEN_VAR: &str = "HF_TOKEN";

/// `[[providers]]` keys for `kind = "huggingface"`.
#[derive(Debug, Clone, Deserialize)]
pub struct HuggingFaceSettings {
    /// API root.
    #[serde(default = "default_base_url")]
    pub base_url: String,
    /// Repository id of the generation model.
    pub model: String,
    /// Access token. Falls back to `HF_TOKEN`.
    #[serde(default)]
    pub api_key: Option<String>,
    /// Repository id of a sentence-embedding model; enables embeddings.
    #[serde(default)]
    pub embedding_model: Option<String>,
    /// Context window advertised in capabilities.
    #[serde(default = "default_context")]
    pub max_context_tokens: u32,
    /// Model is tuned for source code.
    #[serde(default)]
    pub code_optimized: bool,
}

fn default_base_url() -> String { "https://api-inference.huggingface.co".into() }
fn default_context() -> u32 { 2048 }

#[derive(Deserialize)]
struct Generated {
    generated_text: String,
}

/// Feature extraction answers with one pooled vector or one vector per token.
#[derive(Deserialize)]
#[serde(untagged)]
enum Features {
    Pooled(Vec<f32>),
    PerToken(Vec<Vec<f32>>),
}

impl Features {
    fn pooled(self) -> Vec<f32> {
        match self {
            Self::Pooled(v) => v,
            Self::PerToken(rows) => mean_pool(&rows),
        }
    }
}

#[allow(clippy::cast_precision_loss)]
fn mean_pool(rows: &[Vec<f32>]) -> Vec<f32> {
    let Some(width) = rows.first().map(Vec::len) else {
        return Vec::new();
    };
    let mut sum = vec![0.0f32; width];
    for row in rows {
        for (acc, x) in sum.iter_mut().zip(row) {
            *acc += x;
        }
    }
    let n = rows.len() as f32;
    sum.iter_mut().for_each(|x| *x /= n);
    sum
}

/// HuggingFace-hosted provider.
pub struct HuggingFaceProvider {
    name: String,
    token: Option<String>,
    settings: HuggingFaceSettings,
    http: Client,
}

impl HuggingFaceProvider {
    /// Create an adapter.
    ///
    /// # Errors
    /// Returns `BackendError::Http` if the HTTP client cannot be built.
    pub fn new(name: impl Into<String>, mut settings: HuggingFaceSettings) -> Result<Self, BackendError> {
        settings.base_url = settings.base_url.trim_end_matches('/').to_string();
        let token = settings
            .api_key
            .clone()
            .or_else(|| std::env::var(TOKEN_VAR).ok())
            .filter(|t| !t.is_empty());
        Ok(Self {
            name: name.into(),
            token,
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

    fn request(&self, builder: RequestBuilder) -> RequestBuilder {
        match &self.token {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }

    fn model_url(&self, model: &str) -> String {
        format!("{}/models/{model}", self.settings.base_url)
    }

    fn generation_body(request: &CompletionRequest) -> Value {
        let opts = &request.options;
        let inputs = match &opts.system_prompt {
            Some(system) => format!("{system}\n\n{}", request.prompt),
            None => request.prompt.clone(),
        };
        let mut parameters = Map::new();
        parameters.insert("return_full_text".into(), json!(false));
        if let Some(n) = opts.max_tokens {
            parameters.insert("max_new_tokens".into(), json!(n));
        }
        if let Some(t) = opts.temperature {
            parameters.insert("temperature".into(), json!(t));
        }
        if let Some(p) = opts.top_p {
            parameters.insert("top_p".into(), json!(p));
        }
        if !opts.stop.is_empty() {
            parameters.insert("stop".into(), json!(opts.stop));
        }
        json!({
            "inputs": inputs,
            "parameters": parameters,
            "options": { "wait_for_model": true },
        })
    }
}

#[async_trait]
impl TextGenerator for HuggingFaceProvider {
    fn name(&self) -> &str {
        &self.name
    }

    fn model(&self) -> &str {
        &self.settings.model
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities {
            embeddings: self.settings.embedding_model.is_some(),
            max_context_tokens: self.settings.max_context_tokens,
            code_optimized: self.settings.code_optimized,
            ..Capabilities::default()
        }
    }

    async fn health(&self) -> Result<(), ProviderError> {
        http::send(self.request(self.http.get(self.model_url(&self.settings.model))))
            .await
            .map(drop)
    }

    async fn complete(&self, request: &CompletionRequest) -> Result<String, ProviderError> {
        let model = request.model.as_deref().unwrap_or(&self.settings.model);
        debug!(provider = %self.name, model, "Inference API generation");
        let generated: Vec<Generated> = http::send_json(
            self.request(self.http.post(self.model_url(model)))
                .json(&Self::generation_body(request)),
        )
        .await?;
        generated
            .into_iter()
            .next()
            .map(|g| g.generated_text)
            .ok_or_else(|| ProviderError::InvalidResponse("empty generation list".into()))
    }

    fn as_embedder(&self) -> Option<&dyn Embedder> {
        self.settings.embedding_model.is_some().then_some(self as &dyn Embedder)
    }
}

#[async_trait]
impl Embedder for HuggingFaceProvider {
    fn embedding_model(&self) -> &str {
        self.settings.embedding_model.as_deref().unwrap_or(&self.settings.model)
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>, ProviderError> {
        let url = format!(
            "{}/pipeline/feature-extraction/{}",
            self.settings.base_url,
            self.embedding_model()
        );
        let body = json!({ "inputs": text, "options": { "wait_for_model": true } });
        let features: Features = http::send_json(self.request(self.http.post(url)).json(&body)).await?;
        let embedding = features.pooled();
        if embedding.is_empty() {
            return Err(ProviderError::InvalidResponse("empty embedding".into()));
        }
        Ok(embedding)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generation_asks_for_continuation_only() {
        let body = HuggingFaceProvider::generation_body(&CompletionRequest::new("fn main").with_system("rust"));
        assert_eq!(body["inputs"], "rust\n\nfn main");
        assert_eq!(body["parameters"]["return_full_text"], false);
        assert!(body["parameters"].get("max_new_tokens").is_none());
    }

    #[test]
    fn per_token_features_are_mean_pooled() {
        let features: Features = serde_json::from_str("[[1.0, 2.0], [3.0, 4.0]]").expect("json");
        assert_eq!(features.pooled(), vec![2.0, 3.0]);
        let features: Features = serde_json::from_str("[0.5, 0.25]").expect("json");
        assert_eq!(features.pooled(), vec![0.5, 0.25]);
    }

    #[test]
    fn no_streaming_capability() {
        let table: toml::Table = toml::from_str("model = \"bigcode/starcoder\"").expect("toml");
        let p = HuggingFaceProvider::from_table("hf", &table).expect("provider");
        assert!(p.as_streaming().is_none());
        assert!(!p.capabilities().streaming);
    }
}
