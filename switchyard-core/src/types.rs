//! Core types for completion and embedding requests and results.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// What a provider can do.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Capabilities {
    /// Plain text generation.
    pub text_generation: bool,
    /// Incremental (chunked) generation.
    pub streaming: bool,
    /// Vector embeddings.
    pub embeddings: bool,
    /// Largest context window the backend accepts, in tokens.
    pub max_context_tokens: u32,
    /// Whether a separate system prompt is honoured.
    pub system_prompt: bool,
    /// Backend model is tuned for source code.
    pub code_optimized: bool,
}

impl Default for Capabilities {
    fn default() -> Self {
        Self {
            text_generation: true,
            streaming: false,
            embeddings: false,
            max_context_tokens: 4096,
            system_prompt: true,
            code_optimized: false,
        }
    }
}

/// Optional generation parameters forwarded to the backend.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GenerationOptions {
    /// Maximum tokens to generate.
    pub max_tokens: Option<u32>,
    /// Sampling temperature.
    pub temperature: Option<f32>,
    /// Nucleus sampling cutoff.
    pub top_p: Option<f32>,
    /// Stop sequences.
    #[serde(default)]
    pub stop: Vec<String>,
    /// System prompt, for backends that support one.
    pub system_prompt: Option<String>,
    /// Caller wants incremental output.
    #[serde(default)]
    pub stream: bool,
}

/// A completion request. Transient, one per call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompletionRequest {
    /// Free-text prompt.
    pub prompt: String,
    /// Model override; the provider's configured model is used otherwise.
    pub model: Option<String>,
    /// Generation parameters.
    #[serde(default)]
    pub options: GenerationOptions,
}

impl CompletionRequest {
    /// Create a request with default options.
    #[must_use]
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            model: None,
            options: GenerationOptions::default(),
        }
    }

    /// Override the model.
    #[must_use]
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    /// Set the system prompt.
    #[must_use]
    pub fn with_system(mut self, system: impl Into<String>) -> Self {
        self.options.system_prompt = Some(system.into());
        self
    }

    /// Cap the generated length.
    #[must_use]
    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.options.max_tokens = Some(max_tokens);
        self
    }

    /// Set the sampling temperature.
    #[must_use]
    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.options.temperature = Some(temperature);
        self
    }

    /// Replace all generation options.
    #[must_use]
    pub fn with_options(mut self, options: GenerationOptions) -> Self {
        self.options = options;
        self
    }
}

/// Why generation stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FinishReason {
    /// Natural end or stop sequence.
    Stop,
    /// Token limit reached.
    Length,
    /// Generation aborted.
    Error,
}

/// Bookkeeping attached to a result.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompletionMetadata {
    /// Wall time of the whole routed call, retries and backoff included.
    pub duration_ms: u64,
    /// Adapter calls made across all candidates.
    pub attempts: u32,
    /// Number of candidates abandoned before the one that answered.
    pub fallbacks: u32,
}

/// A successful completion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompletionResult {
    /// Generated text.
    pub text: String,
    /// Name of the provider that produced it.
    pub provider: String,
    /// Model identifier.
    pub model: String,
    /// Approximate token count (see [`approximate_tokens`]).
    pub tokens: u32,
    /// Why generation stopped.
    pub finish_reason: FinishReason,
    /// Duration and attempt counts.
    pub metadata: CompletionMetadata,
}

/// A successful embedding.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmbeddingResult {
    /// The vector.
    pub embedding: Vec<f32>,
    /// Name of the provider that produced it.
    pub provider: String,
    /// Embedding model identifier.
    pub model: String,
    /// Vector length.
    pub dimensions: usize,
}

/// Policy that orders available providers before a request.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FallbackStrategy {
    /// Ascending priority, ties in registration order.
    #[default]
    Priority,
    /// Priority order, rotated one provider further on each call.
    RoundRobin,
    /// Independent shuffle on each call.
    Random,
}

/// Supported backend kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderKind {
    /// Local `llama-server` process.
    LlamaCpp,
    /// Ollama daemon.
    Ollama,
    /// HuggingFace Inference API.
    HuggingFace,
    /// Groq hosted API.
    Groq,
    /// LM Studio local server.
    LmStudio,
}

impl ProviderKind {
    /// Configuration spelling of this kind.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::LlamaCpp => "llama_cpp",
            Self::Ollama => "ollama",
            Self::HuggingFace => "huggingface",
            Self::Groq => "groq",
            Self::LmStudio => "lm_studio",
        }
    }
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProviderKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "llama_cpp" | "llamacpp" | "llama.cpp" => Ok(Self::LlamaCpp),
            "ollama" => Ok(Self::Ollama),
            "huggingface" | "hugging_face" | "hf" => Ok(Self::HuggingFace),
            "groq" => Ok(Self::Groq),
            "lm_studio" | "lmstudio" => Ok(Self::LmStudio),
            other => Err(format!("unknown provider kind '{other}'")),
        }
    }
}

/// Whitespace word count, used as a cheap token estimate.
#[must_use]
pub fn approximate_tokens(text: &str) -> u32 {
    u32::try_from(text.split_whitespace().count()).unwrap_or(u32::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_parsing_accepts_aliases() {
        assert_eq!("llama.cpp".parse::<ProviderKind>(), Ok(ProviderKind::LlamaCpp));
        assert_eq!("LM-Studio".parse::<ProviderKind>(), Ok(ProviderKind::LmStudio));
        assert_eq!("hf".parse::<ProviderKind>(), Ok(ProviderKind::HuggingFace));
        assert!("openrouter".parse::<ProviderKind>().is_err());
    }

    #[test]
    fn kind_round_trips_through_display() {
        for kind in [
            ProviderKind::LlamaCpp,
            ProviderKind::Ollama,
            ProviderKind::HuggingFace,
            ProviderKind::Groq,
            ProviderKind::LmStudio,
        ] {
            assert_eq!(kind.to_string().parse::<ProviderKind>(), Ok(kind));
        }
    }

    #[test]
    fn token_estimate_counts_words() {
        assert_eq!(approximate_tokens(""), 0);
        assert_eq!(approximate_tokens("  fn main()  {\n}  "), 4);
    }

    #[test]
    fn request_builder_sets_options() {
        let req = CompletionRequest::new("hi")
            .with_model("qwen2.5-coder")
            .with_system("be terse")
            .with_max_tokens(32)
            .with_temperature(0.2);
        assert_eq!(req.model.as_deref(), Some("qwen2.5-coder"));
        assert_eq!(req.options.system_prompt.as_deref(), Some("be terse"));
        assert_eq!(req.options.max_tokens, Some(32));
        assert_eq!(req.options.temperature, Some(0.2));
    }

    #[test]
    fn strategy_serializes_snake_case() {
        let json = serde_json::to_string(&FallbackStrategy::RoundRobin).expect("serialize");
        assert_eq!(json, "\"round_robin\"");
    }
}
