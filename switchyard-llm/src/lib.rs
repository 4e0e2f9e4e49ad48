//! # switchyard-llm: provider adapters for switchyard
//!
//! Concrete backends behind the `switchyard-core` capability traits:
//!   - **llama.cpp** (`llama-server`, attached or spawned as a child process)
//!   - **Ollama** (local daemon)
//!   - **HuggingFace** Inference API
//!   - **Groq** and **LM Studio** (OpenAI-compatible `/v1` APIs)
//!
//! [`build_router`] turns a `RouterConfig` into a running `Router`, constructing
//! one adapter per enabled `[[providers]]` entry.
//!
//! # Wire formats
//!
//! ```text
//! ollama          POST /api/generate         JSON | NDJSON stream
//! openai_compat   POST /v1/chat/completions  JSON | SSE stream
//! huggingface     POST /models/{model}       JSON
//! llama_cpp       POST /completion           JSON | SSE stream
//! ```

pub mod error;
pub mod factory;
pub mod huggingface;
mod http;
pub mod llama_cpp;
pub mod ollama;
pub mod openai_compat;

pub use error::BackendError;
pub use factory::{build_adapter, build_router};
pub use huggingface::HuggingFaceProvider;
pub use llama_cpp::LlamaCppProvider;
pub use ollama::OllamaProvider;
pub use openai_compat::OpenAiCompatProvider;
