//! llama.cpp adapter.
//!
//! Either attaches to a running `llama-server` or, when `model_path` is set,
//! spawns one as a child process and owns it until [`TextGenerator::shutdown`].
//! All calls go over the server's native HTTP API.

use std::path::PathBuf;
use std::process::Stdio;

use async_trait::async_trait;
use parking_lot::Mutex;
use reqwest::Client;
use serde::Deserialize;
use serde_json::{Value, json};
use switchyard_core::{
    Capabilities, CompletionRequest, Embedder, ProviderError, StreamingGenerator, TextGenerator,
    TextStream,
};
use tokio::process::{Child, Command};
use tracing::{debug, info, warn};

use crate::error::BackendError;
use crate::factory::parse_settings;
use crate::http;

/// `[[providers]]` keys for `kind = "llama_cpp"`.
#[derive(Debug, Clone, Deserialize)]
pub struct LlamaCppSettings {
    /// Address of an already running server. Derived from `host` and `port`
    /// when absent.
    #[serde(default)]
    pub base_url: Option<String>,
    /// GGUF file to serve. Setting it makes the adapter spawn the server.
    #[serde(default)]
    pub model_path: Option<PathBuf>,
    /// Reported model name. Defaults to the GGUF file stem.
    #[serde(default)]
    pub model: Option<String>,
    /// Server executable.
    #[serde(default = "default_binary")]
    pub server_binary: String,
    /// Bind address for a spawned server.
    #[serde(default = "default_host")]
    pub host: String,
    /// Bind port for a spawned server.
    #[serde(default = "default_port")]
    pub port: u16,
    /// `--ctx-size`, also advertised in capabilities.
    #[serde(default = "default_context")]
    pub context_size: u32,
    /// `--n-gpu-layers`.
    #[serde(default)]
    pub gpu_layers: Option<u32>,
    /// `--threads`.
    #[serde(default)]
    pub threads: Option<u32>,
    /// Serve `/embedding` as well.
    #[serde(default)]
    pub embeddings: bool,
    /// Extra arguments appended verbatim.
    #[serde(default)]
    pub extra_args: Vec<String>,
    /// Model is tuned for source code.
    #[serde(default)]
    pub code_optimized: bool,
}

fn default_binary() -> String { "llama-server".into() }
fn default_host() -> String { "127.0.0.1".into() }
fn default_port() -> u16 { 8080 }
fn default_context() -> u32 { 4096 }

#[derive(Deserialize)]
struct CompletionChunk {
    #[serde(default)]
    content: String,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum EmbeddingResponse {
    Single { embedding: Vec<f32> },
    Batch(Vec<BatchItem>),
}

#[derive(Deserialize)]
struct BatchItem {
    embedding: Vec<Vec<f32>>,
}

impl EmbeddingResponse {
    fn into_vector(self) -> Option<Vec<f32>> {
        match self {
            Self::Single { embedding } => Some(embedding),
            Self::Batch(items) => items.into_iter().next()?.embedding.into_iter().next(),
        }
    }
}

/// llama.cpp provider, optionally owning its server process.
pub struct LlamaCppProvider {
    name: String,
    model: String,
    base_url: String,
    settings: LlamaCppSettings,
    child: Mutex<Option<Child>>,
    http: Client,
}

impl LlamaCppProvider {
    /// Create an adapter, spawning the server if `model_path` is set.
    ///
    /// Must be called within a tokio runtime when a server is spawned.
    ///
    /// # Errors
    /// `Spawn` if the server executable cannot be started, `Http` if the HTTP
    /// client cannot be built.
    pub fn new(name: impl Into<String>, settings: LlamaCppSettings) -> Result<Self, BackendError> {
        let name = name.into();
        let base_url = settings
            .base_url
            .clone()
            .unwrap_or_else(|| format!("http://{}:{}", settings.host, settings.port))
            .trim_end_matches('/')
            .to_string();
        let model = settings
            .model
            .clone()
            .or_else(|| {
                settings
                    .model_path
                    .as_ref()
                    .and_then(|p| p.file_stem())
                    .map(|s| s.to_string_lossy().into_owned())
            })
            .unwrap_or_else(|| "llama.cpp".to_string());

        let child = match &settings.model_path {
            Some(path) => {
                let child = server_command(&settings, path).spawn()?;
                info!(provider = %name, pid = ?child.id(), model = %path.display(), "Spawned llama-server");
                Some(child)
            }
            None => None,
        };

        Ok(Self {
            name,
            model,
            base_url,
            settings,
            child: Mutex::new(child),
            http: http::client()?,
        })
    }

    /// Create an adapter from a provider's settings table.
    ///
    /// # Errors
    /// As [`new`](Self::new), plus `InvalidSettings` for malformed tables.
    pub fn from_table(name: &str, table: &toml::Table) -> Result<Self, BackendError> {
        Self::new(name, parse_settings(name, table)?)
    }

    /// Whether this adapter owns a server process that is still running.
    #[must_use]
    pub fn owns_process(&self) -> bool {
        self.child.lock().is_some()
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    /// Fails if an owned server process has exited.
    fn check_process(&self) -> Result<(), ProviderError> {
        let mut guard = self.child.lock();
        let Some(child) = guard.as_mut() else {
            return Ok(());
        };
        match child.try_wait() {
            Ok(None) => Ok(()),
            Ok(Some(status)) => Err(ProviderError::Process(format!("llama-server exited: {status}"))),
            Err(e) => Err(ProviderError::Process(e.to_string())),
        }
    }

    fn completion_body(request: &CompletionRequest, stream: bool) -> Value {
        let opts = &request.options;
        let prompt = match &opts.system_prompt {
            Some(system) => format!("{system}\n\n{}", request.prompt),
            None => request.prompt.clone(),
        };
        let mut body = json!({ "prompt": prompt, "stream": stream });
        if let Some(n) = opts.max_tokens {
            body["n_predict"] = json!(n);
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

fn server_command(settings: &LlamaCppSettings, model_path: &std::path::Path) -> Command {
    let mut cmd = Command::new(&settings.server_binary);
    cmd.arg("--model")
        .arg(model_path)
        .arg("--host")
        .arg(&settings.host)
        .arg("--port")
        .arg(settings.port.to_string())
        .arg("--ctx-size")
        .arg(settings.context_size.to_string());
    if let Some(layers) = settings.gpu_layers {
        cmd.arg("--n-gpu-layers").arg(layers.to_string());
    }
    if let Some(threads) = settings.threads {
        cmd.arg("--threads").arg(threads.to_string());
    }
    if settings.embeddings {
        cmd.arg("--embedding");
    }
    cmd.args(&settings.extra_args)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .kill_on_drop(true);
    cmd
}

fn parse_chunk(line: &str) -> Option<Result<String, ProviderError>> {
    let data = http::sse_data(line)?;
    match http::parse_line::<CompletionChunk>(data) {
        Ok(chunk) if chunk.content.is_empty() => None,
        Ok(chunk) => Some(Ok(chunk.content)),
        Err(e) => Some(Err(e)),
    }
}

#[async_trait]
impl TextGenerator for LlamaCppProvider {
    fn name(&self) -> &str {
        &self.name
    }

    fn model(&self) -> &str {
        &self.model
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities {
            streaming: true,
            embeddings: self.settings.embeddings,
            max_context_tokens: self.settings.context_size,
            code_optimized: self.settings.code_optimized,
            ..Capabilities::default()
        }
    }

    async fn health(&self) -> Result<(), ProviderError> {
        self.check_process()?;
        http::send(self.http.get(self.url("/health"))).await.map(drop)
    }

    async fn complete(&self, request: &CompletionRequest) -> Result<String, ProviderError> {
        self.check_process()?;
        debug!(provider = %self.name, "llama-server completion");
        let chunk: CompletionChunk = http::send_json(
            self.http
                .post(self.url("/completion"))
                .json(&Self::completion_body(request, false)),
        )
        .await?;
        Ok(chunk.content)
    }

    fn as_streaming(&self) -> Option<&dyn StreamingGenerator> {
        Some(self)
    }

    fn as_embedder(&self) -> Option<&dyn Embedder> {
        self.settings.embeddings.then_some(self as &dyn Embedder)
    }

    async fn shutdown(&self) {
        let child = self.child.lock().take();
        let Some(mut child) = child else {
            return;
        };
        if let Err(e) = child.kill().await {
            warn!(provider = %self.name, error = %e, "Failed to stop llama-server");
        } else {
            info!(provider = %self.name, "Stopped llama-server");
        }
    }
}

#[async_trait]
impl StreamingGenerator for LlamaCppProvider {
    async fn complete_stream(&self, request: &CompletionRequest) -> Result<TextStream, ProviderError> {
        self.check_process()?;
        let response = http::send(
            self.http
                .post(self.url("/completion"))
                .json(&Self::completion_body(request, true)),
        )
        .await?;
        Ok(http::text_stream(response, parse_chunk))
    }
}

#[async_trait]
impl Embedder for LlamaCppProvider {
    fn embedding_model(&self) -> &str {
        &self.model
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>, ProviderError> {
        self.check_process()?;
        let response: EmbeddingResponse =
            http::send_json(self.http.post(self.url("/embedding")).json(&json!({ "content": text }))).await?;
        response
            .into_vector()
            .filter(|v| !v.is_empty())
            .ok_or_else(|| ProviderError::InvalidResponse("empty embedding".into()))
    }
}
