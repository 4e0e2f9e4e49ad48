//! `switchyard <config.toml> <prompt>...`
//!
//! Routes one prompt through the configured providers and prints the answer.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use switchyard_core::telemetry::init_tracing;
use switchyard_core::{CompletionRequest, RouterConfig};
use switchyard_llm::build_router;

/// Route a prompt through the first working LLM provider.
#[derive(Parser, Debug)]
#[command(name = "switchyard")]
#[command(version)]
struct Cli {
    /// Router configuration (TOML).
    config: PathBuf,

    /// Prompt text; multiple words are joined with spaces.
    #[arg(required = true, num_args = 1..)]
    prompt: Vec<String>,

    /// Model override passed to whichever provider answers.
    #[arg(short, long)]
    model: Option<String>,

    /// Upper bound on generated tokens.
    #[arg(long)]
    max_tokens: Option<u32>,
}

impl Cli {
    fn request(&self) -> CompletionRequest {
        let mut request = CompletionRequest::new(self.prompt.join(" "));
        if let Some(model) = &self.model {
            request = request.with_model(model.clone());
        }
        if let Some(max_tokens) = self.max_tokens {
            request = request.with_max_tokens(max_tokens);
        }
        request
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = RouterConfig::from_file(&cli.config)
        .with_context(|| format!("loading {}", cli.config.display()))?;
    init_tracing(&config.logging)?;

    let router = build_router(&config).await.context("starting router")?;
    let result = router.complete(&cli.request()).await;
    router.shutdown().await;

    let result = result.context("completion failed")?;
    println!("{}", result.text);
    eprintln!(
        "[{} / {} | {} ms, {} attempt(s)]",
        result.provider, result.model, result.metadata.duration_ms, result.metadata.attempts
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use clap::CommandFactory;

    use super::*;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn prompt_words_are_joined() {
        let cli = Cli::try_parse_from(["switchyard", "router.toml", "write", "a", "haiku", "--max-tokens", "64"])
            .expect("parse");
        assert_eq!(cli.config, PathBuf::from("router.toml"));
        let request = cli.request();
        assert_eq!(request.prompt, "write a haiku");
        assert_eq!(request.options.max_tokens, Some(64));
        assert!(request.model.is_none());
    }

    #[test]
    fn prompt_is_required() {
        let err = Cli::try_parse_from(["switchyard", "router.toml"]).expect_err("missing prompt");
        assert_eq!(err.kind(), clap::error::ErrorKind::MissingRequiredArgument);
    }
}
