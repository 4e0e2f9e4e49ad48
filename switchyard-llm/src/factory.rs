//! Config-driven router construction.

use std::sync::Arc;

use serde::de::DeserializeOwned;
use switchyard_core::error::Result;
use switchyard_core::{ProviderConfig, ProviderKind, Router, RouterConfig, TextGenerator};
use tracing::{debug, warn};

use crate::error::BackendError;
use crate::huggingface::HuggingFaceProvider;
use crate::llama_cpp::LlamaCppProvider;
use crate::ollama::OllamaProvider;
use crate::openai_compat::OpenAiCompatProvider;

/// Deserialize a provider's backend-specific keys.
pub(crate) fn parse_settings<T: DeserializeOwned>(provider: &str, table: &toml::Table) -> std::result::Result<T, BackendError> {
    toml::Value::Table(table.clone())
        .try_into()
        .map_err(|source| BackendError::InvalidSettings {
            provider: provider.to_string(),
            source,
        })
}

/// Construct the adapter for one provider entry.
///
/// # Errors
/// Whatever the backend's constructor reports.
pub fn build_adapter(kind: ProviderKind, entry: &ProviderConfig) -> std::result::Result<Arc<dyn TextGenerator>, BackendError> {
    let name = entry.name.as_str();
    let settings = &entry.settings;
    Ok(match kind {
        ProviderKind::Ollama => Arc::new(OllamaProvider::from_table(name, settings)?),
        ProviderKind::LmStudio | ProviderKind::Groq => Arc::new(OpenAiCompatProvider::from_table(name, kind, settings)?),
        ProviderKind::HuggingFace => Arc::new(HuggingFaceProvider::from_table(name, settings)?),
        ProviderKind::LlamaCpp => Arc::new(LlamaCppProvider::from_table(name, settings)?),
    })
}

/// Build and start a router from configuration.
///
/// Disabled entries are ignored. Entries with an unknown `kind` or settings
/// the backend rejects are logged and left out; the router starts with
/// whatever remains.
///
/// # Errors
/// Returns `RouterError::Config` if the router-level settings are invalid.
pub async fn build_router(config: &RouterConfig) -> Result<Router> {
    let mut builder = Router::builder(config.clone());

    for entry in &config.providers {
        if !entry.enabled {
            debug!(provider = %entry.name, "Provider disabled");
            continue;
        }
        let kind = match entry.kind.parse::<ProviderKind>() {
            Ok(kind) => kind,
            Err(e) => {
                warn!(provider = %entry.name, error = %e, "Skipping provider");
                continue;
            }
        };
        match build_adapter(kind, entry) {
            Ok(adapter) => {
                debug!(provider = %entry.name, %kind, priority = entry.priority, "Adapter constructed");
                builder = builder.provider(adapter, entry.priority);
            }
            Err(e) => warn!(provider = %entry.name, %kind, error = %e, "Skipping provider"),
        }
    }

    builder.start().await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invalid_settings_name_the_provider() {
        let entry = ProviderConfig::new("broken", "ollama", 1);
        let err = build_adapter(ProviderKind::Ollama, &entry).err().expect("model is required");
        assert!(matches!(&err, BackendError::InvalidSettings { provider, .. } if provider == "broken"));
        assert!(err.to_string().contains("model"));
    }

    #[test]
    fn kinds_map_to_adapters() {
        let mut entry = ProviderConfig::new("studio", "lm_studio", 1);
        entry.settings.insert("model".into(), toml::Value::String("qwen".into()));
        let adapter = build_adapter(ProviderKind::LmStudio, &entry).expect("adapter");
        assert_eq!(adapter.name(), "studio");
        assert_eq!(adapter.model(), "qwen");
    }
}
