//! Endpoint resolution: which URL and key the configured provider uses.

use std::sync::Arc;

use taskwright_config::AppConfig;
use taskwright_core::error::ProviderError;
use taskwright_core::provider::Provider;

use crate::openai_compat::OpenAiCompatProvider;

/// Base URLs of OpenAI-compatible services that need no `api_url` setting.
const KNOWN_ENDPOINTS: &[(&str, &str)] = &[
    ("openrouter", "https://openrouter.ai/api/v1"),
    ("openai", "https://api.openai.com/v1"),
    ("deepseek", "https://api.deepseek.com/v1"),
    ("groq", "https://api.groq.com/openai/v1"),
    ("together", "https://api.together.xyz/v1"),
    ("ollama", "http://localhost:11434/v1"),
    ("vllm", "http://localhost:8000/v1"),
];

/// Where one provider lives and how to authenticate against it.
#[derive(Clone, PartialEq, Eq)]
pub struct Endpoint {
    pub name: String,
    pub base_url: String,
    pub api_key: String,
}

impl std::fmt::Debug for Endpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Endpoint")
            .field("name", &self.name)
            .field("base_url", &self.base_url)
            .field("api_key", &if self.api_key.is_empty() { "" } else { "[REDACTED]" })
            .finish()
    }
}

impl Endpoint {
    /// Resolve `name` against `[providers.<name>]`, then the built-in table.
    ///
    /// A provider section's key wins over the global `api_key`.
    pub fn resolve(config: &AppConfig, name: &str) -> Result<Self, ProviderError> {
        let section = config.providers.get(name);

        let base_url = section
            .and_then(|p| p.api_url.clone())
            .or_else(|| {
                KNOWN_ENDPOINTS
                    .iter()
                    .find(|(known, _)| *known == name)
                    .map(|(_, url)| url.to_string())
            })
            .ok_or_else(|| {
                ProviderError::NotConfigured(format!(
                    "no api_url for provider '{name}'; set [providers.{name}] api_url in the config file"
                ))
            })?;

        let api_key = section
            .and_then(|p| p.api_key.clone())
            .or_else(|| config.api_key.clone())
            .unwrap_or_default();

        Ok(Self {
            name: name.to_string(),
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
        })
    }
}

/// Build the client for `default_provider`.
pub fn build_from_config(config: &AppConfig) -> Result<Arc<dyn Provider>, ProviderError> {
    let endpoint = Endpoint::resolve(config, &config.default_provider)?;
    tracing::debug!(provider = %endpoint.name, base_url = %endpoint.base_url, "Provider resolved");
    Ok(Arc::new(OpenAiCompatProvider::new(endpoint)))
}
