//! Subcommand implementations.

pub mod chat;
pub mod lessons;
pub mod run;
pub mod serve;

use std::sync::Arc;

use taskwright_agent::Agent;
use taskwright_config::AppConfig;
use taskwright_core::Embedder;
use taskwright_memory::{LessonStore, ProviderEmbedder};

pub type CliResult = Result<(), Box<dyn std::error::Error>>;

pub fn load_config() -> Result<AppConfig, Box<dyn std::error::Error>> {
    Ok(AppConfig::load().map_err(|e| format!("Failed to load config: {e}"))?)
}

/// Build the agent, failing early with setup help when no API key is configured.
pub async fn build_agent(config: &AppConfig) -> Result<Agent, Box<dyn std::error::Error>> {
    if !config.has_api_key() {
        eprintln!();
        eprintln!("  ERROR: No API key configured!");
        eprintln!();
        eprintln!("  Set one of these environment variables:");
        eprintln!("    TASKWRIGHT_API_KEY    (generic)");
        eprintln!("    OPENROUTER_API_KEY    (recommended)");
        eprintln!("    OPENAI_API_KEY        (for OpenAI direct)");
        eprintln!();
        eprintln!("  Or add it to your config file:");
        eprintln!("    {}", AppConfig::config_dir().join("config.toml").display());
        eprintln!();
        return Err("No API key found. See above for setup instructions.".into());
    }
    Ok(Agent::from_config(config).await?)
}

/// Open the lesson store on its own, for administration commands.
pub async fn open_lessons(config: &AppConfig) -> Result<LessonStore, Box<dyn std::error::Error>> {
    let embedder = match &config.lessons.embedding_model {
        Some(model) => {
            let provider = taskwright_providers::build_from_config(config)?;
            Some(Arc::new(ProviderEmbedder::new(provider, model)) as Arc<dyn Embedder>)
        }
        None => None,
    };
    Ok(taskwright_memory::build_from_config(&config.lessons, embedder).await?)
}
