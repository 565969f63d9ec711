//! The `Agent` facade: one session plus everything that acts on it.

use std::sync::Arc;

use taskwright_config::AppConfig;
use taskwright_core::error::MemoryError;
use taskwright_core::event::EventSender;
use taskwright_core::provider::Provider;
use taskwright_core::tool::ToolRegistry;
use taskwright_core::{Embedder, Error, NewLesson};
use taskwright_memory::{LessonStore, ProviderEmbedder, SaveOutcome};
use tracing::{info, warn};

use crate::classifier::{CONTEXT_MESSAGES, Intent, IntentClassifier};
use crate::loop_runner::{AgentLoop, RunOutcome};
use crate::planner::{Plan, Planner};
use crate::prompt::PromptComposer;
use crate::reflector::LessonReflector;
use crate::session::AgentSession;

/// Model and loop settings for an [`Agent`].
#[derive(Debug, Clone)]
pub struct AgentSettings {
    pub model: String,
    pub temperature: f32,
    pub max_tokens: Option<u32>,
    pub max_steps: usize,
    pub role: Option<String>,
    pub composer: PromptComposer,
}

impl AgentSettings {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            model: config.default_model.clone(),
            temperature: config.default_temperature,
            max_tokens: Some(config.default_max_tokens),
            max_steps: config.agent.max_steps,
            role: config.agent.role.clone(),
            composer: PromptComposer::from_config(&config.agent),
        }
    }
}

impl Default for AgentSettings {
    fn default() -> Self {
        Self::from_config(&AppConfig::default())
    }
}

pub struct Agent {
    runner: AgentLoop,
    classifier: IntentClassifier,
    planner: Planner,
    reflector: LessonReflector,
    session: AgentSession,
    lessons: Option<Arc<LessonStore>>,
}

impl Agent {
    pub fn new(provider: Arc<dyn Provider>, tools: Arc<ToolRegistry>, settings: AgentSettings) -> Self {
        let mut runner = AgentLoop::new(provider.clone(), &settings.model, tools)
            .with_temperature(settings.temperature)
            .with_role(settings.role);
        if let Some(max) = settings.max_tokens {
            runner = runner.with_max_tokens(max);
        }

        Self {
            runner,
            classifier: IntentClassifier::new(provider.clone(), &settings.model),
            planner: Planner::new(provider.clone(), &settings.model),
            reflector: LessonReflector::new(provider, &settings.model),
            session: AgentSession::new(settings.composer, settings.max_steps),
            lessons: None,
        }
    }

    /// Attach a lesson store used for retrieval during runs and for saving.
    pub fn with_lessons(mut self, store: Arc<LessonStore>) -> Self {
        self.runner = self.runner.with_lessons(store.clone());
        self.lessons = Some(store);
        self
    }

    /// Build an agent with the configured provider, built-in tools and lesson store.
    pub async fn from_config(config: &AppConfig) -> Result<Self, Error> {
        let provider = taskwright_providers::build_from_config(config)?;

        let embedder = config.lessons.embedding_model.as_ref().map(|model| {
            Arc::new(ProviderEmbedder::new(provider.clone(), model)) as Arc<dyn Embedder>
        });
        let store = taskwright_memory::build_from_config(&config.lessons, embedder).await?;
        info!(backend = store.backend_name(), "Lesson store ready");

        let tools = Arc::new(taskwright_tools::default_registry(&config.tools));
        info!(tools = ?tools.names(), model = %config.default_model, "Agent ready");

        Ok(Self::new(provider, tools, AgentSettings::from_config(config)).with_lessons(Arc::new(store)))
    }

    pub fn session(&self) -> &AgentSession {
        &self.session
    }

    pub fn tools(&self) -> &Arc<ToolRegistry> {
        self.runner.tools()
    }

    pub fn lessons(&self) -> Option<&Arc<LessonStore>> {
        self.lessons.as_ref()
    }

    /// Decide whether `prompt` is small talk or a task, given the recent conversation.
    pub async fn classify(&self, prompt: &str) -> Intent {
        self.classifier
            .classify(prompt, self.session.log.recent(CONTEXT_MESSAGES))
            .await
    }

    pub async fn plan(&self, prompt: &str) -> Plan {
        self.planner.plan(prompt).await
    }

    /// Run `prompt` as a task on the current session.
    pub async fn execute(&mut self, prompt: &str, events: Option<&EventSender>) -> RunOutcome {
        self.runner.run(&mut self.session, prompt, events).await
    }

    /// Clear the conversation so the next task starts cold.
    pub fn reset(&mut self) {
        self.session.reset();
    }

    pub async fn reflect(&self, task: &str, answer: &str) -> Option<NewLesson> {
        self.reflector.reflect(task, answer).await
    }

    pub async fn save_lesson(&self, lesson: NewLesson) -> Result<SaveOutcome, Error> {
        let store = self
            .lessons
            .as_ref()
            .ok_or_else(|| MemoryError::Storage("No lesson store configured".into()))?;
        Ok(store.save(lesson).await?)
    }

    /// Release tool resources (the browser session) before exit.
    pub async fn shutdown(&self) {
        self.runner.tools().shutdown_all().await;
        if let Some(store) = &self.lessons {
            match store.count().await {
                Ok(n) => info!(lessons = n, "Agent shut down"),
                Err(e) => warn!(error = %e, "Agent shut down, lesson count unavailable"),
            }
        }
    }
}
