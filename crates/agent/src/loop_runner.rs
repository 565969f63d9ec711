//! The agent reasoning loop implementation.
//!
//! Each step is one think call followed by dispatching every proposed tool
//! call in order. The run ends when `terminate` is called, when the model
//! answers without proposing a tool call, or when the step budget runs out.
//! Every run produces an answer.

use std::fmt;
use std::sync::Arc;
use std::time::Instant;

use taskwright_core::event::{AgentEvent, EventSender, emit};
use taskwright_core::message::{Message, MessageToolCall};
use taskwright_core::provider::{Provider, ProviderRequest};
use taskwright_core::tool::{ToolCall, ToolRegistry, ToolResult};
use taskwright_memory::LessonStore;
use taskwright_tools::BROWSER_TOOL;
use tracing::{debug, info, warn};

use crate::answer::{SKIPPED_PREFIX, find_answer};
use crate::prompt::EphemeralPrompt;
use crate::session::AgentSession;

/// Why a run stopped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TerminationReason {
    /// The `terminate` tool was called
    Terminated,
    /// The model answered without proposing a tool call
    FinalAnswer,
    /// `max_steps` think calls were made
    StepBudget,
    /// The model could not be reached
    ProviderFailed(String),
}

impl TerminationReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Terminated => "terminated",
            Self::FinalAnswer => "final_answer",
            Self::StepBudget => "step_budget",
            Self::ProviderFailed(_) => "provider_failed",
        }
    }

    /// Whether the answer is best-effort rather than a stated result.
    pub fn is_degraded(&self) -> bool {
        matches!(self, Self::StepBudget | Self::ProviderFailed(_))
    }
}

impl fmt::Display for TerminationReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What a run produced.
#[derive(Debug, Clone)]
pub struct RunOutcome {
    pub answer: String,
    pub steps: usize,
    pub reason: TerminationReason,
}

/// The core agent loop that orchestrates LLM calls and tool execution.
pub struct AgentLoop {
    provider: Arc<dyn Provider>,
    model: String,
    temperature: f32,
    max_tokens: Option<u32>,
    tools: Arc<ToolRegistry>,
    lessons: Option<Arc<LessonStore>>,
    role: Option<String>,
}

impl AgentLoop {
    pub fn new(provider: Arc<dyn Provider>, model: impl Into<String>, tools: Arc<ToolRegistry>) -> Self {
        Self {
            provider,
            model: model.into(),
            temperature: 0.7,
            max_tokens: None,
            tools,
            lessons: None,
            role: None,
        }
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    /// Set the default max tokens per LLM response.
    pub fn with_max_tokens(mut self, max: u32) -> Self {
        self.max_tokens = Some(max);
        self
    }

    /// Attach a lesson store; relevant lessons are injected on every think call.
    pub fn with_lessons(mut self, store: Arc<LessonStore>) -> Self {
        self.lessons = Some(store);
        self
    }

    /// Active role for ROLE-scoped lessons.
    pub fn with_role(mut self, role: Option<String>) -> Self {
        self.role = role;
        self
    }

    pub fn tools(&self) -> &Arc<ToolRegistry> {
        &self.tools
    }

    /// Run `request` to completion against `session`.
    ///
    /// The request is appended to the session log; the log is left in place
    /// for the caller to keep or reset.
    pub async fn run(&self, session: &mut AgentSession, request: &str, events: Option<&EventSender>) -> RunOutcome {
        if let Err(e) = session.start_task(request) {
            warn!(error = %e, "Rejected task request");
            session.terminated = true;
            return RunOutcome {
                answer: format!("Unable to start the task: {e}"),
                steps: 0,
                reason: TerminationReason::FinalAnswer,
            };
        }

        info!(max_steps = session.max_steps, request = %crate::parsing::truncate(request, 80), "Starting task");

        let reason = loop {
            if session.budget_exhausted() {
                warn!(steps = session.step_count, "Step budget exhausted");
                break TerminationReason::StepBudget;
            }
            session.step_count += 1;
            let step = session.step_count;
            emit(events, AgentEvent::StepStarted { step, max_steps: session.max_steps });

            let prompt = self.compose(session).await;
            let message = match self.think(session, &prompt).await {
                Ok(message) => message,
                Err(reason) => break reason,
            };

            if message.tool_calls.is_empty() {
                if message.has_text() {
                    self.record(session, Message::assistant(message.text().trim()));
                    break TerminationReason::FinalAnswer;
                }
                debug!(step, "Model returned an empty response");
                continue;
            }

            let calls = message.tool_calls.clone();
            self.record(session, Message::assistant_with_calls(message.content, calls.clone()));

            if self.act(session, step, &calls, events).await {
                break TerminationReason::Terminated;
            }
        };

        session.terminated = true;
        let answer = match (&reason, find_answer(session.task_messages())) {
            (_, Some(answer)) => answer,
            (TerminationReason::ProviderFailed(e), None) => format!("Unable to complete the task: {e}"),
            (_, None) => crate::answer::DEFAULT_ANSWER.to_string(),
        };

        info!(steps = session.step_count, reason = %reason, "Task finished");
        emit(
            events,
            AgentEvent::Terminated {
                steps: session.step_count,
                reason: reason.to_string(),
            },
        );

        RunOutcome {
            answer,
            steps: session.step_count,
            reason,
        }
    }

    /// Build this step's prompts from the session bases, lessons and browser state.
    async fn compose(&self, session: &AgentSession) -> EphemeralPrompt {
        let lessons = match (&self.lessons, session.log.last_user_text()) {
            (Some(store), Some(query)) => match store.retrieve(query, self.role.as_deref()).await {
                Ok(block) => block,
                Err(e) => {
                    warn!(error = %e, "Lesson retrieval failed, continuing without lessons");
                    String::new()
                }
            },
            _ => String::new(),
        };

        let composer = session.composer();
        let browser_state = if composer.browser_recently_used(&session.log) {
            match self.tools.get(BROWSER_TOOL) {
                Some(browser) => browser.context().await,
                None => None,
            }
        } else {
            None
        };

        composer.compose(&session.log, &lessons, browser_state.as_deref())
    }

    async fn think(&self, session: &AgentSession, prompt: &EphemeralPrompt) -> Result<Message, TerminationReason> {
        let request = ProviderRequest::new(self.model.clone(), prompt.messages(&session.log))
            .with_temperature(self.temperature)
            .with_max_tokens(self.max_tokens)
            .with_tools(self.tools.definitions());

        match self.provider.complete(request).await {
            Ok(response) => {
                if let Some(usage) = &response.usage {
                    debug!(tokens = usage.total_tokens, model = %response.model, "Think step complete");
                }
                Ok(response.message)
            }
            Err(e) => {
                warn!(provider = self.provider.name(), error = %e, "Think step failed");
                Err(TerminationReason::ProviderFailed(e.to_string()))
            }
        }
    }

    /// Dispatch every call in order. Returns true once `terminate` has run.
    async fn act(&self, session: &mut AgentSession, step: usize, calls: &[MessageToolCall], events: Option<&EventSender>) -> bool {
        let mut terminated = false;

        for tc in calls {
            if terminated {
                self.record(
                    session,
                    Message::tool_result(&tc.id, format!("{SKIPPED_PREFIX} the task was already terminated")),
                );
                continue;
            }

            emit(events, AgentEvent::ToolDispatched { step, tool_name: tc.name.clone() });
            let start = Instant::now();
            let result = match ToolCall::from_message(tc) {
                Ok(call) => self.tools.dispatch_call(&call).await,
                Err(e) => ToolResult::failure(e.to_string()).with_call_id(&tc.id),
            };
            let duration_ms = start.elapsed().as_millis() as u64;

            debug!(tool = %tc.name, success = result.is_success(), duration_ms, "Tool call finished");
            emit(
                events,
                AgentEvent::ToolFinished {
                    tool_name: tc.name.clone(),
                    success: result.is_success(),
                    duration_ms,
                },
            );

            let mut content = result.content();
            if content.trim().is_empty() {
                content = "(no output)".into();
            }
            self.record(session, Message::tool_result(&tc.id, content));

            if result.is_terminal {
                terminated = true;
            }
        }

        terminated
    }

    fn record(&self, session: &mut AgentSession, message: Message) {
        if let Err(e) = session.log.push(message) {
            warn!(error = %e, "Dropped message that violates log invariants");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::prompt::{DEFAULT_NEXT_STEP_PROMPT, DEFAULT_SYSTEM_PROMPT, PromptComposer};
    use crate::testing::{SequentialMockProvider, make_text_response, make_tool_call, make_tool_call_response};
    use async_trait::async_trait;
    use taskwright_core::error::{ProviderError, ToolError};
    use taskwright_core::message::Role;
    use taskwright_core::provider::ProviderResponse;
    use taskwright_core::tool::Tool;
    use taskwright_core::{LessonScope, NewLesson};
    use taskwright_memory::InMemoryBackend;
    use taskwright_tools::TerminateTool;
    use tokio::sync::mpsc;

    /// Returns a canned search result for any query.
    struct FakeSearch;

    #[async_trait]
    impl Tool for FakeSearch {
        fn name(&self) -> &str {
            "web_search"
        }
        fn description(&self) -> &str {
            "search"
        }
        fn parameters_schema(&self) -> serde_json::Value {
            serde_json::json!({
                "type": "object",
                "properties": {"query": {"type": "string"}},
                "required": ["query"]
            })
        }
        async fn execute(&self, arguments: serde_json::Value) -> Result<ToolResult, ToolError> {
            Ok(ToolResult::success(format!(
                "Search results for '{}': cats are small mammals",
                arguments["query"].as_str().unwrap_or_default()
            )))
        }
    }

    /// Pretends to be the browser and reports a fixed page.
    struct FakeBrowser;

    #[async_trait]
    impl Tool for FakeBrowser {
        fn name(&self) -> &str {
            BROWSER_TOOL
        }
        fn description(&self) -> &str {
            "browser"
        }
        fn parameters_schema(&self) -> serde_json::Value {
            serde_json::json!({"type": "object", "properties": {}})
        }
        async fn execute(&self, _arguments: serde_json::Value) -> Result<ToolResult, ToolError> {
            Ok(ToolResult::success("page loaded"))
        }
        async fn context(&self) -> Option<String> {
            Some("Current URL: https://cats.test/".into())
        }
    }

    fn registry() -> Arc<ToolRegistry> {
        let mut registry = ToolRegistry::new();
        registry.register(Box::new(TerminateTool));
        registry.register(Box::new(FakeSearch));
        registry.register(Box::new(FakeBrowser));
        Arc::new(registry)
    }

    fn session(max_steps: usize) -> AgentSession {
        AgentSession::new(PromptComposer::default(), max_steps)
    }

    fn search(n: usize) -> ProviderResponse {
        make_tool_call_response(vec![make_tool_call("web_search", n, serde_json::json!({"query": "cats"}))], "")
    }

    fn terminate(n: usize, args: serde_json::Value, thought: &str) -> ProviderResponse {
        make_tool_call_response(vec![make_tool_call("terminate", n, args)], thought)
    }

    #[tokio::test]
    async fn cats_scenario_search_then_terminate() {
        let provider = Arc::new(SequentialMockProvider::new(vec![
            search(1),
            terminate(2, serde_json::json!({}), "Cats are small, domesticated carnivorous mammals."),
        ]));
        let agent = AgentLoop::new(provider.clone(), "mock-model", registry());
        let mut session = session(20);

        let outcome = agent.run(&mut session, "tell me about cats", None).await;

        assert_eq!(outcome.reason, TerminationReason::Terminated);
        assert_eq!(outcome.steps, 2);
        assert_eq!(outcome.answer, "Cats are small, domesticated carnivorous mammals.");
        assert!(session.terminated);
        assert_eq!(provider.call_count(), 2);

        // user, assistant(search), tool, assistant(terminate), tool
        let roles: Vec<Role> = session.log.messages().iter().map(|m| m.role).collect();
        assert_eq!(roles, vec![Role::User, Role::Assistant, Role::Tool, Role::Assistant, Role::Tool]);
    }

    #[tokio::test]
    async fn terminate_at_step_n_stops_at_step_n() {
        let provider = Arc::new(SequentialMockProvider::new(vec![
            search(1),
            search(2),
            terminate(3, serde_json::json!({"output": "done"}), ""),
            make_text_response("never requested"),
        ]));
        let agent = AgentLoop::new(provider.clone(), "mock-model", registry());
        let outcome = agent.run(&mut session(20), "task", None).await;
        assert_eq!(outcome.steps, 3);
        assert_eq!(outcome.answer, "done");
        assert_eq!(provider.call_count(), 3);
    }

    #[tokio::test]
    async fn step_budget_stops_at_exactly_k() {
        let provider = Arc::new(SequentialMockProvider::new((1..=10).map(search).collect()));
        let agent = AgentLoop::new(provider.clone(), "mock-model", registry());
        let mut session = session(4);

        let outcome = agent.run(&mut session, "loop forever", None).await;

        assert_eq!(outcome.reason, TerminationReason::StepBudget);
        assert!(outcome.reason.is_degraded());
        assert_eq!(outcome.steps, 4);
        assert_eq!(provider.call_count(), 4);
        assert!(outcome.answer.contains("cats are small mammals"));
    }

    #[tokio::test]
    async fn text_without_tool_calls_is_final_answer() {
        let provider = Arc::new(SequentialMockProvider::texts(&["Paris is the capital of France."]));
        let agent = AgentLoop::new(provider, "mock-model", registry());
        let outcome = agent.run(&mut session(20), "capital of France?", None).await;
        assert_eq!(outcome.reason, TerminationReason::FinalAnswer);
        assert_eq!(outcome.steps, 1);
        assert_eq!(outcome.answer, "Paris is the capital of France.");
    }

    #[tokio::test]
    async fn empty_response_is_not_logged() {
        let provider = Arc::new(SequentialMockProvider::texts(&["   ", "Answer."]));
        let agent = AgentLoop::new(provider, "mock-model", registry());
        let mut session = session(20);
        let outcome = agent.run(&mut session, "q", None).await;
        assert_eq!(outcome.steps, 2);
        assert_eq!(session.log.len(), 2);
    }

    #[tokio::test]
    async fn calls_after_terminate_are_skipped() {
        let provider = Arc::new(SequentialMockProvider::new(vec![make_tool_call_response(
            vec![
                make_tool_call("terminate", 1, serde_json::json!({"output": "bye"})),
                make_tool_call("web_search", 2, serde_json::json!({"query": "late"})),
            ],
            "",
        )]));
        let agent = AgentLoop::new(provider, "mock-model", registry());
        let mut session = session(20);
        let outcome = agent.run(&mut session, "q", None).await;

        assert_eq!(outcome.answer, "bye");
        let last = session.log.messages().last().unwrap();
        assert!(last.text().starts_with(SKIPPED_PREFIX));
    }

    #[tokio::test]
    async fn tool_errors_do_not_abort_the_loop() {
        let provider = Arc::new(SequentialMockProvider::new(vec![
            make_tool_call_response(vec![make_tool_call("no_such_tool", 1, serde_json::json!({}))], ""),
            make_tool_call_response(vec![make_tool_call("web_search", 2, serde_json::json!({}))], ""),
            make_tool_call_response(
                vec![MessageToolCall {
                    id: "bad".into(),
                    name: "web_search".into(),
                    arguments: "{not json".into(),
                }],
                "",
            ),
            make_text_response("Recovered."),
        ]));
        let agent = AgentLoop::new(provider, "mock-model", registry());
        let mut session = session(20);
        let outcome = agent.run(&mut session, "q", None).await;

        assert_eq!(outcome.answer, "Recovered.");
        let errors = session
            .log
            .messages()
            .iter()
            .filter(|m| m.role == Role::Tool && m.text().starts_with("Error:"))
            .count();
        assert_eq!(errors, 3);
    }

    #[tokio::test]
    async fn provider_failure_gives_degraded_answer() {
        let provider = Arc::new(SequentialMockProvider::scripted(vec![
            Ok(search(1)),
            Err(ProviderError::Timeout("30s".into())),
        ]));
        let agent = AgentLoop::new(provider, "mock-model", registry());
        let outcome = agent.run(&mut session(20), "q", None).await;
        assert!(matches!(outcome.reason, TerminationReason::ProviderFailed(_)));
        assert!(outcome.answer.contains("cats are small mammals"));

        let provider = Arc::new(SequentialMockProvider::scripted(vec![Err(ProviderError::Network("down".into()))]));
        let agent = AgentLoop::new(provider, "mock-model", registry());
        let outcome = agent.run(&mut session(20), "q", None).await;
        assert!(outcome.answer.starts_with("Unable to complete the task"));
    }

    #[tokio::test]
    async fn base_prompts_unchanged_after_think_even_on_error() {
        let store = Arc::new(LessonStore::new(Arc::new(InMemoryBackend::new())));
        store.save(NewLesson::new("Use metric units", LessonScope::User)).await.unwrap();

        let provider = Arc::new(SequentialMockProvider::scripted(vec![
            Ok(make_tool_call_response(
                vec![make_tool_call(BROWSER_TOOL, 1, serde_json::json!({}))],
                "",
            )),
            Err(ProviderError::Network("boom".into())),
        ]));
        let agent = AgentLoop::new(provider.clone(), "mock-model", registry()).with_lessons(store);
        let mut session = session(20);
        agent.run(&mut session, "find a cat page", None).await;

        assert_eq!(session.composer().system_base(), DEFAULT_SYSTEM_PROMPT);
        assert_eq!(session.composer().next_step_base(), DEFAULT_NEXT_STEP_PROMPT);

        let requests = provider.requests();
        // Lessons injected into the system prompt of each call.
        assert!(requests[0].messages[0].text().contains("- Use metric units"));
        // Second call used the browser variant of the next-step prompt.
        let next_step = requests[1].messages.last().unwrap().text().to_string();
        assert!(next_step.contains("Current URL: https://cats.test/"));
        assert_eq!(requests[0].messages.last().unwrap().text(), DEFAULT_NEXT_STEP_PROMPT);

        // Neither the lessons nor the transient prompts leak into the log.
        assert!(session.log.messages().iter().all(|m| m.role != Role::System));
        assert!(session.log.messages().iter().all(|m| !m.text().contains("browsing session")));
    }

    #[tokio::test]
    async fn events_emitted_in_order() {
        let provider = Arc::new(SequentialMockProvider::new(vec![search(1), terminate(2, serde_json::json!({}), "ok")]));
        let agent = AgentLoop::new(provider, "mock-model", registry());
        let (tx, mut rx) = mpsc::unbounded_channel();
        agent.run(&mut session(20), "q", Some(&tx)).await;
        drop(tx);

        let mut events = Vec::new();
        while let Some(event) = rx.recv().await {
            events.push(event);
        }
        assert_eq!(events[0], AgentEvent::StepStarted { step: 1, max_steps: 20 });
        assert_eq!(events[1], AgentEvent::ToolDispatched { step: 1, tool_name: "web_search".into() });
        assert!(matches!(events[2], AgentEvent::ToolFinished { success: true, .. }));
        assert_eq!(
            events.last().unwrap(),
            &AgentEvent::Terminated { steps: 2, reason: "terminated".into() }
        );
    }

    #[tokio::test]
    async fn second_task_on_growing_log_gets_its_own_answer() {
        let provider = Arc::new(SequentialMockProvider::new(vec![
            terminate(1, serde_json::json!({"output": "ANSWER ONE"}), ""),
            make_text_response("ANSWER TWO"),
        ]));
        let agent = AgentLoop::new(provider, "mock-model", registry());
        let mut session = session(20);

        let first = agent.run(&mut session, "first task", None).await;
        let second = agent.run(&mut session, "second task", None).await;

        assert_eq!(first.answer, "ANSWER ONE");
        assert_eq!(second.answer, "ANSWER TWO");
        assert_eq!(second.reason, TerminationReason::FinalAnswer);
        assert_eq!(second.steps, 1);
        // Both tasks stay in the log.
        assert_eq!(session.log.len(), 5);
    }

    #[tokio::test]
    async fn failed_second_task_does_not_reuse_earlier_answer() {
        let provider = Arc::new(SequentialMockProvider::new(vec![make_text_response("ANSWER ONE")]));
        let agent = AgentLoop::new(provider, "mock-model", registry());
        let mut session = session(20);

        agent.run(&mut session, "first task", None).await;
        let second = agent.run(&mut session, "second task", None).await;

        assert!(matches!(second.reason, TerminationReason::ProviderFailed(_)));
        assert!(second.answer.starts_with("Unable to complete the task"));
    }

    #[tokio::test]
    async fn blank_request_still_answers() {
        let provider = Arc::new(SequentialMockProvider::texts(&[]));
        let agent = AgentLoop::new(provider.clone(), "mock-model", registry());
        let outcome = agent.run(&mut session(20), "  ", None).await;
        assert!(outcome.answer.starts_with("Unable to start the task"));
        assert_eq!(provider.call_count(), 0);
    }
}
