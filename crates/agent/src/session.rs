//! Per-process (or per-task) agent state.

use taskwright_core::Error;
use taskwright_core::message::{Message, MessageLog};

use crate::prompt::PromptComposer;

/// The state one agent loop runs against.
///
/// A long-lived process keeps one session and clears its log after each
/// task; interactive chat keeps the log growing across tasks.
#[derive(Debug, Clone)]
pub struct AgentSession {
    pub log: MessageLog,
    pub step_count: usize,
    pub max_steps: usize,
    pub terminated: bool,
    task_start: usize,
    composer: PromptComposer,
}

impl AgentSession {
    pub fn new(composer: PromptComposer, max_steps: usize) -> Self {
        Self {
            log: MessageLog::new(),
            step_count: 0,
            max_steps: max_steps.max(1),
            terminated: false,
            task_start: 0,
            composer,
        }
    }

    pub fn composer(&self) -> &PromptComposer {
        &self.composer
    }

    /// Reset the step counter and append the user's request.
    ///
    /// Marks where the current task begins in the log.
    pub fn start_task(&mut self, request: &str) -> Result<(), Error> {
        let start = self.log.len();
        self.log.push(Message::user(request))?;
        self.task_start = start;
        self.step_count = 0;
        self.terminated = false;
        Ok(())
    }

    /// Messages recorded since the current task's request, request included.
    pub fn task_messages(&self) -> &[Message] {
        let messages = self.log.messages();
        &messages[self.task_start.min(messages.len())..]
    }

    /// Drop the conversation so the next task starts cold.
    pub fn reset(&mut self) {
        self.log.clear();
        self.task_start = 0;
        self.step_count = 0;
        self.terminated = false;
    }

    pub fn budget_exhausted(&self) -> bool {
        self.step_count >= self.max_steps
    }
}
