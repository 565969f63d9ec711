//! Prompt composition.
//!
//! The base system and next-step prompts are fixed for the lifetime of a
//! session. Each think step gets an [`EphemeralPrompt`] built from the bases
//! plus whatever applies to that one call (retrieved lessons, live browser
//! state). Nothing in the ephemeral prompt is written back to the session or
//! the message log.

use std::path::Path;

use taskwright_config::AgentConfig;
use taskwright_core::message::{Message, MessageLog};
use taskwright_tools::BROWSER_TOOL;

pub const DEFAULT_SYSTEM_PROMPT: &str = "\
You are Taskwright, an autonomous assistant that solves tasks by taking action rather than only talking about them.

Available tools:
- web_search: look up facts on the web. If it fails or returns nothing useful, switch to the browser.
- browser: open pages, follow links, search and read page content in a persistent session.
- terminate: call this when the task is done, with the final answer in `output`.

Work step by step: gather what you need, check it, then answer. Never claim you cannot browse; use the tools.";

pub const DEFAULT_NEXT_STEP_PROMPT: &str = "\
Review the previous tool output.
- If the task is complete, state the final answer clearly and then call `terminate`.
- If a search failed, try the browser with a relevant site.
- Do not stop at a summary before the job is finished.";

const BROWSER_NEXT_STEP_PROMPT: &str = "\
You are in the middle of a browsing session.

{state}

Decide the next browser action that moves the task forward: open a link, scroll, search, or extract the content you need.
If the page already answers the question, state the final answer and call `terminate`.";

const LESSONS_HEADER: &str = "# Lessons Learned";

/// The prompts used for a single think call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EphemeralPrompt {
    pub system: String,
    pub next_step: String,
}

impl EphemeralPrompt {
    /// The message list sent to the model: system prompt, the log, then the
    /// transient next-step instruction.
    pub fn messages(&self, log: &MessageLog) -> Vec<Message> {
        let mut messages = Vec::with_capacity(log.len() + 2);
        messages.push(Message::system(&self.system));
        messages.extend(log.messages().iter().cloned());
        if !self.next_step.trim().is_empty() {
            messages.push(Message::user(&self.next_step));
        }
        messages
    }
}

/// Holds the base prompts and builds an [`EphemeralPrompt`] per step.
#[derive(Debug, Clone)]
pub struct PromptComposer {
    system_base: String,
    next_step_base: String,
    lookback: usize,
}

impl Default for PromptComposer {
    fn default() -> Self {
        Self::new(DEFAULT_SYSTEM_PROMPT, DEFAULT_NEXT_STEP_PROMPT, 3)
    }
}

impl PromptComposer {
    pub fn new(system_base: impl Into<String>, next_step_base: impl Into<String>, lookback: usize) -> Self {
        Self {
            system_base: system_base.into(),
            next_step_base: next_step_base.into(),
            lookback,
        }
    }

    pub fn from_config(config: &AgentConfig) -> Self {
        let mut system = config
            .system_prompt_override
            .clone()
            .unwrap_or_else(|| DEFAULT_SYSTEM_PROMPT.to_string());
        if let Some(root) = &config.workspace_root {
            system.push_str(&workspace_line(root));
        }
        let next_step = config
            .next_step_prompt_override
            .clone()
            .unwrap_or_else(|| DEFAULT_NEXT_STEP_PROMPT.to_string());
        Self::new(system, next_step, config.context_lookback)
    }

    pub fn system_base(&self) -> &str {
        &self.system_base
    }

    pub fn next_step_base(&self) -> &str {
        &self.next_step_base
    }

    pub fn lookback(&self) -> usize {
        self.lookback
    }

    /// Whether the browser was called within the lookback window.
    pub fn browser_recently_used(&self, log: &MessageLog) -> bool {
        log.recent(self.lookback).iter().any(|m| m.calls_tool(BROWSER_TOOL))
    }

    /// Build the prompts for one think call.
    ///
    /// `lessons` is appended to the system prompt when non-empty. When the
    /// browser was used recently the next-step prompt is swapped for the
    /// browser variant carrying `browser_state`.
    pub fn compose(&self, log: &MessageLog, lessons: &str, browser_state: Option<&str>) -> EphemeralPrompt {
        let system = if lessons.trim().is_empty() {
            self.system_base.clone()
        } else {
            format!("{}\n\n{LESSONS_HEADER}\n{}", self.system_base, lessons.trim())
        };

        let next_step = if self.browser_recently_used(log) {
            let state = browser_state
                .filter(|s| !s.trim().is_empty())
                .unwrap_or("No page is currently open.");
            BROWSER_NEXT_STEP_PROMPT.replace("{state}", state)
        } else {
            self.next_step_base.clone()
        };

        EphemeralPrompt { system, next_step }
    }
}

fn workspace_line(root: &Path) -> String {
    format!("\n\nThe initial directory is: {}", root.display())
}

#[cfg(test)]
mod tests {
    use super::*;
    use taskwright_core::message::MessageToolCall;

    fn log_with_browser_call() -> MessageLog {
        let mut log = MessageLog::new();
        log.push(Message::user("open example.com")).unwrap();
        log.push(Message::assistant_with_calls(
            None,
            vec![MessageToolCall {
                id: "c1".into(),
                name: BROWSER_TOOL.into(),
                arguments: r#"{"action":"go_to_url","url":"https://example.com"}"#.into(),
            }],
        ))
        .unwrap();
        log.push(Message::tool_result("c1", "URL: https://example.com")).unwrap();
        log
    }

    #[test]
    fn no_lessons_keeps_base_system_prompt() {
        let composer = PromptComposer::default();
        let prompt = composer.compose(&MessageLog::new(), "", None);
        assert_eq!(prompt.system, DEFAULT_SYSTEM_PROMPT);
        assert_eq!(prompt.next_step, DEFAULT_NEXT_STEP_PROMPT);
    }

    #[test]
    fn lessons_extend_system_prompt_for_one_call() {
        let composer = PromptComposer::default();
        let block = "## User Preferences (always active)\n- Use metric units";
        let prompt = composer.compose(&MessageLog::new(), block, None);
        assert!(prompt.system.starts_with(DEFAULT_SYSTEM_PROMPT));
        assert!(prompt.system.contains("# Lessons Learned\n## User Preferences"));
        assert_eq!(composer.system_base(), DEFAULT_SYSTEM_PROMPT);
    }

    #[test]
    fn recent_browser_use_swaps_next_step_prompt() {
        let composer = PromptComposer::default();
        let log = log_with_browser_call();
        let prompt = composer.compose(&log, "", Some("Current URL: https://example.com"));
        assert!(prompt.next_step.contains("browsing session"));
        assert!(prompt.next_step.contains("Current URL: https://example.com"));
        assert_eq!(composer.next_step_base(), DEFAULT_NEXT_STEP_PROMPT);
    }

    #[test]
    fn browser_outside_lookback_is_ignored() {
        let composer = PromptComposer::new("sys", "next", 1);
        let mut log = log_with_browser_call();
        log.push(Message::assistant("Looked at it.")).unwrap();
        assert!(!composer.browser_recently_used(&log));
        assert_eq!(composer.compose(&log, "", None).next_step, "next");
    }

    #[test]
    fn messages_wrap_log_without_touching_it() {
        let mut log = MessageLog::new();
        log.push(Message::user("tell me about cats")).unwrap();
        let prompt = PromptComposer::new("sys", "next", 3).compose(&log, "", None);
        let messages = prompt.messages(&log);
        assert_eq!(messages.len(), 3);
        assert_eq!(messages[0].text(), "sys");
        assert_eq!(messages[2].text(), "next");
        assert_eq!(log.len(), 1);
    }

    #[test]
    fn config_overrides_and_workspace() {
        let config = AgentConfig {
            system_prompt_override: Some("custom".into()),
            workspace_root: Some("/work".into()),
            context_lookback: 5,
            ..AgentConfig::default()
        };
        let composer = PromptComposer::from_config(&config);
        assert_eq!(composer.system_base(), "custom\n\nThe initial directory is: /work");
        assert_eq!(composer.next_step_base(), DEFAULT_NEXT_STEP_PROMPT);
        assert_eq!(composer.lookback(), 5);
    }
}
