//! Final-answer extraction from a finished run.

use std::collections::HashSet;

use taskwright_core::message::{Message, Role};
use taskwright_tools::TERMINATE_TOOL;

pub const DEFAULT_ANSWER: &str = "Task completed.";

/// Prefix of the tool message recorded for calls skipped after `terminate`.
pub const SKIPPED_PREFIX: &str = "Skipped:";

/// The best answer the log holds, if any.
///
/// Assistant messages are scanned newest first. The first one with something
/// usable decides: the `output` argument of its `terminate` call when it has
/// one, its own text otherwise. Without any, the newest tool output is used
/// (ignoring terminate acknowledgements and skipped calls).
pub fn find_answer(messages: &[Message]) -> Option<String> {
    let from_assistant = messages
        .iter()
        .rev()
        .filter(|m| m.role == Role::Assistant)
        .find_map(|m| terminate_output(m).or_else(|| m.has_text().then(|| m.text().trim().to_string())));
    if from_assistant.is_some() {
        return from_assistant;
    }

    let terminate_ids: HashSet<&str> = messages
        .iter()
        .flat_map(|m| m.tool_calls.iter())
        .filter(|tc| tc.name == TERMINATE_TOOL)
        .map(|tc| tc.id.as_str())
        .collect();

    messages
        .iter()
        .rev()
        .filter(|m| m.role == Role::Tool && m.has_text())
        .filter(|m| !m.tool_call_id.as_deref().is_some_and(|id| terminate_ids.contains(id)))
        .find(|m| !m.text().starts_with(SKIPPED_PREFIX))
        .map(|m| m.text().trim().to_string())
}

fn terminate_output(message: &Message) -> Option<String> {
    message
        .tool_calls
        .iter()
        .rev()
        .filter(|tc| tc.name == TERMINATE_TOOL)
        .find_map(|tc| {
            let args: serde_json::Value = serde_json::from_str(&tc.arguments).ok()?;
            args["output"]
                .as_str()
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
        })
}

/// [`find_answer`], falling back to a generic completion message.
pub fn extract_final_answer(messages: &[Message]) -> String {
    find_answer(messages).unwrap_or_else(|| DEFAULT_ANSWER.to_string())
}
