//! Intent classification: is a request small talk (CHAT) or work (TASK)?
//!
//! One LLM call with a strict output grammar. Replies are parsed as JSON
//! first, then as `TYPE:` / `RESPONSE:` lines. Anything else (or a failed
//! call) falls back to a greeting/farewell lexicon, defaulting to TASK.

use std::sync::Arc;

use serde::Serialize;
use taskwright_core::message::{Message, Role};
use taskwright_core::provider::{Provider, ProviderRequest};
use tracing::{debug, warn};

use crate::parsing::{parse_json_object, truncate};

/// Reply used when the lexicon decides a message is small talk.
pub const DEFAULT_CHAT_RESPONSE: &str = "Hello! How can I help you today?";

const LEXICON: &[&str] = &["HI", "HELLO", "HEY", "THANKS", "THANK YOU", "BYE", "GOODBYE"];

/// Maximum prior messages shown to the classifier.
pub const CONTEXT_MESSAGES: usize = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IntentKind {
    Chat,
    Task,
}

/// The classifier's decision.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "UPPERCASE")]
pub enum Intent {
    /// Answer directly with `response`
    Chat { response: String },
    /// Run the agent loop on `description`
    Task { description: String },
}

impl Intent {
    pub fn kind(&self) -> IntentKind {
        match self {
            Self::Chat { .. } => IntentKind::Chat,
            Self::Task { .. } => IntentKind::Task,
        }
    }

    pub fn is_chat(&self) -> bool {
        self.kind() == IntentKind::Chat
    }
}

pub struct IntentClassifier {
    provider: Arc<dyn Provider>,
    model: String,
}

impl IntentClassifier {
    pub fn new(provider: Arc<dyn Provider>, model: impl Into<String>) -> Self {
        Self {
            provider,
            model: model.into(),
        }
    }

    /// Classify `prompt`, using the tail of `recent` to disambiguate follow-ups.
    pub async fn classify(&self, prompt: &str, recent: &[Message]) -> Intent {
        let request = ProviderRequest::new(
            self.model.clone(),
            vec![Message::user(classifier_prompt(prompt, recent))],
        )
        .with_temperature(0.0);

        let intent = match self.provider.complete(request).await {
            Ok(response) => parse_reply(response.message.text(), prompt),
            Err(e) => {
                warn!(error = %e, "Intent classification call failed, using lexicon");
                None
            }
        };

        intent.unwrap_or_else(|| lexicon_fallback(prompt))
    }
}

fn classifier_prompt(prompt: &str, recent: &[Message]) -> String {
    let start = recent.len().saturating_sub(CONTEXT_MESSAGES);
    let context: Vec<String> = recent[start..]
        .iter()
        .filter(|m| matches!(m.role, Role::User | Role::Assistant) && m.has_text())
        .map(|m| {
            let who = if m.role == Role::User { "User" } else { "Assistant" };
            format!("{who}: {}", truncate(m.text().trim(), 200))
        })
        .collect();

    let mut out = String::new();
    if !context.is_empty() {
        out.push_str("Recent conversation:\n");
        out.push_str(&context.join("\n"));
        out.push_str("\n\n");
    }
    out.push_str(&format!(
        "Analyze the latest user message: '{prompt}'\n\n\
         Is this CHAT (greeting, small talk, thanks, a simple question answerable directly) \
         or TASK (research, browsing, multi-step work, or a follow-up to earlier work)?\n\n\
         Output ONLY JSON:\n\
         {{\"type\": \"CHAT\", \"response\": \"friendly response\"}} OR \
         {{\"type\": \"TASK\", \"description\": \"brief task description\"}}"
    ));
    out
}

/// Parse a classifier reply. `None` when it follows neither grammar.
fn parse_reply(reply: &str, prompt: &str) -> Option<Intent> {
    parse_json_reply(reply, prompt).or_else(|| parse_line_reply(reply, prompt))
}

fn parse_json_reply(reply: &str, prompt: &str) -> Option<Intent> {
    let map = parse_json_object(reply)?;
    let kind = map.get("type")?.as_str()?.trim().to_uppercase();
    let field = |key: &str| {
        map.get(key)
            .and_then(|v| v.as_str())
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
    };
    match kind.as_str() {
        "CHAT" => Some(Intent::Chat {
            response: field("response").unwrap_or_else(|| DEFAULT_CHAT_RESPONSE.to_string()),
        }),
        "TASK" => Some(Intent::Task {
            description: field("description").unwrap_or_else(|| prompt.to_string()),
        }),
        other => {
            debug!(kind = %other, "Unrecognised intent type in JSON reply");
            None
        }
    }
}

fn parse_line_reply(reply: &str, prompt: &str) -> Option<Intent> {
    let upper = reply.to_ascii_uppercase();
    let type_at = upper.find("TYPE:")?;
    let kind_text = upper[type_at + 5..].trim_start();

    let payload = upper
        .find("RESPONSE:")
        .map(|at| reply[at + "RESPONSE:".len()..].trim().to_string())
        .filter(|s| !s.is_empty());

    if kind_text.starts_with("CHAT") {
        Some(Intent::Chat {
            response: payload.unwrap_or_else(|| DEFAULT_CHAT_RESPONSE.to_string()),
        })
    } else if kind_text.starts_with("TASK") {
        Some(Intent::Task {
            description: payload.unwrap_or_else(|| prompt.to_string()),
        })
    } else {
        None
    }
}

/// Whole-word match against the greeting/farewell lexicon.
pub fn lexicon_fallback(prompt: &str) -> Intent {
    let words: Vec<String> = prompt
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .map(str::to_uppercase)
        .collect();
    let padded = format!(" {} ", words.join(" "));

    if LEXICON.iter().any(|entry| padded.contains(&format!(" {entry} "))) {
        Intent::Chat {
            response: DEFAULT_CHAT_RESPONSE.to_string(),
        }
    } else {
        Intent::Task {
            description: prompt.to_string(),
        }
    }
}
