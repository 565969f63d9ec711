//! Post-task reflection: ask the model whether anything worth keeping was learned.

use std::sync::Arc;

use taskwright_core::message::Message;
use taskwright_core::provider::{Provider, ProviderRequest};
use taskwright_core::{LessonScope, NewLesson};
use tracing::{debug, warn};

use crate::parsing::truncate;

pub const REFLECTION_TAG: &str = "reflection";

/// Replies this short carry no usable lesson.
const MIN_LESSON_CHARS: usize = 6;

pub struct LessonReflector {
    provider: Arc<dyn Provider>,
    model: String,
}

impl LessonReflector {
    pub fn new(provider: Arc<dyn Provider>, model: impl Into<String>) -> Self {
        Self {
            provider,
            model: model.into(),
        }
    }

    /// Suggest a lesson from a finished task, or `None` when nothing was learned.
    pub async fn reflect(&self, task: &str, answer: &str) -> Option<NewLesson> {
        let prompt = format!(
            "Review the task '{task}' and its result:\n{}\n\n\
             Did we learn any specific preference, constraint, or fact about the user or environment? \
             If yes, output ONLY the lesson text. If no, output 'NO'.",
            truncate(answer, 1000)
        );
        let request = ProviderRequest::new(self.model.clone(), vec![Message::user(prompt)]).with_temperature(0.0);

        let reply = match self.provider.complete(request).await {
            Ok(response) => response.message.text().trim().to_string(),
            Err(e) => {
                warn!(error = %e, "Reflection call failed");
                return None;
            }
        };

        let suggestion = interpret(&reply);
        if suggestion.is_none() {
            debug!("No lesson suggested");
        }
        suggestion
    }
}

/// Turn a reflection reply into a lesson suggestion.
pub fn interpret(reply: &str) -> Option<NewLesson> {
    let content = reply.trim().trim_matches(|c| c == '"' || c == '\'').trim();
    if content.chars().count() < MIN_LESSON_CHARS || is_negative(content) {
        return None;
    }

    let lower = content.to_lowercase();
    let scope = if lower.contains("user") || lower.contains("prefer") {
        LessonScope::User
    } else {
        LessonScope::General
    };

    Some(NewLesson::new(content, scope).with_tags([REFLECTION_TAG]))
}

/// A bare "NO" (with or without trailing punctuation or explanation).
fn is_negative(content: &str) -> bool {
    let first = content
        .split(|c: char| !c.is_alphanumeric())
        .find(|w| !w.is_empty())
        .unwrap_or_default();
    first.eq_ignore_ascii_case("no")
}
