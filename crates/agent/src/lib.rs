//! The Taskwright agent.
//!
//! A request is first classified as CHAT or TASK. Tasks run through the
//! **think → act** loop:
//!
//! 1. **Compose** the prompts for this step (base prompts + lessons + browser state)
//! 2. **Think**: send the log and tool definitions to the provider
//! 3. **Act**: dispatch each proposed tool call, appending results to the log
//! 4. Stop on `terminate`, on a plain-text answer, or when the step budget runs out
//!
//! Plan mode and post-task lesson reflection are single provider calls
//! beside the loop.

pub mod agent;
pub mod answer;
pub mod classifier;
pub mod loop_runner;
pub mod parsing;
pub mod planner;
pub mod prompt;
pub mod reflector;
pub mod session;

#[cfg(any(test, feature = "test-util"))]
pub mod testing;

pub use agent::{Agent, AgentSettings};
pub use answer::{DEFAULT_ANSWER, extract_final_answer};
pub use classifier::{Intent, IntentClassifier, IntentKind};
pub use loop_runner::{AgentLoop, RunOutcome, TerminationReason};
pub use planner::{Plan, Planner};
pub use prompt::{EphemeralPrompt, PromptComposer};
pub use reflector::LessonReflector;
pub use session::AgentSession;
