//! Agent events: progress reporting decoupled from the loop.
//!
//! The agent loop emits an [`AgentEvent`] whenever something observable
//! happens during a run. Whoever drives the run (the line-protocol driver,
//! the interactive CLI) may pass an [`EventSender`] and render the events
//! however it likes. Sends never block and a dropped receiver is ignored.

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

/// Sender half handed to a single agent run.
pub type EventSender = mpsc::UnboundedSender<AgentEvent>;

/// Something observable that happened during a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum AgentEvent {
    /// A think step is starting
    StepStarted { step: usize, max_steps: usize },

    /// A tool call is about to be dispatched
    ToolDispatched { step: usize, tool_name: String },

    /// A tool call came back
    ToolFinished {
        tool_name: String,
        success: bool,
        duration_ms: u64,
    },

    /// The run ended
    Terminated { steps: usize, reason: String },
}

/// How an event is surfaced on the line protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventKind {
    /// Coarse run progress
    Progress,
    /// Individual tool activity
    Activity,
}

impl EventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Progress => "progress",
            Self::Activity => "activity",
        }
    }
}

impl AgentEvent {
    pub fn kind(&self) -> EventKind {
        match self {
            Self::StepStarted { .. } | Self::Terminated { .. } => EventKind::Progress,
            Self::ToolDispatched { .. } | Self::ToolFinished { .. } => EventKind::Activity,
        }
    }

    /// One-line human-readable description.
    pub fn describe(&self) -> String {
        match self {
            Self::StepStarted { step, max_steps } => format!("Step {step}/{max_steps}"),
            Self::ToolDispatched { tool_name, .. } => format!("Using {tool_name}"),
            Self::ToolFinished {
                tool_name,
                success,
                duration_ms,
            } => {
                if *success {
                    format!("{tool_name} finished in {duration_ms}ms")
                } else {
                    format!("{tool_name} failed after {duration_ms}ms")
                }
            }
            Self::Terminated { steps, reason } => format!("Finished after {steps} steps ({reason})"),
        }
    }
}

/// Send an event if a sender is attached.
pub fn emit(sender: Option<&EventSender>, event: AgentEvent) {
    if let Some(tx) = sender {
        // A closed receiver only means nobody is listening any more.
        let _ = tx.send(event);
    }
}
