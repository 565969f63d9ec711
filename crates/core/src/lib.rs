//! # Taskwright Core
//!
//! Domain types, traits, and error definitions for the Taskwright agent
//! runtime. It has no I/O of its own: it defines the domain model that every
//! other crate implements against.
//!
//! ## Design Philosophy
//!
//! Every subsystem is defined as a trait here. Implementations live in their
//! respective crates:
//! - [`Provider`]: LLM backends (`taskwright-providers`)
//! - [`Tool`]: capabilities dispatched by the [`ToolRegistry`] (`taskwright-tools`)
//! - [`LessonBackend`] / [`Embedder`]: lesson persistence and embeddings (`taskwright-memory`)

pub mod error;
pub mod event;
pub mod lesson;
pub mod message;
pub mod provider;
pub mod schema;
pub mod tool;

// Re-export key types at crate root for ergonomics
pub use error::{Error, Result};
pub use event::{AgentEvent, EventKind, EventSender, emit};
pub use lesson::{Embedder, Lesson, LessonBackend, LessonScope, NO_ROLE, NewLesson};
pub use message::{Message, MessageLog, MessageToolCall, Role};
pub use provider::{
    EmbeddingRequest, EmbeddingResponse, Provider, ProviderRequest, ProviderResponse, ToolDefinition, Usage,
};
pub use tool::{Tool, ToolCall, ToolRegistry, ToolResult};
