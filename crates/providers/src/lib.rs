//! LLM provider implementations for Taskwright.
//!
//! Every backend speaks the OpenAI-compatible protocol; configuration only
//! decides which endpoint and key the client uses.

pub mod endpoint;
pub mod openai_compat;

pub use endpoint::{Endpoint, build_from_config};
pub use openai_compat::OpenAiCompatProvider;
