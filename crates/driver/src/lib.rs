//! Long-lived process driver for Taskwright.
//!
//! Speaks a line-delimited JSON protocol (see [`protocol`]) over any async
//! reader/writer pair, normally stdin/stdout. One agent stays warm across
//! requests; its conversation is cleared after every executed task.

pub mod driver;
pub mod protocol;

pub use driver::{ServeStats, SessionDriver};
pub use protocol::{Mode, Output, ProtocolError, Request, UNKNOWN_REQUEST_ID};
