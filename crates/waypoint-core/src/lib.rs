//! Shared, dependency-minimized core types used across Waypoint.

pub mod config;
pub mod host;
pub mod id;
pub mod index;
pub mod text;
pub mod value;

pub use crate::config::DebuggerConfig;
pub use crate::host::{bind_host, unbind_host, DebugHost, Locals};
pub use crate::id::CheckpointId;
pub use crate::index::{CheckpointIndex, SourceLocation};
pub use crate::text::{LineCol, LineIndex, Span};
pub use crate::value::{RuntimeError, Value};
