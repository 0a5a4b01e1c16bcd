//! Library surface of the Waypoint terminal debugger: session wiring and the
//! REPL loop, kept out of `main.rs` so the integration suite can drive them.

pub mod repl;
pub mod session;

pub use crate::session::{DebugSession, ScriptOutcome};
