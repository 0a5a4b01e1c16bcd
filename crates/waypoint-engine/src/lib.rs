//! The per-thread debugger engine.
//!
//! Decides at every checkpoint callback whether the executing thread pauses,
//! blocks it on a one-shot handshake until the UI resumes it, and implements
//! continue / step-into / step-over / step-out across arbitrarily deep call
//! stacks on any number of script threads.

mod breakpoints;
mod engine;
mod events;
mod state;

pub use crate::engine::Debugger;
pub use crate::events::{DebugThreadId, FrameSnapshot, PauseId, PausedEvent};
