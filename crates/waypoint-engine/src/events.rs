use std::fmt;

use waypoint_core::{CheckpointId, Locals};

/// Engine-assigned label for a script thread, stable for the thread's
/// lifetime and cheap to print.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DebugThreadId(pub(crate) u64);

impl fmt::Display for DebugThreadId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "t{}", self.0)
    }
}

/// Monotonically increasing identifier of one pause instance. Resume calls
/// are routed by pause id so the UI can handle several concurrently paused
/// threads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PauseId(pub(crate) u64);

impl fmt::Display for PauseId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "p{}", self.0)
    }
}

/// Copy of the paused frame taken at pause time.
#[derive(Debug, Clone)]
pub struct FrameSnapshot {
    pub method_name: String,
    pub checkpoint_id: Option<CheckpointId>,
    pub locals: Locals,
    /// Frame-stack depth of the paused thread at the time of the pause.
    pub depth: usize,
    /// Set when the locals provider failed; the pause proceeded with empty
    /// locals.
    pub diagnostic: Option<String>,
}

/// Delivered to the single pause subscriber when a thread blocks.
#[derive(Debug, Clone)]
pub struct PausedEvent {
    pub pause_id: PauseId,
    pub thread: DebugThreadId,
    pub frame: FrameSnapshot,
}
