use crossbeam_channel::Sender;
use waypoint_core::{CheckpointId, Locals};

use crate::events::{FrameSnapshot, PauseId};

/// Pending step request on one thread.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum StepAction {
    None,
    Into,
    Over,
    Out,
}

/// One active call frame of instrumented code.
#[derive(Debug)]
pub(crate) struct FrameInfo {
    pub(crate) method_name: String,
    /// Locals snapshot taken at the last checkpoint this frame hit.
    pub(crate) locals: Locals,
    pub(crate) last_checkpoint: Option<CheckpointId>,
}

/// The one-shot resume handshake of a blocked thread.
#[derive(Debug)]
pub(crate) struct CurrentPause {
    pub(crate) pause_id: PauseId,
    pub(crate) resume_tx: Sender<()>,
}

/// Created on the first callback from a thread; persists for its lifetime.
#[derive(Debug)]
pub(crate) struct ThreadState {
    pub(crate) frames: Vec<FrameInfo>,
    pub(crate) step: StepAction,
    /// Step-over target within the current method.
    pub(crate) run_until: Option<CheckpointId>,
    /// Arms `pause_next` when a pop brings the stack to this depth or below.
    pub(crate) pause_on_pop_to_depth: Option<usize>,
    /// One-shot override: the next checkpoint pauses unconditionally.
    pub(crate) pause_next: bool,
    pub(crate) current_pause: Option<CurrentPause>,
    pub(crate) last_paused_frame: Option<FrameSnapshot>,
}

impl Default for ThreadState {
    fn default() -> Self {
        Self {
            frames: Vec::new(),
            step: StepAction::None,
            run_until: None,
            pause_on_pop_to_depth: None,
            pause_next: false,
            current_pause: None,
            last_paused_frame: None,
        }
    }
}

impl ThreadState {
    /// Clears step action, step-over target, and pop-depth trigger.
    pub(crate) fn clear_step_state(&mut self) {
        self.step = StepAction::None;
        self.run_until = None;
        self.pause_on_pop_to_depth = None;
    }

    /// Clears every pending resume disposition, including the one-shot
    /// `pause_next` override.
    pub(crate) fn clear_all_dispositions(&mut self) {
        self.clear_step_state();
        self.pause_next = false;
    }
}
