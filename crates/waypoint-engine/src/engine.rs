use std::collections::HashMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread::ThreadId;

use crossbeam_channel::{bounded, unbounded, Receiver, Sender};
use waypoint_core::host::LocalsProvider;
use waypoint_core::{CheckpointId, CheckpointIndex, DebugHost, Locals};

use crate::breakpoints::BreakpointSet;
use crate::events::{DebugThreadId, FrameSnapshot, PauseId, PausedEvent};
use crate::state::{CurrentPause, FrameInfo, StepAction, ThreadState};

/// How a paused thread is resumed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ResumeAction {
    Continue,
    StepInto,
    StepOver,
    StepOut,
}

/// The per-thread debugger engine.
///
/// Shared across every script thread; each thread gets its own state on its
/// first callback. Pause notifications go to the single subscriber returned
/// by [`Debugger::new`]; the engine never blocks inside the notification, it
/// blocks the script thread on its own handshake afterwards.
#[derive(Clone)]
pub struct Debugger {
    shared: Arc<Shared>,
}

struct Shared {
    breakpoints: BreakpointSet,
    index: Arc<CheckpointIndex>,
    threads: Mutex<HashMap<ThreadId, Arc<ThreadCell>>>,
    events: Sender<PausedEvent>,
    next_pause_id: AtomicU64,
    next_thread_label: AtomicU64,
}

struct ThreadCell {
    label: DebugThreadId,
    state: Mutex<ThreadState>,
}

impl ThreadCell {
    fn lock_state(&self) -> MutexGuard<'_, ThreadState> {
        match self.state.lock() {
            Ok(guard) => guard,
            Err(err) => {
                tracing::error!(
                    target = "waypoint.engine",
                    thread = %self.label,
                    "thread state mutex poisoned; continuing with recovered guard"
                );
                err.into_inner()
            }
        }
    }
}

impl Debugger {
    /// Creates an engine over the unit's checkpoint index and returns the
    /// pause-event queue consumed by the REPL.
    #[must_use]
    pub fn new(index: Arc<CheckpointIndex>) -> (Self, Receiver<PausedEvent>) {
        let (events, receiver) = unbounded();
        (
            Self {
                shared: Arc::new(Shared {
                    breakpoints: BreakpointSet::default(),
                    index,
                    threads: Mutex::new(HashMap::new()),
                    events,
                    next_pause_id: AtomicU64::new(0),
                    next_thread_label: AtomicU64::new(0),
                }),
            },
            receiver,
        )
    }

    #[must_use]
    pub fn index(&self) -> &CheckpointIndex {
        &self.shared.index
    }

    /// Returns `false` when the breakpoint was already set.
    pub fn add_breakpoint(&self, id: CheckpointId) -> bool {
        self.shared.breakpoints.add(id)
    }

    /// Returns `false` when no such breakpoint was set.
    pub fn remove_breakpoint(&self, id: CheckpointId) -> bool {
        self.shared.breakpoints.remove(id)
    }

    #[must_use]
    pub fn breakpoints(&self) -> Vec<CheckpointId> {
        self.shared.breakpoints.list()
    }

    pub fn push_frame(&self, method: &str, locals: Option<LocalsProvider<'_>>) {
        let cell = self.thread_cell();
        let (locals, _diagnostic) = capture_locals(locals);
        let mut state = cell.lock_state();
        state.frames.push(FrameInfo {
            method_name: method.to_string(),
            locals: locals.unwrap_or_default(),
            last_checkpoint: None,
        });
    }

    pub fn pop_frame(&self) {
        let cell = self.thread_cell();
        let mut state = cell.lock_state();
        if state.frames.pop().is_none() {
            tracing::warn!(
                target = "waypoint.engine",
                thread = %cell.label,
                "pop_frame on an empty frame stack"
            );
        }
        if let Some(target) = state.pause_on_pop_to_depth {
            if state.frames.len() <= target {
                state.pause_on_pop_to_depth = None;
                state.pause_next = true;
            }
        }
    }

    /// The core callback, invoked by instrumented code before every original
    /// statement. May block the calling thread until the UI resumes it.
    pub fn checkpoint(&self, id: CheckpointId, method: &str, locals: Option<LocalsProvider<'_>>) {
        let cell = self.thread_cell();
        // The provider runs user code; keep it outside the state lock.
        let (fresh_locals, diagnostic) = capture_locals(locals);

        let mut state = cell.lock_state();
        let depth = state.frames.len();
        let snapshot_locals = match (&fresh_locals, state.frames.last()) {
            (Some(locals), _) => locals.clone(),
            // No provider: reuse the frame's locals from its last checkpoint.
            (None, Some(top)) => top.locals.clone(),
            // Called outside any frame: a transient frame with no locals.
            (None, None) => Locals::new(),
        };
        if let Some(top) = state.frames.last_mut() {
            if let Some(locals) = fresh_locals {
                top.locals = locals;
            }
            top.last_checkpoint = Some(id);
        }

        let breakpoint_hit = self.shared.breakpoints.contains(id);
        let step_hit = if state.pause_next {
            state.pause_next = false;
            state.clear_step_state();
            true
        } else {
            match state.step {
                StepAction::Into => {
                    state.clear_step_state();
                    true
                }
                StepAction::Over if state.run_until == Some(id) => {
                    state.clear_step_state();
                    true
                }
                // Step-out never pauses at a checkpoint; the post-pop
                // handshake arms `pause_next` instead. Step-over waits for
                // its target id or for the pop fallback.
                StepAction::Over | StepAction::Out | StepAction::None => false,
            }
        };

        if !breakpoint_hit && !step_hit {
            return;
        }

        let pause_id = PauseId(self.shared.next_pause_id.fetch_add(1, Ordering::Relaxed) + 1);
        let (resume_tx, resume_rx) = bounded(1);
        let snapshot = FrameSnapshot {
            method_name: method.to_string(),
            checkpoint_id: Some(id),
            locals: snapshot_locals,
            depth,
            diagnostic,
        };
        state.current_pause = Some(CurrentPause {
            pause_id,
            resume_tx,
        });
        state.last_paused_frame = Some(snapshot.clone());
        drop(state);

        tracing::debug!(
            target = "waypoint.engine",
            thread = %cell.label,
            %pause_id,
            checkpoint = %id,
            method,
            breakpoint = breakpoint_hit,
            "pausing thread"
        );
        let _ = self.shared.events.send(PausedEvent {
            pause_id,
            thread: cell.label,
            frame: snapshot,
        });

        // Blocks until a resume call completes the handshake.
        let _ = resume_rx.recv();
    }

    pub fn resume_continue(&self, pause_id: PauseId) {
        self.resume(pause_id, ResumeAction::Continue);
    }

    /// The next checkpoint on the resumed thread pauses, in any method.
    pub fn step_into(&self, pause_id: PauseId) {
        self.resume(pause_id, ResumeAction::StepInto);
    }

    /// Pauses at the next checkpoint of the current method, or right after
    /// the current frame returns when the thread was paused at the method's
    /// last statement.
    pub fn step_over(&self, pause_id: PauseId) {
        self.resume(pause_id, ResumeAction::StepOver);
    }

    /// Pauses at the next checkpoint in the caller once the current frame
    /// has popped.
    pub fn step_out(&self, pause_id: PauseId) {
        self.resume(pause_id, ResumeAction::StepOut);
    }

    fn resume(&self, pause_id: PauseId, action: ResumeAction) {
        let Some(cell) = self.find_paused(pause_id) else {
            // Stale pause id: the thread already resumed or never paused.
            tracing::debug!(target = "waypoint.engine", %pause_id, "ignoring stale resume");
            return;
        };
        let mut state = cell.lock_state();
        let still_current = state
            .current_pause
            .as_ref()
            .is_some_and(|current| current.pause_id == pause_id);
        if !still_current {
            return;
        }

        state.clear_all_dispositions();
        let depth = state.frames.len();
        match action {
            ResumeAction::Continue => {}
            ResumeAction::StepInto => state.step = StepAction::Into,
            ResumeAction::StepOver => self.arm_step_over(&mut state, depth),
            ResumeAction::StepOut => {
                state.step = StepAction::Out;
                state.pause_on_pop_to_depth = Some(depth.saturating_sub(1));
            }
        }

        let Some(current) = state.current_pause.take() else {
            return;
        };
        drop(state);
        tracing::debug!(
            target = "waypoint.engine",
            thread = %cell.label,
            %pause_id,
            ?action,
            "resuming thread"
        );
        let _ = current.resume_tx.send(());
    }

    fn arm_step_over(&self, state: &mut ThreadState, depth: usize) {
        let Some(top) = state.frames.last() else {
            // No frame to step within; behave as step-into.
            state.step = StepAction::Into;
            return;
        };
        let Some(current) = top.last_checkpoint else {
            state.step = StepAction::Into;
            return;
        };
        state.step = StepAction::Over;
        match self
            .shared
            .index
            .next_in_method(&top.method_name, current)
        {
            Some(next) => state.run_until = Some(next),
            // Last statement of the method (or a method unknown to the
            // index): pause right after returning to the caller.
            None => state.pause_on_pop_to_depth = Some(depth.saturating_sub(1)),
        }
    }

    fn find_paused(&self, pause_id: PauseId) -> Option<Arc<ThreadCell>> {
        let cells: Vec<Arc<ThreadCell>> = self.lock_threads().values().cloned().collect();
        cells.into_iter().find(|cell| {
            cell.lock_state()
                .current_pause
                .as_ref()
                .is_some_and(|current| current.pause_id == pause_id)
        })
    }

    /// The last frame snapshot captured for the thread that paused with
    /// `pause_id`, if it is still paused.
    #[must_use]
    pub fn paused_frame(&self, pause_id: PauseId) -> Option<FrameSnapshot> {
        let cell = self.find_paused(pause_id)?;
        let state = cell.lock_state();
        state.last_paused_frame.clone()
    }

    fn thread_cell(&self) -> Arc<ThreadCell> {
        let thread_id = std::thread::current().id();
        let mut threads = self.lock_threads();
        threads
            .entry(thread_id)
            .or_insert_with(|| {
                let label = DebugThreadId(
                    self.shared.next_thread_label.fetch_add(1, Ordering::Relaxed) + 1,
                );
                Arc::new(ThreadCell {
                    label,
                    state: Mutex::new(ThreadState::default()),
                })
            })
            .clone()
    }

    fn lock_threads(&self) -> MutexGuard<'_, HashMap<ThreadId, Arc<ThreadCell>>> {
        match self.shared.threads.lock() {
            Ok(guard) => guard,
            Err(err) => {
                tracing::error!(
                    target = "waypoint.engine",
                    "thread registry mutex poisoned; continuing with recovered guard"
                );
                err.into_inner()
            }
        }
    }
}

impl DebugHost for Debugger {
    fn push_frame(&self, method: &str, locals: Option<LocalsProvider<'_>>) {
        Debugger::push_frame(self, method, locals);
    }

    fn pop_frame(&self) {
        Debugger::pop_frame(self);
    }

    fn checkpoint(&self, id: CheckpointId, method: &str, locals: Option<LocalsProvider<'_>>) {
        Debugger::checkpoint(self, id, method, locals);
    }
}

/// Runs the locals provider, turning a panic into empty locals plus a
/// diagnostic for the frame snapshot.
fn capture_locals(provider: Option<LocalsProvider<'_>>) -> (Option<Locals>, Option<String>) {
    let Some(provider) = provider else {
        return (None, None);
    };
    match catch_unwind(AssertUnwindSafe(provider)) {
        Ok(locals) => (Some(locals), None),
        Err(payload) => {
            let message = panic_message(payload.as_ref());
            tracing::warn!(
                target = "waypoint.engine",
                %message,
                "locals provider panicked; pausing with empty locals"
            );
            (Some(Locals::new()), Some(message))
        }
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "locals provider panicked".to_string()
    }
}
