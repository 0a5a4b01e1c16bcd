use std::collections::BTreeSet;
use std::sync::Mutex;

use waypoint_core::CheckpointId;

/// The global breakpoint set, independent of threads, guarded by its own
/// mutex. Mutations are idempotent.
#[derive(Debug, Default)]
pub(crate) struct BreakpointSet {
    inner: Mutex<BTreeSet<CheckpointId>>,
}

impl BreakpointSet {
    /// Returns `false` when the breakpoint was already present.
    pub(crate) fn add(&self, id: CheckpointId) -> bool {
        self.lock().insert(id)
    }

    /// Returns `false` when the breakpoint was not present.
    pub(crate) fn remove(&self, id: CheckpointId) -> bool {
        self.lock().remove(&id)
    }

    pub(crate) fn contains(&self, id: CheckpointId) -> bool {
        self.lock().contains(&id)
    }

    pub(crate) fn list(&self) -> Vec<CheckpointId> {
        self.lock().iter().copied().collect()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, BTreeSet<CheckpointId>> {
        match self.inner.lock() {
            Ok(guard) => guard,
            Err(err) => {
                tracing::error!(
                    target = "waypoint.engine",
                    "breakpoint mutex poisoned; continuing with recovered guard"
                );
                err.into_inner()
            }
        }
    }
}
