//! The injected runtime API.
//!
//! The instrumenting rewriter emits calls to `push_frame`, `pop_frame`,
//! `checkpoint` and `make_locals`; loaded script code routes them through the
//! free functions in this module. Binding is process-wide: a single host
//! object receives all calls, and when no host is bound every call is a
//! no-op, so instrumented modules can be loaded outside a debugger.

use std::sync::{Arc, RwLock};

use crate::id::CheckpointId;
use crate::value::Value;

/// Ordered `(name, boxed value)` pairs visible at a program point.
pub type Locals = Vec<(String, Value)>;

/// Zero-argument closure returning the live locals at invocation time.
pub type LocalsProvider<'a> = &'a dyn Fn() -> Locals;

/// Receiver of the injected runtime calls emitted by the rewriter.
pub trait DebugHost: Send + Sync {
    fn push_frame(&self, method: &str, locals: Option<LocalsProvider<'_>>);

    fn pop_frame(&self);

    fn checkpoint(&self, id: CheckpointId, method: &str, locals: Option<LocalsProvider<'_>>);
}

static HOST: RwLock<Option<Arc<dyn DebugHost>>> = RwLock::new(None);

/// Installs the process-wide debug host, replacing any previous binding.
pub fn bind_host(host: Arc<dyn DebugHost>) {
    *write_host() = Some(host);
}

/// Removes the process-wide debug host; subsequent calls become no-ops.
pub fn unbind_host() {
    *write_host() = None;
}

fn write_host() -> std::sync::RwLockWriteGuard<'static, Option<Arc<dyn DebugHost>>> {
    match HOST.write() {
        Ok(guard) => guard,
        Err(err) => {
            tracing::error!(
                target = "waypoint.host",
                "host binding lock poisoned; continuing with recovered guard"
            );
            err.into_inner()
        }
    }
}

fn current_host() -> Option<Arc<dyn DebugHost>> {
    match HOST.read() {
        Ok(guard) => guard.clone(),
        Err(err) => err.into_inner().clone(),
    }
}

pub fn push_frame(method: &str, locals: Option<LocalsProvider<'_>>) {
    if let Some(host) = current_host() {
        host.push_frame(method, locals);
    }
}

pub fn pop_frame() {
    if let Some(host) = current_host() {
        host.pop_frame();
    }
}

pub fn checkpoint(id: CheckpointId, method: &str, locals: Option<LocalsProvider<'_>>) {
    if let Some(host) = current_host() {
        host.checkpoint(id, method, locals);
    }
}

/// Assembles a locals list; used by generated code and by hosts in tests.
#[must_use]
pub fn make_locals<I>(pairs: I) -> Locals
where
    I: IntoIterator<Item = (String, Value)>,
{
    pairs.into_iter().collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct CountingHost {
        checkpoints: AtomicUsize,
    }

    impl DebugHost for CountingHost {
        fn push_frame(&self, _method: &str, _locals: Option<LocalsProvider<'_>>) {}

        fn pop_frame(&self) {}

        fn checkpoint(
            &self,
            _id: CheckpointId,
            _method: &str,
            _locals: Option<LocalsProvider<'_>>,
        ) {
            self.checkpoints.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn unbound_host_is_a_no_op() {
        unbind_host();
        checkpoint(CheckpointId::from_raw(1), "demo.Main.run", None);

        let host = Arc::new(CountingHost::default());
        bind_host(host.clone());
        checkpoint(CheckpointId::from_raw(1), "demo.Main.run", None);
        unbind_host();
        checkpoint(CheckpointId::from_raw(2), "demo.Main.run", None);

        assert_eq!(host.checkpoints.load(Ordering::SeqCst), 1);
    }
}
