//! Compile-through-cache expression evaluation.
//!
//! Each distinct `(expression, ordered local names)` pair is synthesized
//! into a tiny module whose single entrypoint binds one late-bound parameter
//! per local and returns the expression's value. The compiled callable is
//! cached in a bounded LRU; eviction drops the callable and unloads its
//! dedicated isolate, nudging reclamation a bounded number of times.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use lru::LruCache;
use thiserror::Error;
use waypoint_compile::{
    compile_source, Callable, CompileError, CompileOptions, LoadError, ModuleIsolate, OptLevel,
};
use waypoint_core::{DebuggerConfig, Value};

use crate::sanitize::sanitize_unique;

const ENTRYPOINT: &str = "repl.Snippet.eval";

#[derive(Debug, Error)]
pub enum EvalError {
    #[error("empty expression")]
    EmptyExpression,
    #[error(transparent)]
    Compile(#[from] CompileError),
    #[error(transparent)]
    Load(#[from] LoadError),
    /// Innermost cause of a fault inside the evaluated expression.
    #[error("{0}")]
    Runtime(String),
}

pub struct ExpressionEvaluator {
    capacity: usize,
    gc_nudge_limit: u32,
    gc_nudge_interval: Duration,
    state: Mutex<CacheState>,
    next_isolate: AtomicU64,
}

struct CacheState {
    lru: LruCache<String, Arc<CacheEntry>>,
}

struct CacheEntry {
    callable: Callable,
    isolate: ModuleIsolate,
}

impl ExpressionEvaluator {
    #[must_use]
    pub fn new(config: &DebuggerConfig) -> Self {
        Self {
            capacity: config.eval_cache_capacity.max(1),
            gc_nudge_limit: config.gc_nudge_limit,
            gc_nudge_interval: config.gc_nudge_interval,
            state: Mutex::new(CacheState {
                lru: LruCache::unbounded(),
            }),
            next_isolate: AtomicU64::new(0),
        }
    }

    /// Evaluates `expression` against the paused frame's ordered locals.
    ///
    /// Two invocations with the same expression and the same ordered local
    /// names share one compiled entry regardless of the concrete values.
    /// Faults inside the expression are reported as [`EvalError::Runtime`]
    /// with the innermost cause; they never unwind into the caller.
    pub fn evaluate(
        &self,
        expression: &str,
        locals: &[(String, Value)],
    ) -> Result<Value, EvalError> {
        if expression.trim().is_empty() {
            return Err(EvalError::EmptyExpression);
        }

        let key = cache_key(expression, locals);
        let entry = {
            let mut state = self.lock_state();
            match state.lru.get(&key) {
                Some(entry) => Arc::clone(entry),
                None => {
                    // Compile under the cache lock: at most one concurrent
                    // build per process, and evictions cannot race.
                    let entry = Arc::new(self.build_entry(expression, locals)?);
                    state.lru.push(key, Arc::clone(&entry));
                    while state.lru.len() > self.capacity {
                        match state.lru.pop_lru() {
                            Some((_, evicted)) => self.release_entry(evicted),
                            None => break,
                        }
                    }
                    entry
                }
            }
        };

        // Expression execution runs outside the cache lock.
        let args: Vec<Value> = locals.iter().map(|(_, value)| value.clone()).collect();
        match entry.callable.invoke(args) {
            Ok(value) => Ok(value),
            Err(err) => Err(EvalError::Runtime(err.innermost().to_string())),
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.lock_state().lru.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Whether a compiled entry exists for this key, without promoting it.
    #[must_use]
    pub fn is_cached(&self, expression: &str, locals: &[(String, Value)]) -> bool {
        let key = cache_key(expression, locals);
        self.lock_state().lru.peek(&key).is_some()
    }

    fn build_entry(
        &self,
        expression: &str,
        locals: &[(String, Value)],
    ) -> Result<CacheEntry, EvalError> {
        let names: Vec<&str> = locals.iter().map(|(name, _)| name.as_str()).collect();
        let source = synthesize_snippet(expression, &names);
        let module = compile_source(
            "<eval>",
            &source,
            CompileOptions {
                opt: OptLevel::Release,
                ..CompileOptions::default()
            },
        )?;

        let isolate_name = format!(
            "eval-{}",
            self.next_isolate.fetch_add(1, Ordering::Relaxed) + 1
        );
        let isolate = ModuleIsolate::load(isolate_name.clone(), &module)?;
        let callable = isolate.entrypoint(ENTRYPOINT).ok_or_else(|| {
            // The synthesized module always defines the entrypoint; treat a
            // miss as a compile problem rather than panicking.
            EvalError::Runtime(format!("synthesized module lost `{ENTRYPOINT}`"))
        })?;
        tracing::debug!(
            target = "waypoint.eval",
            isolate = %isolate_name,
            locals = locals.len(),
            "compiled expression snippet"
        );
        Ok(CacheEntry { callable, isolate })
    }

    fn release_entry(&self, entry: Arc<CacheEntry>) {
        let weak = entry.isolate.weak_handle();
        let name = entry.isolate.name().to_string();
        entry.isolate.unload();
        drop(entry);

        // Best-effort prompt reclamation: an in-flight invocation may still
        // hold the entry, so poll the weak handle a bounded number of times.
        for _ in 0..self.gc_nudge_limit {
            if weak.strong_count() == 0 {
                break;
            }
            std::thread::sleep(self.gc_nudge_interval);
        }
        if weak.strong_count() > 0 {
            tracing::debug!(
                target = "waypoint.eval",
                isolate = %name,
                "evicted isolate still referenced; releasing lazily"
            );
        } else {
            tracing::debug!(target = "waypoint.eval", isolate = %name, "evicted isolate released");
        }
    }

    fn lock_state(&self) -> MutexGuard<'_, CacheState> {
        match self.state.lock() {
            Ok(guard) => guard,
            Err(err) => {
                tracing::error!(
                    target = "waypoint.eval",
                    "evaluator cache mutex poisoned; continuing with recovered guard"
                );
                err.into_inner()
            }
        }
    }
}

fn cache_key(expression: &str, locals: &[(String, Value)]) -> String {
    let names: Vec<&str> = locals.iter().map(|(name, _)| name.as_str()).collect();
    format!("{expression}|{}", names.join(","))
}

/// Synthesizes the snippet module: one `any`-typed parameter per sanitized
/// local name, bound positionally at invocation, with the body returning the
/// expression's value.
fn synthesize_snippet(expression: &str, names: &[&str]) -> String {
    let params = sanitize_unique(names)
        .into_iter()
        .map(|name| format!("{name}: any"))
        .collect::<Vec<_>>()
        .join(", ");
    format!(
        "namespace repl {{\n    type Snippet {{\n        fn eval({params}) -> any {{\n            return ({expression});\n        }}\n    }}\n}}\n"
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Weak;
    use waypoint_compile::LoadedModule;

    fn config(capacity: usize) -> DebuggerConfig {
        DebuggerConfig {
            eval_cache_capacity: capacity,
            ..DebuggerConfig::default()
        }
    }

    fn locals(pairs: &[(&str, i64)]) -> Vec<(String, Value)> {
        pairs
            .iter()
            .map(|(name, value)| (name.to_string(), Value::Int(*value)))
            .collect()
    }

    fn weak_of(evaluator: &ExpressionEvaluator, expression: &str, frame: &[(String, Value)]) -> Weak<LoadedModule> {
        let key = cache_key(expression, frame);
        let state = evaluator.lock_state();
        state
            .lru
            .peek(&key)
            .expect("entry must be cached")
            .isolate
            .weak_handle()
    }

    #[test]
    fn evaluates_against_frame_locals() {
        let evaluator = ExpressionEvaluator::new(&config(4));
        let frame = locals(&[("n", 20), ("acc", 22)]);
        assert_eq!(
            evaluator.evaluate("n + acc", &frame).unwrap(),
            Value::Int(42)
        );
    }

    #[test]
    fn same_expression_and_names_share_one_entry() {
        let evaluator = ExpressionEvaluator::new(&config(4));
        let first = locals(&[("n", 1)]);
        let second = locals(&[("n", 100)]);
        assert_eq!(evaluator.evaluate("n * 2", &first).unwrap(), Value::Int(2));
        assert_eq!(
            evaluator.evaluate("n * 2", &second).unwrap(),
            Value::Int(200)
        );
        assert_eq!(evaluator.len(), 1);
    }

    #[test]
    fn different_name_lists_compile_separately() {
        let evaluator = ExpressionEvaluator::new(&config(4));
        assert_eq!(
            evaluator.evaluate("n", &locals(&[("n", 1)])).unwrap(),
            Value::Int(1)
        );
        assert_eq!(
            evaluator
                .evaluate("n", &locals(&[("n", 1), ("m", 2)]))
                .unwrap(),
            Value::Int(1)
        );
        assert_eq!(evaluator.len(), 2);
    }

    #[test]
    fn lru_eviction_releases_the_oldest_isolate() {
        let evaluator = ExpressionEvaluator::new(&config(2));
        let frame = locals(&[("n", 5)]);

        evaluator.evaluate("n + 1", &frame).unwrap();
        let evicted_weak = weak_of(&evaluator, "n + 1", &frame);
        evaluator.evaluate("n + 2", &frame).unwrap();
        evaluator.evaluate("n + 3", &frame).unwrap();

        assert_eq!(evaluator.len(), 2);
        assert!(!evaluator.is_cached("n + 1", &frame));
        assert!(evaluator.is_cached("n + 2", &frame));
        assert!(evaluator.is_cached("n + 3", &frame));
        assert_eq!(evicted_weak.strong_count(), 0);
    }

    #[test]
    fn lru_order_reflects_access_not_insertion() {
        let evaluator = ExpressionEvaluator::new(&config(2));
        let frame = locals(&[("n", 5)]);

        evaluator.evaluate("n + 2", &frame).unwrap();
        evaluator.evaluate("n + 3", &frame).unwrap();
        // Touch E2 so E3 becomes least recently used, then insert E4.
        evaluator.evaluate("n + 2", &frame).unwrap();
        evaluator.evaluate("n + 4", &frame).unwrap();

        assert!(evaluator.is_cached("n + 2", &frame));
        assert!(!evaluator.is_cached("n + 3", &frame));
        assert!(evaluator.is_cached("n + 4", &frame));
    }

    #[test]
    fn runtime_faults_are_reported_not_propagated() {
        let evaluator = ExpressionEvaluator::new(&config(4));
        let frame = locals(&[("n", 3)]);
        let err = evaluator.evaluate("1 / 0", &frame).unwrap_err();
        let EvalError::Runtime(message) = err else {
            panic!("expected runtime error");
        };
        assert!(message.contains("DivideByZero"), "message: {message}");
        // The evaluator stays usable afterwards.
        assert_eq!(evaluator.evaluate("n", &frame).unwrap(), Value::Int(3));
    }

    #[test]
    fn compile_errors_surface_with_diagnostics() {
        let evaluator = ExpressionEvaluator::new(&config(4));
        let err = evaluator
            .evaluate("nope + 1", &locals(&[("n", 1)]))
            .unwrap_err();
        assert!(matches!(err, EvalError::Compile(_)));
        assert!(err.to_string().contains("unresolved name `nope`"));
        assert!(evaluator.is_empty());
    }

    #[test]
    fn empty_expressions_are_rejected() {
        let evaluator = ExpressionEvaluator::new(&config(4));
        let err = evaluator.evaluate("   ", &[]).unwrap_err();
        assert!(matches!(err, EvalError::EmptyExpression));
    }

    #[test]
    fn awkward_local_names_are_bound_through_sanitized_parameters() {
        let evaluator = ExpressionEvaluator::new(&config(4));
        // The surface expression must use the sanitized spelling, exactly as
        // the debugger console documents for awkward names.
        let frame = vec![("0count".to_string(), Value::Int(9))];
        assert_eq!(
            evaluator.evaluate("_0count + 1", &frame).unwrap(),
            Value::Int(10)
        );
    }
}
