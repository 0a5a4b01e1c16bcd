//! Wires the pipeline together: instrument, compile, load, run under the
//! engine, evaluate against paused frames.

use std::sync::Arc;
use std::thread::JoinHandle;

use anyhow::{anyhow, Context};
use crossbeam_channel::{bounded, Receiver};
use waypoint_compile::{compile_source, Callable, CompileOptions, ModuleIsolate, OptLevel};
use waypoint_core::{host, CheckpointIndex, DebuggerConfig, Value};
use waypoint_engine::{Debugger, PausedEvent};
use waypoint_eval::ExpressionEvaluator;
use waypoint_rewrite::instrument_source;

/// One debuggable script: instrumented, compiled, loaded, and ready to run.
pub struct DebugSession {
    pub debugger: Debugger,
    pub events: Receiver<PausedEvent>,
    pub evaluator: ExpressionEvaluator,
    index: Arc<CheckpointIndex>,
    entry: Callable,
    // Keeps the script's loader scope alive for the session's lifetime.
    _isolate: ModuleIsolate,
}

/// How the script thread ended.
#[derive(Debug)]
pub enum ScriptOutcome {
    Finished(Value),
    /// Runtime errors in the script body are not captured by the debugger;
    /// the script thread terminates with them.
    Failed(String),
}

pub struct ScriptHandle {
    pub done: Receiver<ScriptOutcome>,
    join: JoinHandle<()>,
}

impl ScriptHandle {
    pub fn join(self) {
        let _ = self.join.join();
    }
}

impl DebugSession {
    /// Instruments and compiles `source`, loads it into a fresh isolate, and
    /// builds the engine over the rewriter's checkpoint index.
    pub fn prepare(
        file: &str,
        source: &str,
        entry: Option<&str>,
        config: &DebuggerConfig,
    ) -> anyhow::Result<Self> {
        let instrumented =
            instrument_source(file, source).context("failed to instrument script")?;
        let index = Arc::new(instrumented.index);

        let module = compile_source(
            file,
            &instrumented.source,
            CompileOptions {
                opt: OptLevel::Debug,
                checkpoints: Some(index.as_ref().clone()),
            },
        )
        .context("failed to compile instrumented script")?;
        let isolate =
            ModuleIsolate::load(format!("script:{file}"), &module).context("failed to load script")?;

        let entry_name = match entry {
            Some(name) => name.to_string(),
            None => default_entrypoint(&isolate.function_names())
                .ok_or_else(|| anyhow!("no entrypoint found; pass one with --entry"))?,
        };
        let entry = isolate
            .entrypoint(&entry_name)
            .ok_or_else(|| anyhow!("entrypoint `{entry_name}` not found in {file}"))?;
        if entry.arity() != 0 {
            return Err(anyhow!(
                "entrypoint `{entry_name}` takes {} argument(s); the debugger runs zero-argument entrypoints",
                entry.arity()
            ));
        }

        let (debugger, events) = Debugger::new(Arc::clone(&index));
        Ok(Self {
            debugger,
            events,
            evaluator: ExpressionEvaluator::new(config),
            index,
            entry,
            _isolate: isolate,
        })
    }

    #[must_use]
    pub fn index(&self) -> &CheckpointIndex {
        &self.index
    }

    #[must_use]
    pub fn entry_name(&self) -> &str {
        self.entry.name()
    }

    /// Binds the engine as the process-wide debug host and starts the script
    /// on its own thread.
    pub fn start(&self) -> anyhow::Result<ScriptHandle> {
        host::bind_host(Arc::new(self.debugger.clone()));
        let entry = self.entry.clone();
        let (done_tx, done) = bounded(1);
        let join = std::thread::Builder::new()
            .name("waypoint-script".to_string())
            .spawn(move || {
                let outcome = match entry.invoke(Vec::new()) {
                    Ok(value) => ScriptOutcome::Finished(value),
                    Err(err) => ScriptOutcome::Failed(err.innermost().to_string()),
                };
                let _ = done_tx.send(outcome);
            })
            .context("failed to spawn the script thread")?;
        Ok(ScriptHandle { done, join })
    }
}

/// Picks the entrypoint when none was given: a zero-parameter method named
/// `main` or `run` (in definition order), else the only zero-parameter
/// method. The instrumented entry takes no arguments by construction.
fn default_entrypoint(names: &[String]) -> Option<String> {
    names
        .iter()
        .find(|name| {
            let short = name.rsplit('.').next().unwrap_or(name);
            short == "main" || short == "run"
        })
        .or_else(|| {
            if names.len() == 1 {
                names.first()
            } else {
                None
            }
        })
        .cloned()
}
