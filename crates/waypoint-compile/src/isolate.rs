//! Collectible module isolates.
//!
//! An isolate is a named loader scope for one emitted module. Two isolates
//! loading the same bytes are independent. `unload` detaches the loaded
//! module so no new callables can be obtained; the module's memory is
//! reclaimed once the last outstanding [`Callable`] drops, observable through
//! the weak handle taken at load time.

use std::io::{Read, Seek, SeekFrom};
use std::sync::{Arc, Mutex, Weak};

use thiserror::Error;
use waypoint_core::{RuntimeError, Value};

use crate::facade::EmittedModule;
use crate::interp;
use crate::program::{FunctionId, Program};

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("failed to decode module code stream: {0}")]
    Decode(#[from] bincode::Error),
    #[error("i/o while reading module streams: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Debug)]
pub struct LoadedModule {
    pub name: String,
    program: Program,
}

#[derive(Debug)]
pub struct ModuleIsolate {
    name: String,
    slot: Mutex<Option<Arc<LoadedModule>>>,
    weak: Weak<LoadedModule>,
}

impl ModuleIsolate {
    /// Loads an emitted module's code stream into a fresh isolate.
    pub fn load(name: impl Into<String>, module: &EmittedModule) -> Result<Self, LoadError> {
        Self::load_bytes(name, &module.code)
    }

    pub fn load_bytes(name: impl Into<String>, code: &[u8]) -> Result<Self, LoadError> {
        let name = name.into();
        let program: Program = bincode::deserialize(code)?;
        let module = Arc::new(LoadedModule {
            name: name.clone(),
            program,
        });
        let weak = Arc::downgrade(&module);
        tracing::debug!(target = "waypoint.compile", isolate = %name, "loaded module");
        Ok(Self {
            name,
            slot: Mutex::new(Some(module)),
            weak,
        })
    }

    /// Loads from a seekable code stream, retrying once with the stream
    /// rewound before giving up.
    pub fn load_from_stream<R: Read + Seek>(
        name: impl Into<String>,
        code: &mut R,
    ) -> Result<Self, LoadError> {
        let name = name.into();
        let mut bytes = Vec::new();
        code.read_to_end(&mut bytes)?;
        match Self::load_bytes(name.clone(), &bytes) {
            Ok(isolate) => Ok(isolate),
            Err(first) => {
                tracing::warn!(
                    target = "waypoint.compile",
                    isolate = %name,
                    error = %first,
                    "module load failed; retrying with rewound stream"
                );
                code.seek(SeekFrom::Start(0))?;
                bytes.clear();
                code.read_to_end(&mut bytes)?;
                Self::load_bytes(name, &bytes)
            }
        }
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// A callable handle to `qualified`, or `None` once unloaded or when the
    /// module has no such function.
    #[must_use]
    pub fn entrypoint(&self, qualified: &str) -> Option<Callable> {
        let module = self.lock_slot().clone()?;
        let function = module.program.function_named(qualified)?;
        Some(Callable {
            name: qualified.to_string(),
            function,
            module,
        })
    }

    /// Qualified names of every function in the loaded module, in definition
    /// order. Empty once unloaded.
    #[must_use]
    pub fn function_names(&self) -> Vec<String> {
        match self.lock_slot().as_ref() {
            Some(module) => module
                .program
                .functions
                .iter()
                .map(|f| f.name.clone())
                .collect(),
            None => Vec::new(),
        }
    }

    /// Makes the module unreachable from new calls. Reclamation happens when
    /// the last outstanding callable drops; `weak_handle` observes it.
    pub fn unload(&self) {
        let previous = self.lock_slot().take();
        if previous.is_some() {
            tracing::debug!(target = "waypoint.compile", isolate = %self.name, "unloaded module");
        }
    }

    #[must_use]
    pub fn weak_handle(&self) -> Weak<LoadedModule> {
        self.weak.clone()
    }

    /// Whether the module's memory has actually been reclaimed.
    #[must_use]
    pub fn is_released(&self) -> bool {
        self.weak.strong_count() == 0
    }

    fn lock_slot(&self) -> std::sync::MutexGuard<'_, Option<Arc<LoadedModule>>> {
        match self.slot.lock() {
            Ok(guard) => guard,
            Err(err) => {
                tracing::error!(
                    target = "waypoint.compile",
                    isolate = %self.name,
                    "isolate slot mutex poisoned; continuing with recovered guard"
                );
                err.into_inner()
            }
        }
    }
}

/// Handle to one function of a loaded module. Keeps the module alive while
/// any clone exists, so an unloaded isolate's code survives in-flight calls.
#[derive(Debug, Clone)]
pub struct Callable {
    name: String,
    function: FunctionId,
    module: Arc<LoadedModule>,
}

impl Callable {
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Number of arguments the function expects.
    #[must_use]
    pub fn arity(&self) -> usize {
        self.module
            .program
            .function(self.function)
            .map_or(0, |f| f.params.len())
    }

    pub fn invoke(&self, args: Vec<Value>) -> Result<Value, RuntimeError> {
        interp::invoke(&self.module.program, self.function, args)
    }
}
