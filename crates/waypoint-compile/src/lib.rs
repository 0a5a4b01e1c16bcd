//! Compiler facade and collectible module isolates for Waypoint.
//!
//! This crate turns source units into emitted modules (code + debug-info byte
//! streams), loads them into named, unloadable isolates, and executes loaded
//! code. The injected runtime intrinsics (`push_frame`, `pop_frame`,
//! `checkpoint`, `make_locals`) lower to calls into the process-wide
//! [`waypoint_core::host`] binding.

pub mod diagnostics;
pub mod facade;
pub mod isolate;
pub mod program;

mod fold;
mod interp;
mod lower;

pub use crate::diagnostics::{Diagnostic, Severity};
pub use crate::facade::{
    compile_source, CompileError, CompileOptions, DebugInfo, EmittedModule, FunctionDebug,
    OptLevel,
};
pub use crate::isolate::{Callable, LoadError, LoadedModule, ModuleIsolate};
