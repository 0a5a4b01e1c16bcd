//! The source compiler facade.
//!
//! Parses, checks, lowers, and serializes a unit into two byte streams: the
//! code stream (the executable program form) and the debug-info stream (file
//! name, function table, and optionally the checkpoint index produced by the
//! rewriter). Scripts compile at debug optimization so statement structure
//! and line mappings stay stable; expression evaluators compile at release.

use std::io::{self, Read, Write};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use waypoint_core::CheckpointIndex;
use waypoint_syntax::ParseError;

use crate::diagnostics::{format_diagnostics, Diagnostic};
use crate::fold::fold_program;
use crate::lower::lower_unit;

#[derive(Debug, Error)]
pub enum CompileError {
    #[error(transparent)]
    Parse(#[from] ParseError),
    #[error("compilation failed with {} error(s):\n{}", .0.len(), format_diagnostics(.0))]
    Diagnostics(Vec<Diagnostic>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OptLevel {
    /// No transformation of the lowered form.
    #[default]
    Debug,
    /// Constant folding; faulting operations are left in place.
    Release,
}

#[derive(Debug, Clone, Default)]
pub struct CompileOptions {
    pub opt: OptLevel,
    /// Checkpoint index to embed in the debug-info stream, when the unit
    /// went through the rewriter first.
    pub checkpoints: Option<CheckpointIndex>,
}

/// Sidecar metadata emitted next to the code stream.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DebugInfo {
    pub file: String,
    pub functions: Vec<FunctionDebug>,
    pub checkpoints: Option<CheckpointIndex>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FunctionDebug {
    pub name: String,
    pub params: Vec<String>,
}

impl DebugInfo {
    pub fn read_from(mut reader: impl Read) -> Result<Self, bincode::Error> {
        let mut bytes = Vec::new();
        reader.read_to_end(&mut bytes).map_err(bincode::Error::from)?;
        bincode::deserialize(&bytes)
    }
}

/// An emitted module: code and debug-info byte streams.
#[derive(Debug, Clone)]
pub struct EmittedModule {
    pub code: Vec<u8>,
    pub debug_info: Vec<u8>,
}

impl EmittedModule {
    pub fn write_to(&self, mut code: impl Write, mut debug: impl Write) -> io::Result<()> {
        code.write_all(&self.code)?;
        debug.write_all(&self.debug_info)
    }
}

/// Compiles one source unit.
///
/// All error-severity diagnostics are collected and returned together;
/// warnings are logged and do not fail the compile.
pub fn compile_source(
    file: &str,
    text: &str,
    options: CompileOptions,
) -> Result<EmittedModule, CompileError> {
    let unit = waypoint_syntax::parse(file, text)?;
    let output = lower_unit(&unit, text).map_err(CompileError::Diagnostics)?;
    for warning in &output.warnings {
        tracing::warn!(target = "waypoint.compile", "{warning}");
    }

    let mut program = output.program;
    if options.opt == OptLevel::Release {
        fold_program(&mut program);
    }

    let function_count = program.functions.len();
    let debug_info = DebugInfo {
        file: file.to_string(),
        functions: program
            .functions
            .iter()
            .map(|f| FunctionDebug {
                name: f.name.clone(),
                params: f.params.clone(),
            })
            .collect(),
        checkpoints: options.checkpoints,
    };

    let code = bincode::serialize(&program).map_err(|err| {
        // Serialization of a well-formed program cannot fail in practice;
        // surface it as a diagnostic rather than panicking.
        CompileError::Diagnostics(vec![Diagnostic {
            file: file.to_string(),
            line: 1,
            column: 1,
            severity: crate::diagnostics::Severity::Error,
            message: format!("failed to encode module: {err}"),
        }])
    })?;
    let debug_info = bincode::serialize(&debug_info).map_err(|err| {
        CompileError::Diagnostics(vec![Diagnostic {
            file: file.to_string(),
            line: 1,
            column: 1,
            severity: crate::diagnostics::Severity::Error,
            message: format!("failed to encode debug info: {err}"),
        }])
    })?;

    tracing::debug!(
        target = "waypoint.compile",
        file,
        functions = function_count,
        opt = ?options.opt,
        code_bytes = code.len(),
        "compiled unit"
    );
    Ok(EmittedModule { code, debug_info })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::isolate::ModuleIsolate;
    use waypoint_core::Value;

    #[test]
    fn compile_load_invoke_roundtrip() {
        let source = "namespace demo { type Main {
            fn twice(n: int) -> int { return n * 2; }
        } }";
        let module = compile_source("demo.wp", source, CompileOptions::default()).unwrap();
        let isolate = ModuleIsolate::load("roundtrip", &module).unwrap();
        let twice = isolate.entrypoint("demo.Main.twice").unwrap();
        assert_eq!(twice.invoke(vec![Value::Int(21)]).unwrap(), Value::Int(42));
    }

    #[test]
    fn all_errors_are_reported_together() {
        let source = "namespace demo { type Main {
            fn f() -> int { return missing + also_missing; }
        } }";
        let err = compile_source("demo.wp", source, CompileOptions::default()).unwrap_err();
        let CompileError::Diagnostics(diags) = err else {
            panic!("expected diagnostics");
        };
        assert_eq!(diags.len(), 2);
        assert!(diags[0].to_string().contains("unresolved name `missing`"));
        assert!(diags[1]
            .to_string()
            .contains("unresolved name `also_missing`"));
    }

    #[test]
    fn arity_mismatch_is_a_compile_error() {
        let source = "namespace demo { type Main {
            fn f(a: int) -> int { return a; }
            fn g() -> int { return f(1, 2); }
        } }";
        let err = compile_source("demo.wp", source, CompileOptions::default()).unwrap_err();
        assert!(err.to_string().contains("expects 1 argument(s), got 2"));
    }

    #[test]
    fn debug_info_carries_the_checkpoint_index() {
        let source = "namespace demo { type Main { fn f() { let x = 1; } } }";
        let mut checkpoints = CheckpointIndex::new();
        checkpoints.record(
            waypoint_core::CheckpointId::from_raw(1),
            "demo.Main.f",
            waypoint_core::SourceLocation {
                file: "demo.wp".to_string(),
                line: 1,
                column: 39,
            },
        );
        let module = compile_source(
            "demo.wp",
            source,
            CompileOptions {
                checkpoints: Some(checkpoints),
                ..CompileOptions::default()
            },
        )
        .unwrap();

        let info = DebugInfo::read_from(module.debug_info.as_slice()).unwrap();
        assert_eq!(info.file, "demo.wp");
        assert_eq!(info.functions.len(), 1);
        let index = info.checkpoints.unwrap();
        assert_eq!(index.len(), 1);
    }
}
