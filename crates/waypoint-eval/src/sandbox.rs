//! Out-of-process evaluator protocol.
//!
//! A sandboxed evaluator binary is a thin wrapper around [`run_sandboxed`]:
//! code arrives on standard input bracketed by marker lines, the result goes
//! to standard output, and the exit code reports the outcome. Transport and
//! process supervision belong to the host; only the contract lives here.

use std::io::{self, BufRead, Write};

use waypoint_compile::{compile_source, CompileOptions, ModuleIsolate, OptLevel};

pub const BEGIN_CODE_MARKER: &str = "---BEGIN-CODE---";
pub const END_CODE_MARKER: &str = "---END-CODE---";

pub const EXIT_OK: i32 = 0;
pub const EXIT_EMPTY_INPUT: i32 = 1;
pub const EXIT_COMPILE_ERROR: i32 = 2;
pub const EXIT_RUNTIME_ERROR: i32 = 3;

/// Collects the lines between the begin and end markers. Anything before the
/// begin marker is ignored; end-of-input terminates the code block.
pub fn read_bracketed_code(reader: impl BufRead) -> io::Result<String> {
    let mut code = String::new();
    let mut in_code = false;
    for line in reader.lines() {
        let line = line?;
        match line.trim_end() {
            BEGIN_CODE_MARKER => in_code = true,
            END_CODE_MARKER => break,
            _ if in_code => {
                code.push_str(&line);
                code.push('\n');
            }
            _ => {}
        }
    }
    Ok(code)
}

/// Runs one evaluation round: read bracketed code, compile at release
/// optimization, invoke the module's first function, and report through the
/// returned exit code (`0` success, `1` empty input, `2` compile error with
/// diagnostics on `err`, `3` runtime error).
pub fn run_sandboxed(
    input: impl BufRead,
    out: &mut impl Write,
    err: &mut impl Write,
) -> io::Result<i32> {
    let code = read_bracketed_code(input)?;
    if code.trim().is_empty() {
        return Ok(EXIT_EMPTY_INPUT);
    }

    let module = match compile_source(
        "<sandbox>",
        &code,
        CompileOptions {
            opt: OptLevel::Release,
            ..CompileOptions::default()
        },
    ) {
        Ok(module) => module,
        Err(compile_err) => {
            writeln!(err, "{compile_err}")?;
            return Ok(EXIT_COMPILE_ERROR);
        }
    };

    let isolate = match ModuleIsolate::load("sandbox", &module) {
        Ok(isolate) => isolate,
        Err(load_err) => {
            writeln!(err, "{load_err}")?;
            return Ok(EXIT_COMPILE_ERROR);
        }
    };
    let Some(entry) = isolate
        .function_names()
        .first()
        .and_then(|name| isolate.entrypoint(name))
    else {
        writeln!(err, "module defines no functions")?;
        return Ok(EXIT_COMPILE_ERROR);
    };

    match entry.invoke(Vec::new()) {
        Ok(value) => {
            writeln!(out, "{value}")?;
            Ok(EXIT_OK)
        }
        Err(runtime_err) => {
            writeln!(err, "{}", runtime_err.innermost())?;
            Ok(EXIT_RUNTIME_ERROR)
        }
    }
}
