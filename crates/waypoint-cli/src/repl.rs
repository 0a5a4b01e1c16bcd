//! The terminal REPL: pre-run commands against the checkpoint map and
//! breakpoint set, then a pause-event loop with paused-frame commands.

use std::io::{BufRead, Write};

use waypoint_core::CheckpointId;
use waypoint_engine::PausedEvent;

use crate::session::{DebugSession, ScriptOutcome};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PreRunCommand {
    Map,
    MapLine { file: String, line: u32 },
    BpAdd(CheckpointId),
    BpAddLine { file: String, line: u32 },
    BpRm(CheckpointId),
    BpList,
    Run,
    Quit,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PausedCommand {
    Continue,
    StepInto,
    StepOver,
    StepOut,
    Eval(String),
    AddBreakpoint(CheckpointId),
    Quit,
}

pub fn parse_pre_run(line: &str) -> Result<PreRunCommand, String> {
    let mut parts = line.split_whitespace();
    let head = parts.next().ok_or("empty command")?;
    match head {
        "map" => Ok(PreRunCommand::Map),
        "mapline" => {
            let (file, line) = parse_file_line(parts.next().ok_or("usage: mapline <file>:<line>")?)?;
            Ok(PreRunCommand::MapLine { file, line })
        }
        "bp" => match parts.next() {
            Some("add") => Ok(PreRunCommand::BpAdd(parse_id(parts.next())?)),
            Some("addline") => {
                let (file, line) =
                    parse_file_line(parts.next().ok_or("usage: bp addline <file>:<line>")?)?;
                Ok(PreRunCommand::BpAddLine { file, line })
            }
            Some("rm") => Ok(PreRunCommand::BpRm(parse_id(parts.next())?)),
            Some("list") => Ok(PreRunCommand::BpList),
            _ => Err("usage: bp add|addline|rm|list".to_string()),
        },
        "run" => Ok(PreRunCommand::Run),
        "quit" => Ok(PreRunCommand::Quit),
        other => Err(format!("unknown command `{other}`")),
    }
}

pub fn parse_paused(line: &str) -> Result<PausedCommand, String> {
    let trimmed = line.trim();
    match trimmed {
        "c" => return Ok(PausedCommand::Continue),
        "i" => return Ok(PausedCommand::StepInto),
        "o" => return Ok(PausedCommand::StepOver),
        "u" => return Ok(PausedCommand::StepOut),
        "q" => return Ok(PausedCommand::Quit),
        _ => {}
    }
    if let Some(expr) = trimmed.strip_prefix("e ") {
        return Ok(PausedCommand::Eval(expr.to_string()));
    }
    if let Some(id) = trimmed.strip_prefix("b ") {
        return Ok(PausedCommand::AddBreakpoint(parse_id(Some(id.trim()))?));
    }
    Err(format!("unknown command `{trimmed}` (c/i/o/u/e <expr>/b <id>/q)"))
}

fn parse_id(raw: Option<&str>) -> Result<CheckpointId, String> {
    let raw = raw.ok_or("expected a checkpoint id")?;
    let raw: u32 = raw
        .parse()
        .map_err(|_| format!("`{raw}` is not a checkpoint id"))?;
    if raw == 0 {
        return Err("checkpoint ids start at 1".to_string());
    }
    Ok(CheckpointId::from_raw(raw))
}

fn parse_file_line(raw: &str) -> Result<(String, u32), String> {
    let (file, line) = raw
        .rsplit_once(':')
        .ok_or_else(|| format!("`{raw}` is not <file>:<line>"))?;
    let line: u32 = line
        .parse()
        .map_err(|_| format!("`{line}` is not a line number"))?;
    Ok((file.to_string(), line))
}

/// Runs the whole interactive session over the given input/output.
pub fn run_repl(
    session: &DebugSession,
    input: impl BufRead,
    out: &mut impl Write,
) -> anyhow::Result<()> {
    let mut lines = input.lines();

    loop {
        write!(out, "(waypoint) ")?;
        out.flush()?;
        let Some(line) = lines.next() else {
            return Ok(());
        };
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        match parse_pre_run(&line) {
            Err(message) => writeln!(out, "error: {message}")?,
            Ok(PreRunCommand::Map) => print_map(session, out)?,
            Ok(PreRunCommand::MapLine { file, line }) => {
                match session.index().resolve_line(&file, line) {
                    Some(id) => print_map_entry(session, id, out)?,
                    None => writeln!(out, "no checkpoint near {file}:{line}")?,
                }
            }
            Ok(PreRunCommand::BpAdd(id)) => {
                session.debugger.add_breakpoint(id);
                writeln!(out, "breakpoint set at {id}")?;
            }
            Ok(PreRunCommand::BpAddLine { file, line }) => {
                match session.index().resolve_line(&file, line) {
                    Some(id) => {
                        session.debugger.add_breakpoint(id);
                        writeln!(out, "breakpoint set at {id}")?;
                    }
                    None => writeln!(out, "no checkpoint near {file}:{line}")?,
                }
            }
            Ok(PreRunCommand::BpRm(id)) => {
                if session.debugger.remove_breakpoint(id) {
                    writeln!(out, "breakpoint {id} removed")?;
                } else {
                    writeln!(out, "no breakpoint at {id}")?;
                }
            }
            Ok(PreRunCommand::BpList) => {
                for id in session.debugger.breakpoints() {
                    print_map_entry(session, id, out)?;
                }
            }
            Ok(PreRunCommand::Run) => break,
            Ok(PreRunCommand::Quit) => return Ok(()),
        }
    }

    let handle = session.start()?;
    writeln!(out, "running {}", session.entry_name())?;

    loop {
        crossbeam_channel::select! {
            recv(session.events) -> event => {
                let Ok(event) = event else { break };
                print_pause(&event, out)?;
                if !paused_loop(session, &event, &mut lines, out)? {
                    return Ok(());
                }
            }
            recv(handle.done) -> outcome => {
                match outcome {
                    Ok(ScriptOutcome::Finished(value)) => {
                        writeln!(out, "script finished: {value}")?;
                    }
                    Ok(ScriptOutcome::Failed(message)) => {
                        writeln!(out, "script failed: {message}")?;
                    }
                    Err(_) => writeln!(out, "script thread vanished")?,
                }
                break;
            }
        }
    }
    handle.join();
    Ok(())
}

/// Reads paused-frame commands until one resumes the thread. Returns `false`
/// when the user quit.
fn paused_loop(
    session: &DebugSession,
    event: &PausedEvent,
    lines: &mut std::io::Lines<impl BufRead>,
    out: &mut impl Write,
) -> anyhow::Result<bool> {
    loop {
        write!(out, "[{}] ", event.pause_id)?;
        out.flush()?;
        let Some(line) = lines.next() else {
            // Input exhausted: let the script run to completion.
            session.debugger.resume_continue(event.pause_id);
            return Ok(false);
        };
        match parse_paused(&line?) {
            Err(message) => writeln!(out, "error: {message}")?,
            Ok(PausedCommand::Continue) => {
                session.debugger.resume_continue(event.pause_id);
                return Ok(true);
            }
            Ok(PausedCommand::StepInto) => {
                session.debugger.step_into(event.pause_id);
                return Ok(true);
            }
            Ok(PausedCommand::StepOver) => {
                session.debugger.step_over(event.pause_id);
                return Ok(true);
            }
            Ok(PausedCommand::StepOut) => {
                session.debugger.step_out(event.pause_id);
                return Ok(true);
            }
            Ok(PausedCommand::Eval(expression)) => {
                match session.evaluator.evaluate(&expression, &event.frame.locals) {
                    Ok(value) => writeln!(out, "= {value}")?,
                    Err(err) => writeln!(out, "error: {err}")?,
                }
            }
            Ok(PausedCommand::AddBreakpoint(id)) => {
                session.debugger.add_breakpoint(id);
                writeln!(out, "breakpoint set at {id}")?;
            }
            Ok(PausedCommand::Quit) => {
                session.debugger.resume_continue(event.pause_id);
                return Ok(false);
            }
        }
    }
}

fn print_map(session: &DebugSession, out: &mut impl Write) -> anyhow::Result<()> {
    for (method, ids) in session.index().methods() {
        writeln!(out, "{method}:")?;
        for id in ids {
            print_map_entry(session, *id, out)?;
        }
    }
    Ok(())
}

fn print_map_entry(
    session: &DebugSession,
    id: CheckpointId,
    out: &mut impl Write,
) -> anyhow::Result<()> {
    match session.index().location(id) {
        Some(location) => writeln!(
            out,
            "  {id}  {}:{}:{}",
            location.file, location.line, location.column
        )?,
        None => writeln!(out, "  {id}  <unknown>")?,
    }
    Ok(())
}

fn print_pause(event: &PausedEvent, out: &mut impl Write) -> anyhow::Result<()> {
    let checkpoint = event
        .frame
        .checkpoint_id
        .map_or_else(|| "-".to_string(), |id| id.to_string());
    writeln!(
        out,
        "paused [{}] at checkpoint {checkpoint} in {} (depth {})",
        event.thread, event.frame.method_name, event.frame.depth
    )?;
    for (name, value) in &event.frame.locals {
        writeln!(out, "  {name} = {value}")?;
    }
    if let Some(diagnostic) = &event.frame.diagnostic {
        writeln!(out, "  (locals unavailable: {diagnostic})")?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn parses_pre_run_commands() {
        assert_eq!(parse_pre_run("map"), Ok(PreRunCommand::Map));
        assert_eq!(
            parse_pre_run("mapline scripts/main.wp:12"),
            Ok(PreRunCommand::MapLine {
                file: "scripts/main.wp".to_string(),
                line: 12
            })
        );
        assert_eq!(
            parse_pre_run("bp add 3"),
            Ok(PreRunCommand::BpAdd(CheckpointId::from_raw(3)))
        );
        assert_eq!(parse_pre_run("bp list"), Ok(PreRunCommand::BpList));
        assert_eq!(parse_pre_run("run"), Ok(PreRunCommand::Run));
        assert!(parse_pre_run("bogus").is_err());
        assert!(parse_pre_run("bp add zero").is_err());
        assert!(parse_pre_run("bp add 0").is_err());
    }

    #[test]
    fn parses_paused_commands() {
        assert_eq!(parse_paused("c"), Ok(PausedCommand::Continue));
        assert_eq!(parse_paused("o"), Ok(PausedCommand::StepOver));
        assert_eq!(
            parse_paused("e acc + 1"),
            Ok(PausedCommand::Eval("acc + 1".to_string()))
        );
        assert_eq!(
            parse_paused("b 7"),
            Ok(PausedCommand::AddBreakpoint(CheckpointId::from_raw(7)))
        );
        assert!(parse_paused("x").is_err());
    }

    #[test]
    fn file_line_splits_on_the_last_colon() {
        assert_eq!(
            parse_file_line("C:/scripts/main.wp:9"),
            Ok(("C:/scripts/main.wp".to_string(), 9))
        );
        assert!(parse_file_line("main.wp").is_err());
    }
}
