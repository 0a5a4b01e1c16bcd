use std::io::Write;
use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use tracing_subscriber::EnvFilter;
use waypoint_core::DebuggerConfig;

/// Source-level debugger for Waypoint scripts.
///
/// Instruments the script, runs it under the debugger engine, and exposes an
/// interactive prompt with breakpoints, stepping, and expression evaluation
/// against the paused frame's locals.
#[derive(Debug, Parser)]
#[command(name = "waypoint", version, about)]
struct Cli {
    /// Script to debug.
    script: PathBuf,

    /// Entrypoint to run, e.g. `demo.Main.run`. Defaults to a zero-argument
    /// `main`/`run` method.
    #[arg(long)]
    entry: Option<String>,

    /// Expression-evaluator cache capacity.
    #[arg(long, default_value_t = 64)]
    cache_capacity: usize,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config = DebuggerConfig {
        eval_cache_capacity: cli.cache_capacity,
        ..DebuggerConfig::default()
    };
    let filter = EnvFilter::try_from_env("WAYPOINT_LOG")
        .unwrap_or_else(|_| EnvFilter::new(config.log_filter.clone()));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let source = std::fs::read_to_string(&cli.script)
        .with_context(|| format!("failed to read {}", cli.script.display()))?;
    let file = cli.script.to_string_lossy().into_owned();

    let session =
        waypoint_cli::DebugSession::prepare(&file, &source, cli.entry.as_deref(), &config)?;

    let stdin = std::io::stdin();
    let mut stdout = std::io::stdout();
    waypoint_cli::repl::run_repl(&session, stdin.lock(), &mut stdout)?;
    stdout.flush()?;
    Ok(())
}
