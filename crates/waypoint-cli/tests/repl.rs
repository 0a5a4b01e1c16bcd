//! Scripted REPL sessions: commands come from a cursor, output goes to a
//! buffer, and the debugger runs the real pipeline underneath.

use std::io::Cursor;
use std::sync::Mutex;

use waypoint_cli::{repl, DebugSession};
use waypoint_core::DebuggerConfig;

static TEST_LOCK: Mutex<()> = Mutex::new(());

fn test_lock() -> std::sync::MutexGuard<'static, ()> {
    TEST_LOCK.lock().unwrap_or_else(|err| err.into_inner())
}

const SCRIPT: &str = "\
namespace demo {
    type Main {
        fn run() -> int {
            let a = 1;
            let b = a + 10;
            return a + b;
        }
    }
}
";

fn run_session(input: &str) -> String {
    let session =
        DebugSession::prepare("demo.wp", SCRIPT, None, &DebuggerConfig::default()).unwrap();
    let mut out = Vec::new();
    repl::run_repl(&session, Cursor::new(input.to_string()), &mut out).unwrap();
    String::from_utf8(out).unwrap()
}

#[test]
fn full_session_with_breakpoint_eval_and_continue() {
    let _guard = test_lock();
    let output = run_session("map\nbp add 2\nrun\ne a + 100\nc\n");

    assert!(output.contains("demo.Main.run:"), "output: {output}");
    assert!(output.contains("breakpoint set at 2"));
    assert!(output.contains("paused"));
    assert!(output.contains("a = 1"));
    assert!(output.contains("= 101"));
    assert!(output.contains("script finished: 12"));
}

#[test]
fn mapline_resolves_to_the_nearest_checkpoint() {
    let _guard = test_lock();
    let output = run_session("mapline demo.wp:5\nbp addline demo.wp:99\nquit\n");
    // Line 5 is the second statement; line 99 clamps to the nearest (last).
    assert!(output.contains("2  demo.wp:5:13"), "output: {output}");
    assert!(output.contains("breakpoint set at 3"));
}

#[test]
fn stepping_commands_walk_the_method() {
    let _guard = test_lock();
    let output = run_session("bp add 1\nrun\no\no\nc\n");
    assert!(output.contains("at checkpoint 1"), "output: {output}");
    assert!(output.contains("at checkpoint 2"));
    assert!(output.contains("at checkpoint 3"));
    assert!(output.contains("script finished: 12"));
}

#[test]
fn quit_before_running_executes_nothing() {
    let _guard = test_lock();
    let output = run_session("quit\n");
    assert!(!output.contains("running"));
    assert!(!output.contains("script finished"));
}

#[test]
fn unknown_commands_report_errors_and_keep_the_prompt() {
    let _guard = test_lock();
    let output = run_session("frobnicate\nquit\n");
    assert!(output.contains("unknown command `frobnicate`"));
}
