//! End-to-end scenarios through the full pipeline: rewriter, compiler,
//! isolate, engine, and evaluator, driven the way the REPL drives them.
//!
//! Binding the debug host is process-wide, so every test that starts a
//! script serializes on `test_lock`.

use std::sync::Mutex;
use std::time::Duration;

use waypoint_cli::{DebugSession, ScriptOutcome};
use waypoint_core::{CheckpointId, DebuggerConfig, Value};
use waypoint_engine::PausedEvent;
use waypoint_eval::EvalError;

static TEST_LOCK: Mutex<()> = Mutex::new(());

fn test_lock() -> std::sync::MutexGuard<'static, ()> {
    TEST_LOCK.lock().unwrap_or_else(|err| err.into_inner())
}

const SCRIPT: &str = "\
namespace demo {
    type Main {
        fn run() -> int {
            let a = 1;
            let b = helper(a);
            return a + b;
        }
        fn helper(x: int) -> int {
            let doubled = x * 2;
            return doubled + 1;
        }
    }
}
";

fn id(raw: u32) -> CheckpointId {
    CheckpointId::from_raw(raw)
}

fn prepare() -> DebugSession {
    DebugSession::prepare("demo.wp", SCRIPT, None, &DebuggerConfig::default()).unwrap()
}

fn next_pause(session: &DebugSession) -> PausedEvent {
    session
        .events
        .recv_timeout(Duration::from_secs(5))
        .expect("expected a pause event")
}

fn finish(session: &DebugSession, handle: waypoint_cli::session::ScriptHandle) -> ScriptOutcome {
    let outcome = handle
        .done
        .recv_timeout(Duration::from_secs(5))
        .expect("script must finish");
    handle.join();
    // No further pauses may be pending once the script is done.
    assert!(session.events.try_recv().is_err());
    outcome
}

#[test]
fn checkpoint_map_matches_the_source() {
    let _guard = test_lock();
    let session = prepare();
    let index = session.index();

    assert_eq!(
        index.method_checkpoints("demo.Main.run").unwrap(),
        &[id(1), id(2), id(3)]
    );
    assert_eq!(
        index.method_checkpoints("demo.Main.helper").unwrap(),
        &[id(4), id(5)]
    );
    let lines: Vec<u32> = (1..=5)
        .map(|raw| index.location(id(raw)).unwrap().line)
        .collect();
    assert_eq!(lines, vec![4, 5, 6, 9, 10]);
    assert_eq!(index.resolve_line("demo.wp", 5), Some(id(2)));
}

#[test]
fn breakpoint_hit_exposes_the_paused_frame() {
    let _guard = test_lock();
    let session = prepare();
    session.debugger.add_breakpoint(id(2));

    let handle = session.start().unwrap();
    let pause = next_pause(&session);
    assert_eq!(pause.frame.checkpoint_id, Some(id(2)));
    assert_eq!(pause.frame.method_name, "demo.Main.run");
    assert_eq!(pause.frame.locals, vec![("a".to_string(), Value::Int(1))]);

    session.debugger.resume_continue(pause.pause_id);
    let outcome = finish(&session, handle);
    assert!(matches!(outcome, ScriptOutcome::Finished(Value::Int(4))));
}

#[test]
fn step_over_stays_in_the_method_and_sees_updated_locals() {
    let _guard = test_lock();
    let session = prepare();
    session.debugger.add_breakpoint(id(2));

    let handle = session.start().unwrap();
    let first = next_pause(&session);
    session.debugger.step_over(first.pause_id);

    let second = next_pause(&session);
    // `helper` ran to completion without pausing at checkpoints 4 or 5.
    assert_eq!(second.frame.checkpoint_id, Some(id(3)));
    assert_eq!(second.frame.depth, 1);
    assert_eq!(
        second.frame.locals,
        vec![
            ("a".to_string(), Value::Int(1)),
            ("b".to_string(), Value::Int(3)),
        ]
    );

    session.debugger.resume_continue(second.pause_id);
    finish(&session, handle);
}

#[test]
fn step_into_and_step_out_cross_the_call_boundary() {
    let _guard = test_lock();
    let session = prepare();
    session.debugger.add_breakpoint(id(2));

    let handle = session.start().unwrap();
    let at_call = next_pause(&session);
    session.debugger.step_into(at_call.pause_id);

    let inside = next_pause(&session);
    assert_eq!(inside.frame.checkpoint_id, Some(id(4)));
    assert_eq!(inside.frame.method_name, "demo.Main.helper");
    assert_eq!(inside.frame.depth, 2);
    assert_eq!(inside.frame.locals, vec![("x".to_string(), Value::Int(1))]);

    session.debugger.step_out(inside.pause_id);
    let back = next_pause(&session);
    assert_eq!(back.frame.checkpoint_id, Some(id(3)));
    assert_eq!(back.frame.depth, 1);

    session.debugger.resume_continue(back.pause_id);
    finish(&session, handle);
}

#[test]
fn parameters_precede_locals_in_the_captured_frame() {
    let _guard = test_lock();
    let session = prepare();
    session.debugger.add_breakpoint(id(5));

    let handle = session.start().unwrap();
    let pause = next_pause(&session);
    let names: Vec<&str> = pause
        .frame
        .locals
        .iter()
        .map(|(name, _)| name.as_str())
        .collect();
    assert_eq!(names, vec!["x", "doubled"]);

    session.debugger.resume_continue(pause.pause_id);
    finish(&session, handle);
}

#[test]
fn expressions_evaluate_against_the_paused_frame() {
    let _guard = test_lock();
    let session = prepare();
    session.debugger.add_breakpoint(id(3));

    let handle = session.start().unwrap();
    let pause = next_pause(&session);

    assert_eq!(
        session
            .evaluator
            .evaluate("a + b", &pause.frame.locals)
            .unwrap(),
        Value::Int(4)
    );
    assert_eq!(
        session
            .evaluator
            .evaluate("b > a && a == 1", &pause.frame.locals)
            .unwrap(),
        Value::Bool(true)
    );

    session.debugger.resume_continue(pause.pause_id);
    finish(&session, handle);
}

#[test]
fn expression_faults_leave_the_paused_thread_resumable() {
    let _guard = test_lock();
    let session = prepare();
    session.debugger.add_breakpoint(id(3));

    let handle = session.start().unwrap();
    let pause = next_pause(&session);

    let err = session
        .evaluator
        .evaluate("1 / 0", &pause.frame.locals)
        .unwrap_err();
    let EvalError::Runtime(message) = err else {
        panic!("expected a runtime error");
    };
    assert!(message.contains("DivideByZero"), "message: {message}");

    // The paused thread is unaffected and continues normally.
    session.debugger.resume_continue(pause.pause_id);
    let outcome = finish(&session, handle);
    assert!(matches!(outcome, ScriptOutcome::Finished(Value::Int(4))));
}

#[test]
fn script_runtime_failures_terminate_the_script_thread() {
    let _guard = test_lock();
    let source = "namespace demo { type Main {
        fn run() -> int { return 1 / 0; }
    } }";
    let session =
        DebugSession::prepare("boom.wp", source, None, &DebuggerConfig::default()).unwrap();
    let handle = session.start().unwrap();
    let outcome = finish(&session, handle);
    let ScriptOutcome::Failed(message) = outcome else {
        panic!("expected failure");
    };
    assert!(message.contains("DivideByZero"));
}
