//! Tests for the error taxonomy, stack traces and configuration

mod common;

use common::*;
use pretty_assertions::assert_eq;

use quickbeam::{EvalContext, EvalError, Evaluator, Ports, Reason, Value};

// ═══════════════════════════════════════════════════════════════════════
// Taxonomy
// ═══════════════════════════════════════════════════════════════════════

#[test]
fn test_parse_error_has_location() {
    match run("put [a").err() {
        EvalError::Parse(e) => {
            let loc = e.location.as_ref().unwrap();
            assert_eq!(loc.line, 1);
        }
        other => panic!("expected parse error, got {}", other),
    }
}

#[test]
fn test_compile_error_has_location() {
    match run("put a\nput $nope").err() {
        EvalError::Compile(e) => {
            assert_eq!(e.message, "variable $nope not found");
            assert_eq!(e.location.as_ref().unwrap().line, 2);
        }
        other => panic!("expected compile error, got {}", other),
    }
}

#[test]
fn test_compile_error_runs_nothing() {
    let r = run("put before; put $nope");
    assert!(r.values.is_empty());
    assert!(matches!(r.err(), EvalError::Compile(_)));
}

#[test]
fn test_fail_payload_can_be_any_value() {
    let r = run("fail [a b]");
    match r.reason() {
        Reason::Fail(Value::List(items)) => assert_eq!(items.len(), 2),
        other => panic!("unexpected reason {:?}", other),
    }
}

#[test]
fn test_calling_non_callable() {
    let r = run("var x = foo; $x");
    assert!(matches!(
        r.reason(),
        Reason::BadValue { valid, actual, .. } if valid == "callable" && actual == "string"
    ));
}

#[test]
fn test_error_messages() {
    assert_eq!(run("fail oops").err().to_string(), "oops");
    assert_eq!(
        run("call { } [] [&[]=x]").err().to_string(),
        "bad value: option key must be string, but is list"
    );
}

// ═══════════════════════════════════════════════════════════════════════
// Stack traces
// ═══════════════════════════════════════════════════════════════════════

#[test]
fn test_stack_records_call_sites_innermost_first() {
    let r = run("fn inner { fail deep }\nfn outer { inner }\nouter");
    let exc = r.err().exception().unwrap();
    let texts: Vec<&str> = exc.stack().iter().map(|site| site.text()).collect();
    assert_eq!(texts, vec!["fail deep", "inner", "outer"]);
    assert_eq!(exc.stack()[2].location().line, 3);
}

#[test]
fn test_traceback_mentions_every_site() {
    let r = run("fn f { fail x }; f");
    let traceback = r.err().exception().unwrap().traceback();
    assert!(traceback.contains("fail x"));
    assert!(traceback.contains("[test 0]:1:"));
}

// ═══════════════════════════════════════════════════════════════════════
// Configuration
// ═══════════════════════════════════════════════════════════════════════

#[test]
fn test_context_from_json() {
    let ctx: EvalContext = serde_json::from_str(
        r#"{"max_call_depth": 8, "lib_dirs": ["/opt/qb"], "value_buffer": 4}"#,
    )
    .unwrap();
    assert_eq!(ctx.max_call_depth, 8);
    assert_eq!(ctx.lib_dirs, vec![std::path::PathBuf::from("/opt/qb")]);
    assert_eq!(ctx.value_buffer, 4);

    let ev = Evaluator::new(ctx);
    let r = run_in(&ev, &["fn f { f }; f"]);
    assert!(matches!(r.reason(), Reason::StackOverflow(8)));
}

#[test]
fn test_context_defaults_from_empty_json() {
    let ctx: EvalContext = serde_json::from_str("{}").unwrap();
    let default = EvalContext::default();
    assert_eq!(ctx.max_call_depth, default.max_call_depth);
    assert_eq!(ctx.value_buffer, default.value_buffer);
    assert!(ctx.lib_dirs.is_empty());
}

#[test]
fn test_context_round_trips_through_json() {
    let ctx = EvalContext::with_max_call_depth(3).lib_dir("/lib");
    let json = serde_json::to_string(&ctx).unwrap();
    let back: EvalContext = serde_json::from_str(&json).unwrap();
    assert_eq!(back.max_call_depth, 3);
    assert_eq!(back.lib_dirs, ctx.lib_dirs);
}

#[test]
fn test_interrupt_stops_evaluation() {
    let ev = evaluator();
    ev.interrupt();
    let err = ev.eval_source("[t]", "put a", Ports::discard()).unwrap_err();
    assert!(matches!(err.reason(), Some(Reason::Interrupted)));

    ev.context().reset_interrupt();
    ev.eval_source("[t]", "put a", Ports::discard()).unwrap();
}
