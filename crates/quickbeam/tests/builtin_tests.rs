//! Tests for the runtime builtins: eval, call, resolve, use-mod, sleep,
//! time and deprecate

mod common;

use common::*;
use parking_lot::Mutex;
use pretty_assertions::assert_eq;
use std::fs;
use std::sync::Arc;
use std::time::Duration;

use quickbeam::{EvalContext, EvalError, Evaluator, Ports, Reason, Timer, Value};

// ═══════════════════════════════════════════════════════════════════════
// eval
// ═══════════════════════════════════════════════════════════════════════

#[test]
fn test_eval_puts() {
    assert_eq!(puts("eval 'put x'"), vec!["x"]);
}

#[test]
fn test_eval_reads_local_variable() {
    assert_eq!(puts("var x = foo; eval 'put $x'"), vec!["foo"]);
}

#[test]
fn test_eval_sets_local_variable() {
    assert_eq!(puts("var x = foo; eval 'set x = bar'; put $x"), vec!["bar"]);
}

#[test]
fn test_eval_reads_upvalue() {
    assert_eq!(puts("var x = foo; { nop $x; eval 'put $x' }"), vec!["foo"]);
}

#[test]
fn test_eval_in_given_namespace() {
    assert_eq!(
        puts("var n = (ns [&x=foo]); eval 'put $x' &ns=$n"),
        vec!["foo"]
    );
    assert_eq!(
        puts("var n = (ns [&x=foo]); eval 'set x = bar' &ns=$n; put $n[x]"),
        vec!["bar"]
    );
}

#[test]
fn test_eval_declarations_do_not_leak() {
    let ev = evaluator();
    run_in(&ev, &["eval 'var x = foo'"]).ok();
    assert!(!ev.global().contains("x"));

    let r = run_in(&ev, &["put $x"]);
    assert!(matches!(r.err(), EvalError::Compile(_)));
}

#[test]
fn test_eval_declarations_land_in_given_namespace() {
    assert_eq!(
        puts("var n = (ns [&]); eval &ns=$n 'var x = foo'; put $n[x]"),
        vec!["foo"]
    );
}

#[test]
fn test_eval_on_end_sees_final_namespace() {
    assert_eq!(
        puts("eval &on-end={|n| put $n[x] } 'var x = foo'"),
        vec!["foo"]
    );
}

#[test]
fn test_eval_error_kinds() {
    assert!(matches!(run("eval '['").err(), EvalError::Parse(_)));
    assert!(matches!(run("eval 'put $x'").err(), EvalError::Compile(_)));
    assert!(run("eval 'fail x'").err().is_fail("x"));
}

#[test]
fn test_eval_on_end_runs_after_failure() {
    let r = run("eval &on-end={|n| put ended } 'fail body'");
    assert_eq!(r.strings(), vec!["ended"]);
    assert!(r.err().is_fail("body"));
}

#[test]
fn test_eval_dual_failure_keeps_both() {
    let r = run("eval &on-end={|n| fail end } 'fail body'");
    match r.reason() {
        Reason::WithCallback { body, callback } => {
            assert!(body.is_fail("body"));
            assert!(callback.is_fail("end"));
        }
        other => panic!("unexpected reason {:?}", other),
    }
}

#[test]
fn test_eval_bad_namespace() {
    let r = run("eval &ns=foo 'put x'");
    assert!(matches!(r.reason(), Reason::BadValue { what, .. } if what == "&ns"));
}

// ═══════════════════════════════════════════════════════════════════════
// call
// ═══════════════════════════════════════════════════════════════════════

#[test]
fn test_call_binds_arguments_and_options() {
    assert_eq!(
        puts("call {|arg &opt=v| put $arg $opt } [foo] [&opt=bar]"),
        vec!["foo", "bar"]
    );
}

#[test]
fn test_call_uses_option_default() {
    assert_eq!(
        puts("call {|arg &opt=v| put $arg $opt } [foo] [&]"),
        vec!["foo", "v"]
    );
}

#[test]
fn test_call_rejects_non_string_option_key() {
    let r = run("call { } [foo] [&[]=bar]");
    match r.reason() {
        Reason::BadValue {
            what,
            valid,
            actual,
        } => {
            assert_eq!(what, "option key");
            assert_eq!(valid, "string");
            assert_eq!(actual, "list");
        }
        other => panic!("unexpected reason {:?}", other),
    }
}

#[test]
fn test_call_unknown_option_is_the_callee_policy() {
    let r = run("call {|a| } [x] [&nope=1]");
    assert!(matches!(r.reason(), Reason::UnsupportedOption(name) if name == "nope"));
    assert_eq!(
        puts("call {|a &@rest| put $rest[nope] } [x] [&nope=1]"),
        vec!["1"]
    );
}

#[test]
fn test_call_builtin() {
    assert_eq!(puts("call $put~ [a b] [&]"), vec!["a", "b"]);
}

// ═══════════════════════════════════════════════════════════════════════
// resolve
// ═══════════════════════════════════════════════════════════════════════

fn resolve_evaluator(dir: &tempfile::TempDir) -> Evaluator {
    fs::write(dir.path().join("mod.qb"), "fn func { }").unwrap();
    Evaluator::new(EvalContext::new().lib_dir(dir.path()))
}

#[test]
fn test_resolve_tiers() {
    let dir = tempfile::tempdir().unwrap();
    let ev = resolve_evaluator(&dir);
    let cases = [
        ("resolve for", "special"),
        ("resolve put", "$put~"),
        ("fn f { }; resolve f", "$f~"),
        ("use mod; resolve mod:func", "$mod:func~"),
        ("resolve cat", "(external cat)"),
        ("resolve external", "$external~"),
    ];
    for (code, expected) in cases {
        let r = run_in(&ev, &[code]).ok();
        assert_eq!(r.strings(), vec![expected], "{}", code);
    }
}

#[test]
fn test_resolve_special_beats_function() {
    assert_eq!(puts("fn for { }; resolve for"), vec!["special"]);
}

#[test]
fn test_resolve_function_shadows_external() {
    assert_eq!(puts("fn cat { }; resolve cat"), vec!["$cat~"]);
    assert_eq!(puts("resolve e:cat"), vec!["(external cat)"]);
}

#[test]
fn test_resolve_agrees_with_compiler_on_unbound_namespace() {
    assert!(matches!(run("nope:f").err(), EvalError::Compile(_)));
    let r = run("resolve nope:f");
    assert!(matches!(r.reason(), Reason::NoSuchVariable(v) if v == "nope:f~"));
}

#[test]
fn test_resolve_rejects_non_callable_function_variable() {
    let r = run("var f~ = text; resolve f");
    assert!(matches!(
        r.reason(),
        Reason::BadValue { valid, actual, .. } if valid == "callable" && actual == "string"
    ));
}

// ═══════════════════════════════════════════════════════════════════════
// use-mod
// ═══════════════════════════════════════════════════════════════════════

#[test]
fn test_use_mod_returns_namespace() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(dir.path().join("mod.qb"), "var x = value").unwrap();
    let code = format!("put (use-mod {}/mod)[x]", dir.path().display());
    assert_eq!(puts(&code), vec!["value"]);
}

#[test]
fn test_use_mod_relative_to_script() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(dir.path().join("mod.qb"), "var x = value").unwrap();
    let script = dir.path().join("main.qb");
    fs::write(&script, "var got = (use-mod ./mod)[x]").unwrap();

    let ev = evaluator();
    ev.eval_file(&script, Ports::discard()).unwrap();
    assert_eq!(ev.global().get("got"), Some(Value::from("value")));
}

#[test]
fn test_use_mod_caches_by_path() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(dir.path().join("mod.qb"), "echo loaded 1>&2; var x = old").unwrap();
    let p = dir.path().display();
    let code = format!(
        "var a = (use-mod {p}/mod); var b = (use-mod {p}/./mod); set a[x] = new; put $b[x]"
    );
    let r = run(&code).ok();
    assert_eq!(r.strings(), vec!["new"]);
    assert_eq!(r.stderr.matches("loaded").count(), 1);
}

#[test]
fn test_use_mod_different_specs_are_independent() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(dir.path().join("m1.qb"), "var x = one").unwrap();
    fs::write(dir.path().join("m2.qb"), "var x = two").unwrap();
    let p = dir.path().display();
    let code = format!(
        "var a = (use-mod {p}/m1); var b = (use-mod {p}/m2); set a[x] = changed; put $b[x]"
    );
    assert_eq!(puts(&code), vec!["two"]);
}

#[test]
fn test_use_mod_cannot_see_caller() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(dir.path().join("mod.qb"), "put $secret").unwrap();
    let code = format!("var secret = x; use-mod {}/mod", dir.path().display());
    assert!(matches!(run(&code).err(), EvalError::Compile(_)));
}

#[test]
fn test_use_mod_missing() {
    let r = run("use-mod ./no-such-module-here");
    assert!(matches!(r.reason(), Reason::NoSuchModule(_)));
}

#[test]
fn test_use_mod_failure_is_not_cached() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("flaky.qb");
    fs::write(&path, "fail broken").unwrap();
    let ev = evaluator();
    let code = format!("put (use-mod {}/flaky)[x]", dir.path().display());
    assert!(run_in(&ev, &[&code]).err().is_fail("broken"));

    fs::write(&path, "var x = fixed").unwrap();
    assert_eq!(run_in(&ev, &[&code]).ok().strings(), vec!["fixed"]);
}

fn is_module_cycle(err: &EvalError) -> bool {
    match err.reason() {
        Some(Reason::ModuleCycle(_)) => true,
        Some(Reason::Pipeline(errs)) => !errs.is_empty() && errs.iter().all(is_module_cycle),
        _ => false,
    }
}

#[test]
fn test_use_mod_self_cycle() {
    let dir = tempfile::tempdir().unwrap();
    let p = dir.path().display();
    fs::write(dir.path().join("a.qb"), format!("var b = (use-mod {p}/b)")).unwrap();
    fs::write(dir.path().join("b.qb"), format!("var a = (use-mod {p}/a)")).unwrap();
    let r = run(&format!("use-mod {p}/a"));
    assert!(is_module_cycle(r.err()), "{}", r.err());
}

#[test]
fn test_use_mod_concurrent_loads_evaluate_once() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(
        dir.path().join("m.qb"),
        "sleep 0.1; echo loaded 1>&2; var x = shared",
    )
    .unwrap();
    let p = dir.path().display();
    let code = format!("use-mod {p}/m | use-mod {p}/m | put (all)[x]");
    let r = run(&code).ok();
    assert_eq!(r.strings(), vec!["shared"]);
    assert_eq!(r.stderr.matches("loaded").count(), 1);
}

#[test]
fn test_use_mod_cycle_across_stages() {
    let dir = tempfile::tempdir().unwrap();
    let p = dir.path().display().to_string();
    fs::write(
        dir.path().join("a.qb"),
        format!("sleep 0.2; var b = (use-mod {p}/b)"),
    )
    .unwrap();
    fs::write(
        dir.path().join("b.qb"),
        format!("sleep 0.2; var a = (use-mod {p}/a)"),
    )
    .unwrap();

    let (tx, rx) = crossbeam::channel::bounded(1);
    let code = format!("use-mod {p}/a | use-mod {p}/b | nop (all)");
    std::thread::spawn(move || {
        let _ = tx.send(run(&code).result);
    });
    let result = rx
        .recv_timeout(Duration::from_secs(10))
        .expect("loads blocked on each other");
    let err = result.unwrap_err();
    assert!(is_module_cycle(&err), "{}", err);
}

#[test]
fn test_native_module() {
    let ev = evaluator();
    let ns = quickbeam::Namespace::new();
    ns.add("x", Value::from("native"));
    ev.register_module("host", ns);
    let r = run_in(&ev, &["use host; put $host:x"]).ok();
    assert_eq!(r.strings(), vec!["native"]);
}

// ═══════════════════════════════════════════════════════════════════════
// sleep
// ═══════════════════════════════════════════════════════════════════════

/// An evaluator whose timer records requested durations and fires at once.
fn recording_evaluator() -> (Evaluator, Arc<Mutex<Vec<Duration>>>) {
    let recorded = Arc::new(Mutex::new(Vec::new()));
    let sink = recorded.clone();
    let timer = Timer::new(move |d| {
        sink.lock().push(d);
        crossbeam::channel::after(Duration::ZERO)
    });
    (Evaluator::new(EvalContext::new().timer(timer)), recorded)
}

fn slept(code: &str) -> Duration {
    let (ev, recorded) = recording_evaluator();
    run_in(&ev, &[code]).ok();
    let recorded = recorded.lock();
    assert_eq!(recorded.len(), 1, "{}", code);
    recorded[0]
}

#[test]
fn test_sleep_durations() {
    let cases = [
        ("sleep 0", Duration::ZERO),
        ("sleep 1", Duration::from_secs(1)),
        ("sleep 1.3s", Duration::from_millis(1300)),
        ("sleep 0.1", Duration::from_millis(100)),
        ("sleep 0.1ms", Duration::from_micros(100)),
        ("sleep 3h5m7s", Duration::from_secs(3 * 3600 + 5 * 60 + 7)),
        ("sleep 1/2", Duration::from_millis(500)),
        ("sleep (num 42)", Duration::from_secs(42)),
        ("sleep (float64 0)", Duration::ZERO),
        ("sleep (float64 1.7)", Duration::from_millis(1700)),
    ];
    for (code, expected) in cases {
        assert_eq!(slept(code), expected, "{}", code);
    }
}

#[test]
fn test_sleep_invalid() {
    for code in ["sleep 1x", "sleep [1]"] {
        let (ev, recorded) = recording_evaluator();
        let r = run_in(&ev, &[code]);
        assert!(matches!(r.reason(), Reason::InvalidSleepDuration), "{}", code);
        assert!(recorded.lock().is_empty());
    }
}

#[test]
fn test_sleep_negative() {
    for code in ["sleep -7", "sleep -3h", "sleep (float64 -7)"] {
        let r = run(code);
        assert!(matches!(r.reason(), Reason::NegativeSleepDuration), "{}", code);
    }
}

#[test]
fn test_sleep_error_points_at_form() {
    let r = run("sleep 1x");
    let stack = r.err().exception().unwrap().stack();
    assert_eq!(stack[0].text(), "sleep 1x");
}

#[test]
fn test_sleep_is_interrupted() {
    let ev = evaluator();
    let worker = ev.clone();
    let handle =
        std::thread::spawn(move || worker.eval_source("[sleep]", "sleep 1h", Ports::discard()));
    std::thread::sleep(Duration::from_millis(50));
    ev.interrupt();
    let result = handle.join().unwrap();
    assert!(matches!(
        result.unwrap_err().reason(),
        Some(Reason::Interrupted)
    ));
}

#[test]
fn test_sleep_does_not_block_other_stage() {
    let (ev, _) = recording_evaluator();
    let r = run_in(&ev, &["sleep 1 | put other"]).ok();
    assert_eq!(r.strings(), vec!["other"]);
}

// ═══════════════════════════════════════════════════════════════════════
// time
// ═══════════════════════════════════════════════════════════════════════

#[test]
fn test_time_without_on_end_writes_nothing() {
    let ev = evaluator();
    let r = run_in(&ev, &["time { echo foo } | var a = (all)", "put $a"]).ok();
    assert_eq!(r.strings(), vec!["foo"]);
    assert_eq!(r.stdout, "");
}

#[test]
fn test_time_on_end_receives_number() {
    let ev = evaluator();
    let r = run_in(
        &ev,
        &[
            "var duration = ''",
            "time &on-end={|x| set duration = $x } { echo foo } | var out = (all)",
            "put $out",
            "kind-of $duration",
        ],
    )
    .ok();
    assert_eq!(r.strings(), vec!["foo", "number"]);
}

#[test]
fn test_time_body_failure() {
    assert!(run("time { fail body } | nop (all)").err().is_fail("body"));
}

#[test]
fn test_time_on_end_failure() {
    assert!(run("time &on-end={|_| fail on-end } { }").err().is_fail("on-end"));
}

#[test]
fn test_time_return_in_body_is_not_a_failure() {
    let r = run("fn f { time &on-end={|_| put ended } { return }; put after }; f").ok();
    assert_eq!(r.strings(), vec!["ended"]);

    let r = run("fn f { time &on-end={|_| fail on-end } { return } }; f");
    assert!(r.err().is_fail("on-end"));
}

#[test]
fn test_time_dual_failure_keeps_both() {
    let r = run("time &on-end={|_| fail on-end } { fail body }");
    match r.reason() {
        Reason::WithCallback { body, callback } => {
            assert!(body.is_fail("body"));
            assert!(callback.is_fail("on-end"));
        }
        other => panic!("unexpected reason {:?}", other),
    }
}

// ═══════════════════════════════════════════════════════════════════════
// deprecate
// ═══════════════════════════════════════════════════════════════════════

fn warnings(stderr: &str) -> usize {
    stderr.matches("deprecation: msg").count()
}

#[test]
fn test_deprecate_writes_to_stderr() {
    let r = run("deprecate msg").ok();
    assert!(r.stderr.contains("msg"));
    assert!(r.values.is_empty());
}

#[test]
fn test_deprecate_same_site_warns_once() {
    let r = run("fn f { deprecate msg }; f; f").ok();
    assert_eq!(warnings(&r.stderr), 1);

    let r = run("for x [a b c] { deprecate msg }").ok();
    assert_eq!(warnings(&r.stderr), 1);
}

#[test]
fn test_deprecate_distinct_sites_warn_independently() {
    let r = run("deprecate msg; deprecate msg").ok();
    assert_eq!(warnings(&r.stderr), 2);
}

#[test]
fn test_deprecate_registry_is_per_evaluator() {
    let code = "fn f { deprecate msg }";
    let ev = evaluator();
    let r = run_in(&ev, &[code, "f", "f"]).ok();
    assert_eq!(warnings(&r.stderr), 1);

    let other = evaluator();
    let r = run_in(&other, &[code, "f"]).ok();
    assert_eq!(warnings(&r.stderr), 1);
}

// ═══════════════════════════════════════════════════════════════════════
// Basic commands
// ═══════════════════════════════════════════════════════════════════════

#[test]
fn test_kind_of() {
    assert_eq!(puts("kind-of a []"), vec!["string", "list"]);
    assert_eq!(
        puts("kind-of [&] (num 1) $nil $true { } (ns [&])"),
        vec!["map", "number", "nil", "bool", "fn", "ns"]
    );
}

#[test]
fn test_constantly() {
    assert_eq!(
        puts("var f = (constantly foo); $f; $f"),
        vec!["foo", "foo"]
    );
}

#[test]
fn test_echo_and_print() {
    let r = run("echo a b; print c d; echo &sep=, e f").ok();
    assert_eq!(r.stdout, "a b\nc de,f\n");
}

#[test]
fn test_external_commands_are_not_run() {
    let r = run("definitely-not-a-builtin arg");
    assert!(matches!(r.reason(), Reason::ExternalCommand(name) if name == "definitely-not-a-builtin"));
    let r = run("(external cat)");
    assert!(matches!(r.reason(), Reason::ExternalCommand(name) if name == "cat"));
}
