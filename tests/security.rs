/*
 * ==========================================================================
 * SANDPAW - Safe Claws for Untrusted Code!
 * ==========================================================================
 *
 * Author:   Sam Wilcox
 * Email:    sam@pawx-lang.com
 * Website:  https://www.pawx-lang.com
 * Github:   https://github.com/samwilcox/sandpaw
 *
 * License:
 * This file is part of the SANDPAW sandboxed interpreter project.
 *
 * SANDPAW is dual-licensed under the terms of:
 *   - The MIT license
 *   - The Apache License, Version 2.0
 *
 * You may choose either license to govern your use of this software.
 * Full license text available at:
 *    https://license.pawx-lang.com
 *
 * Unless required by applicable law or agreed to in writing, software
 * distributed under these licenses is distributed on an "AS IS" BASIS,
 * WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
 *
 * ==========================================================================
 */

//! The security boundary as one surface: dangerous names, forbidden
//! globals, the read-only proxy, host-error disclosure and the
//! resource limits.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use sandpaw::{
    ErrorKind, EvalOptions, HostFunction, Interpreter, Limits, SandpawError, SecurityOptions,
    Value,
};

fn eval(code: &str) -> Value {
    Interpreter::new()
        .evaluate(code, EvalOptions::default())
        .unwrap_or_else(|err| panic!("evaluation failed: {} ({})", err.message, err.kind))
}

fn eval_err(code: &str) -> SandpawError {
    Interpreter::new()
        .evaluate(code, EvalOptions::default())
        .expect_err("expected an error")
}

fn as_number(value: &Value) -> f64 {
    match value {
        Value::Number(n) => *n,
        other => panic!("expected a number, got {:?}", other),
    }
}

fn as_string(value: &Value) -> String {
    match value {
        Value::Str(s) => s.clone(),
        other => panic!("expected a string, got {:?}", other),
    }
}

#[test]
fn prototype_pollution_write_is_blocked() {
    let err = eval_err("const o={}; o['__proto__']={polluted:true};");
    assert_eq!(err.kind, ErrorKind::PropertyNameForbidden);

    // Without the write, nothing is inherited: the read comes back
    // undefined.
    assert_eq!(as_string(&eval("typeof ({}).polluted")), "undefined");
}

#[test]
fn dangerous_names_are_blocked_after_coercion_and_aliasing() {
    let err = eval_err("const k = '__pro' + 'to__'; const o = {}; o[k] = 1;");
    assert_eq!(err.kind, ErrorKind::PropertyNameForbidden);

    let err = eval_err("({})['constructor']");
    assert_eq!(err.kind, ErrorKind::PropertyNameForbidden);

    let err = eval_err("({'prototype': 1})");
    assert_eq!(err.kind, ErrorKind::PropertyNameForbidden);

    let err = eval_err("'__proto__' in {}");
    assert_eq!(err.kind, ErrorKind::PropertyNameForbidden);
}

#[test]
fn meta_hooks_are_blocked_on_non_bag_targets() {
    let err = eval_err("const f = () => 1; f.call");
    assert_eq!(err.kind, ErrorKind::PropertyNameForbidden);

    // On plain guest bags only the forced names are filtered.
    assert_eq!(as_string(&eval("const o = {call: 'ok'}; o.call")), "ok");
}

#[test]
fn guest_symbols_work_but_meta_symbol_keys_do_not() {
    // Guest-created symbols are usable as keys.
    let result = eval("const o = {}; const s = Symbol('x'); o[s] = 1; typeof o[s]");
    assert_eq!(as_string(&result), "number");

    // The reserved meta-symbol keys are not.
    let err = eval_err("({})['@@toPrimitive']");
    assert_eq!(err.kind, ErrorKind::SymbolForbidden);
}

#[test]
fn forbidden_global_names_cannot_be_injected() {
    let mut interpreter = Interpreter::new();
    let options = EvalOptions {
        globals: vec![(
            "Function".to_string(),
            HostFunction::sync("evil", |_| Ok(Value::Undefined)),
        )],
        ..Default::default()
    };
    let err = interpreter.evaluate("1", options).expect_err("must be rejected");
    assert_eq!(err.kind, ErrorKind::PropertyNameForbidden);
}

#[test]
fn banned_identities_are_rejected_under_any_name() {
    let mut interpreter = Interpreter::new();
    let evil = HostFunction::sync("makeCode", |_| Ok(Value::Undefined));
    interpreter.ban_global_value(evil.clone());

    let options = EvalOptions {
        globals: vec![("innocentName".to_string(), evil)],
        ..Default::default()
    };
    let err = interpreter.evaluate("1", options).expect_err("must be rejected");
    assert_eq!(err.kind, ErrorKind::PropertyNameForbidden);
}

#[test]
fn injected_globals_are_restored_after_the_call() {
    let mut interpreter = Interpreter::new();

    let options = EvalOptions {
        globals: vec![("gift".to_string(), Value::Number(5.0))],
        ..Default::default()
    };
    let result = interpreter.evaluate("gift", options).unwrap();
    assert_eq!(as_number(&result), 5.0);

    // After the call the binding is gone again.
    let result = interpreter
        .evaluate("typeof gift", EvalOptions::default())
        .unwrap();
    assert_eq!(as_string(&result), "undefined");
}

#[test]
fn injected_globals_shadow_and_restore_previous_values() {
    let mut interpreter = Interpreter::new();
    interpreter
        .evaluate("var marker = 'original';", EvalOptions::default())
        .unwrap();

    let options = EvalOptions {
        globals: vec![("marker".to_string(), Value::Str("override".to_string()))],
        ..Default::default()
    };
    let during = interpreter.evaluate("marker", options).unwrap();
    assert_eq!(as_string(&during), "override");

    let after = interpreter.evaluate("marker", EvalOptions::default()).unwrap();
    assert_eq!(as_string(&after), "original");
}

#[test]
fn host_objects_are_read_only() {
    let mut interpreter = Interpreter::new();
    let config = Value::new_object();
    if let Value::Object(data) = &config {
        data.borrow_mut()
            .props
            .insert("mode".to_string(), Value::Str("safe".to_string()));
    }

    let options = EvalOptions {
        globals: vec![("config".to_string(), config)],
        ..Default::default()
    };
    let err = interpreter
        .evaluate("config.mode = 'unsafe'", options)
        .expect_err("host objects reject writes");
    assert_eq!(err.kind, ErrorKind::TypeMismatch);
}

#[test]
fn host_objects_deny_non_own_reads_except_the_probes() {
    let mut interpreter = Interpreter::new();
    let config = Value::new_object();

    let options = EvalOptions {
        globals: vec![("config".to_string(), config)],
        ..Default::default()
    };
    let err = interpreter
        .evaluate("config.secret", options)
        .expect_err("non-own reads are denied");
    assert_eq!(err.kind, ErrorKind::InheritedAccessDenied);

    // The thenable probe comes back undefined so awaits do not stall.
    let options = EvalOptions {
        globals: vec![("config".to_string(), Value::new_object())],
        ..Default::default()
    };
    let result = interpreter.evaluate("typeof config.then", options).unwrap();
    assert_eq!(as_string(&result), "undefined");
}

#[test]
fn host_errors_are_redacted_by_default() {
    let mut interpreter = Interpreter::new();
    let options = EvalOptions {
        globals: vec![(
            "explode".to_string(),
            HostFunction::sync("explode", |_| {
                Err(SandpawError::host("ENOENT: open /etc/passwd failed"))
            }),
        )],
        ..Default::default()
    };
    let err = interpreter.evaluate("explode()", options).expect_err("host failed");
    assert_eq!(err.kind, ErrorKind::HostFunctionError);
    assert!(!err.message.contains("/etc/passwd"));
}

#[test]
fn host_errors_can_be_sanitised_instead_of_hidden() {
    let mut interpreter = Interpreter::with_security(SecurityOptions {
        sanitize_stack_traces: true,
        hide_host_errors: false,
    });
    let options = EvalOptions {
        globals: vec![(
            "explode".to_string(),
            HostFunction::sync("explode", |_| {
                Err(SandpawError::host("ENOENT: open /etc/passwd failed"))
            }),
        )],
        ..Default::default()
    };
    let err = interpreter.evaluate("explode()", options).expect_err("host failed");
    assert!(err.message.contains("ENOENT:"));
    assert!(!err.message.contains("/etc/passwd"));
}

#[test]
fn guest_errors_pass_through_host_callbacks_unredacted() {
    // A guest throw inside a callback must reach the guest catch with
    // the original value, not a redacted host envelope.
    let result = eval(
        "let seen = 'none';
         try { [1].forEach(() => { throw 'original' }) } catch (e) { seen = e }
         seen",
    );
    assert_eq!(as_string(&result), "original");
}

#[test]
fn host_callbacks_reenter_the_evaluator() {
    let mut interpreter = Interpreter::new();
    let options = EvalOptions {
        globals: vec![(
            "applyTwice".to_string(),
            HostFunction::sync("applyTwice", |args| {
                let Some(Value::HostFunction(callback)) = args.first() else {
                    return Err(SandpawError::host("applyTwice expects a callback"));
                };
                let sandpaw::host::HostCallable::Sync(f) = &callback.callable else {
                    return Err(SandpawError::host("expected a sync callback"));
                };
                let once = f(vec![Value::Number(10.0)])?;
                f(vec![once])
            }),
        )],
        ..Default::default()
    };
    let result = interpreter
        .evaluate("let captured = 1; applyTwice(x => x + captured)", options)
        .unwrap();
    assert_eq!(as_number(&result), 12.0);
}

#[test]
fn call_depth_limit_stops_runaway_recursion() {
    let mut interpreter = Interpreter::new();
    let options = EvalOptions {
        limits: Limits {
            max_call_stack_depth: Some(32),
            ..Default::default()
        },
        ..Default::default()
    };
    let err = interpreter
        .evaluate("function f(){ return f() } f()", options)
        .expect_err("recursion must hit the limit");
    assert_eq!(err.kind, ErrorKind::MaxCallStackDepthExceeded);
}

#[test]
fn loop_iteration_limit_is_per_loop() {
    let mut interpreter = Interpreter::new();
    let options = EvalOptions {
        limits: Limits {
            max_loop_iterations: Some(10),
            ..Default::default()
        },
        ..Default::default()
    };
    let err = interpreter
        .evaluate("while (true) {}", options)
        .expect_err("infinite loop must hit the limit");
    assert_eq!(err.kind, ErrorKind::MaxLoopIterationsExceeded);

    // Two sequential loops each get their own budget.
    let options = EvalOptions {
        limits: Limits {
            max_loop_iterations: Some(10),
            ..Default::default()
        },
        ..Default::default()
    };
    let result = interpreter
        .evaluate(
            "let n=0; for (let i=0;i<8;i++) n++; for (let i=0;i<8;i++) n++; n",
            options,
        )
        .unwrap();
    assert_eq!(as_number(&result), 16.0);
}

#[test]
fn memory_limit_catches_unbounded_growth() {
    let mut interpreter = Interpreter::new();
    let options = EvalOptions {
        limits: Limits {
            max_memory: Some(4096),
            ..Default::default()
        },
        ..Default::default()
    };
    let err = interpreter
        .evaluate("const a = []; while (true) { a.push(1,2,3,4) }", options)
        .expect_err("growth must hit the memory limit");
    assert_eq!(err.kind, ErrorKind::MaxMemoryExceeded);
}

#[test]
fn abort_signal_stops_a_hot_loop() {
    let mut interpreter = Interpreter::new();
    let signal = Arc::new(AtomicBool::new(false));
    signal.store(true, Ordering::Relaxed);

    let options = EvalOptions {
        signal: Some(signal),
        ..Default::default()
    };
    let err = futures::executor::block_on(
        interpreter.evaluate_async("let i=0; while (true) i++;", options),
    )
    .expect_err("abort must interrupt");
    assert_eq!(err.kind, ErrorKind::Aborted);
}

#[test]
fn abort_unwinds_through_finally() {
    let cleaned = Arc::new(AtomicBool::new(false));
    let observed = cleaned.clone();

    let mut interpreter = Interpreter::new();
    let signal = Arc::new(AtomicBool::new(true));

    let options = EvalOptions {
        signal: Some(signal),
        globals: vec![(
            "notifyCleanup".to_string(),
            HostFunction::sync("notifyCleanup", move |_| {
                cleaned.store(true, Ordering::Relaxed);
                Ok(Value::Undefined)
            }),
        )],
        ..Default::default()
    };
    let err = futures::executor::block_on(interpreter.evaluate_async(
        "try { let i=0; while (true) i++; } finally { notifyCleanup() }",
        options,
    ))
    .expect_err("abort must interrupt");
    assert_eq!(err.kind, ErrorKind::Aborted);
    assert!(observed.load(Ordering::Relaxed));
}

#[test]
fn errors_are_enriched_with_location_and_source() {
    let err = eval_err("const a = 1;\nmissingName");
    assert_eq!(err.kind, ErrorKind::UndefinedVariable);
    assert_eq!(err.line, Some(2));
    assert_eq!(err.source_code.as_deref(), Some("missingName"));
}
