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

//! The public evaluator surface: parsing, stepping, scope inspection,
//! global resets, statistics and the feature gate.

use std::collections::HashSet;

use sandpaw::{
    ErrorKind, EvalOptions, FeatureControl, FeatureTag, Interpreter, Value,
};

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
fn parse_then_evaluate_matches_direct_evaluation() {
    let code = "let a = 2; a * 21";
    let mut direct = Interpreter::new();
    let direct_result = direct.evaluate(code, EvalOptions::default()).unwrap();

    let mut staged = Interpreter::new();
    let program = staged.parse(code).unwrap();
    let staged_result = staged
        .evaluate_program(&program, EvalOptions::default())
        .unwrap();

    assert_eq!(as_number(&direct_result), 42.0);
    assert!(Value::equals_strict(&direct_result, &staged_result));
}

#[test]
fn parse_reports_syntax_errors_with_location() {
    let interpreter = Interpreter::new();
    let err = interpreter.parse("let = 5;").expect_err("invalid syntax");
    assert_eq!(err.kind, ErrorKind::Parse);
    assert_eq!(err.line, Some(1));
}

#[test]
fn top_level_bindings_persist_across_evaluations() {
    let mut interpreter = Interpreter::new();
    interpreter
        .evaluate("let stash = 10;", EvalOptions::default())
        .unwrap();
    let result = interpreter
        .evaluate("stash + 5", EvalOptions::default())
        .unwrap();
    assert_eq!(as_number(&result), 15.0);
}

#[test]
fn evaluate_steps_walks_statement_by_statement() {
    let mut interpreter = Interpreter::new();
    let steps: Vec<_> = interpreter
        .evaluate_steps("let a = 1; a + 1; a + 2")
        .unwrap()
        .collect::<Result<Vec<_>, _>>()
        .unwrap();

    assert_eq!(steps.len(), 3);
    assert_eq!(steps[0].node_kind, "VariableDeclaration");
    assert!(!steps[0].done);
    assert!(steps[0].result.is_none());

    assert!(steps[2].done);
    let last = steps[2].result.as_ref().expect("final step carries the result");
    assert_eq!(as_number(last), 3.0);
}

#[test]
fn step_iteration_stops_at_the_first_error() {
    let mut interpreter = Interpreter::new();
    let mut steps = interpreter.evaluate_steps("let a = 1; missing; a").unwrap();

    assert!(steps.next().unwrap().is_ok());
    assert!(steps.next().unwrap().is_err());
    assert!(steps.next().is_none());
}

#[test]
fn get_scope_reflects_visible_bindings() {
    let mut interpreter = Interpreter::new();
    interpreter
        .evaluate("let mine = 7; var also = 8;", EvalOptions::default())
        .unwrap();

    let scope = interpreter.get_scope();
    assert!(matches!(scope.get("mine"), Some(Value::Number(n)) if *n == 7.0));
    assert!(matches!(scope.get("also"), Some(Value::Number(n)) if *n == 8.0));
    // Built-ins are part of the visible scope.
    assert!(scope.contains_key("parseInt"));
}

#[test]
fn clear_globals_resets_to_builtins_and_is_idempotent() {
    let mut interpreter = Interpreter::new();
    interpreter
        .evaluate("let mine = 7;", EvalOptions::default())
        .unwrap();

    interpreter.clear_globals();
    let gone = interpreter
        .evaluate("typeof mine", EvalOptions::default())
        .unwrap();
    assert_eq!(as_string(&gone), "undefined");

    // Built-ins survive the reset, and clearing twice changes nothing.
    interpreter.clear_globals();
    let still_there = interpreter
        .evaluate("typeof parseInt", EvalOptions::default())
        .unwrap();
    assert_eq!(as_string(&still_there), "function");
}

#[test]
fn stats_count_nodes_calls_and_iterations() {
    let mut interpreter = Interpreter::new();
    interpreter
        .evaluate(
            "function f(){ return 1 } let n=0; for (let i=0;i<5;i++) n += f(); n",
            EvalOptions::default(),
        )
        .unwrap();

    let stats = interpreter.get_stats();
    assert!(stats.node_count > 0);
    assert_eq!(stats.function_calls, 5);
    assert_eq!(stats.loop_iterations, 5);
    assert!(stats.execution_time_ms >= 0.0);
}

#[test]
fn stats_reset_per_evaluation() {
    let mut interpreter = Interpreter::new();
    interpreter
        .evaluate("for (let i=0;i<5;i++) {}", EvalOptions::default())
        .unwrap();
    interpreter.evaluate("1", EvalOptions::default()).unwrap();
    assert_eq!(interpreter.get_stats().loop_iterations, 0);
}

#[test]
fn feature_blacklist_rejects_listed_features() {
    let mut interpreter = Interpreter::new();
    let mut denied = HashSet::new();
    denied.insert(FeatureTag::Generators);

    let options = EvalOptions {
        feature_control: FeatureControl::Blacklist(denied),
        ..Default::default()
    };
    let err = interpreter
        .evaluate("function* g(){ yield 1 } g()", options)
        .expect_err("generators are disabled");
    assert!(matches!(
        err.kind,
        ErrorKind::FeatureNotEnabled(FeatureTag::Generators)
    ));
}

#[test]
fn feature_whitelist_allows_only_listed_features() {
    let mut interpreter = Interpreter::new();
    let mut allowed = HashSet::new();
    allowed.insert(FeatureTag::Variables);

    let options = EvalOptions {
        feature_control: FeatureControl::Whitelist(allowed.clone()),
        ..Default::default()
    };
    let result = interpreter.evaluate("let x = 1; x", options).unwrap();
    assert_eq!(as_number(&result), 1.0);

    let options = EvalOptions {
        feature_control: FeatureControl::Whitelist(allowed),
        ..Default::default()
    };
    let err = interpreter
        .evaluate("class C {}", options)
        .expect_err("classes are not whitelisted");
    assert!(matches!(
        err.kind,
        ErrorKind::FeatureNotEnabled(FeatureTag::Classes)
    ));
}

#[test]
fn validator_gates_execution() {
    let mut interpreter = Interpreter::new();
    let options = EvalOptions {
        validator: Some(Box::new(|program| program.body.len() <= 1)),
        ..Default::default()
    };
    let result = interpreter.evaluate("1 + 1", options).unwrap();
    assert_eq!(as_number(&result), 2.0);

    let options = EvalOptions {
        validator: Some(Box::new(|program| program.body.len() <= 1)),
        ..Default::default()
    };
    let err = interpreter
        .evaluate("1; 2; 3", options)
        .expect_err("validator rejects long programs");
    assert_eq!(err.kind, ErrorKind::Parse);
}

#[test]
fn builtins_include_the_required_constants() {
    let mut interpreter = Interpreter::new();
    let result = interpreter
        .evaluate(
            "[typeof undefined, typeof NaN, Infinity > 0, typeof Symbol, typeof globalThis]",
            EvalOptions::default(),
        )
        .unwrap();
    let Value::Array(items) = result else {
        panic!("expected array")
    };
    let items = items.borrow();
    assert_eq!(as_string(&items.elements[0]), "undefined");
    assert_eq!(as_string(&items.elements[1]), "number");
    assert!(matches!(items.elements[2], Value::Bool(true)));
    assert_eq!(as_string(&items.elements[3]), "function");
    assert_eq!(as_string(&items.elements[4]), "object");
}

#[test]
fn globalthis_is_a_neutral_container() {
    let mut interpreter = Interpreter::new();
    // Writing through globalThis does not touch real bindings.
    let result = interpreter
        .evaluate(
            "globalThis.leak = 1; typeof leak",
            EvalOptions::default(),
        )
        .unwrap();
    assert_eq!(as_string(&result), "undefined");
}

#[test]
fn json_bridge_round_trips_plain_data() {
    let json: serde_json::Value =
        serde_json::from_str(r#"{"a": 1, "b": [true, "x"], "c": null}"#).unwrap();
    let value = Value::from_json(&json);
    let back = value.to_json().expect("plain data has a JSON form");
    assert_eq!(json, back);
}
