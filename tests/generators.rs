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

//! Generator coroutines: suspension inside nested control flow,
//! sent values, early close with pending finally handlers.

use sandpaw::{EvalOptions, Interpreter, Value};

fn eval(code: &str) -> Value {
    Interpreter::new()
        .evaluate(code, EvalOptions::default())
        .unwrap_or_else(|err| panic!("evaluation failed: {} ({})", err.message, err.kind))
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

fn as_bool(value: &Value) -> bool {
    match value {
        Value::Bool(b) => *b,
        other => panic!("expected a boolean, got {:?}", other),
    }
}

fn as_vec(value: &Value) -> Vec<Value> {
    match value {
        Value::Array(data) => data.borrow().elements.clone(),
        other => panic!("expected an array, got {:?}", other),
    }
}

#[test]
fn generators_yield_and_complete() {
    let result = eval(
        "function* g(){ yield 1; yield 2; return 3 }
         const it = g();
         [it.next().value, it.next().value, it.next().value, it.next().done]",
    );
    let items = as_vec(&result);
    assert_eq!(as_number(&items[0]), 1.0);
    assert_eq!(as_number(&items[1]), 2.0);
    assert_eq!(as_number(&items[2]), 3.0);
    assert!(as_bool(&items[3]));
}

#[test]
fn next_feeds_the_suspended_yield_expression() {
    let result = eval(
        "function* g(){ const a = yield 1; const b = yield a + 1; return b * 2 }
         const it = g();
         [it.next().value, it.next(10).value, it.next(5).value]",
    );
    let items = as_vec(&result);
    assert_eq!(as_number(&items[0]), 1.0);
    assert_eq!(as_number(&items[1]), 11.0);
    assert_eq!(as_number(&items[2]), 10.0);
}

#[test]
fn multiple_yields_inside_one_expression() {
    let result = eval(
        "function* g(){ yield (yield 1) + (yield 2) }
         const it = g();
         [it.next().value, it.next(10).value, it.next(20).value, it.next().done]",
    );
    let items = as_vec(&result);
    assert_eq!(as_number(&items[0]), 1.0);
    assert_eq!(as_number(&items[1]), 2.0);
    assert_eq!(as_number(&items[2]), 30.0);
    assert!(as_bool(&items[3]));
}

#[test]
fn yields_suspend_inside_nested_loops() {
    let result = eval(
        "function* pairs(){
             for (let i = 0; i < 2; i++)
                 for (let j = 0; j < 2; j++)
                     yield i * 10 + j;
         }
         const out = [];
         for (const v of pairs()) out.push(v);
         out",
    );
    let items: Vec<f64> = as_vec(&result).iter().map(as_number).collect();
    assert_eq!(items, vec![0.0, 1.0, 10.0, 11.0]);
}

#[test]
fn for_of_break_closes_the_generator_and_runs_finally() {
    let result = eval(
        "const log=[];
         function* g(){ try { yield 1; yield 2; } finally { log.push('cleanup') } }
         for (const v of g()) { log.push(v); if (v===1) break }
         log",
    );
    let items = as_vec(&result);
    assert_eq!(items.len(), 2);
    assert_eq!(as_number(&items[0]), 1.0);
    assert_eq!(as_string(&items[1]), "cleanup");
}

#[test]
fn return_runs_pending_finallys_innermost_first() {
    let result = eval(
        "const log=[];
         function* g(){
             try {
                 try { yield 1 } finally { log.push('inner') }
             } finally { log.push('outer') }
         }
         const it = g();
         it.next();
         const r = it.return(5);
         [log[0], log[1], r.value, r.done]",
    );
    let items = as_vec(&result);
    assert_eq!(as_string(&items[0]), "inner");
    assert_eq!(as_string(&items[1]), "outer");
    assert_eq!(as_number(&items[2]), 5.0);
    assert!(as_bool(&items[3]));
}

#[test]
fn finallys_run_exactly_once_on_close() {
    let result = eval(
        "let runs = 0;
         function* g(){ try { yield 1 } finally { runs += 1 } }
         const it = g();
         it.next();
         it.return(0);
         it.return(0);
         runs",
    );
    assert_eq!(as_number(&result), 1.0);
}

#[test]
fn throw_resumes_as_if_yield_threw() {
    let result = eval(
        "function* g(){ try { yield 1 } catch (e) { yield 'caught:' + e } }
         const it = g();
         it.next();
         it.throw('bad').value",
    );
    assert_eq!(as_string(&result), "caught:bad");
}

#[test]
fn uncaught_throw_terminates_the_generator() {
    let result = eval(
        "function* g(){ yield 1 }
         const it = g();
         it.next();
         let kind = 'none';
         try { it.throw('boom') } catch (e) { kind = 'thrown' }
         [kind, it.next().done]",
    );
    let items = as_vec(&result);
    assert_eq!(as_string(&items[0]), "thrown");
    assert!(as_bool(&items[1]));
}

#[test]
fn yield_star_delegates_to_an_inner_iterable() {
    let result = eval(
        "function* inner(){ yield 1; yield 2 }
         function* outer(){ yield 0; yield* inner(); yield* [8, 9]; yield 3 }
         const out = [];
         for (const v of outer()) out.push(v);
         out",
    );
    let items: Vec<f64> = as_vec(&result).iter().map(as_number).collect();
    assert_eq!(items, vec![0.0, 1.0, 2.0, 8.0, 9.0, 3.0]);
}

#[test]
fn generators_are_created_lazily() {
    let result = eval(
        "let started = false;
         function* g(){ started = true; yield 1 }
         const it = g();
         const before = started;
         it.next();
         [before, started]",
    );
    let items = as_vec(&result);
    assert!(!as_bool(&items[0]));
    assert!(as_bool(&items[1]));
}

#[test]
fn next_after_completion_keeps_reporting_done() {
    let result = eval(
        "function* g(){ yield 1 }
         const it = g();
         it.next();
         it.next();
         [it.next().done, it.next().value === undefined]",
    );
    let items = as_vec(&result);
    assert!(as_bool(&items[0]));
    assert!(as_bool(&items[1]));
}

#[test]
fn spread_drains_a_generator() {
    let result = eval(
        "function* g(){ yield 1; yield 2; yield 3 }
         [...g()].length",
    );
    assert_eq!(as_number(&result), 3.0);
}

#[test]
fn generators_close_over_their_environment() {
    let result = eval(
        "function counter(start){
             return function* (){ let n = start; while (true) yield n++; }();
         }
         const it = counter(100);
         [it.next().value, it.next().value]",
    );
    let items = as_vec(&result);
    assert_eq!(as_number(&items[0]), 100.0);
    assert_eq!(as_number(&items[1]), 101.0);
}
