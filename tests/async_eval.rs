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

//! The asynchronous evaluator: await, host-async calls, async
//! generators, `for await…of`, and sync/async parity.

use futures::executor::block_on;
use futures::FutureExt;

use sandpaw::{ErrorKind, EvalOptions, HostFunction, Interpreter, Value};

fn eval_async(code: &str) -> Value {
    block_on(Interpreter::new().evaluate_async(code, EvalOptions::default()))
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
fn await_unwraps_settled_promises() {
    assert_eq!(as_number(&eval_async("await Promise.resolve(7)")), 7.0);
    // Awaiting a plain value passes it through.
    assert_eq!(as_number(&eval_async("await 3")), 3.0);
}

#[test]
fn async_functions_settle_eagerly_and_await_unwraps() {
    assert_eq!(
        as_number(&eval_async("async function f(){ return 4 } await f()")),
        4.0
    );
    assert_eq!(
        as_string(&eval_async("async function f(){ return 'x' } typeof f()")),
        "object"
    );
}

#[test]
fn await_rethrows_rejections_into_guest_catch() {
    let result = eval_async(
        "let r = 'none';
         try { await Promise.reject('bad') } catch (e) { r = e }
         r",
    );
    assert_eq!(as_string(&result), "bad");
}

#[test]
fn async_function_throws_become_rejections() {
    let result = eval_async(
        "async function f(){ throw 'inner' }
         let r = 'none';
         try { await f() } catch (e) { r = e }
         r",
    );
    assert_eq!(as_string(&result), "inner");
}

#[test]
fn async_generators_yield_across_awaits() {
    let result = eval_async(
        "async function* ag(){ yield 1; yield await Promise.resolve(2) }
         const it = ag();
         [(await it.next()).value, (await it.next()).value, (await it.next()).done]",
    );
    let items = as_vec(&result);
    assert_eq!(as_number(&items[0]), 1.0);
    assert_eq!(as_number(&items[1]), 2.0);
    assert!(as_bool(&items[2]));
}

#[test]
fn for_await_drives_async_iterators() {
    let result = eval_async(
        "async function* ag(){ yield 1; yield 2; yield 3 }
         const out = [];
         for await (const v of ag()) out.push(v);
         out",
    );
    let items: Vec<f64> = as_vec(&result).iter().map(as_number).collect();
    assert_eq!(items, vec![1.0, 2.0, 3.0]);
}

#[test]
fn for_await_falls_back_to_sync_iterables() {
    let result = eval_async(
        "const out = [];
         for await (const v of [4, 5]) out.push(v);
         out",
    );
    let items: Vec<f64> = as_vec(&result).iter().map(as_number).collect();
    assert_eq!(items, vec![4.0, 5.0]);
}

#[test]
fn host_async_functions_suspend_at_the_call_site() {
    let mut interpreter = Interpreter::new();
    let options = EvalOptions {
        globals: vec![(
            "fetchNum".to_string(),
            HostFunction::async_fn("fetchNum", |_| {
                async { Ok(Value::Number(42.0)) }.boxed_local()
            }),
        )],
        ..Default::default()
    };
    let result = block_on(interpreter.evaluate_async("await fetchNum() + 0", options)).unwrap();
    assert_eq!(as_number(&result), 42.0);
}

#[test]
fn guest_callbacks_passed_to_async_hosts_are_async_flavoured() {
    let mut interpreter = Interpreter::new();
    let options = EvalOptions {
        globals: vec![(
            "mapOne".to_string(),
            HostFunction::async_fn("mapOne", |args| {
                async move {
                    let Some(Value::HostFunction(callback)) = args.first() else {
                        return Err(sandpaw::SandpawError::host("mapOne expects a callback"));
                    };
                    match &callback.callable {
                        sandpaw::host::HostCallable::Async(f) => {
                            f(vec![Value::Number(20.0)]).await
                        }
                        sandpaw::host::HostCallable::Sync(f) => f(vec![Value::Number(20.0)]),
                    }
                }
                .boxed_local()
            }),
        )],
        ..Default::default()
    };
    let result =
        block_on(interpreter.evaluate_async("await mapOne(async x => x + 1)", options)).unwrap();
    assert_eq!(as_number(&result), 21.0);
}

#[test]
fn sync_evaluator_rejects_await_and_async_hosts() {
    let mut interpreter = Interpreter::new();
    let err = interpreter
        .evaluate("await 1", EvalOptions::default())
        .expect_err("await needs the async evaluator");
    assert_eq!(err.kind, ErrorKind::AsyncInSync);

    let options = EvalOptions {
        globals: vec![(
            "fetchNum".to_string(),
            HostFunction::async_fn("fetchNum", |_| {
                async { Ok(Value::Number(1.0)) }.boxed_local()
            }),
        )],
        ..Default::default()
    };
    let err = interpreter
        .evaluate("fetchNum()", options)
        .expect_err("async hosts need the async evaluator");
    assert_eq!(err.kind, ErrorKind::AsyncInSync);

    let err = interpreter
        .evaluate("async function f(){ return 1 } f()", EvalOptions::default())
        .expect_err("async guest calls need the async evaluator");
    assert_eq!(err.kind, ErrorKind::AsyncInSync);
}

#[test]
fn sync_generators_also_work_under_the_async_evaluator() {
    let result = eval_async(
        "function* g(){ yield 1; yield 2 }
         const out = [];
         for (const v of g()) out.push(v);
         out",
    );
    let items: Vec<f64> = as_vec(&result).iter().map(as_number).collect();
    assert_eq!(items, vec![1.0, 2.0]);
}

#[test]
fn async_generator_return_closes_with_pending_finally() {
    let result = eval_async(
        "const log = [];
         async function* ag(){ try { yield 1; yield 2 } finally { log.push('cleanup') } }
         const it = ag();
         await it.next();
         await it.return(9);
         log",
    );
    let items = as_vec(&result);
    assert_eq!(items.len(), 1);
    assert_eq!(as_string(&items[0]), "cleanup");
}

#[test]
fn promise_then_catch_finally_surface() {
    let result = eval_async(
        "let out = [];
         Promise.resolve(2).then(v => out.push(v * 10));
         Promise.reject('r').catch(e => out.push(e));
         Promise.resolve(1).finally(() => out.push('fin'));
         out",
    );
    let items = as_vec(&result);
    assert_eq!(as_number(&items[0]), 20.0);
    assert_eq!(as_string(&items[1]), "r");
    assert_eq!(as_string(&items[2]), "fin");
}

#[test]
fn sync_and_async_evaluators_agree_on_results_and_counters() {
    let program = "
        let total = 0;
        function fib(n){ if (n < 2) return n; return fib(n-1) + fib(n-2); }
        for (let i = 0; i < 8; i++) total += fib(i);
        class Point {
            constructor(x, y){ this.x = x; this.y = y }
            get sum(){ return this.x + this.y }
        }
        const p = new Point(total, 1);
        p.sum
    ";

    let mut sync_interpreter = Interpreter::new();
    let sync_result = sync_interpreter
        .evaluate(program, EvalOptions::default())
        .unwrap();
    let sync_stats = sync_interpreter.get_stats();

    let mut async_interpreter = Interpreter::new();
    let async_result =
        block_on(async_interpreter.evaluate_async(program, EvalOptions::default())).unwrap();
    let async_stats = async_interpreter.get_stats();

    assert_eq!(as_number(&sync_result), 34.0);
    assert!(Value::equals_strict(&sync_result, &async_result));
    assert_eq!(sync_stats.node_count, async_stats.node_count);
    assert_eq!(sync_stats.function_calls, async_stats.function_calls);
    assert_eq!(sync_stats.loop_iterations, async_stats.loop_iterations);
}
