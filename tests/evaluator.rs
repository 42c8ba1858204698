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

//! Core evaluator behaviour: expressions, scoping, control flow,
//! destructuring and the built-in method surfaces.

use sandpaw::{ErrorKind, EvalOptions, Interpreter, Value};

fn eval(code: &str) -> Value {
    Interpreter::new()
        .evaluate(code, EvalOptions::default())
        .unwrap_or_else(|err| panic!("evaluation failed: {} ({})", err.message, err.kind))
}

fn eval_err(code: &str) -> ErrorKind {
    Interpreter::new()
        .evaluate(code, EvalOptions::default())
        .expect_err("expected an error")
        .kind
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
fn arithmetic_and_precedence() {
    assert_eq!(as_number(&eval("1 + 2 * 3")), 7.0);
    assert_eq!(as_number(&eval("(1 + 2) * 3")), 9.0);
    assert_eq!(as_number(&eval("2 ** 3 ** 2")), 512.0);
    assert_eq!(as_number(&eval("10 % 4")), 2.0);
    assert_eq!(as_number(&eval("7 & 3 | 8")), 11.0);
}

#[test]
fn division_and_modulo_by_zero_raise() {
    assert_eq!(eval_err("1 / 0"), ErrorKind::DivisionByZero);
    assert_eq!(eval_err("1 % 0"), ErrorKind::ModuloByZero);
}

#[test]
fn plus_concatenates_strings() {
    assert_eq!(as_string(&eval("'paw' + 1")), "paw1");
    assert_eq!(as_string(&eval("1 + 'paw'")), "1paw");
}

#[test]
fn equality_operators() {
    assert!(as_bool(&eval("1 == '1'")));
    assert!(!as_bool(&eval("1 === '1'")));
    assert!(as_bool(&eval("null == undefined")));
    assert!(!as_bool(&eval("null === undefined")));
    assert!(as_bool(&eval("const a = [1]; const b = a; a === b")));
    assert!(!as_bool(&eval("[1] === [1]")));
}

#[test]
fn typeof_never_raises_for_unresolved_names() {
    assert_eq!(as_string(&eval("typeof nothingHere")), "undefined");
    assert_eq!(as_string(&eval("typeof 1")), "number");
    assert_eq!(as_string(&eval("typeof 'x'")), "string");
    assert_eq!(as_string(&eval("typeof (() => 1)")), "function");
    assert_eq!(as_string(&eval("typeof 10n")), "bigint");
}

#[test]
fn let_is_block_scoped_and_const_is_immutable() {
    assert_eq!(
        as_number(&eval("let x = 1; { let x = 2; } x")),
        1.0
    );
    assert_eq!(eval_err("const k = 1; k = 2;"), ErrorKind::AssignToConst);
    assert_eq!(
        eval_err("let d = 1; let d = 2;"),
        ErrorKind::DuplicateDeclaration
    );
}

#[test]
fn var_hoists_to_the_enclosing_function() {
    assert_eq!(
        as_number(&eval(
            "function f(){ { var inner = 5; } return inner; } f()"
        )),
        5.0
    );
}

#[test]
fn reading_an_unbound_name_fails() {
    assert_eq!(eval_err("missing"), ErrorKind::UndefinedVariable);
}

#[test]
fn closures_capture_per_iteration_bindings() {
    // for-loop `let` bindings are copied per iteration.
    let result = eval(
        "const fs=[]; for (let i=0;i<3;i++) fs.push(()=>i); [fs[0](),fs[1](),fs[2]()]",
    );
    let items = as_vec(&result);
    assert_eq!(as_number(&items[0]), 0.0);
    assert_eq!(as_number(&items[1]), 1.0);
    assert_eq!(as_number(&items[2]), 2.0);
}

#[test]
fn for_of_gets_a_fresh_binding_each_iteration() {
    let result = eval(
        "const fs=[]; for (const v of [7,8]) fs.push(()=>v); [fs[0](), fs[1]()]",
    );
    let items = as_vec(&result);
    assert_eq!(as_number(&items[0]), 7.0);
    assert_eq!(as_number(&items[1]), 8.0);
}

#[test]
fn for_of_over_an_empty_array_never_iterates() {
    assert_eq!(
        as_number(&eval("let n = 0; for (const x of []) n++; n")),
        0.0
    );
}

#[test]
fn for_in_enumerates_keys_in_insertion_order() {
    let result = eval(
        "const o = {b:1, a:2, c:3}; const ks=[]; for (const k in o) ks.push(k); ks",
    );
    let keys: Vec<String> = as_vec(&result).iter().map(as_string).collect();
    assert_eq!(keys, vec!["b", "a", "c"]);
}

#[test]
fn for_in_over_an_array_yields_index_strings() {
    let result = eval("const ks=[]; for (const k in [10, 20]) ks.push(k); ks");
    let keys: Vec<String> = as_vec(&result).iter().map(as_string).collect();
    assert_eq!(keys, vec!["0", "1"]);
}

#[test]
fn while_and_do_while() {
    assert_eq!(as_number(&eval("let n=0; while (n < 3) n++; n")), 3.0);
    assert_eq!(as_number(&eval("let n=0; do { n++ } while (n < 3); n")), 3.0);
    // do-while runs its body at least once
    assert_eq!(as_number(&eval("let n=0; do { n++ } while (false); n")), 1.0);
}

#[test]
fn switch_matches_strictly_and_falls_through() {
    let code = "
        function pick(x){
            switch (x) {
                case 1: return 'one';
                case 2:
                case 3: return 'few';
                default: return 'many';
            }
        }
        [pick(1), pick(2), pick(3), pick('1'), pick(9)]
    ";
    let picks: Vec<String> = as_vec(&eval(code)).iter().map(as_string).collect();
    assert_eq!(picks, vec!["one", "few", "few", "many", "many"]);
}

#[test]
fn labelled_break_and_continue_reach_their_loop() {
    let result = eval(
        "const hits=[];
         outer: for (let i=0;i<3;i++){
             for (let j=0;j<3;j++){
                 if (j===1) continue outer;
                 if (i===2) break outer;
                 hits.push(i*10+j);
             }
         }
         hits",
    );
    let hits: Vec<f64> = as_vec(&result).iter().map(as_number).collect();
    assert_eq!(hits, vec![0.0, 10.0]);
}

#[test]
fn labelled_break_exits_exactly_the_enclosed_nest() {
    let result = eval(
        "const log=[];
         L: for (let a=0;a<2;a++)
             for (let b=0;b<2;b++)
                 for (let c=0;c<2;c++){ log.push(c); break L; }
         log",
    );
    let log: Vec<f64> = as_vec(&result).iter().map(as_number).collect();
    assert_eq!(log, vec![0.0]);
}

#[test]
fn try_catch_binds_the_thrown_value() {
    assert_eq!(
        as_number(&eval("let r = 0; try { throw 42 } catch (e) { r = e } r")),
        42.0
    );
    // destructuring catch parameter sees the original object
    assert_eq!(
        as_string(&eval(
            "let r = ''; try { throw {code: 'boom'} } catch ({code}) { r = code } r"
        )),
        "boom"
    );
}

#[test]
fn finally_always_runs_and_can_override() {
    assert_eq!(
        as_number(&eval(
            "function f(){ try { return 1 } finally { return 2 } } f()"
        )),
        2.0
    );
    assert_eq!(
        as_string(&eval(
            "let log='';
             function f(){ try { throw 'x' } finally { log += 'cleanup' } }
             try { f() } catch (e) { log += '/' + 'caught' }
             log"
        )),
        "cleanup/caught"
    );
}

#[test]
fn optional_chains_short_circuit_to_undefined() {
    assert_eq!(
        as_string(&eval("const a=null; a?.b?.c?.(1,2) ?? 'fallback'")),
        "fallback"
    );
    assert_eq!(
        as_number(&eval("const o={x:{y:3}}; o?.x?.y")),
        3.0
    );
    assert_eq!(as_string(&eval("typeof ({}).missing?.deep")), "undefined");
}

#[test]
fn nullish_coalescing_only_replaces_nullish() {
    assert_eq!(as_number(&eval("0 ?? 5")), 0.0);
    assert_eq!(as_number(&eval("null ?? 5")), 5.0);
    assert_eq!(as_number(&eval("undefined ?? 5")), 5.0);
}

#[test]
fn logical_assignment_short_circuits_the_right_side() {
    let result = eval(
        "let a = 1;
         let called = false;
         function f(){ called = true; return 9 }
         a ||= f();
         [a, called]",
    );
    let items = as_vec(&result);
    assert_eq!(as_number(&items[0]), 1.0);
    assert!(!as_bool(&items[1]));

    assert_eq!(as_number(&eval("let b = null; b ??= 7; b")), 7.0);
}

#[test]
fn update_expressions_return_pre_or_post_value() {
    assert_eq!(as_number(&eval("let i = 5; i++")), 5.0);
    assert_eq!(as_number(&eval("let i = 5; ++i")), 6.0);
    assert_eq!(as_number(&eval("const o={n:1}; o.n++; ++o.n; o.n")), 3.0);
    assert_eq!(eval_err("let s = 'x'; s++"), ErrorKind::TypeMismatch);
}

#[test]
fn template_literals_use_the_documented_coercions() {
    assert_eq!(as_string(&eval("const name='claw'; `hi ${name}!`")), "hi claw!");
    assert_eq!(as_string(&eval("`n=${1+1}`")), "n=2");
    assert_eq!(as_string(&eval("`${[1,null,'x']}`")), "1,,x");
    assert_eq!(as_string(&eval("`${ {} }`")), "[object Object]");
    assert_eq!(as_string(&eval("`${ (()=>1) }`")), "[object Function]");
}

#[test]
fn tagged_templates_receive_cooked_and_raw_strings() {
    let result = eval(
        "function tag(strings, a){ return strings[0] + '|' + strings.raw[0] + '|' + a }
         tag`x\\n${5}`",
    );
    assert_eq!(as_string(&result), "x\n|x\\n|5");
}

#[test]
fn destructuring_declarations_unpack_deeply() {
    assert_eq!(
        as_number(&eval("const {a, b: {c}} = {a:1, b:{c:2}}; a + c")),
        3.0
    );
    assert_eq!(
        as_number(&eval("const [x, , z = 9, ...rest] = [1, 2]; x + z + rest.length")),
        10.0
    );
    assert_eq!(
        as_number(&eval(
            "const {a, ...rest} = {a:1, b:2, c:3}; a + rest.b + rest.c"
        )),
        6.0
    );
}

#[test]
fn parameters_support_defaults_rest_and_patterns() {
    assert_eq!(as_number(&eval("function f(a, b=10){ return a+b } f(1)")), 11.0);
    assert_eq!(
        as_number(&eval("function f(a, ...rest){ return rest.length } f(1,2,3)")),
        2.0
    );
    assert_eq!(
        as_number(&eval("function f({a, b=2}, [c]){ return a+b+c } f({a:1},[3])")),
        6.0
    );
}

#[test]
fn missing_required_arguments_raise() {
    assert_eq!(
        eval_err("function f(a, b){ return a+b } f(1)"),
        ErrorKind::ArgumentCount
    );
}

#[test]
fn spread_works_in_calls_arrays_and_objects() {
    assert_eq!(
        as_number(&eval("function add3(a,b,c){ return a+b+c } add3(...[1,2,3])")),
        6.0
    );
    assert_eq!(as_number(&eval("[0, ...[1,2], 3].length")), 4.0);
    assert_eq!(
        as_number(&eval("const o={a:1}; const p={...o, b:2}; p.a + p.b")),
        3.0
    );
}

#[test]
fn spreading_a_non_object_is_rejected() {
    assert_eq!(eval_err("({...null})"), ErrorKind::SpreadTarget);
    assert_eq!(eval_err("[...5]"), ErrorKind::SpreadTarget);
}

#[test]
fn sequence_and_conditional_expressions() {
    assert_eq!(as_number(&eval("(1, 2, 3)")), 3.0);
    assert_eq!(as_string(&eval("true ? 'yes' : 'no'")), "yes");
}

#[test]
fn object_methods_bind_this_at_the_call_site() {
    assert_eq!(
        as_number(&eval("const o = { n: 5, twice(){ return this.n * 2 } }; o.twice()")),
        10.0
    );
}

#[test]
fn function_declarations_hoist_within_their_block() {
    assert_eq!(as_number(&eval("const r = later(); function later(){ return 8 } r")), 8.0);
}

#[test]
fn delete_removes_own_properties() {
    let result = eval("const o={a:1,b:2}; delete o.a; ['a' in o, 'b' in o]");
    let items = as_vec(&result);
    assert!(!as_bool(&items[0]));
    assert!(as_bool(&items[1]));
}

#[test]
fn array_methods_cover_the_everyday_surface() {
    assert_eq!(as_number(&eval("[1,2,3].map(x => x * 2)[2]")), 6.0);
    assert_eq!(as_number(&eval("[1,2,3,4].filter(x => x % 2 === 0).length")), 2.0);
    assert_eq!(as_number(&eval("[1,2,3].reduce((a,b) => a+b, 10)")), 16.0);
    assert_eq!(as_number(&eval("[5,6,7].indexOf(6)")), 1.0);
    assert!(as_bool(&eval("[1,2].includes(2)")));
    assert_eq!(as_string(&eval("['a','b'].join('-')")), "a-b");
    assert_eq!(as_number(&eval("[[1],[2,[3]]].flat(2).length")), 3.0);
    assert_eq!(as_number(&eval("const a=[1]; a.push(2, 3); a.length")), 3.0);
    assert_eq!(as_number(&eval("[1,2,3].slice(1).length")), 2.0);
    assert_eq!(as_number(&eval("[3,1].find(x => x < 2)")), 1.0);
}

#[test]
fn array_method_bindings_are_cached_per_receiver() {
    assert!(as_bool(&eval("const a=[]; a.push === a.push")));
}

#[test]
fn string_methods_cover_the_everyday_surface() {
    assert_eq!(as_string(&eval("'  paw  '.trim().toUpperCase()")), "PAW");
    assert_eq!(as_number(&eval("'a,b,c'.split(',').length")), 3.0);
    assert!(as_bool(&eval("'sandpaw'.startsWith('sand')")));
    assert_eq!(as_string(&eval("'cat'.padStart(5, '.')")), "..cat");
    assert_eq!(as_number(&eval("'claw'.length")), 4.0);
    assert_eq!(as_string(&eval("'claw'[1]")), "l");
    assert_eq!(as_string(&eval("'a-b'.replace('-', '+')")), "a+b");
}

#[test]
fn regex_literals_match_through_the_regex_engine() {
    assert!(as_bool(&eval("/^c.t$/i.test('CAT')")));
    assert!(!as_bool(&eval("/^cat$/.test('dog')")));
    assert_eq!(as_string(&eval("/c(a)t/.exec('cat')[1]")), "a");
    assert_eq!(as_string(&eval("/cat/i.source")), "cat");
}

#[test]
fn bigint_arithmetic_stays_in_bigint() {
    assert_eq!(as_string(&eval("typeof (10n + 5n)")), "bigint");
    assert!(as_bool(&eval("10n + 5n === 15n")));
    assert_eq!(eval_err("10n + 5"), ErrorKind::TypeMismatch);
}

#[test]
fn instanceof_walks_the_class_chain() {
    let result = eval(
        "class A {} class B extends A {}
         const b = new B();
         [b instanceof B, b instanceof A, ({}) instanceof A]",
    );
    let items = as_vec(&result);
    assert!(as_bool(&items[0]));
    assert!(as_bool(&items[1]));
    assert!(!as_bool(&items[2]));
}

#[test]
fn instanceof_on_a_bare_function_reports_false() {
    assert!(!as_bool(&eval(
        "function F(){} const x = new F(); x instanceof F"
    )));
}

#[test]
fn in_operator_tests_own_membership() {
    assert!(as_bool(&eval("'a' in {a:1}")));
    assert!(!as_bool(&eval("'b' in {a:1}")));
    assert!(as_bool(&eval("'0' in [9]")));
    assert_eq!(eval_err("'a' in 5"), ErrorKind::TypeMismatch);
}

#[test]
fn iterator_protocol_objects_drive_for_of() {
    let result = eval(
        "const range = {
             [Symbol.iterator]() {
                 let n = 0;
                 return { next() { n += 1; return { value: n, done: n > 3 } } };
             }
         };
         const out = [];
         for (const v of range) out.push(v);
         out",
    );
    let items: Vec<f64> = as_vec(&result).iter().map(as_number).collect();
    assert_eq!(items, vec![1.0, 2.0, 3.0]);
}

#[test]
fn strings_are_iterable() {
    let result = eval("const out=[]; for (const c of 'paw') out.push(c); out");
    let chars: Vec<String> = as_vec(&result).iter().map(as_string).collect();
    assert_eq!(chars, vec!["p", "a", "w"]);
}

#[test]
fn new_on_a_plain_function_returns_the_instance_or_replacement() {
    assert_eq!(
        as_number(&eval("function P(x){ this.x = x } new P(4).x")),
        4.0
    );
    assert!(as_bool(&eval(
        "function R(){ return { replaced: true } } new R().replaced"
    )));
}

#[test]
fn calling_a_non_callable_fails() {
    assert_eq!(eval_err("const x = 5; x()"), ErrorKind::CallTargetNotCallable);
}
