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

//! The class subsystem: construction, inheritance, super dispatch,
//! accessors, private members and static blocks.

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

fn as_vec(value: &Value) -> Vec<Value> {
    match value {
        Value::Array(data) => data.borrow().elements.clone(),
        other => panic!("expected an array, got {:?}", other),
    }
}

#[test]
fn derived_constructor_super_chain_and_private_field() {
    let result = eval(
        "class A { #x; constructor(x){ this.#x=x } get x(){ return this.#x } }
         class B extends A { constructor(x){ super(x+1) } }
         new B(10).x",
    );
    assert_eq!(as_number(&result), 11.0);
}

#[test]
fn instance_fields_initialise_in_declaration_order() {
    let result = eval(
        "class P { a = 1; b = this.a + 1; }
         const p = new P();
         [p.a, p.b]",
    );
    let items = as_vec(&result);
    assert_eq!(as_number(&items[0]), 1.0);
    assert_eq!(as_number(&items[1]), 2.0);
}

#[test]
fn implicit_constructor_chains_arguments_to_the_parent() {
    let result = eval(
        "class A { constructor(v){ this.v = v } }
         class B extends A {}
         new B(9).v",
    );
    assert_eq!(as_number(&result), 9.0);
}

#[test]
fn getters_and_setters_dispatch_through_the_class_chain() {
    let result = eval(
        "class Temp {
             #c = 0;
             get celsius(){ return this.#c }
             set celsius(v){ this.#c = v }
             get fahrenheit(){ return this.#c * 9 / 5 + 32 }
         }
         const t = new Temp();
         t.celsius = 25;
         [t.celsius, t.fahrenheit]",
    );
    let items = as_vec(&result);
    assert_eq!(as_number(&items[0]), 25.0);
    assert_eq!(as_number(&items[1]), 77.0);
}

#[test]
fn methods_read_off_an_instance_are_plain_functions() {
    assert_eq!(
        as_string(&eval(
            "class C { m(){ return 'called' } } typeof new C().m"
        )),
        "function"
    );
}

#[test]
fn super_methods_resolve_from_the_home_class() {
    let result = eval(
        "class Animal { speak(){ return 'generic' } }
         class Cat extends Animal { speak(){ return super.speak() + '/meow' } }
         new Cat().speak()",
    );
    assert_eq!(as_string(&result), "generic/meow");
}

#[test]
fn super_resolution_is_lexical_not_dynamic() {
    // Even when called through a grand-child instance, super inside
    // Cat::speak still starts at Animal.
    let result = eval(
        "class Animal { speak(){ return 'animal' } }
         class Cat extends Animal { speak(){ return super.speak() + '/cat' } }
         class Kitten extends Cat { speak(){ return super.speak() + '/kitten' } }
         new Kitten().speak()",
    );
    assert_eq!(as_string(&result), "animal/cat/kitten");
}

#[test]
fn this_is_unusable_before_super_completes() {
    let err = eval_err(
        "class A {}
         class B extends A { constructor(){ this.x = 1; super() } }
         new B()",
    );
    assert_eq!(err, ErrorKind::ThisNotInitialized);
}

#[test]
fn super_must_be_called_exactly_once() {
    assert_eq!(
        eval_err(
            "class A {}
             class B extends A { constructor(){ super(); super() } }
             new B()"
        ),
        ErrorKind::SuperAlreadyCalled
    );
    assert_eq!(
        eval_err(
            "class A {}
             class B extends A { constructor(){ } }
             new B()"
        ),
        ErrorKind::SuperNotCalled
    );
}

#[test]
fn constructors_may_return_a_replacement_object() {
    assert!(matches!(
        eval("class Box { constructor(){ return { replaced: true } } } new Box().replaced"),
        Value::Bool(true)
    ));
}

#[test]
fn class_values_require_new() {
    assert_eq!(
        eval_err("class C {} C()"),
        ErrorKind::ConstructorWithoutNew
    );
}

#[test]
fn static_members_live_on_the_class_value() {
    let result = eval(
        "class Counter {
             static count = 0;
             static bump(){ Counter.count += 1; return Counter.count }
             static get doubled(){ return Counter.count * 2 }
         }
         Counter.bump();
         Counter.bump();
         [Counter.count, Counter.doubled]",
    );
    let items = as_vec(&result);
    assert_eq!(as_number(&items[0]), 2.0);
    assert_eq!(as_number(&items[1]), 4.0);
}

#[test]
fn static_members_are_inherited() {
    assert_eq!(
        as_number(&eval(
            "class A { static base(){ return 3 } }
             class B extends A {}
             B.base()"
        )),
        3.0
    );
}

#[test]
fn static_blocks_run_once_with_this_bound_to_the_class() {
    let result = eval(
        "class Config {
             static mode = 'unset';
             static { this.mode = 'safe'; this.extra = 1; }
         }
         [Config.mode, Config.extra]",
    );
    let items = as_vec(&result);
    assert_eq!(as_string(&items[0]), "safe");
    assert_eq!(as_number(&items[1]), 1.0);
}

#[test]
fn private_members_are_invisible_outside_their_class() {
    // A method of A may not read #x off a foreign object.
    assert_eq!(
        eval_err(
            "class A { #x = 1; probe(other){ return other.#x } }
             new A().probe({})"
        ),
        ErrorKind::PrivateFieldUndefined
    );
    // And plain code outside any class has no private access at all.
    assert_eq!(eval_err("({}).#x"), ErrorKind::PrivateFieldUndefined);
}

#[test]
fn private_methods_and_static_privates_resolve_in_home_class() {
    let result = eval(
        "class Vault {
             static #seed = 40;
             #bonus(){ return 2 }
             open(){ return Vault.#seed + this.#bonus() }
         }
         new Vault().open()",
    );
    assert_eq!(as_number(&result), 42.0);
}

#[test]
fn sibling_instances_of_the_same_class_share_private_access() {
    let result = eval(
        "class Point {
             #x;
             constructor(x){ this.#x = x }
             equals(other){ return this.#x === other.#x }
         }
         new Point(3).equals(new Point(3))",
    );
    assert!(matches!(result, Value::Bool(true)));
}

#[test]
fn computed_method_keys_are_evaluated_at_definition() {
    assert_eq!(
        as_number(&eval(
            "const key = 'dyn';
             class C { [key](){ return 5 } }
             new C().dyn()"
        )),
        5.0
    );
}

#[test]
fn class_expressions_work_inline() {
    assert_eq!(
        as_number(&eval("const C = class { go(){ return 2 } }; new C().go()")),
        2.0
    );
}

#[test]
fn extending_a_non_class_fails() {
    assert_eq!(eval_err("class C extends 5 {}"), ErrorKind::TypeMismatch);
}

#[test]
fn field_initialisers_can_call_methods_via_this() {
    assert_eq!(
        as_number(&eval(
            "class C { base(){ return 4 } doubled = this.base() * 2; }
             new C().doubled"
        )),
        8.0
    );
}
