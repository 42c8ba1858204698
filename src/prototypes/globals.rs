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

/*!
 * The always-installed globals: the `undefined` / `NaN` / `Infinity`
 * constants, the symbol constructor, the promise surface, the neutral
 * `globalThis` container and a handful of coercion callables. Installed
 * at interpreter construction and re-installed by `clear_globals`.
 */

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use indexmap::IndexMap;

use crate::error::SandpawError;
use crate::host::HostFunction;
use crate::interpreter::calls;
use crate::interpreter::engine::EngineState;
use crate::interpreter::environment::Environment;
use crate::interpreter::helpers;
use crate::value::{ObjectData, PromiseState, SymbolData, Value};

/// Installs the built-in globals into an environment.
pub fn install(engine: &Rc<EngineState>, env: &Rc<RefCell<Environment>>) {
    Environment::inject_global(env, "undefined", Value::Undefined);
    Environment::inject_global(env, "NaN", Value::Number(f64::NAN));
    Environment::inject_global(env, "Infinity", Value::Number(f64::INFINITY));

    Environment::inject_global(env, "Symbol", symbol_constructor());
    Environment::inject_global(env, "Promise", promise_namespace(engine));
    Environment::inject_global(env, "Error", error_constructor());

    // The neutral container behind globalThis; deliberately not the real
    // environment.
    let neutral = Value::new_object();
    Environment::inject_global(env, "globalThis", neutral.clone());
    Environment::inject_global(env, "global", neutral);

    Environment::inject_global(
        env,
        "parseInt",
        HostFunction::sync("parseInt", |args| {
            let text = match args.first() {
                Some(Value::Str(s)) => s.trim().to_string(),
                Some(Value::Number(n)) => n.to_string(),
                _ => return Ok(Value::Number(f64::NAN)),
            };
            let radix = match args.get(1) {
                Some(Value::Number(r)) if (2.0..=36.0).contains(r) => *r as u32,
                _ => 10,
            };
            let digits: String = text
                .chars()
                .take_while(|c| c.is_digit(radix) || (*c == '-' && text.starts_with('-')))
                .collect();
            Ok(i64::from_str_radix(&digits, radix)
                .map(|n| Value::Number(n as f64))
                .unwrap_or(Value::Number(f64::NAN)))
        }),
    );

    Environment::inject_global(
        env,
        "parseFloat",
        HostFunction::sync("parseFloat", |args| {
            let text = match args.first() {
                Some(Value::Str(s)) => s.trim().to_string(),
                Some(Value::Number(n)) => return Ok(Value::Number(*n)),
                _ => return Ok(Value::Number(f64::NAN)),
            };
            Ok(text
                .parse::<f64>()
                .map(Value::Number)
                .unwrap_or(Value::Number(f64::NAN)))
        }),
    );

    Environment::inject_global(
        env,
        "isNaN",
        HostFunction::sync("isNaN", |args| {
            Ok(Value::Bool(matches!(
                args.first(),
                Some(Value::Number(n)) if n.is_nan()
            )))
        }),
    );

    Environment::inject_global(
        env,
        "Boolean",
        HostFunction::sync("Boolean", |args| {
            Ok(Value::Bool(
                args.first().map(|v| v.is_truthy()).unwrap_or(false),
            ))
        }),
    );

    Environment::inject_global(
        env,
        "Number",
        HostFunction::sync("Number", |args| {
            Ok(match args.first() {
                None => Value::Number(0.0),
                Some(Value::Number(n)) => Value::Number(*n),
                Some(Value::Bool(b)) => Value::Number(if *b { 1.0 } else { 0.0 }),
                Some(Value::Null) => Value::Number(0.0),
                Some(Value::Str(s)) => Value::Number(if s.trim().is_empty() {
                    0.0
                } else {
                    s.trim().parse::<f64>().unwrap_or(f64::NAN)
                }),
                Some(_) => Value::Number(f64::NAN),
            })
        }),
    );

    Environment::inject_global(
        env,
        "String",
        HostFunction::sync("String", |args| {
            Ok(Value::Str(
                args.first()
                    .map(helpers::to_template_string)
                    .unwrap_or_default(),
            ))
        }),
    );
}

/// `Symbol(description)` plus the well-known iterator members.
fn symbol_constructor() -> Value {
    let counter = Rc::new(Cell::new(0u64));
    let ctor = HostFunction::sync("Symbol", move |args| {
        let description = match args.first() {
            Some(Value::Str(s)) => s.clone(),
            _ => String::new(),
        };
        let id = counter.get() + 1;
        counter.set(id);
        Ok(Value::Symbol(Rc::new(SymbolData {
            key: format!("@@sym:{}:{}", id, description),
            description,
        })))
    });

    if let Value::HostFunction(host) = &ctor {
        let mut props = host.props.borrow_mut();
        props.insert(
            "iterator".to_string(),
            Value::Symbol(Rc::new(SymbolData {
                key: "@@iterator".to_string(),
                description: "Symbol.iterator".to_string(),
            })),
        );
        props.insert(
            "asyncIterator".to_string(),
            Value::Symbol(Rc::new(SymbolData {
                key: "@@asyncIterator".to_string(),
                description: "Symbol.asyncIterator".to_string(),
            })),
        );
    }
    ctor
}

/// The `Promise` namespace: `resolve` and `reject`. Promises settle
/// eagerly in this engine, so both produce already-settled values.
fn promise_namespace(_engine: &Rc<EngineState>) -> Value {
    let mut props = IndexMap::new();
    props.insert(
        "resolve".to_string(),
        HostFunction::sync("resolve", |mut args| {
            let value = if args.is_empty() {
                Value::Undefined
            } else {
                args.remove(0)
            };
            Ok(match value {
                already @ Value::Promise(_) => already,
                other => Value::fulfilled_promise(other),
            })
        }),
    );
    props.insert(
        "reject".to_string(),
        HostFunction::sync("reject", |mut args| {
            let reason = if args.is_empty() {
                Value::Undefined
            } else {
                args.remove(0)
            };
            Ok(Value::rejected_promise(SandpawError::thrown(reason)))
        }),
    );
    Value::Object(Rc::new(RefCell::new(ObjectData::host_readonly(props))))
}

/// The error constructor: returns a plain `{name, message}` bag that
/// scripts can throw and inspect.
fn error_constructor() -> Value {
    HostFunction::sync("Error", |args| {
        let message = match args.first() {
            Some(Value::Str(s)) => s.clone(),
            Some(other) => helpers::to_template_string(other),
            None => String::new(),
        };
        Ok(Value::error_object("Error", &message))
    })
}

/// Serves `then` / `catch` / `finally` on a settled promise value.
pub fn promise_method(
    engine: &Rc<EngineState>,
    data: &Rc<RefCell<crate::value::PromiseData>>,
    key: &str,
) -> Result<Value, SandpawError> {
    match key {
        "then" => {
            let engine = engine.clone();
            let data = data.clone();
            Ok(HostFunction::sync("then", move |args| {
                let callback = args.first().cloned().unwrap_or(Value::Undefined);
                match &data.borrow().state {
                    PromiseState::Fulfilled(value) => {
                        if callback.is_callable() {
                            let result = calls::call_value_sync(
                                &engine,
                                &callback,
                                vec![value.clone()],
                                None,
                            )?;
                            Ok(Value::fulfilled_promise(result))
                        } else {
                            Ok(Value::fulfilled_promise(value.clone()))
                        }
                    }
                    PromiseState::Rejected(err) => Ok(Value::rejected_promise(err.clone())),
                }
            }))
        }
        "catch" => {
            let engine = engine.clone();
            let data = data.clone();
            Ok(HostFunction::sync("catch", move |args| {
                let callback = args.first().cloned().unwrap_or(Value::Undefined);
                match &data.borrow().state {
                    PromiseState::Rejected(err) if callback.is_callable() => {
                        let result = calls::call_value_sync(
                            &engine,
                            &callback,
                            vec![err.catch_value()],
                            None,
                        )?;
                        Ok(Value::fulfilled_promise(result))
                    }
                    PromiseState::Rejected(err) => Ok(Value::rejected_promise(err.clone())),
                    PromiseState::Fulfilled(value) => {
                        Ok(Value::fulfilled_promise(value.clone()))
                    }
                }
            }))
        }
        "finally" => {
            let engine = engine.clone();
            let data = data.clone();
            Ok(HostFunction::sync("finally", move |args| {
                let callback = args.first().cloned().unwrap_or(Value::Undefined);
                if callback.is_callable() {
                    calls::call_value_sync(&engine, &callback, vec![], None)?;
                }
                Ok(Value::Promise(data.clone()))
            }))
        }
        _ => Ok(Value::Undefined),
    }
}
