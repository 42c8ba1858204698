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
 * Array method surface.
 *
 * Methods are built as host functions bound to their receiver and
 * cached per `(receiver, name)` pair, so reading the same method off
 * the same array twice yields the same value.
 */

use std::cell::RefCell;
use std::rc::Rc;

use crate::error::SandpawError;
use crate::host::HostFunction;
use crate::interpreter::calls;
use crate::interpreter::engine::EngineState;
use crate::interpreter::helpers::{self, BYTES_PER_ARRAY_SLOT};
use crate::value::{ArrayData, Value};

const METHOD_NAMES: &[&str] = &[
    "push", "pop", "shift", "unshift", "slice", "splice", "indexOf", "lastIndexOf", "includes",
    "join", "concat", "reverse", "map", "filter", "forEach", "find", "findIndex", "reduce",
    "some", "every", "flat", "keys", "values", "entries",
];

/// Serves a method read on an array receiver, or `undefined` for
/// unknown names.
pub fn method(
    engine: &Rc<EngineState>,
    receiver: &Value,
    name: &str,
) -> Result<Value, SandpawError> {
    let Value::Array(data) = receiver else {
        return Ok(Value::Undefined);
    };
    let Some(name) = METHOD_NAMES.iter().find(|m| **m == name).copied() else {
        return Ok(Value::Undefined);
    };

    let ptr = Rc::as_ptr(data) as usize;
    Ok(engine.cached_method(ptr, name, || build(engine.clone(), data.clone(), name)))
}

fn build(engine: Rc<EngineState>, data: Rc<RefCell<ArrayData>>, name: &'static str) -> Value {
    HostFunction::sync(name, move |args: Vec<Value>| {
        dispatch(&engine, &data, name, args)
    })
}

fn dispatch(
    engine: &Rc<EngineState>,
    data: &Rc<RefCell<ArrayData>>,
    name: &str,
    args: Vec<Value>,
) -> Result<Value, SandpawError> {
    if data.borrow().readonly && is_mutating(name) {
        return Err(SandpawError::type_mismatch(format!(
            "{}() is not allowed on a read-only host array",
            name
        )));
    }

    match name {
        "push" => {
            engine.charge_memory(args.len() as u64 * BYTES_PER_ARRAY_SLOT)?;
            let mut array = data.borrow_mut();
            array.elements.extend(args);
            Ok(Value::Number(array.elements.len() as f64))
        }
        "pop" => Ok(data.borrow_mut().elements.pop().unwrap_or(Value::Undefined)),
        "shift" => {
            let mut array = data.borrow_mut();
            if array.elements.is_empty() {
                Ok(Value::Undefined)
            } else {
                Ok(array.elements.remove(0))
            }
        }
        "unshift" => {
            engine.charge_memory(args.len() as u64 * BYTES_PER_ARRAY_SLOT)?;
            let mut array = data.borrow_mut();
            for (offset, value) in args.into_iter().enumerate() {
                array.elements.insert(offset, value);
            }
            Ok(Value::Number(array.elements.len() as f64))
        }
        "slice" => {
            let elements = data.borrow().elements.clone();
            let (start, end) = slice_bounds(&args, elements.len());
            let out: Vec<Value> = elements[start..end].to_vec();
            engine.charge_memory(out.len() as u64 * BYTES_PER_ARRAY_SLOT)?;
            Ok(Value::new_array(out))
        }
        "splice" => {
            let len = data.borrow().elements.len();
            let start = clamp_index(arg_number(&args, 0).unwrap_or(0.0), len);
            let delete_count = match arg_number(&args, 1) {
                Some(n) => (n.max(0.0) as usize).min(len - start),
                None => len - start,
            };
            let replacements: Vec<Value> = args.iter().skip(2).cloned().collect();
            engine.charge_memory(replacements.len() as u64 * BYTES_PER_ARRAY_SLOT)?;
            let removed: Vec<Value> = data
                .borrow_mut()
                .elements
                .splice(start..start + delete_count, replacements)
                .collect();
            Ok(Value::new_array(removed))
        }
        "indexOf" => {
            let target = args.first().cloned().unwrap_or(Value::Undefined);
            let found = data
                .borrow()
                .elements
                .iter()
                .position(|v| Value::equals_strict(v, &target));
            Ok(Value::Number(found.map(|i| i as f64).unwrap_or(-1.0)))
        }
        "lastIndexOf" => {
            let target = args.first().cloned().unwrap_or(Value::Undefined);
            let found = data
                .borrow()
                .elements
                .iter()
                .rposition(|v| Value::equals_strict(v, &target));
            Ok(Value::Number(found.map(|i| i as f64).unwrap_or(-1.0)))
        }
        "includes" => {
            let target = args.first().cloned().unwrap_or(Value::Undefined);
            let found = data
                .borrow()
                .elements
                .iter()
                .any(|v| Value::equals_strict(v, &target));
            Ok(Value::Bool(found))
        }
        "join" => {
            let separator = match args.first() {
                Some(Value::Str(s)) => s.clone(),
                _ => ",".to_string(),
            };
            let joined = data
                .borrow()
                .elements
                .iter()
                .map(|v| {
                    if v.is_nullish() {
                        String::new()
                    } else {
                        helpers::to_template_string(v)
                    }
                })
                .collect::<Vec<_>>()
                .join(&separator);
            Ok(Value::Str(joined))
        }
        "concat" => {
            let mut out = data.borrow().elements.clone();
            for arg in args {
                match arg {
                    Value::Array(other) => out.extend(other.borrow().elements.iter().cloned()),
                    other => out.push(other),
                }
            }
            engine.charge_memory(out.len() as u64 * BYTES_PER_ARRAY_SLOT)?;
            Ok(Value::new_array(out))
        }
        "reverse" => {
            data.borrow_mut().elements.reverse();
            Ok(Value::Array(data.clone()))
        }
        "map" => {
            let callback = callback_arg(&args, "map")?;
            let snapshot = data.borrow().elements.clone();
            engine.charge_memory(snapshot.len() as u64 * BYTES_PER_ARRAY_SLOT)?;
            let mut out = Vec::with_capacity(snapshot.len());
            for (index, item) in snapshot.into_iter().enumerate() {
                out.push(calls::call_value_sync(
                    engine,
                    &callback,
                    vec![item, Value::Number(index as f64)],
                    None,
                )?);
            }
            Ok(Value::new_array(out))
        }
        "filter" => {
            let callback = callback_arg(&args, "filter")?;
            let snapshot = data.borrow().elements.clone();
            let mut out = Vec::new();
            for (index, item) in snapshot.into_iter().enumerate() {
                let keep = calls::call_value_sync(
                    engine,
                    &callback,
                    vec![item.clone(), Value::Number(index as f64)],
                    None,
                )?;
                if keep.is_truthy() {
                    out.push(item);
                }
            }
            engine.charge_memory(out.len() as u64 * BYTES_PER_ARRAY_SLOT)?;
            Ok(Value::new_array(out))
        }
        "forEach" => {
            let callback = callback_arg(&args, "forEach")?;
            let snapshot = data.borrow().elements.clone();
            for (index, item) in snapshot.into_iter().enumerate() {
                calls::call_value_sync(
                    engine,
                    &callback,
                    vec![item, Value::Number(index as f64)],
                    None,
                )?;
            }
            Ok(Value::Undefined)
        }
        "find" | "findIndex" => {
            let callback = callback_arg(&args, name)?;
            let snapshot = data.borrow().elements.clone();
            for (index, item) in snapshot.into_iter().enumerate() {
                let hit = calls::call_value_sync(
                    engine,
                    &callback,
                    vec![item.clone(), Value::Number(index as f64)],
                    None,
                )?;
                if hit.is_truthy() {
                    return Ok(if name == "find" {
                        item
                    } else {
                        Value::Number(index as f64)
                    });
                }
            }
            Ok(if name == "find" {
                Value::Undefined
            } else {
                Value::Number(-1.0)
            })
        }
        "reduce" => {
            let callback = callback_arg(&args, "reduce")?;
            let snapshot = data.borrow().elements.clone();
            let mut iter = snapshot.into_iter().enumerate();
            let mut acc = match args.get(1) {
                Some(seed) => seed.clone(),
                None => match iter.next() {
                    Some((_, first)) => first,
                    None => {
                        return Err(SandpawError::type_mismatch(
                            "reduce() of an empty array with no initial value",
                        ))
                    }
                },
            };
            for (index, item) in iter {
                acc = calls::call_value_sync(
                    engine,
                    &callback,
                    vec![acc, item, Value::Number(index as f64)],
                    None,
                )?;
            }
            Ok(acc)
        }
        "some" | "every" => {
            let callback = callback_arg(&args, name)?;
            let snapshot = data.borrow().elements.clone();
            for (index, item) in snapshot.into_iter().enumerate() {
                let hit = calls::call_value_sync(
                    engine,
                    &callback,
                    vec![item, Value::Number(index as f64)],
                    None,
                )?;
                match name {
                    "some" if hit.is_truthy() => return Ok(Value::Bool(true)),
                    "every" if !hit.is_truthy() => return Ok(Value::Bool(false)),
                    _ => {}
                }
            }
            Ok(Value::Bool(name == "every"))
        }
        "flat" => {
            let depth = arg_number(&args, 0).unwrap_or(1.0).max(0.0) as usize;
            let mut out = Vec::new();
            flatten(&data.borrow().elements, depth, &mut out);
            engine.charge_memory(out.len() as u64 * BYTES_PER_ARRAY_SLOT)?;
            Ok(Value::new_array(out))
        }
        "keys" => {
            let len = data.borrow().elements.len();
            Ok(Value::new_array(
                (0..len).map(|i| Value::Number(i as f64)).collect(),
            ))
        }
        "values" => Ok(Value::new_array(data.borrow().elements.clone())),
        "entries" => {
            let snapshot = data.borrow().elements.clone();
            Ok(Value::new_array(
                snapshot
                    .into_iter()
                    .enumerate()
                    .map(|(i, v)| Value::new_array(vec![Value::Number(i as f64), v]))
                    .collect(),
            ))
        }
        _ => Ok(Value::Undefined),
    }
}

fn is_mutating(name: &str) -> bool {
    matches!(
        name,
        "push" | "pop" | "shift" | "unshift" | "splice" | "reverse"
    )
}

fn callback_arg(args: &[Value], method: &str) -> Result<Value, SandpawError> {
    match args.first() {
        Some(value) if value.is_callable() => Ok(value.clone()),
        _ => Err(SandpawError::type_mismatch(format!(
            "{}() expects a callback function",
            method
        ))),
    }
}

fn arg_number(args: &[Value], index: usize) -> Option<f64> {
    match args.get(index) {
        Some(Value::Number(n)) => Some(*n),
        _ => None,
    }
}

/// Resolves a possibly negative index against a length, JS style.
fn clamp_index(raw: f64, len: usize) -> usize {
    if raw < 0.0 {
        len.saturating_sub((-raw) as usize)
    } else {
        (raw as usize).min(len)
    }
}

fn slice_bounds(args: &[Value], len: usize) -> (usize, usize) {
    let start = clamp_index(arg_number(args, 0).unwrap_or(0.0), len);
    let end = clamp_index(arg_number(args, 1).unwrap_or(len as f64), len);
    (start, end.max(start))
}

fn flatten(elements: &[Value], depth: usize, out: &mut Vec<Value>) {
    for element in elements {
        match element {
            Value::Array(inner) if depth > 0 => {
                flatten(&inner.borrow().elements.clone(), depth - 1, out)
            }
            other => out.push(other.clone()),
        }
    }
}
