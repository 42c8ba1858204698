/*
 * ==========================================================================
 * SANDPAW - Safe Claws for Untrusted Code!
 * ==========================================================================
 *
 * Shared Evaluation Helpers
 * -------------------------
 * Pure (or nearly pure) logic shared by the synchronous and the
 * asynchronous walker so the two stay semantically identical:
 *
 *  • Operator application and numeric coercions
 *  • Template-literal string coercion
 *  • Computed property-key coercion
 *  • The three-layer member-access gate, property reads and writes
 *  • The iteration protocol (arrays, strings, generators, objects
 *    implementing the iterator symbol, plain iterator objects)
 *  • Destructuring binds for declarations, parameters and catch
 *
 * --------------------------------------------------------------------------
 * Author:   Sam Wilcox
 * Email:    sam@pawx-lang.com
 * Website:  https://www.pawx-lang.com
 * Github:   https://github.com/samwilcox/sandpaw
 *
 * License:
 * This file is part of the SANDPAW sandboxed interpreter project.
 *
 * SANDPAW is dual-licensed under the terms of:
 *   - The MIT License
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

use std::cell::RefCell;
use std::rc::Rc;

use num_bigint::BigInt;

use crate::ast::{BinaryOp, Pattern, UnaryOp};
use crate::error::{ErrorKind, SandpawError};
use crate::interpreter::calls;
use crate::interpreter::classes;
use crate::interpreter::engine::EngineState;
use crate::interpreter::environment::{BindingKind, Environment};
use crate::interpreter::generators::{self, GeneratorData, ResumeMode};
use crate::prototypes;
use crate::security;
use crate::value::{format_number, PromiseState, Value};

/// Memory heuristic constants (documented as advisory).
pub const BYTES_PER_TEMPLATE_CHAR: u64 = 2;
pub const BYTES_PER_ARRAY_SLOT: u64 = 16;
pub const OBJECT_BASE_BYTES: u64 = 64;
pub const BYTES_PER_OBJECT_PROP: u64 = 32;

/* ============================================================================
 * Operator Application
 * ============================================================================
 */

/// Applies a binary operator to two evaluated operands. `in` and
/// `instanceof` need engine state and live in their own helpers below.
pub fn apply_binary(op: BinaryOp, left: Value, right: Value) -> Result<Value, SandpawError> {
    match op {
        BinaryOp::Add => apply_add(left, right),
        BinaryOp::Subtract => numeric_op(left, right, "-", |a, b| Ok(a - b), |a, b| Ok(a - b)),
        BinaryOp::Multiply => numeric_op(left, right, "*", |a, b| Ok(a * b), |a, b| Ok(a * b)),
        BinaryOp::Divide => match (&left, &right) {
            (_, Value::Number(d)) if *d == 0.0 => Err(SandpawError::new(
                ErrorKind::DivisionByZero,
                "division by zero",
            )),
            (_, Value::BigInt(d)) if **d == BigInt::from(0) => Err(SandpawError::new(
                ErrorKind::DivisionByZero,
                "division by zero",
            )),
            _ => numeric_op(left, right, "/", |a, b| Ok(a / b), |a, b| Ok(a / b)),
        },
        BinaryOp::Modulo => match (&left, &right) {
            (_, Value::Number(d)) if *d == 0.0 => Err(SandpawError::new(
                ErrorKind::ModuloByZero,
                "modulo by zero",
            )),
            (_, Value::BigInt(d)) if **d == BigInt::from(0) => Err(SandpawError::new(
                ErrorKind::ModuloByZero,
                "modulo by zero",
            )),
            _ => numeric_op(left, right, "%", |a, b| Ok(a % b), |a, b| Ok(a % b)),
        },
        BinaryOp::Exponent => numeric_op(
            left,
            right,
            "**",
            |a, b| Ok(a.powf(b)),
            |a, b| {
                u32::try_from(b.clone())
                    .map(|exp| a.pow(exp))
                    .map_err(|_| SandpawError::type_mismatch("bigint exponent out of range"))
            },
        ),

        BinaryOp::Equal => Ok(Value::Bool(Value::equals_loose(&left, &right))),
        BinaryOp::NotEqual => Ok(Value::Bool(!Value::equals_loose(&left, &right))),
        BinaryOp::StrictEqual => Ok(Value::Bool(Value::equals_strict(&left, &right))),
        BinaryOp::StrictNotEqual => Ok(Value::Bool(!Value::equals_strict(&left, &right))),

        BinaryOp::Less => compare(left, right, "<", |o| o == std::cmp::Ordering::Less),
        BinaryOp::LessEqual => compare(left, right, "<=", |o| o != std::cmp::Ordering::Greater),
        BinaryOp::Greater => compare(left, right, ">", |o| o == std::cmp::Ordering::Greater),
        BinaryOp::GreaterEqual => compare(left, right, ">=", |o| o != std::cmp::Ordering::Less),

        BinaryOp::BitAnd => bitwise(left, right, |a, b| a & b),
        BinaryOp::BitOr => bitwise(left, right, |a, b| a | b),
        BinaryOp::BitXor => bitwise(left, right, |a, b| a ^ b),
        BinaryOp::ShiftLeft => bitwise(left, right, |a, b| a.wrapping_shl(b as u32 & 31)),
        BinaryOp::ShiftRight => bitwise(left, right, |a, b| a.wrapping_shr(b as u32 & 31)),
        BinaryOp::ShiftRightUnsigned => {
            let a = to_int32(&left)? as u32;
            let b = to_int32(&right)? as u32;
            Ok(Value::Number(a.wrapping_shr(b & 31) as f64))
        }

        BinaryOp::In | BinaryOp::InstanceOf => unreachable!("handled by the walker"),
    }
}

fn apply_add(left: Value, right: Value) -> Result<Value, SandpawError> {
    match (&left, &right) {
        (Value::Number(a), Value::Number(b)) => Ok(Value::Number(a + b)),
        (Value::BigInt(a), Value::BigInt(b)) => {
            Ok(Value::BigInt(Rc::new(a.as_ref() + b.as_ref())))
        }
        (Value::Str(_), _) | (_, Value::Str(_)) => Ok(Value::Str(format!(
            "{}{}",
            to_template_string(&left),
            to_template_string(&right)
        ))),
        _ => Err(SandpawError::type_mismatch(format!(
            "cannot add {} and {}",
            left.type_name(),
            right.type_name()
        ))),
    }
}

fn numeric_op(
    left: Value,
    right: Value,
    op: &str,
    numbers: impl Fn(f64, f64) -> Result<f64, SandpawError>,
    bigints: impl Fn(&BigInt, &BigInt) -> Result<BigInt, SandpawError>,
) -> Result<Value, SandpawError> {
    match (&left, &right) {
        (Value::Number(a), Value::Number(b)) => Ok(Value::Number(numbers(*a, *b)?)),
        (Value::BigInt(a), Value::BigInt(b)) => {
            Ok(Value::BigInt(Rc::new(bigints(a.as_ref(), b.as_ref())?)))
        }
        _ => Err(SandpawError::type_mismatch(format!(
            "invalid operands for '{}': {} and {}",
            op,
            left.type_name(),
            right.type_name()
        ))),
    }
}

fn compare(
    left: Value,
    right: Value,
    op: &str,
    accept: impl Fn(std::cmp::Ordering) -> bool,
) -> Result<Value, SandpawError> {
    let ordering = match (&left, &right) {
        (Value::Number(a), Value::Number(b)) => a.partial_cmp(b),
        (Value::Str(a), Value::Str(b)) => Some(a.cmp(b)),
        (Value::BigInt(a), Value::BigInt(b)) => Some(a.cmp(b)),
        _ => {
            return Err(SandpawError::type_mismatch(format!(
                "invalid operands for '{}': {} and {}",
                op,
                left.type_name(),
                right.type_name()
            )))
        }
    };
    // NaN comparisons are always false.
    Ok(Value::Bool(ordering.map(&accept).unwrap_or(false)))
}

fn bitwise(left: Value, right: Value, f: impl Fn(i32, i32) -> i32) -> Result<Value, SandpawError> {
    Ok(Value::Number(f(to_int32(&left)?, to_int32(&right)?) as f64))
}

fn to_int32(value: &Value) -> Result<i32, SandpawError> {
    match value {
        Value::Number(n) if n.is_finite() => Ok(n.trunc() as i64 as i32),
        Value::Number(_) => Ok(0),
        _ => Err(SandpawError::type_mismatch(format!(
            "expected a number, got {}",
            value.type_name()
        ))),
    }
}

/// Applies a unary operator. `typeof` and `delete` read the environment
/// and are handled directly in the walkers.
pub fn apply_unary(op: UnaryOp, operand: Value) -> Result<Value, SandpawError> {
    match op {
        UnaryOp::Minus => match operand {
            Value::Number(n) => Ok(Value::Number(-n)),
            Value::BigInt(b) => Ok(Value::BigInt(Rc::new(-b.as_ref().clone()))),
            other => Err(SandpawError::type_mismatch(format!(
                "cannot negate {}",
                other.type_name()
            ))),
        },
        UnaryOp::Plus => match operand {
            Value::Number(n) => Ok(Value::Number(n)),
            Value::Str(s) => Ok(Value::Number(s.trim().parse::<f64>().unwrap_or(f64::NAN))),
            Value::Bool(b) => Ok(Value::Number(if b { 1.0 } else { 0.0 })),
            Value::Null => Ok(Value::Number(0.0)),
            Value::Undefined => Ok(Value::Number(f64::NAN)),
            other => Err(SandpawError::type_mismatch(format!(
                "cannot coerce {} to a number",
                other.type_name()
            ))),
        },
        UnaryOp::Not => Ok(Value::Bool(!operand.is_truthy())),
        UnaryOp::BitNot => Ok(Value::Number(!to_int32(&operand)? as f64)),
        UnaryOp::Void => Ok(Value::Undefined),
        UnaryOp::TypeOf | UnaryOp::Delete => unreachable!("handled by the walker"),
    }
}

/* ============================================================================
 * String & Key Coercion
 * ============================================================================
 */

/// The template-literal coercion: explicit rules, never invoking a
/// guest-defined `toString`/`valueOf`. Arrays join element-wise with
/// commas, holes and nullish elements render empty, plain objects render
/// as `[object Object]`, callables as `[object Function]`.
pub fn to_template_string(value: &Value) -> String {
    match value {
        Value::Undefined => "undefined".to_string(),
        Value::Null => "null".to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => format_number(*n),
        Value::BigInt(b) => b.to_string(),
        Value::Str(s) => s.clone(),
        Value::Symbol(s) => format!("Symbol({})", s.description),
        Value::Array(data) => data
            .borrow()
            .elements
            .iter()
            .map(|v| {
                if v.is_nullish() {
                    String::new()
                } else {
                    to_template_string(v)
                }
            })
            .collect::<Vec<_>>()
            .join(","),
        Value::Object(_) => "[object Object]".to_string(),
        Value::Function(_) | Value::HostFunction(_) | Value::Class(_) => {
            "[object Function]".to_string()
        }
        Value::Generator(_) => "[object Generator]".to_string(),
        Value::AsyncGenerator(_) => "[object AsyncGenerator]".to_string(),
        Value::Promise(_) => "[object Promise]".to_string(),
        Value::Regex(r) => format!("/{}/{}", r.source, r.flags),
    }
}

/// Coerces a computed-access key to the property-map key string.
/// Symbols map to their reserved `@@` key.
pub fn to_property_key(value: &Value) -> String {
    match value {
        Value::Symbol(s) => s.key.clone(),
        other => to_template_string(other),
    }
}

/* ============================================================================
 * Member Access Gate
 * ============================================================================
 */

/// Layer-one validation of a property key against the dangerous tables.
///
/// Prototypeless guest bags skip everything except the forced names;
/// every other target takes the full check. Symbol keys (reserved `@@`
/// form) are validated against the symbol table.
pub fn check_property_key(key: &str, target_is_bag: bool) -> Result<(), SandpawError> {
    if key.starts_with("@@") {
        if security::is_dangerous_symbol_key(key) {
            log::warn!("blocked forbidden symbol access: {}", key);
            return Err(SandpawError::new(
                ErrorKind::SymbolForbidden,
                format!("symbol '{}' may not be used here", key),
            ));
        }
        return Ok(());
    }

    let blocked = if target_is_bag {
        security::is_forced_name(key)
    } else {
        security::is_dangerous_property(key)
    };
    if blocked {
        log::warn!("blocked forbidden property access: {}", key);
        return Err(SandpawError::new(
            ErrorKind::PropertyNameForbidden,
            format!("access to property '{}' is forbidden", key),
        ));
    }
    Ok(())
}

fn is_bag(target: &Value) -> bool {
    match target {
        Value::Object(data) => !data.borrow().host,
        _ => false,
    }
}

/// Reads `target[key]`, running all three validation layers, getter
/// dispatch and the built-in method surfaces.
pub fn member_get(
    engine: &Rc<EngineState>,
    target: &Value,
    key: &str,
) -> Result<Value, SandpawError> {
    check_property_key(key, is_bag(target))?;

    match target {
        Value::Undefined | Value::Null => Err(SandpawError::type_mismatch(format!(
            "cannot read property '{}' of {}",
            key,
            target.stringify()
        ))),

        Value::Object(data) => {
            // Class instances dispatch through their class first. The
            // registry borrow must end before the dispatch: a getter
            // may construct new instances.
            let class = engine.instances.borrow().class_of(target);
            if let Some(class) = class {
                return classes::instance_get(engine, &class, target, key);
            }

            let object = data.borrow();
            if let Some(value) = object.props.get(key) {
                return Ok(value.clone());
            }
            if object.host {
                // Host objects still carry a prototype on the host side:
                // reads of non-own properties are denied, except the
                // thenable probe and the iterator symbols.
                if key == "then" || key == "@@iterator" || key == "@@asyncIterator" {
                    return Ok(Value::Undefined);
                }
                return Err(SandpawError::new(
                    ErrorKind::InheritedAccessDenied,
                    format!("property '{}' is not an own property", key),
                ));
            }
            Ok(Value::Undefined)
        }

        Value::Array(data) => {
            if key == "length" {
                return Ok(Value::Number(data.borrow().elements.len() as f64));
            }
            if key == "raw" {
                if let Some(raw) = data.borrow().raw.clone() {
                    return Ok(raw);
                }
            }
            if let Ok(index) = key.parse::<usize>() {
                return Ok(data
                    .borrow()
                    .elements
                    .get(index)
                    .cloned()
                    .unwrap_or(Value::Undefined));
            }
            prototypes::array::method(engine, target, key)
        }

        Value::Str(s) => {
            if key == "length" {
                return Ok(Value::Number(s.chars().count() as f64));
            }
            if let Ok(index) = key.parse::<usize>() {
                return Ok(s
                    .chars()
                    .nth(index)
                    .map(|c| Value::Str(c.to_string()))
                    .unwrap_or(Value::Undefined));
            }
            prototypes::string::method(s, key)
        }

        Value::Generator(data) => generator_method(engine, data, key, false),
        Value::AsyncGenerator(data) => generator_method(engine, data, key, true),

        Value::Promise(data) => prototypes::globals::promise_method(engine, data, key),

        Value::Regex(data) => prototypes::regex::method(data, key),

        Value::Class(class) => classes::static_get(engine, class, key),

        Value::HostFunction(host) => {
            // The thenable probe must come back undefined so accidental
            // awaits do not stall.
            if key == "then" {
                return Ok(Value::Undefined);
            }
            if key == "name" {
                return Ok(Value::Str(host.name.clone()));
            }
            let member = host.props.borrow().get(key).cloned();
            match member {
                Some(Value::HostFunction(sub)) => Ok(sub.bind_receiver(target.clone())),
                Some(other) => Ok(security::wrap_host_value(other)),
                None => Ok(Value::Undefined),
            }
        }

        Value::Function(func) => match key {
            "name" => Ok(func
                .name
                .borrow()
                .as_ref()
                .map(|n| Value::Str(n.clone()))
                .unwrap_or(Value::Undefined)),
            "length" => Ok(Value::Number(
                func.node.params.iter().filter(|p| !p.rest && p.default.is_none()).count() as f64,
            )),
            _ => Ok(Value::Undefined),
        },

        // Remaining primitives have no readable surface.
        _ => Ok(Value::Undefined),
    }
}

fn generator_method(
    engine: &Rc<EngineState>,
    data: &Rc<RefCell<GeneratorData>>,
    key: &str,
    is_async: bool,
) -> Result<Value, SandpawError> {
    let ptr = Rc::as_ptr(data) as usize;
    let method: &'static str = match key {
        "next" => "next",
        "return" => "return",
        "throw" => "throw",
        "@@iterator" => {
            // A generator is its own iterator.
            return Ok(if is_async {
                Value::AsyncGenerator(data.clone())
            } else {
                Value::Generator(data.clone())
            });
        }
        "@@asyncIterator" if is_async => {
            return Ok(Value::AsyncGenerator(data.clone()));
        }
        _ => return Ok(Value::Undefined),
    };

    Ok(engine.cached_method(ptr, method, || {
        generators::bound_driver_method(engine.clone(), data.clone(), method, is_async)
    }))
}

/// Writes `target[key] = value` through the same gates, dispatching to
/// class setters where they exist.
pub fn member_set(
    engine: &Rc<EngineState>,
    target: &Value,
    key: &str,
    value: Value,
) -> Result<Value, SandpawError> {
    check_property_key(key, is_bag(target))?;

    match target {
        Value::Undefined | Value::Null => Err(SandpawError::type_mismatch(format!(
            "cannot set property '{}' of {}",
            key,
            target.stringify()
        ))),

        Value::Object(data) => {
            let class = engine.instances.borrow().class_of(target);
            if let Some(class) = class {
                return classes::instance_set(engine, &class, target, key, value);
            }
            let mut object = data.borrow_mut();
            if object.readonly {
                return Err(SandpawError::type_mismatch(format!(
                    "cannot assign '{}' on a read-only host object",
                    key
                )));
            }
            engine.charge_memory(BYTES_PER_OBJECT_PROP)?;
            object.props.insert(key.to_string(), value.clone());
            Ok(value)
        }

        Value::Array(data) => {
            let mut array = data.borrow_mut();
            if array.readonly {
                return Err(SandpawError::type_mismatch(
                    "cannot assign into a read-only host array",
                ));
            }
            if key == "length" {
                let new_len = match value {
                    Value::Number(n) if n >= 0.0 && n.fract() == 0.0 => n as usize,
                    _ => {
                        return Err(SandpawError::type_mismatch("invalid array length"));
                    }
                };
                array.elements.resize(new_len, Value::Undefined);
                return Ok(Value::Number(new_len as f64));
            }
            let index = key.parse::<usize>().map_err(|_| {
                SandpawError::type_mismatch(format!("invalid array index '{}'", key))
            })?;
            if index >= array.elements.len() {
                let grow = (index + 1 - array.elements.len()) as u64;
                engine.charge_memory(grow * BYTES_PER_ARRAY_SLOT)?;
                array.elements.resize(index + 1, Value::Undefined);
            }
            array.elements[index] = value.clone();
            Ok(value)
        }

        Value::Class(class) => classes::static_set(engine, class, key, value),

        Value::HostFunction(_) => Err(SandpawError::new(
            ErrorKind::PropertyNameForbidden,
            format!("cannot assign '{}' on a host function", key),
        )),

        other => Err(SandpawError::type_mismatch(format!(
            "cannot assign property '{}' on {}",
            key,
            other.type_name()
        ))),
    }
}

/// The `in` operator: validates the key, then tests own membership.
pub fn apply_in(
    engine: &Rc<EngineState>,
    key: Value,
    target: &Value,
) -> Result<Value, SandpawError> {
    let key = to_property_key(&key);
    check_property_key(&key, is_bag(target))?;

    match target {
        Value::Object(data) => {
            if data.borrow().props.contains_key(&key) {
                return Ok(Value::Bool(true));
            }
            let class = engine.instances.borrow().class_of(target);
            if let Some(class) = class {
                return Ok(Value::Bool(classes::class_has_member(&class, &key)));
            }
            Ok(Value::Bool(false))
        }
        Value::Array(data) => {
            let in_range = key
                .parse::<usize>()
                .map(|i| i < data.borrow().elements.len())
                .unwrap_or(key == "length");
            Ok(Value::Bool(in_range))
        }
        Value::Class(class) => Ok(Value::Bool(classes::class_has_static(class, &key))),
        _ => Err(SandpawError::type_mismatch(format!(
            "'in' requires an object, got {}",
            target.type_name()
        ))),
    }
}

/// The `instanceof` operator. Guest classes walk the recorded
/// instance → class map and then the parent chain; guest functions used
/// as bare constructors are not tracked and report `false`; host
/// functions report `false` as well.
pub fn apply_instanceof(
    engine: &Rc<EngineState>,
    value: &Value,
    target: &Value,
) -> Result<Value, SandpawError> {
    match target {
        Value::Class(class) => {
            let mut current = engine.instances.borrow().class_of(value);
            while let Some(c) = current {
                if Rc::ptr_eq(&c, class) {
                    return Ok(Value::Bool(true));
                }
                current = c.parent.clone();
            }
            Ok(Value::Bool(false))
        }
        Value::Function(_) | Value::HostFunction(_) => Ok(Value::Bool(false)),
        other => Err(SandpawError::type_mismatch(format!(
            "right-hand side of 'instanceof' is not callable: {}",
            other.type_name()
        ))),
    }
}

/* ============================================================================
 * Iteration Protocol
 * ============================================================================
 */

/// A live iteration over a guest value, as used by `for…of`, spread and
/// array destructuring.
pub enum GuestIterator {
    Array {
        data: Rc<RefCell<crate::value::ArrayData>>,
        index: usize,
    },
    Chars { chars: Vec<char>, index: usize },
    Generator {
        data: Rc<RefCell<GeneratorData>>,
        is_async: bool,
    },
    /// An object speaking the iterator protocol (or a plain iterator
    /// with a callable `next`).
    Protocol { iterator: Value },
}

impl GuestIterator {
    /// Obtains an iterator for the synchronous protocol.
    pub fn open(engine: &Rc<EngineState>, value: &Value) -> Result<Self, SandpawError> {
        match value {
            Value::Array(data) => Ok(GuestIterator::Array {
                data: data.clone(),
                index: 0,
            }),
            Value::Str(s) => Ok(GuestIterator::Chars {
                chars: s.chars().collect(),
                index: 0,
            }),
            Value::Generator(data) => Ok(GuestIterator::Generator {
                data: data.clone(),
                is_async: false,
            }),
            Value::Object(_) => Self::open_protocol(engine, value, "@@iterator"),
            other => Err(SandpawError::new(
                ErrorKind::ForOfTarget,
                format!("{} is not iterable", other.type_name()),
            )),
        }
    }

    /// Obtains an iterator for `for await…of`: prefers the async
    /// protocol, falls back to the sync one.
    pub fn open_async(engine: &Rc<EngineState>, value: &Value) -> Result<Self, SandpawError> {
        match value {
            Value::AsyncGenerator(data) => Ok(GuestIterator::Generator {
                data: data.clone(),
                is_async: true,
            }),
            Value::Object(_) => Self::open_protocol(engine, value, "@@asyncIterator")
                .or_else(|_| Self::open(engine, value)),
            _ => Self::open(engine, value),
        }
    }

    fn open_protocol(
        engine: &Rc<EngineState>,
        value: &Value,
        symbol_key: &str,
    ) -> Result<Self, SandpawError> {
        // An object with a callable `next` is already an iterator.
        let next = member_get(engine, value, "next")?;
        if next.is_callable() {
            return Ok(GuestIterator::Protocol {
                iterator: value.clone(),
            });
        }

        let factory = member_get(engine, value, symbol_key)?;
        if factory.is_callable() {
            let iterator = calls::call_value_sync(engine, &factory, vec![], Some(value.clone()))?;
            return Ok(GuestIterator::Protocol { iterator });
        }

        Err(SandpawError::new(
            ErrorKind::ForOfTarget,
            "object does not implement the iteration protocol",
        ))
    }

    /// Advances the iterator; `None` means exhausted. Asynchronous
    /// generators are rejected here and must go through `next_async`.
    pub fn next(&mut self, engine: &Rc<EngineState>) -> Result<Option<Value>, SandpawError> {
        match self {
            GuestIterator::Array { data, index } => {
                let elements = &data.borrow().elements;
                if *index < elements.len() {
                    let value = elements[*index].clone();
                    *index += 1;
                    Ok(Some(value))
                } else {
                    Ok(None)
                }
            }
            GuestIterator::Chars { chars, index } => {
                if *index < chars.len() {
                    let value = Value::Str(chars[*index].to_string());
                    *index += 1;
                    Ok(Some(value))
                } else {
                    Ok(None)
                }
            }
            GuestIterator::Generator { data, is_async } => {
                if *is_async {
                    return Err(SandpawError::new(
                        ErrorKind::AsyncInSync,
                        "async generators require 'for await…of'",
                    ));
                }
                let step =
                    generators::resume_sync(engine, data, ResumeMode::Next(Value::Undefined))?;
                if step.done {
                    Ok(None)
                } else {
                    Ok(Some(step.value))
                }
            }
            GuestIterator::Protocol { iterator } => {
                let next = member_get(engine, iterator, "next")?;
                let step =
                    calls::call_value_sync(engine, &next, vec![], Some(iterator.clone()))?;
                protocol_step(engine, &step)
            }
        }
    }

    /// The async flavour of [`GuestIterator::next`]. Generators of both
    /// flavours go through the async driver here, so a body may await
    /// host futures between yields.
    pub async fn next_async(
        &mut self,
        engine: &Rc<EngineState>,
    ) -> Result<Option<Value>, SandpawError> {
        match self {
            GuestIterator::Generator { data, .. } => {
                let step =
                    generators::resume_async(engine, data, ResumeMode::Next(Value::Undefined))
                        .await?;
                if step.done {
                    Ok(None)
                } else {
                    Ok(Some(step.value))
                }
            }
            other => other.next(engine),
        }
    }

    /// Invoked on early exit (break / return / throw): closes iterators
    /// that expose a close method.
    pub fn close(&mut self, engine: &Rc<EngineState>) {
        match self {
            GuestIterator::Generator { data, is_async } if !*is_async => {
                let _ = generators::resume_sync(
                    engine,
                    data,
                    ResumeMode::Return(Value::Undefined),
                );
            }
            GuestIterator::Protocol { iterator } => {
                if let Ok(ret) = member_get(engine, iterator, "return") {
                    if ret.is_callable() {
                        let _ = calls::call_value_sync(
                            engine,
                            &ret,
                            vec![],
                            Some(iterator.clone()),
                        );
                    }
                }
            }
            _ => {}
        }
    }

    /// Async close; only async generators differ from the sync path.
    pub async fn close_async(&mut self, engine: &Rc<EngineState>) {
        if let GuestIterator::Generator { data, is_async } = self {
            if *is_async {
                let _ = generators::resume_async(
                    engine,
                    data,
                    ResumeMode::Return(Value::Undefined),
                )
                .await;
                return;
            }
        }
        self.close(engine);
    }
}

fn protocol_step(
    engine: &Rc<EngineState>,
    step: &Value,
) -> Result<Option<Value>, SandpawError> {
    let done = member_get(engine, step, "done")?;
    if done.is_truthy() {
        Ok(None)
    } else {
        Ok(Some(member_get(engine, step, "value")?))
    }
}

/// Collects every remaining element of an iterable; spread and rest use
/// this.
pub fn collect_iterable(
    engine: &Rc<EngineState>,
    value: &Value,
) -> Result<Vec<Value>, SandpawError> {
    let mut iter = GuestIterator::open(engine, value).map_err(|mut err| {
        err.kind = ErrorKind::SpreadTarget;
        err
    })?;
    let mut out = Vec::new();
    while let Some(item) = iter.next(engine)? {
        out.push(item);
    }
    Ok(out)
}

/* ============================================================================
 * Destructuring
 * ============================================================================
 */

/// How a destructured name is introduced.
#[derive(Clone, Copy)]
pub enum BindMode {
    Declare(BindingKind),
    Assign,
}

/// Binds a pattern against a value. Defaults run on the synchronous
/// walker; `await` has no place inside a pattern initialiser.
pub fn bind_pattern(
    engine: &Rc<EngineState>,
    env: &Rc<RefCell<Environment>>,
    pattern: &Pattern,
    value: Value,
    mode: BindMode,
) -> Result<(), SandpawError> {
    match pattern {
        Pattern::Identifier { name } => match mode {
            BindMode::Declare(kind) => Environment::declare(env, name, value, kind),
            BindMode::Assign => Environment::set(env, name, value),
        },

        Pattern::Array { elements } => {
            let items = collect_iterable(engine, &value).map_err(|_| {
                SandpawError::type_mismatch(format!(
                    "cannot destructure {} as an array",
                    value.type_name()
                ))
            })?;
            let mut cursor = 0usize;
            for slot in elements {
                let Some(element) = slot else {
                    cursor += 1;
                    continue;
                };
                if element.rest {
                    let rest: Vec<Value> = items.iter().skip(cursor).cloned().collect();
                    bind_pattern(engine, env, &element.pattern, Value::new_array(rest), mode)?;
                    break;
                }
                let mut item = items.get(cursor).cloned().unwrap_or(Value::Undefined);
                if matches!(item, Value::Undefined) {
                    if let Some(default) = &element.default {
                        item = crate::interpreter::expressions::eval_expr(default, env, engine)?;
                    }
                }
                bind_pattern(engine, env, &element.pattern, item, mode)?;
                cursor += 1;
            }
            Ok(())
        }

        Pattern::Object { properties, rest } => {
            if value.is_nullish() {
                return Err(SandpawError::type_mismatch(format!(
                    "cannot destructure {}",
                    value.stringify()
                )));
            }
            let mut consumed: Vec<&str> = Vec::new();
            for prop in properties {
                let mut item = member_get(engine, &value, &prop.key)?;
                if matches!(item, Value::Undefined) {
                    if let Some(default) = &prop.default {
                        item = crate::interpreter::expressions::eval_expr(default, env, engine)?;
                    }
                }
                bind_pattern(engine, env, &prop.value, item, mode)?;
                consumed.push(prop.key.as_str());
            }
            if let Some(rest_name) = rest {
                let rest_value = object_rest(engine, &value, &consumed)?;
                match mode {
                    BindMode::Declare(kind) => {
                        Environment::declare(env, rest_name, rest_value, kind)?
                    }
                    BindMode::Assign => Environment::set(env, rest_name, rest_value)?,
                }
            }
            Ok(())
        }
    }
}

/// Builds the `...rest` object of an object pattern: the remaining own
/// enumerable string-keyed properties, each key re-validated.
fn object_rest(
    engine: &Rc<EngineState>,
    value: &Value,
    consumed: &[&str],
) -> Result<Value, SandpawError> {
    let Value::Object(data) = value else {
        return Ok(Value::new_object());
    };
    engine.charge_memory(OBJECT_BASE_BYTES)?;
    let out = Value::new_object();
    let keys: Vec<String> = data
        .borrow()
        .props
        .keys()
        .filter(|k| !k.starts_with("@@") && !consumed.contains(&k.as_str()))
        .cloned()
        .collect();
    for key in keys {
        check_property_key(&key, is_bag(value))?;
        let member = data.borrow().props.get(&key).cloned().unwrap_or(Value::Undefined);
        member_set(engine, &out, &key, member)?;
    }
    Ok(out)
}

/* ============================================================================
 * Promise Unwrapping
 * ============================================================================
 */

/// Resolves an awaited value: promises unwrap (rethrowing rejections),
/// everything else passes through.
pub fn settle_awaited(value: Value) -> Result<Value, SandpawError> {
    match value {
        Value::Promise(data) => match &data.borrow().state {
            PromiseState::Fulfilled(v) => Ok(v.clone()),
            PromiseState::Rejected(err) => Err(err.clone()),
        },
        other => Ok(other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn add_is_dual_purpose() {
        let n = apply_binary(BinaryOp::Add, Value::Number(2.0), Value::Number(3.0)).unwrap();
        assert!(matches!(n, Value::Number(x) if x == 5.0));

        let s = apply_binary(
            BinaryOp::Add,
            Value::Str("paw".to_string()),
            Value::Number(1.0),
        )
        .unwrap();
        assert!(matches!(s, Value::Str(x) if x == "paw1"));
    }

    #[test]
    fn division_by_zero_is_an_error() {
        let err =
            apply_binary(BinaryOp::Divide, Value::Number(1.0), Value::Number(0.0)).unwrap_err();
        assert_eq!(err.kind, ErrorKind::DivisionByZero);

        let err =
            apply_binary(BinaryOp::Modulo, Value::Number(1.0), Value::Number(0.0)).unwrap_err();
        assert_eq!(err.kind, ErrorKind::ModuloByZero);
    }

    #[test]
    fn template_coercion_follows_the_documented_rules() {
        let arr = Value::new_array(vec![
            Value::Number(1.0),
            Value::Null,
            Value::Str("x".to_string()),
        ]);
        assert_eq!(to_template_string(&arr), "1,,x");
        assert_eq!(to_template_string(&Value::new_object()), "[object Object]");
    }

    #[test]
    fn dangerous_keys_fail_closed() {
        assert!(check_property_key("__proto__", true).is_err());
        assert!(check_property_key("apply", false).is_err());
        assert!(check_property_key("apply", true).is_ok());
        assert!(check_property_key("@@toPrimitive", false).is_err());
        assert!(check_property_key("@@iterator", false).is_ok());
    }
}
