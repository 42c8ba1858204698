/*
 * ==========================================================================
 * SANDPAW - Safe Claws for Untrusted Code!
 * ==========================================================================
 *
 * Synchronous Expression Walker
 * -----------------------------
 * Evaluates every expression node for the synchronous evaluator. The
 * asynchronous twin is `async_expressions.rs` and must stay
 * handler-for-handler in sync with this file; shared semantics live in
 * `helpers.rs`.
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

use crate::ast::{
    Argument, ArrayElement, BinaryOp, Expr, LogicalOp, MemberKey, ObjectProperty, PropertyKey,
    TemplatePart, UnaryOp, UpdateOp,
};
use crate::error::{ErrorKind, SandpawError};
use crate::interpreter::calls;
use crate::interpreter::classes;
use crate::interpreter::engine::EngineState;
use crate::interpreter::environment::Environment;
use crate::interpreter::features::FeatureTag;
use crate::interpreter::helpers::{self, BYTES_PER_ARRAY_SLOT, BYTES_PER_OBJECT_PROP, BYTES_PER_TEMPLATE_CHAR, OBJECT_BASE_BYTES};
use crate::prototypes;
use crate::value::{FunctionData, Value};

fn short_circuit() -> SandpawError {
    SandpawError::new(ErrorKind::OptionalShortCircuit, "optional chain short-circuit")
}

/// Evaluates a single expression and returns its runtime value.
///
/// This is the core expression dispatcher of the synchronous evaluator;
/// every guest expression eventually passes through here.
pub fn eval_expr(
    expr: &Expr,
    env: &Rc<RefCell<Environment>>,
    engine: &Rc<EngineState>,
) -> Result<Value, SandpawError> {
    engine.record_node(expr.span())?;

    match expr {
        /* ------------------------------------------------------------------
         * Literals
         * ---------------------------------------------------------------- */
        Expr::Number { value, .. } => Ok(Value::Number(*value)),
        Expr::Str { value, .. } => Ok(Value::Str(value.clone())),
        Expr::Bool { value, .. } => Ok(Value::Bool(*value)),
        Expr::Null { .. } => Ok(Value::Null),
        Expr::Undefined { .. } => Ok(Value::Undefined),
        Expr::BigInt { value, .. } => {
            engine.check_feature(FeatureTag::BigIntLiterals)?;
            Ok(Value::BigInt(Rc::new(value.clone())))
        }
        Expr::Regex { pattern, flags, .. } => {
            engine.check_feature(FeatureTag::RegexLiterals)?;
            prototypes::regex::compile(pattern, flags)
        }

        /* ------------------------------------------------------------------
         * Names
         * ---------------------------------------------------------------- */
        Expr::Identifier { name, .. } => Environment::get(env, name),
        Expr::This { .. } => Environment::this_value(env),

        /* ------------------------------------------------------------------
         * Templates
         * ---------------------------------------------------------------- */
        Expr::Template { parts, .. } => {
            engine.check_feature(FeatureTag::TemplateLiterals)?;
            let mut out = String::new();
            for part in parts {
                match part {
                    TemplatePart::Str(s) => out.push_str(s),
                    TemplatePart::Expr(expr) => {
                        let value = eval_expr(expr, env, engine)?;
                        out.push_str(&helpers::to_template_string(&value));
                    }
                }
            }
            engine.charge_memory(out.chars().count() as u64 * BYTES_PER_TEMPLATE_CHAR)?;
            Ok(Value::Str(out))
        }

        Expr::TaggedTemplate {
            tag,
            cooked,
            raw,
            exprs,
            ..
        } => {
            engine.check_feature(FeatureTag::TaggedTemplates)?;
            let tag_value = eval_expr(tag, env, engine)?;
            let strings = tagged_strings(cooked, raw);
            let mut args = vec![strings];
            for expr in exprs {
                args.push(eval_expr(expr, env, engine)?);
            }
            calls::call_value_sync(engine, &tag_value, args, None)
        }

        /* ------------------------------------------------------------------
         * Array & Object Literals
         * ---------------------------------------------------------------- */
        Expr::Array { elements, .. } => {
            let mut values = Vec::new();
            for element in elements {
                match element {
                    ArrayElement::Item(expr) => values.push(eval_expr(expr, env, engine)?),
                    ArrayElement::Hole => values.push(Value::Undefined),
                    ArrayElement::Spread(expr) => {
                        engine.check_feature(FeatureTag::Spread)?;
                        let spread = eval_expr(expr, env, engine)?;
                        values.extend(helpers::collect_iterable(engine, &spread)?);
                    }
                }
            }
            engine.charge_memory(values.len() as u64 * BYTES_PER_ARRAY_SLOT)?;
            Ok(Value::new_array(values))
        }

        Expr::Object { properties, .. } => {
            let object = Value::new_object();
            engine.charge_memory(
                OBJECT_BASE_BYTES + properties.len() as u64 * BYTES_PER_OBJECT_PROP,
            )?;
            for property in properties {
                match property {
                    ObjectProperty::KeyValue { key, value } => {
                        let key = eval_property_key(key, env, engine)?;
                        let value = eval_expr(value, env, engine)?;
                        helpers::member_set(engine, &object, &key, value)?;
                    }
                    ObjectProperty::Shorthand { name, .. } => {
                        let value = Environment::get(env, name)?;
                        helpers::member_set(engine, &object, name, value)?;
                    }
                    ObjectProperty::Method { key, func } => {
                        let key = eval_property_key(key, env, engine)?;
                        let method =
                            Value::Function(Rc::new(FunctionData::new(func.clone(), env.clone())));
                        helpers::member_set(engine, &object, &key, method)?;
                    }
                    ObjectProperty::Spread { argument } => {
                        engine.check_feature(FeatureTag::Spread)?;
                        let source = eval_expr(argument, env, engine)?;
                        spread_into_object(engine, &object, &source)?;
                    }
                }
            }
            Ok(object)
        }

        /* ------------------------------------------------------------------
         * Operators
         * ---------------------------------------------------------------- */
        Expr::Unary { op, operand, .. } => match op {
            UnaryOp::TypeOf => {
                engine.check_feature(FeatureTag::TypeOf)?;
                // `typeof unresolved` answers "undefined" instead of
                // raising.
                if let Expr::Identifier { name, .. } = operand.as_ref() {
                    return Ok(Value::Str(
                        Environment::try_get(env, name)
                            .map(|v| v.typeof_str())
                            .unwrap_or("undefined")
                            .to_string(),
                    ));
                }
                let value = eval_expr(operand, env, engine)?;
                Ok(Value::Str(value.typeof_str().to_string()))
            }
            UnaryOp::Delete => eval_delete(operand, env, engine),
            _ => {
                let value = eval_expr(operand, env, engine)?;
                helpers::apply_unary(*op, value)
            }
        },

        Expr::Update {
            op,
            prefix,
            target,
            ..
        } => {
            engine.check_feature(FeatureTag::UpdateExpressions)?;
            eval_update(*op, *prefix, target, env, engine)
        }

        Expr::Binary {
            op, left, right, ..
        } => match op {
            BinaryOp::In => {
                let key = eval_expr(left, env, engine)?;
                let target = eval_expr(right, env, engine)?;
                helpers::apply_in(engine, key, &target)
            }
            BinaryOp::InstanceOf => {
                let value = eval_expr(left, env, engine)?;
                let target = eval_expr(right, env, engine)?;
                helpers::apply_instanceof(engine, &value, &target)
            }
            BinaryOp::Exponent => {
                engine.check_feature(FeatureTag::Exponentiation)?;
                let left = eval_expr(left, env, engine)?;
                let right = eval_expr(right, env, engine)?;
                helpers::apply_binary(*op, left, right)
            }
            _ => {
                let left = eval_expr(left, env, engine)?;
                let right = eval_expr(right, env, engine)?;
                helpers::apply_binary(*op, left, right)
            }
        },

        Expr::Logical {
            op, left, right, ..
        } => {
            let left_value = eval_expr(left, env, engine)?;
            match op {
                LogicalOp::And => {
                    if left_value.is_truthy() {
                        eval_expr(right, env, engine)
                    } else {
                        Ok(left_value)
                    }
                }
                LogicalOp::Or => {
                    if left_value.is_truthy() {
                        Ok(left_value)
                    } else {
                        eval_expr(right, env, engine)
                    }
                }
                LogicalOp::Nullish => {
                    engine.check_feature(FeatureTag::NullishCoalescing)?;
                    if left_value.is_nullish() {
                        eval_expr(right, env, engine)
                    } else {
                        Ok(left_value)
                    }
                }
            }
        }

        Expr::Conditional {
            test,
            consequent,
            alternate,
            ..
        } => {
            engine.check_feature(FeatureTag::Conditional)?;
            if eval_expr(test, env, engine)?.is_truthy() {
                eval_expr(consequent, env, engine)
            } else {
                eval_expr(alternate, env, engine)
            }
        }

        Expr::Sequence { exprs, .. } => {
            engine.check_feature(FeatureTag::SequenceExpressions)?;
            let mut result = Value::Undefined;
            for expr in exprs {
                result = eval_expr(expr, env, engine)?;
            }
            Ok(result)
        }

        /* ------------------------------------------------------------------
         * Assignment
         * ---------------------------------------------------------------- */
        Expr::Assign {
            op,
            logical,
            target,
            value,
            ..
        } => eval_assign(op, logical, target, value, env, engine),

        /* ------------------------------------------------------------------
         * Member Access & Chains
         * ---------------------------------------------------------------- */
        Expr::Member {
            object,
            property,
            optional,
            ..
        } => {
            let target = eval_expr(object, env, engine)?;
            if *optional {
                engine.check_feature(FeatureTag::OptionalChaining)?;
                if target.is_nullish() {
                    return Err(short_circuit());
                }
            }
            eval_member_read(engine, env, &target, property)
        }

        Expr::Chain { expr, .. } => {
            engine.check_feature(FeatureTag::OptionalChaining)?;
            match eval_expr(expr, env, engine) {
                Err(err) if err.kind == ErrorKind::OptionalShortCircuit => Ok(Value::Undefined),
                other => other,
            }
        }

        /* ------------------------------------------------------------------
         * Calls & Construction
         * ---------------------------------------------------------------- */
        Expr::Call {
            callee,
            args,
            optional,
            ..
        } => {
            // Member callees carry their receiver into the call.
            let (callable, this) = match callee.as_ref() {
                Expr::Member {
                    object,
                    property,
                    optional: member_optional,
                    ..
                } => {
                    let target = eval_expr(object, env, engine)?;
                    if *member_optional {
                        engine.check_feature(FeatureTag::OptionalChaining)?;
                        if target.is_nullish() {
                            return Err(short_circuit());
                        }
                    }
                    let method = eval_member_read(engine, env, &target, property)?;
                    (method, Some(target))
                }
                Expr::SuperMember { property, .. } => {
                    let key = property_key_of(engine, env, property)?;
                    let method = classes::super_get(engine, env, &key)?;
                    let this = Environment::this_value(env)?;
                    (method, Some(this))
                }
                other => (eval_expr(other, env, engine)?, None),
            };

            if *optional {
                engine.check_feature(FeatureTag::OptionalChaining)?;
                if callable.is_nullish() {
                    return Err(short_circuit());
                }
            }

            let args = eval_args(args, env, engine)?;
            calls::call_value_sync(engine, &callable, args, this)
        }

        Expr::New { callee, args, .. } => {
            engine.check_feature(FeatureTag::New)?;
            let callee_value = eval_expr(callee, env, engine)?;
            let args = eval_args(args, env, engine)?;
            eval_new(engine, &callee_value, args)
        }

        /* ------------------------------------------------------------------
         * Closures & Classes
         * ---------------------------------------------------------------- */
        Expr::Function { func, .. } => {
            if func.is_arrow {
                engine.check_feature(FeatureTag::ArrowFunctions)?;
            } else {
                engine.check_feature(FeatureTag::Functions)?;
            }
            if func.is_generator {
                engine.check_feature(if func.is_async {
                    FeatureTag::AsyncGenerators
                } else {
                    FeatureTag::Generators
                })?;
            } else if func.is_async {
                engine.check_feature(FeatureTag::AsyncAwait)?;
            }
            Ok(Value::Function(Rc::new(FunctionData::new(
                func.clone(),
                env.clone(),
            ))))
        }

        Expr::Class { class, .. } => {
            engine.check_feature(FeatureTag::Classes)?;
            classes::eval_class(engine, env, class)
        }

        /* ------------------------------------------------------------------
         * Suspension Points (rejected in the synchronous walker)
         * ---------------------------------------------------------------- */
        Expr::Await { .. } => {
            engine.check_feature(FeatureTag::AsyncAwait)?;
            Err(SandpawError::new(
                ErrorKind::AsyncInSync,
                "'await' requires the asynchronous evaluator",
            ))
        }

        Expr::Yield { .. } => Err(SandpawError::type_mismatch(
            "'yield' is only valid inside a generator body",
        )),

        /* ------------------------------------------------------------------
         * Super
         * ---------------------------------------------------------------- */
        Expr::SuperCall { args, .. } => {
            let args = eval_args(args, env, engine)?;
            classes::super_call(engine, env, args)
        }

        Expr::SuperMember { property, .. } => {
            let key = property_key_of(engine, env, property)?;
            classes::super_get(engine, env, &key)
        }
    }
}

/* ============================================================================
 * Argument & Key Evaluation
 * ============================================================================
 */

/// Evaluates a call-argument list, flattening spreads.
pub fn eval_args(
    args: &[Argument],
    env: &Rc<RefCell<Environment>>,
    engine: &Rc<EngineState>,
) -> Result<Vec<Value>, SandpawError> {
    let mut out = Vec::with_capacity(args.len());
    for arg in args {
        match arg {
            Argument::Normal(expr) => out.push(eval_expr(expr, env, engine)?),
            Argument::Spread(expr) => {
                engine.check_feature(FeatureTag::Spread)?;
                let spread = eval_expr(expr, env, engine)?;
                out.extend(helpers::collect_iterable(engine, &spread)?);
            }
        }
    }
    Ok(out)
}

/// Evaluates an object-literal key to its property-map string, gating
/// computed keys after coercion.
fn eval_property_key(
    key: &PropertyKey,
    env: &Rc<RefCell<Environment>>,
    engine: &Rc<EngineState>,
) -> Result<String, SandpawError> {
    match key {
        PropertyKey::Identifier(name) | PropertyKey::Str(name) => Ok(name.clone()),
        PropertyKey::Number(n) => Ok(crate::value::format_number(*n)),
        PropertyKey::Computed(expr) => {
            let value = eval_expr(expr, env, engine)?;
            Ok(helpers::to_property_key(&value))
        }
    }
}

fn property_key_of(
    engine: &Rc<EngineState>,
    env: &Rc<RefCell<Environment>>,
    property: &MemberKey,
) -> Result<String, SandpawError> {
    match property {
        MemberKey::Named(name) => Ok(name.clone()),
        MemberKey::Private(name) => Ok(format!("#{}", name)),
        MemberKey::Computed(expr) => {
            let value = eval_expr(expr, env, engine)?;
            Ok(helpers::to_property_key(&value))
        }
    }
}

/// Resolves a member read against an evaluated receiver.
fn eval_member_read(
    engine: &Rc<EngineState>,
    env: &Rc<RefCell<Environment>>,
    target: &Value,
    property: &MemberKey,
) -> Result<Value, SandpawError> {
    match property {
        MemberKey::Named(name) => helpers::member_get(engine, target, name),
        MemberKey::Private(name) => {
            engine.check_feature(FeatureTag::PrivateMembers)?;
            classes::private_get(engine, target, name)
        }
        MemberKey::Computed(expr) => {
            let key_value = eval_expr(expr, env, engine)?;
            let key = helpers::to_property_key(&key_value);
            helpers::member_get(engine, target, &key)
        }
    }
}

/* ============================================================================
 * Assignment Forms
 * ============================================================================
 */

fn eval_assign(
    op: &Option<BinaryOp>,
    logical: &Option<LogicalOp>,
    target: &Expr,
    value: &Expr,
    env: &Rc<RefCell<Environment>>,
    engine: &Rc<EngineState>,
) -> Result<Value, SandpawError> {
    // Short-circuiting logical assignment decides on the current value
    // before the right-hand side is ever evaluated.
    if let Some(logical) = logical {
        engine.check_feature(FeatureTag::LogicalAssignment)?;
        let current = read_assign_target(target, env, engine)?;
        let proceed = match logical {
            LogicalOp::And => current.is_truthy(),
            LogicalOp::Or => !current.is_truthy(),
            LogicalOp::Nullish => current.is_nullish(),
        };
        if !proceed {
            return Ok(current);
        }
        let new_value = eval_expr(value, env, engine)?;
        return write_assign_target(target, new_value, env, engine);
    }

    if let Some(op) = op {
        let current = read_assign_target(target, env, engine)?;
        let rhs = eval_expr(value, env, engine)?;
        let combined = helpers::apply_binary(*op, current, rhs)?;
        return write_assign_target(target, combined, env, engine);
    }

    let new_value = eval_expr(value, env, engine)?;
    if let (Expr::Identifier { name, .. }, Value::Function(func)) = (target, &new_value) {
        let mut slot = func.name.borrow_mut();
        if slot.is_none() {
            *slot = Some(name.clone());
        }
    }
    write_assign_target(target, new_value, env, engine)
}

fn read_assign_target(
    target: &Expr,
    env: &Rc<RefCell<Environment>>,
    engine: &Rc<EngineState>,
) -> Result<Value, SandpawError> {
    match target {
        Expr::Identifier { name, .. } => Environment::get(env, name),
        Expr::Member {
            object, property, ..
        } => {
            let receiver = eval_expr(object, env, engine)?;
            eval_member_read(engine, env, &receiver, property)
        }
        Expr::SuperMember { property, .. } => {
            let key = property_key_of(engine, env, property)?;
            classes::super_get(engine, env, &key)
        }
        _ => Err(SandpawError::type_mismatch("invalid assignment target")),
    }
}

fn write_assign_target(
    target: &Expr,
    value: Value,
    env: &Rc<RefCell<Environment>>,
    engine: &Rc<EngineState>,
) -> Result<Value, SandpawError> {
    match target {
        Expr::Identifier { name, .. } => {
            Environment::set(env, name, value.clone())?;
            Ok(value)
        }
        Expr::Member {
            object, property, ..
        } => {
            let receiver = eval_expr(object, env, engine)?;
            match property {
                MemberKey::Named(name) => helpers::member_set(engine, &receiver, name, value),
                MemberKey::Private(name) => {
                    engine.check_feature(FeatureTag::PrivateMembers)?;
                    classes::private_set(engine, &receiver, name, value)
                }
                MemberKey::Computed(expr) => {
                    let key_value = eval_expr(expr, env, engine)?;
                    let key = helpers::to_property_key(&key_value);
                    helpers::member_set(engine, &receiver, &key, value)
                }
            }
        }
        Expr::SuperMember { property, .. } => {
            let key = property_key_of(engine, env, property)?;
            classes::super_set(engine, env, &key, value)
        }
        _ => Err(SandpawError::type_mismatch("invalid assignment target")),
    }
}

/* ============================================================================
 * Updates, Delete, New
 * ============================================================================
 */

fn eval_update(
    op: UpdateOp,
    prefix: bool,
    target: &Expr,
    env: &Rc<RefCell<Environment>>,
    engine: &Rc<EngineState>,
) -> Result<Value, SandpawError> {
    let current = read_assign_target(target, env, engine)?;
    let Value::Number(n) = current else {
        return Err(SandpawError::type_mismatch(format!(
            "update operators require a number, got {}",
            current.type_name()
        )));
    };

    let updated = match op {
        UpdateOp::Increment => n + 1.0,
        UpdateOp::Decrement => n - 1.0,
    };
    write_assign_target(target, Value::Number(updated), env, engine)?;

    Ok(Value::Number(if prefix { updated } else { n }))
}

fn eval_delete(
    operand: &Expr,
    env: &Rc<RefCell<Environment>>,
    engine: &Rc<EngineState>,
) -> Result<Value, SandpawError> {
    match operand {
        Expr::Member {
            object, property, ..
        } => {
            let target = eval_expr(object, env, engine)?;
            let key = match property {
                MemberKey::Named(name) => name.clone(),
                MemberKey::Private(_) => {
                    return Err(SandpawError::type_mismatch(
                        "private members cannot be deleted",
                    ))
                }
                MemberKey::Computed(expr) => {
                    let key_value = eval_expr(expr, env, engine)?;
                    helpers::to_property_key(&key_value)
                }
            };
            helpers::check_property_key(&key, matches!(&target, Value::Object(d) if !d.borrow().host))?;
            match &target {
                Value::Object(data) => {
                    let mut data = data.borrow_mut();
                    if data.readonly {
                        return Err(SandpawError::type_mismatch(
                            "cannot delete from a read-only host object",
                        ));
                    }
                    Ok(Value::Bool(data.props.shift_remove(&key).is_some()))
                }
                Value::Array(data) => {
                    let mut data = data.borrow_mut();
                    if data.readonly {
                        return Err(SandpawError::type_mismatch(
                            "cannot delete from a read-only host array",
                        ));
                    }
                    if let Ok(index) = key.parse::<usize>() {
                        if index < data.elements.len() {
                            data.elements[index] = Value::Undefined;
                            return Ok(Value::Bool(true));
                        }
                    }
                    Ok(Value::Bool(false))
                }
                _ => Ok(Value::Bool(false)),
            }
        }
        // Deleting a variable never succeeds; everything else is a no-op
        // that still evaluates its operand.
        Expr::Identifier { .. } => Ok(Value::Bool(false)),
        other => {
            eval_expr(other, env, engine)?;
            Ok(Value::Bool(true))
        }
    }
}

/// `new` dispatch: guest classes follow the construction protocol, host
/// functions use the host construct path, bare guest functions get a
/// fresh bag as `this`.
pub fn eval_new(
    engine: &Rc<EngineState>,
    callee: &Value,
    args: Vec<Value>,
) -> Result<Value, SandpawError> {
    match callee {
        Value::Class(class) => classes::construct_instance(engine, class, args),
        Value::HostFunction(host) => {
            let result = calls::call_host_sync(engine, host, args)?;
            Ok(result)
        }
        Value::Function(func) => {
            let instance = Value::new_object();
            engine.charge_memory(OBJECT_BASE_BYTES)?;
            let result =
                calls::call_function_sync(engine, func, args, Some(instance.clone()))?;
            match result {
                Value::Object(_) | Value::Array(_) => Ok(result),
                _ => Ok(instance),
            }
        }
        other => Err(SandpawError::not_callable(other.type_name())),
    }
}

/// Copies the own enumerable properties of `source` into the object
/// literal being built, gating every key. Non-objects are rejected.
pub fn spread_into_object(
    engine: &Rc<EngineState>,
    object: &Value,
    source: &Value,
) -> Result<(), SandpawError> {
    match source {
        Value::Object(data) => {
            let entries: Vec<(String, Value)> = data
                .borrow()
                .props
                .iter()
                .filter(|(k, _)| !k.starts_with("@@"))
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect();
            for (key, value) in entries {
                helpers::member_set(engine, object, &key, value)?;
            }
            Ok(())
        }
        other => Err(SandpawError::new(
            ErrorKind::SpreadTarget,
            format!("cannot spread {} into an object", other.type_name()),
        )),
    }
}

pub(crate) fn tagged_strings(cooked: &[String], raw: &[String]) -> Value {
    let raw_array = Value::Array(Rc::new(RefCell::new(crate::value::ArrayData {
        elements: raw.iter().map(|s| Value::Str(s.clone())).collect(),
        readonly: true,
        raw: None,
    })));
    Value::Array(Rc::new(RefCell::new(crate::value::ArrayData {
        elements: cooked.iter().map(|s| Value::Str(s.clone())).collect(),
        readonly: true,
        raw: Some(raw_array),
    })))
}
