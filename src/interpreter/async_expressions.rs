/*
 * ==========================================================================
 * SANDPAW - Safe Claws for Untrusted Code!
 * ==========================================================================
 *
 * Asynchronous Expression Walker
 * ------------------------------
 * The asynchronous twin of `expressions.rs`, with three additions: the
 * `await` suspension point, generator yield points (through the
 * coroutine channel), and host-async calls awaited at the call site.
 * Keep the two files handler-for-handler in sync.
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

use futures::future::LocalBoxFuture;
use futures::FutureExt;

use crate::ast::{
    Argument, ArrayElement, BinaryOp, Expr, LogicalOp, MemberKey, ObjectProperty, PropertyKey,
    TemplatePart, UnaryOp, UpdateOp,
};
use crate::error::{ErrorKind, SandpawError};
use crate::interpreter::calls::{self, AsyncCtx};
use crate::interpreter::classes;
use crate::interpreter::environment::Environment;
use crate::interpreter::expressions::{eval_new, spread_into_object, tagged_strings};
use crate::interpreter::features::FeatureTag;
use crate::interpreter::generators::YieldPoint;
use crate::interpreter::helpers::{
    self, BYTES_PER_ARRAY_SLOT, BYTES_PER_OBJECT_PROP, BYTES_PER_TEMPLATE_CHAR, OBJECT_BASE_BYTES,
};
use crate::prototypes;
use crate::value::{FunctionData, Value};

fn short_circuit() -> SandpawError {
    SandpawError::new(ErrorKind::OptionalShortCircuit, "optional chain short-circuit")
}

/// Evaluates a single expression with the asynchronous walker.
pub fn eval_expr_async<'a>(
    expr: &'a Expr,
    env: &'a Rc<RefCell<Environment>>,
    ctx: &'a AsyncCtx,
) -> LocalBoxFuture<'a, Result<Value, SandpawError>> {
    async move {
        let engine = &ctx.engine;
        engine.record_node(expr.span())?;

        match expr {
            /* --------------------------------------------------------------
             * Literals
             * ------------------------------------------------------------ */
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

            /* --------------------------------------------------------------
             * Names
             * ------------------------------------------------------------ */
            Expr::Identifier { name, .. } => Environment::get(env, name),
            Expr::This { .. } => Environment::this_value(env),

            /* --------------------------------------------------------------
             * Templates
             * ------------------------------------------------------------ */
            Expr::Template { parts, .. } => {
                engine.check_feature(FeatureTag::TemplateLiterals)?;
                let mut out = String::new();
                for part in parts {
                    match part {
                        TemplatePart::Str(s) => out.push_str(s),
                        TemplatePart::Expr(expr) => {
                            let value = eval_expr_async(expr, env, ctx).await?;
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
                let tag_value = eval_expr_async(tag, env, ctx).await?;
                let strings = tagged_strings(cooked, raw);
                let mut args = vec![strings];
                for expr in exprs {
                    args.push(eval_expr_async(expr, env, ctx).await?);
                }
                calls::call_value_async(ctx, &tag_value, args, None).await
            }

            /* --------------------------------------------------------------
             * Array & Object Literals
             * ------------------------------------------------------------ */
            Expr::Array { elements, .. } => {
                let mut values = Vec::new();
                for element in elements {
                    match element {
                        ArrayElement::Item(expr) => {
                            values.push(eval_expr_async(expr, env, ctx).await?)
                        }
                        ArrayElement::Hole => values.push(Value::Undefined),
                        ArrayElement::Spread(expr) => {
                            engine.check_feature(FeatureTag::Spread)?;
                            let spread = eval_expr_async(expr, env, ctx).await?;
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
                            let key = eval_property_key_async(key, env, ctx).await?;
                            let value = eval_expr_async(value, env, ctx).await?;
                            helpers::member_set(engine, &object, &key, value)?;
                        }
                        ObjectProperty::Shorthand { name, .. } => {
                            let value = Environment::get(env, name)?;
                            helpers::member_set(engine, &object, name, value)?;
                        }
                        ObjectProperty::Method { key, func } => {
                            let key = eval_property_key_async(key, env, ctx).await?;
                            let method = Value::Function(Rc::new(FunctionData::new(
                                func.clone(),
                                env.clone(),
                            )));
                            helpers::member_set(engine, &object, &key, method)?;
                        }
                        ObjectProperty::Spread { argument } => {
                            engine.check_feature(FeatureTag::Spread)?;
                            let source = eval_expr_async(argument, env, ctx).await?;
                            spread_into_object(engine, &object, &source)?;
                        }
                    }
                }
                Ok(object)
            }

            /* --------------------------------------------------------------
             * Operators
             * ------------------------------------------------------------ */
            Expr::Unary { op, operand, .. } => match op {
                UnaryOp::TypeOf => {
                    engine.check_feature(FeatureTag::TypeOf)?;
                    if let Expr::Identifier { name, .. } = operand.as_ref() {
                        return Ok(Value::Str(
                            Environment::try_get(env, name)
                                .map(|v| v.typeof_str())
                                .unwrap_or("undefined")
                                .to_string(),
                        ));
                    }
                    let value = eval_expr_async(operand, env, ctx).await?;
                    Ok(Value::Str(value.typeof_str().to_string()))
                }
                UnaryOp::Delete => eval_delete_async(operand, env, ctx).await,
                _ => {
                    let value = eval_expr_async(operand, env, ctx).await?;
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
                let current = read_assign_target_async(target, env, ctx).await?;
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
                write_assign_target_async(target, Value::Number(updated), env, ctx).await?;
                Ok(Value::Number(if *prefix { updated } else { n }))
            }

            Expr::Binary {
                op, left, right, ..
            } => match op {
                BinaryOp::In => {
                    let key = eval_expr_async(left, env, ctx).await?;
                    let target = eval_expr_async(right, env, ctx).await?;
                    helpers::apply_in(engine, key, &target)
                }
                BinaryOp::InstanceOf => {
                    let value = eval_expr_async(left, env, ctx).await?;
                    let target = eval_expr_async(right, env, ctx).await?;
                    helpers::apply_instanceof(engine, &value, &target)
                }
                BinaryOp::Exponent => {
                    engine.check_feature(FeatureTag::Exponentiation)?;
                    let left = eval_expr_async(left, env, ctx).await?;
                    let right = eval_expr_async(right, env, ctx).await?;
                    helpers::apply_binary(*op, left, right)
                }
                _ => {
                    let left = eval_expr_async(left, env, ctx).await?;
                    let right = eval_expr_async(right, env, ctx).await?;
                    helpers::apply_binary(*op, left, right)
                }
            },

            Expr::Logical {
                op, left, right, ..
            } => {
                let left_value = eval_expr_async(left, env, ctx).await?;
                match op {
                    LogicalOp::And => {
                        if left_value.is_truthy() {
                            eval_expr_async(right, env, ctx).await
                        } else {
                            Ok(left_value)
                        }
                    }
                    LogicalOp::Or => {
                        if left_value.is_truthy() {
                            Ok(left_value)
                        } else {
                            eval_expr_async(right, env, ctx).await
                        }
                    }
                    LogicalOp::Nullish => {
                        engine.check_feature(FeatureTag::NullishCoalescing)?;
                        if left_value.is_nullish() {
                            eval_expr_async(right, env, ctx).await
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
                if eval_expr_async(test, env, ctx).await?.is_truthy() {
                    eval_expr_async(consequent, env, ctx).await
                } else {
                    eval_expr_async(alternate, env, ctx).await
                }
            }

            Expr::Sequence { exprs, .. } => {
                engine.check_feature(FeatureTag::SequenceExpressions)?;
                let mut result = Value::Undefined;
                for expr in exprs {
                    result = eval_expr_async(expr, env, ctx).await?;
                }
                Ok(result)
            }

            /* --------------------------------------------------------------
             * Assignment
             * ------------------------------------------------------------ */
            Expr::Assign {
                op,
                logical,
                target,
                value,
                ..
            } => {
                if let Some(logical) = logical {
                    engine.check_feature(FeatureTag::LogicalAssignment)?;
                    let current = read_assign_target_async(target, env, ctx).await?;
                    let proceed = match logical {
                        LogicalOp::And => current.is_truthy(),
                        LogicalOp::Or => !current.is_truthy(),
                        LogicalOp::Nullish => current.is_nullish(),
                    };
                    if !proceed {
                        return Ok(current);
                    }
                    let new_value = eval_expr_async(value, env, ctx).await?;
                    return write_assign_target_async(target, new_value, env, ctx).await;
                }

                if let Some(op) = op {
                    let current = read_assign_target_async(target, env, ctx).await?;
                    let rhs = eval_expr_async(value, env, ctx).await?;
                    let combined = helpers::apply_binary(*op, current, rhs)?;
                    return write_assign_target_async(target, combined, env, ctx).await;
                }

                let new_value = eval_expr_async(value, env, ctx).await?;
                if let (Expr::Identifier { name, .. }, Value::Function(func)) =
                    (target.as_ref(), &new_value)
                {
                    let mut slot = func.name.borrow_mut();
                    if slot.is_none() {
                        *slot = Some(name.clone());
                    }
                }
                write_assign_target_async(target, new_value, env, ctx).await
            }

            /* --------------------------------------------------------------
             * Member Access & Chains
             * ------------------------------------------------------------ */
            Expr::Member {
                object,
                property,
                optional,
                ..
            } => {
                let target = eval_expr_async(object, env, ctx).await?;
                if *optional {
                    engine.check_feature(FeatureTag::OptionalChaining)?;
                    if target.is_nullish() {
                        return Err(short_circuit());
                    }
                }
                eval_member_read_async(&target, property, env, ctx).await
            }

            Expr::Chain { expr, .. } => {
                engine.check_feature(FeatureTag::OptionalChaining)?;
                match eval_expr_async(expr, env, ctx).await {
                    Err(err) if err.kind == ErrorKind::OptionalShortCircuit => {
                        Ok(Value::Undefined)
                    }
                    other => other,
                }
            }

            /* --------------------------------------------------------------
             * Calls & Construction
             * ------------------------------------------------------------ */
            Expr::Call {
                callee,
                args,
                optional,
                ..
            } => {
                let (callable, this) = match callee.as_ref() {
                    Expr::Member {
                        object,
                        property,
                        optional: member_optional,
                        ..
                    } => {
                        let target = eval_expr_async(object, env, ctx).await?;
                        if *member_optional {
                            engine.check_feature(FeatureTag::OptionalChaining)?;
                            if target.is_nullish() {
                                return Err(short_circuit());
                            }
                        }
                        let method =
                            eval_member_read_async(&target, property, env, ctx).await?;
                        (method, Some(target))
                    }
                    Expr::SuperMember { property, .. } => {
                        let key = property_key_async(property, env, ctx).await?;
                        let method = classes::super_get(engine, env, &key)?;
                        let this = Environment::this_value(env)?;
                        (method, Some(this))
                    }
                    other => (eval_expr_async(other, env, ctx).await?, None),
                };

                if *optional {
                    engine.check_feature(FeatureTag::OptionalChaining)?;
                    if callable.is_nullish() {
                        return Err(short_circuit());
                    }
                }

                let args = eval_args_async(args, env, ctx).await?;
                calls::call_value_async(ctx, &callable, args, this).await
            }

            Expr::New { callee, args, .. } => {
                engine.check_feature(FeatureTag::New)?;
                let callee_value = eval_expr_async(callee, env, ctx).await?;
                let args = eval_args_async(args, env, ctx).await?;
                eval_new(engine, &callee_value, args)
            }

            /* --------------------------------------------------------------
             * Closures & Classes
             * ------------------------------------------------------------ */
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

            /* --------------------------------------------------------------
             * Suspension Points
             * ------------------------------------------------------------ */
            Expr::Await { argument, .. } => {
                engine.check_feature(FeatureTag::AsyncAwait)?;
                if ctx.sync_driven {
                    return Err(SandpawError::new(
                        ErrorKind::AsyncInSync,
                        "'await' reached under a synchronous drive",
                    ));
                }
                let value = eval_expr_async(argument, env, ctx).await?;
                helpers::settle_awaited(value)
            }

            Expr::Yield {
                argument,
                delegate,
                ..
            } => {
                let Some(channel) = ctx.channel.clone() else {
                    return Err(SandpawError::type_mismatch(
                        "'yield' is only valid inside a generator body",
                    ));
                };

                if *delegate {
                    // yield*: drain the delegate, re-yielding each value.
                    let iterable = match argument {
                        Some(expr) => eval_expr_async(expr, env, ctx).await?,
                        None => Value::Undefined,
                    };
                    let mut iter = helpers::GuestIterator::open_async(engine, &iterable)?;
                    while let Some(item) = iter.next_async(engine).await? {
                        YieldPoint::new(channel.clone(), item).await?;
                    }
                    return Ok(Value::Undefined);
                }

                let value = match argument {
                    Some(expr) => eval_expr_async(expr, env, ctx).await?,
                    None => Value::Undefined,
                };
                YieldPoint::new(channel, value).await
            }

            /* --------------------------------------------------------------
             * Super
             * ------------------------------------------------------------ */
            Expr::SuperCall { args, .. } => {
                let args = eval_args_async(args, env, ctx).await?;
                classes::super_call(engine, env, args)
            }

            Expr::SuperMember { property, .. } => {
                let key = property_key_async(property, env, ctx).await?;
                classes::super_get(engine, env, &key)
            }
        }
    }
    .boxed_local()
}

/* ============================================================================
 * Async Mirrors of the Access Helpers
 * ============================================================================
 */

/// Evaluates a call-argument list, flattening spreads.
pub async fn eval_args_async(
    args: &[Argument],
    env: &Rc<RefCell<Environment>>,
    ctx: &AsyncCtx,
) -> Result<Vec<Value>, SandpawError> {
    let mut out = Vec::with_capacity(args.len());
    for arg in args {
        match arg {
            Argument::Normal(expr) => out.push(eval_expr_async(expr, env, ctx).await?),
            Argument::Spread(expr) => {
                ctx.engine.check_feature(FeatureTag::Spread)?;
                let spread = eval_expr_async(expr, env, ctx).await?;
                out.extend(helpers::collect_iterable(&ctx.engine, &spread)?);
            }
        }
    }
    Ok(out)
}

async fn eval_property_key_async(
    key: &PropertyKey,
    env: &Rc<RefCell<Environment>>,
    ctx: &AsyncCtx,
) -> Result<String, SandpawError> {
    match key {
        PropertyKey::Identifier(name) | PropertyKey::Str(name) => Ok(name.clone()),
        PropertyKey::Number(n) => Ok(crate::value::format_number(*n)),
        PropertyKey::Computed(expr) => {
            let value = eval_expr_async(expr, env, ctx).await?;
            Ok(helpers::to_property_key(&value))
        }
    }
}

async fn property_key_async(
    property: &MemberKey,
    env: &Rc<RefCell<Environment>>,
    ctx: &AsyncCtx,
) -> Result<String, SandpawError> {
    match property {
        MemberKey::Named(name) => Ok(name.clone()),
        MemberKey::Private(name) => Ok(format!("#{}", name)),
        MemberKey::Computed(expr) => {
            let value = eval_expr_async(expr, env, ctx).await?;
            Ok(helpers::to_property_key(&value))
        }
    }
}

async fn eval_member_read_async(
    target: &Value,
    property: &MemberKey,
    env: &Rc<RefCell<Environment>>,
    ctx: &AsyncCtx,
) -> Result<Value, SandpawError> {
    match property {
        MemberKey::Named(name) => helpers::member_get(&ctx.engine, target, name),
        MemberKey::Private(name) => {
            ctx.engine.check_feature(FeatureTag::PrivateMembers)?;
            classes::private_get(&ctx.engine, target, name)
        }
        MemberKey::Computed(expr) => {
            let key_value = eval_expr_async(expr, env, ctx).await?;
            let key = helpers::to_property_key(&key_value);
            helpers::member_get(&ctx.engine, target, &key)
        }
    }
}

async fn read_assign_target_async(
    target: &Expr,
    env: &Rc<RefCell<Environment>>,
    ctx: &AsyncCtx,
) -> Result<Value, SandpawError> {
    match target {
        Expr::Identifier { name, .. } => Environment::get(env, name),
        Expr::Member {
            object, property, ..
        } => {
            let receiver = eval_expr_async(object, env, ctx).await?;
            eval_member_read_async(&receiver, property, env, ctx).await
        }
        Expr::SuperMember { property, .. } => {
            let key = property_key_async(property, env, ctx).await?;
            classes::super_get(&ctx.engine, env, &key)
        }
        _ => Err(SandpawError::type_mismatch("invalid assignment target")),
    }
}

async fn write_assign_target_async(
    target: &Expr,
    value: Value,
    env: &Rc<RefCell<Environment>>,
    ctx: &AsyncCtx,
) -> Result<Value, SandpawError> {
    let engine = &ctx.engine;
    match target {
        Expr::Identifier { name, .. } => {
            Environment::set(env, name, value.clone())?;
            Ok(value)
        }
        Expr::Member {
            object, property, ..
        } => {
            let receiver = eval_expr_async(object, env, ctx).await?;
            match property {
                MemberKey::Named(name) => helpers::member_set(engine, &receiver, name, value),
                MemberKey::Private(name) => {
                    engine.check_feature(FeatureTag::PrivateMembers)?;
                    classes::private_set(engine, &receiver, name, value)
                }
                MemberKey::Computed(expr) => {
                    let key_value = eval_expr_async(expr, env, ctx).await?;
                    let key = helpers::to_property_key(&key_value);
                    helpers::member_set(engine, &receiver, &key, value)
                }
            }
        }
        Expr::SuperMember { property, .. } => {
            let key = property_key_async(property, env, ctx).await?;
            classes::super_set(engine, env, &key, value)
        }
        _ => Err(SandpawError::type_mismatch("invalid assignment target")),
    }
}

async fn eval_delete_async(
    operand: &Expr,
    env: &Rc<RefCell<Environment>>,
    ctx: &AsyncCtx,
) -> Result<Value, SandpawError> {
    let engine = &ctx.engine;
    match operand {
        Expr::Member {
            object, property, ..
        } => {
            let target = eval_expr_async(object, env, ctx).await?;
            let key = match property {
                MemberKey::Named(name) => name.clone(),
                MemberKey::Private(_) => {
                    return Err(SandpawError::type_mismatch(
                        "private members cannot be deleted",
                    ))
                }
                MemberKey::Computed(expr) => {
                    let key_value = eval_expr_async(expr, env, ctx).await?;
                    helpers::to_property_key(&key_value)
                }
            };
            helpers::check_property_key(
                &key,
                matches!(&target, Value::Object(d) if !d.borrow().host),
            )?;
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
        Expr::Identifier { .. } => Ok(Value::Bool(false)),
        other => {
            eval_expr_async(other, env, ctx).await?;
            Ok(Value::Bool(true))
        }
    }
}
