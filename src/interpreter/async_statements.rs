/*
 * ==========================================================================
 * SANDPAW - Safe Claws for Untrusted Code!
 * ==========================================================================
 *
 * Asynchronous Statement Walker
 * -----------------------------
 * The asynchronous twin of `statements.rs`. Semantics are identical
 * except that this walker may suspend at `await`, at host-async calls
 * and at `for await…of` steps, and that generator bodies reach their
 * yield points through it. Keep the two files handler-for-handler in
 * sync.
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

use crate::ast::{DeclKind, Declarator, ForInit, ForTarget, Pattern, Stmt};
use crate::error::SandpawError;
use crate::interpreter::async_expressions::eval_expr_async;
use crate::interpreter::calls::AsyncCtx;
use crate::interpreter::classes;
use crate::interpreter::environment::{BindingKind, Environment};
use crate::interpreter::features::FeatureTag;
use crate::interpreter::helpers::{self, BindMode, GuestIterator};
use crate::interpreter::statements::{
    bind_for_target, binding_kind_for, consume_loop_signal, for_in_keys, hoist_functions,
    ExecSignal, LoopFlow,
};
use crate::value::{FunctionData, Value};

/// Executes a statement block with the asynchronous walker.
pub fn exec_block_async<'a>(
    stmts: &'a [Stmt],
    env: &'a Rc<RefCell<Environment>>,
    ctx: &'a AsyncCtx,
) -> LocalBoxFuture<'a, Result<ExecSignal, SandpawError>> {
    async move {
        hoist_functions(stmts, env, &ctx.engine)?;
        for stmt in stmts {
            if let Stmt::FunctionDecl { .. } = stmt {
                continue;
            }
            match exec_stmt_async(stmt, env, ctx).await? {
                ExecSignal::None => {}
                other => return Ok(other),
            }
        }
        Ok(ExecSignal::None)
    }
    .boxed_local()
}

/// Executes a single statement with the asynchronous walker.
pub fn exec_stmt_async<'a>(
    stmt: &'a Stmt,
    env: &'a Rc<RefCell<Environment>>,
    ctx: &'a AsyncCtx,
) -> LocalBoxFuture<'a, Result<ExecSignal, SandpawError>> {
    exec_stmt_labeled_async(stmt, env, ctx, None)
}

fn exec_stmt_labeled_async<'a>(
    stmt: &'a Stmt,
    env: &'a Rc<RefCell<Environment>>,
    ctx: &'a AsyncCtx,
    label: Option<&'a str>,
) -> LocalBoxFuture<'a, Result<ExecSignal, SandpawError>> {
    async move {
        let engine = &ctx.engine;
        engine.record_node(stmt.span())?;

        match stmt {
            Stmt::Expression { expr, .. } => {
                eval_expr_async(expr, env, ctx).await?;
                Ok(ExecSignal::None)
            }

            Stmt::VarDecl {
                kind, declarations, ..
            } => {
                engine.check_feature(FeatureTag::Variables)?;
                exec_var_decl_async(*kind, declarations, env, ctx).await?;
                Ok(ExecSignal::None)
            }

            Stmt::FunctionDecl { func, .. } => {
                engine.check_feature(FeatureTag::Functions)?;
                let value =
                    Value::Function(Rc::new(FunctionData::new(func.clone(), env.clone())));
                let name = func.name.clone().unwrap_or_default();
                Environment::declare(env, &name, value, BindingKind::FunctionScoped)?;
                Ok(ExecSignal::None)
            }

            Stmt::ClassDecl { class, .. } => {
                engine.check_feature(FeatureTag::Classes)?;
                let value = classes::eval_class(engine, env, class)?;
                let name = class.name.clone().unwrap_or_default();
                Environment::declare(env, &name, value, BindingKind::BlockScoped)?;
                Ok(ExecSignal::None)
            }

            Stmt::Block { body, .. } => {
                let block_env = Environment::child(env);
                exec_block_async(body, &block_env, ctx).await
            }

            Stmt::If {
                test,
                consequent,
                alternate,
                ..
            } => {
                if eval_expr_async(test, env, ctx).await?.is_truthy() {
                    exec_stmt_async(consequent, env, ctx).await
                } else if let Some(alternate) = alternate {
                    exec_stmt_async(alternate, env, ctx).await
                } else {
                    Ok(ExecSignal::None)
                }
            }

            Stmt::While { test, body, .. } => {
                engine.check_feature(FeatureTag::Loops)?;
                let mut iterations = 0u64;
                loop {
                    if !eval_expr_async(test, env, ctx).await?.is_truthy() {
                        break;
                    }
                    engine.loop_tick(&mut iterations)?;
                    match exec_stmt_async(body, env, ctx).await? {
                        ExecSignal::None => {}
                        signal => match consume_loop_signal(signal, label) {
                            LoopFlow::Continue => {}
                            LoopFlow::Break => break,
                            LoopFlow::Propagate(signal) => return Ok(signal),
                        },
                    }
                }
                Ok(ExecSignal::None)
            }

            Stmt::DoWhile { body, test, .. } => {
                engine.check_feature(FeatureTag::DoWhile)?;
                let mut iterations = 0u64;
                loop {
                    engine.loop_tick(&mut iterations)?;
                    match exec_stmt_async(body, env, ctx).await? {
                        ExecSignal::None => {}
                        signal => match consume_loop_signal(signal, label) {
                            LoopFlow::Continue => {}
                            LoopFlow::Break => break,
                            LoopFlow::Propagate(signal) => return Ok(signal),
                        },
                    }
                    if !eval_expr_async(test, env, ctx).await?.is_truthy() {
                        break;
                    }
                }
                Ok(ExecSignal::None)
            }

            Stmt::For {
                init,
                test,
                update,
                body,
                ..
            } => {
                engine.check_feature(FeatureTag::Loops)?;
                exec_for_async(init, test, update, body, env, ctx, label).await
            }

            Stmt::ForOf {
                left,
                right,
                body,
                is_await,
                ..
            } => {
                if *is_await {
                    engine.check_feature(FeatureTag::ForAwaitOf)?;
                } else {
                    engine.check_feature(FeatureTag::ForOf)?;
                }
                exec_for_of_async(left, right, body, *is_await, env, ctx, label).await
            }

            Stmt::ForIn {
                left, right, body, ..
            } => {
                engine.check_feature(FeatureTag::ForIn)?;
                let subject = eval_expr_async(right, env, ctx).await?;
                let keys = for_in_keys(&subject)?;
                let mut iterations = 0u64;
                for key in keys {
                    engine.loop_tick(&mut iterations)?;
                    let iter_env = bind_for_target(left, Value::Str(key), env, engine)?;
                    let body_env = Environment::child(&iter_env);
                    match exec_stmt_async(body, &body_env, ctx).await? {
                        ExecSignal::None => {}
                        signal => match consume_loop_signal(signal, label) {
                            LoopFlow::Continue => {}
                            LoopFlow::Break => break,
                            LoopFlow::Propagate(signal) => return Ok(signal),
                        },
                    }
                }
                Ok(ExecSignal::None)
            }

            Stmt::Switch {
                discriminant,
                cases,
                ..
            } => {
                engine.check_feature(FeatureTag::Switch)?;
                let subject = eval_expr_async(discriminant, env, ctx).await?;
                let switch_env = Environment::child(env);

                let mut start = None;
                for (index, case) in cases.iter().enumerate() {
                    if let Some(test) = &case.test {
                        let candidate = eval_expr_async(test, &switch_env, ctx).await?;
                        if Value::equals_strict(&subject, &candidate) {
                            start = Some(index);
                            break;
                        }
                    }
                }
                if start.is_none() {
                    start = cases.iter().position(|case| case.test.is_none());
                }

                if let Some(start) = start {
                    for case in &cases[start..] {
                        match exec_block_async(&case.body, &switch_env, ctx).await? {
                            ExecSignal::None => {}
                            ExecSignal::Break(None) => return Ok(ExecSignal::None),
                            ExecSignal::Break(Some(l)) if label == Some(l.as_str()) => {
                                return Ok(ExecSignal::None)
                            }
                            signal => return Ok(signal),
                        }
                    }
                }
                Ok(ExecSignal::None)
            }

            Stmt::Try {
                block,
                handler,
                finalizer,
                ..
            } => {
                engine.check_feature(FeatureTag::TryCatch)?;

                let try_env = Environment::child(env);
                let mut outcome = exec_block_async(block, &try_env, ctx).await;

                if let Err(err) = &outcome {
                    if !err.is_control() {
                        if let Some(handler) = handler {
                            let catch_env = Environment::child(env);
                            if let Some(param) = &handler.param {
                                helpers::bind_pattern(
                                    engine,
                                    &catch_env,
                                    param,
                                    err.catch_value(),
                                    BindMode::Declare(BindingKind::BlockScoped),
                                )?;
                            }
                            outcome = exec_block_async(&handler.body, &catch_env, ctx).await;
                        }
                    }
                }

                if let Some(finalizer) = finalizer {
                    let finally_env = Environment::child(env);
                    match exec_block_async(finalizer, &finally_env, ctx).await {
                        Ok(ExecSignal::None) => {}
                        Ok(signal) => outcome = Ok(signal),
                        Err(err) => outcome = Err(err),
                    }
                }

                outcome
            }

            Stmt::Throw { argument, .. } => {
                engine.check_feature(FeatureTag::Throw)?;
                let value = eval_expr_async(argument, env, ctx).await?;
                Err(SandpawError::thrown(value).with_span(stmt.span()))
            }

            Stmt::Return { argument, .. } => {
                let value = match argument {
                    Some(expr) => eval_expr_async(expr, env, ctx).await?,
                    None => Value::Undefined,
                };
                Ok(ExecSignal::Return(value))
            }

            Stmt::Break { label, .. } => {
                if label.is_some() {
                    engine.check_feature(FeatureTag::Labels)?;
                }
                Ok(ExecSignal::Break(label.clone()))
            }

            Stmt::Continue { label, .. } => {
                if label.is_some() {
                    engine.check_feature(FeatureTag::Labels)?;
                }
                Ok(ExecSignal::Continue(label.clone()))
            }

            Stmt::Labeled { label, body, .. } => {
                engine.check_feature(FeatureTag::Labels)?;
                match exec_stmt_labeled_async(body, env, ctx, Some(label.as_str())).await? {
                    ExecSignal::Break(Some(l)) if l == *label => Ok(ExecSignal::None),
                    signal => Ok(signal),
                }
            }

            Stmt::Empty { .. } => Ok(ExecSignal::None),
        }
    }
    .boxed_local()
}

async fn exec_var_decl_async(
    kind: DeclKind,
    declarations: &[Declarator],
    env: &Rc<RefCell<Environment>>,
    ctx: &AsyncCtx,
) -> Result<(), SandpawError> {
    let engine = &ctx.engine;
    let binding_kind = binding_kind_for(kind);
    for declarator in declarations {
        if !matches!(declarator.pattern, Pattern::Identifier { .. }) {
            engine.check_feature(FeatureTag::Destructuring)?;
        }
        let value = match &declarator.init {
            Some(init) => {
                let value = eval_expr_async(init, env, ctx).await?;
                if let (Value::Function(func), Pattern::Identifier { name }) =
                    (&value, &declarator.pattern)
                {
                    let mut slot = func.name.borrow_mut();
                    if slot.is_none() {
                        *slot = Some(name.clone());
                    }
                }
                value
            }
            None => Value::Undefined,
        };
        helpers::bind_pattern(
            engine,
            env,
            &declarator.pattern,
            value,
            BindMode::Declare(binding_kind),
        )?;
    }
    Ok(())
}

async fn exec_for_async(
    init: &Option<ForInit>,
    test: &Option<crate::ast::Expr>,
    update: &Option<crate::ast::Expr>,
    body: &Stmt,
    env: &Rc<RefCell<Environment>>,
    ctx: &AsyncCtx,
    label: Option<&str>,
) -> Result<ExecSignal, SandpawError> {
    let engine = &ctx.engine;
    let for_env = Environment::child(env);

    let mut per_iteration_names: Vec<String> = Vec::new();
    let mut copy_kind = BindingKind::BlockScoped;
    match init {
        Some(ForInit::VarDecl { kind, declarations }) => {
            exec_var_decl_async(*kind, declarations, &for_env, ctx).await?;
            if matches!(kind, DeclKind::Let | DeclKind::Const) {
                copy_kind = binding_kind_for(*kind);
                for declarator in declarations {
                    declarator.pattern.bound_names(&mut per_iteration_names);
                }
            }
        }
        Some(ForInit::Expr(expr)) => {
            eval_expr_async(expr, &for_env, ctx).await?;
        }
        None => {}
    }

    let mut iterations = 0u64;
    let mut prev = for_env;
    let mut first = true;
    loop {
        let iter_env = if per_iteration_names.is_empty() {
            prev.clone()
        } else {
            let iter_env = Environment::child(env);
            for name in &per_iteration_names {
                let value = Environment::try_get(&prev, name).unwrap_or(Value::Undefined);
                Environment::declare(&iter_env, name, value, copy_kind)?;
            }
            iter_env
        };

        if !first {
            if let Some(update) = update {
                eval_expr_async(update, &iter_env, ctx).await?;
            }
        }
        first = false;

        if let Some(test) = test {
            if !eval_expr_async(test, &iter_env, ctx).await?.is_truthy() {
                break;
            }
        }
        engine.loop_tick(&mut iterations)?;

        let body_env = Environment::child(&iter_env);
        match exec_stmt_async(body, &body_env, ctx).await? {
            ExecSignal::None => {}
            signal => match consume_loop_signal(signal, label) {
                LoopFlow::Continue => {}
                LoopFlow::Break => break,
                LoopFlow::Propagate(signal) => return Ok(signal),
            },
        }

        prev = iter_env;
    }
    Ok(ExecSignal::None)
}

async fn exec_for_of_async(
    left: &ForTarget,
    right: &crate::ast::Expr,
    body: &Stmt,
    is_await: bool,
    env: &Rc<RefCell<Environment>>,
    ctx: &AsyncCtx,
    label: Option<&str>,
) -> Result<ExecSignal, SandpawError> {
    let engine = &ctx.engine;
    let iterable = eval_expr_async(right, env, ctx).await?;
    let mut iter = if is_await {
        GuestIterator::open_async(engine, &iterable)?
    } else {
        GuestIterator::open(engine, &iterable)?
    };
    let mut iterations = 0u64;

    loop {
        let item = match iter.next_async(engine).await {
            Ok(Some(item)) => item,
            Ok(None) => break,
            Err(err) => return Err(err),
        };
        if let Err(err) = engine.loop_tick(&mut iterations) {
            iter.close_async(engine).await;
            return Err(err);
        }

        let iter_env = bind_for_target(left, item, env, engine)?;
        let body_env = Environment::child(&iter_env);
        match exec_stmt_async(body, &body_env, ctx).await {
            Ok(ExecSignal::None) => {}
            Ok(signal) => match consume_loop_signal(signal, label) {
                LoopFlow::Continue => {}
                LoopFlow::Break => {
                    iter.close_async(engine).await;
                    break;
                }
                LoopFlow::Propagate(signal) => {
                    iter.close_async(engine).await;
                    return Ok(signal);
                }
            },
            Err(err) => {
                iter.close_async(engine).await;
                return Err(err);
            }
        }
    }
    Ok(ExecSignal::None)
}
