/*
 * ==========================================================================
 * SANDPAW - Safe Claws for Untrusted Code!
 * ==========================================================================
 *
 * Synchronous Statement Walker
 * ----------------------------
 * Executes all statements for the synchronous evaluator. Expression
 * evaluation lives in `expressions.rs`; the asynchronous twin of this
 * file is `async_statements.rs` and must stay handler-for-handler in
 * sync with it.
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
    DeclKind, Declarator, ForInit, ForTarget, Pattern, Stmt,
};
use crate::error::{ErrorKind, SandpawError};
use crate::interpreter::classes;
use crate::interpreter::engine::EngineState;
use crate::interpreter::environment::{BindingKind, Environment};
use crate::interpreter::expressions::eval_expr;
use crate::interpreter::features::FeatureTag;
use crate::interpreter::helpers::{self, BindMode, GuestIterator};
use crate::value::{FunctionData, Value};

/// Internal control-flow signal produced by statement execution. These
/// are the non-local sentinels of the walker; none of them is ever
/// observable by guest code.
#[derive(Debug)]
pub enum ExecSignal {
    /// Normal fall-through execution.
    None,
    /// Early return from the enclosing function or constructor frame.
    Return(Value),
    /// Break out of the matching (possibly labelled) loop or switch.
    Break(Option<String>),
    /// Continue the matching (possibly labelled) loop.
    Continue(Option<String>),
}

/// Executes a statement block in the given environment. Function
/// declarations hoist to the top of their block.
pub fn exec_block(
    stmts: &[Stmt],
    env: &Rc<RefCell<Environment>>,
    engine: &Rc<EngineState>,
) -> Result<ExecSignal, SandpawError> {
    hoist_functions(stmts, env, engine)?;
    for stmt in stmts {
        if let Stmt::FunctionDecl { .. } = stmt {
            continue;
        }
        match exec_stmt(stmt, env, engine)? {
            ExecSignal::None => {}
            other => return Ok(other),
        }
    }
    Ok(ExecSignal::None)
}

/// Pre-declares every function declaration of a block so that calls
/// may precede definitions in source order.
pub fn hoist_functions(
    stmts: &[Stmt],
    env: &Rc<RefCell<Environment>>,
    engine: &Rc<EngineState>,
) -> Result<(), SandpawError> {
    for stmt in stmts {
        if let Stmt::FunctionDecl { func, .. } = stmt {
            engine.check_feature(FeatureTag::Functions)?;
            if func.is_generator {
                engine.check_feature(if func.is_async {
                    FeatureTag::AsyncGenerators
                } else {
                    FeatureTag::Generators
                })?;
            } else if func.is_async {
                engine.check_feature(FeatureTag::AsyncAwait)?;
            }
            let value = Value::Function(Rc::new(FunctionData::new(func.clone(), env.clone())));
            let name = func.name.clone().unwrap_or_default();
            Environment::declare(env, &name, value, BindingKind::FunctionScoped)?;
        }
    }
    Ok(())
}

/// Executes a single statement. This is the core dispatch for all
/// synchronous statement execution.
pub fn exec_stmt(
    stmt: &Stmt,
    env: &Rc<RefCell<Environment>>,
    engine: &Rc<EngineState>,
) -> Result<ExecSignal, SandpawError> {
    exec_stmt_labeled(stmt, env, engine, None)
}

/// Statement dispatch with an optional label carried by an enclosing
/// labelled statement, consumed by the loop handlers.
pub fn exec_stmt_labeled(
    stmt: &Stmt,
    env: &Rc<RefCell<Environment>>,
    engine: &Rc<EngineState>,
    label: Option<&str>,
) -> Result<ExecSignal, SandpawError> {
    engine.record_node(stmt.span())?;

    match stmt {
        /* ------------------------------------------------------------------
         * Expression Statement
         * ---------------------------------------------------------------- */
        Stmt::Expression { expr, .. } => {
            eval_expr(expr, env, engine)?;
            Ok(ExecSignal::None)
        }

        /* ------------------------------------------------------------------
         * Declarations
         * ---------------------------------------------------------------- */
        Stmt::VarDecl {
            kind, declarations, ..
        } => {
            engine.check_feature(FeatureTag::Variables)?;
            exec_var_decl(*kind, declarations, env, engine)?;
            Ok(ExecSignal::None)
        }

        Stmt::FunctionDecl { func, .. } => {
            // Normally pre-hoisted by exec_block; executing one directly
            // (e.g. through the step iterator) declares it in place.
            engine.check_feature(FeatureTag::Functions)?;
            let value = Value::Function(Rc::new(FunctionData::new(func.clone(), env.clone())));
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

        /* ------------------------------------------------------------------
         * Blocks & Conditionals
         * ---------------------------------------------------------------- */
        Stmt::Block { body, .. } => {
            let block_env = Environment::child(env);
            exec_block(body, &block_env, engine)
        }

        Stmt::If {
            test,
            consequent,
            alternate,
            ..
        } => {
            if eval_expr(test, env, engine)?.is_truthy() {
                exec_stmt(consequent, env, engine)
            } else if let Some(alternate) = alternate {
                exec_stmt(alternate, env, engine)
            } else {
                Ok(ExecSignal::None)
            }
        }

        /* ------------------------------------------------------------------
         * Loops
         * ---------------------------------------------------------------- */
        Stmt::While { test, body, .. } => {
            engine.check_feature(FeatureTag::Loops)?;
            let mut iterations = 0u64;
            loop {
                if !eval_expr(test, env, engine)?.is_truthy() {
                    break;
                }
                engine.loop_tick(&mut iterations)?;
                match exec_stmt(body, env, engine)? {
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
                match exec_stmt(body, env, engine)? {
                    ExecSignal::None => {}
                    signal => match consume_loop_signal(signal, label) {
                        LoopFlow::Continue => {}
                        LoopFlow::Break => break,
                        LoopFlow::Propagate(signal) => return Ok(signal),
                    },
                }
                if !eval_expr(test, env, engine)?.is_truthy() {
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
            exec_for(init, test, update, body, env, engine, label)
        }

        Stmt::ForOf {
            left,
            right,
            body,
            is_await,
            ..
        } => {
            if *is_await {
                return Err(SandpawError::new(
                    ErrorKind::AsyncInSync,
                    "'for await' requires the asynchronous evaluator",
                ));
            }
            engine.check_feature(FeatureTag::ForOf)?;
            exec_for_of(left, right, body, env, engine, label)
        }

        Stmt::ForIn {
            left, right, body, ..
        } => {
            engine.check_feature(FeatureTag::ForIn)?;
            exec_for_in(left, right, body, env, engine, label)
        }

        /* ------------------------------------------------------------------
         * Switch
         * ---------------------------------------------------------------- */
        Stmt::Switch {
            discriminant,
            cases,
            ..
        } => {
            engine.check_feature(FeatureTag::Switch)?;
            let subject = eval_expr(discriminant, env, engine)?;
            let switch_env = Environment::child(env);

            // Find the first strictly-equal case; fall back to `default`
            // wherever it appears.
            let mut start = None;
            for (index, case) in cases.iter().enumerate() {
                if let Some(test) = &case.test {
                    let candidate = eval_expr(test, &switch_env, engine)?;
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
                    match exec_block(&case.body, &switch_env, engine)? {
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

        /* ------------------------------------------------------------------
         * Try / Catch / Finally
         * ---------------------------------------------------------------- */
        Stmt::Try {
            block,
            handler,
            finalizer,
            ..
        } => {
            engine.check_feature(FeatureTag::TryCatch)?;

            let try_env = Environment::child(env);
            let mut outcome = exec_block(block, &try_env, engine);

            // Internal control values (generator close, chain
            // short-circuit) unwind untouched; guest errors reach catch.
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
                        outcome = exec_block(&handler.body, &catch_env, engine);
                    }
                }
            }

            if let Some(finalizer) = finalizer {
                let finally_env = Environment::child(env);
                match exec_block(finalizer, &finally_env, engine) {
                    // A finally completing with its own control flow
                    // overrides the try/catch outcome.
                    Ok(ExecSignal::None) => {}
                    Ok(signal) => outcome = Ok(signal),
                    Err(err) => outcome = Err(err),
                }
            }

            outcome
        }

        /* ------------------------------------------------------------------
         * Flow Statements
         * ---------------------------------------------------------------- */
        Stmt::Throw { argument, .. } => {
            engine.check_feature(FeatureTag::Throw)?;
            let value = eval_expr(argument, env, engine)?;
            Err(SandpawError::thrown(value).with_span(stmt.span()))
        }

        Stmt::Return { argument, .. } => {
            let value = match argument {
                Some(expr) => eval_expr(expr, env, engine)?,
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
            match exec_stmt_labeled(body, env, engine, Some(label.as_str()))? {
                ExecSignal::Break(Some(l)) if l == *label => Ok(ExecSignal::None),
                signal => Ok(signal),
            }
        }

        Stmt::Empty { .. } => Ok(ExecSignal::None),
    }
}

/* ============================================================================
 * Loop Plumbing
 * ============================================================================
 */

pub(crate) enum LoopFlow {
    Continue,
    Break,
    Propagate(ExecSignal),
}

/// Decides whether a signal coming out of a loop body belongs to this
/// loop (by matching its optional label) or must travel outward.
pub(crate) fn consume_loop_signal(signal: ExecSignal, label: Option<&str>) -> LoopFlow {
    match signal {
        ExecSignal::Continue(None) => LoopFlow::Continue,
        ExecSignal::Continue(Some(l)) if label == Some(l.as_str()) => LoopFlow::Continue,
        ExecSignal::Break(None) => LoopFlow::Break,
        ExecSignal::Break(Some(l)) if label == Some(l.as_str()) => LoopFlow::Break,
        other => LoopFlow::Propagate(other),
    }
}

fn exec_var_decl(
    kind: DeclKind,
    declarations: &[Declarator],
    env: &Rc<RefCell<Environment>>,
    engine: &Rc<EngineState>,
) -> Result<(), SandpawError> {
    let binding_kind = binding_kind_for(kind);
    for declarator in declarations {
        if !matches!(declarator.pattern, Pattern::Identifier { .. }) {
            engine.check_feature(FeatureTag::Destructuring)?;
        }
        let value = match &declarator.init {
            Some(init) => {
                let value = eval_expr(init, env, engine)?;
                infer_closure_name(&value, &declarator.pattern);
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

pub fn binding_kind_for(kind: DeclKind) -> BindingKind {
    match kind {
        DeclKind::Let => BindingKind::BlockScoped,
        DeclKind::Const => BindingKind::Immutable,
        DeclKind::Var => BindingKind::FunctionScoped,
    }
}

/// `const f = () => …` names the closure after its binding.
fn infer_closure_name(value: &Value, pattern: &Pattern) {
    if let (Value::Function(func), Pattern::Identifier { name }) = (value, pattern) {
        let mut slot = func.name.borrow_mut();
        if slot.is_none() {
            *slot = Some(name.clone());
        }
    }
}

/// Classic `for`. When the init declares `let`/`const` bindings, every
/// iteration gets a fresh copy of them so closures capture per-iteration
/// values; the update expression runs against the next iteration's copy.
fn exec_for(
    init: &Option<ForInit>,
    test: &Option<crate::ast::Expr>,
    update: &Option<crate::ast::Expr>,
    body: &Stmt,
    env: &Rc<RefCell<Environment>>,
    engine: &Rc<EngineState>,
    label: Option<&str>,
) -> Result<ExecSignal, SandpawError> {
    let for_env = Environment::child(env);

    let mut per_iteration_names: Vec<String> = Vec::new();
    let mut copy_kind = BindingKind::BlockScoped;
    match init {
        Some(ForInit::VarDecl { kind, declarations }) => {
            exec_var_decl(*kind, declarations, &for_env, engine)?;
            if matches!(kind, DeclKind::Let | DeclKind::Const) {
                copy_kind = binding_kind_for(*kind);
                for declarator in declarations {
                    declarator.pattern.bound_names(&mut per_iteration_names);
                }
            }
        }
        Some(ForInit::Expr(expr)) => {
            eval_expr(expr, &for_env, engine)?;
        }
        None => {}
    }

    let mut iterations = 0u64;
    let mut prev = for_env;
    let mut first = true;
    loop {
        // Fresh copies of the loop bindings for this iteration, keeping
        // their declared kind.
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
                eval_expr(update, &iter_env, engine)?;
            }
        }
        first = false;

        if let Some(test) = test {
            if !eval_expr(test, &iter_env, engine)?.is_truthy() {
                break;
            }
        }
        engine.loop_tick(&mut iterations)?;

        let body_env = Environment::child(&iter_env);
        match exec_stmt(body, &body_env, engine)? {
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

/// Binds the loop variable of `for…of` / `for…in` for one iteration.
pub(crate) fn bind_for_target(
    target: &ForTarget,
    value: Value,
    env: &Rc<RefCell<Environment>>,
    engine: &Rc<EngineState>,
) -> Result<Rc<RefCell<Environment>>, SandpawError> {
    match target {
        ForTarget::Decl { kind, pattern } => {
            // Fresh per-iteration environment, so closures capture this
            // iteration's binding.
            let iter_env = Environment::child(env);
            helpers::bind_pattern(
                engine,
                &iter_env,
                pattern,
                value,
                BindMode::Declare(binding_kind_for(*kind)),
            )?;
            Ok(iter_env)
        }
        ForTarget::Expr(expr) => {
            assign_for_target(expr, value, env, engine)?;
            Ok(env.clone())
        }
    }
}

fn assign_for_target(
    expr: &crate::ast::Expr,
    value: Value,
    env: &Rc<RefCell<Environment>>,
    engine: &Rc<EngineState>,
) -> Result<(), SandpawError> {
    use crate::ast::{Expr, MemberKey};
    match expr {
        Expr::Identifier { name, .. } => Environment::set(env, name, value),
        Expr::Member {
            object,
            property: MemberKey::Named(name),
            ..
        } => {
            let target = eval_expr(object, env, engine)?;
            helpers::member_set(engine, &target, name, value)?;
            Ok(())
        }
        _ => Err(SandpawError::type_mismatch(
            "invalid loop assignment target",
        )),
    }
}

fn exec_for_of(
    left: &ForTarget,
    right: &crate::ast::Expr,
    body: &Stmt,
    env: &Rc<RefCell<Environment>>,
    engine: &Rc<EngineState>,
    label: Option<&str>,
) -> Result<ExecSignal, SandpawError> {
    let iterable = eval_expr(right, env, engine)?;
    let mut iter = GuestIterator::open(engine, &iterable)?;
    let mut iterations = 0u64;

    loop {
        let item = match iter.next(engine) {
            Ok(Some(item)) => item,
            Ok(None) => break,
            Err(err) => return Err(err),
        };
        engine.loop_tick(&mut iterations).map_err(|err| {
            iter.close(engine);
            err
        })?;

        let iter_env = bind_for_target(left, item, env, engine)?;
        let body_env = Environment::child(&iter_env);
        match exec_stmt(body, &body_env, engine) {
            Ok(ExecSignal::None) => {}
            Ok(signal) => match consume_loop_signal(signal, label) {
                LoopFlow::Continue => {}
                LoopFlow::Break => {
                    iter.close(engine);
                    break;
                }
                LoopFlow::Propagate(signal) => {
                    // Return (or an outer labelled break) leaves the loop
                    // early: the iterator gets its close call.
                    iter.close(engine);
                    return Ok(signal);
                }
            },
            Err(err) => {
                iter.close(engine);
                return Err(err);
            }
        }
    }
    Ok(ExecSignal::None)
}

fn exec_for_in(
    left: &ForTarget,
    right: &crate::ast::Expr,
    body: &Stmt,
    env: &Rc<RefCell<Environment>>,
    engine: &Rc<EngineState>,
    label: Option<&str>,
) -> Result<ExecSignal, SandpawError> {
    let subject = eval_expr(right, env, engine)?;
    let keys = for_in_keys(&subject)?;
    let mut iterations = 0u64;

    for key in keys {
        engine.loop_tick(&mut iterations)?;
        let iter_env = bind_for_target(left, Value::Str(key), env, engine)?;
        let body_env = Environment::child(&iter_env);
        match exec_stmt(body, &body_env, engine)? {
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

/// Own enumerable string keys in insertion order. Symbol-backed keys
/// (the reserved `@@` form) are not enumerable.
pub fn for_in_keys(subject: &Value) -> Result<Vec<String>, SandpawError> {
    match subject {
        Value::Object(data) => Ok(data
            .borrow()
            .props
            .keys()
            .filter(|k| !k.starts_with("@@"))
            .cloned()
            .collect()),
        Value::Array(data) => Ok((0..data.borrow().elements.len())
            .map(|i| i.to_string())
            .collect()),
        other => Err(SandpawError::new(
            ErrorKind::ForInTarget,
            format!("cannot enumerate {}", other.type_name()),
        )),
    }
}
