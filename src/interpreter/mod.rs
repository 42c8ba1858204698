/*
 * ==========================================================================
 * SANDPAW - Safe Claws for Untrusted Code!
 * ==========================================================================
 *
 * Interpreter Entry & Runtime Bootstrap
 * -------------------------------------
 * This module is the **primary runtime entrypoint** for the Sandpaw
 * sandbox. It is responsible for:
 *
 *  - Creating the persistent root environment
 *  - Installing the built-in globals
 *  - Injecting and restoring per-call host globals
 *  - Driving the top-level statement loop (sync and async)
 *  - Enriching errors once before they leave the evaluator
 *
 * All actual evaluation logic is delegated to the submodules:
 *
 *  - environment.rs        → lexical scope chain
 *  - statements.rs         → synchronous statement walker
 *  - expressions.rs        → synchronous expression walker
 *  - async_statements.rs   → asynchronous statement walker
 *  - async_expressions.rs  → asynchronous expression walker
 *  - calls.rs              → function & host invocation
 *  - classes.rs            → class & instance behaviour
 *  - generators.rs         → generator coroutine drivers
 *  - helpers.rs            → shared semantics
 *  - engine.rs             → shared state, limits, statistics
 *  - features.rs           → feature gate
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

pub mod async_expressions;
pub mod async_statements;
pub mod calls;
pub mod classes;
pub mod engine;
pub mod environment;
pub mod expressions;
pub mod features;
pub mod generators;
pub mod helpers;
pub mod statements;

use std::cell::RefCell;
use std::rc::Rc;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use std::time::Instant;

use indexmap::IndexMap;

use crate::ast::{Program, Stmt};
use crate::error::{ErrorKind, SandpawError};
use crate::lexer::lexer::Lexer;
use crate::parser;
use crate::prototypes::globals as builtin_globals;
use crate::security;
use crate::value::Value;

use calls::AsyncCtx;
use engine::{EngineState, Limits, SecurityOptions, Stats};
use environment::{Binding, Environment};
use features::FeatureControl;
use statements::{exec_stmt, hoist_functions, ExecSignal};

pub use engine::{Frame, InstanceRegistry};
pub use features::FeatureTag;

/// Per-call evaluation options.
#[derive(Default)]
pub struct EvalOptions {
    /// Globals injected for this call only; previous bindings are
    /// restored when the call finishes.
    pub globals: Vec<(String, Value)>,
    /// Optional gate over the parsed program before execution.
    pub validator: Option<Box<dyn Fn(&Program) -> bool>>,
    pub feature_control: FeatureControl,
    /// Abort signal, polled on a throttled schedule (async evaluation).
    pub signal: Option<Arc<AtomicBool>>,
    pub limits: Limits,
}

/// One step of [`Interpreter::evaluate_steps`].
#[derive(Debug)]
pub struct StepInfo {
    pub node_kind: String,
    pub line: Option<usize>,
    pub done: bool,
    pub result: Option<Value>,
}

/// A sandboxed evaluator instance.
///
/// Top-level bindings persist across `evaluate` calls on the same
/// instance; `clear_globals` resets the environment back to built-ins.
/// One instance must not be used from two evaluations concurrently.
pub struct Interpreter {
    engine: Rc<EngineState>,
    root: Rc<RefCell<Environment>>,
    source: RefCell<Option<String>>,
}

impl Default for Interpreter {
    fn default() -> Self {
        Self::new()
    }
}

impl Interpreter {
    pub fn new() -> Self {
        Self::with_security(SecurityOptions::default())
    }

    pub fn with_security(security: SecurityOptions) -> Self {
        let engine = EngineState::new();
        *engine.security.borrow_mut() = security;
        let root = Environment::new_root();
        builtin_globals::install(&engine, &root);
        Interpreter {
            engine,
            root,
            source: RefCell::new(None),
        }
    }

    /// Parses source text into a program without executing it.
    pub fn parse(&self, code: &str) -> Result<Program, SandpawError> {
        let mut lexer = Lexer::new(code);
        lexer.scan_tokens()?;
        parser::parse(lexer.tokens)
    }

    /// Evaluates source text synchronously and returns the completion
    /// value (the value of the last expression statement).
    pub fn evaluate(&mut self, code: &str, options: EvalOptions) -> Result<Value, SandpawError> {
        let program = self.parse_for_run(code, &options)?;
        self.evaluate_program(&program, options)
    }

    /// Evaluates an already-parsed program synchronously; `parse` +
    /// `evaluate_program` is equivalent to `evaluate`.
    pub fn evaluate_program(
        &mut self,
        program: &Program,
        options: EvalOptions,
    ) -> Result<Value, SandpawError> {
        log::debug!("sync evaluation: {} top-level statement(s)", program.body.len());
        let started = Instant::now();
        self.begin(&options);
        let saved = self.inject_globals(&options)?;

        let outcome = run_program_sync(&self.engine, &self.root, program);

        self.restore_globals(saved);
        self.engine.stats.borrow_mut().execution_time_ms =
            started.elapsed().as_secs_f64() * 1000.0;
        self.finish(outcome)
    }

    /// Evaluates source text asynchronously: `await`, host-async calls
    /// and `for await…of` are available, and the abort signal is polled.
    pub async fn evaluate_async(
        &mut self,
        code: &str,
        options: EvalOptions,
    ) -> Result<Value, SandpawError> {
        let program = self.parse_for_run(code, &options)?;
        log::debug!(
            "async evaluation: {} top-level statement(s)",
            program.body.len()
        );
        let started = Instant::now();
        self.begin(&options);
        let saved = self.inject_globals(&options)?;

        let ctx = AsyncCtx::new(self.engine.clone());
        let outcome = run_program_async(&ctx, &self.root, &program).await;

        self.restore_globals(saved);
        self.engine.stats.borrow_mut().execution_time_ms =
            started.elapsed().as_secs_f64() * 1000.0;
        self.finish(outcome)
    }

    /// Parses and returns a statement-step iterator for debuggers: each
    /// `next()` executes one top-level statement.
    pub fn evaluate_steps(&mut self, code: &str) -> Result<StepIterator, SandpawError> {
        let program = self.parse_for_run(code, &EvalOptions::default())?;
        self.begin(&EvalOptions::default());
        hoist_functions(&program.body, &self.root, &self.engine)?;
        Ok(StepIterator {
            engine: self.engine.clone(),
            env: self.root.clone(),
            program,
            index: 0,
            finished: false,
            completion: Value::Undefined,
        })
    }

    /// Every binding currently visible from the root scope, innermost
    /// shadowing winning.
    pub fn get_scope(&self) -> IndexMap<String, Value> {
        Environment::visible_bindings(&self.root)
    }

    /// Resets the environment back to the built-ins and constructor
    /// globals. Idempotent.
    pub fn clear_globals(&mut self) {
        self.root = Environment::new_root();
        builtin_globals::install(&self.engine, &self.root);
    }

    /// Counters of the most recent evaluation.
    pub fn get_stats(&self) -> Stats {
        self.engine.stats.borrow().clone()
    }

    /// Bans a value from ever being injected as a global, by identity.
    /// Aliasing it under a different name will not get it past the
    /// filter.
    pub fn ban_global_value(&self, value: Value) {
        self.engine.banned_identities.borrow_mut().push(value);
    }

    /* ----------------------------------------------------------------------
     * Internals
     * -------------------------------------------------------------------- */

    fn parse_for_run(
        &self,
        code: &str,
        options: &EvalOptions,
    ) -> Result<Program, SandpawError> {
        *self.source.borrow_mut() = Some(code.to_string());
        let program = self.parse(code).map_err(|mut err| {
            err.enrich(None, Some(code), Vec::new());
            err
        })?;
        if let Some(validator) = &options.validator {
            if !validator(&program) {
                return Err(SandpawError::new(
                    ErrorKind::Parse,
                    "program rejected by the validator",
                ));
            }
        }
        Ok(program)
    }

    fn begin(&self, options: &EvalOptions) {
        self.engine.begin_call(
            options.limits.clone(),
            options.feature_control.clone(),
            options.signal.clone(),
        );
    }

    /// Installs per-call globals, refusing forbidden names and banned
    /// identities, and wrapping host values read-only. Returns the
    /// replaced bindings for restoration.
    fn inject_globals(
        &self,
        options: &EvalOptions,
    ) -> Result<Vec<(String, Option<Binding>)>, SandpawError> {
        let mut saved = Vec::new();
        for (name, value) in &options.globals {
            if security::is_forbidden_global(name) {
                self.restore_globals(saved);
                return Err(SandpawError::new(
                    ErrorKind::PropertyNameForbidden,
                    format!("'{}' may not be injected as a global", name),
                ));
            }
            if self.engine.is_banned_identity(value) {
                self.restore_globals(saved);
                return Err(SandpawError::new(
                    ErrorKind::PropertyNameForbidden,
                    format!("the value bound to '{}' is banned as a global", name),
                ));
            }
            let wrapped = security::wrap_host_value(value.clone());
            let previous = Environment::inject_global(&self.root, name, wrapped);
            saved.push((name.clone(), previous));
        }
        Ok(saved)
    }

    /// Restores (in reverse order) what `inject_globals` replaced.
    fn restore_globals(&self, saved: Vec<(String, Option<Binding>)>) {
        for (name, previous) in saved.into_iter().rev() {
            Environment::restore_binding(&self.root, &name, previous);
        }
    }

    /// Enriches an escaping error exactly once with the last location,
    /// the source line and a call-stack snapshot.
    fn finish(&self, outcome: Result<Value, SandpawError>) -> Result<Value, SandpawError> {
        outcome.map_err(|mut err| {
            err.enrich(
                self.engine.last_span.get(),
                self.source.borrow().as_deref(),
                self.engine.capture_stack(),
            );
            err
        })
    }
}

/// Runs a program's top-level statements, tracking the completion value
/// of expression statements.
fn run_program_sync(
    engine: &Rc<EngineState>,
    env: &Rc<RefCell<Environment>>,
    program: &Program,
) -> Result<Value, SandpawError> {
    hoist_functions(&program.body, env, engine)?;
    let mut completion = Value::Undefined;
    for stmt in &program.body {
        match stmt {
            Stmt::FunctionDecl { .. } => {}
            Stmt::Expression { expr, .. } => {
                completion = expressions::eval_expr(expr, env, engine)?;
            }
            other => match exec_stmt(other, env, engine)? {
                ExecSignal::None => {}
                ExecSignal::Return(value) => return Ok(value),
                ExecSignal::Break(_) | ExecSignal::Continue(_) => {
                    return Err(SandpawError::type_mismatch(
                        "loop control outside a loop",
                    ))
                }
            },
        }
    }
    Ok(completion)
}

/// The asynchronous twin of [`run_program_sync`].
async fn run_program_async(
    ctx: &AsyncCtx,
    env: &Rc<RefCell<Environment>>,
    program: &Program,
) -> Result<Value, SandpawError> {
    hoist_functions(&program.body, env, &ctx.engine)?;
    let mut completion = Value::Undefined;
    for stmt in &program.body {
        match stmt {
            Stmt::FunctionDecl { .. } => {}
            Stmt::Expression { expr, .. } => {
                completion = async_expressions::eval_expr_async(expr, env, ctx).await?;
            }
            other => match async_statements::exec_stmt_async(other, env, ctx).await? {
                ExecSignal::None => {}
                ExecSignal::Return(value) => return Ok(value),
                ExecSignal::Break(_) | ExecSignal::Continue(_) => {
                    return Err(SandpawError::type_mismatch(
                        "loop control outside a loop",
                    ))
                }
            },
        }
    }
    Ok(completion)
}

/// Statement-step iterator produced by [`Interpreter::evaluate_steps`].
pub struct StepIterator {
    engine: Rc<EngineState>,
    env: Rc<RefCell<Environment>>,
    program: Program,
    index: usize,
    finished: bool,
    completion: Value,
}

impl Iterator for StepIterator {
    type Item = Result<StepInfo, SandpawError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished || self.index >= self.program.body.len() {
            return None;
        }
        let stmt = self.program.body[self.index].clone();
        self.index += 1;

        let outcome = match &stmt {
            Stmt::FunctionDecl { .. } => Ok(()),
            Stmt::Expression { expr, .. } => {
                match expressions::eval_expr(expr, &self.env, &self.engine) {
                    Ok(value) => {
                        self.completion = value;
                        Ok(())
                    }
                    Err(err) => Err(err),
                }
            }
            other => match exec_stmt(other, &self.env, &self.engine) {
                Ok(ExecSignal::Return(value)) => {
                    self.completion = value;
                    self.index = self.program.body.len();
                    Ok(())
                }
                Ok(_) => Ok(()),
                Err(err) => Err(err),
            },
        };

        if let Err(err) = outcome {
            self.finished = true;
            return Some(Err(err));
        }

        let done = self.index >= self.program.body.len();
        if done {
            self.finished = true;
        }
        Some(Ok(StepInfo {
            node_kind: stmt.kind_name().to_string(),
            line: Some(stmt.span().line),
            done,
            result: done.then(|| self.completion.clone()),
        }))
    }
}
