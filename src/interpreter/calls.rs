/*
 * ==========================================================================
 * SANDPAW - Safe Claws for Untrusted Code!
 * ==========================================================================
 *
 * Function & Method Invocation
 * ----------------------------
 * Everything that enters or leaves a callable passes through here:
 * guest-function calls (sync and async flavours), host-function calls
 * with argument wrapping and result proxying, parameter binding with
 * defaults / rest / destructuring, the generator coroutine builder, and
 * the conversion of guest closures into host-callable values.
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

use crate::ast::FunctionBody;
use crate::error::{ErrorKind, SandpawError};
use crate::host::{HostCallable, HostFunction};
use crate::interpreter::async_statements::exec_block_async;
use crate::interpreter::engine::{EngineState, Frame};
use crate::interpreter::environment::{Environment, ThisState};
use crate::interpreter::generators::{self, YieldChannel};
use crate::interpreter::helpers::{self, BindMode};
use crate::interpreter::statements::{exec_block, ExecSignal};
use crate::interpreter::{async_expressions, expressions};
use crate::security;
use crate::value::{FunctionData, Value};

/// Context threaded through the asynchronous walker: the shared engine,
/// whether the surrounding drive is synchronous (which forbids real
/// awaits), and the yield channel when running inside a generator
/// coroutine.
#[derive(Clone)]
pub struct AsyncCtx {
    pub engine: Rc<EngineState>,
    pub sync_driven: bool,
    pub channel: Option<Rc<YieldChannel>>,
}

impl AsyncCtx {
    pub fn new(engine: Rc<EngineState>) -> Self {
        AsyncCtx {
            engine,
            sync_driven: false,
            channel: None,
        }
    }
}

/* ============================================================================
 * Synchronous Call Paths
 * ============================================================================
 */

/// Calls any callable value from the synchronous evaluator.
pub fn call_value_sync(
    engine: &Rc<EngineState>,
    callee: &Value,
    args: Vec<Value>,
    this: Option<Value>,
) -> Result<Value, SandpawError> {
    match callee {
        Value::Function(func) => {
            if func.node.is_generator {
                return Ok(generators::create_generator(
                    func.clone(),
                    args,
                    this,
                    func.node.is_async,
                    true,
                ));
            }
            if func.node.is_async {
                return Err(SandpawError::new(
                    ErrorKind::AsyncInSync,
                    "async functions require the asynchronous evaluator",
                ));
            }
            call_function_sync(engine, func, args, this)
        }
        Value::HostFunction(host) => call_host_sync(engine, host, args),
        Value::Class(_) => Err(SandpawError::new(
            ErrorKind::ConstructorWithoutNew,
            "class constructors must be called with 'new'",
        )),
        other => Err(SandpawError::not_callable(other.type_name())),
    }
}

/// Calls a plain guest function synchronously.
pub fn call_function_sync(
    engine: &Rc<EngineState>,
    func: &Rc<FunctionData>,
    args: Vec<Value>,
    this: Option<Value>,
) -> Result<Value, SandpawError> {
    let env = prepare_call_env(engine, func, args, this)?;
    push_function_frame(engine, func)?;
    let result = run_body_sync(engine, func, &env);
    engine.pop_frame();
    result
}

fn run_body_sync(
    engine: &Rc<EngineState>,
    func: &Rc<FunctionData>,
    env: &Rc<RefCell<Environment>>,
) -> Result<Value, SandpawError> {
    match &func.node.body {
        FunctionBody::Expression(expr) => expressions::eval_expr(expr, env, engine),
        FunctionBody::Block(body) => match exec_block(body, env, engine)? {
            ExecSignal::Return(value) => Ok(value),
            ExecSignal::None => Ok(Value::Undefined),
            ExecSignal::Break(_) | ExecSignal::Continue(_) => Err(SandpawError::type_mismatch(
                "loop control escaped its function body",
            )),
        },
    }
}

/// Calls a host function from the synchronous evaluator. Async host
/// functions are rejected here: the sync walker has nowhere to suspend.
pub fn call_host_sync(
    engine: &Rc<EngineState>,
    host: &Rc<HostFunction>,
    args: Vec<Value>,
) -> Result<Value, SandpawError> {
    let args = wrap_callback_args(engine, host, args, false);
    log::trace!("host call (sync): {}", host.name);

    match &host.callable {
        HostCallable::Sync(f) => finish_host_call(engine, host, f(args)),
        HostCallable::Async(_) => Err(SandpawError::new(
            ErrorKind::AsyncInSync,
            format!(
                "host function '{}' is asynchronous and needs the asynchronous evaluator",
                host.name
            ),
        )),
    }
}

/* ============================================================================
 * Asynchronous Call Paths
 * ============================================================================
 */

/// Calls any callable value from the asynchronous evaluator.
pub async fn call_value_async(
    ctx: &AsyncCtx,
    callee: &Value,
    args: Vec<Value>,
    this: Option<Value>,
) -> Result<Value, SandpawError> {
    match callee {
        Value::Function(func) => {
            if func.node.is_generator {
                return Ok(generators::create_generator(
                    func.clone(),
                    args,
                    this,
                    func.node.is_async,
                    ctx.sync_driven,
                ));
            }
            if func.node.is_async {
                // Async guest calls settle eagerly; guest throws become a
                // rejected promise that `await` re-raises, while resource
                // and abort failures surface immediately.
                return match call_function_async(ctx, func, args, this).await {
                    Ok(value) => Ok(Value::fulfilled_promise(value)),
                    Err(err) if is_promise_capturable(&err) => Ok(Value::rejected_promise(err)),
                    Err(err) => Err(err),
                };
            }
            call_function_async(ctx, func, args, this).await
        }
        Value::HostFunction(host) => call_host_async(ctx, host, args).await,
        Value::Class(_) => Err(SandpawError::new(
            ErrorKind::ConstructorWithoutNew,
            "class constructors must be called with 'new'",
        )),
        other => Err(SandpawError::not_callable(other.type_name())),
    }
}

fn is_promise_capturable(err: &SandpawError) -> bool {
    !err.is_control()
        && !matches!(
            err.kind,
            ErrorKind::Aborted
                | ErrorKind::AsyncInSync
                | ErrorKind::MaxCallStackDepthExceeded
                | ErrorKind::MaxLoopIterationsExceeded
                | ErrorKind::MaxMemoryExceeded
        )
}

/// Calls a guest function with the asynchronous walker.
pub async fn call_function_async(
    ctx: &AsyncCtx,
    func: &Rc<FunctionData>,
    args: Vec<Value>,
    this: Option<Value>,
) -> Result<Value, SandpawError> {
    let engine = &ctx.engine;
    let env = prepare_call_env(engine, func, args, this)?;
    push_function_frame(engine, func)?;

    // The callee leaves any surrounding generator channel behind: its
    // own yields (if any) belong to its own coroutine.
    let callee_ctx = AsyncCtx {
        engine: engine.clone(),
        sync_driven: ctx.sync_driven,
        channel: None,
    };

    let result = run_body_async(&callee_ctx, func, &env).await;
    engine.pop_frame();
    result
}

async fn run_body_async(
    ctx: &AsyncCtx,
    func: &Rc<FunctionData>,
    env: &Rc<RefCell<Environment>>,
) -> Result<Value, SandpawError> {
    match &func.node.body {
        FunctionBody::Expression(expr) => {
            async_expressions::eval_expr_async(expr, env, ctx).await
        }
        FunctionBody::Block(body) => match exec_block_async(body, env, ctx).await? {
            ExecSignal::Return(value) => Ok(value),
            ExecSignal::None => Ok(Value::Undefined),
            ExecSignal::Break(_) | ExecSignal::Continue(_) => Err(SandpawError::type_mismatch(
                "loop control escaped its function body",
            )),
        },
    }
}

/// Calls a host function from the asynchronous evaluator, awaiting
/// async flavours at the call site.
pub async fn call_host_async(
    ctx: &AsyncCtx,
    host: &Rc<HostFunction>,
    args: Vec<Value>,
) -> Result<Value, SandpawError> {
    let engine = &ctx.engine;

    if host.is_async() && ctx.sync_driven {
        return Err(SandpawError::new(
            ErrorKind::AsyncInSync,
            format!(
                "host function '{}' is asynchronous and cannot run under a synchronous drive",
                host.name
            ),
        ));
    }

    let args = wrap_callback_args(engine, host, args, host.is_async());
    log::trace!("host call (async): {}", host.name);

    match &host.callable {
        HostCallable::Sync(f) => finish_host_call(engine, host, f(args)),
        HostCallable::Async(f) => {
            let outcome = f(args).await;
            finish_host_call(engine, host, outcome)
        }
    }
}

/* ============================================================================
 * Host Bridge Plumbing
 * ============================================================================
 */

/// Converts guest-function arguments into host-callable closures of the
/// requested flavour, and prepends the pre-bound receiver if any.
fn wrap_callback_args(
    engine: &Rc<EngineState>,
    host: &Rc<HostFunction>,
    args: Vec<Value>,
    asynchronous: bool,
) -> Vec<Value> {
    let mut out = Vec::with_capacity(args.len() + 1);
    if let Some(receiver) = host.bound_this.borrow().clone() {
        out.push(receiver);
    }
    for arg in args {
        if host.skip_arg_wrapping {
            out.push(arg);
            continue;
        }
        match arg {
            Value::Function(func) => {
                out.push(wrap_guest_callback(engine.clone(), func, asynchronous))
            }
            other => out.push(other),
        }
    }
    out
}

/// Exposes a guest closure as a host-callable value. Calling it
/// re-enters the evaluator with the closure's captured environment; its
/// `this` comes from the closure, not from the host call site.
pub fn wrap_guest_callback(
    engine: Rc<EngineState>,
    func: Rc<FunctionData>,
    asynchronous: bool,
) -> Value {
    let name = func
        .name
        .borrow()
        .clone()
        .unwrap_or_else(|| "callback".to_string());

    if asynchronous {
        HostFunction::async_fn(name, move |args: Vec<Value>| {
            let ctx = AsyncCtx::new(engine.clone());
            let func = func.clone();
            async move {
                let value = call_value_async(&ctx, &Value::Function(func), args, None).await?;
                helpers::settle_awaited(value)
            }
            .boxed_local()
        })
    } else {
        HostFunction::sync(name, move |args: Vec<Value>| {
            call_value_sync(&engine, &Value::Function(func.clone()), args, None)
        })
    }
}

/// Applies the security switches to a finished host call: results are
/// wrapped read-only, and host-raised failures have their message
/// redacted or sanitised per configuration. Guest and evaluator errors
/// merely passing through (callback re-entry, driver methods) are left
/// untouched.
fn finish_host_call(
    engine: &Rc<EngineState>,
    host: &Rc<HostFunction>,
    outcome: Result<Value, SandpawError>,
) -> Result<Value, SandpawError> {
    match outcome {
        Ok(value) => Ok(security::wrap_host_value(value)),
        Err(err) if err.kind != ErrorKind::HostFunctionError => Err(err),
        Err(mut err) => {
            let security_opts = engine.security.borrow().clone();
            if host.rethrow {
                // keep the original message
            } else if security_opts.hide_host_errors {
                err.redact_message();
            } else if security_opts.sanitize_stack_traces {
                err.message = security::sanitize_host_message(&err.message);
            }
            log::debug!("host function '{}' failed: {}", host.name, err.message);
            Err(err)
        }
    }
}

/* ============================================================================
 * Parameter Binding
 * ============================================================================
 */

/// Builds the function-scope environment for a call: parent is the
/// captured environment, `this` is bound for non-arrows, parameters are
/// bound with defaults, rest and destructuring.
pub fn prepare_call_env(
    engine: &Rc<EngineState>,
    func: &Rc<FunctionData>,
    args: Vec<Value>,
    this: Option<Value>,
) -> Result<Rc<RefCell<Environment>>, SandpawError> {
    let env = Environment::function_child(&func.env);
    if !func.node.is_arrow {
        env.borrow_mut().this_slot = ThisState::Ready(this.unwrap_or(Value::Undefined));
    }
    bind_params(engine, &env, func, args)?;
    Ok(env)
}

/// Binds the parameter list against the evaluated arguments.
pub fn bind_params(
    engine: &Rc<EngineState>,
    env: &Rc<RefCell<Environment>>,
    func: &Rc<FunctionData>,
    args: Vec<Value>,
) -> Result<(), SandpawError> {
    let params = &func.node.params;

    let required = params
        .iter()
        .enumerate()
        .filter(|(_, p)| !p.rest && p.default.is_none())
        .map(|(i, _)| i + 1)
        .max()
        .unwrap_or(0);
    if args.len() < required {
        return Err(SandpawError::new(
            ErrorKind::ArgumentCount,
            format!(
                "expected at least {} argument(s), got {}",
                required,
                args.len()
            ),
        ));
    }

    for (index, param) in params.iter().enumerate() {
        if param.rest {
            let rest: Vec<Value> = args.iter().skip(index).cloned().collect();
            engine.charge_memory(rest.len() as u64 * helpers::BYTES_PER_ARRAY_SLOT)?;
            helpers::bind_pattern(
                engine,
                env,
                &param.pattern,
                Value::new_array(rest),
                BindMode::Declare(crate::interpreter::environment::BindingKind::FunctionScoped),
            )?;
            break;
        }

        let mut value = args.get(index).cloned().unwrap_or(Value::Undefined);
        if matches!(value, Value::Undefined) {
            if let Some(default) = &param.default {
                value = expressions::eval_expr(default, env, engine)?;
            }
        }
        helpers::bind_pattern(
            engine,
            env,
            &param.pattern,
            value,
            BindMode::Declare(crate::interpreter::environment::BindingKind::FunctionScoped),
        )?;
    }
    Ok(())
}

fn push_function_frame(
    engine: &Rc<EngineState>,
    func: &Rc<FunctionData>,
) -> Result<(), SandpawError> {
    let frame = Frame {
        function_name: func.name.borrow().clone(),
        line: Some(func.node.span.line),
        column: Some(func.node.span.column),
        home_class: func.home_class(),
        home_is_static: func.home_is_static.get(),
        super_called: std::cell::Cell::new(false),
        pending_instance: RefCell::new(None),
    };
    engine.push_frame(frame)
}

/* ============================================================================
 * Generator Coroutine Builder
 * ============================================================================
 */

/// Builds the host coroutine that walks a generator body. The future
/// owns everything it touches, so it can outlive the resume that
/// created it.
pub fn generator_coroutine(
    engine: Rc<EngineState>,
    func: Rc<FunctionData>,
    args: Vec<Value>,
    this: Option<Value>,
    channel: Rc<YieldChannel>,
    sync_driven: bool,
) -> LocalBoxFuture<'static, Result<Value, SandpawError>> {
    async move {
        let env = prepare_call_env(&engine, &func, args, this)?;
        push_function_frame(&engine, &func)?;

        let ctx = AsyncCtx {
            engine: engine.clone(),
            sync_driven,
            channel: Some(channel),
        };
        let result = run_body_async(&ctx, &func, &env).await;
        engine.pop_frame();
        result
    }
    .boxed_local()
}
