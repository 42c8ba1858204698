/*
 * ==========================================================================
 * SANDPAW - Safe Claws for Untrusted Code!
 * ==========================================================================
 *
 * Generator Coroutine Driver
 * --------------------------
 * Guest `yield` may sit anywhere inside nested loops, try/finally or
 * expressions, so the driver cannot run guest control flow by juggling
 * sentinels. Instead every generator owns a host coroutine: the async
 * walker's future for the generator body. A yield parks its value in
 * the shared channel and suspends the future; the driver hands the
 * value out and later feeds the resume value (or an injected throw /
 * return) back through the same channel.
 *
 * Synchronous generators are driven with a no-op waker: one poll per
 * resume, because the only pending point a sync-driven body can reach
 * is a yield. Asynchronous generators are driven by awaiting the same
 * future, so real host awaits between yields work as well.
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
use std::future::Future;
use std::pin::Pin;
use std::rc::Rc;
use std::task::{Context, Poll};

use futures::future::LocalBoxFuture;
use futures::task::noop_waker;
use futures::FutureExt;

use crate::error::{ErrorKind, SandpawError};
use crate::host::HostFunction;
use crate::interpreter::calls;
use crate::interpreter::engine::{EngineState, Frame};
use crate::value::{FunctionData, Value};

/// Driver states, as observed between resumes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GenState {
    SuspendedStart,
    Executing,
    SuspendedYield,
    Completed,
}

/// What the driver feeds back into a suspended yield.
pub enum ResumeMode {
    Next(Value),
    Throw(SandpawError),
    Return(Value),
}

/// One `{value, done}` step of the protocol.
pub struct IterStep {
    pub value: Value,
    pub done: bool,
}

/// The two-way value channel between a coroutine and its driver.
pub struct YieldChannel {
    /// Value parked by the most recent guest `yield`.
    pub yielded: RefCell<Option<Value>>,
    /// Value (or injected control) the driver feeds back on resume.
    pub resume: RefCell<Option<ResumeMode>>,
}

impl YieldChannel {
    pub fn new() -> Rc<Self> {
        Rc::new(YieldChannel {
            yielded: RefCell::new(None),
            resume: RefCell::new(None),
        })
    }
}

/// A live generator or async generator.
pub struct GeneratorData {
    pub state: GenState,
    pub function: Rc<FunctionData>,
    pub args: Vec<Value>,
    pub this_value: Option<Value>,
    pub is_async: bool,
    /// Whether the creating evaluation was synchronous; a sync-driven
    /// body may not reach a real await.
    pub sync_driven: bool,
    channel: Rc<YieldChannel>,
    coroutine: Option<LocalBoxFuture<'static, Result<Value, SandpawError>>>,
    /// Call frames parked while the coroutine is suspended, so the main
    /// evaluation's stack stays consistent.
    stashed_frames: Vec<Frame>,
}

/// Creates a generator value in the suspended-start state. The
/// coroutine itself is built lazily on the first resume.
pub fn create_generator(
    func: Rc<FunctionData>,
    args: Vec<Value>,
    this_value: Option<Value>,
    is_async: bool,
    sync_driven: bool,
) -> Value {
    let data = Rc::new(RefCell::new(GeneratorData {
        state: GenState::SuspendedStart,
        function: func,
        args,
        this_value,
        is_async,
        sync_driven,
        channel: YieldChannel::new(),
        coroutine: None,
        stashed_frames: Vec::new(),
    }));
    if is_async {
        Value::AsyncGenerator(data)
    } else {
        Value::Generator(data)
    }
}

/// The suspension point evaluated for each guest `yield`: parks the
/// yielded value, suspends exactly once, then resolves to whatever the
/// driver fed back.
pub struct YieldPoint {
    channel: Rc<YieldChannel>,
    parked: bool,
}

impl YieldPoint {
    pub fn new(channel: Rc<YieldChannel>, value: Value) -> Self {
        *channel.yielded.borrow_mut() = Some(value);
        Self {
            channel,
            parked: false,
        }
    }
}

impl Future for YieldPoint {
    type Output = Result<Value, SandpawError>;

    fn poll(mut self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<Self::Output> {
        if !self.parked {
            self.parked = true;
            return Poll::Pending;
        }
        match self.channel.resume.borrow_mut().take() {
            Some(ResumeMode::Next(value)) => Poll::Ready(Ok(value)),
            Some(ResumeMode::Throw(err)) => Poll::Ready(Err(err)),
            Some(ResumeMode::Return(value)) => Poll::Ready(Err(SandpawError::new(
                ErrorKind::GeneratorReturn,
                "generator closed",
            )
            .with_thrown(value))),
            // Resumed without a driver value (first poll after start).
            None => Poll::Ready(Ok(Value::Undefined)),
        }
    }
}

/// Outcome of the pre-poll checks.
enum FastPath {
    /// The resume resolves without running the coroutine.
    Step(IterStep),
    /// The resume fails without running the coroutine.
    Fail(SandpawError),
    /// The coroutine must actually be polled.
    Run,
}

/// Handles the driver states that need no polling, and parks the resume
/// value for the pending yield otherwise.
fn resume_fast_path(gen: &Rc<RefCell<GeneratorData>>, mode: ResumeMode) -> FastPath {
    let mut gen_ref = gen.borrow_mut();
    match gen_ref.state {
        GenState::Executing => FastPath::Fail(SandpawError::type_mismatch(
            "generator is already executing",
        )),
        GenState::Completed => match mode {
            ResumeMode::Next(_) => FastPath::Step(IterStep {
                value: Value::Undefined,
                done: true,
            }),
            ResumeMode::Return(value) => FastPath::Step(IterStep { value, done: true }),
            ResumeMode::Throw(err) => FastPath::Fail(err),
        },
        GenState::SuspendedStart => match mode {
            ResumeMode::Return(value) => {
                gen_ref.state = GenState::Completed;
                FastPath::Step(IterStep { value, done: true })
            }
            ResumeMode::Throw(err) => {
                gen_ref.state = GenState::Completed;
                FastPath::Fail(err)
            }
            ResumeMode::Next(_) => FastPath::Run,
        },
        GenState::SuspendedYield => {
            *gen_ref.channel.resume.borrow_mut() = Some(mode);
            FastPath::Run
        }
    }
}

/// Prepares the coroutine and call stack for a poll. Returns the frame
/// mark to stash against.
fn begin_poll(
    engine: &Rc<EngineState>,
    gen: &Rc<RefCell<GeneratorData>>,
) -> (LocalBoxFuture<'static, Result<Value, SandpawError>>, usize) {
    let mut gen_ref = gen.borrow_mut();
    let frames_mark = engine.frames.borrow().len();
    let stashed: Vec<Frame> = gen_ref.stashed_frames.drain(..).collect();
    engine.frames.borrow_mut().extend(stashed);

    let coroutine = match gen_ref.coroutine.take() {
        Some(c) => c,
        None => calls::generator_coroutine(
            engine.clone(),
            gen_ref.function.clone(),
            gen_ref.args.clone(),
            gen_ref.this_value.clone(),
            gen_ref.channel.clone(),
            gen_ref.sync_driven,
        ),
    };
    gen_ref.state = GenState::Executing;
    (coroutine, frames_mark)
}

fn settle_ready(
    gen: &Rc<RefCell<GeneratorData>>,
    result: Result<Value, SandpawError>,
) -> Result<IterStep, SandpawError> {
    gen.borrow_mut().state = GenState::Completed;
    match result {
        Ok(value) => Ok(IterStep { value, done: true }),
        Err(err) if err.kind == ErrorKind::GeneratorReturn => Ok(IterStep {
            value: err.thrown_value.unwrap_or(Value::Undefined),
            done: true,
        }),
        Err(err) => Err(err),
    }
}

fn settle_suspended(
    engine: &Rc<EngineState>,
    gen: &Rc<RefCell<GeneratorData>>,
    coroutine: LocalBoxFuture<'static, Result<Value, SandpawError>>,
    frames_mark: usize,
) -> Option<IterStep> {
    let mut gen_ref = gen.borrow_mut();
    let yielded = gen_ref.channel.yielded.borrow_mut().take();
    yielded.map(|value| {
        gen_ref.coroutine = Some(coroutine);
        gen_ref.state = GenState::SuspendedYield;
        gen_ref.stashed_frames = engine.frames.borrow_mut().split_off(frames_mark);
        IterStep { value, done: false }
    })
}

/// Advances a synchronous generator by one step.
pub fn resume_sync(
    engine: &Rc<EngineState>,
    gen: &Rc<RefCell<GeneratorData>>,
    mode: ResumeMode,
) -> Result<IterStep, SandpawError> {
    match resume_fast_path(gen, mode) {
        FastPath::Step(step) => return Ok(step),
        FastPath::Fail(err) => return Err(err),
        FastPath::Run => {}
    }

    let (mut coroutine, frames_mark) = begin_poll(engine, gen);
    let waker = noop_waker();
    let mut cx = Context::from_waker(&waker);

    match coroutine.as_mut().poll(&mut cx) {
        Poll::Ready(result) => settle_ready(gen, result),
        Poll::Pending => {
            match settle_suspended(engine, gen, coroutine, frames_mark) {
                Some(step) => Ok(step),
                None => {
                    // Pending without a yield: the body reached a real
                    // await while being driven synchronously.
                    gen.borrow_mut().state = GenState::Completed;
                    Err(SandpawError::new(
                        ErrorKind::AsyncInSync,
                        "generator awaited a host future under the synchronous evaluator",
                    ))
                }
            }
        }
    }
}

/// Advances an (async) generator by one step, awaiting real host
/// futures between yields.
pub async fn resume_async(
    engine: &Rc<EngineState>,
    gen: &Rc<RefCell<GeneratorData>>,
    mode: ResumeMode,
) -> Result<IterStep, SandpawError> {
    match resume_fast_path(gen, mode) {
        FastPath::Step(step) => return Ok(step),
        FastPath::Fail(err) => return Err(err),
        FastPath::Run => {}
    }

    let (coroutine, frames_mark) = begin_poll(engine, gen);
    let mut coroutine = Some(coroutine);
    let channel = gen.borrow().channel.clone();

    let outcome = futures::future::poll_fn(move |cx| {
        let Some(fut) = coroutine.as_mut() else {
            return Poll::Ready((None, None));
        };
        match fut.as_mut().poll(cx) {
            Poll::Ready(result) => Poll::Ready((None, Some(result))),
            Poll::Pending => {
                if channel.yielded.borrow().is_some() {
                    Poll::Ready((coroutine.take(), None))
                } else {
                    Poll::Pending
                }
            }
        }
    })
    .await;

    match outcome {
        (_, Some(result)) => settle_ready(gen, result),
        (Some(coroutine), None) => settle_suspended(engine, gen, coroutine, frames_mark)
            .ok_or_else(|| SandpawError::type_mismatch("generator suspended without a value")),
        (None, None) => Err(SandpawError::type_mismatch(
            "generator coroutine vanished mid-resume",
        )),
    }
}

/// Builds the `{value, done}` object the protocol hands back.
pub fn iter_result_object(step: IterStep) -> Value {
    let object = Value::new_object();
    if let Value::Object(data) = &object {
        let mut data = data.borrow_mut();
        data.props.insert("value".to_string(), step.value);
        data.props.insert("done".to_string(), Value::Bool(step.done));
    }
    object
}

/// Builds a bound `next` / `return` / `throw` driver method for a
/// generator value; cached per receiver by the caller.
pub fn bound_driver_method(
    engine: Rc<EngineState>,
    gen: Rc<RefCell<GeneratorData>>,
    method: &'static str,
    is_async: bool,
) -> Value {
    if is_async {
        HostFunction::async_fn(method, move |mut args: Vec<Value>| {
            let engine = engine.clone();
            let gen = gen.clone();
            async move {
                let arg = if args.is_empty() {
                    Value::Undefined
                } else {
                    args.remove(0)
                };
                let mode = mode_for(method, arg);
                let step = resume_async(&engine, &gen, mode).await?;
                Ok(iter_result_object(step))
            }
            .boxed_local()
        })
    } else {
        HostFunction::sync(method, move |mut args: Vec<Value>| {
            let arg = if args.is_empty() {
                Value::Undefined
            } else {
                args.remove(0)
            };
            let mode = mode_for(method, arg);
            let step = resume_sync(&engine, &gen, mode)?;
            Ok(iter_result_object(step))
        })
    }
}

fn mode_for(method: &str, arg: Value) -> ResumeMode {
    match method {
        "return" => ResumeMode::Return(arg),
        "throw" => ResumeMode::Throw(SandpawError::thrown(arg)),
        _ => ResumeMode::Next(arg),
    }
}
