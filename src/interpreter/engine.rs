/*
 * ==========================================================================
 * SANDPAW - Safe Claws for Untrusted Code!
 * ==========================================================================
 *
 * Shared Evaluation State
 * -----------------------
 * One `EngineState` exists per interpreter instance and is threaded
 * through both walkers, the call machinery and the generator drivers.
 * It owns the statistics, the resource limits, the call-frame stack,
 * the instance/class registry, the per-receiver method-binding cache,
 * and the abort signal.
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

use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::rc::{Rc, Weak};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::{ErrorKind, SandpawError, StackFrame};
use crate::interpreter::classes::ClassData;
use crate::interpreter::features::FeatureControl;
use crate::span::Span;
use crate::value::{ObjectData, Value};

/// How often the abort signal is polled, in node evaluations.
pub const ABORT_POLL_INTERVAL: u32 = 256;

/// How often the instance registry drops dead weak entries, in
/// registrations.
const COMPACTION_INTERVAL: u64 = 1024;

/// Per-call execution counters exposed through `get_stats`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Stats {
    pub node_count: u64,
    pub function_calls: u64,
    pub loop_iterations: u64,
    pub execution_time_ms: f64,
}

/// Per-call resource ceilings. `None` means unlimited.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Limits {
    pub max_call_stack_depth: Option<usize>,
    pub max_loop_iterations: Option<u64>,
    pub max_memory: Option<u64>,
}

/// Host-facing error disclosure switches. Both default to on.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SecurityOptions {
    pub sanitize_stack_traces: bool,
    pub hide_host_errors: bool,
}

impl Default for SecurityOptions {
    fn default() -> Self {
        Self {
            sanitize_stack_traces: true,
            hide_host_errors: true,
        }
    }
}

/// One guest call frame.
pub struct Frame {
    pub function_name: Option<String>,
    pub line: Option<usize>,
    pub column: Option<usize>,
    /// The class lexically containing the running method; resolves
    /// `super` and private names.
    pub home_class: Option<Rc<ClassData>>,
    pub home_is_static: bool,
    /// Tracks the exactly-once rule for derived constructors.
    pub super_called: Cell<bool>,
    /// The instance under construction in a derived constructor, handed
    /// to the parent chain when `super(…)` runs.
    pub pending_instance: RefCell<Option<Value>>,
}

impl Frame {
    pub fn plain(name: Option<String>, span: Option<Span>) -> Self {
        Frame {
            function_name: name,
            line: span.map(|s| s.line),
            column: span.map(|s| s.column),
            home_class: None,
            home_is_static: false,
            super_called: Cell::new(false),
            pending_instance: RefCell::new(None),
        }
    }
}

/// Weak instance → class registry backing `instanceof`, method lookup
/// and private-field scoping. Entries die with their instances; dead
/// weak references are compacted on a cadence.
#[derive(Default)]
pub struct InstanceRegistry {
    entries: HashMap<usize, (Weak<RefCell<ObjectData>>, Rc<ClassData>)>,
    registrations: u64,
}

impl InstanceRegistry {
    pub fn register(&mut self, object: &Rc<RefCell<ObjectData>>, class: Rc<ClassData>) {
        self.registrations += 1;
        if self.registrations % COMPACTION_INTERVAL == 0 {
            self.compact();
        }
        self.entries
            .insert(Rc::as_ptr(object) as usize, (Rc::downgrade(object), class));
    }

    pub fn class_of(&self, value: &Value) -> Option<Rc<ClassData>> {
        let ptr = match value {
            Value::Object(data) => Rc::as_ptr(data) as usize,
            _ => return None,
        };
        let (weak, class) = self.entries.get(&ptr)?;
        // A dead weak pointer means the address was reused.
        weak.upgrade()?;
        Some(class.clone())
    }

    fn compact(&mut self) {
        self.entries.retain(|_, (weak, _)| weak.strong_count() > 0);
    }
}

/// The state shared by every evaluation inside one interpreter.
pub struct EngineState {
    pub stats: RefCell<Stats>,
    pub limits: RefCell<Limits>,
    pub security: RefCell<SecurityOptions>,
    pub features: RefCell<FeatureControl>,
    pub signal: RefCell<Option<Arc<AtomicBool>>>,
    pub frames: RefCell<Vec<Frame>>,
    pub instances: RefCell<InstanceRegistry>,
    /// Per-receiver bound-method cache for arrays, strings, generators
    /// and the other built-in surfaces, so `a.push === a.push`.
    pub method_cache: RefCell<HashMap<(usize, &'static str), Value>>,
    /// Values banned as globals by identity, so aliasing a dangerous
    /// host constructor cannot smuggle it past the name filter.
    pub banned_identities: RefCell<Vec<Value>>,
    pub last_span: Cell<Option<Span>>,
    node_tick: Cell<u32>,
    memory_used: Cell<u64>,
}

impl EngineState {
    pub fn new() -> Rc<Self> {
        Rc::new(EngineState {
            stats: RefCell::new(Stats::default()),
            limits: RefCell::new(Limits::default()),
            security: RefCell::new(SecurityOptions::default()),
            features: RefCell::new(FeatureControl::default()),
            signal: RefCell::new(None),
            frames: RefCell::new(Vec::new()),
            instances: RefCell::new(InstanceRegistry::default()),
            method_cache: RefCell::new(HashMap::new()),
            banned_identities: RefCell::new(Vec::new()),
            last_span: Cell::new(None),
            node_tick: Cell::new(0),
            memory_used: Cell::new(0),
        })
    }

    /// Resets the per-call counters at the start of an evaluation.
    pub fn begin_call(&self, limits: Limits, features: FeatureControl, signal: Option<Arc<AtomicBool>>) {
        *self.stats.borrow_mut() = Stats::default();
        *self.limits.borrow_mut() = limits;
        *self.features.borrow_mut() = features;
        *self.signal.borrow_mut() = signal;
        self.frames.borrow_mut().clear();
        self.node_tick.set(0);
        self.memory_used.set(0);
        self.last_span.set(None);
    }

    /// Bookkeeping done for every node evaluation: counts the node,
    /// remembers the location for error enrichment, and polls the abort
    /// signal on a throttled schedule.
    pub fn record_node(&self, span: Span) -> Result<(), SandpawError> {
        self.stats.borrow_mut().node_count += 1;
        self.last_span.set(Some(span));

        let tick = self.node_tick.get().wrapping_add(1);
        self.node_tick.set(tick);
        if tick % ABORT_POLL_INTERVAL == 0 {
            self.check_abort()?;
        }
        Ok(())
    }

    pub fn check_abort(&self) -> Result<(), SandpawError> {
        if let Some(signal) = self.signal.borrow().as_ref() {
            if signal.load(Ordering::Relaxed) {
                return Err(SandpawError::new(
                    ErrorKind::Aborted,
                    "evaluation aborted by the host",
                ));
            }
        }
        Ok(())
    }

    pub fn check_feature(
        &self,
        tag: crate::interpreter::features::FeatureTag,
    ) -> Result<(), SandpawError> {
        self.features.borrow().check(tag)
    }

    /// Enters a guest call frame, enforcing the depth limit.
    pub fn push_frame(&self, frame: Frame) -> Result<(), SandpawError> {
        {
            let frames = self.frames.borrow();
            if let Some(max) = self.limits.borrow().max_call_stack_depth {
                if frames.len() >= max {
                    return Err(SandpawError::new(
                        ErrorKind::MaxCallStackDepthExceeded,
                        format!("call stack depth limit of {} exceeded", max),
                    ));
                }
            }
        }
        self.stats.borrow_mut().function_calls += 1;
        self.frames.borrow_mut().push(frame);
        Ok(())
    }

    pub fn pop_frame(&self) {
        self.frames.borrow_mut().pop();
    }

    pub fn current_home_class(&self) -> Option<(Rc<ClassData>, bool)> {
        let frames = self.frames.borrow();
        let frame = frames.last()?;
        frame
            .home_class
            .as_ref()
            .map(|c| (c.clone(), frame.home_is_static))
    }

    /// Flags the current frame's `super()` as called, enforcing the
    /// exactly-once rule.
    pub fn mark_super_called(&self) -> Result<(), SandpawError> {
        let frames = self.frames.borrow();
        let frame = frames.last().ok_or_else(|| {
            SandpawError::new(ErrorKind::SuperNotCalled, "super() outside a constructor")
        })?;
        if frame.super_called.get() {
            return Err(SandpawError::new(
                ErrorKind::SuperAlreadyCalled,
                "super() may only be called once",
            ));
        }
        frame.super_called.set(true);
        Ok(())
    }

    pub fn super_called(&self) -> bool {
        self.frames
            .borrow()
            .last()
            .map(|f| f.super_called.get())
            .unwrap_or(false)
    }

    /// Per-iteration accounting for a single loop: bumps the global
    /// counter, checks the per-loop ceiling and polls the abort signal.
    pub fn loop_tick(&self, iterations: &mut u64) -> Result<(), SandpawError> {
        *iterations += 1;
        self.stats.borrow_mut().loop_iterations += 1;

        if let Some(max) = self.limits.borrow().max_loop_iterations {
            if *iterations > max {
                return Err(SandpawError::new(
                    ErrorKind::MaxLoopIterationsExceeded,
                    format!("loop iteration limit of {} exceeded", max),
                ));
            }
        }
        self.check_abort()
    }

    /// Best-effort memory accounting; see the documented heuristic.
    pub fn charge_memory(&self, bytes: u64) -> Result<(), SandpawError> {
        let used = self.memory_used.get().saturating_add(bytes);
        self.memory_used.set(used);
        if let Some(max) = self.limits.borrow().max_memory {
            if used > max {
                return Err(SandpawError::new(
                    ErrorKind::MaxMemoryExceeded,
                    format!("memory limit of {} bytes exceeded", max),
                ));
            }
        }
        Ok(())
    }

    /// Snapshot of the guest call stack for error enrichment.
    pub fn capture_stack(&self) -> Vec<StackFrame> {
        self.frames
            .borrow()
            .iter()
            .rev()
            .map(|frame| StackFrame {
                function_name: frame.function_name.clone(),
                line: frame.line,
                column: frame.column,
            })
            .collect()
    }

    /// Cached bound method for a built-in receiver, building it on the
    /// first access.
    pub fn cached_method(
        &self,
        receiver_ptr: usize,
        name: &'static str,
        build: impl FnOnce() -> Value,
    ) -> Value {
        if let Some(hit) = self.method_cache.borrow().get(&(receiver_ptr, name)) {
            return hit.clone();
        }
        let value = build();
        self.method_cache
            .borrow_mut()
            .insert((receiver_ptr, name), value.clone());
        value
    }

    /// Whether the value is identity-banned as a global.
    pub fn is_banned_identity(&self, value: &Value) -> bool {
        let Some(ptr) = value.identity_ptr() else {
            return false;
        };
        self.banned_identities
            .borrow()
            .iter()
            .any(|banned| banned.identity_ptr() == Some(ptr))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn abort_polls_on_the_interval() {
        let engine = EngineState::new();
        let signal = Arc::new(AtomicBool::new(false));
        *engine.signal.borrow_mut() = Some(signal.clone());

        signal.store(true, Ordering::Relaxed);

        // The first few nodes slip through; the poll interval catches it.
        let mut failed = false;
        for _ in 0..ABORT_POLL_INTERVAL {
            if engine.record_node(Span::new(1, 0)).is_err() {
                failed = true;
                break;
            }
        }
        assert!(failed);
    }

    #[test]
    fn call_depth_limit_is_enforced_on_entry() {
        let engine = EngineState::new();
        engine.limits.borrow_mut().max_call_stack_depth = Some(2);

        engine.push_frame(Frame::plain(None, None)).unwrap();
        engine.push_frame(Frame::plain(None, None)).unwrap();
        assert!(engine.push_frame(Frame::plain(None, None)).is_err());
    }

    #[test]
    fn loop_limit_is_per_loop() {
        let engine = EngineState::new();
        engine.limits.borrow_mut().max_loop_iterations = Some(3);

        let mut first_loop = 0;
        for _ in 0..3 {
            engine.loop_tick(&mut first_loop).unwrap();
        }
        assert!(engine.loop_tick(&mut first_loop).is_err());

        // A fresh loop starts a fresh counter.
        let mut second_loop = 0;
        assert!(engine.loop_tick(&mut second_loop).is_ok());
    }

    #[test]
    fn memory_accounting_trips_the_limit() {
        let engine = EngineState::new();
        engine.limits.borrow_mut().max_memory = Some(100);
        assert!(engine.charge_memory(64).is_ok());
        assert!(engine.charge_memory(64).is_err());
    }
}
