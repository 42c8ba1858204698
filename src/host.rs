/*
 * ==========================================================================
 * SANDPAW - Safe Claws for Untrusted Code!
 * ==========================================================================
 *
 * Host Function Bridge
 * --------------------
 * The value type that exposes host callables to guest code. A host
 * function is only ever addressed through the member-access gate, which
 * hides its internals, reports `"function"` for type queries, answers
 * the thenable probe with `undefined`, and wraps function-valued members
 * as sub-host-functions with `this` pre-bound.
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
use indexmap::IndexMap;

use crate::error::SandpawError;
use crate::value::Value;

/// A synchronous host handler.
pub type SyncHandler = Rc<dyn Fn(Vec<Value>) -> Result<Value, SandpawError>>;

/// An asynchronous host handler. The returned future is driven by the
/// async evaluator at the call site; no guest code runs while it is
/// outstanding.
pub type AsyncHandler = Rc<dyn Fn(Vec<Value>) -> LocalBoxFuture<'static, Result<Value, SandpawError>>>;

pub enum HostCallable {
    Sync(SyncHandler),
    Async(AsyncHandler),
}

/// A host callable presented to the guest.
pub struct HostFunction {
    /// Display name used in stack traces and `stringify`.
    pub name: String,
    pub callable: HostCallable,
    /// When set, host errors keep their original message instead of the
    /// redacted generic line.
    pub rethrow: bool,
    /// When set, guest-function arguments are passed through raw instead
    /// of being wrapped as host-callable closures.
    pub skip_arg_wrapping: bool,
    /// Enumerable own members (e.g. `Array.isArray`). Function members
    /// are served through the access gate as sub-host-functions.
    pub props: RefCell<IndexMap<String, Value>>,
    /// Receiver pre-bound when this value was produced by reading a
    /// function-valued member off another host value.
    pub bound_this: RefCell<Option<Value>>,
}

impl HostFunction {
    pub fn is_async(&self) -> bool {
        matches!(self.callable, HostCallable::Async(_))
    }

    /// Builds a plain synchronous host function value.
    pub fn sync<F>(name: impl Into<String>, f: F) -> Value
    where
        F: Fn(Vec<Value>) -> Result<Value, SandpawError> + 'static,
    {
        Value::HostFunction(Rc::new(HostFunction {
            name: name.into(),
            callable: HostCallable::Sync(Rc::new(f)),
            rethrow: false,
            skip_arg_wrapping: false,
            props: RefCell::new(IndexMap::new()),
            bound_this: RefCell::new(None),
        }))
    }

    /// Builds an asynchronous host function value.
    pub fn async_fn<F>(name: impl Into<String>, f: F) -> Value
    where
        F: Fn(Vec<Value>) -> LocalBoxFuture<'static, Result<Value, SandpawError>> + 'static,
    {
        Value::HostFunction(Rc::new(HostFunction {
            name: name.into(),
            callable: HostCallable::Async(Rc::new(f)),
            rethrow: false,
            skip_arg_wrapping: false,
            props: RefCell::new(IndexMap::new()),
            bound_this: RefCell::new(None),
        }))
    }

    /// Like [`HostFunction::sync`], but errors keep their original text.
    pub fn sync_rethrow<F>(name: impl Into<String>, f: F) -> Value
    where
        F: Fn(Vec<Value>) -> Result<Value, SandpawError> + 'static,
    {
        Value::HostFunction(Rc::new(HostFunction {
            name: name.into(),
            callable: HostCallable::Sync(Rc::new(f)),
            rethrow: true,
            skip_arg_wrapping: false,
            props: RefCell::new(IndexMap::new()),
            bound_this: RefCell::new(None),
        }))
    }

    /// Rebuilds this host function with a pre-bound receiver, used when a
    /// function-valued member is read off a host value.
    pub fn bind_receiver(self: &Rc<Self>, receiver: Value) -> Value {
        let rebound = HostFunction {
            name: self.name.clone(),
            callable: match &self.callable {
                HostCallable::Sync(f) => HostCallable::Sync(f.clone()),
                HostCallable::Async(f) => HostCallable::Async(f.clone()),
            },
            rethrow: self.rethrow,
            skip_arg_wrapping: self.skip_arg_wrapping,
            props: RefCell::new(self.props.borrow().clone()),
            bound_this: RefCell::new(Some(receiver)),
        };
        Value::HostFunction(Rc::new(rebound))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sync_host_functions_report_flavour() {
        let f = HostFunction::sync("id", |mut args| {
            Ok(args.pop().unwrap_or(Value::Undefined))
        });
        match f {
            Value::HostFunction(h) => assert!(!h.is_async()),
            other => panic!("expected host function, got {:?}", other),
        }
    }

    #[test]
    fn bound_receiver_is_kept() {
        let f = HostFunction::sync("probe", |_| Ok(Value::Undefined));
        if let Value::HostFunction(h) = f {
            let bound = h.bind_receiver(Value::Number(7.0));
            if let Value::HostFunction(b) = bound {
                assert!(matches!(
                    *b.bound_this.borrow(),
                    Some(Value::Number(n)) if n == 7.0
                ));
            } else {
                panic!("expected host function");
            }
        }
    }
}
