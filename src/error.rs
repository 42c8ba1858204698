/*
 * ==========================================================================
 * SANDPAW - Safe Claws for Untrusted Code!
 * ==========================================================================
 *
 * Author:   Sam Wilcox
 * Email:    sam@pawx-lang.com
 * Website:  https://www.pawx-lang.com
 * Github:   https://github.com/samwilcox/sandpaw
 *
 * License:
 * This file is part of the SANDPAW sandboxed interpreter project.
 *
 * SANDPAW is dual-licensed under the terms of:
 *   - The MIT license
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

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::interpreter::features::FeatureTag;
use crate::span::Span;
use crate::value::Value;

/// Stable error kinds surfaced by the evaluator.
///
/// Every error the sandbox can raise maps to exactly one of these kinds,
/// so a host can dispatch on the kind without parsing messages.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ErrorKind {
    #[error("parse error")]
    Parse,

    #[error("undefined variable")]
    UndefinedVariable,

    #[error("assignment to constant")]
    AssignToConst,

    #[error("duplicate declaration")]
    DuplicateDeclaration,

    #[error("property name forbidden")]
    PropertyNameForbidden,

    #[error("inherited property access denied")]
    InheritedAccessDenied,

    #[error("forbidden symbol access")]
    SymbolForbidden,

    #[error("async operation in synchronous evaluation")]
    AsyncInSync,

    #[error("feature not enabled: {0}")]
    FeatureNotEnabled(FeatureTag),

    #[error("division by zero")]
    DivisionByZero,

    #[error("modulo by zero")]
    ModuloByZero,

    #[error("wrong argument count")]
    ArgumentCount,

    #[error("invalid spread target")]
    SpreadTarget,

    #[error("invalid for-in target")]
    ForInTarget,

    #[error("invalid for-of target")]
    ForOfTarget,

    #[error("'this' is not initialized")]
    ThisNotInitialized,

    #[error("super constructor already called")]
    SuperAlreadyCalled,

    #[error("super constructor never called")]
    SuperNotCalled,

    #[error("private field is not defined here")]
    PrivateFieldUndefined,

    #[error("class constructor requires 'new'")]
    ConstructorWithoutNew,

    #[error("call target is not callable")]
    CallTargetNotCallable,

    #[error("invalid operand type")]
    TypeMismatch,

    #[error("maximum call stack depth exceeded")]
    MaxCallStackDepthExceeded,

    #[error("maximum loop iterations exceeded")]
    MaxLoopIterationsExceeded,

    #[error("maximum memory exceeded")]
    MaxMemoryExceeded,

    #[error("execution aborted")]
    Aborted,

    #[error("host function error")]
    HostFunctionError,

    #[error("uncaught throw")]
    UncaughtThrow,

    /// Internal control value used to close a generator from `return()`.
    /// Never observable by guest code or by the host: the generator driver
    /// consumes it before any error can surface.
    #[doc(hidden)]
    #[error("generator return")]
    GeneratorReturn,

    /// Internal control value raised when an optional chain hits a
    /// nullish link; the enclosing chain expression unwraps it to
    /// `undefined` before it can surface.
    #[doc(hidden)]
    #[error("optional chain short-circuit")]
    OptionalShortCircuit,
}

/// One frame of the guest call stack, captured when an error surfaces.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StackFrame {
    pub function_name: Option<String>,
    pub line: Option<usize>,
    pub column: Option<usize>,
}

/// The error envelope every failure leaves the evaluator in.
///
/// `thrown_value` preserves the original guest value for `throw` so that
/// `catch` clauses (including destructuring patterns) observe exactly what
/// was thrown rather than a host-side wrapper.
#[derive(Debug, Clone, Error)]
#[error("{kind}: {message}")]
pub struct SandpawError {
    pub kind: ErrorKind,
    pub message: String,
    pub thrown_value: Option<Value>,
    pub line: Option<usize>,
    pub column: Option<usize>,
    pub source_code: Option<String>,
    pub call_stack: Vec<StackFrame>,
    enriched: bool,
}

impl SandpawError {
    /// Generic constructor.
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            thrown_value: None,
            line: None,
            column: None,
            source_code: None,
            call_stack: Vec::new(),
            enriched: false,
        }
    }

    /// Attach a source location (builder-style).
    pub fn with_span(mut self, span: Span) -> Self {
        self.line = Some(span.line);
        self.column = Some(span.column);
        self
    }

    /// Attach the originally thrown guest value (builder-style).
    pub fn with_thrown(mut self, value: Value) -> Self {
        self.thrown_value = Some(value);
        self
    }

    pub fn parse(message: impl Into<String>, span: Span) -> Self {
        Self::new(ErrorKind::Parse, message).with_span(span)
    }

    pub fn undefined_variable(name: &str) -> Self {
        Self::new(
            ErrorKind::UndefinedVariable,
            format!("'{}' is not defined", name),
        )
    }

    pub fn assign_to_const(name: &str) -> Self {
        Self::new(
            ErrorKind::AssignToConst,
            format!("cannot assign to constant '{}'", name),
        )
    }

    pub fn duplicate_declaration(name: &str) -> Self {
        Self::new(
            ErrorKind::DuplicateDeclaration,
            format!("'{}' has already been declared", name),
        )
    }

    pub fn type_mismatch(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::TypeMismatch, message)
    }

    pub fn not_callable(what: &str) -> Self {
        Self::new(
            ErrorKind::CallTargetNotCallable,
            format!("{} is not a function", what),
        )
    }

    /// A failure raised by host code. Only this kind is subject to the
    /// host-message disclosure switches at the bridge.
    pub fn host(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::HostFunctionError, message)
    }

    /// A guest `throw` statement carrying an arbitrary value.
    pub fn thrown(value: Value) -> Self {
        let message = format!("uncaught {}", value.stringify());
        Self::new(ErrorKind::UncaughtThrow, message).with_thrown(value)
    }

    /// The value a `catch` clause should bind for this error.
    ///
    /// Guest-thrown values come back untouched; evaluator-raised errors are
    /// surfaced as a plain error object so scripts can inspect them.
    pub fn catch_value(&self) -> Value {
        match &self.thrown_value {
            Some(v) => v.clone(),
            None => Value::error_object(&self.kind.to_string(), &self.message),
        }
    }

    /// True for internal control values that must never be caught by a
    /// guest `catch` clause (they still unwind through `finally`).
    pub fn is_control(&self) -> bool {
        matches!(
            self.kind,
            ErrorKind::GeneratorReturn | ErrorKind::OptionalShortCircuit
        )
    }

    /// Enrich with location, source line and call stack exactly once,
    /// just before the error leaves the evaluator.
    pub fn enrich(
        &mut self,
        span: Option<Span>,
        source: Option<&str>,
        call_stack: Vec<StackFrame>,
    ) {
        if self.enriched {
            return;
        }
        self.enriched = true;

        if self.line.is_none() {
            if let Some(span) = span {
                self.line = Some(span.line);
                self.column = Some(span.column);
            }
        }

        if self.source_code.is_none() {
            if let (Some(line), Some(source)) = (self.line, source) {
                self.source_code = source
                    .lines()
                    .nth(line.saturating_sub(1))
                    .map(|l| l.to_string());
            }
        }

        if self.call_stack.is_empty() {
            self.call_stack = call_stack;
        }
    }

    /// Strip host-side detail from the message, leaving a generic line.
    /// Applied to host errors when the `hide_host_errors` switch is on.
    pub fn redact_message(&mut self) {
        self.message = "a host function failed".to_string();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn enrich_is_idempotent() {
        let mut err = SandpawError::undefined_variable("x");
        err.enrich(Some(Span::new(3, 7)), Some("a\nb\nlet y = x;"), vec![]);
        assert_eq!(err.line, Some(3));
        assert_eq!(err.source_code.as_deref(), Some("let y = x;"));

        // A second enrichment must not overwrite the first snapshot.
        err.enrich(Some(Span::new(9, 9)), Some("other"), vec![StackFrame::default()]);
        assert_eq!(err.line, Some(3));
        assert!(err.call_stack.is_empty());
    }

    #[test]
    fn thrown_value_survives_for_catch() {
        let err = SandpawError::thrown(Value::Number(42.0));
        match err.catch_value() {
            Value::Number(n) => assert_eq!(n, 42.0),
            other => panic!("expected number, got {:?}", other),
        }
    }
}
