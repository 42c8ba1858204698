/*
 * ==========================================================================
 * SANDPAW - Safe Claws for Untrusted Code!
 * ==========================================================================
 *
 * Crate Root
 * ----------
 * Sandpaw is a sandboxed tree-walking interpreter for a large subset of
 * a C-family dynamic scripting language. Untrusted source text is
 * parsed into an AST and evaluated directly, with strong isolation
 * between guest code and the host:
 *
 *  - lexer/ + parser/ → source text to AST
 *  - ast/             → the node set
 *  - value.rs         → the runtime value sum type
 *  - interpreter/     → sync + async walkers, classes, generators
 *  - security/        → dangerous-name tables and the read-only proxy
 *  - host.rs          → the host-function bridge
 *  - prototypes/      → built-in method surfaces and globals
 *  - diagnostics.rs   → compiler-style error rendering
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

pub mod ast;
pub mod diagnostics;
pub mod error;
pub mod host;
pub mod interpreter;
pub mod lexer;
pub mod parser;
pub mod prototypes;
pub mod security;
pub mod span;
pub mod value;

pub use diagnostics::DiagnosticPrinter;
pub use error::{ErrorKind, SandpawError, StackFrame};
pub use host::HostFunction;
pub use interpreter::engine::{Limits, SecurityOptions, Stats};
pub use interpreter::features::{FeatureControl, FeatureTag};
pub use interpreter::{EvalOptions, Interpreter, StepInfo, StepIterator};
pub use span::Span;
pub use value::Value;
