/*
 * ==========================================================================
 * SANDPAW - Safe Claws for Untrusted Code!
 * ==========================================================================
 *
 * Abstract Syntax Tree
 * --------------------
 * The node set consumed by the evaluator. The tree is immutable once the
 * parser hands it over; function bodies are reference-counted so that
 * closures, generators and coroutines can share them without copying.
 *
 *  - expr.rs    → expression nodes
 *  - stmt.rs    → statement nodes
 *  - class.rs   → class bodies and members
 *  - pattern.rs → destructuring patterns
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

pub mod class;
pub mod expr;
pub mod pattern;
pub mod stmt;

pub use class::{ClassMember, ClassNode, MemberName, MethodKind};
pub use expr::{
    Argument, ArrayElement, BinaryOp, Expr, FunctionBody, FunctionNode, LogicalOp, MemberKey,
    ObjectProperty, Param, PropertyKey, TemplatePart, UnaryOp, UpdateOp,
};
pub use pattern::{ObjectPatternProp, Pattern, PatternElement};
pub use stmt::{CatchClause, DeclKind, Declarator, ForInit, ForTarget, Stmt, SwitchCase};

/// A fully parsed program: the unit accepted by the evaluator.
#[derive(Debug, Clone)]
pub struct Program {
    pub body: Vec<Stmt>,
}
