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

use std::rc::Rc;

use num_bigint::BigInt;

use crate::ast::class::ClassNode;
use crate::ast::pattern::Pattern;
use crate::ast::stmt::Stmt;
use crate::span::Span;

/// Expression nodes.
///
/// Every variant carries the span of its first token so the evaluator can
/// enrich errors with a source position.
#[derive(Debug, Clone)]
pub enum Expr {
    Number { value: f64, span: Span },
    BigInt { value: BigInt, span: Span },
    Str { value: String, span: Span },
    Bool { value: bool, span: Span },
    Null { span: Span },
    Undefined { span: Span },
    Regex { pattern: String, flags: String, span: Span },

    Identifier { name: String, span: Span },
    This { span: Span },

    /// `` `a ${b} c` `` — alternating static and interpolated parts.
    Template { parts: Vec<TemplatePart>, span: Span },

    /// ``tag`a ${b}` `` — cooked/raw segments plus interpolations.
    TaggedTemplate {
        tag: Box<Expr>,
        cooked: Vec<String>,
        raw: Vec<String>,
        exprs: Vec<Expr>,
        span: Span,
    },

    Array { elements: Vec<ArrayElement>, span: Span },
    Object { properties: Vec<ObjectProperty>, span: Span },

    Unary { op: UnaryOp, operand: Box<Expr>, span: Span },
    Update { op: UpdateOp, prefix: bool, target: Box<Expr>, span: Span },
    Binary { op: BinaryOp, left: Box<Expr>, right: Box<Expr>, span: Span },
    Logical { op: LogicalOp, left: Box<Expr>, right: Box<Expr>, span: Span },

    /// Simple, compound or logical assignment. The target is an
    /// identifier or member expression.
    Assign {
        op: Option<BinaryOp>,
        logical: Option<LogicalOp>,
        target: Box<Expr>,
        value: Box<Expr>,
        span: Span,
    },

    Conditional {
        test: Box<Expr>,
        consequent: Box<Expr>,
        alternate: Box<Expr>,
        span: Span,
    },

    Sequence { exprs: Vec<Expr>, span: Span },

    Member {
        object: Box<Expr>,
        property: MemberKey,
        optional: bool,
        span: Span,
    },

    /// Wraps every optional chain; the short-circuit sentinel never
    /// escapes past this node.
    Chain { expr: Box<Expr>, span: Span },

    Call {
        callee: Box<Expr>,
        args: Vec<Argument>,
        optional: bool,
        span: Span,
    },

    New { callee: Box<Expr>, args: Vec<Argument>, span: Span },

    Function { func: Rc<FunctionNode>, span: Span },
    Class { class: Rc<ClassNode>, span: Span },

    Await { argument: Box<Expr>, span: Span },
    Yield { argument: Option<Box<Expr>>, delegate: bool, span: Span },

    SuperCall { args: Vec<Argument>, span: Span },
    SuperMember { property: MemberKey, span: Span },
}

impl Expr {
    pub fn span(&self) -> Span {
        match self {
            Expr::Number { span, .. }
            | Expr::BigInt { span, .. }
            | Expr::Str { span, .. }
            | Expr::Bool { span, .. }
            | Expr::Null { span }
            | Expr::Undefined { span }
            | Expr::Regex { span, .. }
            | Expr::Identifier { span, .. }
            | Expr::This { span }
            | Expr::Template { span, .. }
            | Expr::TaggedTemplate { span, .. }
            | Expr::Array { span, .. }
            | Expr::Object { span, .. }
            | Expr::Unary { span, .. }
            | Expr::Update { span, .. }
            | Expr::Binary { span, .. }
            | Expr::Logical { span, .. }
            | Expr::Assign { span, .. }
            | Expr::Conditional { span, .. }
            | Expr::Sequence { span, .. }
            | Expr::Member { span, .. }
            | Expr::Chain { span, .. }
            | Expr::Call { span, .. }
            | Expr::New { span, .. }
            | Expr::Function { span, .. }
            | Expr::Class { span, .. }
            | Expr::Await { span, .. }
            | Expr::Yield { span, .. }
            | Expr::SuperCall { span, .. }
            | Expr::SuperMember { span, .. } => *span,
        }
    }

    /// A short node-kind tag, used by the step iterator and trace logs.
    pub fn kind_name(&self) -> &'static str {
        match self {
            Expr::Number { .. } => "Number",
            Expr::BigInt { .. } => "BigInt",
            Expr::Str { .. } => "String",
            Expr::Bool { .. } => "Boolean",
            Expr::Null { .. } => "Null",
            Expr::Undefined { .. } => "Undefined",
            Expr::Regex { .. } => "Regex",
            Expr::Identifier { .. } => "Identifier",
            Expr::This { .. } => "This",
            Expr::Template { .. } => "Template",
            Expr::TaggedTemplate { .. } => "TaggedTemplate",
            Expr::Array { .. } => "Array",
            Expr::Object { .. } => "Object",
            Expr::Unary { .. } => "Unary",
            Expr::Update { .. } => "Update",
            Expr::Binary { .. } => "Binary",
            Expr::Logical { .. } => "Logical",
            Expr::Assign { .. } => "Assign",
            Expr::Conditional { .. } => "Conditional",
            Expr::Sequence { .. } => "Sequence",
            Expr::Member { .. } => "Member",
            Expr::Chain { .. } => "Chain",
            Expr::Call { .. } => "Call",
            Expr::New { .. } => "New",
            Expr::Function { .. } => "Function",
            Expr::Class { .. } => "Class",
            Expr::Await { .. } => "Await",
            Expr::Yield { .. } => "Yield",
            Expr::SuperCall { .. } => "SuperCall",
            Expr::SuperMember { .. } => "SuperMember",
        }
    }
}

/// One piece of a template literal.
#[derive(Debug, Clone)]
pub enum TemplatePart {
    Str(String),
    Expr(Expr),
}

/// One element of an array literal; holes are preserved.
#[derive(Debug, Clone)]
pub enum ArrayElement {
    Item(Expr),
    Spread(Expr),
    Hole,
}

/// One property of an object literal.
#[derive(Debug, Clone)]
pub enum ObjectProperty {
    KeyValue { key: PropertyKey, value: Expr },
    Shorthand { name: String, span: Span },
    Method { key: PropertyKey, func: Rc<FunctionNode> },
    Spread { argument: Expr },
}

/// A property key in an object literal.
#[derive(Debug, Clone)]
pub enum PropertyKey {
    Identifier(String),
    Str(String),
    Number(f64),
    Computed(Box<Expr>),
}

/// The property part of a member expression.
#[derive(Debug, Clone)]
pub enum MemberKey {
    Named(String),
    Private(String),
    Computed(Box<Expr>),
}

/// A call or `new` argument.
#[derive(Debug, Clone)]
pub enum Argument {
    Normal(Expr),
    Spread(Expr),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Minus,
    Plus,
    Not,
    BitNot,
    TypeOf,
    Void,
    Delete,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateOp {
    Increment,
    Decrement,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Subtract,
    Multiply,
    Divide,
    Modulo,
    Exponent,
    Equal,
    NotEqual,
    StrictEqual,
    StrictNotEqual,
    Less,
    LessEqual,
    Greater,
    GreaterEqual,
    BitAnd,
    BitOr,
    BitXor,
    ShiftLeft,
    ShiftRight,
    ShiftRightUnsigned,
    In,
    InstanceOf,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogicalOp {
    And,
    Or,
    Nullish,
}

/// A single function parameter: a pattern with an optional default, or a
/// rest parameter (`...xs`, always last).
#[derive(Debug, Clone)]
pub struct Param {
    pub pattern: Pattern,
    pub default: Option<Expr>,
    pub rest: bool,
}

/// Shared representation for function declarations, function expressions,
/// arrow functions, methods and accessors.
#[derive(Debug, Clone)]
pub struct FunctionNode {
    pub name: Option<String>,
    pub params: Vec<Param>,
    pub body: FunctionBody,
    pub is_async: bool,
    pub is_generator: bool,
    pub is_arrow: bool,
    pub span: Span,
}

/// Arrow functions may have a bare expression body.
#[derive(Debug, Clone)]
pub enum FunctionBody {
    Block(Rc<Vec<Stmt>>),
    Expression(Rc<Expr>),
}
