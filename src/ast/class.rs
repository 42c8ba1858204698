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

use crate::ast::expr::{Expr, FunctionNode};
use crate::ast::stmt::Stmt;
use crate::span::Span;

/// A parsed class declaration or expression.
#[derive(Debug, Clone)]
pub struct ClassNode {
    pub name: Option<String>,
    /// The `extends` clause, evaluated when the class is defined.
    pub parent: Option<Expr>,
    pub members: Vec<ClassMember>,
    pub span: Span,
}

/// A member of a class body.
#[derive(Debug, Clone)]
pub enum ClassMember {
    Method {
        key: MemberName,
        kind: MethodKind,
        func: Rc<FunctionNode>,
        is_static: bool,
    },
    Field {
        key: MemberName,
        value: Option<Expr>,
        is_static: bool,
    },
    StaticBlock { body: Vec<Stmt> },
}

/// A class-member name: public, `#private`, or computed.
#[derive(Debug, Clone)]
pub enum MemberName {
    Identifier(String),
    Private(String),
    Computed(Expr),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MethodKind {
    Constructor,
    Method,
    Getter,
    Setter,
}
