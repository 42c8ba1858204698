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

use crate::ast::expr::Expr;

/// A destructuring pattern, usable in declarations, parameters and
/// catch clauses. Patterns nest arbitrarily.
#[derive(Debug, Clone)]
pub enum Pattern {
    Identifier { name: String },
    Array { elements: Vec<Option<PatternElement>> },
    Object {
        properties: Vec<ObjectPatternProp>,
        /// `...rest` collects the remaining own properties.
        rest: Option<String>,
    },
}

/// One slot of an array pattern (`None` in the parent vec is a hole).
#[derive(Debug, Clone)]
pub struct PatternElement {
    pub pattern: Pattern,
    pub default: Option<Expr>,
    pub rest: bool,
}

/// One `key: target = default` entry of an object pattern. Shorthand
/// (`{ a }`) parses with the key doubling as the target name.
#[derive(Debug, Clone)]
pub struct ObjectPatternProp {
    pub key: String,
    pub value: Pattern,
    pub default: Option<Expr>,
}

impl Pattern {
    /// Collects every identifier the pattern binds, in source order.
    pub fn bound_names(&self, out: &mut Vec<String>) {
        match self {
            Pattern::Identifier { name } => out.push(name.clone()),
            Pattern::Array { elements } => {
                for element in elements.iter().flatten() {
                    element.pattern.bound_names(out);
                }
            }
            Pattern::Object { properties, rest } => {
                for prop in properties {
                    prop.value.bound_names(out);
                }
                if let Some(rest) = rest {
                    out.push(rest.clone());
                }
            }
        }
    }
}
