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

/*!
 * Functions, parameter lists and destructuring patterns.
 */

use std::rc::Rc;

use crate::ast::{
    FunctionBody, FunctionNode, ObjectPatternProp, Param, Pattern, PatternElement,
};
use crate::error::SandpawError;
use crate::lexer::token::TokenKind;
use crate::parser::Parser;

impl Parser {
    /// Parses the rest of a `function` form: optional `*`, optional
    /// name, parameters, block body.
    pub(crate) fn parse_function_tail(
        &mut self,
        is_async: bool,
        is_declaration: bool,
    ) -> Result<Rc<FunctionNode>, SandpawError> {
        let is_generator = self.eat_punct("*");
        let name = if matches!(self.peek().kind, TokenKind::Identifier) {
            Some(self.advance().lexeme)
        } else if is_declaration {
            return Err(self.unexpected("expected a function name"));
        } else {
            None
        };
        self.parse_function_parts(name, is_async, is_generator, false)
    }

    /// Parses `(params) { body }` into a function node.
    pub(crate) fn parse_function_parts(
        &mut self,
        name: Option<String>,
        is_async: bool,
        is_generator: bool,
        is_arrow: bool,
    ) -> Result<Rc<FunctionNode>, SandpawError> {
        let span = self.span();
        let params = self.parse_params()?;
        self.expect_punct("{")?;
        let body = self.parse_stmt_list_until("}")?;
        self.expect_punct("}")?;
        Ok(Rc::new(FunctionNode {
            name,
            params,
            body: FunctionBody::Block(Rc::new(body)),
            is_async,
            is_generator,
            is_arrow,
            span,
        }))
    }

    /// Parses a parenthesised parameter list with defaults, rest and
    /// destructuring.
    pub(crate) fn parse_params(&mut self) -> Result<Vec<Param>, SandpawError> {
        self.expect_punct("(")?;
        let mut params = Vec::new();
        while !self.peek().is_punct(")") {
            if self.eat_punct("...") {
                let pattern = self.parse_binding_pattern()?;
                params.push(Param {
                    pattern,
                    default: None,
                    rest: true,
                });
                break;
            }
            let pattern = self.parse_binding_pattern()?;
            let default = if self.eat_punct("=") {
                Some(self.parse_assignment_expr()?)
            } else {
                None
            };
            params.push(Param {
                pattern,
                default,
                rest: false,
            });
            if !self.eat_punct(",") {
                break;
            }
        }
        self.expect_punct(")")?;
        Ok(params)
    }

    /// Parses a binding pattern: identifier, array pattern or object
    /// pattern, nested arbitrarily.
    pub(crate) fn parse_binding_pattern(&mut self) -> Result<Pattern, SandpawError> {
        if self.peek().is_punct("[") {
            return self.parse_array_pattern();
        }
        if self.peek().is_punct("{") {
            return self.parse_object_pattern();
        }
        let name = self.expect_identifier()?;
        Ok(Pattern::Identifier { name })
    }

    fn parse_array_pattern(&mut self) -> Result<Pattern, SandpawError> {
        self.expect_punct("[")?;
        let mut elements = Vec::new();
        while !self.peek().is_punct("]") {
            if self.eat_punct(",") {
                elements.push(None);
                continue;
            }
            if self.eat_punct("...") {
                let pattern = self.parse_binding_pattern()?;
                elements.push(Some(PatternElement {
                    pattern,
                    default: None,
                    rest: true,
                }));
                break;
            }
            let pattern = self.parse_binding_pattern()?;
            let default = if self.eat_punct("=") {
                Some(self.parse_assignment_expr()?)
            } else {
                None
            };
            elements.push(Some(PatternElement {
                pattern,
                default,
                rest: false,
            }));
            if !self.eat_punct(",") {
                break;
            }
        }
        self.expect_punct("]")?;
        Ok(Pattern::Array { elements })
    }

    fn parse_object_pattern(&mut self) -> Result<Pattern, SandpawError> {
        self.expect_punct("{")?;
        let mut properties = Vec::new();
        let mut rest = None;
        while !self.peek().is_punct("}") {
            if self.eat_punct("...") {
                rest = Some(self.expect_identifier()?);
                break;
            }
            let key = self.expect_name()?;
            let value = if self.eat_punct(":") {
                self.parse_binding_pattern()?
            } else {
                Pattern::Identifier { name: key.clone() }
            };
            let default = if self.eat_punct("=") {
                Some(self.parse_assignment_expr()?)
            } else {
                None
            };
            properties.push(ObjectPatternProp {
                key,
                value,
                default,
            });
            if !self.eat_punct(",") {
                break;
            }
        }
        self.expect_punct("}")?;
        Ok(Pattern::Object { properties, rest })
    }
}
