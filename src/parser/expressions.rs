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
 * Expression parsing: precedence climbing from sequence expressions
 * down to primaries, with backtracking for arrow-function heads.
 */

use std::rc::Rc;

use crate::ast::{
    Argument, ArrayElement, BinaryOp, Expr, FunctionBody, FunctionNode, LogicalOp, MemberKey,
    ObjectProperty, Param, Pattern, PropertyKey, TemplatePart, UnaryOp, UpdateOp,
};
use crate::error::SandpawError;
use crate::lexer::lexer::Lexer;
use crate::lexer::token::{TemplatePiece, TokenKind};
use crate::parser::Parser;
use crate::span::Span;

const ASSIGN_OPS: &[(&str, Option<BinaryOp>, Option<LogicalOp>)] = &[
    ("=", None, None),
    ("+=", Some(BinaryOp::Add), None),
    ("-=", Some(BinaryOp::Subtract), None),
    ("*=", Some(BinaryOp::Multiply), None),
    ("/=", Some(BinaryOp::Divide), None),
    ("%=", Some(BinaryOp::Modulo), None),
    ("**=", Some(BinaryOp::Exponent), None),
    ("&=", Some(BinaryOp::BitAnd), None),
    ("|=", Some(BinaryOp::BitOr), None),
    ("^=", Some(BinaryOp::BitXor), None),
    ("<<=", Some(BinaryOp::ShiftLeft), None),
    (">>=", Some(BinaryOp::ShiftRight), None),
    (">>>=", Some(BinaryOp::ShiftRightUnsigned), None),
    ("&&=", None, Some(LogicalOp::And)),
    ("||=", None, Some(LogicalOp::Or)),
    ("??=", None, Some(LogicalOp::Nullish)),
];

impl Parser {
    /// Parses a full (possibly comma-sequenced) expression.
    pub(crate) fn parse_expression(&mut self) -> Result<Expr, SandpawError> {
        let span = self.span();
        let first = self.parse_assignment_expr()?;
        if !self.peek().is_punct(",") {
            return Ok(first);
        }
        let mut exprs = vec![first];
        while self.eat_punct(",") {
            exprs.push(self.parse_assignment_expr()?);
        }
        Ok(Expr::Sequence { exprs, span })
    }

    /// Parses one assignment-level expression (no top-level commas).
    pub(crate) fn parse_assignment_expr(&mut self) -> Result<Expr, SandpawError> {
        if let Some(arrow) = self.try_parse_arrow()? {
            return Ok(arrow);
        }

        if self.peek().is_keyword("yield") {
            return self.parse_yield();
        }

        let expr = self.parse_conditional()?;

        let matched = ASSIGN_OPS
            .iter()
            .find(|(text, _, _)| self.peek().is_punct(text))
            .copied();
        if let Some((_, op, logical)) = matched {
            let span = self.span();
            if !is_assign_target(&expr) {
                return Err(SandpawError::parse("invalid assignment target", span));
            }
            self.advance();
            let value = self.parse_assignment_expr()?;
            return Ok(Expr::Assign {
                op,
                logical,
                target: Box::new(expr),
                value: Box::new(value),
                span,
            });
        }

        Ok(expr)
    }

    fn parse_yield(&mut self) -> Result<Expr, SandpawError> {
        let span = self.span();
        self.advance();
        let delegate = self.eat_punct("*");
        let next = self.peek();
        let has_argument = !(next.is_eof()
            || next.newline_before
            || next.is_punct(";")
            || next.is_punct(")")
            || next.is_punct("]")
            || next.is_punct("}")
            || next.is_punct(",")
            || next.is_punct(":"));
        let argument = if has_argument || delegate {
            Some(Box::new(self.parse_assignment_expr()?))
        } else {
            None
        };
        Ok(Expr::Yield {
            argument,
            delegate,
            span,
        })
    }

    fn parse_conditional(&mut self) -> Result<Expr, SandpawError> {
        let test = self.parse_nullish()?;
        if !self.peek().is_punct("?") {
            return Ok(test);
        }
        let span = self.span();
        self.advance();
        let consequent = self.parse_assignment_expr()?;
        self.expect_punct(":")?;
        let alternate = self.parse_assignment_expr()?;
        Ok(Expr::Conditional {
            test: Box::new(test),
            consequent: Box::new(consequent),
            alternate: Box::new(alternate),
            span,
        })
    }

    /* ----------------------------------------------------------------------
     * Binary Precedence Ladder
     * -------------------------------------------------------------------- */

    fn parse_nullish(&mut self) -> Result<Expr, SandpawError> {
        let mut left = self.parse_logical_or()?;
        while self.peek().is_punct("??") {
            let span = self.span();
            self.advance();
            let right = self.parse_logical_or()?;
            left = Expr::Logical {
                op: LogicalOp::Nullish,
                left: Box::new(left),
                right: Box::new(right),
                span,
            };
        }
        Ok(left)
    }

    fn parse_logical_or(&mut self) -> Result<Expr, SandpawError> {
        let mut left = self.parse_logical_and()?;
        while self.peek().is_punct("||") {
            let span = self.span();
            self.advance();
            let right = self.parse_logical_and()?;
            left = Expr::Logical {
                op: LogicalOp::Or,
                left: Box::new(left),
                right: Box::new(right),
                span,
            };
        }
        Ok(left)
    }

    fn parse_logical_and(&mut self) -> Result<Expr, SandpawError> {
        let mut left = self.parse_bit_or()?;
        while self.peek().is_punct("&&") {
            let span = self.span();
            self.advance();
            let right = self.parse_bit_or()?;
            left = Expr::Logical {
                op: LogicalOp::And,
                left: Box::new(left),
                right: Box::new(right),
                span,
            };
        }
        Ok(left)
    }

    fn parse_bit_or(&mut self) -> Result<Expr, SandpawError> {
        self.parse_binary_level(
            &[("|", BinaryOp::BitOr)],
            Self::parse_bit_xor,
        )
    }

    fn parse_bit_xor(&mut self) -> Result<Expr, SandpawError> {
        self.parse_binary_level(
            &[("^", BinaryOp::BitXor)],
            Self::parse_bit_and,
        )
    }

    fn parse_bit_and(&mut self) -> Result<Expr, SandpawError> {
        self.parse_binary_level(
            &[("&", BinaryOp::BitAnd)],
            Self::parse_equality,
        )
    }

    fn parse_equality(&mut self) -> Result<Expr, SandpawError> {
        self.parse_binary_level(
            &[
                ("===", BinaryOp::StrictEqual),
                ("!==", BinaryOp::StrictNotEqual),
                ("==", BinaryOp::Equal),
                ("!=", BinaryOp::NotEqual),
            ],
            Self::parse_relational,
        )
    }

    fn parse_relational(&mut self) -> Result<Expr, SandpawError> {
        let mut left = self.parse_shift()?;
        loop {
            let span = self.span();
            let op = if self.peek().is_punct("<=") {
                BinaryOp::LessEqual
            } else if self.peek().is_punct(">=") {
                BinaryOp::GreaterEqual
            } else if self.peek().is_punct("<") {
                BinaryOp::Less
            } else if self.peek().is_punct(">") {
                BinaryOp::Greater
            } else if self.peek().is_keyword("instanceof") {
                BinaryOp::InstanceOf
            } else if self.peek().is_keyword("in") && !self.no_in {
                BinaryOp::In
            } else {
                break;
            };
            self.advance();
            let right = self.parse_shift()?;
            left = Expr::Binary {
                op,
                left: Box::new(left),
                right: Box::new(right),
                span,
            };
        }
        Ok(left)
    }

    fn parse_shift(&mut self) -> Result<Expr, SandpawError> {
        self.parse_binary_level(
            &[
                (">>>", BinaryOp::ShiftRightUnsigned),
                ("<<", BinaryOp::ShiftLeft),
                (">>", BinaryOp::ShiftRight),
            ],
            Self::parse_additive,
        )
    }

    fn parse_additive(&mut self) -> Result<Expr, SandpawError> {
        self.parse_binary_level(
            &[("+", BinaryOp::Add), ("-", BinaryOp::Subtract)],
            Self::parse_multiplicative,
        )
    }

    fn parse_multiplicative(&mut self) -> Result<Expr, SandpawError> {
        self.parse_binary_level(
            &[
                ("*", BinaryOp::Multiply),
                ("/", BinaryOp::Divide),
                ("%", BinaryOp::Modulo),
            ],
            Self::parse_exponent,
        )
    }

    fn parse_exponent(&mut self) -> Result<Expr, SandpawError> {
        let left = self.parse_unary()?;
        if self.peek().is_punct("**") {
            let span = self.span();
            self.advance();
            // Right-associative.
            let right = self.parse_exponent()?;
            return Ok(Expr::Binary {
                op: BinaryOp::Exponent,
                left: Box::new(left),
                right: Box::new(right),
                span,
            });
        }
        Ok(left)
    }

    fn parse_binary_level(
        &mut self,
        ops: &[(&str, BinaryOp)],
        next: fn(&mut Self) -> Result<Expr, SandpawError>,
    ) -> Result<Expr, SandpawError> {
        let mut left = next(self)?;
        loop {
            let matched = ops
                .iter()
                .find(|(text, _)| self.peek().is_punct(text))
                .copied();
            let Some((_, op)) = matched else { break };
            let span = self.span();
            self.advance();
            let right = next(self)?;
            left = Expr::Binary {
                op,
                left: Box::new(left),
                right: Box::new(right),
                span,
            };
        }
        Ok(left)
    }

    /* ----------------------------------------------------------------------
     * Unary, Postfix, Calls, Members
     * -------------------------------------------------------------------- */

    pub(crate) fn parse_unary(&mut self) -> Result<Expr, SandpawError> {
        let span = self.span();
        let token = self.peek().clone();

        let unary_op = match &token.kind {
            TokenKind::Punct => match token.lexeme.as_str() {
                "!" => Some(UnaryOp::Not),
                "~" => Some(UnaryOp::BitNot),
                "+" => Some(UnaryOp::Plus),
                "-" => Some(UnaryOp::Minus),
                _ => None,
            },
            TokenKind::Keyword => match token.lexeme.as_str() {
                "typeof" => Some(UnaryOp::TypeOf),
                "void" => Some(UnaryOp::Void),
                "delete" => Some(UnaryOp::Delete),
                _ => None,
            },
            _ => None,
        };
        if let Some(op) = unary_op {
            self.advance();
            let operand = self.parse_unary()?;
            return Ok(Expr::Unary {
                op,
                operand: Box::new(operand),
                span,
            });
        }

        if token.is_keyword("await") {
            self.advance();
            let argument = self.parse_unary()?;
            return Ok(Expr::Await {
                argument: Box::new(argument),
                span,
            });
        }

        if token.is_punct("++") || token.is_punct("--") {
            self.advance();
            let op = if token.lexeme == "++" {
                UpdateOp::Increment
            } else {
                UpdateOp::Decrement
            };
            let target = self.parse_unary()?;
            if !is_assign_target(&target) {
                return Err(SandpawError::parse("invalid update target", span));
            }
            return Ok(Expr::Update {
                op,
                prefix: true,
                target: Box::new(target),
                span,
            });
        }

        self.parse_postfix()
    }

    fn parse_postfix(&mut self) -> Result<Expr, SandpawError> {
        let expr = self.parse_call_member()?;
        let token = self.peek().clone();
        if (token.is_punct("++") || token.is_punct("--")) && !token.newline_before {
            if !is_assign_target(&expr) {
                return Err(SandpawError::parse("invalid update target", token.span));
            }
            self.advance();
            let op = if token.lexeme == "++" {
                UpdateOp::Increment
            } else {
                UpdateOp::Decrement
            };
            return Ok(Expr::Update {
                op,
                prefix: false,
                target: Box::new(expr),
                span: token.span,
            });
        }
        Ok(expr)
    }

    fn parse_call_member(&mut self) -> Result<Expr, SandpawError> {
        let mut expr = self.parse_primary()?;
        let mut has_optional = false;

        loop {
            let span = self.span();
            if self.eat_punct("?.") {
                has_optional = true;
                if self.peek().is_punct("(") {
                    let args = self.parse_args()?;
                    expr = Expr::Call {
                        callee: Box::new(expr),
                        args,
                        optional: true,
                        span,
                    };
                } else if self.eat_punct("[") {
                    let key = self.parse_expression()?;
                    self.expect_punct("]")?;
                    expr = Expr::Member {
                        object: Box::new(expr),
                        property: MemberKey::Computed(Box::new(key)),
                        optional: true,
                        span,
                    };
                } else {
                    let property = self.parse_member_key()?;
                    expr = Expr::Member {
                        object: Box::new(expr),
                        property,
                        optional: true,
                        span,
                    };
                }
            } else if self.eat_punct(".") {
                let property = self.parse_member_key()?;
                expr = Expr::Member {
                    object: Box::new(expr),
                    property,
                    optional: false,
                    span,
                };
            } else if self.peek().is_punct("[") {
                self.advance();
                let key = self.parse_expression()?;
                self.expect_punct("]")?;
                expr = Expr::Member {
                    object: Box::new(expr),
                    property: MemberKey::Computed(Box::new(key)),
                    optional: false,
                    span,
                };
            } else if self.peek().is_punct("(") {
                let args = self.parse_args()?;
                expr = Expr::Call {
                    callee: Box::new(expr),
                    args,
                    optional: false,
                    span,
                };
            } else if matches!(self.peek().kind, TokenKind::Template(_)) {
                expr = self.parse_tagged_template(expr, span)?;
            } else {
                break;
            }
        }

        if has_optional {
            let span = expr.span();
            Ok(Expr::Chain {
                expr: Box::new(expr),
                span,
            })
        } else {
            Ok(expr)
        }
    }

    fn parse_member_key(&mut self) -> Result<MemberKey, SandpawError> {
        let token = self.peek().clone();
        if let TokenKind::Punct = token.kind {
            if let Some(private) = token.lexeme.strip_prefix('#') {
                self.advance();
                return Ok(MemberKey::Private(private.to_string()));
            }
        }
        Ok(MemberKey::Named(self.expect_name()?))
    }

    pub(crate) fn parse_args(&mut self) -> Result<Vec<Argument>, SandpawError> {
        self.expect_punct("(")?;
        let mut args = Vec::new();
        while !self.peek().is_punct(")") {
            if self.eat_punct("...") {
                args.push(Argument::Spread(self.parse_assignment_expr()?));
            } else {
                args.push(Argument::Normal(self.parse_assignment_expr()?));
            }
            if !self.eat_punct(",") {
                break;
            }
        }
        self.expect_punct(")")?;
        Ok(args)
    }

    /* ----------------------------------------------------------------------
     * Primaries
     * -------------------------------------------------------------------- */

    fn parse_primary(&mut self) -> Result<Expr, SandpawError> {
        let span = self.span();
        let token = self.peek().clone();

        match &token.kind {
            TokenKind::Number(value) => {
                let value = *value;
                self.advance();
                Ok(Expr::Number { value, span })
            }
            TokenKind::BigInt(value) => {
                let value = value.clone();
                self.advance();
                Ok(Expr::BigInt { value, span })
            }
            TokenKind::Str(value) => {
                let value = value.clone();
                self.advance();
                Ok(Expr::Str { value, span })
            }
            TokenKind::Regex { pattern, flags } => {
                let (pattern, flags) = (pattern.clone(), flags.clone());
                self.advance();
                Ok(Expr::Regex {
                    pattern,
                    flags,
                    span,
                })
            }
            TokenKind::Template(pieces) => {
                let pieces = pieces.clone();
                self.advance();
                self.template_expr(&pieces, span)
            }
            TokenKind::Keyword => match token.lexeme.as_str() {
                "true" => {
                    self.advance();
                    Ok(Expr::Bool { value: true, span })
                }
                "false" => {
                    self.advance();
                    Ok(Expr::Bool { value: false, span })
                }
                "null" => {
                    self.advance();
                    Ok(Expr::Null { span })
                }
                "undefined" => {
                    self.advance();
                    Ok(Expr::Undefined { span })
                }
                "this" => {
                    self.advance();
                    Ok(Expr::This { span })
                }
                "super" => self.parse_super(span),
                "new" => self.parse_new(span),
                "function" => {
                    self.advance();
                    let func = self.parse_function_tail(false, false)?;
                    Ok(Expr::Function { func, span })
                }
                "async" if self.peek_at(1).is_keyword("function") => {
                    self.advance();
                    self.advance();
                    let func = self.parse_function_tail(true, false)?;
                    Ok(Expr::Function { func, span })
                }
                "class" => {
                    self.advance();
                    let class = self.parse_class_tail(false)?;
                    Ok(Expr::Class { class, span })
                }
                _ => Err(self.unexpected("unexpected keyword")),
            },
            TokenKind::Identifier => {
                let name = self.advance().lexeme;
                Ok(Expr::Identifier { name, span })
            }
            TokenKind::Punct => match token.lexeme.as_str() {
                "(" => {
                    self.advance();
                    let expr = self.parse_expression()?;
                    self.expect_punct(")")?;
                    Ok(expr)
                }
                "[" => self.parse_array_literal(span),
                "{" => self.parse_object_literal(span),
                _ => Err(self.unexpected("unexpected token")),
            },
            TokenKind::Eof => Err(self.unexpected("unexpected end of input")),
        }
    }

    fn parse_super(&mut self, span: Span) -> Result<Expr, SandpawError> {
        self.advance();
        if self.peek().is_punct("(") {
            let args = self.parse_args()?;
            return Ok(Expr::SuperCall { args, span });
        }
        if self.eat_punct(".") {
            let name = self.expect_name()?;
            return Ok(Expr::SuperMember {
                property: MemberKey::Named(name),
                span,
            });
        }
        if self.eat_punct("[") {
            let key = self.parse_expression()?;
            self.expect_punct("]")?;
            return Ok(Expr::SuperMember {
                property: MemberKey::Computed(Box::new(key)),
                span,
            });
        }
        Err(self.unexpected("'super' must be called or accessed"))
    }

    fn parse_new(&mut self, span: Span) -> Result<Expr, SandpawError> {
        self.advance();
        // Member-only chain for the callee; the first argument list
        // belongs to the construction.
        let mut callee = self.parse_primary()?;
        loop {
            let member_span = self.span();
            if self.eat_punct(".") {
                let property = self.parse_member_key()?;
                callee = Expr::Member {
                    object: Box::new(callee),
                    property,
                    optional: false,
                    span: member_span,
                };
            } else if self.peek().is_punct("[") {
                self.advance();
                let key = self.parse_expression()?;
                self.expect_punct("]")?;
                callee = Expr::Member {
                    object: Box::new(callee),
                    property: MemberKey::Computed(Box::new(key)),
                    optional: false,
                    span: member_span,
                };
            } else {
                break;
            }
        }
        let args = if self.peek().is_punct("(") {
            self.parse_args()?
        } else {
            Vec::new()
        };
        Ok(Expr::New {
            callee: Box::new(callee),
            args,
            span,
        })
    }

    fn parse_array_literal(&mut self, span: Span) -> Result<Expr, SandpawError> {
        self.expect_punct("[")?;
        let mut elements = Vec::new();
        while !self.peek().is_punct("]") {
            if self.peek().is_punct(",") {
                self.advance();
                elements.push(ArrayElement::Hole);
                continue;
            }
            if self.eat_punct("...") {
                elements.push(ArrayElement::Spread(self.parse_assignment_expr()?));
            } else {
                elements.push(ArrayElement::Item(self.parse_assignment_expr()?));
            }
            if !self.eat_punct(",") {
                break;
            }
        }
        self.expect_punct("]")?;
        Ok(Expr::Array { elements, span })
    }

    fn parse_object_literal(&mut self, span: Span) -> Result<Expr, SandpawError> {
        self.expect_punct("{")?;
        let mut properties = Vec::new();
        while !self.peek().is_punct("}") {
            if self.eat_punct("...") {
                properties.push(ObjectProperty::Spread {
                    argument: self.parse_assignment_expr()?,
                });
            } else {
                properties.push(self.parse_object_property()?);
            }
            if !self.eat_punct(",") {
                break;
            }
        }
        self.expect_punct("}")?;
        Ok(Expr::Object { properties, span })
    }

    fn parse_object_property(&mut self) -> Result<ObjectProperty, SandpawError> {
        let prop_span = self.span();

        let is_async = self.peek().is_keyword("async")
            && !self.peek_at(1).is_punct(":")
            && !self.peek_at(1).is_punct(",")
            && !self.peek_at(1).is_punct("}")
            && !self.peek_at(1).is_punct("(");
        if is_async {
            self.advance();
        }
        let is_generator = self.eat_punct("*");

        let key = self.parse_property_key()?;

        if self.peek().is_punct("(") {
            let name = match &key {
                PropertyKey::Identifier(name) | PropertyKey::Str(name) => Some(name.clone()),
                _ => None,
            };
            let func = self.parse_function_parts(name, is_async, is_generator, false)?;
            return Ok(ObjectProperty::Method { key, func });
        }
        if is_async || is_generator {
            return Err(self.unexpected("expected a method body"));
        }

        if self.eat_punct(":") {
            let value = self.parse_assignment_expr()?;
            return Ok(ObjectProperty::KeyValue { key, value });
        }

        match key {
            PropertyKey::Identifier(name) => Ok(ObjectProperty::Shorthand {
                name,
                span: prop_span,
            }),
            _ => Err(self.unexpected("expected ':' after property key")),
        }
    }

    fn parse_property_key(&mut self) -> Result<PropertyKey, SandpawError> {
        let token = self.peek().clone();
        match &token.kind {
            TokenKind::Identifier | TokenKind::Keyword => {
                self.advance();
                Ok(PropertyKey::Identifier(token.lexeme))
            }
            TokenKind::Str(value) => {
                let value = value.clone();
                self.advance();
                Ok(PropertyKey::Str(value))
            }
            TokenKind::Number(n) => {
                let n = *n;
                self.advance();
                Ok(PropertyKey::Number(n))
            }
            TokenKind::Punct if token.lexeme == "[" => {
                self.advance();
                let expr = self.parse_assignment_expr()?;
                self.expect_punct("]")?;
                Ok(PropertyKey::Computed(Box::new(expr)))
            }
            _ => Err(self.unexpected("expected a property key")),
        }
    }

    /* ----------------------------------------------------------------------
     * Templates
     * -------------------------------------------------------------------- */

    fn template_expr(
        &mut self,
        pieces: &[TemplatePiece],
        span: Span,
    ) -> Result<Expr, SandpawError> {
        let mut parts = Vec::new();
        for piece in pieces {
            match piece {
                TemplatePiece::Chunk { cooked, .. } => {
                    if !cooked.is_empty() {
                        parts.push(TemplatePart::Str(cooked.clone()));
                    }
                }
                TemplatePiece::Interp { source, span } => {
                    parts.push(TemplatePart::Expr(parse_subexpression(source, *span)?));
                }
            }
        }
        Ok(Expr::Template { parts, span })
    }

    fn parse_tagged_template(&mut self, tag: Expr, span: Span) -> Result<Expr, SandpawError> {
        let TokenKind::Template(pieces) = self.advance().kind else {
            return Err(SandpawError::parse("expected a template literal", span));
        };
        let mut cooked = Vec::new();
        let mut raw = Vec::new();
        let mut exprs = Vec::new();
        for piece in &pieces {
            match piece {
                TemplatePiece::Chunk { cooked: c, raw: r } => {
                    cooked.push(c.clone());
                    raw.push(r.clone());
                }
                TemplatePiece::Interp { source, span } => {
                    exprs.push(parse_subexpression(source, *span)?);
                }
            }
        }
        Ok(Expr::TaggedTemplate {
            tag: Box::new(tag),
            cooked,
            raw,
            exprs,
            span,
        })
    }

    /* ----------------------------------------------------------------------
     * Arrow Functions
     * -------------------------------------------------------------------- */

    /// Detects and parses an arrow function head, rewinding on a miss.
    fn try_parse_arrow(&mut self) -> Result<Option<Expr>, SandpawError> {
        let span = self.span();
        let start = self.checkpoint();

        let is_async = if self.peek().is_keyword("async")
            && !self.peek_at(1).newline_before
            && (matches!(self.peek_at(1).kind, TokenKind::Identifier)
                || self.peek_at(1).is_punct("("))
        {
            true
        } else {
            false
        };
        let offset = if is_async { 1 } else { 0 };

        // Single-parameter form: `x => …`.
        if matches!(self.peek_at(offset).kind, TokenKind::Identifier)
            && self.peek_at(offset + 1).is_punct("=>")
        {
            if is_async {
                self.advance();
            }
            let name = self.advance().lexeme;
            self.advance(); // '=>'
            let params = vec![Param {
                pattern: Pattern::Identifier { name },
                default: None,
                rest: false,
            }];
            return self.parse_arrow_body(params, is_async, span).map(Some);
        }

        // Parenthesised form: `(…) => …`.
        if self.peek_at(offset).is_punct("(") {
            if let Some(close) = self.matching_paren(start + offset) {
                if self.tokens.get(close + 1).map(|t| t.is_punct("=>")).unwrap_or(false) {
                    if is_async {
                        self.advance();
                    }
                    let params = match self.parse_params() {
                        Ok(params) => params,
                        Err(err) => {
                            self.rewind(start);
                            return Err(err);
                        }
                    };
                    self.expect_punct("=>")?;
                    return self.parse_arrow_body(params, is_async, span).map(Some);
                }
            }
        }

        self.rewind(start);
        Ok(None)
    }

    fn parse_arrow_body(
        &mut self,
        params: Vec<Param>,
        is_async: bool,
        span: Span,
    ) -> Result<Expr, SandpawError> {
        let body = if self.peek().is_punct("{") {
            self.advance();
            let body = self.parse_stmt_list_until("}")?;
            self.expect_punct("}")?;
            FunctionBody::Block(Rc::new(body))
        } else {
            FunctionBody::Expression(Rc::new(self.parse_assignment_expr()?))
        };
        Ok(Expr::Function {
            func: Rc::new(FunctionNode {
                name: None,
                params,
                body,
                is_async,
                is_generator: false,
                is_arrow: true,
                span,
            }),
            span,
        })
    }

    /// Token index of the `)` matching the `(` at `open`, if any.
    fn matching_paren(&self, open: usize) -> Option<usize> {
        let mut depth = 0usize;
        for (index, token) in self.tokens.iter().enumerate().skip(open) {
            if token.is_punct("(") {
                depth += 1;
            } else if token.is_punct(")") {
                depth -= 1;
                if depth == 0 {
                    return Some(index);
                }
            } else if token.is_eof() {
                break;
            }
        }
        None
    }
}

fn is_assign_target(expr: &Expr) -> bool {
    matches!(
        expr,
        Expr::Identifier { .. } | Expr::Member { .. } | Expr::SuperMember { .. }
    )
}

/// Lexes and parses one template interpolation, carrying the outer
/// source position into the sub-parse.
fn parse_subexpression(source: &str, span: Span) -> Result<Expr, SandpawError> {
    let mut lexer = Lexer::with_start(source, span);
    lexer.scan_tokens()?;
    let mut parser = Parser::new(lexer.tokens);
    let expr = parser.parse_expression()?;
    if !parser.peek().is_eof() {
        return Err(parser.unexpected("unexpected token in template interpolation"));
    }
    Ok(expr)
}
