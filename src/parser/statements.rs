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
 * Statement and class-body parsing.
 */

use std::rc::Rc;

use crate::ast::{
    CatchClause, ClassMember, ClassNode, DeclKind, Declarator, Expr, ForInit, ForTarget,
    MemberName, MethodKind, Pattern, Stmt, SwitchCase,
};
use crate::error::SandpawError;
use crate::lexer::token::TokenKind;
use crate::parser::Parser;

impl Parser {
    /// Parses a single statement.
    pub fn parse_statement(&mut self) -> Result<Stmt, SandpawError> {
        let span = self.span();
        let token = self.peek().clone();

        match &token.kind {
            TokenKind::Punct if token.lexeme == "{" => {
                self.advance();
                let body = self.parse_stmt_list_until("}")?;
                self.expect_punct("}")?;
                Ok(Stmt::Block { body, span })
            }
            TokenKind::Punct if token.lexeme == ";" => {
                self.advance();
                Ok(Stmt::Empty { span })
            }
            TokenKind::Keyword => match token.lexeme.as_str() {
                "let" => self.parse_var_statement(DeclKind::Let, span),
                "const" => self.parse_var_statement(DeclKind::Const, span),
                "var" => self.parse_var_statement(DeclKind::Var, span),
                "function" => {
                    self.advance();
                    let func = self.parse_function_tail(false, true)?;
                    Ok(Stmt::FunctionDecl { func, span })
                }
                "async" if self.peek_at(1).is_keyword("function") => {
                    self.advance();
                    self.advance();
                    let func = self.parse_function_tail(true, true)?;
                    Ok(Stmt::FunctionDecl { func, span })
                }
                "class" => {
                    self.advance();
                    let class = self.parse_class_tail(true)?;
                    Ok(Stmt::ClassDecl { class, span })
                }
                "if" => self.parse_if(span),
                "while" => self.parse_while(span),
                "do" => self.parse_do_while(span),
                "for" => self.parse_for(span),
                "switch" => self.parse_switch(span),
                "try" => self.parse_try(span),
                "throw" => {
                    self.advance();
                    if self.peek().newline_before {
                        return Err(self.unexpected("'throw' requires an argument on the same line"));
                    }
                    let argument = self.parse_expression()?;
                    self.semicolon()?;
                    Ok(Stmt::Throw { argument, span })
                }
                "return" => {
                    self.advance();
                    let argument = if self.statement_argument_follows() {
                        Some(self.parse_expression()?)
                    } else {
                        None
                    };
                    self.semicolon()?;
                    Ok(Stmt::Return { argument, span })
                }
                "break" => {
                    self.advance();
                    let label = self.optional_label();
                    self.semicolon()?;
                    Ok(Stmt::Break { label, span })
                }
                "continue" => {
                    self.advance();
                    let label = self.optional_label();
                    self.semicolon()?;
                    Ok(Stmt::Continue { label, span })
                }
                "debugger" => {
                    self.advance();
                    self.semicolon()?;
                    Ok(Stmt::Empty { span })
                }
                "with" => Err(SandpawError::parse(
                    "'with' statements are not supported in the sandbox",
                    span,
                )),
                _ => self.parse_expression_statement(span),
            },
            TokenKind::Identifier => {
                // import/export would need a module system; the sandbox
                // has none.
                if token.lexeme == "import" || token.lexeme == "export" {
                    return Err(SandpawError::parse("modules are not supported", span));
                }
                // Labelled statement: identifier ':'.
                if self.peek_at(1).is_punct(":") {
                    let label = self.advance().lexeme;
                    self.advance();
                    let body = Box::new(self.parse_statement()?);
                    return Ok(Stmt::Labeled { label, body, span });
                }
                self.parse_expression_statement(span)
            }
            _ => self.parse_expression_statement(span),
        }
    }

    pub(crate) fn parse_stmt_list_until(
        &mut self,
        closer: &str,
    ) -> Result<Vec<Stmt>, SandpawError> {
        let mut body = Vec::new();
        while !self.peek().is_punct(closer) && !self.peek().is_eof() {
            body.push(self.parse_statement()?);
        }
        Ok(body)
    }

    fn parse_expression_statement(
        &mut self,
        span: crate::span::Span,
    ) -> Result<Stmt, SandpawError> {
        let expr = self.parse_expression()?;
        self.semicolon()?;
        Ok(Stmt::Expression { expr, span })
    }

    fn statement_argument_follows(&self) -> bool {
        let next = self.peek();
        !(next.is_eof()
            || next.newline_before
            || next.is_punct(";")
            || next.is_punct("}")
            || next.is_punct(")"))
    }

    fn optional_label(&mut self) -> Option<String> {
        let next = self.peek();
        if matches!(next.kind, TokenKind::Identifier) && !next.newline_before {
            Some(self.advance().lexeme)
        } else {
            None
        }
    }

    /* ----------------------------------------------------------------------
     * Declarations
     * -------------------------------------------------------------------- */

    fn parse_var_statement(
        &mut self,
        kind: DeclKind,
        span: crate::span::Span,
    ) -> Result<Stmt, SandpawError> {
        self.advance();
        let declarations = self.parse_declarator_list(kind)?;
        self.semicolon()?;
        Ok(Stmt::VarDecl {
            kind,
            declarations,
            span,
        })
    }

    pub(crate) fn parse_declarator_list(
        &mut self,
        kind: DeclKind,
    ) -> Result<Vec<Declarator>, SandpawError> {
        let mut declarations = Vec::new();
        loop {
            let pattern = self.parse_binding_pattern()?;
            let init = if self.eat_punct("=") {
                Some(self.parse_assignment_expr()?)
            } else {
                None
            };
            if kind == DeclKind::Const && init.is_none() {
                return Err(self.unexpected("'const' declarations need an initialiser"));
            }
            declarations.push(Declarator { pattern, init });
            if !self.eat_punct(",") {
                break;
            }
        }
        Ok(declarations)
    }

    /* ----------------------------------------------------------------------
     * Control Flow
     * -------------------------------------------------------------------- */

    fn parse_if(&mut self, span: crate::span::Span) -> Result<Stmt, SandpawError> {
        self.advance();
        self.expect_punct("(")?;
        let test = self.parse_expression()?;
        self.expect_punct(")")?;
        let consequent = Box::new(self.parse_statement()?);
        let alternate = if self.eat_keyword("else") {
            Some(Box::new(self.parse_statement()?))
        } else {
            None
        };
        Ok(Stmt::If {
            test,
            consequent,
            alternate,
            span,
        })
    }

    fn parse_while(&mut self, span: crate::span::Span) -> Result<Stmt, SandpawError> {
        self.advance();
        self.expect_punct("(")?;
        let test = self.parse_expression()?;
        self.expect_punct(")")?;
        let body = Box::new(self.parse_statement()?);
        Ok(Stmt::While { test, body, span })
    }

    fn parse_do_while(&mut self, span: crate::span::Span) -> Result<Stmt, SandpawError> {
        self.advance();
        let body = Box::new(self.parse_statement()?);
        self.expect_keyword("while")?;
        self.expect_punct("(")?;
        let test = self.parse_expression()?;
        self.expect_punct(")")?;
        let _ = self.eat_punct(";");
        Ok(Stmt::DoWhile { body, test, span })
    }

    fn parse_for(&mut self, span: crate::span::Span) -> Result<Stmt, SandpawError> {
        self.advance();
        let is_await = self.eat_keyword("await");
        self.expect_punct("(")?;

        // Declaration-form loop heads.
        let decl_kind = if self.peek().is_keyword("let") {
            Some(DeclKind::Let)
        } else if self.peek().is_keyword("const") {
            Some(DeclKind::Const)
        } else if self.peek().is_keyword("var") {
            Some(DeclKind::Var)
        } else {
            None
        };

        if let Some(kind) = decl_kind {
            self.advance();
            let pattern = self.parse_binding_pattern()?;

            if self.eat_contextual("of") {
                let right = self.parse_assignment_expr()?;
                self.expect_punct(")")?;
                let body = Box::new(self.parse_statement()?);
                return Ok(Stmt::ForOf {
                    left: ForTarget::Decl { kind, pattern },
                    right,
                    body,
                    is_await,
                    span,
                });
            }
            if self.eat_keyword("in") {
                let right = self.parse_expression()?;
                self.expect_punct(")")?;
                let body = Box::new(self.parse_statement()?);
                return Ok(Stmt::ForIn {
                    left: ForTarget::Decl { kind, pattern },
                    right,
                    body,
                    span,
                });
            }

            // Classic for: finish this declarator, then the rest.
            if is_await {
                return Err(self.unexpected("'for await' requires an 'of' loop"));
            }
            let init = if self.eat_punct("=") {
                Some(self.parse_assignment_expr()?)
            } else {
                None
            };
            if kind == DeclKind::Const && init.is_none() {
                return Err(self.unexpected("'const' declarations need an initialiser"));
            }
            let mut declarations = vec![Declarator {
                pattern,
                init,
            }];
            if self.eat_punct(",") {
                declarations.extend(self.parse_declarator_list(kind)?);
            }
            self.expect_punct(";")?;
            return self.parse_classic_for_tail(
                Some(ForInit::VarDecl { kind, declarations }),
                span,
            );
        }

        // Expression or empty loop heads.
        if self.eat_punct(";") {
            if is_await {
                return Err(self.unexpected("'for await' requires an 'of' loop"));
            }
            return self.parse_classic_for_tail(None, span);
        }

        self.no_in = true;
        let head = self.parse_expression();
        self.no_in = false;
        let head = head?;
        if self.eat_contextual("of") {
            let right = self.parse_assignment_expr()?;
            self.expect_punct(")")?;
            let body = Box::new(self.parse_statement()?);
            return Ok(Stmt::ForOf {
                left: ForTarget::Expr(head),
                right,
                body,
                is_await,
                span,
            });
        }
        if self.eat_keyword("in") {
            let right = self.parse_expression()?;
            self.expect_punct(")")?;
            let body = Box::new(self.parse_statement()?);
            return Ok(Stmt::ForIn {
                left: ForTarget::Expr(head),
                right,
                body,
                span,
            });
        }

        if is_await {
            return Err(self.unexpected("'for await' requires an 'of' loop"));
        }
        self.expect_punct(";")?;
        self.parse_classic_for_tail(Some(ForInit::Expr(head)), span)
    }

    fn parse_classic_for_tail(
        &mut self,
        init: Option<ForInit>,
        span: crate::span::Span,
    ) -> Result<Stmt, SandpawError> {
        let test = if self.peek().is_punct(";") {
            None
        } else {
            Some(self.parse_expression()?)
        };
        self.expect_punct(";")?;
        let update = if self.peek().is_punct(")") {
            None
        } else {
            Some(self.parse_expression()?)
        };
        self.expect_punct(")")?;
        let body = Box::new(self.parse_statement()?);
        Ok(Stmt::For {
            init,
            test,
            update,
            body,
            span,
        })
    }

    fn parse_switch(&mut self, span: crate::span::Span) -> Result<Stmt, SandpawError> {
        self.advance();
        self.expect_punct("(")?;
        let discriminant = self.parse_expression()?;
        self.expect_punct(")")?;
        self.expect_punct("{")?;

        let mut cases = Vec::new();
        while !self.peek().is_punct("}") && !self.peek().is_eof() {
            let test = if self.eat_keyword("case") {
                let test = self.parse_expression()?;
                Some(test)
            } else {
                self.expect_keyword("default")?;
                None
            };
            self.expect_punct(":")?;

            let mut body = Vec::new();
            while !self.peek().is_punct("}")
                && !self.peek().is_keyword("case")
                && !self.peek().is_keyword("default")
                && !self.peek().is_eof()
            {
                body.push(self.parse_statement()?);
            }
            cases.push(SwitchCase { test, body });
        }
        self.expect_punct("}")?;
        Ok(Stmt::Switch {
            discriminant,
            cases,
            span,
        })
    }

    fn parse_try(&mut self, span: crate::span::Span) -> Result<Stmt, SandpawError> {
        self.advance();
        self.expect_punct("{")?;
        let block = self.parse_stmt_list_until("}")?;
        self.expect_punct("}")?;

        let handler = if self.eat_keyword("catch") {
            let param = if self.eat_punct("(") {
                let pattern = self.parse_binding_pattern()?;
                self.expect_punct(")")?;
                Some(pattern)
            } else {
                None
            };
            self.expect_punct("{")?;
            let body = self.parse_stmt_list_until("}")?;
            self.expect_punct("}")?;
            Some(CatchClause { param, body })
        } else {
            None
        };

        let finalizer = if self.eat_keyword("finally") {
            self.expect_punct("{")?;
            let body = self.parse_stmt_list_until("}")?;
            self.expect_punct("}")?;
            Some(body)
        } else {
            None
        };

        if handler.is_none() && finalizer.is_none() {
            return Err(self.unexpected("'try' needs a catch or finally clause"));
        }

        Ok(Stmt::Try {
            block,
            handler,
            finalizer,
            span,
        })
    }

    /* ----------------------------------------------------------------------
     * Classes
     * -------------------------------------------------------------------- */

    /// Parses a class body after the `class` keyword.
    pub(crate) fn parse_class_tail(
        &mut self,
        named: bool,
    ) -> Result<Rc<ClassNode>, SandpawError> {
        let span = self.span();
        let name = if matches!(self.peek().kind, TokenKind::Identifier) {
            Some(self.advance().lexeme)
        } else if named {
            return Err(self.unexpected("expected a class name"));
        } else {
            None
        };

        let parent = if self.eat_keyword("extends") {
            Some(self.parse_unary_expr()?)
        } else {
            None
        };

        self.expect_punct("{")?;
        let mut members = Vec::new();
        while !self.peek().is_punct("}") && !self.peek().is_eof() {
            if self.eat_punct(";") {
                continue;
            }
            members.push(self.parse_class_member()?);
        }
        self.expect_punct("}")?;

        Ok(Rc::new(ClassNode {
            name,
            parent,
            members,
            span,
        }))
    }

    fn parse_class_member(&mut self) -> Result<ClassMember, SandpawError> {
        // `static { … }` blocks and the static flag.
        let is_static = self.peek().is_identifier("static")
            && !self.peek_at(1).is_punct("(")
            && !self.peek_at(1).is_punct("=");
        if is_static {
            self.advance();
            if self.peek().is_punct("{") {
                self.advance();
                let body = self.parse_stmt_list_until("}")?;
                self.expect_punct("}")?;
                return Ok(ClassMember::StaticBlock { body });
            }
        }

        // Accessor and modifier prefixes.
        let is_async = self.peek().is_keyword("async")
            && !self.peek_at(1).is_punct("(")
            && !self.peek_at(1).is_punct("=");
        if is_async {
            self.advance();
        }
        let is_generator = self.eat_punct("*");

        let accessor = if !is_async && !is_generator {
            if self.peek().is_identifier("get")
                && !self.peek_at(1).is_punct("(")
                && !self.peek_at(1).is_punct("=")
            {
                self.advance();
                Some(MethodKind::Getter)
            } else if self.peek().is_identifier("set")
                && !self.peek_at(1).is_punct("(")
                && !self.peek_at(1).is_punct("=")
            {
                self.advance();
                Some(MethodKind::Setter)
            } else {
                None
            }
        } else {
            None
        };

        let key = self.parse_member_name()?;

        if self.peek().is_punct("(") {
            let kind = accessor.unwrap_or({
                if !is_static && !is_async && !is_generator {
                    match &key {
                        MemberName::Identifier(name) if name == "constructor" => {
                            MethodKind::Constructor
                        }
                        _ => MethodKind::Method,
                    }
                } else {
                    MethodKind::Method
                }
            });
            let func = self.parse_method_function(&key, is_async, is_generator)?;
            return Ok(ClassMember::Method {
                key,
                kind,
                func,
                is_static,
            });
        }

        if accessor.is_some() {
            return Err(self.unexpected("accessors require a method body"));
        }

        // Field, with or without initialiser.
        let value = if self.eat_punct("=") {
            Some(self.parse_assignment_expr()?)
        } else {
            None
        };
        self.semicolon()?;
        Ok(ClassMember::Field {
            key,
            value,
            is_static,
        })
    }

    pub(crate) fn parse_member_name(&mut self) -> Result<MemberName, SandpawError> {
        let token = self.peek().clone();
        match &token.kind {
            TokenKind::Identifier | TokenKind::Keyword => {
                self.advance();
                Ok(MemberName::Identifier(token.lexeme))
            }
            TokenKind::Str(value) => {
                let value = value.clone();
                self.advance();
                Ok(MemberName::Identifier(value))
            }
            TokenKind::Number(n) => {
                let n = *n;
                self.advance();
                Ok(MemberName::Identifier(crate::value::format_number(n)))
            }
            TokenKind::Punct if token.lexeme.starts_with('#') => {
                self.advance();
                Ok(MemberName::Private(token.lexeme[1..].to_string()))
            }
            TokenKind::Punct if token.lexeme == "[" => {
                self.advance();
                let expr = self.parse_assignment_expr()?;
                self.expect_punct("]")?;
                Ok(MemberName::Computed(expr))
            }
            _ => Err(self.unexpected("expected a class member name")),
        }
    }

    fn parse_method_function(
        &mut self,
        key: &MemberName,
        is_async: bool,
        is_generator: bool,
    ) -> Result<Rc<crate::ast::FunctionNode>, SandpawError> {
        let name = match key {
            MemberName::Identifier(name) => Some(name.clone()),
            MemberName::Private(name) => Some(format!("#{}", name)),
            MemberName::Computed(_) => None,
        };
        self.parse_function_parts(name, is_async, is_generator, false)
    }
}

// Re-exported for the expression parser's `extends` clause handling.
impl Parser {
    pub(crate) fn parse_unary_expr(&mut self) -> Result<Expr, SandpawError> {
        self.parse_unary()
    }
}
