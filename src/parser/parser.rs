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

use crate::ast::Program;
use crate::error::SandpawError;
use crate::lexer::token::{Token, TokenKind};
use crate::span::Span;

/// Parser state: a token buffer and a cursor. Backtracking (used for
/// arrow-function detection) saves and restores the cursor.
pub struct Parser {
    pub(crate) tokens: Vec<Token>,
    pub(crate) pos: usize,
    /// Suppresses the `in` operator while parsing a `for` head, so
    /// `for (x in y)` is not swallowed as a relational expression.
    pub(crate) no_in: bool,
}

impl Parser {
    pub fn new(tokens: Vec<Token>) -> Self {
        Self {
            tokens,
            pos: 0,
            no_in: false,
        }
    }

    /// Parses the whole token stream into a program.
    pub fn parse_program(&mut self) -> Result<Program, SandpawError> {
        let mut body = Vec::new();
        while !self.peek().is_eof() {
            body.push(self.parse_statement()?);
        }
        Ok(Program { body })
    }

    /* ----------------------------------------------------------------------
     * Cursor Helpers
     * -------------------------------------------------------------------- */

    pub(crate) fn peek(&self) -> &Token {
        &self.tokens[self.pos.min(self.tokens.len() - 1)]
    }

    pub(crate) fn peek_at(&self, offset: usize) -> &Token {
        &self.tokens[(self.pos + offset).min(self.tokens.len() - 1)]
    }

    pub(crate) fn advance(&mut self) -> Token {
        let token = self.peek().clone();
        if self.pos < self.tokens.len() - 1 {
            self.pos += 1;
        }
        token
    }

    pub(crate) fn span(&self) -> Span {
        self.peek().span
    }

    pub(crate) fn checkpoint(&self) -> usize {
        self.pos
    }

    pub(crate) fn rewind(&mut self, checkpoint: usize) {
        self.pos = checkpoint;
    }

    pub(crate) fn eat_punct(&mut self, text: &str) -> bool {
        if self.peek().is_punct(text) {
            self.advance();
            true
        } else {
            false
        }
    }

    pub(crate) fn expect_punct(&mut self, text: &str) -> Result<(), SandpawError> {
        if self.eat_punct(text) {
            Ok(())
        } else {
            Err(self.unexpected(&format!("expected '{}'", text)))
        }
    }

    pub(crate) fn eat_keyword(&mut self, word: &str) -> bool {
        if self.peek().is_keyword(word) {
            self.advance();
            true
        } else {
            false
        }
    }

    pub(crate) fn expect_keyword(&mut self, word: &str) -> Result<(), SandpawError> {
        if self.eat_keyword(word) {
            Ok(())
        } else {
            Err(self.unexpected(&format!("expected '{}'", word)))
        }
    }

    /// Consumes a contextual keyword spelled as an identifier.
    pub(crate) fn eat_contextual(&mut self, word: &str) -> bool {
        if self.peek().is_identifier(word) {
            self.advance();
            true
        } else {
            false
        }
    }

    pub(crate) fn expect_identifier(&mut self) -> Result<String, SandpawError> {
        match self.peek().kind {
            TokenKind::Identifier => Ok(self.advance().lexeme),
            _ => Err(self.unexpected("expected an identifier")),
        }
    }

    /// An identifier or keyword usable as a property / member name.
    pub(crate) fn expect_name(&mut self) -> Result<String, SandpawError> {
        match self.peek().kind {
            TokenKind::Identifier | TokenKind::Keyword => Ok(self.advance().lexeme),
            _ => Err(self.unexpected("expected a property name")),
        }
    }

    /// Statement terminator with semicolon insertion: an explicit `;`,
    /// a closing brace, end of input, or a preceding line break.
    pub(crate) fn semicolon(&mut self) -> Result<(), SandpawError> {
        if self.eat_punct(";") {
            return Ok(());
        }
        let next = self.peek();
        if next.is_eof() || next.is_punct("}") || next.newline_before {
            return Ok(());
        }
        Err(self.unexpected("expected ';'"))
    }

    pub(crate) fn unexpected(&self, message: &str) -> SandpawError {
        let token = self.peek();
        let shown = if token.is_eof() {
            "end of input".to_string()
        } else {
            format!("'{}'", token.lexeme)
        };
        SandpawError::parse(format!("{}, found {}", message, shown), token.span)
    }
}
