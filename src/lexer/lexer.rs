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

use num_bigint::BigInt;

use crate::error::SandpawError;
use crate::lexer::keywords::is_keyword;
use crate::lexer::token::{TemplatePiece, Token, TokenKind};
use crate::span::Span;

/// Multi-character punctuation, longest first so maximal munch wins.
const PUNCT: &[&str] = &[
    ">>>=", "===", "!==", "**=", "...", "<<=", ">>=", ">>>", "&&=", "||=", "??=", "=>", "==",
    "!=", "<=", ">=", "&&", "||", "??", "?.", "++", "--", "+=", "-=", "*=", "/=", "%=", "&=",
    "|=", "^=", "<<", ">>", "**",
];

pub struct Lexer {
    chars: Vec<char>,
    current: usize,
    line: usize,
    line_start: usize,
    pending_newline: bool,
    pub tokens: Vec<Token>,
}

impl Lexer {
    /// Creates a new lexer over raw source text with the cursor at the
    /// start and an empty token buffer.
    pub fn new(source: &str) -> Self {
        Self {
            chars: source.chars().collect(),
            current: 0,
            line: 1,
            line_start: 0,
            pending_newline: false,
            tokens: Vec::new(),
        }
    }

    /// A lexer that reports positions relative to an outer location;
    /// used for template interpolations.
    pub fn with_start(source: &str, span: Span) -> Self {
        let mut lexer = Self::new(source);
        lexer.line = span.line;
        lexer
    }

    /// Performs complete lexical analysis over the input, appending a
    /// terminating EOF token. Must be called exactly once per instance.
    pub fn scan_tokens(&mut self) -> Result<(), SandpawError> {
        while !self.is_at_end() {
            self.scan_token()?;
        }
        let span = self.span_here();
        self.tokens.push(Token {
            kind: TokenKind::Eof,
            lexeme: String::new(),
            span,
            newline_before: self.pending_newline,
        });
        Ok(())
    }

    fn scan_token(&mut self) -> Result<(), SandpawError> {
        let start = self.current;
        let span = self.span_here();
        let ch = self.advance();

        match ch {
            // Whitespace
            ' ' | '\r' | '\t' => {}
            '\n' => self.newline(),

            // Comments or division / regex
            '/' => {
                if self.match_char('/') {
                    while self.peek() != '\n' && !self.is_at_end() {
                        self.advance();
                    }
                } else if self.match_char('*') {
                    self.block_comment()?;
                } else if self.regex_allowed() {
                    self.regex(span)?;
                } else if self.match_char('=') {
                    self.push(TokenKind::Punct, "/=", span);
                } else {
                    self.push(TokenKind::Punct, "/", span);
                }
            }

            // Strings
            '"' | '\'' => self.string(ch, span)?,

            // Template literals
            '`' => self.template(span)?,

            // Numbers
            '0'..='9' => self.number(start, span)?,
            '.' if self.peek().is_ascii_digit() => self.number(start, span)?,

            // Identifiers / keywords
            c if c.is_alphabetic() || c == '_' || c == '$' => self.identifier(start, span),

            // Private names are a single token so the parser never
            // mistakes `#x` for an operator.
            '#' => {
                if !(self.peek().is_alphabetic() || self.peek() == '_') {
                    return Err(SandpawError::parse("unexpected character '#'", span));
                }
                while self.peek().is_alphanumeric() || self.peek() == '_' {
                    self.advance();
                }
                let text: String = self.chars[start..self.current].iter().collect();
                self.push(TokenKind::Punct, &text, span);
            }

            // Everything else: punctuation by maximal munch
            _ => {
                self.current = start;
                let matched = PUNCT
                    .iter()
                    .find(|p| self.lookahead_matches(p))
                    .copied();
                match matched {
                    Some(p) => {
                        self.current += p.chars().count();
                        self.push(TokenKind::Punct, p, span);
                    }
                    None => {
                        self.current += 1;
                        let single: String = ch.to_string();
                        self.push(TokenKind::Punct, &single, span);
                    }
                }
            }
        }
        Ok(())
    }

    /* ----------------------------------------------------------------------
     * Token Scanners
     * -------------------------------------------------------------------- */

    fn string(&mut self, delimiter: char, span: Span) -> Result<(), SandpawError> {
        let mut cooked = String::new();
        loop {
            if self.is_at_end() {
                return Err(SandpawError::parse("unterminated string literal", span));
            }
            let ch = self.advance();
            if ch == delimiter {
                break;
            }
            match ch {
                '\n' => {
                    return Err(SandpawError::parse(
                        "strings may not span multiple lines",
                        span,
                    ))
                }
                '\\' => cooked.push(self.escape(span)?),
                other => cooked.push(other),
            }
        }
        let lexeme = cooked.clone();
        self.push(TokenKind::Str(cooked), &lexeme, span);
        Ok(())
    }

    fn escape(&mut self, span: Span) -> Result<char, SandpawError> {
        if self.is_at_end() {
            return Err(SandpawError::parse("unterminated escape sequence", span));
        }
        let ch = self.advance();
        Ok(match ch {
            'n' => '\n',
            't' => '\t',
            'r' => '\r',
            'b' => '\u{0008}',
            'f' => '\u{000C}',
            'v' => '\u{000B}',
            '0' => '\0',
            'x' => self.hex_escape(2, span)?,
            'u' => {
                if self.match_char('{') {
                    let mut digits = String::new();
                    while self.peek() != '}' && !self.is_at_end() {
                        digits.push(self.advance());
                    }
                    if !self.match_char('}') {
                        return Err(SandpawError::parse("unterminated unicode escape", span));
                    }
                    u32::from_str_radix(&digits, 16)
                        .ok()
                        .and_then(char::from_u32)
                        .ok_or_else(|| SandpawError::parse("invalid unicode escape", span))?
                } else {
                    self.hex_escape(4, span)?
                }
            }
            '\n' => {
                self.newline();
                return self.escape(span);
            }
            other => other,
        })
    }

    fn hex_escape(&mut self, len: usize, span: Span) -> Result<char, SandpawError> {
        let mut digits = String::new();
        for _ in 0..len {
            if self.is_at_end() {
                return Err(SandpawError::parse("unterminated escape sequence", span));
            }
            digits.push(self.advance());
        }
        u32::from_str_radix(&digits, 16)
            .ok()
            .and_then(char::from_u32)
            .ok_or_else(|| SandpawError::parse("invalid hex escape", span))
    }

    /// Scans a template literal into alternating chunks and
    /// interpolation sources; the parser lexes the interpolations.
    fn template(&mut self, span: Span) -> Result<(), SandpawError> {
        let mut pieces = Vec::new();
        let mut cooked = String::new();
        let mut raw = String::new();

        loop {
            if self.is_at_end() {
                return Err(SandpawError::parse("unterminated template literal", span));
            }
            let ch = self.advance();
            match ch {
                '`' => break,
                '\\' => {
                    raw.push('\\');
                    if !self.is_at_end() {
                        raw.push(self.peek());
                    }
                    cooked.push(self.escape(span)?);
                }
                '$' if self.peek() == '{' => {
                    self.advance(); // consume '{'
                    pieces.push(TemplatePiece::Chunk {
                        cooked: std::mem::take(&mut cooked),
                        raw: std::mem::take(&mut raw),
                    });
                    let interp_span = self.span_here();
                    let source = self.interpolation_source(span)?;
                    pieces.push(TemplatePiece::Interp {
                        source,
                        span: interp_span,
                    });
                }
                '\n' => {
                    self.newline();
                    cooked.push('\n');
                    raw.push('\n');
                }
                other => {
                    cooked.push(other);
                    raw.push(other);
                }
            }
        }
        pieces.push(TemplatePiece::Chunk { cooked, raw });
        self.push(TokenKind::Template(pieces), "`template`", span);
        Ok(())
    }

    /// Collects the source of one `${…}` interpolation, balancing
    /// braces and skipping nested string and template literals.
    fn interpolation_source(&mut self, span: Span) -> Result<String, SandpawError> {
        let mut depth = 1usize;
        let mut source = String::new();
        loop {
            if self.is_at_end() {
                return Err(SandpawError::parse(
                    "unterminated template interpolation",
                    span,
                ));
            }
            let ch = self.advance();
            match ch {
                '{' => {
                    depth += 1;
                    source.push(ch);
                }
                '}' => {
                    depth -= 1;
                    if depth == 0 {
                        return Ok(source);
                    }
                    source.push(ch);
                }
                '"' | '\'' | '`' => {
                    source.push(ch);
                    let delimiter = ch;
                    loop {
                        if self.is_at_end() {
                            return Err(SandpawError::parse(
                                "unterminated string in interpolation",
                                span,
                            ));
                        }
                        let inner = self.advance();
                        if inner == '\n' {
                            self.newline();
                        }
                        source.push(inner);
                        if inner == '\\' && !self.is_at_end() {
                            source.push(self.advance());
                            continue;
                        }
                        if inner == delimiter {
                            break;
                        }
                    }
                }
                '\n' => {
                    self.newline();
                    source.push('\n');
                }
                other => source.push(other),
            }
        }
    }

    fn identifier(&mut self, start: usize, span: Span) {
        while self.peek().is_alphanumeric() || self.peek() == '_' || self.peek() == '$' {
            self.advance();
        }
        let text: String = self.chars[start..self.current].iter().collect();
        let kind = if is_keyword(&text) {
            TokenKind::Keyword
        } else {
            TokenKind::Identifier
        };
        self.push(kind, &text, span);
    }

    fn number(&mut self, start: usize, span: Span) -> Result<(), SandpawError> {
        let first = self.chars[start];

        // Radix literals: 0x / 0o / 0b
        if first == '0' && matches!(self.peek(), 'x' | 'X' | 'o' | 'O' | 'b' | 'B') {
            let radix = match self.advance() {
                'x' | 'X' => 16,
                'o' | 'O' => 8,
                _ => 2,
            };
            let digit_start = self.current;
            while self.peek().is_ascii_alphanumeric() {
                self.advance();
            }
            let digits: String = self.chars[digit_start..self.current].iter().collect();
            if self.match_char('n') {
                let value = BigInt::parse_bytes(digits.as_bytes(), radix)
                    .ok_or_else(|| SandpawError::parse("invalid bigint literal", span))?;
                self.push(TokenKind::BigInt(value), &digits, span);
            } else {
                let value = i64::from_str_radix(&digits, radix)
                    .map_err(|_| SandpawError::parse("invalid numeric literal", span))?;
                self.push(TokenKind::Number(value as f64), &digits, span);
            }
            return Ok(());
        }

        let mut is_integer = first != '.';
        while self.peek().is_ascii_digit() {
            self.advance();
        }
        if is_integer && self.peek() == '.' && self.peek_next().is_ascii_digit() {
            is_integer = false;
            self.advance();
            while self.peek().is_ascii_digit() {
                self.advance();
            }
        }
        if matches!(self.peek(), 'e' | 'E') {
            is_integer = false;
            self.advance();
            if matches!(self.peek(), '+' | '-') {
                self.advance();
            }
            while self.peek().is_ascii_digit() {
                self.advance();
            }
        }

        let text: String = self.chars[start..self.current].iter().collect();
        if is_integer && self.match_char('n') {
            let value = BigInt::parse_bytes(text.as_bytes(), 10)
                .ok_or_else(|| SandpawError::parse("invalid bigint literal", span))?;
            self.push(TokenKind::BigInt(value), &text, span);
        } else {
            let value = text
                .parse::<f64>()
                .map_err(|_| SandpawError::parse("invalid numeric literal", span))?;
            self.push(TokenKind::Number(value), &text, span);
        }
        Ok(())
    }

    fn regex(&mut self, span: Span) -> Result<(), SandpawError> {
        let mut pattern = String::new();
        let mut in_class = false;
        loop {
            if self.is_at_end() || self.peek() == '\n' {
                return Err(SandpawError::parse("unterminated regex literal", span));
            }
            let ch = self.advance();
            match ch {
                '\\' => {
                    pattern.push('\\');
                    if !self.is_at_end() {
                        pattern.push(self.advance());
                    }
                }
                '[' => {
                    in_class = true;
                    pattern.push(ch);
                }
                ']' => {
                    in_class = false;
                    pattern.push(ch);
                }
                '/' if !in_class => break,
                other => pattern.push(other),
            }
        }
        let mut flags = String::new();
        while self.peek().is_alphabetic() {
            flags.push(self.advance());
        }
        let lexeme = format!("/{}/{}", pattern, flags);
        self.push(TokenKind::Regex { pattern, flags }, &lexeme, span);
        Ok(())
    }

    fn block_comment(&mut self) -> Result<(), SandpawError> {
        let span = self.span_here();
        while !self.is_at_end() {
            if self.peek() == '*' && self.peek_next() == '/' {
                self.advance();
                self.advance();
                return Ok(());
            }
            if self.peek() == '\n' {
                self.newline();
            }
            self.advance();
        }
        Err(SandpawError::parse("unterminated block comment", span))
    }

    /* ----------------------------------------------------------------------
     * Cursor Helpers
     * -------------------------------------------------------------------- */

    /// Whether a `/` at the cursor starts a regex literal rather than a
    /// division, judged from the previous meaningful token.
    fn regex_allowed(&self) -> bool {
        match self.tokens.last() {
            None => true,
            Some(token) => match token.kind {
                TokenKind::Keyword => true,
                TokenKind::Punct => !matches!(token.lexeme.as_str(), ")" | "]"),
                _ => false,
            },
        }
    }

    fn newline(&mut self) {
        self.line += 1;
        self.line_start = self.current;
        self.pending_newline = true;
    }

    fn push(&mut self, kind: TokenKind, lexeme: &str, span: Span) {
        self.tokens.push(Token {
            kind,
            lexeme: lexeme.to_string(),
            span,
            newline_before: self.pending_newline,
        });
        self.pending_newline = false;
    }

    fn span_here(&self) -> Span {
        Span::new(self.line, self.current.saturating_sub(self.line_start))
    }

    fn lookahead_matches(&self, text: &str) -> bool {
        let mut index = self.current;
        for ch in text.chars() {
            if index >= self.chars.len() || self.chars[index] != ch {
                return false;
            }
            index += 1;
        }
        true
    }

    fn match_char(&mut self, expected: char) -> bool {
        if self.is_at_end() || self.chars[self.current] != expected {
            return false;
        }
        self.current += 1;
        true
    }

    fn advance(&mut self) -> char {
        let ch = self.chars[self.current];
        self.current += 1;
        ch
    }

    fn peek(&self) -> char {
        if self.is_at_end() {
            '\0'
        } else {
            self.chars[self.current]
        }
    }

    fn peek_next(&self) -> char {
        if self.current + 1 >= self.chars.len() {
            '\0'
        } else {
            self.chars[self.current + 1]
        }
    }

    fn is_at_end(&self) -> bool {
        self.current >= self.chars.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scan(source: &str) -> Vec<Token> {
        let mut lexer = Lexer::new(source);
        lexer.scan_tokens().unwrap();
        lexer.tokens
    }

    #[test]
    fn punctuation_uses_maximal_munch() {
        let tokens = scan("a ??= b?.c");
        assert!(tokens[1].is_punct("??="));
        assert!(tokens[3].is_punct("?."));
    }

    #[test]
    fn numbers_cover_radix_and_bigint() {
        let tokens = scan("0xff 10n 1.5e2");
        assert!(matches!(tokens[0].kind, TokenKind::Number(n) if n == 255.0));
        assert!(matches!(tokens[1].kind, TokenKind::BigInt(_)));
        assert!(matches!(tokens[2].kind, TokenKind::Number(n) if n == 150.0));
    }

    #[test]
    fn regex_only_in_expression_position() {
        let tokens = scan("a / b");
        assert!(tokens[1].is_punct("/"));

        let tokens = scan("x = /ab+/i");
        assert!(matches!(
            &tokens[2].kind,
            TokenKind::Regex { pattern, flags } if pattern == "ab+" && flags == "i"
        ));
    }

    #[test]
    fn template_pieces_alternate() {
        let tokens = scan("`a ${x + 1} b`");
        let TokenKind::Template(pieces) = &tokens[0].kind else {
            panic!("expected template token");
        };
        assert_eq!(pieces.len(), 3);
        assert!(matches!(&pieces[0], TemplatePiece::Chunk { cooked, .. } if cooked == "a "));
        assert!(matches!(&pieces[1], TemplatePiece::Interp { source, .. } if source == "x + 1"));
    }

    #[test]
    fn newline_tracking_feeds_semicolon_insertion() {
        let tokens = scan("a\nb");
        assert!(!tokens[0].newline_before);
        assert!(tokens[1].newline_before);
    }

    #[test]
    fn private_names_are_single_tokens() {
        let tokens = scan("this.#field");
        assert!(tokens[2].is_punct("#field"));
    }
}
