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

use crate::span::Span;

/// One lexical token.
#[derive(Debug, Clone)]
pub struct Token {
    pub kind: TokenKind,
    /// The surface text for identifiers, keywords and punctuation.
    pub lexeme: String,
    pub span: Span,
    /// Whether a line break separates this token from the previous one;
    /// drives semicolon insertion.
    pub newline_before: bool,
}

#[derive(Debug, Clone)]
pub enum TokenKind {
    Identifier,
    Keyword,
    Number(f64),
    BigInt(BigInt),
    Str(String),
    /// A template literal, kept as alternating chunks and interpolation
    /// sources; the parser lexes the interpolations recursively.
    Template(Vec<TemplatePiece>),
    Regex { pattern: String, flags: String },
    Punct,
    Eof,
}

/// One piece of a template literal token.
#[derive(Debug, Clone)]
pub enum TemplatePiece {
    Chunk { cooked: String, raw: String },
    Interp { source: String, span: Span },
}

impl Token {
    pub fn is_punct(&self, text: &str) -> bool {
        matches!(self.kind, TokenKind::Punct) && self.lexeme == text
    }

    pub fn is_keyword(&self, word: &str) -> bool {
        matches!(self.kind, TokenKind::Keyword) && self.lexeme == word
    }

    /// Identifier or contextual keyword usable as a plain name.
    pub fn is_identifier(&self, name: &str) -> bool {
        matches!(self.kind, TokenKind::Identifier) && self.lexeme == name
    }

    pub fn is_eof(&self) -> bool {
        matches!(self.kind, TokenKind::Eof)
    }
}
