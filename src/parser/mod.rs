/*
 * ==========================================================================
 * SANDPAW - Safe Claws for Untrusted Code!
 * ==========================================================================
 *
 * Syntactic Analysis
 * ------------------
 * Recursive-descent parser with precedence climbing for expressions.
 *
 *  - parser.rs      → parser state, cursor helpers, program loop
 *  - statements.rs  → statement & class parsing
 *  - expressions.rs → expression parsing
 *  - helpers.rs     → parameters, patterns, function bodies
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

pub mod expressions;
pub mod helpers;
pub mod parser;
pub mod statements;

pub use parser::Parser;

use crate::ast::Program;
use crate::error::SandpawError;
use crate::lexer::token::Token;

/// Parses a token stream into a program.
pub fn parse(tokens: Vec<Token>) -> Result<Program, SandpawError> {
    Parser::new(tokens).parse_program()
}
