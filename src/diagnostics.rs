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

use crate::error::SandpawError;

/// Renders human-friendly, compiler-style diagnostics for sandbox
/// errors.
///
/// The renderer:
/// - Formats errors with file/line/column information
/// - Displays the offending source line
/// - Highlights the error position using a caret (`^`)
/// - Appends the captured guest call stack, innermost frame first
///
/// The output is intentionally inspired by `rustc` diagnostics, but
/// simplified and designed to remain readable without color.
pub struct DiagnosticPrinter {
    /// Full source code of the evaluated program, kept as one string so
    /// specific lines can be extracted for error reporting.
    source: String,

    /// Display name of the evaluated chunk (e.g. `sandbox`).
    file_name: String,
}

impl DiagnosticPrinter {
    /// Creates a new diagnostic printer for a given source chunk.
    pub fn new(file_name: impl Into<String>, source: impl Into<String>) -> Self {
        Self {
            file_name: file_name.into(),
            source: source.into(),
        }
    }

    /// Renders a formatted diagnostic into a string.
    ///
    /// # Output Example
    /// ```text
    /// error[undefined variable]: 'x' is not defined
    ///   --> sandbox:3:8
    ///    |
    ///  3 | let y = x + 1;
    ///    |         ^
    /// ```
    pub fn render(&self, error: &SandpawError) -> String {
        let mut out = String::new();

        let line = error.line.unwrap_or(0);
        let column = error.column.unwrap_or(0);

        out.push_str(&format!(
            "error[{}]: {}\n  --> {}:{}:{}\n",
            error.kind, error.message, self.file_name, line, column + 1
        ));

        let lines: Vec<&str> = self.source.lines().collect();
        let src_line = lines.get(line.saturating_sub(1)).copied().unwrap_or("");
        out.push_str("   |\n");
        out.push_str(&format!("{:>3} | {}\n", line, src_line));

        let mut underline = String::new();
        for _ in 0..column {
            underline.push(' ');
        }
        underline.push('^');
        out.push_str(&format!("   | {}\n", underline));

        if !error.call_stack.is_empty() {
            out.push_str("\ncall stack:\n");
            for frame in &error.call_stack {
                out.push_str(&format!(
                    "  at {} ({}:{})\n",
                    frame.function_name.as_deref().unwrap_or("<anonymous>"),
                    frame.line.unwrap_or(0),
                    frame.column.unwrap_or(0),
                ));
            }
        }

        out
    }

    /// Prints the diagnostic to stderr.
    pub fn print(&self, error: &SandpawError) {
        eprintln!("{}", self.render(error));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::span::Span;

    #[test]
    fn renders_caret_under_the_column() {
        let mut err = SandpawError::undefined_variable("x");
        err.enrich(Some(Span::new(1, 8)), Some("let y = x;"), vec![]);

        let printer = DiagnosticPrinter::new("sandbox", "let y = x;");
        let rendered = printer.render(&err);
        assert!(rendered.contains("--> sandbox:1:9"));
        assert!(rendered.contains("let y = x;"));
        assert!(rendered.contains("        ^"));
        assert_eq!(err.kind, ErrorKind::UndefinedVariable);
    }
}
