// Diagnostic engine for the Bon compiler.
// Collects errors and warnings from every pass, renders them with source
// context, and enforces the error/warning ceilings that halt a compile.

use colored::Colorize;
use std::collections::HashMap;
use std::fmt;

/// Source code location (file, line, column). Lines and columns are
/// 1-based in rendered output; internally both start at 0 like the lexer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Span {
    pub file: String,
    pub line: usize,
    pub column: usize,
}

impl Span {
    pub fn new(file: impl Into<String>, line: usize, column: usize) -> Self {
        Self {
            file: file.into(),
            line,
            column,
        }
    }

    pub fn unknown() -> Self {
        Self {
            file: "<unknown>".to_string(),
            line: 0,
            column: 0,
        }
    }
}

impl fmt::Display for Span {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}:{}:{}", self.file, self.line + 1, self.column + 1)
    }
}

/// Severity of a diagnostic.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Level {
    Error,
    Warning,
    Info,
}

/// A single diagnostic: class ("syntax error", "type mismatch", ...),
/// message, and position.
#[derive(Debug, Clone)]
pub struct Diagnostic {
    pub level: Level,
    pub class: String,
    pub message: String,
    pub span: Span,
}

impl Diagnostic {
    pub fn error(class: &str, message: impl Into<String>, span: Span) -> Self {
        Self {
            level: Level::Error,
            class: class.to_string(),
            message: message.into(),
            span,
        }
    }

    pub fn warning(class: &str, message: impl Into<String>, span: Span) -> Self {
        Self {
            level: Level::Warning,
            class: class.to_string(),
            message: message.into(),
            span,
        }
    }
}

/// Diagnostic classes used across the compiler.
pub mod classes {
    pub const LEX_ERROR: &str = "lex error";
    pub const SYNTAX_ERROR: &str = "syntax error";
    pub const TYPE_MISMATCH: &str = "type mismatch";
    pub const TYPE_ERROR: &str = "type error";
    pub const UNBOUND_NAME: &str = "unbound name";
    pub const ARITY_MISMATCH: &str = "arity mismatch";
    pub const NO_MATCHING_IMPL: &str = "no matching impl";
    pub const INTERNAL_ERROR: &str = "internal error";
}

/// Raised when a ceiling is crossed; unwinds to the driver which prints
/// the summary and aborts the compile.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum Halt {
    #[error("maximum error count exceeded")]
    MaxErrors,
    #[error("maximum warning count exceeded")]
    MaxWarnings,
}

/// Collects diagnostics, tracks counters against configured ceilings, and
/// renders output. The engine also keeps the source text of every file it
/// has seen so the offending line can be echoed under the header.
#[derive(Debug)]
pub struct DiagnosticEngine {
    diagnostics: Vec<Diagnostic>,
    sources: HashMap<String, String>,
    error_count: u32,
    warning_count: u32,
    max_errors: u32,
    max_warnings: u32,
    quiet: bool,
}

impl Default for DiagnosticEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl DiagnosticEngine {
    pub const DEFAULT_MAX_ERRORS: u32 = 20;
    pub const DEFAULT_MAX_WARNINGS: u32 = 100;

    pub fn new() -> Self {
        Self {
            diagnostics: Vec::new(),
            sources: HashMap::new(),
            error_count: 0,
            warning_count: 0,
            max_errors: Self::DEFAULT_MAX_ERRORS,
            max_warnings: Self::DEFAULT_MAX_WARNINGS,
            quiet: false,
        }
    }

    pub fn config(&mut self, max_errors: u32, max_warnings: u32) {
        self.max_errors = max_errors;
        self.max_warnings = max_warnings;
    }

    /// Suppress printing; diagnostics are still collected and counted.
    /// Used by the test suite and the REPL's speculative parses.
    pub fn set_quiet(&mut self, quiet: bool) {
        self.quiet = quiet;
    }

    /// Register the source text for a file so diagnostics can echo the
    /// offending line.
    pub fn add_source(&mut self, file: impl Into<String>, text: impl Into<String>) {
        self.sources.insert(file.into(), text.into());
    }

    pub fn error(&mut self, class: &str, message: impl Into<String>, span: Span) -> Result<(), Halt> {
        self.emit(Diagnostic::error(class, message, span));
        if self.error_count >= self.max_errors {
            return Err(Halt::MaxErrors);
        }
        Ok(())
    }

    pub fn warn(&mut self, class: &str, message: impl Into<String>, span: Span) -> Result<(), Halt> {
        self.emit(Diagnostic::warning(class, message, span));
        if self.warning_count >= self.max_warnings {
            return Err(Halt::MaxWarnings);
        }
        Ok(())
    }

    fn emit(&mut self, diagnostic: Diagnostic) {
        match diagnostic.level {
            Level::Error => self.error_count += 1,
            Level::Warning => self.warning_count += 1,
            Level::Info => {}
        }
        if !self.quiet {
            eprintln!("{}", self.render(&diagnostic));
        }
        self.diagnostics.push(diagnostic);
    }

    pub fn had_errors(&self) -> bool {
        self.error_count > 0 || self.warning_count >= self.max_warnings
    }

    pub fn error_count(&self) -> u32 {
        self.error_count
    }

    pub fn warning_count(&self) -> u32 {
        self.warning_count
    }

    pub fn diagnostics(&self) -> &[Diagnostic] {
        &self.diagnostics
    }

    /// Final summary line, printed once per compile.
    pub fn finalize(&self) -> String {
        if self.had_errors() {
            format!(
                "FAILED with {} warnings and {} errors.",
                self.warning_count, self.error_count
            )
        } else {
            format!(
                "Succeeded with {} warnings and {} errors.",
                self.warning_count, self.error_count
            )
        }
    }

    /// One-line colorized header, the offending source line, and a caret
    /// under the column.
    pub fn render(&self, diagnostic: &Diagnostic) -> String {
        let class_colored = match diagnostic.level {
            Level::Error => diagnostic.class.red().bold(),
            Level::Warning => diagnostic.class.magenta().bold(),
            Level::Info => diagnostic.class.normal(),
        };
        let mut out = format!(
            "{}: {}: {}",
            diagnostic.span.to_string().bold(),
            class_colored,
            diagnostic.message.bold()
        );

        if let Some(line) = self.context_line(&diagnostic.span) {
            out.push('\n');
            out.push_str(line);
            out.push('\n');
            for _ in 0..diagnostic.span.column {
                out.push(' ');
            }
            out.push_str(&format!("{}", "^".green().bold()));
        }

        out
    }

    fn context_line(&self, span: &Span) -> Option<&str> {
        let source = self.sources.get(&span.file)?;
        source.lines().nth(span.line)
    }

    /// Export all collected diagnostics as JSON for IDE integration.
    pub fn to_json(&self) -> String {
        let mut json = String::from("{\"diagnostics\":[");
        for (i, diag) in self.diagnostics.iter().enumerate() {
            if i > 0 {
                json.push(',');
            }
            let level = match diag.level {
                Level::Error => "error",
                Level::Warning => "warning",
                Level::Info => "info",
            };
            json.push_str(&format!(
                "{{\"level\":\"{}\",\"class\":\"{}\",\"message\":\"{}\",\"file\":\"{}\",\"line\":{},\"column\":{}}}",
                level,
                diag.class.replace('"', "\\\""),
                diag.message.replace('\\', "\\\\").replace('"', "\\\""),
                diag.span.file.replace('"', "\\\""),
                diag.span.line,
                diag.span.column
            ));
        }
        json.push_str("]}");
        json
    }
}

/// Fuzzy matching for "did you mean?" suggestions on unbound names.
pub mod fuzzy {
    use strsim::jaro_winkler;

    /// Names similar to `target`, best first, similarity above `threshold`.
    pub fn find_similar_names(
        target: &str,
        candidates: impl IntoIterator<Item = impl AsRef<str>>,
        threshold: f64,
        max_suggestions: usize,
    ) -> Vec<String> {
        let mut scored: Vec<(String, f64)> = candidates
            .into_iter()
            .map(|candidate| {
                let candidate = candidate.as_ref();
                (candidate.to_string(), jaro_winkler(target, candidate))
            })
            .filter(|(_, score)| *score > threshold)
            .collect();

        scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));

        scored
            .into_iter()
            .take(max_suggestions)
            .map(|(name, _)| name)
            .collect()
    }

    /// Default parameters used by the unbound-name diagnostics.
    pub fn suggest(target: &str, candidates: impl IntoIterator<Item = impl AsRef<str>>) -> Vec<String> {
        find_similar_names(target, candidates, 0.7, 3)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_counts_and_ceiling() {
        let mut engine = DiagnosticEngine::new();
        engine.set_quiet(true);
        engine.config(2, 100);

        assert!(engine
            .error(classes::SYNTAX_ERROR, "first", Span::unknown())
            .is_ok());
        assert_eq!(engine.error_count(), 1);

        let halted = engine.error(classes::SYNTAX_ERROR, "second", Span::unknown());
        assert_eq!(halted, Err(Halt::MaxErrors));
        assert!(engine.had_errors());
    }

    #[test]
    fn test_warnings_do_not_fail_compile() {
        let mut engine = DiagnosticEngine::new();
        engine.set_quiet(true);
        assert!(engine
            .warn("warning", "unused thing", Span::unknown())
            .is_ok());
        assert!(!engine.had_errors());
    }

    #[test]
    fn test_render_includes_context_and_caret() {
        let mut engine = DiagnosticEngine::new();
        engine.set_quiet(true);
        engine.add_source("test.bon", "def f(x):\n  1 + \"a\"\nend\n");

        let diag = Diagnostic::error(
            classes::TYPE_MISMATCH,
            "int != string",
            Span::new("test.bon", 1, 4),
        );
        let rendered = engine.render(&diag);
        assert!(rendered.contains("test.bon:2:5"));
        assert!(rendered.contains("1 + \"a\""));
        assert!(rendered.lines().last().map(str::trim_start).is_some_and(|l| l.contains('^')));
    }

    #[test]
    fn test_json_export() {
        let mut engine = DiagnosticEngine::new();
        engine.set_quiet(true);
        let _ = engine.error(classes::UNBOUND_NAME, "no such name", Span::new("a.bon", 3, 7));
        let json = engine.to_json();
        let parsed: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed["diagnostics"][0]["line"], 3);
        assert_eq!(parsed["diagnostics"][0]["class"], "unbound name");
    }

    #[test]
    fn test_fuzzy_suggestions() {
        let names = ["print_string", "print_float", "concat"];
        let found = fuzzy::suggest("print_strng", names.iter());
        assert_eq!(found.first().map(String::as_str), Some("print_string"));
        assert!(fuzzy::suggest("zzz", names.iter()).is_empty());
    }
}
