// Layout layer: converts the raw logos stream into the token stream the
// parser consumes, synthesizing INDENT/DEDENT from column tracking.
//
// A stack of indentation widths starts at [0]. At the start of each
// logical line, a wider first token pushes a level and emits INDENT; a
// narrower one pops levels, emitting one DEDENT per level. Blank lines
// and comment-only lines never touch the stack.

use crate::{unescape_string, LexError, RawToken, Token};
use bon_diagnostics::{classes, DiagnosticEngine, Halt, Span};
use logos::Logos;

const MAX_INDENTS: usize = 20;

/// A token with its source position (0-based line and column).
#[derive(Debug, Clone, PartialEq)]
pub struct TokenSpan {
    pub token: Token,
    pub line: usize,
    pub column: usize,
}

/// Indentation-aware token stream with the `consume()`/`peek()` contract:
/// the stream begins unprimed and `consume()` is called once to prime it.
#[derive(Debug)]
pub struct Lexer {
    tokens: Vec<TokenSpan>,
    pos: usize,
    started: bool,
    skip_next_dedent: bool,
}

impl Lexer {
    /// Tokenize `source`. All lexical diagnostics (unterminated strings,
    /// bad escapes, malformed numbers, indentation problems) are reported
    /// here; the stream itself always ends with `Eof` and is resilient
    /// past errors.
    pub fn new(source: &str, file: &str, diags: &mut DiagnosticEngine) -> Result<Self, Halt> {
        diags.add_source(file, source);
        let tokens = build_token_stream(source, file, diags)?;
        Ok(Self {
            tokens,
            pos: 0,
            started: false,
            skip_next_dedent: false,
        })
    }

    /// Advance to the next token and return it.
    pub fn consume(&mut self) -> Token {
        if !self.started {
            self.started = true;
        } else if self.pos + 1 < self.tokens.len() {
            self.pos += 1;
        }
        if self.skip_next_dedent && self.current().token == Token::Dedent {
            self.skip_next_dedent = false;
            if self.pos + 1 < self.tokens.len() {
                self.pos += 1;
            }
        }
        self.current().token.clone()
    }

    /// The current token without advancing.
    pub fn peek(&self) -> &Token {
        &self.current().token
    }

    pub fn peek_span(&self) -> &TokenSpan {
        self.current()
    }

    pub fn line_number(&self) -> usize {
        self.current().line
    }

    pub fn column(&self) -> usize {
        self.current().column
    }

    /// Suppress the next synthesized `DEDENT`. Used by the parser to
    /// continue a parenthesized argument list across a line break.
    pub fn skip_next_dedent(&mut self) {
        self.skip_next_dedent = true;
    }

    /// Index into the token stream; used by error recovery to guarantee
    /// forward progress.
    pub fn position(&self) -> usize {
        self.pos
    }

    fn current(&self) -> &TokenSpan {
        static EOF_SPAN: TokenSpan = TokenSpan {
            token: Token::Eof,
            line: 0,
            column: 0,
        };
        let idx = self.pos.min(self.tokens.len().saturating_sub(1));
        self.tokens.get(idx).unwrap_or(&EOF_SPAN)
    }
}

// Offsets where each line begins, for span-to-position conversion.
fn line_starts(source: &str) -> Vec<usize> {
    let mut starts = vec![0];
    for (i, b) in source.bytes().enumerate() {
        if b == b'\n' {
            starts.push(i + 1);
        }
    }
    starts
}

fn locate(starts: &[usize], source: &str, offset: usize) -> (usize, usize) {
    let line = match starts.binary_search(&offset) {
        Ok(l) => l,
        Err(l) => l.saturating_sub(1),
    };
    let line_start = starts.get(line).copied().unwrap_or(0);
    let column = source
        .get(line_start..offset)
        .map(|s| s.chars().count())
        .unwrap_or(0);
    (line, column)
}

// Leading-whitespace width of a line; tabs count as 4 columns.
fn indent_width(source: &str, line_start: usize, token_start: usize) -> usize {
    let mut width = 0;
    for ch in source.get(line_start..token_start).unwrap_or("").chars() {
        match ch {
            ' ' => width += 1,
            '\t' => width += 4,
            _ => break,
        }
    }
    width
}

fn build_token_stream(
    source: &str,
    file: &str,
    diags: &mut DiagnosticEngine,
) -> Result<Vec<TokenSpan>, Halt> {
    let starts = line_starts(source);
    let mut out: Vec<TokenSpan> = Vec::new();
    let mut indent_stack: Vec<usize> = vec![0];
    let mut at_line_start = true;
    let mut last_pos = (0usize, 0usize);

    for (result, span) in RawToken::lexer(source).spanned() {
        let (line, column) = locate(&starts, source, span.start);
        last_pos = (line, column);

        let raw = match result {
            Ok(RawToken::Newline) => {
                at_line_start = true;
                continue;
            }
            Ok(raw) => raw,
            Err(_) => {
                let error = if source.get(span.start..).is_some_and(|s| s.starts_with('"')) {
                    LexError::UnterminatedString
                } else {
                    LexError::UnrecognizedCharacter
                };
                diags.error(classes::LEX_ERROR, error.to_string(), Span::new(file, line, column))?;
                continue;
            }
        };

        if at_line_start {
            at_line_start = false;
            let width = indent_width(source, starts.get(line).copied().unwrap_or(0), span.start);
            let top = indent_stack.last().copied().unwrap_or(0);
            if width > top {
                if indent_stack.len() >= MAX_INDENTS {
                    diags.error(
                        classes::LEX_ERROR,
                        format!("Exceeded max indent level ({})", MAX_INDENTS),
                        Span::new(file, line, column),
                    )?;
                }
                indent_stack.push(width);
                out.push(TokenSpan {
                    token: Token::Indent,
                    line,
                    column,
                });
            } else if width < top {
                while indent_stack.len() > 1
                    && width < indent_stack.last().copied().unwrap_or(0)
                {
                    indent_stack.pop();
                    out.push(TokenSpan {
                        token: Token::Dedent,
                        line,
                        column,
                    });
                }
                if let Some(top) = indent_stack.last_mut() {
                    if *top != width {
                        diags.error(
                            classes::SYNTAX_ERROR,
                            "unindent does not match any outer indentation level",
                            Span::new(file, line, column),
                        )?;
                        // continue with the closest outer level to avoid
                        // cascading errors when a whole block is misaligned
                        *top = width;
                    }
                }
            }
        }

        let token = match raw {
            RawToken::Newline => continue,
            RawToken::Def => Token::Def,
            RawToken::New => Token::New,
            RawToken::Class => Token::Class,
            RawToken::Impl => Token::Impl,
            RawToken::Cdef => Token::Cdef,
            RawToken::Return => Token::Return,
            RawToken::If => Token::If,
            RawToken::Then => Token::Then,
            RawToken::Else => Token::Else,
            RawToken::End => Token::End,
            RawToken::While => Token::While,
            RawToken::Do => Token::Do,
            RawToken::Match => Token::Match,
            RawToken::Import => Token::Import,
            RawToken::Type => Token::Type,
            RawToken::And => Token::And,
            RawToken::Or => Token::Or,
            RawToken::Sizeof => Token::Sizeof,
            RawToken::PtrOffset => Token::PtrOffset,
            RawToken::Operator => Token::Operator,
            RawToken::Unary => Token::Unary,
            RawToken::True => Token::Bool(true),
            RawToken::False => Token::Bool(false),
            RawToken::Ident(name) => {
                if name.chars().next().is_some_and(char::is_uppercase) {
                    Token::TypeIdent(name)
                } else {
                    Token::Ident(name)
                }
            }
            RawToken::Int(value) => Token::Int(value),
            RawToken::Float(value) => Token::Float(value),
            RawToken::MalformedNumber => {
                diags.error(
                    classes::LEX_ERROR,
                    LexError::MalformedNumber.to_string(),
                    Span::new(file, line, column),
                )?;
                // recover with the leading float so parsing can continue
                let slice = source.get(span.clone()).unwrap_or("0.0");
                let prefix_len = slice
                    .char_indices()
                    .filter(|&(_, c)| c == '.')
                    .nth(1)
                    .map(|(i, _)| i)
                    .unwrap_or(slice.len());
                Token::Float(
                    slice
                        .get(..prefix_len)
                        .and_then(|s| s.parse().ok())
                        .unwrap_or(0.0),
                )
            }
            RawToken::Str(raw_content) => {
                let (decoded, bad_escapes) = unescape_string(&raw_content);
                for offset in bad_escapes {
                    let (eline, ecol) = locate(&starts, source, span.start + 1 + offset);
                    diags.error(
                        classes::LEX_ERROR,
                        LexError::BadEscape.to_string(),
                        Span::new(file, eline, ecol),
                    )?;
                }
                Token::Str(decoded)
            }
            RawToken::Arrow => Token::Arrow,
            RawToken::DoubleArrow => Token::DoubleArrow,
            RawToken::EqEq => Token::EqEq,
            RawToken::NotEq => Token::NotEq,
            RawToken::GtEq => Token::GtEq,
            RawToken::LtEq => Token::LtEq,
            RawToken::ColonColon => Token::ColonColon,
            RawToken::PlusPlus => Token::PlusPlus,
            RawToken::StarStar => Token::StarStar,
            RawToken::Shl => Token::Shl,
            RawToken::Shr => Token::Shr,
            RawToken::Unit => Token::Unit,
            RawToken::EmptyBrackets => Token::EmptyBrackets,
            RawToken::Plus => Token::Plus,
            RawToken::Minus => Token::Minus,
            RawToken::Star => Token::Star,
            RawToken::Slash => Token::Slash,
            RawToken::Percent => Token::Percent,
            RawToken::Pipe => Token::Pipe,
            RawToken::Caret => Token::Caret,
            RawToken::Ampersand => Token::Ampersand,
            RawToken::Colon => Token::Colon,
            RawToken::Semicolon => Token::Semicolon,
            RawToken::Comma => Token::Comma,
            RawToken::LParen => Token::LParen,
            RawToken::RParen => Token::RParen,
            RawToken::LBracket => Token::LBracket,
            RawToken::RBracket => Token::RBracket,
            RawToken::Lt => Token::Lt,
            RawToken::Gt => Token::Gt,
            RawToken::Assign => Token::Assign,
            RawToken::Not => Token::Not,
            RawToken::Dot => Token::Dot,
        };

        out.push(TokenSpan {
            token,
            line,
            column,
        });
    }

    // every INDENT is matched by a DEDENT before end-of-file
    let (line, column) = last_pos;
    while indent_stack.len() > 1 {
        indent_stack.pop();
        out.push(TokenSpan {
            token: Token::Dedent,
            line,
            column,
        });
    }
    out.push(TokenSpan {
        token: Token::Eof,
        line,
        column,
    });

    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lex_all(source: &str) -> Vec<Token> {
        let mut diags = DiagnosticEngine::new();
        diags.set_quiet(true);
        let mut lexer = Lexer::new(source, "test.bon", &mut diags).unwrap();
        let mut tokens = Vec::new();
        loop {
            let tok = lexer.consume();
            let done = tok == Token::Eof;
            tokens.push(tok);
            if done {
                break;
            }
        }
        tokens
    }

    #[test]
    fn test_indent_dedent_pairing() {
        let tokens = lex_all("def f(x):\n    1\nend\n");
        let indents = tokens.iter().filter(|t| **t == Token::Indent).count();
        let dedents = tokens.iter().filter(|t| **t == Token::Dedent).count();
        assert_eq!(indents, 1);
        assert_eq!(dedents, 1);
        let indent_at = tokens.iter().position(|t| *t == Token::Indent).unwrap();
        let dedent_at = tokens.iter().position(|t| *t == Token::Dedent).unwrap();
        assert!(indent_at < dedent_at);
    }

    #[test]
    fn test_nested_blocks_flush_at_eof() {
        let tokens = lex_all("a\n  b\n    c\n");
        let indents = tokens.iter().filter(|t| **t == Token::Indent).count();
        let dedents = tokens.iter().filter(|t| **t == Token::Dedent).count();
        assert_eq!(indents, 2);
        assert_eq!(dedents, 2);
        assert_eq!(tokens.last(), Some(&Token::Eof));
    }

    #[test]
    fn test_equal_width_emits_nothing() {
        let tokens = lex_all("a\nb\nc\n");
        assert!(!tokens.contains(&Token::Indent));
        assert!(!tokens.contains(&Token::Dedent));
    }

    #[test]
    fn test_blank_and_comment_lines_ignored() {
        let tokens = lex_all("a\n\n# just a comment\n\na\n");
        assert!(!tokens.contains(&Token::Indent));
    }

    #[test]
    fn test_unindent_mismatch_recovers() {
        let mut diags = DiagnosticEngine::new();
        diags.set_quiet(true);
        let source = "a\n    b\n  c\n";
        let _lexer = Lexer::new(source, "test.bon", &mut diags).unwrap();
        assert_eq!(diags.error_count(), 1);
        assert!(diags.diagnostics()[0]
            .message
            .contains("does not match any outer indentation level"));
        assert_eq!(diags.diagnostics()[0].span.line, 2);
    }

    #[test]
    fn test_skip_next_dedent() {
        let mut diags = DiagnosticEngine::new();
        diags.set_quiet(true);
        let mut lexer = Lexer::new("a\n  b\nc\n", "test.bon", &mut diags).unwrap();
        assert_eq!(lexer.consume(), Token::Ident("a".into()));
        assert_eq!(lexer.consume(), Token::Indent);
        assert_eq!(lexer.consume(), Token::Ident("b".into()));
        lexer.skip_next_dedent();
        // the dedent before 'c' is suppressed
        assert_eq!(lexer.consume(), Token::Ident("c".into()));
    }

    #[test]
    fn test_bad_escape_reported_at_position() {
        let mut diags = DiagnosticEngine::new();
        diags.set_quiet(true);
        let _ = Lexer::new("x = \"a\\qb\"\n", "test.bon", &mut diags).unwrap();
        assert_eq!(diags.error_count(), 1);
        assert_eq!(diags.diagnostics()[0].span.column, 6);
    }

    #[test]
    fn test_tabs_count_as_four_columns() {
        // tab indent (4) then 4-space indent on the next line: same level
        let tokens = lex_all("a\n\tb\n    c\n");
        let indents = tokens.iter().filter(|t| **t == Token::Indent).count();
        assert_eq!(indents, 1);
    }

    #[test]
    fn test_peek_does_not_advance() {
        let mut diags = DiagnosticEngine::new();
        diags.set_quiet(true);
        let mut lexer = Lexer::new("a b\n", "test.bon", &mut diags).unwrap();
        lexer.consume();
        assert_eq!(lexer.peek(), &Token::Ident("a".into()));
        assert_eq!(lexer.peek(), &Token::Ident("a".into()));
        assert_eq!(lexer.consume(), Token::Ident("b".into()));
    }

    #[test]
    fn test_positions() {
        let mut diags = DiagnosticEngine::new();
        diags.set_quiet(true);
        let mut lexer = Lexer::new("a\n  b\n", "test.bon", &mut diags).unwrap();
        lexer.consume();
        assert_eq!((lexer.line_number(), lexer.column()), (0, 0));
        lexer.consume(); // indent
        lexer.consume(); // b
        assert_eq!((lexer.line_number(), lexer.column()), (1, 2));
    }
}
