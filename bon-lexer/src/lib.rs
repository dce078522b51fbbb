use logos::Logos;

pub mod layout;
pub use layout::{Lexer, TokenSpan};

/// Raw lexemes recognized by logos. The layout layer in [`layout`]
/// converts this stream into [`Token`]s, folding newlines into
/// `INDENT`/`DEDENT` and unescaping string literals.
#[derive(Logos, Debug, Clone, PartialEq)]
#[logos(skip r"[ \t\f\r]+")]
#[logos(skip r"#[^\n]*")]
pub(crate) enum RawToken {
    #[token("\n")]
    Newline,

    // Keywords
    #[token("def")]
    Def,
    #[token("new")]
    New,
    #[token("class")]
    Class,
    #[token("impl")]
    Impl,
    #[token("cdef")]
    Cdef,
    #[token("return")]
    Return,
    #[token("if")]
    If,
    #[token("then")]
    Then,
    #[token("else")]
    Else,
    #[token("end")]
    End,
    #[token("while")]
    While,
    #[token("do")]
    Do,
    #[token("match")]
    Match,
    #[token("import")]
    Import,
    #[token("type")]
    Type,
    #[token("and")]
    And,
    #[token("or")]
    Or,
    #[token("sizeof")]
    Sizeof,
    #[token("ptr_offset")]
    PtrOffset,
    #[token("operator")]
    Operator,
    #[token("unary")]
    Unary,
    #[token("true")]
    True,
    #[token("false")]
    False,

    // Identifiers; an initial uppercase letter classifies the name as a
    // type-constructor identifier
    #[regex(r"[a-zA-Z_][a-zA-Z0-9_]*", |lex| lex.slice().to_string())]
    Ident(String),

    // Literals
    #[regex(r"[0-9]+", |lex| lex.slice().parse().ok())]
    Int(i64),

    // Two decimal points is a malformed number, reported by the layout layer
    #[regex(r"[0-9]+\.[0-9]+\.[0-9.]+")]
    MalformedNumber,

    #[regex(r"[0-9]*\.[0-9]+|[0-9]+\.", |lex| lex.slice().parse().ok())]
    Float(f64),

    // Raw string content with surrounding quotes stripped; escapes are
    // decoded (and validated) by the layout layer where the span is known
    #[regex(r#""([^"\\\n]|\\[^\n])*""#, |lex| {
        let s = lex.slice();
        s[1..s.len() - 1].to_string()
    })]
    Str(String),

    // Multi-character operators (longest match)
    #[token("->")]
    Arrow,
    #[token("=>")]
    DoubleArrow,
    #[token("==")]
    EqEq,
    #[token("!=")]
    NotEq,
    #[token(">=")]
    GtEq,
    #[token("<=")]
    LtEq,
    #[token("::")]
    ColonColon,
    #[token("++")]
    PlusPlus,
    #[token("**")]
    StarStar,
    #[token("<<")]
    Shl,
    #[token(">>")]
    Shr,

    // "()" is the unit literal, "[]" an empty vector constructor
    #[regex(r"\([ \t]*\)")]
    Unit,
    #[regex(r"\[[ \t]*\]")]
    EmptyBrackets,

    // Single-character operators and punctuation
    #[token("+")]
    Plus,
    #[token("-")]
    Minus,
    #[token("*")]
    Star,
    #[token("/")]
    Slash,
    #[token("%")]
    Percent,
    #[token("|")]
    Pipe,
    #[token("^")]
    Caret,
    #[token("&")]
    Ampersand,
    #[token(":")]
    Colon,
    #[token(";")]
    Semicolon,
    #[token(",")]
    Comma,
    #[token("(")]
    LParen,
    #[token(")")]
    RParen,
    #[token("[")]
    LBracket,
    #[token("]")]
    RBracket,
    #[token("<")]
    Lt,
    #[token(">")]
    Gt,
    #[token("=")]
    Assign,
    #[token("!")]
    Not,
    #[token(".")]
    Dot,
}

/// Tokens seen by the parser. Layout tokens `Indent`/`Dedent` are
/// synthesized from column tracking; `Eof` terminates every stream.
#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    // Keywords
    Def,
    New,
    Class,
    Impl,
    Cdef,
    Return,
    If,
    Then,
    Else,
    End,
    While,
    Do,
    Match,
    Import,
    Type,
    And,
    Or,
    Sizeof,
    PtrOffset,
    Operator,
    Unary,

    // Identifiers
    Ident(String),
    TypeIdent(String),

    // Literals
    Int(i64),
    Float(f64),
    Str(String),
    Bool(bool),
    Unit,

    // Layout
    Indent,
    Dedent,
    Eof,

    // Operators and punctuation
    Arrow,
    DoubleArrow,
    EqEq,
    NotEq,
    GtEq,
    LtEq,
    ColonColon,
    PlusPlus,
    StarStar,
    Shl,
    Shr,
    Plus,
    Minus,
    Star,
    Slash,
    Percent,
    Pipe,
    Caret,
    Ampersand,
    Colon,
    Semicolon,
    Comma,
    LParen,
    RParen,
    LBracket,
    RBracket,
    Lt,
    Gt,
    Assign,
    Not,
    Dot,
    EmptyBrackets,
}

impl Token {
    /// Printable form used in diagnostics ("unknown token '->' ...").
    pub fn label(&self) -> &'static str {
        match self {
            Token::Def => "'def'",
            Token::New => "'new'",
            Token::Class => "'class'",
            Token::Impl => "'impl'",
            Token::Cdef => "'cdef'",
            Token::Return => "'return'",
            Token::If => "'if'",
            Token::Then => "'then'",
            Token::Else => "'else'",
            Token::End => "'end'",
            Token::While => "'while'",
            Token::Do => "'do'",
            Token::Match => "'match'",
            Token::Import => "'import'",
            Token::Type => "'type'",
            Token::And => "'and'",
            Token::Or => "'or'",
            Token::Sizeof => "'sizeof'",
            Token::PtrOffset => "'ptr_offset'",
            Token::Operator => "'operator'",
            Token::Unary => "'unary'",
            Token::Ident(_) => "<identifier>",
            Token::TypeIdent(_) => "<type constructor>",
            Token::Int(_) => "<int>",
            Token::Float(_) => "<float>",
            Token::Str(_) => "<string>",
            Token::Bool(true) => "'true'",
            Token::Bool(false) => "'false'",
            Token::Unit => "'()'",
            Token::Indent => "<indent>",
            Token::Dedent => "<unindent>",
            Token::Eof => "<EOF>",
            Token::Arrow => "'->'",
            Token::DoubleArrow => "'=>'",
            Token::EqEq => "'=='",
            Token::NotEq => "'!='",
            Token::GtEq => "'>='",
            Token::LtEq => "'<='",
            Token::ColonColon => "'::'",
            Token::PlusPlus => "'++'",
            Token::StarStar => "'**'",
            Token::Shl => "'<<'",
            Token::Shr => "'>>'",
            Token::Plus => "'+'",
            Token::Minus => "'-'",
            Token::Star => "'*'",
            Token::Slash => "'/'",
            Token::Percent => "'%'",
            Token::Pipe => "'|'",
            Token::Caret => "'^'",
            Token::Ampersand => "'&'",
            Token::Colon => "':'",
            Token::Semicolon => "';'",
            Token::Comma => "','",
            Token::LParen => "'('",
            Token::RParen => "')'",
            Token::LBracket => "'['",
            Token::RBracket => "']'",
            Token::Lt => "'<'",
            Token::Gt => "'>'",
            Token::Assign => "'='",
            Token::Not => "'!'",
            Token::Dot => "'.'",
            Token::EmptyBrackets => "'[]'",
        }
    }
}

/// Decode `\n` and `\"` escapes; anything else is reported at the
/// character position. Returns the decoded string and the byte offsets
/// (within the raw content) of invalid escape sequences.
pub(crate) fn unescape_string(raw: &str) -> (String, Vec<usize>) {
    let mut result = String::new();
    let mut bad_escapes = Vec::new();
    let mut chars = raw.char_indices();

    while let Some((offset, ch)) = chars.next() {
        if ch == '\\' {
            match chars.next() {
                Some((_, 'n')) => result.push('\n'),
                Some((_, '"')) => result.push('"'),
                Some((_, other)) => {
                    bad_escapes.push(offset);
                    result.push('\\');
                    result.push(other);
                }
                None => bad_escapes.push(offset),
            }
        } else {
            result.push(ch);
        }
    }

    (result, bad_escapes)
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LexError {
    #[error("unterminated string literal")]
    UnterminatedString,
    #[error("unrecognized escape sequence")]
    BadEscape,
    #[error("malformed floating point number")]
    MalformedNumber,
    #[error("unrecognized character")]
    UnrecognizedCharacter,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw_tokens(source: &str) -> Vec<RawToken> {
        RawToken::lexer(source).map(|r| r.unwrap()).collect()
    }

    #[test]
    fn test_keywords() {
        let tokens = raw_tokens("def class impl match cdef type");
        assert_eq!(
            tokens,
            vec![
                RawToken::Def,
                RawToken::Class,
                RawToken::Impl,
                RawToken::Match,
                RawToken::Cdef,
                RawToken::Type,
            ]
        );
    }

    #[test]
    fn test_literals() {
        let tokens = raw_tokens(r#"42 3.14 "hello" true ()"#);
        assert_eq!(tokens[0], RawToken::Int(42));
        assert_eq!(tokens[1], RawToken::Float(3.14));
        assert_eq!(tokens[2], RawToken::Str("hello".to_string()));
        assert_eq!(tokens[3], RawToken::True);
        assert_eq!(tokens[4], RawToken::Unit);
    }

    #[test]
    fn test_trailing_dot_float() {
        assert_eq!(raw_tokens("7."), vec![RawToken::Float(7.0)]);
        assert_eq!(raw_tokens(".5"), vec![RawToken::Float(0.5)]);
    }

    #[test]
    fn test_malformed_number() {
        assert_eq!(raw_tokens("1.2.3"), vec![RawToken::MalformedNumber]);
    }

    #[test]
    fn test_longest_match_operators() {
        let tokens = raw_tokens("-> => == != >= <= :: ++ ** << >>");
        assert_eq!(
            tokens,
            vec![
                RawToken::Arrow,
                RawToken::DoubleArrow,
                RawToken::EqEq,
                RawToken::NotEq,
                RawToken::GtEq,
                RawToken::LtEq,
                RawToken::ColonColon,
                RawToken::PlusPlus,
                RawToken::StarStar,
                RawToken::Shl,
                RawToken::Shr,
            ]
        );
    }

    #[test]
    fn test_empty_brackets_and_unit() {
        assert_eq!(raw_tokens("[ ]"), vec![RawToken::EmptyBrackets]);
        assert_eq!(raw_tokens("( )"), vec![RawToken::Unit]);
        assert_eq!(
            raw_tokens("[1]"),
            vec![RawToken::LBracket, RawToken::Int(1), RawToken::RBracket]
        );
    }

    #[test]
    fn test_comments_are_skipped() {
        let tokens = raw_tokens("1 # the rest is ignored ->");
        assert_eq!(tokens, vec![RawToken::Int(1)]);
    }

    #[test]
    fn test_unterminated_string_is_error() {
        let results: Vec<_> = RawToken::lexer("\"oops\n").collect();
        assert!(results.iter().any(|r| r.is_err()));
    }

    #[test]
    fn test_unescape() {
        let (s, bad) = unescape_string(r#"a\nb\"c"#);
        assert_eq!(s, "a\nb\"c");
        assert!(bad.is_empty());

        let (_, bad) = unescape_string(r"a\qb");
        assert_eq!(bad.len(), 1);
    }
}
