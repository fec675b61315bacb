//! Tokenization.
//!
//! [`TokenKind`] is the state machine generated by `logos`. [`Lexer`] wraps it into a lazy
//! stream of [`Token`]s, reports lexical errors to the [`Source`] and always ends the stream
//! with exactly one [`TokenKind::Eof`].

use derive_more::Display;
use logos::Logos;
use rill_source::{Diagnostic, Phase, Position, Source, Span};

#[derive(Debug, Logos, Display, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TokenKind {
    // literals
    #[regex(r"[0-9]+")]
    #[display("integer literal")]
    IntLit,
    #[regex(r"[0-9]+\.[0-9]+")]
    #[display("float literal")]
    FloatLit,
    #[regex(r#""([^"\\\n]|\\.)*""#)]
    #[display("string literal")]
    StringLit,

    // identifiers
    #[regex(r"[a-zA-Z_][a-zA-Z0-9_]*")]
    #[display("identifier")]
    Identifier,

    // keywords
    #[token("fn")]
    #[display("'fn'")]
    Fn,
    #[token("let")]
    #[display("'let'")]
    Let,
    #[token("if")]
    #[display("'if'")]
    If,
    #[token("else")]
    #[display("'else'")]
    Else,
    #[token("while")]
    #[display("'while'")]
    While,
    #[token("return")]
    #[display("'return'")]
    Return,
    #[token("true")]
    #[display("'true'")]
    True,
    #[token("false")]
    #[display("'false'")]
    False,

    // unary operators
    #[token("!")]
    #[display("'!'")]
    LogicalNot,

    // binary operators
    // - arithmetics
    #[token("+")]
    #[display("'+'")]
    Plus,
    #[token("-")]
    #[display("'-'")]
    Minus, // NOTE: can also be unary
    #[token("*")]
    #[display("'*'")]
    Asterisk,
    #[token("/")]
    #[display("'/'")]
    Slash,
    #[token("%")]
    #[display("'%'")]
    Percent,
    // - assignment
    #[token("=")]
    #[display("'='")]
    Equals,
    // - equality
    #[token("==")]
    #[display("'=='")]
    EqualsEquals,
    #[token("!=")]
    #[display("'!='")]
    NotEquals,
    // - ordering
    #[token(">")]
    #[display("'>'")]
    GreaterThan,
    #[token(">=")]
    #[display("'>='")]
    GreaterThanEquals,
    #[token("<")]
    #[display("'<'")]
    LessThan,
    #[token("<=")]
    #[display("'<='")]
    LessThanEquals,
    // - logical
    #[token("&&")]
    #[display("'&&'")]
    LogicalAnd,
    #[token("||")]
    #[display("'||'")]
    LogicalOr,
    #[token("->")]
    #[display("'->'")]
    Arrow,

    // punctuation
    #[token("(")]
    #[display("'('")]
    OpenParen,
    #[token(")")]
    #[display("')'")]
    CloseParen,
    #[token("{")]
    #[display("'{{'")]
    OpenBrace,
    #[token("}")]
    #[display("'}}'")]
    CloseBrace,
    #[token(",")]
    #[display("','")]
    Comma,
    #[token(";")]
    #[display("';'")]
    Semi,
    #[token(":")]
    #[display("':'")]
    Colon,

    // malformed input, turned into `Error` by `Lexer`
    #[regex(r"[0-9]+\.[0-9]*\.[0-9a-zA-Z_.]*")]
    #[display("malformed number")]
    MalformedNumber,
    #[regex(r#""([^"\\\n]|\\.)*\\?"#)]
    #[display("unterminated string")]
    UnterminatedString,

    // misc
    #[regex(r"[ \t\n\r\f]+", logos::skip)]
    #[regex(r"//[^\n]*", logos::skip)] // single line comments
    #[error]
    #[display("invalid token")]
    Error,

    /// Only generated by [`Lexer`] once the underlying scanner is exhausted.
    #[display("end of input")]
    Eof,
}

/// The coarse classification of a [`TokenKind`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenClass {
    Identifier,
    IntegerLiteral,
    FloatLiteral,
    StringLiteral,
    Keyword,
    Operator,
    Punctuation,
    EndOfInput,
    Error,
}

impl TokenKind {
    pub fn class(self) -> TokenClass {
        use TokenKind::*;
        match self {
            IntLit => TokenClass::IntegerLiteral,
            FloatLit => TokenClass::FloatLiteral,
            StringLit => TokenClass::StringLiteral,
            Identifier => TokenClass::Identifier,
            Fn | Let | If | Else | While | Return | True | False => TokenClass::Keyword,
            LogicalNot | Plus | Minus | Asterisk | Slash | Percent | Equals | EqualsEquals
            | NotEquals | GreaterThan | GreaterThanEquals | LessThan | LessThanEquals
            | LogicalAnd | LogicalOr | Arrow => TokenClass::Operator,
            OpenParen | CloseParen | OpenBrace | CloseBrace | Comma | Semi | Colon => {
                TokenClass::Punctuation
            }
            MalformedNumber | UnterminatedString | Error => TokenClass::Error,
            Eof => TokenClass::EndOfInput,
        }
    }

    /// Returns the binary binding power or `None` if invalid binop token.
    /// Binding power `0` and `1` is reserved for accepting any expression.
    /// Assignment (`TokenKind::Equals`) has the lowest precedence with `(2, 1)` and is the only right associative operator.
    pub fn binop_bp(self) -> Option<(u8, u8)> {
        match self {
            /* Assignment */
            TokenKind::Equals => Some((2, 1)),
            /* Logical */
            TokenKind::LogicalOr => Some((3, 4)),
            TokenKind::LogicalAnd => Some((5, 6)),
            /* Equality */
            TokenKind::EqualsEquals | TokenKind::NotEquals => Some((7, 8)),
            /* Ordering */
            TokenKind::GreaterThan
            | TokenKind::GreaterThanEquals
            | TokenKind::LessThan
            | TokenKind::LessThanEquals => Some((9, 10)),
            /* Additive */
            TokenKind::Plus | TokenKind::Minus => Some((11, 12)),
            /* Multiplicative */
            TokenKind::Asterisk | TokenKind::Slash | TokenKind::Percent => Some((13, 14)),
            _ => None,
        }
    }

    /// Equality and ordering operators cannot be chained (`a < b < c`).
    pub fn is_non_associative(self) -> bool {
        matches!(
            self,
            TokenKind::EqualsEquals
                | TokenKind::NotEquals
                | TokenKind::GreaterThan
                | TokenKind::GreaterThanEquals
                | TokenKind::LessThan
                | TokenKind::LessThanEquals
        )
    }
}

/// Binding power of prefix `-` and `!`. Binds tighter than every binary operator.
pub const PREFIX_BP: u8 = 15;

/// A lexical unit. Immutable once produced.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Token<'a> {
    pub kind: TokenKind,
    pub lexeme: &'a str,
    pub span: Span,
    pub position: Position,
}

/// Lazy token stream over a [`Source`].
pub struct Lexer<'a> {
    inner: logos::Lexer<'a, TokenKind>,
    source: &'a Source<'a>,
    finished: bool,
}

impl<'a> Lexer<'a> {
    pub fn new(source: &'a Source<'a>) -> Self {
        Self {
            inner: TokenKind::lexer(source.content),
            source,
            finished: false,
        }
    }

    fn error(&self, message: impl ToString, span: Span) {
        self.source
            .report(Diagnostic::error(Phase::Lexical, message, span));
    }

    fn token(&self, kind: TokenKind, span: Span) -> Token<'a> {
        Token {
            kind,
            lexeme: &self.source.content[span.start..span.end],
            span,
            position: self.source.position(span.start),
        }
    }
}

impl<'a> Iterator for Lexer<'a> {
    type Item = Token<'a>;

    fn next(&mut self) -> Option<Token<'a>> {
        if self.finished {
            return None;
        }

        let kind = match self.inner.next() {
            Some(kind) => kind,
            None => {
                self.finished = true;
                let end = self.source.content.len();
                return Some(self.token(TokenKind::Eof, Span::new(end, end)));
            }
        };
        let span: Span = self.inner.span().into();
        let lexeme = self.inner.slice();

        let kind = match kind {
            TokenKind::IntLit if lexeme.parse::<i64>().is_err() => {
                self.error(
                    format!("integer literal '{}' is out of range", lexeme),
                    span,
                );
                TokenKind::Error
            }
            TokenKind::MalformedNumber => {
                self.error(format!("malformed number literal '{}'", lexeme), span);
                TokenKind::Error
            }
            TokenKind::UnterminatedString => {
                self.error("unterminated string literal", span);
                TokenKind::Error
            }
            TokenKind::Error => {
                self.error(format!("unexpected character '{}'", lexeme), span);
                TokenKind::Error
            }
            kind => kind,
        };

        Some(self.token(kind, span))
    }
}

/// Tokenizes the whole source eagerly. The last token is always [`TokenKind::Eof`].
pub fn tokenize<'a>(source: &'a Source<'a>) -> Vec<Token<'a>> {
    let tokens: Vec<_> = Lexer::new(source).collect();
    tracing::debug!(tokens = tokens.len(), "tokenized");
    tokens
}

/// Decodes the contents of a string literal token (including the surrounding quotes).
pub fn unescape(lexeme: &str) -> String {
    let inner = lexeme
        .strip_prefix('"')
        .and_then(|s| s.strip_suffix('"'))
        .unwrap_or(lexeme);
    let mut result = String::with_capacity(inner.len());
    let mut chars = inner.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            result.push(c);
            continue;
        }
        match chars.next() {
            Some('n') => result.push('\n'),
            Some('t') => result.push('\t'),
            Some('r') => result.push('\r'),
            Some('0') => result.push('\0'),
            // unknown escapes keep the escaped character
            Some(other) => result.push(other),
            None => result.push('\\'),
        }
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(source: &str) -> Vec<TokenKind> {
        let source = source.into();
        let kinds = Lexer::new(&source).map(|t| t.kind).collect();
        assert!(source.has_no_errors(), "{}", source.render_all());
        kinds
    }

    fn lex_errors(source: &str) -> (Vec<TokenKind>, Vec<String>) {
        let source = source.into();
        let kinds = Lexer::new(&source).map(|t| t.kind).collect();
        (kinds, source.diagnostics.error_messages())
    }

    #[test]
    fn test_let_statement() {
        use TokenKind::*;
        assert_eq!(
            kinds("let x = 1 + 2 * 3;"),
            vec![Let, Identifier, Equals, IntLit, Plus, IntLit, Asterisk, IntLit, Semi, Eof]
        );
    }

    #[test]
    fn test_maximal_munch() {
        use TokenKind::*;
        assert_eq!(
            kinds("== = != ! <= < >= > && || ->"),
            vec![
                EqualsEquals,
                Equals,
                NotEquals,
                LogicalNot,
                LessThanEquals,
                LessThan,
                GreaterThanEquals,
                GreaterThan,
                LogicalAnd,
                LogicalOr,
                Arrow,
                Eof
            ]
        );
        assert_eq!(kinds("a==b"), vec![Identifier, EqualsEquals, Identifier, Eof]);
    }

    #[test]
    fn test_keywords_and_identifiers() {
        use TokenKind::*;
        assert_eq!(
            kinds("fn let if else while return true false"),
            vec![Fn, Let, If, Else, While, Return, True, False, Eof]
        );
        assert_eq!(
            kinds("iffy lets _x1 fn_name"),
            vec![Identifier, Identifier, Identifier, Identifier, Eof]
        );
        assert_eq!(TokenKind::While.class(), TokenClass::Keyword);
        assert_eq!(TokenKind::Identifier.class(), TokenClass::Identifier);
    }

    #[test]
    fn test_numbers() {
        use TokenKind::*;
        assert_eq!(kinds("1 2.5 10.0"), vec![IntLit, FloatLit, FloatLit, Eof]);
    }

    #[test]
    fn test_comments_and_whitespace() {
        use TokenKind::*;
        assert_eq!(
            kinds("let x = 1; // a comment\n\t// another\nx"),
            vec![Let, Identifier, Equals, IntLit, Semi, Identifier, Eof]
        );
        assert_eq!(kinds(""), vec![Eof]);
        assert_eq!(kinds("   \n  // only a comment"), vec![Eof]);
    }

    #[test]
    fn test_positions() {
        let source = "let x\n  = 10;".into();
        let tokens = tokenize(&source);
        assert_eq!(tokens[1].lexeme, "x");
        assert_eq!((tokens[1].position.line, tokens[1].position.column), (1, 5));
        assert_eq!(tokens[2].lexeme, "=");
        assert_eq!((tokens[2].position.line, tokens[2].position.column), (2, 3));
        assert_eq!(tokens[3].position.offset, 10);
        let eof = tokens.last().unwrap();
        assert_eq!(eof.kind, TokenKind::Eof);
        assert_eq!(eof.span, Span::new(13, 13));
    }

    #[test]
    fn test_malformed_number_resynchronizes() {
        use TokenKind::*;
        let (kinds, errors) = lex_errors("let x = 1.2.3; let y = 2;");
        assert_eq!(
            kinds,
            vec![Let, Identifier, Equals, Error, Semi, Let, Identifier, Equals, IntLit, Semi, Eof]
        );
        assert_eq!(errors, vec!["malformed number literal '1.2.3'"]);
    }

    #[test]
    fn test_unterminated_string_resumes_on_next_line() {
        use TokenKind::*;
        let (kinds, errors) = lex_errors("let s = \"abc;\nlet t = \"ok\";");
        assert_eq!(
            kinds,
            vec![Let, Identifier, Equals, Error, Let, Identifier, Equals, StringLit, Semi, Eof]
        );
        assert_eq!(errors, vec!["unterminated string literal"]);
    }

    #[test]
    fn test_multiple_errors_in_one_pass() {
        let (_, errors) = lex_errors("let a = @; let b = 99999999999999999999; let c = #;");
        assert_eq!(
            errors,
            vec![
                "unexpected character '@'",
                "integer literal '99999999999999999999' is out of range",
                "unexpected character '#'",
            ]
        );
    }

    #[test]
    fn test_exactly_one_eof() {
        let source = "x".into();
        let mut lexer = Lexer::new(&source);
        assert_eq!(lexer.next().map(|t| t.kind), Some(TokenKind::Identifier));
        assert_eq!(lexer.next().map(|t| t.kind), Some(TokenKind::Eof));
        assert_eq!(lexer.next(), None);
        assert_eq!(lexer.next(), None);
    }

    #[test]
    fn test_unescape() {
        assert_eq!(unescape(r#""a\nb\t\"c\"\\""#), "a\nb\t\"c\"\\");
        assert_eq!(unescape(r#""\q""#), "q");
        assert_eq!(unescape(r#""""#), "");
    }
}
