use crate::ast::{Program, Stmt, StmtKind};
use crate::lexer::{Lexer, Token, TokenKind};
use rill_source::{Diagnostic, Phase, Source, Span};

mod expr;
mod stmt;

pub struct Parser<'a> {
    /// Cached token for peeking.
    current: Token<'a>,
    /// The last consumed token. Used for spans and synchronization.
    previous: Token<'a>,
    tokens: Box<dyn Iterator<Item = Token<'a>> + 'a>,
    /// Set after a syntax error. Further errors are suppressed until the parser synchronizes.
    panic_mode: bool,
    /// Source code
    source: &'a Source<'a>,
}

impl<'a> Parser<'a> {
    /// Create a parser that lexes `source` lazily.
    pub fn new(source: &'a Source<'a>) -> Self {
        Self::from_tokens(source, Lexer::new(source))
    }

    /// Create a parser over an existing token stream (e.g. the result of [`crate::lexer::tokenize`]).
    pub fn from_tokens(source: &'a Source<'a>, tokens: impl IntoIterator<Item = Token<'a>> + 'a) -> Self {
        let mut tokens: Box<dyn Iterator<Item = Token<'a>> + 'a> = Box::new(tokens.into_iter());
        let end = source.content.len();
        let current = tokens.next().unwrap_or(Token {
            kind: TokenKind::Eof,
            lexeme: "",
            span: Span::new(end, end),
            position: source.position(end),
        });
        Self {
            current,
            previous: current,
            tokens,
            panic_mode: false,
            source,
        }
    }
}

impl<'a> Parser<'a> {
    /// Parses a whole program. Always returns a tree; unparsable declarations are replaced with
    /// [`StmtKind::Error`] markers and reported to the source diagnostics.
    pub fn parse_program(&mut self) -> Program {
        let mut items = Vec::new();
        while !self.check(TokenKind::Eof) {
            if self.check(TokenKind::CloseBrace) {
                self.error_at_current("unmatched '}'");
                self.next();
                self.panic_mode = false;
                continue;
            }
            items.push(self.parse_declaration());
        }
        tracing::debug!(items = items.len(), "parsed program");
        Program { items }
    }
}

/// Parse utilities
impl<'a> Parser<'a> {
    /// Consumes the current token and returns it.
    fn next(&mut self) -> Token<'a> {
        let token = self.current;
        if token.kind != TokenKind::Eof {
            self.current = self.tokens.next().unwrap_or(Token {
                kind: TokenKind::Eof,
                lexeme: "",
                span: Span::new(token.span.end, token.span.end),
                position: self.source.position(token.span.end),
            });
        }
        self.previous = token;
        token
    }

    fn check(&self, kind: TokenKind) -> bool {
        self.current.kind == kind
    }

    /// Predicate that tests whether the current token has the same kind and eats it if yes as a side effect.
    fn eat(&mut self, kind: TokenKind) -> bool {
        if self.check(kind) {
            self.next(); // eat token
            true
        } else {
            false
        }
    }

    /// Eats a token of kind `kind` or raises an unexpected token error.
    fn expect(&mut self, kind: TokenKind) -> Option<Token<'a>> {
        if self.check(kind) {
            Some(self.next())
        } else {
            self.unexpected(&kind.to_string());
            None
        }
    }

    /// Eats an identifier and returns its name and span.
    fn expect_identifier(&mut self, what: &str) -> Option<(String, Span)> {
        if self.check(TokenKind::Identifier) {
            let token = self.next();
            Some((token.lexeme.to_string(), token.span))
        } else {
            self.unexpected(what);
            None
        }
    }

    /// Raises an unexpected token error.
    fn unexpected(&mut self, expected: &str) {
        let found = match self.current.kind {
            TokenKind::Eof => "end of input".to_string(),
            _ => format!("'{}'", self.current.lexeme),
        };
        self.error_at_current(format!("expected {}, found {}", expected, found));
    }

    /// Reports a syntax error at the current token and enters panic mode.
    /// Nothing is reported while already panicking or when the current token is a lexical error
    /// (the lexer already reported it).
    fn error_at_current(&mut self, message: impl ToString) {
        if self.panic_mode {
            return;
        }
        self.panic_mode = true;
        if self.current.kind == TokenKind::Error {
            return;
        }
        self.source.report(Diagnostic::error(
            Phase::Syntax,
            message,
            self.current.span,
        ));
    }

    /// Reports a syntax error that does not need recovery.
    fn error_at(&mut self, message: impl ToString, span: Span) {
        if self.panic_mode {
            return;
        }
        self.source
            .report(Diagnostic::error(Phase::Syntax, message, span));
    }

    /// Span from `start` to the end of the last consumed token.
    fn span_from(&self, start: Span) -> Span {
        Span::new(start.start, self.previous.span.end.max(start.end))
    }

    /// Skips tokens until a statement boundary: just after a `;`, or before a token that starts
    /// a declaration, a block boundary, or end of input.
    fn synchronize(&mut self) {
        self.panic_mode = false;

        while !self.check(TokenKind::Eof) {
            if self.previous.kind == TokenKind::Semi {
                return;
            }
            match self.current.kind {
                TokenKind::Fn
                | TokenKind::Let
                | TokenKind::If
                | TokenKind::While
                | TokenKind::Return
                | TokenKind::OpenBrace
                | TokenKind::CloseBrace => return,
                _ => {}
            }
            self.next();
        }
    }

    /// Runs `parse` and replaces its result with an error marker if it needed recovery.
    fn recovering(&mut self, parse: impl FnOnce(&mut Self) -> Stmt) -> Stmt {
        let start = self.current.span;
        let stmt = parse(self);
        if !self.panic_mode {
            return stmt;
        }

        self.synchronize();
        if self.current.span == start && !self.check(TokenKind::Eof) {
            // no progress was made, skip the offending token
            self.next();
        }
        Stmt {
            kind: StmtKind::Error,
            span: self.span_from(start),
        }
    }
}
