//! Token cursor.
//!
//! Low-level access to the token stream: current/lookahead inspection,
//! conditional consumption, and expectation with error production. The
//! cursor position is always valid; the stream ends with `Eof`.

use zinc_ir::{Name, Span, Token, TokenKind, TokenList};

use crate::ParseError;

pub(crate) struct Cursor<'a> {
    tokens: &'a TokenList,
    pos: usize,
}

impl<'a> Cursor<'a> {
    pub(crate) fn new(tokens: &'a TokenList) -> Cursor<'a> {
        debug_assert!(!tokens.is_empty(), "token stream must end with Eof");
        Cursor { tokens, pos: 0 }
    }

    pub(crate) fn tokens(&self) -> &'a TokenList {
        self.tokens
    }

    #[inline]
    pub(crate) fn current(&self) -> Token {
        self.tokens[self.pos]
    }

    #[inline]
    pub(crate) fn kind(&self) -> TokenKind {
        self.current().kind
    }

    #[inline]
    pub(crate) fn span(&self) -> Span {
        self.current().span
    }

    /// Kind of the token `n` ahead of the current one (saturating at Eof).
    pub(crate) fn peek(&self, n: usize) -> TokenKind {
        let idx = (self.pos + n).min(self.tokens.len() - 1);
        self.tokens[idx].kind
    }

    pub(crate) fn previous_span(&self) -> Span {
        if self.pos > 0 {
            self.tokens[self.pos - 1].span
        } else {
            Span::DUMMY
        }
    }

    #[inline]
    pub(crate) fn check(&self, kind: TokenKind) -> bool {
        self.kind() == kind
    }

    pub(crate) fn bump(&mut self) -> Token {
        let token = self.current();
        if !matches!(token.kind, TokenKind::Eof) {
            self.pos += 1;
        }
        token
    }

    /// Consume the current token if it matches.
    pub(crate) fn eat(&mut self, kind: TokenKind) -> bool {
        if self.check(kind) {
            self.bump();
            true
        } else {
            false
        }
    }

    /// Consume a token of the given kind or fail, naming the found token.
    pub(crate) fn expect(&mut self, kind: TokenKind) -> Result<Token, ParseError> {
        if self.check(kind) {
            Ok(self.bump())
        } else {
            Err(self.unexpected(kind.describe()))
        }
    }

    /// Consume an identifier, returning its interned name.
    pub(crate) fn expect_ident(&mut self) -> Result<(Name, Span), ParseError> {
        match self.kind() {
            TokenKind::Ident(name) => {
                let span = self.span();
                self.bump();
                Ok((name, span))
            }
            _ => Err(self.unexpected("identifier")),
        }
    }

    /// Error describing the current token against an expectation.
    pub(crate) fn unexpected(&self, expected: &str) -> ParseError {
        ParseError::new(
            self.span(),
            format!(
                "expected {expected}, found '{}'",
                self.kind().describe()
            ),
        )
    }
}
