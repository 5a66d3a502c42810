//! Recursive-descent parser.
//!
//! Consumes a [`TokenList`] and produces a flat AST in a [`NodeArena`].
//! The parser performs no name resolution and introduces no types; it
//! records source shapes and literal payloads only, and assigns nodes
//! monotonically increasing creation indices (the arena's allocation
//! order) that later passes use for deterministic ordering.
//!
//! Grammar modules:
//! - [`grammar::items`] — top-level declarations and containers
//! - [`grammar::expr`] — precedence climbing and suffix operators
//! - [`grammar::control`] — blocks, control flow, defer, asm

mod cursor;
mod error;
mod grammar;

pub use error::ParseError;

use cursor::Cursor;
use zinc_ir::ast::{NodeArena, NodeId, NodeKind};
use zinc_ir::{StringInterner, TokenList};

/// Parsed file: the arena plus its root node.
#[derive(Debug)]
pub struct ParseOutput {
    pub arena: NodeArena,
    pub root: NodeId,
}

/// Parse a whole file.
pub fn parse(tokens: &TokenList, interner: &StringInterner) -> Result<ParseOutput, ParseError> {
    let mut parser = Parser {
        cursor: Cursor::new(tokens),
        arena: NodeArena::new(),
        interner,
    };
    let root = parser.parse_root()?;
    Ok(ParseOutput {
        arena: parser.arena,
        root,
    })
}

pub(crate) struct Parser<'a> {
    pub(crate) cursor: Cursor<'a>,
    pub(crate) arena: NodeArena,
    pub(crate) interner: &'a StringInterner,
}

impl Parser<'_> {
    fn parse_root(&mut self) -> Result<NodeId, ParseError> {
        let start = self.cursor.span();
        let mut decls = Vec::new();
        while !self.cursor.check(zinc_ir::TokenKind::Eof) {
            decls.push(self.parse_top_level_item()?);
        }
        let span = start.to(self.cursor.previous_span());
        let decls = self.arena.alloc_list(decls);
        Ok(self.arena.alloc(NodeKind::Root { decls }, span))
    }
}

#[cfg(test)]
mod tests;
