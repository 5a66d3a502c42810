//! Top-level declarations and container bodies.
//!
//! `Root` is a sequence of items:
//!
//! ```text
//! Item = use Expr ;
//!      | error IDENT ;
//!      | test STRING Block
//!      | comptime Block
//!      | [pub|export] (extern)? fn Proto (; | Block)
//!      | [pub|export] (extern)? (const|var) IDENT (: Type)? (= Expr)? ;
//! ```
//!
//! Containers (`struct`/`enum`/`union`) are expressions and are parsed in
//! `expr::parse_primary`; their members re-enter here for nested
//! declarations.

use zinc_ir::ast::{
    CallingConv, ContainerDecl, ContainerKind, ContainerLayout, FnProto, NodeId, NodeKind,
    VarDecl, VisibMod,
};
use zinc_ir::TokenKind;

use crate::{ParseError, Parser};

impl Parser<'_> {
    pub(crate) fn parse_top_level_item(&mut self) -> Result<NodeId, ParseError> {
        let start = self.cursor.span();
        match self.cursor.kind() {
            TokenKind::KwUse => {
                self.cursor.bump();
                let expr = self.parse_expr()?;
                self.cursor.expect(TokenKind::Semicolon)?;
                let span = start.to(self.cursor.previous_span());
                Ok(self.arena.alloc(
                    NodeKind::Use {
                        expr,
                        visib: VisibMod::Private,
                    },
                    span,
                ))
            }
            TokenKind::KwError => {
                self.cursor.bump();
                let (name, _) = self.cursor.expect_ident()?;
                self.cursor.expect(TokenKind::Semicolon)?;
                let span = start.to(self.cursor.previous_span());
                Ok(self.arena.alloc(
                    NodeKind::ErrorValueDecl {
                        name,
                        visib: VisibMod::Private,
                    },
                    span,
                ))
            }
            TokenKind::KwTest => {
                self.cursor.bump();
                let name = match self.cursor.kind() {
                    TokenKind::StringLiteral(id) => {
                        let bytes = &self.cursor.tokens().str_lit(id).bytes;
                        let text = String::from_utf8_lossy(bytes).into_owned();
                        self.cursor.bump();
                        self.interner.intern(&text)
                    }
                    _ => return Err(self.cursor.unexpected("test name string")),
                };
                let body = self.parse_block()?;
                let span = start.to(self.cursor.previous_span());
                Ok(self.arena.alloc(NodeKind::TestDecl { name, body }, span))
            }
            TokenKind::KwComptime => {
                self.cursor.bump();
                let expr = self.parse_block()?;
                let span = start.to(self.cursor.previous_span());
                Ok(self.arena.alloc(NodeKind::Comptime { expr }, span))
            }
            _ => self.parse_visible_item(),
        }
    }

    /// Item that may carry a `pub`/`export` prefix.
    fn parse_visible_item(&mut self) -> Result<NodeId, ParseError> {
        let start = self.cursor.span();
        let visib = if self.cursor.eat(TokenKind::KwPub) {
            VisibMod::Pub
        } else if self.cursor.eat(TokenKind::KwExport) {
            VisibMod::Export
        } else {
            VisibMod::Private
        };

        let is_extern = self.cursor.eat(TokenKind::KwExtern);

        match self.cursor.kind() {
            TokenKind::KwUse if !is_extern => {
                self.cursor.bump();
                let expr = self.parse_expr()?;
                self.cursor.expect(TokenKind::Semicolon)?;
                let span = start.to(self.cursor.previous_span());
                Ok(self.arena.alloc(NodeKind::Use { expr, visib }, span))
            }
            TokenKind::KwColdCc | TokenKind::KwNakedCc | TokenKind::KwInline | TokenKind::KwFn => {
                self.parse_fn_item(start, visib, is_extern)
            }
            TokenKind::KwConst | TokenKind::KwVar => {
                let node = self.parse_var_decl(visib, is_extern)?;
                Ok(node)
            }
            _ => Err(self.cursor.unexpected("declaration")),
        }
    }

    fn parse_fn_item(
        &mut self,
        start: zinc_ir::Span,
        visib: VisibMod,
        is_extern: bool,
    ) -> Result<NodeId, ParseError> {
        let proto = self.parse_fn_proto(visib, is_extern)?;
        if self.cursor.eat(TokenKind::Semicolon) {
            let span = start.to(self.cursor.previous_span());
            Ok(self.arena.alloc(NodeKind::FnDecl { proto }, span))
        } else {
            let body = self.parse_block()?;
            let span = start.to(self.cursor.previous_span());
            Ok(self.arena.alloc(NodeKind::FnDef { proto, body }, span))
        }
    }

    /// `(coldcc|nakedcc|inline)? fn name? ( params ) (-> Type)?`
    pub(crate) fn parse_fn_proto(
        &mut self,
        visib: VisibMod,
        is_extern: bool,
    ) -> Result<NodeId, ParseError> {
        let start = self.cursor.span();
        let cc = if self.cursor.eat(TokenKind::KwColdCc) {
            CallingConv::Cold
        } else if self.cursor.eat(TokenKind::KwNakedCc) {
            CallingConv::Naked
        } else if is_extern {
            CallingConv::C
        } else {
            CallingConv::Unspecified
        };
        let is_inline = self.cursor.eat(TokenKind::KwInline);
        self.cursor.expect(TokenKind::KwFn)?;

        // Anonymous prototypes occur in type position.
        let name = match self.cursor.kind() {
            TokenKind::Ident(ident) => {
                self.cursor.bump();
                ident
            }
            _ => zinc_ir::Name::EMPTY,
        };

        self.cursor.expect(TokenKind::LParen)?;
        let mut params = Vec::new();
        let mut is_var_args = false;
        while !self.cursor.check(TokenKind::RParen) {
            if self.cursor.eat(TokenKind::Ellipsis) {
                is_var_args = true;
                break;
            }
            params.push(self.parse_param_decl()?);
            if !self.cursor.eat(TokenKind::Comma) {
                break;
            }
        }
        self.cursor.expect(TokenKind::RParen)?;

        let return_ty = if self.cursor.eat(TokenKind::Arrow) {
            Some(self.parse_prefix_expr()?)
        } else {
            None
        };

        let span = start.to(self.cursor.previous_span());
        let params = self.arena.alloc_list(params);
        Ok(self.arena.alloc(
            NodeKind::FnProto(Box::new(FnProto {
                name,
                visib,
                params,
                return_ty,
                cc,
                is_extern,
                is_var_args,
                is_inline,
            })),
            span,
        ))
    }

    /// `noalias? comptime? name: Type`
    fn parse_param_decl(&mut self) -> Result<NodeId, ParseError> {
        let start = self.cursor.span();
        let is_noalias = self.cursor.eat(TokenKind::KwNoAlias);
        let is_comptime = self.cursor.eat(TokenKind::KwComptime);
        let (name, _) = self.cursor.expect_ident()?;
        self.cursor.expect(TokenKind::Colon)?;
        let ty = self.parse_prefix_expr()?;
        let span = start.to(self.cursor.previous_span());
        Ok(self.arena.alloc(
            NodeKind::ParamDecl {
                name,
                ty,
                is_noalias,
                is_comptime,
            },
            span,
        ))
    }

    /// `(const|var) name (: Type)? (= Expr)? ;`
    pub(crate) fn parse_var_decl(
        &mut self,
        visib: VisibMod,
        is_extern: bool,
    ) -> Result<NodeId, ParseError> {
        let start = self.cursor.span();
        let is_comptime = false;
        let is_const = match self.cursor.kind() {
            TokenKind::KwConst => true,
            TokenKind::KwVar => false,
            _ => return Err(self.cursor.unexpected("'const' or 'var'")),
        };
        self.cursor.bump();
        let (name, _) = self.cursor.expect_ident()?;

        let ty = if self.cursor.eat(TokenKind::Colon) {
            Some(self.parse_prefix_expr()?)
        } else {
            None
        };
        let init = if self.cursor.eat(TokenKind::Eq) {
            Some(self.parse_expr()?)
        } else {
            None
        };
        self.cursor.expect(TokenKind::Semicolon)?;

        let span = start.to(self.cursor.previous_span());
        Ok(self.arena.alloc(
            NodeKind::VarDecl(Box::new(VarDecl {
                name,
                visib,
                is_const,
                is_comptime,
                is_extern,
                is_export: visib == VisibMod::Export,
                ty,
                init,
            })),
            span,
        ))
    }

    /// `(extern|packed)? (struct|enum|union) { members }`
    ///
    /// The keyword has already been checked, not consumed.
    pub(crate) fn parse_container_decl(&mut self) -> Result<NodeId, ParseError> {
        let start = self.cursor.span();
        let layout = if self.cursor.eat(TokenKind::KwExtern) {
            ContainerLayout::Extern
        } else if self.cursor.eat(TokenKind::KwPacked) {
            ContainerLayout::Packed
        } else {
            ContainerLayout::Auto
        };
        let kind = match self.cursor.kind() {
            TokenKind::KwStruct => ContainerKind::Struct,
            TokenKind::KwEnum => ContainerKind::Enum,
            TokenKind::KwUnion => ContainerKind::Union,
            _ => return Err(self.cursor.unexpected("'struct', 'enum', or 'union'")),
        };
        self.cursor.bump();
        self.cursor.expect(TokenKind::LBrace)?;

        let mut fields = Vec::new();
        let mut decls = Vec::new();
        while !self.cursor.check(TokenKind::RBrace) {
            // A field is `name : type` or (for enums) a bare `name`; both
            // start with IDENT followed by `:` or `,` or `}`.
            if let TokenKind::Ident(name) = self.cursor.kind() {
                let next = self.cursor.peek(1);
                if matches!(
                    next,
                    TokenKind::Colon | TokenKind::Comma | TokenKind::RBrace
                ) {
                    let field_start = self.cursor.span();
                    self.cursor.bump();
                    let ty = if self.cursor.eat(TokenKind::Colon) {
                        Some(self.parse_prefix_expr()?)
                    } else {
                        None
                    };
                    let span = field_start.to(self.cursor.previous_span());
                    fields.push(self.arena.alloc(NodeKind::StructField { name, ty }, span));
                    if !self.cursor.eat(TokenKind::Comma) {
                        break;
                    }
                    continue;
                }
            }
            decls.push(self.parse_top_level_item()?);
        }
        self.cursor.expect(TokenKind::RBrace)?;

        let span = start.to(self.cursor.previous_span());
        let fields = self.arena.alloc_list(fields);
        let decls = self.arena.alloc_list(decls);
        Ok(self.arena.alloc(
            NodeKind::ContainerDecl(Box::new(ContainerDecl {
                kind,
                layout,
                fields,
                decls,
            })),
            span,
        ))
    }
}
