//! Blocks, statements, control flow, defer, and asm expressions.

use zinc_ir::ast::{
    AsmExpr, AsmInput, AsmOutput, AsmTemplatePiece, DeferKind, IfVarExpr, NodeId, NodeKind,
    TryExpr, VarDecl, VisibMod,
};
use zinc_ir::TokenKind;

use crate::{ParseError, Parser};

impl Parser<'_> {
    /// `{ stmt* }`. Statements are expressions plus local declarations,
    /// defers, and labels.
    pub(crate) fn parse_block(&mut self) -> Result<NodeId, ParseError> {
        let start = self.cursor.span();
        self.cursor.expect(TokenKind::LBrace)?;
        let mut stmts = Vec::new();
        while !self.cursor.check(TokenKind::RBrace) {
            stmts.push(self.parse_statement()?);
        }
        self.cursor.expect(TokenKind::RBrace)?;
        let span = start.to(self.cursor.previous_span());
        let stmts = self.arena.alloc_list(stmts);
        Ok(self.arena.alloc(NodeKind::Block { stmts }, span))
    }

    fn parse_statement(&mut self) -> Result<NodeId, ParseError> {
        let start = self.cursor.span();
        match self.cursor.kind() {
            TokenKind::KwConst | TokenKind::KwVar
                if matches!(self.cursor.peek(1), TokenKind::Ident(_)) =>
            {
                self.parse_var_decl(VisibMod::Private, false)
            }
            // `comptime const x = …;` / `comptime var x = …;`
            TokenKind::KwComptime
                if matches!(self.cursor.peek(1), TokenKind::KwConst | TokenKind::KwVar) =>
            {
                self.cursor.bump();
                let decl = self.parse_var_decl(VisibMod::Private, false)?;
                if let NodeKind::VarDecl(var_decl) = self.arena.kind(decl) {
                    let mut inner: VarDecl = (**var_decl).clone();
                    inner.is_comptime = true;
                    let span = self.arena.span(decl);
                    return Ok(self.arena.alloc(NodeKind::VarDecl(Box::new(inner)), span));
                }
                Ok(decl)
            }
            TokenKind::KwDefer => self.parse_defer(DeferKind::Unconditional, start),
            TokenKind::Percent if self.cursor.peek(1) == TokenKind::KwDefer => {
                self.cursor.bump();
                self.parse_defer(DeferKind::Error, start)
            }
            TokenKind::Question if self.cursor.peek(1) == TokenKind::KwDefer => {
                self.cursor.bump();
                self.parse_defer(DeferKind::Maybe, start)
            }
            // `name:` labels a point in the enclosing block.
            TokenKind::Ident(name) if self.cursor.peek(1) == TokenKind::Colon => {
                self.cursor.bump();
                self.cursor.bump();
                Ok(self.arena.alloc(NodeKind::Label { name }, start))
            }
            _ => {
                let expr = self.parse_expr()?;
                // Block-shaped expressions carry their own braces and need
                // no terminating semicolon.
                if !matches!(
                    self.arena.kind(expr),
                    NodeKind::Block { .. }
                        | NodeKind::IfBool { .. }
                        | NodeKind::IfVar(_)
                        | NodeKind::While { .. }
                        | NodeKind::For { .. }
                        | NodeKind::Switch { .. }
                        | NodeKind::Try(_)
                        | NodeKind::Comptime { .. }
                ) {
                    self.cursor.expect(TokenKind::Semicolon)?;
                } else {
                    self.cursor.eat(TokenKind::Semicolon);
                }
                Ok(expr)
            }
        }
    }

    fn parse_defer(
        &mut self,
        kind: DeferKind,
        start: zinc_ir::Span,
    ) -> Result<NodeId, ParseError> {
        self.cursor.expect(TokenKind::KwDefer)?;
        let expr = self.parse_expr()?;
        self.cursor.eat(TokenKind::Semicolon);
        let span = start.to(self.cursor.previous_span());
        Ok(self.arena.alloc(NodeKind::Defer { kind, expr }, span))
    }

    /// `if (cond) body else?` or `if (const *?x ?= expr) body else?`.
    pub(crate) fn parse_if(&mut self) -> Result<NodeId, ParseError> {
        let start = self.cursor.span();
        self.cursor.expect(TokenKind::KwIf)?;
        self.cursor.expect(TokenKind::LParen)?;

        if matches!(self.cursor.kind(), TokenKind::KwConst | TokenKind::KwVar) {
            let is_const = self.cursor.check(TokenKind::KwConst);
            self.cursor.bump();
            let is_ptr = self.cursor.eat(TokenKind::Star);
            let (name, _) = self.cursor.expect_ident()?;
            let ty = if self.cursor.eat(TokenKind::Colon) {
                Some(self.parse_prefix_expr()?)
            } else {
                None
            };
            self.cursor.expect(TokenKind::QuestionEq)?;
            let expr = self.parse_expr()?;
            self.cursor.expect(TokenKind::RParen)?;
            let then_body = self.parse_expr()?;
            let else_body = if self.cursor.eat(TokenKind::KwElse) {
                Some(self.parse_expr()?)
            } else {
                None
            };
            let span = start.to(self.cursor.previous_span());
            return Ok(self.arena.alloc(
                NodeKind::IfVar(Box::new(IfVarExpr {
                    name,
                    is_const,
                    is_ptr,
                    ty,
                    expr,
                    then_body,
                    else_body,
                })),
                span,
            ));
        }

        let cond = self.parse_expr()?;
        self.cursor.expect(TokenKind::RParen)?;
        let then_body = self.parse_expr()?;
        let else_body = if self.cursor.eat(TokenKind::KwElse) {
            Some(self.parse_expr()?)
        } else {
            None
        };
        let span = start.to(self.cursor.previous_span());
        Ok(self.arena.alloc(
            NodeKind::IfBool {
                cond,
                then_body,
                else_body,
            },
            span,
        ))
    }

    /// `while (cond) body` / `while (cond; continue_expr) body`.
    pub(crate) fn parse_while(&mut self, is_inline: bool) -> Result<NodeId, ParseError> {
        let start = self.cursor.span();
        self.cursor.expect(TokenKind::KwWhile)?;
        self.cursor.expect(TokenKind::LParen)?;
        let cond = self.parse_expr()?;
        let continue_expr = if self.cursor.eat(TokenKind::Semicolon) {
            Some(self.parse_expr()?)
        } else {
            None
        };
        self.cursor.expect(TokenKind::RParen)?;
        let body = self.parse_expr()?;
        let span = start.to(self.cursor.previous_span());
        Ok(self.arena.alloc(
            NodeKind::While {
                cond,
                continue_expr,
                body,
                is_inline,
            },
            span,
        ))
    }

    /// `for (array) |*?elem, index?| body`.
    pub(crate) fn parse_for(&mut self, is_inline: bool) -> Result<NodeId, ParseError> {
        let start = self.cursor.span();
        self.cursor.expect(TokenKind::KwFor)?;
        self.cursor.expect(TokenKind::LParen)?;
        let array = self.parse_expr()?;
        self.cursor.expect(TokenKind::RParen)?;

        let mut elem_name = None;
        let mut elem_is_ptr = false;
        let mut index_name = None;
        if self.cursor.eat(TokenKind::Pipe) {
            elem_is_ptr = self.cursor.eat(TokenKind::Star);
            let (name, _) = self.cursor.expect_ident()?;
            elem_name = Some(name);
            if self.cursor.eat(TokenKind::Comma) {
                let (index, _) = self.cursor.expect_ident()?;
                index_name = Some(index);
            }
            self.cursor.expect(TokenKind::Pipe)?;
        }

        let body = self.parse_expr()?;
        let span = start.to(self.cursor.previous_span());
        Ok(self.arena.alloc(
            NodeKind::For {
                array,
                elem_name,
                elem_is_ptr,
                index_name,
                body,
                is_inline,
            },
            span,
        ))
    }

    /// `switch (target) { items => |*?payload| expr, else => expr, }`
    pub(crate) fn parse_switch(&mut self) -> Result<NodeId, ParseError> {
        let start = self.cursor.span();
        self.cursor.expect(TokenKind::KwSwitch)?;
        self.cursor.expect(TokenKind::LParen)?;
        let target = self.parse_expr()?;
        self.cursor.expect(TokenKind::RParen)?;
        self.cursor.expect(TokenKind::LBrace)?;

        let mut prongs = Vec::new();
        while !self.cursor.check(TokenKind::RBrace) {
            let prong_start = self.cursor.span();
            let mut items = Vec::new();
            if !self.cursor.eat(TokenKind::KwElse) {
                loop {
                    let item = self.parse_expr()?;
                    if self.cursor.eat(TokenKind::Ellipsis) {
                        let end = self.parse_expr()?;
                        let span = self.arena.span(item).to(self.arena.span(end));
                        items.push(
                            self.arena
                                .alloc(NodeKind::SwitchRange { start: item, end }, span),
                        );
                    } else {
                        items.push(item);
                    }
                    if !self.cursor.eat(TokenKind::Comma) {
                        break;
                    }
                    if self.cursor.check(TokenKind::FatArrow) {
                        break;
                    }
                }
            }
            self.cursor.expect(TokenKind::FatArrow)?;

            let mut var_name = None;
            let mut var_is_ptr = false;
            if self.cursor.eat(TokenKind::Pipe) {
                var_is_ptr = self.cursor.eat(TokenKind::Star);
                let (name, _) = self.cursor.expect_ident()?;
                var_name = Some(name);
                self.cursor.expect(TokenKind::Pipe)?;
            }

            let expr = self.parse_expr()?;
            let span = prong_start.to(self.cursor.previous_span());
            let items = self.arena.alloc_list(items);
            prongs.push(self.arena.alloc(
                NodeKind::SwitchProng {
                    items,
                    var_name,
                    var_is_ptr,
                    expr,
                },
                span,
            ));
            if !self.cursor.eat(TokenKind::Comma) {
                break;
            }
        }
        self.cursor.expect(TokenKind::RBrace)?;
        let span = start.to(self.cursor.previous_span());
        let prongs = self.arena.alloc_list(prongs);
        Ok(self.arena.alloc(NodeKind::Switch { target, prongs }, span))
    }

    /// `try (const *?x = expr) body else |err| handler` — binding optional.
    pub(crate) fn parse_try(&mut self) -> Result<NodeId, ParseError> {
        let start = self.cursor.span();
        self.cursor.expect(TokenKind::KwTry)?;
        self.cursor.expect(TokenKind::LParen)?;

        let mut var_name = None;
        let mut var_is_const = true;
        let mut var_is_ptr = false;
        if matches!(self.cursor.kind(), TokenKind::KwConst | TokenKind::KwVar) {
            var_is_const = self.cursor.check(TokenKind::KwConst);
            self.cursor.bump();
            var_is_ptr = self.cursor.eat(TokenKind::Star);
            let (name, _) = self.cursor.expect_ident()?;
            var_name = Some(name);
            self.cursor.expect(TokenKind::Eq)?;
        }
        let target = self.parse_expr()?;
        self.cursor.expect(TokenKind::RParen)?;
        let then_body = self.parse_expr()?;

        let mut err_name = None;
        let mut else_body = None;
        if self.cursor.eat(TokenKind::KwElse) {
            if self.cursor.eat(TokenKind::Pipe) {
                let (name, _) = self.cursor.expect_ident()?;
                err_name = Some(name);
                self.cursor.expect(TokenKind::Pipe)?;
            }
            else_body = Some(self.parse_expr()?);
        }

        let span = start.to(self.cursor.previous_span());
        Ok(self.arena.alloc(
            NodeKind::Try(Box::new(TryExpr {
                var_name,
                var_is_const,
                var_is_ptr,
                target,
                then_body,
                err_name,
                else_body,
            })),
            span,
        ))
    }

    /// `asm volatile? ("template" : outputs : inputs : clobbers)`.
    pub(crate) fn parse_asm(&mut self) -> Result<NodeId, ParseError> {
        let start = self.cursor.span();
        self.cursor.expect(TokenKind::KwAsm)?;
        let is_volatile = self.cursor.eat(TokenKind::KwVolatile);
        self.cursor.expect(TokenKind::LParen)?;

        let template = self.expect_string_bytes()?;
        let parsed_template = parse_asm_template(&template, self, start)?;

        let mut outputs = Vec::new();
        let mut inputs = Vec::new();
        let mut clobbers = Vec::new();

        if self.cursor.eat(TokenKind::Colon) {
            // Outputs.
            while self.cursor.check(TokenKind::LBracket) {
                outputs.push(self.parse_asm_output()?);
                if !self.cursor.eat(TokenKind::Comma) {
                    break;
                }
            }
            if self.cursor.eat(TokenKind::Colon) {
                // Inputs.
                while self.cursor.check(TokenKind::LBracket) {
                    inputs.push(self.parse_asm_input()?);
                    if !self.cursor.eat(TokenKind::Comma) {
                        break;
                    }
                }
                if self.cursor.eat(TokenKind::Colon) {
                    // Clobbers.
                    while matches!(self.cursor.kind(), TokenKind::StringLiteral(_)) {
                        let bytes = self.expect_string_bytes()?;
                        let text = String::from_utf8_lossy(&bytes).into_owned();
                        clobbers.push(self.interner.intern(&text));
                        if !self.cursor.eat(TokenKind::Comma) {
                            break;
                        }
                    }
                }
            }
        }

        self.cursor.expect(TokenKind::RParen)?;
        let span = start.to(self.cursor.previous_span());
        Ok(self.arena.alloc(
            NodeKind::Asm(Box::new(AsmExpr {
                is_volatile,
                template,
                parsed_template,
                outputs,
                inputs,
                clobbers,
            })),
            span,
        ))
    }

    /// `[name] "constraint" (variable)` or `[name] "constraint" -> Type`.
    fn parse_asm_output(&mut self) -> Result<AsmOutput, ParseError> {
        self.cursor.expect(TokenKind::LBracket)?;
        let (symbolic_name, _) = self.cursor.expect_ident()?;
        self.cursor.expect(TokenKind::RBracket)?;
        let constraint = self.expect_string_bytes()?;
        if self.cursor.eat(TokenKind::Arrow) {
            let ty = self.parse_prefix_expr()?;
            Ok(AsmOutput {
                symbolic_name,
                constraint,
                variable: None,
                return_ty: Some(ty),
            })
        } else {
            self.cursor.expect(TokenKind::LParen)?;
            let (variable, _) = self.cursor.expect_ident()?;
            self.cursor.expect(TokenKind::RParen)?;
            Ok(AsmOutput {
                symbolic_name,
                constraint,
                variable: Some(variable),
                return_ty: None,
            })
        }
    }

    /// `[name] "constraint" (expr)`.
    fn parse_asm_input(&mut self) -> Result<AsmInput, ParseError> {
        self.cursor.expect(TokenKind::LBracket)?;
        let (symbolic_name, _) = self.cursor.expect_ident()?;
        self.cursor.expect(TokenKind::RBracket)?;
        let constraint = self.expect_string_bytes()?;
        self.cursor.expect(TokenKind::LParen)?;
        let expr = self.parse_expr()?;
        self.cursor.expect(TokenKind::RParen)?;
        Ok(AsmInput {
            symbolic_name,
            constraint,
            expr,
        })
    }

    fn expect_string_bytes(&mut self) -> Result<Vec<u8>, ParseError> {
        match self.cursor.kind() {
            TokenKind::StringLiteral(id) => {
                let bytes = self.cursor.tokens().str_lit(id).bytes.clone();
                self.cursor.bump();
                Ok(bytes)
            }
            _ => Err(self.cursor.unexpected("string literal")),
        }
    }
}

/// Scan `%…` substitutions in an asm template.
///
/// `%[name]` references an operand by symbolic name; `%%` is a literal
/// percent. Anything else after `%` is an error.
fn parse_asm_template(
    template: &[u8],
    parser: &Parser<'_>,
    span: zinc_ir::Span,
) -> Result<Vec<AsmTemplatePiece>, ParseError> {
    enum State {
        Literal,
        Percent,
        Operand(usize),
    }

    let mut pieces = Vec::new();
    let mut literal = Vec::new();
    let mut state = State::Literal;

    for (i, &byte) in template.iter().enumerate() {
        match state {
            State::Literal => {
                if byte == b'%' {
                    state = State::Percent;
                } else {
                    literal.push(byte);
                }
            }
            State::Percent => match byte {
                b'%' => {
                    if !literal.is_empty() {
                        pieces.push(AsmTemplatePiece::Literal(std::mem::take(&mut literal)));
                    }
                    pieces.push(AsmTemplatePiece::Percent);
                    state = State::Literal;
                }
                b'[' => {
                    if !literal.is_empty() {
                        pieces.push(AsmTemplatePiece::Literal(std::mem::take(&mut literal)));
                    }
                    state = State::Operand(i + 1);
                }
                _ => {
                    return Err(ParseError::new(
                        span,
                        "expected '%' or '[' after '%' in asm template",
                    ));
                }
            },
            State::Operand(name_start) => {
                if byte == b']' {
                    let name_bytes = &template[name_start..i];
                    let text = String::from_utf8_lossy(name_bytes).into_owned();
                    pieces.push(AsmTemplatePiece::Operand(parser.interner.intern(&text)));
                    state = State::Literal;
                }
            }
        }
    }

    match state {
        State::Literal => {
            if !literal.is_empty() {
                pieces.push(AsmTemplatePiece::Literal(literal));
            }
            Ok(pieces)
        }
        State::Percent => Err(ParseError::new(span, "asm template ends mid '%' escape")),
        State::Operand(_) => Err(ParseError::new(span, "unclosed '%[' in asm template")),
    }
}
