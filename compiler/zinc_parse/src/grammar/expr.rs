//! Expression parsing: precedence climbing, prefix, suffix, primary.
//!
//! Precedence, loosest to tightest: assignment, error-unwrap (`%%`/`??`),
//! boolean `or`, boolean `and`, comparison, `|`, `^`, `&`, shifts,
//! additive, multiplicative, prefix, suffix (call/index/slice/field/
//! container-init), primary.
//!
//! Type positions parse at prefix level via [`Parser::parse_prefix_expr`],
//! which also disables the `{` container-init suffix so a following block
//! (function body, loop body) is not swallowed.

use zinc_ir::ast::{BinOp, NodeId, NodeKind, NumLit, PrefixOp, ReturnKind};
use zinc_ir::TokenKind;

use crate::{ParseError, Parser};

impl Parser<'_> {
    /// Full expression, assignment level.
    pub(crate) fn parse_expr(&mut self) -> Result<NodeId, ParseError> {
        let lhs = self.parse_unwrap_expr()?;
        let op = match self.cursor.kind() {
            TokenKind::Eq => BinOp::Assign,
            TokenKind::PlusEq => BinOp::AssignPlus,
            TokenKind::PlusPercentEq => BinOp::AssignPlusWrap,
            TokenKind::MinusEq => BinOp::AssignMinus,
            TokenKind::MinusPercentEq => BinOp::AssignMinusWrap,
            TokenKind::StarEq => BinOp::AssignTimes,
            TokenKind::StarPercentEq => BinOp::AssignTimesWrap,
            TokenKind::SlashEq => BinOp::AssignDiv,
            TokenKind::PercentEq => BinOp::AssignMod,
            TokenKind::AmpersandEq => BinOp::AssignBitAnd,
            TokenKind::PipeEq => BinOp::AssignBitOr,
            TokenKind::CaretEq => BinOp::AssignBitXor,
            TokenKind::ShiftLeftEq => BinOp::AssignBitShiftLeft,
            TokenKind::ShiftLeftPercentEq => BinOp::AssignBitShiftLeftWrap,
            TokenKind::ShiftRightEq => BinOp::AssignBitShiftRight,
            _ => return Ok(lhs),
        };
        self.cursor.bump();
        let rhs = self.parse_expr()?;
        let span = self.arena.span(lhs).to(self.arena.span(rhs));
        Ok(self.arena.alloc(NodeKind::BinOp { op, lhs, rhs }, span))
    }

    /// `a %% b`, `a %% |err| b`, `a ?? b`.
    fn parse_unwrap_expr(&mut self) -> Result<NodeId, ParseError> {
        let mut lhs = self.parse_bool_or_expr()?;
        loop {
            match self.cursor.kind() {
                TokenKind::PercentPercent => {
                    self.cursor.bump();
                    let err_name = if self.cursor.eat(TokenKind::Pipe) {
                        let (name, _) = self.cursor.expect_ident()?;
                        self.cursor.expect(TokenKind::Pipe)?;
                        Some(name)
                    } else {
                        None
                    };
                    let rhs = self.parse_bool_or_expr()?;
                    let span = self.arena.span(lhs).to(self.arena.span(rhs));
                    lhs = self.arena.alloc(
                        NodeKind::UnwrapError {
                            op1: lhs,
                            err_name,
                            op2: rhs,
                        },
                        span,
                    );
                }
                TokenKind::DoubleQuestion => {
                    self.cursor.bump();
                    let rhs = self.parse_bool_or_expr()?;
                    let span = self.arena.span(lhs).to(self.arena.span(rhs));
                    lhs = self.arena.alloc(
                        NodeKind::BinOp {
                            op: BinOp::UnwrapMaybe,
                            lhs,
                            rhs,
                        },
                        span,
                    );
                }
                _ => return Ok(lhs),
            }
        }
    }

    fn parse_bool_or_expr(&mut self) -> Result<NodeId, ParseError> {
        self.parse_left_assoc(Self::parse_bool_and_expr, |kind| match kind {
            TokenKind::KwOr => Some(BinOp::BoolOr),
            _ => None,
        })
    }

    fn parse_bool_and_expr(&mut self) -> Result<NodeId, ParseError> {
        self.parse_left_assoc(Self::parse_comparison_expr, |kind| match kind {
            TokenKind::KwAnd => Some(BinOp::BoolAnd),
            _ => None,
        })
    }

    fn parse_comparison_expr(&mut self) -> Result<NodeId, ParseError> {
        self.parse_left_assoc(Self::parse_bit_or_expr, |kind| match kind {
            TokenKind::EqEq => Some(BinOp::CmpEq),
            TokenKind::BangEq => Some(BinOp::CmpNotEq),
            TokenKind::Less => Some(BinOp::CmpLessThan),
            TokenKind::Greater => Some(BinOp::CmpGreaterThan),
            TokenKind::LessEq => Some(BinOp::CmpLessOrEq),
            TokenKind::GreaterEq => Some(BinOp::CmpGreaterOrEq),
            _ => None,
        })
    }

    fn parse_bit_or_expr(&mut self) -> Result<NodeId, ParseError> {
        self.parse_left_assoc(Self::parse_bit_xor_expr, |kind| match kind {
            TokenKind::Pipe => Some(BinOp::BinOr),
            _ => None,
        })
    }

    fn parse_bit_xor_expr(&mut self) -> Result<NodeId, ParseError> {
        self.parse_left_assoc(Self::parse_bit_and_expr, |kind| match kind {
            TokenKind::Caret => Some(BinOp::BinXor),
            _ => None,
        })
    }

    fn parse_bit_and_expr(&mut self) -> Result<NodeId, ParseError> {
        self.parse_left_assoc(Self::parse_shift_expr, |kind| match kind {
            TokenKind::Ampersand => Some(BinOp::BinAnd),
            _ => None,
        })
    }

    fn parse_shift_expr(&mut self) -> Result<NodeId, ParseError> {
        self.parse_left_assoc(Self::parse_additive_expr, |kind| match kind {
            TokenKind::ShiftLeft => Some(BinOp::BitShiftLeft),
            TokenKind::ShiftLeftPercent => Some(BinOp::BitShiftLeftWrap),
            TokenKind::ShiftRight => Some(BinOp::BitShiftRight),
            _ => None,
        })
    }

    fn parse_additive_expr(&mut self) -> Result<NodeId, ParseError> {
        self.parse_left_assoc(Self::parse_multiplicative_expr, |kind| match kind {
            TokenKind::Plus => Some(BinOp::Add),
            TokenKind::PlusPercent => Some(BinOp::AddWrap),
            TokenKind::PlusPlus => Some(BinOp::ArrayCat),
            TokenKind::Minus => Some(BinOp::Sub),
            TokenKind::MinusPercent => Some(BinOp::SubWrap),
            _ => None,
        })
    }

    fn parse_multiplicative_expr(&mut self) -> Result<NodeId, ParseError> {
        self.parse_left_assoc(
            |parser| parser.parse_prefix(true),
            |kind| match kind {
                TokenKind::Star => Some(BinOp::Mult),
                TokenKind::StarPercent => Some(BinOp::MultWrap),
                TokenKind::StarStar => Some(BinOp::ArrayMult),
                TokenKind::Slash => Some(BinOp::Div),
                TokenKind::Percent => Some(BinOp::Mod),
                _ => None,
            },
        )
    }

    fn parse_left_assoc(
        &mut self,
        mut next: impl FnMut(&mut Self) -> Result<NodeId, ParseError>,
        match_op: impl Fn(TokenKind) -> Option<BinOp>,
    ) -> Result<NodeId, ParseError> {
        let mut lhs = next(self)?;
        while let Some(op) = match_op(self.cursor.kind()) {
            self.cursor.bump();
            let rhs = next(self)?;
            let span = self.arena.span(lhs).to(self.arena.span(rhs));
            lhs = self.arena.alloc(NodeKind::BinOp { op, lhs, rhs }, span);
        }
        Ok(lhs)
    }

    /// Type-position entry point: prefix level, container-init disabled.
    pub(crate) fn parse_prefix_expr(&mut self) -> Result<NodeId, ParseError> {
        self.parse_prefix(false)
    }

    fn parse_prefix(&mut self, allow_init: bool) -> Result<NodeId, ParseError> {
        let start = self.cursor.span();
        let op = match self.cursor.kind() {
            TokenKind::Bang => PrefixOp::BoolNot,
            TokenKind::Tilde => PrefixOp::BinNot,
            TokenKind::Minus => PrefixOp::Negation,
            TokenKind::MinusPercent => PrefixOp::NegationWrap,
            TokenKind::Star => PrefixOp::Dereference,
            TokenKind::Ampersand => {
                self.cursor.bump();
                let is_const = self.cursor.eat(TokenKind::KwConst);
                let is_volatile = self.cursor.eat(TokenKind::KwVolatile);
                let op = match (is_const, is_volatile) {
                    (false, false) => PrefixOp::AddressOf,
                    (true, false) => PrefixOp::ConstAddressOf,
                    (false, true) => PrefixOp::VolatileAddressOf,
                    (true, true) => PrefixOp::ConstVolatileAddressOf,
                };
                let operand = self.parse_prefix(allow_init)?;
                let span = start.to(self.arena.span(operand));
                return Ok(self.arena.alloc(NodeKind::PrefixOp { op, operand }, span));
            }
            TokenKind::Question => {
                // `?return` propagates null; plain `?` builds a nullable type.
                if self.cursor.peek(1) == TokenKind::KwReturn {
                    self.cursor.bump();
                    return self.parse_return(ReturnKind::Maybe, start);
                }
                PrefixOp::Maybe
            }
            TokenKind::DoubleQuestion => PrefixOp::UnwrapMaybe,
            TokenKind::Percent => {
                if self.cursor.peek(1) == TokenKind::KwReturn {
                    self.cursor.bump();
                    return self.parse_return(ReturnKind::Error, start);
                }
                PrefixOp::Error
            }
            TokenKind::PercentPercent => PrefixOp::UnwrapError,
            _ => return self.parse_suffix(allow_init),
        };
        self.cursor.bump();
        let operand = self.parse_prefix(allow_init)?;
        let span = start.to(self.arena.span(operand));
        Ok(self.arena.alloc(NodeKind::PrefixOp { op, operand }, span))
    }

    fn parse_suffix(&mut self, allow_init: bool) -> Result<NodeId, ParseError> {
        let mut expr = self.parse_primary(allow_init)?;
        loop {
            match self.cursor.kind() {
                TokenKind::LParen => {
                    self.cursor.bump();
                    let mut args = Vec::new();
                    while !self.cursor.check(TokenKind::RParen) {
                        args.push(self.parse_expr()?);
                        if !self.cursor.eat(TokenKind::Comma) {
                            break;
                        }
                    }
                    self.cursor.expect(TokenKind::RParen)?;
                    let span = self.arena.span(expr).to(self.cursor.previous_span());
                    let args = self.arena.alloc_list(args);
                    expr = self.arena.alloc(
                        NodeKind::Call {
                            callee: expr,
                            args,
                            is_builtin: false,
                        },
                        span,
                    );
                }
                TokenKind::LBracket => {
                    self.cursor.bump();
                    let index_start = self.parse_expr()?;
                    if self.cursor.eat(TokenKind::Ellipsis) {
                        let end = if self.cursor.check(TokenKind::RBracket) {
                            None
                        } else {
                            Some(self.parse_expr()?)
                        };
                        self.cursor.expect(TokenKind::RBracket)?;
                        let is_const = self.cursor.eat(TokenKind::KwConst);
                        let span = self.arena.span(expr).to(self.cursor.previous_span());
                        expr = self.arena.alloc(
                            NodeKind::Slice {
                                array: expr,
                                start: index_start,
                                end,
                                is_const,
                            },
                            span,
                        );
                    } else {
                        self.cursor.expect(TokenKind::RBracket)?;
                        let span = self.arena.span(expr).to(self.cursor.previous_span());
                        expr = self.arena.alloc(
                            NodeKind::ArrayAccess {
                                array: expr,
                                index: index_start,
                            },
                            span,
                        );
                    }
                }
                TokenKind::Dot => {
                    self.cursor.bump();
                    let (field, field_span) = self.cursor.expect_ident()?;
                    let span = self.arena.span(expr).to(field_span);
                    expr = self.arena.alloc(
                        NodeKind::FieldAccess {
                            operand: expr,
                            field,
                        },
                        span,
                    );
                }
                TokenKind::LBrace if allow_init => {
                    expr = self.parse_container_init(expr)?;
                }
                _ => return Ok(expr),
            }
        }
    }

    /// `T { a, b }` / `T { .x = a, .y = b }` / `T {}`.
    fn parse_container_init(&mut self, ty: NodeId) -> Result<NodeId, ParseError> {
        self.cursor.expect(TokenKind::LBrace)?;
        let mut entries = Vec::new();
        let mut is_field_init = false;
        while !self.cursor.check(TokenKind::RBrace) {
            if self.cursor.check(TokenKind::Dot) {
                is_field_init = true;
                let entry_start = self.cursor.span();
                self.cursor.bump();
                let (name, _) = self.cursor.expect_ident()?;
                self.cursor.expect(TokenKind::Eq)?;
                let value = self.parse_expr()?;
                let span = entry_start.to(self.arena.span(value));
                entries.push(
                    self.arena
                        .alloc(NodeKind::StructValueField { name, expr: value }, span),
                );
            } else {
                entries.push(self.parse_expr()?);
            }
            if !self.cursor.eat(TokenKind::Comma) {
                break;
            }
        }
        self.cursor.expect(TokenKind::RBrace)?;
        let span = self.arena.span(ty).to(self.cursor.previous_span());
        let entries = self.arena.alloc_list(entries);
        Ok(self.arena.alloc(
            NodeKind::ContainerInitExpr {
                ty,
                entries,
                is_field_init,
            },
            span,
        ))
    }

    pub(crate) fn parse_return(
        &mut self,
        kind: ReturnKind,
        start: zinc_ir::Span,
    ) -> Result<NodeId, ParseError> {
        self.cursor.expect(TokenKind::KwReturn)?;
        let expr = if matches!(
            self.cursor.kind(),
            TokenKind::Semicolon | TokenKind::RBrace | TokenKind::Comma | TokenKind::Eof
        ) {
            None
        } else {
            Some(self.parse_expr()?)
        };
        let span = start.to(self.cursor.previous_span());
        Ok(self.arena.alloc(NodeKind::Return { kind, expr }, span))
    }

    fn parse_primary(&mut self, allow_init: bool) -> Result<NodeId, ParseError> {
        let start = self.cursor.span();
        match self.cursor.kind() {
            TokenKind::IntLiteral(id) => {
                let lit = self.cursor.tokens().int_lit(id).clone();
                self.cursor.bump();
                Ok(self.arena.alloc(
                    NodeKind::NumberLiteral(NumLit::Int {
                        value: lit.value,
                        overflow: lit.overflow,
                    }),
                    start,
                ))
            }
            TokenKind::FloatLiteral(id) => {
                let value = self.cursor.tokens().float_lit(id);
                self.cursor.bump();
                Ok(self
                    .arena
                    .alloc(NodeKind::NumberLiteral(NumLit::Float(value)), start))
            }
            TokenKind::StringLiteral(id) => {
                let lit = self.cursor.tokens().str_lit(id).clone();
                self.cursor.bump();
                Ok(self.arena.alloc(
                    NodeKind::StringLiteral {
                        bytes: lit.bytes,
                        is_c: lit.is_c,
                    },
                    start,
                ))
            }
            TokenKind::CharLiteral(value) => {
                self.cursor.bump();
                Ok(self.arena.alloc(NodeKind::CharLiteral(value), start))
            }
            TokenKind::KwTrue => {
                self.cursor.bump();
                Ok(self.arena.alloc(NodeKind::BoolLiteral(true), start))
            }
            TokenKind::KwFalse => {
                self.cursor.bump();
                Ok(self.arena.alloc(NodeKind::BoolLiteral(false), start))
            }
            TokenKind::KwNull => {
                self.cursor.bump();
                Ok(self.arena.alloc(NodeKind::NullLiteral, start))
            }
            TokenKind::KwUndefined => {
                self.cursor.bump();
                Ok(self.arena.alloc(NodeKind::UndefinedLiteral, start))
            }
            TokenKind::KwThis => {
                self.cursor.bump();
                Ok(self.arena.alloc(NodeKind::ThisLiteral, start))
            }
            TokenKind::KwVar => {
                self.cursor.bump();
                Ok(self.arena.alloc(NodeKind::VarLiteral, start))
            }
            TokenKind::KwUnreachable => {
                self.cursor.bump();
                Ok(self.arena.alloc(NodeKind::Unreachable, start))
            }
            TokenKind::Ident(name) => {
                self.cursor.bump();
                Ok(self.arena.alloc(NodeKind::Symbol { name }, start))
            }
            TokenKind::AtSign => {
                self.cursor.bump();
                let (name, name_span) = self.cursor.expect_ident()?;
                let callee = self.arena.alloc(NodeKind::Symbol { name }, name_span);
                self.cursor.expect(TokenKind::LParen)?;
                let mut args = Vec::new();
                while !self.cursor.check(TokenKind::RParen) {
                    args.push(self.parse_expr()?);
                    if !self.cursor.eat(TokenKind::Comma) {
                        break;
                    }
                }
                self.cursor.expect(TokenKind::RParen)?;
                let span = start.to(self.cursor.previous_span());
                let args = self.arena.alloc_list(args);
                Ok(self.arena.alloc(
                    NodeKind::Call {
                        callee,
                        args,
                        is_builtin: true,
                    },
                    span,
                ))
            }
            TokenKind::LParen => {
                self.cursor.bump();
                let inner = self.parse_expr()?;
                self.cursor.expect(TokenKind::RParen)?;
                let span = start.to(self.cursor.previous_span());
                Ok(self.arena.alloc(NodeKind::Grouped { inner }, span))
            }
            TokenKind::LBrace => self.parse_block(),
            TokenKind::LBracket => {
                // `[N]T`, `[]T`, `[]const T`, `[]volatile T`.
                self.cursor.bump();
                let size = if self.cursor.check(TokenKind::RBracket) {
                    None
                } else {
                    Some(self.parse_expr()?)
                };
                self.cursor.expect(TokenKind::RBracket)?;
                let is_const = self.cursor.eat(TokenKind::KwConst);
                let is_volatile = self.cursor.eat(TokenKind::KwVolatile);
                let child = self.parse_prefix(false)?;
                let span = start.to(self.arena.span(child));
                Ok(self.arena.alloc(
                    NodeKind::ArrayType {
                        size,
                        is_const,
                        is_volatile,
                        child,
                    },
                    span,
                ))
            }
            TokenKind::KwStruct | TokenKind::KwEnum | TokenKind::KwUnion => {
                self.parse_container_decl()
            }
            TokenKind::KwExtern | TokenKind::KwPacked
                if matches!(
                    self.cursor.peek(1),
                    TokenKind::KwStruct | TokenKind::KwEnum | TokenKind::KwUnion
                ) =>
            {
                self.parse_container_decl()
            }
            TokenKind::KwExtern | TokenKind::KwFn | TokenKind::KwColdCc | TokenKind::KwNakedCc => {
                // Function type in expression position.
                let is_extern = self.cursor.eat(TokenKind::KwExtern);
                self.parse_fn_proto(zinc_ir::ast::VisibMod::Private, is_extern)
            }
            TokenKind::KwError => {
                self.cursor.bump();
                Ok(self.arena.alloc(NodeKind::ErrorType, start))
            }
            TokenKind::KwIf => self.parse_if(),
            TokenKind::KwWhile => self.parse_while(false),
            TokenKind::KwFor => self.parse_for(false),
            TokenKind::KwSwitch => self.parse_switch(),
            TokenKind::KwTry => self.parse_try(),
            TokenKind::KwComptime => {
                self.cursor.bump();
                let expr = self.parse_prefix(allow_init)?;
                let span = start.to(self.arena.span(expr));
                Ok(self.arena.alloc(NodeKind::Comptime { expr }, span))
            }
            TokenKind::KwInline => self.parse_inline_qualified(),
            TokenKind::KwGoto => {
                self.cursor.bump();
                let (name, _) = self.cursor.expect_ident()?;
                let span = start.to(self.cursor.previous_span());
                Ok(self.arena.alloc(
                    NodeKind::Goto {
                        name,
                        is_inline: false,
                    },
                    span,
                ))
            }
            TokenKind::KwBreak => {
                self.cursor.bump();
                Ok(self.arena.alloc(NodeKind::Break, start))
            }
            TokenKind::KwContinue => {
                self.cursor.bump();
                Ok(self.arena.alloc(NodeKind::Continue, start))
            }
            TokenKind::KwReturn => self.parse_return(ReturnKind::Unconditional, start),
            TokenKind::KwAsm => self.parse_asm(),
            _ => Err(self.cursor.unexpected("expression")),
        }
    }

    /// `inline` qualifying a loop or goto.
    fn parse_inline_qualified(&mut self) -> Result<NodeId, ParseError> {
        let start = self.cursor.span();
        self.cursor.expect(TokenKind::KwInline)?;
        match self.cursor.kind() {
            TokenKind::KwWhile => self.parse_while(true),
            TokenKind::KwFor => self.parse_for(true),
            TokenKind::KwGoto => {
                self.cursor.bump();
                let (name, _) = self.cursor.expect_ident()?;
                let span = start.to(self.cursor.previous_span());
                Ok(self.arena.alloc(
                    NodeKind::Goto {
                        name,
                        is_inline: true,
                    },
                    span,
                ))
            }
            _ => Err(self.cursor.unexpected("'while', 'for', or 'goto' after 'inline'")),
        }
    }
}
