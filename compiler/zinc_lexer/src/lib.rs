//! Lexer for zinc source.
//!
//! [`lex`] converts a source buffer into a [`TokenList`]: identifiers are
//! interned, literals are cooked into side tables (see [`cooker`]), and
//! every token carries a byte [`Span`]. An unknown byte is a hard error
//! that terminates compilation, matching the language's
//! no-guessing-on-garbage policy.
//!
//! [`cooker`]: crate::cooker

mod cooker;
mod raw_token;

use logos::Logos;

use raw_token::RawToken;
use zinc_ir::{Span, StringInterner, Token, TokenKind, TokenList};

/// A lexical error. Always fatal to the compilation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LexError {
    pub message: String,
    pub span: Span,
}

/// Lex a whole source file.
pub fn lex(source: &str, interner: &StringInterner) -> Result<TokenList, LexError> {
    let mut result = TokenList::new();
    let mut logos = RawToken::lexer(source);

    while let Some(token_result) = logos.next() {
        let range = logos.span();
        let span = Span::new(range.start as u32, range.end as u32);
        let slice = logos.slice();

        let raw = token_result.map_err(|()| LexError {
            message: format!("invalid character '{}'", slice.escape_debug()),
            span,
        })?;
        let kind = convert(raw, slice, span, interner, &mut result)?;
        result.push(Token::new(kind, span));
    }

    let eof = Span::point(source.len() as u32);
    result.push(Token::new(TokenKind::Eof, eof));
    Ok(result)
}

fn convert(
    raw: RawToken,
    slice: &str,
    span: Span,
    interner: &StringInterner,
    out: &mut TokenList,
) -> Result<TokenKind, LexError> {
    let kind = match raw {
        RawToken::Ident => TokenKind::Ident(interner.intern(slice)),
        RawToken::HexNumber => {
            if slice.contains('.') || slice.contains(['p', 'P']) {
                cooker::cook_hex_float(slice, span, out)?
            } else {
                cooker::cook_int(slice, 16, span, out)?
            }
        }
        RawToken::OctalNumber => cooker::cook_int(slice, 8, span, out)?,
        RawToken::BinaryNumber => cooker::cook_int(slice, 2, span, out)?,
        RawToken::DecimalNumber => {
            if slice.contains('.') || slice.contains(['e', 'E']) {
                cooker::cook_decimal_float(slice, span, out)?
            } else {
                cooker::cook_int(slice, 10, span, out)?
            }
        }
        RawToken::String => cooker::cook_string(slice, false, span, out)?,
        RawToken::CString => cooker::cook_string(slice, true, span, out)?,
        RawToken::Char => cooker::cook_char(slice, span)?,

        RawToken::KwAnd => TokenKind::KwAnd,
        RawToken::KwAsm => TokenKind::KwAsm,
        RawToken::KwBreak => TokenKind::KwBreak,
        RawToken::KwColdCc => TokenKind::KwColdCc,
        RawToken::KwComptime => TokenKind::KwComptime,
        RawToken::KwConst => TokenKind::KwConst,
        RawToken::KwContinue => TokenKind::KwContinue,
        RawToken::KwDefer => TokenKind::KwDefer,
        RawToken::KwElse => TokenKind::KwElse,
        RawToken::KwEnum => TokenKind::KwEnum,
        RawToken::KwError => TokenKind::KwError,
        RawToken::KwExport => TokenKind::KwExport,
        RawToken::KwExtern => TokenKind::KwExtern,
        RawToken::KwFalse => TokenKind::KwFalse,
        RawToken::KwFn => TokenKind::KwFn,
        RawToken::KwFor => TokenKind::KwFor,
        RawToken::KwGoto => TokenKind::KwGoto,
        RawToken::KwIf => TokenKind::KwIf,
        RawToken::KwInline => TokenKind::KwInline,
        RawToken::KwNakedCc => TokenKind::KwNakedCc,
        RawToken::KwNoAlias => TokenKind::KwNoAlias,
        RawToken::KwNull => TokenKind::KwNull,
        RawToken::KwOr => TokenKind::KwOr,
        RawToken::KwPacked => TokenKind::KwPacked,
        RawToken::KwPub => TokenKind::KwPub,
        RawToken::KwReturn => TokenKind::KwReturn,
        RawToken::KwStruct => TokenKind::KwStruct,
        RawToken::KwSwitch => TokenKind::KwSwitch,
        RawToken::KwTest => TokenKind::KwTest,
        RawToken::KwThis => TokenKind::KwThis,
        RawToken::KwTrue => TokenKind::KwTrue,
        RawToken::KwTry => TokenKind::KwTry,
        RawToken::KwUndefined => TokenKind::KwUndefined,
        RawToken::KwUnion => TokenKind::KwUnion,
        RawToken::KwUnreachable => TokenKind::KwUnreachable,
        RawToken::KwUse => TokenKind::KwUse,
        RawToken::KwVar => TokenKind::KwVar,
        RawToken::KwVolatile => TokenKind::KwVolatile,
        RawToken::KwWhile => TokenKind::KwWhile,

        RawToken::LParen => TokenKind::LParen,
        RawToken::RParen => TokenKind::RParen,
        RawToken::LBrace => TokenKind::LBrace,
        RawToken::RBrace => TokenKind::RBrace,
        RawToken::LBracket => TokenKind::LBracket,
        RawToken::RBracket => TokenKind::RBracket,
        RawToken::Comma => TokenKind::Comma,
        RawToken::Semicolon => TokenKind::Semicolon,
        RawToken::Colon => TokenKind::Colon,
        RawToken::Dot => TokenKind::Dot,
        RawToken::Ellipsis => TokenKind::Ellipsis,
        RawToken::Arrow => TokenKind::Arrow,
        RawToken::FatArrow => TokenKind::FatArrow,
        RawToken::AtSign => TokenKind::AtSign,

        RawToken::Bang => TokenKind::Bang,
        RawToken::Tilde => TokenKind::Tilde,
        RawToken::Eq => TokenKind::Eq,
        RawToken::EqEq => TokenKind::EqEq,
        RawToken::BangEq => TokenKind::BangEq,
        RawToken::Less => TokenKind::Less,
        RawToken::Greater => TokenKind::Greater,
        RawToken::LessEq => TokenKind::LessEq,
        RawToken::GreaterEq => TokenKind::GreaterEq,
        RawToken::Plus => TokenKind::Plus,
        RawToken::PlusPlus => TokenKind::PlusPlus,
        RawToken::PlusPercent => TokenKind::PlusPercent,
        RawToken::Minus => TokenKind::Minus,
        RawToken::MinusPercent => TokenKind::MinusPercent,
        RawToken::Star => TokenKind::Star,
        RawToken::StarStar => TokenKind::StarStar,
        RawToken::StarPercent => TokenKind::StarPercent,
        RawToken::Slash => TokenKind::Slash,
        RawToken::Percent => TokenKind::Percent,
        RawToken::PercentPercent => TokenKind::PercentPercent,
        RawToken::Ampersand => TokenKind::Ampersand,
        RawToken::Pipe => TokenKind::Pipe,
        RawToken::Caret => TokenKind::Caret,
        RawToken::ShiftLeft => TokenKind::ShiftLeft,
        RawToken::ShiftRight => TokenKind::ShiftRight,
        RawToken::ShiftLeftPercent => TokenKind::ShiftLeftPercent,
        RawToken::Question => TokenKind::Question,
        RawToken::DoubleQuestion => TokenKind::DoubleQuestion,
        RawToken::QuestionEq => TokenKind::QuestionEq,

        RawToken::PlusEq => TokenKind::PlusEq,
        RawToken::PlusPercentEq => TokenKind::PlusPercentEq,
        RawToken::MinusEq => TokenKind::MinusEq,
        RawToken::MinusPercentEq => TokenKind::MinusPercentEq,
        RawToken::StarEq => TokenKind::StarEq,
        RawToken::StarPercentEq => TokenKind::StarPercentEq,
        RawToken::SlashEq => TokenKind::SlashEq,
        RawToken::PercentEq => TokenKind::PercentEq,
        RawToken::AmpersandEq => TokenKind::AmpersandEq,
        RawToken::PipeEq => TokenKind::PipeEq,
        RawToken::CaretEq => TokenKind::CaretEq,
        RawToken::ShiftLeftEq => TokenKind::ShiftLeftEq,
        RawToken::ShiftLeftPercentEq => TokenKind::ShiftLeftPercentEq,
        RawToken::ShiftRightEq => TokenKind::ShiftRightEq,
    };
    Ok(kind)
}

#[cfg(test)]
mod tests {
    use super::*;
    use num_bigint::BigUint;

    fn lex_kinds(source: &str) -> Vec<TokenKind> {
        let interner = StringInterner::new();
        lex(source, &interner)
            .unwrap()
            .iter()
            .map(|t| t.kind)
            .collect()
    }

    #[test]
    fn basic_declaration() {
        let interner = StringInterner::new();
        let tokens = lex("const x = 42;", &interner).unwrap();
        assert!(matches!(tokens[0].kind, TokenKind::KwConst));
        assert!(matches!(tokens[1].kind, TokenKind::Ident(_)));
        assert!(matches!(tokens[2].kind, TokenKind::Eq));
        assert!(matches!(tokens[3].kind, TokenKind::IntLiteral(_)));
        assert!(matches!(tokens[4].kind, TokenKind::Semicolon));
        assert!(matches!(tokens[5].kind, TokenKind::Eof));
    }

    #[test]
    fn wrapping_operators() {
        let kinds = lex_kinds("a +% b -% c *% d <<% e");
        assert!(kinds.contains(&TokenKind::PlusPercent));
        assert!(kinds.contains(&TokenKind::MinusPercent));
        assert!(kinds.contains(&TokenKind::StarPercent));
        assert!(kinds.contains(&TokenKind::ShiftLeftPercent));
    }

    #[test]
    fn wrapping_assign_operators() {
        let kinds = lex_kinds("a +%= b; a <<%= c;");
        assert!(kinds.contains(&TokenKind::PlusPercentEq));
        assert!(kinds.contains(&TokenKind::ShiftLeftPercentEq));
    }

    #[test]
    fn maybe_assign_token() {
        let kinds = lex_kinds("if (const x ?= y) {}");
        assert!(kinds.contains(&TokenKind::QuestionEq));
    }

    #[test]
    fn number_bases() {
        let interner = StringInterner::new();
        let tokens = lex("0xFF 0o17 0b101 9", &interner).unwrap();
        let values: Vec<u32> = tokens
            .iter()
            .filter_map(|t| match t.kind {
                TokenKind::IntLiteral(id) => {
                    Some(u32::try_from(&tokens.int_lit(id).value).unwrap())
                }
                _ => None,
            })
            .collect();
        assert_eq!(values, [255, 15, 5, 9]);
    }

    #[test]
    fn big_literal_sets_overflow() {
        let interner = StringInterner::new();
        let tokens = lex("18446744073709551616", &interner).unwrap();
        let TokenKind::IntLiteral(id) = tokens[0].kind else {
            panic!("expected int literal");
        };
        assert!(tokens.int_lit(id).overflow);
        assert_eq!(
            tokens.int_lit(id).value,
            BigUint::from(2u8).pow(64)
        );
    }

    #[test]
    fn comments_are_skipped() {
        let kinds = lex_kinds("a // comment with const\nb");
        assert_eq!(kinds.len(), 3); // a, b, EOF
    }

    #[test]
    fn spans_track_bytes() {
        let interner = StringInterner::new();
        let tokens = lex("ab cd", &interner).unwrap();
        assert_eq!(tokens[0].span, Span::new(0, 2));
        assert_eq!(tokens[1].span, Span::new(3, 5));
    }

    #[test]
    fn unknown_byte_is_fatal() {
        let interner = StringInterner::new();
        let err = lex("const $ = 1;", &interner).unwrap_err();
        assert!(err.message.contains("invalid character"));
        assert_eq!(err.span.start, 6);
    }

    #[test]
    fn c_string_prefix() {
        let interner = StringInterner::new();
        let tokens = lex(r#"c"hello""#, &interner).unwrap();
        let TokenKind::StringLiteral(id) = tokens[0].kind else {
            panic!("expected string literal");
        };
        assert!(tokens.str_lit(id).is_c);
    }
}
