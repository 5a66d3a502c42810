//! Literal cooking: raw matched slices → decoded payloads.
//!
//! Numeric literals decode to an arbitrary-precision magnitude plus an
//! `overflow` flag (magnitude beyond `i64::MAX`); the analyzer uses the
//! flag to reject literals that cannot reach any runtime integer type.
//! String and char literals decode their escape sequences here, once, so
//! every later phase sees raw bytes.

use num_bigint::BigUint;
use num_traits::Num;

use zinc_ir::{Span, TokenKind, TokenList};

use crate::LexError;

/// `i64::MAX` as a big integer, the widest magnitude a literal may carry
/// before the overflow flag is set.
fn int_limit() -> BigUint {
    BigUint::from(i64::MAX as u64)
}

pub(crate) fn cook_int(
    slice: &str,
    radix: u32,
    span: Span,
    out: &mut TokenList,
) -> Result<TokenKind, LexError> {
    let digits = match radix {
        16 => &slice[2..],
        8 => &slice[2..],
        2 => &slice[2..],
        _ => slice,
    };
    let value = BigUint::from_str_radix(digits, radix).map_err(|_| LexError {
        message: format!("invalid integer literal '{slice}'"),
        span,
    })?;
    let overflow = value > int_limit();
    let id = out.push_int_lit(zinc_ir::IntLit { value, overflow });
    Ok(TokenKind::IntLiteral(id))
}

pub(crate) fn cook_decimal_float(
    slice: &str,
    span: Span,
    out: &mut TokenList,
) -> Result<TokenKind, LexError> {
    let value: f64 = slice.parse().map_err(|_| LexError {
        message: format!("invalid float literal '{slice}'"),
        span,
    })?;
    Ok(TokenKind::FloatLiteral(out.push_float_lit(value)))
}

/// Hex float: `0x` mantissa with optional fraction and a binary exponent.
pub(crate) fn cook_hex_float(
    slice: &str,
    span: Span,
    out: &mut TokenList,
) -> Result<TokenKind, LexError> {
    let body = &slice[2..];
    let (mantissa_str, exponent) = match body.find(['p', 'P']) {
        Some(idx) => {
            let exp: i32 = body[idx + 1..].parse().map_err(|_| LexError {
                message: format!("invalid float literal '{slice}'"),
                span,
            })?;
            (&body[..idx], exp)
        }
        None => (body, 0),
    };
    let (int_part, frac_part) = match mantissa_str.find('.') {
        Some(idx) => (&mantissa_str[..idx], &mantissa_str[idx + 1..]),
        None => (mantissa_str, ""),
    };

    let mut value = 0.0f64;
    for digit in int_part.chars() {
        value = value * 16.0 + digit.to_digit(16).unwrap() as f64;
    }
    let mut scale = 1.0 / 16.0;
    for digit in frac_part.chars() {
        value += digit.to_digit(16).unwrap() as f64 * scale;
        scale /= 16.0;
    }
    Ok(TokenKind::FloatLiteral(
        out.push_float_lit(value * 2.0f64.powi(exponent)),
    ))
}

/// Decode the escape sequences of a quoted literal body.
///
/// Supported: `\n \r \t \\ \' \" \0`, hex `\xNN`, and octal `\NNN`
/// (one to three octal digits).
fn cook_escapes(body: &str, span: Span) -> Result<Vec<u8>, LexError> {
    let bytes = body.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] != b'\\' {
            out.push(bytes[i]);
            i += 1;
            continue;
        }
        i += 1;
        let Some(&esc) = bytes.get(i) else {
            return Err(LexError {
                message: "unterminated escape sequence".into(),
                span,
            });
        };
        i += 1;
        match esc {
            b'n' => out.push(b'\n'),
            b'r' => out.push(b'\r'),
            b't' => out.push(b'\t'),
            b'\\' => out.push(b'\\'),
            b'\'' => out.push(b'\''),
            b'"' => out.push(b'"'),
            b'0' if !matches!(bytes.get(i), Some(b'0'..=b'7')) => out.push(0),
            b'x' => {
                let hex = body.get(i..i + 2).ok_or_else(|| LexError {
                    message: "hex escape needs two digits".into(),
                    span,
                })?;
                let value = u8::from_str_radix(hex, 16).map_err(|_| LexError {
                    message: format!("invalid hex escape '\\x{hex}'"),
                    span,
                })?;
                out.push(value);
                i += 2;
            }
            b'0'..=b'7' => {
                // Octal escape: up to three digits, first already consumed.
                let mut value = (esc - b'0') as u32;
                let mut taken = 1;
                while taken < 3 && matches!(bytes.get(i), Some(b'0'..=b'7')) {
                    value = value * 8 + (bytes[i] - b'0') as u32;
                    i += 1;
                    taken += 1;
                }
                if value > 255 {
                    return Err(LexError {
                        message: format!("octal escape \\{value:o} out of range"),
                        span,
                    });
                }
                out.push(value as u8);
            }
            other => {
                return Err(LexError {
                    message: format!("invalid escape character '{}'", other as char),
                    span,
                });
            }
        }
    }
    Ok(out)
}

pub(crate) fn cook_string(
    slice: &str,
    is_c: bool,
    span: Span,
    out: &mut TokenList,
) -> Result<TokenKind, LexError> {
    // Strip the optional `c` prefix and both quotes.
    let body = if is_c {
        &slice[2..slice.len() - 1]
    } else {
        &slice[1..slice.len() - 1]
    };
    let bytes = cook_escapes(body, span)?;
    let id = out.push_str_lit(zinc_ir::StrLit { bytes, is_c });
    Ok(TokenKind::StringLiteral(id))
}

pub(crate) fn cook_char(slice: &str, span: Span) -> Result<TokenKind, LexError> {
    let body = &slice[1..slice.len() - 1];
    let bytes = cook_escapes(body, span)?;
    match bytes.as_slice() {
        [single] => Ok(TokenKind::CharLiteral(*single)),
        [] => Err(LexError {
            message: "empty character literal".into(),
            span,
        }),
        _ => Err(LexError {
            message: "character literal must encode a single byte".into(),
            span,
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cook_int_value(slice: &str, radix: u32) -> (BigUint, bool) {
        let mut list = TokenList::new();
        let kind = cook_int(slice, radix, Span::DUMMY, &mut list).unwrap();
        let TokenKind::IntLiteral(id) = kind else {
            panic!("expected int literal")
        };
        let lit = list.int_lit(id);
        (lit.value.clone(), lit.overflow)
    }

    #[test]
    fn decimal_int() {
        let (value, overflow) = cook_int_value("1234", 10);
        assert_eq!(value, BigUint::from(1234u32));
        assert!(!overflow);
    }

    #[test]
    fn hex_int() {
        let (value, _) = cook_int_value("0xFF", 16);
        assert_eq!(value, BigUint::from(255u32));
    }

    #[test]
    fn octal_and_binary() {
        assert_eq!(cook_int_value("0o777", 8).0, BigUint::from(511u32));
        assert_eq!(cook_int_value("0b1010", 2).0, BigUint::from(10u32));
    }

    #[test]
    fn overflow_flag_past_i64() {
        let (_, overflow) = cook_int_value("9223372036854775807", 10);
        assert!(!overflow);
        let (_, overflow) = cook_int_value("9223372036854775808", 10);
        assert!(overflow);
    }

    #[test]
    fn hex_float_with_binary_exponent() {
        let mut list = TokenList::new();
        let kind = cook_hex_float("0x1.8p1", Span::DUMMY, &mut list).unwrap();
        let TokenKind::FloatLiteral(id) = kind else {
            panic!("expected float literal")
        };
        assert_eq!(list.float_lit(id), 3.0);
    }

    #[test]
    fn string_escapes() {
        let mut list = TokenList::new();
        let kind = cook_string(r#""a\n\x41\101""#, false, Span::DUMMY, &mut list).unwrap();
        let TokenKind::StringLiteral(id) = kind else {
            panic!("expected string literal")
        };
        assert_eq!(list.str_lit(id).bytes, b"a\nAA");
        assert!(!list.str_lit(id).is_c);
    }

    #[test]
    fn c_string_flag() {
        let mut list = TokenList::new();
        let kind = cook_string(r#"c"hi""#, true, Span::DUMMY, &mut list).unwrap();
        let TokenKind::StringLiteral(id) = kind else {
            panic!("expected string literal")
        };
        assert!(list.str_lit(id).is_c);
        assert_eq!(list.str_lit(id).bytes, b"hi");
    }

    #[test]
    fn char_literal_escape() {
        assert_eq!(
            cook_char(r"'\n'", Span::DUMMY).unwrap(),
            TokenKind::CharLiteral(b'\n')
        );
        assert_eq!(
            cook_char("'A'", Span::DUMMY).unwrap(),
            TokenKind::CharLiteral(b'A')
        );
    }

    #[test]
    fn bad_escape_is_error() {
        assert!(cook_char(r"'\q'", Span::DUMMY).is_err());
    }
}
