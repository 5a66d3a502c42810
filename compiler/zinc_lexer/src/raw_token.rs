//! Raw token definition.
//!
//! The `RawToken` enum is the logos-derived scanner output before literal
//! cooking and string interning. Payload-free: the cooker re-reads the
//! matched slice to decode literals.

use logos::Logos;

#[derive(Logos, Debug, Clone, Copy, PartialEq, Eq)]
#[logos(skip r"[ \t\r\n]+")]
#[logos(skip r"//[^\n]*")]
pub(crate) enum RawToken {
    #[regex(r"[A-Za-z_][A-Za-z0-9_]*")]
    Ident,

    // Numeric literals. Base prefixes bind tighter than the plain decimal
    // form; hex floats use a binary exponent (`p`), decimal floats `e`.
    #[regex(r"0x[0-9a-fA-F]+(\.[0-9a-fA-F]+)?([pP][+-]?[0-9]+)?")]
    HexNumber,
    #[regex(r"0o[0-7]+")]
    OctalNumber,
    #[regex(r"0b[01]+")]
    BinaryNumber,
    #[regex(r"[0-9]+(\.[0-9]+)?([eE][+-]?[0-9]+)?")]
    DecimalNumber,

    #[regex(r#""(?:[^"\\\n]|\\[^\n])*""#)]
    String,
    #[regex(r#"c"(?:[^"\\\n]|\\[^\n])*""#)]
    CString,
    #[regex(r"'(?:[^'\\\n]|\\[^\n])*'")]
    Char,

    // Keywords.
    #[token("and")]
    KwAnd,
    #[token("asm")]
    KwAsm,
    #[token("break")]
    KwBreak,
    #[token("coldcc")]
    KwColdCc,
    #[token("comptime")]
    KwComptime,
    #[token("const")]
    KwConst,
    #[token("continue")]
    KwContinue,
    #[token("defer")]
    KwDefer,
    #[token("else")]
    KwElse,
    #[token("enum")]
    KwEnum,
    #[token("error")]
    KwError,
    #[token("export")]
    KwExport,
    #[token("extern")]
    KwExtern,
    #[token("false")]
    KwFalse,
    #[token("fn")]
    KwFn,
    #[token("for")]
    KwFor,
    #[token("goto")]
    KwGoto,
    #[token("if")]
    KwIf,
    #[token("inline")]
    KwInline,
    #[token("nakedcc")]
    KwNakedCc,
    #[token("noalias")]
    KwNoAlias,
    #[token("null")]
    KwNull,
    #[token("or")]
    KwOr,
    #[token("packed")]
    KwPacked,
    #[token("pub")]
    KwPub,
    #[token("return")]
    KwReturn,
    #[token("struct")]
    KwStruct,
    #[token("switch")]
    KwSwitch,
    #[token("test")]
    KwTest,
    #[token("this")]
    KwThis,
    #[token("true")]
    KwTrue,
    #[token("try")]
    KwTry,
    #[token("undefined")]
    KwUndefined,
    #[token("union")]
    KwUnion,
    #[token("unreachable")]
    KwUnreachable,
    #[token("use")]
    KwUse,
    #[token("var")]
    KwVar,
    #[token("volatile")]
    KwVolatile,
    #[token("while")]
    KwWhile,

    // Punctuation.
    #[token("(")]
    LParen,
    #[token(")")]
    RParen,
    #[token("{")]
    LBrace,
    #[token("}")]
    RBrace,
    #[token("[")]
    LBracket,
    #[token("]")]
    RBracket,
    #[token(",")]
    Comma,
    #[token(";")]
    Semicolon,
    #[token(":")]
    Colon,
    #[token(".")]
    Dot,
    #[token("...")]
    Ellipsis,
    #[token("->")]
    Arrow,
    #[token("=>")]
    FatArrow,
    #[token("@")]
    AtSign,

    // Operators, longest spellings first for clarity (logos picks the
    // longest match regardless of declaration order).
    #[token("!")]
    Bang,
    #[token("~")]
    Tilde,
    #[token("=")]
    Eq,
    #[token("==")]
    EqEq,
    #[token("!=")]
    BangEq,
    #[token("<")]
    Less,
    #[token(">")]
    Greater,
    #[token("<=")]
    LessEq,
    #[token(">=")]
    GreaterEq,
    #[token("+")]
    Plus,
    #[token("++")]
    PlusPlus,
    #[token("+%")]
    PlusPercent,
    #[token("-")]
    Minus,
    #[token("-%")]
    MinusPercent,
    #[token("*")]
    Star,
    #[token("**")]
    StarStar,
    #[token("*%")]
    StarPercent,
    #[token("/")]
    Slash,
    #[token("%")]
    Percent,
    #[token("%%")]
    PercentPercent,
    #[token("&")]
    Ampersand,
    #[token("|")]
    Pipe,
    #[token("^")]
    Caret,
    #[token("<<")]
    ShiftLeft,
    #[token(">>")]
    ShiftRight,
    #[token("<<%")]
    ShiftLeftPercent,
    #[token("?")]
    Question,
    #[token("??")]
    DoubleQuestion,
    #[token("?=")]
    QuestionEq,

    #[token("+=")]
    PlusEq,
    #[token("+%=")]
    PlusPercentEq,
    #[token("-=")]
    MinusEq,
    #[token("-%=")]
    MinusPercentEq,
    #[token("*=")]
    StarEq,
    #[token("*%=")]
    StarPercentEq,
    #[token("/=")]
    SlashEq,
    #[token("%=")]
    PercentEq,
    #[token("&=")]
    AmpersandEq,
    #[token("|=")]
    PipeEq,
    #[token("^=")]
    CaretEq,
    #[token("<<=")]
    ShiftLeftEq,
    #[token("<<%=")]
    ShiftLeftPercentEq,
    #[token(">>=")]
    ShiftRightEq,
}
