//! Token definitions for the Rx lexer

use std::fmt;

/// Position in source code
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Span {
    pub start: usize,
    pub end: usize,
    pub line: usize,
    pub column: usize,
}

impl Span {
    pub fn new(start: usize, end: usize, line: usize, column: usize) -> Self {
        Self {
            start,
            end,
            line,
            column,
        }
    }

    /// Span running from the start of `self` to the end of `other`.
    pub fn to(self, other: Span) -> Span {
        Span::new(self.start, other.end, self.line, self.column)
    }
}

/// Token types for Rx
#[derive(Debug, Clone, PartialEq)]
pub enum TokenKind {
    // Literals
    Int(i64, Option<String>), // value, optional type suffix
    String(String),
    Char(char),

    Identifier(String),

    // Keywords
    As,
    Break,
    Const,
    Continue,
    Else,
    Enum,
    False,
    Fn,
    For,
    If,
    Impl,
    In,
    Let,
    Loop,
    Mut,
    Ref,
    Return,
    SelfValue, // self
    SelfType,  // Self
    Struct,
    Trait,
    True,
    While,

    // Operators
    Plus,         // +
    Minus,        // -
    Star,         // *
    Slash,        // /
    Percent,      // %
    Caret,        // ^
    Ampersand,    // &
    Pipe,         // |
    Shl,          // <<
    Shr,          // >>
    And,          // &&
    Or,           // ||
    Not,          // !
    Equal,        // =
    EqualEqual,   // ==
    NotEqual,     // !=
    Less,         // <
    LessEqual,    // <=
    Greater,      // >
    GreaterEqual, // >=

    // Compound assignment operators
    PlusAssign,    // +=
    MinusAssign,   // -=
    StarAssign,    // *=
    SlashAssign,   // /=
    PercentAssign, // %=
    CaretAssign,   // ^=
    AmpAssign,     // &=
    PipeAssign,    // |=
    ShlAssign,     // <<=
    ShrAssign,     // >>=

    // Delimiters
    LeftParen,    // (
    RightParen,   // )
    LeftBrace,    // {
    RightBrace,   // }
    LeftBracket,  // [
    RightBracket, // ]
    Comma,        // ,
    Dot,          // .
    Colon,        // :
    ColonColon,   // ::
    Semicolon,    // ;
    Arrow,        // ->
    FatArrow,     // =>

    // Special
    Newline,
    Eof,
}

impl TokenKind {
    pub fn keyword_from_str(s: &str) -> Option<TokenKind> {
        match s {
            "as" => Some(TokenKind::As),
            "break" => Some(TokenKind::Break),
            "const" => Some(TokenKind::Const),
            "continue" => Some(TokenKind::Continue),
            "else" => Some(TokenKind::Else),
            "enum" => Some(TokenKind::Enum),
            "false" => Some(TokenKind::False),
            "fn" => Some(TokenKind::Fn),
            "for" => Some(TokenKind::For),
            "if" => Some(TokenKind::If),
            "impl" => Some(TokenKind::Impl),
            "in" => Some(TokenKind::In),
            "let" => Some(TokenKind::Let),
            "loop" => Some(TokenKind::Loop),
            "mut" => Some(TokenKind::Mut),
            "ref" => Some(TokenKind::Ref),
            "return" => Some(TokenKind::Return),
            "self" => Some(TokenKind::SelfValue),
            "Self" => Some(TokenKind::SelfType),
            "struct" => Some(TokenKind::Struct),
            "trait" => Some(TokenKind::Trait),
            "true" => Some(TokenKind::True),
            "while" => Some(TokenKind::While),
            _ => None,
        }
    }
}

impl fmt::Display for TokenKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TokenKind::Int(n, Some(suffix)) => write!(f, "{}{}", n, suffix),
            TokenKind::Int(n, None) => write!(f, "{}", n),
            TokenKind::String(s) => write!(f, "\"{}\"", s.escape_default()),
            TokenKind::Char(c) => write!(f, "'{}'", c.escape_default()),
            TokenKind::Identifier(s) => write!(f, "{}", s),
            TokenKind::As => write!(f, "as"),
            TokenKind::Break => write!(f, "break"),
            TokenKind::Const => write!(f, "const"),
            TokenKind::Continue => write!(f, "continue"),
            TokenKind::Else => write!(f, "else"),
            TokenKind::Enum => write!(f, "enum"),
            TokenKind::False => write!(f, "false"),
            TokenKind::Fn => write!(f, "fn"),
            TokenKind::For => write!(f, "for"),
            TokenKind::If => write!(f, "if"),
            TokenKind::Impl => write!(f, "impl"),
            TokenKind::In => write!(f, "in"),
            TokenKind::Let => write!(f, "let"),
            TokenKind::Loop => write!(f, "loop"),
            TokenKind::Mut => write!(f, "mut"),
            TokenKind::Ref => write!(f, "ref"),
            TokenKind::Return => write!(f, "return"),
            TokenKind::SelfValue => write!(f, "self"),
            TokenKind::SelfType => write!(f, "Self"),
            TokenKind::Struct => write!(f, "struct"),
            TokenKind::Trait => write!(f, "trait"),
            TokenKind::True => write!(f, "true"),
            TokenKind::While => write!(f, "while"),
            TokenKind::Plus => write!(f, "+"),
            TokenKind::Minus => write!(f, "-"),
            TokenKind::Star => write!(f, "*"),
            TokenKind::Slash => write!(f, "/"),
            TokenKind::Percent => write!(f, "%"),
            TokenKind::Caret => write!(f, "^"),
            TokenKind::Ampersand => write!(f, "&"),
            TokenKind::Pipe => write!(f, "|"),
            TokenKind::Shl => write!(f, "<<"),
            TokenKind::Shr => write!(f, ">>"),
            TokenKind::And => write!(f, "&&"),
            TokenKind::Or => write!(f, "||"),
            TokenKind::Not => write!(f, "!"),
            TokenKind::Equal => write!(f, "="),
            TokenKind::EqualEqual => write!(f, "=="),
            TokenKind::NotEqual => write!(f, "!="),
            TokenKind::Less => write!(f, "<"),
            TokenKind::LessEqual => write!(f, "<="),
            TokenKind::Greater => write!(f, ">"),
            TokenKind::GreaterEqual => write!(f, ">="),
            TokenKind::PlusAssign => write!(f, "+="),
            TokenKind::MinusAssign => write!(f, "-="),
            TokenKind::StarAssign => write!(f, "*="),
            TokenKind::SlashAssign => write!(f, "/="),
            TokenKind::PercentAssign => write!(f, "%="),
            TokenKind::CaretAssign => write!(f, "^="),
            TokenKind::AmpAssign => write!(f, "&="),
            TokenKind::PipeAssign => write!(f, "|="),
            TokenKind::ShlAssign => write!(f, "<<="),
            TokenKind::ShrAssign => write!(f, ">>="),
            TokenKind::LeftParen => write!(f, "("),
            TokenKind::RightParen => write!(f, ")"),
            TokenKind::LeftBrace => write!(f, "{{"),
            TokenKind::RightBrace => write!(f, "}}"),
            TokenKind::LeftBracket => write!(f, "["),
            TokenKind::RightBracket => write!(f, "]"),
            TokenKind::Comma => write!(f, ","),
            TokenKind::Dot => write!(f, "."),
            TokenKind::Colon => write!(f, ":"),
            TokenKind::ColonColon => write!(f, "::"),
            TokenKind::Semicolon => write!(f, ";"),
            TokenKind::Arrow => write!(f, "->"),
            TokenKind::FatArrow => write!(f, "=>"),
            TokenKind::Newline => write!(f, "\\n"),
            TokenKind::Eof => write!(f, "EOF"),
        }
    }
}

/// A token with its kind and source position
#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    pub span: Span,
    pub lexeme: String,
}

impl Token {
    pub fn new(kind: TokenKind, span: Span, lexeme: String) -> Self {
        Self { kind, span, lexeme }
    }
}
