//! Rx Lexer
//!
//! Converts source code into a stream of tokens for parsing.

pub mod token;

pub use token::{Span, Token, TokenKind};

use crate::error::{RxError, RxResult, SourceLocation};

/// Integer suffixes accepted after a numeric literal.
const INT_SUFFIXES: [&str; 4] = ["i32", "u32", "isize", "usize"];

/// Lexer for Rx source code
pub struct Lexer {
    chars: Vec<char>,
    filename: String,

    // Position tracking
    pos: usize,
    line: usize,
    column: usize,
    start: usize,
    start_line: usize,
    start_column: usize,
}

impl Lexer {
    pub fn new(source: &str, filename: &str) -> Self {
        Self {
            chars: source.chars().collect(),
            filename: filename.to_string(),
            pos: 0,
            line: 1,
            column: 1,
            start: 0,
            start_line: 1,
            start_column: 1,
        }
    }

    /// Tokenize the entire source code
    pub fn tokenize(&mut self) -> RxResult<Vec<Token>> {
        let mut tokens = Vec::new();

        while !self.is_at_end() {
            self.skip_whitespace_and_comments()?;

            if self.is_at_end() {
                break;
            }

            self.start = self.pos;
            self.start_line = self.line;
            self.start_column = self.column;

            let token = self.scan_token()?;
            if token.kind != TokenKind::Newline {
                tokens.push(token);
            }
        }

        tokens.push(Token::new(
            TokenKind::Eof,
            Span::new(self.pos, self.pos, self.line, self.column),
            String::new(),
        ));

        Ok(tokens)
    }

    fn scan_token(&mut self) -> RxResult<Token> {
        let c = self.advance();

        let kind = match c {
            '(' => TokenKind::LeftParen,
            ')' => TokenKind::RightParen,
            '{' => TokenKind::LeftBrace,
            '}' => TokenKind::RightBrace,
            '[' => TokenKind::LeftBracket,
            ']' => TokenKind::RightBracket,
            ',' => TokenKind::Comma,
            ';' => TokenKind::Semicolon,
            '.' => TokenKind::Dot,
            ':' => {
                if self.match_char(':') {
                    TokenKind::ColonColon
                } else {
                    TokenKind::Colon
                }
            }
            '+' => self.with_assign(TokenKind::PlusAssign, TokenKind::Plus),
            '*' => self.with_assign(TokenKind::StarAssign, TokenKind::Star),
            '/' => self.with_assign(TokenKind::SlashAssign, TokenKind::Slash),
            '%' => self.with_assign(TokenKind::PercentAssign, TokenKind::Percent),
            '^' => self.with_assign(TokenKind::CaretAssign, TokenKind::Caret),
            '-' => {
                if self.match_char('>') {
                    TokenKind::Arrow
                } else {
                    self.with_assign(TokenKind::MinusAssign, TokenKind::Minus)
                }
            }
            '=' => {
                if self.match_char('=') {
                    TokenKind::EqualEqual
                } else if self.match_char('>') {
                    TokenKind::FatArrow
                } else {
                    TokenKind::Equal
                }
            }
            '!' => self.with_assign(TokenKind::NotEqual, TokenKind::Not),
            '<' => {
                if self.match_char('<') {
                    self.with_assign(TokenKind::ShlAssign, TokenKind::Shl)
                } else {
                    self.with_assign(TokenKind::LessEqual, TokenKind::Less)
                }
            }
            '>' => {
                if self.match_char('>') {
                    self.with_assign(TokenKind::ShrAssign, TokenKind::Shr)
                } else {
                    self.with_assign(TokenKind::GreaterEqual, TokenKind::Greater)
                }
            }
            '&' => {
                if self.match_char('&') {
                    TokenKind::And
                } else {
                    self.with_assign(TokenKind::AmpAssign, TokenKind::Ampersand)
                }
            }
            '|' => {
                if self.match_char('|') {
                    TokenKind::Or
                } else {
                    self.with_assign(TokenKind::PipeAssign, TokenKind::Pipe)
                }
            }

            '\'' => self.scan_char()?,
            '"' => self.scan_string()?,
            '0'..='9' => self.scan_number(c)?,
            'a'..='z' | 'A'..='Z' | '_' => self.scan_identifier(c),

            '\n' => {
                self.line += 1;
                self.column = 1;
                TokenKind::Newline
            }

            _ => {
                return Err(self.error(&format!("Unexpected character '{}'", c)));
            }
        };

        let lexeme: String = self.chars[self.start..self.pos].iter().collect();
        let span = Span::new(self.start, self.pos, self.start_line, self.start_column);

        Ok(Token::new(kind, span, lexeme))
    }

    /// `op=` if the next char is `=`, plain `op` otherwise.
    fn with_assign(&mut self, assign: TokenKind, plain: TokenKind) -> TokenKind {
        if self.match_char('=') {
            assign
        } else {
            plain
        }
    }

    fn scan_escape(&mut self) -> RxResult<char> {
        match self.advance() {
            'n' => Ok('\n'),
            't' => Ok('\t'),
            'r' => Ok('\r'),
            '\\' => Ok('\\'),
            '\'' => Ok('\''),
            '"' => Ok('"'),
            '0' => Ok('\0'),
            c => Err(self.error(&format!("Invalid escape sequence '\\{}'", c))),
        }
    }

    fn scan_char(&mut self) -> RxResult<TokenKind> {
        if self.is_at_end() || self.peek() == '\n' {
            return Err(self.error("Unterminated character literal"));
        }

        let value = if self.peek() == '\\' {
            self.advance();
            self.scan_escape()?
        } else {
            self.advance()
        };

        if !self.match_char('\'') {
            return Err(self.error("Expected closing ' for character literal"));
        }
        Ok(TokenKind::Char(value))
    }

    fn scan_string(&mut self) -> RxResult<TokenKind> {
        let mut value = String::new();

        while !self.is_at_end() && self.peek() != '"' {
            if self.peek() == '\\' {
                self.advance();
                if self.is_at_end() {
                    break;
                }
                value.push(self.scan_escape()?);
                continue;
            }

            let c = self.advance();
            if c == '\n' {
                self.line += 1;
                self.column = 1;
            }
            value.push(c);
        }

        if self.is_at_end() {
            return Err(self.error("Unterminated string literal"));
        }

        self.advance(); // closing quote
        Ok(TokenKind::String(value))
    }

    fn scan_number(&mut self, first: char) -> RxResult<TokenKind> {
        let radix = if first == '0' && matches!(self.peek(), 'x' | 'X') {
            self.advance();
            16
        } else {
            10
        };

        let mut digits = String::new();
        if radix == 10 {
            digits.push(first);
        }

        while self.peek().is_digit(radix) || self.peek() == '_' {
            let c = self.advance();
            if c != '_' {
                digits.push(c);
            }
        }

        if digits.is_empty() {
            return Err(self.error("Expected digits after '0x'"));
        }

        let suffix = if self.peek().is_alphabetic() {
            let mut name = String::new();
            while self.peek().is_alphanumeric() || self.peek() == '_' {
                name.push(self.advance());
            }
            if !INT_SUFFIXES.contains(&name.as_str()) {
                return Err(self.error(&format!("Invalid suffix '{}' for integer literal", name)));
            }
            Some(name)
        } else {
            None
        };

        let value = i64::from_str_radix(&digits, radix)
            .map_err(|_| self.error(&format!("Integer literal '{}' is too large", digits)))?;
        Ok(TokenKind::Int(value, suffix))
    }

    fn scan_identifier(&mut self, first: char) -> TokenKind {
        let mut name = String::from(first);

        while self.peek().is_alphanumeric() || self.peek() == '_' {
            name.push(self.advance());
        }

        TokenKind::keyword_from_str(&name).unwrap_or(TokenKind::Identifier(name))
    }

    fn skip_whitespace_and_comments(&mut self) -> RxResult<()> {
        loop {
            match self.peek() {
                ' ' | '\t' | '\r' => {
                    self.advance();
                }
                '/' if self.peek_next() == '/' => {
                    while !self.is_at_end() && self.peek() != '\n' {
                        self.advance();
                    }
                }
                '/' if self.peek_next() == '*' => {
                    self.start = self.pos;
                    self.start_line = self.line;
                    self.start_column = self.column;
                    self.advance();
                    self.advance();

                    let mut depth = 1;
                    while depth > 0 {
                        if self.is_at_end() {
                            return Err(self.error("Unterminated block comment"));
                        }
                        if self.peek() == '/' && self.peek_next() == '*' {
                            self.advance();
                            self.advance();
                            depth += 1;
                        } else if self.peek() == '*' && self.peek_next() == '/' {
                            self.advance();
                            self.advance();
                            depth -= 1;
                        } else if self.advance() == '\n' {
                            self.line += 1;
                            self.column = 1;
                        }
                    }
                }
                _ => return Ok(()),
            }
        }
    }

    // Helper methods
    fn is_at_end(&self) -> bool {
        self.pos >= self.chars.len()
    }

    fn peek(&self) -> char {
        self.chars.get(self.pos).copied().unwrap_or('\0')
    }

    fn peek_next(&self) -> char {
        self.chars.get(self.pos + 1).copied().unwrap_or('\0')
    }

    fn advance(&mut self) -> char {
        let c = self.peek();
        self.pos += 1;
        self.column += 1;
        c
    }

    fn match_char(&mut self, expected: char) -> bool {
        if self.is_at_end() || self.peek() != expected {
            false
        } else {
            self.pos += 1;
            self.column += 1;
            true
        }
    }

    fn error(&self, message: &str) -> RxError {
        let start = self.start.min(self.chars.len());
        let line_start = self.chars[..start]
            .iter()
            .rposition(|&c| c == '\n')
            .map(|i| i + 1)
            .unwrap_or(0);
        let line_end = self.chars[start..]
            .iter()
            .position(|&c| c == '\n')
            .map(|i| start + i)
            .unwrap_or(self.chars.len());
        let snippet: String = self.chars[line_start..line_end].iter().collect();

        RxError::syntax_error(
            message,
            SourceLocation::new(&self.filename, self.start_line, self.start_column)
                .with_snippet(&snippet),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(source: &str) -> Vec<TokenKind> {
        let mut lexer = Lexer::new(source, "test.rx");
        lexer
            .tokenize()
            .unwrap()
            .into_iter()
            .map(|t| t.kind)
            .collect()
    }

    #[test]
    fn test_simple_tokens() {
        let mut lexer = Lexer::new("let x = 5;", "test.rx");
        let tokens = lexer.tokenize().unwrap();

        assert!(matches!(tokens[0].kind, TokenKind::Let));
        assert!(matches!(tokens[1].kind, TokenKind::Identifier(_)));
        assert!(matches!(tokens[2].kind, TokenKind::Equal));
        assert!(matches!(tokens[3].kind, TokenKind::Int(5, None)));
        assert!(matches!(tokens[4].kind, TokenKind::Semicolon));
        assert!(matches!(tokens[5].kind, TokenKind::Eof));
    }

    #[test]
    fn test_integer_suffixes_and_separators() {
        let tokens = kinds("10usize 1_000 0xff 7u32");

        assert!(matches!(&tokens[0], TokenKind::Int(10, Some(s)) if s == "usize"));
        assert!(matches!(tokens[1], TokenKind::Int(1000, None)));
        assert!(matches!(tokens[2], TokenKind::Int(255, None)));
        assert!(matches!(&tokens[3], TokenKind::Int(7, Some(s)) if s == "u32"));
    }

    #[test]
    fn test_bad_suffix_rejected() {
        let mut lexer = Lexer::new("5u8", "test.rx");
        assert!(lexer.tokenize().is_err());
    }

    #[test]
    fn test_string_and_char_literals() {
        let tokens = kinds(r#""hello\n" 'a' '\''"#);

        assert!(matches!(&tokens[0], TokenKind::String(s) if s == "hello\n"));
        assert!(matches!(tokens[1], TokenKind::Char('a')));
        assert!(matches!(tokens[2], TokenKind::Char('\'')));
    }

    #[test]
    fn test_operators() {
        let tokens = kinds("+ - * / == != < > <= >= && || << >>= &= -> ::");

        assert!(matches!(tokens[0], TokenKind::Plus));
        assert!(matches!(tokens[1], TokenKind::Minus));
        assert!(matches!(tokens[2], TokenKind::Star));
        assert!(matches!(tokens[3], TokenKind::Slash));
        assert!(matches!(tokens[4], TokenKind::EqualEqual));
        assert!(matches!(tokens[5], TokenKind::NotEqual));
        assert!(matches!(tokens[10], TokenKind::And));
        assert!(matches!(tokens[11], TokenKind::Or));
        assert!(matches!(tokens[12], TokenKind::Shl));
        assert!(matches!(tokens[13], TokenKind::ShrAssign));
        assert!(matches!(tokens[14], TokenKind::AmpAssign));
        assert!(matches!(tokens[15], TokenKind::Arrow));
        assert!(matches!(tokens[16], TokenKind::ColonColon));
    }

    #[test]
    fn test_self_keywords() {
        let tokens = kinds("self Self _");

        assert!(matches!(tokens[0], TokenKind::SelfValue));
        assert!(matches!(tokens[1], TokenKind::SelfType));
        assert!(matches!(&tokens[2], TokenKind::Identifier(s) if s == "_"));
    }

    #[test]
    fn test_comments_and_lines() {
        let mut lexer = Lexer::new("// note\n/* a /* nested */ b */\nfn", "test.rx");
        let tokens = lexer.tokenize().unwrap();

        assert!(matches!(tokens[0].kind, TokenKind::Fn));
        assert_eq!(tokens[0].span.line, 3);
        assert_eq!(tokens[0].span.column, 1);
    }

    #[test]
    fn test_unterminated_string() {
        let mut lexer = Lexer::new("let s = \"abc", "test.rx");
        let err = lexer.tokenize().unwrap_err();

        assert_eq!(err.kind, crate::error::ErrorKind::Syntax);
        assert_eq!(err.location.unwrap().snippet.as_deref(), Some("let s = \"abc"));
    }
}
