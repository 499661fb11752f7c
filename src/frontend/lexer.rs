use std::{collections::BTreeMap, str::Chars};

use itertools::{PeekNth, peek_nth};
use once_cell::sync::Lazy;
use strum::EnumString;

use crate::frontend::SourceFile;

#[derive(Debug)]
pub struct Lexer<'source> {
    chars: PeekNth<Chars<'source>>,
    line_number: usize,
    tokens: Vec<Token>,
    errors: Vec<LexError>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    pub value: TokenValue,
    pub line: usize,
}

/// Literal payload carried by a token
#[derive(Debug, Clone, PartialEq)]
pub enum TokenValue {
    None,
    Integer(i64),
    Real(f64),
    String(String),
    Identifier(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    /* Words */
    Keyword(Keyword), // begin
    Identifier,       // main

    /* Literals */
    IntegerLiteral, // 1
    RealLiteral,    // 1.0
    StringLiteral,  // "hello, world"

    /* Operators */
    Assign,               // :=
    Plus,                 // +
    Minus,                // -
    Asterisk,             // *
    Slash,                // /
    Equals,               // =
    NotEquals,            // <>
    LessThan,             // <
    LessThanOrEqualTo,    // <=
    GreaterThan,          // >
    GreaterThanOrEqualTo, // >=

    /* Delimiters */
    OpenParen,    // (
    CloseParen,   // )
    OpenBracket,  // [
    CloseBracket, // ]
    Semicolon,    // ;
    Colon,        // :
    Comma,        // ,
    Dot,          // .
    DoubleDot,    // ..

    Eof,
}

impl TokenKind {
    pub fn is_comparison_operator(&self) -> bool {
        matches!(
            self,
            Self::Equals
                | Self::NotEquals
                | Self::LessThan
                | Self::LessThanOrEqualTo
                | Self::GreaterThan
                | Self::GreaterThanOrEqualTo
        )
    }

    pub fn is_term_operator(&self) -> bool {
        matches!(self, Self::Plus | Self::Minus)
    }

    pub fn is_factor_operator(&self) -> bool {
        matches!(self, Self::Asterisk | Self::Slash)
    }

    /// Human readable name used in "expected ..." messages
    pub fn describe(&self) -> String {
        let text = match self {
            TokenKind::Keyword(keyword) => return format!("`{keyword}`"),
            TokenKind::Identifier => "identifier",
            TokenKind::IntegerLiteral => "integer literal",
            TokenKind::RealLiteral => "real literal",
            TokenKind::StringLiteral => "string literal",
            TokenKind::Assign => "`:=`",
            TokenKind::Plus => "`+`",
            TokenKind::Minus => "`-`",
            TokenKind::Asterisk => "`*`",
            TokenKind::Slash => "`/`",
            TokenKind::Equals => "`=`",
            TokenKind::NotEquals => "`<>`",
            TokenKind::LessThan => "`<`",
            TokenKind::LessThanOrEqualTo => "`<=`",
            TokenKind::GreaterThan => "`>`",
            TokenKind::GreaterThanOrEqualTo => "`>=`",
            TokenKind::OpenParen => "`(`",
            TokenKind::CloseParen => "`)`",
            TokenKind::OpenBracket => "`[`",
            TokenKind::CloseBracket => "`]`",
            TokenKind::Semicolon => "`;`",
            TokenKind::Colon => "`:`",
            TokenKind::Comma => "`,`",
            TokenKind::Dot => "`.`",
            TokenKind::DoubleDot => "`..`",
            TokenKind::Eof => "end of file",
        };

        text.to_string()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumString, strum::Display)]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum Keyword {
    Program,
    Const,
    Type,
    Var,
    Begin,
    End,
    Function,
    Of,
    Record,
    Array,
    Integer,
    Real,
    While,
    If,
    Then,
    Else,
    Write,
    Read,
}

/// Table of single char tokens (matched after longer sequences are checked for)
static SINGLE_TOKENS: Lazy<BTreeMap<char, TokenKind>> = Lazy::new(|| {
    BTreeMap::from([
        ('(', TokenKind::OpenParen),
        (')', TokenKind::CloseParen),
        ('[', TokenKind::OpenBracket),
        (']', TokenKind::CloseBracket),
        (';', TokenKind::Semicolon),
        (':', TokenKind::Colon),
        (',', TokenKind::Comma),
        ('.', TokenKind::Dot),
        ('+', TokenKind::Plus),
        ('-', TokenKind::Minus),
        ('*', TokenKind::Asterisk),
        ('/', TokenKind::Slash),
        ('=', TokenKind::Equals),
        ('<', TokenKind::LessThan),
        ('>', TokenKind::GreaterThan),
        // legacy spelling of `<>`
        ('!', TokenKind::NotEquals),
    ])
});

impl core::fmt::Display for Token {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match (&self.kind, &self.value) {
            (TokenKind::Keyword(keyword), _) => write!(f, "{keyword}"),
            (_, TokenValue::Integer(value)) => write!(f, "{value}"),
            (_, TokenValue::Real(value)) => write!(f, "{value:?}"),
            (_, TokenValue::String(value)) => write!(f, "\"{value}\""),
            (_, TokenValue::Identifier(name)) => write!(f, "{name}"),
            (TokenKind::Eof, _) => write!(f, "end of file"),
            (kind, TokenValue::None) => write!(f, "{}", kind.describe().trim_matches('`')),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LexError {
    pub line: usize,
    pub message: String,
}

impl core::fmt::Display for LexError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} (line {})", self.message, self.line)
    }
}

impl std::error::Error for LexError {}

impl<'source> Lexer<'source> {
    /// Scans the whole source file. Scanning continues past bad characters so
    /// every lexical error in the file is reported at once.
    pub fn tokenize(source: &'source SourceFile) -> Result<Vec<Token>, Vec<LexError>> {
        let mut lexer = Self {
            chars: peek_nth(source.contents.chars()),
            line_number: 1,
            tokens: Vec::new(),
            errors: Vec::new(),
        };

        while let Some(token) = lexer.next_token() {
            lexer.tokens.push(token);
        }

        lexer.tokens.push(Token {
            kind: TokenKind::Eof,
            value: TokenValue::None,
            line: lexer.line_number,
        });

        tracing::trace!(tokens = lexer.tokens.len(), "tokenized source");

        if lexer.errors.is_empty() {
            Ok(lexer.tokens)
        } else {
            Err(lexer.errors)
        }
    }

    fn report_error(&mut self, message: String) {
        self.errors.push(LexError {
            line: self.line_number,
            message,
        });
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.chars.next()?;

        if c == '\n' {
            self.line_number += 1;
        }

        Some(c)
    }

    fn peek_is(&mut self, n: usize, expected: char) -> bool {
        self.chars.peek_nth(n).is_some_and(|c| *c == expected)
    }

    fn simple_token(&self, kind: TokenKind) -> Token {
        Token {
            kind,
            value: TokenValue::None,
            line: self.line_number,
        }
    }

    fn ignore_whitespace(&mut self) {
        while self.chars.peek().is_some_and(|c| c.is_whitespace()) {
            self.bump();
        }
    }

    // { comments may span lines }
    fn ignore_comment(&mut self) {
        let start_line = self.line_number;

        while let Some(c) = self.bump() {
            if c == '}' {
                return;
            }
        }

        self.errors.push(LexError {
            line: start_line,
            message: "Reached end of file while reading comment".to_string(),
        });
    }

    // Keyword or identifier
    fn read_word(&mut self) -> Token {
        let mut word = String::new();

        while let Some(c) = self.chars.peek().copied() {
            if !(c.is_ascii_alphanumeric() || c == '_') {
                break;
            }

            word.push(c);
            self.bump();
        }

        if let Ok(keyword) = word.parse() {
            return self.simple_token(TokenKind::Keyword(keyword));
        }

        Token {
            kind: TokenKind::Identifier,
            value: TokenValue::Identifier(word),
            line: self.line_number,
        }
    }

    fn read_number(&mut self) -> Token {
        let mut text = String::new();
        let mut is_real = false;

        while let Some(c) = self.chars.peek().copied() {
            if c == '.' && !is_real && !self.peek_is(1, '.') {
                is_real = true;
            } else if !c.is_ascii_digit() {
                break;
            }

            text.push(c);
            self.bump();
        }

        if is_real {
            // "12." and ".5" are both valid real literals
            let value = format!("0{text}0").parse().unwrap_or(0.0);

            return Token {
                kind: TokenKind::RealLiteral,
                value: TokenValue::Real(value),
                line: self.line_number,
            };
        }

        let value = text.parse().unwrap_or_else(|_| {
            self.report_error(format!("Integer literal `{text}` is out of range"));
            0
        });

        Token {
            kind: TokenKind::IntegerLiteral,
            value: TokenValue::Integer(value),
            line: self.line_number,
        }
    }

    fn read_string(&mut self) -> Option<Token> {
        let line = self.line_number;

        // Consume opening quote
        self.bump();

        let mut value = String::new();

        while let Some(c) = self.chars.peek().copied() {
            if c == '\n' {
                break;
            }

            self.bump();

            if c == '"' {
                return Some(Token {
                    kind: TokenKind::StringLiteral,
                    value: TokenValue::String(value),
                    line,
                });
            }

            value.push(c);
        }

        self.report_error("Reached end of line while reading string literal".to_string());
        None
    }

    fn read_double(&mut self, kind: TokenKind) -> Token {
        self.bump();
        self.bump();

        self.simple_token(kind)
    }

    fn next_token(&mut self) -> Option<Token> {
        while let Some(c) = self.chars.peek().copied() {
            let token = match c {
                // Ignore whitespace
                c if c.is_whitespace() => {
                    self.ignore_whitespace();
                    continue;
                }
                // Ignore comments
                '{' => {
                    self.ignore_comment();
                    continue;
                }

                '"' => match self.read_string() {
                    Some(token) => token,
                    None => continue,
                },

                // Integer and real literals
                n if n.is_ascii_digit() => self.read_number(),
                '.' if self.chars.peek_nth(1).is_some_and(|c| c.is_ascii_digit()) => {
                    self.read_number()
                }

                // Identifiers and keywords
                a if a.is_ascii_alphabetic() => self.read_word(),

                // Assignment (:=)
                ':' if self.peek_is(1, '=') => self.read_double(TokenKind::Assign),
                // Not equals (<>)
                '<' if self.peek_is(1, '>') => self.read_double(TokenKind::NotEquals),
                // Less than or equal (<=)
                '<' if self.peek_is(1, '=') => self.read_double(TokenKind::LessThanOrEqualTo),
                // Greater than or equal (>=)
                '>' if self.peek_is(1, '=') => {
                    self.read_double(TokenKind::GreaterThanOrEqualTo)
                }
                // Range (..)
                '.' if self.peek_is(1, '.') => self.read_double(TokenKind::DoubleDot),

                s if SINGLE_TOKENS.contains_key(&s) => {
                    self.bump();
                    self.simple_token(SINGLE_TOKENS[&s])
                }
                c => {
                    self.bump();
                    self.report_error(format!("Unexpected character in stream: `{c}`"));
                    continue;
                }
            };

            return Some(token);
        }

        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(source: &str) -> Vec<TokenKind> {
        Lexer::tokenize(&SourceFile::from_memory(source))
            .unwrap()
            .into_iter()
            .map(|t| t.kind)
            .collect()
    }

    #[test]
    fn keywords_are_case_insensitive() {
        assert_eq!(
            kinds("PROGRAM Begin end"),
            vec![
                TokenKind::Keyword(Keyword::Program),
                TokenKind::Keyword(Keyword::Begin),
                TokenKind::Keyword(Keyword::End),
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn two_char_operators_win_over_single_chars() {
        assert_eq!(
            kinds("x := a <> b <= c >= d < e > f .."),
            vec![
                TokenKind::Identifier,
                TokenKind::Assign,
                TokenKind::Identifier,
                TokenKind::NotEquals,
                TokenKind::Identifier,
                TokenKind::LessThanOrEqualTo,
                TokenKind::Identifier,
                TokenKind::GreaterThanOrEqualTo,
                TokenKind::Identifier,
                TokenKind::LessThan,
                TokenKind::Identifier,
                TokenKind::GreaterThan,
                TokenKind::Identifier,
                TokenKind::DoubleDot,
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn literals_carry_values_and_lines() {
        let source = SourceFile::from_memory("12 3.5\n.25 \"hi there\" { skipped\n comment } name");
        let tokens = Lexer::tokenize(&source).unwrap();

        assert_eq!(tokens[0].value, TokenValue::Integer(12));
        assert_eq!(tokens[1].value, TokenValue::Real(3.5));
        assert_eq!(tokens[2].value, TokenValue::Real(0.25));
        assert_eq!(tokens[2].line, 2);
        assert_eq!(tokens[3].value, TokenValue::String("hi there".to_string()));
        assert_eq!(tokens[4].value, TokenValue::Identifier("name".to_string()));
        assert_eq!(tokens[4].line, 3);
        assert_eq!(tokens[5].kind, TokenKind::Eof);
    }

    #[test]
    fn exclamation_mark_is_not_equals() {
        assert_eq!(
            kinds("a ! b"),
            vec![
                TokenKind::Identifier,
                TokenKind::NotEquals,
                TokenKind::Identifier,
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn trailing_dot_after_integer_is_a_real() {
        let tokens = Lexer::tokenize(&SourceFile::from_memory("345.")).unwrap();

        assert_eq!(tokens[0].kind, TokenKind::RealLiteral);
        assert_eq!(tokens[0].value, TokenValue::Real(345.0));
    }

    #[test]
    fn collects_every_lexical_error() {
        let errors = Lexer::tokenize(&SourceFile::from_memory("x := 1 @\ny := #\n\"open"))
            .unwrap_err();

        assert_eq!(errors.len(), 3);
        assert_eq!(errors[0].line, 1);
        assert_eq!(errors[1].line, 2);
        assert_eq!(errors[2].line, 3);
    }
}
