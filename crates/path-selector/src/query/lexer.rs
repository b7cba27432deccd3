//! Tokenizer for FABRID policy queries
//!
//! A hop specifier (`1-ff00:0:110#0,0@L1000`) is scanned as a single token so
//! that the `#` and `:` inside it never clash with the sequence separator and
//! the conditional else marker.

use super::{HopScope, PolicyAction, QuerySyntaxError};
use crate::{parse_as, InterfaceId, PolicyId};
use std::fmt;

/// Token kinds
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TokenKind {
    Specifier(HopScope, PolicyAction),
    /// `#` between two specifiers
    Hash,
    Plus,
    Question,
    Colon,
    LeftBrace,
    RightBrace,
    LeftParen,
    RightParen,
    Eof,
}

impl fmt::Display for TokenKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TokenKind::Specifier(..) => write!(f, "hop specifier"),
            TokenKind::Hash => write!(f, "'#'"),
            TokenKind::Plus => write!(f, "'+'"),
            TokenKind::Question => write!(f, "'?'"),
            TokenKind::Colon => write!(f, "':'"),
            TokenKind::LeftBrace => write!(f, "'{{'"),
            TokenKind::RightBrace => write!(f, "'}}'"),
            TokenKind::LeftParen => write!(f, "'('"),
            TokenKind::RightParen => write!(f, "')'"),
            TokenKind::Eof => write!(f, "end of query"),
        }
    }
}

/// Token with its byte offset in the query text
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    pub kind: TokenKind,
    pub offset: usize,
}

/// Hand-rolled query lexer
pub struct Lexer<'a> {
    input: &'a str,
    offset: usize,
}

impl<'a> Lexer<'a> {
    pub fn new(input: &'a str) -> Self {
        Self { input, offset: 0 }
    }

    /// Tokenize the whole input, ending with [`TokenKind::Eof`]
    pub fn tokenize(mut self) -> Result<Vec<Token>, QuerySyntaxError> {
        let mut tokens = Vec::new();
        loop {
            let token = self.next_token()?;
            let done = token.kind == TokenKind::Eof;
            tokens.push(token);
            if done {
                return Ok(tokens);
            }
        }
    }

    fn peek(&self) -> Option<char> {
        self.input[self.offset..].chars().next()
    }

    fn advance(&mut self) -> Option<char> {
        let ch = self.peek()?;
        self.offset += ch.len_utf8();
        Some(ch)
    }

    fn skip_whitespace(&mut self) {
        while self.peek().is_some_and(char::is_whitespace) {
            self.advance();
        }
    }

    fn error(&self, offset: usize, message: impl Into<String>) -> QuerySyntaxError {
        QuerySyntaxError::new(message, offset)
    }

    fn next_token(&mut self) -> Result<Token, QuerySyntaxError> {
        self.skip_whitespace();
        let start = self.offset;

        let Some(ch) = self.peek() else {
            return Ok(Token {
                kind: TokenKind::Eof,
                offset: start,
            });
        };

        let kind = match ch {
            '#' => TokenKind::Hash,
            '+' => TokenKind::Plus,
            '?' => TokenKind::Question,
            ':' => TokenKind::Colon,
            '{' => TokenKind::LeftBrace,
            '}' => TokenKind::RightBrace,
            '(' => TokenKind::LeftParen,
            ')' => TokenKind::RightParen,
            c if c.is_ascii_digit() => return self.scan_specifier(),
            other => return Err(self.error(start, format!("unexpected character '{}'", other))),
        };

        self.advance();
        Ok(Token { kind, offset: start })
    }

    /// Take characters while `pred` holds
    fn take_while(&mut self, pred: impl Fn(char) -> bool) -> &'a str {
        let input = self.input;
        let start = self.offset;
        while self.peek().is_some_and(&pred) {
            self.advance();
        }
        &input[start..self.offset]
    }

    fn expect_char(&mut self, expected: char, what: &str) -> Result<(), QuerySyntaxError> {
        match self.peek() {
            Some(c) if c == expected => {
                self.advance();
                Ok(())
            }
            _ => Err(self.error(self.offset, format!("expected '{}' {}", expected, what))),
        }
    }

    fn scan_number<T: std::str::FromStr>(&mut self, what: &str) -> Result<T, QuerySyntaxError> {
        let start = self.offset;
        let digits = self.take_while(|c| c.is_ascii_digit());
        digits
            .parse::<T>()
            .map_err(|_| self.error(start, format!("invalid {}", what)))
    }

    /// `ISD-AS#IG,EG@POLICY`
    fn scan_specifier(&mut self) -> Result<Token, QuerySyntaxError> {
        let start = self.offset;

        let isd: u16 = self.scan_number("ISD number")?;
        self.expect_char('-', "after ISD")?;

        let as_start = self.offset;
        let as_text = self.take_while(|c| c.is_ascii_hexdigit() || c == ':');
        let asn = parse_as(as_text)
            .ok_or_else(|| self.error(as_start, format!("invalid AS number '{}'", as_text)))?;

        self.expect_char('#', "between AS and interfaces")?;
        let ingress: InterfaceId = self.scan_number("ingress interface")?;
        self.expect_char(',', "between interfaces")?;
        let egress: InterfaceId = self.scan_number("egress interface")?;
        self.expect_char('@', "before policy")?;

        let policy_start = self.offset;
        let policy_text = self.take_while(|c| c.is_ascii_alphanumeric());
        let action = match policy_text {
            "0" => PolicyAction::Wildcard,
            "REJECT" => PolicyAction::Reject,
            text => text
                .parse::<PolicyId>()
                .map(PolicyAction::Require)
                .map_err(|message| self.error(policy_start, message))?,
        };

        let scope = HopScope {
            isd,
            asn,
            ingress,
            egress,
        };

        Ok(Token {
            kind: TokenKind::Specifier(scope, action),
            offset: start,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(input: &str) -> Vec<TokenKind> {
        Lexer::new(input)
            .tokenize()
            .unwrap()
            .into_iter()
            .map(|t| t.kind)
            .collect()
    }

    #[test]
    fn test_specifier_is_one_token() {
        let tokens = kinds("1-ff00:0:110#2,3@L1000");
        assert_eq!(tokens.len(), 2);
        assert_eq!(
            tokens[0],
            TokenKind::Specifier(
                HopScope {
                    isd: 1,
                    asn: 0xff00_0000_0110,
                    ingress: 2,
                    egress: 3
                },
                PolicyAction::Require(PolicyId::Local(1000))
            )
        );
    }

    #[test]
    fn test_hash_after_specifier_is_separator() {
        let tokens = kinds("0-0#0,0@L1000#0-0#0,0@REJECT");
        assert_eq!(tokens.len(), 4);
        assert_eq!(tokens[1], TokenKind::Hash);
        assert!(matches!(tokens[2], TokenKind::Specifier(_, PolicyAction::Reject)));
    }

    #[test]
    fn test_conditional_punctuation() {
        let tokens = kinds("{ 1-0#0,0@0 ? 1-0#0,0@G5 : 1-0#0,0@0 }");
        assert_eq!(tokens[0], TokenKind::LeftBrace);
        assert_eq!(tokens[2], TokenKind::Question);
        assert_eq!(tokens[4], TokenKind::Colon);
        assert_eq!(tokens[6], TokenKind::RightBrace);
        assert_eq!(tokens[7], TokenKind::Eof);
    }

    #[test]
    fn test_errors_carry_offset() {
        let err = Lexer::new("0-0#0,0@X9").tokenize().unwrap_err();
        assert_eq!(err.offset, 8);

        let err = Lexer::new("0-0 #0,0@0").tokenize().unwrap_err();
        assert_eq!(err.offset, 3);

        let err = Lexer::new("0-0#0,0@0 & 1").tokenize().unwrap_err();
        assert_eq!(err.offset, 10);
    }
}
