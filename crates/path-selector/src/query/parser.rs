//! Recursive-descent parser for FABRID policy queries
//!
//! ```text
//! query       := alternation EOF
//! alternation := sequence ( '+' sequence )*
//! sequence    := primary ( '#' primary )*
//! primary     := specifier
//!              | '{' alternation '?' alternation ':' alternation '}'
//!              | '(' alternation ')'
//! ```

use super::lexer::{Lexer, Token, TokenKind};
use super::{PolicyAction, PolicyQuery, QuerySyntaxError};

/// Deepest allowed nesting of `{..}` and `(..)` groups
pub const MAX_NESTING: usize = 64;

/// Parse query text into an AST
pub fn parse(input: &str) -> Result<PolicyQuery, QuerySyntaxError> {
    let tokens = Lexer::new(input).tokenize()?;
    let mut parser = Parser {
        tokens,
        position: 0,
        depth: 0,
    };

    let query = parser.parse_alternation()?;
    parser.expect(TokenKind::Eof)?;

    Ok(query)
}

struct Parser {
    tokens: Vec<Token>,
    position: usize,
    depth: usize,
}

impl Parser {
    fn peek(&self) -> &Token {
        // The lexer always terminates the stream with Eof
        &self.tokens[self.position.min(self.tokens.len() - 1)]
    }

    fn advance(&mut self) -> Token {
        let token = self.peek().clone();
        if token.kind != TokenKind::Eof {
            self.position += 1;
        }
        token
    }

    fn eat(&mut self, kind: &TokenKind) -> bool {
        if &self.peek().kind == kind {
            self.advance();
            true
        } else {
            false
        }
    }

    fn expect(&mut self, kind: TokenKind) -> Result<(), QuerySyntaxError> {
        let token = self.peek();
        if token.kind == kind {
            self.advance();
            Ok(())
        } else {
            Err(QuerySyntaxError::new(
                format!("expected {}, found {}", kind, token.kind),
                token.offset,
            ))
        }
    }

    fn enter_group(&mut self, offset: usize) -> Result<(), QuerySyntaxError> {
        if self.depth >= MAX_NESTING {
            return Err(QuerySyntaxError::new("query nested too deeply", offset));
        }
        self.depth += 1;
        Ok(())
    }

    fn parse_alternation(&mut self) -> Result<PolicyQuery, QuerySyntaxError> {
        let mut branches = vec![self.parse_sequence()?];
        while self.eat(&TokenKind::Plus) {
            branches.push(self.parse_sequence()?);
        }

        Ok(if branches.len() == 1 {
            branches.remove(0)
        } else {
            PolicyQuery::Alternation(branches)
        })
    }

    fn parse_sequence(&mut self) -> Result<PolicyQuery, QuerySyntaxError> {
        let mut steps = vec![self.parse_primary()?];
        while self.eat(&TokenKind::Hash) {
            steps.push(self.parse_primary()?);
        }

        Ok(if steps.len() == 1 {
            steps.remove(0)
        } else {
            PolicyQuery::Sequence(steps)
        })
    }

    fn parse_primary(&mut self) -> Result<PolicyQuery, QuerySyntaxError> {
        let token = self.advance();
        match token.kind {
            TokenKind::Specifier(scope, action) => Ok(match action {
                PolicyAction::Require(policy) => PolicyQuery::Literal { scope, policy },
                PolicyAction::Wildcard => PolicyQuery::Wildcard { scope },
                PolicyAction::Reject => PolicyQuery::Reject { scope },
            }),
            TokenKind::LeftBrace => {
                self.enter_group(token.offset)?;
                let test = self.parse_alternation()?;
                self.expect(TokenKind::Question)?;
                let then = self.parse_alternation()?;
                self.expect(TokenKind::Colon)?;
                let otherwise = self.parse_alternation()?;
                self.expect(TokenKind::RightBrace)?;
                self.depth -= 1;
                Ok(PolicyQuery::Conditional {
                    test: Box::new(test),
                    then: Box::new(then),
                    otherwise: Box::new(otherwise),
                })
            }
            TokenKind::LeftParen => {
                self.enter_group(token.offset)?;
                let inner = self.parse_alternation()?;
                self.expect(TokenKind::RightParen)?;
                self.depth -= 1;
                Ok(inner)
            }
            other => Err(QuerySyntaxError::new(
                format!("expected hop specifier, '{{' or '(', found {}", other),
                token.offset,
            )),
        }
    }
}
