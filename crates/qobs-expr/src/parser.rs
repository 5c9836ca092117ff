//! Recursive-descent parser for manifest expressions
//!
//! Precedence, loosest to tightest: `||`, `&&`, comparisons, `+ -`,
//! `* /`, unary `! -`, then calls / indexing / member access.

use crate::ast::{BinaryOp, Expr, UnaryOp};
use crate::error::{ExprError, ExprResult};
use crate::token::{Token, TokenKind};

/// Parser over a token stream
pub struct Parser {
    tokens: Vec<Token>,
    current: usize,
}

impl Parser {
    /// Create a parser for a token stream produced by the lexer
    pub fn new(tokens: Vec<Token>) -> Self {
        Self { tokens, current: 0 }
    }

    /// Parse a single expression; trailing tokens are an error
    pub fn parse(mut self) -> ExprResult<Expr> {
        let expr = self.or_expr()?;
        let trailing = self.peek();
        if trailing.kind != TokenKind::Eof {
            return Err(ExprError::syntax(
                trailing.offset,
                format!("unexpected `{}` after expression", trailing.lexeme),
            ));
        }
        Ok(expr)
    }

    fn or_expr(&mut self) -> ExprResult<Expr> {
        let mut lhs = self.and_expr()?;
        while self.match_kind(TokenKind::PipePipe) {
            let rhs = self.and_expr()?;
            lhs = Expr::Binary {
                op: BinaryOp::Or,
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
            };
        }
        Ok(lhs)
    }

    fn and_expr(&mut self) -> ExprResult<Expr> {
        let mut lhs = self.comparison()?;
        while self.match_kind(TokenKind::AmpAmp) {
            let rhs = self.comparison()?;
            lhs = Expr::Binary {
                op: BinaryOp::And,
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
            };
        }
        Ok(lhs)
    }

    fn comparison(&mut self) -> ExprResult<Expr> {
        let lhs = self.additive()?;

        let op = match self.peek().kind {
            TokenKind::EqEq => BinaryOp::Eq,
            TokenKind::BangEq => BinaryOp::Ne,
            TokenKind::Less => BinaryOp::Lt,
            TokenKind::LessEq => BinaryOp::Le,
            TokenKind::Greater => BinaryOp::Gt,
            TokenKind::GreaterEq => BinaryOp::Ge,
            _ => return Ok(lhs),
        };
        self.advance();

        let rhs = self.additive()?;
        Ok(Expr::Binary {
            op,
            lhs: Box::new(lhs),
            rhs: Box::new(rhs),
        })
    }

    fn additive(&mut self) -> ExprResult<Expr> {
        let mut lhs = self.multiplicative()?;
        loop {
            let op = match self.peek().kind {
                TokenKind::Plus => BinaryOp::Add,
                TokenKind::Minus => BinaryOp::Sub,
                _ => return Ok(lhs),
            };
            self.advance();
            let rhs = self.multiplicative()?;
            lhs = Expr::Binary {
                op,
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
            };
        }
    }

    fn multiplicative(&mut self) -> ExprResult<Expr> {
        let mut lhs = self.unary()?;
        loop {
            let op = match self.peek().kind {
                TokenKind::Star => BinaryOp::Mul,
                TokenKind::Slash => BinaryOp::Div,
                _ => return Ok(lhs),
            };
            self.advance();
            let rhs = self.unary()?;
            lhs = Expr::Binary {
                op,
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
            };
        }
    }

    fn unary(&mut self) -> ExprResult<Expr> {
        let op = match self.peek().kind {
            TokenKind::Bang => UnaryOp::Not,
            TokenKind::Minus => UnaryOp::Neg,
            _ => return self.postfix(),
        };
        self.advance();
        let operand = self.unary()?;
        Ok(Expr::Unary {
            op,
            operand: Box::new(operand),
        })
    }

    /// Postfix forms: indexing and member access chained onto a primary
    fn postfix(&mut self) -> ExprResult<Expr> {
        let mut expr = self.primary()?;
        loop {
            if self.match_kind(TokenKind::LeftBracket) {
                let index = self.or_expr()?;
                self.expect(TokenKind::RightBracket)?;
                expr = Expr::Index {
                    base: Box::new(expr),
                    index: Box::new(index),
                };
            } else if self.match_kind(TokenKind::Dot) {
                let name = self.expect(TokenKind::Ident)?;
                expr = Expr::Member {
                    base: Box::new(expr),
                    name: name.lexeme,
                };
            } else {
                return Ok(expr);
            }
        }
    }

    fn primary(&mut self) -> ExprResult<Expr> {
        let token = self.advance();
        match token.kind {
            TokenKind::True => Ok(Expr::Bool(true)),
            TokenKind::False => Ok(Expr::Bool(false)),
            TokenKind::Str => Ok(Expr::Str(token.lexeme)),
            TokenKind::Int => token
                .lexeme
                .parse::<i64>()
                .map(Expr::Int)
                .map_err(|_| ExprError::syntax(token.offset, "integer literal out of range")),
            TokenKind::Ident => {
                // A name followed by `(` is a function call
                if self.match_kind(TokenKind::LeftParen) {
                    let args = self.call_args()?;
                    Ok(Expr::Call {
                        name: token.lexeme,
                        args,
                        offset: token.offset,
                    })
                } else {
                    Ok(Expr::Ident {
                        name: token.lexeme,
                        offset: token.offset,
                    })
                }
            }
            TokenKind::LeftParen => {
                let expr = self.or_expr()?;
                self.expect(TokenKind::RightParen)?;
                Ok(expr)
            }
            _ => Err(ExprError::syntax(
                token.offset,
                format!("expected expression, found `{}`", token.kind.as_str()),
            )),
        }
    }

    fn call_args(&mut self) -> ExprResult<Vec<Expr>> {
        let mut args = Vec::new();
        if self.peek().kind != TokenKind::RightParen {
            loop {
                args.push(self.or_expr()?);
                if !self.match_kind(TokenKind::Comma) {
                    break;
                }
            }
        }
        self.expect(TokenKind::RightParen)?;
        Ok(args)
    }

    fn peek(&self) -> &Token {
        &self.tokens[self.current]
    }

    fn advance(&mut self) -> Token {
        let token = self.tokens[self.current].clone();
        if self.current < self.tokens.len() - 1 {
            self.current += 1;
        }
        token
    }

    fn match_kind(&mut self, kind: TokenKind) -> bool {
        if self.peek().kind == kind {
            self.advance();
            true
        } else {
            false
        }
    }

    fn expect(&mut self, kind: TokenKind) -> ExprResult<Token> {
        let token = self.peek().clone();
        if token.kind == kind {
            self.advance();
            Ok(token)
        } else {
            Err(ExprError::syntax(
                token.offset,
                format!(
                    "expected `{}`, found `{}`",
                    kind.as_str(),
                    token.kind.as_str()
                ),
            ))
        }
    }
}
