//! Recursive-descent parser, one function per precedence level.
//!
//! ```text
//! comparison     → additive (cmp_op additive)?
//! additive       → multiplicative (('+' | '-') multiplicative)*
//! multiplicative → power (('*' | '/') power)*
//! power          → unary ('^' power)?
//! unary          → ('-' | '+') unary | atom
//! atom           → number | string | '(' comparison ')'
//!                | namespace? identifier offset?
//!                | identifier '(' (comparison (',' comparison)*)? ')'
//! offset         → '[' 't' (('+' | '-') integer)? ']'
//! ```

use super::ast::{BinaryOp, Expr, Namespace, Reference, UnaryOp};
use super::lexer::{tokenize, Token, TokenKind};
use super::ParseError;

pub fn parse(formula: &str) -> Result<Expr, ParseError> {
    let tokens = tokenize(formula)?;
    if tokens.is_empty() {
        return Err(ParseError::new("empty formula", 0));
    }
    let mut parser = Parser { tokens: &tokens, pos: 0, end: formula.len() };
    let expr = parser.comparison()?;
    if let Some(tok) = parser.peek() {
        return Err(ParseError::new("unexpected trailing input", tok.pos));
    }
    Ok(expr)
}

struct Parser<'t> {
    tokens: &'t [Token],
    pos: usize,
    end: usize,
}

impl<'t> Parser<'t> {
    fn peek(&self) -> Option<&'t Token> {
        self.tokens.get(self.pos)
    }

    fn peek_kind(&self) -> Option<&'t TokenKind> {
        self.peek().map(|t| &t.kind)
    }

    fn here(&self) -> usize {
        self.peek().map_or(self.end, |t| t.pos)
    }

    fn bump(&mut self) -> Option<&'t Token> {
        let tok = self.tokens.get(self.pos);
        if tok.is_some() {
            self.pos += 1;
        }
        tok
    }

    fn eat(&mut self, kind: &TokenKind) -> bool {
        if self.peek_kind() == Some(kind) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn expect(&mut self, kind: &TokenKind, what: &str) -> Result<(), ParseError> {
        if self.eat(kind) {
            Ok(())
        } else {
            Err(ParseError::new(format!("expected {}", what), self.here()))
        }
    }

    fn comparison(&mut self) -> Result<Expr, ParseError> {
        let lhs = self.additive()?;
        let op = match self.peek_kind() {
            Some(TokenKind::Lt) => BinaryOp::Lt,
            Some(TokenKind::Le) => BinaryOp::Le,
            Some(TokenKind::Gt) => BinaryOp::Gt,
            Some(TokenKind::Ge) => BinaryOp::Ge,
            Some(TokenKind::Eq) => BinaryOp::Eq,
            Some(TokenKind::Ne) => BinaryOp::Ne,
            _ => return Ok(lhs),
        };
        self.pos += 1;
        let rhs = self.additive()?;
        Ok(binary(op, lhs, rhs))
    }

    fn additive(&mut self) -> Result<Expr, ParseError> {
        let mut lhs = self.multiplicative()?;
        loop {
            let op = match self.peek_kind() {
                Some(TokenKind::Plus) => BinaryOp::Add,
                Some(TokenKind::Minus) => BinaryOp::Sub,
                _ => return Ok(lhs),
            };
            self.pos += 1;
            let rhs = self.multiplicative()?;
            lhs = binary(op, lhs, rhs);
        }
    }

    fn multiplicative(&mut self) -> Result<Expr, ParseError> {
        let mut lhs = self.power()?;
        loop {
            let op = match self.peek_kind() {
                Some(TokenKind::Star) => BinaryOp::Mul,
                Some(TokenKind::Slash) => BinaryOp::Div,
                _ => return Ok(lhs),
            };
            self.pos += 1;
            let rhs = self.power()?;
            lhs = binary(op, lhs, rhs);
        }
    }

    fn power(&mut self) -> Result<Expr, ParseError> {
        let base = self.unary()?;
        if self.eat(&TokenKind::Caret) {
            let exponent = self.power()?;
            return Ok(binary(BinaryOp::Pow, base, exponent));
        }
        Ok(base)
    }

    fn unary(&mut self) -> Result<Expr, ParseError> {
        let op = match self.peek_kind() {
            Some(TokenKind::Minus) => UnaryOp::Neg,
            Some(TokenKind::Plus) => UnaryOp::Plus,
            _ => return self.atom(),
        };
        self.pos += 1;
        let operand = self.unary()?;
        Ok(Expr::Unary { op, operand: Box::new(operand) })
    }

    fn atom(&mut self) -> Result<Expr, ParseError> {
        let at = self.here();
        let Some(tok) = self.bump() else {
            return Err(ParseError::new("unexpected end of formula", at));
        };
        match &tok.kind {
            TokenKind::Number(n) => Ok(Expr::Number(*n)),
            TokenKind::Text(s) => Ok(Expr::Text(s.clone())),
            TokenKind::LParen => {
                let inner = self.comparison()?;
                self.expect(&TokenKind::RParen, "')'")?;
                Ok(inner)
            }
            TokenKind::Namespace(prefix) => {
                let at = self.here();
                let code = match self.bump() {
                    Some(Token { kind: TokenKind::Ident(code), .. }) => code.clone(),
                    _ => {
                        return Err(ParseError::new(
                            format!("expected identifier after '{}:'", prefix),
                            at,
                        ))
                    }
                };
                let offset = self.offset()?;
                Ok(Expr::Reference(Reference {
                    namespace: Some(Namespace::from_prefix(prefix)),
                    code,
                    offset,
                }))
            }
            TokenKind::Ident(name) => {
                if self.eat(&TokenKind::LParen) {
                    let args = self.arguments()?;
                    return Ok(Expr::Call { name: name.clone(), args });
                }
                let offset = self.offset()?;
                Ok(Expr::Reference(Reference { namespace: None, code: name.clone(), offset }))
            }
            _ => Err(ParseError::new("unexpected token", tok.pos)),
        }
    }

    /// Arguments after the opening parenthesis, through the closing one.
    fn arguments(&mut self) -> Result<Vec<Expr>, ParseError> {
        let mut args = Vec::new();
        if self.eat(&TokenKind::RParen) {
            return Ok(args);
        }
        loop {
            args.push(self.comparison()?);
            if self.eat(&TokenKind::Comma) {
                continue;
            }
            self.expect(&TokenKind::RParen, "',' or ')' in argument list")?;
            return Ok(args);
        }
    }

    fn offset(&mut self) -> Result<i32, ParseError> {
        if !self.eat(&TokenKind::LBracket) {
            return Ok(0);
        }
        let at = self.here();
        match self.bump() {
            Some(Token { kind: TokenKind::Ident(t), .. }) if t.eq_ignore_ascii_case("t") => {}
            _ => return Err(ParseError::new("time reference must start with 't'", at)),
        }
        let sign = match self.peek_kind() {
            Some(TokenKind::Minus) => -1,
            Some(TokenKind::Plus) => 1,
            _ => {
                self.expect(&TokenKind::RBracket, "']' to close time reference")?;
                return Ok(0);
            }
        };
        self.pos += 1;
        let at = self.here();
        let magnitude = match self.bump() {
            Some(Token { kind: TokenKind::Number(n), .. })
                if n.fract() == 0.0 && *n <= i32::MAX as f64 =>
            {
                *n as i32
            }
            _ => return Err(ParseError::new("expected integer offset in time reference", at)),
        };
        self.expect(&TokenKind::RBracket, "']' to close time reference")?;
        Ok(sign * magnitude)
    }
}

fn binary(op: BinaryOp, lhs: Expr, rhs: Expr) -> Expr {
    Expr::Binary { op, lhs: Box::new(lhs), rhs: Box::new(rhs) }
}
