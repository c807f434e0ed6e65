//! Recursive-descent parser for expressions.
//!
//! ```text
//! expr       = or
//! or         = and ('or' and)*
//! and        = not ('and' not)*
//! not        = 'not' not | comparison
//! comparison = additive (('=='|'!='|'<'|'<='|'>'|'>='|'in'|'not' 'in') additive)?
//! additive   = term (('+'|'-') term)*
//! term       = unary (('*'|'/'|'%') unary)*
//! unary      = '-' unary | power
//! power      = primary ('**' unary)?
//! primary    = literal | path | call | '(' expr ')'
//! path       = ident ('.' ident)*
//! call       = ident '(' (expr (',' expr)*)? ')'
//! ```

use serde_json::Value;

use crate::ast::{BinaryOp, Expr, UnaryOp};
use crate::error::{GateError, GateResult};
use crate::tokenizer::{Spanned, Token};

/// A token-stream parser.
struct Parser {
    tokens: Vec<Spanned>,
    pos: usize,
    depth: usize,
    max_depth: usize,
    end: usize,
}

/// Parse a full token stream into a single expression.
pub fn parse(tokens: Vec<Spanned>, max_depth: usize) -> GateResult<Expr> {
    let end = tokens.last().map_or(0, |t| t.pos + 1);
    let mut parser = Parser {
        tokens,
        pos: 0,
        depth: 0,
        max_depth,
        end,
    };
    let expr = parser.expr()?;
    match parser.peek() {
        None => Ok(expr),
        Some(token) => Err(GateError::parse(parser.offset(), format!("unexpected {token}"))),
    }
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos).map(|s| &s.token)
    }

    fn offset(&self) -> usize {
        self.tokens.get(self.pos).map_or(self.end, |s| s.pos)
    }

    fn advance(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).map(|s| s.token.clone());
        if token.is_some() {
            self.pos += 1;
        }
        token
    }

    fn eat(&mut self, token: &Token) -> bool {
        if self.peek() == Some(token) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn expect(&mut self, token: Token) -> GateResult<()> {
        if self.eat(&token) {
            return Ok(());
        }
        let found = self.peek().map_or("end of input".to_string(), |t| t.to_string());
        Err(GateError::parse(self.offset(), format!("expected {token}, found {found}")))
    }

    fn descend(&mut self) -> GateResult<()> {
        self.depth += 1;
        if self.depth > self.max_depth {
            return Err(GateError::TooComplex(format!("nesting deeper than {}", self.max_depth)));
        }
        Ok(())
    }

    fn expr(&mut self) -> GateResult<Expr> {
        self.descend()?;
        let expr = self.or();
        self.depth -= 1;
        expr
    }

    fn or(&mut self) -> GateResult<Expr> {
        let mut lhs = self.and()?;
        while self.eat(&Token::Or) {
            let rhs = self.and()?;
            lhs = Expr::Binary(BinaryOp::Or, Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn and(&mut self) -> GateResult<Expr> {
        let mut lhs = self.not()?;
        while self.eat(&Token::And) {
            let rhs = self.not()?;
            lhs = Expr::Binary(BinaryOp::And, Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn not(&mut self) -> GateResult<Expr> {
        if self.eat(&Token::Not) {
            self.descend()?;
            let inner = self.not();
            self.depth -= 1;
            return Ok(Expr::Unary(UnaryOp::Not, Box::new(inner?)));
        }
        self.comparison()
    }

    fn comparison(&mut self) -> GateResult<Expr> {
        let lhs = self.additive()?;
        let op = match self.peek() {
            Some(Token::Eq) => BinaryOp::Eq,
            Some(Token::Ne) => BinaryOp::Ne,
            Some(Token::Lt) => BinaryOp::Lt,
            Some(Token::Le) => BinaryOp::Le,
            Some(Token::Gt) => BinaryOp::Gt,
            Some(Token::Ge) => BinaryOp::Ge,
            Some(Token::In) => BinaryOp::In,
            Some(Token::Not)
                if self.tokens.get(self.pos + 1).map(|s| &s.token) == Some(&Token::In) =>
            {
                self.pos += 2;
                let rhs = self.additive()?;
                let contains = Expr::Binary(BinaryOp::In, Box::new(lhs), Box::new(rhs));
                return Ok(Expr::Unary(UnaryOp::Not, Box::new(contains)));
            }
            _ => return Ok(lhs),
        };
        self.pos += 1;
        let rhs = self.additive()?;
        Ok(Expr::Binary(op, Box::new(lhs), Box::new(rhs)))
    }

    fn additive(&mut self) -> GateResult<Expr> {
        let mut lhs = self.term()?;
        loop {
            let op = match self.peek() {
                Some(Token::Plus) => BinaryOp::Add,
                Some(Token::Minus) => BinaryOp::Sub,
                _ => return Ok(lhs),
            };
            self.pos += 1;
            let rhs = self.term()?;
            lhs = Expr::Binary(op, Box::new(lhs), Box::new(rhs));
        }
    }

    fn term(&mut self) -> GateResult<Expr> {
        let mut lhs = self.unary()?;
        loop {
            let op = match self.peek() {
                Some(Token::Star) => BinaryOp::Mul,
                Some(Token::Slash) => BinaryOp::Div,
                Some(Token::Percent) => BinaryOp::Rem,
                _ => return Ok(lhs),
            };
            self.pos += 1;
            let rhs = self.unary()?;
            lhs = Expr::Binary(op, Box::new(lhs), Box::new(rhs));
        }
    }

    fn unary(&mut self) -> GateResult<Expr> {
        if self.eat(&Token::Minus) {
            self.descend()?;
            let inner = self.unary();
            self.depth -= 1;
            return Ok(Expr::Unary(UnaryOp::Neg, Box::new(inner?)));
        }
        self.power()
    }

    fn power(&mut self) -> GateResult<Expr> {
        let base = self.primary()?;
        if self.eat(&Token::StarStar) {
            // Right-associative, and binds tighter than a unary minus on its left.
            self.descend()?;
            let exponent = self.unary();
            self.depth -= 1;
            return Ok(Expr::Binary(BinaryOp::Pow, Box::new(base), Box::new(exponent?)));
        }
        Ok(base)
    }

    fn primary(&mut self) -> GateResult<Expr> {
        let offset = self.offset();
        match self.advance() {
            Some(Token::Int(n)) => Ok(Expr::Literal(Value::from(n))),
            Some(Token::Float(n)) => Ok(Expr::Literal(Value::from(n))),
            Some(Token::Str(s)) => Ok(Expr::Literal(Value::String(s))),
            Some(Token::True) => Ok(Expr::Literal(Value::Bool(true))),
            Some(Token::False) => Ok(Expr::Literal(Value::Bool(false))),
            Some(Token::Null) => Ok(Expr::Literal(Value::Null)),
            Some(Token::LParen) => {
                let inner = self.expr()?;
                self.expect(Token::RParen)?;
                Ok(inner)
            }
            Some(Token::Ident(name)) => {
                if self.eat(&Token::LParen) {
                    return self.call(name);
                }
                let mut path = vec![name];
                while self.eat(&Token::Dot) {
                    match self.advance() {
                        Some(Token::Ident(field)) => path.push(field),
                        _ => {
                            return Err(GateError::parse(
                                offset,
                                "expected a field name after '.'",
                            ))
                        }
                    }
                }
                Ok(Expr::Path(path))
            }
            Some(token) => Err(GateError::parse(offset, format!("unexpected {token}"))),
            None => Err(GateError::parse(offset, "unexpected end of input")),
        }
    }

    fn call(&mut self, name: String) -> GateResult<Expr> {
        let mut args = Vec::new();
        if !self.eat(&Token::RParen) {
            loop {
                args.push(self.expr()?);
                if self.eat(&Token::RParen) {
                    break;
                }
                self.expect(Token::Comma)?;
            }
        }
        Ok(Expr::Call(name, args))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tokenizer::tokenize;

    fn ast(source: &str) -> Expr {
        parse(tokenize(source).unwrap(), 64).unwrap()
    }

    fn lit(n: i64) -> Box<Expr> {
        Box::new(Expr::Literal(Value::from(n)))
    }

    #[test]
    fn precedence() {
        assert_eq!(
            ast("1 + 2 * 3"),
            Expr::Binary(
                BinaryOp::Add,
                lit(1),
                Box::new(Expr::Binary(BinaryOp::Mul, lit(2), lit(3)))
            )
        );
        assert_eq!(
            ast("-2 ** 2"),
            Expr::Unary(UnaryOp::Neg, Box::new(Expr::Binary(BinaryOp::Pow, lit(2), lit(2))))
        );
    }

    #[test]
    fn power_is_right_associative() {
        assert_eq!(
            ast("2 ** 3 ** 2"),
            Expr::Binary(
                BinaryOp::Pow,
                lit(2),
                Box::new(Expr::Binary(BinaryOp::Pow, lit(3), lit(2)))
            )
        );
    }

    #[test]
    fn paths_and_calls() {
        assert_eq!(ast("a.b.c"), Expr::Path(vec!["a".into(), "b".into(), "c".into()]));
        assert_eq!(
            ast("max(a, 2)"),
            Expr::Call(
                "max".into(),
                vec![Expr::Path(vec!["a".into()]), Expr::Literal(Value::from(2))]
            )
        );
        assert_eq!(ast("now()"), Expr::Call("now".into(), vec![]));
    }

    #[test]
    fn not_in() {
        assert!(matches!(ast("'x' not in tags"), Expr::Unary(UnaryOp::Not, _)));
    }

    #[test]
    fn rejects_trailing_and_missing_tokens() {
        assert!(matches!(parse(tokenize("1 2").unwrap(), 64), Err(GateError::Parse { .. })));
        assert!(matches!(parse(tokenize("(1").unwrap(), 64), Err(GateError::Parse { .. })));
        assert!(matches!(parse(tokenize("").unwrap(), 64), Err(GateError::Parse { .. })));
        assert!(matches!(parse(tokenize("a.").unwrap(), 64), Err(GateError::Parse { .. })));
    }

    #[test]
    fn depth_is_bounded() {
        let deep = format!("{}1{}", "(".repeat(100), ")".repeat(100));
        assert!(matches!(parse(tokenize(&deep).unwrap(), 64), Err(GateError::TooComplex(_))));
        let negs = format!("{}1", "-".repeat(100));
        assert!(matches!(parse(tokenize(&negs).unwrap(), 64), Err(GateError::TooComplex(_))));
    }
}
