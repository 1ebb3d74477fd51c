//! Recursive-descent parser, lowest precedence first:
//! `||`, `&&`, equality, comparison, additive, multiplicative, unary,
//! postfix (member, index, call).

use serde_json::Value;

use super::lexer::Token;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum UnaryOp {
    Not,
    Neg,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Rem,
    Eq,
    NotEq,
    Lt,
    LtEq,
    Gt,
    GtEq,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum Function {
    StartsWith,
    EndsWith,
    Includes,
    Lower,
    Upper,
    Len,
}

impl Function {
    fn from_name(name: &str) -> Option<Self> {
        Some(match name {
            "startsWith" => Function::StartsWith,
            "endsWith" => Function::EndsWith,
            "includes" => Function::Includes,
            "lower" | "toLowerCase" => Function::Lower,
            "upper" | "toUpperCase" => Function::Upper,
            "len" | "length" => Function::Len,
            _ => return None,
        })
    }

    pub(crate) fn arity(self) -> usize {
        match self {
            Function::StartsWith | Function::EndsWith | Function::Includes => 2,
            Function::Lower | Function::Upper | Function::Len => 1,
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub(crate) enum Expr {
    Literal(Value),
    Ident(String),
    Member(Box<Expr>, String),
    Index(Box<Expr>, Box<Expr>),
    Call(Function, Vec<Expr>),
    Unary(UnaryOp, Box<Expr>),
    Binary(BinaryOp, Box<Expr>, Box<Expr>),
    And(Box<Expr>, Box<Expr>),
    Or(Box<Expr>, Box<Expr>),
}

/// Longest accepted expression, in tokens. Bounds the depth of operator
/// chains, which build trees without recursing in the parser.
const MAX_TOKENS: usize = 1024;

/// Deepest accepted nesting of parentheses, brackets, calls and prefix
/// operators.
const MAX_DEPTH: usize = 64;

pub(crate) fn parse(tokens: Vec<Token>) -> Result<Expr, String> {
    if tokens.is_empty() {
        return Err("empty expression".into());
    }
    if tokens.len() > MAX_TOKENS {
        return Err(format!("expression longer than {MAX_TOKENS} tokens"));
    }
    let mut parser = Parser {
        tokens,
        pos: 0,
        depth: 0,
    };
    let expr = parser.or()?;
    match parser.peek() {
        None => Ok(expr),
        Some(token) => Err(format!("unexpected {token:?} after expression")),
    }
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
    depth: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn next(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).cloned();
        self.pos += 1;
        token
    }

    fn eat(&mut self, expected: &Token) -> bool {
        if self.peek() == Some(expected) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn expect(&mut self, expected: &Token) -> Result<(), String> {
        if self.eat(expected) {
            Ok(())
        } else {
            Err(format!("expected {expected:?}, found {:?}", self.peek()))
        }
    }

    fn nested(&mut self, rule: impl FnOnce(&mut Self) -> Result<Expr, String>) -> Result<Expr, String> {
        if self.depth >= MAX_DEPTH {
            return Err(format!("expression nested deeper than {MAX_DEPTH} levels"));
        }
        self.depth += 1;
        let result = rule(self);
        self.depth -= 1;
        result
    }

    fn or(&mut self) -> Result<Expr, String> {
        self.nested(Self::or_chain)
    }

    fn or_chain(&mut self) -> Result<Expr, String> {
        let mut left = self.and()?;
        while self.eat(&Token::Or) {
            left = Expr::Or(Box::new(left), Box::new(self.and()?));
        }
        Ok(left)
    }

    fn and(&mut self) -> Result<Expr, String> {
        let mut left = self.equality()?;
        while self.eat(&Token::And) {
            left = Expr::And(Box::new(left), Box::new(self.equality()?));
        }
        Ok(left)
    }

    fn equality(&mut self) -> Result<Expr, String> {
        self.binary_level(Self::comparison, |t| match t {
            Token::Eq => Some(BinaryOp::Eq),
            Token::NotEq => Some(BinaryOp::NotEq),
            _ => None,
        })
    }

    fn comparison(&mut self) -> Result<Expr, String> {
        self.binary_level(Self::additive, |t| match t {
            Token::Lt => Some(BinaryOp::Lt),
            Token::LtEq => Some(BinaryOp::LtEq),
            Token::Gt => Some(BinaryOp::Gt),
            Token::GtEq => Some(BinaryOp::GtEq),
            _ => None,
        })
    }

    fn additive(&mut self) -> Result<Expr, String> {
        self.binary_level(Self::multiplicative, |t| match t {
            Token::Plus => Some(BinaryOp::Add),
            Token::Minus => Some(BinaryOp::Sub),
            _ => None,
        })
    }

    fn multiplicative(&mut self) -> Result<Expr, String> {
        self.binary_level(Self::unary, |t| match t {
            Token::Star => Some(BinaryOp::Mul),
            Token::Slash => Some(BinaryOp::Div),
            Token::Percent => Some(BinaryOp::Rem),
            _ => None,
        })
    }

    fn binary_level(
        &mut self,
        operand: fn(&mut Self) -> Result<Expr, String>,
        operator: fn(&Token) -> Option<BinaryOp>,
    ) -> Result<Expr, String> {
        let mut left = operand(self)?;
        while let Some(op) = self.peek().and_then(operator) {
            self.pos += 1;
            let right = operand(self)?;
            left = Expr::Binary(op, Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn unary(&mut self) -> Result<Expr, String> {
        if self.eat(&Token::Bang) {
            return self.nested(|p| Ok(Expr::Unary(UnaryOp::Not, Box::new(p.unary()?))));
        }
        if self.eat(&Token::Minus) {
            return self.nested(|p| Ok(Expr::Unary(UnaryOp::Neg, Box::new(p.unary()?))));
        }
        self.postfix()
    }

    fn postfix(&mut self) -> Result<Expr, String> {
        let mut expr = self.primary()?;
        loop {
            if self.eat(&Token::Dot) {
                let name = match self.next() {
                    Some(Token::Ident(name)) => name,
                    other => return Err(format!("expected field name after '.', found {other:?}")),
                };
                if self.peek() == Some(&Token::LParen) {
                    // `x.startsWith(y)` is `startsWith(x, y)`.
                    let function = Function::from_name(&name)
                        .ok_or_else(|| format!("unknown function {name:?}"))?;
                    let mut args = vec![expr];
                    args.extend(self.arguments()?);
                    expr = call(function, args)?;
                } else if name == "length" {
                    expr = Expr::Call(Function::Len, vec![expr]);
                } else {
                    expr = Expr::Member(Box::new(expr), name);
                }
            } else if self.eat(&Token::LBracket) {
                let index = self.or()?;
                self.expect(&Token::RBracket)?;
                expr = Expr::Index(Box::new(expr), Box::new(index));
            } else {
                return Ok(expr);
            }
        }
    }

    fn primary(&mut self) -> Result<Expr, String> {
        match self.next() {
            Some(Token::Number(n)) => Ok(Expr::Literal(super::eval::number(n).map_err(|e| e.to_string())?)),
            Some(Token::Str(s)) => Ok(Expr::Literal(Value::String(s))),
            Some(Token::Ident(name)) => match name.as_str() {
                "true" => Ok(Expr::Literal(Value::Bool(true))),
                "false" => Ok(Expr::Literal(Value::Bool(false))),
                "null" | "undefined" => Ok(Expr::Literal(Value::Null)),
                _ if self.peek() == Some(&Token::LParen) => {
                    let function = Function::from_name(&name)
                        .ok_or_else(|| format!("unknown function {name:?}"))?;
                    let args = self.arguments()?;
                    call(function, args)
                }
                _ => Ok(Expr::Ident(name)),
            },
            Some(Token::LParen) => {
                let inner = self.or()?;
                self.expect(&Token::RParen)?;
                Ok(inner)
            }
            other => Err(format!("unexpected {other:?}")),
        }
    }

    fn arguments(&mut self) -> Result<Vec<Expr>, String> {
        self.expect(&Token::LParen)?;
        let mut args = Vec::new();
        if self.eat(&Token::RParen) {
            return Ok(args);
        }
        loop {
            args.push(self.or()?);
            if self.eat(&Token::RParen) {
                return Ok(args);
            }
            self.expect(&Token::Comma)?;
        }
    }
}

fn call(function: Function, args: Vec<Expr>) -> Result<Expr, String> {
    if args.len() != function.arity() {
        return Err(format!(
            "{function:?} takes {} argument(s), got {}",
            function.arity(),
            args.len()
        ));
    }
    Ok(Expr::Call(function, args))
}
