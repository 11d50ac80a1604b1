//! Lexer and recursive-descent parser for layout expression strings.
//!
//! Grammar, loosest binding first:
//!
//! ```text
//! expr    := and ( "||" and )*
//! and     := cmp ( "&&" cmp )*
//! cmp     := sum ( ("<" | "<=" | ">" | ">=" | "==" | "!=") sum )*
//! sum     := product ( ("+" | "-") product )*
//! product := unary ( ("*" | "/" | "%") unary )*
//! unary   := ("-" | "!") unary | primary
//! primary := number | percent | "(" expr ")" | call | reference
//! call    := ("min" | "max") "(" expr "," expr ")"
//!          | "clamp" "(" expr "," expr "," expr ")"
//!          | "if" "(" expr "," expr "," expr ")"
//! ```
//!
//! References come in three shapes: a bare property (`width`) measures the
//! widget the expression is connected to, `parent.height` measures its
//! parent, and `&name.right` measures the registered source called `name`.
//! A percent literal is a number immediately followed by `%` with no
//! whitespace; `%` after whitespace is the modulus operator.

use std::fmt;

use crate::layout::engine::BinOp;

#[derive(Clone, Debug, PartialEq)]
pub(crate) enum Expr {
    Number(f64),
    /// Fraction of the parent span, so `"50%"` is `Percent(0.5)`.
    Percent(f64),
    Neg(Box<Expr>),
    Not(Box<Expr>),
    Binary {
        op: BinOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    Clamp(Box<Expr>, Box<Expr>, Box<Expr>),
    If(Box<Expr>, Box<Expr>, Box<Expr>),
    Ref {
        target: RefTarget,
        prop: PropertyRef,
    },
}

#[derive(Clone, Debug, PartialEq)]
pub(crate) enum RefTarget {
    Owner,
    Parent,
    Named(String),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum PropertyRef {
    Left,
    Top,
    Width,
    Height,
    Right,
    Bottom,
}

#[derive(Debug)]
pub(crate) struct ParseError {
    msg: String,
    pos: usize,
}

impl ParseError {
    fn new(msg: impl Into<String>, pos: usize) -> Self {
        Self {
            msg: msg.into(),
            pos,
        }
    }
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} at offset {}", self.msg, self.pos)
    }
}

impl std::error::Error for ParseError {}

#[derive(Clone, Debug, PartialEq)]
enum Tok {
    Number(f64),
    Percent(f64),
    Ident(String),
    Plus,
    Minus,
    Star,
    Slash,
    Modulo,
    Bang,
    Lt,
    Le,
    Gt,
    Ge,
    EqEq,
    Ne,
    AndAnd,
    OrOr,
    Amp,
    Dot,
    Comma,
    LParen,
    RParen,
}

struct Token {
    tok: Tok,
    pos: usize,
}

fn lex(src: &str) -> Result<Vec<Token>, ParseError> {
    let bytes = src.as_bytes();
    let mut out = Vec::new();
    let mut i = 0;
    while i < bytes.len() {
        let start = i;
        let b = bytes[i];
        match b {
            b' ' | b'\t' | b'\r' | b'\n' => {
                i += 1;
            }
            b'0'..=b'9' | b'.' if b != b'.' || matches!(bytes.get(i + 1), Some(b'0'..=b'9')) => {
                let mut end = i;
                let mut seen_dot = false;
                while end < bytes.len() {
                    match bytes[end] {
                        b'0'..=b'9' => end += 1,
                        b'.' if !seen_dot => {
                            seen_dot = true;
                            end += 1;
                        }
                        _ => break,
                    }
                }
                let text = &src[i..end];
                let value: f64 = text
                    .parse()
                    .map_err(|_| ParseError::new(format!("invalid number '{text}'"), i))?;
                i = end;
                // '%' glued to the number is a percent literal, not modulus.
                if bytes.get(i) == Some(&b'%') {
                    i += 1;
                    out.push(Token {
                        tok: Tok::Percent(value / 100.0),
                        pos: start,
                    });
                } else {
                    out.push(Token {
                        tok: Tok::Number(value),
                        pos: start,
                    });
                }
            }
            b'a'..=b'z' | b'A'..=b'Z' | b'_' => {
                let mut end = i;
                while end < bytes.len()
                    && matches!(bytes[end], b'a'..=b'z' | b'A'..=b'Z' | b'0'..=b'9' | b'_')
                {
                    end += 1;
                }
                out.push(Token {
                    tok: Tok::Ident(src[i..end].to_owned()),
                    pos: start,
                });
                i = end;
            }
            b'+' => {
                out.push(Token {
                    tok: Tok::Plus,
                    pos: start,
                });
                i += 1;
            }
            b'-' => {
                out.push(Token {
                    tok: Tok::Minus,
                    pos: start,
                });
                i += 1;
            }
            b'*' => {
                out.push(Token {
                    tok: Tok::Star,
                    pos: start,
                });
                i += 1;
            }
            b'/' => {
                out.push(Token {
                    tok: Tok::Slash,
                    pos: start,
                });
                i += 1;
            }
            b'%' => {
                out.push(Token {
                    tok: Tok::Modulo,
                    pos: start,
                });
                i += 1;
            }
            b'.' => {
                out.push(Token {
                    tok: Tok::Dot,
                    pos: start,
                });
                i += 1;
            }
            b',' => {
                out.push(Token {
                    tok: Tok::Comma,
                    pos: start,
                });
                i += 1;
            }
            b'(' => {
                out.push(Token {
                    tok: Tok::LParen,
                    pos: start,
                });
                i += 1;
            }
            b')' => {
                out.push(Token {
                    tok: Tok::RParen,
                    pos: start,
                });
                i += 1;
            }
            b'<' => {
                if bytes.get(i + 1) == Some(&b'=') {
                    out.push(Token {
                        tok: Tok::Le,
                        pos: start,
                    });
                    i += 2;
                } else {
                    out.push(Token {
                        tok: Tok::Lt,
                        pos: start,
                    });
                    i += 1;
                }
            }
            b'>' => {
                if bytes.get(i + 1) == Some(&b'=') {
                    out.push(Token {
                        tok: Tok::Ge,
                        pos: start,
                    });
                    i += 2;
                } else {
                    out.push(Token {
                        tok: Tok::Gt,
                        pos: start,
                    });
                    i += 1;
                }
            }
            b'=' => {
                if bytes.get(i + 1) == Some(&b'=') {
                    out.push(Token {
                        tok: Tok::EqEq,
                        pos: start,
                    });
                    i += 2;
                } else {
                    return Err(ParseError::new("expected '==' (single '=' is not assignment)", i));
                }
            }
            b'!' => {
                if bytes.get(i + 1) == Some(&b'=') {
                    out.push(Token {
                        tok: Tok::Ne,
                        pos: start,
                    });
                    i += 2;
                } else {
                    out.push(Token {
                        tok: Tok::Bang,
                        pos: start,
                    });
                    i += 1;
                }
            }
            b'&' => {
                if bytes.get(i + 1) == Some(&b'&') {
                    out.push(Token {
                        tok: Tok::AndAnd,
                        pos: start,
                    });
                    i += 2;
                } else {
                    out.push(Token {
                        tok: Tok::Amp,
                        pos: start,
                    });
                    i += 1;
                }
            }
            b'|' => {
                if bytes.get(i + 1) == Some(&b'|') {
                    out.push(Token {
                        tok: Tok::OrOr,
                        pos: start,
                    });
                    i += 2;
                } else {
                    return Err(ParseError::new("expected '||'", i));
                }
            }
            _ => {
                return Err(ParseError::new(
                    format!("unexpected character '{}'", &src[i..].chars().next().unwrap_or('?')),
                    i,
                ));
            }
        }
    }
    Ok(out)
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
    len: usize,
}

impl Parser {
    fn new(src: &str) -> Result<Self, ParseError> {
        let tokens = lex(src)?;
        let len = src.len();
        Ok(Self {
            tokens,
            pos: 0,
            len,
        })
    }

    fn peek(&self) -> Option<&Tok> {
        self.tokens.get(self.pos).map(|t| &t.tok)
    }

    fn here(&self) -> usize {
        self.tokens.get(self.pos).map_or(self.len, |t| t.pos)
    }

    fn bump(&mut self) -> Option<Tok> {
        let t = self.tokens.get(self.pos).map(|t| t.tok.clone());
        if t.is_some() {
            self.pos += 1;
        }
        t
    }

    fn eat(&mut self, tok: &Tok) -> bool {
        if self.peek() == Some(tok) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn expect(&mut self, tok: Tok, what: &str) -> Result<(), ParseError> {
        if self.eat(&tok) {
            Ok(())
        } else {
            Err(ParseError::new(format!("expected {what}"), self.here()))
        }
    }

    fn expr(&mut self) -> Result<Expr, ParseError> {
        let mut left = self.and()?;
        while self.eat(&Tok::OrOr) {
            let right = self.and()?;
            left = Expr::Binary {
                op: BinOp::Or,
                left: Box::new(left),
                right: Box::new(right),
            };
        }
        Ok(left)
    }

    fn and(&mut self) -> Result<Expr, ParseError> {
        let mut left = self.cmp()?;
        while self.eat(&Tok::AndAnd) {
            let right = self.cmp()?;
            left = Expr::Binary {
                op: BinOp::And,
                left: Box::new(left),
                right: Box::new(right),
            };
        }
        Ok(left)
    }

    fn cmp(&mut self) -> Result<Expr, ParseError> {
        let mut left = self.sum()?;
        loop {
            let op = match self.peek() {
                Some(Tok::Lt) => BinOp::Lt,
                Some(Tok::Le) => BinOp::Le,
                Some(Tok::Gt) => BinOp::Gt,
                Some(Tok::Ge) => BinOp::Ge,
                Some(Tok::EqEq) => BinOp::Eq,
                Some(Tok::Ne) => BinOp::Ne,
                _ => break,
            };
            self.pos += 1;
            let right = self.sum()?;
            left = Expr::Binary {
                op,
                left: Box::new(left),
                right: Box::new(right),
            };
        }
        Ok(left)
    }

    fn sum(&mut self) -> Result<Expr, ParseError> {
        let mut left = self.product()?;
        loop {
            let op = match self.peek() {
                Some(Tok::Plus) => BinOp::Add,
                Some(Tok::Minus) => BinOp::Sub,
                _ => break,
            };
            self.pos += 1;
            let right = self.product()?;
            left = Expr::Binary {
                op,
                left: Box::new(left),
                right: Box::new(right),
            };
        }
        Ok(left)
    }

    fn product(&mut self) -> Result<Expr, ParseError> {
        let mut left = self.unary()?;
        loop {
            let op = match self.peek() {
                Some(Tok::Star) => BinOp::Mul,
                Some(Tok::Slash) => BinOp::Div,
                Some(Tok::Modulo) => BinOp::Rem,
                _ => break,
            };
            self.pos += 1;
            let right = self.unary()?;
            left = Expr::Binary {
                op,
                left: Box::new(left),
                right: Box::new(right),
            };
        }
        Ok(left)
    }

    fn unary(&mut self) -> Result<Expr, ParseError> {
        if self.eat(&Tok::Minus) {
            return Ok(Expr::Neg(Box::new(self.unary()?)));
        }
        if self.eat(&Tok::Bang) {
            return Ok(Expr::Not(Box::new(self.unary()?)));
        }
        self.primary()
    }

    fn primary(&mut self) -> Result<Expr, ParseError> {
        let pos = self.here();
        match self.bump() {
            Some(Tok::Number(v)) => Ok(Expr::Number(v)),
            Some(Tok::Percent(f)) => Ok(Expr::Percent(f)),
            Some(Tok::LParen) => {
                let inner = self.expr()?;
                self.expect(Tok::RParen, "')'")?;
                Ok(inner)
            }
            Some(Tok::Amp) => self.amp_reference(pos),
            Some(Tok::Ident(name)) => {
                if self.peek() == Some(&Tok::LParen) {
                    self.call(&name, pos)
                } else {
                    self.reference(name, pos)
                }
            }
            Some(other) => Err(ParseError::new(
                format!("unexpected token {other:?}"),
                pos,
            )),
            None => Err(ParseError::new("unexpected end of expression", pos)),
        }
    }

    fn call(&mut self, name: &str, pos: usize) -> Result<Expr, ParseError> {
        self.expect(Tok::LParen, "'('")?;
        match name.to_ascii_lowercase().as_str() {
            "min" | "max" => {
                let a = self.expr()?;
                self.expect(Tok::Comma, "','")?;
                let b = self.expr()?;
                self.expect(Tok::RParen, "')'")?;
                let op = if name.eq_ignore_ascii_case("min") {
                    BinOp::Min
                } else {
                    BinOp::Max
                };
                Ok(Expr::Binary {
                    op,
                    left: Box::new(a),
                    right: Box::new(b),
                })
            }
            "clamp" => {
                let v = self.expr()?;
                self.expect(Tok::Comma, "','")?;
                let lo = self.expr()?;
                self.expect(Tok::Comma, "','")?;
                let hi = self.expr()?;
                self.expect(Tok::RParen, "')'")?;
                Ok(Expr::Clamp(Box::new(v), Box::new(lo), Box::new(hi)))
            }
            "if" => {
                let c = self.expr()?;
                self.expect(Tok::Comma, "','")?;
                let t = self.expr()?;
                self.expect(Tok::Comma, "','")?;
                let f = self.expr()?;
                self.expect(Tok::RParen, "')'")?;
                Ok(Expr::If(Box::new(c), Box::new(t), Box::new(f)))
            }
            _ => Err(ParseError::new(format!("unknown function '{name}'"), pos)),
        }
    }

    /// `&name.prop` (registered source) or `&.prop` (shorthand for parent).
    fn amp_reference(&mut self, pos: usize) -> Result<Expr, ParseError> {
        if self.eat(&Tok::Dot) {
            let prop = self.property(pos)?;
            return Ok(Expr::Ref {
                target: RefTarget::Parent,
                prop,
            });
        }
        let name = match self.bump() {
            Some(Tok::Ident(name)) => name,
            _ => return Err(ParseError::new("expected widget name after '&'", pos)),
        };
        self.expect(Tok::Dot, "'.' after widget name")?;
        let prop = self.property(pos)?;
        Ok(Expr::Ref {
            target: RefTarget::Named(name),
            prop,
        })
    }

    /// A bare property (`width`) or `parent.prop`.
    fn reference(&mut self, first: String, pos: usize) -> Result<Expr, ParseError> {
        if self.eat(&Tok::Dot) {
            if !first.eq_ignore_ascii_case("parent") {
                return Err(ParseError::new(
                    format!("unknown reference '{first}.'; widget references start with '&'"),
                    pos,
                ));
            }
            let prop = self.property(pos)?;
            return Ok(Expr::Ref {
                target: RefTarget::Parent,
                prop,
            });
        }
        let prop = prop_from_str(&first)
            .ok_or_else(|| ParseError::new(format!("unknown property '{first}'"), pos))?;
        Ok(Expr::Ref {
            target: RefTarget::Owner,
            prop,
        })
    }

    fn property(&mut self, pos: usize) -> Result<PropertyRef, ParseError> {
        match self.bump() {
            Some(Tok::Ident(name)) => prop_from_str(&name)
                .ok_or_else(|| ParseError::new(format!("unknown property '{name}'"), pos)),
            _ => Err(ParseError::new("expected property name", pos)),
        }
    }

    fn finish(&mut self) -> Result<(), ParseError> {
        if self.pos == self.tokens.len() {
            Ok(())
        } else {
            Err(ParseError::new("trailing input after expression", self.here()))
        }
    }
}

fn prop_from_str(name: &str) -> Option<PropertyRef> {
    match name.to_ascii_lowercase().as_str() {
        "x" | "left" => Some(PropertyRef::Left),
        "y" | "top" => Some(PropertyRef::Top),
        "w" | "width" => Some(PropertyRef::Width),
        "h" | "height" => Some(PropertyRef::Height),
        "right" => Some(PropertyRef::Right),
        "bottom" => Some(PropertyRef::Bottom),
        _ => None,
    }
}

/// Parse a single scalar layout expression. An empty (or all-whitespace)
/// string is the constant zero.
pub(crate) fn parse_expr(src: &str) -> Result<Expr, ParseError> {
    if src.trim().is_empty() {
        return Ok(Expr::Number(0.0));
    }
    let mut p = Parser::new(src)?;
    let expr = p.expr()?;
    p.finish()?;
    Ok(expr)
}

/// Parse a `"(x, y)"` pair for two-dimensional position/size expressions.
pub(crate) fn parse_pair(src: &str) -> Result<(Expr, Expr), ParseError> {
    let mut p = Parser::new(src)?;
    p.expect(Tok::LParen, "'(' opening the pair")?;
    let x = p.expr()?;
    p.expect(Tok::Comma, "',' between the pair")?;
    let y = p.expr()?;
    p.expect(Tok::RParen, "')' closing the pair")?;
    p.finish()?;
    Ok((x, y))
}
