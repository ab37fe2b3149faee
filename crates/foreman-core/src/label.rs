//! Label expressions.
//!
//! A label expression restricts which nodes may run a piece of work:
//!
//! ```text
//! linux
//! linux && x86_64
//! (linux || mac) && !arm
//! ```
//!
//! `!` binds tighter than `&&`, which binds tighter than `||`. An atom matches
//! a node that carries that label or whose name equals the atom.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::node::Computer;
use crate::{Error, Result};

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Label {
    Atom(String),
    Not(Box<Label>),
    And(Box<Label>, Box<Label>),
    Or(Box<Label>, Box<Label>),
}

impl Label {
    pub fn atom(name: impl Into<String>) -> Self {
        Label::Atom(name.into())
    }

    pub fn parse(expression: &str) -> Result<Self> {
        let tokens = tokenize(expression)?;
        let mut parser = Parser {
            expression,
            tokens,
            pos: 0,
        };
        let label = parser.parse_or()?;
        if parser.pos != parser.tokens.len() {
            return Err(parser.error("unexpected trailing input"));
        }
        Ok(label)
    }

    /// Does the node satisfy this expression?
    pub fn contains(&self, node: &dyn Computer) -> bool {
        match self {
            Label::Atom(name) => node.id().as_str() == name || node.has_label(name),
            Label::Not(inner) => !inner.contains(node),
            Label::And(lhs, rhs) => lhs.contains(node) && rhs.contains(node),
            Label::Or(lhs, rhs) => lhs.contains(node) || rhs.contains(node),
        }
    }

    fn precedence(&self) -> u8 {
        match self {
            Label::Or(..) => 1,
            Label::And(..) => 2,
            Label::Not(_) => 3,
            Label::Atom(_) => 4,
        }
    }

    fn fmt_child(&self, child: &Label, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if child.precedence() < self.precedence() {
            write!(f, "({child})")
        } else {
            write!(f, "{child}")
        }
    }
}

impl fmt::Display for Label {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Label::Atom(name) => f.write_str(name),
            Label::Not(inner) => {
                f.write_str("!")?;
                self.fmt_child(inner, f)
            }
            Label::And(lhs, rhs) => {
                self.fmt_child(lhs, f)?;
                f.write_str(" && ")?;
                self.fmt_child(rhs, f)
            }
            Label::Or(lhs, rhs) => {
                self.fmt_child(lhs, f)?;
                f.write_str(" || ")?;
                self.fmt_child(rhs, f)
            }
        }
    }
}

impl FromStr for Label {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Label::parse(s)
    }
}

impl TryFrom<String> for Label {
    type Error = Error;

    fn try_from(value: String) -> Result<Self> {
        Label::parse(&value)
    }
}

impl From<Label> for String {
    fn from(label: Label) -> Self {
        label.to_string()
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Atom(String),
    Not,
    And,
    Or,
    Open,
    Close,
}

fn tokenize(expression: &str) -> Result<Vec<Token>> {
    let invalid = |message: &str| Error::InvalidLabel {
        expression: expression.to_string(),
        message: message.to_string(),
    };

    let mut tokens = Vec::new();
    let mut chars = expression.chars().peekable();
    while let Some(&c) = chars.peek() {
        match c {
            c if c.is_whitespace() => {
                chars.next();
            }
            '(' => {
                chars.next();
                tokens.push(Token::Open);
            }
            ')' => {
                chars.next();
                tokens.push(Token::Close);
            }
            '!' => {
                chars.next();
                tokens.push(Token::Not);
            }
            '&' | '|' => {
                chars.next();
                if chars.next() != Some(c) {
                    return Err(invalid("single '&' or '|'"));
                }
                tokens.push(if c == '&' { Token::And } else { Token::Or });
            }
            '"' => {
                chars.next();
                let mut atom = String::new();
                loop {
                    match chars.next() {
                        Some('"') => break,
                        Some(ch) => atom.push(ch),
                        None => return Err(invalid("unterminated quote")),
                    }
                }
                if atom.is_empty() {
                    return Err(invalid("empty quoted label"));
                }
                tokens.push(Token::Atom(atom));
            }
            _ => {
                let mut atom = String::new();
                while let Some(&ch) = chars.peek() {
                    if ch.is_whitespace() || "()!&|\"".contains(ch) {
                        break;
                    }
                    atom.push(ch);
                    chars.next();
                }
                tokens.push(Token::Atom(atom));
            }
        }
    }

    if tokens.is_empty() {
        return Err(invalid("empty expression"));
    }
    Ok(tokens)
}

struct Parser<'a> {
    expression: &'a str,
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser<'_> {
    fn error(&self, message: &str) -> Error {
        Error::InvalidLabel {
            expression: self.expression.to_string(),
            message: message.to_string(),
        }
    }

    fn eat(&mut self, token: &Token) -> bool {
        if self.tokens.get(self.pos) == Some(token) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn parse_or(&mut self) -> Result<Label> {
        let mut lhs = self.parse_and()?;
        while self.eat(&Token::Or) {
            let rhs = self.parse_and()?;
            lhs = Label::Or(Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn parse_and(&mut self) -> Result<Label> {
        let mut lhs = self.parse_unary()?;
        while self.eat(&Token::And) {
            let rhs = self.parse_unary()?;
            lhs = Label::And(Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn parse_unary(&mut self) -> Result<Label> {
        if self.eat(&Token::Not) {
            return Ok(Label::Not(Box::new(self.parse_unary()?)));
        }
        if self.eat(&Token::Open) {
            let inner = self.parse_or()?;
            if !self.eat(&Token::Close) {
                return Err(self.error("missing ')'"));
            }
            return Ok(inner);
        }
        match self.tokens.get(self.pos) {
            Some(Token::Atom(name)) => {
                let label = Label::Atom(name.clone());
                self.pos += 1;
                Ok(label)
            }
            Some(_) => Err(self.error("expected a label")),
            None => Err(self.error("unexpected end of expression")),
        }
    }
}
