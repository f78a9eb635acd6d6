//! Text serialization.
//!
//! Trees use a whitespace-delimited, recursive grammar:
//!
//! ```text
//! node    := "{" weight kind "}"
//! kind    := "const" value
//!          | "input" index
//!          | "unary" op node
//!          | "binary" op node node
//!          | "sum" count node{count}
//! program := dim node
//! ```
//!
//! Floating-point values are written in Rust's shortest round-trip form, so parsing a
//! serialized tree reproduces every weight and constant bit for bit.
//!
//! [`Tokens`] is public so that formats embedding programs (such as tagged evaluator
//! records) can keep reading from the same token stream.

use std::{
    fmt,
    iter::Peekable,
    str::{FromStr, SplitWhitespace},
};

use crate::{
    Program,
    node::{Node, NodeKind, StructureError},
    op::{BinaryOp, UnaryOp, UnknownOperatorError},
};

const OPEN: &str = "{";
const CLOSE: &str = "}";

/// Malformed serialized data.
#[derive(Debug, Clone, PartialEq, derive_more::Display, derive_more::Error, derive_more::From)]
pub enum ParseError {
    #[display("unexpected end of input, expected {expected}")]
    #[from(ignore)]
    UnexpectedEnd { expected: &'static str },
    #[display("unexpected token '{found}', expected {expected}")]
    #[from(ignore)]
    UnexpectedToken {
        expected: &'static str,
        found: String,
    },
    #[display("invalid {what} '{token}'")]
    #[from(ignore)]
    InvalidValue { what: &'static str, token: String },
    #[display("unknown node kind '{tag}'")]
    #[from(ignore)]
    UnknownKind { tag: String },
    #[display("{_0}")]
    UnknownOperator(UnknownOperatorError),
    #[display("{_0}")]
    Structure(StructureError),
}

/// Cursor over whitespace-separated tokens.
#[derive(Debug, Clone)]
pub struct Tokens<'a> {
    inner: Peekable<SplitWhitespace<'a>>,
}

impl<'a> Tokens<'a> {
    #[must_use]
    pub fn new(s: &'a str) -> Self {
        Self {
            inner: s.split_whitespace().peekable(),
        }
    }

    /// Returns the next token without consuming it.
    pub fn peek(&mut self) -> Option<&'a str> {
        self.inner.peek().copied()
    }

    /// Consumes the next token; `expected` describes it for error messages.
    pub fn next_token(&mut self, expected: &'static str) -> Result<&'a str, ParseError> {
        self.inner.next().ok_or(ParseError::UnexpectedEnd { expected })
    }

    /// Consumes the next token, failing unless it equals `token`.
    pub fn expect(&mut self, token: &'static str) -> Result<(), ParseError> {
        let found = self.next_token(token)?;
        if found == token {
            Ok(())
        } else {
            Err(ParseError::UnexpectedToken {
                expected: token,
                found: found.to_owned(),
            })
        }
    }

    /// Consumes the next token and parses it as `T`.
    pub fn parse<T>(&mut self, what: &'static str) -> Result<T, ParseError>
    where
        T: FromStr,
    {
        let token = self.next_token(what)?;
        token.parse().map_err(|_| ParseError::InvalidValue {
            what,
            token: token.to_owned(),
        })
    }

    /// Fails if any token is left.
    pub fn finish(mut self) -> Result<(), ParseError> {
        match self.inner.next() {
            None => Ok(()),
            Some(found) => Err(ParseError::UnexpectedToken {
                expected: "end of input",
                found: found.to_owned(),
            }),
        }
    }
}

impl fmt::Display for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{OPEN} {} ", self.weight)?;
        match &self.kind {
            NodeKind::Constant { value } => write!(f, "const {value}")?,
            NodeKind::Input { index } => write!(f, "input {index}")?,
            NodeKind::Unary { op, child } => write!(f, "unary {op} {child}")?,
            NodeKind::Binary { op, left, right } => write!(f, "binary {op} {left} {right}")?,
            NodeKind::WeightedSum { children } => {
                write!(f, "sum {}", children.len())?;
                for child in children {
                    write!(f, " {child}")?;
                }
            }
        }
        write!(f, " {CLOSE}")
    }
}

impl fmt::Display for Program {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.dim, self.root)
    }
}

impl Node {
    /// Reads one node (with its subtree) from `tokens`.
    pub fn parse_tokens(tokens: &mut Tokens<'_>) -> Result<Self, ParseError> {
        tokens.expect(OPEN)?;
        let weight = tokens.parse("weight")?;
        let kind = match tokens.next_token("node kind")? {
            "const" => NodeKind::Constant {
                value: tokens.parse("constant value")?,
            },
            "input" => NodeKind::Input {
                index: tokens.parse("input index")?,
            },
            "unary" => {
                let op = tokens.next_token("unary operator")?.parse::<UnaryOp>()?;
                let child = Box::new(Node::parse_tokens(tokens)?);
                NodeKind::Unary { op, child }
            }
            "binary" => {
                let op = tokens.next_token("binary operator")?.parse::<BinaryOp>()?;
                let left = Box::new(Node::parse_tokens(tokens)?);
                let right = Box::new(Node::parse_tokens(tokens)?);
                NodeKind::Binary { op, left, right }
            }
            "sum" => {
                let count: usize = tokens.parse("child count")?;
                if count == 0 {
                    return Err(StructureError::EmptyWeightedSum.into());
                }
                let children = (0..count)
                    .map(|_| Node::parse_tokens(tokens))
                    .collect::<Result<_, _>>()?;
                NodeKind::WeightedSum { children }
            }
            tag => {
                return Err(ParseError::UnknownKind {
                    tag: tag.to_owned(),
                });
            }
        };
        tokens.expect(CLOSE)?;
        Ok(Node { weight, kind })
    }
}

impl Program {
    /// Reads a program (`dim` followed by the root node) from `tokens`.
    pub fn parse_tokens(tokens: &mut Tokens<'_>) -> Result<Self, ParseError> {
        let dim = tokens.parse("dimension")?;
        let root = Node::parse_tokens(tokens)?;
        Ok(Program::new(root, dim)?)
    }
}

impl FromStr for Program {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut tokens = Tokens::new(s);
        let program = Program::parse_tokens(&mut tokens)?;
        tokens.finish()?;
        Ok(program)
    }
}
