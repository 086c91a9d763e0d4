//! The formula language: tokenizer, recursive-descent parser, expression
//! tree and the lexical dependency scanner used to build the graph.
pub mod ast;
pub mod deps;
pub mod lexer;
pub mod parser;

use thiserror::Error;

pub use ast::{BinaryOp, Expr, Namespace, Reference, UnaryOp};
pub use deps::{extract_dependencies, extract_references};
pub use lexer::{tokenize, Token, TokenKind};
pub use parser::parse;

/// Malformed formula syntax. `position` is a byte offset into the formula.
#[derive(Error, Debug, Clone, PartialEq)]
#[error("{message} at position {position}")]
pub struct ParseError {
    pub message: String,
    pub position: usize,
}

impl ParseError {
    pub fn new(message: impl Into<String>, position: usize) -> Self {
        Self { message: message.into(), position }
    }
}
