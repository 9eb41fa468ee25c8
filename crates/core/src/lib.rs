//! sqexport-core: front end for the modeling-language subset understood by
//! the built-in reference engine.
//!
//! - [`lex()`] -- source text to tokens
//! - [`parse()`] -- source text to a [`Program`]
//! - [`ParseError`] -- located lexing/parsing error

pub mod ast;
pub mod error;
pub mod lexer;
pub mod parser;

pub use ast::{BinaryOp, Expr, Program, Statement, UnaryOp};
pub use error::ParseError;
pub use lexer::lex;
pub use parser::parse;
