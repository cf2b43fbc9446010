//! Syntax layer for ruql.
//!
//! This crate provides:
//! - `token`: Token kinds and token structures
//! - `lexer`: Tokenization
//! - `ast`: Abstract syntax tree types for executable documents
//! - `parser`: Recursive descent parser

pub mod ast;
pub mod lexer;
pub mod parser;
pub mod token;

pub use ast::*;
pub use lexer::Lexer;
pub use parser::{parse, parse_type, ParseError, Parser, DEFAULT_RECURSION_LIMIT};
pub use token::{Token, TokenKind};
