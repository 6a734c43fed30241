//! Parser module for server configuration
//!
//! This module provides the lexer, the lossless tree and the parser.

pub mod ast;
pub mod lexer;
pub mod parser;

pub use ast::*;
pub use lexer::{is_bare_value, tokenize, LexError, Location, Spanned, Token};
pub use parser::{parse, parse_config, ParseError, Parser};
