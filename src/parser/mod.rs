//! Parser module for bash scripts
//!
//! This module contains the lexer, the recursive descent parser and the
//! arithmetic sub-grammar. Word scanning, expansions, redirects, compound
//! commands and `[[ ]]` are split across sibling files as `impl Parser`
//! blocks over one shared parser state.

pub mod types;
pub mod context;
pub mod scanner;
pub mod lexer;
pub mod arithmetic_parser;
pub mod word_parser;
pub mod expansion_parser;
pub mod conditional_parser;
pub mod compound_parser;
pub mod command_parser;
pub mod parser;

// Re-exports
pub use types::{ParseError, ParseOptions, MAX_INPUT_SIZE, MAX_PARSER_DEPTH};
pub use lexer::{Lexer, Token, TokenType};
pub use arithmetic_parser::parse_arithmetic;
pub use parser::{parse, parse_with_options, Parser};
