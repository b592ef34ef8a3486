//! shparse - A parser front-end for POSIX/bash shell scripts
//!
//! This library turns script text into a typed syntax tree that keeps the
//! quoting, expansion and compound-command structure of the source. Nothing
//! is executed or expanded.
//!
//! ```
//! let nodes = shparse::parse("echo \"$(ls -la)\"", false).unwrap();
//! assert_eq!(nodes.len(), 1);
//! ```

pub mod ast;
pub mod parser;

pub use ast::types::*;
pub use parser::{parse, parse_with_options, ParseError, ParseOptions, Parser};
