//! Abstract Syntax Tree (AST) Types for shell scripts
//!
//! Architecture:
//!   Input → Lexer ⇄ Parser → AST

pub mod types;
