//! Parser Types and Constants
//!
//! Shared error type, state flag sets, static lookup tables and character
//! predicates used across the lexer and parser modules.

use lazy_static::lazy_static;
use std::collections::{HashMap, HashSet};
use std::ops::BitOr;
use thiserror::Error;

// Parser limits to prevent hangs and resource exhaustion
pub const MAX_INPUT_SIZE: usize = 1_000_000; // 1MB max input
pub const MAX_PARSER_DEPTH: usize = 200; // Max recursion depth for nested constructs

// =============================================================================
// ERRORS
// =============================================================================

const DEPTH_LIMIT_PREFIX: &str = "Maximum nesting depth";

/// A fatal parse failure.
///
/// `Unterminated` means the input is a valid prefix of a longer script (a
/// quote, substitution or bracket reached end of input before its closer).
/// `Syntax` is a violated grammar expectation at a known position.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    #[error("Parse error at line {line}, position {pos}: {message}")]
    Unterminated {
        message: String,
        pos: usize,
        line: usize,
    },
    #[error("Parse error at line {line}, position {pos}: {message}")]
    Syntax {
        message: String,
        pos: usize,
        line: usize,
    },
}

impl ParseError {
    pub fn syntax(message: impl Into<String>, pos: usize, line: usize) -> Self {
        Self::Syntax {
            message: message.into(),
            pos,
            line,
        }
    }

    pub fn unterminated(message: impl Into<String>, pos: usize, line: usize) -> Self {
        Self::Unterminated {
            message: message.into(),
            pos,
            line,
        }
    }

    /// The nesting limit was hit. Never downgraded to a literal fallback.
    pub fn depth_limit(max_depth: usize, pos: usize, line: usize) -> Self {
        Self::syntax(format!("{DEPTH_LIMIT_PREFIX} ({max_depth}) exceeded"), pos, line)
    }

    pub fn is_depth_limit(&self) -> bool {
        matches!(self, Self::Syntax { message, .. } if message.starts_with(DEPTH_LIMIT_PREFIX))
    }

    pub fn message(&self) -> &str {
        match self {
            Self::Unterminated { message, .. } | Self::Syntax { message, .. } => message,
        }
    }

    /// Byte offset into the source that was being parsed
    pub fn pos(&self) -> usize {
        match self {
            Self::Unterminated { pos, .. } | Self::Syntax { pos, .. } => *pos,
        }
    }

    /// 1-based line number
    pub fn line(&self) -> usize {
        match self {
            Self::Unterminated { line, .. } | Self::Syntax { line, .. } => *line,
        }
    }

    pub fn is_unterminated(&self) -> bool {
        matches!(self, Self::Unterminated { .. })
    }
}

pub type Result<T> = std::result::Result<T, ParseError>;

// =============================================================================
// OPTIONS
// =============================================================================

/// Parser configuration
#[derive(Debug, Clone)]
pub struct ParseOptions {
    /// Recognize `@( ) ?( ) *( ) +( ) !( )` patterns
    pub extglob: bool,
    /// Nesting limit for compound commands and substitutions
    pub max_depth: usize,
}

impl Default for ParseOptions {
    fn default() -> Self {
        Self {
            extglob: false,
            max_depth: MAX_PARSER_DEPTH,
        }
    }
}

// =============================================================================
// STATE FLAG SETS
// =============================================================================

macro_rules! flag_set {
    ($(#[$meta:meta])* $name:ident { $($flag:ident = $value:expr),* $(,)? }) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
        pub struct $name(u32);

        impl $name {
            pub const NONE: Self = Self(0);
            $(pub const $flag: Self = Self($value);)*

            pub fn contains(self, other: Self) -> bool {
                self.0 & other.0 == other.0
            }

            pub fn intersects(self, other: Self) -> bool {
                self.0 & other.0 != 0
            }

            pub fn insert(&mut self, other: Self) {
                self.0 |= other.0;
            }

            pub fn remove(&mut self, other: Self) {
                self.0 &= !other.0;
            }

            pub fn without(self, other: Self) -> Self {
                Self(self.0 & !other.0)
            }
        }

        impl BitOr for $name {
            type Output = Self;

            fn bitor(self, rhs: Self) -> Self {
                Self(self.0 | rhs.0)
            }
        }
    };
}

flag_set! {
    /// What kind of construct the parser is currently inside
    ParserState {
        CASEPAT = 0x0001,
        CMDSUBST = 0x0002,
        CASESTMT = 0x0004,
        CONDEXPR = 0x0008,
        COMPASSIGN = 0x0010,
        ARITH = 0x0020,
        HEREDOC = 0x0040,
        REGEXP = 0x0080,
        EXTPAT = 0x0100,
        SUBSHELL = 0x0200,
        REDIRLIST = 0x0400,
        COMMENT = 0x0800,
        EOFTOKEN = 0x1000,
    }
}

flag_set! {
    /// How a matched-pair scan treats quotes and nested sigils
    MatchedPairFlags {
        DQUOTE = 0x0001,
        DOLBRACE = 0x0002,
        COMMAND = 0x0004,
        ARITH = 0x0008,
        ALLOWESC = 0x0010,
        EXTGLOB = 0x0020,
        FIRSTCLOSE = 0x0040,
        ARRAYSUB = 0x0080,
        BACKQUOTE = 0x0100,
    }
}

/// Where we are inside `${...}`: before the operator, on it, or in its word.
/// Pattern operators (`#`, `%`, `/`, `^`, `,`) move to `Quote` so single
/// quotes keep their quoting meaning even inside double quotes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DolbraceState {
    #[default]
    None,
    Param,
    Op,
    Word,
    Quote,
    Quote2,
}

/// Word scanning mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WordContext {
    #[default]
    Normal,
    /// Inside `[[ ]]`
    Cond,
    /// Right-hand side of `=~`
    Regex,
}

// =============================================================================
// STATIC TABLES
// =============================================================================

lazy_static! {
    pub static ref RESERVED_WORDS: HashSet<&'static str> = [
        "if", "then", "else", "elif", "fi", "case", "esac", "for", "while", "until", "do",
        "done", "in", "function", "select", "time", "coproc",
    ]
    .into_iter()
    .collect();

    pub static ref COND_UNARY_OPS: HashSet<&'static str> = [
        "-a", "-b", "-c", "-d", "-e", "-f", "-g", "-h", "-k", "-n", "-o", "-p", "-r", "-s",
        "-t", "-u", "-v", "-w", "-x", "-z", "-G", "-L", "-N", "-O", "-R", "-S",
    ]
    .into_iter()
    .collect();

    pub static ref COND_BINARY_OPS: HashSet<&'static str> = [
        "==", "=", "!=", "=~", "<", ">", "-eq", "-ne", "-lt", "-le", "-gt", "-ge", "-nt",
        "-ot", "-ef",
    ]
    .into_iter()
    .collect();

    pub static ref COMPOUND_KEYWORDS: HashSet<&'static str> =
        ["case", "for", "if", "select", "until", "while"].into_iter().collect();

    pub static ref ASSIGNMENT_BUILTINS: HashSet<&'static str> = [
        "alias", "declare", "eval", "export", "let", "local", "readonly", "typeset",
    ]
    .into_iter()
    .collect();

    /// Escape letter after `\` in `$'...'` to the byte it denotes
    pub static ref ANSI_C_ESCAPES: HashMap<char, u8> = [
        ('a', 0x07),
        ('b', 0x08),
        ('e', 0x1b),
        ('E', 0x1b),
        ('f', 0x0c),
        ('n', 0x0a),
        ('r', 0x0d),
        ('t', 0x09),
        ('v', 0x0b),
        ('\\', b'\\'),
        ('"', b'"'),
        ('?', b'?'),
    ]
    .into_iter()
    .collect();
}

// =============================================================================
// CHARACTER PREDICATES
// =============================================================================

pub fn is_metachar(c: char) -> bool {
    matches!(c, ' ' | '\t' | '\n' | '|' | '&' | ';' | '(' | ')' | '<' | '>')
}

pub fn is_whitespace(c: char) -> bool {
    matches!(c, ' ' | '\t' | '\n')
}

pub fn is_blank(c: char) -> bool {
    matches!(c, ' ' | '\t')
}

pub fn is_funsub_char(c: char) -> bool {
    matches!(c, ' ' | '\t' | '\n' | '|')
}

pub fn is_extglob_prefix(c: char) -> bool {
    matches!(c, '@' | '?' | '*' | '+' | '!')
}

pub fn is_redirect_char(c: char) -> bool {
    matches!(c, '<' | '>')
}

pub fn is_special_param(c: char) -> bool {
    matches!(c, '?' | '$' | '!' | '#' | '@' | '*' | '-' | '&')
}

pub fn is_special_param_unbraced(c: char) -> bool {
    matches!(c, '?' | '$' | '!' | '#' | '@' | '*' | '-')
}

pub fn is_simple_param_op(c: char) -> bool {
    matches!(c, '-' | '=' | '?' | '+')
}

/// Characters that start an operator inside `${...}` in arithmetic text
pub fn is_param_expansion_op(c: char) -> bool {
    matches!(
        c,
        ':' | '-' | '=' | '+' | '?' | '#' | '%' | '/' | '^' | ',' | '@' | '*' | '['
    )
}

pub fn is_escape_char_in_backtick(c: char) -> bool {
    matches!(c, '$' | '`' | '\\')
}

/// Characters that may follow `!` for it to be a pipeline negation
pub fn is_negation_boundary(c: char) -> bool {
    is_whitespace(c) || matches!(c, ';' | '|' | ')' | '&' | '>' | '<')
}

/// Characters that end a bare word such as a reserved word or `}`
pub fn is_word_end_context(c: char) -> bool {
    is_whitespace(c) || matches!(c, ';' | '|' | '&' | '<' | '>' | '(' | ')')
}

pub fn is_quote(c: char) -> bool {
    matches!(c, '\'' | '"')
}

pub fn is_ident_start(c: char) -> bool {
    c.is_ascii_alphabetic() || c == '_'
}

pub fn is_ident_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_'
}

pub fn is_valid_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if is_ident_start(c) => chars.all(is_ident_char),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display_and_kind() {
        let err = ParseError::unterminated("Unterminated single quote", 5, 1);
        assert!(err.is_unterminated());
        assert_eq!(
            err.to_string(),
            "Parse error at line 1, position 5: Unterminated single quote"
        );
        let err = ParseError::syntax("Expected 'fi'", 13, 3);
        assert!(!err.is_unterminated());
        assert_eq!(err.pos(), 13);
        assert_eq!(err.line(), 3);
        assert_eq!(err.message(), "Expected 'fi'");
    }

    #[test]
    fn test_flag_set_ops() {
        let mut state = ParserState::NONE;
        state.insert(ParserState::CASEPAT | ParserState::EOFTOKEN);
        assert!(state.contains(ParserState::CASEPAT));
        state.remove(ParserState::CASEPAT);
        assert!(!state.contains(ParserState::CASEPAT));
        assert!(state.contains(ParserState::EOFTOKEN));

        let flags = MatchedPairFlags::DOLBRACE | MatchedPairFlags::DQUOTE;
        assert!(flags.intersects(MatchedPairFlags::DOLBRACE | MatchedPairFlags::ARRAYSUB));
        assert!(!flags.without(MatchedPairFlags::DOLBRACE).contains(MatchedPairFlags::DOLBRACE));
    }

    #[test]
    fn test_tables() {
        assert!(RESERVED_WORDS.contains("esac"));
        assert!(!RESERVED_WORDS.contains("echo"));
        assert!(COND_UNARY_OPS.contains("-z"));
        assert!(COND_BINARY_OPS.contains("=~"));
        assert!(ASSIGNMENT_BUILTINS.contains("declare"));
        assert_eq!(ANSI_C_ESCAPES.get(&'n'), Some(&0x0a));
    }

    #[test]
    fn test_identifiers() {
        assert!(is_valid_identifier("_foo1"));
        assert!(!is_valid_identifier("1foo"));
        assert!(!is_valid_identifier(""));
        assert!(!is_valid_identifier("a-b"));
    }
}
