//! Quote and nesting context tracking
//!
//! Small value types that record which quote the scanner is inside and which
//! nested constructs the parser has entered. Both are cheap to clone so the
//! parser can snapshot them before a speculative sub-parse and put them back
//! verbatim if that sub-parse is abandoned.

use crate::ast::types::HereDocNode;
use crate::parser::types::{DolbraceState, ParserState, WordContext};

// =============================================================================
// QUOTE STATE
// =============================================================================

/// Current single/double quote flags plus the frames saved by `push`
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QuoteState {
    pub single: bool,
    pub double: bool,
    stack: Vec<(bool, bool)>,
}

impl QuoteState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Open a fresh frame; quoting restarts inside `${...}`
    pub fn push(&mut self) {
        self.stack.push((self.single, self.double));
        self.single = false;
        self.double = false;
    }

    pub fn pop(&mut self) {
        if let Some((single, double)) = self.stack.pop() {
            self.single = single;
            self.double = double;
        }
    }

    pub fn in_quotes(&self) -> bool {
        self.single || self.double
    }

    /// Whether the frame enclosing the current one was double-quoted
    pub fn outer_double(&self) -> bool {
        self.stack.last().map(|&(_, double)| double).unwrap_or(false)
    }

    pub fn toggle_single(&mut self) {
        self.single = !self.single;
    }

    pub fn toggle_double(&mut self) {
        self.double = !self.double;
    }
}

// =============================================================================
// PARSE CONTEXT STACK
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ContextKind {
    #[default]
    Normal,
    CommandSub,
    Arithmetic,
    CasePattern,
    /// Body of a braced `${...}` expansion
    BraceExpansion,
}

/// One nesting level with its own depth counters
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParseContext {
    pub kind: ContextKind,
    /// Open parens inside an arithmetic scan
    pub paren_depth: usize,
    /// `case` words seen inside a pattern's `$( )` without their `esac`
    pub case_depth: usize,
}

impl ParseContext {
    pub fn new(kind: ContextKind) -> Self {
        Self {
            kind,
            ..Default::default()
        }
    }
}

/// Never empty: the bottom frame is the `Normal` context of the whole parse
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContextStack {
    stack: Vec<ParseContext>,
}

impl Default for ContextStack {
    fn default() -> Self {
        Self::new()
    }
}

impl ContextStack {
    pub fn new() -> Self {
        Self {
            stack: vec![ParseContext::new(ContextKind::Normal)],
        }
    }

    pub fn current(&self) -> &ParseContext {
        // The constructor seeds one frame and pop never removes it.
        &self.stack[self.stack.len() - 1]
    }

    pub fn current_mut(&mut self) -> &mut ParseContext {
        let last = self.stack.len() - 1;
        &mut self.stack[last]
    }

    pub fn push(&mut self, kind: ContextKind) {
        self.stack.push(ParseContext::new(kind));
    }

    /// Pop the innermost frame; the bottom frame stays
    pub fn pop(&mut self) -> Option<ParseContext> {
        if self.stack.len() > 1 {
            self.stack.pop()
        } else {
            None
        }
    }

    pub fn depth(&self) -> usize {
        self.stack.len()
    }

    /// Whether any enclosing frame has the given kind
    pub fn inside(&self, kind: ContextKind) -> bool {
        self.stack.iter().any(|c| c.kind == kind)
    }
}

// =============================================================================
// LEXER MODE & SAVED STATE
// =============================================================================

/// Mode flags that change how the next token is scanned. A cached lookahead
/// token is only reused when the mode it was read under matches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct LexMode {
    pub word_context: WordContext,
    pub at_command_start: bool,
    pub in_array_literal: bool,
    pub in_assign_builtin: bool,
}

/// Snapshot taken before entering a nested substitution parse
#[derive(Debug, Clone)]
pub struct SavedParserState {
    pub parser_state: ParserState,
    pub dolbrace: DolbraceState,
    pub pending_heredocs: Vec<HereDocNode>,
    pub ctx: ContextStack,
    pub quote: QuoteState,
    pub eof_token: Option<char>,
    pub mode: LexMode,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quote_push_pop() {
        let mut q = QuoteState::new();
        q.toggle_double();
        assert!(q.in_quotes());
        q.push();
        assert!(!q.in_quotes());
        assert!(q.outer_double());
        q.toggle_single();
        q.pop();
        assert!(q.double);
        assert!(!q.single);
        assert!(!q.outer_double());
    }

    #[test]
    fn test_pop_on_empty_quote_stack_is_noop() {
        let mut q = QuoteState::new();
        q.toggle_single();
        q.pop();
        assert!(q.single);
    }

    #[test]
    fn test_context_stack_keeps_bottom_frame() {
        let mut ctx = ContextStack::new();
        ctx.push(ContextKind::CommandSub);
        ctx.current_mut().paren_depth += 1;
        assert_eq!(ctx.depth(), 2);
        assert!(ctx.inside(ContextKind::CommandSub));
        let saved = ctx.clone();

        assert!(ctx.pop().is_some());
        assert!(ctx.pop().is_none());
        assert_eq!(ctx.current().kind, ContextKind::Normal);

        ctx = saved;
        assert_eq!(ctx.current().paren_depth, 1);
    }
}
