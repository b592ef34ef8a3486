//! Recursive Descent Parser for Bash Scripts
//!
//! The parser drives the lexer one token at a time and builds the AST.
//! Word scanning, expansions, redirects and compound commands live in
//! sibling modules as further `impl Parser` blocks; this file holds the
//! parser state, token lookahead and the list/pipeline layer.
//!
//! Grammar (simplified):
//!   script       ::= list (NEWLINE list)*
//!   list         ::= pipeline ((&& | '||' | ; | & | NEWLINE) pipeline)* [; | &]
//!   pipeline     ::= [time [-p] [--]] [!] command ((| | |&) command)*
//!   command      ::= compound_cmd redirect* | function_def | simple_cmd
//!   simple_cmd   ::= (word | redirect)+
//!   compound_cmd ::= ( list ) | { list } | (( arith )) | [[ cond ]]
//!                  | if | while | until | for | select | case | coproc

use crate::ast::types::{
    HereDocNode, ListItem, ListNode, ListOperator, NegationNode, Node, PipelineNode,
    TimeNode, AST,
};
use crate::parser::context::{ContextStack, LexMode, SavedParserState};
use crate::parser::lexer::{Lexer, Token, TokenType};
use crate::parser::types::{
    is_blank, is_metachar, is_negation_boundary, is_quote, is_whitespace, is_word_end_context, DolbraceState,
    ParseError, ParseOptions, ParserState, Result, WordContext, MAX_INPUT_SIZE, RESERVED_WORDS,
};
use tracing::{debug, trace};

/// Recursive descent parser over one source string
pub struct Parser {
    pub(crate) lexer: Lexer,
    pub(crate) options: ParseOptions,
    pub(crate) state: ParserState,
    pub(crate) dolbrace: DolbraceState,
    /// Character that ends the current nested list (`)` or `}`)
    pub(crate) eof_token: Option<char>,
    pub(crate) mode: LexMode,
    pub(crate) ctx: ContextStack,
    pub(crate) pending_heredocs: Vec<HereDocNode>,
    /// Furthest offset consumed by heredoc bodies read on behalf of a
    /// backtick substitution; the outer line resumes past it
    pub(crate) cmdsub_heredoc_end: Option<usize>,
    pub(crate) in_process_sub: bool,
    pub(crate) depth: usize,
}

impl Parser {
    pub fn new(source: &str, options: &ParseOptions) -> Self {
        Self::nested(source, options, (0, 1))
    }

    /// Parser over text extracted from a larger source starting at `origin`
    /// (byte offset, 1-based line); error positions refer to the outer source
    pub(crate) fn nested(source: &str, options: &ParseOptions, origin: (usize, usize)) -> Self {
        Self {
            lexer: Lexer::with_origin(source, origin),
            options: options.clone(),
            state: ParserState::NONE,
            dolbrace: DolbraceState::None,
            eof_token: None,
            mode: LexMode::default(),
            ctx: ContextStack::new(),
            pending_heredocs: Vec::new(),
            cmdsub_heredoc_end: None,
            in_process_sub: false,
            depth: 0,
        }
    }

    /// Parse a command list out of substitution text. Empty text gives
    /// `Node::Empty`.
    /// `depth` is the nesting level of the enclosing construct.
    pub(crate) fn parse_nested_list(
        source: &str,
        options: &ParseOptions,
        origin: (usize, usize),
        depth: usize,
    ) -> Result<Node> {
        if depth > options.max_depth {
            return Err(ParseError::depth_limit(options.max_depth, origin.0, origin.1));
        }
        let mut parser = Self::nested(source, options, origin);
        parser.depth = depth;
        let node = parser.parse_list(true)?;
        Ok(node.unwrap_or(Node::Empty))
    }

    /// Parse the whole source into top-level nodes. An empty or blank script
    /// yields a single `Node::Empty`.
    pub fn parse(&mut self) -> Result<Vec<Node>> {
        let size: usize = self.lexer.input().iter().map(|c| c.len_utf8()).sum();
        if size > MAX_INPUT_SIZE {
            return Err(self.syntax_error(
                format!("Input too large: {size} bytes exceeds limit of {MAX_INPUT_SIZE}"),
                0,
            ));
        }
        debug!(bytes = size, extglob = self.options.extglob, "parsing script");

        if self.lexer.input().iter().all(|c| c.is_whitespace()) {
            return Ok(vec![Node::Empty]);
        }

        // Leading blank and comment lines
        loop {
            self.skip_whitespace();
            match self.peek() {
                Some('\n') => {
                    self.advance();
                }
                Some('#') => {
                    while self.peek().is_some_and(|c| c != '\n') {
                        self.advance();
                    }
                }
                _ => break,
            }
        }

        let mut results = Vec::new();
        while !self.at_end() {
            if let Some(node) = self.parse_list(false)? {
                results.push(node);
            }
            self.skip_whitespace();
            let mut found_newline = false;
            while self.is_at('\n') {
                found_newline = true;
                self.advance();
                self.gather_heredoc_bodies();
                self.skip_consumed_heredoc();
                self.skip_whitespace();
            }
            if !found_newline && !self.at_end() {
                return Err(self.syntax_error("Syntax error", self.pos()));
            }
        }

        if results.is_empty() {
            results.push(Node::Empty);
        }
        debug!(nodes = results.len(), "parsed script");
        Ok(results)
    }

    // =========================================================================
    // CURSOR & ERRORS
    // =========================================================================

    pub(crate) fn pos(&self) -> usize {
        self.lexer.pos
    }

    pub(crate) fn set_pos(&mut self, pos: usize) {
        self.lexer.pos = pos;
    }

    pub(crate) fn at_end(&self) -> bool {
        self.lexer.at_end()
    }

    pub(crate) fn peek(&self) -> Option<char> {
        self.lexer.current()
    }

    pub(crate) fn peek_at(&self, offset: usize) -> Option<char> {
        self.lexer.peek(offset)
    }

    pub(crate) fn char_at(&self, idx: usize) -> Option<char> {
        self.lexer.char_at(idx)
    }

    pub(crate) fn is_at(&self, c: char) -> bool {
        self.peek() == Some(c)
    }

    pub(crate) fn advance(&mut self) -> Option<char> {
        self.lexer.advance()
    }

    /// Advance one character and append it to `out`
    pub(crate) fn take_into(&mut self, out: &mut Vec<char>) {
        if let Some(c) = self.advance() {
            out.push(c);
        }
    }

    pub(crate) fn take_into_string(&mut self, out: &mut String) {
        if let Some(c) = self.advance() {
            out.push(c);
        }
    }

    pub(crate) fn syntax_error(&self, message: impl Into<String>, at: usize) -> ParseError {
        self.lexer.syntax_error(message, at)
    }

    pub(crate) fn unterminated(&self, message: impl Into<String>, at: usize) -> ParseError {
        self.lexer.unterminated(message, at)
    }

    /// Syntax error positioned at the start of the next token
    pub(crate) fn token_error(&self, message: impl Into<String>) -> ParseError {
        let mut at = self.pos();
        while self.char_at(at).is_some_and(is_blank) {
            at += 1;
        }
        self.syntax_error(message, at)
    }

    /// Enter one nesting level of compound commands or substitutions
    pub(crate) fn enter(&mut self) -> Result<()> {
        self.depth += 1;
        if self.depth > self.options.max_depth {
            let (pos, line) = self.lexer.location(self.pos());
            return Err(ParseError::depth_limit(self.options.max_depth, pos, line));
        }
        Ok(())
    }

    pub(crate) fn leave(&mut self) {
        self.depth = self.depth.saturating_sub(1);
    }

    // =========================================================================
    // SAVED STATE
    // =========================================================================

    pub(crate) fn save_state(&self) -> SavedParserState {
        SavedParserState {
            parser_state: self.state,
            dolbrace: self.dolbrace,
            pending_heredocs: self.pending_heredocs.clone(),
            ctx: self.ctx.clone(),
            quote: self.lexer.quote.clone(),
            eof_token: self.eof_token,
            mode: self.mode,
        }
    }

    /// Leave a sub-parse that succeeded. Heredocs it registered but did not
    /// read stay pending for the enclosing line.
    pub(crate) fn restore_state(&mut self, saved: SavedParserState) {
        self.state = saved.parser_state;
        self.dolbrace = saved.dolbrace;
        self.ctx = saved.ctx;
        self.eof_token = saved.eof_token;
        self.mode = saved.mode;
    }

    /// Leave a list nested inside a word. The enclosing line's heredocs were
    /// set aside on entry; they stay ahead of any the nested list left
    /// unread.
    pub(crate) fn restore_nested_state(&mut self, mut saved: SavedParserState) {
        let unread = std::mem::take(&mut self.pending_heredocs);
        self.pending_heredocs = std::mem::take(&mut saved.pending_heredocs);
        self.pending_heredocs.extend(unread);
        self.restore_state(saved);
    }

    /// Leave a sub-parse that failed; anything it registered is dropped
    pub(crate) fn abandon_state(&mut self, saved: SavedParserState) {
        self.pending_heredocs = saved.pending_heredocs.clone();
        self.lexer.quote = saved.quote.clone();
        self.restore_state(saved);
        self.lexer.invalidate();
    }

    // =========================================================================
    // TOKENS
    // =========================================================================

    /// Look at the next token without consuming it
    pub(crate) fn peek_token(&mut self) -> Result<Token> {
        let start = self.pos();
        if let Some(token) = self.lexer.cached(start, self.mode, self.state, self.eof_token) {
            return Ok(token.clone());
        }
        let token = self.read_token()?;
        let end = self.pos();
        self.lexer
            .store(start, self.mode, self.state, self.eof_token, end, token.clone());
        self.set_pos(start);
        Ok(token)
    }

    pub(crate) fn next_token(&mut self) -> Result<Token> {
        let start = self.pos();
        if let Some(token) = self.lexer.take_cached(start, self.mode, self.state, self.eof_token) {
            return Ok(token);
        }
        self.lexer.invalidate();
        self.read_token()
    }

    fn read_token(&mut self) -> Result<Token> {
        self.lexer.skip_blanks();
        loop {
            if self.at_end() || self.at_nested_eof() {
                return Ok(Token::eof(self.pos()));
            }
            if !self.lexer.skip_comment() {
                break;
            }
            self.lexer.skip_blanks();
        }
        if let Some(token) = self.lexer.read_operator(self.mode.word_context) {
            return Ok(token);
        }
        match self.read_word()? {
            Some(token) => Ok(token),
            None => Ok(Token::eof(self.pos())),
        }
    }

    /// An `eof_token` character ends the token stream unless a construct
    /// that consumes it as a token is open
    fn at_nested_eof(&self) -> bool {
        self.eof_token.is_some()
            && self.peek() == self.eof_token
            && !self.state.intersects(ParserState::CASEPAT | ParserState::EOFTOKEN)
    }

    fn read_word(&mut self) -> Result<Option<Token>> {
        let start = self.pos();
        let Some(c) = self.peek() else {
            return Ok(None);
        };
        let is_procsub = matches!(c, '<' | '>') && self.peek_at(1) == Some('(');
        let is_regex_paren = self.mode.word_context == WordContext::Regex && matches!(c, '(' | ')');
        if is_metachar(c) && !is_procsub && !is_regex_paren {
            return Ok(None);
        }
        let word = self.read_word_internal(self.mode)?;
        Ok(word.map(|word| Token::new(TokenType::Word, word.value.clone(), start, self.pos()).with_word(word)))
    }

    // =========================================================================
    // WHITESPACE
    // =========================================================================

    /// Skip blanks, comments and line continuations
    pub(crate) fn skip_whitespace(&mut self) {
        loop {
            self.lexer.skip_blanks();
            if self.lexer.skip_comment() {
                continue;
            }
            if self.is_at('\\') && self.peek_at(1) == Some('\n') {
                self.set_pos(self.pos() + 2);
                continue;
            }
            break;
        }
    }

    /// Like `skip_whitespace`, also crossing newlines; heredoc bodies that
    /// start after a crossed newline are read on the way
    pub(crate) fn skip_whitespace_and_newlines(&mut self) {
        loop {
            self.skip_whitespace();
            if !self.is_at('\n') {
                break;
            }
            self.advance();
            if !self.pending_heredocs.is_empty() {
                self.gather_heredoc_bodies();
            }
            self.skip_consumed_heredoc();
        }
    }

    /// Jump over heredoc bodies already read by a backtick substitution
    pub(crate) fn skip_consumed_heredoc(&mut self) {
        if let Some(end) = self.cmdsub_heredoc_end.filter(|&end| end > self.pos()) {
            self.set_pos(end);
            self.cmdsub_heredoc_end = None;
        }
    }

    // =========================================================================
    // RESERVED WORDS & LOOKAHEAD
    // =========================================================================

    /// Reserved word (or `{` `}` `[[` `]]` `!`) at the next token, if any
    pub(crate) fn peek_reserved_word(&mut self) -> Result<Option<String>> {
        let token = self.peek_token()?;
        Ok(token
            .keyword()
            .filter(|w| RESERVED_WORDS.contains(w) || matches!(*w, "{" | "}" | "[[" | "]]" | "!"))
            .map(str::to_string))
    }

    pub(crate) fn at_reserved(&mut self, word: &str) -> Result<bool> {
        Ok(self.peek_reserved_word()?.as_deref() == Some(word))
    }

    /// Consume the next token if it is the given word
    pub(crate) fn lex_consume_word(&mut self, expected: &str) -> Result<bool> {
        let token = self.peek_token()?;
        if token.keyword() != Some(expected) {
            return Ok(false);
        }
        self.next_token()?;
        Ok(true)
    }

    /// Bare word at the cursor, scanned by characters without consuming.
    /// Stops at metacharacters, quotes and line continuations.
    pub(crate) fn peek_word(&self) -> Option<String> {
        let mut i = self.pos();
        while self.char_at(i).is_some_and(is_blank) {
            i += 1;
        }
        let mut word = String::new();
        while let Some(c) = self.char_at(i) {
            if is_metachar(c) || is_quote(c) {
                break;
            }
            if c == '\\' {
                match self.char_at(i + 1) {
                    Some('\n') => break,
                    Some(next) => {
                        word.push(c);
                        word.push(next);
                        i += 2;
                        continue;
                    }
                    None => {}
                }
            }
            word.push(c);
            i += 1;
        }
        (!word.is_empty()).then_some(word)
    }

    /// Consume `expected` as a bare word. Inside a process substitution a
    /// `}` glued to the front of a reserved word is accepted too.
    pub(crate) fn consume_word(&mut self, expected: &str) -> bool {
        let saved = self.pos();
        self.skip_whitespace();
        let Some(word) = self.peek_word() else {
            self.set_pos(saved);
            return false;
        };
        let glued_brace = self.in_process_sub && word.chars().count() > 1 && word.starts_with('}');
        let keyword = if glued_brace { &word[1..] } else { word.as_str() };
        if keyword != expected {
            self.set_pos(saved);
            return false;
        }
        self.lexer.skip_blanks();
        if glued_brace {
            self.advance();
        }
        self.set_pos(self.pos() + expected.chars().count());
        while self.is_at('\\') && self.peek_at(1) == Some('\n') {
            self.set_pos(self.pos() + 2);
        }
        true
    }

    /// Whether the cursor sits on a `)` or `}` that closes the current list
    pub(crate) fn at_list_terminating_bracket(&self) -> bool {
        match self.peek() {
            Some(c) if self.eof_token == Some(c) => true,
            Some(')') => true,
            Some('}') => self.peek_at(1).map_or(true, is_word_end_context),
            _ => false,
        }
    }

    /// Whether the next token is the character that ends this nested list
    pub(crate) fn at_eof_token(&mut self) -> Result<bool> {
        let Some(eof) = self.eof_token else {
            return Ok(false);
        };
        let token = self.peek_token()?;
        Ok(match eof {
            ')' => token.token_type == TokenType::RParen,
            '}' => token.token_type == TokenType::Word && token.value == "}",
            _ => false,
        })
    }

    fn at_list_until_terminator(&mut self, stop_words: &[&str]) -> Result<bool> {
        if self.at_end() || self.is_at(')') {
            return Ok(true);
        }
        if self.is_at('}') && self.peek_at(1).map_or(true, is_word_end_context) {
            return Ok(true);
        }
        if let Some(word) = self.peek_reserved_word()? {
            if stop_words.contains(&word.as_str()) {
                return Ok(true);
            }
        }
        Ok(self.peek_case_terminator().is_some())
    }

    /// `!` followed by `(` that is really `!(...)` is an extglob, not negation
    fn at_negation(&self) -> bool {
        self.is_at('!') && self.peek_at(1).map_or(true, is_negation_boundary)
    }

    // =========================================================================
    // LISTS
    // =========================================================================

    fn peek_list_operator(&mut self) -> Result<Option<ListOperator>> {
        let token = self.peek_token()?;
        Ok(match token.token_type {
            TokenType::AndAnd => Some(ListOperator::And),
            TokenType::OrOr => Some(ListOperator::Or),
            TokenType::Semicolon => Some(ListOperator::Semi),
            TokenType::Amp => Some(ListOperator::Background),
            _ => None,
        })
    }

    fn parse_list_operator(&mut self) -> Result<Option<ListOperator>> {
        let op = self.peek_list_operator()?;
        if op.is_some() {
            self.next_token()?;
        }
        Ok(op)
    }

    /// Cross a newline that separates two commands of a list
    fn consume_list_newline(&mut self) {
        self.advance();
        self.gather_heredoc_bodies();
        self.skip_consumed_heredoc();
        self.skip_whitespace_and_newlines();
    }

    /// Parse `pipeline (op pipeline)*`. With `newline_ok` newlines act as
    /// separators; without it the list stops at the first newline.
    pub(crate) fn parse_list(&mut self, newline_ok: bool) -> Result<Option<Node>> {
        if newline_ok {
            self.skip_whitespace_and_newlines();
        } else {
            self.skip_whitespace();
        }
        let Some(first) = self.parse_pipeline()? else {
            return Ok(None);
        };
        let mut parts = vec![ListItem::Command(first)];
        if self.state.contains(ParserState::EOFTOKEN) && self.at_eof_token()? {
            return Ok(Some(finish_list(parts)));
        }

        loop {
            self.skip_whitespace();
            let op = match self.parse_list_operator()? {
                Some(op) => op,
                None => {
                    if !newline_ok || !self.is_at('\n') {
                        break;
                    }
                    self.consume_list_newline();
                    if self.at_end() || self.at_list_terminating_bracket() {
                        break;
                    }
                    if matches!(
                        self.peek_list_operator()?,
                        Some(ListOperator::Semi | ListOperator::Background)
                    ) {
                        break;
                    }
                    ListOperator::Newline
                }
            };
            parts.push(AST::operator(op));

            match op {
                ListOperator::And | ListOperator::Or => self.skip_whitespace_and_newlines(),
                ListOperator::Semi | ListOperator::Background => {
                    self.skip_whitespace();
                    if self.at_end() || self.at_list_terminating_bracket() {
                        break;
                    }
                    if self.is_at('\n') {
                        if !newline_ok {
                            break;
                        }
                        self.skip_whitespace_and_newlines();
                        if self.at_end() || self.at_list_terminating_bracket() {
                            break;
                        }
                    }
                }
                ListOperator::Newline => {}
            }

            let Some(pipeline) = self.parse_pipeline()? else {
                return Err(self.token_error(format!("Expected command after {}", op.as_str())));
            };
            parts.push(ListItem::Command(pipeline));
            if self.state.contains(ParserState::EOFTOKEN) && self.at_eof_token()? {
                break;
            }
        }
        Ok(Some(finish_list(parts)))
    }

    /// Parse a list that ends at one of `stop_words`, a closing bracket or
    /// a case terminator. A `;` right before the stop word is dropped.
    pub(crate) fn parse_list_until(&mut self, stop_words: &[&str]) -> Result<Option<Node>> {
        self.skip_whitespace_and_newlines();
        if let Some(word) = self.peek_reserved_word()? {
            if stop_words.contains(&word.as_str()) {
                return Ok(None);
            }
        }
        let Some(first) = self.parse_pipeline()? else {
            return Ok(None);
        };
        let mut parts = vec![ListItem::Command(first)];

        loop {
            self.skip_whitespace();
            let op = match self.parse_list_operator()? {
                Some(op) => op,
                None => {
                    if !self.is_at('\n') {
                        break;
                    }
                    self.consume_list_newline();
                    if self.at_list_until_terminator(stop_words)? {
                        break;
                    }
                    if matches!(
                        self.peek_list_operator()?,
                        Some(ListOperator::Semi | ListOperator::Background)
                    ) {
                        break;
                    }
                    ListOperator::Newline
                }
            };

            match op {
                ListOperator::Semi => {
                    self.skip_whitespace_and_newlines();
                    if self.at_list_until_terminator(stop_words)? {
                        break;
                    }
                    parts.push(AST::operator(op));
                }
                ListOperator::Background => {
                    parts.push(AST::operator(op));
                    self.skip_whitespace_and_newlines();
                    if self.at_list_until_terminator(stop_words)? {
                        break;
                    }
                }
                ListOperator::And | ListOperator::Or => {
                    parts.push(AST::operator(op));
                    self.skip_whitespace_and_newlines();
                }
                ListOperator::Newline => parts.push(AST::operator(op)),
            }

            if self.at_list_until_terminator(stop_words)? {
                break;
            }
            let Some(pipeline) = self.parse_pipeline()? else {
                return Err(self.token_error(format!("Expected command after {}", op.as_str())));
            };
            parts.push(ListItem::Command(pipeline));
        }
        Ok(Some(finish_list(parts)))
    }

    // =========================================================================
    // PIPELINES
    // =========================================================================

    /// `-p` right after `time`
    fn consume_time_posix_flag(&mut self) -> bool {
        if self.is_at('-') && self.peek_at(1) == Some('p') && self.peek_at(2).map_or(true, is_metachar) {
            self.set_pos(self.pos() + 2);
            return true;
        }
        false
    }

    pub(crate) fn parse_pipeline(&mut self) -> Result<Option<Node>> {
        self.skip_whitespace();

        if self.at_reserved("time")? {
            self.next_token()?;
            self.skip_whitespace();
            let mut posix = self.consume_time_posix_flag();
            self.skip_whitespace();
            if self.lexer.starts_with("--") && self.peek_at(2).map_or(true, is_whitespace) {
                self.set_pos(self.pos() + 2);
                posix = true;
                self.skip_whitespace();
            }
            while self.at_reserved("time")? {
                self.next_token()?;
                self.skip_whitespace();
                posix |= self.consume_time_posix_flag();
                self.skip_whitespace();
            }
            let negated = self.at_negation();
            if negated {
                self.advance();
                self.skip_whitespace();
            }
            let inner = self.parse_simple_pipeline()?.unwrap_or(Node::Empty);
            let pipeline = if negated {
                Node::Negation(NegationNode {
                    pipeline: Box::new(inner),
                })
            } else {
                inner
            };
            trace!(posix, negated, "time prefix");
            return Ok(Some(Node::Time(TimeNode {
                pipeline: Box::new(pipeline),
                posix,
            })));
        }

        if self.at_negation() {
            let mut negations = 0usize;
            while self.at_negation() {
                self.advance();
                self.skip_whitespace();
                negations += 1;
            }
            let inner = self.parse_pipeline()?;
            if negations % 2 == 1 {
                return Ok(Some(Node::Negation(NegationNode {
                    pipeline: Box::new(inner.unwrap_or(Node::Empty)),
                })));
            }
            // `! !cmd` cancels out
            return Ok(Some(match inner {
                None | Some(Node::Empty) => AST::command(Vec::new(), Vec::new()),
                Some(node) => node,
            }));
        }

        self.parse_simple_pipeline()
    }

    fn parse_simple_pipeline(&mut self) -> Result<Option<Node>> {
        let Some(first) = self.parse_compound_command()? else {
            return Ok(None);
        };
        let mut commands = vec![first];
        let mut pipe_stderr = Vec::new();

        loop {
            self.skip_whitespace();
            let token = self.peek_token()?;
            let both = match token.token_type {
                TokenType::Pipe => false,
                TokenType::PipeAmp => true,
                _ => break,
            };
            self.next_token()?;
            self.skip_whitespace_and_newlines();
            let Some(command) = self.parse_compound_command()? else {
                return Err(self.token_error(format!("Expected command after {}", token.value)));
            };
            commands.push(command);
            pipe_stderr.push(both);
        }

        if commands.len() == 1 {
            return Ok(commands.pop());
        }
        Ok(Some(Node::Pipeline(PipelineNode { commands, pipe_stderr })))
    }
}

/// A one-element list is just its command
fn finish_list(mut parts: Vec<ListItem>) -> Node {
    if parts.len() == 1 {
        if let Some(ListItem::Command(node)) = parts.pop() {
            return node;
        }
    }
    Node::List(ListNode::new(parts))
}

/// Parse a script with default options plus the extglob switch
pub fn parse(source: &str, extglob: bool) -> Result<Vec<Node>> {
    let options = ParseOptions {
        extglob,
        ..Default::default()
    };
    parse_with_options(source, &options)
}

pub fn parse_with_options(source: &str, options: &ParseOptions) -> Result<Vec<Node>> {
    Parser::new(source, options).parse()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::types::{Redirect, WordPart};
    use crate::parser::context::ContextKind;

    fn parse(source: &str) -> Result<Vec<Node>> {
        Parser::new(source, &ParseOptions::default()).parse()
    }

    fn parse_one(source: &str) -> Node {
        let mut nodes = parse(source).unwrap();
        assert_eq!(nodes.len(), 1, "expected one node for {source:?}: {nodes:?}");
        nodes.remove(0)
    }

    fn words(node: &Node) -> Vec<String> {
        match node {
            Node::Command(cmd) => cmd.words.iter().map(|w| w.value.clone()).collect(),
            other => panic!("expected command, got {other:?}"),
        }
    }

    #[test]
    fn test_parse_empty() {
        assert_eq!(parse("").unwrap(), vec![Node::Empty]);
        assert_eq!(parse("   \n\t\n").unwrap(), vec![Node::Empty]);
        assert_eq!(parse("# just a comment\n").unwrap(), vec![Node::Empty]);
    }

    #[test]
    fn test_parse_simple_command() {
        let node = parse_one("echo hello world");
        assert_eq!(words(&node), vec!["echo", "hello", "world"]);
    }

    #[test]
    fn test_parse_lines_are_separate_nodes() {
        let nodes = parse("echo a\necho b\n\necho c").unwrap();
        assert_eq!(nodes.len(), 3);
        assert_eq!(words(&nodes[2]), vec!["echo", "c"]);
    }

    #[test]
    fn test_parse_pipeline() {
        match parse_one("echo hello | cat |& wc -l") {
            Node::Pipeline(p) => {
                assert_eq!(p.commands.len(), 3);
                assert_eq!(p.pipe_stderr, vec![false, true]);
            }
            other => panic!("expected pipeline, got {other:?}"),
        }
    }

    #[test]
    fn test_parse_and_or_list() {
        match parse_one("a && b || c; d &") {
            Node::List(list) => {
                let ops: Vec<_> = list.operators().collect();
                assert_eq!(
                    ops,
                    vec![
                        ListOperator::And,
                        ListOperator::Or,
                        ListOperator::Semi,
                        ListOperator::Background
                    ]
                );
                assert_eq!(list.commands().count(), 4);
            }
            other => panic!("expected list, got {other:?}"),
        }
    }

    #[test]
    fn test_parse_newline_after_and_and() {
        match parse_one("a &&\n\n b") {
            Node::List(list) => assert_eq!(list.commands().count(), 2),
            other => panic!("expected list, got {other:?}"),
        }
    }

    #[test]
    fn test_parse_negation_and_double_negation() {
        assert!(matches!(parse_one("! true"), Node::Negation(_)));
        assert!(matches!(parse_one("! ! true"), Node::Command(_)));
    }

    #[test]
    fn test_parse_time_prefix() {
        match parse_one("time -p sleep 1") {
            Node::Time(t) => {
                assert!(t.posix);
                assert_eq!(words(&t.pipeline), vec!["sleep", "1"]);
            }
            other => panic!("expected time, got {other:?}"),
        }
        match parse_one("time ! false") {
            Node::Time(t) => assert!(matches!(*t.pipeline, Node::Negation(_))),
            other => panic!("expected time, got {other:?}"),
        }
        match parse_one("! time false") {
            Node::Negation(n) => assert!(matches!(*n.pipeline, Node::Time(_))),
            other => panic!("expected negation, got {other:?}"),
        }
    }

    #[test]
    fn test_parse_bang_extglob_is_not_negation() {
        let nodes = Parser::new(
            "ls !(foo)",
            &ParseOptions {
                extglob: true,
                ..Default::default()
            },
        )
        .parse()
        .unwrap();
        assert_eq!(words(&nodes[0]), vec!["ls", "!(foo)"]);
    }

    #[test]
    fn test_parse_heredoc_body_after_newline() {
        let node = parse_one("cat <<EOF\nhello\nworld\nEOF\n");
        match node {
            Node::Command(cmd) => match &cmd.redirects[0] {
                Redirect::HereDoc(h) => {
                    assert_eq!(h.delimiter, "EOF");
                    assert_eq!(h.content.get(), "hello\nworld\n");
                }
                other => panic!("expected heredoc, got {other:?}"),
            },
            other => panic!("expected command, got {other:?}"),
        }
    }

    #[test]
    fn test_parse_command_substitution_part() {
        let node = parse_one("echo $(date)");
        match node {
            Node::Command(cmd) => {
                assert_eq!(cmd.words[1].value, "$(date)");
                assert!(matches!(cmd.words[1].parts[0], WordPart::CommandSubstitution(_)));
            }
            other => panic!("expected command, got {other:?}"),
        }
    }

    #[test]
    fn test_parse_stray_close_paren_is_error() {
        let err = parse("echo a )").unwrap_err();
        assert!(!err.is_unterminated());
        assert_eq!(err.message(), "Syntax error");
    }

    #[test]
    fn test_parse_missing_command_after_pipe() {
        let err = parse("echo a |").unwrap_err();
        assert_eq!(err.message(), "Expected command after |");
    }

    #[test]
    fn test_abandon_restores_context_and_quotes() {
        let mut parser = Parser::new("echo x", &ParseOptions::default());
        let saved = parser.save_state();
        parser.ctx.push(ContextKind::BraceExpansion);
        parser.lexer.quote.push();
        parser.lexer.quote.toggle_double();
        parser.abandon_state(saved);
        assert_eq!(parser.ctx.depth(), 1);
        assert!(!parser.lexer.quote.in_quotes());
        assert!(!parser.lexer.quote.outer_double());
    }

    #[test]
    fn test_parse_depth_limit() {
        let options = ParseOptions {
            max_depth: 5,
            ..Default::default()
        };
        let source = "( ( ( ( ( ( ( echo ) ) ) ) ) ) )";
        let err = Parser::new(source, &options).parse().unwrap_err();
        assert!(err.message().contains("nesting depth"));
        assert!(Parser::new("( ( echo ) )", &options).parse().is_ok());
    }

    #[test]
    fn test_parse_elif_chain_depth_limit() {
        let options = ParseOptions {
            max_depth: 5,
            ..Default::default()
        };
        let source = format!("if a; then b; {}fi", "elif a; then b; ".repeat(6));
        let err = Parser::new(&source, &options).parse().unwrap_err();
        assert!(matches!(err, ParseError::Syntax { .. }));
        assert!(err.is_depth_limit());
        let source = "if a; then b; elif a; then b; elif a; then b; fi";
        assert!(Parser::new(source, &options).parse().is_ok());
    }

    #[test]
    fn test_parse_long_negation_chain() {
        let odd = format!("{}true", "! ".repeat(10_001));
        assert!(matches!(parse_one(&odd), Node::Negation(_)));
        let even = format!("{}true", "! ".repeat(10_000));
        assert!(matches!(parse_one(&even), Node::Command(_)));
    }

    #[test]
    fn test_parse_input_size_limit() {
        let source = "a".repeat(MAX_INPUT_SIZE + 1);
        let err = parse(&source).unwrap_err();
        assert!(err.message().starts_with("Input too large"));
    }

    #[test]
    fn test_error_line_numbers() {
        let err = parse("echo ok\nif true; then\n").unwrap_err();
        assert_eq!(err.line(), 3);
    }
}
