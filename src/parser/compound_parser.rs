//! Compound Command Parser
//!
//! Handles parsing of compound commands: if, for, while, until, select,
//! case, subshell, brace group, `(( ))`, coproc and function definitions.
//! Every keyword form requires its keywords in order; a missing one is a
//! syntax error naming what was expected.

use crate::ast::types::{
    ArithmeticCommandNode, BraceGroupNode, CaseNode, CasePatternNode, CaseTerminator, CoprocNode,
    ForArithNode, ForNode, FunctionNode, IfNode, Node, SelectNode, SubshellNode, UntilNode,
    WhileNode,
};
use crate::parser::arithmetic_parser::parse_arithmetic_nested;
use crate::parser::context::ContextKind;
use crate::parser::parser::Parser;
use crate::parser::scanner;
use crate::parser::types::{
    is_blank, is_extglob_prefix, is_metachar, is_quote, is_valid_identifier, is_whitespace,
    ParserState, Result, COMPOUND_KEYWORDS, RESERVED_WORDS,
};
use tracing::trace;

/// Reserved words that can never start a command
const MISPLACED_KEYWORDS: &[&str] = &["fi", "then", "elif", "else", "done", "esac", "do", "in"];

impl Parser {
    /// Parse one command of a pipeline: a compound command, a function
    /// definition or a simple command
    pub(crate) fn parse_compound_command(&mut self) -> Result<Option<Node>> {
        self.enter()?;
        let node = self.dispatch_command();
        self.leave();
        node
    }

    fn dispatch_command(&mut self) -> Result<Option<Node>> {
        self.skip_whitespace();
        let Some(ch) = self.peek() else {
            return Ok(None);
        };
        if ch == '(' && self.peek_at(1) == Some('(') {
            if let Some(node) = self.parse_arithmetic_command()? {
                return Ok(Some(node));
            }
        }
        if ch == '(' {
            return self.parse_subshell();
        }
        if ch == '{' {
            if let Some(group) = self.parse_brace_group()? {
                return Ok(Some(Node::BraceGroup(group)));
            }
        }
        if ch == '[' && self.peek_at(1) == Some('[') {
            if let Some(node) = self.parse_conditional_expr()? {
                return Ok(Some(node));
            }
        }

        let mut reserved = self.peek_reserved_word()?;
        if reserved.is_none() && self.in_process_sub {
            reserved = self.peek_word().and_then(|word| {
                let keyword = word.strip_prefix('}')?;
                let known = RESERVED_WORDS.contains(keyword) || matches!(keyword, "{" | "}" | "[[" | "]]" | "!");
                (known && !keyword.is_empty()).then(|| keyword.to_string())
            });
        }

        match reserved.as_deref() {
            Some(word) if MISPLACED_KEYWORDS.contains(&word) => {
                Err(self.token_error(format!("Unexpected reserved word '{word}'")))
            }
            Some("if") => self.parse_if(),
            Some("while") => self.parse_while(),
            Some("until") => self.parse_until(),
            Some("for") => self.parse_for(),
            Some("select") => self.parse_select(),
            Some("case") => self.parse_case(),
            Some("function") => self.parse_function(),
            Some("coproc") => self.parse_coproc(),
            _ => {
                if let Some(function) = self.parse_function()? {
                    return Ok(Some(function));
                }
                self.parse_command()
            }
        }
    }

    /// The compound forms allowed as a function body
    fn parse_function_body(&mut self) -> Result<Option<Node>> {
        self.enter()?;
        let body = self.dispatch_function_body();
        self.leave();
        body
    }

    fn dispatch_function_body(&mut self) -> Result<Option<Node>> {
        if let Some(group) = self.parse_brace_group()? {
            return Ok(Some(Node::BraceGroup(group)));
        }
        if self.is_at('(') && self.peek_at(1) == Some('(') {
            if let Some(node) = self.parse_arithmetic_command()? {
                return Ok(Some(node));
            }
        }
        if let Some(node) = self.parse_subshell()? {
            return Ok(Some(node));
        }
        if let Some(node) = self.parse_conditional_expr()? {
            return Ok(Some(node));
        }
        match self.peek_reserved_word()?.as_deref() {
            Some("if") => self.parse_if(),
            Some("while") => self.parse_while(),
            Some("until") => self.parse_until(),
            Some("for") => self.parse_for(),
            Some("case") => self.parse_case(),
            Some("select") => self.parse_select(),
            _ => Ok(None),
        }
    }

    // =========================================================================
    // GROUPING
    // =========================================================================

    fn parse_subshell(&mut self) -> Result<Option<Node>> {
        self.skip_whitespace();
        if !self.is_at('(') {
            return Ok(None);
        }
        self.advance();
        let outer = self.state;
        self.state.insert(ParserState::SUBSHELL);
        let body = self.parse_list(true);
        self.state = outer;
        let Some(body) = body? else {
            return Err(self.syntax_error("Expected command in subshell", self.pos()));
        };
        self.skip_whitespace();
        if !self.is_at(')') {
            return Err(self.syntax_error("Expected ) to close subshell", self.pos()));
        }
        self.advance();
        Ok(Some(Node::Subshell(SubshellNode {
            body: Box::new(body),
            redirects: self.collect_redirects()?,
        })))
    }

    pub(crate) fn parse_brace_group(&mut self) -> Result<Option<BraceGroupNode>> {
        self.skip_whitespace();
        if !self.lex_consume_word("{")? {
            return Ok(None);
        }
        self.skip_whitespace_and_newlines();
        let Some(body) = self.parse_list(true)? else {
            return Err(self.token_error("Expected command in brace group"));
        };
        self.skip_whitespace();
        if !self.lex_consume_word("}")? {
            return Err(self.token_error("Expected } to close brace group"));
        }
        Ok(Some(BraceGroupNode {
            body: Box::new(body),
            redirects: self.collect_redirects()?,
        }))
    }

    /// `(( expr ))`. Returns `None` with the cursor restored when the
    /// parens turn out to be a subshell holding a parenthesized command.
    fn parse_arithmetic_command(&mut self) -> Result<Option<Node>> {
        self.skip_whitespace();
        if !(self.is_at('(') && self.peek_at(1) == Some('(')) {
            return Ok(None);
        }
        let saved = self.pos();
        self.set_pos(saved + 2);
        let content_start = self.pos();
        let mut depth = 1usize;

        while let Some(c) = self.peek() {
            match c {
                '\'' => {
                    self.advance();
                    while self.peek().is_some_and(|c| c != '\'') {
                        self.advance();
                    }
                    self.advance();
                }
                '"' => {
                    self.advance();
                    while let Some(c) = self.advance() {
                        if c == '\\' {
                            self.advance();
                        } else if c == '"' {
                            break;
                        }
                    }
                }
                '\\' if self.peek_at(1).is_some() => {
                    self.set_pos(self.pos() + 2);
                }
                '(' => {
                    depth += 1;
                    self.advance();
                }
                ')' => {
                    if depth == 1 && self.peek_at(1) == Some(')') {
                        break;
                    }
                    depth -= 1;
                    if depth == 0 {
                        trace!(pos = saved, "(( is a nested subshell");
                        self.set_pos(saved);
                        return Ok(None);
                    }
                    self.advance();
                }
                _ => {
                    self.advance();
                }
            }
        }
        if self.at_end() {
            return Err(self.unterminated("unexpected EOF looking for `))'", saved));
        }

        let content = self.lexer.slice(content_start, self.pos()).replace("\\\n", "");
        self.set_pos(self.pos() + 2);
        let origin = self.lexer.location(content_start);
        let expression = parse_arithmetic_nested(&content, &self.options, origin, self.depth)?;
        Ok(Some(Node::ArithmeticCommand(ArithmeticCommandNode {
            expression,
            redirects: self.collect_redirects()?,
            raw_content: content,
        })))
    }

    // =========================================================================
    // IF / WHILE / UNTIL
    // =========================================================================

    fn parse_if(&mut self) -> Result<Option<Node>> {
        self.skip_whitespace();
        if !self.lex_consume_word("if")? {
            return Ok(None);
        }
        let mut node = self.parse_if_clause("if")?;
        self.skip_whitespace_and_newlines();
        if !self.lex_consume_word("fi")? {
            return Err(self.token_error("Expected 'fi' to close if statement"));
        }
        node.redirects = self.collect_redirects()?;
        Ok(Some(Node::If(node)))
    }

    /// Condition, `then` body and the `elif`/`else` tail following `keyword`.
    /// An `elif` becomes a nested `IfNode` in the else branch.
    fn parse_if_clause(&mut self, keyword: &str) -> Result<IfNode> {
        let Some(condition) = self.parse_list_until(&["then"])? else {
            return Err(self.token_error(format!("Expected condition after '{keyword}'")));
        };
        self.skip_whitespace_and_newlines();
        if !self.lex_consume_word("then")? {
            return Err(self.token_error(format!("Expected 'then' after {keyword} condition")));
        }
        let Some(then_body) = self.parse_list_until(&["elif", "else", "fi"])? else {
            return Err(self.token_error("Expected commands after 'then'"));
        };
        self.skip_whitespace_and_newlines();

        let else_body = if self.lex_consume_word("elif")? {
            self.enter()?;
            let clause = self.parse_if_clause("elif");
            self.leave();
            Some(Box::new(Node::If(clause?)))
        } else if self.lex_consume_word("else")? {
            let Some(body) = self.parse_list_until(&["fi"])? else {
                return Err(self.token_error("Expected commands after 'else'"));
            };
            Some(Box::new(body))
        } else {
            None
        };

        Ok(IfNode {
            condition: Box::new(condition),
            then_body: Box::new(then_body),
            else_body,
            redirects: Vec::new(),
        })
    }

    /// `keyword cond; do body; done`, shared by while and until
    fn parse_condition_loop(&mut self, keyword: &str) -> Result<Option<(Node, Node)>> {
        self.skip_whitespace();
        if !self.lex_consume_word(keyword)? {
            return Ok(None);
        }
        let Some(condition) = self.parse_list_until(&["do"])? else {
            return Err(self.token_error(format!("Expected condition after '{keyword}'")));
        };
        self.skip_whitespace_and_newlines();
        if !self.lex_consume_word("do")? {
            return Err(self.token_error(format!("Expected 'do' after {keyword} condition")));
        }
        let Some(body) = self.parse_list_until(&["done"])? else {
            return Err(self.token_error("Expected commands after 'do'"));
        };
        self.skip_whitespace_and_newlines();
        if !self.lex_consume_word("done")? {
            return Err(self.token_error(format!("Expected 'done' to close {keyword} loop")));
        }
        Ok(Some((condition, body)))
    }

    fn parse_while(&mut self) -> Result<Option<Node>> {
        let Some((condition, body)) = self.parse_condition_loop("while")? else {
            return Ok(None);
        };
        Ok(Some(Node::While(WhileNode {
            condition: Box::new(condition),
            body: Box::new(body),
            redirects: self.collect_redirects()?,
        })))
    }

    fn parse_until(&mut self) -> Result<Option<Node>> {
        let Some((condition, body)) = self.parse_condition_loop("until")? else {
            return Ok(None);
        };
        Ok(Some(Node::Until(UntilNode {
            condition: Box::new(condition),
            body: Box::new(body),
            redirects: self.collect_redirects()?,
        })))
    }

    // =========================================================================
    // FOR / SELECT
    // =========================================================================

    fn parse_for(&mut self) -> Result<Option<Node>> {
        self.skip_whitespace();
        if !self.lex_consume_word("for")? {
            return Ok(None);
        }
        self.skip_whitespace();
        if self.is_at('(') && self.peek_at(1) == Some('(') {
            return self.parse_for_arith().map(Some);
        }

        let var = if self.is_at('$') {
            match self.parse_word(false, false, false)? {
                Some(word) => word.value,
                None => return Err(self.token_error("Expected variable name after 'for'")),
            }
        } else {
            let Some(name) = self.peek_word() else {
                return Err(self.token_error("Expected variable name after 'for'"));
            };
            self.consume_word(&name);
            name
        };

        self.skip_whitespace();
        if self.is_at(';') {
            self.advance();
        }
        self.skip_whitespace_and_newlines();

        let mut words = None;
        if self.at_reserved("in")? {
            self.lex_consume_word("in")?;
            self.skip_whitespace();
            let saw_delimiter = matches!(self.peek(), Some(';' | '\n'));
            if self.is_at(';') {
                self.advance();
            }
            self.skip_whitespace_and_newlines();
            let mut list = Vec::new();
            loop {
                self.skip_whitespace();
                if self.at_end() {
                    break;
                }
                if matches!(self.peek(), Some(';' | '\n')) {
                    if self.is_at(';') {
                        self.advance();
                    }
                    break;
                }
                if self.at_reserved("do")? {
                    if saw_delimiter {
                        break;
                    }
                    return Err(self.token_error("Expected ';' or newline before 'do'"));
                }
                match self.parse_word(false, false, false)? {
                    Some(word) => list.push(word),
                    None => break,
                }
            }
            words = Some(list);
        }

        self.skip_whitespace_and_newlines();
        if self.is_at('{') {
            let Some(group) = self.parse_brace_group()? else {
                return Err(self.token_error("Expected brace group in for loop"));
            };
            return Ok(Some(Node::For(ForNode {
                var,
                words,
                body: group.body,
                redirects: self.collect_redirects()?,
            })));
        }
        if !self.lex_consume_word("do")? {
            return Err(self.token_error("Expected 'do' in for loop"));
        }
        let Some(body) = self.parse_list_until(&["done"])? else {
            return Err(self.token_error("Expected commands after 'do'"));
        };
        self.skip_whitespace_and_newlines();
        if !self.lex_consume_word("done")? {
            return Err(self.token_error("Expected 'done' to close for loop"));
        }
        Ok(Some(Node::For(ForNode {
            var,
            words,
            body: Box::new(body),
            redirects: self.collect_redirects()?,
        })))
    }

    /// `for (( init; cond; incr ))` with the cursor on `((`
    fn parse_for_arith(&mut self) -> Result<Node> {
        self.set_pos(self.pos() + 2);
        let mut parts: Vec<String> = Vec::new();
        let mut current = String::new();
        let mut paren_depth = 0usize;

        while let Some(ch) = self.peek() {
            match ch {
                '(' => {
                    paren_depth += 1;
                    self.take_into_string(&mut current);
                }
                ')' if paren_depth > 0 => {
                    paren_depth -= 1;
                    self.take_into_string(&mut current);
                }
                ')' if self.peek_at(1) == Some(')') => {
                    parts.push(current.trim_start_matches([' ', '\t']).to_string());
                    self.set_pos(self.pos() + 2);
                    break;
                }
                ';' if paren_depth == 0 => {
                    parts.push(current.trim_start_matches([' ', '\t']).to_string());
                    current.clear();
                    self.advance();
                }
                _ => self.take_into_string(&mut current),
            }
        }
        let [init, cond, incr]: [String; 3] = parts
            .try_into()
            .map_err(|_| self.syntax_error("Expected three expressions in for ((;;))", self.pos()))?;

        self.skip_whitespace();
        if self.is_at(';') {
            self.advance();
        }
        self.skip_whitespace_and_newlines();
        let body = self.parse_loop_body("for loop")?;
        Ok(Node::ForArith(ForArithNode {
            init,
            cond,
            incr,
            body: Box::new(body),
            redirects: self.collect_redirects()?,
        }))
    }

    fn parse_select(&mut self) -> Result<Option<Node>> {
        self.skip_whitespace();
        if !self.lex_consume_word("select")? {
            return Ok(None);
        }
        self.skip_whitespace();
        let Some(var) = self.peek_word() else {
            return Err(self.token_error("Expected variable name after 'select'"));
        };
        self.consume_word(&var);
        self.skip_whitespace();
        if self.is_at(';') {
            self.advance();
        }
        self.skip_whitespace_and_newlines();

        let mut words = None;
        if self.at_reserved("in")? {
            self.lex_consume_word("in")?;
            self.skip_whitespace_and_newlines();
            let mut list = Vec::new();
            loop {
                self.skip_whitespace();
                if self.at_end() {
                    break;
                }
                if matches!(self.peek(), Some(';' | '\n' | '{')) {
                    if self.is_at(';') {
                        self.advance();
                    }
                    break;
                }
                if self.at_reserved("do")? {
                    break;
                }
                match self.parse_word(false, false, false)? {
                    Some(word) => list.push(word),
                    None => break,
                }
            }
            words = Some(list);
        }

        self.skip_whitespace_and_newlines();
        let body = self.parse_loop_body("select")?;
        Ok(Some(Node::Select(SelectNode {
            var,
            words,
            body: Box::new(body),
            redirects: self.collect_redirects()?,
        })))
    }

    /// `do list; done` or a brace group
    fn parse_loop_body(&mut self, construct: &str) -> Result<Node> {
        if self.is_at('{') {
            let Some(group) = self.parse_brace_group()? else {
                return Err(self.token_error(format!("Expected brace group body in {construct}")));
            };
            return Ok(*group.body);
        }
        if !self.lex_consume_word("do")? {
            return Err(self.token_error(format!("Expected 'do' or '{{' in {construct}")));
        }
        let Some(body) = self.parse_list_until(&["done"])? else {
            return Err(self.token_error("Expected commands after 'do'"));
        };
        self.skip_whitespace_and_newlines();
        if !self.lex_consume_word("done")? {
            return Err(self.token_error(format!("Expected 'done' to close {construct}")));
        }
        Ok(body)
    }

    // =========================================================================
    // CASE
    // =========================================================================

    /// `;;`, `;&` or `;;&` after optional blanks
    pub(crate) fn peek_case_terminator(&self) -> Option<CaseTerminator> {
        let mut i = self.pos();
        while self.char_at(i).is_some_and(is_blank) {
            i += 1;
        }
        if self.char_at(i) != Some(';') {
            return None;
        }
        match (self.char_at(i + 1), self.char_at(i + 2)) {
            (Some(';'), Some('&')) => Some(CaseTerminator::Continue),
            (Some(';'), _) => Some(CaseTerminator::Break),
            (Some('&'), _) => Some(CaseTerminator::FallThrough),
            _ => None,
        }
    }

    /// Consume a case terminator; a missing one (before `esac`) acts as `;;`
    fn consume_case_terminator(&mut self) -> CaseTerminator {
        let Some(terminator) = self.peek_case_terminator() else {
            return CaseTerminator::Break;
        };
        self.lexer.skip_blanks();
        self.set_pos(self.pos() + terminator.as_str().len());
        terminator
    }

    fn parse_case(&mut self) -> Result<Option<Node>> {
        if !self.consume_word("case") {
            return Ok(None);
        }
        let outer = self.state;
        self.state.insert(ParserState::CASESTMT);
        let result = self.parse_case_rest();
        self.state = outer;
        result.map(Some)
    }

    fn parse_case_rest(&mut self) -> Result<Node> {
        self.skip_whitespace();
        let Some(word) = self.parse_word(false, false, false)? else {
            return Err(self.token_error("Expected word after 'case'"));
        };
        self.skip_whitespace_and_newlines();
        if !self.lex_consume_word("in")? {
            return Err(self.token_error("Expected 'in' after case word"));
        }
        self.skip_whitespace_and_newlines();

        self.state.insert(ParserState::CASEPAT);
        let mut patterns = Vec::new();
        loop {
            self.skip_whitespace_and_newlines();
            if self.at_end() || (self.at_reserved("esac")? && !self.esac_starts_pattern()) {
                break;
            }
            self.skip_whitespace_and_newlines();
            if self.is_at('(') {
                self.advance();
                self.skip_whitespace_and_newlines();
            }
            let pattern = self.scan_case_pattern();
            if pattern.is_empty() {
                return Err(self.token_error("Expected pattern in case statement"));
            }

            self.skip_whitespace();
            let mut body = None;
            if self.peek_case_terminator().is_none() {
                self.skip_whitespace_and_newlines();
                if !self.at_end() && !self.at_reserved("esac")? && self.peek_case_terminator().is_none() {
                    body = self.parse_list_until(&["esac"])?;
                    self.skip_whitespace();
                }
            }
            let terminator = self.consume_case_terminator();
            self.skip_whitespace_and_newlines();
            patterns.push(CasePatternNode {
                pattern,
                body: body.map(Box::new),
                terminator,
            });
        }
        self.state.remove(ParserState::CASEPAT);

        self.skip_whitespace_and_newlines();
        if !self.lex_consume_word("esac")? {
            return Err(self.token_error("Expected 'esac' to close case statement"));
        }
        Ok(Node::Case(CaseNode {
            word,
            patterns,
            redirects: self.collect_redirects()?,
        }))
    }

    /// `esac)` followed by a command is a pattern named `esac`, not the end
    /// of the case
    fn esac_starts_pattern(&mut self) -> bool {
        let saved = self.pos();
        self.skip_whitespace();
        while self.peek().is_some_and(|c| !is_metachar(c) && !is_quote(c)) {
            self.advance();
        }
        self.skip_whitespace();
        let mut is_pattern = false;
        if self.is_at(')') && self.eof_token != Some(')') {
            self.advance();
            self.skip_whitespace();
            is_pattern = match self.peek() {
                Some(';') => true,
                Some('\n' | ')') | None => false,
                Some(_) => true,
            };
        }
        self.set_pos(saved);
        is_pattern
    }

    /// Raw pattern text up to the `)` that ends it. Unquoted blanks are
    /// dropped; quotes, brackets and extglob groups are kept verbatim.
    fn scan_case_pattern(&mut self) -> String {
        self.ctx.push(ContextKind::CasePattern);
        let mut pattern = String::new();
        let mut group_depth = 0usize;

        while let Some(ch) = self.peek() {
            let pos = self.pos();
            match ch {
                ')' if group_depth == 0 => {
                    self.advance();
                    break;
                }
                ')' => {
                    self.take_into_string(&mut pattern);
                    // a nested case's pattern close leaves the group open
                    if self.ctx.current().case_depth == 0 {
                        group_depth -= 1;
                    }
                }
                '\\' => {
                    if self.peek_at(1) == Some('\n') {
                        self.set_pos(pos + 2);
                    } else {
                        self.take_into_string(&mut pattern);
                        self.take_into_string(&mut pattern);
                    }
                }
                '$' if scanner::is_expansion_start(self.lexer.input(), pos, "$(") => {
                    self.take_into_string(&mut pattern);
                    self.take_into_string(&mut pattern);
                    if self.is_at('(') {
                        self.take_into_string(&mut pattern);
                        let mut depth = 2usize;
                        while depth > 0 {
                            match self.peek() {
                                Some('(') => depth += 1,
                                Some(')') => depth -= 1,
                                Some(_) => {}
                                None => break,
                            }
                            self.take_into_string(&mut pattern);
                        }
                    } else {
                        group_depth += 1;
                    }
                }
                'c' if group_depth > 0 && self.nested_keyword_at(pos, "case") =>
                {
                    self.ctx.current_mut().case_depth += 1;
                    for _ in 0..4 {
                        self.take_into_string(&mut pattern);
                    }
                }
                'e' if self.ctx.current().case_depth > 0 && self.nested_keyword_at(pos, "esac") =>
                {
                    self.ctx.current_mut().case_depth -= 1;
                    for _ in 0..4 {
                        self.take_into_string(&mut pattern);
                    }
                }
                '(' if group_depth > 0 => {
                    self.take_into_string(&mut pattern);
                    group_depth += 1;
                }
                c if self.options.extglob && is_extglob_prefix(c) && self.peek_at(1) == Some('(') => {
                    self.take_into_string(&mut pattern);
                    self.take_into_string(&mut pattern);
                    group_depth += 1;
                }
                '[' => self.scan_case_bracket(&mut pattern),
                '\'' => {
                    self.take_into_string(&mut pattern);
                    while self.peek().is_some_and(|c| c != '\'') {
                        self.take_into_string(&mut pattern);
                    }
                    self.take_into_string(&mut pattern);
                }
                '"' => {
                    self.take_into_string(&mut pattern);
                    while let Some(c) = self.peek() {
                        if c == '"' {
                            break;
                        }
                        if c == '\\' && self.peek_at(1).is_some() {
                            self.take_into_string(&mut pattern);
                        }
                        self.take_into_string(&mut pattern);
                    }
                    self.take_into_string(&mut pattern);
                }
                c if is_whitespace(c) => {
                    if group_depth > 0 {
                        self.take_into_string(&mut pattern);
                    } else {
                        self.advance();
                    }
                }
                _ => self.take_into_string(&mut pattern),
            }
        }

        self.ctx.pop();
        pattern
    }

    /// `case` (with a closing `esac` ahead) or `esac` as a whole word at `pos`
    fn nested_keyword_at(&self, pos: usize, keyword: &str) -> bool {
        let input = self.lexer.input();
        if !scanner::starts_with_at(input, pos, keyword) || !scanner::is_word_boundary(input, pos, keyword.len()) {
            return false;
        }
        keyword != "case" || scanner::lookahead_for_esac(input, pos + keyword.len(), 1)
    }

    /// `[` in a pattern: a whole bracket expression when one closes before
    /// the pattern ends, otherwise a literal `[`
    fn scan_case_bracket(&mut self, pattern: &mut String) {
        let mut i = self.pos() + 1;
        if matches!(self.char_at(i), Some('^' | '!')) {
            i += 1;
        }
        let leading_bracket = self.char_at(i) == Some(']');
        if leading_bracket {
            i += 1;
        }
        let mut depth = 0usize;
        let mut closes = false;
        while let Some(c) = self.char_at(i) {
            match c {
                ']' if depth == 0 => {
                    closes = true;
                    break;
                }
                '[' => depth += 1,
                ')' | '|' if depth == 0 => break,
                _ => {}
            }
            i += 1;
        }

        self.take_into_string(pattern);
        if !closes {
            return;
        }
        if matches!(self.peek(), Some('^' | '!')) {
            self.take_into_string(pattern);
        }
        if leading_bracket && self.is_at(']') {
            self.take_into_string(pattern);
        }
        while self.peek().is_some_and(|c| c != ']') {
            self.take_into_string(pattern);
        }
        self.take_into_string(pattern);
    }

    // =========================================================================
    // COPROC & FUNCTIONS
    // =========================================================================

    fn parse_coproc(&mut self) -> Result<Option<Node>> {
        self.skip_whitespace();
        if !self.lex_consume_word("coproc")? {
            return Ok(None);
        }
        self.skip_whitespace();

        if let Some(command) = self.parse_coproc_compound()? {
            return Ok(Some(coproc(None, command)));
        }

        let word_start = self.pos();
        if let Some(name) = self.peek_word() {
            while self.peek().is_some_and(|c| !is_metachar(c) && !is_quote(c)) {
                self.advance();
            }
            self.skip_whitespace();
            if is_valid_identifier(&name) {
                if let Some(command) = self.parse_coproc_compound()? {
                    return Ok(Some(coproc(Some(name), command)));
                }
            }
            trace!(word = %name, "coproc word is not a name");
            self.set_pos(word_start);
        }

        match self.parse_command()? {
            Some(command) => Ok(Some(coproc(None, command))),
            None => Err(self.syntax_error("Expected command after coproc", self.pos())),
        }
    }

    /// The compound command forms a coproc may run directly
    fn parse_coproc_compound(&mut self) -> Result<Option<Node>> {
        match self.peek() {
            Some('{') => {
                if let Some(group) = self.parse_brace_group()? {
                    return Ok(Some(Node::BraceGroup(group)));
                }
            }
            Some('(') => {
                if self.peek_at(1) == Some('(') {
                    if let Some(node) = self.parse_arithmetic_command()? {
                        return Ok(Some(node));
                    }
                }
                return self.parse_subshell();
            }
            _ => {}
        }
        let keyword = self.peek_reserved_word()?;
        if keyword.as_deref().is_some_and(|k| COMPOUND_KEYWORDS.contains(k)) {
            return self.parse_compound_command();
        }
        Ok(None)
    }

    /// `function name [()] body` or `name () body`. Returns `None` with the
    /// cursor restored when the words do not form a function header.
    fn parse_function(&mut self) -> Result<Option<Node>> {
        self.skip_whitespace();
        if self.at_end() {
            return Ok(None);
        }
        let saved = self.pos();

        if self.at_reserved("function")? {
            self.lex_consume_word("function")?;
            self.skip_whitespace();
            let Some(name) = self.peek_word() else {
                self.set_pos(saved);
                return Ok(None);
            };
            self.consume_word(&name);
            self.skip_whitespace();
            if self.is_at('(') && self.peek_at(1) == Some(')') {
                self.set_pos(self.pos() + 2);
            }
            self.skip_whitespace_and_newlines();
            return self.finish_function(name).map(Some);
        }

        let Some(word) = self.peek_word() else {
            return Ok(None);
        };
        if RESERVED_WORDS.contains(word.as_str()) || scanner::looks_like_assignment(&word) {
            return Ok(None);
        }

        self.skip_whitespace();
        let name_start = self.pos();
        while self
            .peek()
            .is_some_and(|c| !is_metachar(c) && !is_quote(c) && c != '(' && c != ')')
        {
            self.advance();
        }
        let name = self.lexer.slice(name_start, self.pos());
        if name.is_empty() || has_open_brace_expansion(&name) {
            self.set_pos(saved);
            return Ok(None);
        }

        let after_name = self.pos();
        self.skip_whitespace();
        let spaced = self.pos() > after_name;
        // `@(...)` and friends are globs, not headers
        let glob_suffix = name.ends_with(['*', '?', '@', '+', '!', '$']);
        if (!spaced && glob_suffix) || !self.is_at('(') {
            self.set_pos(saved);
            return Ok(None);
        }
        self.advance();
        self.skip_whitespace();
        if !self.is_at(')') {
            trace!(name = %name, "not a function header");
            self.set_pos(saved);
            return Ok(None);
        }
        self.advance();
        self.skip_whitespace_and_newlines();
        self.finish_function(name).map(Some)
    }

    fn finish_function(&mut self, name: String) -> Result<Node> {
        let Some(body) = self.parse_function_body()? else {
            return Err(self.syntax_error("Expected function body", self.pos()));
        };
        Ok(Node::Function(FunctionNode {
            name,
            body: Box::new(body),
        }))
    }
}

fn coproc(name: Option<String>, command: Node) -> Node {
    Node::Coproc(CoprocNode {
        name,
        command: Box::new(command),
    })
}

/// A `${` in the name that is still open at its end
fn has_open_brace_expansion(name: &str) -> bool {
    let chars: Vec<char> = name.chars().collect();
    let mut depth: i32 = 0;
    let mut i = 0;
    while i < chars.len() {
        if scanner::is_expansion_start(&chars, i, "${") {
            depth += 1;
            i += 2;
            continue;
        }
        if chars[i] == '}' {
            depth -= 1;
        }
        i += 1;
    }
    depth > 0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::types::{ListOperator, WordNode};
    use crate::parser::types::ParseOptions;

    fn word_values(words: &Option<Vec<WordNode>>) -> Option<Vec<&str>> {
        words
            .as_ref()
            .map(|list| list.iter().map(|w| w.value.as_str()).collect())
    }

    fn parse_one(source: &str) -> Node {
        let nodes = Parser::new(source, &ParseOptions::default()).parse().unwrap();
        assert_eq!(nodes.len(), 1, "expected one node for {source:?}: {nodes:?}");
        nodes.into_iter().next().unwrap()
    }

    fn parse_err(source: &str) -> String {
        Parser::new(source, &ParseOptions::default())
            .parse()
            .unwrap_err()
            .message()
            .to_string()
    }

    fn command_words(node: &Node) -> Vec<&str> {
        match node {
            Node::Command(cmd) => cmd.words.iter().map(|w| w.value.as_str()).collect(),
            other => panic!("expected command, got {other:?}"),
        }
    }

    #[test]
    fn test_if_elif_else() {
        let Node::If(node) = parse_one("if a; then b; elif c; then d; else e; fi") else {
            panic!("expected if");
        };
        assert_eq!(command_words(&node.condition), vec!["a"]);
        let Some(Node::If(elif)) = node.else_body.as_deref() else {
            panic!("expected elif");
        };
        assert_eq!(command_words(&elif.condition), vec!["c"]);
        assert_eq!(command_words(elif.else_body.as_deref().unwrap()), vec!["e"]);
    }

    #[test]
    fn test_if_errors() {
        assert_eq!(parse_err("if (true) x; fi"), "Expected 'then' after if condition");
        assert_eq!(parse_err("if true; fi"), "Unexpected reserved word 'fi'");
        assert_eq!(parse_err("if true; then echo"), "Expected 'fi' to close if statement");
        assert_eq!(parse_err("if; then x; fi"), "Expected condition after 'if'");
    }

    #[test]
    fn test_while_and_until() {
        let Node::While(node) = parse_one("while read l\ndo echo $l\ndone < f") else {
            panic!("expected while");
        };
        assert_eq!(node.redirects.len(), 1);
        assert!(matches!(parse_one("until false; do :; done"), Node::Until(_)));
        assert_eq!(parse_err("while true; do x"), "Expected 'done' to close while loop");
    }

    #[test]
    fn test_for_forms() {
        let Node::For(node) = parse_one("for i in a b c; do echo $i; done") else {
            panic!("expected for");
        };
        assert_eq!(node.var, "i");
        assert_eq!(word_values(&node.words), Some(vec!["a", "b", "c"]));

        let Node::For(node) = parse_one("for i\ndo echo; done") else {
            panic!("expected for");
        };
        assert!(node.words.is_none());

        let Node::For(node) = parse_one("for i in x; { echo; }") else {
            panic!("expected for");
        };
        let Node::List(body) = node.body.as_ref() else {
            panic!("expected list body, got {:?}", node.body);
        };
        assert_eq!(body.commands().count(), 1);
        assert!(matches!(body.commands().next(), Some(Node::Command(_))));
        assert_eq!(body.operators().collect::<Vec<_>>(), vec![ListOperator::Semi]);
    }

    #[test]
    fn test_for_needs_delimiter_before_do() {
        assert_eq!(parse_err("for i in a do echo; done"), "Expected ';' or newline before 'do'");
    }

    #[test]
    fn test_for_arith() {
        let Node::ForArith(node) = parse_one("for ((i=0; i<(n); i++)); do echo; done") else {
            panic!("expected arith for");
        };
        assert_eq!(node.init, "i=0");
        assert_eq!(node.cond, "i<(n)");
        assert_eq!(node.incr, "i++");
        assert_eq!(parse_err("for ((i=0; i<3)); do :; done"), "Expected three expressions in for ((;;))");
    }

    #[test]
    fn test_select() {
        let Node::Select(node) = parse_one("select x in a b\ndo break; done") else {
            panic!("expected select");
        };
        assert_eq!(word_values(&node.words), Some(vec!["a", "b"]));
    }

    #[test]
    fn test_case_patterns_and_terminators() {
        let Node::Case(node) = parse_one("case $x in\n a|b) one;;\n (c) two;&\n *) three;;&\n d) ;;\nesac") else {
            panic!("expected case");
        };
        let patterns: Vec<_> = node.patterns.iter().map(|p| p.pattern.as_str()).collect();
        assert_eq!(patterns, vec!["a|b", "c", "*", "d"]);
        let terms: Vec<_> = node.patterns.iter().map(|p| p.terminator).collect();
        assert_eq!(
            terms,
            vec![
                CaseTerminator::Break,
                CaseTerminator::FallThrough,
                CaseTerminator::Continue,
                CaseTerminator::Break
            ]
        );
        assert!(node.patterns[3].body.is_none());
    }

    #[test]
    fn test_case_last_pattern_without_terminator() {
        let Node::Case(node) = parse_one("case x in y) echo\nesac") else {
            panic!("expected case");
        };
        assert_eq!(node.patterns.len(), 1);
        assert!(node.patterns[0].body.is_some());
    }

    #[test]
    fn test_case_pattern_bracket_and_quotes() {
        let Node::Case(node) = parse_one("case x in [ab]|'a b') :;; esac") else {
            panic!("expected case");
        };
        assert_eq!(node.patterns[0].pattern, "[ab]|'a b'");
    }

    #[test]
    fn test_case_pattern_with_nested_case_substitution() {
        let Node::Case(node) = parse_one("case x in $(case y in z) echo z;; esac)) :;; esac") else {
            panic!("expected case");
        };
        assert_eq!(node.patterns[0].pattern, "$(case y in z) echo z;; esac)");
    }

    #[test]
    fn test_case_errors() {
        assert_eq!(parse_err("case x y) ;; esac"), "Expected 'in' after case word");
        assert_eq!(parse_err("case x in a) echo;;"), "Expected 'esac' to close case statement");
    }

    #[test]
    fn test_subshell_and_brace_group() {
        let Node::Subshell(node) = parse_one("(cd /; ls) > out") else {
            panic!("expected subshell");
        };
        assert!(matches!(*node.body, Node::List(_)));
        assert_eq!(node.redirects.len(), 1);
        assert!(matches!(parse_one("{ echo; }"), Node::BraceGroup(_)));
        assert_eq!(parse_err("( echo"), "Expected ) to close subshell");
        assert_eq!(parse_err("{ echo; "), "Expected } to close brace group");
    }

    #[test]
    fn test_arithmetic_command_vs_nested_subshell() {
        let Node::ArithmeticCommand(node) = parse_one("(( x = 1 + 2 ))") else {
            panic!("expected arithmetic command");
        };
        assert_eq!(node.raw_content, " x = 1 + 2 ");
        assert!(node.expression.is_some());
        assert!(matches!(parse_one("((a) || b)"), Node::Subshell(_)));
    }

    #[test]
    fn test_unterminated_arithmetic_command() {
        let err = Parser::new("(( 1 + 2", &ParseOptions::default()).parse().unwrap_err();
        assert!(err.is_unterminated());
    }

    #[test]
    fn test_function_forms() {
        for source in ["f() { echo; }", "function f { echo; }", "function f() ( echo )"] {
            let Node::Function(node) = parse_one(source) else {
                panic!("expected function for {source}");
            };
            assert_eq!(node.name, "f");
        }
        assert_eq!(parse_err("f() echo"), "Expected function body");
    }

    #[test]
    fn test_glob_word_is_not_function_header() {
        let options = ParseOptions {
            extglob: true,
            ..Default::default()
        };
        let nodes = Parser::new("x@(a|b)", &options).parse().unwrap();
        assert_eq!(command_words(&nodes[0]), vec!["x@(a|b)"]);
    }

    #[test]
    fn test_coproc_forms() {
        let Node::Coproc(node) = parse_one("coproc NAME { cat; }") else {
            panic!("expected coproc");
        };
        assert_eq!(node.name.as_deref(), Some("NAME"));

        let Node::Coproc(node) = parse_one("coproc cat file") else {
            panic!("expected coproc");
        };
        assert!(node.name.is_none());
        assert_eq!(command_words(&node.command), vec!["cat", "file"]);

        let Node::Coproc(node) = parse_one("coproc w while true; do :; done") else {
            panic!("expected coproc");
        };
        assert!(matches!(*node.command, Node::While(_)));
    }

    #[test]
    fn test_unexpected_reserved_word() {
        assert_eq!(parse_err("then echo"), "Unexpected reserved word 'then'");
    }
}
