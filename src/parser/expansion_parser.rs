//! Expansion Parser - `$` expansions and substitutions inside words
//!
//! Handles parameter expansion (`$x`, `${...}`), command substitution
//! (`$(...)`, `${ ...; }`, backticks), arithmetic expansion (`$((...))`,
//! `$[...]`), process substitution, locale strings and array literals.
//!
//! Every reader returns the structured part together with the exact source
//! text it consumed, or `None` with the cursor restored when the text at the
//! cursor is not that construct.

use crate::ast::types::{
    ArithDeprecatedNode, ArithmeticExpansionNode, ArrayNode, CommandSubstitutionNode,
    LocaleStringNode, Node, ParamExpansionNode, ParamIndirectNode, ParamLengthNode,
    ProcessSubstitutionNode, WordPart,
};
use crate::parser::arithmetic_parser::parse_arithmetic_nested;
use crate::parser::context::{ContextKind, LexMode};
use crate::parser::parser::Parser;
use crate::parser::scanner;
use crate::parser::types::{
    is_blank, is_escape_char_in_backtick, is_funsub_char, is_ident_char, is_ident_start,
    is_metachar, is_simple_param_op, is_special_param, is_special_param_unbraced, is_whitespace,
    DolbraceState, MatchedPairFlags, ParserState, Result,
};
use tracing::trace;

/// A word part and the source text it was read from
pub(crate) type Expansion = (WordPart, String);

fn param_expansion(param: String, op: String, arg: String) -> WordPart {
    WordPart::ParamExpansion(ParamExpansionNode {
        param,
        op: (!op.is_empty()).then_some(op),
        arg: (!arg.is_empty()).then_some(arg),
    })
}

impl Parser {
    /// Dispatch on the text after `$`. Appends the expansion to the word and
    /// returns false when nothing was recognized.
    pub(crate) fn parse_dollar_expansion(
        &mut self,
        buf: &mut Vec<char>,
        parts: &mut Vec<WordPart>,
        in_dquote: bool,
    ) -> Result<bool> {
        let found = if self.lexer.starts_with("$((") {
            match self.parse_arithmetic_expansion()? {
                Some(found) => Some(found),
                None => self.parse_command_substitution()?,
            }
        } else if self.lexer.starts_with("$[") {
            self.parse_deprecated_arithmetic()?
        } else if self.lexer.starts_with("$(") {
            self.parse_command_substitution()?
        } else {
            self.read_param_expansion(in_dquote)?
        };
        Ok(match found {
            Some((part, text)) => {
                parts.push(part);
                buf.extend(text.chars());
                true
            }
            None => false,
        })
    }

    // =========================================================================
    // COMMAND SUBSTITUTION
    // =========================================================================

    /// `$(list)`, parsed in place with `)` as the end of the token stream
    pub(crate) fn parse_command_substitution(&mut self) -> Result<Option<Expansion>> {
        if !self.lexer.starts_with("$(") {
            return Ok(None);
        }
        let start = self.pos();
        self.set_pos(start + 2);
        self.enter()?;
        let saved = self.save_state();
        self.begin_nested_list(')');

        let body = self.parse_list(true)?.unwrap_or(Node::Empty);
        self.skip_whitespace_and_newlines();
        self.lexer.quote.pop();
        self.leave();

        if !self.is_at(')') {
            if self.at_end() {
                return Err(self.unterminated("unexpected EOF while looking for matching `)'", start));
            }
            self.abandon_state(saved);
            self.set_pos(start);
            return Ok(None);
        }
        self.advance();
        let text = self.lexer.slice(start, self.pos());
        self.restore_nested_state(saved);
        trace!(offset = start, "command substitution");
        Ok(Some((
            WordPart::CommandSubstitution(CommandSubstitutionNode {
                command: Box::new(body),
                brace: false,
            }),
            text,
        )))
    }

    /// Reset lexer state for a list nested inside a word, ended by `close`.
    /// Heredocs pending on the enclosing line are not visible inside.
    fn begin_nested_list(&mut self, close: char) {
        self.pending_heredocs.clear();
        self.state.insert(ParserState::CMDSUBST | ParserState::EOFTOKEN);
        self.eof_token = Some(close);
        self.dolbrace = DolbraceState::None;
        self.mode = LexMode::default();
        self.ctx.push(ContextKind::CommandSub);
        self.lexer.quote.push();
    }

    /// `${ list; }` and `${| list; }`; the cursor is just past `${`
    pub(crate) fn parse_funsub(&mut self, start: usize) -> Result<Expansion> {
        if self.is_at('|') {
            self.advance();
        }
        self.enter()?;
        let saved = self.save_state();
        self.begin_nested_list('}');

        let body = self.parse_list(true)?.unwrap_or(Node::Empty);
        self.skip_whitespace_and_newlines();
        self.lexer.quote.pop();
        self.leave();

        if !self.is_at('}') {
            self.abandon_state(saved);
            return Err(self.unterminated("unexpected EOF looking for `}'", start));
        }
        self.advance();
        let text = self.lexer.slice(start, self.pos());
        self.restore_nested_state(saved);
        Ok((
            WordPart::CommandSubstitution(CommandSubstitutionNode {
                command: Box::new(body),
                brace: true,
            }),
            text,
        ))
    }

    /// `` `...` ``. Backslash escapes of `$`, `` ` `` and `\` are removed
    /// from the command text; heredocs opened inside the backticks have
    /// their bodies collected even when they continue past the closing
    /// backtick.
    pub(crate) fn parse_backtick_substitution(&mut self) -> Result<Option<Expansion>> {
        if !self.is_at('`') {
            return Ok(None);
        }
        let start = self.pos();
        self.advance();
        let mut scan = BacktickScan::default();
        scan.text.push('`');

        while let Some(c) = self.peek() {
            if let Some((delimiter, strip_tabs)) = scan.body.clone() {
                self.read_backtick_heredoc_line(&mut scan, &delimiter, strip_tabs);
                continue;
            }
            if c == '`' {
                break;
            }
            if c == '\\' && self.peek_at(1).is_some() {
                let next = self.peek_at(1).unwrap_or('\\');
                if next == '\n' {
                    self.set_pos(self.pos() + 2);
                } else if is_escape_char_in_backtick(next) {
                    self.set_pos(self.pos() + 2);
                    scan.content.push(next);
                    scan.text.push('\\');
                    scan.text.push(next);
                } else {
                    self.backtick_take(&mut scan);
                }
                continue;
            }
            if self.lexer.starts_with("<<<") {
                self.read_backtick_herestring(&mut scan);
                continue;
            }
            if self.lexer.starts_with("<<") {
                self.read_backtick_heredoc_operator(&mut scan);
                continue;
            }
            if c == '\n' {
                self.backtick_take(&mut scan);
                if !scan.pending.is_empty() {
                    scan.body = Some(scan.pending.remove(0));
                }
                continue;
            }
            self.backtick_take(&mut scan);
        }

        if self.at_end() {
            return Err(self.unterminated("Unterminated backtick", start));
        }
        self.advance();
        scan.text.push('`');

        let mut content = scan.content;
        if !scan.pending.is_empty() {
            let (body_start, body_end) =
                scanner::find_heredoc_content_end(self.lexer.input(), self.pos(), &scan.pending);
            if body_end > body_start {
                content.push_str(&self.lexer.slice(body_start, body_end));
                let end = self.cmdsub_heredoc_end.map_or(body_end, |e| e.max(body_end));
                self.cmdsub_heredoc_end = Some(end);
            }
        }

        let origin = self.lexer.location(start + 1);
        let command = Parser::parse_nested_list(&content, &self.options, origin, self.depth + 1)?;
        Ok(Some((
            WordPart::CommandSubstitution(CommandSubstitutionNode {
                command: Box::new(command),
                brace: false,
            }),
            scan.text,
        )))
    }

    fn backtick_take(&mut self, scan: &mut BacktickScan) {
        if let Some(c) = self.advance() {
            scan.content.push(c);
            scan.text.push(c);
        }
    }

    /// One line of a heredoc body inside backticks
    fn read_backtick_heredoc_line(&mut self, scan: &mut BacktickScan, delimiter: &str, strip_tabs: bool) {
        let line_start = self.pos();
        let mut line_end = line_start;
        while self.char_at(line_end).is_some_and(|c| c != '\n') {
            line_end += 1;
        }
        let line = self.lexer.slice(line_start, line_end);
        let check = if strip_tabs { line.trim_start_matches('\t') } else { line.as_str() };

        if check == delimiter || (check.starts_with(delimiter) && check.len() > delimiter.len()) {
            let consumed = if check == delimiter {
                line.chars().count()
            } else {
                line.chars().count() - check.chars().count() + delimiter.chars().count()
            };
            let head: String = line.chars().take(consumed).collect();
            scan.content.push_str(&head);
            scan.text.push_str(&head);
            self.set_pos(line_start + consumed);
            if check == delimiter && self.is_at('\n') {
                self.backtick_take(scan);
            }
            scan.body = (!scan.pending.is_empty()).then(|| scan.pending.remove(0));
            return;
        }

        scan.content.push_str(&line);
        scan.text.push_str(&line);
        self.set_pos(line_end);
        if self.is_at('\n') {
            self.backtick_take(scan);
        }
    }

    /// `<<<word` inside backticks is copied through
    fn read_backtick_herestring(&mut self, scan: &mut BacktickScan) {
        for _ in 0..3 {
            self.backtick_take(scan);
        }
        while self.peek().is_some_and(is_blank) {
            self.backtick_take(scan);
        }
        while let Some(c) = self.peek() {
            if is_whitespace(c) || c == '(' || c == ')' {
                break;
            }
            if c == '\\' && self.peek_at(1).is_some() {
                self.backtick_take(scan);
                self.backtick_take(scan);
            } else if c == '"' || c == '\'' {
                self.backtick_take(scan);
                while self.peek().is_some_and(|q| q != c) {
                    if c == '"' && self.is_at('\\') {
                        self.backtick_take(scan);
                    }
                    self.backtick_take(scan);
                }
                self.backtick_take(scan);
            } else {
                self.backtick_take(scan);
            }
        }
    }

    /// `<<DELIM` or `<<-DELIM` inside backticks; the delimiter is queued so
    /// the body lines after the next newline are kept verbatim
    fn read_backtick_heredoc_operator(&mut self, scan: &mut BacktickScan) {
        self.backtick_take(scan);
        self.backtick_take(scan);
        let strip_tabs = self.is_at('-');
        if strip_tabs {
            self.backtick_take(scan);
        }
        while self.peek().is_some_and(is_blank) {
            self.backtick_take(scan);
        }

        let mut delimiter = String::new();
        let mut take = |parser: &mut Self, scan: &mut BacktickScan, keep: bool| {
            if let Some(c) = parser.advance() {
                scan.content.push(c);
                scan.text.push(c);
                if keep {
                    delimiter.push(c);
                }
            }
        };
        match self.peek() {
            Some(q @ ('"' | '\'')) => {
                take(self, scan, false);
                while self.peek().is_some_and(|c| c != q) {
                    take(self, scan, true);
                }
                take(self, scan, false);
            }
            Some('\\') => {
                take(self, scan, false);
                take(self, scan, true);
                while self.peek().is_some_and(|c| !is_metachar(c)) {
                    take(self, scan, true);
                }
            }
            Some(_) => {
                while let Some(c) = self.peek() {
                    if is_metachar(c) || c == '`' {
                        break;
                    }
                    if c == '"' || c == '\'' {
                        take(self, scan, false);
                        while self.peek().is_some_and(|d| d != c) {
                            take(self, scan, true);
                        }
                        take(self, scan, false);
                    } else if c == '\\' {
                        take(self, scan, false);
                        take(self, scan, true);
                    } else {
                        take(self, scan, true);
                    }
                }
            }
            None => {}
        }
        if !delimiter.is_empty() {
            scan.pending.push((delimiter, strip_tabs));
        }
    }

    // =========================================================================
    // PROCESS SUBSTITUTION
    // =========================================================================

    /// `<(list)` or `>(list)`. When the list does not parse, the text is kept
    /// as a literal matched-pair group with no node; the outer `None` means
    /// the cursor is not on a process substitution at all.
    pub(crate) fn parse_process_substitution(&mut self) -> Result<Option<(Option<WordPart>, String)>> {
        let Some(direction) = self.peek().filter(|c| matches!(c, '<' | '>')) else {
            return Ok(None);
        };
        if self.peek_at(1) != Some('(') {
            return Ok(None);
        }
        let start = self.pos();
        self.set_pos(start + 2);

        let saved = self.save_state();
        let saved_quote = self.lexer.quote.clone();
        let saved_depth = self.depth;
        let outer_in_process_sub = self.in_process_sub;
        self.in_process_sub = true;
        self.pending_heredocs.clear();
        self.state.insert(ParserState::EOFTOKEN);
        self.eof_token = Some(')');
        self.dolbrace = DolbraceState::None;
        self.mode = LexMode::default();
        self.ctx.push(ContextKind::CommandSub);
        self.lexer.quote.push();

        let attempt = self.process_substitution_body();
        self.in_process_sub = outer_in_process_sub;
        self.lexer.quote = saved_quote;

        match attempt {
            Ok(body) => {
                self.restore_nested_state(saved);
                let text = scanner::strip_line_continuations_comment_aware(&self.lexer.slice(start, self.pos()));
                Ok(Some((
                    Some(WordPart::ProcessSubstitution(ProcessSubstitutionNode {
                        direction: direction.to_string(),
                        command: Box::new(body),
                    })),
                    text,
                )))
            }
            Err(err) => {
                trace!(%err, offset = start, "process substitution kept as literal text");
                self.depth = saved_depth;
                self.abandon_state(saved);
                if err.is_depth_limit() {
                    return Err(err);
                }
                if self.char_at(start + 2).is_some_and(is_whitespace) {
                    return Err(self.syntax_error("Invalid process substitution", start));
                }
                self.set_pos(start + 2);
                self.parse_matched_pair('(', ')', MatchedPairFlags::NONE, false)?;
                let text = scanner::strip_line_continuations_comment_aware(&self.lexer.slice(start, self.pos()));
                Ok(Some((None, text)))
            }
        }
    }

    fn process_substitution_body(&mut self) -> Result<Node> {
        self.enter()?;
        let body = self.parse_list(true)?.unwrap_or(Node::Empty);
        self.skip_whitespace_and_newlines();
        self.leave();
        if !self.is_at(')') {
            return Err(self.syntax_error("Expected ) to close process substitution", self.pos()));
        }
        self.advance();
        Ok(body)
    }

    // =========================================================================
    // ARRAY LITERAL
    // =========================================================================

    /// `( word... )` after `name=` or `name+=`
    pub(crate) fn parse_array_literal(&mut self) -> Result<Option<Expansion>> {
        if !self.is_at('(') {
            return Ok(None);
        }
        let start = self.pos();
        self.advance();
        self.state.insert(ParserState::COMPASSIGN);
        let elements = self.parse_array_elements(start);
        self.state.remove(ParserState::COMPASSIGN);
        let elements = elements?;
        self.advance();
        let text = self.lexer.slice(start, self.pos());
        Ok(Some((WordPart::Array(ArrayNode { elements }), text)))
    }

    fn parse_array_elements(&mut self, start: usize) -> Result<Vec<crate::ast::types::WordNode>> {
        let mut elements = Vec::new();
        loop {
            self.skip_whitespace_and_newlines();
            if self.at_end() {
                return Err(self.unterminated("Unterminated array literal", start));
            }
            if self.is_at(')') {
                return Ok(elements);
            }
            match self.parse_word(false, true, false)? {
                Some(word) => elements.push(word),
                None if self.is_at(')') => return Ok(elements),
                None => return Err(self.syntax_error("Expected word in array literal", self.pos())),
            }
        }
    }

    // =========================================================================
    // ARITHMETIC EXPANSION
    // =========================================================================

    /// `$(( expr ))`. Returns `None` with the cursor restored when the
    /// parens do not balance as arithmetic (e.g. `$( (a) )`) or the
    /// expression does not parse; the caller then tries `$(`.
    pub(crate) fn parse_arithmetic_expansion(&mut self) -> Result<Option<Expansion>> {
        if !self.lexer.starts_with("$((") {
            return Ok(None);
        }
        let start = self.pos();
        self.set_pos(start + 3);
        let content_start = self.pos();
        let mut first_close: Option<usize> = None;

        self.ctx.push(ContextKind::Arithmetic);
        self.ctx.current_mut().paren_depth = 2;
        while let Some(c) = self.peek() {
            let depth = self.ctx.current().paren_depth;
            match c {
                '\'' => {
                    self.advance();
                    while self.peek().is_some_and(|q| q != '\'') {
                        self.advance();
                    }
                    self.advance();
                }
                '"' => {
                    self.advance();
                    while let Some(q) = self.advance() {
                        if q == '\\' {
                            self.advance();
                        } else if q == '"' {
                            break;
                        }
                    }
                }
                '\\' if self.peek_at(1).is_some() => {
                    self.set_pos(self.pos() + 2);
                }
                '(' => {
                    self.ctx.current_mut().paren_depth += 1;
                    self.advance();
                }
                ')' => {
                    if depth == 2 {
                        first_close = Some(self.pos());
                    }
                    self.ctx.current_mut().paren_depth -= 1;
                    if depth == 1 {
                        break;
                    }
                    self.advance();
                }
                _ => {
                    if depth == 1 {
                        first_close = None;
                    }
                    self.advance();
                }
            }
        }
        let depth = self.ctx.current().paren_depth;
        self.ctx.pop();

        if depth != 0 {
            if self.at_end() {
                return Err(self.unterminated("unexpected EOF looking for `))'", start));
            }
            self.set_pos(start);
            return Ok(None);
        }
        let content = self.lexer.slice(content_start, first_close.unwrap_or(self.pos()));
        self.advance();
        let text = self.lexer.slice(start, self.pos());

        let origin = self.lexer.location(content_start);
        match parse_arithmetic_nested(&content, &self.options, origin, self.depth + 1) {
            Ok(expression) => Ok(Some((
                WordPart::ArithmeticExpansion(ArithmeticExpansionNode {
                    expression: expression.map(Box::new),
                }),
                text,
            ))),
            Err(err) if err.is_depth_limit() => Err(err),
            Err(err) => {
                trace!(%err, offset = start, "arithmetic expansion did not parse");
                self.set_pos(start);
                Ok(None)
            }
        }
    }

    /// `$[ expr ]`, kept as raw text
    pub(crate) fn parse_deprecated_arithmetic(&mut self) -> Result<Option<Expansion>> {
        if !self.lexer.starts_with("$[") {
            return Ok(None);
        }
        let start = self.pos();
        self.set_pos(start + 2);
        let expression = self.parse_matched_pair('[', ']', MatchedPairFlags::ARITH, false)?;
        let text = self.lexer.slice(start, self.pos());
        Ok(Some((WordPart::ArithDeprecated(ArithDeprecatedNode { expression }), text)))
    }

    // =========================================================================
    // PARAMETER EXPANSION
    // =========================================================================

    /// `$name`, `$1`, `$?` or `${...}` at the cursor
    pub(crate) fn read_param_expansion(&mut self, in_dquote: bool) -> Result<Option<Expansion>> {
        if !self.is_at('$') {
            return Ok(None);
        }
        let start = self.pos();
        self.advance();
        let Some(ch) = self.peek() else {
            self.set_pos(start);
            return Ok(None);
        };

        if ch == '{' {
            self.advance();
            return self.read_braced_param(start, in_dquote).map(Some);
        }
        if is_special_param_unbraced(ch) || ch.is_ascii_digit() {
            self.advance();
            let text = self.lexer.slice(start, self.pos());
            return Ok(Some((WordPart::ParamExpansion(ParamExpansionNode::plain(ch)), text)));
        }
        if is_ident_start(ch) {
            let name_start = self.pos();
            while self.peek().is_some_and(is_ident_char) {
                self.advance();
            }
            let name = self.lexer.slice(name_start, self.pos());
            let text = self.lexer.slice(start, self.pos());
            return Ok(Some((WordPart::ParamExpansion(ParamExpansionNode::plain(name)), text)));
        }
        self.set_pos(start);
        Ok(None)
    }

    /// Body of `${...}`; the cursor is just past the `{`
    fn read_braced_param(&mut self, start: usize, in_dquote: bool) -> Result<Expansion> {
        if self.at_end() {
            return Err(self.unterminated("unexpected EOF looking for `}'", start));
        }
        self.enter()?;
        let saved_dolbrace = self.dolbrace;
        self.dolbrace = DolbraceState::Param;
        self.ctx.push(ContextKind::BraceExpansion);
        self.lexer.quote.push();
        let result = self.read_braced_param_body(start, in_dquote);
        self.lexer.quote.pop();
        self.ctx.pop();
        self.dolbrace = saved_dolbrace;
        self.leave();
        result
    }

    fn read_braced_param_body(&mut self, start: usize, in_dquote: bool) -> Result<Expansion> {
        let ch = self.peek().unwrap_or('}');
        if is_funsub_char(ch) {
            return self.parse_funsub(start);
        }

        if ch == '#' {
            self.advance();
            let param = self.consume_param_name()?;
            if !param.is_empty() && self.is_at('}') {
                self.advance();
                let text = self.lexer.slice(start, self.pos());
                return Ok((WordPart::ParamLength(ParamLengthNode { param }), text));
            }
            self.set_pos(start + 2);
        }

        if ch == '!' {
            if let Some(found) = self.read_indirect_param(start)? {
                return Ok(found);
            }
            self.set_pos(start + 2);
        }

        let param = self.consume_param_name()?;
        if param.is_empty() {
            let op_follows = match self.peek() {
                Some('-' | '=' | '+' | '?') => true,
                Some(':') => self.peek_at(1).is_some_and(is_simple_param_op),
                _ => false,
            };
            if !op_follows {
                let content = self.parse_matched_pair('{', '}', MatchedPairFlags::DOLBRACE, false)?;
                let text = format!("${{{content}}}");
                return Ok((WordPart::ParamExpansion(ParamExpansionNode::plain(content)), text));
            }
        }
        if self.at_end() {
            return Err(self.unterminated("unexpected EOF looking for `}'", start));
        }
        if self.is_at('}') {
            self.advance();
            let text = self.lexer.slice(start, self.pos());
            return Ok((WordPart::ParamExpansion(ParamExpansionNode::plain(param)), text));
        }

        let op = match self.lexer.consume_param_operator() {
            Some(op) => op,
            None => self.read_unusual_param_op()?,
        };
        self.update_dolbrace_for_op(&op, !param.is_empty());
        let mut flags = MatchedPairFlags::DOLBRACE;
        if in_dquote {
            flags.insert(MatchedPairFlags::DQUOTE);
        }
        let arg = self.parse_matched_pair('{', '}', flags, param.ends_with('$'))?;
        let text = format!("${{{param}{op}{arg}}}");
        Ok((param_expansion(param, op, arg), text))
    }

    /// `${!name}`, `${!prefix*}`, `${!name op arg}`. `None` when the text
    /// after `!` is not an indirect form.
    fn read_indirect_param(&mut self, start: usize) -> Result<Option<Expansion>> {
        self.advance();
        self.lexer.skip_blanks();
        let param = self.consume_param_name()?;
        if param.is_empty() {
            return Ok(None);
        }
        self.lexer.skip_blanks();

        if self.is_at('}') {
            self.advance();
            let text = self.lexer.slice(start, self.pos());
            return Ok(Some((indirect(param, String::new(), String::new()), text)));
        }
        if let Some(suffix) = self.peek().filter(|c| matches!(c, '@' | '*')) {
            self.advance();
            let trailing = self.parse_matched_pair('{', '}', MatchedPairFlags::DOLBRACE, false)?;
            let text = self.lexer.slice(start, self.pos());
            return Ok(Some((indirect(format!("{param}{suffix}{trailing}"), String::new(), String::new()), text)));
        }

        let op = match self.lexer.consume_param_operator() {
            Some(op) => Some(op),
            None => match self.peek() {
                Some(c) if !"}\"'`".contains(c) => {
                    self.advance();
                    Some(c.to_string())
                }
                _ => None,
            },
        };
        if let Some(op) = op {
            let arg = self.parse_matched_pair('{', '}', MatchedPairFlags::DOLBRACE, false)?;
            let text = self.lexer.slice(start, self.pos());
            return Ok(Some((indirect(param, op, arg), text)));
        }
        if self.at_end() {
            return Err(self.unterminated("unexpected EOF looking for `}'", start));
        }
        Ok(None)
    }

    /// Operator position holding something other than a known operator
    fn read_unusual_param_op(&mut self) -> Result<String> {
        let Some(c) = self.peek() else {
            return Ok(String::new());
        };
        let next = self.peek_at(1);
        match c {
            '$' if matches!(next, Some('"' | '\'')) => {
                // `$$'` is `$$` then a quote; `$'` opens an ANSI-C string
                let dollars = 1 + scanner::count_consecutive_dollars_before(self.lexer.input(), self.pos());
                if dollars % 2 == 1 {
                    return Ok(String::new());
                }
                self.advance();
                Ok(c.to_string())
            }
            '`' => {
                let tick = self.pos();
                self.advance();
                while let Some(b) = self.peek() {
                    if b == '`' {
                        break;
                    }
                    if b == '\\' && self.peek_at(1).is_some_and(is_escape_char_in_backtick) {
                        self.advance();
                    }
                    self.advance();
                }
                if self.at_end() {
                    return Err(self.unterminated("Unterminated backtick", tick));
                }
                self.advance();
                Ok("`".to_string())
            }
            '$' if next == Some('{') => Ok(String::new()),
            '\'' | '"' => Ok(String::new()),
            '\\' => {
                let mut op = String::new();
                self.take_into_string(&mut op);
                self.take_into_string(&mut op);
                Ok(op)
            }
            _ => {
                self.advance();
                Ok(c.to_string())
            }
        }
    }

    /// Parameter name inside `${`: a special parameter, digits, or an
    /// identifier with an optional `[subscript]`
    fn consume_param_name(&mut self) -> Result<String> {
        let Some(ch) = self.peek() else {
            return Ok(String::new());
        };
        if is_special_param(ch) {
            if ch == '$' && self.peek_at(1).is_some_and(|c| matches!(c, '{' | '\'' | '"')) {
                return Ok(String::new());
            }
            self.advance();
            return Ok(ch.to_string());
        }
        let mut name = String::new();
        if ch.is_ascii_digit() {
            while self.peek().is_some_and(|c| c.is_ascii_digit()) {
                self.take_into_string(&mut name);
            }
            return Ok(name);
        }
        if !is_ident_start(ch) {
            return Ok(name);
        }
        while let Some(c) = self.peek() {
            if is_ident_char(c) {
                self.take_into_string(&mut name);
            } else if c == '[' {
                if !self.lexer.param_subscript_has_close(self.pos()) {
                    break;
                }
                self.take_into_string(&mut name);
                let subscript = self.parse_matched_pair('[', ']', MatchedPairFlags::ARRAYSUB, false)?;
                name.push_str(&subscript);
                name.push(']');
                break;
            } else {
                break;
            }
        }
        Ok(name)
    }

    /// Advance the `${` state once the operator is known
    fn update_dolbrace_for_op(&mut self, op: &str, has_param: bool) {
        if self.dolbrace != DolbraceState::Param {
            return;
        }
        let Some(first) = op.chars().next() else {
            return;
        };
        if has_param {
            if "%#^,".contains(first) {
                self.dolbrace = DolbraceState::Quote;
                return;
            }
            if first == '/' {
                self.dolbrace = DolbraceState::Quote2;
                return;
            }
        }
        if "#%^,~:-=?+/".contains(first) {
            self.dolbrace = DolbraceState::Op;
        }
    }

    // =========================================================================
    // LOCALE STRING
    // =========================================================================

    /// `$"..."`. Returns the node, its source text and the expansions found
    /// inside, or `None` (cursor restored) when the closing quote is missing.
    pub(crate) fn read_locale_string(&mut self) -> Result<Option<(WordPart, String, Vec<WordPart>)>> {
        if !self.lexer.starts_with("$\"") {
            return Ok(None);
        }
        let start = self.pos();
        self.set_pos(start + 2);
        let mut content = String::new();
        let mut inner = Vec::new();
        let mut closed = false;

        while let Some(c) = self.peek() {
            if c == '"' {
                self.advance();
                closed = true;
                break;
            }
            if c == '\\' && self.peek_at(1).is_some() {
                if self.peek_at(1) == Some('\n') {
                    self.set_pos(self.pos() + 2);
                } else {
                    self.take_into_string(&mut content);
                    self.take_into_string(&mut content);
                }
                continue;
            }
            let found = if self.lexer.starts_with("$((") {
                match self.parse_arithmetic_expansion()? {
                    Some(found) => Some(found),
                    None => self.parse_command_substitution()?,
                }
            } else if self.lexer.starts_with("$(") {
                self.parse_command_substitution()?
            } else if c == '$' {
                self.read_param_expansion(false)?
            } else if c == '`' {
                self.parse_backtick_substitution()?
            } else {
                None
            };
            match found {
                Some((part, text)) => {
                    inner.push(part);
                    content.push_str(&text);
                }
                None => self.take_into_string(&mut content),
            }
        }

        if !closed {
            self.set_pos(start);
            return Ok(None);
        }
        let text = format!("$\"{content}\"");
        Ok(Some((WordPart::LocaleString(LocaleStringNode { content }), text, inner)))
    }
}

fn indirect(param: String, op: String, arg: String) -> WordPart {
    WordPart::ParamIndirect(ParamIndirectNode {
        param,
        op: (!op.is_empty()).then_some(op),
        arg: (!arg.is_empty()).then_some(arg),
    })
}

/// Scanner state for one backtick substitution
#[derive(Default)]
struct BacktickScan {
    /// Command text with backtick escapes removed
    content: String,
    /// Source text as written
    text: String,
    /// Heredoc delimiters seen on the current line
    pending: Vec<(String, bool)>,
    /// Heredoc whose body lines are being copied
    body: Option<(String, bool)>,
}

#[cfg(test)]
mod tests {
    use crate::ast::types::{CommandNode, Node, WordPart};
    use crate::parser::context::ContextKind;
    use crate::parser::parser::Parser;
    use crate::parser::types::ParseOptions;

    fn command(source: &str) -> CommandNode {
        let nodes = Parser::new(source, &ParseOptions::default()).parse().unwrap();
        match nodes.into_iter().next() {
            Some(Node::Command(cmd)) => cmd,
            other => panic!("expected command, got {other:?}"),
        }
    }

    fn word_parts(source: &str, index: usize) -> Vec<WordPart> {
        command(source).words[index].parts.clone()
    }

    #[test]
    fn test_simple_params() {
        let parts = word_parts("echo $HOME$1$?", 1);
        let names: Vec<_> = parts
            .iter()
            .map(|p| match p {
                WordPart::ParamExpansion(pe) => pe.param.clone(),
                other => panic!("unexpected part {other:?}"),
            })
            .collect();
        assert_eq!(names, vec!["HOME", "1", "?"]);
    }

    #[test]
    fn test_braced_param_with_operator() {
        match &word_parts("echo ${x:-default}", 1)[0] {
            WordPart::ParamExpansion(pe) => {
                assert_eq!(pe.param, "x");
                assert_eq!(pe.op.as_deref(), Some(":-"));
                assert_eq!(pe.arg.as_deref(), Some("default"));
            }
            other => panic!("unexpected part {other:?}"),
        }
    }

    #[test]
    fn test_param_length_and_indirect() {
        assert!(matches!(&word_parts("echo ${#arr[@]}", 1)[0], WordPart::ParamLength(p) if p.param == "arr[@]"));
        assert!(matches!(&word_parts("echo ${!ref}", 1)[0], WordPart::ParamIndirect(p) if p.param == "ref"));
        assert!(matches!(&word_parts("echo ${!pre*}", 1)[0], WordPart::ParamIndirect(p) if p.param == "pre*"));
    }

    #[test]
    fn test_pattern_op_keeps_single_quotes() {
        match &word_parts("echo \"${x#'*'}\"", 1)[0] {
            WordPart::ParamExpansion(pe) => {
                assert_eq!(pe.op.as_deref(), Some("#"));
                assert_eq!(pe.arg.as_deref(), Some("'*'"));
            }
            other => panic!("unexpected part {other:?}"),
        }
    }

    #[test]
    fn test_default_op_in_double_quotes_has_literal_apostrophe() {
        let cmd = command("echo \"${x:-it's}\"");
        assert_eq!(cmd.words[1].value, "\"${x:-it's}\"");
    }

    #[test]
    fn test_nested_command_substitution() {
        let cmd = command("echo $(echo $(date))");
        assert_eq!(cmd.words[1].value, "$(echo $(date))");
        match &cmd.words[1].parts[0] {
            WordPart::CommandSubstitution(cs) => {
                assert!(!cs.brace);
                match cs.command.as_ref() {
                    Node::Command(inner) => {
                        assert!(matches!(inner.words[1].parts[0], WordPart::CommandSubstitution(_)));
                    }
                    other => panic!("unexpected inner {other:?}"),
                }
            }
            other => panic!("unexpected part {other:?}"),
        }
    }

    #[test]
    fn test_funsub() {
        match &word_parts("echo ${ pwd; }", 1)[0] {
            WordPart::CommandSubstitution(cs) => assert!(cs.brace),
            other => panic!("unexpected part {other:?}"),
        }
    }

    #[test]
    fn test_backtick_with_escapes() {
        let cmd = command("echo `echo \\`date\\``");
        assert_eq!(cmd.words[1].value, "`echo \\`date\\``");
        match &cmd.words[1].parts[0] {
            WordPart::CommandSubstitution(cs) => match cs.command.as_ref() {
                Node::Command(inner) => assert_eq!(inner.words[1].value, "`date`"),
                other => panic!("unexpected inner {other:?}"),
            },
            other => panic!("unexpected part {other:?}"),
        }
    }

    #[test]
    fn test_backtick_text_kept_in_word() {
        let cmd = command("echo a`ls`b");
        assert_eq!(cmd.words[1].value, "a`ls`b");
        assert!(matches!(cmd.words[1].parts[0], WordPart::CommandSubstitution(_)));

        let cmd = command("echo \"a`b`c\"");
        assert_eq!(cmd.words[1].value, "\"a`b`c\"");
        assert_eq!(cmd.words[1].parts.len(), 1);

        let cmd = command("echo a\\`b");
        assert_eq!(cmd.words[1].value, "a\\`b");
        assert!(cmd.words[1].parts.is_empty());
    }

    #[test]
    fn test_unterminated_backtick() {
        let err = Parser::new("echo `date", &ParseOptions::default()).parse().unwrap_err();
        assert!(err.is_unterminated());
        assert_eq!(err.message(), "Unterminated backtick");
    }

    #[test]
    fn test_arithmetic_expansion_and_fallback() {
        assert!(matches!(&word_parts("echo $((1 + 2))", 1)[0], WordPart::ArithmeticExpansion(_)));
        // Not arithmetic: a subshell inside a command substitution
        let parts = word_parts("echo $( (ls) )", 1);
        assert!(matches!(&parts[0], WordPart::CommandSubstitution(_)));
    }

    #[test]
    fn test_deprecated_arithmetic() {
        match &word_parts("echo $[1+2]", 1)[0] {
            WordPart::ArithDeprecated(a) => assert_eq!(a.expression, "1+2"),
            other => panic!("unexpected part {other:?}"),
        }
    }

    #[test]
    fn test_process_substitution() {
        let cmd = command("diff <(ls a) >(cat)");
        assert_eq!(cmd.words[1].value, "<(ls a)");
        match &cmd.words[2].parts[0] {
            WordPart::ProcessSubstitution(ps) => assert_eq!(ps.direction, ">"),
            other => panic!("unexpected part {other:?}"),
        }
    }

    #[test]
    fn test_locale_string() {
        let parts = word_parts("echo $\"hello $USER\"", 1);
        assert!(matches!(&parts[0], WordPart::LocaleString(l) if l.content == "hello $USER"));
        assert!(matches!(&parts[1], WordPart::ParamExpansion(_)));
    }

    #[test]
    fn test_unterminated_command_substitution() {
        let err = Parser::new("echo $(ls", &ParseOptions::default()).parse().unwrap_err();
        assert!(err.is_unterminated());
        assert_eq!(err.pos(), 5);
    }

    #[test]
    fn test_braced_param_context_is_balanced() {
        let mut parser = Parser::new("echo ${a:-${b}} \"${c#x}\"", &ParseOptions::default());
        parser.parse().unwrap();
        assert_eq!(parser.ctx.depth(), 1);
        assert!(!parser.ctx.inside(ContextKind::BraceExpansion));
    }

    #[test]
    fn test_unterminated_braced_param() {
        let err = Parser::new("echo ${x:-abc", &ParseOptions::default()).parse().unwrap_err();
        assert!(err.is_unterminated());
    }

    #[test]
    fn test_unterminated_array_literal() {
        let err = Parser::new("arr=(a b", &ParseOptions::default()).parse().unwrap_err();
        assert!(err.is_unterminated());
        assert_eq!(err.message(), "Unterminated array literal");
    }

    fn limited(source: &str) -> crate::parser::types::ParseError {
        let options = ParseOptions {
            max_depth: 5,
            ..Default::default()
        };
        Parser::new(source, &options).parse().unwrap_err()
    }

    #[test]
    fn test_expansion_nesting_past_max_depth() {
        let braced = format!("echo {}x{}", "${a:-".repeat(6), "}".repeat(6));
        assert!(limited(&braced).is_depth_limit());

        let arith = format!("echo $(( {}1{} ))", "(".repeat(6), ")".repeat(6));
        assert!(limited(&arith).is_depth_limit());
        let arith = format!("echo $(( {}1 ))", "- ".repeat(6));
        assert!(limited(&arith).is_depth_limit());
        let arith = format!("echo {}1{}", "$(( ".repeat(6), " ))".repeat(6));
        assert!(limited(&arith).is_depth_limit());

        let subst = format!("echo {}x{}", "$(echo ".repeat(6), ")".repeat(6));
        assert!(limited(&subst).is_depth_limit());
        let subst = format!("cat {}x{}", "<(cat ".repeat(6), ")".repeat(6));
        assert!(limited(&subst).is_depth_limit());

        let options = ParseOptions {
            max_depth: 5,
            ..Default::default()
        };
        assert!(Parser::new("echo ${a:-${b:-x}} $(( (1) ))", &options).parse().is_ok());
    }
}
