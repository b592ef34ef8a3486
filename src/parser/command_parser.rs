//! Command Parser - Simple commands, redirections and here-documents
//!
//! A simple command is any mix of words and redirects up to a control
//! operator. Heredoc redirects only record their delimiter here; the body
//! is read later, when the parser crosses the newline that ends the line
//! (see `gather_heredoc_bodies`).

use crate::ast::types::{HereDocContent, HereDocNode, Node, Redirect, RedirectNode, WordNode, AST};
use crate::parser::lexer::TokenType;
use crate::parser::parser::Parser;
use crate::parser::scanner;
use crate::parser::types::{
    is_ident_char, is_ident_start, is_metachar, is_redirect_char, ParserState, Result,
    ANSI_C_ESCAPES, ASSIGNMENT_BUILTINS,
};
use tracing::trace;

impl Parser {
    /// Whether the next token ends a simple command
    fn at_command_terminator(&mut self) -> Result<bool> {
        let token = self.peek_token()?;
        Ok(token.token_type != TokenType::Word && !token.token_type.is_redirect())
    }

    /// Parse words and redirects up to a control operator. Returns `None`
    /// when neither was found.
    pub(crate) fn parse_command(&mut self) -> Result<Option<Node>> {
        let mut words: Vec<WordNode> = Vec::new();
        let mut redirects: Vec<Redirect> = Vec::new();

        loop {
            self.skip_whitespace();
            if self.at_command_terminator()? {
                break;
            }
            if words.is_empty() && matches!(self.peek_reserved_word()?.as_deref(), Some("}" | "]]")) {
                break;
            }
            if let Some(redirect) = self.parse_redirect()? {
                redirects.push(redirect);
                continue;
            }
            let all_assignments = words.iter().all(|w| scanner::looks_like_assignment(&w.value));
            let in_assign_builtin = words
                .first()
                .is_some_and(|w| ASSIGNMENT_BUILTINS.contains(w.value.as_str()));
            let at_command_start = words.is_empty() || (all_assignments && redirects.is_empty());
            match self.parse_word(at_command_start, false, in_assign_builtin)? {
                Some(word) => words.push(word),
                None => break,
            }
        }

        if words.is_empty() && redirects.is_empty() {
            return Ok(None);
        }
        Ok(Some(AST::command(words, redirects)))
    }

    /// Redirects trailing a compound command
    pub(crate) fn collect_redirects(&mut self) -> Result<Vec<Redirect>> {
        let mut redirects = Vec::new();
        while let Some(redirect) = self.parse_redirect()? {
            redirects.push(redirect);
        }
        Ok(redirects)
    }

    // =========================================================================
    // REDIRECTIONS
    // =========================================================================

    /// `{name}` before a redirect operator; the cursor is left after `}` on
    /// success and untouched otherwise
    fn read_redirect_varname(&mut self) -> Option<String> {
        if !self.is_at('{') {
            return None;
        }
        let saved = self.pos();
        self.advance();
        let mut name = String::new();
        let mut in_bracket = false;
        while let Some(c) = self.peek() {
            if is_redirect_char(c) || (c == '}' && !in_bracket) {
                break;
            }
            if c == '[' {
                in_bracket = true;
            } else if c == ']' {
                in_bracket = false;
            } else if !is_ident_char(c) && !(in_bracket && !is_metachar(c)) {
                break;
            }
            self.take_into_string(&mut name);
        }
        if self.is_at('}') && is_valid_fd_varname(&name) {
            self.advance();
            return Some(name);
        }
        self.set_pos(saved);
        None
    }

    /// Parse one redirection at the cursor, or return `None` with the cursor
    /// unchanged
    pub(crate) fn parse_redirect(&mut self) -> Result<Option<Redirect>> {
        self.skip_whitespace();
        if self.at_end() {
            return Ok(None);
        }
        let start = self.pos();
        let fd_var = self.read_redirect_varname();
        let mut fd: Option<u32> = None;
        if fd_var.is_none() && self.peek().is_some_and(|c| c.is_ascii_digit()) {
            let mut digits = String::new();
            while self.peek().is_some_and(|c| c.is_ascii_digit()) {
                self.take_into_string(&mut digits);
            }
            match digits.parse() {
                Ok(n) => fd = Some(n),
                Err(_) => {
                    self.set_pos(start);
                    return Ok(None);
                }
            }
        }

        if self.is_at('&') && self.peek_at(1) == Some('>') {
            if fd.is_some() || fd_var.is_some() {
                self.set_pos(start);
                return Ok(None);
            }
            self.set_pos(self.pos() + 2);
            let op = if self.is_at('>') {
                self.advance();
                "&>>"
            } else {
                "&>"
            };
            self.skip_whitespace();
            let Some(target) = self.parse_word(false, false, false)? else {
                return Err(self.syntax_error(format!("Expected target for redirect {op}"), self.pos()));
            };
            return Ok(Some(file_redirect(op.to_string(), None, None, target)));
        }

        let Some(first) = self.peek().filter(|&c| is_redirect_char(c)) else {
            self.set_pos(start);
            return Ok(None);
        };
        if fd.is_none() && self.peek_at(1) == Some('(') {
            self.set_pos(start);
            return Ok(None);
        }
        self.advance();

        let mut strip_tabs = false;
        let mut op = first.to_string();
        let dup_allowed = fd.is_none() && fd_var.is_none();
        match (first, self.peek()) {
            ('>', Some('>')) => {
                self.advance();
                op = ">>".into();
            }
            ('<', Some('<')) => {
                self.advance();
                if self.is_at('<') {
                    self.advance();
                    op = "<<<".into();
                } else {
                    if self.is_at('-') {
                        self.advance();
                        strip_tabs = true;
                    }
                    op = "<<".into();
                }
            }
            ('<', Some('>')) => {
                self.advance();
                op = "<>".into();
            }
            ('>', Some('|')) => {
                self.advance();
                op = ">|".into();
            }
            (_, Some('&')) if dup_allowed => {
                if !self.peek_at(1).is_some_and(|c| c.is_ascii_digit() || c == '-') {
                    self.advance();
                    op.push('&');
                }
            }
            _ => {}
        }

        if op == "<<" {
            let heredoc = self.parse_heredoc(fd, strip_tabs);
            return Ok(Some(Redirect::HereDoc(heredoc)));
        }

        let display_op = match (&fd_var, fd) {
            (Some(name), _) => format!("{{{name}}}{op}"),
            (None, Some(n)) => format!("{n}{op}"),
            _ => op.clone(),
        };

        let target = if self.is_at('&') {
            self.advance();
            op.push('&');
            self.skip_whitespace();
            self.parse_dup_target(&display_op)?
        } else {
            self.skip_whitespace();
            if (op == ">&" || op == "<&") && self.is_at('-') {
                self.advance();
                Some(WordNode::literal("-"))
            } else {
                self.parse_word(false, false, false)?
            }
        };
        let Some(target) = target else {
            return Err(self.syntax_error(format!("Expected target for redirect {display_op}"), self.pos()));
        };
        Ok(Some(file_redirect(op, fd, fd_var, target)))
    }

    /// Target after `>&` / `<&`: `-`, a descriptor with optional `-`, or a word
    fn parse_dup_target(&mut self, display_op: &str) -> Result<Option<WordNode>> {
        if self.is_at('-') {
            self.advance();
            return Ok(Some(WordNode::literal("-")));
        }
        if self.peek().is_some_and(|c| c.is_ascii_digit() || c == '-') {
            let word_start = self.pos();
            let mut descriptor = String::new();
            while self.peek().is_some_and(|c| c.is_ascii_digit()) {
                self.take_into_string(&mut descriptor);
            }
            if self.is_at('-') {
                self.take_into_string(&mut descriptor);
            }
            if self.peek().is_some_and(|c| !is_metachar(c)) {
                self.set_pos(word_start);
                return match self.parse_word(false, false, false)? {
                    Some(word) => Ok(Some(word)),
                    None => Err(self.syntax_error(format!("Expected target for redirect {display_op}"), self.pos())),
                };
            }
            return Ok(Some(WordNode::literal(descriptor)));
        }
        self.parse_word(false, false, false)
    }

    // =========================================================================
    // HERE-DOCUMENTS
    // =========================================================================

    /// Register a heredoc whose delimiter starts at the cursor. Re-reading
    /// the same operator (after a lookahead reset) returns the node that is
    /// already pending.
    fn parse_heredoc(&mut self, fd: Option<u32>, strip_tabs: bool) -> HereDocNode {
        let start = self.pos();
        self.state.insert(ParserState::HEREDOC);
        let (delimiter, quoted) = self.parse_heredoc_delimiter();
        self.state.remove(ParserState::HEREDOC);

        if let Some(existing) = self
            .pending_heredocs
            .iter()
            .find(|h| h.start == start && h.delimiter == delimiter)
        {
            return existing.clone();
        }
        let heredoc = HereDocNode {
            delimiter,
            content: HereDocContent::new(),
            strip_tabs,
            quoted,
            fd,
            start,
        };
        trace!(delimiter = %heredoc.delimiter, quoted, strip_tabs, "heredoc pending");
        self.pending_heredocs.push(heredoc.clone());
        heredoc
    }

    /// Read a heredoc delimiter word. Any quoting makes the heredoc quoted;
    /// quotes and escapes are removed from the returned delimiter.
    fn parse_heredoc_delimiter(&mut self) -> (String, bool) {
        self.skip_whitespace();
        let mut quoted = false;
        let mut delimiter = String::new();

        loop {
            while let Some(ch) = self.peek() {
                if is_metachar(ch) {
                    break;
                }
                let next = self.peek_at(1);
                match ch {
                    '"' | '\'' => {
                        quoted = true;
                        self.advance();
                        while self.peek().is_some_and(|c| c != ch) {
                            self.take_into_string(&mut delimiter);
                        }
                        self.advance();
                    }
                    '\\' => {
                        self.advance();
                        if self.is_at('\n') {
                            self.advance();
                        } else if !self.at_end() {
                            quoted = true;
                            self.take_into_string(&mut delimiter);
                        }
                    }
                    '$' if next == Some('\'') => {
                        quoted = true;
                        self.set_pos(self.pos() + 2);
                        self.read_ansi_c_delimiter(&mut delimiter);
                    }
                    '$' if scanner::is_expansion_start(self.lexer.input(), self.pos(), "$(") => {
                        self.take_into_string(&mut delimiter);
                        self.take_into_string(&mut delimiter);
                        self.copy_balanced(&mut delimiter, '(', ')', 1);
                    }
                    '$' if next == Some('{') || next == Some('[') => {
                        if self.dollar_is_escaped_sigil() {
                            self.take_into_string(&mut delimiter);
                            continue;
                        }
                        self.take_into_string(&mut delimiter);
                        self.take_into_string(&mut delimiter);
                        if next == Some('{') {
                            self.copy_braced_delimiter(&mut delimiter);
                        } else {
                            self.copy_balanced(&mut delimiter, '[', ']', 1);
                        }
                    }
                    '`' => self.copy_backtick_delimiter(&mut delimiter),
                    _ => self.take_into_string(&mut delimiter),
                }
            }
            // `<(...)` glued to the word continues it
            if self.peek().is_some_and(is_redirect_char) && self.peek_at(1) == Some('(') {
                self.take_into_string(&mut delimiter);
                self.take_into_string(&mut delimiter);
                self.copy_balanced(&mut delimiter, '(', ')', 1);
                continue;
            }
            break;
        }
        (delimiter, quoted)
    }

    /// Whether the `$` at the cursor is the second of a `$$` pair (or
    /// escaped), so it does not open an expansion
    fn dollar_is_escaped_sigil(&self) -> bool {
        let input = self.lexer.input();
        let mut j = self.pos();
        let mut dollars: i64 = 0;
        while j > 0 && input[j - 1] == '$' {
            dollars += 1;
            j -= 1;
        }
        if j > 0 && input[j - 1] == '\\' {
            dollars -= 1;
        }
        dollars % 2 == 1
    }

    /// Body of `$'...'` in a delimiter, with escapes decoded
    fn read_ansi_c_delimiter(&mut self, delimiter: &mut String) {
        while let Some(c) = self.peek() {
            if c == '\'' {
                break;
            }
            if c == '\\' && self.peek_at(1).is_some() {
                self.advance();
                match self.peek().and_then(|e| ANSI_C_ESCAPES.get(&e)) {
                    Some(&byte) => {
                        delimiter.push(char::from(byte));
                        self.advance();
                    }
                    None => self.take_into_string(delimiter),
                }
            } else {
                self.take_into_string(delimiter);
            }
        }
        self.advance();
    }

    /// Copy up to the close that balances `depth` already-open parens
    fn copy_balanced(&mut self, out: &mut String, open: char, close: char, mut depth: usize) {
        while let Some(c) = self.peek() {
            if depth == 0 {
                break;
            }
            if c == open {
                depth += 1;
            } else if c == close {
                depth -= 1;
            }
            self.take_into_string(out);
        }
    }

    /// `${...}` in a delimiter; the cursor is past `${`
    fn copy_braced_delimiter(&mut self, out: &mut String) {
        let mut depth = 0usize;
        while let Some(c) = self.peek() {
            if c == '{' {
                depth += 1;
            } else if c == '}' {
                self.take_into_string(out);
                if depth == 0 {
                    break;
                }
                depth -= 1;
                if depth == 0 && self.peek().is_some_and(is_metachar) {
                    break;
                }
                continue;
            }
            self.take_into_string(out);
        }
    }

    fn copy_backtick_delimiter(&mut self, out: &mut String) {
        self.take_into_string(out);
        while let Some(c) = self.peek() {
            if c == '`' {
                break;
            }
            match c {
                '\'' | '"' => {
                    self.take_into_string(out);
                    while let Some(q) = self.peek() {
                        if q == c || q == '`' {
                            break;
                        }
                        if c == '"' && q == '\\' && self.peek_at(1).is_some() {
                            self.take_into_string(out);
                        }
                        self.take_into_string(out);
                    }
                    if self.is_at(c) {
                        self.take_into_string(out);
                    }
                }
                '\\' if self.peek_at(1).is_some() => {
                    self.take_into_string(out);
                    self.take_into_string(out);
                }
                _ => self.take_into_string(out),
            }
        }
        self.take_into_string(out);
    }

    /// Read one physical line, joining lines ended by an odd number of
    /// backslashes unless the heredoc is quoted. Returns the line and the
    /// index of its terminating newline (or the input length).
    fn read_heredoc_line(&self, quoted: bool) -> (String, usize) {
        let len = self.lexer.len();
        let line_end_from = |mut i: usize| {
            while i < len && self.char_at(i) != Some('\n') {
                i += 1;
            }
            i
        };
        let mut line_end = line_end_from(self.pos());
        let mut line = self.lexer.slice(self.pos(), line_end);
        if !quoted {
            while line_end < len && scanner::count_trailing_backslashes(&line) % 2 == 1 {
                line.pop();
                let next_start = line_end + 1;
                line_end = line_end_from(next_start);
                line.push_str(&self.lexer.slice(next_start, line_end));
            }
        }
        (line, line_end)
    }

    /// Read the bodies of all pending heredocs, in order, starting at the
    /// cursor (just past a newline). Each body ends at its delimiter line.
    pub(crate) fn gather_heredoc_bodies(&mut self) {
        let pending = std::mem::take(&mut self.pending_heredocs);
        let len = self.lexer.len();
        for heredoc in &pending {
            let delimiter = scanner::normalize_heredoc_delimiter(&heredoc.delimiter);
            let mut content = String::new();

            while self.pos() < len {
                let line_start = self.pos();
                let (line, line_end) = self.read_heredoc_line(heredoc.quoted);
                let check = if heredoc.strip_tabs {
                    line.trim_start_matches('\t')
                } else {
                    line.as_str()
                };
                let normalized = scanner::normalize_heredoc_delimiter(check);
                if normalized == delimiter {
                    self.set_pos(if line_end < len { line_end + 1 } else { line_end });
                    break;
                }

                // Delimiter glued to the `)` that closes a substitution
                let closes_nested =
                    self.eof_token == Some(')') || (line_end >= len && self.in_process_sub);
                if closes_nested && normalized.starts_with(&delimiter) {
                    let tabs = line.chars().count() - check.chars().count();
                    self.set_pos(line_start + tabs + heredoc.delimiter.chars().count());
                    break;
                }

                content.push_str(check_content(&line, heredoc.strip_tabs));
                if line_end < len {
                    content.push('\n');
                    self.set_pos(line_end + 1);
                } else {
                    let escaped_newline = !heredoc.quoted && scanner::count_trailing_backslashes(&line) % 2 == 1;
                    if !escaped_newline {
                        content.push('\n');
                    }
                    self.set_pos(len);
                }
            }

            trace!(delimiter = %heredoc.delimiter, bytes = content.len(), "heredoc body read");
            heredoc.content.fill(content);
        }
    }
}

fn check_content(line: &str, strip_tabs: bool) -> &str {
    if strip_tabs {
        line.trim_start_matches('\t')
    } else {
        line
    }
}

fn file_redirect(op: String, fd: Option<u32>, fd_var: Option<String>, target: WordNode) -> Redirect {
    Redirect::File(RedirectNode {
        op,
        fd,
        fd_var,
        target,
    })
}

/// `name` or `name[subscript]` usable in a `{name}>file` redirect
fn is_valid_fd_varname(name: &str) -> bool {
    let Some(first) = name.chars().next() else {
        return false;
    };
    if !is_ident_start(first) {
        return false;
    }
    if !name.contains(['[', ']']) {
        return name.chars().all(is_ident_char);
    }
    let (Some(left), Some(right)) = (name.find('['), name.rfind(']')) else {
        return false;
    };
    right == name.len() - 1 && right > left + 1 && name[..left].chars().all(is_ident_char)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::types::ParseOptions;
    use crate::ast::types::WordPart;

    fn redirects(source: &str) -> Vec<Redirect> {
        let nodes = Parser::new(source, &ParseOptions::default()).parse().unwrap();
        match nodes.into_iter().next() {
            Some(Node::Command(cmd)) => cmd.redirects,
            other => panic!("expected command, got {other:?}"),
        }
    }

    fn file(redirect: &Redirect) -> &RedirectNode {
        match redirect {
            Redirect::File(node) => node,
            other => panic!("expected file redirect, got {other:?}"),
        }
    }

    fn heredoc(redirect: &Redirect) -> &HereDocNode {
        match redirect {
            Redirect::HereDoc(node) => node,
            other => panic!("expected heredoc, got {other:?}"),
        }
    }

    #[test]
    fn test_basic_redirects() {
        let rs = redirects("cmd <in >out 2>>err >|clob <>rw");
        let ops: Vec<_> = rs.iter().map(|r| file(r).op.as_str()).collect();
        assert_eq!(ops, vec!["<", ">", ">>", ">|", "<>"]);
        assert_eq!(file(&rs[2]).fd, Some(2));
        assert_eq!(file(&rs[0]).target.value, "in");
    }

    #[test]
    fn test_fd_duplication() {
        let rs = redirects("cmd 2>&1 >&- 3<&0-");
        assert_eq!(file(&rs[0]).op, ">&");
        assert_eq!(file(&rs[0]).fd, Some(2));
        assert_eq!(file(&rs[0]).target.value, "1");
        assert_eq!(file(&rs[1]).target.value, "-");
        assert_eq!(file(&rs[2]).target.value, "0-");
    }

    #[test]
    fn test_redirect_to_word_after_dup_op() {
        let rs = redirects("cmd >&file");
        assert_eq!(file(&rs[0]).op, ">&");
        assert_eq!(file(&rs[0]).target.value, "file");
    }

    #[test]
    fn test_and_great() {
        let rs = redirects("cmd &>log &>>all");
        assert_eq!(file(&rs[0]).op, "&>");
        assert_eq!(file(&rs[1]).op, "&>>");
    }

    #[test]
    fn test_varname_fd() {
        let rs = redirects("exec {fd}>out");
        assert_eq!(file(&rs[0]).fd_var.as_deref(), Some("fd"));
        assert!(is_valid_fd_varname("a[1]"));
        assert!(!is_valid_fd_varname("a[]"));
        assert!(!is_valid_fd_varname("1a"));
    }

    #[test]
    fn test_here_string() {
        let rs = redirects("cat <<< \"$x\"");
        assert_eq!(file(&rs[0]).op, "<<<");
        assert_eq!(file(&rs[0]).target.value, "\"$x\"");
    }

    #[test]
    fn test_missing_redirect_target() {
        let err = Parser::new("echo >", &ParseOptions::default()).parse().unwrap_err();
        assert_eq!(err.message(), "Expected target for redirect >");
    }

    #[test]
    fn test_heredoc_strip_tabs_and_quoted() {
        let rs = redirects("cat <<-'END'\n\tone $x\n\tEND\n");
        let h = heredoc(&rs[0]);
        assert!(h.quoted);
        assert!(h.strip_tabs);
        assert_eq!(h.content.get(), "one $x\n");
    }

    #[test]
    fn test_two_heredocs_on_one_line() {
        let rs = redirects("cat <<A <<B\na\nA\nb\nB\n");
        assert_eq!(heredoc(&rs[0]).content.get(), "a\n");
        assert_eq!(heredoc(&rs[1]).content.get(), "b\n");
    }

    #[test]
    fn test_heredoc_line_continuation_joins_unquoted() {
        let rs = redirects("cat <<E\nab\\\ncd\nE\n");
        assert_eq!(heredoc(&rs[0]).content.get(), "abcd\n");
    }

    #[test]
    fn test_heredoc_at_eof_without_delimiter() {
        let rs = redirects("cat <<E\nbody");
        assert_eq!(heredoc(&rs[0]).content.get(), "body\n");
    }

    #[test]
    fn test_heredoc_inside_command_substitution() {
        let nodes = Parser::new("x=$(cat <<EOF\nhi\nEOF\n)\necho done", &ParseOptions::default())
            .parse()
            .unwrap();
        assert_eq!(nodes.len(), 2);
    }

    #[test]
    fn test_outer_heredoc_waits_for_command_substitution() {
        let source = "cat <<A $(cat <<B\nb\nB\n)\na\nA\necho z";
        let nodes = Parser::new(source, &ParseOptions::default()).parse().unwrap();
        assert_eq!(nodes.len(), 2);
        let Node::Command(cmd) = &nodes[0] else {
            panic!("expected command, got {:?}", nodes[0]);
        };
        let outer = heredoc(&cmd.redirects[0]);
        assert_eq!(outer.delimiter, "A");
        assert_eq!(outer.content.get(), "a\n");
        assert_eq!(cmd.words[1].value, "$(cat <<B\nb\nB\n)");
        let WordPart::CommandSubstitution(sub) = &cmd.words[1].parts[0] else {
            panic!("expected command substitution");
        };
        let inner = match sub.command.as_ref() {
            Node::Command(inner) => inner,
            Node::List(list) => match list.commands().next() {
                Some(Node::Command(inner)) => inner,
                other => panic!("expected inner command, got {other:?}"),
            },
            other => panic!("expected inner command, got {other:?}"),
        };
        assert_eq!(heredoc(&inner.redirects[0]).content.get(), "b\n");
    }

    #[test]
    fn test_outer_heredoc_across_list_with_substitution() {
        let source = "cat <<A; echo $(cat <<B\nb\nB\n)\na\nA\n";
        let nodes = Parser::new(source, &ParseOptions::default()).parse().unwrap();
        let Node::List(list) = &nodes[0] else {
            panic!("expected list, got {:?}", nodes[0]);
        };
        let Some(Node::Command(cat)) = list.commands().next() else {
            panic!("expected cat command");
        };
        assert_eq!(heredoc(&cat.redirects[0]).content.get(), "a\n");
    }

    #[test]
    fn test_heredoc_delimiter_forms() {
        let mut parser = Parser::new("\"A B\"", &ParseOptions::default());
        assert_eq!(parser.parse_heredoc_delimiter(), ("A B".to_string(), true));
        let mut parser = Parser::new("\\EOF", &ParseOptions::default());
        assert_eq!(parser.parse_heredoc_delimiter(), ("EOF".to_string(), true));
        let mut parser = Parser::new("$'a\\tb'", &ParseOptions::default());
        assert_eq!(parser.parse_heredoc_delimiter(), ("a\tb".to_string(), true));
        let mut parser = Parser::new("E${x}F rest", &ParseOptions::default());
        assert_eq!(parser.parse_heredoc_delimiter(), ("E${x}F".to_string(), false));
    }
}
