//! Word Parser - Word scanning and matched-pair reading
//!
//! A word is scanned character by character. Quotes, escapes and `$`
//! expansions are consumed whole so the word text keeps its exact source
//! form, while each expansion also contributes a structured part. How a
//! character ends a word depends on the word context: ordinary command
//! words, operands inside `[[ ]]`, or the regex after `=~`.

use crate::ast::types::{WordNode, WordPart};
use crate::parser::context::LexMode;
use crate::parser::parser::Parser;
use crate::parser::scanner;
use crate::parser::types::{
    is_extglob_prefix, is_funsub_char, is_ident_char, is_metachar, is_redirect_char, is_whitespace,
    DolbraceState, MatchedPairFlags, ParserState, Result, WordContext,
};

impl Parser {
    /// Read the next word token under the given mode flags. Returns `None`
    /// when the next token is an operator or the input is exhausted.
    pub(crate) fn parse_word(
        &mut self,
        at_command_start: bool,
        in_array_literal: bool,
        in_assign_builtin: bool,
    ) -> Result<Option<WordNode>> {
        self.skip_whitespace();
        if self.at_end() {
            return Ok(None);
        }
        self.mode.at_command_start = at_command_start;
        self.mode.in_array_literal = in_array_literal;
        self.mode.in_assign_builtin = in_assign_builtin;

        let token = self.peek_token()?;
        let word = if token.word.is_some() {
            self.next_token()?.word
        } else {
            None
        };

        self.mode.at_command_start = false;
        self.mode.in_array_literal = false;
        self.mode.in_assign_builtin = false;
        Ok(word)
    }

    /// Scan one word from the cursor. `mode` is the lexer mode the word is
    /// read under; nested substitutions may change `self.mode` meanwhile.
    pub(crate) fn read_word_internal(&mut self, mode: LexMode) -> Result<Option<WordNode>> {
        let ctx = mode.word_context;
        let start = self.pos();
        let mut buf: Vec<char> = Vec::new();
        let mut parts: Vec<WordPart> = Vec::new();
        let mut bracket_depth = 0usize;
        let mut bracket_start: Option<usize> = None;
        let mut seen_equals = false;
        let mut paren_depth = 0usize;

        while let Some(ch) = self.peek() {
            if ctx == WordContext::Regex && ch == '\\' && self.peek_at(1) == Some('\n') {
                self.set_pos(self.pos() + 2);
                continue;
            }
            if ctx != WordContext::Normal && self.is_word_terminator(ctx, ch, bracket_depth, paren_depth) {
                break;
            }

            // Subscripts of `a[i]=v` and `[k]=v` inside `( )` may hold blanks
            if ctx == WordContext::Normal && ch == '[' {
                if bracket_depth > 0 {
                    bracket_depth += 1;
                    self.take_into(&mut buf);
                    continue;
                }
                let opens_subscript = if buf.is_empty() {
                    !seen_equals && mode.in_array_literal
                } else {
                    mode.at_command_start
                        && !seen_equals
                        && scanner::is_array_assignment_prefix(&buf)
                        && buf.last().copied().is_some_and(is_ident_char)
                };
                if opens_subscript {
                    bracket_start = Some(self.pos());
                    bracket_depth += 1;
                    self.take_into(&mut buf);
                    continue;
                }
            }
            if ctx == WordContext::Normal && ch == ']' && bracket_depth > 0 {
                bracket_depth -= 1;
                self.take_into(&mut buf);
                continue;
            }
            if ctx == WordContext::Normal && ch == '=' && bracket_depth == 0 {
                seen_equals = true;
            }

            if ctx == WordContext::Regex && ch == '(' {
                paren_depth += 1;
                self.take_into(&mut buf);
                continue;
            }
            if ctx == WordContext::Regex && ch == ')' {
                if paren_depth == 0 {
                    break;
                }
                paren_depth -= 1;
                self.take_into(&mut buf);
                continue;
            }

            if ctx != WordContext::Normal && ch == '[' {
                let for_regex = ctx == WordContext::Regex;
                if !self.read_bracket_expression(&mut buf, &mut parts, for_regex, paren_depth)? {
                    self.take_into(&mut buf);
                }
                continue;
            }

            if ctx == WordContext::Cond && ch == '(' {
                if self.options.extglob && buf.last().copied().is_some_and(is_extglob_prefix) {
                    self.read_extglob_group(&mut buf)?;
                    continue;
                }
                break;
            }

            if ctx == WordContext::Regex && is_whitespace(ch) && paren_depth > 0 {
                self.take_into(&mut buf);
                continue;
            }

            if ch == '\'' {
                self.advance();
                let text = self.lexer.read_single_quote(start)?;
                buf.extend(text.chars());
                continue;
            }

            if ch == '"' {
                self.scan_double_quote(
                    &mut buf,
                    &mut parts,
                    start,
                    ctx != WordContext::Regex,
                    ctx == WordContext::Normal,
                )?;
                continue;
            }

            if ch == '\\' && self.peek_at(1).is_some() {
                if ctx != WordContext::Regex && self.peek_at(1) == Some('\n') {
                    self.set_pos(self.pos() + 2);
                } else {
                    self.take_into(&mut buf);
                    self.take_into(&mut buf);
                }
                continue;
            }

            if ctx != WordContext::Regex && ch == '$' && self.peek_at(1) == Some('\'') {
                match self.lexer.read_ansi_c_quote()? {
                    Some((part, text)) => {
                        parts.push(part);
                        buf.extend(text.chars());
                    }
                    None => self.take_into(&mut buf),
                }
                continue;
            }

            if ctx != WordContext::Regex && ch == '$' && self.peek_at(1) == Some('"') {
                match self.read_locale_string()? {
                    Some((part, text, inner)) => {
                        parts.push(part);
                        parts.extend(inner);
                        buf.extend(text.chars());
                    }
                    None => self.take_into(&mut buf),
                }
                continue;
            }

            if ch == '$' {
                let before = buf.len();
                if !self.parse_dollar_expansion(&mut buf, &mut parts, false)? {
                    self.take_into(&mut buf);
                } else if self.options.extglob
                    && ctx == WordContext::Normal
                    && matches!(buf[before..], ['$', '?' | '*' | '@'])
                    && self.is_at('(')
                {
                    // `$@(...)` is a special parameter followed by an extglob group
                    self.read_extglob_group(&mut buf)?;
                }
                continue;
            }

            if ctx != WordContext::Regex && ch == '`' {
                match self.parse_backtick_substitution()? {
                    Some((part, text)) => {
                        parts.push(part);
                        buf.extend(text.chars());
                    }
                    None => self.take_into(&mut buf),
                }
                continue;
            }

            if ctx != WordContext::Regex && is_redirect_char(ch) && self.peek_at(1) == Some('(') {
                match self.parse_process_substitution()? {
                    Some((Some(part), text)) => {
                        parts.push(part);
                        buf.extend(text.chars());
                    }
                    Some((None, text)) if !text.is_empty() => buf.extend(text.chars()),
                    _ => {
                        self.take_into(&mut buf);
                        if ctx == WordContext::Normal {
                            self.take_into(&mut buf);
                        }
                    }
                }
                continue;
            }

            if ctx == WordContext::Normal && ch == '(' && !buf.is_empty() && bracket_depth == 0 {
                let n = buf.len();
                let prefix = if n >= 2 && buf[n - 2] == '+' && buf[n - 1] == '=' {
                    Some(&buf[..n - 2])
                } else if buf[n - 1] == '=' {
                    Some(&buf[..n - 1])
                } else {
                    None
                };
                let is_array_assignment = prefix.is_some_and(scanner::is_array_assignment_prefix);
                if is_array_assignment && (mode.at_command_start || mode.in_assign_builtin) {
                    match self.parse_array_literal()? {
                        Some((part, text)) => {
                            parts.push(part);
                            buf.extend(text.chars());
                            continue;
                        }
                        None => break,
                    }
                }
            }

            if self.options.extglob
                && ctx == WordContext::Normal
                && is_extglob_prefix(ch)
                && self.peek_at(1) == Some('(')
            {
                self.take_into(&mut buf);
                self.read_extglob_group(&mut buf)?;
                continue;
            }

            if ctx == WordContext::Normal
                && self.state.contains(ParserState::EOFTOKEN)
                && self.eof_token == Some(ch)
                && bracket_depth == 0
            {
                if buf.is_empty() {
                    self.take_into(&mut buf);
                }
                break;
            }

            if ctx == WordContext::Normal && is_metachar(ch) && bracket_depth == 0 {
                break;
            }

            self.take_into(&mut buf);
        }

        if bracket_depth > 0 && self.at_end() {
            if let Some(at) = bracket_start {
                return Err(self.unterminated("unexpected EOF looking for `]'", at));
            }
        }
        if buf.is_empty() {
            return Ok(None);
        }
        Ok(Some(WordNode::new(buf.into_iter().collect::<String>(), parts)))
    }

    /// `(` ... `)` of an extglob group; the cursor is on the `(`
    fn read_extglob_group(&mut self, buf: &mut Vec<char>) -> Result<()> {
        self.take_into(buf);
        let body = self.parse_matched_pair('(', ')', MatchedPairFlags::EXTGLOB, false)?;
        buf.extend(body.chars());
        buf.push(')');
        Ok(())
    }

    /// Whether `ch` ends a word inside `[[ ]]` or a regex operand
    fn is_word_terminator(&self, ctx: WordContext, ch: char, bracket_depth: usize, paren_depth: usize) -> bool {
        match ctx {
            WordContext::Regex => {
                if ch == ']' && self.peek_at(1) == Some(']') {
                    return true;
                }
                if ch == '&' && self.peek_at(1) == Some('&') {
                    return true;
                }
                if ch == ')' && paren_depth == 0 {
                    return true;
                }
                is_whitespace(ch) && paren_depth == 0
            }
            WordContext::Cond => {
                if ch == ']' && self.peek_at(1) == Some(']') {
                    return true;
                }
                if ch == ')' {
                    return true;
                }
                if matches!(ch, '&' | '|' | ';') {
                    return true;
                }
                if is_redirect_char(ch) && self.peek_at(1) != Some('(') {
                    return true;
                }
                is_whitespace(ch)
            }
            WordContext::Normal => {
                if self.state.contains(ParserState::EOFTOKEN) && self.eof_token == Some(ch) && bracket_depth == 0 {
                    return true;
                }
                if is_redirect_char(ch) && self.peek_at(1) == Some('(') {
                    return false;
                }
                is_metachar(ch) && bracket_depth == 0
            }
        }
    }

    /// Read a `[...]` bracket expression inside `[[ ]]`. Returns false (and
    /// consumes nothing) when the `[` does not start one.
    fn read_bracket_expression(
        &mut self,
        buf: &mut Vec<char>,
        parts: &mut Vec<WordPart>,
        for_regex: bool,
        paren_depth: usize,
    ) -> Result<bool> {
        if for_regex {
            if !self.regex_bracket_closes(paren_depth) {
                return Ok(false);
            }
        } else if self.peek_at(1).is_some_and(|c| matches!(c, ' ' | '\t' | '\n' | '&' | '|')) {
            return Ok(false);
        }

        self.take_into(buf);
        if self.is_at('^') {
            self.take_into(buf);
        }
        if self.is_at(']') {
            self.take_into(buf);
        }

        while let Some(c) = self.peek() {
            if c == ']' {
                self.take_into(buf);
                break;
            }
            if c == '[' && matches!(self.peek_at(1), Some(':' | '=' | '.')) {
                let kind = self.peek_at(1).unwrap_or(':');
                if kind != ':' && for_regex {
                    self.take_into(buf);
                    continue;
                }
                // `[:class:]`, `[=x=]`, `[.sym.]`
                self.take_into(buf);
                self.take_into(buf);
                while let Some(inner) = self.peek() {
                    if inner == kind && self.peek_at(1) == Some(']') {
                        self.take_into(buf);
                        self.take_into(buf);
                        break;
                    }
                    self.take_into(buf);
                }
                continue;
            }
            if for_regex && c == '$' {
                if !self.parse_dollar_expansion(buf, parts, false)? {
                    self.take_into(buf);
                }
                continue;
            }
            self.take_into(buf);
        }
        Ok(true)
    }

    /// Whether a regex `[` at the cursor has its `]` before the operand ends
    fn regex_bracket_closes(&self, paren_depth: usize) -> bool {
        let mut i = self.pos() + 1;
        if self.char_at(i) == Some('^') {
            i += 1;
        }
        if self.char_at(i) == Some(']') {
            i += 1;
        }
        while let Some(c) = self.char_at(i) {
            let next = self.char_at(i + 1);
            match c {
                ']' if next == Some(']') => return false,
                ']' => return true,
                ')' if paren_depth > 0 => return false,
                '&' if next == Some('&') => return false,
                '[' if next == Some(':') => {
                    i += 2;
                    while let Some(inner) = self.char_at(i) {
                        if inner == ':' && self.char_at(i + 1) == Some(']') {
                            i += 1;
                            break;
                        }
                        i += 1;
                    }
                }
                _ => {}
            }
            i += 1;
        }
        false
    }

    /// Scan `"..."` starting at the opening quote. Expansions inside become
    /// parts; the text keeps both quotes.
    pub(crate) fn scan_double_quote(
        &mut self,
        buf: &mut Vec<char>,
        parts: &mut Vec<WordPart>,
        word_start: usize,
        handle_line_continuation: bool,
        allow_backticks: bool,
    ) -> Result<()> {
        self.take_into(buf);
        self.lexer.quote.toggle_double();
        loop {
            let Some(c) = self.peek() else {
                return Err(self.unterminated("Unterminated double quote", word_start));
            };
            match c {
                '"' => {
                    self.take_into(buf);
                    self.lexer.quote.toggle_double();
                    return Ok(());
                }
                '\\' if self.peek_at(1).is_some() => {
                    if handle_line_continuation && self.peek_at(1) == Some('\n') {
                        self.set_pos(self.pos() + 2);
                    } else {
                        self.take_into(buf);
                        self.take_into(buf);
                    }
                }
                '$' => {
                    if !self.parse_dollar_expansion(buf, parts, true)? {
                        self.take_into(buf);
                    }
                }
                '`' if allow_backticks => match self.parse_backtick_substitution()? {
                    Some((part, text)) => {
                        parts.push(part);
                        buf.extend(text.chars());
                    }
                    None => self.take_into(buf),
                },
                _ => self.take_into(buf),
            }
        }
    }

    /// Collect text up to the `close` that balances an already-consumed
    /// `open`, honouring quotes, escapes and nested expansions. The closing
    /// character is consumed but not returned.
    pub(crate) fn parse_matched_pair(
        &mut self,
        open: char,
        close: char,
        flags: MatchedPairFlags,
        initial_was_dollar: bool,
    ) -> Result<String> {
        let start = self.pos();
        let mut depth = 1usize;
        let mut out = String::new();
        let mut pass_next = false;
        let mut was_dollar = initial_was_dollar;
        let mut was_gtlt = false;

        loop {
            let Some(ch) = self.advance() else {
                return Err(self.unterminated(
                    format!("unexpected EOF while looking for matching `{close}'"),
                    start,
                ));
            };

            if flags.contains(MatchedPairFlags::DOLBRACE)
                && self.dolbrace == DolbraceState::Op
                && !"#%^,~:-=?+/".contains(ch)
            {
                self.dolbrace = DolbraceState::Word;
            }

            if pass_next {
                pass_next = false;
                out.push(ch);
                was_dollar = ch == '$';
                was_gtlt = is_redirect_char(ch);
                continue;
            }

            if open == '\'' {
                if ch == close {
                    break;
                }
                if ch == '\\' && flags.contains(MatchedPairFlags::ALLOWESC) {
                    pass_next = true;
                }
                out.push(ch);
                was_dollar = false;
                was_gtlt = false;
                continue;
            }

            if ch == '\\' {
                if self.is_at('\n') {
                    self.advance();
                } else {
                    pass_next = true;
                    out.push(ch);
                }
                was_dollar = false;
                was_gtlt = false;
                continue;
            }

            if ch == close {
                depth -= 1;
                if depth == 0 {
                    break;
                }
                out.push(ch);
                was_dollar = false;
                was_gtlt = is_redirect_char(ch);
                continue;
            }

            if ch == open && open != close {
                if !(flags.contains(MatchedPairFlags::DOLBRACE) && open == '{') {
                    depth += 1;
                }
                out.push(ch);
                was_dollar = false;
                was_gtlt = is_redirect_char(ch);
                continue;
            }

            // Inside "${x:-...}" a single quote is an ordinary character;
            // pattern operators keep it as a quote
            if ch == '\''
                && flags.contains(MatchedPairFlags::DOLBRACE | MatchedPairFlags::DQUOTE)
                && !matches!(self.dolbrace, DolbraceState::Quote | DolbraceState::Quote2)
            {
                out.push(ch);
                was_dollar = false;
                was_gtlt = false;
                continue;
            }

            if matches!(ch, '\'' | '"' | '`') && open != close {
                let nested_flags = match ch {
                    '\'' if was_dollar && !self.lexer.quote.outer_double() => flags | MatchedPairFlags::ALLOWESC,
                    '"' => flags | MatchedPairFlags::DQUOTE,
                    _ => flags,
                };
                let nested = self.parse_matched_pair(ch, ch, nested_flags, false)?;
                out.push(ch);
                out.push_str(&nested);
                out.push(ch);
                was_dollar = false;
                was_gtlt = false;
                continue;
            }

            if ch == '$' && !self.at_end() && !flags.contains(MatchedPairFlags::EXTGLOB) {
                if was_dollar {
                    out.push(ch);
                    was_dollar = false;
                    was_gtlt = false;
                    continue;
                }
                match self.peek() {
                    Some('{') => {
                        if flags.contains(MatchedPairFlags::ARITH)
                            && !self.peek_at(1).is_some_and(is_funsub_char)
                        {
                            // `${` inside `$[ ]` is kept verbatim
                            out.push(ch);
                            was_dollar = true;
                            was_gtlt = false;
                            continue;
                        }
                        self.set_pos(self.pos() - 1);
                        let in_dquote = flags.contains(MatchedPairFlags::DQUOTE);
                        match self.read_param_expansion(in_dquote)? {
                            Some((_, text)) => {
                                out.push_str(&text);
                                was_dollar = false;
                            }
                            None => {
                                self.take_into_string(&mut out);
                                was_dollar = true;
                            }
                        }
                        was_gtlt = false;
                        continue;
                    }
                    Some('(') => {
                        self.set_pos(self.pos() - 1);
                        let parsed = if self.peek_at(2) == Some('(') {
                            match self.parse_arithmetic_expansion()? {
                                Some(found) => Some(found),
                                None => self.parse_command_substitution()?,
                            }
                        } else {
                            self.parse_command_substitution()?
                        };
                        match parsed {
                            Some((_, text)) => out.push_str(&text),
                            None => {
                                self.take_into_string(&mut out);
                                self.take_into_string(&mut out);
                            }
                        }
                        was_dollar = false;
                        was_gtlt = false;
                        continue;
                    }
                    Some('[') => {
                        self.set_pos(self.pos() - 1);
                        match self.parse_deprecated_arithmetic()? {
                            Some((_, text)) => {
                                out.push_str(&text);
                                was_dollar = false;
                            }
                            None => {
                                self.take_into_string(&mut out);
                                was_dollar = true;
                            }
                        }
                        was_gtlt = false;
                        continue;
                    }
                    _ => {}
                }
            }

            if ch == '('
                && was_gtlt
                && flags.intersects(MatchedPairFlags::DOLBRACE | MatchedPairFlags::ARRAYSUB)
            {
                let direction = out.pop();
                self.set_pos(self.pos() - 2);
                match self.parse_process_substitution()? {
                    Some((_, text)) if !text.is_empty() => out.push_str(&text),
                    _ => {
                        self.set_pos(self.pos() + 2);
                        out.extend(direction);
                        out.push('(');
                    }
                }
                was_dollar = false;
                was_gtlt = false;
                continue;
            }

            out.push(ch);
            was_dollar = ch == '$';
            was_gtlt = is_redirect_char(ch);
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use crate::ast::types::{Node, WordNode, WordPart};
    use crate::parser::parser::Parser;
    use crate::parser::types::{MatchedPairFlags, ParseOptions};

    fn first_words(source: &str, extglob: bool) -> Vec<WordNode> {
        let options = ParseOptions {
            extglob,
            ..Default::default()
        };
        let nodes = Parser::new(source, &options).parse().unwrap();
        match nodes.into_iter().next() {
            Some(Node::Command(cmd)) => cmd.words,
            other => panic!("expected command, got {other:?}"),
        }
    }

    fn values(words: &[WordNode]) -> Vec<&str> {
        words.iter().map(|w| w.value.as_str()).collect()
    }

    #[test]
    fn test_quotes_stay_in_word_text() {
        let words = first_words(r#"echo 'a b' "c $d" e\ f"#, false);
        assert_eq!(values(&words), vec!["echo", "'a b'", "\"c $d\"", "e\\ f"]);
        assert!(matches!(words[2].parts[0], WordPart::ParamExpansion(_)));
    }

    #[test]
    fn test_line_continuation_removed_from_word() {
        let words = first_words("echo ab\\\ncd", false);
        assert_eq!(values(&words), vec!["echo", "abcd"]);
    }

    #[test]
    fn test_array_subscript_keeps_blanks() {
        let words = first_words("a[1 + 2]=x echo", false);
        assert_eq!(values(&words), vec!["a[1 + 2]=x", "echo"]);
    }

    #[test]
    fn test_array_literal_word() {
        let words = first_words("arr=(one [k]=two \"three four\")", false);
        assert_eq!(words.len(), 1);
        match &words[0].parts[0] {
            WordPart::Array(array) => {
                assert_eq!(values(&array.elements), vec!["one", "[k]=two", "\"three four\""]);
            }
            other => panic!("expected array, got {other:?}"),
        }
    }

    #[test]
    fn test_array_literal_after_declare() {
        let words = first_words("declare -a xs=(1 2)", false);
        assert!(matches!(words[2].parts[0], WordPart::Array(_)));
    }

    #[test]
    fn test_extglob_groups() {
        let words = first_words("ls @(a|b) !(x) +(y*)", true);
        assert_eq!(values(&words), vec!["ls", "@(a|b)", "!(x)", "+(y*)"]);
    }

    #[test]
    fn test_extglob_off_splits_on_paren() {
        let options = ParseOptions::default();
        assert!(Parser::new("ls @(a|b)", &options).parse().is_err());
    }

    #[test]
    fn test_unterminated_quotes() {
        let options = ParseOptions::default();
        let err = Parser::new("echo 'abc", &options).parse().unwrap_err();
        assert!(err.is_unterminated());
        let err = Parser::new("echo \"abc", &options).parse().unwrap_err();
        assert!(err.is_unterminated());
        assert_eq!(err.message(), "Unterminated double quote");
        assert_eq!(err.pos(), 5);
    }

    #[test]
    fn test_unterminated_subscript() {
        let err = Parser::new("a[1", &ParseOptions::default()).parse().unwrap_err();
        assert!(err.is_unterminated());
        assert_eq!(err.message(), "unexpected EOF looking for `]'");
    }

    #[test]
    fn test_matched_pair_nesting_and_quotes() {
        let mut parser = Parser::new("a (b) ')' \"x)\" c) rest", &ParseOptions::default());
        let text = parser
            .parse_matched_pair('(', ')', MatchedPairFlags::NONE, false)
            .unwrap();
        assert_eq!(text, "a (b) ')' \"x)\" c");
        assert_eq!(parser.pos(), 17);
    }

    #[test]
    fn test_matched_pair_unterminated() {
        let mut parser = Parser::new("abc", &ParseOptions::default());
        let err = parser
            .parse_matched_pair('{', '}', MatchedPairFlags::NONE, false)
            .unwrap_err();
        assert!(err.is_unterminated());
        assert_eq!(err.message(), "unexpected EOF while looking for matching `}'");
    }
}
