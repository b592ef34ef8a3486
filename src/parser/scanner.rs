//! Raw text scanners
//!
//! Stateless helpers that skip over quoted strings, substitutions and heredoc
//! bodies in a slice of characters without building any nodes. The parser
//! uses them to find where a construct ends before handing the enclosed text
//! to a sub-parse, and to look ahead without disturbing its own cursor.
//!
//! All positions are character indices into the slice.

use crate::parser::context::QuoteState;
use crate::parser::types::{is_blank, is_ident_char, is_ident_start, is_metachar};

/// Flags for [`skip_matched_pair`]
pub const SKIP_PAST_OPEN: u8 = 0x01;
/// Treat quotes, backslashes and substitutions as plain characters
pub const SKIP_LITERAL: u8 = 0x02;

pub fn starts_with_at(s: &[char], pos: usize, prefix: &str) -> bool {
    let mut i = pos;
    for p in prefix.chars() {
        if s.get(i) != Some(&p) {
            return false;
        }
        i += 1;
    }
    true
}

fn at(s: &[char], i: usize) -> Option<char> {
    s.get(i).copied()
}

pub fn collect(s: &[char], start: usize, end: usize) -> String {
    let end = end.min(s.len());
    if start >= end {
        return String::new();
    }
    s[start..end].iter().collect()
}

// =============================================================================
// QUOTES & BACKTICKS
// =============================================================================

/// Index just past the closing `'`; `start` is the first char after the opener
pub fn skip_single_quoted(s: &[char], start: usize) -> usize {
    let mut i = start;
    while i < s.len() && s[i] != '\'' {
        i += 1;
    }
    if i < s.len() {
        i + 1
    } else {
        i
    }
}

/// Index just past the closing `"`, skipping nested substitutions
pub fn skip_double_quoted(s: &[char], start: usize) -> usize {
    let n = s.len();
    let mut i = start;
    let mut pass_next = false;
    let mut backq = false;
    while i < n {
        let c = s[i];
        if pass_next {
            pass_next = false;
            i += 1;
            continue;
        }
        if c == '\\' {
            pass_next = true;
            i += 1;
            continue;
        }
        if backq {
            if c == '`' {
                backq = false;
            }
            i += 1;
            continue;
        }
        if c == '`' {
            backq = true;
            i += 1;
            continue;
        }
        if c == '$' && i + 1 < n {
            if s[i + 1] == '(' {
                i = find_cmdsub_end(s, i + 2);
                continue;
            }
            if s[i + 1] == '{' {
                i = find_braced_param_end(s, i + 2);
                continue;
            }
        }
        if c == '"' {
            return i + 1;
        }
        i += 1;
    }
    i
}

/// Index just past the closing backtick; `start` is at the opening one
pub fn skip_backtick(s: &[char], start: usize) -> usize {
    let mut i = start + 1;
    while i < s.len() && s[i] != '`' {
        if s[i] == '\\' && i + 1 < s.len() {
            i += 2;
        } else {
            i += 1;
        }
    }
    if i < s.len() {
        i += 1;
    }
    i
}

// =============================================================================
// EXPANSION BOUNDARIES
// =============================================================================

/// Number of unescaped `$` characters immediately before `pos`
pub fn count_consecutive_dollars_before(s: &[char], pos: usize) -> usize {
    let mut count = 0;
    let mut k = pos;
    while k > 0 && s[k - 1] == '$' {
        let mut bs = 0;
        let mut j = k - 1;
        while j > 0 && s[j - 1] == '\\' {
            bs += 1;
            j -= 1;
        }
        if bs % 2 == 1 {
            break;
        }
        count += 1;
        k -= 1;
    }
    count
}

/// `delimiter` starts at `pos` and is not the tail of a `$$` pair
pub fn is_expansion_start(s: &[char], pos: usize, delimiter: &str) -> bool {
    starts_with_at(s, pos, delimiter) && count_consecutive_dollars_before(s, pos) % 2 == 0
}

pub fn is_backslash_escaped(s: &[char], idx: usize) -> bool {
    let mut bs = 0;
    let mut j = idx;
    while j > 0 && s[j - 1] == '\\' {
        bs += 1;
        j -= 1;
    }
    bs % 2 == 1
}

/// `start` is at `$((`: is there a `))` at paren depth zero before any lone `)`?
pub fn is_valid_arithmetic_start(s: &[char], start: usize) -> bool {
    let mut depth = 0usize;
    let mut i = start + 3;
    while i < s.len() {
        if is_expansion_start(s, i, "$(") {
            i = find_cmdsub_end(s, i + 2);
            continue;
        }
        match s[i] {
            '(' => depth += 1,
            ')' => {
                if depth > 0 {
                    depth -= 1;
                } else {
                    return at(s, i + 1) == Some(')');
                }
            }
            _ => {}
        }
        i += 1;
    }
    false
}

/// Whether `word` at `pos` stands alone (not part of a longer identifier)
pub fn is_word_boundary(s: &[char], pos: usize, word_len: usize) -> bool {
    if pos > 0 {
        let prev = s[pos - 1];
        if prev.is_alphanumeric() || prev == '_' || matches!(prev, '{' | '}' | '!') {
            return false;
        }
    }
    match at(s, pos + word_len) {
        Some(next) => !(next.is_alphanumeric() || next == '_'),
        None => true,
    }
}

fn at_keyword(s: &[char], i: usize, word: &str) -> bool {
    starts_with_at(s, i, word) && is_word_boundary(s, i, word.chars().count())
}

/// From inside a case pattern list, does a matching `esac` close the nested
/// case before a `)` at depth zero ends the pattern?
pub fn lookahead_for_esac(s: &[char], start: usize, case_depth: usize) -> bool {
    let mut i = start;
    let mut depth = case_depth;
    let mut quote = QuoteState::new();
    while i < s.len() {
        let c = s[i];
        if c == '\\' && i + 1 < s.len() && quote.double {
            i += 2;
            continue;
        }
        if c == '\'' && !quote.double {
            quote.toggle_single();
            i += 1;
            continue;
        }
        if c == '"' && !quote.single {
            quote.toggle_double();
            i += 1;
            continue;
        }
        if quote.in_quotes() {
            i += 1;
            continue;
        }
        if at_keyword(s, i, "case") {
            depth += 1;
            i += 4;
        } else if at_keyword(s, i, "esac") {
            depth = depth.saturating_sub(1);
            if depth == 0 {
                return true;
            }
            i += 4;
        } else if c == ')' && depth == 0 {
            break;
        } else {
            i += 1;
        }
    }
    false
}

/// Index just past the `)` that closes a `$(` whose body begins at `start`.
/// Returns `s.len()` when there is no closer.
pub fn find_cmdsub_end(s: &[char], start: usize) -> usize {
    let n = s.len();
    let mut depth = 1usize;
    let mut i = start;
    let mut case_depth = 0usize;
    let mut in_case_patterns = false;
    let mut arith_depth = 0usize;
    let mut arith_paren_depth = 0usize;

    while i < n && depth > 0 {
        let c = s[i];
        if c == '\\' && i + 1 < n {
            i += 2;
            continue;
        }
        if c == '\'' {
            i = skip_single_quoted(s, i + 1);
            continue;
        }
        if c == '"' {
            i = skip_double_quoted(s, i + 1);
            continue;
        }
        if c == '#'
            && arith_depth == 0
            && (i == start || matches!(s[i - 1], ' ' | '\t' | '\n' | ';' | '|' | '&' | '(' | ')'))
        {
            while i < n && s[i] != '\n' {
                i += 1;
            }
            continue;
        }
        if starts_with_at(s, i, "<<<") {
            i = skip_herestring_word(s, i + 3);
            continue;
        }
        if is_expansion_start(s, i, "$((") {
            if is_valid_arithmetic_start(s, i) {
                arith_depth += 1;
                i += 3;
            } else {
                i = find_cmdsub_end(s, i + 2);
            }
            continue;
        }
        if arith_depth > 0 && arith_paren_depth == 0 && starts_with_at(s, i, "))") {
            arith_depth -= 1;
            i += 2;
            continue;
        }
        if c == '`' {
            i = skip_backtick(s, i);
            continue;
        }
        if arith_depth == 0 && starts_with_at(s, i, "<<") {
            i = skip_heredoc(s, i);
            continue;
        }
        if at_keyword(s, i, "case") {
            case_depth += 1;
            in_case_patterns = false;
            i += 4;
            continue;
        }
        if case_depth > 0 && at_keyword(s, i, "in") {
            in_case_patterns = true;
            i += 2;
            continue;
        }
        if at_keyword(s, i, "esac") {
            if case_depth > 0 {
                case_depth -= 1;
                in_case_patterns = false;
            }
            i += 4;
            continue;
        }
        if starts_with_at(s, i, ";;") {
            i += 2;
            continue;
        }
        if c == '(' {
            if !(in_case_patterns && case_depth > 0) {
                if arith_depth > 0 {
                    arith_paren_depth += 1;
                } else {
                    depth += 1;
                }
            }
        } else if c == ')' {
            if in_case_patterns && case_depth > 0 {
                if !lookahead_for_esac(s, i + 1, case_depth) {
                    depth -= 1;
                }
            } else if arith_depth > 0 {
                arith_paren_depth = arith_paren_depth.saturating_sub(1);
            } else {
                depth -= 1;
            }
        }
        i += 1;
    }
    i
}

fn skip_herestring_word(s: &[char], start: usize) -> usize {
    let n = s.len();
    let mut i = start;
    while i < n && is_blank(s[i]) {
        i += 1;
    }
    match at(s, i) {
        Some('"') => {
            i += 1;
            while i < n && s[i] != '"' {
                i += if s[i] == '\\' && i + 1 < n { 2 } else { 1 };
            }
            (i + 1).min(n)
        }
        Some('\'') => skip_single_quoted(s, i + 1),
        _ => {
            while i < n && !matches!(s[i], ' ' | '\t' | '\n' | ';' | '|' | '&' | '<' | '>' | '(' | ')') {
                i += 1;
            }
            i
        }
    }
}

/// Index just past the `}` closing a `${` whose body begins at `start`
pub fn find_braced_param_end(s: &[char], start: usize) -> usize {
    #[derive(PartialEq)]
    enum Stage {
        Param,
        Pattern,
        Word,
    }
    let n = s.len();
    let mut depth = 1usize;
    let mut i = start;
    let mut in_double = false;
    let mut stage = Stage::Param;

    while i < n && depth > 0 {
        let c = s[i];
        if c == '\\' && i + 1 < n {
            i += 2;
            continue;
        }
        if c == '\'' && stage == Stage::Pattern && !in_double {
            i = skip_single_quoted(s, i + 1);
            continue;
        }
        if c == '"' {
            in_double = !in_double;
            i += 1;
            continue;
        }
        if in_double {
            i += 1;
            continue;
        }
        if stage == Stage::Param {
            if matches!(c, '%' | '#' | '^' | ',') {
                stage = Stage::Pattern;
            } else if matches!(c, ':' | '-' | '=' | '?' | '+' | '/') {
                stage = Stage::Word;
            }
        }
        if c == '[' && stage == Stage::Param {
            if let Some(end) = skip_subscript(s, i, 0) {
                i = end;
                continue;
            }
        }
        if matches!(c, '<' | '>') && at(s, i + 1) == Some('(') {
            i = find_cmdsub_end(s, i + 2);
            continue;
        }
        if c == '{' {
            depth += 1;
        } else if c == '}' {
            depth -= 1;
            if depth == 0 {
                return i + 1;
            }
        }
        if is_expansion_start(s, i, "$(") {
            i = find_cmdsub_end(s, i + 2);
            continue;
        }
        if is_expansion_start(s, i, "${") {
            i = find_braced_param_end(s, i + 2);
            continue;
        }
        i += 1;
    }
    i
}

/// Index just past the pair opened at `start` (or just inside it with
/// [`SKIP_PAST_OPEN`]); `None` if it never closes
pub fn skip_matched_pair(s: &[char], start: usize, open: char, close: char, flags: u8) -> Option<usize> {
    let n = s.len();
    let literal = flags & SKIP_LITERAL != 0;
    let mut i = if flags & SKIP_PAST_OPEN != 0 {
        start
    } else {
        if at(s, start) != Some(open) {
            return None;
        }
        start + 1
    };
    let mut depth = 1usize;
    let mut pass_next = false;
    let mut backq = false;

    while i < n && depth > 0 {
        let c = s[i];
        if pass_next {
            pass_next = false;
            i += 1;
            continue;
        }
        if !literal && c == '\\' {
            pass_next = true;
            i += 1;
            continue;
        }
        if backq {
            if c == '`' {
                backq = false;
            }
            i += 1;
            continue;
        }
        if !literal {
            if c == '`' {
                backq = true;
                i += 1;
                continue;
            }
            if c == '\'' {
                i = skip_single_quoted(s, i + 1);
                continue;
            }
            if c == '"' {
                i = skip_double_quoted(s, i + 1);
                continue;
            }
            if is_expansion_start(s, i, "$(") {
                i = find_cmdsub_end(s, i + 2);
                continue;
            }
            if is_expansion_start(s, i, "${") {
                i = find_braced_param_end(s, i + 2);
                continue;
            }
        }
        if !literal && c == open {
            depth += 1;
        } else if c == close {
            depth -= 1;
        }
        i += 1;
    }
    if depth == 0 {
        Some(i)
    } else {
        None
    }
}

pub fn skip_subscript(s: &[char], start: usize, flags: u8) -> Option<usize> {
    skip_matched_pair(s, start, '[', ']', flags)
}

// =============================================================================
// HEREDOCS
// =============================================================================

/// Join a line with the following ones while it ends in an odd number of
/// backslashes. Returns the logical line and the index of its final `\n`
/// (or the end of input).
fn logical_line(s: &[char], line_start: usize) -> (String, usize) {
    let n = s.len();
    let mut line_end = line_start;
    while line_end < n && s[line_end] != '\n' {
        line_end += 1;
    }
    let mut line = collect(s, line_start, line_end);
    while line_end < n {
        if count_trailing_backslashes(&line) % 2 == 0 {
            break;
        }
        line.pop();
        line_end += 1;
        let next_start = line_end;
        while line_end < n && s[line_end] != '\n' {
            line_end += 1;
        }
        line.push_str(&collect(s, next_start, line_end));
    }
    (line, line_end)
}

/// Scan body lines starting at `pos` until `delimiter` matches. Returns the
/// index after the delimiter line, or the index right after the delimiter
/// text when the delimiter is followed by more text on the same line.
fn skip_heredoc_body(s: &[char], mut pos: usize, delimiter: &str, strip_tabs: bool) -> usize {
    let n = s.len();
    let delim_len = delimiter.chars().count();
    while pos < n {
        let line_start = pos;
        let (line, line_end) = logical_line(s, line_start);
        let stripped = if strip_tabs {
            line.trim_start_matches('\t')
        } else {
            line.as_str()
        };
        if stripped == delimiter {
            return if line_end < n { line_end + 1 } else { line_end };
        }
        if stripped.starts_with(delimiter) && stripped.chars().count() > delim_len {
            let tabs = line.chars().count() - stripped.chars().count();
            return line_start + tabs + delim_len;
        }
        pos = if line_end < n { line_end + 1 } else { line_end };
    }
    pos
}

/// Skip a `<<DELIM` redirect at `start` together with the rest of its line
/// and its body. Stops early at a `)` that closes the enclosing substitution.
pub fn skip_heredoc(s: &[char], start: usize) -> usize {
    let n = s.len();
    let mut i = start + 2;
    let strip_tabs = at(s, i) == Some('-');
    if strip_tabs {
        i += 1;
    }
    while i < n && is_blank(s[i]) {
        i += 1;
    }
    let delimiter;
    match at(s, i) {
        Some(q) if q == '"' || q == '\'' => {
            i += 1;
            let delim_start = i;
            while i < n && s[i] != q {
                i += 1;
            }
            delimiter = collect(s, delim_start, i);
            if i < n {
                i += 1;
            }
        }
        Some('\\') => {
            i += 1;
            let delim_start = i;
            if i < n {
                i += 1;
            }
            while i < n && !is_metachar(s[i]) {
                i += 1;
            }
            delimiter = collect(s, delim_start, i);
        }
        _ => {
            let delim_start = i;
            while i < n && !is_metachar(s[i]) {
                i += 1;
            }
            delimiter = collect(s, delim_start, i);
        }
    }

    // Rest of the redirect line
    let mut paren_depth = 0usize;
    let mut quote = QuoteState::new();
    let mut in_backtick = false;
    while i < n && s[i] != '\n' {
        let c = s[i];
        if c == '\\' && i + 1 < n && (quote.double || in_backtick) {
            i += 2;
            continue;
        }
        if c == '\'' && !quote.double && !in_backtick {
            quote.toggle_single();
            i += 1;
            continue;
        }
        if c == '"' && !quote.single && !in_backtick {
            quote.toggle_double();
            i += 1;
            continue;
        }
        if c == '`' && !quote.single {
            in_backtick = !in_backtick;
            i += 1;
            continue;
        }
        if quote.in_quotes() || in_backtick {
            i += 1;
            continue;
        }
        if c == '(' {
            paren_depth += 1;
        } else if c == ')' {
            if paren_depth == 0 {
                break;
            }
            paren_depth -= 1;
        }
        i += 1;
    }
    if at(s, i) == Some(')') {
        return i;
    }
    if at(s, i) == Some('\n') {
        i += 1;
    }
    skip_heredoc_body(s, i, &delimiter, strip_tabs)
}

/// Locate the bodies of heredocs whose redirects appeared on the line
/// containing `start`. Returns `(newline index, end of last body)`, or
/// `(start, start)` when there is nothing to skip.
pub fn find_heredoc_content_end(s: &[char], start: usize, delimiters: &[(String, bool)]) -> (usize, usize) {
    if delimiters.is_empty() {
        return (start, start);
    }
    let mut pos = start;
    while pos < s.len() && s[pos] != '\n' {
        pos += 1;
    }
    if pos >= s.len() {
        return (start, start);
    }
    let content_start = pos;
    pos += 1;
    for (delimiter, strip_tabs) in delimiters {
        pos = skip_heredoc_body(s, pos, delimiter, *strip_tabs);
    }
    (content_start, pos)
}

pub fn count_trailing_backslashes(s: &str) -> usize {
    s.chars().rev().take_while(|&c| c == '\\').count()
}

/// Squeeze runs of blanks to one space and trim
pub fn collapse_whitespace(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut prev_ws = false;
    for c in s.chars() {
        if is_blank(c) {
            if !prev_ws {
                out.push(' ');
            }
            prev_ws = true;
        } else {
            out.push(c);
            prev_ws = false;
        }
    }
    out.trim().to_string()
}

/// Canonical form of a delimiter that contains `$(...)`, `${...}` or a
/// process substitution, so that the closing line can match regardless of
/// blank spacing inside those constructs
pub fn normalize_heredoc_delimiter(delimiter: &str) -> String {
    let d: Vec<char> = delimiter.chars().collect();
    let mut out = String::new();
    let mut i = 0;
    while i < d.len() {
        let pair = if i + 1 < d.len() {
            match (d[i], d[i + 1]) {
                ('$', '(') => Some(('(', ')')),
                ('$', '{') => Some(('{', '}')),
                ('<', '(') | ('>', '(') => Some(('(', ')')),
                _ => None,
            }
        } else {
            None
        };
        let Some((open, close)) = pair else {
            out.push(d[i]);
            i += 1;
            continue;
        };
        out.push(d[i]);
        out.push(open);
        i += 2;
        let mut depth = 1;
        let mut inner = String::new();
        while i < d.len() && depth > 0 {
            let c = d[i];
            if c == open {
                depth += 1;
                inner.push(c);
            } else if c == close {
                depth -= 1;
                if depth == 0 {
                    out.push_str(&collapse_whitespace(&inner));
                    out.push(close);
                } else {
                    inner.push(c);
                }
            } else {
                inner.push(c);
            }
            i += 1;
        }
    }
    out
}

// =============================================================================
// ASSIGNMENTS
// =============================================================================

/// Index of the `=` in `name=`, `name+=`, `name[sub]=` or `name[sub]+=`
pub fn assignment(s: &[char], literal_subscript: bool) -> Option<usize> {
    if !at(s, 0).is_some_and(is_ident_start) {
        return None;
    }
    let mut i = 1;
    while i < s.len() {
        let c = s[i];
        if c == '=' {
            return Some(i);
        }
        if c == '[' {
            let flags = if literal_subscript { SKIP_LITERAL } else { 0 };
            i = skip_subscript(s, i, flags)?;
            if at(s, i) == Some('+') {
                i += 1;
            }
            return (at(s, i) == Some('=')).then_some(i);
        }
        if c == '+' {
            return (at(s, i + 1) == Some('=')).then_some(i + 1);
        }
        if !is_ident_char(c) {
            return None;
        }
        i += 1;
    }
    None
}

pub fn looks_like_assignment(s: &str) -> bool {
    let chars: Vec<char> = s.chars().collect();
    assignment(&chars, false).is_some()
}

/// Text read so far is `name` followed only by complete `[...]` subscripts
pub fn is_array_assignment_prefix(s: &[char]) -> bool {
    if !at(s, 0).is_some_and(is_ident_start) {
        return false;
    }
    let mut i = 1;
    while i < s.len() && is_ident_char(s[i]) {
        i += 1;
    }
    while i < s.len() {
        if s[i] != '[' {
            return false;
        }
        match skip_subscript(s, i, SKIP_LITERAL) {
            Some(end) => i = end,
            None => return false,
        }
    }
    true
}

// =============================================================================
// TEXT CLEANUP
// =============================================================================

/// Remove unescaped backslash-newline pairs, keeping the newline that ends a
/// comment so the comment does not swallow the following line
pub fn strip_line_continuations_comment_aware(text: &str) -> String {
    let s: Vec<char> = text.chars().collect();
    let mut out = String::with_capacity(text.len());
    let mut in_comment = false;
    let mut quote = QuoteState::new();
    let mut i = 0;
    while i < s.len() {
        let c = s[i];
        if c == '\\' && at(&s, i + 1) == Some('\n') && !is_backslash_escaped(&s, i) {
            if in_comment {
                out.push('\n');
            }
            i += 2;
            in_comment = false;
            continue;
        }
        if c == '\n' {
            in_comment = false;
            out.push(c);
            i += 1;
            continue;
        }
        if !in_comment {
            if c == '\'' && !quote.double {
                quote.toggle_single();
            } else if c == '"' && !quote.single {
                quote.toggle_double();
            } else if c == '#' && !quote.single {
                in_comment = true;
            }
        }
        out.push(c);
        i += 1;
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chars(s: &str) -> Vec<char> {
        s.chars().collect()
    }

    #[test]
    fn test_find_cmdsub_end_nested() {
        let s = chars("$(echo $(ls) ')' \")\") tail");
        let end = find_cmdsub_end(&s, 2);
        assert_eq!(collect(&s, 0, end), "$(echo $(ls) ')' \")\")");
    }

    #[test]
    fn test_find_cmdsub_end_case_patterns() {
        let s = chars("$(case x in a) echo;; esac) rest");
        let end = find_cmdsub_end(&s, 2);
        assert_eq!(collect(&s, end, s.len()), " rest");
    }

    #[test]
    fn test_find_cmdsub_end_skips_heredoc() {
        let s = chars("$(cat <<EOF\n)\nEOF\n) x");
        let end = find_cmdsub_end(&s, 2);
        assert_eq!(collect(&s, end, s.len()), " x");
    }

    #[test]
    fn test_find_braced_param_end() {
        let s = chars("${a:-${b}} x");
        assert_eq!(find_braced_param_end(&s, 2), 10);
        let s = chars("${a#'}'} x");
        assert_eq!(find_braced_param_end(&s, 2), 8);
    }

    #[test]
    fn test_valid_arithmetic_start() {
        assert!(is_valid_arithmetic_start(&chars("$((1+(2)))"), 0));
        assert!(!is_valid_arithmetic_start(&chars("$((ls) )"), 0));
    }

    #[test]
    fn test_expansion_start_respects_dollar_pairs() {
        let s = chars("$$(x)");
        assert!(!is_expansion_start(&s, 1, "$("));
        let s = chars("a$(x)");
        assert!(is_expansion_start(&s, 1, "$("));
    }

    #[test]
    fn test_word_boundary() {
        let s = chars("x esac y");
        assert!(is_word_boundary(&s, 2, 4));
        let s = chars("xesac");
        assert!(!is_word_boundary(&s, 1, 4));
        let s = chars("{esac");
        assert!(!is_word_boundary(&s, 1, 4));
    }

    #[test]
    fn test_skip_heredoc_with_continuation() {
        let s = chars("<<EOF\nbody\\\nEOF\nEOF\nafter");
        let end = skip_heredoc(&s, 0);
        assert_eq!(collect(&s, end, s.len()), "after");
    }

    #[test]
    fn test_find_heredoc_content_end() {
        let s = chars("`cat <<A` x\nline\nA\nnext");
        let (content_start, end) = find_heredoc_content_end(&s, 9, &[("A".to_string(), false)]);
        assert_eq!(s[content_start], '\n');
        assert_eq!(collect(&s, end, s.len()), "next");
    }

    #[test]
    fn test_assignment_forms() {
        assert_eq!(assignment(&chars("a=1"), false), Some(1));
        assert_eq!(assignment(&chars("a+=1"), false), Some(2));
        assert_eq!(assignment(&chars("a[i+1]=x"), false), Some(6));
        assert_eq!(assignment(&chars("1a=1"), false), None);
        assert!(looks_like_assignment("arr[0]+=(x)"));
        assert!(!looks_like_assignment("echo"));
    }

    #[test]
    fn test_array_assignment_prefix() {
        assert!(is_array_assignment_prefix(&chars("arr")));
        assert!(is_array_assignment_prefix(&chars("arr[1][2]")));
        assert!(!is_array_assignment_prefix(&chars("arr[1")));
        assert!(!is_array_assignment_prefix(&chars("arr-x")));
    }

    #[test]
    fn test_normalize_heredoc_delimiter() {
        assert_eq!(normalize_heredoc_delimiter("$(  echo   x )"), "$(echo x)");
        assert_eq!(normalize_heredoc_delimiter("EOF"), "EOF");
    }

    #[test]
    fn test_strip_line_continuations_comment_aware() {
        assert_eq!(strip_line_continuations_comment_aware("a \\\nb"), "a b");
        assert_eq!(strip_line_continuations_comment_aware("# c \\\nx"), "# c \nx");
        assert_eq!(strip_line_continuations_comment_aware("a \\\\\nb"), "a \\\\\nb");
    }

    #[test]
    fn test_collapse_whitespace() {
        assert_eq!(collapse_whitespace("  a \t b  "), "a b");
        assert_eq!(count_trailing_backslashes("x\\\\"), 2);
    }
}
