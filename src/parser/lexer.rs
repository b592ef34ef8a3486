//! Lexer for Bash Scripts
//!
//! Owns the source characters and the cursor. It recognizes operators,
//! blanks, comments and the leaf quoting forms that need no recursion.
//! Words are assembled by the parser (see `word_parser.rs`) because a word
//! may contain command substitutions that require a full list parse.
//!
//! The lexer also holds the one-token lookahead cache. A cached token is
//! only reused when it was read at the same offset under the same
//! [`LexMode`], parser state and end-of-construct character.

use crate::ast::types::{AnsiCQuoteNode, WordNode, WordPart};
use crate::parser::context::{LexMode, QuoteState};
use crate::parser::scanner;
use crate::parser::types::{is_simple_param_op, ParseError, ParserState, Result, WordContext};

/// Token types for bash lexer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TokenType {
    // End of input
    Eof,

    // Newlines and separators
    Newline,
    Semicolon,
    Amp, // &

    // Operators
    Pipe,    // |
    PipeAmp, // |&
    AndAnd,  // &&
    OrOr,    // ||

    // Redirections
    Less,      // <
    Great,     // >
    DLess,     // <<
    DGreat,    // >>
    LessAnd,   // <&
    GreatAnd,  // >&
    LessGreat, // <>
    DLessDash, // <<-
    Clobber,   // >|
    TLess,     // <<<
    AndGreat,  // &>
    AndDGreat, // &>>

    // Grouping
    LParen, // (
    RParen, // )

    // Case terminators
    DSemi,       // ;;
    SemiAnd,     // ;&
    SemiSemiAnd, // ;;&

    Word,
}

impl TokenType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Eof => "EOF",
            Self::Newline => "NEWLINE",
            Self::Semicolon => ";",
            Self::Amp => "&",
            Self::Pipe => "|",
            Self::PipeAmp => "|&",
            Self::AndAnd => "&&",
            Self::OrOr => "||",
            Self::Less => "<",
            Self::Great => ">",
            Self::DLess => "<<",
            Self::DGreat => ">>",
            Self::LessAnd => "<&",
            Self::GreatAnd => ">&",
            Self::LessGreat => "<>",
            Self::DLessDash => "<<-",
            Self::Clobber => ">|",
            Self::TLess => "<<<",
            Self::AndGreat => "&>",
            Self::AndDGreat => "&>>",
            Self::LParen => "(",
            Self::RParen => ")",
            Self::DSemi => ";;",
            Self::SemiAnd => ";&",
            Self::SemiSemiAnd => ";;&",
            Self::Word => "WORD",
        }
    }

    pub fn is_redirect(&self) -> bool {
        matches!(
            self,
            Self::Less
                | Self::Great
                | Self::DLess
                | Self::DGreat
                | Self::LessAnd
                | Self::GreatAnd
                | Self::LessGreat
                | Self::DLessDash
                | Self::Clobber
                | Self::TLess
                | Self::AndGreat
                | Self::AndDGreat
        )
    }
}

/// A token produced by the lexer
#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub token_type: TokenType,
    pub value: String,
    /// Character offsets into the source
    pub start: usize,
    pub end: usize,
    /// For WORD tokens: the parsed word with its expansion parts
    pub word: Option<WordNode>,
}

impl Token {
    pub fn new(token_type: TokenType, value: impl Into<String>, start: usize, end: usize) -> Self {
        Self {
            token_type,
            value: value.into(),
            start,
            end,
            word: None,
        }
    }

    pub fn eof(pos: usize) -> Self {
        Self::new(TokenType::Eof, "", pos, pos)
    }

    pub fn with_word(mut self, word: WordNode) -> Self {
        self.word = Some(word);
        self
    }

    /// Word text with a trailing line continuation removed, as used for
    /// reserved-word comparison
    pub fn keyword(&self) -> Option<&str> {
        if self.token_type != TokenType::Word {
            return None;
        }
        Some(self.value.strip_suffix("\\\n").unwrap_or(&self.value))
    }
}

/// Three-character operators
const THREE_CHAR_OPS: &[(&str, TokenType)] = &[
    (";;&", TokenType::SemiSemiAnd),
    ("<<-", TokenType::DLessDash),
    ("<<<", TokenType::TLess),
    ("&>>", TokenType::AndDGreat),
];

/// Two-character operators
const TWO_CHAR_OPS: &[(&str, TokenType)] = &[
    ("&&", TokenType::AndAnd),
    ("||", TokenType::OrOr),
    (";;", TokenType::DSemi),
    (";&", TokenType::SemiAnd),
    ("<<", TokenType::DLess),
    (">>", TokenType::DGreat),
    ("<&", TokenType::LessAnd),
    (">&", TokenType::GreatAnd),
    ("<>", TokenType::LessGreat),
    (">|", TokenType::Clobber),
    ("&>", TokenType::AndGreat),
    ("|&", TokenType::PipeAmp),
];

/// Characters after which `#` starts a comment
const COMMENT_PRECEDERS: &str = " \t\n;|&(){}";

#[derive(Debug, Clone)]
struct CachedToken {
    start: usize,
    mode: LexMode,
    state: ParserState,
    eof_token: Option<char>,
    end: usize,
    token: Token,
}

impl CachedToken {
    fn matches(&self, start: usize, mode: LexMode, state: ParserState, eof_token: Option<char>) -> bool {
        self.start == start && self.mode == mode && self.state == state && self.eof_token == eof_token
    }
}

/// Lexer class
pub struct Lexer {
    input: Vec<char>,
    pub pos: usize,
    pub quote: QuoteState,
    cache: Option<CachedToken>,
    /// Byte offset and line of the first character, for error positions of
    /// sources extracted from a larger script
    origin: (usize, usize),
}

impl Lexer {
    pub fn new(input: &str) -> Self {
        Self::with_origin(input, (0, 1))
    }

    pub fn with_origin(input: &str, origin: (usize, usize)) -> Self {
        Self {
            input: input.chars().collect(),
            pos: 0,
            quote: QuoteState::new(),
            cache: None,
            origin,
        }
    }

    pub fn input(&self) -> &[char] {
        &self.input
    }

    pub fn len(&self) -> usize {
        self.input.len()
    }

    pub fn is_empty(&self) -> bool {
        self.input.is_empty()
    }

    pub fn at_end(&self) -> bool {
        self.pos >= self.input.len()
    }

    pub fn current(&self) -> Option<char> {
        self.input.get(self.pos).copied()
    }

    pub fn peek(&self, offset: usize) -> Option<char> {
        self.input.get(self.pos + offset).copied()
    }

    pub fn char_at(&self, idx: usize) -> Option<char> {
        self.input.get(idx).copied()
    }

    pub fn advance(&mut self) -> Option<char> {
        let c = self.current();
        if self.pos < self.input.len() {
            self.pos += 1;
        }
        c
    }

    pub fn starts_with(&self, prefix: &str) -> bool {
        scanner::starts_with_at(&self.input, self.pos, prefix)
    }

    pub fn slice(&self, start: usize, end: usize) -> String {
        scanner::collect(&self.input, start, end)
    }

    /// Byte offset and 1-based line of a character index
    pub fn location(&self, idx: usize) -> (usize, usize) {
        let head = &self.input[..idx.min(self.input.len())];
        let bytes: usize = head.iter().map(|c| c.len_utf8()).sum();
        let lines = head.iter().filter(|&&c| c == '\n').count();
        (self.origin.0 + bytes, self.origin.1 + lines)
    }

    pub fn syntax_error(&self, message: impl Into<String>, at: usize) -> ParseError {
        let (pos, line) = self.location(at);
        ParseError::syntax(message, pos, line)
    }

    pub fn unterminated(&self, message: impl Into<String>, at: usize) -> ParseError {
        let (pos, line) = self.location(at);
        ParseError::unterminated(message, pos, line)
    }

    // =========================================================================
    // TOKEN CACHE
    // =========================================================================

    pub fn cached(&self, start: usize, mode: LexMode, state: ParserState, eof_token: Option<char>) -> Option<&Token> {
        self.cache
            .as_ref()
            .filter(|c| c.matches(start, mode, state, eof_token))
            .map(|c| &c.token)
    }

    /// Take the cached token if it matches, moving the cursor past it
    pub fn take_cached(
        &mut self,
        start: usize,
        mode: LexMode,
        state: ParserState,
        eof_token: Option<char>,
    ) -> Option<Token> {
        if !self.cache.as_ref().is_some_and(|c| c.matches(start, mode, state, eof_token)) {
            return None;
        }
        let cached = self.cache.take()?;
        self.pos = cached.end;
        Some(cached.token)
    }

    pub fn store(
        &mut self,
        start: usize,
        mode: LexMode,
        state: ParserState,
        eof_token: Option<char>,
        end: usize,
        token: Token,
    ) {
        self.cache = Some(CachedToken {
            start,
            mode,
            state,
            eof_token,
            end,
            token,
        });
    }

    pub fn invalidate(&mut self) {
        self.cache = None;
    }

    // =========================================================================
    // OPERATORS, BLANKS, COMMENTS
    // =========================================================================

    /// Longest-match operator at the cursor. `(` and `)` are not operators in
    /// a regex word, and `<(` / `>(` start a process substitution instead.
    pub fn read_operator(&mut self, context: WordContext) -> Option<Token> {
        let start = self.pos;
        let c = self.current()?;

        for (op, token_type) in THREE_CHAR_OPS.iter().chain(TWO_CHAR_OPS) {
            if self.starts_with(op) {
                self.pos += op.len();
                return Some(Token::new(*token_type, *op, start, self.pos));
            }
        }

        let token_type = match c {
            ';' => TokenType::Semicolon,
            '|' => TokenType::Pipe,
            '&' => TokenType::Amp,
            '(' | ')' if context == WordContext::Regex => return None,
            '(' => TokenType::LParen,
            ')' => TokenType::RParen,
            '<' | '>' if self.peek(1) == Some('(') => return None,
            '<' => TokenType::Less,
            '>' => TokenType::Great,
            '\n' => TokenType::Newline,
            _ => return None,
        };
        self.pos += 1;
        Some(Token::new(token_type, c.to_string(), start, self.pos))
    }

    pub fn skip_blanks(&mut self) {
        while matches!(self.current(), Some(' ' | '\t')) {
            self.pos += 1;
        }
    }

    /// Skip a `#` comment up to (not including) the newline
    pub fn skip_comment(&mut self) -> bool {
        if self.current() != Some('#') || self.quote.in_quotes() {
            return false;
        }
        if self.pos > 0 && !self.char_at(self.pos - 1).is_some_and(|p| COMMENT_PRECEDERS.contains(p)) {
            return false;
        }
        while self.current().is_some_and(|c| c != '\n') {
            self.pos += 1;
        }
        true
    }

    // =========================================================================
    // LEAF QUOTING FORMS
    // =========================================================================

    /// Read a single-quoted string; the cursor is just past the opening quote.
    /// Returns the text including both quotes.
    pub fn read_single_quote(&mut self, word_start: usize) -> Result<String> {
        let mut text = String::from("'");
        while let Some(c) = self.advance() {
            text.push(c);
            if c == '\'' {
                return Ok(text);
            }
        }
        Err(self.unterminated("Unterminated single quote", word_start))
    }

    /// `$'...'` at the cursor. Returns the node and its source text.
    pub fn read_ansi_c_quote(&mut self) -> Result<Option<(WordPart, String)>> {
        if !self.starts_with("$'") {
            return Ok(None);
        }
        let start = self.pos;
        self.pos += 2;
        let mut content = String::new();
        loop {
            match self.advance() {
                None => {
                    return Err(self.unterminated("unexpected EOF while looking for matching `''", start));
                }
                Some('\'') => break,
                Some('\\') => {
                    content.push('\\');
                    if let Some(escaped) = self.advance() {
                        content.push(escaped);
                    }
                }
                Some(c) => content.push(c),
            }
        }
        let text = self.slice(start, self.pos);
        Ok(Some((WordPart::AnsiCQuote(AnsiCQuoteNode { content }), text)))
    }

    // =========================================================================
    // PARAMETER EXPANSION PIECES
    // =========================================================================

    /// Operator after a parameter name inside `${...}`
    pub fn consume_param_operator(&mut self) -> Option<String> {
        let ch = self.current()?;
        let doubled = |lexer: &mut Self, c: char| -> String {
            lexer.advance();
            if lexer.current() == Some(c) {
                lexer.advance();
                format!("{c}{c}")
            } else {
                c.to_string()
            }
        };
        let op = match ch {
            ':' => {
                self.advance();
                match self.current() {
                    Some(next) if is_simple_param_op(next) => {
                        self.advance();
                        format!(":{next}")
                    }
                    _ => ":".to_string(),
                }
            }
            c if is_simple_param_op(c) => {
                self.advance();
                c.to_string()
            }
            '#' | '%' | '^' | ',' => doubled(self, ch),
            '/' => {
                self.advance();
                match self.current() {
                    Some(next @ ('/' | '#' | '%')) => {
                        self.advance();
                        format!("/{next}")
                    }
                    _ => "/".to_string(),
                }
            }
            '@' => {
                self.advance();
                "@".to_string()
            }
            _ => return None,
        };
        Some(op)
    }

    /// Whether the `[` at `start` closes before the `}` of the expansion
    pub fn param_subscript_has_close(&self, start: usize) -> bool {
        let mut depth = 1;
        let mut quote = QuoteState::new();
        let mut i = start + 1;
        while let Some(c) = self.char_at(i) {
            if quote.single {
                if c == '\'' {
                    quote.toggle_single();
                }
                i += 1;
                continue;
            }
            if quote.double {
                if c == '\\' && i + 1 < self.len() {
                    i += 2;
                    continue;
                }
                if c == '"' {
                    quote.toggle_double();
                }
                i += 1;
                continue;
            }
            match c {
                '\'' => quote.toggle_single(),
                '"' => quote.toggle_double(),
                '\\' => {
                    i += 2;
                    continue;
                }
                '}' => return false,
                '[' => depth += 1,
                ']' => {
                    depth -= 1;
                    if depth == 0 {
                        return true;
                    }
                }
                _ => {}
            }
            i += 1;
        }
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn operators(input: &str) -> Vec<TokenType> {
        let mut lexer = Lexer::new(input);
        let mut types = Vec::new();
        loop {
            lexer.skip_blanks();
            match lexer.read_operator(WordContext::Normal) {
                Some(tok) => types.push(tok.token_type),
                None => break,
            }
        }
        types
    }

    #[test]
    fn test_longest_match_first() {
        assert_eq!(operators(";;&"), vec![TokenType::SemiSemiAnd]);
        assert_eq!(operators(";; ;"), vec![TokenType::DSemi, TokenType::Semicolon]);
        assert_eq!(operators("<<<"), vec![TokenType::TLess]);
        assert_eq!(operators("<<-"), vec![TokenType::DLessDash]);
        assert_eq!(operators("&>> &>"), vec![TokenType::AndDGreat, TokenType::AndGreat]);
        assert_eq!(operators("|& || |"), vec![TokenType::PipeAmp, TokenType::OrOr, TokenType::Pipe]);
    }

    #[test]
    fn test_procsub_and_regex_parens_are_not_operators() {
        let mut lexer = Lexer::new("<(ls)");
        assert!(lexer.read_operator(WordContext::Normal).is_none());
        let mut lexer = Lexer::new("(a)");
        assert!(lexer.read_operator(WordContext::Regex).is_none());
        let tok = lexer.read_operator(WordContext::Normal).unwrap();
        assert_eq!(tok.token_type, TokenType::LParen);
        assert_eq!((tok.start, tok.end), (0, 1));
    }

    #[test]
    fn test_comment_needs_boundary() {
        let mut lexer = Lexer::new("a#b");
        lexer.pos = 1;
        assert!(!lexer.skip_comment());
        let mut lexer = Lexer::new("# hi\nx");
        assert!(lexer.skip_comment());
        assert_eq!(lexer.current(), Some('\n'));
    }

    #[test]
    fn test_single_quote() {
        let mut lexer = Lexer::new("'a b' c");
        lexer.advance();
        assert_eq!(lexer.read_single_quote(0).unwrap(), "'a b'");
        let mut lexer = Lexer::new("'abc");
        lexer.advance();
        let err = lexer.read_single_quote(0).unwrap_err();
        assert!(err.is_unterminated());
    }

    #[test]
    fn test_ansi_c_quote() {
        let mut lexer = Lexer::new("$'a\\'b' x");
        let (part, text) = lexer.read_ansi_c_quote().unwrap().unwrap();
        assert_eq!(text, "$'a\\'b'");
        if let WordPart::AnsiCQuote(node) = part {
            assert_eq!(node.content, "a\\'b");
        } else {
            panic!("Expected ANSI-C quote");
        }
        let mut lexer = Lexer::new("$'abc");
        assert!(lexer.read_ansi_c_quote().unwrap_err().is_unterminated());
    }

    #[test]
    fn test_param_operators() {
        for (input, op) in [(":-x", ":-"), ("##x", "##"), ("/#x", "/#"), (",,", ",,"), (":x", ":")] {
            let mut lexer = Lexer::new(input);
            assert_eq!(lexer.consume_param_operator().as_deref(), Some(op), "{input}");
        }
        assert!(Lexer::new("x").consume_param_operator().is_none());
    }

    #[test]
    fn test_param_subscript_has_close() {
        let lexer = Lexer::new("a[1]}");
        assert!(lexer.param_subscript_has_close(1));
        let lexer = Lexer::new("a[1}");
        assert!(!lexer.param_subscript_has_close(1));
        let lexer = Lexer::new("a[\"]\"]}");
        assert!(lexer.param_subscript_has_close(1));
    }

    #[test]
    fn test_cache_keyed_on_mode() {
        let mut lexer = Lexer::new("echo");
        let mode = LexMode::default();
        let tok = Token::new(TokenType::Word, "echo", 0, 4);
        lexer.store(0, mode, ParserState::NONE, None, 4, tok);
        let other = LexMode {
            at_command_start: true,
            ..mode
        };
        assert!(lexer.cached(0, other, ParserState::NONE, None).is_none());
        assert!(lexer.cached(0, mode, ParserState::EOFTOKEN, None).is_none());
        let tok = lexer.take_cached(0, mode, ParserState::NONE, None).unwrap();
        assert_eq!(tok.value, "echo");
        assert_eq!(lexer.pos, 4);
    }

    #[test]
    fn test_location_counts_bytes_and_lines() {
        let lexer = Lexer::new("é\nx");
        assert_eq!(lexer.location(2), (3, 2));
        let nested = Lexer::with_origin("ab", (10, 3));
        assert_eq!(nested.location(1), (11, 3));
    }
}
