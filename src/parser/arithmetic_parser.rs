//! Arithmetic Expression Parser
//!
//! Parses the text inside `$(( ))`, `(( ))` and arithmetic operands into an
//! [`ArithExpr`] tree. Only structure is built; nothing is evaluated.
//!
//! Precedence, lowest to highest:
//!   comma → assignment → ternary → `||` → `&&` → `|` → `^` → `&` →
//!   equality → relational → shift → additive → multiplicative → `**` →
//!   unary → postfix → primary

use crate::ast::types::*;
use crate::parser::parser::Parser;
use crate::parser::types::{
    is_ident_char, is_ident_start, is_param_expansion_op, is_special_param, is_whitespace, ParseError,
    ParseOptions, Result,
};

/// Assignment operators, longest first so `<<=` wins over `<` and `=`
const ASSIGN_OPS: &[&str] = &["<<=", ">>=", "+=", "-=", "*=", "/=", "%=", "&=", "^=", "|=", "="];

/// Characters that cannot start an operand; an operand position holding one
/// of them is an omitted operand
const NON_OPERAND_CHARS: &str = ")]:,;?|&<>=!+-*/%^~#{}";

/// Braced-parameter operator prefixes recognized inside arithmetic, longest first
const BRACED_OPS: &[&str] = &[":-", ":=", ":+", ":?", ":", "##", "#", "%%", "%", "//", "/"];

pub struct ArithParser<'a> {
    src: Vec<char>,
    pos: usize,
    options: &'a ParseOptions,
    /// Byte offset and line of the first character, for error positions
    origin: (usize, usize),
    depth: usize,
}

/// Parse arithmetic text. Empty or blank text yields `None`.
pub fn parse_arithmetic(content: &str, options: &ParseOptions, origin: (usize, usize)) -> Result<Option<ArithExpr>> {
    parse_arithmetic_nested(content, options, origin, 0)
}

/// Arithmetic text found at nesting level `depth` of an enclosing parse
pub(crate) fn parse_arithmetic_nested(
    content: &str,
    options: &ParseOptions,
    origin: (usize, usize),
    depth: usize,
) -> Result<Option<ArithExpr>> {
    if depth > options.max_depth {
        return Err(ParseError::depth_limit(options.max_depth, origin.0, origin.1));
    }
    let mut parser = ArithParser::new(content, options, origin);
    parser.depth = depth;
    parser.parse()
}

impl<'a> ArithParser<'a> {
    pub fn new(content: &str, options: &'a ParseOptions, origin: (usize, usize)) -> Self {
        Self {
            src: content.chars().collect(),
            pos: 0,
            options,
            origin,
            depth: 0,
        }
    }

    pub fn parse(&mut self) -> Result<Option<ArithExpr>> {
        self.skip_ws();
        if self.at_end() {
            return Ok(None);
        }
        self.parse_comma().map(Some)
    }

    // =========================================================================
    // CURSOR
    // =========================================================================

    fn at_end(&self) -> bool {
        self.pos >= self.src.len()
    }

    fn peek(&self, offset: usize) -> Option<char> {
        self.src.get(self.pos + offset).copied()
    }

    fn peek_is(&self, offset: usize, c: char) -> bool {
        self.peek(offset) == Some(c)
    }

    fn advance(&mut self) -> Option<char> {
        let c = self.peek(0)?;
        self.pos += 1;
        Some(c)
    }

    fn skip_ws(&mut self) {
        while let Some(c) = self.peek(0) {
            if is_whitespace(c) {
                self.pos += 1;
            } else if c == '\\' && self.peek_is(1, '\n') {
                self.pos += 2;
            } else {
                break;
            }
        }
    }

    fn matches(&self, s: &str) -> bool {
        s.chars().enumerate().all(|(i, c)| self.peek_is(i, c))
    }

    fn consume(&mut self, s: &str) -> bool {
        if self.matches(s) {
            self.pos += s.chars().count();
            true
        } else {
            false
        }
    }

    fn slice(&self, start: usize, end: usize) -> String {
        self.src[start..end.min(self.src.len())].iter().collect()
    }

    fn location(&self, pos: usize) -> (usize, usize) {
        let head = &self.src[..pos.min(self.src.len())];
        let bytes: usize = head.iter().map(|c| c.len_utf8()).sum();
        let lines = head.iter().filter(|&&c| c == '\n').count();
        (self.origin.0 + bytes, self.origin.1 + lines)
    }

    fn error(&self, message: impl Into<String>) -> ParseError {
        let (pos, line) = self.location(self.pos);
        ParseError::syntax(message, pos, line)
    }

    /// Run `parse` one nesting level deeper
    fn descend(&mut self, parse: fn(&mut Self) -> Result<ArithExpr>) -> Result<ArithExpr> {
        self.depth += 1;
        if self.depth > self.options.max_depth {
            let (pos, line) = self.location(self.pos);
            return Err(ParseError::depth_limit(self.options.max_depth, pos, line));
        }
        let result = parse(self);
        self.depth -= 1;
        result
    }

    // =========================================================================
    // BINARY LEVELS
    // =========================================================================

    fn parse_comma(&mut self) -> Result<ArithExpr> {
        let mut left = self.parse_assign()?;
        loop {
            self.skip_ws();
            if !self.consume(",") {
                break;
            }
            self.skip_ws();
            let right = self.parse_assign()?;
            left = ArithExpr::Comma(ArithCommaNode {
                left: Box::new(left),
                right: Box::new(right),
            });
        }
        Ok(left)
    }

    fn parse_assign(&mut self) -> Result<ArithExpr> {
        let left = self.parse_ternary()?;
        self.skip_ws();
        for op in ASSIGN_OPS {
            if self.matches(op) {
                if *op == "=" && self.peek_is(1, '=') {
                    break;
                }
                self.consume(op);
                self.skip_ws();
                let right = self.descend(Self::parse_assign)?;
                return Ok(AST::arith_assign(*op, left, right));
            }
        }
        Ok(left)
    }

    fn parse_ternary(&mut self) -> Result<ArithExpr> {
        let cond = self.parse_logical_or()?;
        self.skip_ws();
        if !self.consume("?") {
            return Ok(cond);
        }
        self.skip_ws();
        let if_true = if self.matches(":") {
            ArithExpr::Empty
        } else {
            self.descend(Self::parse_assign)?
        };
        self.skip_ws();
        let if_false = if self.consume(":") {
            self.skip_ws();
            if self.at_end() || self.peek_is(0, ')') {
                ArithExpr::Empty
            } else {
                self.descend(Self::parse_ternary)?
            }
        } else {
            ArithExpr::Empty
        };
        Ok(ArithExpr::Ternary(ArithTernaryNode {
            condition: Box::new(cond),
            if_true: Box::new(if_true),
            if_false: Box::new(if_false),
        }))
    }

    fn parse_logical_or(&mut self) -> Result<ArithExpr> {
        let mut left = self.parse_logical_and()?;
        loop {
            self.skip_ws();
            if !self.consume("||") {
                return Ok(left);
            }
            self.skip_ws();
            left = AST::arith_binary("||", left, self.parse_logical_and()?);
        }
    }

    fn parse_logical_and(&mut self) -> Result<ArithExpr> {
        let mut left = self.parse_bitwise_or()?;
        loop {
            self.skip_ws();
            if !self.consume("&&") {
                return Ok(left);
            }
            self.skip_ws();
            left = AST::arith_binary("&&", left, self.parse_bitwise_or()?);
        }
    }

    /// Single-char operator `op` not followed by any of `not_next`
    fn at_single_op(&self, op: char, not_next: &[char]) -> bool {
        self.peek_is(0, op) && !self.peek(1).is_some_and(|c| not_next.contains(&c))
    }

    fn parse_bitwise_or(&mut self) -> Result<ArithExpr> {
        let mut left = self.parse_bitwise_xor()?;
        loop {
            self.skip_ws();
            if !self.at_single_op('|', &['|', '=']) {
                return Ok(left);
            }
            self.advance();
            self.skip_ws();
            left = AST::arith_binary("|", left, self.parse_bitwise_xor()?);
        }
    }

    fn parse_bitwise_xor(&mut self) -> Result<ArithExpr> {
        let mut left = self.parse_bitwise_and()?;
        loop {
            self.skip_ws();
            if !self.at_single_op('^', &['=']) {
                return Ok(left);
            }
            self.advance();
            self.skip_ws();
            left = AST::arith_binary("^", left, self.parse_bitwise_and()?);
        }
    }

    fn parse_bitwise_and(&mut self) -> Result<ArithExpr> {
        let mut left = self.parse_equality()?;
        loop {
            self.skip_ws();
            if !self.at_single_op('&', &['&', '=']) {
                return Ok(left);
            }
            self.advance();
            self.skip_ws();
            left = AST::arith_binary("&", left, self.parse_equality()?);
        }
    }

    fn parse_equality(&mut self) -> Result<ArithExpr> {
        let mut left = self.parse_comparison()?;
        loop {
            self.skip_ws();
            let op = if self.consume("==") {
                "=="
            } else if self.consume("!=") {
                "!="
            } else {
                return Ok(left);
            };
            self.skip_ws();
            left = AST::arith_binary(op, left, self.parse_comparison()?);
        }
    }

    fn parse_comparison(&mut self) -> Result<ArithExpr> {
        let mut left = self.parse_shift()?;
        loop {
            self.skip_ws();
            let op = if self.consume("<=") {
                "<="
            } else if self.consume(">=") {
                ">="
            } else if self.at_single_op('<', &['<', '=']) {
                self.advance();
                "<"
            } else if self.at_single_op('>', &['>', '=']) {
                self.advance();
                ">"
            } else {
                return Ok(left);
            };
            self.skip_ws();
            left = AST::arith_binary(op, left, self.parse_shift()?);
        }
    }

    fn parse_shift(&mut self) -> Result<ArithExpr> {
        let mut left = self.parse_additive()?;
        loop {
            self.skip_ws();
            if self.matches("<<=") || self.matches(">>=") {
                return Ok(left);
            }
            let op = if self.consume("<<") {
                "<<"
            } else if self.consume(">>") {
                ">>"
            } else {
                return Ok(left);
            };
            self.skip_ws();
            left = AST::arith_binary(op, left, self.parse_additive()?);
        }
    }

    fn parse_additive(&mut self) -> Result<ArithExpr> {
        let mut left = self.parse_multiplicative()?;
        loop {
            self.skip_ws();
            let op = if self.at_single_op('+', &['+', '=']) {
                "+"
            } else if self.at_single_op('-', &['-', '=']) {
                "-"
            } else {
                return Ok(left);
            };
            self.advance();
            self.skip_ws();
            left = AST::arith_binary(op, left, self.parse_multiplicative()?);
        }
    }

    fn parse_multiplicative(&mut self) -> Result<ArithExpr> {
        let mut left = self.parse_exponentiation()?;
        loop {
            self.skip_ws();
            let op = if self.at_single_op('*', &['*', '=']) {
                "*"
            } else if self.at_single_op('/', &['=']) {
                "/"
            } else if self.at_single_op('%', &['=']) {
                "%"
            } else {
                return Ok(left);
            };
            self.advance();
            self.skip_ws();
            left = AST::arith_binary(op, left, self.parse_exponentiation()?);
        }
    }

    /// `**` is right-associative
    fn parse_exponentiation(&mut self) -> Result<ArithExpr> {
        let left = self.parse_unary()?;
        self.skip_ws();
        if self.consume("**") {
            self.skip_ws();
            let right = self.descend(Self::parse_exponentiation)?;
            return Ok(AST::arith_binary("**", left, right));
        }
        Ok(left)
    }

    // =========================================================================
    // UNARY & POSTFIX
    // =========================================================================

    fn parse_unary(&mut self) -> Result<ArithExpr> {
        self.skip_ws();
        if self.consume("++") {
            self.skip_ws();
            let operand = self.descend(Self::parse_unary)?;
            return Ok(ArithExpr::PreIncr(ArithOperandNode {
                operand: Box::new(operand),
            }));
        }
        if self.consume("--") {
            self.skip_ws();
            let operand = self.descend(Self::parse_unary)?;
            return Ok(ArithExpr::PreDecr(ArithOperandNode {
                operand: Box::new(operand),
            }));
        }
        let op = match self.peek(0) {
            Some('!') => "!",
            Some('~') => "~",
            Some('+') if !self.peek_is(1, '+') => "+",
            Some('-') if !self.peek_is(1, '-') => "-",
            _ => return self.parse_postfix(),
        };
        self.advance();
        self.skip_ws();
        let operand = self.descend(Self::parse_unary)?;
        Ok(AST::arith_unary(op, operand))
    }

    fn parse_postfix(&mut self) -> Result<ArithExpr> {
        let mut left = self.parse_primary()?;
        loop {
            self.skip_ws();
            if self.consume("++") {
                left = ArithExpr::PostIncr(ArithOperandNode {
                    operand: Box::new(left),
                });
            } else if self.consume("--") {
                left = ArithExpr::PostDecr(ArithOperandNode {
                    operand: Box::new(left),
                });
            } else if self.peek_is(0, '[') {
                let ArithExpr::Var(var) = &left else {
                    break;
                };
                let array = var.name.clone();
                self.advance();
                self.skip_ws();
                let index = self.descend(Self::parse_comma)?;
                self.skip_ws();
                if !self.consume("]") {
                    return Err(self.error("Expected ']' in array subscript"));
                }
                left = ArithExpr::Subscript(ArithSubscriptNode {
                    array,
                    index: Box::new(index),
                });
            } else {
                break;
            }
        }
        Ok(left)
    }

    // =========================================================================
    // PRIMARIES
    // =========================================================================

    fn parse_primary(&mut self) -> Result<ArithExpr> {
        self.skip_ws();
        let Some(c) = self.peek(0) else {
            return Ok(ArithExpr::Empty);
        };
        match c {
            '(' => {
                self.advance();
                self.skip_ws();
                let expr = self.descend(Self::parse_comma)?;
                self.skip_ws();
                if !self.consume(")") {
                    return Err(self.error("Expected ')' in arithmetic expression"));
                }
                Ok(expr)
            }
            '#' if self.peek_is(1, '$') => {
                self.advance();
                self.parse_expansion()
            }
            '$' => self.parse_expansion(),
            '\'' => self.parse_single_quote(),
            '"' => self.parse_double_quote(),
            '`' => self.parse_backtick(),
            '\\' => {
                self.advance();
                match self.advance() {
                    Some(escaped) => Ok(ArithExpr::Escape(ArithEscapeNode {
                        ch: escaped.to_string(),
                    })),
                    None => Err(self.error("Unexpected end after backslash in arithmetic")),
                }
            }
            c if NON_OPERAND_CHARS.contains(c) => Ok(ArithExpr::Empty),
            _ => self.parse_number_or_var(),
        }
    }

    fn parse_expansion(&mut self) -> Result<ArithExpr> {
        if !self.consume("$") {
            return Err(self.error("Expected '$'"));
        }
        match self.peek(0) {
            Some('(') => return self.parse_cmdsub(),
            Some('{') => return self.parse_braced_param(),
            _ => {}
        }
        let mut name = String::new();
        while let Some(ch) = self.peek(0) {
            if is_ident_char(ch) {
                name.push(ch);
                self.advance();
            } else if name.is_empty() && (is_special_param(ch) || ch.is_ascii_digit()) {
                name.push(ch);
                self.advance();
                break;
            } else {
                break;
            }
        }
        if name.is_empty() {
            return Err(self.error("Expected variable name after $"));
        }
        Ok(ArithExpr::ParamExpansion(ParamExpansionNode::plain(name)))
    }

    /// `$(...)` or `$((...))` after the `$`
    fn parse_cmdsub(&mut self) -> Result<ArithExpr> {
        self.advance();
        if self.peek_is(0, '(') {
            self.advance();
            let mut depth = 1;
            let content_start = self.pos;
            while let Some(ch) = self.peek(0) {
                if ch == '(' {
                    depth += 1;
                } else if ch == ')' {
                    if depth == 1 && self.peek_is(1, ')') {
                        break;
                    }
                    depth -= 1;
                }
                self.advance();
            }
            let content = self.slice(content_start, self.pos);
            let origin = self.location(content_start);
            self.advance();
            self.advance();
            let inner = parse_arithmetic_nested(&content, self.options, origin, self.depth + 1)?;
            return Ok(ArithExpr::ArithmeticExpansion(ArithmeticExpansionNode {
                expression: inner.map(Box::new),
            }));
        }

        let mut depth = 1;
        let content_start = self.pos;
        while let Some(ch) = self.peek(0) {
            if ch == '(' {
                depth += 1;
            } else if ch == ')' {
                depth -= 1;
                if depth == 0 {
                    break;
                }
            }
            self.advance();
        }
        let content = self.slice(content_start, self.pos);
        let origin = self.location(content_start);
        self.advance();
        let command = Parser::parse_nested_list(&content, self.options, origin, self.depth + 1)?;
        Ok(ArithExpr::CommandSubstitution(CommandSubstitutionNode {
            command: Box::new(command),
            brace: false,
        }))
    }

    /// `${...}` after the `$`
    fn parse_braced_param(&mut self) -> Result<ArithExpr> {
        self.advance();
        if let Some(marker @ ('!' | '#')) = self.peek(0) {
            self.advance();
            let mut name = String::new();
            while let Some(ch) = self.peek(0) {
                if ch == '}' {
                    break;
                }
                name.push(ch);
                self.advance();
            }
            self.consume("}");
            return Ok(if marker == '!' {
                ArithExpr::ParamIndirect(ParamIndirectNode {
                    param: name,
                    op: None,
                    arg: None,
                })
            } else {
                ArithExpr::ParamLength(ParamLengthNode { param: name })
            });
        }

        let mut name = String::new();
        while let Some(ch) = self.peek(0) {
            if ch == '}' {
                self.advance();
                return Ok(ArithExpr::ParamExpansion(ParamExpansionNode::plain(name)));
            }
            if is_param_expansion_op(ch) {
                break;
            }
            name.push(ch);
            self.advance();
        }

        let mut op_text = String::new();
        let mut depth = 1;
        while let Some(ch) = self.peek(0) {
            if ch == '{' {
                depth += 1;
            } else if ch == '}' {
                depth -= 1;
                if depth == 0 {
                    break;
                }
            }
            op_text.push(ch);
            self.advance();
        }
        self.consume("}");

        for op in BRACED_OPS {
            if let Some(arg) = op_text.strip_prefix(op) {
                return Ok(ArithExpr::ParamExpansion(ParamExpansionNode::with_op(name, *op, arg)));
            }
        }
        Ok(ArithExpr::ParamExpansion(ParamExpansionNode {
            param: name,
            op: None,
            arg: Some(op_text),
        }))
    }

    fn parse_single_quote(&mut self) -> Result<ArithExpr> {
        self.advance();
        let start = self.pos;
        while self.peek(0).is_some_and(|c| c != '\'') {
            self.advance();
        }
        let content = self.slice(start, self.pos);
        if !self.consume("'") {
            return Err(self.error("Unterminated single quote in arithmetic"));
        }
        Ok(AST::arith_number(content))
    }

    /// Scan to `close`, stepping over backslash pairs. Returns the content.
    fn scan_escaped_until(&mut self, close: char) -> String {
        let start = self.pos;
        while let Some(c) = self.peek(0) {
            if c == close {
                break;
            }
            self.advance();
            if c == '\\' {
                self.advance();
            }
        }
        self.slice(start, self.pos)
    }

    fn parse_double_quote(&mut self) -> Result<ArithExpr> {
        self.advance();
        let content = self.scan_escaped_until('"');
        if !self.consume("\"") {
            return Err(self.error("Unterminated double quote in arithmetic"));
        }
        Ok(AST::arith_number(content))
    }

    fn parse_backtick(&mut self) -> Result<ArithExpr> {
        self.advance();
        let origin = self.location(self.pos);
        let content = self.scan_escaped_until('`');
        if !self.consume("`") {
            return Err(self.error("Unterminated backtick in arithmetic"));
        }
        let command = Parser::parse_nested_list(&content, self.options, origin, self.depth + 1)?;
        Ok(ArithExpr::CommandSubstitution(CommandSubstitutionNode {
            command: Box::new(command),
            brace: false,
        }))
    }

    fn parse_number_or_var(&mut self) -> Result<ArithExpr> {
        self.skip_ws();
        let Some(c) = self.peek(0) else {
            return Ok(ArithExpr::Empty);
        };
        let mut text = String::new();
        if c.is_ascii_digit() {
            while let Some(ch) = self.peek(0) {
                if ch.is_alphanumeric() || ch == '#' || ch == '_' {
                    text.push(ch);
                    self.advance();
                } else {
                    break;
                }
            }
            if self.peek_is(0, '$') {
                let expansion = self.parse_expansion()?;
                return Ok(ArithExpr::Concat(ArithConcatNode {
                    parts: vec![AST::arith_number(text), expansion],
                }));
            }
            return Ok(AST::arith_number(text));
        }
        if is_ident_start(c) {
            while let Some(ch) = self.peek(0) {
                if !is_ident_char(ch) {
                    break;
                }
                text.push(ch);
                self.advance();
            }
            return Ok(AST::arith_var(text));
        }
        Err(self.error(format!("Unexpected character '{}' in arithmetic expression", c)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(content: &str) -> ArithExpr {
        let options = ParseOptions::default();
        parse_arithmetic(content, &options, (0, 1)).unwrap().unwrap()
    }

    #[test]
    fn test_precedence_mul_over_add() {
        let expr = parse(" 1 + 2 * 3 ");
        assert_eq!(
            expr,
            AST::arith_binary(
                "+",
                AST::arith_number("1"),
                AST::arith_binary("*", AST::arith_number("2"), AST::arith_number("3"))
            )
        );
    }

    #[test]
    fn test_exponent_right_assoc() {
        if let ArithExpr::Binary(b) = parse("2 ** 3 ** 2") {
            assert_eq!(b.op, "**");
            assert!(matches!(*b.left, ArithExpr::Number(_)));
            assert!(matches!(*b.right, ArithExpr::Binary(_)));
        } else {
            panic!("Expected binary");
        }
    }

    #[test]
    fn test_assignment_vs_equality() {
        assert!(matches!(parse("x = 1"), ArithExpr::Assign(_)));
        assert!(matches!(parse("x == 1"), ArithExpr::Binary(_)));
        if let ArithExpr::Assign(a) = parse("x <<= 2") {
            assert_eq!(a.op, "<<=");
        } else {
            panic!("Expected assignment");
        }
    }

    #[test]
    fn test_ternary_with_omitted_branch() {
        if let ArithExpr::Ternary(t) = parse("a ? : b") {
            assert_eq!(*t.if_true, ArithExpr::Empty);
            assert_eq!(*t.if_false, AST::arith_var("b"));
        } else {
            panic!("Expected ternary");
        }
    }

    #[test]
    fn test_incr_decr() {
        assert!(matches!(parse("++i"), ArithExpr::PreIncr(_)));
        assert!(matches!(parse("i--"), ArithExpr::PostDecr(_)));
        if let ArithExpr::Unary(u) = parse("-x") {
            assert_eq!(u.op, "-");
        } else {
            panic!("Expected unary");
        }
    }

    #[test]
    fn test_subscript_only_on_variables() {
        if let ArithExpr::Subscript(s) = parse("arr[i + 1]") {
            assert_eq!(s.array, "arr");
            assert!(matches!(*s.index, ArithExpr::Binary(_)));
        } else {
            panic!("Expected subscript");
        }
        let options = ParseOptions::default();
        let err = parse_arithmetic("arr[1", &options, (0, 1)).unwrap_err();
        assert_eq!(err.message(), "Expected ']' in array subscript");
    }

    #[test]
    fn test_expansions() {
        assert_eq!(
            parse("$x + 1"),
            AST::arith_binary(
                "+",
                ArithExpr::ParamExpansion(ParamExpansionNode::plain("x")),
                AST::arith_number("1")
            )
        );
        if let ArithExpr::ParamExpansion(p) = parse("${x:-3}") {
            assert_eq!(p.op.as_deref(), Some(":-"));
            assert_eq!(p.arg.as_deref(), Some("3"));
        } else {
            panic!("Expected param expansion");
        }
        assert!(matches!(parse("${#arr}"), ArithExpr::ParamLength(_)));
        assert!(matches!(parse("$(echo 1)"), ArithExpr::CommandSubstitution(_)));
        assert!(matches!(parse("$((1+1))"), ArithExpr::ArithmeticExpansion(_)));
    }

    #[test]
    fn test_concat_and_escape() {
        if let ArithExpr::Concat(c) = parse("16#$n") {
            assert_eq!(c.parts[0], AST::arith_number("16#"));
        } else {
            panic!("Expected concat");
        }
        assert!(matches!(parse("\\x"), ArithExpr::Escape(_)));
    }

    #[test]
    fn test_empty_input() {
        let options = ParseOptions::default();
        assert!(parse_arithmetic("   ", &options, (0, 1)).unwrap().is_none());
    }

    #[test]
    fn test_unexpected_character() {
        let options = ParseOptions::default();
        let err = parse_arithmetic("1 + @", &options, (10, 1)).unwrap_err();
        assert!(err.message().contains("Unexpected character '@'"));
        assert_eq!(err.pos(), 14);
    }

    #[test]
    fn test_missing_close_paren() {
        let options = ParseOptions::default();
        let err = parse_arithmetic("(1 + 2", &options, (0, 1)).unwrap_err();
        assert_eq!(err.message(), "Expected ')' in arithmetic expression");
    }

    #[test]
    fn test_nesting_past_max_depth() {
        let options = ParseOptions {
            max_depth: 5,
            ..Default::default()
        };
        let parens = format!("{}1{}", "(".repeat(6), ")".repeat(6));
        let err = parse_arithmetic(&parens, &options, (0, 1)).unwrap_err();
        assert!(matches!(err, ParseError::Syntax { .. }));
        assert!(err.is_depth_limit());
        assert!(parse_arithmetic("((((1))))", &options, (0, 1)).is_ok());

        let unary = format!("{}1", "- ".repeat(6));
        assert!(parse_arithmetic(&unary, &options, (0, 1)).unwrap_err().is_depth_limit());
        let not = format!("{}x", "!".repeat(6));
        assert!(parse_arithmetic(&not, &options, (0, 1)).unwrap_err().is_depth_limit());
    }

    #[test]
    fn test_deep_nesting_is_an_error_not_an_overflow() {
        let options = ParseOptions {
            max_depth: 32,
            ..Default::default()
        };
        let deep = format!("{}1{}", "(".repeat(50_000), ")".repeat(50_000));
        assert!(parse_arithmetic(&deep, &options, (0, 1)).unwrap_err().is_depth_limit());
        let deep = format!("{}x", "~".repeat(50_000));
        assert!(parse_arithmetic(&deep, &options, (0, 1)).unwrap_err().is_depth_limit());
    }
}
