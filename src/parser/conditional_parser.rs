//! Conditional Expression Parser
//!
//! Handles parsing of `[[ ... ]]` conditional commands. Words are scanned in
//! COND context, where `]]`, parens, `&&`, `||` and redirect characters end a
//! word; the right side of `=~` is scanned in REGEX context.

use crate::ast::types::{
    BinaryTestNode, CondAndNode, CondExpr, CondNotNode, CondOrNode, CondParenNode,
    ConditionalExprNode, Node, UnaryTestNode, WordNode,
};
use crate::parser::context::LexMode;
use crate::parser::parser::Parser;
use crate::parser::types::{
    is_blank, is_redirect_char, is_whitespace, ParserState, Result, WordContext, COND_BINARY_OPS,
    COND_UNARY_OPS,
};

impl Parser {
    /// `[[ expr ]]`. Returns `None` when `[[` is not followed by whitespace,
    /// so `[[x` stays an ordinary word.
    pub(crate) fn parse_conditional_expr(&mut self) -> Result<Option<Node>> {
        self.skip_whitespace();
        if !(self.is_at('[') && self.peek_at(1) == Some('[')) {
            return Ok(None);
        }
        let next = self.pos() + 2;
        if let Some(c) = self.char_at(next) {
            let continuation = c == '\\' && self.char_at(next + 1) == Some('\n');
            if !is_whitespace(c) && !continuation {
                return Ok(None);
            }
        }
        self.set_pos(next);

        let outer_state = self.state;
        let outer_context = self.mode.word_context;
        self.state.insert(ParserState::CONDEXPR);
        self.mode.word_context = WordContext::Cond;
        let body = self.parse_cond_or();
        self.state = outer_state;
        self.mode.word_context = outer_context;
        let body = body?;

        while self.peek().is_some_and(is_blank) {
            self.advance();
        }
        if !self.cond_at_end() || self.at_end() {
            return Err(self.syntax_error("Expected ]] to close conditional expression", self.pos()));
        }
        self.set_pos(self.pos() + 2);
        Ok(Some(Node::ConditionalExpr(ConditionalExprNode {
            body,
            redirects: self.collect_redirects()?,
        })))
    }

    /// Blanks, newlines and line continuations are all insignificant here
    fn cond_skip_whitespace(&mut self) {
        loop {
            match self.peek() {
                Some(c) if is_whitespace(c) => {
                    self.advance();
                }
                Some('\\') if self.peek_at(1) == Some('\n') => {
                    self.set_pos(self.pos() + 2);
                }
                _ => break,
            }
        }
    }

    fn cond_at_end(&self) -> bool {
        self.at_end() || (self.is_at(']') && self.peek_at(1) == Some(']'))
    }

    fn at_cond_pair(&self, c: char) -> bool {
        self.is_at(c) && self.peek_at(1) == Some(c)
    }

    /// `||` chains group to the right: `a || b || c` is `a || (b || c)`
    fn parse_cond_or(&mut self) -> Result<CondExpr> {
        let operands = self.cond_chain('|', Self::parse_cond_and)?;
        fold_right(operands, |left, right| {
            CondExpr::Or(CondOrNode {
                left: Box::new(left),
                right: Box::new(right),
            })
        })
        .ok_or_else(|| self.syntax_error("Unexpected end of conditional expression", self.pos()))
    }

    fn parse_cond_and(&mut self) -> Result<CondExpr> {
        let operands = self.cond_chain('&', Self::parse_cond_term)?;
        fold_right(operands, |left, right| {
            CondExpr::And(CondAndNode {
                left: Box::new(left),
                right: Box::new(right),
            })
        })
        .ok_or_else(|| self.syntax_error("Unexpected end of conditional expression", self.pos()))
    }

    /// Operands separated by the doubled `op`, in source order
    fn cond_chain(&mut self, op: char, operand: fn(&mut Self) -> Result<CondExpr>) -> Result<Vec<CondExpr>> {
        let mut operands = Vec::new();
        loop {
            self.cond_skip_whitespace();
            operands.push(operand(self)?);
            self.cond_skip_whitespace();
            if self.cond_at_end() || !self.at_cond_pair(op) {
                return Ok(operands);
            }
            self.set_pos(self.pos() + 2);
        }
    }

    fn cond_descend(&mut self, parse: fn(&mut Self) -> Result<CondExpr>) -> Result<CondExpr> {
        self.enter()?;
        let result = parse(self);
        self.leave();
        result
    }

    fn parse_cond_term(&mut self) -> Result<CondExpr> {
        self.cond_skip_whitespace();
        if self.cond_at_end() {
            return Err(self.syntax_error("Unexpected end of conditional expression", self.pos()));
        }

        // `!x` is a word; only a free-standing `!` negates
        if self.is_at('!') && self.peek_at(1).map_or(true, is_blank) {
            self.advance();
            let operand = self.cond_descend(Self::parse_cond_term)?;
            return Ok(CondExpr::Not(CondNotNode {
                operand: Box::new(operand),
            }));
        }

        if self.is_at('(') {
            self.advance();
            let inner = self.cond_descend(Self::parse_cond_or)?;
            self.cond_skip_whitespace();
            if !self.is_at(')') {
                return Err(self.syntax_error("Expected ) in conditional expression", self.pos()));
            }
            self.advance();
            return Ok(CondExpr::Paren(CondParenNode {
                inner: Box::new(inner),
            }));
        }

        let Some(left) = self.parse_cond_word()? else {
            return Err(self.syntax_error("Expected word in conditional expression", self.pos()));
        };
        self.cond_skip_whitespace();

        if COND_UNARY_OPS.contains(left.value.as_str()) {
            let Some(operand) = self.parse_cond_word()? else {
                return Err(self.syntax_error(format!("Expected operand after {}", left.value), self.pos()));
            };
            return Ok(unary(left.value, operand));
        }

        if !self.cond_at_end() && !matches!(self.peek(), Some('&' | '|' | ')')) {
            if self.peek().is_some_and(is_redirect_char) && self.peek_at(1) != Some('(') {
                let op = self.advance().map(String::from).unwrap_or_default();
                self.cond_skip_whitespace();
                let Some(right) = self.parse_cond_word()? else {
                    return Err(self.syntax_error(format!("Expected operand after {op}"), self.pos()));
                };
                return Ok(binary(op, left, right));
            }

            let saved = self.pos();
            match self.parse_cond_word()? {
                Some(op) if COND_BINARY_OPS.contains(op.value.as_str()) => {
                    self.cond_skip_whitespace();
                    let right = if op.value == "=~" {
                        self.parse_cond_regex_word()?
                    } else {
                        self.parse_cond_word()?
                    };
                    let Some(right) = right else {
                        return Err(self.syntax_error(format!("Expected operand after {}", op.value), self.pos()));
                    };
                    return Ok(binary(op.value, left, right));
                }
                _ => self.set_pos(saved),
            }
        }

        Ok(unary("-n".to_string(), left))
    }

    fn parse_cond_word(&mut self) -> Result<Option<WordNode>> {
        self.cond_skip_whitespace();
        if self.cond_at_end() || matches!(self.peek(), Some('(' | ')')) {
            return Ok(None);
        }
        if self.at_cond_pair('&') || self.at_cond_pair('|') {
            return Ok(None);
        }
        self.read_word_internal(LexMode {
            word_context: WordContext::Cond,
            ..LexMode::default()
        })
    }

    fn parse_cond_regex_word(&mut self) -> Result<Option<WordNode>> {
        self.cond_skip_whitespace();
        if self.cond_at_end() {
            return Ok(None);
        }
        self.state.insert(ParserState::REGEXP);
        let word = self.read_word_internal(LexMode {
            word_context: WordContext::Regex,
            ..LexMode::default()
        });
        self.state.remove(ParserState::REGEXP);
        self.mode.word_context = WordContext::Cond;
        word
    }
}

fn fold_right(operands: Vec<CondExpr>, join: impl Fn(CondExpr, CondExpr) -> CondExpr) -> Option<CondExpr> {
    operands.into_iter().rev().reduce(|right, left| join(left, right))
}

fn unary(op: String, operand: WordNode) -> CondExpr {
    CondExpr::Unary(UnaryTestNode { op, operand })
}

fn binary(op: String, left: WordNode, right: WordNode) -> CondExpr {
    CondExpr::Binary(BinaryTestNode { op, left, right })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::types::{ParseError, ParseOptions};

    fn cond(source: &str) -> CondExpr {
        let nodes = Parser::new(source, &ParseOptions::default()).parse().unwrap();
        match nodes.into_iter().next() {
            Some(Node::ConditionalExpr(node)) => node.body,
            other => panic!("expected conditional, got {other:?}"),
        }
    }

    fn cond_err(source: &str) -> String {
        Parser::new(source, &ParseOptions::default())
            .parse()
            .unwrap_err()
            .message()
            .to_string()
    }

    #[test]
    fn test_unary_and_implicit_n() {
        let CondExpr::Unary(node) = cond("[[ -f /etc/passwd ]]") else {
            panic!("expected unary");
        };
        assert_eq!(node.op, "-f");
        assert_eq!(node.operand.value, "/etc/passwd");

        let CondExpr::Unary(node) = cond("[[ $x ]]") else {
            panic!("expected unary");
        };
        assert_eq!(node.op, "-n");
    }

    #[test]
    fn test_binary_operators() {
        let CondExpr::Binary(node) = cond("[[ $a == b* ]]") else {
            panic!("expected binary");
        };
        assert_eq!(node.op, "==");
        assert_eq!(node.right.value, "b*");

        let CondExpr::Binary(node) = cond("[[ a < b ]]") else {
            panic!("expected binary");
        };
        assert_eq!(node.op, "<");
    }

    #[test]
    fn test_regex_right_side() {
        let CondExpr::Binary(node) = cond("[[ $x =~ ^(a|b)+$ ]]") else {
            panic!("expected binary");
        };
        assert_eq!(node.op, "=~");
        assert_eq!(node.right.value, "^(a|b)+$");
    }

    #[test]
    fn test_connectives_and_grouping() {
        let CondExpr::Or(node) = cond("[[ -n a && -z b || ! ( c ) ]]") else {
            panic!("expected or");
        };
        assert!(matches!(*node.left, CondExpr::And(_)));
        let CondExpr::Not(not) = *node.right else {
            panic!("expected not");
        };
        assert!(matches!(*not.operand, CondExpr::Paren(_)));
    }

    #[test]
    fn test_multiline_conditional() {
        assert!(matches!(cond("[[ a &&\n b ]]"), CondExpr::And(_)));
    }

    #[test]
    fn test_double_bracket_word_is_not_conditional() {
        let nodes = Parser::new("[[x", &ParseOptions::default()).parse().unwrap();
        assert!(matches!(nodes[0], Node::Command(_)));
    }

    #[test]
    fn test_conditional_errors() {
        assert_eq!(cond_err("[[ -f ]]"), "Expected operand after -f");
        assert_eq!(cond_err("[[ ]]"), "Unexpected end of conditional expression");
        assert_eq!(cond_err("[[ ( a ]]"), "Expected ) in conditional expression");
        assert_eq!(cond_err("[[ a == b"), "Expected ]] to close conditional expression");
    }

    #[test]
    fn test_conditional_nesting_past_max_depth() {
        let options = ParseOptions {
            max_depth: 5,
            ..Default::default()
        };
        let parens = format!("[[ {}a{} ]]", "( ".repeat(6), " )".repeat(6));
        let err = Parser::new(&parens, &options).parse().unwrap_err();
        assert!(matches!(err, ParseError::Syntax { .. }));
        assert!(err.is_depth_limit());
        assert!(Parser::new("[[ ( ( a ) ) ]]", &options).parse().is_ok());

        let negations = format!("[[ {}a ]]", "! ".repeat(6));
        let err = Parser::new(&negations, &options).parse().unwrap_err();
        assert!(err.is_depth_limit());
    }

    #[test]
    fn test_long_and_or_chain() {
        let operands = vec!["a"; 2_000];
        let source = format!("[[ {} ]]", operands.join(" && "));
        let CondExpr::And(node) = cond(&source) else {
            panic!("expected and");
        };
        assert!(matches!(*node.left, CondExpr::Unary(_)));
        assert!(matches!(*node.right, CondExpr::And(_)));
        assert!(matches!(cond("[[ a || b && c ]]"), CondExpr::Or(_)));
    }
}
