//! Abstract Syntax Tree (AST) Types for shell scripts
//!
//! Every node is a plain owned value built bottom-up by the parser. The one
//! exception is heredoc content, which is registered empty and filled once the
//! parser reaches the end of the logical line (see [`HereDocContent`]).
//!
//! All types derive `Serialize`; enums are internally tagged with a `"type"`
//! field so consumers get a stable JSON shape.

use serde::{Serialize, Serializer};
use std::cell::OnceCell;
use std::fmt;
use std::rc::Rc;

// =============================================================================
// COMMANDS & LISTS
// =============================================================================

/// A top-level or nested command tree node
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type")]
pub enum Node {
    Command(CommandNode),
    Pipeline(PipelineNode),
    List(ListNode),
    Subshell(SubshellNode),
    BraceGroup(BraceGroupNode),
    If(IfNode),
    While(WhileNode),
    Until(UntilNode),
    For(ForNode),
    ForArith(ForArithNode),
    Select(SelectNode),
    Case(CaseNode),
    Function(FunctionNode),
    Negation(NegationNode),
    Time(TimeNode),
    Coproc(CoprocNode),
    ConditionalExpr(ConditionalExprNode),
    ArithmeticCommand(ArithmeticCommandNode),
    Empty,
}

impl Node {
    /// Redirects attached to this node, if it is a kind that carries them
    pub fn redirects(&self) -> &[Redirect] {
        match self {
            Node::Command(n) => &n.redirects,
            Node::Subshell(n) => &n.redirects,
            Node::BraceGroup(n) => &n.redirects,
            Node::If(n) => &n.redirects,
            Node::While(n) => &n.redirects,
            Node::Until(n) => &n.redirects,
            Node::For(n) => &n.redirects,
            Node::ForArith(n) => &n.redirects,
            Node::Select(n) => &n.redirects,
            Node::Case(n) => &n.redirects,
            Node::ConditionalExpr(n) => &n.redirects,
            Node::ArithmeticCommand(n) => &n.redirects,
            _ => &[],
        }
    }

    /// Name of the variant, used in log events and CLI summaries
    pub fn kind(&self) -> &'static str {
        match self {
            Node::Command(_) => "command",
            Node::Pipeline(_) => "pipeline",
            Node::List(_) => "list",
            Node::Subshell(_) => "subshell",
            Node::BraceGroup(_) => "brace-group",
            Node::If(_) => "if",
            Node::While(_) => "while",
            Node::Until(_) => "until",
            Node::For(_) => "for",
            Node::ForArith(_) => "arith-for",
            Node::Select(_) => "select",
            Node::Case(_) => "case",
            Node::Function(_) => "function",
            Node::Negation(_) => "negation",
            Node::Time(_) => "time",
            Node::Coproc(_) => "coproc",
            Node::ConditionalExpr(_) => "cond-expr",
            Node::ArithmeticCommand(_) => "arith",
            Node::Empty => "empty",
        }
    }
}

/// Simple command: words plus redirects. Assignments stay as plain words.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CommandNode {
    pub words: Vec<WordNode>,
    pub redirects: Vec<Redirect>,
}

/// Commands joined by `|` or `|&`
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PipelineNode {
    pub commands: Vec<Node>,
    /// One entry per pipe; `true` when the pipe was `|&`
    pub pipe_stderr: Vec<bool>,
}

/// Flat sequence of pipelines and operators, in source order
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ListNode {
    pub parts: Vec<ListItem>,
}

/// Nodes serialize as themselves; operators carry `"type": "Operator"`
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum ListItem {
    Command(Node),
    Operator(OperatorNode),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename = "Operator")]
pub struct OperatorNode {
    pub op: ListOperator,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ListOperator {
    #[serde(rename = "&&")]
    And,
    #[serde(rename = "||")]
    Or,
    #[serde(rename = ";")]
    Semi,
    #[serde(rename = "&")]
    Background,
    #[serde(rename = "\n")]
    Newline,
}

impl ListOperator {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::And => "&&",
            Self::Or => "||",
            Self::Semi => ";",
            Self::Background => "&",
            Self::Newline => "\n",
        }
    }

    fn is_and_or(self) -> bool {
        matches!(self, Self::And | Self::Or)
    }
}

impl fmt::Display for ListOperator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Left-folded `&&`/`||` chain over borrowed pipelines
#[derive(Debug, Clone, PartialEq)]
pub enum AndOr<'a> {
    Pipeline(&'a Node),
    And(Box<AndOr<'a>>, &'a Node),
    Or(Box<AndOr<'a>>, &'a Node),
}

/// One statement of a list: an and/or chain plus the separator that ended it
#[derive(Debug, Clone, PartialEq)]
pub struct Statement<'a> {
    pub chain: AndOr<'a>,
    pub terminator: Option<ListOperator>,
}

impl ListNode {
    pub fn new(parts: Vec<ListItem>) -> Self {
        Self { parts }
    }

    /// Command nodes of the list, skipping operators
    pub fn commands(&self) -> impl Iterator<Item = &Node> {
        self.parts.iter().filter_map(|p| match p {
            ListItem::Command(n) => Some(n),
            ListItem::Operator(_) => None,
        })
    }

    /// Operators of the list, in order
    pub fn operators(&self) -> impl Iterator<Item = ListOperator> + '_ {
        self.parts.iter().filter_map(|p| match p {
            ListItem::Operator(o) => Some(o.op),
            ListItem::Command(_) => None,
        })
    }

    /// Group the flat list into statements. `&&` and `||` have equal
    /// precedence and associate to the left, so `a && b || c` becomes
    /// `Or(And(a, b), c)`.
    pub fn and_or_chains(&self) -> Vec<Statement<'_>> {
        let mut statements = Vec::new();
        let mut chain: Option<AndOr<'_>> = None;
        let mut pending: Option<ListOperator> = None;

        for part in &self.parts {
            match part {
                ListItem::Command(node) => {
                    chain = Some(match (chain.take(), pending.take()) {
                        (Some(left), Some(ListOperator::And)) => AndOr::And(Box::new(left), node),
                        (Some(left), Some(ListOperator::Or)) => AndOr::Or(Box::new(left), node),
                        _ => AndOr::Pipeline(node),
                    });
                }
                ListItem::Operator(o) if o.op.is_and_or() => pending = Some(o.op),
                ListItem::Operator(o) => {
                    if let Some(c) = chain.take() {
                        statements.push(Statement {
                            chain: c,
                            terminator: Some(o.op),
                        });
                    }
                    pending = None;
                }
            }
        }
        if let Some(c) = chain {
            statements.push(Statement {
                chain: c,
                terminator: None,
            });
        }
        statements
    }
}

// =============================================================================
// WORDS
// =============================================================================

/// A shell word: raw source text plus the expansions found inside it, in order
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WordNode {
    pub value: String,
    pub parts: Vec<WordPart>,
}

impl WordNode {
    pub fn new(value: impl Into<String>, parts: Vec<WordPart>) -> Self {
        Self {
            value: value.into(),
            parts,
        }
    }

    /// Word with no expansions
    pub fn literal(value: impl Into<String>) -> Self {
        Self::new(value, Vec::new())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type")]
pub enum WordPart {
    ParamExpansion(ParamExpansionNode),
    ParamLength(ParamLengthNode),
    ParamIndirect(ParamIndirectNode),
    CommandSubstitution(CommandSubstitutionNode),
    ArithmeticExpansion(ArithmeticExpansionNode),
    ArithDeprecated(ArithDeprecatedNode),
    AnsiCQuote(AnsiCQuoteNode),
    LocaleString(LocaleStringNode),
    ProcessSubstitution(ProcessSubstitutionNode),
    Array(ArrayNode),
}

/// `$x`, `${x}`, `${x:-word}` and friends
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ParamExpansionNode {
    pub param: String,
    pub op: Option<String>,
    pub arg: Option<String>,
}

impl ParamExpansionNode {
    pub fn plain(param: impl Into<String>) -> Self {
        Self {
            param: param.into(),
            op: None,
            arg: None,
        }
    }

    pub fn with_op(param: impl Into<String>, op: impl Into<String>, arg: impl Into<String>) -> Self {
        Self {
            param: param.into(),
            op: Some(op.into()),
            arg: Some(arg.into()),
        }
    }
}

/// `${#x}`
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ParamLengthNode {
    pub param: String,
}

/// `${!x}`, `${!prefix*}`, `${!x:-y}`
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ParamIndirectNode {
    pub param: String,
    pub op: Option<String>,
    pub arg: Option<String>,
}

/// `$(...)`, backticks, and `${ ...; }` (brace = true)
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CommandSubstitutionNode {
    pub command: Box<Node>,
    pub brace: bool,
}

/// `$((...))`; `None` when the expression is empty
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ArithmeticExpansionNode {
    pub expression: Option<Box<ArithExpr>>,
}

/// `$[...]`, kept as raw text
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ArithDeprecatedNode {
    pub expression: String,
}

/// `$'...'`, content without the surrounding `$'` and `'`
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AnsiCQuoteNode {
    pub content: String,
}

/// `$"..."`, content including the double quotes
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LocaleStringNode {
    pub content: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProcessSubstitutionNode {
    /// `<` or `>`
    pub direction: String,
    pub command: Box<Node>,
}

/// `name=(a b c)` right-hand side
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ArrayNode {
    pub elements: Vec<WordNode>,
}

// =============================================================================
// REDIRECTIONS
// =============================================================================

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type")]
pub enum Redirect {
    File(RedirectNode),
    HereDoc(HereDocNode),
}

/// Any redirect other than a heredoc
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RedirectNode {
    /// Operator text without the fd prefix (`>`, `>>`, `<&`, `<<<`, ...)
    pub op: String,
    pub fd: Option<u32>,
    /// `{var}` prefix
    pub fd_var: Option<String>,
    pub target: WordNode,
}

/// `<<DELIM` / `<<-DELIM`
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HereDocNode {
    pub delimiter: String,
    pub content: HereDocContent,
    pub strip_tabs: bool,
    pub quoted: bool,
    pub fd: Option<u32>,
    /// Offset just past the operator; with the delimiter, identifies the redirect
    #[serde(skip)]
    pub start: usize,
}

/// Shared, write-once heredoc body.
///
/// The redirect node is built when `<<` is seen, but the body lives on the
/// lines after the current one. The parser keeps a handle in its pending
/// queue and fills it when it crosses the newline; every clone of the node
/// observes the filled value.
#[derive(Clone, Default)]
pub struct HereDocContent(Rc<OnceCell<String>>);

impl HereDocContent {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn filled(content: impl Into<String>) -> Self {
        let cell = OnceCell::new();
        let _ = cell.set(content.into());
        Self(Rc::new(cell))
    }

    /// Body text; empty until filled
    pub fn get(&self) -> &str {
        self.0.get().map(String::as_str).unwrap_or("")
    }

    pub fn is_filled(&self) -> bool {
        self.0.get().is_some()
    }

    /// Fill the body. Returns false if it was already filled.
    pub fn fill(&self, content: String) -> bool {
        self.0.set(content).is_ok()
    }
}

impl fmt::Debug for HereDocContent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self.get())
    }
}

impl PartialEq for HereDocContent {
    fn eq(&self, other: &Self) -> bool {
        self.get() == other.get()
    }
}

impl Serialize for HereDocContent {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.get())
    }
}

// =============================================================================
// COMPOUND COMMANDS
// =============================================================================

/// `( list )`
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SubshellNode {
    pub body: Box<Node>,
    pub redirects: Vec<Redirect>,
}

/// `{ list; }`
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BraceGroupNode {
    pub body: Box<Node>,
    pub redirects: Vec<Redirect>,
}

/// `if`; an `elif` chain nests as an `If` in `else_body`
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IfNode {
    pub condition: Box<Node>,
    pub then_body: Box<Node>,
    pub else_body: Option<Box<Node>>,
    pub redirects: Vec<Redirect>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WhileNode {
    pub condition: Box<Node>,
    pub body: Box<Node>,
    pub redirects: Vec<Redirect>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UntilNode {
    pub condition: Box<Node>,
    pub body: Box<Node>,
    pub redirects: Vec<Redirect>,
}

/// `for name [in words]; do ...; done`. `words` is `None` without `in`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ForNode {
    pub var: String,
    pub words: Option<Vec<WordNode>>,
    pub body: Box<Node>,
    pub redirects: Vec<Redirect>,
}

/// `for ((init; cond; incr))`, header parts kept as raw text
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ForArithNode {
    pub init: String,
    pub cond: String,
    pub incr: String,
    pub body: Box<Node>,
    pub redirects: Vec<Redirect>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SelectNode {
    pub var: String,
    pub words: Option<Vec<WordNode>>,
    pub body: Box<Node>,
    pub redirects: Vec<Redirect>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CaseNode {
    pub word: WordNode,
    pub patterns: Vec<CasePatternNode>,
    pub redirects: Vec<Redirect>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CasePatternNode {
    /// Pattern text with alternatives separated by `|`
    pub pattern: String,
    pub body: Option<Box<Node>>,
    pub terminator: CaseTerminator,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum CaseTerminator {
    /// ;;
    #[serde(rename = ";;")]
    Break,
    /// ;&
    #[serde(rename = ";&")]
    FallThrough,
    /// ;;&
    #[serde(rename = ";;&")]
    Continue,
}

impl CaseTerminator {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Break => ";;",
            Self::FallThrough => ";&",
            Self::Continue => ";;&",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FunctionNode {
    pub name: String,
    pub body: Box<Node>,
}

/// `! pipeline`
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NegationNode {
    pub pipeline: Box<Node>,
}

/// `time [-p] pipeline`
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TimeNode {
    pub pipeline: Box<Node>,
    pub posix: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CoprocNode {
    pub name: Option<String>,
    pub command: Box<Node>,
}

/// `(( expr ))`
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ArithmeticCommandNode {
    pub expression: Option<ArithExpr>,
    pub redirects: Vec<Redirect>,
    pub raw_content: String,
}

// =============================================================================
// CONDITIONAL EXPRESSIONS ([[ ]])
// =============================================================================

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConditionalExprNode {
    pub body: CondExpr,
    pub redirects: Vec<Redirect>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type")]
pub enum CondExpr {
    Unary(UnaryTestNode),
    Binary(BinaryTestNode),
    And(CondAndNode),
    Or(CondOrNode),
    Not(CondNotNode),
    Paren(CondParenNode),
}

/// `-f file`; a lone word is `-n word`
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UnaryTestNode {
    pub op: String,
    pub operand: WordNode,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BinaryTestNode {
    pub op: String,
    pub left: WordNode,
    pub right: WordNode,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CondAndNode {
    pub left: Box<CondExpr>,
    pub right: Box<CondExpr>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CondOrNode {
    pub left: Box<CondExpr>,
    pub right: Box<CondExpr>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CondNotNode {
    pub operand: Box<CondExpr>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CondParenNode {
    pub inner: Box<CondExpr>,
}

// =============================================================================
// ARITHMETIC EXPRESSIONS
// =============================================================================

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type")]
pub enum ArithExpr {
    Number(ArithNumberNode),
    /// Omitted operand
    Empty,
    Var(ArithVarNode),
    Binary(ArithBinaryNode),
    Unary(ArithUnaryNode),
    PreIncr(ArithOperandNode),
    PreDecr(ArithOperandNode),
    PostIncr(ArithOperandNode),
    PostDecr(ArithOperandNode),
    Assign(ArithAssignNode),
    Ternary(ArithTernaryNode),
    Comma(ArithCommaNode),
    Subscript(ArithSubscriptNode),
    Escape(ArithEscapeNode),
    Concat(ArithConcatNode),
    ParamExpansion(ParamExpansionNode),
    ParamLength(ParamLengthNode),
    ParamIndirect(ParamIndirectNode),
    CommandSubstitution(CommandSubstitutionNode),
    ArithmeticExpansion(ArithmeticExpansionNode),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ArithNumberNode {
    pub value: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ArithVarNode {
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ArithBinaryNode {
    pub op: String,
    pub left: Box<ArithExpr>,
    pub right: Box<ArithExpr>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ArithUnaryNode {
    pub op: String,
    pub operand: Box<ArithExpr>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ArithOperandNode {
    pub operand: Box<ArithExpr>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ArithAssignNode {
    pub op: String,
    pub target: Box<ArithExpr>,
    pub value: Box<ArithExpr>,
}

/// `c ? t : f`; an omitted branch is `ArithExpr::Empty`
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ArithTernaryNode {
    pub condition: Box<ArithExpr>,
    pub if_true: Box<ArithExpr>,
    pub if_false: Box<ArithExpr>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ArithCommaNode {
    pub left: Box<ArithExpr>,
    pub right: Box<ArithExpr>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ArithSubscriptNode {
    pub array: String,
    pub index: Box<ArithExpr>,
}

/// `\c` inside arithmetic text
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ArithEscapeNode {
    pub ch: String,
}

/// Numeric prefix glued to an expansion, e.g. `0x$n`
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ArithConcatNode {
    pub parts: Vec<ArithExpr>,
}

// =============================================================================
// AST FACTORY
// =============================================================================

/// Shorthand constructors used by the parser and tests
pub struct AST;

impl AST {
    pub fn command(words: Vec<WordNode>, redirects: Vec<Redirect>) -> Node {
        Node::Command(CommandNode { words, redirects })
    }

    pub fn pipeline(commands: Vec<Node>, pipe_stderr: Vec<bool>) -> Node {
        Node::Pipeline(PipelineNode {
            commands,
            pipe_stderr,
        })
    }

    pub fn list(parts: Vec<ListItem>) -> Node {
        Node::List(ListNode::new(parts))
    }

    pub fn operator(op: ListOperator) -> ListItem {
        ListItem::Operator(OperatorNode { op })
    }

    pub fn word(value: impl Into<String>, parts: Vec<WordPart>) -> WordNode {
        WordNode::new(value, parts)
    }

    pub fn arith_number(value: impl Into<String>) -> ArithExpr {
        ArithExpr::Number(ArithNumberNode {
            value: value.into(),
        })
    }

    pub fn arith_var(name: impl Into<String>) -> ArithExpr {
        ArithExpr::Var(ArithVarNode { name: name.into() })
    }

    pub fn arith_binary(op: impl Into<String>, left: ArithExpr, right: ArithExpr) -> ArithExpr {
        ArithExpr::Binary(ArithBinaryNode {
            op: op.into(),
            left: Box::new(left),
            right: Box::new(right),
        })
    }

    pub fn arith_unary(op: impl Into<String>, operand: ArithExpr) -> ArithExpr {
        ArithExpr::Unary(ArithUnaryNode {
            op: op.into(),
            operand: Box::new(operand),
        })
    }

    pub fn arith_assign(op: impl Into<String>, target: ArithExpr, value: ArithExpr) -> ArithExpr {
        ArithExpr::Assign(ArithAssignNode {
            op: op.into(),
            target: Box::new(target),
            value: Box::new(value),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cmd(name: &str) -> Node {
        AST::command(vec![WordNode::literal(name)], Vec::new())
    }

    #[test]
    fn test_and_or_chains_left_fold() {
        let list = ListNode::new(vec![
            ListItem::Command(cmd("a")),
            AST::operator(ListOperator::And),
            ListItem::Command(cmd("b")),
            AST::operator(ListOperator::Or),
            ListItem::Command(cmd("c")),
        ]);
        let stmts = list.and_or_chains();
        assert_eq!(stmts.len(), 1);
        if let AndOr::Or(left, right) = &stmts[0].chain {
            assert_eq!(*right, &cmd("c"));
            assert!(matches!(**left, AndOr::And(_, _)));
        } else {
            panic!("Expected Or at the root");
        }
    }

    #[test]
    fn test_and_or_chains_split_on_separators() {
        let list = ListNode::new(vec![
            ListItem::Command(cmd("a")),
            AST::operator(ListOperator::Background),
            ListItem::Command(cmd("b")),
            AST::operator(ListOperator::Semi),
        ]);
        let stmts = list.and_or_chains();
        assert_eq!(stmts.len(), 2);
        assert_eq!(stmts[0].terminator, Some(ListOperator::Background));
        assert_eq!(stmts[1].terminator, Some(ListOperator::Semi));
    }

    #[test]
    fn test_heredoc_content_fills_once() {
        let content = HereDocContent::new();
        let shared = content.clone();
        assert!(!content.is_filled());
        assert!(shared.fill("body\n".to_string()));
        assert!(!shared.fill("other".to_string()));
        assert_eq!(content.get(), "body\n");
    }

    #[test]
    fn test_serialize_tagged() {
        let node = cmd("ls");
        let json = serde_json::to_value(&node).unwrap();
        assert_eq!(json["type"], "Command");
        assert_eq!(json["words"][0]["value"], "ls");

        let op = serde_json::to_value(AST::operator(ListOperator::And)).unwrap();
        assert_eq!(op["type"], "Operator");
        assert_eq!(op["op"], "&&");
    }
}
