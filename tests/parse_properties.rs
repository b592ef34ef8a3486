use shparse::{
    parse, parse_with_options, AndOr, ArithExpr, CaseTerminator, CondExpr, ListOperator, Node,
    ParseError, ParseOptions, Redirect, WordPart,
};

fn parse_one(source: &str) -> Node {
    let nodes = parse(source, false).unwrap();
    assert_eq!(nodes.len(), 1, "expected one top-level node for {source:?}");
    nodes.into_iter().next().unwrap()
}

fn words(node: &Node) -> Vec<&str> {
    match node {
        Node::Command(cmd) => cmd.words.iter().map(|w| w.value.as_str()).collect(),
        other => panic!("expected command, got {other:?}"),
    }
}

#[test]
fn test_result_is_nodes_or_one_error_kind() {
    let inputs = [
        "",
        "echo hi",
        "echo \"abc",
        "if true; then",
        "case x in",
        "echo $(",
        ")",
        "for ((;;",
        "cat <<EOF\nbody",
        "a && b || c; d &",
    ];
    for input in inputs {
        match parse(input, false) {
            Ok(nodes) => assert!(!nodes.is_empty(), "empty result for {input:?}"),
            Err(ParseError::Unterminated { .. }) | Err(ParseError::Syntax { .. }) => {}
        }
    }
}

#[test]
fn test_command_substitution_in_double_quotes() {
    let node = parse_one("echo \"$(ls -la)\"");
    let Node::Command(cmd) = &node else {
        panic!("expected command");
    };
    assert_eq!(cmd.words.len(), 2);
    let parts = &cmd.words[1].parts;
    assert_eq!(parts.len(), 1);
    let WordPart::CommandSubstitution(sub) = &parts[0] else {
        panic!("expected command substitution, got {:?}", parts[0]);
    };
    assert!(!sub.brace);
    assert_eq!(words(&sub.command), vec!["ls", "-la"]);
}

#[test]
fn test_heredoc_content() {
    let node = parse_one("cat <<EOF\nhello\nEOF");
    let Node::Command(cmd) = &node else {
        panic!("expected command");
    };
    assert_eq!(cmd.redirects.len(), 1);
    let Redirect::HereDoc(heredoc) = &cmd.redirects[0] else {
        panic!("expected heredoc");
    };
    assert_eq!(heredoc.delimiter, "EOF");
    assert_eq!(heredoc.content.get(), "hello\n");
    assert!(!heredoc.quoted);
}

#[test]
fn test_if_without_else() {
    let Node::If(node) = parse_one("if true; then echo ok; fi") else {
        panic!("expected if");
    };
    assert_eq!(words(&node.condition), vec!["true"]);
    assert_eq!(words(&node.then_body), vec!["echo", "ok"]);
    assert!(node.else_body.is_none());
}

#[test]
fn test_case_alternatives() {
    let Node::Case(node) = parse_one("case $x in a|b) echo hit;; esac") else {
        panic!("expected case");
    };
    assert_eq!(node.patterns.len(), 1);
    assert_eq!(node.patterns[0].pattern.split('|').count(), 2);
    assert_eq!(node.patterns[0].terminator, CaseTerminator::Break);
}

#[test]
fn test_unterminated_double_quote() {
    let err = parse("echo \"abc", false).unwrap_err();
    assert!(err.is_unterminated());
    assert!(matches!(err, ParseError::Unterminated { .. }));
}

#[test]
fn test_arithmetic_precedence() {
    let node = parse_one("echo $(( 1 + 2 * 3 ))");
    let Node::Command(cmd) = &node else {
        panic!("expected command");
    };
    let WordPart::ArithmeticExpansion(arith) = &cmd.words[1].parts[0] else {
        panic!("expected arithmetic expansion");
    };
    let Some(ArithExpr::Binary(add)) = arith.expression.as_deref() else {
        panic!("expected binary expression");
    };
    assert_eq!(add.op, "+");
    assert!(matches!(*add.left, ArithExpr::Number(ref n) if n.value == "1"));
    let ArithExpr::Binary(mul) = &*add.right else {
        panic!("expected multiplication on the right");
    };
    assert_eq!(mul.op, "*");
}

#[test]
fn test_and_or_left_associative() {
    let Node::List(list) = parse_one("a && b || c") else {
        panic!("expected list");
    };
    let ops: Vec<_> = list.operators().collect();
    assert_eq!(ops, vec![ListOperator::And, ListOperator::Or]);

    let statements = list.and_or_chains();
    assert_eq!(statements.len(), 1);
    let AndOr::Or(left, right) = &statements[0].chain else {
        panic!("expected || at the top");
    };
    assert!(matches!(**left, AndOr::And(_, _)));
    assert_eq!(words(right), vec!["c"]);
}

#[test]
fn test_time_and_negation_keep_written_order() {
    let Node::Time(time) = parse_one("time ! true") else {
        panic!("expected time");
    };
    assert!(matches!(*time.pipeline, Node::Negation(_)));

    let Node::Negation(negation) = parse_one("! time true") else {
        panic!("expected negation");
    };
    assert!(matches!(*negation.pipeline, Node::Time(_)));
}

#[test]
fn test_pipe_stderr_flags() {
    let Node::Pipeline(pipeline) = parse_one("a |& b | c") else {
        panic!("expected pipeline");
    };
    assert_eq!(pipeline.pipe_stderr, vec![true, false]);
}

#[test]
fn test_conditional_expression() {
    let Node::ConditionalExpr(node) = parse_one("[[ -n $x && $y =~ ^a ]]") else {
        panic!("expected conditional");
    };
    assert!(matches!(node.body, CondExpr::And(_)));
}

#[test]
fn test_extglob_option() {
    let options = ParseOptions {
        extglob: true,
        ..Default::default()
    };
    let nodes = parse_with_options("ls !(*.txt)", &options).unwrap();
    assert_eq!(words(&nodes[0]), vec!["ls", "!(*.txt)"]);
}

#[test]
fn test_missing_keyword_is_syntax_error() {
    let err = parse("while true; do echo", false).unwrap_err();
    assert!(!err.is_unterminated());
    assert_eq!(err.message(), "Expected 'done' to close while loop");
    assert_eq!(err.line(), 1);
}

#[test]
fn test_json_shape() {
    let nodes = parse("echo hi > out", false).unwrap();
    let json = serde_json::to_value(&nodes).unwrap();
    assert_eq!(json[0]["type"], "Command");
    assert_eq!(json[0]["words"][1]["value"], "hi");
    assert_eq!(json[0]["redirects"][0]["type"], "File");
}

#[test]
fn test_top_level_lines() {
    let nodes = parse("# leading comment\necho a\n\necho b # trailing\n", false).unwrap();
    assert_eq!(nodes.len(), 2);
    assert_eq!(words(&nodes[1]), vec!["echo", "b"]);
}
