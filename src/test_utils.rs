//! Fixture texts and helpers shared by the unit tests. The S-expression
//! reader below exists only for tests; production input arrives as
//! [`crate::lisp::Node`] trees built by the parser collaborator.

use crate::ground::{ground, GroundConfig};
use crate::lisp::Node;
use crate::pddl::{Pddl, PddlConfig};
use crate::strips::StripsTask;

pub const TRAVEL_DOMAIN_TEXT: &str = include_str!(concat!(
    env!("CARGO_MANIFEST_DIR"),
    "/benchmarks/travel/domain.pddl"
));

pub const TRAVEL_PROBLEM01_TEXT: &str = include_str!(concat!(
    env!("CARGO_MANIFEST_DIR"),
    "/benchmarks/travel/p01.pddl"
));

pub const BEACON_DOMAIN_TEXT: &str = include_str!(concat!(
    env!("CARGO_MANIFEST_DIR"),
    "/benchmarks/beacon/domain.pddl"
));

pub const BEACON_PROBLEM01_TEXT: &str = include_str!(concat!(
    env!("CARGO_MANIFEST_DIR"),
    "/benchmarks/beacon/p01.pddl"
));

pub const DUALMOVE_DOMAIN_TEXT: &str = include_str!(concat!(
    env!("CARGO_MANIFEST_DIR"),
    "/benchmarks/dualmove/domain.pddl"
));

pub const DUALMOVE_PROBLEM01_TEXT: &str = include_str!(concat!(
    env!("CARGO_MANIFEST_DIR"),
    "/benchmarks/dualmove/p01.pddl"
));

pub const WORKSHOP_DOMAIN_TEXT: &str = include_str!(concat!(
    env!("CARGO_MANIFEST_DIR"),
    "/benchmarks/workshop/domain.pddl"
));

pub const WORKSHOP_PROBLEM01_TEXT: &str = include_str!(concat!(
    env!("CARGO_MANIFEST_DIR"),
    "/benchmarks/workshop/p01.pddl"
));

/// Reads one S-expression from fixture text into the AST the pipeline
/// consumes.
pub fn parse_sexp(text: &str) -> Node {
    let mut tokens = tokenize(text);
    tokens.reverse();
    let node = read_node(&mut tokens);
    assert!(tokens.is_empty(), "trailing input after S-expression");
    node
}

fn tokenize(text: &str) -> Vec<(String, u32)> {
    let mut tokens = Vec::new();
    let mut current = String::new();
    let mut line = 1;
    let mut in_comment = false;
    for c in text.chars() {
        if c == '\n' {
            line += 1;
            in_comment = false;
        }
        if in_comment {
            continue;
        }
        match c {
            ';' => {
                in_comment = true;
                flush(&mut current, &mut tokens, line);
            }
            '(' | ')' => {
                flush(&mut current, &mut tokens, line);
                tokens.push((c.to_string(), line));
            }
            c if c.is_whitespace() => flush(&mut current, &mut tokens, line),
            c => current.push(c),
        }
    }
    flush(&mut current, &mut tokens, line);
    tokens
}

fn flush(current: &mut String, tokens: &mut Vec<(String, u32)>, line: u32) {
    if !current.is_empty() {
        tokens.push((std::mem::take(current), line));
    }
}

fn read_node(tokens: &mut Vec<(String, u32)>) -> Node {
    let (token, line) = tokens.pop().expect("unexpected end of input");
    if token == "(" {
        let mut children = Vec::new();
        loop {
            let (next, _) = tokens.last().expect("unbalanced parentheses").clone();
            if next == ")" {
                tokens.pop();
                return Node::list(children, line);
            }
            children.push(read_node(tokens));
        }
    } else {
        assert_ne!(token, ")", "unbalanced parentheses");
        Node::token(token, line)
    }
}

/// Parses, builds and normalises a planning description from fixture text.
pub fn build_pddl(domain_text: &str, problem_text: &str) -> Pddl {
    let domain = parse_sexp(domain_text);
    let problem = parse_sexp(problem_text);
    let mut pddl = Pddl::from_lisp(&domain, &problem, &PddlConfig::default())
        .expect("fixture parses");
    pddl.normalize().expect("fixture normalises");
    pddl
}

/// Grounds a fixture with the default configuration.
pub fn ground_fixture(domain_text: &str, problem_text: &str) -> StripsTask {
    let pddl = build_pddl(domain_text, problem_text);
    ground(&pddl, &GroundConfig::default()).expect("fixture grounds")
}
