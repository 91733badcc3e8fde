// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::Status;
use proptest::prelude::*;

fn atom(job: &str, status: Status) -> Expr {
    Expr::Atom {
        job: job.to_string(),
        status,
    }
}

#[test]
fn parses_single_atom() {
    assert_eq!(
        Parser::parse("train=COMPLETED").unwrap(),
        atom("train", Status::Completed)
    );
}

#[test]
fn and_binds_tighter_than_or() {
    // a OR b AND c  ==  a OR (b AND c)
    let expr = Parser::parse("a=COMPLETED OR b=FAILED AND c=RUNNING").unwrap();
    assert_eq!(
        expr,
        Expr::Or(vec![
            atom("a", Status::Completed),
            Expr::And(vec![atom("b", Status::Failed), atom("c", Status::Running)]),
        ])
    );
}

#[test]
fn parens_override_precedence() {
    let expr = Parser::parse("(a=COMPLETED OR b=FAILED) AND c=RUNNING").unwrap();
    assert_eq!(
        expr,
        Expr::And(vec![
            Expr::Or(vec![atom("a", Status::Completed), atom("b", Status::Failed)]),
            atom("c", Status::Running),
        ])
    );
}

#[test]
fn chains_flatten() {
    let expr = Parser::parse("a=COMPLETED AND b=COMPLETED AND c=COMPLETED").unwrap();
    assert_eq!(
        expr,
        Expr::And(vec![
            atom("a", Status::Completed),
            atom("b", Status::Completed),
            atom("c", Status::Completed),
        ])
    );
}

#[test]
fn nested_parens() {
    let expr = Parser::parse("((a=COMPLETED))").unwrap();
    assert_eq!(expr, atom("a", Status::Completed));
}

#[yare::parameterized(
    missing_eq       = { "a COMPLETED" },
    missing_status   = { "a=" },
    lowercase_and    = { "a=COMPLETED and b=COMPLETED" },
    dangling_or      = { "a=COMPLETED OR" },
    unclosed_paren   = { "(a=COMPLETED" },
    stray_rparen     = { "a=COMPLETED)" },
    leading_operator = { "AND a=COMPLETED" },
    empty_parens     = { "()" },
)]
fn rejects_malformed(input: &str) {
    assert!(Parser::parse(input).is_err(), "should reject: {input}");
}

#[test]
fn rejects_empty_input() {
    assert_eq!(Parser::parse(""), Err(ParseError::Empty));
    assert_eq!(Parser::parse("   "), Err(ParseError::Empty));
}

#[test]
fn unknown_status_reports_column() {
    let err = Parser::parse("a=DONE").unwrap_err();
    assert_eq!(
        err,
        ParseError::UnknownStatus {
            found: "DONE".into(),
            column: 2
        }
    );
    assert_eq!(err.column(), Some(2));
}

#[test]
fn unexpected_token_reports_column() {
    let err = Parser::parse("a=COMPLETED b=FAILED").unwrap_err();
    assert_eq!(err, ParseError::TrailingInput { column: 12 });
}

#[test]
fn lowercase_and_is_a_trailing_identifier() {
    // `and` lexes as an identifier, so the parser stops after the first atom.
    let err = Parser::parse("a=COMPLETED and b=COMPLETED").unwrap_err();
    assert!(matches!(err, ParseError::TrailingInput { .. }));
}

// -- display round-trip --

fn arb_status() -> impl Strategy<Value = Status> {
    prop::sample::select(Status::ALL.to_vec())
}

fn arb_expr() -> impl Strategy<Value = Expr> {
    let leaf = ("[a-z_][a-z0-9_-]{0,8}", arb_status())
        .prop_map(|(job, status)| Expr::Atom { job, status });
    leaf.prop_recursive(4, 24, 4, |inner| {
        prop_oneof![
            prop::collection::vec(inner.clone(), 2..4).prop_map(Expr::And),
            prop::collection::vec(inner, 2..4).prop_map(Expr::Or),
        ]
    })
}

proptest! {
    /// Rendering an expression and parsing it back yields an equal AST.
    #[test]
    fn display_round_trips(expr in arb_expr()) {
        let rendered = expr.to_string();
        let reparsed = Parser::parse(&rendered).unwrap();
        prop_assert_eq!(reparsed.to_string(), rendered);
    }
}
