//! Property tests for the invariants in spec §8: lexer totality and parser
//! coordinate validity.

use proptest::prelude::*;

use sara::ast::Stmt;
use sara::error::DiagnosticConfig;
use sara::lexer::{tokenize, TokenKind};
use sara::parser::parse;

/// A small alphabet of legal Sara tokens, space-separated, so generated
/// strings are close to real source without needing a full grammar.
fn token_fragment() -> impl Strategy<Value = &'static str> {
    prop_oneof![
        Just("int"),
        Just("float"),
        Just("char"),
        Just("return"),
        Just("if"),
        Just("else"),
        Just("while"),
        Just("x"),
        Just("42"),
        Just("3.14"),
        Just("+"),
        Just("-"),
        Just("*"),
        Just("("),
        Just(")"),
        Just("{"),
        Just("}"),
        Just(";"),
        Just("="),
        Just("<="),
    ]
}

proptest! {
    /// The lexer never panics on arbitrary printable input, and every
    /// token stream produced ends in `Eof`.
    #[test]
    fn lexer_is_total_over_arbitrary_bytes(src in ".{0,200}") {
        let mut errors = Vec::new();
        let tokens = tokenize(&src, &mut errors);
        prop_assert_eq!(tokens.last().map(|t| t.kind), Some(TokenKind::Eof));
    }

    /// Re-tokenizing a sequence built entirely from legal token fragments
    /// never reports a lexical error.
    #[test]
    fn well_formed_token_sequences_lex_without_errors(
        fragments in prop::collection::vec(token_fragment(), 0..40)
    ) {
        let src = fragments.join(" ");
        let mut errors = Vec::new();
        tokenize(&src, &mut errors);
        prop_assert!(errors.is_empty());
    }
}

fn stmt_spans_are_in_bounds(stmt: &Stmt, line_count: u32) {
    let span = stmt.span();
    assert!(span.line >= 1 && span.line <= line_count, "line {} out of range (1..={line_count})", span.line);
    assert!(span.column >= 1, "column must be 1-based, got {}", span.column);
    match stmt {
        Stmt::Compound(c) => {
            for s in &c.stmts {
                stmt_spans_are_in_bounds(s, line_count);
            }
        }
        Stmt::If { then_branch, else_branch, .. } => {
            stmt_spans_are_in_bounds(then_branch, line_count);
            if let Some(e) = else_branch {
                stmt_spans_are_in_bounds(e, line_count);
            }
        }
        Stmt::While { body, .. } | Stmt::For { body, .. } => stmt_spans_are_in_bounds(body, line_count),
        _ => {}
    }
}

#[test]
fn parser_coordinates_point_within_the_source() {
    let src = "int fact(int n) {\n    if (n <= 1) return 1;\n    return n * fact(n - 1);\n}\n\nint main() {\n    print(fact(5));\n    return 0;\n}\n";
    let line_count = src.lines().count() as u32;

    let mut errors = Vec::new();
    let tokens = tokenize(src, &mut errors);
    assert!(errors.is_empty());

    let mut sink = sara::error::DiagnosticSink::new(DiagnosticConfig::default());
    let program = parse(&tokens, &mut sink);
    assert!(!sink.has_errors());

    for f in &program.functions {
        assert!(f.span.line >= 1 && f.span.line <= line_count);
        for stmt in &f.body.stmts {
            stmt_spans_are_in_bounds(stmt, line_count);
        }
    }
}
