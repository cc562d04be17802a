use graft_core::error::{
    INFINITE_LOOP_WARNING, PARSER_STOPPED_BEFORE_END, RECURSION_DEPTH_LIMIT_HIT,
};

use crate::grammar::{Grammar, GrammarBuilder, ParseOptions};
use crate::reduce::Reduction;

/// expr = expr ('+' | '-') term | term
/// term = term ('*' | '/') factor | factor
/// factor = /[0-9]+/
fn arithmetic() -> Grammar {
    let mut g = GrammarBuilder::new();
    let expr = g.forward();
    let term = g.forward();
    let digits = g.regex("[0-9]+");
    let factor = g.define("factor", digits);

    let star = g.text("*");
    let slash = g.text("/");
    let mulop = g.alternative(&[star, slash]);
    let mul = g.series(&[term, mulop, factor]);
    let term_body = g.alternative(&[mul, factor]);
    g.set(term, term_body);
    let term = g.define("term", term);

    let plus = g.text("+");
    let minus = g.text("-");
    let addop = g.alternative(&[plus, minus]);
    let add = g.series(&[expr, addop, term]);
    let expr_body = g.alternative(&[add, term]);
    g.set(expr, expr_body);
    let expr = g.define("expr", expr);

    g.finish(expr).expect("well-formed grammar")
}

#[test]
fn direct_left_recursion_produces_a_left_leaning_tree() {
    let grammar = arithmetic();
    let tree = grammar.parse("9+8+7+6+5+3*4").unwrap();
    assert!(!tree.has_errors(), "{:?}", tree.errors);
    assert_eq!(tree.content(), "9+8+7+6+5+3*4");

    // the outermost '+' hangs under the root; its left operand covers
    // everything up to the final summand
    assert_eq!(tree.name(), "expr");
    let left = &tree.children()[0];
    assert_eq!(left.name(), "expr");
    assert_eq!(left.content(), "9+8+7+6+5");
    let right = tree.children().last().unwrap();
    assert_eq!(right.name(), "term");
    assert_eq!(right.content(), "3*4");
}

#[test]
fn left_recursion_repeats_deterministically() {
    let grammar = arithmetic();
    let first = grammar.parse("1+2*3-4").unwrap();
    let second = grammar.parse("1+2*3-4").unwrap();
    assert!(first.equals(&second));
    assert!(!first.has_errors());
}

#[test]
fn left_recursion_can_be_disabled() {
    let mut g = GrammarBuilder::new();
    g.left_recursion(false);
    g.recursion_limit(64);
    let expr = g.forward();
    let digits = g.regex("[0-9]+");
    let num = g.define("num", digits);
    let plus = g.text("+");
    let add = g.series(&[expr, plus, num]);
    let body = g.alternative(&[add, num]);
    g.set(expr, body);
    let expr = g.define("expr", expr);
    let grammar = g.finish(expr).unwrap();

    // without the seed-and-grow algorithm the recursion limit kicks in
    let tree = grammar.parse("1+2").unwrap();
    assert!(tree
        .errors
        .iter()
        .any(|e| e.code == RECURSION_DEPTH_LIMIT_HIT));
}

#[test]
fn recursion_limit_reports_a_fatal_error() {
    let mut g = GrammarBuilder::new();
    g.recursion_limit(12);
    let expr = g.forward();
    let open = g.text("(");
    let close = g.text(")");
    let x = g.text("x");
    let wrapped = g.series(&[open, expr, close]);
    let body = g.alternative(&[wrapped, x]);
    g.set(expr, body);
    let expr = g.define("expr", expr);
    let grammar = g.finish(expr).unwrap();

    let tree = grammar.parse("((((((((x))))))))").unwrap();
    assert!(tree
        .errors
        .iter()
        .any(|e| e.code == RECURSION_DEPTH_LIMIT_HIT));
    assert!(tree.error_flag >= graft_core::error::FATAL);
}

#[test]
fn packrat_memoization_is_observationally_transparent() {
    // an alternative that re-parses the same prefix twice exercises the
    // memo table; the result must equal a parse without sharing
    let build = |reduction: Reduction| {
        let mut g = GrammarBuilder::new();
        g.reduction(reduction);
        let word = g.regex("[a-z]+");
        let item = g.define("item", word);
        let comma = g.text(",");
        let pair_tail = g.series(&[comma, item]);
        let pair = g.series(&[item, pair_tail]);
        let single = g.series(&[item]);
        let body = g.alternative(&[pair, single]);
        let doc = g.define("doc", body);
        g.finish(doc).unwrap()
    };
    let grammar = build(Reduction::Flatten);
    let tree = grammar.parse("alpha").unwrap();
    assert!(!tree.has_errors());
    assert_eq!(tree.as_sxpr(), r#"(doc (item "alpha"))"#);

    let tree = grammar.parse("alpha,beta").unwrap();
    assert!(!tree.has_errors());
    assert_eq!(
        tree.as_sxpr(),
        r#"(doc (item "alpha") (:Text ",") (item "beta"))"#
    );
}

#[test]
fn repetition_time_stays_linear() {
    // a packrat-smoke test rather than a benchmark: a repetition grammar
    // over a sizable input must terminate quickly and correctly
    let mut g = GrammarBuilder::new();
    let a = g.text("ab");
    let body = g.zero_or_more(a);
    let doc = g.define("doc", body);
    let grammar = g.finish(doc).unwrap();
    let input = "ab".repeat(5000);
    let tree = grammar.parse(&input).unwrap();
    assert!(!tree.has_errors());
    assert_eq!(tree.strlen(), input.len());
}

#[test]
fn infinite_loops_are_broken_with_a_warning() {
    let mut g = GrammarBuilder::new();
    let empty = g.text("");
    let body = g.zero_or_more(empty);
    let doc_tail = g.regex(".*");
    let whole = g.series(&[body, doc_tail]);
    let doc = g.define("doc", whole);
    let grammar = g.finish(doc).unwrap();
    let tree = grammar.parse("rest").unwrap();
    assert!(tree
        .errors
        .iter()
        .any(|e| e.code == INFINITE_LOOP_WARNING));
    assert_eq!(tree.content(), "rest");
}

#[test]
fn dropout_loop_stitches_over_unparsable_lines() {
    let mut g = GrammarBuilder::new();
    let word = g.regex("[a-z]+\n?");
    let line = g.define("line", word);
    let grammar = g.finish(line).unwrap();

    let tree = grammar.parse("abc\n123\ndef\n").unwrap();
    // one stitch for the numeric line, content fully preserved
    assert_eq!(tree.content(), "abc\n123\ndef\n");
    assert!(tree
        .errors
        .iter()
        .any(|e| e.code == PARSER_STOPPED_BEFORE_END));
    let zombie = tree.pick(|n| n.name() == graft_core::node::ZOMBIE_TAG, false);
    assert!(zombie.is_some());
}

#[test]
fn dropout_retries_are_bounded() {
    let mut g = GrammarBuilder::new();
    g.max_dropouts(2);
    let word = g.regex("[a-z]+\n");
    let line = g.define("line", word);
    let grammar = g.finish(line).unwrap();

    let tree = grammar.parse("1\n2\n3\n4\n5\n").unwrap();
    assert!(tree.has_errors());
    // two retries, then the parser gives up and the rest lands in a
    // trailing zombie
    assert_eq!(tree.content(), "1\n2\n3\n4\n5\n");
}

#[test]
fn counted_repetitions() {
    let mut g = GrammarBuilder::new();
    let a = g.text("A");
    let counted = g.counted(a, 2, 4);
    let doc = g.define("doc", counted);
    let grammar = g.finish(doc).unwrap();

    assert!(grammar.full_match("doc", "AA").is_some());
    assert!(grammar.full_match("doc", "AAAA").is_some());
    assert!(grammar.full_match("doc", "A").is_none());
    assert_eq!(grammar.matches("doc", "AAAAA"), Some("AAAA".to_string()));
}

#[test]
fn interleave_matches_in_any_order() {
    let mut g = GrammarBuilder::new();
    let a = g.text("A");
    let b = g.text("B");
    let c = g.text("C");
    let set = g.interleave(&[a, b, c]);
    let doc = g.define("doc", set);
    let grammar = g.finish(doc).unwrap();

    assert!(grammar.full_match("doc", "ABC").is_some());
    assert!(grammar.full_match("doc", "BCA").is_some());
    assert!(grammar.full_match("doc", "BCBA").is_none());
    assert!(grammar.full_match("doc", "AB").is_none());
}

#[test]
fn interleave_respects_repetition_ranges() {
    let mut g = GrammarBuilder::new();
    let a = g.text("A");
    let b = g.text("B");
    let c = g.text("C");
    let set = g.interleave_with(&[a, b, c], vec![(1, 1000), (0, 1), (1, 1)], crate::NO_MANDATORY);
    let doc = g.define("doc", set);
    let grammar = g.finish(doc).unwrap();

    assert!(grammar.full_match("doc", "AABC").is_some());
    assert!(grammar.full_match("doc", "BACAAA").is_some());
    assert!(grammar.full_match("doc", "ABCC").is_none());
    assert!(grammar.full_match("doc", "AAACAAA").is_some());
    assert!(grammar.full_match("doc", "AAABAAA").is_none());
}

#[test]
fn lookahead_matches_without_consuming() {
    let mut g = GrammarBuilder::new();
    let a = g.text("A");
    let ahead_b = g.text("B");
    let ahead = g.lookahead(ahead_b);
    let b = g.text("B");
    let body = g.series(&[a, ahead, b]);
    let doc = g.define("doc", body);
    let grammar = g.finish(doc).unwrap();
    assert_eq!(grammar.full_match("doc", "AB"), Some("AB".to_string()));
    assert_eq!(grammar.full_match("doc", "AC"), None);
}

#[test]
fn negative_lookahead_inverts() {
    let mut g = GrammarBuilder::new();
    let a = g.text("A");
    let ahead_b = g.text("B");
    let ahead = g.negative_lookahead(ahead_b);
    let rest = g.regex(".");
    let body = g.series(&[a, ahead, rest]);
    let doc = g.define("doc", body);
    let grammar = g.finish(doc).unwrap();
    assert_eq!(grammar.full_match("doc", "AC"), Some("AC".to_string()));
    assert_eq!(grammar.full_match("doc", "AB"), None);
}

#[test]
fn trailing_lookahead_failures_are_classified_as_notices() {
    let mut g = GrammarBuilder::new();
    let word = g.regex("[a-z]+");
    let more = g.regex("[a-z]");
    let ahead = g.lookahead(more);
    let body = g.series(&[word, ahead]);
    let doc = g.define("doc", body);
    let grammar = g.finish(doc).unwrap();

    // the lookahead necessarily fails at the end of the document
    let outcome = grammar.run("abc", &ParseOptions::default()).unwrap();
    assert!(outcome.root.errors.iter().any(|e| {
        e.code == graft_core::error::PARSER_LOOKAHEAD_FAILURE_ONLY
            || e.code == PARSER_STOPPED_BEFORE_END
    }));
    assert!(outcome
        .root
        .errors
        .iter()
        .any(|e| e.code == graft_core::error::PARSER_LOOKAHEAD_FAILURE_ONLY));
}
