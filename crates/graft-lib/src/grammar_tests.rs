use crate::grammar::{GrammarBuilder, ParseOptions};
use crate::{Error, Grammar};

fn number_grammar() -> Grammar {
    let mut g = GrammarBuilder::new();
    let digits = g.regex("[0-9]+");
    let number = g.define("number", digits);
    g.finish(number).expect("well-formed grammar")
}

#[test]
fn parsing_a_document_yields_its_content() {
    let grammar = number_grammar();
    let tree = grammar.parse("12345").unwrap();
    assert!(!tree.has_errors());
    assert_eq!(tree.content(), "12345");
    assert_eq!(tree.name(), "number");
}

#[test]
fn reparsing_yields_an_equal_tree_and_error_list() {
    let mut g = GrammarBuilder::new();
    let word = g.regex(r"\w+");
    let ws = g.whitespace(r"\s*");
    let dropped_ws = g.drop(ws);
    let item = g.series(&[word, dropped_ws]);
    let doc_body = g.one_or_more(item);
    let doc = g.define("doc", doc_body);
    let grammar = g.finish(doc).unwrap();

    let first = grammar.parse("alpha beta gamma").unwrap();
    let second = grammar.parse("alpha beta gamma").unwrap();
    assert!(first.equals(&second));
    assert_eq!(first.errors, second.errors);
}

#[test]
fn incomplete_matches_are_reported_not_thrown() {
    let grammar = number_grammar();
    let tree = grammar.parse("123abc").unwrap();
    assert!(tree.has_errors());
    assert!(tree
        .errors
        .iter()
        .any(|e| e.code == graft_core::error::PARSER_STOPPED_BEFORE_END));
    // the skipped text is preserved in a zombie stitch
    assert_eq!(tree.content(), "123abc");
}

#[test]
fn prefix_matching_ignores_the_tail() {
    let grammar = number_grammar();
    let outcome = grammar
        .run("123abc", &ParseOptions::default().prefix_match())
        .unwrap();
    assert!(!outcome.root.has_errors());
    assert_eq!(outcome.root.content(), "123");
}

#[test]
fn match_helpers() {
    let grammar = number_grammar();
    assert_eq!(grammar.matches("number", "123abc"), Some("123".to_string()));
    assert_eq!(grammar.full_match("number", "123"), Some("123".to_string()));
    assert_eq!(grammar.full_match("number", "123abc"), None);
    assert_eq!(grammar.matches("number", "abc"), None);
}

#[test]
fn unknown_start_symbol_is_rejected() {
    let grammar = number_grammar();
    let err = grammar
        .run("1", &ParseOptions::default().start("nonsense"))
        .unwrap_err();
    assert!(matches!(err, Error::UnknownStartSymbol(name) if name == "nonsense"));
}

#[test]
fn starting_from_a_sub_symbol() {
    let mut g = GrammarBuilder::new();
    let digits = g.regex("[0-9]+");
    let number = g.define("number", digits);
    let dot = g.text(".");
    let fraction_body = g.series(&[dot, number]);
    let fraction = g.define("fraction", fraction_body);
    let number2 = g.option(fraction);
    let value_body = g.series(&[number, number2]);
    let value = g.define("value", value_body);
    let grammar = g.finish(value).unwrap();

    let outcome = grammar
        .run(".25", &ParseOptions::default().start("fraction"))
        .unwrap();
    assert!(!outcome.root.has_errors());
    assert_eq!(outcome.root.content(), ".25");
}

#[test]
fn empty_document_with_nullable_root_matches() {
    let mut g = GrammarBuilder::new();
    let item = g.text("x");
    let body = g.zero_or_more(item);
    let doc = g.define("doc", body);
    let grammar = g.finish(doc).unwrap();
    let tree = grammar.parse("").unwrap();
    assert!(!tree.has_errors(), "{:?}", tree.errors);
    assert_eq!(tree.content(), "");
}

#[test]
fn empty_document_with_non_nullable_root_reports_an_error() {
    let grammar = number_grammar();
    let tree = grammar.parse("").unwrap();
    assert_eq!(tree.errors.len(), 1);
    assert_eq!(
        tree.errors[0].code,
        graft_core::error::PARSER_STOPPED_BEFORE_END
    );
}

#[test]
fn whitespace_succeeds_with_an_empty_match_instead_of_failing() {
    let mut g = GrammarBuilder::new();
    let ws = g.whitespace(r"\s*");
    let root = g.define("ws", ws);
    let grammar = g.finish(root).unwrap();
    let outcome = grammar
        .run("x", &ParseOptions::default().prefix_match())
        .unwrap();
    assert!(!outcome.root.has_errors());
    assert_eq!(outcome.root.content(), "");
}

#[test]
fn bom_is_stripped_before_parsing() {
    let grammar = number_grammar();
    let tree = grammar.parse("\u{feff}42").unwrap();
    assert!(!tree.has_errors());
    assert_eq!(tree.content(), "42");
}

#[test]
fn to_ebnf_lists_symbol_definitions() {
    let mut g = GrammarBuilder::new();
    let digits = g.regex("[0-9]+");
    let number = g.define("number", digits);
    let sign = g.text("-");
    let sign_opt = g.option(sign);
    let value_body = g.series(&[sign_opt, number]);
    let value = g.define("value", value_body);
    let grammar = g.finish(value).unwrap();

    let ebnf = grammar.to_ebnf();
    assert!(ebnf.contains("number = /[0-9]+/"));
    assert!(ebnf.contains("value = [`-`] number"));
}

#[test]
fn recursive_definitions_render_with_an_ellipsis_guard() {
    let mut g = GrammarBuilder::new();
    let expr = g.forward();
    let open = g.text("(");
    let close = g.text(")");
    let x = g.text("x");
    let wrapped = g.series(&[open, expr, close]);
    let body = g.alternative(&[wrapped, x]);
    g.set(expr, body);
    let expr = g.define("expr", expr);
    let grammar = g.finish(expr).unwrap();

    let ebnf = grammar.to_ebnf();
    assert!(ebnf.contains("expr = `(` expr `)` | `x`"));

    let tree = grammar.parse("((x))").unwrap();
    assert!(!tree.has_errors());
    assert_eq!(tree.content(), "((x))");
}

#[test]
fn ignore_case_matches_any_casing() {
    let mut g = GrammarBuilder::new();
    let head = g.ignore_case("head");
    let tag = g.define("tag", head);
    let grammar = g.finish(tag).unwrap();
    assert_eq!(grammar.full_match("tag", "HEAD"), Some("HEAD".to_string()));
    assert_eq!(grammar.full_match("tag", "Head"), Some("Head".to_string()));
    assert_eq!(grammar.full_match("tag", "help"), None);
}

#[test]
fn any_char_consumes_exactly_one_character() {
    let mut g = GrammarBuilder::new();
    let one = g.any_char();
    let ch = g.define("ch", one);
    let grammar = g.finish(ch).unwrap();
    assert_eq!(grammar.matches("ch", "äbc"), Some("ä".to_string()));
    assert_eq!(grammar.matches("ch", ""), None);
}

#[test]
fn smart_re_produces_one_child_per_group() {
    let mut g = GrammarBuilder::new();
    let re = g.smart_re(r"(?P<christian_name>\w+)\s+(?P<family_name>\w+)");
    let name = g.define("name", re);
    let grammar = g.finish(name).unwrap();
    let tree = grammar.parse("Arthur Schopenhauer").unwrap();
    assert!(!tree.has_errors());
    assert_eq!(
        tree.as_sxpr(),
        r#"(name (christian_name "Arthur") (family_name "Schopenhauer"))"#
    );
    // group positions are absolute document offsets
    let family = tree.pick(|n| n.name() == "family_name", false).unwrap();
    assert_eq!(family.pos(), Some(7));
}

#[test]
fn smart_re_unnamed_groups_become_anonymous_children() {
    let mut g = GrammarBuilder::new();
    let re = g.smart_re(r"(?P<christian_name>\w+)(\s+)(?P<family_name>\w+)");
    let name = g.define("name", re);
    let grammar = g.finish(name).unwrap();
    let tree = grammar.parse("Arthur Schopenhauer").unwrap();
    assert_eq!(
        tree.as_sxpr(),
        r#"(name (christian_name "Arthur") (:RegExp " ") (family_name "Schopenhauer"))"#
    );
}

#[test]
fn custom_parsers_take_part_like_any_other() {
    let mut g = GrammarBuilder::new();
    let magic = g.custom(|rest| {
        Ok(rest
            .starts_with("1234")
            .then(|| graft_core::node::Node::leaf(":Text", "1234")))
    });
    let root = g.define("root", magic);
    let grammar = g.finish(root).unwrap();
    let tree = grammar.parse("1234").unwrap();
    assert!(!tree.has_errors());
    assert_eq!(tree.as_sxpr(), r#"(root "1234")"#);
    let tree = grammar.parse("abcd").unwrap();
    assert!(tree.has_errors());
}

#[test]
fn failing_custom_parsers_report_instead_of_crashing() {
    let mut g = GrammarBuilder::new();
    let broken = g.custom(|_| Err("left the rails".to_string()));
    let root = g.define("root", broken);
    let grammar = g.finish(root).unwrap();
    let outcome = grammar
        .run("x", &ParseOptions::default().prefix_match())
        .unwrap();
    assert!(outcome
        .root
        .errors
        .iter()
        .any(|e| e.code == graft_core::error::CUSTOM_PARSER_FAILURE));
}

#[test]
fn err_parser_deposits_a_custom_error() {
    let mut g = GrammarBuilder::new();
    let a = g.text("a");
    let complaint = g.err("2010:'b' is not allowed here");
    let b = g.text("b");
    let bad_b = g.series(&[complaint, b]);
    let branch = g.alternative(&[a, bad_b]);
    let root = g.define("root", branch);
    let grammar = g.finish(root).unwrap();
    let tree = grammar.parse("b").unwrap();
    let codes: Vec<u32> = tree.errors.iter().map(|e| e.code).collect();
    assert!(codes.contains(&2010), "{codes:?}");
}

#[test]
fn mandatory_sugar_required() {
    let mut g = GrammarBuilder::new();
    let a = g.text("a");
    let required_a = g.required(a);
    let root = g.define("root", required_a);
    let grammar = g.finish(root).unwrap();
    let tree = grammar.parse("b").unwrap();
    assert!(tree
        .errors
        .iter()
        .any(|e| e.code == graft_core::error::MANDATORY_CONTINUATION));
}

#[test]
fn multi_line_documents_report_line_and_column() {
    let mut g = GrammarBuilder::new();
    let line = g.regex("[a-z]*\n");
    let body = g.one_or_more(line);
    let doc = g.define("doc", body);
    let grammar = g.finish(doc).unwrap();

    let text = indoc::indoc! {"
        alpha
        beta
        42
    "};
    let tree = grammar.parse(text).unwrap();
    assert_eq!(tree.errors.len(), 1);
    let err = &tree.errors[0];
    assert_eq!((err.line, err.column), (Some(3), Some(1)));
    insta::assert_snapshot!(
        tree.as_sxpr(),
        @r#"(ZOMBIE__ (doc (:RegExp "alpha\n") (:RegExp "beta\n")) (ZOMBIE__ "42\n"))"#
    );
}

#[test]
fn lookbehind_checks_the_text_to_the_left() {
    let mut g = GrammarBuilder::new();
    let a = g.text("A");
    // reads right-to-left over the reversed prefix
    let marker = g.regex("A");
    let behind = g.lookbehind(marker);
    let b = g.text("B");
    let body = g.series(&[a, behind, b]);
    let root = g.define("root", body);
    let grammar = g.finish(root).unwrap();
    assert_eq!(grammar.full_match("root", "AB"), Some("AB".to_string()));
}

#[test]
fn negative_lookbehind_inverts_the_check() {
    let mut g = GrammarBuilder::new();
    let a = g.text("X");
    let marker = g.regex("A");
    let behind = g.negative_lookbehind(marker);
    let b = g.text("B");
    let body = g.series(&[a, behind, b]);
    let root = g.define("root", body);
    let grammar = g.finish(root).unwrap();
    assert_eq!(grammar.full_match("root", "XB"), Some("XB".to_string()));

    let mut g = GrammarBuilder::new();
    let a = g.text("A");
    let marker = g.regex("A");
    let behind = g.negative_lookbehind(marker);
    let b = g.text("B");
    let body = g.series(&[a, behind, b]);
    let root = g.define("root", body);
    let grammar = g.finish(root).unwrap();
    assert_eq!(grammar.full_match("root", "AB"), None);
}
