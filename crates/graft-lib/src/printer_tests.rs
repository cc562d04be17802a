use crate::grammar::GrammarBuilder;
use crate::printer::PrintableErrors;

#[test]
fn error_free_parses_render_nothing() {
    let mut g = GrammarBuilder::new();
    let digits = g.regex("[0-9]+");
    let number = g.define("number", digits);
    let grammar = g.finish(number).unwrap();
    let tree = grammar.parse("42").unwrap();
    assert_eq!(tree.errors_printer().render(), "");
}

#[test]
fn errors_render_with_their_message_and_context() {
    let mut g = GrammarBuilder::new();
    let a = g.text("A");
    let b = g.text("B");
    let body = g.series_with_mandatory(&[a, b], 1);
    let series = g.define("series", body);
    let anything = g.regex(".*");
    let doc_body = g.alternative(&[series, anything]);
    let document = g.define("document", doc_body);
    let skip = g.reentry_pattern("(?=.)");
    g.skip("series", vec![skip]);
    let grammar = g.finish(document).unwrap();

    let tree = grammar.parse("AXB").unwrap();
    assert!(tree.has_errors());
    let rendered = tree.errors_printer().path("input.txt").render();
    assert!(rendered.contains("error"));
    assert!(rendered.contains("input.txt"));
    assert!(rendered.contains("expected by parser 'series'"));
    // the annotated line of source appears in the snippet
    assert!(rendered.contains("AXB"));
}

#[test]
fn warnings_render_at_warning_level() {
    let mut g = GrammarBuilder::new();
    let empty = g.text("");
    let body = g.zero_or_more(empty);
    let tail = g.regex(".+");
    let whole = g.series(&[body, tail]);
    let doc = g.define("doc", whole);
    let grammar = g.finish(doc).unwrap();
    let tree = grammar.parse("rest").unwrap();
    let rendered = tree.errors_printer().render();
    assert!(rendered.contains("warning"));
    assert!(rendered.contains("did not make any progress"));
}
