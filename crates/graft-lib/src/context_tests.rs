use graft_core::error::{
    CAPTURE_STACK_NOT_EMPTY_WARNING, UNDEFINED_RETRIEVE,
};

use crate::grammar::{Grammar, GrammarBuilder, ParseOptions};
use crate::parsers::MatchPolicy;

/// doc   = { text | block }
/// block = delim { text | !:delim /`+/ } ::delim
/// delim = /`+/   (captured)
/// text  = /[^`]+/
fn fenced_blocks() -> Grammar {
    let mut g = GrammarBuilder::new();
    let backticks = g.regex("`+");
    let capture = g.capture(backticks);
    let delim = g.define("delim", capture);

    let text_re = g.regex("[^`]+");
    let text = g.define("text", text_re);

    let seen_delim = g.retrieve(delim);
    let not_delim = g.negative_lookahead(seen_delim);
    let inner_ticks = g.regex("`+");
    let foreign_ticks = g.series(&[not_delim, inner_ticks]);
    let content = g.alternative(&[text, foreign_ticks]);
    let body = g.zero_or_more(content);
    let closing = g.pop(delim);
    let block_body = g.series(&[delim, body, closing]);
    let block = g.define("block", block_body);

    let piece = g.alternative(&[text, block]);
    let doc_body = g.zero_or_more(piece);
    let doc = g.define("doc", doc_body);
    g.finish(doc).expect("well-formed grammar")
}

#[test]
fn matching_fence_delimiters() {
    let grammar = fenced_blocks();
    let tree = grammar.parse("start ```code `` more ``` end").unwrap();
    assert!(!tree.has_errors(), "{:?}", tree.errors);
    assert_eq!(tree.content(), "start ```code `` more ``` end");

    let blocks = tree.select(|n| n.name() == "block");
    assert_eq!(blocks.len(), 1);
    let block = blocks[0];
    // opening and closing delimiter strings agree
    let delims = block.select(|n| n.name() == "delim");
    assert_eq!(delims.len(), 2);
    assert_eq!(delims[0].content(), "```");
    assert_eq!(delims[1].content(), "```");
    assert_eq!(block.content(), "```code `` more ```");
}

#[test]
fn shorter_fences_inside_a_block_are_plain_text() {
    let grammar = fenced_blocks();
    let tree = grammar.parse("``a ` b``").unwrap();
    assert!(!tree.has_errors(), "{:?}", tree.errors);
    let block = tree.pick(|n| n.name() == "block", false).unwrap();
    assert_eq!(block.content(), "``a ` b``");
}

#[test]
fn capture_is_rolled_back_when_the_block_fails() {
    let mut g = GrammarBuilder::new();
    let backticks = g.regex("`+");
    let capture = g.capture(backticks);
    let delim = g.define("delim", capture);
    let text_re = g.regex("[^`]+");
    let text = g.define("text", text_re);
    let closing = g.pop(delim);
    let block_body = g.series(&[delim, text, closing]);
    let block = g.define("block", block_body);
    let anything = g.regex(".*");
    let fallback = g.define("fallback", anything);
    let body = g.alternative(&[block, fallback]);
    let doc = g.define("doc", body);
    let grammar = g.finish(doc).unwrap();

    // the unclosed block backtracks after its delimiter was captured; the
    // fallback must find a clean stack
    let tree = grammar.parse("``abc").unwrap();
    assert!(!tree.has_errors(), "{:?}", tree.errors);
    let fallback = tree.pick(|n| n.name() == "fallback", false).unwrap();
    assert_eq!(fallback.content(), "``abc");
}

#[test]
fn pop_without_a_prior_capture_reports_undefined_retrieve() {
    let mut g = GrammarBuilder::new();
    let backticks = g.regex("`+");
    let capture = g.capture(backticks);
    let delim = g.define("delim", capture);
    let closing = g.pop(delim);
    let tail = g.regex(".*");
    let body = g.series(&[closing, tail]);
    let doc = g.define("doc", body);
    let grammar = g.finish(doc).unwrap();

    let outcome = grammar
        .run("no fences here", &ParseOptions::default().prefix_match())
        .unwrap();
    assert!(outcome
        .root
        .errors
        .iter()
        .any(|e| e.code == UNDEFINED_RETRIEVE));
}

#[test]
fn retrieve_auto_captures_on_an_empty_stack() {
    let mut g = GrammarBuilder::new();
    let backticks = g.regex("`+");
    let capture = g.capture(backticks);
    let delim = g.define("delim", capture);
    let retrieved = g.retrieve(delim);
    let colon = g.text(":");
    let closing = g.pop(delim);
    let body = g.series(&[retrieved, colon, closing]);
    let doc = g.define("doc", body);
    let grammar = g.finish(doc).unwrap();

    // nothing was captured when the retrieve runs; it captures the fence
    // itself and then matches it, the pop at the end clears the stack
    let tree = grammar.parse("``:``").unwrap();
    assert!(!tree.has_errors(), "{:?}", tree.errors);
    assert_eq!(tree.content(), "``:``");
}

#[test]
fn optional_retrieve_fails_softly_on_an_empty_stack() {
    let mut g = GrammarBuilder::new();
    let backticks = g.regex("`+");
    let capture = g.capture(backticks);
    let delim = g.define("delim", capture);
    let maybe_delim = g.retrieve_with(delim, MatchPolicy::OptionalLastValue);
    let fallback_re = g.regex("[a-z]+");
    let fallback = g.define("word", fallback_re);
    let body = g.alternative(&[maybe_delim, fallback]);
    let doc = g.define("doc", body);
    let grammar = g.finish(doc).unwrap();

    // with nothing captured the optional retrieve yields a non-match
    // rather than an error node
    let tree = grammar.parse("abc").unwrap();
    assert!(!tree.has_errors(), "{:?}", tree.errors);
    assert_eq!(tree.content(), "abc");
}

#[test]
fn optional_retrieve_matches_empty_when_the_value_does_not_fit() {
    let mut g = GrammarBuilder::new();
    let open_re = g.regex("`+");
    let capture = g.capture(open_re);
    let delim = g.define("delim", capture);
    let maybe_close = g.retrieve_with(delim, MatchPolicy::OptionalLastValue);
    let word = g.regex("[a-z]*");
    let dot = g.text(".");
    let final_close = g.pop(delim);
    let body = g.series(&[delim, word, maybe_close, dot, final_close]);
    let doc = g.define("doc", body);
    let grammar = g.finish(doc).unwrap();

    // the dot is not derivable from the stack, so the optional retrieve
    // yields an empty match; the pop at the end takes the real fence
    let tree = grammar.parse("``abc.``").unwrap();
    assert!(!tree.has_errors(), "{:?}", tree.errors);
    assert_eq!(tree.content(), "``abc.``");
}

#[test]
fn matching_bracket_policy_translates_brackets() {
    let mut g = GrammarBuilder::new();
    let open_re = g.regex(r"[(\[{]");
    let capture = g.capture(open_re);
    let braces = g.define("braces", capture);
    let inner_re = g.regex(r"[^(\[{)\]}]*");
    let inner = g.define("inner", inner_re);
    let closing = g.pop_with(braces, MatchPolicy::MatchingBracket);
    let body = g.series(&[braces, inner, closing]);
    let doc = g.define("doc", body);
    let grammar = g.finish(doc).unwrap();

    assert!(grammar.full_match("doc", "(abc)").is_some());
    assert!(grammar.full_match("doc", "[abc]").is_some());
    assert!(grammar.full_match("doc", "{abc}").is_some());
    assert!(grammar.full_match("doc", "(abc]").is_none());
}

#[test]
fn zero_length_captures_survive_the_next_call_at_the_same_spot() {
    let mut g = GrammarBuilder::new();
    let x = g.text("x");
    let maybe_x = g.option(x);
    let capture = g.capture_allowing_zero_length(maybe_x);
    let mark = g.define("mark", capture);
    let echoed = g.retrieve(mark);
    let y = g.text("y");
    let body = g.series(&[mark, echoed, y]);
    let doc = g.define("doc", body);
    let grammar = g.finish(doc).unwrap();

    // the capture matches zero characters; the retrieve directly after it
    // must still see the captured value instead of rolling it back
    let tree = grammar.parse("y").unwrap();
    assert_eq!(tree.content(), "y");
    // the zero-length value cannot be popped, which is reported as a
    // warning rather than an error
    assert!(tree
        .errors
        .iter()
        .any(|e| e.code == CAPTURE_STACK_NOT_EMPTY_WARNING));
}

#[test]
fn custom_match_policies_are_supported() {
    let mut g = GrammarBuilder::new();
    let open_re = g.regex("[a-z]+");
    let capture = g.capture(open_re);
    let tag = g.define("tag", capture);
    let colon = g.text(":");
    // match the captured value in upper case
    let shouted = g.pop_with(
        tag,
        MatchPolicy::Custom(std::sync::Arc::new(|text: &str, stack: &[String]| {
            let value = stack.last()?.to_uppercase();
            text.starts_with(&value).then_some(value)
        })),
    );
    let body = g.series(&[tag, colon, shouted]);
    let doc = g.define("doc", body);
    let grammar = g.finish(doc).unwrap();

    assert!(grammar.full_match("doc", "abc:ABC").is_some());
    assert!(grammar.full_match("doc", "abc:abc").is_none());
}
