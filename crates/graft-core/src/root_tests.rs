use std::sync::Arc;

use crate::error::{
    Error, MANDATORY_CONTINUATION, PARSER_STOPPED_BEFORE_END, RECURSION_DEPTH_LIMIT_HIT,
};
use crate::node::Node;
use crate::root::RootNode;

#[test]
fn swallow_adopts_the_tree() {
    let mut root = RootNode::new("9+8");
    root.swallow(Some(
        Node::branch(
            "sum",
            vec![
                Node::leaf("num", "9"),
                Node::leaf(":Text", "+"),
                Node::leaf("num", "8"),
            ],
        )
        .with_pos(0),
    ));
    assert!(root.did_match());
    assert_eq!(root.content(), "9+8");
    assert_eq!(root.name(), "sum");
    assert!(!root.has_errors());
}

#[test]
fn swallowing_nothing_yields_a_zombie_with_an_error() {
    let mut root = RootNode::new("abc");
    root.swallow(None);
    assert!(!root.did_match());
    assert_eq!(root.errors.len(), 1);
    assert_eq!(root.errors[0].code, PARSER_STOPPED_BEFORE_END);
}

#[test]
fn errors_carry_line_and_column() {
    let mut root = RootNode::new("ab\ncd");
    let mut node = Node::leaf("x", "cd").with_pos(3);
    root.add_error(&mut node, Error::new("boom", 3, MANDATORY_CONTINUATION));
    assert_eq!(root.errors[0].line, Some(2));
    assert_eq!(root.errors[0].column, Some(1));
}

#[test]
fn source_mapping_is_applied_to_locations() {
    let mut root = RootNode::new("..ab\ncd");
    // pretend two bytes of preprocessor output precede every position
    root.set_source_mapping(Some(Arc::new(|pos| pos + 2)));
    let mut node = Node::leaf("x", "ab").with_pos(0);
    root.add_error(&mut node, Error::new("boom", 3, MANDATORY_CONTINUATION));
    assert_eq!(root.errors[0].line, Some(2));
    assert_eq!(root.errors[0].column, Some(1));
}

#[test]
fn node_errors_follow_the_node_through_moves() {
    let mut root = RootNode::new("x");
    let mut node = Node::leaf("x", "x").with_pos(0);
    root.add_error(&mut node, Error::new("first", 0, MANDATORY_CONTINUATION));
    root.add_error(&mut node, Error::new("second", 0, MANDATORY_CONTINUATION));
    // embed the node into a larger tree, then swallow it
    let tree = Node::branch("doc", vec![node]);
    root.swallow(Some(tree.with_pos(0)));
    let child = &root.children()[0];
    let attached = root.node_errors(child);
    assert_eq!(attached.len(), 2);
    assert_eq!(attached[0].message, "first");
}

#[test]
fn error_flag_tracks_the_maximum_severity() {
    let mut root = RootNode::new("x");
    let mut node = Node::leaf("x", "x").with_pos(0);
    root.add_error(&mut node, Error::new("e", 0, MANDATORY_CONTINUATION));
    assert_eq!(root.error_flag, MANDATORY_CONTINUATION);
    root.add_error(&mut node, Error::new("f", 0, RECURSION_DEPTH_LIMIT_HIT));
    assert_eq!(root.error_flag, RECURSION_DEPTH_LIMIT_HIT);
}

#[test]
fn errors_sorted_orders_by_position() {
    let mut root = RootNode::new("abcdef");
    let mut late = Node::leaf("b", "c").with_pos(4);
    let mut early = Node::leaf("a", "b").with_pos(1);
    root.add_error(&mut late, Error::new("late", 4, MANDATORY_CONTINUATION));
    root.add_error(&mut early, Error::new("early", 1, MANDATORY_CONTINUATION));
    let sorted = root.errors_sorted();
    assert_eq!(sorted[0].message, "early");
    assert_eq!(sorted[1].message, "late");
}

#[test]
fn display_splices_the_first_error_into_the_content() {
    let mut root = RootNode::new("3.");
    let mut node = Node::leaf("number", "3.").with_pos(0);
    root.add_error(&mut node, Error::new("digits expected", 2, MANDATORY_CONTINUATION));
    root.swallow(Some(node));
    let rendered = root.to_string();
    assert!(rendered.starts_with("3."));
    assert!(rendered.contains("<<< Error on \"\""));
    assert!(rendered.contains("digits expected"));
}
