use crate::node::{is_artifact_name, Node};

fn sample_tree() -> Node {
    Node::branch(
        "sum",
        vec![
            Node::leaf("num", "9"),
            Node::leaf(":Text", "+"),
            Node::leaf("num", "8"),
        ],
    )
}

#[test]
fn leaf_and_branch_content() {
    let leaf = Node::leaf("word", "abc");
    assert!(leaf.is_leaf());
    assert_eq!(leaf.content(), "abc");
    assert_eq!(leaf.strlen(), 3);

    let tree = sample_tree();
    assert!(!tree.is_leaf());
    assert_eq!(tree.content(), "9+8");
    assert_eq!(tree.children().len(), 3);
}

#[test]
fn anonymity_follows_the_colon_convention() {
    assert!(Node::leaf(":Series", "").is_anonymous());
    assert!(!Node::leaf("expression", "").is_anonymous());
    assert!(Node::empty().is_anonymous());
}

#[test]
fn empty_surrogate_is_blank_and_anonymous() {
    let empty = Node::empty();
    assert!(empty.is_empty_surrogate());
    assert!(empty.pos().is_none());
    assert_eq!(empty.content(), "");
}

#[test]
fn with_pos_initializes_descendants_from_sibling_lengths() {
    let tree = sample_tree().with_pos(10);
    assert_eq!(tree.pos(), Some(10));
    let kids = tree.children();
    assert_eq!(kids[0].pos(), Some(10));
    assert_eq!(kids[1].pos(), Some(11));
    assert_eq!(kids[2].pos(), Some(12));
}

#[test]
fn with_pos_skips_children_that_already_have_positions() {
    let positioned = Node::leaf("num", "8").with_pos(11);
    let tree = Node::branch(
        "sum",
        vec![Node::leaf("num", "9"), Node::leaf(":Text", "+"), positioned],
    );
    // the pre-positioned child keeps its offset; later offsets continue
    // from it
    let tree = tree.with_pos(9);
    assert_eq!(tree.children()[2].pos(), Some(11));
}

#[test]
fn assigning_the_same_position_twice_is_a_no_op() {
    let node = Node::leaf("a", "x").with_pos(3).with_pos(3);
    assert_eq!(node.pos(), Some(3));
}

#[test]
#[should_panic(expected = "cannot be reassigned")]
fn reassigning_a_position_panics() {
    let _ = Node::leaf("a", "x").with_pos(3).with_pos(4);
}

#[test]
fn equality_ignores_positions_and_attribute_order() {
    let a = sample_tree().with_pos(0);
    let b = sample_tree();
    assert_eq!(a, b);

    let x = Node::leaf("n", "v").with_attr("a", "1").with_attr("b", "2");
    let y = Node::leaf("n", "v").with_attr("b", "2").with_attr("a", "1");
    assert_eq!(x, y);

    let z = Node::leaf("n", "v").with_attr("a", "1");
    assert_ne!(x, z);
}

#[test]
fn attributes_are_created_lazily_and_keep_order() {
    let mut node = Node::leaf("tag", "");
    assert!(!node.has_attrs());
    node.set_attr("first", "1");
    node.set_attr("second", "2");
    let keys: Vec<&str> = node.attrs().map(|(k, _)| k).collect();
    assert_eq!(keys, vec!["first", "second"]);
    assert_eq!(node.attr("second"), Some("2"));
}

#[test]
fn push_child_promotes_an_empty_leaf() {
    let mut node = Node::leaf("wrap", "");
    node.push_child(Node::leaf("inner", "x"));
    assert_eq!(node.children().len(), 1);
    assert_eq!(node.content(), "x");
}

#[test]
#[should_panic(expected = "non-empty leaf")]
fn push_child_on_a_filled_leaf_panics() {
    let mut node = Node::leaf("word", "abc");
    node.push_child(Node::leaf("inner", "x"));
}

#[test]
fn navigation_picks_in_document_order() {
    let tree = sample_tree();
    let first_num = tree.pick(|n| n.name() == "num", false).unwrap();
    assert_eq!(first_num.content(), "9");
    let last_num = tree.pick_child(|n| n.name() == "num", true).unwrap();
    assert_eq!(last_num.content(), "8");
    assert_eq!(tree.select(|n| n.name() == "num").len(), 2);
}

#[test]
fn last_leaf_descends_the_right_spine() {
    let tree = Node::branch(
        "a",
        vec![Node::leaf("x", "1"), Node::branch("b", vec![Node::leaf("y", "2")])],
    );
    assert_eq!(tree.last_leaf().content(), "2");
}

#[test]
fn artifact_names() {
    assert!(is_artifact_name("ZOMBIE__"));
    assert!(is_artifact_name("alpha_skip_R1__"));
    assert!(is_artifact_name("beta_resume_R2__"));
    assert!(!is_artifact_name("alpha"));
    assert!(!is_artifact_name("resume"));
}
