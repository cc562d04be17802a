use crate::node::Node;
use crate::serialize::parse_sxpr;

fn number_tree() -> Node {
    Node::branch(
        "number",
        vec![Node::leaf(":RegExp", "3"), Node::leaf("fraction", ".1415")],
    )
}

#[test]
fn sxpr_rendering() {
    assert_eq!(Node::leaf("number", "25").as_sxpr(), r#"(number "25")"#);
    assert_eq!(
        number_tree().as_sxpr(),
        r#"(number (:RegExp "3") (fraction ".1415"))"#
    );
    assert_eq!(Node::leaf(":EMPTY", "").as_sxpr(), "(:EMPTY)");
}

#[test]
fn sxpr_escapes_quotes_and_newlines() {
    let node = Node::leaf("s", "a\"b\nc");
    assert_eq!(node.as_sxpr(), "(s \"a\\\"b\\nc\")");
}

#[test]
fn sxpr_renders_attributes() {
    let node = Node::leaf("word", "hi").with_attr("lang", "en");
    assert_eq!(node.as_sxpr(), r#"(word `(lang "en") "hi")"#);
}

#[test]
fn sxpr_round_trip() {
    let tree = Node::branch(
        "doc",
        vec![
            Node::leaf("word", "hello").with_attr("lang", "en"),
            Node::branch("tail", vec![Node::leaf(":Text", "!")]),
        ],
    );
    let parsed = parse_sxpr(&tree.as_sxpr()).unwrap();
    assert_eq!(parsed, tree);
}

#[test]
fn sxpr_round_trip_indented() {
    let tree = Node::branch(
        "doc",
        vec![
            Node::leaf("first", "a fairly long stretch of text"),
            Node::leaf("second", "another fairly long stretch of text"),
        ],
    );
    let rendered = tree.as_sxpr_indented();
    assert!(rendered.contains('\n'));
    assert_eq!(parse_sxpr(&rendered).unwrap(), tree);
}

#[test]
fn parse_sxpr_rejects_garbage() {
    assert!(parse_sxpr("(unclosed").is_err());
    assert!(parse_sxpr("(a \"x\") trailing").is_err());
    assert!(parse_sxpr("(a \"x\" (b))").is_err());
}

#[test]
fn xml_rendering() {
    let node = Node::branch(
        "doc",
        vec![
            Node::leaf("word", "a<b").with_attr("lang", "en"),
            Node::leaf(":Text", ""),
        ],
    );
    assert_eq!(
        node.as_xml(),
        r#"<doc><word lang="en">a&lt;b</word><anonymous:Text/></doc>"#
    );
}

#[test]
fn json_rendering() {
    let node = number_tree().with_pos(0);
    assert_eq!(
        node.to_json(),
        r#"["number",[[":RegExp","3",0],["fraction",".1415",1]],0]"#
    );
}
