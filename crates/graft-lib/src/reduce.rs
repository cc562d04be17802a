//! Tree reduction applied while parsing.
//!
//! Combined parsers run their results through one of these policies before
//! returning, so that the concrete syntax tree never materializes the
//! anonymous scaffolding that AST transformation would have to remove
//! again. Only anonymous (disposable) children are touched; named children
//! always survive.

use graft_core::node::{Node, NodeContent, TEXT_TAG};

use crate::parsers::Parser;

/// Reduction level of a grammar, applied by every combined parser.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Reduction {
    /// Keep the full derivation structure.
    None,
    /// Drop anonymous empty children, splice children of anonymous branch
    /// children into their parent.
    #[default]
    Flatten,
    /// Flatten; additionally collapse a parent whose children are all
    /// anonymous leaves into a single leaf.
    MergeTreetops,
    /// Flatten; additionally merge runs of adjacent anonymous leaves into
    /// single `:Text` leaves, keeping the position of the first of each
    /// run.
    MergeLeaves,
}

/// Wraps the single result of a delegating parser (`Option`, `Alternative`,
/// `Custom`, …) according to the parser's naming and the reduction level.
pub(crate) fn single(p: &Parser, level: Reduction, node: Option<Node>) -> Node {
    match level {
        Reduction::None => single_unreduced(p, node),
        _ => single_flatten(p, node),
    }
}

/// Combines the collected results of a sequencing parser (`Series`,
/// repetitions, `Interleave`, `SmartRe`) according to the reduction level.
pub(crate) fn values(p: &Parser, level: Reduction, results: Vec<Node>) -> Node {
    match level {
        Reduction::None => values_unreduced(p, results),
        Reduction::Flatten => values_flatten(p, results),
        Reduction::MergeTreetops => values_merge_treetops(p, results),
        Reduction::MergeLeaves => values_merge_leaves(p, results),
    }
}

fn single_unreduced(p: &Parser, node: Option<Node>) -> Node {
    if p.drop_content {
        return Node::empty();
    }
    match node {
        Some(node) if !(node.is_anonymous() && node.is_blank()) => {
            Node::branch(p.node_name.clone(), vec![node])
        }
        _ => {
            if p.disposable {
                Node::empty()
            } else {
                Node::branch(p.node_name.clone(), Vec::new())
            }
        }
    }
}

fn single_flatten(p: &Parser, node: Option<Node>) -> Node {
    match node {
        Some(node) => {
            if p.disposable {
                if p.drop_content {
                    Node::empty()
                } else {
                    node
                }
            } else if node.is_anonymous() {
                // adopt the anonymous child's result directly
                Node::from_content(p.node_name.clone(), node.into_content())
            } else {
                Node::branch(p.node_name.clone(), vec![node])
            }
        }
        None => {
            if p.disposable {
                Node::empty()
            } else {
                Node::leaf(p.node_name.clone(), "")
            }
        }
    }
}

fn values_unreduced(p: &Parser, results: Vec<Node>) -> Node {
    if p.drop_content || (p.disposable && results.is_empty()) {
        return Node::empty();
    }
    Node::branch(p.node_name.clone(), results)
}

fn values_flatten(p: &Parser, mut results: Vec<Node>) -> Node {
    if p.drop_content {
        return Node::empty();
    }
    match results.len() {
        0 => empty_result(p),
        1 => single_flatten(p, results.pop()),
        _ => {
            let flat = flatten_children(results);
            if !flat.is_empty() || !p.disposable {
                Node::branch(p.node_name.clone(), flat)
            } else {
                Node::empty()
            }
        }
    }
}

fn values_merge_treetops(p: &Parser, mut results: Vec<Node>) -> Node {
    if p.drop_content {
        return Node::empty();
    }
    match results.len() {
        0 => empty_result(p),
        1 => single_flatten(p, results.pop()),
        _ => {
            let mut flat: Vec<Node> = Vec::with_capacity(results.len());
            let mut mergeable = true;
            for child in results {
                if child.is_anonymous() {
                    if !child.children().is_empty() {
                        for grandchild in child.into_children() {
                            if !grandchild.is_leaf() || !grandchild.is_anonymous() {
                                mergeable = false;
                            }
                            flat.push(grandchild);
                        }
                    } else if !child.is_blank() {
                        flat.push(child);
                    }
                } else {
                    mergeable = false;
                    flat.push(child);
                }
            }
            if flat.is_empty() {
                return empty_result(p);
            }
            if mergeable {
                let text: String = flat
                    .iter()
                    .map(|n| n.leaf_text().unwrap_or_default())
                    .collect();
                if !text.is_empty() || !p.disposable {
                    Node::leaf(p.node_name.clone(), text)
                } else {
                    Node::empty()
                }
            } else {
                Node::branch(p.node_name.clone(), flat)
            }
        }
    }
}

fn values_merge_leaves(p: &Parser, mut results: Vec<Node>) -> Node {
    if p.drop_content {
        return Node::empty();
    }
    match results.len() {
        0 => empty_result(p),
        1 => single_flatten(p, results.pop()),
        _ => {
            let flat = flatten_children(results);
            if flat.is_empty() {
                return empty_result(p);
            }
            let mut merged: Vec<Node> = Vec::with_capacity(flat.len());
            let mut run: Vec<Node> = Vec::new();
            for node in flat {
                if node.is_leaf() && node.is_anonymous() {
                    run.push(node);
                } else {
                    flush_run(&mut merged, &mut run);
                    merged.push(node);
                }
            }
            let run_closed_the_tail = !run.is_empty();
            flush_run(&mut merged, &mut run);
            if merged.len() > 1 {
                Node::branch(p.node_name.clone(), merged)
            } else if run_closed_the_tail {
                // a single surviving leaf run collapses into the parent
                let survivor = merged.pop().expect("non-empty by construction");
                if !survivor.is_blank() || !p.disposable {
                    Node::from_content(p.node_name.clone(), survivor.into_content())
                } else {
                    Node::empty()
                }
            } else {
                Node::branch(p.node_name.clone(), merged)
            }
        }
    }
}

/// Merges a pending run of adjacent anonymous leaves into a single `:Text`
/// leaf positioned at the first of the run. Runs of length one pass
/// through untouched.
fn flush_run(merged: &mut Vec<Node>, run: &mut Vec<Node>) {
    match run.len() {
        0 => {}
        1 => merged.push(run.pop().expect("length checked")),
        _ => {
            let pos = run[0].pos();
            let text: String = run
                .drain(..)
                .map(|n| match n.into_content() {
                    NodeContent::Leaf(s) => s.into_string(),
                    NodeContent::Children(_) => String::new(),
                })
                .collect();
            let mut node = Node::leaf(TEXT_TAG, text);
            if let Some(pos) = pos {
                node.assign_pos(pos);
            }
            merged.push(node);
        }
    }
}

fn flatten_children(results: Vec<Node>) -> Vec<Node> {
    let mut flat = Vec::with_capacity(results.len());
    for child in results {
        let anonymous = child.is_anonymous();
        if anonymous && !child.children().is_empty() {
            flat.extend(child.into_children());
        } else if !child.is_blank() || !anonymous {
            flat.push(child);
        }
    }
    flat
}

fn empty_result(p: &Parser) -> Node {
    if p.disposable {
        Node::empty()
    } else {
        Node::leaf(p.node_name.clone(), "")
    }
}
