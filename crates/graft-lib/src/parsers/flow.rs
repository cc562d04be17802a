//! Flow-control parsers: zero-width assertions in both directions.

use graft_core::node::Node;

use crate::engine::Engine;
use crate::parsers::{BehindMatcher, ParserId, ParserKind};
use crate::recover::Step;

impl Engine<'_> {
    pub(crate) fn step_lookahead(&mut self, id: ParserId, location: usize) -> Step {
        let g = self.g;
        let p = g.parser(id);
        let ParserKind::Lookahead { inner, negative } = p.kind else {
            unreachable!("step_lookahead called for the wrong parser")
        };
        let (node, _) = self.apply(inner, location)?;
        let matched = self.flow_match(node.is_some(), negative);
        if location >= self.doc.len() {
            if matched {
                self.lookahead_matched_at_eof = true;
            } else {
                self.lookahead_failed_at_eof = true;
            }
        }
        if matched {
            if p.disposable {
                Ok((Some(Node::empty()), location))
            } else {
                Ok((Some(Node::leaf(p.node_name.clone(), "")), location))
            }
        } else {
            Ok((None, location))
        }
    }

    pub(crate) fn step_lookbehind(&mut self, id: ParserId, location: usize) -> Step {
        let g = self.g;
        let p = g.parser(id);
        let ParserKind::Lookbehind { matcher, negative } = &p.kind else {
            unreachable!("step_lookbehind called for the wrong parser")
        };
        // the text to the left, last character first
        let reversed: String = self.doc.slice(0, location).chars().rev().collect();
        let does_match = match matcher {
            BehindMatcher::Text(text) => reversed.starts_with(&**text),
            BehindMatcher::Pattern(pattern) => pattern
                .rx
                .find(&reversed)
                .is_some_and(|m| m.start() == 0),
        };
        if self.flow_match(does_match, *negative) {
            if p.drop_content {
                Ok((Some(Node::empty()), location))
            } else {
                Ok((Some(Node::leaf(p.node_name.clone(), "")), location))
            }
        } else {
            Ok((None, location))
        }
    }

    /// Applies the polarity of the assertion. A succeeding *negative*
    /// assertion inverts the farthest failure: the failure it relies on is
    /// expected and must not dominate the diagnostics.
    fn flow_match(&mut self, matched: bool, negative: bool) -> bool {
        if !negative {
            return matched;
        }
        if matched {
            false
        } else {
            self.ff_pos = -self.ff_pos;
            true
        }
    }
}
