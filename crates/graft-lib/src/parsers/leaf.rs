//! Leaf matchers: parsers that touch the document directly and contain no
//! sub-parsers.

use graft_core::error::{Error, CUSTOM_PARSER_FAILURE};
use graft_core::node::Node;

use crate::engine::Engine;
use crate::parsers::{ParserId, ParserKind};
use crate::recover::Step;

impl Engine<'_> {
    pub(crate) fn step_always(&mut self, id: ParserId, location: usize) -> Step {
        let p = self.g.parser(id);
        if p.node_name.starts_with(':') {
            Ok((Some(Node::empty()), location))
        } else {
            Ok((Some(Node::leaf(p.node_name.clone(), "")), location))
        }
    }

    pub(crate) fn step_any_char(&mut self, id: ParserId, location: usize) -> Step {
        let p = self.g.parser(id);
        match self.doc.rest(location).chars().next() {
            Some(ch) => {
                let end = location + ch.len_utf8();
                let node = Node::leaf(p.node_name.clone(), self.doc.slice(location, end));
                Ok((Some(node), end))
            }
            None => Ok((None, location)),
        }
    }

    pub(crate) fn step_text(&mut self, id: ParserId, location: usize) -> Step {
        let p = self.g.parser(id);
        let ParserKind::Text(text) = &p.kind else {
            unreachable!("step_text called for a non-text parser")
        };
        let end = location + text.len();
        if self.doc.slice(location, end) == &**text {
            if p.drop_content {
                return Ok((Some(Node::empty()), end));
            }
            Ok((Some(Node::leaf(p.node_name.clone(), &**text)), end))
        } else {
            Ok((None, location))
        }
    }

    pub(crate) fn step_ignore_case(&mut self, id: ParserId, location: usize) -> Step {
        let p = self.g.parser(id);
        let ParserKind::IgnoreCase { original, lowered } = &p.kind else {
            unreachable!("step_ignore_case called for the wrong parser")
        };
        let end = location + original.len();
        let candidate = self.doc.slice(location, end);
        if candidate.len() == original.len() && candidate.to_lowercase() == &**lowered {
            if p.drop_content {
                return Ok((Some(Node::empty()), end));
            }
            if !original.is_empty() || !p.disposable {
                return Ok((Some(Node::leaf(p.node_name.clone(), candidate)), end));
            }
            return Ok((Some(Node::empty()), location));
        }
        Ok((None, location))
    }

    pub(crate) fn step_regexp(&mut self, id: ParserId, location: usize) -> Step {
        let p = self.g.parser(id);
        let ParserKind::RegExp(pattern) = &p.kind else {
            unreachable!("step_regexp called for a non-regex parser")
        };
        match self.doc.match_at(&pattern.rx, location) {
            Some(end) => {
                if end > location || !p.disposable {
                    if p.drop_content {
                        return Ok((Some(Node::empty()), end));
                    }
                    let node = Node::leaf(p.node_name.clone(), self.doc.slice(location, end));
                    Ok((Some(node), end))
                } else {
                    Ok((Some(Node::empty()), location))
                }
            }
            None => Ok((None, location)),
        }
    }

    /// Like a regex parser, but a failed match becomes an empty success;
    /// insignificant whitespace never blocks its surroundings.
    pub(crate) fn step_whitespace(&mut self, id: ParserId, location: usize) -> Step {
        let p = self.g.parser(id);
        let ParserKind::Whitespace { pattern, keep_comments } = &p.kind else {
            unreachable!("step_whitespace called for the wrong parser")
        };
        match self.doc.match_at(&pattern.rx, location) {
            Some(end) if end > location || !p.disposable => {
                let capture = self.doc.slice(location, end);
                if p.drop_content {
                    if *keep_comments && !capture.trim_start().is_empty() {
                        let name = if p.node_name.starts_with(':') {
                            "comment__".into()
                        } else {
                            p.node_name.clone()
                        };
                        return Ok((Some(Node::leaf(name, capture)), end));
                    }
                    return Ok((Some(Node::empty()), end));
                }
                Ok((Some(Node::leaf(p.node_name.clone(), capture)), end))
            }
            _ => Ok((Some(Node::empty()), location)),
        }
    }

    /// One regex, one child per capture group. The pieces of the match
    /// that no group covers are dropped.
    pub(crate) fn step_smart_re(&mut self, id: ParserId, location: usize) -> Step {
        let g = self.g;
        let p = g.parser(id);
        let ParserKind::SmartRe { pattern, groups } = &p.kind else {
            unreachable!("step_smart_re called for the wrong parser")
        };
        let rest = self.doc.rest(location);
        let Some(caps) = pattern.rx.captures(rest) else {
            return Ok((None, location));
        };
        let whole = caps.get(0).expect("group 0 always exists");
        debug_assert_eq!(whole.start(), 0, "anchored pattern matched past its location");
        let end = location + whole.end();
        let any_content = (1..caps.len()).any(|i| caps.get(i).is_some_and(|m| !m.is_empty()));
        if p.disposable && !any_content {
            return Ok((Some(Node::empty()), end));
        }
        if p.drop_content {
            return Ok((Some(Node::empty()), end));
        }
        let mut results: Vec<Node> = Vec::new();
        for (i, spec) in groups.iter().enumerate() {
            let Some(m) = caps.get(i + 1) else { continue };
            if spec.disposable && m.is_empty() {
                continue;
            }
            let mut child = Node::leaf(spec.name.clone(), m.as_str());
            child.anchor_pos(location + m.start());
            results.push(child);
        }
        Ok((Some(self.reduce_values(id, results)), end))
    }

    pub(crate) fn step_custom(&mut self, id: ParserId, location: usize) -> Step {
        let g = self.g;
        let p = g.parser(id);
        let ParserKind::Custom(parse_fn) = &p.kind else {
            unreachable!("step_custom called for the wrong parser")
        };
        let node = match parse_fn(self.doc.rest(location)) {
            Ok(node) => node,
            Err(message) => {
                let mut node = Node::leaf(p.node_name.clone(), "").with_pos(location);
                let error = Error::new(
                    format!("Custom parser failed: {message}"),
                    location,
                    CUSTOM_PARSER_FAILURE,
                );
                self.tree.add_error(&mut node, error);
                Some(node)
            }
        };
        let Some(node) = node else {
            return Ok((None, location));
        };
        if node.is_empty_surrogate() {
            return Ok((Some(node), location));
        }
        // a name set by the custom function wins over the parser's own
        let save_name = if node.is_anonymous() {
            p.node_name.clone()
        } else {
            node.shared_name().clone()
        };
        let mut anonymized = node;
        anonymized.rename(":".into());
        let mut reduced = self.reduce_single(id, Some(anonymized));
        if !reduced.is_empty_surrogate() {
            reduced.rename(save_name);
        }
        let len = reduced.strlen();
        Ok((Some(reduced), location + len))
    }

    /// Pseudo-parser that consumes nothing and deposits a diagnostic at
    /// the current location.
    pub(crate) fn step_err(&mut self, id: ParserId, location: usize) -> Step {
        let g = self.g;
        let p = g.parser(id);
        let ParserKind::Err { template, code } = &p.kind else {
            unreachable!("step_err called for the wrong parser")
        };
        let before = format!("...{}", self.backward_excerpt(location, 10));
        let after = format!("{}...", self.excerpt(location, 10));
        let message = template
            .replace("{0}", &before)
            .replace("{1}", &after);
        let mut node = Node::zombie("").with_pos(location);
        self.tree
            .add_error(&mut node, Error::new(message, location, *code));
        Ok((Some(node), location))
    }

    /// Excerpt of the document just before `location`, newline-escaped.
    fn backward_excerpt(&self, location: usize, chars: usize) -> String {
        let before = self.doc.slice(0, location);
        let skip = before.chars().count().saturating_sub(chars);
        let mut out = String::new();
        for ch in before.chars().skip(skip) {
            if ch == '\n' {
                out.push_str("\\n");
            } else {
                out.push(ch);
            }
        }
        out
    }
}
