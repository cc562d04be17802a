//! Sequencing, choice, repetition and the mandatory-element machinery of
//! `Series` and `Interleave`.

use graft_core::node::Node;

use crate::engine::{worth_keeping, Engine};
use crate::parsers::{ParserId, ParserKind};
use crate::recover::{ParserError, Step};

impl Engine<'_> {
    pub(crate) fn step_option(&mut self, id: ParserId, location: usize) -> Step {
        let g = self.g;
        let ParserKind::Option(inner) = g.parser(id).kind else {
            unreachable!("step_option called for the wrong parser")
        };
        let (node, next) = self.apply(inner, location)?;
        Ok((Some(self.reduce_single(id, node)), next))
    }

    pub(crate) fn step_zero_or_more(&mut self, id: ParserId, location: usize) -> Step {
        let g = self.g;
        let ParserKind::ZeroOrMore(inner) = g.parser(id).kind else {
            unreachable!("step_zero_or_more called for the wrong parser")
        };
        let mut results: Vec<Node> = Vec::new();
        let mut loc = location;
        loop {
            let mark = loc;
            let (node, next) = self.apply(inner, loc)?;
            loc = next;
            let Some(node) = node else { break };
            let stalled = loc <= mark;
            if worth_keeping(&node) {
                results.push(node);
                if stalled {
                    let anchor = results.last().cloned();
                    self.infinite_loop_warning(id, anchor.as_ref(), loc);
                    break;
                }
            } else if stalled {
                self.infinite_loop_warning(id, None, loc);
                break;
            }
        }
        Ok((Some(self.reduce_values(id, results)), loc))
    }

    pub(crate) fn step_one_or_more(&mut self, id: ParserId, location: usize) -> Step {
        let g = self.g;
        let ParserKind::OneOrMore(inner) = g.parser(id).kind else {
            unreachable!("step_one_or_more called for the wrong parser")
        };
        let mut results: Vec<Node> = Vec::new();
        let mut matched = false;
        let mut loc = location;
        loop {
            let mark = loc;
            let (node, next) = self.apply(inner, loc)?;
            loc = next;
            let Some(node) = node else { break };
            matched = true;
            let stalled = loc <= mark;
            if worth_keeping(&node) {
                results.push(node);
            }
            if stalled {
                self.infinite_loop_warning(id, results.last(), loc);
                break;
            }
        }
        if !matched {
            return Ok((None, loc));
        }
        Ok((Some(self.reduce_values(id, results)), loc))
    }

    pub(crate) fn step_counted(&mut self, id: ParserId, location: usize) -> Step {
        let g = self.g;
        let ParserKind::Counted { inner, bounds: (lo, hi) } = g.parser(id).kind else {
            unreachable!("step_counted called for the wrong parser")
        };
        let mut results: Vec<Node> = Vec::new();
        let mut loc = location;
        let mut mark = location;
        for _ in 0..lo {
            let (node, next) = self.apply(inner, loc)?;
            loc = next;
            let Some(node) = node else {
                return Ok((None, location));
            };
            if worth_keeping(&node) {
                results.push(node);
            }
            if loc <= mark {
                self.infinite_loop_warning(id, results.last(), loc);
                break;
            }
            mark = loc;
        }
        for _ in 0..hi.saturating_sub(lo) {
            let (node, next) = self.apply(inner, loc)?;
            loc = next;
            let Some(node) = node else { break };
            if worth_keeping(&node) {
                results.push(node);
            }
            if loc <= mark {
                self.infinite_loop_warning(id, results.last(), loc);
                break;
            }
            mark = loc;
        }
        Ok((Some(self.reduce_values(id, results)), loc))
    }

    pub(crate) fn step_alternative(&mut self, id: ParserId, location: usize) -> Step {
        let g = self.g;
        let ParserKind::Alternative(items) = &g.parser(id).kind else {
            unreachable!("step_alternative called for the wrong parser")
        };
        for &sub in items {
            let (node, next) = self.apply(sub, location)?;
            if let Some(node) = node {
                return Ok((Some(self.reduce_single(id, Some(node))), next));
            }
        }
        Ok((None, location))
    }

    /// Matches the contained parsers strictly in order. Failures before the
    /// mandatory index are plain non-matches; from the mandatory index on
    /// they are violations that report an error, try to skip to a reentry
    /// point, and as a last resort travel outward as a `ParserError`.
    pub(crate) fn step_series(&mut self, id: ParserId, location: usize) -> Step {
        let g = self.g;
        let ParserKind::Series { items, mandatory } = &g.parser(id).kind else {
            unreachable!("step_series called for the wrong parser")
        };
        let mut results: Vec<Node> = Vec::new();
        let mut loc = location;
        let mut error = None;
        let mut reloc: isize = -1;
        for (pos, &sub) in items.iter().enumerate() {
            let (mut node, next) = self.apply(sub, loc)?;
            loc = next;
            if node.is_none() {
                if pos < *mandatory {
                    return Ok((None, location));
                }
                let expected = self.describe_expectation(sub);
                let (r, mut err_node) = self.mandatory_reentry(id, loc);
                reloc = r;
                let lookahead = g.parser(sub).is_lookahead_like();
                let (err, new_loc) =
                    self.mandatory_violation(id, loc, lookahead, &expected, reloc, &mut err_node);
                error = Some(err);
                loc = new_loc;
                if reloc >= 0 {
                    // skip found: retry the failed element at the reentry
                    // point and keep the skipped region as an artifact
                    let (retried, next) = self.apply(sub, loc)?;
                    loc = next;
                    match retried {
                        Some(retried) => {
                            results.push(err_node);
                            node = Some(retried);
                        }
                        None => node = Some(err_node),
                    }
                } else {
                    results.push(err_node);
                    break;
                }
            }
            if let Some(node) = node {
                if worth_keeping(&node) {
                    results.push(node);
                }
            }
        }
        let ret = self.reduce_values(id, results);
        if let Some(error) = error {
            if reloc < 0 {
                let node = self.error_carrier(ret, loc);
                return Err(Box::new(ParserError {
                    origin: id,
                    node,
                    node_orig_len: loc - location,
                    location,
                    error,
                    first_throw: true,
                    callstack_snapshot: self.callstack_snapshot(),
                }));
            }
        }
        Ok((Some(ret), loc))
    }

    /// Matches the contained parsers in any order, each within its
    /// repetition bounds. Violations follow the same error path as
    /// `Series`.
    pub(crate) fn step_interleave(&mut self, id: ParserId, location: usize) -> Step {
        let g = self.g;
        let ParserKind::Interleave { items, reps, mandatory } = &g.parser(id).kind else {
            unreachable!("step_interleave called for the wrong parser")
        };
        let mut results: Vec<Node> = Vec::new();
        let mut loc = location;
        let mut counter = vec![0usize; items.len()];
        let mut saturated = vec![false; items.len()];
        let mut error = None;
        let mut reloc: isize = -1;
        let mut last_node: Option<Node> = None;
        loop {
            // probing order is an implementation detail, not a promise
            let mut next_loc = loc;
            let mut progressed = false;
            for (i, &sub) in items.iter().enumerate() {
                if saturated[i] {
                    continue;
                }
                let (node, next) = self.apply(sub, loc)?;
                if let Some(node) = node {
                    progressed = true;
                    next_loc = next;
                    if worth_keeping(&node) {
                        results.push(node.clone());
                    }
                    last_node = Some(node);
                    counter[i] += 1;
                    if counter[i] >= reps[i].1 {
                        saturated[i] = true;
                    }
                    break;
                }
            }
            if !progressed {
                for (i, _) in items.iter().enumerate() {
                    if counter[i] >= reps[i].0 {
                        saturated[i] = true;
                    }
                }
                let optional_part_done =
                    (0..items.len().min(*mandatory)).all(|i| saturated[i]);
                if !optional_part_done {
                    return Ok((None, location));
                }
                if saturated.iter().all(|&s| s) {
                    break;
                }
                let (r, mut err_node) = self.mandatory_reentry(id, loc);
                reloc = r;
                let expected = items
                    .iter()
                    .map(|&sub| self.describe_expectation(sub))
                    .collect::<Vec<_>>()
                    .join(" ° ");
                let (err, new_loc) =
                    self.mandatory_violation(id, loc, false, &expected, reloc, &mut err_node);
                error = Some(err);
                results.push(err_node);
                next_loc = new_loc;
                if reloc < 0 {
                    break;
                }
            }
            if next_loc <= loc {
                self.infinite_loop_warning(id, last_node.as_ref(), location);
                break;
            }
            loc = next_loc;
        }
        let ret = self.reduce_values(id, results);
        if let Some(error) = error {
            if reloc < 0 {
                let node = self.error_carrier(ret, location);
                return Err(Box::new(ParserError {
                    origin: id,
                    node,
                    node_orig_len: loc - location,
                    location,
                    error,
                    first_throw: true,
                    callstack_snapshot: self.callstack_snapshot(),
                }));
            }
        }
        Ok((Some(ret), loc))
    }

    /// Calls another parser and wraps its result in a new named node, so
    /// that plain synonym definitions (`jahr = JAHRESZAHL`) keep both
    /// names apart.
    pub(crate) fn step_synonym(&mut self, id: ParserId, location: usize) -> Step {
        let g = self.g;
        let p = g.parser(id);
        let ParserKind::Synonym(inner) = p.kind else {
            unreachable!("step_synonym called for the wrong parser")
        };
        let (node, next) = self.apply(inner, location)?;
        let Some(node) = node else {
            return Ok((None, next));
        };
        if p.drop_content {
            return Ok((Some(Node::empty()), next));
        }
        if !p.disposable {
            if node.is_empty_surrogate() {
                return Ok((Some(Node::leaf(p.node_name.clone(), "")), next));
            }
            if node.is_anonymous() {
                // eliminate the anonymous child on the fly
                let mut node = node;
                node.rename(p.node_name.clone());
                return Ok((Some(node), next));
            }
            return Ok((Some(Node::branch(p.node_name.clone(), vec![node])), next));
        }
        Ok((Some(node), next))
    }

    /// Wraps a series/interleave result so it can travel inside a
    /// `ParserError`; the shared empty surrogate must never leave the
    /// engine inside an error.
    fn error_carrier(&self, ret: Node, pos: usize) -> Node {
        if ret.is_empty_surrogate() {
            Node::zombie("").with_pos(pos)
        } else if ret.pos().is_some() {
            ret
        } else {
            ret.with_pos(pos)
        }
    }

    pub(crate) fn callstack_snapshot(&self) -> Vec<crate::trace::CallItem> {
        if self.history_tracking {
            self.call_stack.clone()
        } else {
            Vec::new()
        }
    }

    /// How a failed mandatory element is described in error messages:
    /// literal text in guillemets, other parsers by name or structure.
    pub(crate) fn describe_expectation(&self, id: ParserId) -> String {
        let g = self.g;
        let p = g.parser(id);
        match &p.kind {
            ParserKind::Text(text) if p.name.is_empty() => format!("»{text}«"),
            _ if !p.name.is_empty() => p.name.clone(),
            _ => g.display(id),
        }
    }
}
