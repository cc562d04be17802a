//! Context-sensitive parsers: variable capture and retrieval.
//!
//! These parsers read or write the engine's variable stacks, which makes
//! their results dependent on state outside the (parser, location) pair.
//! Every operation deposits a rollback entry; depositing also raises the
//! memoization-suspension flag, so no enclosing parser caches a result
//! that was computed against mutable variable state.

use graft_core::error::{Error, UNDEFINED_RETRIEVE};
use graft_core::node::Node;

use crate::engine::{Engine, RollbackOp};
use crate::parsers::{ParserId, ParserKind};
use crate::recover::Step;

impl Engine<'_> {
    /// Applies the contained parser and, on success, pushes its matched
    /// text onto the variable stack named after this parser.
    pub(crate) fn step_capture(&mut self, id: ParserId, location: usize) -> Step {
        let g = self.g;
        let p = g.parser(id);
        let ParserKind::Capture { inner, .. } = p.kind else {
            unreachable!("step_capture called for the wrong parser")
        };
        let (node, next) = self.apply(inner, location)?;
        let Some(node) = node else {
            return Ok((None, location));
        };
        debug_assert!(!p.name.is_empty(), "captures without a name are rejected at construction");
        debug_assert!(
            !g.parser(inner).drop_content,
            "captures around content-dropping parsers are rejected at construction"
        );
        self.variables
            .entry(p.name.clone())
            .or_default()
            .push(node.content());
        let rollback_loc = self.rollback_location(location, next);
        self.push_rollback(rollback_loc, RollbackOp::PopVar(p.name.clone()));
        Ok((Some(self.reduce_single(id, Some(node))), next))
    }

    /// Matches if the upcoming text is derivable from the top of the
    /// watched variable's stack; does not pop. An empty stack triggers
    /// auto-capture: the watched capture parser is run at the current
    /// location first.
    pub(crate) fn step_retrieve(&mut self, id: ParserId, location: usize) -> Step {
        let g = self.g;
        let ParserKind::Retrieve { symbol, .. } = g.parser(id).kind else {
            unreachable!("step_retrieve called for the wrong parser")
        };
        let symbol_name = g.capture_symbol_name(symbol).to_string();
        if self
            .variables
            .get(&symbol_name)
            .is_none_or(|stack| stack.is_empty())
        {
            let (node, next) = self.apply(symbol, location)?;
            if node.is_none() {
                let rollback_loc = self.rollback_location(location, next);
                self.push_rollback(rollback_loc, RollbackOp::Nothing);
                return Ok((None, next));
            }
        }
        let (node, next) = self.retrieve_and_match(id, &symbol_name, location);
        let rollback_loc = self.rollback_location(location, next);
        self.push_rollback(rollback_loc, RollbackOp::Nothing);
        Ok((node, next))
    }

    /// Like retrieve, but a successful match pops the stack; the rollback
    /// entry puts the value back.
    pub(crate) fn step_pop(&mut self, id: ParserId, location: usize) -> Step {
        let g = self.g;
        let ParserKind::Pop { symbol, .. } = g.parser(id).kind else {
            unreachable!("step_pop called for the wrong parser")
        };
        let symbol_name = g.capture_symbol_name(symbol).to_string();
        let (node, next) = self.retrieve_and_match(id, &symbol_name, location);
        let rollback_loc = self.rollback_location(location, next);
        let clean_match = node.as_ref().is_some_and(|n| n.error_handle().is_none());
        if clean_match {
            let value = self
                .variables
                .get_mut(&symbol_name)
                .and_then(Vec::pop)
                .unwrap_or_default();
            self.push_rollback(rollback_loc, RollbackOp::PushVar(symbol_name, value));
        } else {
            self.push_rollback(rollback_loc, RollbackOp::Nothing);
        }
        Ok((node, next))
    }

    fn retrieve_and_match(
        &mut self,
        id: ParserId,
        symbol_name: &str,
        location: usize,
    ) -> (Option<Node>, usize) {
        let g = self.g;
        let p = g.parser(id);
        let policy = match &p.kind {
            ParserKind::Retrieve { policy, .. } | ParserKind::Pop { policy, .. } => policy,
            _ => unreachable!("retrieve_and_match called for the wrong parser"),
        };
        let node_name = if p.disposable || p.node_name.starts_with(':') {
            g.symbol_node_name(symbol_name)
        } else {
            p.node_name.clone()
        };
        let stack = self.variables.get(symbol_name);
        if stack.is_none_or(|s| s.is_empty()) {
            if policy.is_optional() {
                return (None, location);
            }
            let mut node = Node::leaf(node_name, "").with_pos(location);
            let error = Error::new(
                format!("'{symbol_name}' undefined or exhausted."),
                location,
                UNDEFINED_RETRIEVE,
            );
            self.tree.add_error(&mut node, error);
            return (Some(node), location);
        }
        let rest = self.doc.rest(location);
        let stack = stack.expect("emptiness checked above");
        match policy.apply(rest, stack) {
            None => (None, location),
            Some(value) => {
                let next = location + value.len();
                if p.drop_content {
                    (Some(Node::empty()), next)
                } else {
                    (Some(Node::leaf(node_name, value)), next)
                }
            }
        }
    }
}
