//! The per-parse execution state and the uniform parser entry.
//!
//! A [`Grammar`](crate::grammar::Grammar) is immutable once constructed;
//! everything that changes during a parse lives here: the packrat memo
//! tables, the variable stacks with their rollback log, the farthest-fail
//! tracker, the memoization-suspension flag, the recursion counters of the
//! left-recursion algorithm, and the optional history log. One `Engine`
//! drives one parse of one document and is discarded afterwards.

use fxhash::FxHashMap;
use indexmap::IndexMap;

use graft_core::error::{
    Error, CAPTURE_STACK_NOT_EMPTY, CAPTURE_STACK_NOT_EMPTY_WARNING, INFINITE_LOOP_WARNING,
    PARSER_LOOKAHEAD_FAILURE_ONLY, PARSER_LOOKAHEAD_MATCH_ONLY, PARSER_STOPPED_BEFORE_END,
    PARSER_STOPPED_ON_RETRY, RECURSION_DEPTH_LIMIT_HIT,
};
use graft_core::node::{Node, ZOMBIE_TAG};
use graft_core::root::RootNode;
use graft_core::source::SourceText;

use crate::grammar::{Grammar, ParseOptions};
use crate::parsers::{MemoPolicy, ParserId, ParserKind};
use crate::recover::Step;
use crate::reduce;
use crate::trace::{CallItem, HistoryRecord, HistoryStatus};

pub(crate) type MemoEntry = (Option<Node>, usize);

/// Undo entry for a variable-changing operation.
#[derive(Debug, Clone)]
pub(crate) enum RollbackOp {
    /// Undo a capture: remove the value it pushed.
    PopVar(String),
    /// Undo a pop: put the removed value back.
    PushVar(String, String),
    /// Changes nothing; deposited to block memoization of retrievals.
    Nothing,
}

pub(crate) struct Engine<'g> {
    pub g: &'g Grammar,
    pub doc: SourceText,
    pub start: ParserId,
    /// Per-parser memo tables, indexed by parser id.
    memo: Vec<FxHashMap<usize, MemoEntry>>,
    /// Left-recursion depth permits, keyed by (forward parser, location).
    recursion_counter: FxHashMap<(ParserId, usize), usize>,
    /// Variable stacks of the context-sensitive parsers.
    pub variables: IndexMap<String, Vec<String>>,
    /// Rollback log; locations are `start` or `start - 1` for zero-length
    /// captures, hence signed.
    rollback: Vec<(isize, RollbackOp)>,
    last_rb_loc: isize,
    pub suspend_memoization: bool,
    /// Farthest failure; negated by negative lookahead so that an expected
    /// failure does not dominate the diagnostics.
    pub ff_pos: isize,
    pub ff_parser: Option<ParserId>,
    pub tree: RootNode,
    depth: usize,
    pub history: Vec<HistoryRecord>,
    pub call_stack: Vec<CallItem>,
    pub history_tracking: bool,
    pub resume_notices: bool,
    /// Set when a lookahead succeeded at the end of the document; used to
    /// classify incomplete matches.
    pub lookahead_matched_at_eof: bool,
    /// Set when the decisive failure was a lookahead at the end of the
    /// document.
    pub lookahead_failed_at_eof: bool,
}

impl<'g> Engine<'g> {
    pub fn new(g: &'g Grammar, doc: SourceText, start: ParserId, opts: &ParseOptions) -> Self {
        let tree = RootNode::new(doc.as_str());
        let mut engine = Engine {
            g,
            doc,
            start,
            memo: vec![FxHashMap::default(); g.parser_count()],
            recursion_counter: FxHashMap::default(),
            variables: IndexMap::new(),
            rollback: Vec::new(),
            last_rb_loc: -2,
            suspend_memoization: false,
            ff_pos: -1,
            ff_parser: None,
            tree,
            depth: 0,
            history: Vec::new(),
            call_stack: Vec::new(),
            history_tracking: opts.history_tracking,
            resume_notices: opts.resume_notices,
            lookahead_matched_at_eof: false,
            lookahead_failed_at_eof: false,
        };
        engine
            .tree
            .set_source_mapping(opts.source_mapping.clone());
        engine
    }

    /// The uniform public entry of every parser (the "parser guard").
    ///
    /// Rolls back variable changes when moving backwards over their deposit
    /// locations, consults the memo table, dispatches to the shape-specific
    /// step, tracks the farthest failure, anchors result positions, and
    /// writes the memo entry unless memoization is suspended.
    pub(crate) fn apply(&mut self, id: ParserId, location: usize) -> Step {
        if location as isize <= self.last_rb_loc {
            self.rollback_to(location);
        }
        let g = self.g;
        let p = g.parser(id);
        if matches!(p.kind, ParserKind::Forward(_)) {
            return self.apply_forward(id, location);
        }
        let policy = p.memo_policy();
        if policy != MemoPolicy::Never {
            if let Some((node, next)) = self.memo[id.index()].get(&location) {
                let (node, next) = (node.clone(), *next);
                self.record_recall(id, location, &node, next);
                return Ok((node, next));
            }
        }
        let saved_suspend = if policy == MemoPolicy::Full {
            let saved = self.suspend_memoization;
            self.suspend_memoization = false;
            Some(saved)
        } else {
            None
        };

        if self.depth >= self.g.recursion_limit() {
            return Ok(self.recursion_exhausted(location));
        }
        self.depth += 1;
        if self.history_tracking {
            self.call_stack.push(CallItem {
                name: p.node_name.clone(),
                location,
            });
        }

        let stepped = self.step(id, location);
        let outcome = match stepped {
            Ok(pair) => Ok(pair),
            Err(pe) => self.recover(id, *pe, location),
        };
        self.depth -= 1;

        let (mut node, next_location) = match outcome {
            Ok(pair) => pair,
            Err(pe) => {
                if self.history_tracking {
                    self.record(location, HistoryStatus::Error, &None, location);
                    self.call_stack.pop();
                }
                return Err(pe);
            }
        };
        if self.history_tracking {
            let status = match &node {
                None => HistoryStatus::Fail,
                Some(n) if n.is_empty_surrogate() => HistoryStatus::Drop,
                Some(_) => HistoryStatus::Match,
            };
            self.record(location, status, &node, next_location);
            self.call_stack.pop();
        }

        match node.as_mut() {
            None => {
                if location as isize > self.ff_pos {
                    self.ff_pos = location as isize;
                    self.ff_parser = Some(id);
                }
            }
            Some(n) => {
                if !n.is_empty_surrogate() {
                    n.anchor_pos(location);
                }
            }
        }

        match policy {
            MemoPolicy::Full => {
                if !self.suspend_memoization {
                    self.memo[id.index()].insert(location, (node.clone(), next_location));
                    self.suspend_memoization = saved_suspend.unwrap_or(false);
                }
            }
            MemoPolicy::Leaf => {
                self.memo[id.index()].insert(location, (node.clone(), next_location));
            }
            MemoPolicy::Never => {}
        }
        Ok((node, next_location))
    }

    /// Entry of `Forward` parsers: plain delegation plus the seed-and-grow
    /// resolution of left recursion.
    fn apply_forward(&mut self, id: ParserId, location: usize) -> Step {
        let g = self.g;
        let referent = match g.parser(id).kind {
            ParserKind::Forward(Some(referent)) => referent,
            ParserKind::Forward(None) => {
                unreachable!("grammar construction rejects unbound forward parsers")
            }
            _ => unreachable!("apply_forward is only called for forward parsers"),
        };
        if !g.left_recursion() {
            return self.apply(referent, location);
        }
        if location as isize <= self.last_rb_loc {
            self.rollback_to(location);
        }
        if let Some((node, next)) = self.memo[id.index()].get(&location) {
            let (node, next) = (node.clone(), *next);
            self.record_recall(id, location, &node, next);
            return Ok((node, next));
        }
        if let Some(&depth) = self.recursion_counter.get(&(id, location)) {
            if depth == 0 {
                // seed: fail the re-entrant call, the outer iteration grows
                self.suspend_memoization = true;
                return Ok((None, location));
            }
            self.recursion_counter.insert((id, location), depth - 1);
            let result = self.apply(referent, location);
            // allow moving back and forth over this location
            self.recursion_counter.insert((id, location), depth);
            return result;
        }
        // first call at this location: fail on the first recursive re-entry
        self.recursion_counter.insert((id, location), 0);
        let saved_suspend = self.suspend_memoization;
        self.suspend_memoization = false;
        let history_mark = self.history.len();

        let mut result = self.apply(referent, location)?;
        if result.0.is_some() {
            // grow: re-run with one more permitted recursion per round as
            // long as the match keeps getting longer
            let mut accepted_history: Vec<HistoryRecord> =
                self.history[history_mark..].to_vec();
            let mut depth = 1usize;
            loop {
                self.recursion_counter.insert((id, location), depth);
                self.suspend_memoization = false;
                let rollback_mark = self.rollback.len();
                self.history.truncate(history_mark);
                let next_result = self.apply(referent, location)?;
                if next_result.1 <= result.1 {
                    // not longer: reject the round and roll its variable
                    // changes back
                    while self.rollback.len() > rollback_mark {
                        let (_, op) = self.rollback.pop().expect("length checked");
                        self.undo(op);
                    }
                    self.last_rb_loc = self.rollback.last().map_or(-2, |e| e.0);
                    self.history.truncate(history_mark);
                    self.history.extend(accepted_history);
                    break;
                }
                accepted_history = self.history[history_mark..].to_vec();
                result = next_result;
                depth += 1;
            }
        }
        self.suspend_memoization = saved_suspend;
        if !self.suspend_memoization {
            self.memo[id.index()].insert(location, result.clone());
        }
        Ok(result)
    }

    /// Dispatches to the shape-specific parsing logic.
    fn step(&mut self, id: ParserId, location: usize) -> Step {
        let g = self.g;
        match &g.parser(id).kind {
            ParserKind::Always => self.step_always(id, location),
            ParserKind::Never => Ok((None, location)),
            ParserKind::AnyChar => self.step_any_char(id, location),
            ParserKind::Text(_) => self.step_text(id, location),
            ParserKind::IgnoreCase { .. } => self.step_ignore_case(id, location),
            ParserKind::RegExp(_) => self.step_regexp(id, location),
            ParserKind::Whitespace { .. } => self.step_whitespace(id, location),
            ParserKind::SmartRe { .. } => self.step_smart_re(id, location),
            ParserKind::Custom(_) => self.step_custom(id, location),
            ParserKind::Err { .. } => self.step_err(id, location),
            ParserKind::Option(_) => self.step_option(id, location),
            ParserKind::ZeroOrMore(_) => self.step_zero_or_more(id, location),
            ParserKind::OneOrMore(_) => self.step_one_or_more(id, location),
            ParserKind::Counted { .. } => self.step_counted(id, location),
            ParserKind::Series { .. } => self.step_series(id, location),
            ParserKind::Alternative(_) => self.step_alternative(id, location),
            ParserKind::Interleave { .. } => self.step_interleave(id, location),
            ParserKind::Lookahead { .. } => self.step_lookahead(id, location),
            ParserKind::Lookbehind { .. } => self.step_lookbehind(id, location),
            ParserKind::Capture { .. } => self.step_capture(id, location),
            ParserKind::Retrieve { .. } => self.step_retrieve(id, location),
            ParserKind::Pop { .. } => self.step_pop(id, location),
            ParserKind::Synonym(_) => self.step_synonym(id, location),
            ParserKind::Forward(_) => unreachable!("forward parsers use apply_forward"),
        }
    }

    // ----- shared mutable state ------------------------------------------

    /// Deposits a rollback entry. Memoization is suspended until an
    /// enclosing parser that saw a clean flag returns, so results that
    /// depend on variable state are never cached.
    pub(crate) fn push_rollback(&mut self, location: isize, op: RollbackOp) {
        self.rollback.push((location, op));
        self.last_rb_loc = location;
        self.suspend_memoization = true;
    }

    /// Undoes, last-in-first-out, all variable operations deposited at or
    /// after `location`.
    pub(crate) fn rollback_to(&mut self, location: usize) {
        while let Some(&(loc, _)) = self.rollback.last() {
            if loc < location as isize {
                break;
            }
            let (_, op) = self.rollback.pop().expect("just peeked");
            self.undo(op);
        }
        self.last_rb_loc = self.rollback.last().map_or(-2, |e| e.0);
    }

    fn undo(&mut self, op: RollbackOp) {
        match op {
            RollbackOp::PopVar(name) => {
                if let Some(stack) = self.variables.get_mut(&name) {
                    stack.pop();
                }
            }
            RollbackOp::PushVar(name, value) => {
                self.variables.entry(name).or_default().push(value);
            }
            RollbackOp::Nothing => {}
        }
    }

    /// The deposit location of a variable operation: the parser's start,
    /// or one before it when nothing was consumed, so that a zero-length
    /// capture is not rolled back by the very next call at the same spot.
    pub(crate) fn rollback_location(&self, start: usize, end: usize) -> isize {
        if start != end {
            start as isize
        } else {
            start as isize - 1
        }
    }

    // ----- diagnostics support -------------------------------------------

    fn recursion_exhausted(&mut self, location: usize) -> (Option<Node>, usize) {
        let rest = self.doc.rest(location);
        let head_len = rest
            .find('\n')
            .map(|i| i.clamp(1, 10))
            .unwrap_or_else(|| rest.len().min(10));
        let snippet = format!("{} ...", &rest[..ceil_boundary(rest, head_len)]);
        let mut node = Node::zombie(snippet);
        node.anchor_pos(location);
        let error = Error::new(
            "maximum recursion depth of parser reached; potentially due to too many errors \
             or left recursion!",
            location,
            RECURSION_DEPTH_LIMIT_HIT,
        );
        self.tree.add_error(&mut node, error);
        (Some(node), self.doc.len())
    }

    pub(crate) fn infinite_loop_warning(&mut self, id: ParserId, node: Option<&Node>, location: usize) {
        if location >= self.doc.len() || !self.g.infinite_loop_warnings() {
            return;
        }
        let symbol = self.symbol_name(id).to_string();
        let mut anchor = match node {
            Some(n) if !n.is_empty_surrogate() && n.pos().is_some() => n.clone(),
            _ => Node::leaf(graft_core::node::EMPTY_TAG, "").with_pos(location),
        };
        let message = format!(
            "Repeating parser did not make any progress! Was the inner parser of \"{symbol}\" \
             really intended to capture empty text?"
        );
        self.tree
            .add_error(&mut anchor, Error::new(message, location, INFINITE_LOOP_WARNING));
    }

    /// The symbol (closest named ancestor) a parser belongs to.
    pub(crate) fn symbol_name(&self, id: ParserId) -> &'g str {
        self.g.symbol_of(id)
    }

    /// `symbol->description` for parsers that are not symbols themselves.
    pub(crate) fn qualified_name(&self, id: ParserId) -> String {
        let g = self.g;
        let symbol = g.symbol_of(id);
        if g.parser(id).name == symbol && !symbol.is_empty() {
            symbol.to_string()
        } else if symbol.is_empty() {
            g.display(id)
        } else {
            format!("{symbol}->{}", g.display(id))
        }
    }

    /// A short quoted excerpt of the document starting at `location`.
    pub(crate) fn excerpt(&self, location: usize, chars: usize) -> String {
        let rest = self.doc.rest(location);
        let mut out = String::new();
        for (n, ch) in rest.chars().enumerate() {
            if n >= chars {
                out.push_str("...");
                break;
            }
            if ch == '\n' {
                out.push_str("\\n");
            } else {
                out.push(ch);
            }
        }
        out
    }

    // ----- history -------------------------------------------------------

    fn record(&mut self, location: usize, status: HistoryStatus, node: &Option<Node>, next: usize) {
        let line_col = self.doc.line_col(location);
        self.history.push(HistoryRecord {
            call_stack: self.call_stack.clone(),
            status,
            node: node.clone(),
            location,
            next_location: next,
            line_col,
        });
    }

    fn record_recall(&mut self, id: ParserId, location: usize, node: &Option<Node>, next: usize) {
        if !self.history_tracking {
            return;
        }
        self.call_stack.push(CallItem {
            name: self.g.parser(id).node_name.clone(),
            location,
        });
        self.record(location, HistoryStatus::Recall, node, next);
        self.call_stack.pop();
    }

    // ----- reduction shims -----------------------------------------------

    pub(crate) fn reduce_single(&self, id: ParserId, node: Option<Node>) -> Node {
        let g = self.g;
        reduce::single(g.parser(id), g.reduction(), node)
    }

    pub(crate) fn reduce_values(&self, id: ParserId, results: Vec<Node>) -> Node {
        let g = self.g;
        reduce::values(g.parser(id), g.reduction(), results)
    }

    // ----- whole-document entry ------------------------------------------

    /// Parses the document with the start parser, stitching over dropouts
    /// when `complete_match` is requested, and returns the root together
    /// with the history log.
    pub(crate) fn run(mut self, complete_match: bool) -> (RootNode, Vec<HistoryRecord>) {
        let len = self.doc.len();
        let mut stitches: Vec<Node> = Vec::new();
        let mut result: Option<Node> = None;

        if len == 0 {
            result = match self.apply(self.start, 0) {
                Ok((node, _)) => node,
                Err(pe) => Some(pe.node),
            };
            if result.is_none() {
                let mut zombie = Node::zombie("").with_pos(0);
                let start_name = self.qualified_name(self.start);
                if self.lookahead_failed_at_eof {
                    self.tree.add_error(
                        &mut zombie,
                        Error::new(
                            format!(
                                "Parser {start_name} only did not match empty document \
                                 because of lookahead"
                            ),
                            0,
                            PARSER_LOOKAHEAD_FAILURE_ONLY,
                        ),
                    );
                } else {
                    self.tree.add_error(
                        &mut zombie,
                        Error::new(
                            format!("Parser {start_name} did not match empty document."),
                            0,
                            PARSER_STOPPED_BEFORE_END,
                        ),
                    );
                }
                result = Some(zombie);
            }
        }

        let mut max_dropouts = self.g.max_dropouts();
        let mut location = 0usize;
        while location < len && stitches.len() < max_dropouts {
            match self.apply(self.start, location) {
                Ok((node, next)) => {
                    result = node;
                    location = next;
                }
                Err(pe) => {
                    result = Some(pe.node);
                    location = len;
                }
            }
            if let Some(node) = &result {
                if node.is_empty_surrogate() {
                    result = Some(Node::leaf(graft_core::node::EMPTY_TAG, "").with_pos(0));
                }
            }
            if location < len && complete_match {
                let rest = self.doc.rest(location);
                let fwd = rest.find('\n').map(|i| i + 1).unwrap_or(rest.len());
                let skip = rest[..fwd].to_string();
                location += fwd;

                let no_match = match &result {
                    None => true,
                    Some(n) => n.name() == ZOMBIE_TAG && n.strlen() == 0,
                };
                let mut err_pos;
                let mut error_msg;
                let mut error_code;
                if no_match {
                    err_pos = self.ff_pos.max(0) as usize;
                    let failed = self
                        .ff_parser
                        .map(|p| self.qualified_name(p))
                        .unwrap_or_else(|| self.qualified_name(self.start));
                    let err_text = self.excerpt(err_pos, 20);
                    if self.lookahead_failed_at_eof {
                        error_msg = format!(
                            "Parser {failed} did not match: »{err_text}« \
                             - but only because of lookahead."
                        );
                        error_code = PARSER_LOOKAHEAD_FAILURE_ONLY;
                    } else {
                        error_msg = format!("Parser {failed} did not match: »{err_text}«");
                        error_code = PARSER_STOPPED_BEFORE_END;
                    }
                    result = None;
                } else {
                    stitches.push(result.take().expect("checked by no_match"));
                    if self.lookahead_matched_at_eof {
                        error_msg =
                            "Parser stopped before end, but matched with lookahead.".to_string();
                        error_code = PARSER_LOOKAHEAD_MATCH_ONLY;
                        err_pos = tail_pos(&stitches);
                        max_dropouts = 0; // no further retries
                    } else {
                        let i = if self.ff_pos >= 0 {
                            self.ff_pos as usize
                        } else {
                            tail_pos(&stitches)
                        };
                        err_pos = i;
                        let found = self.excerpt(i, 10);
                        let root_name = self.symbol_name(self.start);
                        let continuation = if stitches.len() < max_dropouts {
                            "Trying to recover..."
                        } else {
                            "Terminating parser."
                        };
                        error_msg = format!(
                            "Parser \"{root_name}\" stopped before end, at: »{found}« \
                             {continuation}"
                        );
                        error_code = PARSER_STOPPED_BEFORE_END;
                    }
                }
                let mut stitch = Node::zombie(skip).with_pos(tail_pos(&stitches));
                if stitch.pos().unwrap_or(0) > 0 {
                    if self.ff_pos > err_pos as isize {
                        let (line, col) = self.doc.line_col(self.ff_pos as usize);
                        error_msg = format!("Farthest Fail at {line}:{col}, {error_msg}");
                    }
                    err_pos = err_pos.max(stitch.pos().unwrap_or(0));
                }
                if stitches.len() > 1 {
                    error_msg = format!("Error after {}. reentry: {error_msg}", stitches.len() - 1);
                    error_code = PARSER_STOPPED_ON_RETRY;
                    err_pos = stitch.pos().unwrap_or(err_pos);
                }
                let lookahead_code = error_code == PARSER_LOOKAHEAD_MATCH_ONLY
                    || error_code == PARSER_LOOKAHEAD_FAILURE_ONLY;
                let already_reported = self
                    .tree
                    .errors
                    .iter()
                    .any(|e| e.pos == err_pos && graft_core::error::is_error(e.code));
                if lookahead_code || !already_reported {
                    let error = Error::new(error_msg, err_pos, error_code);
                    self.tree.add_error(&mut stitch, error);
                }
                stitches.push(stitch);
            } else {
                location = len;
            }
        }

        if !stitches.is_empty() {
            if let Some(tail) = result.take() {
                stitches.push(tail);
            }
            if location < len {
                let trailing = Node::zombie(self.doc.rest(location)).with_pos(tail_pos(&stitches));
                stitches.push(trailing);
            }
            result = Some(Node::branch(ZOMBIE_TAG, stitches).with_pos(0));
        }

        self.check_capture_stacks(&mut result);
        self.tree.swallow(result);
        (self.tree, self.history)
    }

    /// Reports variable stacks that are not empty after parsing: an error
    /// for genuinely captured values, a warning when only zero-length
    /// captures can be responsible.
    fn check_capture_stacks(&mut self, result: &mut Option<Node>) {
        let leftovers: Vec<(String, usize)> = self
            .variables
            .iter()
            .filter(|(_, stack)| !stack.is_empty())
            .map(|(name, stack)| (name.clone(), stack.len()))
            .collect();
        if leftovers.is_empty() {
            return;
        }
        let listing: Vec<String> = leftovers
            .iter()
            .map(|(name, n)| format!("{name} {n} {}", if *n > 1 { "items" } else { "item" }))
            .collect();
        let message = format!(
            "Capture-stack not empty after end of parsing: {}",
            listing.join(", ")
        );
        let code = if leftovers
            .iter()
            .all(|(name, _)| self.g.can_capture_zero_length(name))
        {
            CAPTURE_STACK_NOT_EMPTY_WARNING
        } else {
            CAPTURE_STACK_NOT_EMPTY
        };
        match result {
            Some(node) if !node.children().is_empty() => {
                // anchor the error at the end of the text, where the
                // unpopped capture became apparent
                let pos = node.pos().unwrap_or(0) + node.strlen();
                let mut marker = Node::zombie("").with_pos(pos);
                self.tree.add_error(&mut marker, Error::new(message, pos, code));
                node.push_child(marker);
            }
            Some(node) => {
                let pos = node.pos().unwrap_or(0);
                self.tree.add_error(node, Error::new(message, pos, code));
            }
            None => {
                self.tree
                    .add_error_at(Error::new(message, self.doc.len(), code));
            }
        }
    }
}

/// Position directly after the content of the last node in `nodes`.
pub(crate) fn tail_pos(nodes: &[Node]) -> usize {
    match nodes.last() {
        Some(node) => {
            let tail = node.last_leaf();
            tail.pos().unwrap_or(0) + tail.strlen()
        }
        None => 0,
    }
}

/// True for results that the tree keeps: everything except blank anonymous
/// nodes.
pub(crate) fn worth_keeping(node: &Node) -> bool {
    !(node.is_anonymous() && node.is_blank())
}

fn ceil_boundary(s: &str, mut i: usize) -> usize {
    while i < s.len() && !s.is_char_boundary(i) {
        i += 1;
    }
    i
}
