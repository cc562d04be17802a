//! Error recovery: the recoverable-error channel and reentry-point search.
//!
//! A mandatory-element violation does not unwind the parse. It travels
//! outward as a [`ParserError`] value through the `Result` channel of the
//! uniform parser entry until some enclosing parser (or the root) either
//! finds a reentry point and resumes, or materializes the error in the
//! tree. `first_throw` distinguishes the original throw from re-throws so
//! that diagnostics snapshot the right call stack.

use std::sync::Arc;

use graft_core::error::{
    extract_error_code, Error, ERROR_WHILE_RECOVERING_FROM_ERROR, MALFORMED_ERROR_STRING,
    MANDATORY_CONTINUATION, MANDATORY_CONTINUATION_AT_EOF, MANDATORY_CONTINUATION_AT_EOF_NON_ROOT,
    RESUME_NOTICE,
};
use graft_core::node::Node;
use regex::Regex;

use crate::engine::Engine;
use crate::parsers::{ParserId, ReentrySearchFn};

/// A recoverable parse error in flight.
#[derive(Debug, Clone)]
pub(crate) struct ParserError {
    /// The parser within which the error was raised.
    pub origin: ParserId,
    /// The partial result constructed up to the point of failure.
    pub node: Node,
    /// Length of `node` at throw time; later processing may change the
    /// node, the original length stays authoritative for relocation.
    pub node_orig_len: usize,
    /// Where the parser that caused the error started.
    pub location: usize,
    pub error: Error,
    /// True until the error is re-thrown for the first time.
    pub first_throw: bool,
    /// Call-stack snapshot taken when history tracking is on.
    pub callstack_snapshot: Vec<crate::trace::CallItem>,
}

/// Outcome of a single parser application: a (non-)match, or an error
/// traveling outward.
pub(crate) type Step = Result<(Option<Node>, usize), Box<ParserError>>;

impl ParserError {
    /// A copy of the error with `first_throw` cleared; used on re-throw.
    pub fn rethrown(&self) -> Box<ParserError> {
        let mut pe = self.clone();
        pe.first_throw = false;
        Box::new(pe)
    }
}

/// One rule of a resume- or skip-list.
#[derive(Clone)]
pub enum ReentryRule {
    /// Plain substring search; the reentry point is after the match.
    Text(String),
    /// Regex search; the reentry point is after the match.
    Pattern(Regex),
    /// User-supplied search function.
    Search(ReentrySearchFn),
    /// A parser applied at the error location; its match becomes the
    /// skipped region.
    Parser(ParserId),
}

impl ReentryRule {
    pub fn text(s: impl Into<String>) -> Self {
        ReentryRule::Text(s.into())
    }

    /// Compiles `pattern` as an unanchored search expression.
    pub fn pattern(pattern: &str) -> Result<Self, regex::Error> {
        Ok(ReentryRule::Pattern(Regex::new(pattern)?))
    }

    pub fn search(f: impl Fn(&str, usize, usize) -> (isize, usize) + Send + Sync + 'static) -> Self {
        ReentryRule::Search(Arc::new(f))
    }

    pub fn parser(id: ParserId) -> Self {
        ReentryRule::Parser(id)
    }
}

impl std::fmt::Debug for ReentryRule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ReentryRule::Text(s) => write!(f, "Text({s:?})"),
            ReentryRule::Pattern(rx) => write!(f, "Pattern(/{}/)", rx.as_str()),
            ReentryRule::Search(_) => write!(f, "Search(..)"),
            ReentryRule::Parser(id) => write!(f, "Parser({id:?})"),
        }
    }
}

/// Condition guarding a custom error message for mandatory violations.
#[derive(Clone)]
pub enum MsgCondition {
    /// The text after the violation starts with this string.
    Text(String),
    /// The text after the violation matches this (anchored) pattern.
    Pattern(Regex),
    /// User-supplied predicate over the text after the violation.
    Predicate(Arc<dyn Fn(&str) -> bool + Send + Sync>),
}

impl MsgCondition {
    pub(crate) fn applies(&self, rest: &str) -> bool {
        match self {
            MsgCondition::Text(s) => rest.starts_with(s.as_str()),
            MsgCondition::Pattern(rx) => rx.find(rest).is_some_and(|m| m.start() == 0),
            MsgCondition::Predicate(f) => f(rest),
        }
    }
}

impl std::fmt::Debug for MsgCondition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MsgCondition::Text(s) => write!(f, "Text({s:?})"),
            MsgCondition::Pattern(rx) => write!(f, "Pattern(/{}/)", rx.as_str()),
            MsgCondition::Predicate(_) => write!(f, "Predicate(..)"),
        }
    }
}

/// Searches `rest` for the next match of a literal string. Returns the
/// match start (or -1) and the match length.
fn str_search(rest: &str, needle: &str, start: usize, window: usize) -> (isize, usize) {
    let end = (start + window).min(rest.len());
    match rest.get(start..end).and_then(|w| w.find(needle)) {
        Some(i) => ((start + i) as isize, needle.len()),
        None => (-1, needle.len()),
    }
}

/// Searches `rest` for the next match of a regex inside the window.
fn rx_search(rest: &str, rx: &Regex, start: usize, window: usize) -> (isize, usize) {
    let end = (start + window).min(rest.len());
    match rest.get(start..end).and_then(|w| rx.find(w)) {
        Some(m) => ((start + m.start()) as isize, m.end() - m.start()),
        None => (-1, 0),
    }
}

impl Engine<'_> {
    /// Finds the point where parsing can resume after an error, trying
    /// every rule and taking the closest hit outside comments. Returns the
    /// offset relative to `at` (or -1) and a synthetic node covering the
    /// skipped text.
    pub(crate) fn reentry_point(
        &mut self,
        at: usize,
        rules: &[ReentryRule],
        skip_node_name: &str,
    ) -> (isize, Node) {
        let rest_len = self.doc.len() - at.min(self.doc.len());
        let upper_limit = rest_len + 1;
        let window = match self.g.search_window() {
            w if w < 0 => rest_len,
            w => (w as usize).min(rest_len),
        };
        let mut closest = upper_limit;
        let mut skip_node: Option<Node> = None;
        let mut rule_number = 0;
        for (n, rule) in rules.iter().enumerate() {
            rule_number = n + 1;
            match rule {
                ReentryRule::Parser(pid) => {
                    // resume rules must not pollute the debugging history
                    let save_tracking = self.history_tracking;
                    self.history_tracking = false;
                    let outcome = self.apply(*pid, at);
                    self.history_tracking = save_tracking;
                    match outcome {
                        Ok((Some(node), next)) => {
                            let pos = next - at;
                            if pos < closest {
                                closest = pos;
                                skip_node = Some(node);
                            }
                        }
                        Ok((None, _)) => {}
                        Err(pe) => {
                            let message = format!(
                                "Error while searching re-entry point with parser {}: {}",
                                self.g.display(*pid),
                                pe.error.message
                            );
                            let mut anchor = Node::zombie("").with_pos(at);
                            self.tree.add_error(
                                &mut anchor,
                                Error::new(message, at, ERROR_WHILE_RECOVERING_FROM_ERROR),
                            );
                        }
                    }
                }
                _ => {
                    let pos = rule_entry_point(
                        self.doc.rest(at),
                        rule,
                        self.g.comment_rx(),
                        window,
                        upper_limit,
                    );
                    if pos < closest {
                        skip_node = None;
                        closest = pos;
                    }
                }
            }
        }
        let reloc: isize = if closest == upper_limit { -1 } else { closest as isize };
        let node = skip_node.unwrap_or_else(|| {
            let end = at + reloc.max(0) as usize;
            Node::leaf(
                format!("{skip_node_name}_R{rule_number}__"),
                self.doc.slice(at, end),
            )
        });
        (reloc, node)
    }

    /// Reentry search against the enclosing symbol's skip-list, used when a
    /// mandatory element fails. An empty skip-list yields no reentry point
    /// and a bare zombie placeholder.
    pub(crate) fn mandatory_reentry(&mut self, id: ParserId, location: usize) -> (isize, Node) {
        let symbol = self.symbol_name(id).to_string();
        let skip = self.g.skip_rules(&symbol);
        if skip.is_empty() {
            return (-1, Node::zombie(""));
        }
        self.reentry_point(location, skip, &format!("{symbol}_skip"))
    }

    /// Builds and registers the error for a mandatory violation, choosing a
    /// configured custom message when one applies, and returns the error
    /// together with the location where parsing continues.
    pub(crate) fn mandatory_violation(
        &mut self,
        id: ParserId,
        location: usize,
        failed_on_lookahead: bool,
        expected: &str,
        reloc: isize,
        err_node: &mut Node,
    ) -> (Error, usize) {
        err_node.anchor_pos(location);
        let rest = self.doc.rest(location);
        let at_eof = rest.is_empty();
        let found = if at_eof {
            "END OF FILE".to_string()
        } else {
            format!("»{}«", self.excerpt(location, 10))
        };
        let symbol = self.symbol_name(id).to_string();
        let mut error_code = MANDATORY_CONTINUATION;
        let mut message: Option<String> = None;
        for (condition, template) in self.g.error_messages(&symbol) {
            if !condition.applies(self.doc.rest(location)) {
                continue;
            }
            match format_error_template(template, expected, &found) {
                Ok(text) => {
                    let (text, code) = extract_error_code(&text, MANDATORY_CONTINUATION);
                    message = Some(text);
                    error_code = code;
                    break;
                }
                Err(detail) => {
                    let malformed = Error::new(
                        format!("Malformed error format string »{template}« leads to »{detail}«"),
                        location,
                        MALFORMED_ERROR_STRING,
                    );
                    self.tree.add_error(err_node, malformed);
                }
            }
        }
        let message = message.unwrap_or_else(|| {
            format!("{expected} expected by parser '{symbol}', but {found} found instead!")
        });
        if failed_on_lookahead && at_eof {
            error_code = if self.start == self.g.root() {
                MANDATORY_CONTINUATION_AT_EOF
            } else {
                MANDATORY_CONTINUATION_AT_EOF_NON_ROOT
            };
        }
        let length = (self.ff_pos - location as isize).max(1) as u32;
        let error = Error::new(message, location, error_code).with_length(length);
        self.tree.add_error(err_node, error.clone());
        if reloc >= 0 && self.resume_notices {
            let target = location + reloc as usize;
            let (l0, c0) = self.doc.line_col(location);
            let (l1, c1) = self.doc.line_col(target);
            let notice = Error::new(
                format!(
                    "Skipping from {l0}:{c0} '{}' within {symbol} to {l1}:{c1} '{}'",
                    self.excerpt(location, 7),
                    self.excerpt(target, 7)
                ),
                target,
                RESUME_NOTICE,
            );
            self.tree.add_error(err_node, notice);
        }
        (error, location + reloc.max(0) as usize)
    }

    /// Catches a `ParserError` on behalf of the enclosing parser: resume
    /// via the symbol's resume-rules when possible, fall through to the
    /// next enclosing parser otherwise, materialize at the start parser as
    /// a last resort.
    pub(crate) fn recover(&mut self, id: ParserId, pe: ParserError, location: usize) -> Step {
        let g = self.g;
        let gap = pe.location.saturating_sub(location);
        let cut = self.doc.slice(location, pe.location).to_string();
        let symbol = self.symbol_name(id).to_string();
        let rules = g.resume_rules(&symbol);
        let mut next_location = pe.location + pe.node_orig_len;
        let origin_symbol = self.symbol_name(pe.origin).to_string();
        let (reloc, skip_node) =
            self.reentry_point(next_location, rules, &format!("{origin_symbol}_resume"));
        if reloc >= 0 || id == self.start {
            let i = reloc.max(0) as usize;
            let mut node = pe.node;
            let skipped = self.doc.slice(next_location, next_location + i).to_string();
            // an empty artifact placeholder among the children absorbs the
            // skipped text; otherwise the skip node is appended
            let mut tail = Some(skip_node);
            if let Some(placeholder) =
                node.pick_child_mut(|n| graft_core::node::is_artifact_name(n.name()))
            {
                if placeholder.is_blank() {
                    placeholder.set_leaf(skipped.as_str());
                    let name = tail
                        .as_ref()
                        .expect("tail present until consumed")
                        .shared_name()
                        .clone();
                    placeholder.rename(name);
                    tail = None;
                }
            }
            next_location += i;
            let mut node = if pe.first_throw {
                if let Some(tail) = tail {
                    node.push_child(tail);
                }
                node
            } else {
                let mut children = vec![Node::zombie(cut), node];
                if let Some(tail) = tail {
                    children.push(tail);
                }
                Node::branch(g.parser(id).node_name.clone(), children).with_pos(location)
            };
            if self.resume_notices {
                let (l0, c0) = self.doc.line_col(pe.error.pos);
                let (l1, c1) = self.doc.line_col(next_location);
                let resumer = self.symbol_name(id).to_string();
                let notice = Error::new(
                    format!(
                        "Resuming from {origin_symbol} at {l0}:{c0} '{}' with {resumer} at \
                         {l1}:{c1} '{}'",
                        self.excerpt(pe.error.pos, 7),
                        self.excerpt(next_location, 7)
                    ),
                    next_location,
                    RESUME_NOTICE,
                );
                self.tree.add_error(&mut node, notice);
            }
            Ok((Some(node), next_location))
        } else if pe.first_throw {
            Err(pe.rethrown())
        } else if matches!(
            self.tree.errors.last().map(|e| e.code),
            Some(MANDATORY_CONTINUATION_AT_EOF) | Some(MANDATORY_CONTINUATION_AT_EOF_NON_ROOT)
        ) {
            // keep the tree as faithful as possible at the end of input
            let node =
                Node::branch(g.parser(id).node_name.clone(), vec![pe.node]).with_pos(location);
            Ok((Some(node), next_location))
        } else {
            // fall through, widening the error node by the gap
            let children = if gap > 0 {
                vec![Node::zombie(cut), pe.node.clone()]
            } else {
                vec![pe.node.clone()]
            };
            let node =
                Node::branch(g.parser(id).node_name.clone(), children).with_pos(location);
            let mut rethrown = pe;
            rethrown.node = node;
            rethrown.node_orig_len += gap;
            rethrown.location = location;
            rethrown.first_throw = false;
            Err(Box::new(rethrown))
        }
    }
}

/// Fills an error-message template: `{0}` (or the first bare `{}`) is the
/// expected element, `{1}` (or the second `{}`) the found text. Stray
/// braces make the template malformed.
pub(crate) fn format_error_template(
    template: &str,
    expected: &str,
    found: &str,
) -> Result<String, String> {
    let mut out = template.replace("{{", "\u{0}").replace("}}", "\u{1}");
    out = out.replace("{0}", expected).replace("{1}", found);
    if let Some(i) = out.find("{}") {
        out.replace_range(i..i + 2, expected);
        if let Some(j) = out.find("{}") {
            out.replace_range(j..j + 2, found);
        }
    }
    if out.contains('{') || out.contains('}') {
        return Err("unmatched placeholder brace".to_string());
    }
    Ok(out.replace('\u{0}', "{").replace('\u{1}', "}"))
}

/// Finds the closest reentry point in `rest` for a single non-parser rule,
/// skipping candidates that lie inside comments. Returns the end offset of
/// the match, i.e. the position where parsing resumes, or `upper_limit`
/// when the rule finds nothing.
pub(crate) fn rule_entry_point(
    rest: &str,
    rule: &ReentryRule,
    comment_rx: Option<&Regex>,
    window: usize,
    upper_limit: usize,
) -> usize {
    let mut comments = comment_rx
        .map(|rx| rx.find_iter(rest).map(|m| (m.start(), m.end())).collect::<Vec<_>>())
        .unwrap_or_default()
        .into_iter();
    let mut next_comment = || comments.next().unwrap_or((usize::MAX, usize::MAX));

    let search = |start: usize| -> (isize, usize) {
        match rule {
            ReentryRule::Text(s) => str_search(rest, s, start, window),
            ReentryRule::Pattern(rx) => rx_search(rest, rx, start, window),
            ReentryRule::Search(f) => f(rest, start, (start + window).min(rest.len())),
            ReentryRule::Parser(_) => (-1, 0),
        }
    };

    let (mut a, mut b) = next_comment();
    let (mut k, mut length) = search(0);
    // skip comments that end before the candidate match
    while a < b && k >= 0 && b <= k as usize + length {
        (a, b) = next_comment();
    }
    // re-search as long as the candidate's start or end lies in a comment
    while k >= 0 && ((a < (k as usize) && (k as usize) < b) || (a < k as usize + length && k as usize + length < b))
    {
        let (k2, l2) = search(b);
        k = k2;
        length = l2;
        while a < b && k >= 0 && b <= k as usize {
            (a, b) = next_comment();
        }
    }
    if k >= 0 {
        k as usize + length
    } else {
        upper_limit
    }
}
