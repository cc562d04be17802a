//! History recording for post-mortem debugging.
//!
//! When history tracking is switched on, the engine appends one record per
//! parser call: the call-stack breadcrumb, the outcome, and the position
//! the call started at. Memo hits are recorded as `Recall` so the log
//! shows them without the parser re-executing. The log is deliberately a
//! plain vector: the left-recursion algorithm trims rejected growth rounds
//! out of it.

use graft_core::node::{Node, NodeName};

/// One frame of the call-stack breadcrumb.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallItem {
    pub name: NodeName,
    pub location: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HistoryStatus {
    /// The parser matched.
    Match,
    /// The parser matched, but its result was dropped.
    Drop,
    /// The parser did not match.
    Fail,
    /// A recoverable error travelled through this call.
    Error,
    /// The result came out of the memo table.
    Recall,
}

impl std::fmt::Display for HistoryStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            HistoryStatus::Match => write!(f, "MATCH"),
            HistoryStatus::Drop => write!(f, "DROP"),
            HistoryStatus::Fail => write!(f, "FAIL"),
            HistoryStatus::Error => write!(f, "ERROR"),
            HistoryStatus::Recall => write!(f, "RECALL"),
        }
    }
}

/// One parser call as seen by the tracer.
#[derive(Debug, Clone)]
pub struct HistoryRecord {
    /// Breadcrumb of `(parser, location)` frames, outermost first,
    /// including the recorded call itself.
    pub call_stack: Vec<CallItem>,
    pub status: HistoryStatus,
    /// The returned node; `None` for failures.
    pub node: Option<Node>,
    /// Where the call started.
    pub location: usize,
    /// Where the parser left the document.
    pub next_location: usize,
    /// Line and column of the call start.
    pub line_col: (u32, u32),
}

impl HistoryRecord {
    /// The deepest frame, i.e. the parser this record is about.
    pub fn head(&self) -> Option<&CallItem> {
        self.call_stack.last()
    }

    /// Single-line rendering for log files.
    pub fn render(&self) -> String {
        let breadcrumb: Vec<&str> = self
            .call_stack
            .iter()
            .map(|item| item.name.as_ref())
            .collect();
        let matched = self
            .node
            .as_ref()
            .map(|n| n.content())
            .unwrap_or_default();
        format!(
            "{:>4}:{:<3} {:7} {}  {:?}",
            self.line_col.0,
            self.line_col.1,
            self.status.to_string(),
            breadcrumb.join("->"),
            matched
        )
    }
}

/// The full log of one traced parse.
#[derive(Debug, Clone, Default)]
pub struct History(pub Vec<HistoryRecord>);

impl History {
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, HistoryRecord> {
        self.0.iter()
    }

    /// The record of the deepest failure, useful when a parse stops short.
    pub fn most_advanced_fail(&self) -> Option<&HistoryRecord> {
        self.0
            .iter()
            .filter(|r| r.status == HistoryStatus::Fail)
            .max_by_key(|r| r.location)
    }

    /// The record of the longest successful match.
    pub fn last_match(&self) -> Option<&HistoryRecord> {
        self.0
            .iter()
            .filter(|r| r.status == HistoryStatus::Match)
            .max_by_key(|r| r.next_location)
    }

    /// The whole log as text, one line per call.
    pub fn as_log(&self) -> String {
        let lines: Vec<String> = self.0.iter().map(HistoryRecord::render).collect();
        lines.join("\n")
    }
}

impl IntoIterator for History {
    type Item = HistoryRecord;
    type IntoIter = std::vec::IntoIter<HistoryRecord>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}
