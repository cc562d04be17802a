//! The root of a parse result.
//!
//! Errors are not stored inside the nodes they occurred on: tree reduction
//! and AST transformation drop nodes freely, and errors must survive that.
//! The root therefore keeps the global error list plus an index from node
//! identity and source position to the attached errors. The root is created
//! before parsing starts (the runtime reports errors into it while parsing)
//! and adopts the finished tree via [`RootNode::swallow`].

use std::ops::{Deref, DerefMut};
use std::sync::Arc;

use fxhash::{FxHashMap, FxHashSet};

use crate::error::{Error, ErrorCode, PARSER_STOPPED_BEFORE_END};
use crate::node::{Node, ZOMBIE_TAG};
use crate::source::{line_breaks, line_col};

/// Maps positions of the parsed (possibly preprocessed) document back to
/// positions in the original source.
pub type SourceMapFn = dyn Fn(usize) -> usize + Send + Sync;

const NOT_YET_READY: &str = "__not_yet_ready__";

/// Root node of a concrete syntax tree, owning the error registry.
///
/// Dereferences to the swallowed [`Node`], so tree navigation and
/// serialization work directly on the root.
pub struct RootNode {
    node: Node,
    /// Append-only list of everything reported during parsing and later
    /// stages.
    pub errors: Vec<Error>,
    /// node identity -> indices into `errors`.
    error_nodes: FxHashMap<u32, Vec<usize>>,
    /// source position -> node identities with an error at that position.
    error_positions: FxHashMap<usize, FxHashSet<u32>>,
    /// Highest error code seen so far.
    pub error_flag: ErrorCode,
    /// The parsed document.
    pub source: String,
    source_mapping: Option<Arc<SourceMapFn>>,
    lbreaks: Vec<usize>,
    next_error_id: u32,
}

impl std::fmt::Debug for RootNode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RootNode")
            .field("node", &self.node)
            .field("errors", &self.errors)
            .field("error_flag", &self.error_flag)
            .finish_non_exhaustive()
    }
}

impl RootNode {
    /// Creates a root that is ready to collect errors but has not yet
    /// adopted a tree.
    pub fn new(source: impl Into<String>) -> Self {
        let source = source.into();
        let lbreaks = line_breaks(&source);
        RootNode {
            node: Node::leaf(NOT_YET_READY, ""),
            errors: Vec::new(),
            error_nodes: FxHashMap::default(),
            error_positions: FxHashMap::default(),
            error_flag: 0,
            source,
            source_mapping: None,
            lbreaks,
            next_error_id: 1,
        }
    }

    pub fn set_source_mapping(&mut self, mapping: Option<Arc<SourceMapFn>>) {
        self.source_mapping = mapping;
    }

    /// Adopts the finished parse result. `None` stands for a root parser
    /// that did not match at all; a zombie root with a
    /// `PARSER_STOPPED_BEFORE_END` error is synthesized for it.
    pub fn swallow(&mut self, node: Option<Node>) {
        assert!(
            self.node.name() == NOT_YET_READY,
            "RootNode::swallow must only be called once"
        );
        match node {
            Some(node) => {
                let node = if node.is_empty_surrogate() {
                    // never deal out the shared empty surrogate
                    Node::leaf(":EMPTY", "").with_pos(0)
                } else {
                    node
                };
                self.node = node;
            }
            None => {
                let mut zombie = Node::zombie("").with_pos(0);
                self.add_error(
                    &mut zombie,
                    Error::new("Parser did not match!", 0, PARSER_STOPPED_BEFORE_END),
                );
                self.node = zombie;
            }
        }
        self.locate_errors();
    }

    /// True once a tree has been adopted and no stopped-before-end error
    /// was recorded.
    pub fn did_match(&self) -> bool {
        self.node.name() != NOT_YET_READY
            && !self
                .errors
                .iter()
                .any(|e| e.code == PARSER_STOPPED_BEFORE_END)
    }

    /// Attaches an error to a node. The node receives a registry handle so
    /// the association survives the node being moved into the tree.
    pub fn add_error(&mut self, node: &mut Node, error: Error) {
        let id = match node.error_id {
            Some(id) => id,
            None => {
                let id = self.next_error_id;
                self.next_error_id += 1;
                node.error_id = Some(id);
                id
            }
        };
        self.error_nodes.entry(id).or_default().push(self.errors.len());
        if node.pos().is_none() || node.pos() == Some(error.pos) {
            self.error_positions.entry(error.pos).or_default().insert(id);
        }
        self.error_flag = self.error_flag.max(error.code);
        self.errors.push(self.located(error));
    }

    /// Convenience wrapper building the [`Error`] in place.
    pub fn new_error(&mut self, node: &mut Node, message: impl Into<String>, code: ErrorCode) {
        let pos = node.pos().unwrap_or(0);
        self.add_error(node, Error::new(message, pos, code));
    }

    /// Records an error that is not anchored to any surviving node.
    pub fn add_error_at(&mut self, error: Error) {
        self.error_flag = self.error_flag.max(error.code);
        self.errors.push(self.located(error));
    }

    /// The errors attached to a specific node (by registry identity).
    pub fn node_errors(&self, node: &Node) -> Vec<&Error> {
        match node.error_id {
            Some(id) => self
                .error_nodes
                .get(&id)
                .into_iter()
                .flatten()
                .map(|&i| &self.errors[i])
                .collect(),
            None => Vec::new(),
        }
    }

    /// Identities of nodes carrying an error at `pos`.
    pub fn errors_at(&self, pos: usize) -> usize {
        self.error_positions.get(&pos).map_or(0, FxHashSet::len)
    }

    /// The error list ordered by position.
    pub fn errors_sorted(&self) -> Vec<&Error> {
        let mut errors: Vec<&Error> = self.errors.iter().collect();
        errors.sort_by_key(|e| e.pos);
        errors
    }

    pub fn has_errors(&self) -> bool {
        crate::error::has_errors(&self.errors)
    }

    /// Maps a parse position to a line/column pair in the original source.
    pub fn source_location(&self, pos: usize) -> (u32, u32) {
        let pos = match &self.source_mapping {
            Some(map) => map(pos),
            None => pos,
        };
        line_col(&self.lbreaks, &self.source, pos)
    }

    fn located(&self, mut error: Error) -> Error {
        let (line, column) = self.source_location(error.pos);
        error.line = Some(line);
        error.column = Some(column);
        error
    }

    fn locate_errors(&mut self) {
        let mapping = self.source_mapping.clone();
        for error in &mut self.errors {
            let pos = match &mapping {
                Some(map) => map(error.pos),
                None => error.pos,
            };
            let (line, column) = line_col(&self.lbreaks, &self.source, pos);
            error.line = Some(line);
            error.column = Some(column);
        }
    }

    /// Consumes the root, returning the bare tree.
    pub fn into_node(self) -> Node {
        self.node
    }
}

impl Deref for RootNode {
    type Target = Node;

    fn deref(&self) -> &Node {
        &self.node
    }
}

impl DerefMut for RootNode {
    fn deref_mut(&mut self) -> &mut Node {
        &mut self.node
    }
}

impl std::fmt::Display for RootNode {
    /// The content, with the first error spliced in after the text that
    /// parsed cleanly.
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let errors = self.errors_sorted();
        match errors.first() {
            Some(first) => {
                let content = self.node.content();
                let pos = first.pos.min(content.len());
                let cut = ceil_char_boundary(&content, pos);
                let messages: Vec<String> = errors.iter().map(|e| e.to_string()).collect();
                write!(
                    f,
                    "{} <<< Error on \"{}\" | {} >>> ",
                    &content[..cut],
                    &content[cut..],
                    messages.join("; ")
                )
            }
            None => write!(f, "{}", self.node.content()),
        }
    }
}

fn ceil_char_boundary(s: &str, mut i: usize) -> usize {
    while i < s.len() && !s.is_char_boundary(i) {
        i += 1;
    }
    i
}

/// True for synthetic zombie roots produced when nothing matched.
pub fn is_zombie_root(node: &Node) -> bool {
    node.name() == ZOMBIE_TAG
}
