//! The concrete-syntax-tree node.
//!
//! A node is either a *leaf* carrying a string slice of the document or a
//! *branch* carrying an ordered sequence of child nodes; mixed content does
//! not exist. Node names follow the parser-naming convention: named parsers
//! produce nodes carrying their symbol name, unnamed parsers produce
//! "anonymous" nodes whose name starts with a colon (`:Series`, `:Text`, …).
//! Anonymous nodes are fair game for tree reduction and AST transformation;
//! named nodes are always preserved.

use std::sync::Arc;

use indexmap::IndexMap;

/// Shared node/parser name. Names are created once per parser and shared by
/// every node the parser produces.
pub type NodeName = Arc<str>;

/// Name of the shared empty-match surrogate leaf.
pub const EMPTY_TAG: &str = ":EMPTY";

/// Reserved name for synthetic nodes that carry skipped or recovered text
/// after an error.
pub const ZOMBIE_TAG: &str = "ZOMBIE__";

/// Name given to leaf runs merged by the `MergeLeaves` reduction level and
/// to plain text tokens.
pub const TEXT_TAG: &str = ":Text";

/// Returns true for names of synthetic error-recovery nodes: skip and
/// resume artifacts (`alpha_skip_R1__`, `beta_resume_R2__`) and zombies.
pub fn is_artifact_name(name: &str) -> bool {
    name.ends_with("__")
        && (name == ZOMBIE_TAG || name.contains("_skip_") || name.contains("_resume_"))
}

/// Leaf-XOR-branch content of a [`Node`].
#[derive(Debug, Clone)]
pub enum NodeContent {
    Leaf(Box<str>),
    Children(Vec<Node>),
}

/// A node of the concrete syntax tree.
///
/// Positions are write-once: they are assigned by the parser runtime when
/// the node is produced and must never change afterwards, so that errors
/// detected in later processing stages can still be located in the source.
#[derive(Debug, Clone)]
pub struct Node {
    name: NodeName,
    content: NodeContent,
    pos: Option<usize>,
    attrs: Option<Box<IndexMap<String, String>>>,
    /// Identity handle assigned by the `RootNode` error registry when an
    /// error is attached to this node. Clones share the handle, so errors
    /// follow recovered fragments through tree surgery.
    pub(crate) error_id: Option<u32>,
}

impl Node {
    /// Creates a leaf node.
    pub fn leaf(name: impl Into<NodeName>, text: impl Into<Box<str>>) -> Self {
        Node {
            name: name.into(),
            content: NodeContent::Leaf(text.into()),
            pos: None,
            attrs: None,
            error_id: None,
        }
    }

    /// Creates a branch node.
    pub fn branch(name: impl Into<NodeName>, children: Vec<Node>) -> Self {
        Node {
            name: name.into(),
            content: NodeContent::Children(children),
            pos: None,
            attrs: None,
            error_id: None,
        }
    }

    /// The shared surrogate for empty matches of disposable parsers.
    ///
    /// Tree reduction and the root swallow eliminate it; the runtime never
    /// assigns it a position.
    pub fn empty() -> Self {
        Node::leaf(empty_name(), "")
    }

    /// A zombie leaf carrying skipped or recovered text.
    pub fn zombie(text: impl Into<Box<str>>) -> Self {
        Node::leaf(zombie_name(), text)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn shared_name(&self) -> &NodeName {
        &self.name
    }

    /// Renames the node. Used by error recovery when a placeholder artifact
    /// takes over the role of a skip node, and by `Synonym` parsers.
    pub fn rename(&mut self, name: NodeName) {
        self.name = name;
    }

    /// True if the node was produced by an unnamed parser.
    pub fn is_anonymous(&self) -> bool {
        self.name.is_empty() || self.name.starts_with(':')
    }

    /// True for the shared empty-match surrogate.
    pub fn is_empty_surrogate(&self) -> bool {
        &*self.name == EMPTY_TAG && self.is_blank()
    }

    /// True if the node carries neither text nor children.
    pub fn is_blank(&self) -> bool {
        match &self.content {
            NodeContent::Leaf(s) => s.is_empty(),
            NodeContent::Children(c) => c.is_empty(),
        }
    }

    pub fn is_leaf(&self) -> bool {
        matches!(self.content, NodeContent::Leaf(_))
    }

    pub fn content_ref(&self) -> &NodeContent {
        &self.content
    }

    /// Consumes the node, yielding its bare content. Attributes, name and
    /// position are discarded; tree reduction uses this to splice an
    /// anonymous node's result into a new parent.
    pub fn into_content(self) -> NodeContent {
        self.content
    }

    /// Builds a node directly from prepared content.
    pub fn from_content(name: impl Into<NodeName>, content: NodeContent) -> Self {
        Node {
            name: name.into(),
            content,
            pos: None,
            attrs: None,
            error_id: None,
        }
    }

    /// Consumes the node, yielding its children (empty for leaves).
    pub fn into_children(self) -> Vec<Node> {
        match self.content {
            NodeContent::Children(c) => c,
            NodeContent::Leaf(_) => Vec::new(),
        }
    }

    /// Children in order; empty slice for leaves.
    pub fn children(&self) -> &[Node] {
        match &self.content {
            NodeContent::Children(c) => c,
            NodeContent::Leaf(_) => &[],
        }
    }

    pub fn children_mut(&mut self) -> &mut [Node] {
        match &mut self.content {
            NodeContent::Children(c) => c,
            NodeContent::Leaf(_) => &mut [],
        }
    }

    /// The leaf text, if this is a leaf.
    pub fn leaf_text(&self) -> Option<&str> {
        match &self.content {
            NodeContent::Leaf(s) => Some(s),
            NodeContent::Children(_) => None,
        }
    }

    /// Replaces the content with a string slice, turning the node into a
    /// leaf.
    pub fn set_leaf(&mut self, text: impl Into<Box<str>>) {
        self.content = NodeContent::Leaf(text.into());
    }

    /// Replaces the content with children, turning the node into a branch.
    pub fn set_children(&mut self, children: Vec<Node>) {
        self.content = NodeContent::Children(children);
    }

    /// Appends a child. An empty leaf is promoted to a branch first; pushing
    /// onto a non-empty leaf would create mixed content and is a usage
    /// error.
    pub fn push_child(&mut self, child: Node) {
        match &mut self.content {
            NodeContent::Children(c) => c.push(child),
            NodeContent::Leaf(s) => {
                assert!(s.is_empty(), "cannot add children to a non-empty leaf");
                self.content = NodeContent::Children(vec![child]);
            }
        }
    }

    /// The string content of the subtree: the leaf text, or the
    /// concatenation of the children's contents.
    pub fn content(&self) -> String {
        let mut out = String::new();
        self.write_content(&mut out);
        out
    }

    fn write_content(&self, out: &mut String) {
        match &self.content {
            NodeContent::Leaf(s) => out.push_str(s),
            NodeContent::Children(c) => {
                for child in c {
                    child.write_content(out);
                }
            }
        }
    }

    /// Length in bytes of the subtree's string content.
    pub fn strlen(&self) -> usize {
        match &self.content {
            NodeContent::Leaf(s) => s.len(),
            NodeContent::Children(c) => c.iter().map(Node::strlen).sum(),
        }
    }

    /// The node's position in the document, if it has been assigned.
    pub fn pos(&self) -> Option<usize> {
        self.pos
    }

    /// Initializes the position, propagating positions to all descendants
    /// whose positions are still unassigned (using the lengths of preceding
    /// siblings to compute their offsets).
    ///
    /// Positions are write-once; re-assignment to a different value is a
    /// programming error and panics.
    pub fn with_pos(mut self, pos: usize) -> Self {
        self.assign_pos(pos);
        self
    }

    /// In-place variant of [`Node::with_pos`].
    pub fn assign_pos(&mut self, pos: usize) {
        if let Some(existing) = self.pos {
            assert!(
                existing == pos,
                "position {existing} cannot be reassigned to {pos}"
            );
            return;
        }
        self.pos = Some(pos);
        self.init_child_pos();
    }

    fn init_child_pos(&mut self) {
        let mut offset = match self.pos {
            Some(p) => p,
            None => return,
        };
        if let NodeContent::Children(children) = &mut self.content {
            for child in children {
                match child.pos {
                    Some(p) => offset = p + child.strlen(),
                    None => {
                        child.assign_pos(offset);
                        offset += child.strlen();
                    }
                }
            }
        }
    }

    /// Overrides an already assigned position. Reserved for error-recovery
    /// artifacts whose placeholder position must be replaced by the
    /// location where the violation actually occurred.
    pub fn repositioned(mut self, pos: usize) -> Self {
        self.pos = None;
        self.assign_pos(pos);
        self
    }

    /// Sets the node's own position, overriding any previous value and
    /// leaving descendants untouched. This is the parser guard's way of
    /// anchoring a result at its call location; descendant positions were
    /// anchored when the descendants were produced. Tree construction code
    /// should use [`Node::with_pos`].
    pub fn anchor_pos(&mut self, pos: usize) {
        self.pos = Some(pos);
    }

    /// Identity handle assigned when an error was attached to this node
    /// via the root's error registry; `None` for error-free nodes.
    pub fn error_handle(&self) -> Option<u32> {
        self.error_id
    }

    pub fn has_attrs(&self) -> bool {
        self.attrs.as_ref().is_some_and(|a| !a.is_empty())
    }

    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attrs.as_ref()?.get(name).map(String::as_str)
    }

    pub fn set_attr(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.attrs
            .get_or_insert_with(Default::default)
            .insert(name.into(), value.into());
    }

    /// Attribute iteration in insertion order.
    pub fn attrs(&self) -> impl Iterator<Item = (&str, &str)> {
        self.attrs
            .iter()
            .flat_map(|a| a.iter())
            .map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn with_attr(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.set_attr(name, value);
        self
    }

    /// Value equality: same name, same attributes (order-insensitive) and
    /// equal content or children. Positions do not participate.
    pub fn equals(&self, other: &Node) -> bool {
        if self.name != other.name || !self.compare_attrs(other) {
            return false;
        }
        match (&self.content, &other.content) {
            (NodeContent::Leaf(a), NodeContent::Leaf(b)) => a == b,
            (NodeContent::Children(a), NodeContent::Children(b)) => {
                a.len() == b.len() && a.iter().zip(b).all(|(x, y)| x.equals(y))
            }
            _ => false,
        }
    }

    fn compare_attrs(&self, other: &Node) -> bool {
        let mine: Vec<_> = self.attrs().collect();
        let theirs: Vec<_> = other.attrs().collect();
        if mine.len() != theirs.len() {
            return false;
        }
        mine.iter().all(|(k, v)| other.attr(k) == Some(v))
    }

    /// Depth-first pre-order traversal of the subtree, including `self`.
    pub fn iter(&self) -> NodeIter<'_> {
        NodeIter { stack: vec![self] }
    }

    /// First node in the subtree satisfying `pred` (pre-order), including
    /// `self` when `include_root` is set.
    pub fn pick(&self, pred: impl Fn(&Node) -> bool, include_root: bool) -> Option<&Node> {
        for node in self.iter() {
            if !include_root && std::ptr::eq(node, self) {
                continue;
            }
            if pred(node) {
                return Some(node);
            }
        }
        None
    }

    /// First direct child satisfying `pred`, searching from the back when
    /// `reverse` is set.
    pub fn pick_child(&self, pred: impl Fn(&Node) -> bool, reverse: bool) -> Option<&Node> {
        if reverse {
            self.children().iter().rev().find(|n| pred(n))
        } else {
            self.children().iter().find(|n| pred(n))
        }
    }

    /// Mutable variant of [`Node::pick_child`].
    pub fn pick_child_mut(&mut self, pred: impl Fn(&Node) -> bool) -> Option<&mut Node> {
        self.children_mut().iter_mut().find(|n| pred(n))
    }

    /// All nodes in the subtree satisfying `pred`, in pre-order.
    pub fn select(&self, pred: impl Fn(&Node) -> bool) -> Vec<&Node> {
        self.iter().filter(|n| pred(n)).collect()
    }

    /// The last leaf of the subtree, or `self` if it is one.
    pub fn last_leaf(&self) -> &Node {
        match &self.content {
            NodeContent::Leaf(_) => self,
            NodeContent::Children(c) => match c.last() {
                Some(child) => child.last_leaf(),
                None => self,
            },
        }
    }
}

impl PartialEq for Node {
    fn eq(&self, other: &Self) -> bool {
        self.equals(other)
    }
}

impl Eq for Node {}

/// Pre-order iterator over a subtree.
pub struct NodeIter<'a> {
    stack: Vec<&'a Node>,
}

impl<'a> Iterator for NodeIter<'a> {
    type Item = &'a Node;

    fn next(&mut self) -> Option<&'a Node> {
        let node = self.stack.pop()?;
        if let NodeContent::Children(c) = &node.content {
            self.stack.extend(c.iter().rev());
        }
        Some(node)
    }
}

fn empty_name() -> NodeName {
    use std::sync::OnceLock;
    static NAME: OnceLock<NodeName> = OnceLock::new();
    NAME.get_or_init(|| Arc::from(EMPTY_TAG)).clone()
}

fn zombie_name() -> NodeName {
    use std::sync::OnceLock;
    static NAME: OnceLock<NodeName> = OnceLock::new();
    NAME.get_or_init(|| Arc::from(ZOMBIE_TAG)).clone()
}
