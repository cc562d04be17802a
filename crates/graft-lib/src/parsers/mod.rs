//! The parser graph: arena ids, the parser record, and the closed set of
//! parser shapes.
//!
//! Parsers form a cyclic directed graph (cycles go through `Forward`). The
//! graph is owned by the [`Grammar`](crate::grammar::Grammar) as an arena of
//! [`Parser`] records addressed by [`ParserId`]; parser-to-parser references
//! are plain ids. The per-variant parsing logic lives in the sibling
//! modules (`leaf`, `combinators`, `flow`, `context`) as `Engine` methods.

use std::sync::Arc;

use graft_core::error::ErrorCode;
use graft_core::node::{Node, NodeName};
use graft_core::source::INFINITE;
use regex::Regex;

pub(crate) mod combinators;
pub(crate) mod context;
pub(crate) mod flow;
pub(crate) mod leaf;

/// Mandatory-index value meaning "no element is mandatory".
pub const NO_MANDATORY: usize = INFINITE;

/// Handle of a parser in its grammar's arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(transparent)]
pub struct ParserId(pub(crate) u32);

impl ParserId {
    #[inline]
    pub(crate) fn index(self) -> usize {
        self.0 as usize
    }
}

/// A user-supplied parsing function: receives the rest of the document and
/// yields a node covering a prefix of it, `None` for a non-match, or an
/// error message if it cannot operate.
pub type CustomParseFn = Arc<dyn Fn(&str) -> Result<Option<Node>, String> + Send + Sync>;

/// A user-supplied reentry search: `(rest, start, end)` to
/// `(match offset relative to rest, match length)`, `(-1, _)` when nothing
/// was found.
pub type ReentrySearchFn = Arc<dyn Fn(&str, usize, usize) -> (isize, usize) + Send + Sync>;

/// Decides whether the upcoming text can be derived from the value stack of
/// a variable; used by `Retrieve` and `Pop`.
#[derive(Clone)]
pub enum MatchPolicy {
    /// The text must start with the most recent value on the stack.
    LastValue,
    /// Like `LastValue`, but an empty match is produced instead of a
    /// failure; never yields a non-match.
    OptionalLastValue,
    /// Opening brackets on the stack match their closing counterparts.
    MatchingBracket,
    /// User-supplied function from `(text, stack)` to the matched prefix.
    Custom(Arc<dyn Fn(&str, &[String]) -> Option<String> + Send + Sync>),
}

impl MatchPolicy {
    /// True for policies that succeed with an empty match rather than
    /// failing when there is nothing to retrieve.
    pub(crate) fn is_optional(&self) -> bool {
        matches!(self, MatchPolicy::OptionalLastValue)
    }

    pub(crate) fn apply(&self, text: &str, stack: &[String]) -> Option<String> {
        match self {
            MatchPolicy::LastValue => {
                let value = stack.last()?;
                text.starts_with(value.as_str()).then(|| value.clone())
            }
            MatchPolicy::OptionalLastValue => {
                let value = stack.last()?;
                Some(if text.starts_with(value.as_str()) {
                    value.clone()
                } else {
                    String::new()
                })
            }
            MatchPolicy::MatchingBracket => {
                let value = stack.last()?;
                let closing: String = value
                    .chars()
                    .map(|c| match c {
                        '(' => ')',
                        '[' => ']',
                        '{' => '}',
                        '<' => '>',
                        other => other,
                    })
                    .collect();
                text.starts_with(closing.as_str()).then_some(closing)
            }
            MatchPolicy::Custom(f) => f(text, stack),
        }
    }
}

impl std::fmt::Debug for MatchPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MatchPolicy::LastValue => write!(f, "LastValue"),
            MatchPolicy::OptionalLastValue => write!(f, "OptionalLastValue"),
            MatchPolicy::MatchingBracket => write!(f, "MatchingBracket"),
            MatchPolicy::Custom(_) => write!(f, "Custom(..)"),
        }
    }
}

/// A compiled leaf pattern: the original text of the pattern (for display)
/// plus its anchored compilation.
#[derive(Debug, Clone)]
pub(crate) struct LeafPattern {
    pub pattern: String,
    pub rx: Regex,
}

/// One capture group of a `SmartRe` parser.
#[derive(Debug, Clone)]
pub(crate) struct GroupSpec {
    pub name: NodeName,
    pub disposable: bool,
}

/// What a `Lookbehind` matches against the reversed prefix.
#[derive(Debug, Clone)]
pub(crate) enum BehindMatcher {
    Text(Box<str>),
    Pattern(LeafPattern),
}

/// The closed set of parser shapes.
#[derive(Clone)]
pub(crate) enum ParserKind {
    /// Matches empty input; never fails.
    Always,
    /// Never matches.
    Never,
    /// Consumes exactly one character; fails at the end of the document.
    AnyChar,
    Text(Box<str>),
    IgnoreCase { original: Box<str>, lowered: Box<str> },
    RegExp(LeafPattern),
    /// Like `RegExp`, but an empty success replaces a non-match.
    Whitespace { pattern: LeafPattern, keep_comments: bool },
    /// One regex, one child node per capture group.
    SmartRe { pattern: LeafPattern, groups: Vec<GroupSpec> },
    Custom(CustomParseFn),
    /// Consumes nothing, deposits an error at the current location.
    Err { template: String, code: ErrorCode },
    Option(ParserId),
    ZeroOrMore(ParserId),
    OneOrMore(ParserId),
    Counted { inner: ParserId, bounds: (usize, usize) },
    Series { items: Vec<ParserId>, mandatory: usize },
    Alternative(Vec<ParserId>),
    Interleave { items: Vec<ParserId>, reps: Vec<(usize, usize)>, mandatory: usize },
    Lookahead { inner: ParserId, negative: bool },
    Lookbehind { matcher: BehindMatcher, negative: bool },
    Capture { inner: ParserId, zero_length_warning: bool },
    Retrieve { symbol: ParserId, policy: MatchPolicy },
    Pop { symbol: ParserId, policy: MatchPolicy },
    /// Wraps the result of another parser in a new named node.
    Synonym(ParserId),
    /// Late-bound reference; the hook for recursive definitions and the
    /// seat of the left-recursion algorithm.
    Forward(Option<ParserId>),
}

/// How the uniform entry treats a parser's results.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum MemoPolicy {
    /// Memoize with the full suspension discipline (combined parsers).
    Full,
    /// Memoize without the suspension bookkeeping (leaf matchers that
    /// cannot contain captures).
    Leaf,
    /// Never memoize (cheap literal matchers and context-sensitive
    /// parsers, whose results depend on the variable stacks).
    Never,
}

/// A parser record in the grammar arena.
#[derive(Clone)]
pub(crate) struct Parser {
    /// Symbol name; empty for unnamed parsers.
    pub name: String,
    /// Name given to produced nodes: the symbol name, or the colon-prefixed
    /// type tag for unnamed parsers.
    pub node_name: NodeName,
    pub disposable: bool,
    pub drop_content: bool,
    pub kind: ParserKind,
}

impl Parser {
    pub fn new(kind: ParserKind) -> Self {
        let node_name: NodeName = Arc::from(kind.type_tag());
        Parser {
            name: String::new(),
            node_name,
            disposable: true,
            drop_content: false,
            kind,
        }
    }

    /// The colon-prefixed tag identifying the parser's shape.
    pub fn type_tag(&self) -> &'static str {
        self.kind.type_tag()
    }

    pub fn memo_policy(&self) -> MemoPolicy {
        match self.kind {
            ParserKind::Always
            | ParserKind::Never
            | ParserKind::AnyChar
            | ParserKind::Text(_)
            | ParserKind::IgnoreCase { .. }
            | ParserKind::Capture { .. }
            | ParserKind::Retrieve { .. }
            | ParserKind::Pop { .. } => MemoPolicy::Never,
            ParserKind::RegExp(_) | ParserKind::Whitespace { .. } | ParserKind::Err { .. } => {
                MemoPolicy::Leaf
            }
            _ => MemoPolicy::Full,
        }
    }

    /// Ids of the directly contained parsers.
    pub fn sub_parsers(&self) -> Vec<ParserId> {
        match &self.kind {
            ParserKind::Option(p)
            | ParserKind::ZeroOrMore(p)
            | ParserKind::OneOrMore(p)
            | ParserKind::Counted { inner: p, .. }
            | ParserKind::Lookahead { inner: p, .. }
            | ParserKind::Capture { inner: p, .. }
            | ParserKind::Retrieve { symbol: p, .. }
            | ParserKind::Pop { symbol: p, .. }
            | ParserKind::Synonym(p) => vec![*p],
            ParserKind::Series { items, .. }
            | ParserKind::Alternative(items)
            | ParserKind::Interleave { items, .. } => items.clone(),
            ParserKind::Forward(referent) => referent.iter().copied().collect(),
            _ => Vec::new(),
        }
    }

    pub fn is_context_sensitive(&self) -> bool {
        matches!(
            self.kind,
            ParserKind::Capture { .. } | ParserKind::Retrieve { .. } | ParserKind::Pop { .. }
        )
    }

    /// True for parsers whose match never consumes input by construction.
    pub fn is_flow(&self) -> bool {
        matches!(
            self.kind,
            ParserKind::Lookahead { .. } | ParserKind::Lookbehind { .. }
        )
    }

    /// Heuristic: does this parser behave like a lookahead for the purpose
    /// of end-of-input diagnostics?
    pub fn is_lookahead_like(&self) -> bool {
        match &self.kind {
            ParserKind::Lookahead { .. } => true,
            ParserKind::RegExp(p) | ParserKind::SmartRe { pattern: p, .. } => {
                p.pattern.starts_with("(?=") || p.pattern.starts_with("(?!")
            }
            _ => false,
        }
    }
}

impl ParserKind {
    pub fn type_tag(&self) -> &'static str {
        match self {
            ParserKind::Always => ":Always",
            ParserKind::Never => ":Never",
            ParserKind::AnyChar => ":AnyChar",
            ParserKind::Text(_) => ":Text",
            ParserKind::IgnoreCase { .. } => ":IgnoreCase",
            ParserKind::RegExp(_) => ":RegExp",
            ParserKind::Whitespace { .. } => ":Whitespace",
            ParserKind::SmartRe { .. } => ":SmartRE",
            ParserKind::Custom(_) => ":Custom",
            ParserKind::Err { .. } => ":ERR",
            ParserKind::Option(_) => ":Option",
            ParserKind::ZeroOrMore(_) => ":ZeroOrMore",
            ParserKind::OneOrMore(_) => ":OneOrMore",
            ParserKind::Counted { .. } => ":Counted",
            ParserKind::Series { .. } => ":Series",
            ParserKind::Alternative(_) => ":Alternative",
            ParserKind::Interleave { .. } => ":Interleave",
            ParserKind::Lookahead { negative: false, .. } => ":Lookahead",
            ParserKind::Lookahead { negative: true, .. } => ":NegativeLookahead",
            ParserKind::Lookbehind { negative: false, .. } => ":Lookbehind",
            ParserKind::Lookbehind { negative: true, .. } => ":NegativeLookbehind",
            ParserKind::Capture { .. } => ":Capture",
            ParserKind::Retrieve { .. } => ":Retrieve",
            ParserKind::Pop { .. } => ":Pop",
            ParserKind::Synonym(_) => ":Synonym",
            ParserKind::Forward(_) => ":Forward",
        }
    }
}

impl std::fmt::Debug for Parser {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}{}", self.name, self.type_tag())
    }
}
