#![cfg_attr(coverage_nightly, feature(coverage_attribute))]

//! Graft: a packrat parser-combinator runtime with error recovery.
//!
//! Grammars are graphs of combinator parsers built with a
//! [`GrammarBuilder`]; parsing a document yields a concrete syntax tree
//! decorated with errors — parse-time failures are reported on the tree,
//! never thrown. The runtime memoizes parser results, resolves left
//! recursion with the seed-and-grow algorithm, supports context-sensitive
//! parsers with backtracking rollback, and recovers from missing mandatory
//! elements via configurable reentry points.
//!
//! # Example
//!
//! ```
//! use graft_lib::GrammarBuilder;
//!
//! let mut g = GrammarBuilder::new();
//! let digits = g.regex(r"[0-9]+");
//! let number = g.define("number", digits);
//! let grammar = g.finish(number).expect("well-formed grammar");
//!
//! let tree = grammar.parse("42").expect("document fits in memory");
//! assert!(!tree.has_errors());
//! assert_eq!(tree.content(), "42");
//! ```

pub mod analyze;
pub(crate) mod engine;
pub mod grammar;
pub mod parsers;
pub mod printer;
pub mod recover;
pub mod reduce;
pub mod trace;

pub use analyze::{AnalysisError, GrammarError};
pub use grammar::{Grammar, GrammarBuilder, ParseOptions, ParseOutcome};
pub use parsers::{CustomParseFn, MatchPolicy, ParserId, ReentrySearchFn, NO_MANDATORY};
pub use printer::{ErrorsPrinter, PrintableErrors};
pub use recover::{MsgCondition, ReentryRule};
pub use reduce::Reduction;
pub use trace::{CallItem, History, HistoryRecord, HistoryStatus};

pub use graft_core::error;
pub use graft_core::node::{Node, EMPTY_TAG, TEXT_TAG, ZOMBIE_TAG};
pub use graft_core::root::RootNode;
pub use graft_core::serialize::parse_sxpr;
pub use graft_core::source::mixin_comment;

/// Errors that abort a parse before it starts.
#[derive(Debug, Clone, thiserror::Error)]
pub enum Error {
    /// The document exceeds the representable location range.
    #[error("document of size {size} exceeds maximum size of {max}")]
    DocumentTooLarge { size: usize, max: usize },

    /// The requested start symbol is not defined in the grammar.
    #[error("start symbol \"{0}\" is not defined in this grammar")]
    UnknownStartSymbol(String),
}

/// Result type for parse invocations.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod context_tests;
#[cfg(test)]
mod engine_tests;
#[cfg(test)]
mod grammar_tests;
#[cfg(test)]
mod printer_tests;
