#![cfg_attr(coverage_nightly, feature(coverage_attribute))]

//! Core data structures for the Graft parser toolkit.
//!
//! Two halves:
//! - the **syntax tree**: [`Node`] (leaf-XOR-branch content, lazily created
//!   attributes, write-once source positions) and [`RootNode`] (the tree
//!   plus the global error registry);
//! - the **document**: [`SourceText`] with the windowed search operations
//!   the parser runtime needs, and the error-code table shared by runtime
//!   and static analysis.

pub mod error;
pub mod node;
pub mod root;
pub mod serialize;
pub mod source;

pub use error::{Error, ErrorCode, Severity};
pub use node::{Node, NodeContent, NodeName, EMPTY_TAG, TEXT_TAG, ZOMBIE_TAG};
pub use root::{RootNode, SourceMapFn};
pub use serialize::{parse_sxpr, SxprError};
pub use source::{compile_anchored, mixin_comment, SourceText, INFINITE};

#[cfg(test)]
mod error_tests;
#[cfg(test)]
mod node_tests;
#[cfg(test)]
mod root_tests;
#[cfg(test)]
mod serialize_tests;
