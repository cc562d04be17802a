//! Grammar construction and the parsing entry points.
//!
//! A [`GrammarBuilder`] allocates parsers into an arena and wires them by
//! [`ParserId`]; [`GrammarBuilder::finish`] freezes the graph, computes the
//! derived tables (symbol association, optionality, zero-length captures)
//! and runs static analysis. The resulting [`Grammar`] is immutable: all
//! per-parse state lives in the engine, so one grammar can parse any
//! number of documents, including concurrently from several threads.

use std::sync::Arc;

use fxhash::FxHashSet;
use indexmap::IndexMap;
use regex::Regex;

use graft_core::error::{extract_error_code, ErrorCode, ERROR};
use graft_core::node::{Node, NodeName};
use graft_core::root::{RootNode, SourceMapFn};
use graft_core::source::{compile_anchored, SourceText, INFINITE};

use crate::analyze::{self, AnalysisError, GrammarError};
use crate::engine::Engine;
use crate::parsers::{
    BehindMatcher, CustomParseFn, GroupSpec, LeafPattern, MatchPolicy, Parser, ParserId,
    ParserKind, NO_MANDATORY,
};
use crate::recover::{MsgCondition, ReentryRule};
use crate::reduce::Reduction;
use crate::trace::History;
use crate::Error;

/// Options for a single parse run.
#[derive(Clone)]
pub struct ParseOptions {
    /// Start symbol; the grammar's root when absent.
    pub start: Option<String>,
    /// Report an error if the start parser does not consume the whole
    /// document.
    pub complete_match: bool,
    /// Maps parse positions back to original source positions (needed
    /// after preprocessing).
    pub source_mapping: Option<Arc<SourceMapFn>>,
    /// Record a history log of all parser calls.
    pub history_tracking: bool,
    /// Attach resume/skip notices to the tree during error recovery.
    pub resume_notices: bool,
}

impl Default for ParseOptions {
    fn default() -> Self {
        ParseOptions {
            start: None,
            complete_match: true,
            source_mapping: None,
            history_tracking: false,
            resume_notices: false,
        }
    }
}

impl ParseOptions {
    pub fn start(mut self, symbol: impl Into<String>) -> Self {
        self.start = Some(symbol.into());
        self
    }

    /// Accept matches that cover only a prefix of the document.
    pub fn prefix_match(mut self) -> Self {
        self.complete_match = false;
        self
    }

    pub fn source_mapping(mut self, mapping: Arc<SourceMapFn>) -> Self {
        self.source_mapping = Some(mapping);
        self
    }

    pub fn history(mut self) -> Self {
        self.history_tracking = true;
        self
    }

    /// Implies history tracking.
    pub fn resume_notices(mut self) -> Self {
        self.history_tracking = true;
        self.resume_notices = true;
        self
    }
}

/// Result of [`Grammar::run`]: the tree plus the optional history log.
#[derive(Debug)]
pub struct ParseOutcome {
    pub root: RootNode,
    pub history: History,
}

#[derive(Debug, Clone)]
pub(crate) struct GrammarConfig {
    pub reduction: Reduction,
    pub left_recursion: bool,
    /// Reentry search window; negative means the whole remaining text.
    pub search_window: isize,
    pub max_dropouts: usize,
    pub recursion_limit: usize,
    pub infinite_loop_warning: bool,
}

impl Default for GrammarConfig {
    fn default() -> Self {
        GrammarConfig {
            reduction: Reduction::Flatten,
            left_recursion: true,
            search_window: -1,
            max_dropouts: 3,
            recursion_limit: 1024,
            infinite_loop_warning: true,
        }
    }
}

/// Builds the parser graph of a [`Grammar`].
pub struct GrammarBuilder {
    parsers: Vec<Parser>,
    resume_rules: IndexMap<String, Vec<ReentryRule>>,
    skip_rules: IndexMap<String, Vec<ReentryRule>>,
    error_messages: IndexMap<String, Vec<(MsgCondition, String)>>,
    comment_pattern: Option<String>,
    config: GrammarConfig,
    construction_errors: Vec<AnalysisError>,
}

impl Default for GrammarBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl GrammarBuilder {
    pub fn new() -> Self {
        GrammarBuilder {
            parsers: Vec::new(),
            resume_rules: IndexMap::new(),
            skip_rules: IndexMap::new(),
            error_messages: IndexMap::new(),
            comment_pattern: None,
            config: GrammarConfig::default(),
            construction_errors: Vec::new(),
        }
    }

    fn add(&mut self, kind: ParserKind) -> ParserId {
        let id = ParserId(self.parsers.len() as u32);
        self.parsers.push(Parser::new(kind));
        id
    }

    fn construction_error(&mut self, id: Option<ParserId>, message: String, code: ErrorCode) {
        let parser = id
            .map(|id| format!("parser #{}", id.0))
            .unwrap_or_else(|| "grammar".to_string());
        self.construction_errors.push(AnalysisError {
            symbol: id
                .map(|id| self.parsers[id.index()].name.clone())
                .unwrap_or_default(),
            parser,
            error: graft_core::error::Error::new(message, 0, code),
        });
    }

    // ----- leaf parsers --------------------------------------------------

    pub fn always(&mut self) -> ParserId {
        self.add(ParserKind::Always)
    }

    pub fn never(&mut self) -> ParserId {
        self.add(ParserKind::Never)
    }

    pub fn any_char(&mut self) -> ParserId {
        self.add(ParserKind::AnyChar)
    }

    pub fn text(&mut self, text: &str) -> ParserId {
        self.add(ParserKind::Text(text.into()))
    }

    pub fn ignore_case(&mut self, text: &str) -> ParserId {
        self.add(ParserKind::IgnoreCase {
            original: text.into(),
            lowered: text.to_lowercase().into(),
        })
    }

    fn leaf_pattern(&mut self, pattern: &str) -> Option<LeafPattern> {
        match compile_anchored(pattern) {
            Ok(rx) => Some(LeafPattern {
                pattern: pattern.to_string(),
                rx,
            }),
            Err(err) => {
                self.construction_error(
                    None,
                    format!("regular expression /{pattern}/ does not compile: {err}"),
                    graft_core::error::BAD_REGULAR_EXPRESSION,
                );
                None
            }
        }
    }

    pub fn regex(&mut self, pattern: &str) -> ParserId {
        match self.leaf_pattern(pattern) {
            Some(pattern) => self.add(ParserKind::RegExp(pattern)),
            None => self.add(ParserKind::Never),
        }
    }

    pub fn whitespace(&mut self, pattern: &str) -> ParserId {
        match self.leaf_pattern(pattern) {
            Some(pattern) => self.add(ParserKind::Whitespace {
                pattern,
                keep_comments: false,
            }),
            None => self.add(ParserKind::Never),
        }
    }

    /// Whitespace that, when dropped, still preserves stretches containing
    /// a comment under the name `comment__`.
    pub fn comment_keeping_whitespace(&mut self, pattern: &str) -> ParserId {
        match self.leaf_pattern(pattern) {
            Some(pattern) => self.add(ParserKind::Whitespace {
                pattern,
                keep_comments: true,
            }),
            None => self.add(ParserKind::Never),
        }
    }

    /// A regex parser that produces one child node per capture group.
    /// Named groups tag their child with the group name; unnamed groups
    /// yield disposable `:RegExp` children.
    pub fn smart_re(&mut self, pattern: &str) -> ParserId {
        let Some(compiled) = self.leaf_pattern(pattern) else {
            return self.add(ParserKind::Never);
        };
        let groups: Vec<GroupSpec> = compiled
            .rx
            .capture_names()
            .skip(1)
            .map(|name| match name {
                Some(name) => GroupSpec {
                    name: Arc::from(name),
                    disposable: false,
                },
                None => GroupSpec {
                    name: Arc::from(":RegExp"),
                    disposable: true,
                },
            })
            .collect();
        self.add(ParserKind::SmartRe {
            pattern: compiled,
            groups,
        })
    }

    pub fn custom(
        &mut self,
        parse_fn: impl Fn(&str) -> Result<Option<Node>, String> + Send + Sync + 'static,
    ) -> ParserId {
        let parse_fn: CustomParseFn = Arc::new(parse_fn);
        self.add(ParserKind::Custom(parse_fn))
    }

    /// A pseudo-parser that consumes nothing and deposits an error. The
    /// message may override the error code with a `"<code>:"` prefix.
    pub fn err(&mut self, message: &str) -> ParserId {
        let (template, code) = extract_error_code(message, ERROR);
        self.add(ParserKind::Err { template, code })
    }

    // ----- combinators ---------------------------------------------------

    pub fn option(&mut self, inner: ParserId) -> ParserId {
        self.add(ParserKind::Option(inner))
    }

    pub fn zero_or_more(&mut self, inner: ParserId) -> ParserId {
        self.add(ParserKind::ZeroOrMore(inner))
    }

    pub fn one_or_more(&mut self, inner: ParserId) -> ParserId {
        self.add(ParserKind::OneOrMore(inner))
    }

    pub fn counted(&mut self, inner: ParserId, lo: usize, hi: usize) -> ParserId {
        self.add(ParserKind::Counted {
            inner,
            bounds: (lo, hi),
        })
    }

    pub fn series(&mut self, items: &[ParserId]) -> ParserId {
        self.series_with_mandatory(items, NO_MANDATORY)
    }

    /// A series whose elements from `mandatory` on may no longer simply
    /// fail: their failure becomes a reportable, recoverable error.
    pub fn series_with_mandatory(&mut self, items: &[ParserId], mandatory: usize) -> ParserId {
        if items.is_empty() {
            self.construction_error(
                None,
                "a series needs at least one element".to_string(),
                graft_core::error::BAD_MANDATORY_SETUP,
            );
        }
        self.add(ParserKind::Series {
            items: items.to_vec(),
            mandatory,
        })
    }

    /// `Series(p, mandatory = 0)`: the element must match, anything else
    /// is an error.
    pub fn required(&mut self, inner: ParserId) -> ParserId {
        self.series_with_mandatory(&[inner], 0)
    }

    pub fn alternative(&mut self, items: &[ParserId]) -> ParserId {
        if items.is_empty() {
            self.construction_error(
                None,
                "an alternative needs at least one branch".to_string(),
                graft_core::error::BAD_ORDER_OF_ALTERNATIVES,
            );
        }
        self.add(ParserKind::Alternative(items.to_vec()))
    }

    pub fn interleave(&mut self, items: &[ParserId]) -> ParserId {
        let reps = vec![(1, 1); items.len()];
        self.interleave_with(items, reps, NO_MANDATORY)
    }

    pub fn interleave_with(
        &mut self,
        items: &[ParserId],
        reps: Vec<(usize, usize)>,
        mandatory: usize,
    ) -> ParserId {
        if items.is_empty() || items.len() != reps.len() {
            self.construction_error(
                None,
                "number of repetition ranges must equal the number of interleaved parsers"
                    .to_string(),
                graft_core::error::BAD_REPETITION_COUNT,
            );
        }
        self.add(ParserKind::Interleave {
            items: items.to_vec(),
            reps,
            mandatory,
        })
    }

    // ----- flow control --------------------------------------------------

    pub fn lookahead(&mut self, inner: ParserId) -> ParserId {
        self.add(ParserKind::Lookahead {
            inner,
            negative: false,
        })
    }

    pub fn negative_lookahead(&mut self, inner: ParserId) -> ParserId {
        self.add(ParserKind::Lookahead {
            inner,
            negative: true,
        })
    }

    pub fn lookbehind(&mut self, inner: ParserId) -> ParserId {
        let matcher = self.behind_matcher(inner);
        self.add(ParserKind::Lookbehind {
            matcher,
            negative: false,
        })
    }

    pub fn negative_lookbehind(&mut self, inner: ParserId) -> ParserId {
        let matcher = self.behind_matcher(inner);
        self.add(ParserKind::Lookbehind {
            matcher,
            negative: true,
        })
    }

    /// Lookbehind matches run against the reversed text to the left, so
    /// only plain text and regex parsers can serve as their argument.
    fn behind_matcher(&mut self, inner: ParserId) -> BehindMatcher {
        let mut cursor = inner;
        loop {
            match &self.parsers[cursor.index()].kind {
                ParserKind::Synonym(next) => cursor = *next,
                ParserKind::Text(text) => return BehindMatcher::Text(text.clone()),
                ParserKind::RegExp(pattern) | ParserKind::Whitespace { pattern, .. } => {
                    return BehindMatcher::Pattern(pattern.clone())
                }
                _ => {
                    self.construction_error(
                        Some(inner),
                        "lookbehind requires a text or regex parser".to_string(),
                        graft_core::error::BAD_MANDATORY_SETUP,
                    );
                    return BehindMatcher::Text("".into());
                }
            }
        }
    }

    // ----- context-sensitive parsers -------------------------------------

    pub fn capture(&mut self, inner: ParserId) -> ParserId {
        self.add(ParserKind::Capture {
            inner,
            zero_length_warning: true,
        })
    }

    pub fn capture_allowing_zero_length(&mut self, inner: ParserId) -> ParserId {
        self.add(ParserKind::Capture {
            inner,
            zero_length_warning: false,
        })
    }

    pub fn retrieve(&mut self, symbol: ParserId) -> ParserId {
        self.retrieve_with(symbol, MatchPolicy::LastValue)
    }

    pub fn retrieve_with(&mut self, symbol: ParserId, policy: MatchPolicy) -> ParserId {
        self.add(ParserKind::Retrieve { symbol, policy })
    }

    pub fn pop(&mut self, symbol: ParserId) -> ParserId {
        self.pop_with(symbol, MatchPolicy::LastValue)
    }

    pub fn pop_with(&mut self, symbol: ParserId, policy: MatchPolicy) -> ParserId {
        self.add(ParserKind::Pop { symbol, policy })
    }

    // ----- naming and structure ------------------------------------------

    pub fn synonym(&mut self, inner: ParserId) -> ParserId {
        self.add(ParserKind::Synonym(inner))
    }

    /// Declares a parser that is bound later with [`GrammarBuilder::set`];
    /// the hook for recursive definitions.
    pub fn forward(&mut self) -> ParserId {
        self.add(ParserKind::Forward(None))
    }

    /// Binds a forward declaration to its definition.
    pub fn set(&mut self, forward: ParserId, definition: ParserId) {
        match &mut self.parsers[forward.index()].kind {
            ParserKind::Forward(slot) => *slot = Some(definition),
            _ => self.construction_error(
                Some(forward),
                "set() requires a forward parser".to_string(),
                graft_core::error::UNBOUND_FORWARD,
            ),
        }
    }

    /// Names a parser, making it a symbol of the grammar. A leading colon
    /// keeps the symbol's nodes disposable (`":tag"`).
    pub fn define(&mut self, name: &str, id: ParserId) -> ParserId {
        let (pname, node_name, disposable) = match name.strip_prefix(':') {
            Some(bare) => (bare.to_string(), name.to_string(), true),
            None => (name.to_string(), name.to_string(), false),
        };
        let existing = self.parsers[id.index()].name.clone();
        if !existing.is_empty() && existing != pname {
            self.construction_error(
                Some(id),
                format!("parser name cannot be reassigned: \"{existing}\" -> \"{pname}\""),
                graft_core::error::BAD_MANDATORY_SETUP,
            );
            return id;
        }
        let p = &mut self.parsers[id.index()];
        p.name = pname;
        p.node_name = Arc::from(node_name.as_str());
        p.disposable = disposable;
        id
    }

    /// Marks a parser's matches as dropped from the tree. Only disposable
    /// parsers may drop their content; naming a parser and dropping it is
    /// contradictory and rejected.
    pub fn drop(&mut self, id: ParserId) -> ParserId {
        if !self.parsers[id.index()].disposable {
            self.construction_error(
                Some(id),
                format!(
                    "content of named parser \"{}\" cannot be dropped",
                    self.parsers[id.index()].name
                ),
                graft_core::error::DROP_OF_NAMED_PARSER,
            );
            return id;
        }
        self.parsers[id.index()].drop_content = true;
        id
    }

    // ----- per-symbol rule tables ----------------------------------------

    /// Rules for finding the reentry point after an error has fallen
    /// through to the named symbol.
    pub fn resume(&mut self, symbol: &str, rules: Vec<ReentryRule>) {
        self.resume_rules.insert(symbol.to_string(), rules);
    }

    /// Rules for skipping ahead within the named symbol when one of its
    /// mandatory elements fails.
    pub fn skip(&mut self, symbol: &str, rules: Vec<ReentryRule>) {
        self.skip_rules.insert(symbol.to_string(), rules);
    }

    /// Custom error message for mandatory violations inside `symbol`,
    /// applying when `condition` matches the text after the violation.
    /// `{0}` stands for the expected element, `{1}` for the found text.
    pub fn error_message(&mut self, symbol: &str, condition: MsgCondition, template: &str) {
        self.error_messages
            .entry(symbol.to_string())
            .or_default()
            .push((condition, template.to_string()));
    }

    /// Compiles a reentry rule from a pattern, funnelling compile errors
    /// into the construction diagnostics.
    pub fn reentry_pattern(&mut self, pattern: &str) -> ReentryRule {
        match ReentryRule::pattern(pattern) {
            Ok(rule) => rule,
            Err(err) => {
                self.construction_error(
                    None,
                    format!("reentry pattern /{pattern}/ does not compile: {err}"),
                    graft_core::error::BAD_REGULAR_EXPRESSION,
                );
                ReentryRule::Text("\u{0}".to_string())
            }
        }
    }

    // ----- configuration -------------------------------------------------

    pub fn comment(&mut self, pattern: &str) {
        self.comment_pattern = Some(pattern.to_string());
    }

    pub fn reduction(&mut self, level: Reduction) {
        self.config.reduction = level;
    }

    pub fn left_recursion(&mut self, enabled: bool) {
        self.config.left_recursion = enabled;
    }

    pub fn search_window(&mut self, window: isize) {
        self.config.search_window = window;
    }

    pub fn max_dropouts(&mut self, dropouts: usize) {
        self.config.max_dropouts = dropouts;
    }

    pub fn recursion_limit(&mut self, limit: usize) {
        self.config.recursion_limit = limit;
    }

    pub fn infinite_loop_warning(&mut self, enabled: bool) {
        self.config.infinite_loop_warning = enabled;
    }

    // ----- finishing -----------------------------------------------------

    /// Freezes the graph, computes the derived tables and runs static
    /// analysis. Analysis findings of error severity fail construction;
    /// warnings are kept on the grammar.
    pub fn finish(mut self, root: ParserId) -> Result<Grammar, GrammarError> {
        self.propagate_forward_names();

        let mut symbols: IndexMap<String, ParserId> = IndexMap::new();
        for (index, parser) in self.parsers.iter().enumerate() {
            if parser.name.is_empty() {
                continue;
            }
            let id = ParserId(index as u32);
            if symbols.insert(parser.name.clone(), id).is_some() {
                self.construction_errors.push(AnalysisError {
                    symbol: parser.name.clone(),
                    parser: format!("parser #{index}"),
                    error: graft_core::error::Error::new(
                        format!("duplicate symbol \"{}\"", parser.name),
                        0,
                        graft_core::error::BAD_MANDATORY_SETUP,
                    ),
                });
            }
        }

        let comment_rx = match &self.comment_pattern {
            Some(pattern) => match Regex::new(pattern) {
                Ok(rx) => Some(rx),
                Err(err) => {
                    self.construction_error(
                        None,
                        format!("comment pattern /{pattern}/ does not compile: {err}"),
                        graft_core::error::BAD_REGULAR_EXPRESSION,
                    );
                    None
                }
            },
            None => None,
        };

        let associated_symbol = associate_symbols(&self.parsers);
        let optionality: Vec<Option<bool>> = (0..self.parsers.len())
            .map(|i| optionality(&self.parsers, ParserId(i as u32)))
            .collect();
        let mut zero_length_captures: FxHashSet<String> = FxHashSet::default();
        for parser in &self.parsers {
            if let ParserKind::Capture { inner, .. } = parser.kind {
                if optionality[inner.index()] == Some(true) {
                    zero_length_captures.insert(parser.name.clone());
                }
            }
        }

        let grammar = Grammar {
            parsers: self.parsers,
            root,
            symbols,
            resume_rules: self.resume_rules,
            skip_rules: self.skip_rules,
            error_messages: self.error_messages,
            comment_rx,
            config: self.config,
            associated_symbol,
            optionality,
            zero_length_captures,
            analysis_warnings: Vec::new(),
        };

        let mut findings = self.construction_errors;
        findings.extend(analyze::static_analysis(&grammar));
        let (errors, warnings): (Vec<_>, Vec<_>) = findings
            .into_iter()
            .partition(|f| graft_core::error::is_error(f.error.code));
        if !errors.is_empty() {
            return Err(GrammarError { errors });
        }
        let mut grammar = grammar;
        grammar.analysis_warnings = warnings;
        Ok(grammar)
    }

    /// A forward parser is transparent: its name belongs to the definition
    /// it points to, and it mirrors the definition's drop behavior.
    fn propagate_forward_names(&mut self) {
        for index in 0..self.parsers.len() {
            let ParserKind::Forward(Some(referent)) = self.parsers[index].kind else {
                continue;
            };
            let fwd = &self.parsers[index];
            let (name, node_name, disposable) =
                (fwd.name.clone(), fwd.node_name.clone(), fwd.disposable);
            if !name.is_empty() && self.parsers[referent.index()].name.is_empty() {
                let target = &mut self.parsers[referent.index()];
                target.name = name;
                target.node_name = node_name;
                target.disposable = disposable;
                let fwd = &mut self.parsers[index];
                fwd.name = String::new();
            }
            let drop_content = self.parsers[referent.index()].drop_content;
            self.parsers[index].drop_content = drop_content;
        }
    }
}

/// An immutable parser graph with its configuration and rule tables.
pub struct Grammar {
    parsers: Vec<Parser>,
    root: ParserId,
    symbols: IndexMap<String, ParserId>,
    resume_rules: IndexMap<String, Vec<ReentryRule>>,
    skip_rules: IndexMap<String, Vec<ReentryRule>>,
    error_messages: IndexMap<String, Vec<(MsgCondition, String)>>,
    comment_rx: Option<Regex>,
    config: GrammarConfig,
    associated_symbol: Vec<Option<ParserId>>,
    optionality: Vec<Option<bool>>,
    zero_length_captures: FxHashSet<String>,
    analysis_warnings: Vec<AnalysisError>,
}

impl Grammar {
    pub fn builder() -> GrammarBuilder {
        GrammarBuilder::new()
    }

    /// Parses a document with the root parser and default options.
    pub fn parse(&self, document: &str) -> Result<RootNode, Error> {
        Ok(self.run(document, &ParseOptions::default())?.root)
    }

    /// Parses a document with explicit options.
    pub fn run(&self, document: &str, opts: &ParseOptions) -> Result<ParseOutcome, Error> {
        let doc = SourceText::new(document);
        if doc.len() >= INFINITE {
            return Err(Error::DocumentTooLarge {
                size: doc.len(),
                max: INFINITE - 1,
            });
        }
        let start = match &opts.start {
            Some(name) => self
                .symbols
                .get(name)
                .copied()
                .ok_or_else(|| Error::UnknownStartSymbol(name.clone()))?,
            None => self.root,
        };
        let engine = Engine::new(self, doc, start, opts);
        let (root, history) = engine.run(opts.complete_match);
        Ok(ParseOutcome {
            root,
            history: History(history),
        })
    }

    /// The matched string if `symbol` matches a prefix of `document`
    /// without errors.
    pub fn matches(&self, symbol: &str, document: &str) -> Option<String> {
        let opts = ParseOptions::default().start(symbol).prefix_match();
        let outcome = self.run(document, &opts).ok()?;
        (!outcome.root.has_errors()).then(|| outcome.root.content())
    }

    /// The matched string if `symbol` matches the complete `document`
    /// without errors.
    pub fn full_match(&self, symbol: &str, document: &str) -> Option<String> {
        let opts = ParseOptions::default().start(symbol);
        let outcome = self.run(document, &opts).ok()?;
        (!outcome.root.has_errors()).then(|| outcome.root.content())
    }

    /// Internal entry for static analysis' trial parses.
    pub(crate) fn run_with_start(&self, document: &str, start: ParserId) -> RootNode {
        let doc = SourceText::new(document);
        let opts = ParseOptions::default();
        let engine = Engine::new(self, doc, start, &opts);
        engine.run(false).0
    }

    /// Warnings found by static analysis at construction time.
    pub fn analysis_warnings(&self) -> &[AnalysisError] {
        &self.analysis_warnings
    }

    pub fn symbol(&self, name: &str) -> Option<ParserId> {
        self.symbols.get(name).copied()
    }

    pub fn symbol_names(&self) -> impl Iterator<Item = &str> {
        self.symbols.keys().map(String::as_str)
    }

    /// An EBNF-like listing of all symbol definitions, with `...` marking
    /// recursive references.
    pub fn to_ebnf(&self) -> String {
        let mut lines = Vec::new();
        for (name, &id) in &self.symbols {
            let mut seen = FxHashSet::default();
            seen.insert(id);
            lines.push(format!("{name} = {}", self.render(id, &mut seen)));
        }
        lines.join("\n")
    }

    // ----- crate-internal accessors --------------------------------------

    pub(crate) fn parser(&self, id: ParserId) -> &Parser {
        &self.parsers[id.index()]
    }

    pub(crate) fn parser_count(&self) -> usize {
        self.parsers.len()
    }

    pub(crate) fn parser_ids(&self) -> impl Iterator<Item = ParserId> {
        (0..self.parsers.len() as u32).map(ParserId)
    }

    pub(crate) fn root(&self) -> ParserId {
        self.root
    }

    pub(crate) fn reduction(&self) -> Reduction {
        self.config.reduction
    }

    pub(crate) fn left_recursion(&self) -> bool {
        self.config.left_recursion
    }

    pub(crate) fn search_window(&self) -> isize {
        self.config.search_window
    }

    pub(crate) fn max_dropouts(&self) -> usize {
        self.config.max_dropouts
    }

    pub(crate) fn recursion_limit(&self) -> usize {
        self.config.recursion_limit
    }

    pub(crate) fn infinite_loop_warnings(&self) -> bool {
        self.config.infinite_loop_warning
    }

    pub(crate) fn comment_rx(&self) -> Option<&Regex> {
        self.comment_rx.as_ref()
    }

    pub(crate) fn resume_rules(&self, symbol: &str) -> &[ReentryRule] {
        self.resume_rules.get(symbol).map_or(&[], Vec::as_slice)
    }

    pub(crate) fn skip_rules(&self, symbol: &str) -> &[ReentryRule] {
        self.skip_rules.get(symbol).map_or(&[], Vec::as_slice)
    }

    pub(crate) fn error_messages(&self, symbol: &str) -> &[(MsgCondition, String)] {
        self.error_messages.get(symbol).map_or(&[], Vec::as_slice)
    }

    /// Name of the closest named parser containing `id`; empty when the
    /// parser is not reachable from any symbol.
    pub(crate) fn symbol_of(&self, id: ParserId) -> &str {
        match self.associated_symbol[id.index()] {
            Some(symbol) => &self.parsers[symbol.index()].name,
            None => "",
        }
    }

    pub(crate) fn is_optional(&self, id: ParserId) -> Option<bool> {
        self.optionality[id.index()]
    }

    pub(crate) fn can_capture_zero_length(&self, name: &str) -> bool {
        self.zero_length_captures.contains(name)
    }

    /// The variable name watched by a retrieve/pop: the capture's own name,
    /// looked through a forward indirection if necessary.
    pub(crate) fn capture_symbol_name(&self, symbol: ParserId) -> &str {
        let p = self.parser(symbol);
        if !p.name.is_empty() {
            return &p.name;
        }
        if let ParserKind::Forward(Some(referent)) = p.kind {
            return &self.parser(referent).name;
        }
        ""
    }

    /// The node name retrieved values are tagged with.
    pub(crate) fn symbol_node_name(&self, symbol: &str) -> NodeName {
        match self.symbols.get(symbol) {
            Some(&id) => self.parser(id).node_name.clone(),
            None => Arc::from(symbol),
        }
    }

    /// EBNF-like description of a parser, cycle-safe.
    pub(crate) fn display(&self, id: ParserId) -> String {
        let mut seen = FxHashSet::default();
        self.render(id, &mut seen)
    }

    /// Like [`Grammar::display`], but named parsers appear by name.
    fn sub_repr(&self, id: ParserId, seen: &mut FxHashSet<ParserId>) -> String {
        let p = self.parser(id);
        if !p.name.is_empty() {
            return p.name.clone();
        }
        if let ParserKind::Forward(Some(referent)) = p.kind {
            let name = &self.parser(referent).name;
            if !name.is_empty() {
                return name.clone();
            }
        }
        self.render(id, seen)
    }

    fn render(&self, id: ParserId, seen: &mut FxHashSet<ParserId>) -> String {
        if !seen.insert(id) {
            return "...".to_string();
        }
        let p = self.parser(id);
        let rendered = match &p.kind {
            ParserKind::Always | ParserKind::Never | ParserKind::AnyChar => {
                p.type_tag().to_string()
            }
            ParserKind::Text(text) => format!("`{text}`"),
            ParserKind::IgnoreCase { original, .. } => format!("`{original}`"),
            ParserKind::RegExp(pattern) => format!("/{}/", pattern.pattern.replace('/', "\\/")),
            ParserKind::Whitespace { .. } => "~".to_string(),
            ParserKind::SmartRe { pattern, .. } => {
                format!("/{}/", pattern.pattern.replace('/', "\\/"))
            }
            ParserKind::Custom(_) => "Custom(..)".to_string(),
            ParserKind::Err { template, .. } => format!("ERR(\"{template}\")"),
            ParserKind::Option(inner) => format!("[{}]", self.sub_repr(*inner, seen)),
            ParserKind::ZeroOrMore(inner) => format!("{{{}}}", self.sub_repr(*inner, seen)),
            ParserKind::OneOrMore(inner) => format!("{{{}}}+", self.sub_repr(*inner, seen)),
            ParserKind::Counted { inner, bounds } => {
                format!("{}{{{},{}}}", self.sub_repr(*inner, seen), bounds.0, bounds.1)
            }
            ParserKind::Series { items, mandatory } => {
                let mut parts = Vec::with_capacity(items.len() + 1);
                for (i, &item) in items.iter().enumerate() {
                    if i == *mandatory {
                        parts.push("§".to_string());
                    }
                    parts.push(self.sub_repr(item, seen));
                }
                parts.join(" ")
            }
            ParserKind::Alternative(items) => {
                let joined = items
                    .iter()
                    .map(|&item| self.sub_repr(item, seen))
                    .collect::<Vec<_>>()
                    .join(" | ");
                if p.name.is_empty() {
                    format!("({joined})")
                } else {
                    joined
                }
            }
            ParserKind::Interleave { items, .. } => items
                .iter()
                .map(|&item| self.sub_repr(item, seen))
                .collect::<Vec<_>>()
                .join(" ° "),
            ParserKind::Lookahead { inner, negative } => {
                let sigil = if *negative { "!" } else { "&" };
                format!("{sigil}{}", self.sub_repr(*inner, seen))
            }
            ParserKind::Lookbehind { matcher, negative } => {
                let sigil = if *negative { "-!" } else { "-&" };
                match matcher {
                    BehindMatcher::Text(text) => format!("{sigil}`{text}`"),
                    BehindMatcher::Pattern(pattern) => format!("{sigil}/{}/", pattern.pattern),
                }
            }
            ParserKind::Capture { inner, .. } => self.sub_repr(*inner, seen),
            ParserKind::Retrieve { symbol, .. } => {
                format!(":{}", self.capture_symbol_name(*symbol))
            }
            ParserKind::Pop { symbol, policy } => {
                let sigil = if policy.is_optional() { ":?" } else { "::" };
                format!("{sigil}{}", self.capture_symbol_name(*symbol))
            }
            ParserKind::Synonym(inner) => self.sub_repr(*inner, seen),
            ParserKind::Forward(Some(referent)) => self.sub_repr(*referent, seen),
            ParserKind::Forward(None) => "<unbound>".to_string(),
        };
        seen.remove(&id);
        rendered
    }
}

impl std::fmt::Debug for Grammar {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Grammar")
            .field("parsers", &self.parsers.len())
            .field("symbols", &self.symbols.keys().collect::<Vec<_>>())
            .finish_non_exhaustive()
    }
}

/// Maps every parser to its closest named ancestor, walking the anonymous
/// descendants of each symbol (forward indirections to named parsers count
/// as symbol boundaries).
fn associate_symbols(parsers: &[Parser]) -> Vec<Option<ParserId>> {
    let mut cache: Vec<Option<ParserId>> = vec![None; parsers.len()];

    fn add_anonymous_descendants(
        parsers: &[Parser],
        cache: &mut Vec<Option<ParserId>>,
        symbol: ParserId,
        from: ParserId,
    ) {
        for sub in parsers[from.index()].sub_parsers() {
            let target = &parsers[sub.index()];
            let hides_symbol = !target.name.is_empty()
                || matches!(target.kind, ParserKind::Forward(Some(r))
                    if !parsers[r.index()].name.is_empty());
            if hides_symbol || cache[sub.index()].is_some() {
                continue;
            }
            cache[sub.index()] = Some(symbol);
            add_anonymous_descendants(parsers, cache, symbol, sub);
        }
    }

    for index in 0..parsers.len() {
        let id = ParserId(index as u32);
        if let ParserKind::Forward(Some(referent)) = parsers[index].kind {
            if !parsers[referent.index()].name.is_empty() {
                cache[index] = Some(referent);
                continue;
            }
        }
        if !parsers[index].name.is_empty() {
            cache[index] = Some(id);
            add_anonymous_descendants(parsers, &mut cache, id, id);
        }
    }
    cache
}

/// Three-valued optionality: `Some(true)` never fails, `Some(false)` can
/// fail, `None` unknown. Cycles pass through forwards, which answer
/// "unknown", so plain recursion terminates.
fn optionality(parsers: &[Parser], id: ParserId) -> Option<bool> {
    match &parsers[id.index()].kind {
        ParserKind::Always | ParserKind::Whitespace { .. } => Some(true),
        ParserKind::Text(text) => Some(text.is_empty()),
        ParserKind::IgnoreCase { original, .. } => Some(original.is_empty()),
        ParserKind::RegExp(pattern) | ParserKind::SmartRe { pattern, .. } => {
            if pattern.pattern.is_empty() {
                Some(true)
            } else {
                None
            }
        }
        ParserKind::Option(_) | ParserKind::ZeroOrMore(_) => Some(true),
        ParserKind::Counted { bounds, .. } => {
            if bounds.0 == 0 {
                Some(true)
            } else {
                None
            }
        }
        ParserKind::Series { items, .. } => {
            if items
                .iter()
                .all(|&item| optionality(parsers, item) == Some(true))
            {
                Some(true)
            } else {
                None
            }
        }
        ParserKind::Alternative(items) => {
            if items
                .iter()
                .any(|&item| optionality(parsers, item) == Some(true))
            {
                Some(true)
            } else {
                None
            }
        }
        ParserKind::Interleave { reps, .. } => Some(reps.iter().all(|&(lo, _)| lo == 0)),
        _ => None,
    }
}
