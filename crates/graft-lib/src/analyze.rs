//! Static analysis of the parser graph, run at grammar construction.
//!
//! Every check produces an [`AnalysisError`] naming the symbol it occurred
//! under. Findings of error severity fail construction; warnings are kept
//! on the grammar for inspection.

use fxhash::FxHashMap;

use graft_core::error::{
    Error, BADLY_NESTED_OPTIONAL_PARSER, BAD_MANDATORY_SETUP, BAD_ORDER_OF_ALTERNATIVES,
    BAD_REPETITION_COUNT, CAPTURE_DROPPED_CONTENT_WARNING, CAPTURE_WITHOUT_PARSERNAME,
    DROP_OF_NAMED_PARSER, DUPLICATE_PARSERS_IN_ALTERNATIVE, LOOKAHEAD_WITH_OPTIONAL_PARSER,
    OPTIONAL_REDUNDANTLY_NESTED_WARNING, PARSER_NEVER_TOUCHES_DOCUMENT,
    REDUNDANT_PARSER_WARNING, UNBOUND_FORWARD, UNDEFINED_RETRIEVE, ZERO_LENGTH_CAPTURE_POSSIBLE,
};
use graft_core::source::INFINITE;

use crate::grammar::Grammar;
use crate::parsers::{ParserId, ParserKind, NO_MANDATORY};

/// One finding of the static analysis: the symbol it belongs to, a
/// description of the offending parser, and the diagnostic itself.
#[derive(Debug, Clone)]
pub struct AnalysisError {
    pub symbol: String,
    pub parser: String,
    pub error: Error,
}

impl std::fmt::Display for AnalysisError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.symbol.is_empty() {
            write!(f, "{}: {}", self.parser, self.error.message)
        } else {
            write!(f, "{} ({}): {}", self.symbol, self.parser, self.error.message)
        }
    }
}

/// Construction failed because static analysis found genuine errors.
#[derive(Debug, Clone)]
pub struct GrammarError {
    pub errors: Vec<AnalysisError>,
}

impl std::fmt::Display for GrammarError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "grammar construction failed:")?;
        for error in &self.errors {
            writeln!(f, "  {error}")?;
        }
        Ok(())
    }
}

impl std::error::Error for GrammarError {}

/// Runs all checks over the full parser arena.
pub(crate) fn static_analysis(g: &Grammar) -> Vec<AnalysisError> {
    let mut findings = Vec::new();
    let mut leaf_state: FxHashMap<ParserId, bool> = FxHashMap::default();
    for id in g.parser_ids() {
        check_parser(g, id, &mut findings);
        let p = g.parser(id);
        if !p.name.is_empty() && !reaches_a_leaf(g, id, &mut leaf_state, &mut Vec::new()) {
            report(
                g,
                id,
                &mut findings,
                format!(
                    "Parser {} is entirely cyclical and, therefore, cannot even touch the \
                     parsed document",
                    location_info(g, id)
                ),
                PARSER_NEVER_TOUCHES_DOCUMENT,
            );
        }
    }
    findings
}

fn check_parser(g: &Grammar, id: ParserId, findings: &mut Vec<AnalysisError>) {
    let p = g.parser(id);
    if p.drop_content && !p.disposable {
        report(
            g,
            id,
            findings,
            format!(
                "Non-disposable parser {} must not silently drop its content",
                location_info(g, id)
            ),
            DROP_OF_NAMED_PARSER,
        );
    }
    match &p.kind {
        ParserKind::Option(inner) => {
            if g.is_optional(*inner) == Some(true) {
                report(
                    g,
                    id,
                    findings,
                    format!(
                        "Redundant nesting of optional or empty parser in {}",
                        location_info(g, id)
                    ),
                    OPTIONAL_REDUNDANTLY_NESTED_WARNING,
                );
            }
        }
        ParserKind::OneOrMore(inner) => {
            if g.is_optional(*inner) == Some(true) {
                report(
                    g,
                    id,
                    findings,
                    format!(
                        "Use ZeroOrMore instead of nesting OneOrMore with an optional parser \
                         in {}",
                        location_info(g, id)
                    ),
                    BADLY_NESTED_OPTIONAL_PARSER,
                );
            }
        }
        ParserKind::Counted { inner, bounds: (lo, hi) } => {
            if lo > hi || *hi > INFINITE {
                report(
                    g,
                    id,
                    findings,
                    format!(
                        "Repetition count [a={lo}, b={hi}] for parser {} violates requirement \
                         0 <= a <= b <= infinity = 2^30",
                        g.display(*inner)
                    ),
                    BAD_REPETITION_COUNT,
                );
            }
            if (*lo, *hi) == (1, 1) {
                report(
                    g,
                    id,
                    findings,
                    format!(
                        "Repetition count from 1 to 1 renders the counted parser redundant: {}",
                        location_info(g, id)
                    ),
                    REDUNDANT_PARSER_WARNING,
                );
            }
            if g.is_optional(*inner) == Some(true) && (*lo, *hi) != (1, 1) {
                report(
                    g,
                    id,
                    findings,
                    format!(
                        "Optional parsers should not be nested inside repeating parsers: {}",
                        location_info(g, id)
                    ),
                    BADLY_NESTED_OPTIONAL_PARSER,
                );
            }
        }
        ParserKind::Series { items, mandatory } => {
            check_mandatory(g, id, items.len(), *mandatory, findings);
        }
        ParserKind::Interleave { items, reps, mandatory } => {
            check_mandatory(g, id, items.len(), *mandatory, findings);
            for &item in items {
                if g.is_optional(item) == Some(true) || g.parser(item).is_flow() {
                    report(
                        g,
                        id,
                        findings,
                        format!(
                            "Flow-operators and optional parsers are neither allowed nor \
                             needed in an interleave-parser {}",
                            location_info(g, id)
                        ),
                        BADLY_NESTED_OPTIONAL_PARSER,
                    );
                    break;
                }
            }
            for (&item, &(lo, hi)) in items.iter().zip(reps) {
                if lo > hi || hi > INFINITE {
                    report(
                        g,
                        id,
                        findings,
                        format!(
                            "Repetition count [a={lo}, b={hi}] for parser {} violates \
                             requirement 0 <= a <= b <= infinity = 2^30",
                            g.display(item)
                        ),
                        BAD_REPETITION_COUNT,
                    );
                }
            }
        }
        ParserKind::Alternative(items) => {
            check_alternative(g, id, items, findings);
        }
        ParserKind::Lookahead { inner, .. } => {
            let whitespace = matches!(g.parser(*inner).kind, ParserKind::Whitespace { .. });
            if g.is_optional(*inner) == Some(true) && !whitespace {
                report(
                    g,
                    id,
                    findings,
                    format!(
                        "Lookahead {} does not make sense with optional parser {}!",
                        p.node_name,
                        g.display(*inner)
                    ),
                    LOOKAHEAD_WITH_OPTIONAL_PARSER,
                );
            }
        }
        ParserKind::Capture { inner, zero_length_warning } => {
            if p.name.is_empty() {
                report(
                    g,
                    id,
                    findings,
                    format!(
                        "Capture only works as named parser! Error in parser: {}",
                        g.display(id)
                    ),
                    CAPTURE_WITHOUT_PARSERNAME,
                );
            }
            if subtree_drops_content(g, *inner) {
                report(
                    g,
                    id,
                    findings,
                    format!(
                        "Captured symbol \"{}\" contains parsers that drop content, which can \
                         lead to unintended results!",
                        p.name
                    ),
                    CAPTURE_DROPPED_CONTENT_WARNING,
                );
            }
            if *zero_length_warning && g.is_optional(*inner) == Some(true) {
                report(
                    g,
                    id,
                    findings,
                    format!(
                        "Variable \"{}\" captures zero length strings, which can lead to its \
                         remaining on the stack after backtracking!",
                        p.name
                    ),
                    ZERO_LENGTH_CAPTURE_POSSIBLE,
                );
            }
        }
        ParserKind::Retrieve { symbol, .. } | ParserKind::Pop { symbol, .. } => {
            if !watches_a_capture(g, *symbol) {
                report(
                    g,
                    id,
                    findings,
                    format!(
                        "Retrieval must watch a capture parser, but {} is none",
                        g.display(*symbol)
                    ),
                    UNDEFINED_RETRIEVE,
                );
            }
        }
        ParserKind::Forward(None) => {
            report(
                g,
                id,
                findings,
                "Forward parser has not been bound to a definition with set()".to_string(),
                UNBOUND_FORWARD,
            );
        }
        _ => {}
    }
}

fn check_mandatory(
    g: &Grammar,
    id: ParserId,
    length: usize,
    mandatory: usize,
    findings: &mut Vec<AnalysisError>,
) {
    let mut problems = Vec::new();
    if length == 0 {
        problems.push("Number of elements 0 is below minimum length of 1".to_string());
    } else if length >= NO_MANDATORY {
        problems.push(format!(
            "Number of elements {length} exceeds maximum length of {NO_MANDATORY}"
        ));
    } else if mandatory != NO_MANDATORY && mandatory >= length {
        problems.push(format!(
            "Illegal value {mandatory} for mandatory-parameter in a parser with {length} elements!"
        ));
    }
    if !problems.is_empty() {
        report(
            g,
            id,
            findings,
            format!(
                "Illegal configuration of mandatory parser {}\n{}",
                location_info(g, id),
                problems.join("\n")
            ),
            BAD_MANDATORY_SETUP,
        );
    }
}

fn check_alternative(
    g: &Grammar,
    id: ParserId,
    items: &[ParserId],
    findings: &mut Vec<AnalysisError>,
) {
    let mut sorted: Vec<ParserId> = items.to_vec();
    sorted.sort_by_key(|p| p.index());
    sorted.dedup();
    if sorted.len() != items.len() {
        report(
            g,
            id,
            findings,
            format!("Duplicate parsers in {}", location_info(g, id)),
            DUPLICATE_PARSERS_IN_ALTERNATIVE,
        );
    }
    for (i, &item) in items.iter().enumerate() {
        if i + 1 < items.len() && g.is_optional(item) == Some(true) {
            report(
                g,
                id,
                findings,
                format!(
                    "Parser-specification Error in {}\nOnly the very last alternative may be \
                     optional! Parser \"{}\" at position {} out of {} is optional",
                    location_info(g, id),
                    g.parser(item).node_name,
                    i + 1,
                    items.len()
                ),
                BAD_ORDER_OF_ALTERNATIVES,
            );
            break;
        }
    }
    // a later alternative whose fixed starting string an earlier
    // alternative already consumes can never match
    for i in 2..items.len() {
        let fixed_start = starting_string(g, items[i]);
        if fixed_start.is_empty() {
            continue;
        }
        for (k, &earlier) in items.iter().enumerate().take(i) {
            if does_preempt(g, earlier, &fixed_start) {
                report(
                    g,
                    id,
                    findings,
                    format!(
                        "Parser-specification Error in {}\nAlternative {} will never be \
                         reached, because its starting-string \"{}\" is already captured by \
                         earlier alternative {} !",
                        location_info(g, id),
                        i + 1,
                        fixed_start,
                        k + 1
                    ),
                    BAD_ORDER_OF_ALTERNATIVES,
                );
            }
        }
    }
}

/// Trial-parses the fixed starting string of a later alternative with an
/// earlier one; a clean non-empty match proves the later branch dead.
fn does_preempt(g: &Grammar, earlier: ParserId, fixed_start: &str) -> bool {
    if g.parser(earlier).is_context_sensitive() {
        return false;
    }
    let root = g.run_with_start(fixed_start, earlier);
    root.errors.is_empty() && root.strlen() >= 1
}

/// The fixed string a parser starts with, if any.
fn starting_string(g: &Grammar, id: ParserId) -> String {
    fn find(g: &Grammar, id: ParserId, visited: &mut Vec<ParserId>) -> String {
        if visited.contains(&id) {
            return String::new();
        }
        visited.push(id);
        match &g.parser(id).kind {
            ParserKind::Text(text) => text.to_string(),
            ParserKind::Series { items, .. } | ParserKind::Alternative(items) => {
                find(g, items[0], visited)
            }
            ParserKind::Synonym(inner)
            | ParserKind::OneOrMore(inner)
            | ParserKind::Lookahead { inner, negative: false } => find(g, *inner, visited),
            ParserKind::Counted { inner, bounds } => {
                if bounds.0 >= 1 {
                    find(g, *inner, visited)
                } else {
                    String::new()
                }
            }
            ParserKind::Interleave { items, reps, .. } => {
                if reps.first().is_some_and(|&(lo, _)| lo >= 1) {
                    find(g, items[0], visited)
                } else {
                    String::new()
                }
            }
            _ => String::new(),
        }
    }
    find(g, id, &mut Vec::new())
}

/// True if any path from `id` reaches a parser without sub-parsers.
fn reaches_a_leaf(
    g: &Grammar,
    id: ParserId,
    state: &mut FxHashMap<ParserId, bool>,
    visiting: &mut Vec<ParserId>,
) -> bool {
    if let Some(&known) = state.get(&id) {
        return known;
    }
    if visiting.contains(&id) {
        return false;
    }
    let subs = g.parser(id).sub_parsers();
    if subs.is_empty() {
        state.insert(id, true);
        return true;
    }
    visiting.push(id);
    let reached = subs
        .iter()
        .any(|&sub| reaches_a_leaf(g, sub, state, visiting));
    visiting.pop();
    if reached || visiting.is_empty() {
        state.insert(id, reached);
    }
    reached
}

fn subtree_drops_content(g: &Grammar, id: ParserId) -> bool {
    let mut stack = vec![id];
    let mut visited = Vec::new();
    while let Some(current) = stack.pop() {
        if visited.contains(&current) {
            continue;
        }
        visited.push(current);
        if g.parser(current).drop_content {
            return true;
        }
        stack.extend(g.parser(current).sub_parsers());
    }
    false
}

fn watches_a_capture(g: &Grammar, symbol: ParserId) -> bool {
    match &g.parser(symbol).kind {
        ParserKind::Capture { .. } => true,
        ParserKind::Forward(Some(referent)) => {
            matches!(g.parser(*referent).kind, ParserKind::Capture { .. })
        }
        _ => false,
    }
}

fn location_info(g: &Grammar, id: ParserId) -> String {
    let p = g.parser(id);
    let name = if p.name.is_empty() { "_" } else { &p.name };
    format!(
        "{}{} in definition of \"{}\" as {}",
        name,
        p.type_tag(),
        g.symbol_of(id),
        g.display(id)
    )
}

fn report(
    g: &Grammar,
    id: ParserId,
    findings: &mut Vec<AnalysisError>,
    message: String,
    code: graft_core::error::ErrorCode,
) {
    findings.push(AnalysisError {
        symbol: g.symbol_of(id).to_string(),
        parser: g.display(id),
        error: Error::new(message, 0, code),
    });
}
