//! Error records and the numeric error-code table.
//!
//! Codes encode their severity in their value range: notices below 100,
//! warnings below 1000, errors below 10000, fatal errors from 10000 on.
//! The named codes are stable across releases; downstream diagnostics key
//! on them.

use serde::Serialize;

/// Numeric error code; the value range encodes the severity.
pub type ErrorCode = u32;

// Notices.
pub const NOTICE: ErrorCode = 1;
pub const RESUME_NOTICE: ErrorCode = 50;
pub const PARSER_LOOKAHEAD_FAILURE_ONLY: ErrorCode = 60;
pub const PARSER_LOOKAHEAD_MATCH_ONLY: ErrorCode = 70;

// Warnings.
pub const WARNING: ErrorCode = 100;
pub const CAPTURE_STACK_NOT_EMPTY_WARNING: ErrorCode = 120;
pub const ZERO_LENGTH_CAPTURE_POSSIBLE: ErrorCode = 130;
pub const CAPTURE_DROPPED_CONTENT_WARNING: ErrorCode = 140;
pub const OPTIONAL_REDUNDANTLY_NESTED_WARNING: ErrorCode = 220;
pub const REDUNDANT_PARSER_WARNING: ErrorCode = 230;
pub const LOOKAHEAD_WITH_OPTIONAL_PARSER: ErrorCode = 270;
pub const INFINITE_LOOP_WARNING: ErrorCode = 560;

// Errors.
pub const ERROR: ErrorCode = 1000;
pub const MANDATORY_CONTINUATION: ErrorCode = 1010;
pub const MANDATORY_CONTINUATION_AT_EOF: ErrorCode = 1011;
pub const MANDATORY_CONTINUATION_AT_EOF_NON_ROOT: ErrorCode = 1012;
pub const PARSER_STOPPED_BEFORE_END: ErrorCode = 1040;
pub const PARSER_STOPPED_ON_RETRY: ErrorCode = 1041;
pub const CAPTURE_STACK_NOT_EMPTY: ErrorCode = 1050;
pub const UNDEFINED_RETRIEVE: ErrorCode = 1060;
pub const ERROR_WHILE_RECOVERING_FROM_ERROR: ErrorCode = 1301;
pub const MALFORMED_ERROR_STRING: ErrorCode = 1310;
pub const CUSTOM_PARSER_FAILURE: ErrorCode = 1320;

// Static-analysis findings (errors unless noted otherwise above).
pub const BAD_MANDATORY_SETUP: ErrorCode = 2200;
pub const BAD_REPETITION_COUNT: ErrorCode = 2210;
pub const DUPLICATE_PARSERS_IN_ALTERNATIVE: ErrorCode = 2220;
pub const BAD_ORDER_OF_ALTERNATIVES: ErrorCode = 2230;
pub const BADLY_NESTED_OPTIONAL_PARSER: ErrorCode = 2240;
pub const PARSER_NEVER_TOUCHES_DOCUMENT: ErrorCode = 2260;
pub const CAPTURE_WITHOUT_PARSERNAME: ErrorCode = 2270;
pub const BAD_REGULAR_EXPRESSION: ErrorCode = 2280;
pub const UNBOUND_FORWARD: ErrorCode = 2290;
pub const DROP_OF_NAMED_PARSER: ErrorCode = 2300;

// Fatal.
pub const FATAL: ErrorCode = 10000;
pub const RECURSION_DEPTH_LIMIT_HIT: ErrorCode = 10100;

/// Severity class of an error code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub enum Severity {
    Notice,
    Warning,
    Error,
    Fatal,
}

impl Severity {
    pub fn of(code: ErrorCode) -> Severity {
        match code {
            0..=99 => Severity::Notice,
            100..=999 => Severity::Warning,
            1000..=9999 => Severity::Error,
            _ => Severity::Fatal,
        }
    }
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Severity::Notice => write!(f, "Notice"),
            Severity::Warning => write!(f, "Warning"),
            Severity::Error => write!(f, "Error"),
            Severity::Fatal => write!(f, "Fatal"),
        }
    }
}

pub fn is_warning(code: ErrorCode) -> bool {
    Severity::of(code) <= Severity::Warning
}

pub fn is_error(code: ErrorCode) -> bool {
    Severity::of(code) >= Severity::Error
}

pub fn is_fatal(code: ErrorCode) -> bool {
    Severity::of(code) == Severity::Fatal
}

/// A single diagnostic attached to the tree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Error {
    pub message: String,
    /// Absolute position in the parsed document.
    pub pos: usize,
    pub code: ErrorCode,
    /// 1-based line, filled in when the root maps positions to the source.
    pub line: Option<u32>,
    /// 1-based column (characters), filled in together with `line`.
    pub column: Option<u32>,
    /// Length of the source region the error refers to.
    pub length: u32,
}

impl Error {
    pub fn new(message: impl Into<String>, pos: usize, code: ErrorCode) -> Self {
        Error {
            message: message.into(),
            pos,
            code,
            line: None,
            column: None,
            length: 1,
        }
    }

    pub fn with_length(mut self, length: u32) -> Self {
        self.length = length.max(1);
        self
    }

    pub fn severity(&self) -> Severity {
        Severity::of(self.code)
    }
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match (self.line, self.column) {
            (Some(l), Some(c)) => write!(
                f,
                "{}:{}: {} ({}): {}",
                l,
                c,
                self.severity(),
                self.code,
                self.message
            ),
            _ => write!(
                f,
                "pos {}: {} ({}): {}",
                self.pos,
                self.severity(),
                self.code,
                self.message
            ),
        }
    }
}

/// Splits a `"<code>:<message>"` prefix off an error message.
///
/// Custom error messages configured for mandatory violations may override
/// the error code this way; messages without a numeric prefix keep the
/// given default.
pub fn extract_error_code(message: &str, default: ErrorCode) -> (String, ErrorCode) {
    if let Some((head, tail)) = message.split_once(':') {
        if let Ok(code) = head.trim().parse::<ErrorCode>() {
            return (tail.to_string(), code);
        }
    }
    (message.to_string(), default)
}

/// True if any error in the list has at least error severity.
pub fn has_errors(errors: &[Error]) -> bool {
    errors.iter().any(|e| is_error(e.code))
}
