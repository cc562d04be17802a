//! Immutable view over the parsed document.
//!
//! All locations handed around by the parser runtime are absolute byte
//! offsets into the (BOM-stripped) document. `SourceText` keeps the document
//! itself, the lazily computed line-break table, and the small set of search
//! operations the runtime needs: windowed substring search, windowed regex
//! search, and anchored regex matching at a location.

use std::cell::OnceCell;

use regex::Regex;

/// Upper bound for document sizes and repetition counts.
///
/// Documents must be strictly shorter than this; locations therefore always
/// fit into the positive half of an `isize` even on 32-bit targets.
pub const INFINITE: usize = 1 << 30;

/// The document under parse.
#[derive(Debug)]
pub struct SourceText {
    text: String,
    line_breaks: OnceCell<Vec<usize>>,
}

impl SourceText {
    /// Wraps a document, stripping a leading byte-order mark if present.
    pub fn new(document: &str) -> Self {
        let text = document.strip_prefix('\u{feff}').unwrap_or(document);
        SourceText {
            text: text.to_string(),
            line_breaks: OnceCell::new(),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.text
    }

    pub fn len(&self) -> usize {
        self.text.len()
    }

    pub fn is_empty(&self) -> bool {
        self.text.is_empty()
    }

    /// The document from `start` to its end.
    pub fn rest(&self, start: usize) -> &str {
        self.text.get(start..).unwrap_or("")
    }

    /// The document between two absolute offsets. Out-of-range or
    /// non-boundary offsets yield the empty string rather than a panic;
    /// the runtime only produces boundary offsets.
    pub fn slice(&self, start: usize, end: usize) -> &str {
        if start >= end {
            return "";
        }
        self.text.get(start..end.min(self.text.len())).unwrap_or("")
    }

    /// Byte offset of the next occurrence of `needle` at or after `start`,
    /// restricted to the window `[start, end)`. Absolute offsets.
    pub fn find(&self, needle: &str, start: usize, end: usize) -> Option<usize> {
        self.slice(start, end).find(needle).map(|i| start + i)
    }

    /// First match of `rx` inside the window `[start, end)`.
    /// Returns absolute `(match_start, match_end)`.
    pub fn search(&self, rx: &Regex, start: usize, end: usize) -> Option<(usize, usize)> {
        let window = self.slice(start, end);
        rx.find(window).map(|m| (start + m.start(), start + m.end()))
    }

    /// Matches an *anchored* regex exactly at `at`. Returns the absolute end
    /// offset of the match. The caller is responsible for compiling the
    /// pattern with [`compile_anchored`].
    pub fn match_at(&self, rx: &Regex, at: usize) -> Option<usize> {
        rx.find(self.rest(at)).map(|m| {
            debug_assert_eq!(m.start(), 0, "anchored pattern matched past its location");
            at + m.end()
        })
    }

    /// Sorted byte offsets of line starts; the first entry is always 0.
    pub fn line_breaks(&self) -> &[usize] {
        self.line_breaks.get_or_init(|| line_breaks(&self.text))
    }

    /// 1-based line and (character) column of an absolute offset.
    pub fn line_col(&self, pos: usize) -> (u32, u32) {
        line_col(self.line_breaks(), &self.text, pos)
    }
}

/// Computes the line-start offsets of a text, beginning with 0.
pub fn line_breaks(text: &str) -> Vec<usize> {
    let mut breaks = vec![0];
    for (i, b) in text.bytes().enumerate() {
        if b == b'\n' {
            breaks.push(i + 1);
        }
    }
    breaks
}

/// 1-based line and column for `pos` given a line-break table for `text`.
/// Columns count characters, not bytes.
pub fn line_col(breaks: &[usize], text: &str, pos: usize) -> (u32, u32) {
    let pos = pos.min(text.len());
    let line = breaks.partition_point(|&b| b <= pos);
    let line_start = breaks[line - 1];
    let col = text
        .get(line_start..pos)
        .map(|s| s.chars().count())
        .unwrap_or(pos - line_start);
    (line as u32, col as u32 + 1)
}

/// Compiles a pattern so that it only matches at the start of a haystack.
///
/// The wrapper group keeps the numbering of any capture groups inside
/// `pattern` intact.
pub fn compile_anchored(pattern: &str) -> Result<Regex, regex::Error> {
    Regex::new(&format!(r"\A(?:{pattern})"))
}

/// Builds a whitespace pattern that also swallows comments, the way
/// grammar front-ends combine the two directives.
///
/// With `always_match` the result matches the empty string, which is what
/// insignificant-whitespace parsers want.
pub fn mixin_comment(whitespace: &str, comment: &str, always_match: bool) -> String {
    if comment.is_empty() {
        return whitespace.to_string();
    }
    if always_match {
        format!("(?:{whitespace})(?:(?:{comment})(?:{whitespace}))*")
    } else {
        format!("(?:{whitespace})(?:(?:{comment})(?:{whitespace}))+")
    }
}
