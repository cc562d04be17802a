//! Rendering of parse errors against the source text.

use std::fmt::Write;

use annotate_snippets::{AnnotationKind, Group, Level, Renderer, Snippet};

use graft_core::error::Severity;
use graft_core::root::RootNode;

/// Builder-pattern printer for the error list of a parse result.
pub struct ErrorsPrinter<'r> {
    root: &'r RootNode,
    path: Option<&'r str>,
    colored: bool,
}

impl<'r> ErrorsPrinter<'r> {
    pub fn new(root: &'r RootNode) -> Self {
        ErrorsPrinter {
            root,
            path: None,
            colored: false,
        }
    }

    pub fn path(mut self, path: &'r str) -> Self {
        self.path = Some(path);
        self
    }

    pub fn colored(mut self, value: bool) -> Self {
        self.colored = value;
        self
    }

    pub fn render(&self) -> String {
        let mut out = String::new();
        self.format(&mut out).expect("String write never fails");
        out
    }

    pub fn format(&self, w: &mut impl Write) -> std::fmt::Result {
        let errors = self.root.errors_sorted();
        if errors.is_empty() {
            return Ok(());
        }
        let source = self.root.source.as_str();
        let renderer = if self.colored {
            Renderer::styled()
        } else {
            Renderer::plain()
        };
        for (i, error) in errors.iter().enumerate() {
            let range = clamp_range(
                error.pos,
                error.pos + error.length as usize,
                source.len(),
            );
            let mut snippet = Snippet::source(source).line_start(1).annotation(
                AnnotationKind::Primary
                    .span(range)
                    .label(&error.message),
            );
            if let Some(p) = self.path {
                snippet = snippet.path(p);
            }
            let level = severity_to_level(error.severity());
            let report: Vec<Group> = vec![level.primary_title(&error.message).element(snippet)];
            if i > 0 {
                w.write_char('\n')?;
            }
            write!(w, "{}", renderer.render(&report))?;
        }
        Ok(())
    }
}

fn severity_to_level(severity: Severity) -> Level<'static> {
    match severity {
        Severity::Notice => Level::NOTE,
        Severity::Warning => Level::WARNING,
        Severity::Error | Severity::Fatal => Level::ERROR,
    }
}

fn clamp_range(start: usize, end: usize, limit: usize) -> std::ops::Range<usize> {
    let start = start.min(limit);
    if start == end {
        return start..(start + 1).min(limit).max(start);
    }
    start..end.min(limit).max(start)
}

/// Convenience hook mirroring the printer on the root itself.
pub trait PrintableErrors {
    fn errors_printer(&self) -> ErrorsPrinter<'_>;
}

impl PrintableErrors for RootNode {
    fn errors_printer(&self) -> ErrorsPrinter<'_> {
        ErrorsPrinter::new(self)
    }
}
