//! Accumulating diagnostic sink.

use crate::{Diagnostic, Severity};

/// Collects diagnostics during a phase.
///
/// Diagnostics are sorted by (file, primary span start, insertion order)
/// at flush time, which together with deterministic AST creation order
/// yields stable output across runs.
#[derive(Default)]
pub struct Sink {
    diagnostics: Vec<Diagnostic>,
    error_count: usize,
}

impl Sink {
    pub fn new() -> Sink {
        Sink::default()
    }

    pub fn push(&mut self, diagnostic: Diagnostic) {
        if diagnostic.severity == Severity::Error {
            self.error_count += 1;
        }
        self.diagnostics.push(diagnostic);
    }

    pub fn error_count(&self) -> usize {
        self.error_count
    }

    pub fn has_errors(&self) -> bool {
        self.error_count > 0
    }

    pub fn is_empty(&self) -> bool {
        self.diagnostics.is_empty()
    }

    /// Drain all diagnostics in source order.
    pub fn drain_sorted(&mut self) -> Vec<Diagnostic> {
        let mut out = std::mem::take(&mut self.diagnostics);
        out.sort_by_key(|d| (d.file, d.span.start));
        out
    }

    /// Peek without draining, unsorted (test helper).
    pub fn diagnostics(&self) -> &[Diagnostic] {
        &self.diagnostics
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use zinc_ir::Span;

    #[test]
    fn counts_errors_only() {
        let mut sink = Sink::new();
        sink.push(Diagnostic::warning(0, Span::DUMMY, "w"));
        sink.push(Diagnostic::error(0, Span::DUMMY, "e"));
        assert_eq!(sink.error_count(), 1);
        assert!(sink.has_errors());
    }

    #[test]
    fn drain_sorts_by_position() {
        let mut sink = Sink::new();
        sink.push(Diagnostic::error(0, Span::new(10, 12), "later"));
        sink.push(Diagnostic::error(0, Span::new(2, 4), "earlier"));
        let drained = sink.drain_sorted();
        assert_eq!(drained[0].message, "earlier");
        assert_eq!(drained[1].message, "later");
        assert!(sink.is_empty());
    }
}
