use std::fmt;

use crate::diagnostic::{Diagnostic, DiagnosticKind};

#[derive(Debug, Clone, Default)]
pub struct EscapeReport {
    pub diagnostics: Vec<Diagnostic>,
}

impl EscapeReport {
    pub fn is_empty(&self) -> bool {
        self.diagnostics.is_empty()
    }

    pub fn of_kind(&self, kind: DiagnosticKind) -> impl Iterator<Item = &Diagnostic> {
        self.diagnostics.iter().filter(move |diag| diag.kind == kind)
    }

    /// Returns `true` if some diagnostic carries exactly `message`.
    pub fn contains(&self, message: &str) -> bool {
        self.diagnostics.iter().any(|diag| diag.message == message)
    }

    /// Diagnostics ordered by line; diagnostics of one line keep the order
    /// they were emitted in.
    pub fn sorted(&self) -> Vec<&Diagnostic> {
        let mut sorted: Vec<_> = self.diagnostics.iter().collect();
        sorted.sort_by_key(|diag| diag.line);
        sorted
    }

    pub(crate) fn push(&mut self, diagnostic: Diagnostic, max_diagnostics: usize) {
        if max_diagnostics == 0 || self.diagnostics.len() < max_diagnostics {
            self.diagnostics.push(diagnostic);
        }
    }
}

impl fmt::Display for EscapeReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (index, diagnostic) in self.sorted().into_iter().enumerate() {
            if index > 0 {
                writeln!(f)?;
            }
            write!(f, "{diagnostic}")?;
        }

        Ok(())
    }
}
