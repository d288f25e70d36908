use std::fmt;

use escflow_ir::FuncRef;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DiagnosticKind {
    LeakingParam,
    LeakingParamContent,
    LeakingParamToResult,
    LeakingClosureRef,
    MarkEscapedContent,
    EscapesToHeap,
    MovedToHeap,
    DoesNotEscape,
    IgnoredSelfAssignment,
}

impl DiagnosticKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::LeakingParam => "leaking-param",
            Self::LeakingParamContent => "leaking-param-content",
            Self::LeakingParamToResult => "leaking-param-to-result",
            Self::LeakingClosureRef => "leaking-closure-ref",
            Self::MarkEscapedContent => "mark-escaped-content",
            Self::EscapesToHeap => "escapes-to-heap",
            Self::MovedToHeap => "moved-to-heap",
            Self::DoesNotEscape => "does-not-escape",
            Self::IgnoredSelfAssignment => "ignored-self-assignment",
        }
    }
}

impl fmt::Display for DiagnosticKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.as_str().fmt(f)
    }
}

/// One analysis decision, reported at the source line of the node it is
/// about.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    pub kind: DiagnosticKind,
    pub line: u32,
    pub func: Option<FuncRef>,
    pub message: String,
}

impl Diagnostic {
    pub fn new(
        kind: DiagnosticKind,
        line: u32,
        func: Option<FuncRef>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            kind,
            line,
            func,
            message: message.into(),
        }
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.line, self.message)
    }
}
