//! Escape analysis.
//!
//! Decides, for every allocation and parameter of a program, whether its
//! storage may outlive the function activation that creates it. Functions
//! are analyzed bottom-up over the strongly connected components of the
//! call graph; each analyzed function leaves a tag on its parameters that
//! summarizes their flow for the callers analyzed later.
mod analyze;

pub mod config;
pub mod diagnostic;
pub mod error;
pub mod info;
pub mod level;
pub mod report;
pub mod scc;
pub mod tag;
pub mod trace;

use escflow_ir::Program;

pub use config::{DebugLevel, EscapeConfig};
pub use diagnostic::{Diagnostic, DiagnosticKind};
pub use error::EscapeError;
pub use info::{EscapeInfo, FuncState};
pub use level::Level;
pub use report::EscapeReport;
pub use scc::{visit_bottom_up, CallGraph};
pub use tag::{describe_escape, mktag, parsetag, EscClass};
pub use trace::{EscapeObserver, EscapeTrace, NullObserver};

/// Analyzes every function declared in `program`.
///
/// Parameter tags are written to the parameter notes of `program`, and
/// synthetic nodes made by the analysis are appended to its node arena.
pub fn escapes(program: &mut Program, config: &EscapeConfig) -> Result<EscapeInfo, EscapeError> {
    escapes_with_observer(program, config, &mut NullObserver)
}

/// Same as [`escapes`], reporting each step to `observer`.
pub fn escapes_with_observer(
    program: &mut Program,
    config: &EscapeConfig,
    observer: &mut dyn EscapeObserver,
) -> Result<EscapeInfo, EscapeError> {
    let funcs = program.decls();
    let graph = CallGraph::build_graph(program, &funcs);

    let mut info = EscapeInfo::default();
    graph.visit_bottom_up(|group, recursive| {
        analyze::esc_analyze(program, &mut info, config, observer, group, recursive)
    })?;

    Ok(info)
}
