use std::fmt::Write;

use escflow_ir::{FuncRef, NodeId, Program};

use crate::level::Level;

/// Optional observer hooks for tracing the analysis.
///
/// Hooks are called in analysis order, so a recording observer sees the
/// same sequence for the same program on every run.
pub trait EscapeObserver {
    /// A group of functions is about to be analyzed.
    fn on_group(&mut self, _program: &Program, _funcs: &[FuncRef], _recursive: bool) {}

    /// A flow edge `src -> dst` is recorded.
    fn on_flow(&mut self, _program: &Program, _dst: NodeId, _src: NodeId) {}

    /// The flood from `dst` reaches `src` at `level`.
    fn on_walk(&mut self, _program: &Program, _level: Level, _dst: NodeId, _src: NodeId) {}

    /// The input `param` of `func` gets `note`.
    fn on_tag(&mut self, _program: &Program, _func: FuncRef, _param: Option<NodeId>, _note: &str) {}
}

pub struct NullObserver;

impl EscapeObserver for NullObserver {}

/// A text trace collector.
///
/// The `render` output is stable and human-oriented: one header per group
/// followed by the recorded flow edges, the flood steps and the tags.
#[derive(Default)]
pub struct EscapeTrace {
    out: String,
}

impl EscapeTrace {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn render(self) -> String {
        if self.out.is_empty() {
            return "<no groups>\n".to_string();
        }
        self.out
    }
}

impl EscapeObserver for EscapeTrace {
    fn on_group(&mut self, program: &Program, funcs: &[FuncRef], recursive: bool) {
        let names: Vec<&str> = funcs
            .iter()
            .map(|func| program.funcs[*func].name.as_str())
            .collect();
        let kind = if recursive { " (recursive)" } else { "" };
        let _ = writeln!(&mut self.out, "group [{}]{kind}", names.join(", "));
    }

    fn on_flow(&mut self, program: &Program, dst: NodeId, src: NodeId) {
        let _ = writeln!(
            &mut self.out,
            "  flow {} <- {}",
            program.display(dst),
            program.display(src)
        );
    }

    fn on_walk(&mut self, program: &Program, level: Level, dst: NodeId, src: NodeId) {
        let _ = writeln!(
            &mut self.out,
            "  walk {} <- {} level={level}",
            program.display(dst),
            program.display(src)
        );
    }

    fn on_tag(&mut self, program: &Program, func: FuncRef, param: Option<NodeId>, note: &str) {
        let name = &program.funcs[func].name;
        match param {
            Some(param) => {
                let _ = writeln!(&mut self.out, "  tag {name}({}) {note}", program.display(param));
            }
            None => {
                let _ = writeln!(&mut self.out, "  tag {name}(_) {note}");
            }
        }
    }
}
