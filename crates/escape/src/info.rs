use cranelift_entity::SecondaryMap;
use escflow_ir::{FuncRef, NodeId, Program};
use indexmap::IndexSet;

use crate::{
    report::EscapeReport,
    tag::{parsetag, EscClass},
};

/// Progress of a function through the analysis of its group.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
pub enum FuncState {
    /// Not reached by the call graph visitor yet.
    #[default]
    Unknown,
    /// Its group is being analyzed, the flow graph is not built yet.
    Planned,
    /// The flow graph of its body is being built.
    Started,
    /// Parameter tags are written; callers use the tags.
    Tagged,
}

/// The result of the analysis of a whole program.
#[derive(Debug, Default)]
pub struct EscapeInfo {
    pub(crate) esc: SecondaryMap<NodeId, u16>,
    pub(crate) loopdepth: SecondaryMap<NodeId, i32>,
    pub(crate) moved_to_heap: IndexSet<NodeId>,
    pub(crate) func_state: SecondaryMap<FuncRef, FuncState>,
    pub(crate) report: EscapeReport,
}

impl EscapeInfo {
    /// The escape word of `node`.
    pub fn esc_of(&self, node: NodeId) -> u16 {
        self.esc[node]
    }

    pub fn class_of(&self, node: NodeId) -> EscClass {
        EscClass::of(self.esc[node])
    }

    /// Returns `true` if the allocation made by `node` must live on the
    /// heap.
    pub fn escapes_to_heap(&self, node: NodeId) -> bool {
        self.class_of(node) == EscClass::Heap
    }

    /// Returns `true` if the variable `node` had its address leak and lives
    /// on the heap.
    pub fn is_moved_to_heap(&self, node: NodeId) -> bool {
        self.moved_to_heap.contains(&node)
    }

    /// Variables moved to the heap, in the order they were found.
    pub fn moved_to_heap(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.moved_to_heap.iter().copied()
    }

    pub fn loopdepth_of(&self, node: NodeId) -> i32 {
        self.loopdepth[node]
    }

    pub fn func_state(&self, func: FuncRef) -> FuncState {
        self.func_state[func]
    }

    pub fn report(&self) -> &EscapeReport {
        &self.report
    }

    /// The decoded tag of the `idx`th parameter of `func`.
    pub fn param_tag(&self, program: &Program, func: FuncRef, idx: usize) -> u16 {
        parsetag(program.funcs[func].param_note(idx))
    }

    /// The decoded tag of the receiver of `func`.
    pub fn recv_tag(&self, program: &Program, func: FuncRef) -> u16 {
        let note = program.funcs[func]
            .recv
            .as_ref()
            .and_then(|recv| recv.note.as_deref());
        parsetag(note)
    }
}
