//! Flow graph construction and flooding for one group of functions.
mod assign;
mod call;
mod flood;
mod loopdepth;
mod walk;

use cranelift_entity::SecondaryMap;
use escflow_ir::{Class, FuncRef, LabelRef, NodeData, NodeId, Op, Program, Type};
use rustc_hash::FxHashMap;
use smallvec::SmallVec;

use crate::{
    config::EscapeConfig,
    diagnostic::{Diagnostic, DiagnosticKind},
    error::EscapeError,
    info::{EscapeInfo, FuncState},
    level::Level,
    tag::{mktag, EscClass},
    trace::EscapeObserver,
};

/// Whether a label is the target of a backward `goto`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LabelState {
    NonLooping,
    Looping,
}

/// Analyzes one group of functions: builds the flow graph of every body,
/// floods it from every destination and tags the parameters.
pub(crate) fn esc_analyze(
    prog: &mut Program,
    info: &mut EscapeInfo,
    config: &EscapeConfig,
    observer: &mut dyn EscapeObserver,
    funcs: &[FuncRef],
    recursive: bool,
) -> Result<(), EscapeError> {
    observer.on_group(prog, funcs, recursive);

    let mut e = EscState::new(prog, info, config, observer, recursive);
    for &func in funcs {
        e.info.func_state[func] = FuncState::Planned;
    }

    for &func in funcs {
        e.escfunc(func)?;
    }

    // Visit the upstream of each destination, mark address nodes that
    // escape and parameters that leak.
    let dsts = std::mem::take(&mut e.dsts);
    for dst in dsts {
        e.escflood(dst);
    }

    for &func in funcs {
        e.esctag(func);
    }

    e.report_noesc();
    Ok(())
}

/// The state of the analysis of one group. The flow graph lives here and
/// is dropped with the group; escape words and loop depths are written to
/// the [`EscapeInfo`] shared by all groups.
pub(crate) struct EscState<'a> {
    prog: &'a mut Program,
    info: &'a mut EscapeInfo,
    config: &'a EscapeConfig,
    observer: &'a mut dyn EscapeObserver,

    /// Stands for the heap, globals and everything else that outlives the
    /// group.
    sink: NodeId,
    /// Every node with a flow source, in the order of the first edge.
    dsts: Vec<NodeId>,
    /// Allocations and parameters that may not escape, with the function
    /// they belong to.
    noesc: Vec<(NodeId, Option<FuncRef>)>,
    loopdepth: i32,
    recursive: bool,
    curfn: Option<FuncRef>,

    flowsrc: SecondaryMap<NodeId, SmallVec<[NodeId; 2]>>,
    /// The result nodes of each call.
    retval: SecondaryMap<NodeId, SmallVec<[NodeId; 2]>>,
    walkgen: SecondaryMap<NodeId, u32>,
    esclevel: SecondaryMap<NodeId, Level>,
    cur_walkgen: u32,
    labels: FxHashMap<LabelRef, LabelState>,
}

impl<'a> EscState<'a> {
    fn new(
        prog: &'a mut Program,
        info: &'a mut EscapeInfo,
        config: &'a EscapeConfig,
        observer: &'a mut dyn EscapeObserver,
        recursive: bool,
    ) -> Self {
        let mut data = NodeData::new(Op::Name, 0).with_sym(".sink");
        data.class = Class::Extern;
        let sink = prog.nodes.make_node(data);
        info.loopdepth[sink] = -1;

        Self {
            prog,
            info,
            config,
            observer,
            sink,
            dsts: Vec::new(),
            noesc: Vec::new(),
            loopdepth: 0,
            recursive,
            curfn: None,
            flowsrc: SecondaryMap::new(),
            retval: SecondaryMap::new(),
            walkgen: SecondaryMap::new(),
            esclevel: SecondaryMap::new(),
            cur_walkgen: 0,
            labels: FxHashMap::default(),
        }
    }

    /// Builds the flow graph of the body of `func`.
    fn escfunc(&mut self, func: FuncRef) -> Result<(), EscapeError> {
        if self.info.func_state[func] != FuncState::Planned {
            return Err(EscapeError::RepeatEscfunc { func });
        }
        self.info.func_state[func] = FuncState::Started;

        let saved_loopdepth = self.loopdepth;
        let saved_curfn = self.curfn;
        self.loopdepth = 1;
        self.curfn = Some(func);

        let decl = &self.prog.funcs[func];
        let dcl = decl.dcl.clone();
        let body = decl.body.clone().unwrap_or_default();
        let starts_at_heap = !decl.has_body() && !decl.noescape;

        for &name in &dcl {
            let data = &self.prog.nodes[name];
            if data.op != Op::Name {
                continue;
            }
            match data.class {
                // Outputs are between the sink and every local.
                Class::ParamOut => self.info.loopdepth[name] = 0,
                Class::Param => {
                    self.info.loopdepth[name] = 1;
                    if self.has_no_pointers(data.ty) {
                        continue;
                    }
                    let class = if starts_at_heap {
                        EscClass::Heap
                    } else {
                        EscClass::None
                    };
                    self.info.esc[name] = class.bits();
                    self.noesc.push((name, self.curfn));
                }
                _ => {}
            }
        }

        // Results of a recursive group cannot be tracked.
        if self.recursive {
            for &name in &dcl {
                let data = &self.prog.nodes[name];
                if data.op == Op::Name && data.class == Class::ParamOut {
                    self.escflows(self.sink, name);
                }
            }
        }

        self.escloopdepth_list(&body)?;
        self.esc_list(&body, None)?;

        self.curfn = saved_curfn;
        self.loopdepth = saved_loopdepth;
        Ok(())
    }

    /// Writes the parameter tags of `func`.
    fn esctag(&mut self, func: FuncRef) {
        self.info.func_state[func] = FuncState::Tagged;

        let decl = &self.prog.funcs[func];
        if !decl.has_body() {
            // A function without a body is assumed to leak its parameters
            // unless declared otherwise.
            if !decl.noescape {
                return;
            }
            let Some(note) = mktag(EscClass::None.bits()) else {
                return;
            };
            for idx in 0..decl.params.len() {
                let param = &self.prog.funcs[func].params[idx];
                if !self.prog.has_pointers(param.ty) {
                    continue;
                }
                let name = param.name.expand();
                self.prog.funcs[func].params[idx].note = Some(note.clone());
                self.observer.on_tag(self.prog, func, name, &note);
            }
            return;
        }

        let n_params = decl.params.len();
        if let Some(recv) = &decl.recv {
            if let Some(note) = self.tag_of(recv.name.expand(), recv.ty) {
                let name = recv.name.expand();
                if let Some(recv) = &mut self.prog.funcs[func].recv {
                    recv.note = Some(note.clone());
                }
                self.observer.on_tag(self.prog, func, name, &note);
            }
        }
        for idx in 0..n_params {
            let param = &self.prog.funcs[func].params[idx];
            let name = param.name.expand();
            if let Some(note) = self.tag_of(name, param.ty) {
                self.prog.funcs[func].params[idx].note = Some(note.clone());
                self.observer.on_tag(self.prog, func, name, &note);
            }
        }
    }

    /// The tag of a parameter; only pointer-bearing parameters that do not
    /// leave their scope get one.
    fn tag_of(&self, name: Option<NodeId>, ty: Option<Type>) -> Option<String> {
        let esc = self.info.esc[name?];
        match EscClass::of(esc) {
            EscClass::None | EscClass::Return if self.prog.has_pointers(ty) => mktag(esc),
            _ => None,
        }
    }

    fn report_noesc(&mut self) {
        if !self.config.should_report() {
            return;
        }

        let noesc = std::mem::take(&mut self.noesc);
        for (node, func) in noesc {
            if self.info.esc[node] != EscClass::None.bits() {
                continue;
            }
            let message = match func {
                Some(func) => format!(
                    "{} {} does not escape",
                    self.prog.funcs[func].name,
                    self.display(node)
                ),
                None => format!("{} does not escape", self.display(node)),
            };
            self.report(DiagnosticKind::DoesNotEscape, node, func, message);
        }
    }

    fn report(
        &mut self,
        kind: DiagnosticKind,
        node: NodeId,
        func: Option<FuncRef>,
        message: String,
    ) {
        if !self.config.should_report() {
            return;
        }
        let line = self.prog.nodes[node].line;
        let diagnostic = Diagnostic::new(kind, line, func, message);
        self.info
            .report
            .push(diagnostic, self.config.max_diagnostics);
    }

    fn display(&self, node: NodeId) -> String {
        self.prog.display(node).to_string()
    }

    fn op(&self, node: NodeId) -> Op {
        self.prog.nodes[node].op
    }

    fn left(&self, node: NodeId) -> Option<NodeId> {
        self.prog.nodes[node].left.expand()
    }

    fn right(&self, node: NodeId) -> Option<NodeId> {
        self.prog.nodes[node].right.expand()
    }

    fn ty(&self, node: NodeId) -> Option<Type> {
        self.prog.nodes[node].ty
    }

    /// Returns `true` only for a known type without pointers.
    fn has_no_pointers(&self, ty: Option<Type>) -> bool {
        ty.is_some_and(|ty| !self.prog.types.has_pointers(ty))
    }

    fn is_fixed_array(&self, node: Option<NodeId>) -> bool {
        node.is_some_and(|node| self.prog.is_fixed_array(self.ty(node)))
    }

    /// Records `node` as an allocation made at the current loop depth that
    /// does not escape until the flood says otherwise.
    fn mark_noesc(&mut self, node: NodeId) {
        self.info.esc[node] = EscClass::None.bits();
        self.info.loopdepth[node] = self.loopdepth;
        self.noesc.push((node, self.curfn));
    }
}
