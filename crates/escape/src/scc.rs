//! Bottom-up traversal of the strongly connected components of the call
//! graph.
use cranelift_entity::SecondaryMap;
use dashmap::DashMap;
use escflow_ir::{FuncRef, NodeId, Op, Program};
use rayon::prelude::*;
use rustc_hash::FxHashSet;

use crate::error::EscapeError;

#[derive(Debug, Clone, Default)]
pub struct CallGraph {
    nodes: SecondaryMap<FuncRef, Node>,
    funcs: Vec<FuncRef>,
}

impl CallGraph {
    /// Builds the call graph of `funcs`.
    ///
    /// Calls to functions outside `funcs` are ignored. The callees of each
    /// function are listed in the order their call sites appear in the
    /// body, children before the node itself.
    pub fn build_graph(program: &Program, funcs: &[FuncRef]) -> Self {
        let members: FxHashSet<FuncRef> = funcs.iter().copied().collect();

        let d_nodes = DashMap::new();
        funcs.par_iter().for_each(|&func_ref| {
            let is_closure = program.funcs[func_ref].is_closure();
            let callees = collect_callees(program, func_ref, &members);
            d_nodes.insert(
                func_ref,
                Node {
                    callees,
                    is_closure,
                },
            );
        });

        let mut nodes = SecondaryMap::new();
        for (func_ref, node) in d_nodes {
            nodes[func_ref] = node;
        }
        CallGraph {
            nodes,
            funcs: funcs.to_vec(),
        }
    }

    pub fn funcs(&self) -> impl Iterator<Item = FuncRef> + '_ {
        self.funcs.iter().copied()
    }

    /// Get the callees of a function, closures it defines included.
    pub fn callee_of(&self, func_ref: FuncRef) -> &[FuncRef] {
        &self.nodes[func_ref].callees
    }

    pub fn is_closure(&self, func_ref: FuncRef) -> bool {
        self.nodes[func_ref].is_closure
    }

    /// Calls `analyze` once per component, callees before callers.
    ///
    /// A function and the closures it defines always share a component.
    /// The flag passed to `analyze` tells whether the component is
    /// recursive. The functions of a component are listed in the reverse of
    /// their discovery order, so the function that closes the component
    /// comes last.
    pub fn visit_bottom_up<F>(&self, mut analyze: F) -> Result<(), EscapeError>
    where
        F: FnMut(&[FuncRef], bool) -> Result<(), EscapeError>,
    {
        let mut visitor = BottomUpVisitor {
            graph: self,
            walkgen: SecondaryMap::new(),
            visitgen: 0,
            stack: Vec::new(),
        };

        for func_ref in self.funcs() {
            if !self.is_closure(func_ref) {
                visitor.visit(func_ref, &mut analyze)?;
            }
        }
        Ok(())
    }
}

/// Builds the call graph of `funcs` and calls `analyze` on its components
/// bottom-up; see [`CallGraph::visit_bottom_up`].
pub fn visit_bottom_up<F>(program: &Program, funcs: &[FuncRef], analyze: F) -> Result<(), EscapeError>
where
    F: FnMut(&[FuncRef], bool) -> Result<(), EscapeError>,
{
    CallGraph::build_graph(program, funcs).visit_bottom_up(analyze)
}

#[derive(Debug, Clone, Default)]
struct Node {
    callees: Vec<FuncRef>,
    is_closure: bool,
}

fn collect_callees(program: &Program, func: FuncRef, members: &FxHashSet<FuncRef>) -> Vec<FuncRef> {
    let Some(body) = &program.funcs[func].body else {
        return Vec::new();
    };

    let mut callees = Vec::new();
    let mut seen = FxHashSet::default();
    let mut stack: Vec<(NodeId, bool)> = body.iter().rev().map(|&stmt| (stmt, false)).collect();
    let mut children = Vec::new();
    while let Some((node, expanded)) = stack.pop() {
        let data = &program.nodes[node];
        if !expanded {
            stack.push((node, true));
            children.clear();
            data.for_each_child(|child| children.push(child));
            stack.extend(children.iter().rev().map(|&child| (child, false)));
            continue;
        }

        let callee = match data.op {
            Op::CallFunc | Op::CallMeth => program.func_of_call(node),
            Op::Closure => data.func.expand(),
            _ => None,
        };
        if let Some(callee) = callee {
            if members.contains(&callee) && seen.insert(callee) {
                callees.push(callee);
            }
        }
    }

    callees
}

struct BottomUpVisitor<'a> {
    graph: &'a CallGraph,
    walkgen: SecondaryMap<FuncRef, u32>,
    visitgen: u32,
    stack: Vec<FuncRef>,
}

impl BottomUpVisitor<'_> {
    /// Each function gets two numbers: `id` marks the function itself and
    /// `id + 1` starts the search below it. A returned low-link of `id`
    /// means the function reaches itself, `id + 1` that it only reaches its
    /// closures.
    fn visit<F>(&mut self, func_ref: FuncRef, analyze: &mut F) -> Result<u32, EscapeError>
    where
        F: FnMut(&[FuncRef], bool) -> Result<(), EscapeError>,
    {
        if self.walkgen[func_ref] > 0 {
            return Ok(self.walkgen[func_ref]);
        }

        self.visitgen += 1;
        let id = self.visitgen;
        self.walkgen[func_ref] = id;
        self.visitgen += 1;
        let mut min = self.visitgen;

        self.stack.push(func_ref);
        for &callee in self.graph.callee_of(func_ref) {
            min = min.min(self.visit(callee, analyze)?);
        }

        if (min == id || min == id + 1) && !self.graph.is_closure(func_ref) {
            let recursive = min == id;
            let mut block = Vec::new();
            while let Some(top) = self.stack.pop() {
                self.walkgen[top] = u32::MAX;
                block.push(top);
                if top == func_ref {
                    break;
                }
            }
            analyze(&block, recursive)?;
        }

        Ok(min)
    }
}
