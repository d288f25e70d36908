use cranelift_entity::PrimaryMap;
use rustc_hash::FxHashMap;

use crate::{
    func::{FuncDecl, FuncRef},
    node::{Class, LabelRef, NodeData, NodeId, NodeStore, Op},
    types::TypeStore,
    Type,
};

/// A whole program: every declared function together with the node arena
/// their bodies live in.
#[derive(Debug, Default)]
pub struct Program {
    pub types: TypeStore,
    pub nodes: NodeStore,
    pub funcs: PrimaryMap<FuncRef, FuncDecl>,
    pub labels: PrimaryMap<LabelRef, String>,
    globals: FxHashMap<String, NodeId>,
}

impl Program {
    pub fn new() -> Self {
        Self::default()
    }

    /// Functions declared in this program, in declaration order. Imported
    /// functions are excluded.
    pub fn decls(&self) -> Vec<FuncRef> {
        self.funcs
            .iter()
            .filter_map(|(func, decl)| (!decl.imported).then_some(func))
            .collect()
    }

    pub fn node(&self, node: NodeId) -> &NodeData {
        &self.nodes[node]
    }

    pub fn func(&self, func: FuncRef) -> &FuncDecl {
        &self.funcs[func]
    }

    pub fn make_global(&mut self, name: &str, ty: Type) -> NodeId {
        if let Some(global) = self.globals.get(name) {
            return *global;
        }

        let mut data = NodeData::new(Op::Name, 0).with_ty(ty).with_sym(name);
        data.class = Class::Extern;
        let global = self.nodes.make_node(data);
        self.globals.insert(name.to_string(), global);
        global
    }

    pub fn lookup_global(&self, name: &str) -> Option<NodeId> {
        self.globals.get(name).copied()
    }

    /// Returns the statically known function called by `call`.
    pub fn func_of_call(&self, call: NodeId) -> Option<FuncRef> {
        let data = &self.nodes[call];
        let callee = data.left.expand()?;
        let callee = &self.nodes[callee];
        match data.op {
            Op::CallFunc if callee.op == Op::Name && callee.class == Class::Func => {
                callee.func.expand()
            }
            Op::CallMeth if callee.op == Op::DotMeth => callee.func.expand(),
            _ => None,
        }
    }

    /// Returns `true` if the body of `func` can take part in the flow graph
    /// of a group.
    pub fn is_in_group_candidate(&self, func: FuncRef) -> bool {
        let decl = &self.funcs[func];
        !decl.imported && decl.has_body()
    }

    pub fn has_pointers(&self, ty: Option<Type>) -> bool {
        ty.is_some_and(|ty| self.types.has_pointers(ty))
    }

    pub fn is_fixed_array(&self, ty: Option<Type>) -> bool {
        ty.is_some_and(|ty| self.types.is_fixed_array(ty))
    }

    pub fn is_slice(&self, ty: Option<Type>) -> bool {
        ty.is_some_and(|ty| self.types.is_slice(ty))
    }

    pub fn label_name(&self, label: LabelRef) -> &str {
        &self.labels[label]
    }
}
