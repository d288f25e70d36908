use rustc_hash::FxHashMap;

use super::{declare, FuncBuilder, Signature};
use crate::{func::FuncRef, node::NodeId, Program, Type};

pub struct ProgramBuilder {
    program: Program,

    /// Map function name -> FuncRef to avoid duplicated declaration.
    declared_funcs: FxHashMap<String, FuncRef>,

    /// Source line given to the next declaration.
    line: u32,
}

impl ProgramBuilder {
    pub fn new() -> Self {
        Self {
            program: Program::new(),
            declared_funcs: FxHashMap::default(),
            line: 1,
        }
    }

    pub fn program(&self) -> &Program {
        &self.program
    }

    pub fn declare_func(&mut self, sig: Signature) -> FuncRef {
        if let Some(func) = self.declared_funcs.get(sig.name()) {
            return *func;
        }

        let func = declare(&mut self.program, &sig, None, self.line);
        self.line += 1;
        self.declared_funcs.insert(sig.name().to_string(), func);
        func
    }

    /// Declares a function of an already compiled package. Its parameter
    /// tags are given with [`Self::set_param_note`].
    pub fn import_func(&mut self, sig: Signature) -> FuncRef {
        let func = self.declare_func(sig);
        self.program.funcs[func].imported = true;
        func
    }

    pub fn lookup_func(&self, name: &str) -> Option<FuncRef> {
        self.declared_funcs.get(name).copied()
    }

    pub fn set_param_note(&mut self, func: FuncRef, idx: usize, note: &str) {
        self.program.funcs[func].params[idx].note = Some(note.to_string());
    }

    pub fn set_recv_note(&mut self, func: FuncRef, note: &str) {
        if let Some(recv) = &mut self.program.funcs[func].recv {
            recv.note = Some(note.to_string());
        }
    }

    /// Marks a body-less function as not leaking any parameter.
    pub fn mark_noescape(&mut self, func: FuncRef) {
        self.program.funcs[func].noescape = true;
    }

    pub fn declare_global(&mut self, name: &str, ty: Type) -> NodeId {
        self.program.make_global(name, ty)
    }

    pub fn declare_struct(&mut self, name: &str, fields: &[(&str, Type)]) -> Type {
        self.program.types.make_struct(name, fields)
    }

    /// Replaces the fields of a declared struct, used for recursive types.
    pub fn update_struct(&mut self, name: &str, fields: &[(&str, Type)]) {
        self.program.types.update_struct_fields(name, fields)
    }

    pub fn ptr_type(&mut self, ty: Type) -> Type {
        self.program.types.make_ptr(ty)
    }

    pub fn slice_type(&mut self, elem: Type) -> Type {
        self.program.types.make_slice(elem)
    }

    pub fn array_type(&mut self, elem: Type, len: usize) -> Type {
        self.program.types.make_array(elem, len)
    }

    pub fn map_type(&mut self, key: Type, value: Type) -> Type {
        self.program.types.make_map(key, value)
    }

    pub fn chan_type(&mut self, elem: Type) -> Type {
        self.program.types.make_chan(elem)
    }

    pub fn iface_type(&mut self, name: &str) -> Type {
        self.program.types.make_interface(name)
    }

    pub fn func_type(&mut self, args: &[Type], rets: &[Type]) -> Type {
        self.program.types.make_func(args, rets, false)
    }

    /// Builds the body of a declared function.
    pub fn define(&mut self, func: FuncRef, f: impl FnOnce(&mut FuncBuilder)) {
        let mut builder = FuncBuilder::new(&mut self.program, func, self.line);
        f(&mut builder);
        self.line = builder.finish() + 1;
    }

    pub fn build(self) -> Program {
        self.program
    }
}

impl Default for ProgramBuilder {
    fn default() -> Self {
        Self::new()
    }
}
