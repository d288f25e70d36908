mod func_builder;
mod program_builder;

pub use func_builder::FuncBuilder;
pub use program_builder::ProgramBuilder;

use crate::{
    func::{FuncDecl, FuncRef, Param},
    node::{Class, NodeData, NodeId, Op},
    Program, Type,
};

/// Function signature used to declare functions and closures.
#[derive(Debug, Clone, Default)]
pub struct Signature {
    name: String,
    recv: Option<(String, Type)>,
    params: Vec<(String, Type)>,
    variadic: bool,
    results: Vec<(Option<String>, Type)>,
}

impl Signature {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            ..Default::default()
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn recv(mut self, name: &str, ty: Type) -> Self {
        self.recv = Some((name.to_string(), ty));
        self
    }

    /// Appends a parameter. An empty name declares an unnamed parameter.
    pub fn param(mut self, name: &str, ty: Type) -> Self {
        debug_assert!(!self.variadic, "`...` parameter must be the last one");
        self.params.push((name.to_string(), ty));
        self
    }

    /// Appends the `...T` parameter; `slice_ty` is `[]T`.
    pub fn variadic(mut self, name: &str, slice_ty: Type) -> Self {
        self.params.push((name.to_string(), slice_ty));
        self.variadic = true;
        self
    }

    pub fn result(mut self, ty: Type) -> Self {
        self.results.push((None, ty));
        self
    }

    pub fn named_result(mut self, name: &str, ty: Type) -> Self {
        self.results.push((Some(name.to_string()), ty));
        self
    }

    fn with_name(mut self, name: String) -> Self {
        self.name = name;
        self
    }
}

/// Declares the function described by `sig` and creates its parameter
/// names.
pub(crate) fn declare(
    program: &mut Program,
    sig: &Signature,
    outer: Option<FuncRef>,
    line: u32,
) -> FuncRef {
    let arg_tys: Vec<Type> = sig.params.iter().map(|(_, ty)| *ty).collect();
    let ret_tys: Vec<Type> = sig.results.iter().map(|(_, ty)| *ty).collect();
    let fn_ty = program.types.make_func(&arg_tys, &ret_tys, sig.variadic);

    let mut decl = FuncDecl::new(&sig.name);
    decl.outer = outer.into();
    decl.ty = Some(fn_ty);
    decl.line = line;
    let func = program.funcs.push(decl);

    if let Some((name, ty)) = &sig.recv {
        let param = make_param(program, func, name, *ty, line);
        program.funcs[func].recv = Some(param);
    }

    let n_params = sig.params.len();
    for (idx, (name, ty)) in sig.params.iter().enumerate() {
        let mut param = make_param(program, func, name, *ty, line);
        param.isddd = sig.variadic && idx + 1 == n_params;
        if let Some(node) = param.name.expand() {
            program.nodes[node].isddd = param.isddd;
        }
        program.funcs[func].params.push(param);
    }

    for (idx, (name, ty)) in sig.results.iter().enumerate() {
        let name = match name {
            Some(name) => name.clone(),
            None => format!("~r{idx}"),
        };
        let node = make_name(program, func, &name, *ty, Class::ParamOut, line);
        program.nodes[node].vargen = idx as u32 + 1;
        program.funcs[func].dcl.push(node);
        program.funcs[func]
            .results
            .push(Param::new(Some(node), Some(*ty)));
    }

    func
}

fn make_param(program: &mut Program, func: FuncRef, name: &str, ty: Type, line: u32) -> Param {
    if name.is_empty() {
        return Param::new(None, Some(ty));
    }

    let node = make_name(program, func, name, ty, Class::Param, line);
    program.funcs[func].dcl.push(node);
    Param::new(Some(node), Some(ty))
}

pub(crate) fn make_name(
    program: &mut Program,
    func: FuncRef,
    name: &str,
    ty: Type,
    class: Class,
    line: u32,
) -> NodeId {
    let mut data = NodeData::new(Op::Name, line).with_ty(ty).with_sym(name);
    data.class = class;
    data.curfn = func.into();
    program.nodes.make_node(data)
}

pub mod test_util {
    use crate::{ir_writer::FuncWriter, FuncRef, Program};

    pub fn dump_func(program: &Program, func: FuncRef) -> String {
        FuncWriter::new(program, func).dump_string()
    }
}
