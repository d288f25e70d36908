use rustc_hash::FxHashMap;

use super::{declare, make_name, Signature};
use crate::{
    func::FuncRef,
    node::{Class, LabelRef, NodeData, NodeId, Op},
    Program, Type,
};

/// Appends statements to the body of a function.
///
/// Expression helpers create detached nodes with the type the expression
/// has; statement helpers append to the innermost open statement list.
/// Every appended statement advances the current source line.
pub struct FuncBuilder<'a> {
    program: &'a mut Program,
    func: FuncRef,
    line: u32,
    frames: Vec<Vec<NodeId>>,
    labels: FxHashMap<String, LabelRef>,
    closures: u32,
}

impl<'a> FuncBuilder<'a> {
    pub(super) fn new(program: &'a mut Program, func: FuncRef, line: u32) -> Self {
        Self {
            program,
            func,
            line,
            frames: vec![Vec::new()],
            labels: FxHashMap::default(),
            closures: 0,
        }
    }

    /// Stores the built body and returns the last used line.
    pub(super) fn finish(mut self) -> u32 {
        let body = self.frames.pop().unwrap_or_default();
        debug_assert!(self.frames.is_empty(), "unclosed statement list");
        self.program.funcs[self.func].body = Some(body);
        self.line
    }

    pub fn func(&self) -> FuncRef {
        self.func
    }

    pub fn program(&self) -> &Program {
        self.program
    }

    pub fn line(&self) -> u32 {
        self.line
    }

    pub fn set_line(&mut self, line: u32) {
        self.line = line;
    }

    pub fn ty_of(&self, node: NodeId) -> Option<Type> {
        self.program.nodes[node].ty
    }

    /// Returns the name of the `idx`th parameter.
    ///
    /// # Panics
    /// Panics if the parameter is unnamed.
    pub fn param(&self, idx: usize) -> NodeId {
        match self.program.funcs[self.func].params[idx].name.expand() {
            Some(name) => name,
            None => panic!("parameter {idx} is unnamed"),
        }
    }

    /// Returns the name of the `idx`th output parameter.
    pub fn result(&self, idx: usize) -> NodeId {
        match self.program.funcs[self.func].results[idx].name.expand() {
            Some(name) => name,
            None => panic!("result {idx} is unnamed"),
        }
    }

    /// Returns the name of the receiver.
    pub fn recv(&self) -> NodeId {
        match self.program.funcs[self.func]
            .recv
            .as_ref()
            .and_then(|recv| recv.name.expand())
        {
            Some(name) => name,
            None => panic!("function has no named receiver"),
        }
    }

    /// Declares a local variable at the current position.
    pub fn local(&mut self, name: &str, ty: Type) -> NodeId {
        let var = make_name(self.program, self.func, name, ty, Class::Auto, self.line);
        self.program.funcs[self.func].dcl.push(var);
        let decl = self.make(NodeData::new(Op::Decl, 0).with_left(var));
        self.push_stmt(decl);
        var
    }

    /// The blank identifier `_`.
    pub fn blank(&mut self) -> NodeId {
        self.make(NodeData::new(Op::Name, 0).with_sym("_"))
    }

    pub fn func_value(&mut self, func: FuncRef) -> NodeId {
        let decl = &self.program.funcs[func];
        let mut data = NodeData::new(Op::Name, 0)
            .with_ty(decl.ty)
            .with_sym(&decl.name);
        data.class = Class::Func;
        data.func = func.into();
        self.make(data)
    }

    /// Creates a closure whose body is built by `f`. Variables of this
    /// function are made visible with [`FuncBuilder::capture`].
    pub fn closure(&mut self, sig: Signature, f: impl FnOnce(&mut FuncBuilder)) -> NodeId {
        self.closures += 1;
        let start = self.line;
        let name = format!("{}.func{}", self.program.funcs[self.func].name, self.closures);
        let closure = declare(self.program, &sig.with_name(name), Some(self.func), start);

        let mut builder = FuncBuilder::new(&mut *self.program, closure, start);
        f(&mut builder);
        self.line = builder.finish();

        let mut data =
            NodeData::new(Op::Closure, 0).with_ty(self.program.funcs[closure].ty);
        data.func = closure.into();
        data.curfn = self.func.into();
        data.line = start;
        self.program.nodes.make_node(data)
    }

    /// Makes the variable `var` of the enclosing function visible inside the
    /// closure being built.
    pub fn capture(&mut self, var: NodeId, byval: bool) -> NodeId {
        let outer = &self.program.nodes[var];
        let mut data = NodeData::new(Op::Name, self.line).with_ty(outer.ty);
        data.sym = outer.sym.clone();
        data.class = Class::ParamRef;
        data.closure = var.into();
        data.byval = byval;
        data.curfn = self.func.into();
        let cvar = self.program.nodes.make_node(data);
        self.program.funcs[self.func].cvars.push(cvar);
        cvar
    }

    pub fn int(&mut self, value: i64) -> NodeId {
        self.make(
            NodeData::new(Op::Literal, 0)
                .with_ty(Type::I64)
                .with_sym(&value.to_string()),
        )
    }

    pub fn str(&mut self, value: &str) -> NodeId {
        self.make(
            NodeData::new(Op::Literal, 0)
                .with_ty(Type::String)
                .with_sym(&format!("{value:?}")),
        )
    }

    pub fn nil(&mut self, ty: Type) -> NodeId {
        self.make(NodeData::new(Op::Literal, 0).with_ty(ty).with_sym("nil"))
    }

    /// `&x`
    pub fn addr(&mut self, x: NodeId) -> NodeId {
        let ty = self.ty_of(x).map(|ty| self.program.types.make_ptr(ty));
        self.make(NodeData::new(Op::Addr, 0).with_ty(ty).with_left(x))
    }

    /// `*p`
    pub fn ind(&mut self, p: NodeId) -> NodeId {
        let ty = self.ty_of(p).and_then(|ty| self.program.types.deref(ty));
        self.make(NodeData::new(Op::Ind, 0).with_ty(ty).with_left(p))
    }

    /// `x.field` on a struct value.
    pub fn dot(&mut self, x: NodeId, field: &str) -> NodeId {
        let ty = self
            .ty_of(x)
            .and_then(|ty| self.program.types.field_ty(ty, field));
        self.make(
            NodeData::new(Op::Dot, 0)
                .with_ty(ty)
                .with_left(x)
                .with_sym(field),
        )
    }

    /// `p.field` through a pointer to a struct.
    pub fn dot_ptr(&mut self, p: NodeId, field: &str) -> NodeId {
        let types = &self.program.types;
        let ty = self
            .ty_of(p)
            .and_then(|ty| types.deref(ty))
            .and_then(|ty| types.field_ty(ty, field));
        self.make(
            NodeData::new(Op::DotPtr, 0)
                .with_ty(ty)
                .with_left(p)
                .with_sym(field),
        )
    }

    /// `x[i]`; map indexing becomes `IndexMap`.
    pub fn index(&mut self, x: NodeId, i: NodeId) -> NodeId {
        let x_ty = self.ty_of(x);
        let is_map = x_ty.is_some_and(|ty| self.program.types.is_map(ty));
        let ty = x_ty.and_then(|ty| self.program.types.elem(ty));
        let op = if is_map { Op::IndexMap } else { Op::Index };
        self.make(NodeData::new(op, 0).with_ty(ty).with_left(x).with_right(i))
    }

    /// `x[lo:hi]` on a slice, a string or a pointer to an array.
    pub fn slice(&mut self, x: NodeId, lo: Option<NodeId>, hi: Option<NodeId>) -> NodeId {
        let lo = match (lo, hi) {
            (None, Some(_)) => Some(self.int(0)),
            _ => lo,
        };

        let x_ty = self.program.nodes[x].ty;
        let types = &mut self.program.types;
        let (op, ty) = match x_ty {
            Some(Type::String) => (Op::SliceStr, Some(Type::String)),
            Some(x_ty) => match types.deref(x_ty).and_then(|arr| types.array_def(arr)) {
                Some((elem, _)) => (Op::SliceArr, Some(types.make_slice(elem))),
                None => (Op::Slice, Some(x_ty)),
            },
            None => (Op::Slice, None),
        };
        let bounds = lo.into_iter().chain(hi).collect();
        self.make(
            NodeData::new(op, 0)
                .with_ty(ty)
                .with_left(x)
                .with_list(bounds),
        )
    }

    pub fn new_(&mut self, ty: Type) -> NodeId {
        let ptr = self.program.types.make_ptr(ty);
        self.make(NodeData::new(Op::New, 0).with_ty(ptr))
    }

    pub fn make_slice(&mut self, slice_ty: Type, len: NodeId) -> NodeId {
        self.make(
            NodeData::new(Op::MakeSlice, 0)
                .with_ty(slice_ty)
                .with_list(vec![len]),
        )
    }

    pub fn make_map(&mut self, map_ty: Type) -> NodeId {
        self.make(NodeData::new(Op::MakeMap, 0).with_ty(map_ty))
    }

    pub fn make_chan(&mut self, chan_ty: Type) -> NodeId {
        self.make(NodeData::new(Op::MakeChan, 0).with_ty(chan_ty))
    }

    /// `T{f: v, ...}`
    pub fn struct_lit(&mut self, ty: Type, fields: &[(&str, NodeId)]) -> NodeId {
        let entries = fields
            .iter()
            .map(|(field, value)| {
                let key = self.make(NodeData::new(Op::Literal, 0).with_sym(field));
                self.key(key, *value)
            })
            .collect();
        self.make(
            NodeData::new(Op::StructLit, 0)
                .with_ty(ty)
                .with_list(entries),
        )
    }

    /// `[]T{v, ...}` or `[N]T{v, ...}`, depending on `ty`.
    pub fn array_lit(&mut self, ty: Type, elems: &[NodeId]) -> NodeId {
        let entries = elems
            .iter()
            .enumerate()
            .map(|(idx, value)| {
                let key = self.int(idx as i64);
                self.key(key, *value)
            })
            .collect();
        self.make(NodeData::new(Op::ArrayLit, 0).with_ty(ty).with_list(entries))
    }

    pub fn map_lit(&mut self, ty: Type, entries: &[(NodeId, NodeId)]) -> NodeId {
        let entries = entries
            .iter()
            .map(|(key, value)| self.key(*key, *value))
            .collect();
        self.make(NodeData::new(Op::MapLit, 0).with_ty(ty).with_list(entries))
    }

    /// `&T{...}` where `lit` is a composite literal.
    pub fn ptr_lit(&mut self, lit: NodeId) -> NodeId {
        let ty = self.ty_of(lit).map(|ty| self.program.types.make_ptr(ty));
        self.make(NodeData::new(Op::PtrLit, 0).with_ty(ty).with_left(lit))
    }

    pub fn conv(&mut self, x: NodeId, ty: Type) -> NodeId {
        self.make(NodeData::new(Op::Conv, 0).with_ty(ty).with_left(x))
    }

    pub fn conv_nop(&mut self, x: NodeId, ty: Type) -> NodeId {
        self.make(NodeData::new(Op::ConvNop, 0).with_ty(ty).with_left(x))
    }

    /// Boxes a concrete value into the interface type `iface`.
    pub fn conv_iface(&mut self, x: NodeId, iface: Type) -> NodeId {
        self.make(NodeData::new(Op::ConvIface, 0).with_ty(iface).with_left(x))
    }

    /// `string(bytes)`
    pub fn bytes_to_str(&mut self, x: NodeId) -> NodeId {
        self.make(
            NodeData::new(Op::ArrayByteStr, 0)
                .with_ty(Type::String)
                .with_left(x),
        )
    }

    /// `[]byte(s)`
    pub fn str_to_bytes(&mut self, x: NodeId) -> NodeId {
        let ty = self.program.types.make_slice(Type::I8);
        self.make(NodeData::new(Op::StrArrayByte, 0).with_ty(ty).with_left(x))
    }

    pub fn add_str(&mut self, parts: &[NodeId]) -> NodeId {
        self.make(
            NodeData::new(Op::AddStr, 0)
                .with_ty(Type::String)
                .with_list(parts.to_vec()),
        )
    }

    /// `x.(T)`
    pub fn dot_type(&mut self, x: NodeId, ty: Type) -> NodeId {
        self.make(NodeData::new(Op::DotType, 0).with_ty(ty).with_left(x))
    }

    /// `<-ch`
    pub fn recv_expr(&mut self, ch: NodeId) -> NodeId {
        let ty = self.ty_of(ch).and_then(|ty| self.program.types.elem(ty));
        self.make(NodeData::new(Op::Recv, 0).with_ty(ty).with_left(ch))
    }

    pub fn len(&mut self, x: NodeId) -> NodeId {
        self.make(NodeData::new(Op::Len, 0).with_ty(Type::I64).with_left(x))
    }

    pub fn binary(&mut self, op: Op, lhs: NodeId, rhs: NodeId) -> NodeId {
        debug_assert!(op.is_binary_arith() || matches!(op, Op::Eq | Op::Ne | Op::Lt));
        let ty = self.ty_of(lhs);
        self.make(
            NodeData::new(op, 0)
                .with_ty(ty)
                .with_left(lhs)
                .with_right(rhs),
        )
    }

    /// `append(args[0], args[1..]...)`; `spread` marks `append(s, t...)`.
    pub fn append(&mut self, args: &[NodeId], spread: bool) -> NodeId {
        let ty = args.first().and_then(|arg| self.ty_of(*arg));
        let mut data = NodeData::new(Op::Append, 0)
            .with_ty(ty)
            .with_list(args.to_vec());
        data.isddd = spread;
        self.make(data)
    }

    /// `f(args)` for a declared function.
    pub fn call(&mut self, func: FuncRef, args: &[NodeId]) -> NodeId {
        let callee = self.func_value(func);
        let ty = self.single_result(func);
        self.make_call(Op::CallFunc, callee, args, ty, false)
    }

    /// `f(args...)`, the last argument is passed as the `...` slice.
    pub fn call_spread(&mut self, func: FuncRef, args: &[NodeId]) -> NodeId {
        let callee = self.func_value(func);
        let ty = self.single_result(func);
        self.make_call(Op::CallFunc, callee, args, ty, true)
    }

    /// `recv.M(args)` for a declared method.
    pub fn call_meth(&mut self, recv: NodeId, func: FuncRef, args: &[NodeId]) -> NodeId {
        let decl = &self.program.funcs[func];
        let mut data = NodeData::new(Op::DotMeth, 0)
            .with_ty(decl.ty)
            .with_left(recv)
            .with_sym(&decl.name);
        data.func = func.into();
        let callee = self.make(data);
        let ty = self.single_result(func);
        self.make_call(Op::CallMeth, callee, args, ty, false)
    }

    /// `recv.method(args)` through an interface; `fn_ty` is the method type
    /// without the receiver.
    pub fn call_inter(
        &mut self,
        recv: NodeId,
        method: &str,
        fn_ty: Type,
        args: &[NodeId],
    ) -> NodeId {
        let callee = self.make(
            NodeData::new(Op::DotInter, 0)
                .with_ty(fn_ty)
                .with_left(recv)
                .with_sym(method),
        );
        let ty = self.single_result_of_ty(fn_ty);
        self.make_call(Op::CallInter, callee, args, ty, false)
    }

    /// Calls a function value.
    pub fn call_value(&mut self, callee: NodeId, args: &[NodeId]) -> NodeId {
        let ty = self
            .ty_of(callee)
            .and_then(|fn_ty| self.single_result_of_ty(fn_ty));
        self.make_call(Op::CallFunc, callee, args, ty, false)
    }

    /// The method value `recv.M`.
    pub fn method_value(&mut self, recv: NodeId, func: FuncRef) -> NodeId {
        let decl = &self.program.funcs[func];
        let mut data = NodeData::new(Op::CallPart, 0)
            .with_ty(decl.ty)
            .with_left(recv)
            .with_sym(&decl.name);
        data.func = func.into();
        self.make(data)
    }

    /// Appends an expression statement.
    pub fn expr_stmt(&mut self, expr: NodeId) -> NodeId {
        self.push_stmt(expr)
    }

    pub fn assign(&mut self, dst: NodeId, src: NodeId) -> NodeId {
        let stmt = self.make(NodeData::new(Op::As, 0).with_left(dst).with_right(src));
        self.push_stmt(stmt)
    }

    /// `dst op= src`
    pub fn assign_op(&mut self, dst: NodeId, op: Op, src: NodeId) -> NodeId {
        let stmt = self.make(
            NodeData::new(Op::AsOp, 0)
                .with_left(dst)
                .with_right(src)
                .with_sym(op.symbol()),
        );
        self.push_stmt(stmt)
    }

    /// `a, b = x, y`
    pub fn assign2(&mut self, dsts: &[NodeId], srcs: &[NodeId]) -> NodeId {
        let mut data = NodeData::new(Op::As2, 0).with_list(dsts.to_vec());
        data.rlist = srcs.to_vec();
        let stmt = self.make(data);
        self.push_stmt(stmt)
    }

    /// `a, b = f()`
    pub fn assign2_call(&mut self, dsts: &[NodeId], call: NodeId) -> NodeId {
        let mut data = NodeData::new(Op::As2Func, 0).with_list(dsts.to_vec());
        data.rlist = vec![call];
        let stmt = self.make(data);
        self.push_stmt(stmt)
    }

    /// `v, ok = <-ch`, `v, ok = m[k]` or `v, ok = x.(T)`, depending on `src`.
    pub fn assign2_ok(&mut self, value: NodeId, ok: NodeId, src: NodeId) -> NodeId {
        let op = match self.program.nodes[src].op {
            Op::Recv => Op::As2Recv,
            Op::IndexMap => Op::As2MapR,
            Op::DotType | Op::DotType2 => {
                self.program.nodes[src].op = Op::DotType2;
                Op::As2DotType
            }
            op => panic!("{op} has no comma-ok form"),
        };
        let mut data = NodeData::new(op, 0).with_list(vec![value, ok]);
        data.rlist = vec![src];
        let stmt = self.make(data);
        self.push_stmt(stmt)
    }

    pub fn ret(&mut self, values: &[NodeId]) -> NodeId {
        let stmt = self.make(NodeData::new(Op::Return, 0).with_list(values.to_vec()));
        self.push_stmt(stmt)
    }

    /// `ch <- value`
    pub fn send(&mut self, ch: NodeId, value: NodeId) -> NodeId {
        let stmt = self.make(NodeData::new(Op::Send, 0).with_left(ch).with_right(value));
        self.push_stmt(stmt)
    }

    pub fn panic(&mut self, value: NodeId) -> NodeId {
        let stmt = self.make(NodeData::new(Op::Panic, 0).with_left(value));
        self.push_stmt(stmt)
    }

    pub fn defer(&mut self, call: NodeId) -> NodeId {
        let stmt = self.make(NodeData::new(Op::Defer, 0).with_left(call));
        self.push_stmt(stmt)
    }

    pub fn go(&mut self, call: NodeId) -> NodeId {
        let stmt = self.make(NodeData::new(Op::Go, 0).with_left(call));
        self.push_stmt(stmt)
    }

    /// `for cond { body }`
    pub fn for_(&mut self, cond: Option<NodeId>, body: impl FnOnce(&mut Self)) -> NodeId {
        let mut data = NodeData::new(Op::For, 0);
        data.ntest = cond.into();
        let stmt = self.make(data);
        self.line += 1;
        self.program.nodes[stmt].nbody = self.build_frame(body);
        self.push_stmt(stmt)
    }

    /// `for key, value = range expr { body }`
    pub fn range(
        &mut self,
        key: Option<NodeId>,
        value: Option<NodeId>,
        expr: NodeId,
        body: impl FnOnce(&mut Self),
    ) -> NodeId {
        let mut vars = Vec::with_capacity(2);
        if key.is_some() || value.is_some() {
            let key = match key {
                Some(key) => key,
                None => self.blank(),
            };
            vars.push(key);
        }
        vars.extend(value);

        let ty = self.ty_of(expr);
        let stmt = self.make(
            NodeData::new(Op::Range, 0)
                .with_ty(ty)
                .with_right(expr)
                .with_list(vars),
        );
        self.line += 1;
        self.program.nodes[stmt].nbody = self.build_frame(body);
        self.push_stmt(stmt)
    }

    pub fn if_(
        &mut self,
        cond: NodeId,
        then: impl FnOnce(&mut Self),
        else_: impl FnOnce(&mut Self),
    ) -> NodeId {
        let mut data = NodeData::new(Op::If, 0);
        data.ntest = cond.into();
        let stmt = self.make(data);
        self.line += 1;
        self.program.nodes[stmt].nbody = self.build_frame(then);
        self.program.nodes[stmt].nelse = self.build_frame(else_);
        self.push_stmt(stmt)
    }

    /// `switch v := x.(type) { ... }`. Each case is given the name of its
    /// variable and the case type; the default case has no type and its
    /// variable takes the type of `x`.
    pub fn type_switch(
        &mut self,
        x: NodeId,
        cases: &[(Option<&str>, Option<Type>)],
        mut body: impl FnMut(&mut Self, usize, Option<NodeId>),
    ) -> NodeId {
        let guard = self.make(NodeData::new(Op::TypeSw, 0).with_right(x));
        let switch = self.make(NodeData::new(Op::Switch, 0));
        self.program.nodes[switch].ntest = guard.into();
        self.line += 1;

        let x_ty = self.ty_of(x);
        let mut clauses = Vec::with_capacity(cases.len());
        for (idx, &(name, case_ty)) in cases.iter().enumerate() {
            let var = name.map(|name| {
                let ty = case_ty.or(x_ty).unwrap_or_default();
                let var = make_name(self.program, self.func, name, ty, Class::Auto, self.line);
                self.program.funcs[self.func].dcl.push(var);
                var
            });

            let mut data = NodeData::new(Op::Case, 0).with_ty(case_ty);
            data.left = var.into();
            let clause = self.make(data);
            self.line += 1;
            self.program.nodes[clause].nbody = self.build_frame(|fb| body(fb, idx, var));
            clauses.push(clause);
        }

        self.program.nodes[switch].list = clauses;
        self.push_stmt(switch)
    }

    pub fn label(&mut self, name: &str) -> NodeId {
        let label = self.label_ref(name);
        let mut data = NodeData::new(Op::Label, 0);
        data.label = label.into();
        let stmt = self.make(data);
        self.push_stmt(stmt)
    }

    pub fn goto(&mut self, name: &str) -> NodeId {
        let label = self.label_ref(name);
        let mut data = NodeData::new(Op::Goto, 0);
        data.label = label.into();
        let stmt = self.make(data);
        self.push_stmt(stmt)
    }

    fn label_ref(&mut self, name: &str) -> LabelRef {
        if let Some(label) = self.labels.get(name) {
            return *label;
        }

        let label = self.program.labels.push(name.to_string());
        self.labels.insert(name.to_string(), label);
        label
    }

    fn make_call(
        &mut self,
        op: Op,
        callee: NodeId,
        args: &[NodeId],
        ty: Option<Type>,
        spread: bool,
    ) -> NodeId {
        let mut data = NodeData::new(op, 0)
            .with_ty(ty)
            .with_left(callee)
            .with_list(args.to_vec());
        data.isddd = spread;
        self.make(data)
    }

    fn single_result(&self, func: FuncRef) -> Option<Type> {
        match self.program.funcs[func].results.as_slice() {
            [result] => result.ty,
            _ => None,
        }
    }

    fn single_result_of_ty(&self, fn_ty: Type) -> Option<Type> {
        match self.program.types.func_def(fn_ty)? {
            (_, [ret], _) => Some(*ret),
            _ => None,
        }
    }

    fn key(&mut self, key: NodeId, value: NodeId) -> NodeId {
        let ty = self.ty_of(value);
        self.make(
            NodeData::new(Op::Key, 0)
                .with_ty(ty)
                .with_left(key)
                .with_right(value),
        )
    }

    fn build_frame(&mut self, f: impl FnOnce(&mut Self)) -> Vec<NodeId> {
        self.frames.push(Vec::new());
        f(self);
        self.frames.pop().unwrap_or_default()
    }

    fn push_stmt(&mut self, stmt: NodeId) -> NodeId {
        if let Some(frame) = self.frames.last_mut() {
            frame.push(stmt);
        }
        self.line += 1;
        stmt
    }

    fn make(&mut self, mut data: NodeData) -> NodeId {
        data.line = self.line;
        if data.op == Op::Name && data.class != Class::Func {
            data.curfn = self.func.into();
        }
        self.program.nodes.make_node(data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::{test_util::dump_func, ProgramBuilder};

    #[test]
    fn params_and_results() {
        let mut pb = ProgramBuilder::new();
        let ptr = pb.ptr_type(Type::I64);
        let sig = Signature::new("pick")
            .param("p", ptr)
            .param("", Type::I64)
            .result(ptr)
            .named_result("err", Type::Bool);
        let func = pb.declare_func(sig);
        pb.define(func, |fb| {
            let p = fb.param(0);
            let ok = fb.int(1);
            fb.ret(&[p, ok]);
        });

        let program = pb.build();
        let decl = program.func(func);
        assert_eq!(decl.params.len(), 2);
        assert!(decl.params[1].name.is_none());
        assert_eq!(decl.dcl.len(), 3);

        let r0 = decl.results[0].name.unwrap();
        let err = decl.results[1].name.unwrap();
        assert_eq!(program.nodes[r0].sym.as_deref(), Some("~r0"));
        assert_eq!(program.nodes[r0].vargen, 1);
        assert_eq!(program.nodes[err].vargen, 2);
        assert_eq!(program.nodes[err].class, Class::ParamOut);

        assert_eq!(
            dump_func(&program, func),
            "func pick(p *int64, int64) (~r0 *int64, err bool) {
    return p, 1
}
"
        );
    }

    #[test]
    fn closure_captures() {
        let mut pb = ProgramBuilder::new();
        let sig = Signature::new("outer");
        let func = pb.declare_func(sig);
        let mut inner = None;
        pb.define(func, |fb| {
            let x = fb.local("x", Type::I64);
            let lit = fb.closure(Signature::new(""), |cb| {
                let x = cb.capture(x, false);
                let one = cb.int(1);
                cb.assign(x, one);
                inner = Some(cb.func());
            });
            let call = fb.call_value(lit, &[]);
            fb.expr_stmt(call);
        });

        let program = pb.build();
        let inner = inner.unwrap();
        let decl = program.func(inner);
        assert_eq!(decl.name, "outer.func1");
        assert_eq!(decl.outer.expand(), Some(func));
        assert_eq!(decl.cvars.len(), 1);
        let cvar = &program.nodes[decl.cvars[0]];
        assert_eq!(cvar.class, Class::ParamRef);
        assert!(!cvar.byval);

        assert_eq!(
            dump_func(&program, func),
            "func outer() {
    var x int64
    func literal()
}
"
        );
    }

    #[test]
    fn loops_and_labels() {
        let mut pb = ProgramBuilder::new();
        let ints = pb.slice_type(Type::I64);
        let func = pb.declare_func(Signature::new("walk").param("xs", ints));
        pb.define(func, |fb| {
            let xs = fb.param(0);
            let v = fb.local("v", Type::I64);
            fb.label("again");
            fb.range(None, Some(v), xs, |fb| {
                let sum = fb.local("sum", Type::I64);
                fb.assign_op(sum, Op::Add, v);
            });
            fb.goto("again");
        });

        let program = pb.build();
        assert_eq!(program.labels.len(), 1);
        assert_eq!(
            dump_func(&program, func),
            "func walk(xs []int64) {
    var v int64
again:
    for _, v = range xs {
        var sum int64
        sum += v
    }
    goto again
}
"
        );
    }
}
