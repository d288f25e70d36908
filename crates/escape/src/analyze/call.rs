use escflow_ir::{Class, FuncRef, NodeData, NodeId, Op, Type};
use smallvec::SmallVec;

use super::EscState;
use crate::{
    error::EscapeError,
    info::FuncState,
    tag::{
        parsetag, EscClass, BITS_MASK_FOR_TAG, BITS_PER_OUTPUT_IN_TAG, ESC_CONTENT_ESCAPES,
        ESC_RETURN_BITS,
    },
};

/// A formal parameter of a callee whose tags are already written.
struct Formal {
    ty: Option<Type>,
    isddd: bool,
    note: Option<String>,
}

impl EscState<'_> {
    /// Binds the arguments and results of the call `n`. `up` is the
    /// statement or expression the call is part of.
    ///
    /// A callee of the group being analyzed joins the flow graph directly;
    /// any other callee is summarized by its parameter tags.
    pub(super) fn esccall(&mut self, n: NodeId, up: Option<NodeId>) -> Result<(), EscapeError> {
        let args = self.call_args(n);

        if let Some(callee) = self.prog.func_of_call(n) {
            if self.prog.is_in_group_candidate(callee)
                && self.info.func_state[callee] < FuncState::Tagged
            {
                return self.esccall_in_group(n, callee, args);
            }
        }

        self.esccall_tagged(n, up, args)
    }

    /// The actual arguments of `n`. `f(g())` passes the results of `g`.
    fn call_args(&self, n: NodeId) -> Vec<NodeId> {
        let list = &self.prog.nodes[n].list;
        if let [arg] = list.as_slice() {
            if self.op(*arg).is_call() && self.retval[*arg].len() > 1 {
                return self.retval[*arg].to_vec();
            }
        }
        list.clone()
    }

    fn esccall_in_group(
        &mut self,
        n: NodeId,
        callee: FuncRef,
        args: Vec<NodeId>,
    ) -> Result<(), EscapeError> {
        if self.info.func_state[callee] == FuncState::Unknown || !self.retval[n].is_empty() {
            return Err(EscapeError::GraphInconsistency { node: n });
        }

        let decl = &self.prog.funcs[callee];
        let results: SmallVec<[NodeId; 2]> = decl
            .results
            .iter()
            .filter_map(|result| result.name.expand())
            .collect();
        let recv = decl.recv.as_ref().and_then(|recv| recv.name.expand());
        let formals: Vec<(Option<NodeId>, Option<Type>, bool)> = decl
            .params
            .iter()
            .map(|param| (param.name.expand(), param.ty, param.isddd))
            .collect();
        self.retval[n] = results;

        if self.op(n) != Op::CallFunc {
            let recv_expr = self.left(n).and_then(|meth| self.left(meth));
            if let (Some(recv), Some(recv_expr)) = (recv, recv_expr) {
                self.escassign(recv, recv_expr)?;
            }
        }

        let spread = self.prog.nodes[n].isddd;
        let mut bound = 0;
        for (idx, (name, ty, isddd)) in formals.into_iter().enumerate() {
            let Some(&arg) = args.get(idx) else {
                break;
            };

            if isddd && !spread {
                let ddd = self.make_dddarg(n, ty, &args[idx..])?;
                if let Some(name) = name {
                    self.escassign(name, ddd)?;
                }
                bound = args.len();
                break;
            }

            if let Some(name) = name {
                self.escassign(name, arg)?;
            }
            bound = idx + 1;
        }
        if bound < args.len() {
            return Err(EscapeError::ArgCountMismatch { node: n });
        }
        Ok(())
    }

    fn esccall_tagged(
        &mut self,
        n: NodeId,
        up: Option<NodeId>,
        args: Vec<NodeId>,
    ) -> Result<(), EscapeError> {
        let call = &self.prog.nodes[n];
        let op = call.op;
        let line = call.line;
        let spread = call.isddd;
        let callee_expr = call.left.expand();

        let decl = self
            .prog
            .func_of_call(n)
            .map(|callee| &self.prog.funcs[callee]);
        let (result_tys, recv, formals): (Vec<Option<Type>>, _, Vec<Formal>) = match decl {
            Some(decl) => (
                decl.results.iter().map(|result| result.ty).collect(),
                decl.recv.as_ref().map(|recv| Formal {
                    ty: recv.ty,
                    isddd: false,
                    note: recv.note.clone(),
                }),
                decl.params
                    .iter()
                    .map(|param| Formal {
                        ty: param.ty,
                        isddd: param.isddd,
                        note: param.note.clone(),
                    })
                    .collect(),
            ),

            // A function value or an interface method carries no tags.
            None => {
                let fn_ty = callee_expr.and_then(|callee| self.ty(callee));
                let def = fn_ty.and_then(|fn_ty| self.prog.types.func_def(fn_ty));
                let (params, results, variadic) = def.unwrap_or_default();
                let recv_ty = callee_expr
                    .and_then(|callee| self.left(callee))
                    .and_then(|recv| self.ty(recv));
                (
                    results.iter().map(|ty| Some(*ty)).collect(),
                    (op == Op::CallInter).then_some(Formal {
                        ty: recv_ty,
                        isddd: false,
                        note: None,
                    }),
                    params
                        .iter()
                        .enumerate()
                        .map(|(idx, ty)| Formal {
                            ty: Some(*ty),
                            isddd: variadic && idx + 1 == params.len(),
                            note: None,
                        })
                        .collect(),
                )
            }
        };

        if !self.retval[n].is_empty() {
            return Err(EscapeError::GraphInconsistency { node: n });
        }

        // Results are dummy locals of the caller.
        let mut retval = SmallVec::new();
        for (idx, ty) in result_tys.into_iter().enumerate() {
            let mut out = NodeData::new(Op::Name, line).with_ty(ty);
            out.sym = Some(format!(".out{idx}"));
            out.class = Class::Auto;
            out.curfn = self.curfn.into();
            let out = self.prog.nodes.make_node(out);
            self.info.loopdepth[out] = self.loopdepth;
            retval.push(out);
        }
        self.retval[n] = retval;
        let retval = self.retval[n].clone();

        if op != Op::CallFunc {
            let recv_expr = callee_expr.and_then(|callee| self.left(callee));
            if let (Some(recv), Some(recv_expr)) = (recv, recv_expr) {
                if self.prog.has_pointers(recv.ty) {
                    self.escassignfromtag(recv.note.as_deref(), &retval, recv_expr)?;
                }
            }
        }

        let in_defer_or_go = up.is_some_and(|up| matches!(self.op(up), Op::Defer | Op::Go));
        let mut formals = formals.into_iter();
        let mut idx = 0;
        while let Some(&arg) = args.get(idx) {
            let Some(formal) = formals.next() else {
                return Err(EscapeError::ArgCountMismatch { node: n });
            };

            let variadic = formal.isddd && !spread;
            let src = if variadic {
                self.make_dddarg(n, formal.ty, &args[idx..])?
            } else {
                arg
            };

            if self.prog.has_pointers(formal.ty) {
                let esc = self.escassignfromtag(formal.note.as_deref(), &retval, src)?;
                if esc == EscClass::None.bits() && !in_defer_or_go {
                    self.mark_statement_local(src);
                }
            }

            // The `...` formal takes every remaining argument.
            if variadic {
                break;
            }
            idx += 1;
        }
        Ok(())
    }

    /// Creates the implicit `&[N]T{args...}` passing the `...` arguments of
    /// `call`. The arguments are stored into the array, and the `DddArg`
    /// node is its address.
    fn make_dddarg(
        &mut self,
        call: NodeId,
        slice_ty: Option<Type>,
        args: &[NodeId],
    ) -> Result<NodeId, EscapeError> {
        let types = &mut self.prog.types;
        let array_ty = slice_ty
            .and_then(|ty| types.elem(ty))
            .map(|elem| types.make_array(elem, args.len()));
        let ty = array_ty.map(|array| types.make_ptr(array));
        let line = self.prog.nodes[call].line;

        let mut array = NodeData::new(Op::ArrayLit, line).with_ty(array_ty);
        array.curfn = self.curfn.into();
        let array = self.prog.nodes.make_node(array);
        self.info.loopdepth[array] = self.loopdepth;
        for &arg in args {
            self.escassign(array, arg)?;
        }

        let mut data = NodeData::new(Op::DddArg, line)
            .with_ty(ty)
            .with_left(array);
        data.curfn = self.curfn.into();
        let ddd = self.prog.nodes.make_node(data);
        self.prog.nodes[call].right = ddd.into();
        self.mark_noesc(ddd);
        Ok(ddd)
    }

    /// Applies the tag `note` of a callee parameter to the argument `src`.
    /// The results of the call are `retval`.
    ///
    /// Returns the decoded tag.
    fn escassignfromtag(
        &mut self,
        note: Option<&str>,
        retval: &[NodeId],
        src: NodeId,
    ) -> Result<u16, EscapeError> {
        let esc = parsetag(note);
        match EscClass::of(esc) {
            EscClass::Unknown => {
                self.escassign(self.sink, src)?;
                return Ok(esc);
            }
            EscClass::None if esc == EscClass::None.bits() => return Ok(esc),
            _ => {}
        }

        if esc & ESC_CONTENT_ESCAPES != 0 {
            let content = self.add_dereference(src);
            self.escassign(self.sink, content)?;
        }

        let mut outputs = esc >> ESC_RETURN_BITS;
        let mut retval = retval.iter();
        while outputs != 0 {
            let Some(&dst) = retval.next() else {
                return Err(EscapeError::CorruptTag {
                    note: note.unwrap_or_default().to_string(),
                });
            };

            // A field holds the level of the flow plus one.
            let bits = outputs & BITS_MASK_FOR_TAG;
            if bits > 0 {
                let mut x = src;
                for _ in 1..bits {
                    x = self.add_dereference(x);
                }
                self.escassign(dst, x)?;
            }
            outputs >>= BITS_PER_OUTPUT_IN_TAG;
        }

        Ok(esc)
    }

    /// Marks an argument that does not outlive the call statement.
    fn mark_statement_local(&mut self, src: NodeId) {
        let mut a = src;
        while self.op(a) == Op::ConvNop {
            match self.left(a) {
                Some(x) => a = x,
                None => return,
            }
        }

        if matches!(
            self.op(a),
            Op::CallPart | Op::Closure | Op::DddArg | Op::ArrayLit | Op::PtrLit | Op::StructLit
        ) {
            self.prog.nodes[a].noescape = true;
        }
    }
}
