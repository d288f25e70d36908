use escflow_ir::{Class, NodeData, NodeId, Op};

use super::{EscState, LabelState};
use crate::{diagnostic::DiagnosticKind, error::EscapeError};

enum Frame {
    /// Walk the init statements of `n`, then its children.
    Enter { n: NodeId, up: Option<NodeId> },
    /// Walk the children of `n`.
    Descend { n: NodeId },
    /// All children of `n` are walked.
    Exit { n: NodeId, up: Option<NodeId> },
}

impl EscState<'_> {
    /// Walks `stmts` in source order, recording the flow of every
    /// assignment, call and allocation. Children are handled before their
    /// parent; `up` is the parent of a node.
    pub(super) fn esc_list(
        &mut self,
        stmts: &[NodeId],
        up: Option<NodeId>,
    ) -> Result<(), EscapeError> {
        let mut stack: Vec<Frame> = stmts
            .iter()
            .rev()
            .map(|&n| Frame::Enter { n, up })
            .collect();
        let mut children = Vec::new();

        while let Some(frame) = stack.pop() {
            match frame {
                Frame::Enter { n, up } => {
                    stack.push(Frame::Exit { n, up });
                    stack.push(Frame::Descend { n });
                    // Init statements run at the loop depth outside of a
                    // `for`.
                    let ninit = &self.prog.nodes[n].ninit;
                    stack.extend(ninit.iter().rev().map(|&init| Frame::Enter {
                        n: init,
                        up: Some(n),
                    }));
                }

                Frame::Descend { n } => {
                    if is_loop(self.op(n)) {
                        self.loopdepth += 1;
                    }
                    self.stamp_type_switch_vars(n);

                    let data = &self.prog.nodes[n];
                    children.clear();
                    children.extend(data.left.expand());
                    children.extend(data.right.expand());
                    children.extend(data.ntest.expand());
                    children.extend(data.nincr.expand());
                    children.extend(data.nbody.iter().copied());
                    children.extend(data.nelse.iter().copied());
                    children.extend(data.list.iter().copied());
                    children.extend(data.rlist.iter().copied());
                    stack.extend(children.iter().rev().map(|&child| Frame::Enter {
                        n: child,
                        up: Some(n),
                    }));
                }

                Frame::Exit { n, up } => {
                    if is_loop(self.op(n)) {
                        self.loopdepth -= 1;
                    }
                    self.esc_node(n, up)?;
                }
            }
        }

        Ok(())
    }

    /// Type switch variables have no declaration; they are declared at the
    /// loop depth of the switch, before its cases are walked.
    fn stamp_type_switch_vars(&mut self, n: NodeId) {
        if self.type_switch_guard(n).is_none() {
            return;
        }

        for idx in 0..self.prog.nodes[n].list.len() {
            let case = self.prog.nodes[n].list[idx];
            if let Some(var) = self.left(case) {
                self.info.loopdepth[var] = self.loopdepth;
            }
        }
    }

    fn type_switch_guard(&self, n: NodeId) -> Option<NodeId> {
        let data = &self.prog.nodes[n];
        if data.op != Op::Switch {
            return None;
        }
        data.ntest
            .expand()
            .filter(|&guard| self.op(guard) == Op::TypeSw)
    }

    fn esc_node(&mut self, n: NodeId, up: Option<NodeId>) -> Result<(), EscapeError> {
        let data = &self.prog.nodes[n];
        let left = data.left.expand();
        let right = data.right.expand();

        match data.op {
            // Record loop depth at declaration.
            Op::Decl => {
                if let Some(var) = left {
                    self.info.loopdepth[var] = self.loopdepth;
                }
            }

            Op::Label => {
                if let Some(label) = data.label.expand() {
                    if self.labels.remove(&label) == Some(LabelState::Looping) {
                        self.loopdepth += 1;
                    }
                }
            }

            // Everything but a fixed array is a dereference.
            Op::Range => {
                if self.prog.is_fixed_array(data.ty) && data.list.len() > 1 {
                    let value = data.list[1];
                    if let Some(expr) = right {
                        self.escassign(value, expr)?;
                    }
                }
            }

            Op::Switch => {
                if let Some(guard) = self.type_switch_guard(n) {
                    let cases = self.prog.nodes[n].list.clone();
                    if let Some(x) = self.right(guard) {
                        for case in cases {
                            if let Some(var) = self.left(case) {
                                self.escassign(var, x)?;
                            }
                        }
                    }
                }
            }

            Op::As | Op::AsOp => {
                let (Some(dst), Some(src)) = (left, right) else {
                    return Ok(());
                };
                if self.is_self_reslice(dst, src) {
                    let func = self.curfn;
                    let fname = func
                        .map(|func| self.prog.funcs[func].name.clone())
                        .unwrap_or_default();
                    let message =
                        format!("{fname} ignoring self-assignment to {}", self.display(dst));
                    self.report(DiagnosticKind::IgnoredSelfAssignment, n, func, message);
                    return Ok(());
                }
                self.escassign(dst, src)?;
            }

            Op::As2 => {
                if data.list.len() == data.rlist.len() {
                    let pairs: Vec<_> = data
                        .list
                        .iter()
                        .copied()
                        .zip(data.rlist.iter().copied())
                        .collect();
                    for (dst, src) in pairs {
                        self.escassign(dst, src)?;
                    }
                }
            }

            Op::As2Recv | Op::As2MapR | Op::As2DotType => {
                if let (Some(&dst), Some(&src)) = (data.list.first(), data.rlist.first()) {
                    self.escassign(dst, src)?;
                }
            }

            Op::Send => {
                if let Some(value) = right {
                    self.escassign(self.sink, value)?;
                }
            }

            // A deferred call at the top level runs before the function
            // returns; inside a loop its arguments outlive the iteration.
            Op::Defer => {
                if self.loopdepth != 1 {
                    self.esc_go(left)?;
                }
            }

            Op::Go => self.esc_go(left)?,

            Op::CallFunc | Op::CallMeth | Op::CallInter => self.esccall(n, up)?,

            // The call is walked already; tie its results to the lhs.
            Op::As2Func => {
                let dsts = data.list.clone();
                let Some(&call) = data.rlist.first() else {
                    return Err(EscapeError::CallResultMismatch { node: n });
                };
                let results = self.retval[call].clone();
                if dsts.len() != results.len() {
                    return Err(EscapeError::CallResultMismatch { node: n });
                }
                for (dst, src) in dsts.into_iter().zip(results) {
                    self.escassign(dst, src)?;
                }
            }

            Op::Return => self.esc_return(n)?,

            // The argument could leak through recover.
            Op::Panic => {
                if let Some(value) = left {
                    self.escassign(self.sink, value)?;
                }
            }

            Op::Append => {
                if !data.isddd {
                    // Stored into the backing array; tracking is lost.
                    let args: Vec<_> = data.list.iter().skip(1).copied().collect();
                    for arg in args {
                        self.escassign(self.sink, arg)?;
                    }
                }
            }

            Op::Conv | Op::ConvNop => {
                if let Some(x) = left {
                    self.escassign(n, x)?;
                }
            }

            Op::ConvIface => {
                self.mark_noesc(n);
                if let Some(x) = left {
                    self.escassign(n, x)?;
                }
            }

            Op::ArrayLit => {
                let values = self.literal_values(data);
                if self.prog.is_slice(data.ty) {
                    self.mark_noesc(n);
                    // Values make it to memory, lose track.
                    for value in values {
                        self.escassign(self.sink, value)?;
                    }
                } else {
                    for value in values {
                        self.escassign(n, value)?;
                    }
                }
            }

            Op::StructLit => {
                for value in self.literal_values(data) {
                    self.escassign(n, value)?;
                }
            }

            // If the pointer escapes, so do the values of the literal.
            Op::PtrLit => {
                self.mark_noesc(n);
                if let Some(lit) = left {
                    self.escassign(n, lit)?;
                }
            }

            Op::CallPart => {
                self.mark_noesc(n);
                if let Some(recv) = left {
                    self.escassign(self.sink, recv)?;
                }
            }

            Op::MapLit => {
                let entries: Vec<_> = data
                    .list
                    .iter()
                    .map(|&entry| (self.left(entry), self.right(entry)))
                    .collect();
                self.mark_noesc(n);
                for (key, value) in entries {
                    for x in key.into_iter().chain(value) {
                        self.escassign(self.sink, x)?;
                    }
                }
            }

            Op::Closure => {
                self.esc_closure(n)?;
                self.mark_noesc(n);
            }

            Op::MakeChan
            | Op::MakeMap
            | Op::MakeSlice
            | Op::New
            | Op::ArrayRuneStr
            | Op::ArrayByteStr
            | Op::StrArrayRune
            | Op::StrArrayByte
            | Op::RuneStr
            | Op::AddStr => self.mark_noesc(n),

            Op::Addr => {
                self.mark_noesc(n);
                // The current depth bounds the depth of the addressed value.
                // Parameters are at depth 1. Results are at depth 0 for
                // writes but 1 for their address, so storing the address of
                // one result into another moves it to the heap.
                let Some(var) = left else {
                    return Ok(());
                };
                let var_data = &self.prog.nodes[var];
                if var_data.op != Op::Name {
                    return Ok(());
                }
                match var_data.class {
                    Class::Auto => {
                        let depth = self.info.loopdepth[var];
                        if depth != 0 {
                            self.info.loopdepth[n] = depth;
                        }
                    }
                    Class::Param | Class::ParamOut => self.info.loopdepth[n] = 1,
                    _ => {}
                }
            }

            _ => {}
        }

        Ok(())
    }

    /// `go f(x)`: the function value and every argument escape.
    fn esc_go(&mut self, call: Option<NodeId>) -> Result<(), EscapeError> {
        let Some(call) = call else {
            return Ok(());
        };
        let data = &self.prog.nodes[call];
        let srcs: Vec<_> = data
            .left
            .expand()
            .into_iter()
            .chain(data.right.expand())
            .chain(data.list.iter().copied())
            .collect();
        for src in srcs {
            self.escassign(self.sink, src)?;
        }
        Ok(())
    }

    fn esc_return(&mut self, n: NodeId) -> Result<(), EscapeError> {
        let Some(func) = self.curfn else {
            return Ok(());
        };

        let mut values = self.prog.nodes[n].list.clone();
        let n_results = self.prog.funcs[func].results.len();
        if values.len() == 1 && n_results > 1 {
            // A call returning multiple values; its results are bound
            // already.
            values = self.retval[values[0]].to_vec();
        }

        let outs: Vec<NodeId> = self.prog.funcs[func]
            .dcl
            .iter()
            .copied()
            .filter(|&name| {
                let data = &self.prog.nodes[name];
                data.op == Op::Name && data.class == Class::ParamOut
            })
            .collect();
        if values.len() > outs.len() {
            return Err(EscapeError::ReturnCountMismatch { node: n });
        }

        for (out, value) in outs.into_iter().zip(values) {
            self.escassign(out, value)?;
        }
        Ok(())
    }

    /// Links the addresses of the captured variables to the closure.
    fn esc_closure(&mut self, n: NodeId) -> Result<(), EscapeError> {
        let Some(func) = self.prog.nodes[n].func.expand() else {
            return Ok(());
        };

        let cvars = self.prog.funcs[func].cvars.clone();
        for cvar in cvars {
            let data = &self.prog.nodes[cvar];
            let Some(var) = data.closure.expand() else {
                continue;
            };
            let byval = data.byval;
            let line = data.line;

            let captured = if byval {
                var
            } else {
                let ty = self
                    .ty(var)
                    .map(|ty| self.prog.types.make_ptr(ty));
                let mut addr = NodeData::new(Op::Addr, line).with_ty(ty).with_left(var);
                addr.curfn = self.curfn.into();
                let addr = self.prog.nodes.make_node(addr);
                self.info.loopdepth[addr] = self.loopdepth;
                addr
            };
            self.escassign(n, captured)?;
        }
        Ok(())
    }

    /// Matches `b.buf = b.buf[n:m]`, where the base of both sides is the
    /// same name. The assignment stores no new pointer into `b`.
    ///
    /// Slicing an array (`SliceArr`) is not matched: it stores a pointer to
    /// `b` itself.
    fn is_self_reslice(&self, dst: NodeId, src: NodeId) -> bool {
        let is_deref = |n: NodeId| matches!(self.op(n), Op::Ind | Op::DotPtr);
        let named_base = |n: NodeId| self.left(n).filter(|&base| self.op(base) == Op::Name);

        if !is_deref(dst) || !matches!(self.op(src), Op::Slice | Op::Slice3 | Op::SliceStr) {
            return false;
        }
        let Some(sliced) = self.left(src).filter(|&x| is_deref(x)) else {
            return false;
        };

        match (named_base(dst), named_base(sliced)) {
            (Some(lhs), Some(rhs)) => lhs == rhs,
            _ => false,
        }
    }

    /// The values of the `key: value` entries of a composite literal.
    fn literal_values(&self, data: &NodeData) -> Vec<NodeId> {
        data.list
            .iter()
            .filter_map(|&entry| self.right(entry))
            .collect()
    }
}

fn is_loop(op: Op) -> bool {
    matches!(op, Op::For | Op::Range)
}
