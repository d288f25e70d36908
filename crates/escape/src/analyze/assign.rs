use escflow_ir::{Class, NodeData, NodeId, Op};

use super::EscState;
use crate::error::EscapeError;

impl EscState<'_> {
    /// Records that the value of `src` is stored into `dst`.
    ///
    /// Destinations that cannot be tracked, such as globals and anything
    /// reached through a pointer, are replaced by the sink.
    pub(super) fn escassign(&mut self, dst: NodeId, src: NodeId) -> Result<(), EscapeError> {
        if self.prog.nodes[dst].is_blank() {
            return Ok(());
        }

        let dst_data = &self.prog.nodes[dst];
        let dst = match dst_data.op {
            Op::ArrayLit
            | Op::Closure
            | Op::Conv
            | Op::ConvIface
            | Op::ConvNop
            | Op::MapLit
            | Op::StructLit
            | Op::PtrLit
            | Op::CallPart => dst,

            Op::Name if dst_data.class == Class::Extern => self.sink,
            Op::Name => dst,

            // `dst.x = src` is `dst = src`.
            Op::Dot => {
                return match dst_data.left.expand() {
                    Some(base) => self.escassign(base, src),
                    None => Ok(()),
                };
            }

            Op::Index => {
                let base = dst_data.left.expand();
                if self.is_fixed_array(base) {
                    if let Some(base) = base {
                        return self.escassign(base, src);
                    }
                }
                self.sink
            }

            Op::Ind | Op::DotPtr => self.sink,

            // Both the key and the value are lost.
            Op::IndexMap => {
                if let Some(key) = dst_data.right.expand() {
                    self.escassign(self.sink, key)?;
                }
                self.sink
            }

            op => return Err(EscapeError::UnexpectedDestination { node: dst, op }),
        };

        let src_data = &self.prog.nodes[src];
        let src_left = src_data.left.expand();
        match src_data.op {
            Op::Addr
            | Op::Ind
            | Op::DotPtr
            | Op::Name
            | Op::DddArg
            | Op::PtrLit
            | Op::ArrayLit
            | Op::MapLit
            | Op::StructLit
            | Op::MakeChan
            | Op::MakeMap
            | Op::MakeSlice
            | Op::ArrayRuneStr
            | Op::ArrayByteStr
            | Op::StrArrayRune
            | Op::StrArrayByte
            | Op::AddStr
            | Op::New
            | Op::CallPart
            | Op::RuneStr
            | Op::ConvIface => self.escflows(dst, src),

            // A closure is a pointer to its captured variables.
            Op::Closure => {
                let line = src_data.line;
                let ty = src_data.ty.map(|ty| self.prog.types.make_ptr(ty));
                let addr = NodeData::new(Op::Addr, line).with_ty(ty).with_left(src);
                let addr = self.prog.nodes.make_node(addr);
                self.info.loopdepth[addr] = self.info.loopdepth[src];
                self.escflows(dst, addr);
            }

            // Several results flow to one destination in `go f(g())`.
            Op::CallFunc | Op::CallMeth | Op::CallInter => {
                let results = self.retval[src].clone();
                for result in results {
                    self.escflows(dst, result);
                }
            }

            // A scalar field does not carry a pointer.
            Op::Dot if self.has_no_pointers(src_data.ty) => {}

            // These preserve the input value.
            Op::Dot
            | Op::Conv
            | Op::ConvNop
            | Op::DotMeth
            | Op::DotType
            | Op::DotType2
            | Op::Slice
            | Op::Slice3
            | Op::SliceArr
            | Op::Slice3Arr
            | Op::SliceStr => {
                if let Some(x) = src_left {
                    self.escassign(dst, x)?;
                }
            }

            // `append` returns its first argument.
            Op::Append => {
                if let Some(&first) = src_data.list.first() {
                    self.escassign(dst, first)?;
                }
            }

            Op::Index => {
                if self.is_fixed_array(src_left) {
                    if let Some(base) = src_left {
                        self.escassign(dst, base)?;
                    }
                }
            }

            // Might be pointer arithmetic; both operands flow into the
            // result.
            op if is_arith(op) => {
                let src_right = src_data.right.expand();
                for x in src_left.into_iter().chain(src_right) {
                    self.escassign(dst, x)?;
                }
            }

            _ => {}
        }

        Ok(())
    }

    /// Adds the edge `dst <- src`. Scalars are not tracked.
    pub(super) fn escflows(&mut self, dst: NodeId, src: NodeId) {
        if dst == src || self.has_no_pointers(self.ty(src)) {
            return;
        }

        self.observer.on_flow(self.prog, dst, src);

        let srcs = &mut self.flowsrc[dst];
        if srcs.is_empty() {
            self.dsts.push(dst);
        }
        srcs.push(src);
    }

    /// Creates `*n`, used to encode a level of indirection.
    ///
    /// Dereferencing a non-pointer keeps its type; the node only counts
    /// levels.
    pub(super) fn add_dereference(&mut self, n: NodeId) -> NodeId {
        let data = &self.prog.nodes[n];
        let line = data.line;
        let ty = data
            .ty
            .map(|ty| self.prog.types.deref(ty).unwrap_or(ty));
        let ind = NodeData::new(Op::Ind, line).with_ty(ty).with_left(n);
        let ind = self.prog.nodes.make_node(ind);
        self.info.loopdepth[ind] = self.info.loopdepth[n];
        ind
    }
}

fn is_arith(op: Op) -> bool {
    op.is_binary_arith() || matches!(op, Op::Plus | Op::Minus | Op::Com)
}
