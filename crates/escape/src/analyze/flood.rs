use escflow_ir::{Class, FuncRef, NodeId, Op};

use super::EscState;
use crate::{
    diagnostic::DiagnosticKind,
    level::Level,
    tag::{esc_max, note_output_param_flow, EscClass, ESC_CONTENT_ESCAPES, ESC_MASK},
};

impl EscState<'_> {
    /// Walks the upstream of `dst`, marking the allocations whose address
    /// reaches it and the parameters that leak into it.
    pub(super) fn escflood(&mut self, dst: NodeId) {
        if !matches!(self.op(dst), Op::Name | Op::Closure) {
            return;
        }

        let srcs = self.flowsrc[dst].clone();
        for src in srcs {
            self.cur_walkgen += 1;
            self.escwalk(Level::ZERO, dst, src);
        }
    }

    /// Visits `src` and its upstream at `level`, the number of
    /// dereferences between `src` and `dst` minus the number of addresses
    /// taken.
    ///
    /// A node is visited again in the same flood only at a strictly lower
    /// level, so the walk terminates on cyclic graphs.
    fn escwalk(&mut self, level: Level, dst: NodeId, src: NodeId) {
        let mut stack = vec![(level, src)];
        while let Some((level, src)) = stack.pop() {
            let Some((level, upstream)) = self.escwalk_one(level, dst, src) else {
                continue;
            };

            let child = upstream.child;
            let next = level.copy();
            stack.extend(
                self.flowsrc[upstream.src]
                    .iter()
                    .rev()
                    .map(|&flow| (next, flow)),
            );
            // The child is visited before the sources of `src`.
            stack.extend(child);
        }
    }

    /// Visits a single node. Returns `None` if `src` was already reached at
    /// this or a lower level, otherwise the level to continue with and where
    /// to continue.
    fn escwalk_one(&mut self, level: Level, dst: NodeId, src: NodeId) -> Option<(Level, Upstream)> {
        let mut level = level;
        if self.walkgen[src] == self.cur_walkgen {
            // Levels are vectors; only the componentwise min converges.
            level = level.min(self.esclevel[src]);
            if level == self.esclevel[src] {
                return None;
            }
        }
        self.walkgen[src] = self.cur_walkgen;
        self.esclevel[src] = level;

        self.observer.on_walk(self.prog, level, dst, src);

        let dst_esc = self.info.esc[dst];
        let src_class = EscClass::of(self.info.esc[src]);
        let src_data = &self.prog.nodes[src];
        let src_op = src_data.op;
        let src_param_class = (src_op == Op::Name).then_some(src_data.class);
        let src_left = src_data.left.expand();
        let src_func = src_data.curfn.expand();

        // An input flowing to an output of the same function, through
        // `return in`, `return &in` or `return *in`.
        if self.is_output_and_input(dst, src)
            && src_class < EscClass::Scope
            && dst_esc != EscClass::Heap.bits()
        {
            let vargen = self.prog.nodes[dst].vargen;
            let out = self.prog.nodes[dst].sym.clone().unwrap_or_default();
            let message = if self.config.is_verbose() {
                format!(
                    "leaking param: {} to result {out} level={level}",
                    self.display(src)
                )
            } else {
                format!(
                    "leaking param: {} to result {out} level={}",
                    self.display(src),
                    level.value()
                )
            };
            self.report(DiagnosticKind::LeakingParamToResult, src, src_func, message);

            let esc = &mut self.info.esc[src];
            if EscClass::of(*esc) != EscClass::Return {
                *esc = EscClass::Return.bits() | (*esc & ESC_CONTENT_ESCAPES);
            }
            *esc = note_output_param_flow(*esc, vargen, level);
            return Some((level, Upstream::at(src)));
        }

        let is_param = src_param_class == Some(Class::Param);

        // The content of the parameter escapes to the heap.
        if dst_esc == EscClass::Heap.bits()
            && is_param
            && src_class < EscClass::Scope
            && level.value() > 0
        {
            self.info.esc[src] =
                esc_max(ESC_CONTENT_ESCAPES | self.info.esc[src], EscClass::None);
            let message = format!("mark escaped content: {}", self.display(src));
            self.report(DiagnosticKind::MarkEscapedContent, src, src_func, message);
        }

        let dst_depth = self.info.loopdepth[dst];
        let src_depth = self.info.loopdepth[src];
        let leaks = level.leaks(dst_depth, src_depth);

        let mut upstream = Upstream::at(src);
        match src_op {
            Op::Name => {
                if is_param && (leaks || dst_depth < 0) && src_class < EscClass::Scope {
                    self.leak_param(level, dst, src, src_func);
                }

                // A captured variable is the variable of the enclosing
                // function.
                if src_param_class == Some(Class::ParamRef) {
                    if leaks {
                        let message = format!("leaking closure reference {}", self.display(src));
                        self.report(DiagnosticKind::LeakingClosureRef, src, src_func, message);
                    }
                    let var = self.prog.nodes[src].closure.expand();
                    upstream.child = var.map(|var| (level, var));
                }
            }

            Op::PtrLit | Op::Addr => {
                if leaks {
                    self.info.esc[src] = EscClass::Heap.bits();
                    if let Some(x) = src_left {
                        self.addrescapes(x);
                    }
                    let shown = src_left
                        .filter(|&x| self.op(x) == Op::Closure)
                        .unwrap_or(src);
                    let message = if self.config.is_verbose() {
                        format!(
                            "{} escapes to heap, level={level}, dst.eld={dst_depth}, src.eld={src_depth}",
                            self.display(shown)
                        )
                    } else {
                        format!("{} escapes to heap", self.display(shown))
                    };
                    self.report(DiagnosticKind::EscapesToHeap, src, src_func, message);
                }
                upstream.child = src_left.map(|x| (level.dec(), x));
            }

            Op::Append => {
                let first = self.prog.nodes[src].list.first().copied();
                upstream.child = first.map(|x| (level, x));
            }

            // A fixed array is a value, not an allocation.
            Op::ArrayLit if self.prog.is_fixed_array(self.ty(src)) => {}

            Op::ArrayLit
            | Op::DddArg
            | Op::MakeChan
            | Op::MakeMap
            | Op::MakeSlice
            | Op::ArrayRuneStr
            | Op::ArrayByteStr
            | Op::StrArrayRune
            | Op::StrArrayByte
            | Op::AddStr
            | Op::MapLit
            | Op::New
            | Op::Closure
            | Op::CallPart
            | Op::RuneStr
            | Op::ConvIface => {
                if leaks {
                    self.info.esc[src] = EscClass::Heap.bits();
                    let message = format!("{} escapes to heap", self.display(src));
                    self.report(DiagnosticKind::EscapesToHeap, src, src_func, message);
                }
                // The `...` arguments are stored in the array it points to.
                if src_op == Op::DddArg {
                    upstream.child = src_left.map(|x| (level.dec(), x));
                }
            }

            Op::Dot
            | Op::Slice
            | Op::SliceArr
            | Op::Slice3
            | Op::Slice3Arr
            | Op::SliceStr => upstream.child = src_left.map(|x| (level, x)),

            Op::Index if self.is_fixed_array(src_left) => {
                upstream.child = src_left.map(|x| (level, x));
            }

            Op::Index | Op::DotPtr | Op::IndexMap | Op::Ind => {
                upstream.child = src_left.map(|x| (level.inc(), x));
            }

            // A flow into a call really comes from its first result.
            Op::CallFunc | Op::CallMeth | Op::CallInter => {
                if let Some(&result) = self.retval[src].first() {
                    upstream.src = result;
                }
            }

            _ => {}
        }

        Some((level, upstream))
    }

    /// `src` is an input parameter whose value or content outlives the
    /// function.
    fn leak_param(&mut self, level: Level, dst: NodeId, src: NodeId, func: Option<FuncRef>) {
        let (kind, what) = if level.guaranteed_dereference() > 0 {
            self.info.esc[src] =
                esc_max(ESC_CONTENT_ESCAPES | self.info.esc[src], EscClass::None);
            (DiagnosticKind::LeakingParamContent, "leaking param content")
        } else {
            self.info.esc[src] = EscClass::Scope.bits();
            (DiagnosticKind::LeakingParam, "leaking param")
        };

        let message = if self.config.is_verbose() {
            format!(
                "{what}: {} level={level} dst.eld={} src.eld={} dst={}",
                self.display(src),
                self.info.loopdepth[dst],
                self.info.loopdepth[src],
                self.display(dst)
            )
        } else {
            format!("{what}: {}", self.display(src))
        };
        self.report(kind, src, func, message);
    }

    fn is_output_and_input(&self, dst: NodeId, src: NodeId) -> bool {
        let dst = &self.prog.nodes[dst];
        let src = &self.prog.nodes[src];
        dst.op == Op::Name
            && dst.class == Class::ParamOut
            && src.op == Op::Name
            && src.class == Class::Param
            && src.curfn == dst.curfn
    }

    /// The address of `n` outlives its frame; the variable it names moves
    /// to the heap.
    fn addrescapes(&mut self, n: NodeId) {
        let data = &self.prog.nodes[n];
        match data.op {
            Op::Name => match data.class {
                Class::ParamRef => {
                    if let Some(var) = data.closure.expand() {
                        self.addrescapes(var);
                    }
                }

                Class::Param | Class::ParamOut | Class::Auto => {
                    let esc = self.info.esc[n];
                    if data.class == Class::Auto && esc & ESC_MASK == EscClass::Never.bits() {
                        return;
                    }
                    if !self.info.moved_to_heap.insert(n) {
                        return;
                    }
                    self.info.esc[n] = EscClass::Heap.bits();

                    let func = data.curfn.expand();
                    let message = format!("moved to heap: {}", self.display(n));
                    self.report(DiagnosticKind::MovedToHeap, n, func, message);
                }

                _ => {}
            },

            // In `&x[0]` on a slice `x` only the pointer inside `x` escapes,
            // and it points to the heap already.
            Op::Dot | Op::Index | Op::ConvNop => {
                if let Some(x) = data.left.expand() {
                    if !self.prog.is_slice(self.ty(x)) {
                        self.addrescapes(x);
                    }
                }
            }

            _ => {}
        }
    }
}

/// Where the walk continues after visiting a node.
struct Upstream {
    /// The node whose flow sources are visited next.
    src: NodeId,
    /// An operand visited first, with its own level.
    child: Option<(Level, NodeId)>,
}

impl Upstream {
    fn at(src: NodeId) -> Self {
        Self { src, child: None }
    }
}
