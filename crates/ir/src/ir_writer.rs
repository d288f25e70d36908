use std::fmt::{self, Write};

use crate::{
    func::{FuncRef, Param},
    node::{NodeId, Op},
    types::CompoundType,
    Program, Type,
};

pub struct FuncWriter<'a> {
    program: &'a Program,
    func: FuncRef,
    level: u8,
}

impl<'a> FuncWriter<'a> {
    pub fn new(program: &'a Program, func: FuncRef) -> Self {
        Self {
            program,
            func,
            level: 0,
        }
    }

    pub fn write(&mut self, w: &mut impl Write) -> fmt::Result {
        let program = self.program;
        let decl = &program.funcs[self.func];
        write!(w, "func ")?;
        if let Some(recv) = &decl.recv {
            write!(w, "(")?;
            self.write_param(recv, w)?;
            write!(w, ") ")?;
        }
        write!(w, "{}(", decl.name)?;
        for (idx, param) in decl.params.iter().enumerate() {
            if idx > 0 {
                write!(w, ", ")?;
            }
            self.write_param(param, w)?;
        }
        write!(w, ")")?;

        if !decl.results.is_empty() {
            write!(w, " (")?;
            for (idx, result) in decl.results.iter().enumerate() {
                if idx > 0 {
                    write!(w, ", ")?;
                }
                self.write_param(result, w)?;
            }
            write!(w, ")")?;
        }

        let Some(body) = &decl.body else {
            return writeln!(w);
        };

        writeln!(w, " {{")?;
        self.write_block(body, w)?;
        writeln!(w, "}}")
    }

    pub fn dump_string(&mut self) -> String {
        let mut s = String::new();
        // Writing into a `String` never fails.
        let _ = self.write(&mut s);
        s
    }

    fn write_param(&self, param: &Param, w: &mut impl Write) -> fmt::Result {
        if let Some(name) = param.name.expand() {
            write!(w, "{} ", self.program.display(name))?;
        }

        match param.ty {
            Some(ty) if param.isddd => {
                let elem = self.program.types.elem(ty).unwrap_or(ty);
                write!(w, "...{}", self.program.display(elem))
            }
            Some(ty) => write!(w, "{}", self.program.display(ty)),
            None => write!(w, "?"),
        }
    }

    fn write_block(&mut self, stmts: &[NodeId], w: &mut impl Write) -> fmt::Result {
        self.level += 1;
        for stmt in stmts {
            self.write_stmt(*stmt, w)?;
        }
        self.level -= 1;
        Ok(())
    }

    fn write_stmt(&mut self, stmt: NodeId, w: &mut impl Write) -> fmt::Result {
        let program = self.program;
        let data = &program.nodes[stmt];
        let left = data.left.expand();
        let right = data.right.expand();

        if data.op == Op::Label {
            self.indent_by(self.level.saturating_sub(1), w)?;
            return writeln!(w, "{}:", self.label_name(stmt));
        }

        self.indent(w)?;
        match data.op {
            Op::Decl => {
                let var = left.map(|var| program.display(var).to_string());
                let ty = left
                    .and_then(|var| program.nodes[var].ty)
                    .map(|ty| program.display(ty).to_string());
                writeln!(
                    w,
                    "var {} {}",
                    var.unwrap_or_default(),
                    ty.unwrap_or_default()
                )
            }

            Op::As => writeln!(w, "{} = {}", self.opt(left), self.opt(right)),
            Op::AsOp => writeln!(
                w,
                "{} {}= {}",
                self.opt(left),
                data.sym.as_deref().unwrap_or("op"),
                self.opt(right)
            ),
            Op::As2 | Op::As2Func | Op::As2Recv | Op::As2MapR | Op::As2DotType => writeln!(
                w,
                "{} = {}",
                self.list(&data.list),
                self.list(&data.rlist)
            ),

            Op::Return if data.list.is_empty() => writeln!(w, "return"),
            Op::Return => writeln!(w, "return {}", self.list(&data.list)),
            Op::Defer => writeln!(w, "defer {}", self.opt(left)),
            Op::Go => writeln!(w, "go {}", self.opt(left)),
            Op::Send => writeln!(w, "{} <- {}", self.opt(left), self.opt(right)),
            Op::Panic => writeln!(w, "panic({})", self.opt(left)),
            Op::Goto => writeln!(w, "goto {}", self.label_name(stmt)),
            Op::Break => writeln!(w, "break"),
            Op::Continue => writeln!(w, "continue"),

            Op::If => {
                writeln!(w, "if {} {{", self.opt(data.ntest.expand()))?;
                self.write_block(&data.nbody, w)?;
                if !data.nelse.is_empty() {
                    self.indent(w)?;
                    writeln!(w, "}} else {{")?;
                    self.write_block(&data.nelse, w)?;
                }
                self.indent(w)?;
                writeln!(w, "}}")
            }

            Op::For => {
                match data.ntest.expand() {
                    Some(cond) => writeln!(w, "for {} {{", program.display(cond))?,
                    None => writeln!(w, "for {{")?,
                }
                self.write_block(&data.nbody, w)?;
                self.indent(w)?;
                writeln!(w, "}}")
            }

            Op::Range => {
                if data.list.is_empty() {
                    writeln!(w, "for range {} {{", self.opt(right))?;
                } else {
                    writeln!(w, "for {} = range {} {{", self.list(&data.list), self.opt(right))?;
                }
                self.write_block(&data.nbody, w)?;
                self.indent(w)?;
                writeln!(w, "}}")
            }

            Op::Switch => {
                let guard = data
                    .ntest
                    .expand()
                    .and_then(|guard| program.nodes[guard].right.expand());
                writeln!(w, "switch {}.(type) {{", self.opt(guard))?;
                for clause in &data.list {
                    let clause = &program.nodes[*clause];
                    self.indent(w)?;
                    match clause.ty {
                        Some(ty) => write!(w, "case {}", program.display(ty))?,
                        None => write!(w, "default")?,
                    }
                    if let Some(var) = clause.left.expand() {
                        write!(w, " ({})", program.display(var))?;
                    }
                    writeln!(w, ":")?;
                    self.write_block(&clause.nbody, w)?;
                }
                self.indent(w)?;
                writeln!(w, "}}")
            }

            Op::Block => {
                writeln!(w, "{{")?;
                self.write_block(&data.list, w)?;
                self.indent(w)?;
                writeln!(w, "}}")
            }

            _ => writeln!(w, "{}", program.display(stmt)),
        }
    }

    fn label_name(&self, stmt: NodeId) -> &str {
        match self.program.nodes[stmt].label.expand() {
            Some(label) => self.program.label_name(label),
            None => "?",
        }
    }

    fn opt(&self, node: Option<NodeId>) -> String {
        match node {
            Some(node) => self.program.display(node).to_string(),
            None => "?".to_string(),
        }
    }

    fn list(&self, nodes: &[NodeId]) -> String {
        let mut s = String::new();
        let _ = write_iter_with_delim(self.program, &mut s, nodes.iter().copied(), ", ");
        s
    }

    fn indent(&self, w: &mut impl Write) -> fmt::Result {
        self.indent_by(self.level, w)
    }

    fn indent_by(&self, level: u8, w: &mut impl Write) -> fmt::Result {
        w.write_str(&" ".repeat(level as usize * 4))
    }
}

pub trait DisplayWithProgram {
    fn fmt(&self, program: &Program, f: &mut dyn Write) -> fmt::Result;
}

impl<T> DisplayWithProgram for &T
where
    T: DisplayWithProgram,
{
    fn fmt(&self, program: &Program, f: &mut dyn Write) -> fmt::Result {
        (*self).fmt(program, f)
    }
}

/// Short, one line rendering of an expression as it appears in
/// diagnostics.
impl DisplayWithProgram for NodeId {
    fn fmt(&self, program: &Program, f: &mut dyn Write) -> fmt::Result {
        let data = &program.nodes[*self];
        let left = data.left.expand();
        let right = data.right.expand();
        let sym = data.sym.as_deref().unwrap_or("?");
        let op = data.op;

        match op {
            Op::Name | Op::Literal => f.write_str(sym),
            Op::DddArg => f.write_str("... argument"),
            Op::Closure => f.write_str("func literal"),
            Op::Key => {
                write_opt(program, f, left)?;
                f.write_str(": ")?;
                write_opt(program, f, right)
            }

            Op::Addr => {
                f.write_str("&")?;
                write_opt(program, f, left)
            }
            Op::Ind => {
                f.write_str("*")?;
                write_opt(program, f, left)
            }
            Op::Dot | Op::DotPtr | Op::DotMeth | Op::DotInter | Op::CallPart => {
                write_opt(program, f, left)?;
                let name = sym.rsplit('.').next().unwrap_or(sym);
                write!(f, ".{name}")
            }
            Op::Index | Op::IndexMap => {
                write_opt(program, f, left)?;
                f.write_str("[")?;
                write_opt(program, f, right)?;
                f.write_str("]")
            }
            Op::Slice | Op::Slice3 | Op::SliceArr | Op::Slice3Arr | Op::SliceStr => {
                write_opt(program, f, left)?;
                f.write_str("[")?;
                match data.list.as_slice() {
                    [] => f.write_str(":")?,
                    [lo] => {
                        lo.fmt(program, f)?;
                        f.write_str(":")?;
                    }
                    bounds => write_iter_with_delim(program, f, bounds.iter().copied(), ":")?,
                }
                f.write_str("]")
            }
            Op::DotType | Op::DotType2 => {
                write_opt(program, f, left)?;
                f.write_str(".(")?;
                write_opt_ty(program, f, data.ty)?;
                f.write_str(")")
            }
            Op::Recv => {
                f.write_str("<-")?;
                write_opt(program, f, left)
            }

            Op::CallFunc | Op::CallMeth | Op::CallInter => {
                write_opt(program, f, left)?;
                f.write_str("(")?;
                write_iter_with_delim(program, f, data.list.iter().copied(), ", ")?;
                if data.isddd {
                    f.write_str("...")?;
                }
                f.write_str(")")
            }
            Op::Append => {
                f.write_str("append(")?;
                write_iter_with_delim(program, f, data.list.iter().copied(), ", ")?;
                if data.isddd {
                    f.write_str("...")?;
                }
                f.write_str(")")
            }
            Op::Len | Op::Cap => {
                f.write_str(if op == Op::Len { "len(" } else { "cap(" })?;
                write_opt(program, f, left)?;
                f.write_str(")")
            }

            Op::New => {
                f.write_str("new(")?;
                let elem = data.ty.and_then(|ty| program.types.deref(ty));
                write_opt_ty(program, f, elem)?;
                f.write_str(")")
            }
            Op::MakeSlice | Op::MakeMap | Op::MakeChan => {
                f.write_str("make(")?;
                write_opt_ty(program, f, data.ty)?;
                f.write_str(")")
            }
            Op::PtrLit => {
                f.write_str("&")?;
                let elem = data.ty.and_then(|ty| program.types.deref(ty));
                write_opt_ty(program, f, elem)?;
                f.write_str(" literal")
            }
            Op::StructLit | Op::ArrayLit | Op::MapLit => {
                write_opt_ty(program, f, data.ty)?;
                f.write_str(" literal")
            }

            Op::ConvIface => write_opt(program, f, left),
            Op::Conv | Op::ConvNop => {
                write_opt_ty(program, f, data.ty)?;
                f.write_str("(")?;
                write_opt(program, f, left)?;
                f.write_str(")")
            }
            Op::ArrayRuneStr | Op::ArrayByteStr | Op::RuneStr => {
                f.write_str("string(")?;
                write_opt(program, f, left)?;
                f.write_str(")")
            }
            Op::StrArrayRune | Op::StrArrayByte => {
                f.write_str("(")?;
                write_opt_ty(program, f, data.ty)?;
                f.write_str(")(")?;
                write_opt(program, f, left)?;
                f.write_str(")")
            }
            Op::AddStr => write_iter_with_delim(program, f, data.list.iter().copied(), " + "),

            Op::Plus | Op::Minus | Op::Com | Op::Not => {
                f.write_str(op.symbol())?;
                write_opt(program, f, left)
            }
            _ if right.is_some() => {
                write_opt(program, f, left)?;
                write!(f, " {} ", op.symbol())?;
                write_opt(program, f, right)
            }
            _ => f.write_str(op.as_str()),
        }
    }
}

impl DisplayWithProgram for Type {
    fn fmt(&self, program: &Program, f: &mut dyn Write) -> fmt::Result {
        let cmpd_ref = match self {
            Type::Bool => return f.write_str("bool"),
            Type::I8 => return f.write_str("int8"),
            Type::I16 => return f.write_str("int16"),
            Type::I32 => return f.write_str("int32"),
            Type::I64 => return f.write_str("int64"),
            Type::Float => return f.write_str("float64"),
            Type::String => return f.write_str("string"),
            Type::UnsafePtr => return f.write_str("unsafe.Pointer"),
            Type::Unit => return f.write_str("()"),
            Type::Compound(cmpd_ref) => *cmpd_ref,
        };

        match program.types.resolve_compound(cmpd_ref) {
            CompoundType::Ptr(elem) => {
                f.write_str("*")?;
                elem.fmt(program, f)
            }
            CompoundType::Slice(elem) => {
                f.write_str("[]")?;
                elem.fmt(program, f)
            }
            CompoundType::Array { elem, len } => {
                write!(f, "[{len}]")?;
                elem.fmt(program, f)
            }
            CompoundType::Map { key, value } => {
                f.write_str("map[")?;
                key.fmt(program, f)?;
                f.write_str("]")?;
                value.fmt(program, f)
            }
            CompoundType::Chan(elem) => {
                f.write_str("chan ")?;
                elem.fmt(program, f)
            }
            CompoundType::Struct(data) => f.write_str(&data.name),
            CompoundType::Interface(name) => f.write_str(name),
            CompoundType::Func {
                args,
                rets,
                variadic,
            } => {
                f.write_str("func(")?;
                for (idx, arg) in args.iter().enumerate() {
                    if idx > 0 {
                        f.write_str(", ")?;
                    }
                    if *variadic && idx + 1 == args.len() {
                        f.write_str("...")?;
                        program.types.elem(*arg).unwrap_or(*arg).fmt(program, f)?;
                    } else {
                        arg.fmt(program, f)?;
                    }
                }
                f.write_str(")")?;
                match rets.as_slice() {
                    [] => Ok(()),
                    [ret] => {
                        f.write_str(" ")?;
                        ret.fmt(program, f)
                    }
                    rets => {
                        f.write_str(" (")?;
                        for (idx, ret) in rets.iter().enumerate() {
                            if idx > 0 {
                                f.write_str(", ")?;
                            }
                            ret.fmt(program, f)?;
                        }
                        f.write_str(")")
                    }
                }
            }
        }
    }
}

impl Op {
    /// Source spelling of an operator.
    pub fn symbol(self) -> &'static str {
        match self {
            Self::Add | Self::Plus | Self::AddStr => "+",
            Self::Sub | Self::Minus => "-",
            Self::Or => "|",
            Self::Xor | Self::Com => "^",
            Self::Mul => "*",
            Self::Div => "/",
            Self::Mod => "%",
            Self::Lsh => "<<",
            Self::Rsh => ">>",
            Self::And => "&",
            Self::AndNot => "&^",
            Self::Not => "!",
            Self::Eq => "==",
            Self::Ne => "!=",
            Self::Lt => "<",
            Self::Le => "<=",
            Self::Gt => ">",
            Self::Ge => ">=",
            Self::AndAnd => "&&",
            Self::OrOr => "||",
            op => op.as_str(),
        }
    }
}

impl Program {
    pub fn display<T: DisplayWithProgram>(&self, item: T) -> DisplayableWithProgram<'_, T> {
        DisplayableWithProgram(item, self)
    }
}

pub fn write_iter_with_delim<T>(
    program: &Program,
    f: &mut dyn Write,
    iter: impl Iterator<Item = T>,
    delim: &str,
) -> fmt::Result
where
    T: DisplayWithProgram,
{
    let mut iter = iter.peekable();
    while let Some(item) = iter.next() {
        item.fmt(program, f)?;
        if iter.peek().is_some() {
            f.write_str(delim)?;
        }
    }

    Ok(())
}

fn write_opt(program: &Program, f: &mut dyn Write, node: Option<NodeId>) -> fmt::Result {
    match node {
        Some(node) => node.fmt(program, f),
        None => f.write_str("?"),
    }
}

fn write_opt_ty(program: &Program, f: &mut dyn Write, ty: Option<Type>) -> fmt::Result {
    match ty {
        Some(ty) => ty.fmt(program, f),
        None => f.write_str("?"),
    }
}

pub struct DisplayableWithProgram<'p, T>(pub T, pub &'p Program);

impl<T> fmt::Display for DisplayableWithProgram<'_, T>
where
    T: DisplayWithProgram,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(self.1, f)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::{ProgramBuilder, Signature};

    #[test]
    fn short_expressions() {
        let mut pb = ProgramBuilder::new();
        let node = pb.declare_struct("Node", &[]);
        let node_ptr = pb.ptr_type(node);
        pb.update_struct("Node", &[("next", node_ptr), ("val", Type::I64)]);
        let nodes = pb.slice_type(node_ptr);

        let func = pb.declare_func(Signature::new("f").param("p", node_ptr).param("s", nodes));
        let mut rendered = Vec::new();
        pb.define(func, |fb| {
            let p = fb.param(0);
            let s = fb.param(1);
            let next = fb.dot_ptr(p, "next");
            let deref = fb.ind(next);
            let addr = fb.addr(deref);
            let zero = fb.int(0);
            let elem = fb.index(s, zero);
            let tail = fb.slice(s, Some(zero), None);
            let alloc = fb.new_(node);
            let lit = fb.struct_lit(node, &[("next", p)]);
            let ptr_lit = fb.ptr_lit(lit);
            let grown = fb.append(&[s, p], false);

            for expr in [next, deref, addr, elem, tail, alloc, lit, ptr_lit, grown] {
                rendered.push(fb.program().display(expr).to_string());
            }
        });

        assert_eq!(
            rendered,
            [
                "p.next",
                "*p.next",
                "&*p.next",
                "s[0]",
                "s[0:]",
                "new(Node)",
                "Node literal",
                "&Node literal",
                "append(s, p)",
            ]
        );
    }

    #[test]
    fn types() {
        let mut pb = ProgramBuilder::new();
        let ptr = pb.ptr_type(Type::I8);
        let arr = pb.array_type(ptr, 4);
        let map = pb.map_type(Type::String, arr);
        let chan = pb.chan_type(Type::Bool);
        let ints = pb.slice_type(Type::I64);

        let fn_ty = pb.func_type(&[chan, ints], &[ptr, Type::Bool]);
        let program = pb.build();
        assert_eq!(program.display(map).to_string(), "map[string][4]*int8");
        assert_eq!(
            program.display(fn_ty).to_string(),
            "func(chan bool, []int64) (*int8, bool)"
        );
    }
}
