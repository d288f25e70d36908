//! This module contains the node arena of the analyzed program.
use std::{fmt, ops};

use cranelift_entity::{entity_impl, packed_option::PackedOption, PrimaryMap};

use crate::{func::FuncRef, Type};

/// An opaque reference to [`NodeData`].
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct NodeId(u32);
entity_impl!(NodeId, "n");

/// An opaque reference to a label symbol of a function.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct LabelRef(u32);
entity_impl!(LabelRef, "label");

/// Operator of a node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Op {
    Name,
    Literal,
    /// Implicit allocation of the `...` argument slice.
    DddArg,
    /// `key: value` entry of a composite literal.
    Key,

    // Statements.
    Block,
    Decl,
    As,
    AsOp,
    As2,
    As2Func,
    As2Recv,
    As2MapR,
    As2DotType,
    If,
    For,
    Range,
    Switch,
    TypeSw,
    Case,
    Label,
    Goto,
    Break,
    Continue,
    Return,
    Defer,
    Go,
    Send,
    Panic,

    // Calls.
    CallFunc,
    CallMeth,
    CallInter,
    /// Method value `x.M` bound to its receiver.
    CallPart,

    // Memory access.
    Addr,
    Ind,
    Dot,
    DotPtr,
    DotMeth,
    DotInter,
    DotType,
    DotType2,
    Index,
    IndexMap,
    Slice,
    Slice3,
    SliceArr,
    Slice3Arr,
    SliceStr,
    Recv,
    Len,
    Cap,

    // Conversions.
    Conv,
    ConvNop,
    ConvIface,

    // Allocations.
    Append,
    ArrayLit,
    StructLit,
    MapLit,
    PtrLit,
    Closure,
    MakeChan,
    MakeMap,
    MakeSlice,
    New,
    ArrayRuneStr,
    ArrayByteStr,
    StrArrayRune,
    StrArrayByte,
    RuneStr,
    AddStr,

    // Arithmetic.
    Add,
    Sub,
    Or,
    Xor,
    Mul,
    Div,
    Mod,
    Lsh,
    Rsh,
    And,
    AndNot,
    Plus,
    Minus,
    Com,
    Not,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    AndAnd,
    OrOr,
}

impl Op {
    pub fn is_call(self) -> bool {
        matches!(self, Self::CallFunc | Self::CallMeth | Self::CallInter)
    }

    pub fn is_slice(self) -> bool {
        matches!(
            self,
            Self::Slice | Self::Slice3 | Self::SliceArr | Self::Slice3Arr | Self::SliceStr
        )
    }

    pub fn is_binary_arith(self) -> bool {
        matches!(
            self,
            Self::Add
                | Self::Sub
                | Self::Or
                | Self::Xor
                | Self::Mul
                | Self::Div
                | Self::Mod
                | Self::Lsh
                | Self::Rsh
                | Self::And
                | Self::AndNot
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Name => "NAME",
            Self::Literal => "LITERAL",
            Self::DddArg => "DDDARG",
            Self::Key => "KEY",
            Self::Block => "BLOCK",
            Self::Decl => "DCL",
            Self::As => "AS",
            Self::AsOp => "ASOP",
            Self::As2 => "AS2",
            Self::As2Func => "AS2FUNC",
            Self::As2Recv => "AS2RECV",
            Self::As2MapR => "AS2MAPR",
            Self::As2DotType => "AS2DOTTYPE",
            Self::If => "IF",
            Self::For => "FOR",
            Self::Range => "RANGE",
            Self::Switch => "SWITCH",
            Self::TypeSw => "TYPESW",
            Self::Case => "CASE",
            Self::Label => "LABEL",
            Self::Goto => "GOTO",
            Self::Break => "BREAK",
            Self::Continue => "CONTINUE",
            Self::Return => "RETURN",
            Self::Defer => "DEFER",
            Self::Go => "PROC",
            Self::Send => "SEND",
            Self::Panic => "PANIC",
            Self::CallFunc => "CALLFUNC",
            Self::CallMeth => "CALLMETH",
            Self::CallInter => "CALLINTER",
            Self::CallPart => "CALLPART",
            Self::Addr => "ADDR",
            Self::Ind => "IND",
            Self::Dot => "DOT",
            Self::DotPtr => "DOTPTR",
            Self::DotMeth => "DOTMETH",
            Self::DotInter => "DOTINTER",
            Self::DotType => "DOTTYPE",
            Self::DotType2 => "DOTTYPE2",
            Self::Index => "INDEX",
            Self::IndexMap => "INDEXMAP",
            Self::Slice => "SLICE",
            Self::Slice3 => "SLICE3",
            Self::SliceArr => "SLICEARR",
            Self::Slice3Arr => "SLICE3ARR",
            Self::SliceStr => "SLICESTR",
            Self::Recv => "RECV",
            Self::Len => "LEN",
            Self::Cap => "CAP",
            Self::Conv => "CONV",
            Self::ConvNop => "CONVNOP",
            Self::ConvIface => "CONVIFACE",
            Self::Append => "APPEND",
            Self::ArrayLit => "ARRAYLIT",
            Self::StructLit => "STRUCTLIT",
            Self::MapLit => "MAPLIT",
            Self::PtrLit => "PTRLIT",
            Self::Closure => "CLOSURE",
            Self::MakeChan => "MAKECHAN",
            Self::MakeMap => "MAKEMAP",
            Self::MakeSlice => "MAKESLICE",
            Self::New => "NEW",
            Self::ArrayRuneStr => "ARRAYRUNESTR",
            Self::ArrayByteStr => "ARRAYBYTESTR",
            Self::StrArrayRune => "STRARRAYRUNE",
            Self::StrArrayByte => "STRARRAYBYTE",
            Self::RuneStr => "RUNESTR",
            Self::AddStr => "ADDSTR",
            Self::Add => "ADD",
            Self::Sub => "SUB",
            Self::Or => "OR",
            Self::Xor => "XOR",
            Self::Mul => "MUL",
            Self::Div => "DIV",
            Self::Mod => "MOD",
            Self::Lsh => "LSH",
            Self::Rsh => "RSH",
            Self::And => "AND",
            Self::AndNot => "ANDNOT",
            Self::Plus => "PLUS",
            Self::Minus => "MINUS",
            Self::Com => "COM",
            Self::Not => "NOT",
            Self::Eq => "EQ",
            Self::Ne => "NE",
            Self::Lt => "LT",
            Self::Le => "LE",
            Self::Gt => "GT",
            Self::Ge => "GE",
            Self::AndAnd => "ANDAND",
            Self::OrOr => "OROR",
        }
    }
}

impl fmt::Display for Op {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.as_str().fmt(f)
    }
}

/// Declaration class of a `Name` node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Class {
    /// Not a declared name.
    #[default]
    None,
    /// Package level variable.
    Extern,
    /// Function local variable.
    Auto,
    /// Input parameter, including the method receiver.
    Param,
    /// Output parameter.
    ParamOut,
    /// Variable of an enclosing function captured by a closure.
    ParamRef,
    /// Function name.
    Func,
}

#[derive(Debug, Clone, Default)]
pub struct NodeData {
    pub op: Op,
    pub ty: Option<Type>,
    pub line: u32,
    pub class: Class,
    pub sym: Option<String>,

    pub left: PackedOption<NodeId>,
    pub right: PackedOption<NodeId>,
    pub ntest: PackedOption<NodeId>,
    pub nincr: PackedOption<NodeId>,
    pub ninit: Vec<NodeId>,
    pub list: Vec<NodeId>,
    pub nbody: Vec<NodeId>,
    pub nelse: Vec<NodeId>,
    pub rlist: Vec<NodeId>,

    /// The function named by a `Name` of class `Func`, the method of a
    /// `DotMeth`/`CallPart`, or the function defined by a `Closure`.
    pub func: PackedOption<FuncRef>,
    /// The function that declares this name.
    pub curfn: PackedOption<FuncRef>,
    /// The captured variable of the enclosing function, for `ParamRef`.
    pub closure: PackedOption<NodeId>,
    pub label: PackedOption<LabelRef>,

    /// 1-based ordinal of an output parameter among the function outputs.
    pub vargen: u32,
    /// Call with a `...` argument, or variadic parameter.
    pub isddd: bool,
    /// Captured by value.
    pub byval: bool,
    /// The value does not outlive the statement that creates it.
    pub noescape: bool,
}

impl Default for Op {
    fn default() -> Self {
        Self::Block
    }
}

impl NodeData {
    pub fn new(op: Op, line: u32) -> Self {
        Self {
            op,
            line,
            ..Default::default()
        }
    }

    pub fn with_ty(mut self, ty: impl Into<Option<Type>>) -> Self {
        self.ty = ty.into();
        self
    }

    pub fn with_left(mut self, left: NodeId) -> Self {
        self.left = left.into();
        self
    }

    pub fn with_right(mut self, right: NodeId) -> Self {
        self.right = right.into();
        self
    }

    pub fn with_list(mut self, list: Vec<NodeId>) -> Self {
        self.list = list;
        self
    }

    pub fn with_sym(mut self, sym: &str) -> Self {
        self.sym = Some(sym.to_string());
        self
    }

    pub fn is_name(&self) -> bool {
        self.op == Op::Name
    }

    pub fn is_blank(&self) -> bool {
        self.op == Op::Name && self.sym.as_deref() == Some("_")
    }

    /// Visits the children in the order of `init, left, right, list, test,
    /// incr, body, else, rlist`.
    pub fn for_each_child(&self, mut f: impl FnMut(NodeId)) {
        self.ninit.iter().copied().for_each(&mut f);
        self.left.expand().into_iter().for_each(&mut f);
        self.right.expand().into_iter().for_each(&mut f);
        self.list.iter().copied().for_each(&mut f);
        self.ntest.expand().into_iter().for_each(&mut f);
        self.nincr.expand().into_iter().for_each(&mut f);
        self.nbody.iter().copied().for_each(&mut f);
        self.nelse.iter().copied().for_each(&mut f);
        self.rlist.iter().copied().for_each(&mut f);
    }
}

#[derive(Debug, Default)]
pub struct NodeStore {
    nodes: PrimaryMap<NodeId, NodeData>,
}

impl NodeStore {
    pub fn make_node(&mut self, data: NodeData) -> NodeId {
        self.nodes.push(data)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn keys(&self) -> impl Iterator<Item = NodeId> {
        self.nodes.keys()
    }

    pub fn op(&self, node: NodeId) -> Op {
        self.nodes[node].op
    }

    pub fn left(&self, node: NodeId) -> Option<NodeId> {
        self.nodes[node].left.expand()
    }

    pub fn right(&self, node: NodeId) -> Option<NodeId> {
        self.nodes[node].right.expand()
    }
}

impl ops::Index<NodeId> for NodeStore {
    type Output = NodeData;

    fn index(&self, node: NodeId) -> &NodeData {
        &self.nodes[node]
    }
}

impl ops::IndexMut<NodeId> for NodeStore {
    fn index_mut(&mut self, node: NodeId) -> &mut NodeData {
        &mut self.nodes[node]
    }
}

#[cfg(test)]
mod tests {
    use cranelift_entity::EntityRef;

    use super::*;

    #[test]
    fn entity_names() {
        let mut store = NodeStore::default();
        store.make_node(NodeData::new(Op::Name, 1));
        let node = store.make_node(NodeData::new(Op::Addr, 2));
        assert_eq!(node.to_string(), "n1");
        assert_eq!(format!("{node:?}"), "n1");
        assert_eq!(Some(node), store.keys().last());

        let label = LabelRef::new(3);
        assert_eq!(format!("{label} {label:?}"), "label3 label3");
        let func = FuncRef::new(2);
        assert_eq!(format!("{func} {func:?}"), "func2 func2");
    }
}
