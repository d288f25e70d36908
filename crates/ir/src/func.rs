use cranelift_entity::{entity_impl, packed_option::PackedOption};
use smallvec::SmallVec;

use crate::{NodeId, Type};

/// An opaque reference to [`FuncDecl`].
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct FuncRef(u32);
entity_impl!(FuncRef, "func");

/// A formal parameter of a function.
#[derive(Debug, Clone, Default)]
pub struct Param {
    /// The `Name` node declaring the parameter, absent for unnamed parameters.
    pub name: PackedOption<NodeId>,
    pub ty: Option<Type>,
    /// The parameter is the `...T` tail of a variadic function.
    pub isddd: bool,
    /// Escape tag of the parameter, `esc:0x..`.
    pub note: Option<String>,
}

impl Param {
    pub fn new(name: Option<NodeId>, ty: Option<Type>) -> Self {
        Self {
            name: name.into(),
            ty,
            ..Default::default()
        }
    }
}

#[derive(Debug, Clone)]
pub struct FuncDecl {
    pub name: String,
    pub recv: Option<Param>,
    pub params: SmallVec<[Param; 4]>,
    /// Output parameters. Every output is a named `ParamOut` node whose
    /// `vargen` is its 1-based position.
    pub results: SmallVec<[Param; 2]>,
    /// Statements of the body, `None` for a function declared without one.
    pub body: Option<Vec<NodeId>>,
    /// Every name declared in the function: receiver, parameters, outputs
    /// and locals.
    pub dcl: Vec<NodeId>,
    /// The declaration promises that no parameter escapes.
    pub noescape: bool,
    /// Declared by an already compiled package; never analyzed.
    pub imported: bool,
    /// The enclosing function of a closure.
    pub outer: PackedOption<FuncRef>,
    /// Variables of the enclosing function captured by a closure.
    pub cvars: Vec<NodeId>,
    /// The function type.
    pub ty: Option<Type>,
    pub line: u32,
}

impl FuncDecl {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            recv: None,
            params: SmallVec::new(),
            results: SmallVec::new(),
            body: None,
            dcl: Vec::new(),
            noescape: false,
            imported: false,
            outer: None.into(),
            cvars: Vec::new(),
            ty: None,
            line: 0,
        }
    }

    pub fn has_body(&self) -> bool {
        self.body.is_some()
    }

    pub fn is_closure(&self) -> bool {
        self.outer.is_some()
    }

    pub fn is_variadic(&self) -> bool {
        self.params.last().is_some_and(|param| param.isddd)
    }

    /// Iterates over the receiver followed by the parameters.
    pub fn inputs(&self) -> impl Iterator<Item = &Param> {
        self.recv.iter().chain(self.params.iter())
    }

    pub fn param_note(&self, idx: usize) -> Option<&str> {
        self.params.get(idx)?.note.as_deref()
    }
}
