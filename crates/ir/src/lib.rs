pub mod builder;
pub mod func;
pub mod ir_writer;
pub mod node;
pub mod program;
pub mod types;

pub use builder::{FuncBuilder, ProgramBuilder, Signature};
pub use func::{FuncDecl, FuncRef, Param};
pub use ir_writer::{DisplayWithProgram, FuncWriter};
pub use node::{Class, LabelRef, NodeData, NodeId, NodeStore, Op};
pub use program::Program;
pub use types::{CompoundType, CompoundTypeRef, Type, TypeStore};
