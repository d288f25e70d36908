use escflow_ir::{FuncRef, NodeId, Op};
use thiserror::Error;

/// Malformed input found while building or flooding the flow graph.
///
/// Every variant points at a bug of the producer of the program; the
/// analysis stops at the first one.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EscapeError {
    #[error("graph inconsistency at {node}: in-group callee is not planned or call is already bound")]
    GraphInconsistency { node: NodeId },

    #[error("{func} is analyzed twice")]
    RepeatEscfunc { func: FuncRef },

    #[error("label or goto {node} has no label symbol")]
    LabelWithoutSymbol { node: NodeId },

    #[error("corrupt escape tag `{note}` or missing call results")]
    CorruptTag { note: String },

    #[error("return {node} has more values than the function has results")]
    ReturnCountMismatch { node: NodeId },

    #[error("multi-value assignment {node} does not match the call results")]
    CallResultMismatch { node: NodeId },

    #[error("unexpected assignment destination {node} ({op})")]
    UnexpectedDestination { node: NodeId, op: Op },

    #[error("call {node} passes more arguments than the callee accepts")]
    ArgCountMismatch { node: NodeId },
}
