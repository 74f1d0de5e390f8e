// Invocation call trees
//
// A recorded request is a tree of invocations: one request root, nested child
// invocations in call order, each carrying a total duration and optionally a
// timer record (exclusive time) or an SQL statement record.
//
// The tree is stored as an arena. Every node owns the ordered list of its
// children's indices and keeps a non-owning index back to its parent, so the
// diagnosis rules can walk both downwards (flattening a subtree) and upwards
// (ancestor chains) without reference cycles.

mod node;
mod snapshot;
mod tree;

pub use node::{InvocationNode, MethodIdent, NodeId, SqlStatementData, TimerData};
pub use snapshot::{NodeSnapshot, TraceSnapshot};
pub use tree::{Ancestors, InvocationTree, TreeError};
