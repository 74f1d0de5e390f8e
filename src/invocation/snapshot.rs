// Nested snapshot format for recorded traces
//
// Trace collection happens elsewhere; this is the hand-off format used by the
// CLI and the tests. A snapshot nests children inside their parent, which is
// the natural shape for JSON, and is flattened into the arena on load.

use crate::invocation::{
    InvocationNode, InvocationTree, MethodIdent, NodeId, SqlStatementData, TimerData,
};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// One completed trace as handed over by the trace collector
///
/// # Example JSON
/// ```json
/// {
///   "application": 7,
///   "business_transaction": 3,
///   "root": {
///     "method": 1,
///     "duration": 1200.0,
///     "children": [
///       { "method": 2, "duration": 900.0,
///         "timer": { "exclusive_count": 1, "exclusive_duration": 900.0 } }
///     ]
///   }
/// }
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TraceSnapshot {
    #[serde(default)]
    pub application: u64,

    #[serde(default)]
    pub business_transaction: u64,

    /// The request root invocation
    pub root: NodeSnapshot,
}

/// One invocation with its nested children
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeSnapshot {
    pub method: u64,

    pub duration: f64,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timer: Option<TimerData>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sql: Option<SqlStatementData>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<NodeSnapshot>,
}

impl NodeSnapshot {
    pub fn new(method: u64, duration: f64) -> Self {
        Self {
            method,
            duration,
            timer: None,
            sql: None,
            children: Vec::new(),
        }
    }

    fn to_node(&self) -> InvocationNode {
        InvocationNode {
            timer: self.timer,
            sql: self.sql.clone(),
            ..InvocationNode::new(MethodIdent(self.method), self.duration)
        }
    }
}

impl TraceSnapshot {
    /// Parse a snapshot from a JSON string
    pub fn from_json_str(json: &str) -> Result<Self> {
        serde_json::from_str(json).context("Failed to parse trace snapshot JSON")
    }

    /// Load a snapshot from a JSON file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(path.as_ref()).with_context(|| {
            format!("Failed to read trace file: {}", path.as_ref().display())
        })?;
        Self::from_json_str(&content)
            .with_context(|| format!("Invalid trace file: {}", path.as_ref().display()))
    }

    /// Flatten the snapshot into an arena, returning the tree and its request root
    ///
    /// Children keep their call order.
    pub fn to_tree(&self) -> Result<(InvocationTree, NodeId)> {
        let mut tree = InvocationTree::with_identities(self.application, self.business_transaction);
        let root = tree.add_root(self.root.to_node());

        let mut pending: Vec<(NodeId, &NodeSnapshot)> = vec![(root, &self.root)];
        while let Some((parent, snapshot)) = pending.pop() {
            for child in &snapshot.children {
                let id = tree
                    .add_child(parent, child.to_node())
                    .context("Failed to attach child invocation")?;
                pending.push((id, child));
            }
        }

        Ok((tree, root))
    }
}
