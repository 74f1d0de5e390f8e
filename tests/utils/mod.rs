// Shared call-tree builders for the diagnosis integration tests
#![allow(dead_code)]

use tracecause::invocation::{
    InvocationNode, InvocationTree, MethodIdent, NodeId, SqlStatementData, TimerData,
};

pub fn plain(method: u64, duration: f64) -> InvocationNode {
    InvocationNode::new(MethodIdent(method), duration)
}

pub fn timed(method: u64, duration: f64, exclusive: f64) -> InvocationNode {
    plain(method, duration).with_timer(TimerData::with_exclusive(duration, exclusive))
}

pub fn sql(method: u64, duration: f64) -> InvocationNode {
    plain(method, duration).with_sql(SqlStatementData::new(
        "SELECT * FROM order_items WHERE order_id = ?",
        TimerData::with_exclusive(duration, duration),
    ))
}

pub fn repeat(
    tree: &mut InvocationTree,
    parent: NodeId,
    node: InvocationNode,
    count: usize,
) -> Vec<NodeId> {
    (0..count)
        .map(|_| tree.add_child(parent, node.clone()).unwrap())
        .collect()
}

/// Classic N+1: a loop method issuing one query per item
///
/// ```text
/// root(1) ── controller(2) ── loop(3, 150 ms own) ── 40 × query(4, 20 ms)
/// ```
pub struct NPlusOne {
    pub tree: InvocationTree,
    pub root: NodeId,
    pub controller: NodeId,
    pub loop_method: NodeId,
    pub queries: Vec<NodeId>,
}

pub fn n_plus_one() -> NPlusOne {
    let mut tree = InvocationTree::with_identities(7, 42);
    let root = tree.add_root(plain(1, 1000.0));
    let controller = tree.add_child(root, plain(2, 950.0)).unwrap();
    let loop_method = tree.add_child(controller, timed(3, 950.0, 150.0)).unwrap();
    let queries = repeat(&mut tree, loop_method, sql(4, 20.0), 40);
    NPlusOne {
        tree,
        root,
        controller,
        loop_method,
        queries,
    }
}

/// A method recursing into itself, fanning out at the second level
///
/// ```text
/// root(1) ── outer(5) ── inner(5) ── 3 × leaf(5, 280 ms)
/// ```
pub fn recursion() -> (InvocationTree, NodeId, NodeId, NodeId) {
    let mut tree = InvocationTree::with_identities(7, 43);
    let root = tree.add_root(plain(1, 1000.0));
    let outer = tree.add_child(root, timed(5, 900.0, 20.0)).unwrap();
    let inner = tree.add_child(outer, timed(5, 880.0, 40.0)).unwrap();
    repeat(&mut tree, inner, timed(5, 280.0, 280.0), 3);
    (tree, root, outer, inner)
}
