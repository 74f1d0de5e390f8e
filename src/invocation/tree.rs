use crate::invocation::{InvocationNode, NodeId};
use std::ops::Index;
use thiserror::Error;

/// Errors raised while building an invocation tree
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TreeError {
    #[error("Unknown invocation node {0} (tree has {1} nodes)")]
    UnknownNode(NodeId, usize),
}

/// Arena of invocation nodes for one recorded trace
///
/// Nodes are only ever appended, and a child can only be attached to a node
/// that already exists, so the parent links can never form a cycle. The tree is
/// read-only once handed to a diagnosis session.
///
/// # Example
/// ```
/// use tracecause::invocation::{InvocationNode, InvocationTree, MethodIdent, TimerData};
///
/// let mut tree = InvocationTree::new();
/// let root = tree.add_root(InvocationNode::new(MethodIdent(1), 100.0));
/// let child = tree
///     .add_child(root, InvocationNode::new(MethodIdent(2), 80.0)
///         .with_timer(TimerData::with_exclusive(80.0, 80.0)))
///     .unwrap();
///
/// assert_eq!(tree[child].parent(), Some(root));
/// assert_eq!(tree.exclusive_time(root), 20.0);
/// ```
#[derive(Debug, Clone, Default)]
pub struct InvocationTree {
    nodes: Vec<InvocationNode>,

    /// Identity of the monitored application the trace belongs to
    pub application_ident: u64,

    /// Identity of the business transaction the request was classified as
    pub business_transaction_ident: u64,
}

impl InvocationTree {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_identities(application_ident: u64, business_transaction_ident: u64) -> Self {
        Self {
            nodes: Vec::new(),
            application_ident,
            business_transaction_ident,
        }
    }

    /// Append a parentless node
    pub fn add_root(&mut self, mut node: InvocationNode) -> NodeId {
        node.parent = None;
        node.children.clear();
        self.push(node)
    }

    /// Append `node` as the last child of `parent`
    pub fn add_child(
        &mut self,
        parent: NodeId,
        mut node: InvocationNode,
    ) -> Result<NodeId, TreeError> {
        self.check(parent)?;
        node.parent = Some(parent);
        node.children.clear();
        let id = self.push(node);
        self.nodes[parent.index()].children.push(id);
        Ok(id)
    }

    fn push(&mut self, node: InvocationNode) -> NodeId {
        let id = NodeId(self.nodes.len());
        self.nodes.push(node);
        id
    }

    fn check(&self, id: NodeId) -> Result<(), TreeError> {
        if id.index() < self.nodes.len() {
            Ok(())
        } else {
            Err(TreeError::UnknownNode(id, self.nodes.len()))
        }
    }

    pub fn get(&self, id: NodeId) -> Option<&InvocationNode> {
        self.nodes.get(id.index())
    }

    pub fn contains(&self, id: NodeId) -> bool {
        id.index() < self.nodes.len()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// All parentless nodes, in insertion order
    pub fn roots(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.nodes
            .iter()
            .enumerate()
            .filter(|(_, node)| node.parent.is_none())
            .map(|(index, _)| NodeId(index))
    }

    /// Ancestors of `id`, nearest first, excluding `id` itself
    pub fn ancestors(&self, id: NodeId) -> Ancestors<'_> {
        Ancestors {
            tree: self,
            next: self.get(id).and_then(|node| node.parent),
        }
    }

    /// Number of edges between `id` and its root
    pub fn depth(&self, id: NodeId) -> usize {
        self.ancestors(id).count()
    }

    /// Pre-order listing of the subtree rooted at `id`, `id` first
    pub fn preorder(&self, id: NodeId) -> Vec<NodeId> {
        let mut order = Vec::new();
        if !self.contains(id) {
            return order;
        }

        let mut stack = vec![id];
        while let Some(current) = stack.pop() {
            order.push(current);
            // Reverse so the first child is visited first
            stack.extend(self[current].children.iter().rev().copied());
        }
        order
    }

    /// Exclusive time of a node
    ///
    /// Uses the node's timer (or SQL timer) when it reports exclusive data,
    /// otherwise derives it as the duration not covered by direct children.
    pub fn exclusive_time(&self, id: NodeId) -> f64 {
        let node = &self[id];
        if let Some(timer) = node.effective_timer() {
            return timer.exclusive_duration;
        }

        let nested: f64 = node
            .children
            .iter()
            .map(|child| self[*child].duration)
            .sum();
        (node.duration - nested).max(0.0)
    }
}

impl Index<NodeId> for InvocationTree {
    type Output = InvocationNode;

    fn index(&self, id: NodeId) -> &InvocationNode {
        &self.nodes[id.index()]
    }
}

/// Iterator over a node's ancestor chain
pub struct Ancestors<'a> {
    tree: &'a InvocationTree,
    next: Option<NodeId>,
}

impl Iterator for Ancestors<'_> {
    type Item = NodeId;

    fn next(&mut self) -> Option<NodeId> {
        let current = self.next?;
        self.next = self.tree.get(current).and_then(|node| node.parent);
        Some(current)
    }
}
