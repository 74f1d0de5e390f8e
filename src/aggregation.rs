//! Aggregation of invocations sharing the same identity
//!
//! The aggregation performer groups a sequence of items by a key, folding all
//! items with the same key into one aggregate. Groups come out in the order
//! their key was first seen, and the input is never modified.
//!
//! For invocation trees the aggregate is an [`AggregatedInvocation`]: it keeps
//! the raw member nodes and sums their exclusive times, which is what the
//! diagnosis rules rank and inspect.
//!
//! # Example
//!
//! ```
//! use tracecause::aggregation::aggregate_by_method;
//! use tracecause::invocation::{InvocationNode, InvocationTree, MethodIdent, TimerData};
//!
//! let mut tree = InvocationTree::new();
//! let root = tree.add_root(InvocationNode::new(MethodIdent(1), 30.0));
//! for _ in 0..3 {
//!     tree.add_child(root, InvocationNode::new(MethodIdent(2), 10.0)
//!         .with_timer(TimerData::with_exclusive(10.0, 10.0))).unwrap();
//! }
//!
//! let children = tree[root].children().to_vec();
//! let groups = aggregate_by_method(&tree, &children);
//! assert_eq!(groups.len(), 1);
//! assert_eq!(groups[0].size(), 3);
//! assert_eq!(groups[0].exclusive_time, 30.0);
//! ```

use crate::invocation::{InvocationNode, InvocationTree, MethodIdent, NodeId};
use serde::Serialize;
use fnv::FnvHashMap;
use std::hash::Hash;
use std::marker::PhantomData;

/// Strategy describing how items are keyed and folded together
pub trait Aggregator<T> {
    type Key: Eq + Hash;
    type Output;

    /// Key that decides which group an item belongs to
    fn key(&self, item: &T) -> Self::Key;

    /// Empty aggregate for the group first opened by `item`
    fn seed(&self, item: &T) -> Self::Output;

    /// Fold `item` into its group's aggregate
    fn aggregate(&self, into: &mut Self::Output, item: &T);
}

/// Groups items with an [`Aggregator`], keeping first-seen key order
pub struct AggregationPerformer<T, A: Aggregator<T>> {
    aggregator: A,
    index: FnvHashMap<A::Key, usize>,
    results: Vec<A::Output>,
    _items: PhantomData<fn(&T)>,
}

impl<T, A: Aggregator<T>> AggregationPerformer<T, A> {
    pub fn new(aggregator: A) -> Self {
        Self {
            aggregator,
            index: FnvHashMap::default(),
            results: Vec::new(),
            _items: PhantomData,
        }
    }

    /// Fold one item into its group, opening the group if needed
    pub fn process(&mut self, item: &T) {
        let key = self.aggregator.key(item);
        let slot = match self.index.get(&key) {
            Some(&slot) => slot,
            None => {
                self.results.push(self.aggregator.seed(item));
                self.index.insert(key, self.results.len() - 1);
                self.results.len() - 1
            }
        };
        self.aggregator.aggregate(&mut self.results[slot], item);
    }

    pub fn process_collection<'a, I>(&mut self, items: I)
    where
        I: IntoIterator<Item = &'a T>,
        T: 'a,
    {
        for item in items {
            self.process(item);
        }
    }

    /// Number of groups opened so far
    pub fn len(&self) -> usize {
        self.results.len()
    }

    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }

    /// Consume the performer, yielding the groups in first-seen order
    pub fn into_results(self) -> Vec<A::Output> {
        self.results
    }
}

/// N raw invocations folded into one group
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AggregatedInvocation {
    /// Identity shared by the members (taken from the first member)
    pub method_ident: MethodIdent,

    /// Summed total duration of the members
    pub duration: f64,

    /// Summed exclusive time of the members
    pub exclusive_time: f64,

    /// Contributing nodes, in the order they were aggregated
    pub raw_members: Vec<NodeId>,
}

impl AggregatedInvocation {
    fn empty(method_ident: MethodIdent) -> Self {
        Self {
            method_ident,
            duration: 0.0,
            exclusive_time: 0.0,
            raw_members: Vec::new(),
        }
    }

    /// Number of raw invocations behind this aggregate
    pub fn size(&self) -> usize {
        self.raw_members.len()
    }
}

/// Aggregates arena nodes by a caller-supplied key
pub struct InvocationAggregator<'t, F> {
    tree: &'t InvocationTree,
    key_fn: F,
}

impl<'t, K, F> InvocationAggregator<'t, F>
where
    F: Fn(&InvocationNode) -> K,
    K: Eq + Hash,
{
    pub fn new(tree: &'t InvocationTree, key_fn: F) -> Self {
        Self { tree, key_fn }
    }
}

impl<K, F> Aggregator<NodeId> for InvocationAggregator<'_, F>
where
    F: Fn(&InvocationNode) -> K,
    K: Eq + Hash,
{
    type Key = K;
    type Output = AggregatedInvocation;

    fn key(&self, item: &NodeId) -> K {
        (self.key_fn)(&self.tree[*item])
    }

    fn seed(&self, item: &NodeId) -> AggregatedInvocation {
        AggregatedInvocation::empty(self.tree[*item].method_ident)
    }

    fn aggregate(&self, into: &mut AggregatedInvocation, item: &NodeId) {
        into.duration += self.tree[*item].duration;
        into.exclusive_time += self.tree.exclusive_time(*item);
        into.raw_members.push(*item);
    }
}

/// Aggregate `nodes` by an arbitrary key over the node
pub fn aggregate_by<K, F>(
    tree: &InvocationTree,
    nodes: &[NodeId],
    key_fn: F,
) -> Vec<AggregatedInvocation>
where
    F: Fn(&InvocationNode) -> K,
    K: Eq + Hash,
{
    let mut performer = AggregationPerformer::new(InvocationAggregator::new(tree, key_fn));
    performer.process_collection(nodes);
    performer.into_results()
}

/// Aggregate `nodes` by method identity
pub fn aggregate_by_method(tree: &InvocationTree, nodes: &[NodeId]) -> Vec<AggregatedInvocation> {
    aggregate_by(tree, nodes, |node| node.method_ident)
}
