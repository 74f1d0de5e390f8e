//! Problem context: the invocation responsible for calling a time-wasting operation
//!
//! Every raw member of the operation has an *invoker*: the member itself when
//! it has nested calls of its own (or nothing above it), otherwise its parent.
//! Members are grouped into clusters by invoker and weighted by their summed
//! exclusive time. Clusters are merged bottom-up until one of them carries a
//! significant share of the weight:
//!
//! ```text
//!   loop while more than one cluster remains:
//!     some cluster weight >= significance * total  → that cluster
//!     merge the pair with the deepest common ancestor into that ancestor
//!     no pair shares an ancestor                   → stop
//!   heaviest remaining cluster (first on ties)
//! ```
//!
//! Detached subtrees never share an ancestor, so among several detached
//! invokers the heaviest one wins.

use super::{
    bound_aggregated, node, DiagnosisRule, DiagnosisValue, PROBLEM_CONTEXT,
    TIME_WASTING_OPERATIONS,
};
use crate::engine::{Quantity, RuleAction, RuleDefinition, RuleInput, RuleOutput};
use crate::invocation::{InvocationTree, NodeId};
use anyhow::Result;
use fnv::FnvHashMap;
use std::cmp::Reverse;
use std::collections::hash_map::Entry;
use std::collections::BinaryHeap;

/// Locates the problem context of one time-wasting operation
#[derive(Debug, Clone, Copy)]
pub struct ProblemContextRule {
    significance: f64,
}

impl Default for ProblemContextRule {
    fn default() -> Self {
        Self::new(0.8)
    }
}

impl ProblemContextRule {
    pub fn new(significance: f64) -> Self {
        Self { significance }
    }

    pub fn definition(self) -> DiagnosisRule {
        RuleDefinition::new(
            "ProblemContextRule",
            PROBLEM_CONTEXT,
            Quantity::Single,
            self,
        )
        .requires_tag(TIME_WASTING_OPERATIONS)
    }
}

impl RuleAction<InvocationTree, DiagnosisValue> for ProblemContextRule {
    fn execute(
        &self,
        tree: &InvocationTree,
        input: &RuleInput<'_, DiagnosisValue>,
    ) -> Result<RuleOutput<DiagnosisValue>> {
        let operation = bound_aggregated(input, &TIME_WASTING_OPERATIONS)?;
        let context = locate_problem_context(tree, &operation.raw_members, self.significance)?;

        tracing::debug!(
            method = %operation.method_ident,
            members = operation.size(),
            context = ?context,
            "problem context located"
        );

        Ok(match context {
            Some(context) => RuleOutput::single(DiagnosisValue::Invocation(context)),
            None => RuleOutput::nothing(),
        })
    }
}

#[derive(Debug)]
struct Cluster {
    context: NodeId,
    depth: usize,
    weight: f64,
    alive: bool,
}

fn invoker(tree: &InvocationTree, member: NodeId) -> Result<NodeId> {
    let member_node = node(tree, member)?;
    Ok(match member_node.parent() {
        Some(parent) if !member_node.has_children() => parent,
        _ => member,
    })
}

/// Problem context for the given raw members, `None` when there are none
///
/// Merging lifts the deepest cluster (earliest on ties) to its parent until it
/// lands on a node another cluster already holds, so the first merge happens
/// at the deepest common ancestor of any two clusters.
pub fn locate_problem_context(
    tree: &InvocationTree,
    members: &[NodeId],
    significance: f64,
) -> Result<Option<NodeId>> {
    match members {
        [] => return Ok(None),
        [single] => return invoker(tree, *single).map(Some),
        _ => {}
    }

    let mut clusters: Vec<Cluster> = Vec::new();
    let mut by_context: FnvHashMap<NodeId, usize> = FnvHashMap::default();
    for &member in members {
        let context = invoker(tree, member)?;
        let weight = tree.exclusive_time(member);
        match by_context.entry(context) {
            Entry::Occupied(slot) => clusters[*slot.get()].weight += weight,
            Entry::Vacant(slot) => {
                slot.insert(clusters.len());
                clusters.push(Cluster {
                    context,
                    depth: tree.depth(context),
                    weight,
                    alive: true,
                });
            }
        }
    }

    let total: f64 = clusters.iter().map(|c| c.weight).sum();
    let threshold = significance * total;
    let mut remaining = clusters.len();
    if remaining > 1 {
        if let Some(dominant) = clusters.iter().find(|c| c.weight >= threshold) {
            return Ok(Some(dominant.context));
        }
    }

    let mut deepest: BinaryHeap<(usize, Reverse<usize>)> = clusters
        .iter()
        .enumerate()
        .map(|(index, cluster)| (cluster.depth, Reverse(index)))
        .collect();

    while remaining > 1 {
        let Some((depth, Reverse(index))) = deepest.pop() else {
            break;
        };
        let Cluster { context, alive, .. } = clusters[index];
        if !alive || clusters[index].depth != depth {
            continue;
        }
        // the deepest cluster sits on a root, so every remaining one does
        let Some(parent) = node(tree, context)?.parent() else {
            break;
        };

        by_context.remove(&context);
        match by_context.get(&parent).copied() {
            Some(other) => {
                let (keep, absorb) = (index.min(other), index.max(other));
                clusters[absorb].alive = false;
                let absorbed = clusters[absorb].weight;
                let kept = &mut clusters[keep];
                kept.context = parent;
                kept.depth = depth - 1;
                kept.weight += absorbed;
                by_context.insert(parent, keep);
                remaining -= 1;

                if kept.weight >= threshold {
                    return Ok(Some(parent));
                }
                // the other cluster already has an entry at this depth
                if keep == index {
                    deepest.push((depth - 1, Reverse(keep)));
                }
            }
            None => {
                let lifted = &mut clusters[index];
                lifted.context = parent;
                lifted.depth = depth - 1;
                by_context.insert(parent, index);
                deepest.push((depth - 1, Reverse(index)));
            }
        }
    }

    Ok(heaviest(&clusters))
}

fn heaviest(clusters: &[Cluster]) -> Option<NodeId> {
    let mut best: Option<&Cluster> = None;
    for cluster in clusters.iter().filter(|c| c.alive) {
        if best.map_or(true, |b| cluster.weight > b.weight) {
            best = Some(cluster);
        }
    }
    best.map(|c| c.context)
}
