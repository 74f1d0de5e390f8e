//! Time-wasting operations: the groups of equal invocations that explain the
//! global context's duration
//!
//! # Algorithm
//!
//! ```text
//! 1. Pre-order walk of the global context subtree, keeping nodes whose timer
//!    (or SQL statement timer) reports exclusive time
//! 2. Aggregate by method identity, summing exclusive time
//! 3. Stable sort by summed exclusive time, descending
//! 4. Accept groups while any of
//!      duration - accepted > baseline
//!      accepted < proportion * duration
//!      group size > min_calls
//!    holds; the first group failing all three ends the scan
//! ```
//!
//! `accepted` is the exclusive time of the groups taken so far. Every
//! accepted group opens its own diagnosis branch.

use super::{
    bound_invocation, node, DiagnosisRule, DiagnosisValue, BASELINE, GLOBAL_CONTEXT,
    TIME_WASTING_OPERATIONS,
};
use crate::aggregation::{aggregate_by_method, AggregatedInvocation};
use crate::engine::{Quantity, RuleAction, RuleDefinition, RuleInput, RuleOutput};
use crate::invocation::{InvocationTree, NodeId};
use anyhow::{ensure, Result};

/// Ranks aggregated invocations below the global context and keeps the top ones
#[derive(Debug, Clone, Copy)]
pub struct TimeWastingOperationsRule {
    proportion: f64,
    min_calls: usize,
}

impl Default for TimeWastingOperationsRule {
    fn default() -> Self {
        Self::new(0.8, 20)
    }
}

impl TimeWastingOperationsRule {
    pub fn new(proportion: f64, min_calls: usize) -> Self {
        Self {
            proportion,
            min_calls,
        }
    }

    pub fn definition(self) -> DiagnosisRule {
        RuleDefinition::new(
            "TimeWastingOperationsRule",
            TIME_WASTING_OPERATIONS,
            Quantity::Multiple,
            self,
        )
        .requires_tag(GLOBAL_CONTEXT)
        .requires_variable(BASELINE)
    }

    /// Accepted groups below `global_context`, most expensive first
    pub fn select(
        &self,
        tree: &InvocationTree,
        global_context: NodeId,
        baseline: f64,
    ) -> Result<Vec<AggregatedInvocation>> {
        let duration = node(tree, global_context)?.duration;

        let timed: Vec<NodeId> = tree
            .preorder(global_context)
            .into_iter()
            .filter(|id| tree[*id].is_exclusive_time_data_available())
            .collect();

        let mut groups = aggregate_by_method(tree, &timed);
        groups.sort_by(|a, b| b.exclusive_time.total_cmp(&a.exclusive_time));

        let mut accepted = Vec::new();
        let mut accepted_time = 0.0;
        for group in groups {
            let worth_taking = duration - accepted_time > baseline
                || accepted_time < self.proportion * duration
                || group.size() > self.min_calls;
            if !worth_taking {
                break;
            }
            accepted_time += group.exclusive_time;
            accepted.push(group);
        }

        Ok(accepted)
    }
}

impl RuleAction<InvocationTree, DiagnosisValue> for TimeWastingOperationsRule {
    fn execute(
        &self,
        tree: &InvocationTree,
        input: &RuleInput<'_, DiagnosisValue>,
    ) -> Result<RuleOutput<DiagnosisValue>> {
        let global_context = bound_invocation(input, &GLOBAL_CONTEXT)?;
        let baseline = input.number(BASELINE)?;
        ensure!(
            baseline >= 0.0,
            "baseline must not be negative, got {}",
            baseline
        );

        let operations = self.select(tree, global_context, baseline)?;
        tracing::debug!(
            %global_context,
            baseline,
            operations = operations.len(),
            "time-wasting operations ranked"
        );

        Ok(RuleOutput::multiple(
            operations.into_iter().map(DiagnosisValue::Aggregated).collect(),
        ))
    }
}
