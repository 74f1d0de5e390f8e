//! Problem cause: the repeated call inside the problem context

use super::{
    bound_aggregated, bound_invocation, node, DiagnosisRule, DiagnosisValue, PROBLEM_CONTEXT,
    ROOT_CAUSE, TIME_WASTING_OPERATIONS,
};
use crate::aggregation::{aggregate_by_method, AggregatedInvocation};
use crate::engine::{Quantity, RuleAction, RuleDefinition, RuleInput, RuleOutput};
use crate::invocation::{InvocationTree, NodeId};
use anyhow::Result;

/// Aggregates the problem context's direct calls of the time-wasting method
pub struct ProblemCauseRule;

impl ProblemCauseRule {
    pub fn definition(self) -> DiagnosisRule {
        RuleDefinition::new("ProblemCauseRule", ROOT_CAUSE, Quantity::Single, self)
            .requires_tag(PROBLEM_CONTEXT)
            .requires_tag(TIME_WASTING_OPERATIONS)
    }
}

impl RuleAction<InvocationTree, DiagnosisValue> for ProblemCauseRule {
    fn execute(
        &self,
        tree: &InvocationTree,
        input: &RuleInput<'_, DiagnosisValue>,
    ) -> Result<RuleOutput<DiagnosisValue>> {
        let context = bound_invocation(input, &PROBLEM_CONTEXT)?;
        let operation = bound_aggregated(input, &TIME_WASTING_OPERATIONS)?;

        match find_root_cause(tree, context, operation)? {
            Some(cause) => {
                tracing::debug!(
                    %context,
                    method = %cause.method_ident,
                    calls = cause.size(),
                    "root cause found"
                );
                Ok(RuleOutput::single(DiagnosisValue::Aggregated(cause)))
            }
            None => {
                tracing::debug!(
                    %context,
                    method = %operation.method_ident,
                    "no root cause below context"
                );
                Ok(RuleOutput::nothing())
            }
        }
    }
}

/// Direct children of `context` with the operation's method identity and a
/// timer or SQL record, aggregated; `None` if there are none
pub fn find_root_cause(
    tree: &InvocationTree,
    context: NodeId,
    operation: &AggregatedInvocation,
) -> Result<Option<AggregatedInvocation>> {
    let mut matches = Vec::new();
    for &child in node(tree, context)?.children() {
        let child_node = node(tree, child)?;
        if child_node.method_ident == operation.method_ident && child_node.carries_timing_record()
        {
            matches.push(child);
        }
    }

    Ok(aggregate_by_method(tree, &matches).into_iter().next())
}
