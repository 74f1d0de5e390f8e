//! Cause structure: single, recursive or iterative

use super::{
    bound_aggregated, bound_invocation, node, DiagnosisRule, DiagnosisValue, CAUSE_STRUCTURE,
    PROBLEM_CONTEXT, ROOT_CAUSE,
};
use crate::aggregation::AggregatedInvocation;
use crate::engine::{Quantity, RuleAction, RuleDefinition, RuleInput, RuleOutput};
use crate::invocation::{InvocationTree, NodeId};
use crate::results::{CauseStructure, CauseType};
use anyhow::Result;

/// Classifies how the root cause repeats
pub struct CauseStructureRule;

impl CauseStructureRule {
    pub fn definition(self) -> DiagnosisRule {
        RuleDefinition::new("CauseStructureRule", CAUSE_STRUCTURE, Quantity::Single, self)
            .requires_tag(ROOT_CAUSE)
            .requires_tag(PROBLEM_CONTEXT)
    }
}

impl RuleAction<InvocationTree, DiagnosisValue> for CauseStructureRule {
    fn execute(
        &self,
        tree: &InvocationTree,
        input: &RuleInput<'_, DiagnosisValue>,
    ) -> Result<RuleOutput<DiagnosisValue>> {
        let cause = bound_aggregated(input, &ROOT_CAUSE)?;
        let context = bound_invocation(input, &PROBLEM_CONTEXT)?;

        let structure = classify(tree, cause, context)?;
        tracing::debug!(
            cause_type = %structure.cause_type,
            elements = structure.element_count,
            "cause structure classified"
        );
        Ok(RuleOutput::single(DiagnosisValue::CauseStructure(structure)))
    }
}

/// Classify `cause` relative to the problem context
///
/// ```text
/// 1 element                                         SINGLE
/// >1 element, an ancestor of context has its method RECURSIVE
/// otherwise (including 0 elements)                  ITERATIVE
/// ```
pub fn classify(
    tree: &InvocationTree,
    cause: &AggregatedInvocation,
    context: NodeId,
) -> Result<CauseStructure> {
    node(tree, context)?;

    let element_count = cause.size();
    let cause_type = match element_count {
        1 => CauseType::Single,
        0 => CauseType::Iterative,
        _ => {
            let recursive = tree
                .ancestors(context)
                .any(|ancestor| tree[ancestor].method_ident == cause.method_ident);
            if recursive {
                CauseType::Recursive
            } else {
                CauseType::Iterative
            }
        }
    };

    Ok(CauseStructure {
        cause_type,
        element_count,
    })
}
