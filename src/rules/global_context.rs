//! Global context: the dominant branch directly below the request root

use super::{bound_invocation, node, DiagnosisRule, DiagnosisValue, GLOBAL_CONTEXT, INPUT};
use crate::engine::{Quantity, RuleAction, RuleDefinition, RuleInput, RuleOutput};
use crate::invocation::{InvocationTree, NodeId};
use anyhow::Result;

/// Picks the longest direct child of the request root
pub struct GlobalContextRule;

impl GlobalContextRule {
    pub fn definition(self) -> DiagnosisRule {
        RuleDefinition::new("GlobalContextRule", GLOBAL_CONTEXT, Quantity::Single, self)
            .requires_tag(INPUT)
    }
}

impl RuleAction<InvocationTree, DiagnosisValue> for GlobalContextRule {
    fn execute(
        &self,
        tree: &InvocationTree,
        input: &RuleInput<'_, DiagnosisValue>,
    ) -> Result<RuleOutput<DiagnosisValue>> {
        let root = bound_invocation(input, &INPUT)?;
        let global_context = select_global_context(tree, root)?;
        tracing::debug!(%root, %global_context, "global context selected");
        Ok(RuleOutput::single(DiagnosisValue::Invocation(global_context)))
    }
}

/// The direct child of `root` with the largest duration, or `root` itself
///
/// Only the first level is inspected. On equal durations the earlier child
/// stays selected.
pub fn select_global_context(tree: &InvocationTree, root: NodeId) -> Result<NodeId> {
    let mut selected: Option<(NodeId, f64)> = None;

    for &child in node(tree, root)?.children() {
        let duration = node(tree, child)?.duration;
        match selected {
            Some((_, longest)) if duration <= longest => {}
            _ => selected = Some((child, duration)),
        }
    }

    Ok(selected.map_or(root, |(child, _)| child))
}
