// Diagnosis rule set
//
// Five rules turn one recorded request into problem occurrences:
//
//   Input ──► GlobalContextRule ──► GlobalContext
//                                       │  + baseline
//                                       ▼
//                      TimeWastingOperationsRule ──► TimeWastingOperations (MULTIPLE)
//                                                          │ one branch per operation
//                                                          ▼
//                                       ProblemContextRule ──► ProblemContext
//                                                          │
//                                       ProblemCauseRule ──► RootCause
//                                                          │
//                                       CauseStructureRule ──► CauseStructure
//
// Every rule reads the call tree as the session context and only publishes
// new values; the tree is never modified.

mod cause_structure;
mod global_context;
mod problem_cause;
mod problem_context;
mod time_wasting;

pub use cause_structure::{classify, CauseStructureRule};
pub use global_context::{select_global_context, GlobalContextRule};
pub use problem_cause::{find_root_cause, ProblemCauseRule};
pub use problem_context::{locate_problem_context, ProblemContextRule};
pub use time_wasting::TimeWastingOperationsRule;

use crate::aggregation::AggregatedInvocation;
use crate::config::DiagnosisConfig;
use crate::engine::{RuleDefinition, RuleInput, TagType};
use crate::invocation::{InvocationNode, InvocationTree, NodeId};
use crate::results::CauseStructure;
use anyhow::{anyhow, Result};

/// Request root handed to a session
pub const INPUT: TagType = TagType::from_static("Input");
pub const GLOBAL_CONTEXT: TagType = TagType::from_static("GlobalContext");
pub const TIME_WASTING_OPERATIONS: TagType = TagType::from_static("TimeWastingOperations");
pub const PROBLEM_CONTEXT: TagType = TagType::from_static("ProblemContext");
pub const ROOT_CAUSE: TagType = TagType::from_static("RootCause");
pub const CAUSE_STRUCTURE: TagType = TagType::from_static("CauseStructure");

/// Duration threshold read by the time-wasting rule
pub const BASELINE: &str = "baseline";

/// Value published under a diagnosis tag
#[derive(Debug, Clone, PartialEq)]
pub enum DiagnosisValue {
    Invocation(NodeId),
    Aggregated(AggregatedInvocation),
    CauseStructure(CauseStructure),
}

impl DiagnosisValue {
    pub fn as_invocation(&self) -> Option<NodeId> {
        match self {
            DiagnosisValue::Invocation(id) => Some(*id),
            _ => None,
        }
    }

    pub fn as_aggregated(&self) -> Option<&AggregatedInvocation> {
        match self {
            DiagnosisValue::Aggregated(aggregated) => Some(aggregated),
            _ => None,
        }
    }

    pub fn as_cause_structure(&self) -> Option<CauseStructure> {
        match self {
            DiagnosisValue::CauseStructure(structure) => Some(*structure),
            _ => None,
        }
    }
}

pub type DiagnosisRule = RuleDefinition<InvocationTree, DiagnosisValue>;

/// The diagnosis rule table, thresholds taken from `config`
pub fn diagnosis_rules(config: &DiagnosisConfig) -> Vec<DiagnosisRule> {
    vec![
        GlobalContextRule.definition(),
        TimeWastingOperationsRule::new(config.proportion, config.min_calls).definition(),
        ProblemContextRule::new(config.cluster_significance).definition(),
        ProblemCauseRule.definition(),
        CauseStructureRule.definition(),
    ]
}

pub(crate) fn bound_invocation(
    input: &RuleInput<'_, DiagnosisValue>,
    tag: &TagType,
) -> Result<NodeId> {
    input
        .require_tag(tag)?
        .as_invocation()
        .ok_or_else(|| anyhow!("tag '{}' does not hold an invocation", tag))
}

pub(crate) fn bound_aggregated<'a>(
    input: &RuleInput<'a, DiagnosisValue>,
    tag: &TagType,
) -> Result<&'a AggregatedInvocation> {
    input
        .require_tag(tag)?
        .as_aggregated()
        .ok_or_else(|| anyhow!("tag '{}' does not hold an aggregated invocation", tag))
}

pub(crate) fn node(tree: &InvocationTree, id: NodeId) -> Result<&InvocationNode> {
    tree.get(id)
        .ok_or_else(|| anyhow!("invocation {} is not part of the tree ({} nodes)", id, tree.len()))
}
