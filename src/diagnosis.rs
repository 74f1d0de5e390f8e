//! Diagnosis engine: one rule session per request, assembled into problem occurrences
//!
//! The engine builds the execution plan of the diagnosis rule set once and
//! reuses it for every tree it diagnoses. A run seeds the session with the
//! request root, lets the rules fan out over the time-wasting operations, and
//! then turns every branch that reached a cause structure into a
//! [`ProblemOccurrence`]:
//!
//! ```text
//! CauseStructure fact
//!   └─ lineage ─► RootCause, ProblemContext, GlobalContext, Input
//! ```
//!
//! Occurrences are handed to the sink only once the whole session succeeded.

use crate::config::DiagnosisConfig;
use crate::engine::{
    EngineError, ExecutionPlan, FactId, FactStore, Session, SessionVariables, TagType,
};
use crate::invocation::{InvocationTree, NodeId, TreeError};
use crate::results::{InvocationRef, ProblemOccurrence, ResultSink};
use crate::rules::{
    diagnosis_rules, DiagnosisRule, DiagnosisValue, CAUSE_STRUCTURE, GLOBAL_CONTEXT, INPUT,
    PROBLEM_CONTEXT, ROOT_CAUSE,
};
use std::sync::Arc;
use thiserror::Error;

/// Errors of a diagnosis run
#[derive(Error, Debug)]
pub enum DiagnosisError {
    #[error(transparent)]
    Engine(#[from] EngineError),

    #[error(transparent)]
    Tree(#[from] TreeError),

    #[error("Diagnosis branch has no '{0}' value")]
    IncompleteBranch(TagType),

    #[error("Diagnosis worker stopped before reporting")]
    WorkerLost,
}

pub type Result<T> = std::result::Result<T, DiagnosisError>;

/// Runs the diagnosis rule set over call trees
#[derive(Debug, Clone)]
pub struct DiagnosisEngine {
    plan: Arc<ExecutionPlan<InvocationTree, DiagnosisValue>>,
    parallel_firings: usize,
}

impl DiagnosisEngine {
    /// Engine over the standard rule set
    pub fn new(config: &DiagnosisConfig) -> Result<Self> {
        Self::with_rules(diagnosis_rules(config), config.parallel_firings)
    }

    /// Engine over a custom rule table seeded with the [`INPUT`] tag
    pub fn with_rules(rules: Vec<DiagnosisRule>, parallel_firings: usize) -> Result<Self> {
        let plan = ExecutionPlan::build(rules, [INPUT])?;
        Ok(Self {
            plan: Arc::new(plan),
            parallel_firings: parallel_firings.max(1),
        })
    }

    pub fn plan(&self) -> &ExecutionPlan<InvocationTree, DiagnosisValue> {
        &self.plan
    }

    /// Diagnose the request rooted at `root`, handing occurrences to `sink`
    ///
    /// Returns the number of occurrences delivered. On error the sink is
    /// left untouched.
    pub fn diagnose<S>(
        &self,
        tree: &InvocationTree,
        root: NodeId,
        variables: &SessionVariables,
        sink: &mut S,
    ) -> Result<usize>
    where
        S: ResultSink + ?Sized,
    {
        if !tree.contains(root) {
            return Err(TreeError::UnknownNode(root, tree.len()).into());
        }

        let outcome = Session::new(&self.plan, variables.clone())
            .with_terminal_tag(CAUSE_STRUCTURE)
            .with_parallelism(self.parallel_firings)
            .run(tree, [(INPUT, DiagnosisValue::Invocation(root))])?;

        let facts = outcome.facts();
        let occurrences = facts
            .ids_of(&CAUSE_STRUCTURE)
            .iter()
            .map(|&fact| assemble(tree, facts, fact))
            .collect::<Result<Vec<_>>>()?;

        tracing::info!(
            %root,
            nodes = tree.len(),
            firings = outcome.firings(),
            occurrences = occurrences.len(),
            "diagnosis finished"
        );

        let delivered = occurrences.len();
        for occurrence in occurrences {
            sink.accept(occurrence);
        }
        Ok(delivered)
    }
}

/// Build the occurrence of the branch ending in the cause structure `fact`
fn assemble(
    tree: &InvocationTree,
    facts: &FactStore<DiagnosisValue>,
    fact: FactId,
) -> Result<ProblemOccurrence> {
    let value = |tag: &TagType| {
        facts
            .ancestor(fact, tag)
            .map(|f| f.value())
            .ok_or_else(|| DiagnosisError::IncompleteBranch(tag.clone()))
    };
    let invocation = |tag: &TagType| -> Result<InvocationRef> {
        let id = value(tag)?
            .as_invocation()
            .ok_or_else(|| DiagnosisError::IncompleteBranch(tag.clone()))?;
        InvocationRef::of(tree, id).ok_or_else(|| TreeError::UnknownNode(id, tree.len()).into())
    };

    let cause_structure = value(&CAUSE_STRUCTURE)?
        .as_cause_structure()
        .ok_or_else(|| DiagnosisError::IncompleteBranch(CAUSE_STRUCTURE))?;
    let root_cause = value(&ROOT_CAUSE)?.as_aggregated().cloned();

    Ok(ProblemOccurrence {
        application_ident: tree.application_ident,
        business_transaction_ident: tree.business_transaction_ident,
        request_root: invocation(&INPUT)?,
        global_context: invocation(&GLOBAL_CONTEXT)?,
        problem_context: invocation(&PROBLEM_CONTEXT)?,
        root_cause,
        cause_structure,
    })
}
