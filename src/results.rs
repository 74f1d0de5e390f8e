//! Diagnosis results: problem occurrences, their identity, and result sinks
//!
//! A [`ProblemOccurrence`] is built once per fan-out branch that survives the
//! whole rule chain, and is never modified afterwards. Its identifier is
//! derived from content, so re-diagnosing the same trace yields the same key
//! and a store can upsert instead of duplicating.
//!
//! # Identity
//!
//! ```text
//! FNV-1a 64( root.method :: global.method :: context.method :: application :: business_tx )
//! ```
//!
//! The root cause and cause structure do not participate: two runs that
//! locate the problem in the same place describe the same problem.

use crate::aggregation::AggregatedInvocation;
use crate::invocation::{InvocationTree, MethodIdent, NodeId};
use fnv::FnvHashMap;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::hash::Hasher;

/// Repetition pattern of a root cause
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum CauseType {
    /// One slow invocation
    Single,
    /// The cause is reached again through its own call chain
    Recursive,
    /// Repeated sibling invocations under the same context
    Iterative,
}

impl fmt::Display for CauseType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            CauseType::Single => "SINGLE",
            CauseType::Recursive => "RECURSIVE",
            CauseType::Iterative => "ITERATIVE",
        };
        f.write_str(name)
    }
}

/// Classification of a root cause plus the number of raw invocations behind it
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CauseStructure {
    pub cause_type: CauseType,
    pub element_count: usize,
}

/// Detached view of one invocation of the diagnosed tree
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct InvocationRef {
    pub node: NodeId,
    pub method_ident: MethodIdent,
    pub duration: f64,
}

impl InvocationRef {
    /// Capture `id` from `tree`, or `None` if the arena has no such node
    pub fn of(tree: &InvocationTree, id: NodeId) -> Option<Self> {
        tree.get(id).map(|node| Self {
            node: id,
            method_ident: node.method_ident,
            duration: node.duration,
        })
    }
}

/// One diagnosed performance problem
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProblemOccurrence {
    pub application_ident: u64,
    pub business_transaction_ident: u64,
    pub request_root: InvocationRef,
    pub global_context: InvocationRef,
    pub problem_context: InvocationRef,
    pub root_cause: Option<AggregatedInvocation>,
    pub cause_structure: CauseStructure,
}

impl ProblemOccurrence {
    /// Content-derived identifier, stable across runs
    pub fn id(&self) -> u64 {
        let mut hasher = fnv::FnvHasher::default();

        hasher.write(&self.request_root.method_ident.0.to_le_bytes());
        hasher.write(b"::");
        hasher.write(&self.global_context.method_ident.0.to_le_bytes());
        hasher.write(b"::");
        hasher.write(&self.problem_context.method_ident.0.to_le_bytes());
        hasher.write(b"::");
        hasher.write(&self.application_ident.to_le_bytes());
        hasher.write(b"::");
        hasher.write(&self.business_transaction_ident.to_le_bytes());

        hasher.finish()
    }
}

/// Receives the occurrences of completed diagnosis runs
///
/// A run hands its occurrences over only after every rule succeeded, so a
/// sink never sees part of an aborted diagnosis.
pub trait ResultSink {
    fn accept(&mut self, occurrence: ProblemOccurrence);
}

impl ResultSink for Vec<ProblemOccurrence> {
    fn accept(&mut self, occurrence: ProblemOccurrence) {
        self.push(occurrence);
    }
}

/// Sink keyed by [`ProblemOccurrence::id`]; a repeated id replaces the stored record
#[derive(Debug, Default)]
pub struct DeduplicatingSink {
    occurrences: Vec<ProblemOccurrence>,
    positions: FnvHashMap<u64, usize>,
}

impl DeduplicatingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.occurrences.len()
    }

    pub fn is_empty(&self) -> bool {
        self.occurrences.is_empty()
    }

    pub fn get(&self, id: u64) -> Option<&ProblemOccurrence> {
        self.positions.get(&id).map(|&pos| &self.occurrences[pos])
    }

    /// Stored occurrences in first-accepted order
    pub fn iter(&self) -> impl Iterator<Item = &ProblemOccurrence> {
        self.occurrences.iter()
    }

    pub fn into_occurrences(self) -> Vec<ProblemOccurrence> {
        self.occurrences
    }
}

impl ResultSink for DeduplicatingSink {
    fn accept(&mut self, occurrence: ProblemOccurrence) {
        let id = occurrence.id();
        match self.positions.get(&id) {
            Some(&pos) => self.occurrences[pos] = occurrence,
            None => {
                self.positions.insert(id, self.occurrences.len());
                self.occurrences.push(occurrence);
            }
        }
    }
}
