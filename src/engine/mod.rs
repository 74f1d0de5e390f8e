// Tag Engine: dependency-driven rule scheduling
//
// Rules declare the tags they consume, the session variables they read and the
// single tag they publish. The engine derives the execution order from those
// declarations once (ExecutionPlan) and then runs any number of independent
// sessions over it.
//
//   rule table ──► ExecutionPlan::build ──► ordered rules (shared, read-only)
//                                                │
//   initial facts + variables ──► Session::run ──┴──► SessionOutcome (FactStore)
//
// MULTIPLE outputs fan out: a downstream rule fires once per published value,
// and cartesian across independent MULTIPLE tags. Facts remember the values
// they were derived from, so one firing never binds facts from two sibling
// branches of the same fan-out.

mod error;
mod plan;
mod rule;
mod session;
mod tag;

pub use error::{EngineError, Result};
pub use plan::ExecutionPlan;
pub use rule::{
    OutputTag, RuleAction, RuleDefinition, RuleInput, RuleOutput, SessionVariables,
    VariableRequirement, VariableValue,
};
pub use session::{Session, SessionOutcome};
pub use tag::{Fact, FactId, FactSnapshot, FactStore, Quantity, TagType};

#[cfg(test)]
mod tests;
