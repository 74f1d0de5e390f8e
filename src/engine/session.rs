//! Rule sessions: one run of an execution plan over one set of initial facts

use crate::engine::error::{EngineError, Result};
use crate::engine::tag::ProductionId;
use crate::engine::{
    ExecutionPlan, FactId, FactStore, RuleDefinition, RuleInput, RuleOutput, SessionVariables,
    TagType, VariableValue,
};
use anyhow::anyhow;
use fnv::FnvHashMap;
use std::any::Any;
use std::fmt::Debug;
use std::panic::{self, AssertUnwindSafe};

type ResolvedVariables = Vec<(String, Option<VariableValue>)>;

/// One execution of a plan
///
/// A session resolves its variables once, seeds the initial facts, then walks
/// the plan in order. For every rule it enumerates the admissible bindings
/// (one compatible fact per required tag, cartesian over the candidates) and
/// fires the rule once per binding. Firings of one rule do not see each
/// other's output, so they may run concurrently.
pub struct Session<'p, C: ?Sized, V> {
    plan: &'p ExecutionPlan<C, V>,
    variables: SessionVariables,
    terminal_tag: Option<TagType>,
    parallelism: usize,
}

/// Facts left behind by a completed session
#[derive(Debug)]
pub struct SessionOutcome<V> {
    facts: FactStore<V>,
    firings: usize,
    terminated_early: bool,
}

impl<V> SessionOutcome<V> {
    pub fn facts(&self) -> &FactStore<V> {
        &self.facts
    }

    pub fn into_facts(self) -> FactStore<V> {
        self.facts
    }

    /// Number of rule firings that completed
    pub fn firings(&self) -> usize {
        self.firings
    }

    /// Whether the run stopped because the terminal tag was published
    pub fn terminated_early(&self) -> bool {
        self.terminated_early
    }

    pub fn values<'a>(&'a self, tag: &TagType) -> impl Iterator<Item = &'a V> + 'a {
        self.facts.values(tag)
    }
}

impl<'p, C, V> Session<'p, C, V>
where
    C: Sync + ?Sized,
    V: Debug + Send + Sync,
{
    pub fn new(plan: &'p ExecutionPlan<C, V>, variables: SessionVariables) -> Self {
        Self {
            plan,
            variables,
            terminal_tag: None,
            parallelism: 1,
        }
    }

    /// Stop the run once a rule has published a value under `tag`
    pub fn with_terminal_tag(mut self, tag: TagType) -> Self {
        self.terminal_tag = Some(tag);
        self
    }

    /// Maximum number of concurrent firings of one rule
    pub fn with_parallelism(mut self, parallelism: usize) -> Self {
        self.parallelism = parallelism.max(1);
        self
    }

    /// Run the plan over `ctx`, seeded with `initial_facts`
    ///
    /// # Errors
    ///
    /// - [`EngineError::MissingSessionVariable`] before any rule fires
    /// - [`EngineError::RuleFault`] when an action fails or panics; the session
    ///   is abandoned and no facts are returned
    /// - [`EngineError::OutputMismatch`] when an action returns the wrong quantity
    pub fn run<I>(&self, ctx: &C, initial_facts: I) -> Result<SessionOutcome<V>>
    where
        I: IntoIterator<Item = (TagType, V)>,
    {
        let resolved = self.resolve_variables()?;

        let mut store = FactStore::new();
        // seeds of one tag form a single production, like one MULTIPLE output
        let mut next_production = 0usize;
        let mut seed_productions: FnvHashMap<TagType, ProductionId> = FnvHashMap::default();
        for (tag, value) in initial_facts {
            let production = *seed_productions.entry(tag.clone()).or_insert_with(|| {
                next_production += 1;
                ProductionId(next_production - 1)
            });
            store.publish(tag, value, production, &[]);
        }

        let mut firings = 0usize;
        let mut terminated_early = self.terminal_reached(&store);

        if !terminated_early {
            for (rule, variables) in self.plan.rules().iter().zip(&resolved) {
                let bindings = bindings_for(rule, &store);
                if bindings.is_empty() {
                    tracing::debug!(rule = rule.name(), "no applicable input, rule skipped");
                    continue;
                }

                tracing::debug!(rule = rule.name(), firings = bindings.len(), "firing rule");
                let results = self.execute(rule, variables, ctx, &store, &bindings);

                for (binding, result) in bindings.iter().zip(results) {
                    let output = result.map_err(|source| {
                        tracing::warn!(rule = rule.name(), "rule fault, session aborted");
                        EngineError::RuleFault {
                            rule: rule.name().to_string(),
                            snapshot: store.snapshot(),
                            source,
                        }
                    })?;

                    let declared = rule.output().quantity;
                    if output.quantity() != declared {
                        return Err(EngineError::OutputMismatch {
                            rule: rule.name().to_string(),
                            declared,
                            returned: output.quantity(),
                        });
                    }

                    let production = ProductionId(next_production);
                    next_production += 1;
                    for value in output.into_values() {
                        store.publish(rule.output().tag.clone(), value, production, binding);
                    }
                    firings += 1;
                }

                if self.terminal_reached(&store) {
                    tracing::debug!(rule = rule.name(), "terminal tag published, stopping");
                    terminated_early = true;
                    break;
                }
            }
        }

        tracing::info!(
            facts = store.len(),
            firings,
            terminated_early,
            "session completed"
        );

        Ok(SessionOutcome {
            facts: store,
            firings,
            terminated_early,
        })
    }

    fn terminal_reached(&self, store: &FactStore<V>) -> bool {
        self.terminal_tag
            .as_ref()
            .is_some_and(|tag| store.contains_tag(tag))
    }

    /// Look up every declared variable once; mandatory ones must be present
    fn resolve_variables(&self) -> Result<Vec<ResolvedVariables>> {
        self.plan
            .rules()
            .iter()
            .map(|rule| {
                rule.variables()
                    .iter()
                    .map(|requirement| {
                        let value = self.variables.get(&requirement.name).cloned();
                        if value.is_none() && !requirement.optional {
                            return Err(EngineError::MissingSessionVariable {
                                rule: rule.name().to_string(),
                                variable: requirement.name.clone(),
                            });
                        }
                        Ok((requirement.name.clone(), value))
                    })
                    .collect()
            })
            .collect()
    }

    /// Fire `rule` once per binding, results in binding order
    fn execute(
        &self,
        rule: &RuleDefinition<C, V>,
        variables: &[(String, Option<VariableValue>)],
        ctx: &C,
        store: &FactStore<V>,
        bindings: &[Vec<FactId>],
    ) -> Vec<anyhow::Result<RuleOutput<V>>> {
        if self.parallelism <= 1 || bindings.len() <= 1 {
            return bindings
                .iter()
                .map(|binding| fire(rule, variables, ctx, store, binding))
                .collect();
        }

        let chunk_size = bindings.len().div_ceil(self.parallelism);
        let scoped = crossbeam::thread::scope(|scope| {
            let handles: Vec<_> = bindings
                .chunks(chunk_size)
                .map(|chunk| {
                    let handle = scope.spawn(move |_| {
                        chunk
                            .iter()
                            .map(|binding| fire(rule, variables, ctx, store, binding))
                            .collect::<Vec<_>>()
                    });
                    (chunk.len(), handle)
                })
                .collect();

            handles
                .into_iter()
                .flat_map(|(len, handle)| {
                    handle.join().unwrap_or_else(|_| {
                        (0..len)
                            .map(|_| Err(anyhow!("firing worker thread panicked")))
                            .collect()
                    })
                })
                .collect::<Vec<_>>()
        });

        scoped.unwrap_or_else(|_| {
            bindings
                .iter()
                .map(|_| Err(anyhow!("firing worker scope panicked")))
                .collect()
        })
    }
}

/// Every admissible binding for `rule`: one fact per required tag, all
/// pairwise compatible. A rule without required tags fires exactly once.
fn bindings_for<C: ?Sized, V>(rule: &RuleDefinition<C, V>, store: &FactStore<V>) -> Vec<Vec<FactId>> {
    let mut combos: Vec<Vec<FactId>> = vec![Vec::new()];

    for tag in rule.required_tags() {
        let candidates = store.ids_of(tag);
        let mut extended = Vec::with_capacity(combos.len() * candidates.len());

        for combo in &combos {
            for &candidate in candidates {
                let Some(fact) = store.get(candidate) else {
                    continue;
                };
                let compatible = combo.iter().all(|bound| {
                    store
                        .get(*bound)
                        .is_some_and(|bound| bound.is_compatible(fact))
                });
                if compatible {
                    let mut next = combo.clone();
                    next.push(candidate);
                    extended.push(next);
                }
            }
        }

        combos = extended;
        if combos.is_empty() {
            break;
        }
    }

    combos
}

fn fire<C: ?Sized, V>(
    rule: &RuleDefinition<C, V>,
    variables: &[(String, Option<VariableValue>)],
    ctx: &C,
    store: &FactStore<V>,
    binding: &[FactId],
) -> anyhow::Result<RuleOutput<V>> {
    let mut tags = Vec::with_capacity(binding.len());
    for (tag, id) in rule.required_tags().iter().zip(binding) {
        let fact = store
            .get(*id)
            .ok_or_else(|| anyhow!("bound fact {:?} is not in the session", id))?;
        tags.push((tag, fact.value()));
    }

    let input = RuleInput {
        rule: rule.name(),
        tags,
        variables,
    };

    match panic::catch_unwind(AssertUnwindSafe(|| rule.action().execute(ctx, &input))) {
        Ok(result) => result,
        Err(payload) => Err(anyhow!(
            "rule action panicked: {}",
            panic_message(payload.as_ref())
        )),
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic payload".to_string()
    }
}
