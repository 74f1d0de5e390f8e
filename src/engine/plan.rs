//! Execution planning: dependency graph and topological order of rules

use crate::engine::error::{EngineError, Result};
use crate::engine::{RuleDefinition, TagType};
use std::collections::{BTreeSet, HashMap, HashSet};

/// Rules in an order where every producer of a tag precedes its consumers
///
/// Built once from the rule table and shared read-only by every session.
///
/// # Algorithm
///
/// ```text
/// 1. Edge A → B for every tag B requires and A produces
/// 2. Kahn's algorithm; among ready rules the earliest registered goes first
/// 3. Rules left with unresolved predecessors form (or hang off) a cycle
/// ```
pub struct ExecutionPlan<C: ?Sized, V> {
    rules: Vec<RuleDefinition<C, V>>,
    input_tags: Vec<TagType>,
}

impl<C: ?Sized, V> std::fmt::Debug for ExecutionPlan<C, V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExecutionPlan")
            .field("order", &self.rule_names())
            .field("input_tags", &self.input_tags)
            .finish()
    }
}

impl<C: ?Sized, V> ExecutionPlan<C, V> {
    /// Validate the rule table and compute the execution order
    ///
    /// `input_tags` are the tags sessions are seeded with.
    ///
    /// # Errors
    ///
    /// - [`EngineError::DuplicateRule`] if two rules share a name
    /// - [`EngineError::UnsatisfiableTag`] if a required tag has no source
    /// - [`EngineError::CyclicDependency`] naming every rule that cannot be ordered
    pub fn build<I>(rules: Vec<RuleDefinition<C, V>>, input_tags: I) -> Result<Self>
    where
        I: IntoIterator<Item = TagType>,
    {
        let input_tags: Vec<TagType> = input_tags.into_iter().collect();

        let mut names = HashSet::new();
        for rule in &rules {
            if !names.insert(rule.name()) {
                return Err(EngineError::DuplicateRule(rule.name().to_string()));
            }
        }

        let mut producers: HashMap<&TagType, Vec<usize>> = HashMap::new();
        for (index, rule) in rules.iter().enumerate() {
            producers.entry(&rule.output().tag).or_default().push(index);
        }

        // successors[a] = rules that consume a tag produced by rule a
        let mut successors: Vec<BTreeSet<usize>> = vec![BTreeSet::new(); rules.len()];
        let mut in_degree = vec![0usize; rules.len()];
        for (consumer, rule) in rules.iter().enumerate() {
            for tag in rule.required_tags() {
                match producers.get(tag) {
                    Some(sources) => {
                        for &producer in sources {
                            if successors[producer].insert(consumer) {
                                in_degree[consumer] += 1;
                            }
                        }
                    }
                    None if input_tags.contains(tag) => {}
                    None => {
                        return Err(EngineError::UnsatisfiableTag {
                            rule: rule.name().to_string(),
                            tag: tag.clone(),
                        })
                    }
                }
            }
        }

        let mut ready: BTreeSet<usize> =
            (0..rules.len()).filter(|i| in_degree[*i] == 0).collect();
        let mut order = Vec::with_capacity(rules.len());
        while let Some(next) = ready.pop_first() {
            order.push(next);
            for &successor in &successors[next] {
                in_degree[successor] -= 1;
                if in_degree[successor] == 0 {
                    ready.insert(successor);
                }
            }
        }

        if order.len() < rules.len() {
            let stuck: Vec<bool> = in_degree.iter().map(|d| *d > 0).collect();
            let cyclic: Vec<String> = (0..rules.len())
                .filter(|&i| stuck[i] && on_cycle(i, &successors, &stuck))
                .map(|i| rules[i].name().to_string())
                .collect();
            return Err(EngineError::CyclicDependency { rules: cyclic });
        }

        let mut slots: Vec<Option<RuleDefinition<C, V>>> = rules.into_iter().map(Some).collect();
        let rules: Vec<RuleDefinition<C, V>> = order
            .into_iter()
            .filter_map(|index| slots[index].take())
            .collect();

        tracing::debug!(
            order = ?rules.iter().map(RuleDefinition::name).collect::<Vec<_>>(),
            "rule execution plan built"
        );

        Ok(Self { rules, input_tags })
    }

    /// Rules in execution order
    pub fn rules(&self) -> &[RuleDefinition<C, V>] {
        &self.rules
    }

    pub fn rule_names(&self) -> Vec<&str> {
        self.rules.iter().map(RuleDefinition::name).collect()
    }

    pub fn input_tags(&self) -> &[TagType] {
        &self.input_tags
    }

    /// Position of the named rule in the execution order
    pub fn position(&self, name: &str) -> Option<usize> {
        self.rules.iter().position(|rule| rule.name() == name)
    }

    /// Whether some rule publishes `tag`
    pub fn produces(&self, tag: &TagType) -> bool {
        self.rules.iter().any(|rule| &rule.output().tag == tag)
    }
}

/// Whether `start` can reach itself through stuck rules
fn on_cycle(start: usize, successors: &[BTreeSet<usize>], stuck: &[bool]) -> bool {
    let mut seen = vec![false; successors.len()];
    let mut pending: Vec<usize> = successors[start].iter().copied().collect();
    while let Some(next) = pending.pop() {
        if next == start {
            return true;
        }
        if !stuck[next] || seen[next] {
            continue;
        }
        seen[next] = true;
        pending.extend(successors[next].iter().copied());
    }
    false
}
