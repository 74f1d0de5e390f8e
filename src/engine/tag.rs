//! Tags, facts and the per-session fact store

use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::Arc;

/// Type key of a tag published into a session
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TagType(Cow<'static, str>);

impl TagType {
    pub const fn from_static(name: &'static str) -> Self {
        Self(Cow::Borrowed(name))
    }

    pub fn new(name: impl Into<String>) -> Self {
        Self(Cow::Owned(name.into()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TagType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&'static str> for TagType {
    fn from(name: &'static str) -> Self {
        Self::from_static(name)
    }
}

/// How many values one firing of a rule publishes under its output tag
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Quantity {
    /// At most one value
    Single,
    /// An ordered collection; downstream rules fire once per element
    Multiple,
}

/// Index of a fact in its session's [`FactStore`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FactId(pub usize);

/// Identifies the firing (or initial seeding) that published a fact
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub(crate) struct ProductionId(pub(crate) usize);

/// A tag value published into a session
///
/// Besides its value, every fact remembers which facts it was derived from:
/// for each production in its ancestry, the one fact of that production on
/// its branch. Facts produced by the same firing (siblings of a MULTIPLE
/// output) therefore have conflicting lineages.
#[derive(Debug, Clone)]
pub struct Fact<V> {
    id: FactId,
    tag: TagType,
    value: V,
    lineage: Arc<BTreeMap<ProductionId, FactId>>,
}

impl<V> Fact<V> {
    pub fn id(&self) -> FactId {
        self.id
    }

    pub fn tag(&self) -> &TagType {
        &self.tag
    }

    pub fn value(&self) -> &V {
        &self.value
    }

    /// Whether `other` is this fact or one of the facts it was derived from
    pub fn derives_from(&self, other: FactId) -> bool {
        self.lineage.values().any(|id| *id == other)
    }

    /// Whether both facts can be bound into the same firing
    ///
    /// Two facts conflict when they descend from different values published by
    /// the same production, i.e. they sit on different fan-out branches.
    pub fn is_compatible(&self, other: &Fact<V>) -> bool {
        self.lineage.iter().all(|(production, fact)| {
            other
                .lineage
                .get(production)
                .map_or(true, |theirs| theirs == fact)
        })
    }
}

/// All facts published during one session, in publication order
#[derive(Debug, Clone)]
pub struct FactStore<V> {
    facts: Vec<Fact<V>>,
    by_tag: HashMap<TagType, Vec<FactId>>,
}

impl<V> Default for FactStore<V> {
    fn default() -> Self {
        Self {
            facts: Vec::new(),
            by_tag: HashMap::new(),
        }
    }
}

impl<V> FactStore<V> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Publish a value derived from `parents`
    pub(crate) fn publish(
        &mut self,
        tag: TagType,
        value: V,
        production: ProductionId,
        parents: &[FactId],
    ) -> FactId {
        let id = FactId(self.facts.len());

        let mut lineage = BTreeMap::new();
        for parent in parents {
            lineage.extend(self.facts[parent.0].lineage.iter().map(|(p, f)| (*p, *f)));
        }
        lineage.insert(production, id);

        self.by_tag.entry(tag.clone()).or_default().push(id);
        self.facts.push(Fact {
            id,
            tag,
            value,
            lineage: Arc::new(lineage),
        });
        id
    }

    pub fn get(&self, id: FactId) -> Option<&Fact<V>> {
        self.facts.get(id.0)
    }

    pub fn len(&self) -> usize {
        self.facts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.facts.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Fact<V>> {
        self.facts.iter()
    }

    /// Ids of all facts published under `tag`, in publication order
    pub fn ids_of(&self, tag: &TagType) -> &[FactId] {
        self.by_tag.get(tag).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn of_tag<'a>(&'a self, tag: &TagType) -> impl Iterator<Item = &'a Fact<V>> + 'a {
        self.ids_of(tag).iter().map(move |id| &self.facts[id.0])
    }

    /// Values published under `tag`, in publication order
    pub fn values<'a>(&'a self, tag: &TagType) -> impl Iterator<Item = &'a V> + 'a {
        self.of_tag(tag).map(Fact::value)
    }

    pub fn contains_tag(&self, tag: &TagType) -> bool {
        !self.ids_of(tag).is_empty()
    }

    /// The fact tagged `tag` on the branch of `fact` (the fact itself included)
    pub fn ancestor(&self, fact: FactId, tag: &TagType) -> Option<&Fact<V>> {
        let fact = self.get(fact)?;
        fact.lineage
            .values()
            .filter_map(|id| self.get(*id))
            .find(|candidate| candidate.tag() == tag)
    }
}

impl<V: fmt::Debug> FactStore<V> {
    /// Human-readable dump of every fact, grouped by tag
    pub fn snapshot(&self) -> FactSnapshot {
        let mut tags: BTreeMap<TagType, Vec<String>> = BTreeMap::new();
        for fact in &self.facts {
            tags.entry(fact.tag.clone())
                .or_default()
                .push(format!("{:?}", fact.value));
        }
        FactSnapshot { tags }
    }
}

/// Facts of a session captured when it aborted
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FactSnapshot {
    pub tags: BTreeMap<TagType, Vec<String>>,
}

impl FactSnapshot {
    pub fn count(&self, tag: &TagType) -> usize {
        self.tags.get(tag).map_or(0, Vec::len)
    }
}

impl fmt::Display for FactSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.tags.is_empty() {
            return f.write_str("(no facts)");
        }
        for (i, (tag, values)) in self.tags.iter().enumerate() {
            if i > 0 {
                f.write_str("; ")?;
            }
            write!(f, "{} = [{}]", tag, values.join(", "))?;
        }
        Ok(())
    }
}
