//! Rule descriptors and the values a rule sees while firing

use crate::engine::{Quantity, TagType};
use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

/// Scalar parameter supplied from outside for one session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum VariableValue {
    Flag(bool),
    Number(f64),
    Text(String),
}

impl VariableValue {
    pub fn as_number(&self) -> Option<f64> {
        match self {
            VariableValue::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_flag(&self) -> Option<bool> {
        match self {
            VariableValue::Flag(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            VariableValue::Text(s) => Some(s),
            _ => None,
        }
    }
}

impl From<f64> for VariableValue {
    fn from(value: f64) -> Self {
        VariableValue::Number(value)
    }
}

impl From<bool> for VariableValue {
    fn from(value: bool) -> Self {
        VariableValue::Flag(value)
    }
}

impl From<&str> for VariableValue {
    fn from(value: &str) -> Self {
        VariableValue::Text(value.to_string())
    }
}

impl fmt::Display for VariableValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VariableValue::Flag(b) => write!(f, "{}", b),
            VariableValue::Number(n) => write!(f, "{}", n),
            VariableValue::Text(s) => write!(f, "{:?}", s),
        }
    }
}

/// Named session variables, read-only while the session runs
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionVariables(BTreeMap<String, VariableValue>);

impl SessionVariables {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, name: impl Into<String>, value: impl Into<VariableValue>) -> Self {
        self.insert(name, value);
        self
    }

    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<VariableValue>) {
        self.0.insert(name.into(), value.into());
    }

    pub fn get(&self, name: &str) -> Option<&VariableValue> {
        self.0.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.0.contains_key(name)
    }
}

/// A session variable a rule reads
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VariableRequirement {
    pub name: String,
    /// Optional variables may be absent; mandatory ones fail the session
    pub optional: bool,
}

/// The tag a rule publishes and how many values per firing
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputTag {
    pub tag: TagType,
    pub quantity: Quantity,
}

/// What one firing of a rule publishes
#[derive(Debug, Clone, PartialEq)]
pub enum RuleOutput<V> {
    /// Zero or one value; `None` publishes nothing for this firing
    Single(Option<V>),
    /// Ordered values; an empty list publishes nothing
    Multiple(Vec<V>),
}

impl<V> RuleOutput<V> {
    pub fn single(value: V) -> Self {
        RuleOutput::Single(Some(value))
    }

    pub fn nothing() -> Self {
        RuleOutput::Single(None)
    }

    pub fn multiple(values: Vec<V>) -> Self {
        RuleOutput::Multiple(values)
    }

    pub fn quantity(&self) -> Quantity {
        match self {
            RuleOutput::Single(_) => Quantity::Single,
            RuleOutput::Multiple(_) => Quantity::Multiple,
        }
    }

    pub fn into_values(self) -> Vec<V> {
        match self {
            RuleOutput::Single(value) => value.into_iter().collect(),
            RuleOutput::Multiple(values) => values,
        }
    }
}

/// Bindings of one firing: one value per required tag, plus session variables
pub struct RuleInput<'a, V> {
    pub(crate) rule: &'a str,
    pub(crate) tags: Vec<(&'a TagType, &'a V)>,
    pub(crate) variables: &'a [(String, Option<VariableValue>)],
}

impl<'a, V> RuleInput<'a, V> {
    pub fn rule_name(&self) -> &str {
        self.rule
    }

    pub fn tag(&self, tag: &TagType) -> Option<&'a V> {
        self.tags
            .iter()
            .find(|(bound, _)| *bound == tag)
            .map(|(_, value)| *value)
    }

    /// Value bound for `tag`, or an error naming the rule
    pub fn require_tag(&self, tag: &TagType) -> Result<&'a V> {
        self.tag(tag)
            .ok_or_else(|| anyhow!("rule '{}' has no value bound for tag '{}'", self.rule, tag))
    }

    pub fn variable(&self, name: &str) -> Option<&VariableValue> {
        self.variables
            .iter()
            .find(|(declared, _)| declared == name)
            .and_then(|(_, value)| value.as_ref())
    }

    /// Numeric session variable, or an error if it is absent or not a number
    pub fn number(&self, name: &str) -> Result<f64> {
        let value = self.variable(name).ok_or_else(|| {
            anyhow!("rule '{}' has no session variable '{}'", self.rule, name)
        })?;
        value.as_number().ok_or_else(|| {
            anyhow!(
                "session variable '{}' must be a number, got {}",
                name,
                value
            )
        })
    }
}

/// The logic of a rule, independent of when it runs
///
/// `C` is the read-only context shared by all firings of a session, `V` the
/// value type of the session's facts.
pub trait RuleAction<C: ?Sized, V>: Send + Sync {
    fn execute(&self, ctx: &C, input: &RuleInput<'_, V>) -> Result<RuleOutput<V>>;
}

impl<C: ?Sized, V, F> RuleAction<C, V> for F
where
    F: Fn(&C, &RuleInput<'_, V>) -> Result<RuleOutput<V>> + Send + Sync,
{
    fn execute(&self, ctx: &C, input: &RuleInput<'_, V>) -> Result<RuleOutput<V>> {
        self(ctx, input)
    }
}

/// Descriptor of one rule: what it needs, what it produces, and its action
///
/// # Example
/// ```
/// use tracecause::engine::{Quantity, RuleDefinition, RuleInput, RuleOutput, TagType};
///
/// const NUMBER: TagType = TagType::from_static("Number");
/// const DOUBLED: TagType = TagType::from_static("Doubled");
///
/// let rule: RuleDefinition<(), i64> = RuleDefinition::new(
///     "DoubleRule",
///     DOUBLED,
///     Quantity::Single,
///     |_: &(), input: &RuleInput<'_, i64>| -> anyhow::Result<RuleOutput<i64>> {
///         Ok(RuleOutput::single(input.require_tag(&NUMBER)? * 2))
///     },
/// )
/// .requires_tag(NUMBER);
///
/// assert_eq!(rule.required_tags(), &[TagType::from_static("Number")]);
/// ```
pub struct RuleDefinition<C: ?Sized, V> {
    name: String,
    required_tags: Vec<TagType>,
    variables: Vec<VariableRequirement>,
    output: OutputTag,
    action: Arc<dyn RuleAction<C, V>>,
}

impl<C: ?Sized, V> Clone for RuleDefinition<C, V> {
    fn clone(&self) -> Self {
        Self {
            name: self.name.clone(),
            required_tags: self.required_tags.clone(),
            variables: self.variables.clone(),
            output: self.output.clone(),
            action: Arc::clone(&self.action),
        }
    }
}

impl<C: ?Sized, V> fmt::Debug for RuleDefinition<C, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RuleDefinition")
            .field("name", &self.name)
            .field("required_tags", &self.required_tags)
            .field("variables", &self.variables)
            .field("output", &self.output)
            .finish_non_exhaustive()
    }
}

impl<C: ?Sized, V> RuleDefinition<C, V> {
    pub fn new(
        name: impl Into<String>,
        output_tag: TagType,
        quantity: Quantity,
        action: impl RuleAction<C, V> + 'static,
    ) -> Self {
        Self {
            name: name.into(),
            required_tags: Vec::new(),
            variables: Vec::new(),
            output: OutputTag {
                tag: output_tag,
                quantity,
            },
            action: Arc::new(action),
        }
    }

    pub fn requires_tag(mut self, tag: TagType) -> Self {
        self.required_tags.push(tag);
        self
    }

    pub fn requires_variable(mut self, name: impl Into<String>) -> Self {
        self.variables.push(VariableRequirement {
            name: name.into(),
            optional: false,
        });
        self
    }

    pub fn optional_variable(mut self, name: impl Into<String>) -> Self {
        self.variables.push(VariableRequirement {
            name: name.into(),
            optional: true,
        });
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn required_tags(&self) -> &[TagType] {
        &self.required_tags
    }

    pub fn variables(&self) -> &[VariableRequirement] {
        &self.variables
    }

    pub fn output(&self) -> &OutputTag {
        &self.output
    }

    pub(crate) fn action(&self) -> &dyn RuleAction<C, V> {
        self.action.as_ref()
    }
}
