use serde::{Deserialize, Serialize};
use std::fmt;

/// Stable identity of the method (or operation) an invocation represents
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MethodIdent(pub u64);

impl fmt::Display for MethodIdent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "method#{}", self.0)
    }
}

/// Index of a node inside an [`InvocationTree`](super::InvocationTree) arena
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeId(pub usize);

impl NodeId {
    pub fn index(self) -> usize {
        self.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Aggregated timing measurements for one invocation
///
/// Durations are in milliseconds. Exclusive values describe the time spent in
/// the method itself, without the time attributed to nested invocations.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TimerData {
    /// Number of measurements behind the total values
    pub count: u64,
    /// Total (inclusive) duration
    pub duration: f64,
    pub min: f64,
    pub max: f64,

    /// Number of measurements behind the exclusive values
    ///
    /// Exclusive data is only meaningful when at least one measurement exists.
    pub exclusive_count: u64,
    /// Summed exclusive duration
    pub exclusive_duration: f64,
    pub exclusive_min: f64,
    pub exclusive_max: f64,
}

impl TimerData {
    /// Timer record holding a single measurement with the given exclusive time
    pub fn with_exclusive(duration: f64, exclusive_duration: f64) -> Self {
        Self {
            count: 1,
            duration,
            min: duration,
            max: duration,
            exclusive_count: 1,
            exclusive_duration,
            exclusive_min: exclusive_duration,
            exclusive_max: exclusive_duration,
        }
    }

    /// Whether the exclusive time fields carry at least one measurement
    pub fn is_exclusive_time_data_available(&self) -> bool {
        self.exclusive_count > 0
    }
}

/// Timer record specialized for a database statement
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct SqlStatementData {
    /// Statement text as captured by the agent
    #[serde(default)]
    pub sql: String,

    /// Whether the statement was executed as a prepared statement
    #[serde(default)]
    pub prepared: bool,

    /// Timing of the statement executions
    #[serde(default)]
    pub timer: TimerData,
}

impl SqlStatementData {
    pub fn new(sql: impl Into<String>, timer: TimerData) -> Self {
        Self {
            sql: sql.into(),
            prepared: false,
            timer,
        }
    }

    pub fn is_exclusive_time_data_available(&self) -> bool {
        self.timer.is_exclusive_time_data_available()
    }
}

/// One recorded invocation in the arena
#[derive(Debug, Clone, PartialEq)]
pub struct InvocationNode {
    pub method_ident: MethodIdent,

    /// Total elapsed time including all nested invocations
    pub duration: f64,

    pub timer: Option<TimerData>,
    pub sql: Option<SqlStatementData>,

    pub(crate) parent: Option<NodeId>,
    pub(crate) children: Vec<NodeId>,
}

impl InvocationNode {
    pub fn new(method_ident: MethodIdent, duration: f64) -> Self {
        Self {
            method_ident,
            duration,
            timer: None,
            sql: None,
            parent: None,
            children: Vec::new(),
        }
    }

    pub fn with_timer(mut self, timer: TimerData) -> Self {
        self.timer = Some(timer);
        self
    }

    pub fn with_sql(mut self, sql: SqlStatementData) -> Self {
        self.sql = Some(sql);
        self
    }

    pub fn parent(&self) -> Option<NodeId> {
        self.parent
    }

    /// Children in call order
    pub fn children(&self) -> &[NodeId] {
        &self.children
    }

    pub fn has_children(&self) -> bool {
        !self.children.is_empty()
    }

    /// Whether a timer or SQL statement record is attached, regardless of content
    pub fn carries_timing_record(&self) -> bool {
        self.timer.is_some() || self.sql.is_some()
    }

    /// The timer record that reports exclusive data for this node
    ///
    /// The plain timer wins; an SQL statement's timer is used when the plain
    /// timer is missing or has no exclusive measurements.
    pub fn effective_timer(&self) -> Option<&TimerData> {
        match (&self.timer, &self.sql) {
            (Some(timer), _) if timer.is_exclusive_time_data_available() => Some(timer),
            (_, Some(sql)) if sql.is_exclusive_time_data_available() => Some(&sql.timer),
            _ => None,
        }
    }

    pub fn is_exclusive_time_data_available(&self) -> bool {
        self.effective_timer().is_some()
    }
}
