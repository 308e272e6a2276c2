pub mod accessors;
pub mod collector;
pub mod compare;
pub mod producer;
pub mod store;
pub mod throttle;

use std::collections::BTreeMap;

pub use accessors::{TelemetryContext, Throttled};
pub use collector::collect_telemetry;
pub use store::{SessionStore, Store, StoreSubscription, TelemetryStore};
pub use throttle::{DEFAULT_THROTTLE, ManualScheduler, Scheduler, TimerHandle, TokioScheduler};

use serde::{Deserialize, Serialize};

/// The primitive kind carried by a telemetry variable.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ValueKind {
    Number,
    Bool,
}

/// Value sequence of one telemetry variable, e.g. one entry per car.
///
/// A sequence is homogeneous: every element is a number or every element is a boolean.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum TelemetryValues {
    Numbers(Vec<f64>),
    Bools(Vec<bool>),
}

impl Default for TelemetryValues {
    fn default() -> Self {
        TelemetryValues::Numbers(Vec::new())
    }
}

impl TelemetryValues {
    pub fn len(&self) -> usize {
        match self {
            TelemetryValues::Numbers(v) => v.len(),
            TelemetryValues::Bools(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn kind(&self) -> ValueKind {
        match self {
            TelemetryValues::Numbers(_) => ValueKind::Number,
            TelemetryValues::Bools(_) => ValueKind::Bool,
        }
    }

    /// Whether `other` has the same primitive kind and length.
    pub fn same_shape(&self, other: &TelemetryValues) -> bool {
        self.kind() == other.kind() && self.len() == other.len()
    }
}

impl From<Vec<f64>> for TelemetryValues {
    fn from(value: Vec<f64>) -> Self {
        TelemetryValues::Numbers(value)
    }
}

impl From<Vec<bool>> for TelemetryValues {
    fn from(value: Vec<bool>) -> Self {
        TelemetryValues::Bools(value)
    }
}

/// A named, typed telemetry variable as exposed by the simulator.
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct TelemetryVar {
    pub name: String,
    pub description: String,
    pub unit: String,
    pub value: TelemetryValues,
}

impl TelemetryVar {
    pub fn new(name: impl Into<String>, value: impl Into<TelemetryValues>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
            ..Default::default()
        }
    }
}

/// One complete telemetry snapshot, keyed by variable name.
///
/// Snapshots are replaced wholesale in the store and never patched in place.
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
#[serde(transparent)]
pub struct Telemetry {
    vars: BTreeMap<String, TelemetryVar>,
}

impl Telemetry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<&TelemetryVar> {
        self.vars.get(key)
    }

    pub fn insert(&mut self, var: TelemetryVar) -> Option<TelemetryVar> {
        self.vars.insert(var.name.clone(), var)
    }

    /// Builder-style insert, mostly useful when assembling snapshots by hand.
    pub fn with(mut self, key: &str, value: impl Into<TelemetryValues>) -> Self {
        self.insert(TelemetryVar::new(key, value));
        self
    }

    pub fn len(&self) -> usize {
        self.vars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vars.is_empty()
    }
}

/// Element types that can be read out of a [`TelemetryValues`] sequence.
pub trait TelemetryPrimitive: Clone + Send + Sync + std::fmt::Debug + 'static {
    /// Borrow the sequence if it holds elements of this kind.
    fn slice(values: &TelemetryValues) -> Option<&[Self]>;

    /// Exact equality, with no tolerance.
    fn same(&self, other: &Self) -> bool;
}

impl TelemetryPrimitive for f64 {
    fn slice(values: &TelemetryValues) -> Option<&[Self]> {
        match values {
            TelemetryValues::Numbers(v) => Some(v),
            TelemetryValues::Bools(_) => None,
        }
    }

    // Bitwise so that a NaN reading compares equal to itself.
    fn same(&self, other: &Self) -> bool {
        self.to_bits() == other.to_bits()
    }
}

impl TelemetryPrimitive for bool {
    fn slice(values: &TelemetryValues) -> Option<&[Self]> {
        match values {
            TelemetryValues::Bools(v) => Some(v),
            TelemetryValues::Numbers(_) => None,
        }
    }

    fn same(&self, other: &Self) -> bool {
        self == other
    }
}

/// Total laps for a session as reported in the session info document.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum SessionLaps {
    Laps(u32),
    /// Free-form values such as `"unlimited"`.
    Text(String),
}

impl SessionLaps {
    /// Empty text and zero laps carry no information.
    pub fn is_set(&self) -> bool {
        match self {
            SessionLaps::Laps(laps) => *laps > 0,
            SessionLaps::Text(text) => !text.is_empty(),
        }
    }

    pub fn laps(&self) -> Option<u32> {
        match self {
            SessionLaps::Laps(laps) => Some(*laps),
            SessionLaps::Text(_) => None,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "PascalCase")]
pub struct SessionEntry {
    pub session_num: i64,
    #[serde(default)]
    pub session_type: String,
    #[serde(default)]
    pub session_name: String,
    pub session_laps: SessionLaps,
}

/// Subset of the simulator's session info document.
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "PascalCase", default)]
pub struct SessionInfo {
    pub sessions: Vec<SessionEntry>,
}

impl SessionInfo {
    pub fn session_laps(&self, session_num: i64) -> Option<&SessionLaps> {
        self.sessions
            .iter()
            .find(|s| s.session_num == session_num)
            .map(|s| &s.session_laps)
    }
}

/// One record of a recorded session, stored as JSON lines.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub enum TelemetryOutput {
    Snapshot(Box<Telemetry>),
    SessionChange(Box<SessionInfo>),
}
