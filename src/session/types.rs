//! Values and identifiers exchanged with a session

use std::fmt;

use serde::{Deserialize, Serialize};

/// A typed scalar in a result row
///
/// Deserializes from plain JSON scalars: `null`, booleans, integers,
/// floats and strings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => f.write_str("NULL"),
            Value::Bool(b) => write!(f, "{}", b),
            Value::Int(i) => write!(f, "{}", i),
            Value::Float(v) => write!(f, "{}", v),
            Value::Text(s) => f.write_str(s),
        }
    }
}

/// One result row, values in column order
pub type Row = Vec<Value>;

/// Execution state reported by the engine
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OperationState {
    Pending,
    Initialized,
    Running,
    Finished,
    Exception,
    /// Any other terminal state, kept verbatim
    Other(String),
}

impl OperationState {
    /// Map an engine status string, e.g. `RUNNING_STATE`
    pub fn from_status(status: &str) -> Self {
        let trimmed = status.trim();
        let name = trimmed.strip_suffix("_STATE").unwrap_or(trimmed);
        match name.to_ascii_uppercase().as_str() {
            "PENDING" => OperationState::Pending,
            "INITIALIZED" => OperationState::Initialized,
            "RUNNING" => OperationState::Running,
            "FINISHED" => OperationState::Finished,
            "EXCEPTION" | "ERROR" => OperationState::Exception,
            _ => OperationState::Other(trimmed.to_string()),
        }
    }

    /// Still waiting for admission or planning
    pub fn is_not_started(&self) -> bool {
        matches!(self, OperationState::Pending | OperationState::Initialized)
    }

    /// Results can be fetched, or the operation reached another terminal state
    pub fn is_fetchable(&self) -> bool {
        !self.is_not_started() && *self != OperationState::Running
    }
}

impl fmt::Display for OperationState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OperationState::Pending => f.write_str("PENDING_STATE"),
            OperationState::Initialized => f.write_str("INITIALIZED_STATE"),
            OperationState::Running => f.write_str("RUNNING_STATE"),
            OperationState::Finished => f.write_str("FINISHED_STATE"),
            OperationState::Exception => f.write_str("EXCEPTION_STATE"),
            OperationState::Other(s) => f.write_str(s),
        }
    }
}

/// Engine handle for a submitted operation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct OperationHandle {
    pub hi: u64,
    pub lo: u64,
}

impl OperationHandle {
    pub fn new(hi: u64, lo: u64) -> Self {
        Self { hi, lo }
    }

    /// Query id the engine shows for this operation
    pub fn query_id(&self) -> QueryId {
        QueryId(format!("{:016x}:{:016x}", self.hi, self.lo))
    }
}

/// Human-readable query id, e.g. `d94b7b5e8a1c4f2d:8e6c10c500000000`
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct QueryId(String);

impl QueryId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Form usable in file names
    pub fn file_safe(&self) -> String {
        self.0.replace(':', "_")
    }
}

impl fmt::Display for QueryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
