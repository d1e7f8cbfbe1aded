use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use uuid::Uuid;

use crate::error::VesselError;

/// Persisted metadata document of one execution.
pub type Metadata = Map<String, Value>;

/// Metadata keys owned by the lifecycle engine
pub const CONTAINER_ID: &str = "container_id";
pub const CONTAINER_EXIT_CODE: &str = "container_exit_code";
pub const CONTAINER_FINAL_STATE: &str = "container_final_state";

/// Key of the error message inside a raw container state payload (Docker schema)
pub const FINAL_STATE_ERROR: &str = "Error";

/// Payload accepted when a new execution is created.
///
/// Everything in here is merged into the metadata document once and never
/// touched again. Unknown keys are ignored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionCreationData {
    pub commit: String,
    pub project: Uuid,
    pub inputs: Map<String, Value>,
    pub parameters: Map<String, Value>,
    pub environment_variables: Map<String, Value>,
    pub step: String,
    pub image: String,
    #[serde(default)]
    pub title: String,
    pub environment: Uuid,
}

impl ExecutionCreationData {
    /// Parse an untyped payload; a missing or mistyped field is a validation error.
    pub fn from_json(payload: Value) -> Result<Self, VesselError> {
        serde_json::from_value(payload).map_err(|e| VesselError::Validation(e.to_string()))
    }

    pub fn into_metadata(self) -> Result<Metadata, VesselError> {
        match serde_json::to_value(self) {
            Ok(Value::Object(map)) => Ok(map),
            Ok(other) => Err(VesselError::Validation(format!(
                "creation data serialized to a non-object: {}",
                other
            ))),
            Err(e) => Err(VesselError::Validation(e.to_string())),
        }
    }
}

/// Coarse status of an execution, always derived from metadata.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionStatus {
    Queued,
    Running,
    Complete,
    Error,
}

impl ExecutionStatus {
    /// Apply the status rules in order; the first match wins:
    /// 1. final state with a truthy `Error` => Error
    /// 2. exit code present => Complete if 0, otherwise Error
    /// 3. container id present => Running
    /// 4. otherwise Queued
    pub fn derive(metadata: &Metadata) -> Self {
        let final_state_error = metadata
            .get(CONTAINER_FINAL_STATE)
            .and_then(|state| state.get(FINAL_STATE_ERROR))
            .map(is_truthy)
            .unwrap_or(false);
        if final_state_error {
            return ExecutionStatus::Error;
        }

        match metadata.get(CONTAINER_EXIT_CODE) {
            Some(Value::Null) | None => {}
            Some(code) => {
                return if code.as_i64() == Some(0) {
                    ExecutionStatus::Complete
                } else {
                    ExecutionStatus::Error
                };
            }
        }

        if metadata.get(CONTAINER_ID).map(is_truthy).unwrap_or(false) {
            return ExecutionStatus::Running;
        }

        ExecutionStatus::Queued
    }
}

impl fmt::Display for ExecutionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExecutionStatus::Queued => write!(f, "queued"),
            ExecutionStatus::Running => write!(f, "running"),
            ExecutionStatus::Complete => write!(f, "complete"),
            ExecutionStatus::Error => write!(f, "error"),
        }
    }
}

/// Log artifacts captured once a container has terminated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Artifact {
    Stdout,
    Stderr,
    CombinedJson,
}

impl Artifact {
    pub const ALL: [Artifact; 3] = [Artifact::Stdout, Artifact::Stderr, Artifact::CombinedJson];

    pub fn file_name(&self) -> &'static str {
        match self {
            Artifact::Stdout => "stdout.log",
            Artifact::Stderr => "stderr.log",
            Artifact::CombinedJson => "log.json",
        }
    }
}

impl fmt::Display for Artifact {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.file_name())
    }
}

/// Loose truthiness over JSON values: null, false, 0, "", [] and {} are falsy.
pub fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().map(|f| f != 0.0).unwrap_or(true),
        Value::String(s) => !s.is_empty(),
        Value::Array(a) => !a.is_empty(),
        Value::Object(o) => !o.is_empty(),
    }
}
