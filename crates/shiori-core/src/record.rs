//! Immutable journal records.

use crate::step::StepName;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifies one workflow execution within a shared journal.
///
/// # Examples
///
/// ```
/// use shiori_core::ExecutionId;
///
/// let id = ExecutionId::new("order-42");
/// assert_eq!(id.as_str(), "order-42");
///
/// let generated = ExecutionId::generate();
/// assert_ne!(generated, ExecutionId::generate());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ExecutionId(String);

impl ExecutionId {
    /// Creates an ExecutionId from an existing identifier.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Creates a random (UUID v4) ExecutionId.
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    /// Returns the identifier as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ExecutionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for ExecutionId {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for ExecutionId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl AsRef<str> for ExecutionId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// The kind of a journal record.
///
/// Only [`RecordKind::StepCompleted`] drives replay; the lifecycle kinds are
/// written when lifecycle recording is enabled on the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RecordKind {
    /// An execution attempt began for the first time.
    WorkflowStarted,
    /// A step's thunk is about to run.
    StepStarted,
    /// A step finished successfully; its payload is the memoized result.
    StepCompleted,
    /// The workflow function returned successfully.
    WorkflowCompleted,
    /// The workflow function returned an error.
    WorkflowFailed,
}

impl RecordKind {
    /// Returns `true` for kinds that carry a step name.
    pub fn is_step(&self) -> bool {
        matches!(self, Self::StepStarted | Self::StepCompleted)
    }

    /// Returns `true` for workflow terminal kinds.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::WorkflowCompleted | Self::WorkflowFailed)
    }

    /// Returns the kind's name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::WorkflowStarted => "WorkflowStarted",
            Self::StepStarted => "StepStarted",
            Self::StepCompleted => "StepCompleted",
            Self::WorkflowCompleted => "WorkflowCompleted",
            Self::WorkflowFailed => "WorkflowFailed",
        }
    }
}

impl fmt::Display for RecordKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A record as stored by a journal.
///
/// `sequence` and `timestamp` are assigned by the journal at append time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    /// 1-based, gap-free position in the journal.
    pub sequence: u64,
    /// Execution this record belongs to.
    pub execution_id: ExecutionId,
    /// Record kind.
    pub kind: RecordKind,
    /// Registered name of the workflow.
    pub workflow_name: String,
    /// Step name, present on step kinds only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub step_name: Option<StepName>,
    /// Serialized step result. Absent when the step returned no value.
    ///
    /// Stored inline as JSON, so it must hold a valid JSON document.
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        with = "embedded_json"
    )]
    pub payload: Option<Vec<u8>>,
    /// Failure message, present on `WorkflowFailed`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    /// Time the journal accepted the record. Not used for ordering.
    pub timestamp: DateTime<Utc>,
}

impl Record {
    /// Returns `true` if the record belongs to `execution_id`.
    pub fn belongs_to(&self, execution_id: &ExecutionId) -> bool {
        &self.execution_id == execution_id
    }
}

/// A record that has not been appended yet.
///
/// Use the per-kind constructors; the journal turns it into a [`Record`].
///
/// # Examples
///
/// ```
/// use shiori_core::{ExecutionId, NewRecord, RecordKind};
///
/// let draft = NewRecord::step_completed(
///     ExecutionId::new("exec-1"),
///     "Onboarding",
///     "ChargeCard",
///     Some(b"\"ch_1\"".to_vec()),
/// );
/// assert_eq!(draft.kind, RecordKind::StepCompleted);
///
/// let record = draft.into_record(1, chrono::Utc::now());
/// assert_eq!(record.sequence, 1);
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct NewRecord {
    /// Execution the record belongs to.
    pub execution_id: ExecutionId,
    /// Record kind.
    pub kind: RecordKind,
    /// Registered name of the workflow.
    pub workflow_name: String,
    /// Step name for step kinds.
    pub step_name: Option<StepName>,
    /// Serialized step result.
    pub payload: Option<Vec<u8>>,
    /// Failure message.
    pub error_message: Option<String>,
}

impl NewRecord {
    fn workflow(execution_id: ExecutionId, kind: RecordKind, workflow_name: String) -> Self {
        Self {
            execution_id,
            kind,
            workflow_name,
            step_name: None,
            payload: None,
            error_message: None,
        }
    }

    /// A `WorkflowStarted` record.
    pub fn workflow_started(execution_id: ExecutionId, workflow_name: impl Into<String>) -> Self {
        Self::workflow(execution_id, RecordKind::WorkflowStarted, workflow_name.into())
    }

    /// A `WorkflowCompleted` record.
    pub fn workflow_completed(
        execution_id: ExecutionId,
        workflow_name: impl Into<String>,
    ) -> Self {
        Self::workflow(
            execution_id,
            RecordKind::WorkflowCompleted,
            workflow_name.into(),
        )
    }

    /// A `WorkflowFailed` record carrying the failure message.
    pub fn workflow_failed(
        execution_id: ExecutionId,
        workflow_name: impl Into<String>,
        error_message: impl Into<String>,
    ) -> Self {
        Self {
            error_message: Some(error_message.into()),
            ..Self::workflow(execution_id, RecordKind::WorkflowFailed, workflow_name.into())
        }
    }

    /// A `StepStarted` record.
    pub fn step_started(
        execution_id: ExecutionId,
        workflow_name: impl Into<String>,
        step_name: impl Into<StepName>,
    ) -> Self {
        Self {
            step_name: Some(step_name.into()),
            ..Self::workflow(execution_id, RecordKind::StepStarted, workflow_name.into())
        }
    }

    /// A `StepCompleted` record with the step's serialized result.
    pub fn step_completed(
        execution_id: ExecutionId,
        workflow_name: impl Into<String>,
        step_name: impl Into<StepName>,
        payload: Option<Vec<u8>>,
    ) -> Self {
        Self {
            step_name: Some(step_name.into()),
            payload,
            ..Self::workflow(
                execution_id,
                RecordKind::StepCompleted,
                workflow_name.into(),
            )
        }
    }

    /// Stamps the draft with its journal position and time.
    pub fn into_record(self, sequence: u64, timestamp: DateTime<Utc>) -> Record {
        Record {
            sequence,
            execution_id: self.execution_id,
            kind: self.kind,
            workflow_name: self.workflow_name,
            step_name: self.step_name,
            payload: self.payload,
            error_message: self.error_message,
            timestamp,
        }
    }
}

/// Writes JSON payload bytes as an inline JSON value instead of a byte array.
mod embedded_json {
    use serde::de::Deserializer;
    use serde::ser::{Error as _, Serializer};
    use serde::Deserialize;
    use serde_json::value::RawValue;

    pub(super) fn serialize<S: Serializer>(
        payload: &Option<Vec<u8>>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        let Some(bytes) = payload else {
            return serializer.serialize_none();
        };
        let text = std::str::from_utf8(bytes).map_err(S::Error::custom)?;
        // Journal lines must stay single-line.
        let raw = if text.contains(['\n', '\r']) {
            let value: serde_json::Value =
                serde_json::from_str(text).map_err(S::Error::custom)?;
            let compact = serde_json::to_string(&value).map_err(S::Error::custom)?;
            RawValue::from_string(compact)
        } else {
            RawValue::from_string(text.to_owned())
        }
        .map_err(S::Error::custom)?;
        serializer.serialize_some(&raw)
    }

    pub(super) fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Option<Vec<u8>>, D::Error> {
        let raw = Option::<Box<RawValue>>::deserialize(deserializer)?;
        Ok(raw.map(|raw| raw.get().as_bytes().to_vec()))
    }
}
