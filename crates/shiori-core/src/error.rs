//! Journal and workflow error types.

use crate::record::ExecutionId;
use crate::step::StepName;
use thiserror::Error;

/// Boxed error returned by step thunks.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Errors raised by a [`Journal`](crate::Journal) backend.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum JournalError {
    /// The backing storage could not be read or written.
    #[error("Journal I/O failed: {0}")]
    Io(#[from] std::io::Error),

    /// A record could not be serialized for storage.
    #[error("Failed to encode journal record: {0}")]
    Encode(#[source] serde_json::Error),

    /// A stored record could not be parsed.
    #[error("Journal record at line {line} is corrupted: {source}")]
    Corrupted {
        /// 1-based line (or slot) of the bad record.
        line: usize,
        /// Parser error.
        #[source]
        source: serde_json::Error,
    },

    /// Stored sequence numbers are not gap-free and ascending.
    #[error("Journal record at line {line} has sequence {found}, expected {expected}")]
    OutOfOrder {
        /// 1-based line of the offending record.
        line: usize,
        /// Sequence the journal expected at this position.
        expected: u64,
        /// Sequence actually stored.
        found: u64,
    },

    /// The journal was closed.
    #[error("Journal is closed")]
    Closed,
}

/// Errors that can occur while executing a durable workflow.
///
/// Step-level failures are carried inside a [`StepResult`](crate::StepResult)
/// and only reach the engine's caller when the workflow propagates them.
///
/// This enum is `#[non_exhaustive]`; include a wildcard arm when matching:
///
/// ```
/// use shiori_core::WorkflowError;
///
/// fn describe(error: &WorkflowError) -> String {
///     match error {
///         WorkflowError::WorkflowNotFound(name) => format!("no workflow {name}"),
///         WorkflowError::StepError { step_name, .. } => format!("step {step_name} failed"),
///         WorkflowError::Journal(e) => format!("journal: {e}"),
///         other => other.to_string(),
///     }
/// }
/// ```
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum WorkflowError {
    /// No workflow is registered under this name.
    #[error("Workflow not found: {0}")]
    WorkflowNotFound(String),

    /// The journal failed to read or append.
    #[error("Journal error: {0}")]
    Journal(#[from] JournalError),

    /// A step thunk returned an error.
    #[error("Step failed: {step_name}, details: {source}")]
    StepError {
        /// The step whose thunk failed.
        step_name: StepName,
        /// The thunk's error.
        #[source]
        source: BoxError,
    },

    /// A step attempt exceeded its configured timeout.
    #[error("Timeout occurred in step: {step_name}")]
    Timeout {
        /// The step that timed out.
        step_name: StepName,
    },

    /// Step names must be non-empty.
    #[error("Invalid step name: {0:?}")]
    InvalidStepName(String),

    /// The same step name was completed (or requested) twice in one execution.
    ///
    /// This means the workflow is not deterministic.
    #[error("Duplicate step '{step_name}' in execution {execution_id}")]
    DuplicateStep {
        /// The execution whose history holds the duplicate.
        execution_id: ExecutionId,
        /// The repeated step name.
        step_name: StepName,
    },

    /// A step's return value could not be serialized.
    #[error("Failed to encode result of step '{step_name}': {source}")]
    Encode {
        /// The step whose value failed to encode.
        step_name: StepName,
        /// Serializer error.
        #[source]
        source: serde_json::Error,
    },

    /// A stored payload could not be decoded into the requested type.
    #[error("Failed to decode result of step '{step_name}': {source}")]
    Decode {
        /// The step whose payload failed to decode.
        step_name: StepName,
        /// Deserializer error.
        #[source]
        source: serde_json::Error,
    },

    /// The engine configuration is invalid.
    #[error("Invalid engine configuration: {0}")]
    Configuration(String),

    /// The workflow body failed for its own reasons.
    #[error("Workflow failed: {0}")]
    Failed(String),
}

impl WorkflowError {
    /// Wraps a thunk error for the given step.
    pub fn step(step_name: impl Into<StepName>, source: impl Into<BoxError>) -> Self {
        WorkflowError::StepError {
            step_name: step_name.into(),
            source: source.into(),
        }
    }

    /// Returns `true` if this error came from the journal.
    pub fn is_journal(&self) -> bool {
        matches!(self, WorkflowError::Journal(_))
    }
}
