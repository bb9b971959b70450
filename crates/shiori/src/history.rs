//! Per-attempt projection of the journal used for replay.

use shiori_core::{ExecutionId, Record, RecordKind, StepName, WorkflowError};
use std::collections::{HashMap, HashSet};
use tracing::warn;

/// What to do when one execution's history completes the same step twice.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DuplicateStepPolicy {
    /// Fail the attempt with [`WorkflowError::DuplicateStep`].
    #[default]
    Reject,
    /// Keep the later record and log a warning.
    LastWriteWins,
}

/// Map from step name to its `StepCompleted` record for one execution.
///
/// Built from a full journal read at the start of every execution attempt
/// and discarded when the attempt ends.
#[derive(Debug, Clone, Default)]
pub struct HistoryIndex {
    completed: HashMap<StepName, Record>,
    started: Vec<StepName>,
    workflow_started: bool,
    workflow_completed: bool,
}

impl HistoryIndex {
    /// Projects `records` for `execution_id`, skipping other executions.
    ///
    /// # Errors
    ///
    /// With [`DuplicateStepPolicy::Reject`], a second `StepCompleted` for the
    /// same step name fails with [`WorkflowError::DuplicateStep`].
    pub fn build(
        records: &[Record],
        execution_id: &ExecutionId,
        policy: DuplicateStepPolicy,
    ) -> Result<Self, WorkflowError> {
        let mut index = Self::default();

        for record in records.iter().filter(|r| r.belongs_to(execution_id)) {
            match record.kind {
                RecordKind::StepCompleted => index.insert_completed(record, policy)?,
                RecordKind::StepStarted => {
                    if let Some(name) = &record.step_name {
                        index.started.push(name.clone());
                    }
                }
                RecordKind::WorkflowStarted => index.workflow_started = true,
                RecordKind::WorkflowCompleted => index.workflow_completed = true,
                RecordKind::WorkflowFailed => {}
            }
        }

        Ok(index)
    }

    fn insert_completed(
        &mut self,
        record: &Record,
        policy: DuplicateStepPolicy,
    ) -> Result<(), WorkflowError> {
        let Some(name) = record.step_name.clone() else {
            warn!(
                "Ignoring StepCompleted record {} without a step name",
                record.sequence
            );
            return Ok(());
        };

        if let Some(previous) = self.completed.get(&name) {
            match policy {
                DuplicateStepPolicy::Reject => {
                    return Err(WorkflowError::DuplicateStep {
                        execution_id: record.execution_id.clone(),
                        step_name: name,
                    });
                }
                DuplicateStepPolicy::LastWriteWins => {
                    warn!(
                        "Step '{}' completed twice (records {} and {}), keeping the later one",
                        name, previous.sequence, record.sequence
                    );
                }
            }
        }
        self.completed.insert(name, record.clone());
        Ok(())
    }

    /// The completion record of `step_name`, if it is in history.
    pub fn get(&self, step_name: &str) -> Option<&Record> {
        self.completed.get(step_name)
    }

    /// Returns `true` if `step_name` completed in an earlier attempt.
    pub fn contains(&self, step_name: &str) -> bool {
        self.completed.contains_key(step_name)
    }

    /// Number of completed steps.
    pub fn len(&self) -> usize {
        self.completed.len()
    }

    /// Returns `true` if no step has completed yet.
    pub fn is_empty(&self) -> bool {
        self.completed.is_empty()
    }

    /// Names of all completed steps, in no particular order.
    pub fn step_names(&self) -> impl Iterator<Item = &StepName> {
        self.completed.keys()
    }

    /// Returns `true` if a `WorkflowStarted` record exists.
    pub fn workflow_started(&self) -> bool {
        self.workflow_started
    }

    /// Returns `true` if a `WorkflowCompleted` record exists.
    pub fn workflow_completed(&self) -> bool {
        self.workflow_completed
    }

    /// Steps that were started but never completed, in start order.
    ///
    /// These are steps whose thunk may have run before a crash or failure.
    pub fn interrupted_steps(&self) -> Vec<&StepName> {
        let mut seen = HashSet::new();
        self.started
            .iter()
            .filter(|name| !self.completed.contains_key(name.as_str()))
            .filter(|name| seen.insert(name.as_str()))
            .collect()
    }
}
