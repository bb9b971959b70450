//! The outcome of one `step` call.

use crate::codec::decode_payload;
use crate::error::WorkflowError;
use crate::step::StepName;
use serde::de::DeserializeOwned;

/// Read-only, single-use view over the outcome of one step call.
///
/// A successful step holds its payload (absent for steps that returned no
/// value). A failed step holds the error and leaves history untouched.
///
/// # Examples
///
/// ```
/// use shiori_core::{StepName, StepResult};
///
/// let result = StepResult::completed(StepName::new("A"), Some(b"\"x\"".to_vec()));
/// assert!(result.err().is_none());
/// assert_eq!(result.result::<String>().unwrap(), Some("x".to_string()));
/// ```
#[derive(Debug)]
pub struct StepResult {
    step_name: StepName,
    outcome: Result<Option<Vec<u8>>, WorkflowError>,
    replayed: bool,
}

impl StepResult {
    /// A step that ran and was recorded.
    pub fn completed(step_name: StepName, payload: Option<Vec<u8>>) -> Self {
        Self {
            step_name,
            outcome: Ok(payload),
            replayed: false,
        }
    }

    /// A step whose outcome was taken from history.
    pub fn replayed(step_name: StepName, payload: Option<Vec<u8>>) -> Self {
        Self {
            step_name,
            outcome: Ok(payload),
            replayed: true,
        }
    }

    /// A step that did not complete.
    pub fn failed(step_name: StepName, error: WorkflowError) -> Self {
        Self {
            step_name,
            outcome: Err(error),
            replayed: false,
        }
    }

    /// The step's name.
    pub fn step_name(&self) -> &StepName {
        &self.step_name
    }

    /// The failure, if the step did not complete.
    pub fn err(&self) -> Option<&WorkflowError> {
        self.outcome.as_ref().err()
    }

    /// Raw payload bytes of a completed step.
    pub fn payload(&self) -> Option<&[u8]> {
        match &self.outcome {
            Ok(Some(bytes)) => Some(bytes),
            _ => None,
        }
    }

    /// Returns `true` if the outcome came from history and the thunk did not run.
    pub fn is_replayed(&self) -> bool {
        self.replayed
    }

    /// Consumes the result, keeping only the failure.
    pub fn check(self) -> Result<(), WorkflowError> {
        self.outcome.map(|_| ())
    }

    /// Decodes the step's value.
    ///
    /// Returns the step's failure if it failed, `Ok(None)` if it produced no
    /// value, and [`WorkflowError::Decode`] if the payload does not fit `T`.
    pub fn result<T: DeserializeOwned>(self) -> Result<Option<T>, WorkflowError> {
        match self.outcome? {
            None => Ok(None),
            Some(bytes) => decode_payload(&bytes)
                .map(Some)
                .map_err(|source| WorkflowError::Decode {
                    step_name: self.step_name,
                    source,
                }),
        }
    }

    /// Decodes the step's value into `target`.
    ///
    /// `target` is left untouched when the step failed, produced no value, or
    /// its payload does not decode.
    pub fn result_into<T: DeserializeOwned>(self, target: &mut T) -> Result<(), WorkflowError> {
        if let Some(value) = self.result()? {
            *target = value;
        }
        Ok(())
    }
}
