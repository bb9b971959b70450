//! Core records, journal contract and step types for the shiori durable
//! execution engine.
//!
//! This crate has no runtime dependencies. Journal backend authors depend on
//! it to implement [`Journal`]; workflow authors usually depend on `shiori`.
//!
//! # Core Types
//!
//! - [`Record`] / [`NewRecord`] - Immutable journal entries and their drafts
//! - [`Journal`] - Append-only storage contract
//! - [`StepResult`] - Outcome of one durable step call
//! - [`StepOptions`] / [`RetryPolicy`] - Per-step retry and timeout settings
//! - [`WorkflowError`] / [`JournalError`] - Error types

pub mod codec;
mod error;
mod journal;
mod record;
mod result;
mod step;

pub use error::{BoxError, JournalError, WorkflowError};
pub use journal::Journal;
pub use record::{ExecutionId, NewRecord, Record, RecordKind};
pub use result::StepResult;
pub use step::{RetryPolicy, RetryPolicyError, StepName, StepOptions};
