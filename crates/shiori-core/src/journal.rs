//! The journal contract every storage backend implements.

use crate::error::JournalError;
use crate::record::{ExecutionId, NewRecord, Record};
use async_trait::async_trait;

/// Append-only, strictly ordered store of immutable records.
///
/// Implementations must serialize appends: concurrent callers never lose a
/// record or receive the same sequence. `read` returns a consistent snapshot
/// in sequence order and never observes a half-written record.
///
/// # Examples
///
/// A backend that forwards to another journal:
///
/// ```
/// use async_trait::async_trait;
/// use shiori_core::{Journal, JournalError, NewRecord, Record};
///
/// struct Counting<J> {
///     inner: J,
///     appends: std::sync::atomic::AtomicUsize,
/// }
///
/// #[async_trait]
/// impl<J: Journal> Journal for Counting<J> {
///     async fn append(&self, record: NewRecord) -> Result<u64, JournalError> {
///         self.appends.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
///         self.inner.append(record).await
///     }
///
///     async fn read(&self) -> Result<Vec<Record>, JournalError> {
///         self.inner.read().await
///     }
///
///     async fn close(&self) -> Result<(), JournalError> {
///         self.inner.close().await
///     }
/// }
/// ```
#[async_trait]
pub trait Journal: Send + Sync {
    /// Assigns the next sequence number, stamps the record and stores it.
    ///
    /// Returns once the record is visible to subsequent reads.
    async fn append(&self, record: NewRecord) -> Result<u64, JournalError>;

    /// Returns every record in sequence order.
    async fn read(&self) -> Result<Vec<Record>, JournalError>;

    /// Returns the records of one execution in sequence order.
    async fn read_execution(&self, execution_id: &ExecutionId) -> Result<Vec<Record>, JournalError> {
        let mut records = self.read().await?;
        records.retain(|record| record.belongs_to(execution_id));
        Ok(records)
    }

    /// Releases backend resources. Calling it twice is not an error.
    async fn close(&self) -> Result<(), JournalError>;
}
