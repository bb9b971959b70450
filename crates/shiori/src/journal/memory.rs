//! In-memory journal.

use async_trait::async_trait;
use chrono::Utc;
use shiori_core::{Journal, JournalError, NewRecord, Record};
use tokio::sync::RwLock;

/// Thread-safe journal that keeps records in memory.
///
/// Records live as long as the journal; share it through an `Arc` to keep a
/// history across engine instances in one process.
#[derive(Debug, Default)]
pub struct MemoryJournal {
    state: RwLock<MemoryState>,
}

#[derive(Debug, Default)]
struct MemoryState {
    records: Vec<Record>,
    closed: bool,
}

impl MemoryJournal {
    /// Creates an empty journal.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored records.
    pub async fn len(&self) -> usize {
        self.state.read().await.records.len()
    }

    /// Returns `true` if nothing has been appended.
    pub async fn is_empty(&self) -> bool {
        self.state.read().await.records.is_empty()
    }
}

#[async_trait]
impl Journal for MemoryJournal {
    async fn append(&self, record: NewRecord) -> Result<u64, JournalError> {
        let mut state = self.state.write().await;
        if state.closed {
            return Err(JournalError::Closed);
        }
        let sequence = state.records.len() as u64 + 1;
        state.records.push(record.into_record(sequence, Utc::now()));
        Ok(sequence)
    }

    async fn read(&self) -> Result<Vec<Record>, JournalError> {
        let state = self.state.read().await;
        if state.closed {
            return Err(JournalError::Closed);
        }
        Ok(state.records.clone())
    }

    async fn close(&self) -> Result<(), JournalError> {
        self.state.write().await.closed = true;
        Ok(())
    }
}
