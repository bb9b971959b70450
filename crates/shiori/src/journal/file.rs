//! Append-only JSON-lines journal on disk.

use async_trait::async_trait;
use chrono::Utc;
use shiori_core::{Journal, JournalError, NewRecord, Record};
use std::path::{Path, PathBuf};
use tokio::fs::{File, OpenOptions};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::sync::Mutex;
use tracing::{debug, warn};

/// Journal that stores one JSON record per line in a file.
///
/// Every append is flushed and synced before it returns. Reopening the same
/// path continues the sequence where the file left off. A trailing line cut
/// short by a crash is discarded on open.
///
/// # Examples
///
/// ```no_run
/// use shiori::journal::FileJournal;
///
/// # #[tokio::main]
/// # async fn main() -> Result<(), shiori::JournalError> {
/// let journal = FileJournal::open("onboarding.journal").await?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct FileJournal {
    path: PathBuf,
    state: Mutex<FileState>,
}

#[derive(Debug)]
struct FileState {
    file: Option<File>,
    next_sequence: u64,
    len: u64,
}

struct Scan {
    records: Vec<Record>,
    complete_len: usize,
}

impl FileJournal {
    /// Opens (or creates) the journal at `path`.
    ///
    /// # Errors
    ///
    /// Fails if the file cannot be opened or holds a corrupted record.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self, JournalError> {
        let path = path.as_ref().to_path_buf();
        let mut file = OpenOptions::new()
            .read(true)
            .append(true)
            .create(true)
            .open(&path)
            .await?;

        let mut contents = Vec::new();
        file.read_to_end(&mut contents).await?;
        let scan = scan(&contents)?;

        if scan.complete_len < contents.len() {
            warn!(
                "Discarding {} bytes of unterminated record at the end of {}",
                contents.len() - scan.complete_len,
                path.display()
            );
            file.set_len(scan.complete_len as u64).await?;
            file.sync_data().await?;
        }

        debug!(
            "Opened journal {} with {} records",
            path.display(),
            scan.records.len()
        );
        Ok(Self {
            path,
            state: Mutex::new(FileState {
                file: Some(file),
                next_sequence: scan.records.len() as u64 + 1,
                len: scan.complete_len as u64,
            }),
        })
    }

    /// Path of the journal file.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl Journal for FileJournal {
    async fn append(&self, record: NewRecord) -> Result<u64, JournalError> {
        let mut guard = self.state.lock().await;
        let state = &mut *guard;
        let file = state.file.as_mut().ok_or(JournalError::Closed)?;

        let sequence = state.next_sequence;
        let record = record.into_record(sequence, Utc::now());
        let mut line = serde_json::to_vec(&record).map_err(JournalError::Encode)?;
        line.push(b'\n');

        if let Err(e) = write_line(file, &line).await {
            // Drop whatever part of the line reached the file.
            if let Err(truncate) = file.set_len(state.len).await {
                warn!(
                    "Failed to roll back partial append to {}, closing journal: {}",
                    self.path.display(),
                    truncate
                );
                state.file = None;
            }
            return Err(e.into());
        }

        state.next_sequence += 1;
        state.len += line.len() as u64;
        Ok(sequence)
    }

    async fn read(&self) -> Result<Vec<Record>, JournalError> {
        let state = self.state.lock().await;
        if state.file.is_none() {
            return Err(JournalError::Closed);
        }
        let contents = tokio::fs::read(&self.path).await?;
        Ok(scan(&contents)?.records)
    }

    async fn close(&self) -> Result<(), JournalError> {
        let mut state = self.state.lock().await;
        if let Some(mut file) = state.file.take() {
            file.flush().await?;
            debug!("Closed journal {}", self.path.display());
        }
        Ok(())
    }
}

async fn write_line(file: &mut File, line: &[u8]) -> std::io::Result<()> {
    file.write_all(line).await?;
    file.flush().await?;
    file.sync_data().await
}

/// Parses newline-terminated records, stopping before an unterminated tail.
fn scan(contents: &[u8]) -> Result<Scan, JournalError> {
    let mut records = Vec::new();
    let mut offset = 0;

    for (index, chunk) in contents.split_inclusive(|b| *b == b'\n').enumerate() {
        if chunk.last() != Some(&b'\n') {
            break;
        }
        offset += chunk.len();

        let line = &chunk[..chunk.len() - 1];
        if line.iter().all(u8::is_ascii_whitespace) {
            continue;
        }

        let record: Record = serde_json::from_slice(line).map_err(|source| {
            JournalError::Corrupted {
                line: index + 1,
                source,
            }
        })?;
        let expected = records.len() as u64 + 1;
        if record.sequence != expected {
            return Err(JournalError::OutOfOrder {
                line: index + 1,
                expected,
                found: record.sequence,
            });
        }
        records.push(record);
    }

    Ok(Scan {
        records,
        complete_len: offset,
    })
}
