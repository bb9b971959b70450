//! Journal backends.
//!
//! Both backends implement [`Journal`](shiori_core::Journal) and are
//! interchangeable behind an `Arc<dyn Journal>`.

mod file;
mod memory;

pub use file::FileJournal;
pub use memory::MemoryJournal;
