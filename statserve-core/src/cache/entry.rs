use std::fs;
use std::path::PathBuf;
use std::sync::atomic::{AtomicI64, Ordering};
use std::time::{Instant, SystemTime};

use tokio::sync::Mutex as AsyncMutex;

/// Threshold above which a file is served through the [`crate::cache::reader::BigReader`]
/// strategy instead of the pooled positional [`crate::cache::reader::SmallReader`].
pub const SMALL_FILE_THRESHOLD: u64 = 2 * 1024 * 1024;

pub enum EntryBody {
    /// A real file on disk, opened once and shared by every reader.
    File(fs::File),
    /// A synthesized directory listing, held entirely in memory.
    DirIndex(Vec<u8>),
}

/// The atomic cacheable unit: an open file (or rendered directory
/// index), its metadata, and the bookkeeping needed to release it
/// safely once every in-flight reader has finished with it.
pub struct FileEntry {
    pub path: PathBuf,
    pub body: EntryBody,
    pub content_type: String,
    pub content_length: u64,
    pub compressed: bool,
    pub last_modified: SystemTime,
    pub last_modified_http: String,
    pub created_at: Instant,
    readers_count: AtomicI64,
    pub big_reader_pool: AsyncMutex<Vec<fs::File>>,
}

impl FileEntry {
    pub fn new(
        path: PathBuf,
        body: EntryBody,
        content_type: String,
        content_length: u64,
        compressed: bool,
        last_modified: SystemTime,
    ) -> Self {
        let last_modified_http = httpdate::fmt_http_date(last_modified);
        FileEntry {
            path,
            body,
            content_type,
            content_length,
            compressed,
            last_modified,
            last_modified_http,
            created_at: Instant::now(),
            readers_count: AtomicI64::new(0),
            big_reader_pool: AsyncMutex::new(Vec::new()),
        }
    }

    pub fn is_big(&self) -> bool {
        matches!(self.body, EntryBody::File(_)) && self.content_length > SMALL_FILE_THRESHOLD
    }

    pub fn readers_count(&self) -> i64 {
        self.readers_count.load(Ordering::SeqCst)
    }

    /// Must only be called while the owning cache's lock is held.
    pub(crate) fn inc_readers(&self) {
        self.readers_count.fetch_add(1, Ordering::SeqCst);
    }

    /// Must only be called while the owning cache's lock is held.
    pub(crate) fn dec_readers(&self) {
        let prev = self.readers_count.fetch_sub(1, Ordering::SeqCst);
        debug_assert!(prev > 0, "reader count decremented below zero");
    }
}

// FileEntry's handles close themselves on drop (`fs::File`'s `Drop`
// impl, and the `Vec<fs::File>` pool's element-wise drop). The
// two-phase "remove from map, release once readers drain" protocol
// described for this subsystem is therefore expressed directly
// through `Arc<FileEntry>` reference counting rather than a hand-rolled
// close: the janitor removes an entry from its cache map (dropping one
// `Arc` strong reference) and, once every reader has likewise dropped
// its clone, the last `Arc` drop physically closes the handle.
