use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::task::JoinHandle;

use super::entry::FileEntry;
use super::reader::{BigReader, FileReader, SmallReader};

type Map = Mutex<HashMap<PathBuf, Arc<FileEntry>>>;

/// Holds the plain and gzip-encoded variants of every cached file, and
/// drives the background janitor that evicts idle entries.
///
/// Two maps rather than one keyed by `(path, bool)` tuple mirrors the
/// spec's description of "two maps (plain, compressed)" directly and
/// keeps compressed/uncompressed lookups from contending on the same
/// shard.
pub struct Cache {
    plain: Map,
    gzip: Map,
    pending: Mutex<Vec<Arc<FileEntry>>>,
    cache_duration: Duration,
}

impl Cache {
    pub fn new(cache_duration: Duration) -> Arc<Self> {
        Arc::new(Cache {
            plain: Mutex::new(HashMap::new()),
            gzip: Mutex::new(HashMap::new()),
            pending: Mutex::new(Vec::new()),
            cache_duration,
        })
    }

    fn map_for(&self, compressed: bool) -> &Map {
        if compressed { &self.gzip } else { &self.plain }
    }

    /// Looks up `path` in the requested variant's map. On a hit,
    /// claims a reader slot and returns the shared entry.
    pub fn lookup(&self, path: &Path, compressed: bool) -> Option<Arc<FileEntry>> {
        let map = self.map_for(compressed).lock().expect("cache poisoned");
        let entry = map.get(path)?;
        entry.inc_readers();
        Some(entry.clone())
    }

    /// Inserts `entry` if no concurrent creator has already won the
    /// race for this path; otherwise discards it in favor of the
    /// winner. Either way, returns a reader-claimed handle to the
    /// entry now resident in the cache.
    pub fn insert_or_reuse(&self, path: PathBuf, compressed: bool, entry: Arc<FileEntry>) -> Arc<FileEntry> {
        let mut map = self.map_for(compressed).lock().expect("cache poisoned");
        let winner = map.entry(path).or_insert_with(|| entry.clone());
        winner.inc_readers();
        winner.clone()
    }

    /// Decrements the reader count claimed by `lookup`/`insert_or_reuse`.
    /// Safe to call even after the entry has been evicted from the map:
    /// the caller's own `Arc` keeps it alive until this returns.
    pub fn release_reader(&self, entry: &Arc<FileEntry>) {
        entry.dec_readers();
    }

    pub async fn small_reader(self: &Arc<Self>, entry: Arc<FileEntry>) -> SmallReader {
        SmallReader::new(entry, self.clone())
    }

    pub async fn big_reader(self: &Arc<Self>, entry: Arc<FileEntry>) -> std::io::Result<BigReader> {
        BigReader::new(entry, self.clone()).await
    }

    pub async fn reader_for(self: &Arc<Self>, entry: Arc<FileEntry>) -> std::io::Result<FileReader> {
        if entry.is_big() {
            Ok(FileReader::Big(self.big_reader(entry).await?))
        } else {
            Ok(FileReader::Small(self.small_reader(entry).await))
        }
    }

    /// Runs one janitor pass: evicts map entries older than
    /// `cache_duration`, and revisits the carryover `pending` list from
    /// previous passes. An entry with outstanding readers is kept
    /// pending rather than dropped, so eviction from the map never
    /// races with an in-flight reader's positional reads.
    ///
    /// Returns `(released, pending)` counts for diagnostics.
    pub fn sweep(&self) -> (usize, usize) {
        let now = std::time::Instant::now();
        let mut to_check: Vec<Arc<FileEntry>> = {
            let mut pending = self.pending.lock().expect("pending list poisoned");
            std::mem::take(&mut *pending)
        };

        for map in [&self.plain, &self.gzip] {
            let mut map = map.lock().expect("cache poisoned");
            map.retain(|_, entry| {
                let expired = now.duration_since(entry.created_at) > self.cache_duration;
                if expired {
                    to_check.push(entry.clone());
                }
                !expired
            });
        }

        let mut still_pending = Vec::new();
        let mut released = 0usize;
        for entry in to_check {
            if entry.readers_count() > 0 {
                still_pending.push(entry);
            } else {
                released += 1;
                drop(entry); // closes the handle if this was the last reference
            }
        }

        let pending_len = still_pending.len();
        *self.pending.lock().expect("pending list poisoned") = still_pending;
        (released, pending_len)
    }

    /// Spawns the cooperative background sweep loop, running every
    /// `cache_duration / 2` as described for the janitor.
    pub fn spawn_janitor(self: Arc<Self>) -> JoinHandle<()> {
        let interval = (self.cache_duration / 2).max(Duration::from_millis(50));
        tokio::spawn(async move {
            tracing::info!(?interval, "cache janitor started");
            let mut ticker = tokio::time::interval(interval);
            loop {
                ticker.tick().await;
                let (released, pending) = self.sweep();
                tracing::debug!(released, pending, "cache janitor sweep");
                if released > 0 {
                    tracing::info!(released, pending, "cache janitor released entries");
                }
            }
        })
    }
}
