use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use tokio::sync::Mutex as AsyncMutex;

/// A registry of per-path mutexes, created on demand and never removed.
///
/// Serializes the "check sidecar, compress, rename" critical section
/// in [`crate::compress::compressor`] across concurrent requests for
/// the same file, without forcing unrelated paths to contend with
/// each other.
#[derive(Default)]
pub struct PathLockRegistry {
    locks: Mutex<HashMap<PathBuf, Arc<AsyncMutex<()>>>>,
}

impl PathLockRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the mutex guarding `path`, creating it if this is the
    /// first request for that path.
    pub fn acquire(&self, path: &Path) -> Arc<AsyncMutex<()>> {
        let mut locks = self.locks.lock().expect("path lock registry poisoned");
        locks
            .entry(path.to_path_buf())
            .or_insert_with(|| Arc::new(AsyncMutex::new(())))
            .clone()
    }

    /// Number of distinct paths currently tracked. Exposed for tests
    /// and janitor diagnostics only.
    pub fn len(&self) -> usize {
        self.locks.lock().expect("path lock registry poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
