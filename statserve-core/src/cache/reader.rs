use std::io;
use std::os::unix::fs::FileExt;
use std::sync::Arc;

use super::entry::{EntryBody, FileEntry};
use super::store::Cache;

/// A window `[start, end)` a reader serves from, updated by
/// [`crate::range::ByteRangeParser`] output when a request carries a
/// `Range` header.
#[derive(Debug, Clone, Copy)]
struct Window {
    start: u64,
    end: u64,
    pos: u64,
}

impl Window {
    fn full(len: u64) -> Self {
        Window {
            start: 0,
            end: len,
            pos: 0,
        }
    }

    fn set(&mut self, start: u64, end_inclusive: u64) {
        self.start = start;
        self.end = end_inclusive + 1;
        self.pos = start;
    }

    fn remaining(&self) -> u64 {
        self.end.saturating_sub(self.pos)
    }
}

/// Pooled reader for files at or below [`super::entry::SMALL_FILE_THRESHOLD`],
/// and for synthesized directory indexes. Services reads with
/// positional `pread` so the shared file handle's cursor is never
/// mutated, letting many small readers share one `FileEntry` handle
/// concurrently.
pub struct SmallReader {
    entry: Arc<FileEntry>,
    cache: Arc<Cache>,
    window: Window,
}

impl SmallReader {
    pub(crate) fn new(entry: Arc<FileEntry>, cache: Arc<Cache>) -> Self {
        let len = entry.content_length;
        SmallReader {
            entry,
            cache,
            window: Window::full(len),
        }
    }

    pub fn update_byte_range(&mut self, start: u64, end_inclusive: u64) {
        self.window.set(start, end_inclusive);
    }

    pub fn remaining(&self) -> u64 {
        self.window.remaining()
    }

    pub async fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let remaining = self.window.remaining();
        if remaining == 0 {
            return Ok(0);
        }
        let want = (buf.len() as u64).min(remaining) as usize;
        let offset = self.window.pos;

        let n = match &self.entry.body {
            EntryBody::DirIndex(bytes) => {
                let start = offset as usize;
                let end = (start + want).min(bytes.len());
                let n = end - start;
                buf[..n].copy_from_slice(&bytes[start..end]);
                n
            }
            EntryBody::File(file) => {
                let n = file.read_at(&mut buf[..want], offset)?;
                n
            }
        };

        self.window.pos += n as u64;
        Ok(n)
    }

    pub async fn close(self) {
        self.cache.release_reader(&self.entry);
    }
}

/// Reader for files above [`super::entry::SMALL_FILE_THRESHOLD`]. Opens
/// an independent OS handle to the same path so its seek cursor never
/// races with other readers, and returns that handle to the entry's
/// pool on close for reuse by the next big-file request.
pub struct BigReader {
    entry: Arc<FileEntry>,
    cache: Arc<Cache>,
    handle: Option<std::fs::File>,
    window: Window,
}

impl BigReader {
    pub(crate) async fn new(entry: Arc<FileEntry>, cache: Arc<Cache>) -> io::Result<Self> {
        let len = entry.content_length;
        let handle = {
            let mut pool = entry.big_reader_pool.lock().await;
            pool.pop()
        };
        let handle = match handle {
            Some(h) => h,
            None => {
                let path = entry.path.clone();
                tokio::task::spawn_blocking(move || std::fs::File::open(path))
                    .await
                    .expect("open blocking task panicked")?
            }
        };
        Ok(BigReader {
            entry,
            cache,
            handle: Some(handle),
            window: Window::full(len),
        })
    }

    pub fn update_byte_range(&mut self, start: u64, end_inclusive: u64) {
        self.window.set(start, end_inclusive);
    }

    pub fn remaining(&self) -> u64 {
        self.window.remaining()
    }

    pub async fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let remaining = self.window.remaining();
        if remaining == 0 {
            return Ok(0);
        }
        let want = (buf.len() as u64).min(remaining) as usize;
        let offset = self.window.pos;
        let file = self
            .handle
            .as_ref()
            .expect("read after close on BigReader");
        let n = file.read_at(&mut buf[..want], offset)?;
        self.window.pos += n as u64;
        Ok(n)
    }

    /// Returns the raw file descriptor backing this reader, for
    /// callers that want to attempt a zero-copy `sendfile`/`splice`
    /// write directly from the kernel page cache to a socket.
    #[cfg(unix)]
    pub fn as_raw_fd(&self) -> Option<std::os::unix::io::RawFd> {
        use std::os::unix::io::AsRawFd;
        self.handle.as_ref().map(|f| f.as_raw_fd())
    }

    pub fn current_offset(&self) -> u64 {
        self.window.pos
    }

    pub fn advance(&mut self, n: u64) {
        self.window.pos += n;
    }

    pub async fn close(mut self) {
        if let Some(mut handle) = self.handle.take() {
            let rewound = tokio::task::spawn_blocking(move || {
                use std::io::{Seek, SeekFrom};
                let result = handle.seek(SeekFrom::Start(0));
                (handle, result)
            })
            .await
            .expect("seek blocking task panicked");
            let (handle, result) = rewound;
            if result.is_ok() {
                let mut pool = self.entry.big_reader_pool.lock().await;
                pool.push(handle);
            }
            // On seek failure the handle is simply dropped/closed.
        }
        self.cache.release_reader(&self.entry);
    }
}

/// Either reader shape, selected by [`super::entry::FileEntry::is_big`].
pub enum FileReader {
    Small(SmallReader),
    Big(BigReader),
}

impl FileReader {
    pub fn update_byte_range(&mut self, start: u64, end_inclusive: u64) {
        match self {
            FileReader::Small(r) => r.update_byte_range(start, end_inclusive),
            FileReader::Big(r) => r.update_byte_range(start, end_inclusive),
        }
    }

    pub fn remaining(&self) -> u64 {
        match self {
            FileReader::Small(r) => r.remaining(),
            FileReader::Big(r) => r.remaining(),
        }
    }

    pub async fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self {
            FileReader::Small(r) => r.read(buf).await,
            FileReader::Big(r) => r.read(buf).await,
        }
    }

    pub async fn close(self) {
        match self {
            FileReader::Small(r) => r.close().await,
            FileReader::Big(r) => r.close().await,
        }
    }
}
