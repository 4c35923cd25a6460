use std::fs;
use std::io::Read;
use std::path::Path;

use flate2::read::GzDecoder;

use crate::cache::{EntryBody, FileEntry};
use crate::error::StaticFileError;

/// Bytes of decoded content sniffed when extension-based MIME lookup
/// comes up empty.
const SNIFF_LEN: usize = 512;

/// Builds a [`FileEntry`] for an already-open file.
///
/// `logical_path` is used for extension-based MIME lookup and is the
/// *uncompressed* name (i.e. with any compression suffix stripped by
/// the caller), since a sidecar's own extension (`.gz`) is never a
/// useful MIME hint.
pub async fn build_file_entry(
    open_path: std::path::PathBuf,
    logical_path: std::path::PathBuf,
    compressed: bool,
) -> Result<FileEntry, StaticFileError> {
    tokio::task::spawn_blocking(move || build_file_entry_blocking(&open_path, &logical_path, compressed))
        .await
        .expect("fsopen blocking task panicked")
}

fn build_file_entry_blocking(
    open_path: &Path,
    logical_path: &Path,
    compressed: bool,
) -> Result<FileEntry, StaticFileError> {
    let file = fs::File::open(open_path)?;
    let meta = file.metadata()?;

    if meta.is_dir() {
        return Err(StaticFileError::DirectoryIndexRequired);
    }

    let content_length = meta.len();
    if content_length > i64::MAX as u64 {
        return Err(StaticFileError::Io(std::io::Error::new(
            std::io::ErrorKind::InvalidData,
            "file too large to represent as a response length",
        )));
    }

    let last_modified = meta.modified()?;
    let content_type = resolve_content_type(&file, logical_path, compressed)?;

    Ok(FileEntry::new(
        open_path.to_path_buf(),
        EntryBody::File(file),
        content_type,
        content_length,
        compressed,
        last_modified,
    ))
}

fn resolve_content_type(file: &fs::File, logical_path: &Path, compressed: bool) -> std::io::Result<String> {
    if let Some(mime) = mime_guess::from_path(logical_path).first() {
        return Ok(mime.essence_str().to_string());
    }

    let mut raw = vec![0u8; SNIFF_LEN];
    let mut file = file.try_clone()?;
    let n = if compressed {
        let mut decoder = GzDecoder::new(&mut file);
        read_best_effort(&mut decoder, &mut raw)
    } else {
        read_best_effort(&mut file, &mut raw)
    };
    raw.truncate(n);

    let content_type = if !content_inspector::inspect(&raw).is_binary() {
        "text/plain; charset=utf-8"
    } else {
        "application/octet-stream"
    };
    Ok(content_type.to_string())
}

fn read_best_effort<R: Read>(r: &mut R, buf: &mut [u8]) -> usize {
    let mut total = 0;
    while total < buf.len() {
        match r.read(&mut buf[total..]) {
            Ok(0) => break,
            Ok(n) => total += n,
            Err(_) => break,
        }
    }
    total
}
