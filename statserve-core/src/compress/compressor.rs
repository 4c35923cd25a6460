use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use flate2::Compression;
use flate2::write::GzEncoder;

use crate::error::StaticFileError;
use crate::pathlock::PathLockRegistry;

use super::probe::is_compressible_default;

/// Ensures a gzip sidecar for `original` exists at `sidecar` and is not
/// stale, creating or recreating it as needed.
///
/// Serialized per `sidecar` path via `registry` so concurrent requests
/// for the same file never race to write the same tmp file. The heavy
/// lifting (probe, compress, rename) runs on the blocking thread pool
/// since it is synchronous filesystem and CPU work.
///
/// Returns `Ok(None)` when the original is judged not worth
/// compressing (the caller should fall back to serving it uncompressed
/// rather than treating this as an error).
pub async fn ensure_compressed(
    original: &Path,
    sidecar: &Path,
    registry: &PathLockRegistry,
) -> Result<Option<PathBuf>, StaticFileError> {
    let lock = registry.acquire(sidecar);
    let _guard = lock.lock().await;

    let original = original.to_path_buf();
    let sidecar = sidecar.to_path_buf();

    tokio::task::spawn_blocking(move || ensure_compressed_blocking(&original, &sidecar))
        .await
        .expect("compressor blocking task panicked")
}

fn ensure_compressed_blocking(
    original: &Path,
    sidecar: &Path,
) -> Result<Option<PathBuf>, StaticFileError> {
    let original_meta = fs::metadata(original)?;
    let original_mtime = original_meta.modified()?;

    if let Ok(sidecar_meta) = fs::metadata(sidecar) {
        let sidecar_mtime = sidecar_meta.modified()?;
        if mtimes_equal(sidecar_mtime, original_mtime) {
            return Ok(Some(sidecar.to_path_buf()));
        }
        // Stale: the original changed since this sidecar was built.
        fs::remove_file(sidecar)?;
    }

    let mut original_file = fs::File::open(original)?;
    if !is_compressible_default(&mut original_file) {
        return Ok(None);
    }

    let tmp_path = tmp_path_for(sidecar);
    let result = compress_to(&mut original_file, &tmp_path).and_then(|()| {
        set_mtime(&tmp_path, original_mtime)?;
        fs::rename(&tmp_path, sidecar)?;
        Ok(())
    });

    if let Err(err) = result {
        let _ = fs::remove_file(&tmp_path);
        if err.kind() == io::ErrorKind::PermissionDenied {
            return Err(StaticFileError::NoCreatePermission);
        }
        return Err(StaticFileError::Io(err));
    }

    Ok(Some(sidecar.to_path_buf()))
}

fn compress_to(source: &mut fs::File, tmp_path: &Path) -> io::Result<()> {
    let tmp_file = fs::OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(tmp_path)?;
    let mut encoder = GzEncoder::new(tmp_file, Compression::default());
    io::copy(source, &mut encoder)?;
    encoder.finish()?.flush()?;
    Ok(())
}

fn tmp_path_for(sidecar: &Path) -> PathBuf {
    let mut s = sidecar.as_os_str().to_owned();
    s.push(".tmp");
    PathBuf::from(s)
}

fn mtimes_equal(a: SystemTime, b: SystemTime) -> bool {
    // Some filesystems truncate sub-second precision on rename/set;
    // compare at one-second resolution to avoid spurious recompression.
    let secs = |t: SystemTime| {
        t.duration_since(SystemTime::UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0)
    };
    secs(a) == secs(b)
}

#[cfg(unix)]
fn set_mtime(path: &Path, mtime: SystemTime) -> io::Result<()> {
    use std::time::UNIX_EPOCH;
    use nix::sys::stat::{utimensat, UtimensatFlags};
    use nix::sys::time::TimeSpec;

    let secs = mtime
        .duration_since(UNIX_EPOCH)
        .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "mtime before epoch"))?
        .as_secs();
    let spec = TimeSpec::seconds(secs as i64);
    utimensat(None, path, &spec, &spec, UtimensatFlags::FollowSymlink)
        .map_err(|e| io::Error::from_raw_os_error(e as i32))
}

#[cfg(not(unix))]
fn set_mtime(_path: &Path, _mtime: SystemTime) -> io::Result<()> {
    Ok(())
}
