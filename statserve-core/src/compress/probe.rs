use std::io::{self, Read, Seek, SeekFrom, Write};

use flate2::Compression;
use flate2::write::GzEncoder;

/// Bytes sampled from the head of a file to judge compressibility.
const PROBE_SAMPLE_LEN: usize = 4096;

/// Fraction a gzip-compressed sample must shrink to in order to be
/// judged worth compressing.
const DEFAULT_MIN_RATIO: f64 = 0.8;

/// Samples the first [`PROBE_SAMPLE_LEN`] bytes of `file`, gzip-encodes
/// the sample, and reports whether the compressed size beats
/// `min_ratio` of the raw sample size. Rewinds `file` back to the
/// start before returning, on every path including errors.
///
/// Any I/O failure during the probe is treated as "not compressible"
/// rather than propagated, since compressibility is only ever an
/// optimization decision.
pub fn is_compressible(file: &mut std::fs::File, min_ratio: f64) -> bool {
    let result = probe_inner(file, min_ratio);
    let _ = file.seek(SeekFrom::Start(0));
    result.unwrap_or(false)
}

pub fn is_compressible_default(file: &mut std::fs::File) -> bool {
    is_compressible(file, DEFAULT_MIN_RATIO)
}

fn probe_inner(file: &mut std::fs::File, min_ratio: f64) -> io::Result<bool> {
    file.seek(SeekFrom::Start(0))?;
    let mut buf = vec![0u8; PROBE_SAMPLE_LEN];
    let mut read_total = 0usize;
    loop {
        let n = file.read(&mut buf[read_total..])?;
        if n == 0 {
            break;
        }
        read_total += n;
        if read_total == buf.len() {
            break;
        }
    }
    buf.truncate(read_total);
    if buf.is_empty() {
        return Ok(false);
    }

    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(&buf)?;
    let compressed = encoder.finish()?;

    Ok((compressed.len() as f64) < (buf.len() as f64) * min_ratio)
}
