use crate::error::RangeError;

/// An inclusive byte range resolved against a known content length.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ByteRange {
    pub start: u64,
    pub end: u64,
}

impl ByteRange {
    /// Number of bytes covered by this range.
    pub fn len(&self) -> u64 {
        self.end - self.start + 1
    }

    pub fn is_empty(&self) -> bool {
        false
    }
}

/// Parses a `Range` header value against a known content length.
///
/// Only the single-range `bytes=` grammar is supported; multi-range
/// requests (`bytes=0-10,20-30`) are rejected as malformed since this
/// crate never emits `multipart/byteranges` responses.
pub struct ByteRangeParser;

impl ByteRangeParser {
    pub fn parse(header: &str, len: u64) -> Result<ByteRange, RangeError> {
        let spec = header
            .strip_prefix("bytes=")
            .ok_or(RangeError::UnsupportedUnits)?;

        if spec.contains(',') {
            return Err(RangeError::Malformed);
        }

        let (start_str, end_str) = spec.split_once('-').ok_or(RangeError::Malformed)?;

        if start_str.is_empty() {
            // Suffix range: bytes=-N means "the last N bytes".
            if end_str.is_empty() {
                return Err(RangeError::Malformed);
            }
            let suffix_len: u64 = end_str.parse().map_err(|_| RangeError::Malformed)?;
            if len == 0 {
                return Err(RangeError::StartOutOfRange { start: 0, len });
            }
            let start = len.saturating_sub(suffix_len);
            if start >= len {
                // suffix_len == 0 falls here: bytes=-0 has no well-defined
                // nonempty range, so it is rejected rather than served as
                // an empty 200.
                return Err(RangeError::StartOutOfRange { start, len });
            }
            return Ok(ByteRange {
                start,
                end: len - 1,
            });
        }

        let start: u64 = start_str.parse().map_err(|_| RangeError::Malformed)?;
        if start >= len {
            return Err(RangeError::StartOutOfRange { start, len });
        }

        if end_str.is_empty() {
            return Ok(ByteRange {
                start,
                end: len - 1,
            });
        }

        let end: u64 = end_str.parse().map_err(|_| RangeError::Malformed)?;
        if end < start {
            return Err(RangeError::InvertedRange { start, end });
        }

        Ok(ByteRange {
            start,
            end: end.min(len - 1),
        })
    }
}
