mod compressor;
mod probe;

pub use compressor::ensure_compressed;
pub use probe::{is_compressible, is_compressible_default};
