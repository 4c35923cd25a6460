//! Static-file serving core: maps paths under a configured root to
//! cached file handles, transparently gzip-compressing and
//! range-slicing the bytes it streams back.
//!
//! The HTTP request/response objects, path normalization, and MIME
//! content negotiation beyond gzip are left to the embedding binary;
//! see [`handler::RequestContext`] for the seam.

pub mod cache;
pub mod compress;
pub mod config;
pub mod dirindex;
pub mod error;
mod fsopen;
pub mod global;
pub mod handler;
pub mod pathlock;
pub mod range;

pub use cache::Cache;
pub use config::{FileServConfig, FileServConfigSpec};
pub use error::{StaticFileError, Result};
pub use handler::{RequestContext, Server};
