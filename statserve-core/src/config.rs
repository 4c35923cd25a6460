use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// A path rewrite: given the raw request path, returns the path to
/// actually resolve against `root`.
pub type PathRewrite = Arc<dyn Fn(&str) -> String + Send + Sync>;

/// Invoked instead of the default 404 body when no file is found.
pub type PathNotFound = Arc<dyn Fn(&str) -> Vec<u8> + Send + Sync>;

/// Serde-deserializable, TOML-shaped configuration. This is what a
/// binary loads from disk; callbacks (`path_rewrite`, `path_not_found`)
/// are not representable in TOML and are attached separately when
/// building a [`FileServConfig`] from this spec.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FileServConfigSpec {
    pub root: PathBuf,
    pub index_names: Vec<String>,
    pub generate_index_pages: bool,
    pub compress: bool,
    pub accept_byte_range: bool,
    pub cache_duration_secs: u64,
    pub compressed_file_suffix: String,
}

impl Default for FileServConfigSpec {
    fn default() -> Self {
        FileServConfigSpec {
            root: PathBuf::new(),
            index_names: vec!["index.html".to_string()],
            generate_index_pages: false,
            compress: true,
            accept_byte_range: true,
            cache_duration_secs: 10,
            compressed_file_suffix: ".gz".to_string(),
        }
    }
}

/// Runtime configuration consumed by the cache and request handler.
///
/// Built from a [`FileServConfigSpec`] plus the two optional runtime
/// callbacks the spec shape cannot carry.
#[derive(Clone)]
pub struct FileServConfig {
    pub root: PathBuf,
    pub index_names: Vec<String>,
    pub generate_index_pages: bool,
    pub compress: bool,
    pub accept_byte_range: bool,
    pub cache_duration: Duration,
    pub compressed_file_suffix: String,
    pub path_rewrite: Option<PathRewrite>,
    pub path_not_found: Option<PathNotFound>,
}

impl FileServConfig {
    pub fn from_spec(spec: FileServConfigSpec) -> Self {
        let root = if spec.root.as_os_str().is_empty() {
            std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."))
        } else {
            spec.root
        };
        FileServConfig {
            root,
            index_names: spec.index_names,
            generate_index_pages: spec.generate_index_pages,
            compress: spec.compress,
            accept_byte_range: spec.accept_byte_range,
            cache_duration: Duration::from_secs(spec.cache_duration_secs),
            compressed_file_suffix: spec.compressed_file_suffix,
            path_rewrite: None,
            path_not_found: None,
        }
    }

    pub fn with_path_rewrite(mut self, f: PathRewrite) -> Self {
        self.path_rewrite = Some(f);
        self
    }

    pub fn with_path_not_found(mut self, f: PathNotFound) -> Self {
        self.path_not_found = Some(f);
        self
    }

    pub fn sidecar_path(&self, original: &Path) -> PathBuf {
        let mut s = original.as_os_str().to_owned();
        s.push(&self.compressed_file_suffix);
        PathBuf::from(s)
    }
}

impl Default for FileServConfig {
    fn default() -> Self {
        FileServConfig::from_spec(FileServConfigSpec::default())
    }
}

/// Drops the first `n` leading `/`-segments from `path`.
///
/// E.g. with `n = 1`, `/static/css/app.css` becomes `/css/app.css`.
pub fn strip_leading_segments(n: usize) -> PathRewrite {
    Arc::new(move |path: &str| {
        let mut remaining = path;
        for _ in 0..n {
            let trimmed = remaining.trim_start_matches('/');
            match trimmed.split_once('/') {
                Some((_, rest)) => remaining = rest,
                None => {
                    remaining = "";
                    break;
                }
            }
        }
        if remaining.starts_with('/') {
            remaining.to_string()
        } else {
            format!("/{remaining}")
        }
    })
}

const VHOST_FALLBACK: &str = "_default";

/// Strips `n` leading segments, then prepends `/<host>` taken from a
/// caller-supplied host string. Falls back to a sentinel host when the
/// supplied host is empty or itself contains a `/`.
pub fn virtual_host_prepend(n: usize, host: &str) -> PathRewrite {
    let strip = strip_leading_segments(n);
    let host = if host.is_empty() || host.contains('/') {
        VHOST_FALLBACK.to_string()
    } else {
        host.to_string()
    };
    Arc::new(move |path: &str| format!("/{host}{}", strip(path)))
}
