use std::path::PathBuf;
use std::sync::Arc;

use once_cell::sync::OnceCell;

use crate::config::{FileServConfig, FileServConfigSpec};
use crate::handler::Server;

static DEFAULT_SERVER: OnceCell<Arc<Server>> = OnceCell::new();

/// A process-wide convenience server rooted at `/`, with gzip, byte
/// ranges, and directory index generation all enabled. Initialized
/// lazily on first use; must be called from within a Tokio runtime
/// since constructing a [`Server`] spawns its janitor task.
pub fn default_server() -> Arc<Server> {
    DEFAULT_SERVER
        .get_or_init(|| {
            let spec = FileServConfigSpec {
                root: PathBuf::from("/"),
                compress: true,
                accept_byte_range: true,
                generate_index_pages: true,
                ..FileServConfigSpec::default()
            };
            Server::new(FileServConfig::from_spec(spec))
        })
        .clone()
}
