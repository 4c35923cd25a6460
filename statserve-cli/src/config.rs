use std::path::PathBuf;

use serde::Deserialize;
use statserve_core::FileServConfigSpec;

/// On-disk shape of a `statserve` run config, loaded from TOML.
#[derive(Debug, Deserialize)]
pub struct RunConfig {
    pub listen: String,
    #[serde(default)]
    pub virtual_host: Option<String>,
    #[serde(default)]
    pub strip_segments: usize,
    #[serde(flatten)]
    pub static_files: FileServConfigSpec,
}

pub fn load(path: &PathBuf) -> anyhow::Result<RunConfig> {
    let text = std::fs::read_to_string(path)
        .map_err(|err| anyhow::anyhow!("reading config {}: {err}", path.display()))?;
    let config: RunConfig = toml::from_str(&text)
        .map_err(|err| anyhow::anyhow!("parsing config {}: {err}", path.display()))?;
    Ok(config)
}
