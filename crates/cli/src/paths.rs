//! Data directory resolution.
//!
//! Priority: `--data-dir` > `SITEAI_DATA_DIR` env > `~/.siteai`.

use std::path::{Path, PathBuf};

use anyhow::Context;

pub fn resolve_data_dir(explicit: Option<&Path>) -> anyhow::Result<PathBuf> {
    if let Some(p) = explicit {
        return Ok(p.to_path_buf());
    }
    if let Some(dir) = std::env::var_os("SITEAI_DATA_DIR").filter(|v| !v.is_empty()) {
        return Ok(PathBuf::from(dir));
    }
    let home = dirs::home_dir().context("HOME directory not found; pass --data-dir")?;
    Ok(home.join(".siteai"))
}

pub fn log_dir(data_dir: &Path) -> PathBuf {
    data_dir.join("logs")
}
