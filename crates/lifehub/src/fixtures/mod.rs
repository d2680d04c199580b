use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

/// Install a baseline `config/` layout into the target root: a sync config
/// replaying against the given API base, and a Dynamic Now config with the
/// filter switched off. Existing files are overwritten.
///
/// Used by the e2e tests and the `bootstrap_config` helper binary.
pub fn install_core_fixture(target_root: &Path, api_base: &str) -> Result<PathBuf> {
    let config_dir = target_root.join("config");
    fs::create_dir_all(&config_dir)
        .with_context(|| format!("creating fixture config dir {:?}", config_dir))?;

    let sync = format!("api_base: {api_base}\nmax_retries: infinite\nflush_interval_seconds: 30\n");
    fs::write(config_dir.join("sync.yml"), sync).with_context(|| "writing sync fixture config")?;

    fs::write(
        config_dir.join("dynamic_now.yml"),
        "enabled: false\nshow_hidden: false\n",
    )
    .with_context(|| "writing dynamic_now fixture config")?;

    Ok(target_root.to_path_buf())
}
