use std::path::{Path, PathBuf};

use anyhow::Result;

pub fn install_core_fixture(root: &Path, api_base: &str) -> Result<PathBuf> {
    lifehub::fixtures::install_core_fixture(root, api_base)
}
