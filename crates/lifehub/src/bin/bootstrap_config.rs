use std::env;
use std::path::PathBuf;

use anyhow::{Context, Result};
use lifehub::fixtures;

const DEFAULT_API_BASE: &str = "http://localhost:4000";

fn main() -> Result<()> {
    let args: Vec<String> = env::args().collect();
    let target = if let Some(path) = args.get(1) {
        PathBuf::from(path)
    } else {
        env::current_dir().context("resolving current directory")?
    };
    let api_base = args
        .get(2)
        .map(String::as_str)
        .unwrap_or(DEFAULT_API_BASE);

    let installed = fixtures::install_core_fixture(&target, api_base)?;
    println!(
        "Baseline config installed at {:?}. Set LIFEHUB_APP_ROOT to this path before running the server.",
        installed
    );
    Ok(())
}
