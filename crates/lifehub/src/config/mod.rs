use std::{env, path::PathBuf, time::Duration};

use serde::Deserialize;
use tracing_subscriber::{EnvFilter, fmt};

use crate::{storage, sync::RetryPolicy};

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub data_dir: PathBuf,
    pub config_dir: PathBuf,
    pub sync: SyncConfig,
    pub dynamic_now: DynamicNowConfig,
    pub server: ServerConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SyncConfig {
    /// Base URL the queued mutations are replayed against.
    pub api_base: String,
    /// `infinite` (default) or a give-up count.
    #[serde(default)]
    pub max_retries: RetryPolicy,
    #[serde(default = "default_flush_interval_seconds")]
    pub flush_interval_seconds: u64,
}

/// Startup defaults for the Dynamic Now toggle; the runtime state lives in
/// [`crate::state::AppContext`] and moves with the toggle endpoints.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct DynamicNowConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub show_hidden: bool,
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub bind_addr: String,
}

impl AppConfig {
    pub fn load() -> anyhow::Result<Self> {
        let root = match env::var("LIFEHUB_APP_ROOT") {
            Ok(path) => PathBuf::from(path),
            Err(_) => env::current_dir()?,
        };
        let data_dir = root.join("data");
        let config_dir = root.join("config");
        let sync: SyncConfig = storage::load_yaml(config_dir.join("sync.yml"))?;
        let dynamic_now = {
            let path = config_dir.join("dynamic_now.yml");
            if path.exists() {
                storage::load_yaml(path)?
            } else {
                DynamicNowConfig::default()
            }
        };

        storage::ensure_data_layout(&data_dir)?;

        Ok(Self {
            data_dir,
            config_dir,
            sync,
            dynamic_now,
            server: ServerConfig {
                bind_addr: env::var("LIFEHUB_SERVER_BIND")
                    .unwrap_or_else(|_| "0.0.0.0:8080".to_string()),
            },
        })
    }
}

impl SyncConfig {
    pub fn flush_interval(&self) -> Duration {
        Duration::from_secs(self.flush_interval_seconds)
    }
}

impl ServerConfig {
    pub fn addr(&self) -> &str {
        &self.bind_addr
    }
}

fn default_flush_interval_seconds() -> u64 {
    30
}

pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = fmt().with_env_filter(filter).try_init();
}
