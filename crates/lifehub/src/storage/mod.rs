use std::fs;
use std::path::{Path, PathBuf};

use anyhow::Context;
use parking_lot::Mutex;
use serde::de::DeserializeOwned;

use crate::sync::{QueueStore, SyncItem};

const REQUIRED_DIRS: &[&str] = &["sync"];

pub fn ensure_data_layout(data_dir: &Path) -> anyhow::Result<()> {
    for dir in REQUIRED_DIRS {
        let path = data_dir.join(dir);
        fs::create_dir_all(&path).with_context(|| format!("creating dir {:?}", path))?;
    }
    Ok(())
}

pub fn load_yaml<T: DeserializeOwned>(path: PathBuf) -> anyhow::Result<T> {
    let content = fs::read_to_string(&path).with_context(|| format!("reading yaml {:?}", path))?;
    let parsed =
        serde_yaml::from_str(&content).with_context(|| format!("parsing yaml {:?}", path))?;
    Ok(parsed)
}

/// File adapter for the queue's persistence port: the full queue serialized as
/// JSON under `data/sync/queue.json`, written via a temp file + rename so a
/// crash mid-save never leaves a torn file.
pub struct FileQueueStore {
    path: PathBuf,
}

impl FileQueueStore {
    pub fn new(data_dir: &Path) -> Self {
        Self {
            path: data_dir.join("sync/queue.json"),
        }
    }
}

impl QueueStore for FileQueueStore {
    fn load(&self) -> anyhow::Result<Vec<SyncItem>> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }
        let content = fs::read_to_string(&self.path)
            .with_context(|| format!("reading sync queue {:?}", self.path))?;
        let items = serde_json::from_str(&content)
            .with_context(|| format!("parsing sync queue {:?}", self.path))?;
        Ok(items)
    }

    fn save(&self, items: &[SyncItem]) -> anyhow::Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("creating sync queue dir {:?}", parent))?;
        }
        let serialized = serde_json::to_string_pretty(items)?;
        let staging = self.path.with_extension("json.tmp");
        fs::write(&staging, serialized)
            .with_context(|| format!("writing sync queue staging file {:?}", staging))?;
        fs::rename(&staging, &self.path)
            .with_context(|| format!("replacing sync queue {:?}", self.path))?;
        Ok(())
    }
}

/// Ephemeral adapter for the same port; the backlog lives only as long as the
/// process. Used by tests and by callers that opt out of durability.
#[derive(Default)]
pub struct MemoryQueueStore {
    items: Mutex<Vec<SyncItem>>,
}

impl QueueStore for MemoryQueueStore {
    fn load(&self) -> anyhow::Result<Vec<SyncItem>> {
        Ok(self.items.lock().clone())
    }

    fn save(&self, items: &[SyncItem]) -> anyhow::Result<()> {
        *self.items.lock() = items.to_vec();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sync::SyncOp;
    use serde::Deserialize;
    use serde_json::json;
    use tempfile::tempdir;

    fn sample_item(id: &str) -> SyncItem {
        SyncItem {
            id: id.to_string(),
            endpoint: "/api/tasks".to_string(),
            op: SyncOp::Post(json!({"title": "stretch"})),
            timestamp: 1_700_000_000_000,
            retry_count: 0,
        }
    }

    #[test]
    fn ensure_data_layout_creates_sync_dir() {
        let temp = tempdir().unwrap();
        ensure_data_layout(temp.path()).unwrap();
        assert!(temp.path().join("sync").is_dir());
    }

    #[test]
    fn load_yaml_parses_typed_config() {
        #[derive(Debug, Deserialize, PartialEq)]
        struct Sample {
            enabled: bool,
        }

        let temp = tempdir().unwrap();
        let path = temp.path().join("sample.yml");
        fs::write(&path, "enabled: true\n").unwrap();

        let parsed: Sample = load_yaml(path).unwrap();
        assert_eq!(parsed, Sample { enabled: true });
    }

    #[test]
    fn file_store_round_trips_and_defaults_to_empty() {
        let temp = tempdir().unwrap();
        ensure_data_layout(temp.path()).unwrap();
        let store = FileQueueStore::new(temp.path());

        assert!(store.load().unwrap().is_empty());

        let items = vec![sample_item("aaaaaaa"), sample_item("bbbbbbb")];
        store.save(&items).unwrap();
        assert_eq!(store.load().unwrap(), items);

        // No staging leftovers after a completed save.
        assert!(!temp.path().join("sync/queue.json.tmp").exists());
    }

    #[test]
    fn file_store_save_replaces_previous_contents() {
        let temp = tempdir().unwrap();
        let store = FileQueueStore::new(temp.path());

        store.save(&[sample_item("aaaaaaa")]).unwrap();
        store.save(&[]).unwrap();

        assert!(store.load().unwrap().is_empty());
    }

    #[test]
    fn memory_store_round_trips() {
        let store = MemoryQueueStore::default();
        let items = vec![sample_item("ccccccc")];

        store.save(&items).unwrap();
        assert_eq!(store.load().unwrap(), items);
    }
}
