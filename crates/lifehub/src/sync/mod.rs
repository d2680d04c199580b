use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use anyhow::Context;
use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};
use uuid::Uuid;

/// A mutating API call captured for later replay. Each verb carries exactly
/// the arguments it needs: `Delete` has no payload field at all, so a delete
/// with a body is unrepresentable rather than silently ignored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "method", content = "payload", rename_all = "UPPERCASE")]
pub enum SyncOp {
    Post(Value),
    Put(Value),
    Patch(Value),
    Delete,
}

/// One queued mutation. `retry_count` records failed flush attempts; whether
/// it ever causes the item to be given up on is decided by [`RetryPolicy`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncItem {
    pub id: String,
    pub endpoint: String,
    #[serde(flatten)]
    pub op: SyncOp,
    pub timestamp: i64,
    pub retry_count: u32,
}

/// The upstream HTTP surface the queue replays into. Implementations reject
/// on any non-success response or transport error.
#[async_trait]
pub trait ApiClient: Send + Sync {
    async fn post(&self, path: &str, body: &Value) -> anyhow::Result<()>;
    async fn put(&self, path: &str, body: &Value) -> anyhow::Result<()>;
    async fn patch(&self, path: &str, body: &Value) -> anyhow::Result<()>;
    async fn delete(&self, path: &str) -> anyhow::Result<()>;
}

/// reqwest-backed [`ApiClient`] dispatching against a fixed base URL.
#[derive(Debug, Clone)]
pub struct HttpApiClient {
    http: Client,
    base_url: String,
}

impl HttpApiClient {
    pub fn new(base_url: &str) -> anyhow::Result<Self> {
        let client = Client::builder().build()?;
        Ok(Self {
            http: client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }
}

#[async_trait]
impl ApiClient for HttpApiClient {
    async fn post(&self, path: &str, body: &Value) -> anyhow::Result<()> {
        self.http
            .post(self.url(path))
            .json(body)
            .send()
            .await
            .with_context(|| format!("sending POST {path}"))?
            .error_for_status()
            .with_context(|| format!("POST {path} returned an error status"))?;
        Ok(())
    }

    async fn put(&self, path: &str, body: &Value) -> anyhow::Result<()> {
        self.http
            .put(self.url(path))
            .json(body)
            .send()
            .await
            .with_context(|| format!("sending PUT {path}"))?
            .error_for_status()
            .with_context(|| format!("PUT {path} returned an error status"))?;
        Ok(())
    }

    async fn patch(&self, path: &str, body: &Value) -> anyhow::Result<()> {
        self.http
            .patch(self.url(path))
            .json(body)
            .send()
            .await
            .with_context(|| format!("sending PATCH {path}"))?
            .error_for_status()
            .with_context(|| format!("PATCH {path} returned an error status"))?;
        Ok(())
    }

    async fn delete(&self, path: &str) -> anyhow::Result<()> {
        self.http
            .delete(self.url(path))
            .send()
            .await
            .with_context(|| format!("sending DELETE {path}"))?
            .error_for_status()
            .with_context(|| format!("DELETE {path} returned an error status"))?;
        Ok(())
    }
}

/// Durable storage port for the queue. Adapters live in `storage`.
pub trait QueueStore: Send + Sync {
    fn load(&self) -> anyhow::Result<Vec<SyncItem>>;
    fn save(&self, items: &[SyncItem]) -> anyhow::Result<()>;
}

/// What to do with an item that keeps failing.
///
/// `Forever` matches the original "keep trying, never lose data" behavior;
/// `GiveUpAfter(n)` drops an item once it has failed n flush attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RetryPolicy {
    #[default]
    Forever,
    GiveUpAfter(u32),
}

impl<'de> Deserialize<'de> for RetryPolicy {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Count(u32),
            Tag(String),
        }

        match Raw::deserialize(deserializer)? {
            Raw::Count(n) => Ok(RetryPolicy::GiveUpAfter(n)),
            Raw::Tag(tag) if tag == "infinite" => Ok(RetryPolicy::Forever),
            Raw::Tag(other) => Err(serde::de::Error::custom(format!(
                "unknown retry policy {other:?}; expected \"infinite\" or a count"
            ))),
        }
    }
}

/// Per-pass accounting. Dispatch failures are contained inside `flush`; these
/// counters are the only thing a caller sees of them.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct FlushOutcome {
    pub attempted: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub dropped: usize,
}

enum FailureDisposition {
    Requeued,
    Dropped(u32),
    Missing,
}

/// Ordered, at-least-once delivery queue for mutating API calls.
///
/// Every state change is persisted synchronously through the injected store,
/// so the backlog survives a process restart. Flushing walks the items
/// present at call start sequentially in FIFO order; a failed item stays
/// queued (subject to the retry policy) without blocking the ones behind it.
pub struct SyncQueue {
    items: Mutex<Vec<SyncItem>>,
    store: Arc<dyn QueueStore>,
    client: Arc<dyn ApiClient>,
    policy: RetryPolicy,
    flushing: AtomicBool,
}

impl SyncQueue {
    /// Build the queue, restoring any backlog the store still holds.
    pub fn restore(
        store: Arc<dyn QueueStore>,
        client: Arc<dyn ApiClient>,
        policy: RetryPolicy,
    ) -> anyhow::Result<Self> {
        let items = store.load().context("restoring sync queue")?;
        Ok(Self {
            items: Mutex::new(items),
            store,
            client,
            policy,
            flushing: AtomicBool::new(false),
        })
    }

    /// Append a mutation to the tail of the queue. No deduplication: two
    /// identical calls produce two independently replayed items.
    pub fn enqueue(&self, endpoint: impl Into<String>, op: SyncOp) -> anyhow::Result<SyncItem> {
        let item = SyncItem {
            id: short_id(),
            endpoint: endpoint.into(),
            op,
            timestamp: Utc::now().timestamp_millis(),
            retry_count: 0,
        };

        let mut items = self.items.lock();
        items.push(item.clone());
        self.store
            .save(&items)
            .context("persisting sync queue after enqueue")?;
        Ok(item)
    }

    /// Remove the item with the matching id. Returns false (without error) if
    /// no such item is queued.
    pub fn remove(&self, id: &str) -> anyhow::Result<bool> {
        let mut items = self.items.lock();
        let before = items.len();
        items.retain(|item| item.id != id);
        if items.len() == before {
            return Ok(false);
        }
        self.store
            .save(&items)
            .context("persisting sync queue after removal")?;
        Ok(true)
    }

    /// Empty the queue unconditionally.
    pub fn clear(&self) -> anyhow::Result<()> {
        let mut items = self.items.lock();
        items.clear();
        self.store
            .save(&items)
            .context("persisting cleared sync queue")?;
        Ok(())
    }

    pub fn items(&self) -> Vec<SyncItem> {
        self.items.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.items.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.lock().is_empty()
    }

    /// One complete replay pass: every item present at call start is
    /// dispatched exactly once, in enqueue order, never in parallel. Success
    /// removes the item immediately; failure is logged, counted against the
    /// retry policy, and the pass moves on. Items enqueued while the pass is
    /// running wait for the next one.
    ///
    /// A second `flush` while one is in-flight is a no-op returning an empty
    /// outcome.
    pub async fn flush(&self) -> FlushOutcome {
        if self.flushing.swap(true, Ordering::SeqCst) {
            debug!("sync flush already in progress; skipping");
            return FlushOutcome::default();
        }

        let outcome = self.flush_pass().await;
        self.flushing.store(false, Ordering::SeqCst);
        outcome
    }

    async fn flush_pass(&self) -> FlushOutcome {
        let snapshot = self.items();
        let mut outcome = FlushOutcome::default();

        for item in snapshot {
            outcome.attempted += 1;
            match self.dispatch(&item).await {
                Ok(()) => {
                    outcome.succeeded += 1;
                    if let Err(err) = self.remove(&item.id) {
                        warn!(error = ?err, id = %item.id, "failed to persist queue after sync");
                    }
                }
                Err(err) => {
                    warn!(error = ?err, id = %item.id, "failed to sync item");
                    match self.record_failure(&item.id) {
                        FailureDisposition::Requeued | FailureDisposition::Missing => {
                            outcome.failed += 1;
                        }
                        FailureDisposition::Dropped(attempts) => {
                            outcome.dropped += 1;
                            warn!(
                                id = %item.id,
                                attempts,
                                "dropping item after exhausting retry policy"
                            );
                        }
                    }
                }
            }
        }

        outcome
    }

    async fn dispatch(&self, item: &SyncItem) -> anyhow::Result<()> {
        match &item.op {
            SyncOp::Post(payload) => self.client.post(&item.endpoint, payload).await,
            SyncOp::Put(payload) => self.client.put(&item.endpoint, payload).await,
            SyncOp::Patch(payload) => self.client.patch(&item.endpoint, payload).await,
            SyncOp::Delete => self.client.delete(&item.endpoint).await,
        }
    }

    fn record_failure(&self, id: &str) -> FailureDisposition {
        let mut items = self.items.lock();
        let Some(position) = items.iter().position(|item| item.id == id) else {
            return FailureDisposition::Missing;
        };

        items[position].retry_count += 1;
        let attempts = items[position].retry_count;

        let disposition = match self.policy {
            RetryPolicy::GiveUpAfter(limit) if attempts >= limit => {
                items.remove(position);
                FailureDisposition::Dropped(attempts)
            }
            _ => FailureDisposition::Requeued,
        };

        if let Err(err) = self.store.save(&items) {
            warn!(error = ?err, id, "failed to persist queue after sync failure");
        }

        disposition
    }
}

const ID_ALPHABET: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyz";
const ID_LEN: usize = 7;

/// Short random identifier: 7 base-36 characters drawn from UUID entropy.
/// Collisions among currently queued items are negligible.
fn short_id() -> String {
    let mut n = u128::from_le_bytes(*Uuid::new_v4().as_bytes());
    let mut id = String::with_capacity(ID_LEN);
    for _ in 0..ID_LEN {
        id.push(ID_ALPHABET[(n % 36) as usize] as char);
        n /= 36;
    }
    id
}
