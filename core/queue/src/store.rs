//! Durable, ordered queue store.

use chrono::Utc;
use serde_json::Value;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

use outbox_common::{Error, ItemId, Method, Result};

use crate::backend::QueueBackend;
use crate::item::{Payload, QueueItem};

/// Key under which the queue is persisted.
pub const QUEUE_KEY: &str = "offline-queue";

/// Whether a mutation reached the persistent backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Durability {
    /// Written to the backend; survives a restart.
    Persisted,
    /// Held in memory only; lost on restart.
    MemoryOnly,
}

impl Durability {
    pub fn is_persisted(self) -> bool {
        self == Durability::Persisted
    }
}

struct QueueState {
    items: Vec<QueueItem>,
    last_id: Option<ItemId>,
    /// Memory is ahead of the backend after a failed write.
    dirty: bool,
}

/// Persisted FIFO of queued operations.
///
/// The store is the single source of truth for pending work. All mutation
/// goes through `append`, `remove` and `clear`; readers get copies.
pub struct QueueStore {
    backend: Arc<dyn QueueBackend>,
    key: String,
    state: Mutex<QueueState>,
}

impl QueueStore {
    /// Open the store under the default key, loading whatever was persisted.
    pub async fn open(backend: Arc<dyn QueueBackend>) -> Result<Self> {
        Self::open_with_key(backend, QUEUE_KEY).await
    }

    /// Open the store under a custom key.
    ///
    /// Entries that cannot be decoded are appended to `<key>.corrupt` instead
    /// of being dropped, and the readable ones are kept in order. Earlier
    /// contents of `<key>.corrupt` are kept.
    ///
    /// # Errors
    /// - The backend could not be read
    pub async fn open_with_key(backend: Arc<dyn QueueBackend>, key: impl Into<String>) -> Result<Self> {
        let key = key.into();
        let raw = backend.read(&key).await?;

        let (items, unreadable) = match raw {
            None => (Vec::new(), Vec::new()),
            Some(raw) => Self::decode(&raw),
        };

        let mut dirty = false;
        if !unreadable.is_empty() {
            let corrupt_key = format!("{}.corrupt", key);
            error!(
                "Queue '{}' had {} unreadable entries, preserved under '{}'",
                key,
                unreadable.len(),
                corrupt_key
            );
            dirty = true;
            match Self::preserve(backend.as_ref(), &corrupt_key, unreadable).await {
                // Set aside once; the queue key now only holds readable items.
                Ok(()) => match backend.write(&key, &serde_json::to_string(&items)?).await {
                    Ok(()) => dirty = false,
                    Err(e) => warn!("Failed to rewrite queue '{}': {}", key, e),
                },
                Err(e) => error!("Failed to preserve unreadable queue data: {}", e),
            }
        }

        let last_id = items.iter().map(|item| item.id).max();
        info!(
            "Opened queue '{}' on {} backend with {} pending item(s)",
            key,
            backend.name(),
            items.len()
        );

        Ok(Self {
            backend,
            key,
            state: Mutex::new(QueueState {
                items,
                last_id,
                dirty,
            }),
        })
    }

    /// Split a persisted document into readable items and whatever could not
    /// be read. A document that is not a JSON array is kept whole as a string.
    fn decode(raw: &str) -> (Vec<QueueItem>, Vec<Value>) {
        let values: Vec<Value> = match serde_json::from_str(raw) {
            Ok(Value::Array(values)) => values,
            _ => return (Vec::new(), vec![Value::String(raw.to_string())]),
        };

        let mut items = Vec::with_capacity(values.len());
        let mut rejected = Vec::new();
        for value in values {
            match serde_json::from_value::<QueueItem>(value.clone()) {
                Ok(item) => items.push(item),
                Err(e) => {
                    warn!("Skipping unreadable queue entry: {}", e);
                    rejected.push(value);
                }
            }
        }

        (items, rejected)
    }

    /// Append `entries` to the array stored under `corrupt_key`.
    async fn preserve(
        backend: &dyn QueueBackend,
        corrupt_key: &str,
        entries: Vec<Value>,
    ) -> Result<()> {
        let mut preserved = match backend.read(corrupt_key).await? {
            None => Vec::new(),
            Some(existing) => match serde_json::from_str(&existing) {
                Ok(Value::Array(values)) => values,
                _ => vec![Value::String(existing)],
            },
        };
        preserved.extend(entries);
        backend
            .write(corrupt_key, &Value::Array(preserved).to_string())
            .await
    }

    /// Build a new item with the next id and append it.
    ///
    /// # Errors
    /// - `method` is not mutating, or `url` is empty
    pub async fn enqueue(
        &self,
        method: Method,
        url: impl Into<String>,
        payload: Payload,
    ) -> Result<(QueueItem, Durability)> {
        let mut state = self.state.lock().await;

        let now = Utc::now();
        let id = ItemId::next(state.last_id, now.timestamp_millis().max(0) as u64);
        let item = QueueItem::new(id, method, url, payload, now)?;

        state.last_id = Some(id);
        state.items.push(item.clone());
        let durability = self.persist(&mut state).await;

        debug!("Enqueued {}", item);
        Ok((item, durability))
    }

    /// Append an existing item at the end of the queue, persisting before
    /// returning.
    ///
    /// A failed write keeps the item in memory and reports
    /// `Durability::MemoryOnly`.
    ///
    /// # Errors
    /// - An item with the same id is already queued
    pub async fn append(&self, item: QueueItem) -> Result<Durability> {
        let mut state = self.state.lock().await;

        if state.items.iter().any(|existing| existing.id == item.id) {
            return Err(Error::InvalidInput(format!(
                "Item {} is already queued",
                item.id
            )));
        }

        state.last_id = state.last_id.max(Some(item.id));
        state.items.push(item);
        Ok(self.persist(&mut state).await)
    }

    /// Remove the item with `id`.
    ///
    /// # Returns
    /// - `Ok(true)` if the item was removed, `Ok(false)` if it was not queued
    ///
    /// # Errors
    /// - The write failed; the item is already gone from memory and the next
    ///   successful write brings the backend up to date
    pub async fn remove(&self, id: ItemId) -> Result<bool> {
        let mut state = self.state.lock().await;

        let before = state.items.len();
        state.items.retain(|item| item.id != id);
        if state.items.len() == before {
            return Ok(false);
        }

        match self.persist(&mut state).await {
            Durability::Persisted => Ok(true),
            Durability::MemoryOnly => Err(Error::Persistence(format!(
                "Removed item {} but could not persist the queue",
                id
            ))),
        }
    }

    /// Drop every queued item.
    ///
    /// # Errors
    /// - The write failed (memory is already empty)
    pub async fn clear(&self) -> Result<()> {
        let mut state = self.state.lock().await;
        let count = state.items.len();
        state.items.clear();

        info!("Clearing {} queued item(s)", count);
        match self.persist(&mut state).await {
            Durability::Persisted => Ok(()),
            Durability::MemoryOnly => Err(Error::Persistence(
                "Queue cleared but could not be persisted".to_string(),
            )),
        }
    }

    /// Snapshot of the queue in replay order.
    pub async fn all(&self) -> Vec<QueueItem> {
        self.state.lock().await.items.clone()
    }

    /// Copy of a single item.
    pub async fn get(&self, id: ItemId) -> Option<QueueItem> {
        self.state
            .lock()
            .await
            .items
            .iter()
            .find(|item| item.id == id)
            .cloned()
    }

    /// Number of queued items.
    pub async fn size(&self) -> usize {
        self.state.lock().await.items.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.size().await == 0
    }

    /// Whether the in-memory queue has changes the backend has not seen.
    pub async fn is_dirty(&self) -> bool {
        self.state.lock().await.dirty
    }

    /// Name of the persistence backend.
    pub fn backend_name(&self) -> &str {
        self.backend.name()
    }

    /// Write the full list. Called with the state lock held so writes land in
    /// mutation order.
    async fn persist(&self, state: &mut QueueState) -> Durability {
        let json = match serde_json::to_string(&state.items) {
            Ok(json) => json,
            Err(e) => {
                error!("Failed to serialize queue: {}", e);
                state.dirty = true;
                return Durability::MemoryOnly;
            }
        };

        match self.backend.write(&self.key, &json).await {
            Ok(()) => {
                state.dirty = false;
                Durability::Persisted
            }
            Err(e) => {
                error!(
                    "Failed to persist queue '{}' ({} item(s)): {}",
                    self.key,
                    state.items.len(),
                    e
                );
                state.dirty = true;
                Durability::MemoryOnly
            }
        }
    }
}
