//! In-memory persistence backend for testing.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, RwLock};

use outbox_common::{Error, Result};

use crate::backend::QueueBackend;

/// In-memory backend.
///
/// Useful for testing and development. Clones share the same map, so a store
/// reopened on a clone sees what the previous store wrote, which is how tests
/// simulate a restart. Writes can be made to fail to exercise degraded mode.
#[derive(Clone, Default)]
pub struct MemoryBackend {
    values: Arc<RwLock<HashMap<String, String>>>,
    fail_writes: Arc<AtomicBool>,
    writes: Arc<AtomicUsize>,
}

impl MemoryBackend {
    /// Create a new empty backend.
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent write fail (e.g., quota exceeded) or succeed.
    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// Number of successful writes so far.
    pub fn write_count(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    /// Raw stored value, bypassing any store.
    pub fn raw(&self, key: &str) -> Option<String> {
        self.values.read().unwrap().get(key).cloned()
    }

    /// Seed a raw value, bypassing any store.
    pub fn insert_raw(&self, key: impl Into<String>, value: impl Into<String>) {
        self.values.write().unwrap().insert(key.into(), value.into());
    }
}

#[async_trait]
impl QueueBackend for MemoryBackend {
    fn name(&self) -> &str {
        "memory"
    }

    async fn read(&self, key: &str) -> Result<Option<String>> {
        Ok(self.values.read().unwrap().get(key).cloned())
    }

    async fn write(&self, key: &str, value: &str) -> Result<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(Error::Persistence("storage quota exceeded".to_string()));
        }

        self.values
            .write()
            .unwrap()
            .insert(key.to_string(), value.to_string());
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_read_missing_key() {
        let backend = MemoryBackend::new();
        assert_eq!(backend.read("offline-queue").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_clones_share_values() {
        let backend = MemoryBackend::new();
        backend.write("k", "v").await.unwrap();

        let other = backend.clone();
        assert_eq!(other.read("k").await.unwrap().as_deref(), Some("v"));
        assert_eq!(other.write_count(), 1);
    }

    #[tokio::test]
    async fn test_failing_writes() {
        let backend = MemoryBackend::new();
        backend.set_fail_writes(true);

        let err = backend.write("k", "v").await.unwrap_err();
        assert!(matches!(err, Error::Persistence(_)));
        assert_eq!(backend.raw("k"), None);
    }
}
