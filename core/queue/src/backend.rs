//! Persistence backend trait definition.

use async_trait::async_trait;

use outbox_common::Result;

/// Key/value persistence used by the queue store.
///
/// Values are complete documents; the store never issues partial writes.
#[async_trait]
pub trait QueueBackend: Send + Sync {
    /// Backend name for logging (e.g., "memory", "file").
    fn name(&self) -> &str;

    /// Read the value stored under `key`.
    ///
    /// # Returns
    /// - `Ok(None)` if nothing was ever written under `key`
    async fn read(&self, key: &str) -> Result<Option<String>>;

    /// Replace the value stored under `key`.
    ///
    /// # Postconditions
    /// - On `Ok`, a later `read` (including after a restart, for durable
    ///   backends) returns `value`
    ///
    /// # Errors
    /// - `Error::Persistence` or `Error::Io` if the value could not be stored
    async fn write(&self, key: &str, value: &str) -> Result<()>;
}
