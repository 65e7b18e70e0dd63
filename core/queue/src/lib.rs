//! Durable queue of deferred mutating operations.
//!
//! This module provides:
//! - The `QueueItem` data model and its persisted JSON schema
//! - A backend seam for key/value persistence (memory and filesystem)
//! - `QueueStore`, the ordered store that survives restarts
//!
//! Every mutation rewrites the full list. Queues hold user-driven actions,
//! so they stay small.

pub mod backend;
pub mod file;
pub mod item;
pub mod memory;
pub mod store;

pub use backend::QueueBackend;
pub use file::FileBackend;
pub use item::{ItemKind, Payload, QueueItem};
pub use memory::MemoryBackend;
pub use store::{Durability, QueueStore, QUEUE_KEY};
