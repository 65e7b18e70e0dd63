//! Outbox application context.
//!
//! Ties the pieces together for a host application:
//! - `OutboxConfig`: JSON configuration with defaults
//! - `Outbox`: one monitor, queue, interceptor and engine per context
//! - `Running`: background sync started from a context

pub mod config;
pub mod outbox;

pub use config::OutboxConfig;
pub use outbox::{Outbox, OutboxBuilder, Running};

// Re-export the types hosts deal with most.
pub use outbox_common::{Error, ItemId, Method, Notifier, NotifyKind, Result, TracingNotifier};
pub use outbox_connectivity::{Connectivity, LinkSignal};
pub use outbox_intercept::{Dispatch, Form, OfflineClient};
pub use outbox_queue::{Durability, Payload, QueueItem};
pub use outbox_sync::{SyncOutcome, SyncReport};
pub use outbox_transport::{status_reason, HttpClient, Request, Response};
