//! Outbox Sync Engine
//!
//! This module drains the durable queue against the real network:
//! - Sequential replay of a snapshot, in enqueue order
//! - A reentrancy guard so overlapping passes never race
//! - Triggers: connectivity restored, periodic tick, manual retry
//! - Capped exponential backoff of the periodic tick after failed passes

pub mod backoff;
pub mod engine;
pub mod scheduler;
pub mod state;

// Re-export main types
pub use backoff::{Backoff, BackoffConfig};
pub use engine::{SyncConfig, SyncEngine, SyncOutcome};
pub use scheduler::{SchedulerConfig, SyncRequest, SyncScheduler, SyncSchedulerHandle};
pub use state::{ReplayFailure, SyncReport, SyncState};
