//! Common utilities and types shared across Outbox modules.
//!
//! This module provides the foundational types used by every layer of the
//! offline queue: the error taxonomy, item identifiers, HTTP verbs and the
//! one-way notification sink.

pub mod error;
pub mod notify;
pub mod types;

pub use error::{Error, Result};
pub use notify::{Notifier, NotifyKind, TracingNotifier};
pub use types::{ItemId, Method};
