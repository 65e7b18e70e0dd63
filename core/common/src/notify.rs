//! One-way user notification sink.

use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::{error, info};

/// Severity of a user notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NotifyKind {
    Success,
    Error,
    Info,
}

impl fmt::Display for NotifyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            NotifyKind::Success => "success",
            NotifyKind::Error => "error",
            NotifyKind::Info => "info",
        };
        f.write_str(s)
    }
}

/// Fire-and-forget sink for user-visible messages (toasts, status bars).
///
/// Implementations must not block; nothing is returned to the caller.
pub trait Notifier: Send + Sync {
    fn notify(&self, message: &str, kind: NotifyKind);
}

/// Notifier that writes every message to the tracing log.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingNotifier;

impl Notifier for TracingNotifier {
    fn notify(&self, message: &str, kind: NotifyKind) {
        match kind {
            NotifyKind::Error => error!(target: "outbox::notify", "{}", message),
            _ => info!(target: "outbox::notify", kind = %kind, "{}", message),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_serializes_lowercase() {
        let json = serde_json::to_string(&NotifyKind::Success).unwrap();
        assert_eq!(json, "\"success\"");
        assert_eq!(NotifyKind::Info.to_string(), "info");
    }
}
