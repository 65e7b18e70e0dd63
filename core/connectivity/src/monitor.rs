//! Connectivity state and transitions.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::{Arc, Mutex};
use tokio::sync::watch;
use tracing::{debug, info, warn};

use outbox_common::{Notifier, NotifyKind};
use outbox_transport::HttpClient;

use crate::probe::{Probe, ProbeConfig, ProbeOutcome};

/// Whether the origin is believed reachable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Connectivity {
    Online,
    Offline,
}

impl Connectivity {
    pub fn is_online(self) -> bool {
        self == Connectivity::Online
    }
}

impl fmt::Display for Connectivity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Connectivity::Online => f.write_str("online"),
            Connectivity::Offline => f.write_str("offline"),
        }
    }
}

/// Passive link event from the platform.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkSignal {
    Online,
    Offline,
}

/// Tracks connectivity and publishes transitions.
///
/// Subscribers receive a `watch` channel that only changes on real
/// transitions; repeated reports of the same state are swallowed.
pub struct ConnectivityMonitor {
    probe: Probe,
    state: watch::Sender<Connectivity>,
    notifier: Arc<dyn Notifier>,
    last_probe: Mutex<Option<(DateTime<Utc>, ProbeOutcome)>>,
}

impl ConnectivityMonitor {
    /// Create a monitor probing `config.url` through `client`.
    ///
    /// `initial` is the state assumed until the first signal or probe.
    pub fn new(
        client: Arc<dyn HttpClient>,
        config: ProbeConfig,
        notifier: Arc<dyn Notifier>,
        initial: Connectivity,
    ) -> Self {
        let (state, _) = watch::channel(initial);
        Self {
            probe: Probe::new(client, config),
            state,
            notifier,
            last_probe: Mutex::new(None),
        }
    }

    /// Current belief.
    pub fn state(&self) -> Connectivity {
        *self.state.borrow()
    }

    pub fn is_online(&self) -> bool {
        self.state().is_online()
    }

    /// Receive every transition from now on.
    pub fn subscribe(&self) -> watch::Receiver<Connectivity> {
        self.state.subscribe()
    }

    /// Most recent probe result, if any.
    pub fn last_probe(&self) -> Option<(DateTime<Utc>, ProbeOutcome)> {
        self.last_probe.lock().unwrap().clone()
    }

    /// React to a platform link event.
    ///
    /// "Offline" is trusted immediately. "Online" only triggers a probe; the
    /// state flips once the origin answers.
    pub async fn handle_signal(&self, signal: LinkSignal) -> Connectivity {
        debug!("Link signal: {:?}", signal);
        match signal {
            LinkSignal::Offline => {
                self.transition(Connectivity::Offline, "link down");
                Connectivity::Offline
            }
            LinkSignal::Online => self.check_connection().await,
        }
    }

    /// Probe the origin and publish the result.
    ///
    /// Any failure (timeout, transport error, non-2xx/3xx status) means
    /// offline.
    pub async fn check_connection(&self) -> Connectivity {
        let outcome = self.probe.run().await;
        let next = if outcome.is_reachable() {
            Connectivity::Online
        } else {
            Connectivity::Offline
        };

        let reason = match &outcome {
            ProbeOutcome::Reachable { .. } => "probe succeeded".to_string(),
            ProbeOutcome::Rejected { status } => format!("probe rejected with {}", status),
            ProbeOutcome::Unreachable { reason } => format!("probe failed: {}", reason),
            ProbeOutcome::TimedOut => "probe timed out".to_string(),
        };

        *self.last_probe.lock().unwrap() = Some((Utc::now(), outcome));
        self.transition(next, &reason);
        next
    }

    /// Record that a real call could not reach the network.
    pub fn mark_offline(&self, reason: &str) {
        self.transition(Connectivity::Offline, reason);
    }

    /// Publish `next` if it differs from the current state.
    fn transition(&self, next: Connectivity, reason: &str) -> bool {
        let changed = self.state.send_if_modified(|current| {
            if *current == next {
                false
            } else {
                *current = next;
                true
            }
        });

        if changed {
            match next {
                Connectivity::Offline => {
                    warn!("Connectivity lost ({})", reason);
                    self.notifier.notify(
                        "Working offline. Changes will be sent when the connection returns",
                        NotifyKind::Info,
                    );
                }
                Connectivity::Online => {
                    info!("Connectivity restored ({})", reason);
                    self.notifier.notify("Back online", NotifyKind::Success);
                }
            }
        }
        changed
    }
}
