//! Sync scheduling - restore, periodic and manual triggers.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::time::{sleep, sleep_until, Instant};
use tracing::{debug, info};

use outbox_common::{Error, Result};

use crate::backoff::{Backoff, BackoffConfig};
use crate::engine::{SyncEngine, SyncOutcome};

/// Scheduler timing.
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    /// Periodic tick while passes succeed.
    pub interval: Duration,
    /// How long connectivity must stay restored before a pass starts.
    pub restore_settle: Duration,
    /// Upper bound for the backed-off tick.
    pub max_backoff: Duration,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(60),
            restore_settle: Duration::from_secs(2),
            max_backoff: Duration::from_secs(30 * 60),
        }
    }
}

impl SchedulerConfig {
    fn backoff(&self) -> BackoffConfig {
        BackoffConfig::new(self.interval).with_max_delay(self.max_backoff.max(self.interval))
    }
}

/// Requests accepted by the scheduler task.
#[derive(Debug)]
pub enum SyncRequest {
    /// Manual retry.
    Sync,
    /// Stop the scheduler.
    Shutdown,
}

type Envelope = (SyncRequest, oneshot::Sender<SyncOutcome>);

/// Cloneable front end for the scheduler task.
#[derive(Clone)]
pub struct SyncScheduler {
    request_tx: mpsc::Sender<Envelope>,
}

impl SyncScheduler {
    /// Create a scheduler and the handle that runs it.
    pub fn new(config: SchedulerConfig) -> (Self, SyncSchedulerHandle) {
        let (request_tx, request_rx) = mpsc::channel(16);
        (
            Self { request_tx },
            SyncSchedulerHandle { config, request_rx },
        )
    }

    /// Manual retry: run a pass now and wait for its outcome.
    pub async fn request_sync(&self) -> Result<SyncOutcome> {
        let (response_tx, response_rx) = oneshot::channel();

        self.request_tx
            .send((SyncRequest::Sync, response_tx))
            .await
            .map_err(|_| Error::InvalidInput("Scheduler not running".to_string()))?;

        response_rx
            .await
            .map_err(|_| Error::InvalidInput("Failed to receive sync result".to_string()))
    }

    /// Shutdown the scheduler.
    pub async fn shutdown(&self) {
        let (response_tx, _) = oneshot::channel();
        let _ = self
            .request_tx
            .send((SyncRequest::Shutdown, response_tx))
            .await;
    }
}

/// Handle for the scheduler background task.
pub struct SyncSchedulerHandle {
    config: SchedulerConfig,
    request_rx: mpsc::Receiver<Envelope>,
}

impl SyncSchedulerHandle {
    /// Run the scheduler until shutdown.
    ///
    /// This should be spawned in a tokio task. Passes are triggered by a
    /// confirmed offline -> online transition (after the settle window), by
    /// the periodic tick when the queue is non-empty and a probe confirms the
    /// origin is reachable, and by manual requests. Items left over from a
    /// previous session are drained at startup if the monitor is online.
    pub async fn run(mut self, engine: Arc<SyncEngine>) {
        let mut connectivity = engine.monitor().subscribe();
        let mut backoff = Backoff::new(self.config.backoff());

        info!(
            "Sync scheduler started (interval {:?}, settle {:?})",
            self.config.interval, self.config.restore_settle
        );

        if connectivity.borrow_and_update().is_online() && !engine.store().is_empty().await {
            info!("Draining items left from a previous session");
            let outcome = engine.sync().await;
            backoff.record(&outcome);
        }
        let mut next_tick = Instant::now() + backoff.next_delay();

        loop {
            tokio::select! {
                request = self.request_rx.recv() => {
                    match request {
                        Some((SyncRequest::Sync, response_tx)) => {
                            debug!("Manual sync requested");
                            let outcome = engine.sync().await;
                            backoff.record(&outcome);
                            next_tick = Instant::now() + backoff.next_delay();
                            let _ = response_tx.send(outcome);
                        }
                        Some((SyncRequest::Shutdown, _)) | None => {
                            info!("Sync scheduler shutting down");
                            break;
                        }
                    }
                }

                changed = connectivity.changed() => {
                    if changed.is_err() {
                        info!("Connectivity monitor gone, stopping scheduler");
                        break;
                    }
                    if !connectivity.borrow_and_update().is_online() {
                        continue;
                    }

                    // Let flapping settle before committing to a pass.
                    sleep(self.config.restore_settle).await;
                    if connectivity.has_changed().unwrap_or(true) || !engine.monitor().is_online() {
                        debug!("Connectivity changed again during settle window");
                        continue;
                    }
                    if engine.store().is_empty().await {
                        continue;
                    }

                    info!("Connectivity restored, syncing");
                    let outcome = engine.sync().await;
                    backoff.record(&outcome);
                    next_tick = Instant::now() + backoff.next_delay();
                }

                _ = sleep_until(next_tick) => {
                    next_tick = Instant::now() + backoff.next_delay();
                    if engine.store().is_empty().await {
                        continue;
                    }
                    if !engine.monitor().check_connection().await.is_online() {
                        debug!("Periodic sync skipped: origin unreachable");
                        continue;
                    }
                    // This pass covers any restore the probe just published.
                    connectivity.borrow_and_update();

                    debug!("Triggering periodic sync");
                    let outcome = engine.sync().await;
                    backoff.record(&outcome);
                    next_tick = Instant::now() + backoff.next_delay();
                }
            }
        }
    }
}
