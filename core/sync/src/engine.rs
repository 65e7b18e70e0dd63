//! Core sync engine that drains the queue against the network.

use chrono::Utc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

use outbox_common::{Notifier, NotifyKind, Result};
use outbox_connectivity::ConnectivityMonitor;
use outbox_intercept::replay_request;
use outbox_queue::{QueueItem, QueueStore};
use outbox_transport::HttpClient;

use crate::state::{ReplayFailure, SyncReport, SyncState};

/// Configuration for the sync engine.
#[derive(Debug, Clone, Default)]
pub struct SyncConfig {
    /// Items older than this are discarded instead of replayed. `None` keeps
    /// items until they succeed or the queue is cleared.
    pub max_item_age: Option<Duration>,
}

/// Result of calling [`SyncEngine::sync`].
#[derive(Debug, Clone)]
pub enum SyncOutcome {
    /// Another pass was already running; nothing was done.
    Skipped,
    /// A pass ran to completion.
    Completed(SyncReport),
}

impl SyncOutcome {
    pub fn report(&self) -> Option<&SyncReport> {
        match self {
            SyncOutcome::Completed(report) => Some(report),
            SyncOutcome::Skipped => None,
        }
    }
}

/// Clears the in-progress flag when the pass ends, however it ends.
struct PassGuard<'a>(&'a AtomicBool);

impl Drop for PassGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Replays queued items, in order, one at a time.
pub struct SyncEngine {
    /// Queue being drained.
    store: Arc<QueueStore>,
    /// The real network (never the offline decorator).
    client: Arc<dyn HttpClient>,
    /// Told when replay hits a connection-level failure.
    monitor: Arc<ConnectivityMonitor>,
    /// Receives pass summaries.
    notifier: Arc<dyn Notifier>,
    /// Reentrancy guard.
    in_progress: AtomicBool,
    last_report: Mutex<Option<SyncReport>>,
    config: SyncConfig,
}

impl SyncEngine {
    /// Create a new sync engine.
    pub fn new(
        store: Arc<QueueStore>,
        client: Arc<dyn HttpClient>,
        monitor: Arc<ConnectivityMonitor>,
        notifier: Arc<dyn Notifier>,
        config: SyncConfig,
    ) -> Self {
        Self {
            store,
            client,
            monitor,
            notifier,
            in_progress: AtomicBool::new(false),
            last_report: Mutex::new(None),
            config,
        }
    }

    pub fn store(&self) -> &Arc<QueueStore> {
        &self.store
    }

    pub fn monitor(&self) -> &Arc<ConnectivityMonitor> {
        &self.monitor
    }

    pub fn state(&self) -> SyncState {
        if self.in_progress.load(Ordering::Acquire) {
            SyncState::Running
        } else {
            SyncState::Idle
        }
    }

    /// Report of the most recent completed pass.
    pub fn last_report(&self) -> Option<SyncReport> {
        self.last_report.lock().unwrap().clone()
    }

    /// Run one sync pass.
    ///
    /// Safe to call concurrently: while a pass is running, further calls
    /// return `SyncOutcome::Skipped` without touching the queue. Items
    /// enqueued during a pass wait for the next one. Never fails; per-item
    /// failures are counted in the report.
    pub async fn sync(&self) -> SyncOutcome {
        if self
            .in_progress
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            debug!("Sync already in progress, skipping");
            return SyncOutcome::Skipped;
        }
        let _guard = PassGuard(&self.in_progress);

        let report = self.run_pass().await;
        self.announce(&report);
        *self.last_report.lock().unwrap() = Some(report.clone());

        SyncOutcome::Completed(report)
    }

    async fn run_pass(&self) -> SyncReport {
        let start = Instant::now();
        let snapshot = self.store.all().await;
        let mut report = SyncReport::default();

        if snapshot.is_empty() {
            debug!("Queue empty, nothing to sync");
            report.finished_at = Some(Utc::now());
            return report;
        }

        info!("Starting sync pass over {} item(s)", snapshot.len());
        let now = Utc::now();

        for item in &snapshot {
            if self.is_expired(item, now) {
                warn!("Discarding stale item {}", item);
                if let Err(e) = self.store.remove(item.id).await {
                    warn!("Failed to persist removal of {}: {}", item.id, e);
                }
                report.expired += 1;
                continue;
            }

            debug!("Replaying {}", item);
            match self.replay(item).await {
                Ok(()) => {
                    if let Err(e) = self.store.remove(item.id).await {
                        // Delivered; if the removal is lost the item replays again.
                        warn!("Delivered {} but failed to persist removal: {}", item.id, e);
                    }
                    report.succeeded += 1;
                }
                Err(e) => {
                    if e.is_connectivity() {
                        self.monitor.mark_offline(&e.to_string());
                    }
                    warn!("Failed to replay {}: {}", item, e);
                    report.failed += 1;
                    report.failures.push(ReplayFailure {
                        id: item.id,
                        url: item.url.clone(),
                        reason: e.to_string(),
                    });
                }
            }
        }

        report.duration = start.elapsed();
        report.finished_at = Some(Utc::now());
        info!("Sync pass completed: {}", report);
        report
    }

    async fn replay(&self, item: &QueueItem) -> Result<()> {
        let response = self.client.send(replay_request(item)).await?;
        response.error_for_status().map(|_| ())
    }

    fn is_expired(&self, item: &QueueItem, now: chrono::DateTime<Utc>) -> bool {
        match self.config.max_item_age {
            Some(max_age) => item.age(now).to_std().map_or(false, |age| age > max_age),
            None => false,
        }
    }

    fn announce(&self, report: &SyncReport) {
        if report.succeeded > 0 {
            self.notifier.notify(
                &format!("{} synchronized", actions(report.succeeded)),
                NotifyKind::Success,
            );
        }
        if report.failed > 0 {
            self.notifier.notify(
                &format!("{} failed to synchronize, will retry", actions(report.failed)),
                NotifyKind::Error,
            );
        }
        if report.expired > 0 {
            self.notifier.notify(
                &format!("{} discarded after waiting too long", actions(report.expired)),
                NotifyKind::Info,
            );
        }
    }
}

fn actions(count: usize) -> String {
    if count == 1 {
        "1 action".to_string()
    } else {
        format!("{} actions", count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use outbox_common::{Error, Method};
    use outbox_connectivity::{Connectivity, ProbeConfig};
    use outbox_queue::{MemoryBackend, Payload};
    use outbox_transport::{Response, ScriptedClient};

    #[derive(Default)]
    struct Recorder(Mutex<Vec<(String, NotifyKind)>>);

    impl Notifier for Recorder {
        fn notify(&self, message: &str, kind: NotifyKind) {
            self.0.lock().unwrap().push((message.to_string(), kind));
        }
    }

    struct Fixture {
        network: ScriptedClient,
        backend: MemoryBackend,
        store: Arc<QueueStore>,
        monitor: Arc<ConnectivityMonitor>,
        recorder: Arc<Recorder>,
        engine: Arc<SyncEngine>,
    }

    async fn fixture(config: SyncConfig) -> Fixture {
        let network = ScriptedClient::new();
        let backend = MemoryBackend::new();
        let recorder = Arc::new(Recorder::default());
        let store = Arc::new(QueueStore::open(Arc::new(backend.clone())).await.unwrap());
        let monitor = Arc::new(ConnectivityMonitor::new(
            Arc::new(network.clone()),
            ProbeConfig::new("https://app.test/health"),
            recorder.clone(),
            Connectivity::Online,
        ));
        let engine = Arc::new(SyncEngine::new(
            store.clone(),
            Arc::new(network.clone()),
            monitor.clone(),
            recorder.clone(),
            config,
        ));
        Fixture {
            network,
            backend,
            store,
            monitor,
            recorder,
            engine,
        }
    }

    async fn enqueue(store: &QueueStore, path: &str) {
        store
            .enqueue(
                Method::Post,
                format!("https://app.test{}", path),
                Payload::form([("path", path)]),
            )
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_replays_in_enqueue_order() {
        let f = fixture(SyncConfig::default()).await;
        let paths: Vec<String> = (0..10).map(|i| format!("/todos/{}", i)).collect();
        for path in &paths {
            enqueue(&f.store, path).await;
        }

        let outcome = f.engine.sync().await;
        let report = outcome.report().unwrap();
        assert_eq!(report.succeeded, 10);

        let sent: Vec<String> = f.network.requests().into_iter().map(|r| r.url).collect();
        let expected: Vec<String> = paths
            .iter()
            .map(|p| format!("https://app.test{}", p))
            .collect();
        assert_eq!(sent, expected);
        assert!(f.store.is_empty().await);
    }

    #[tokio::test]
    async fn test_partial_failure_is_isolated() {
        let f = fixture(SyncConfig::default()).await;
        enqueue(&f.store, "/1").await;
        enqueue(&f.store, "/2").await;
        enqueue(&f.store, "/3").await;
        let second = f.store.all().await[1].clone();

        f.network.respond_with(|request| {
            if request.url.ends_with("/2") {
                Ok(Response::new(500))
            } else {
                Ok(Response::new(201))
            }
        });

        let outcome = f.engine.sync().await;
        let report = outcome.report().unwrap();
        assert_eq!(report.succeeded, 2);
        assert_eq!(report.failed, 1);
        assert_eq!(report.failures[0].id, second.id);
        assert_eq!(f.store.all().await, vec![second]);

        let notes = f.recorder.0.lock().unwrap().clone();
        assert!(notes.contains(&("2 actions synchronized".to_string(), NotifyKind::Success)));
        assert!(notes.contains(&(
            "1 action failed to synchronize, will retry".to_string(),
            NotifyKind::Error
        )));
    }

    #[tokio::test]
    async fn test_concurrent_sync_replays_once() {
        let f = fixture(SyncConfig::default()).await;
        for i in 0..3 {
            enqueue(&f.store, &format!("/{}", i)).await;
        }
        f.network.set_latency(Duration::from_millis(30));

        let (a, b) = futures::join!(f.engine.sync(), f.engine.sync());

        let completed = [&a, &b]
            .iter()
            .filter(|o| matches!(o, SyncOutcome::Completed(_)))
            .count();
        assert_eq!(completed, 1);
        assert_eq!(f.network.request_count(), 3);
        assert_eq!(f.engine.state(), SyncState::Idle);
    }

    #[tokio::test]
    async fn test_guard_released_after_pass() {
        let f = fixture(SyncConfig::default()).await;
        enqueue(&f.store, "/1").await;
        f.network.set_reachable(false);

        assert!(matches!(f.engine.sync().await, SyncOutcome::Completed(_)));
        f.network.set_reachable(true);
        let outcome = f.engine.sync().await;
        assert_eq!(outcome.report().unwrap().succeeded, 1);
    }

    #[tokio::test]
    async fn test_items_enqueued_during_pass_wait() {
        let f = fixture(SyncConfig::default()).await;
        enqueue(&f.store, "/1").await;
        f.network.set_latency(Duration::from_millis(30));

        let engine = f.engine.clone();
        let pass = tokio::spawn(async move { engine.sync().await });
        tokio::time::sleep(Duration::from_millis(10)).await;
        enqueue(&f.store, "/late").await;

        let outcome = pass.await.unwrap();
        assert_eq!(outcome.report().unwrap().succeeded, 1);
        assert_eq!(f.store.size().await, 1);
        assert!(f.store.all().await[0].url.ends_with("/late"));
    }

    #[tokio::test]
    async fn test_connection_failure_marks_offline() {
        let f = fixture(SyncConfig::default()).await;
        enqueue(&f.store, "/1").await;
        f.network.push_outcome(Err(Error::Network("reset".to_string())));

        let outcome = f.engine.sync().await;
        assert_eq!(outcome.report().unwrap().failed, 1);
        assert_eq!(f.monitor.state(), Connectivity::Offline);
        assert_eq!(f.store.size().await, 1);
    }

    #[tokio::test]
    async fn test_empty_queue_is_silent() {
        let f = fixture(SyncConfig::default()).await;
        let outcome = f.engine.sync().await;
        assert_eq!(outcome.report().unwrap().attempted(), 0);
        assert!(f.recorder.0.lock().unwrap().is_empty());
        assert_eq!(f.network.request_count(), 0);
    }

    #[tokio::test]
    async fn test_stale_items_expire() {
        let f = fixture(SyncConfig {
            max_item_age: Some(Duration::from_secs(3600)),
        })
        .await;

        let stale = QueueItem::new(
            outbox_common::ItemId::new(1),
            Method::Post,
            "https://app.test/old",
            Payload::form([("a", "b")]),
            Utc::now() - chrono::Duration::hours(2),
        )
        .unwrap();
        f.store.append(stale).await.unwrap();
        enqueue(&f.store, "/fresh").await;

        let outcome = f.engine.sync().await;
        let report = outcome.report().unwrap();
        assert_eq!(report.expired, 1);
        assert_eq!(report.succeeded, 1);
        assert_eq!(f.network.request_count(), 1);
        assert!(f.store.is_empty().await);
    }

    #[tokio::test]
    async fn test_lost_removal_still_counts_as_delivered() {
        let f = fixture(SyncConfig::default()).await;
        enqueue(&f.store, "/1").await;
        f.backend.set_fail_writes(true);

        let outcome = f.engine.sync().await;
        assert_eq!(outcome.report().unwrap().succeeded, 1);
        assert!(f.store.is_empty().await);
        assert!(f.store.is_dirty().await);
    }

    #[tokio::test]
    async fn test_last_report() {
        let f = fixture(SyncConfig::default()).await;
        assert!(f.engine.last_report().is_none());
        enqueue(&f.store, "/1").await;
        f.engine.sync().await;
        assert_eq!(f.engine.last_report().unwrap().succeeded, 1);
    }
}
