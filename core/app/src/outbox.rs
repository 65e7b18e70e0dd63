//! Application context wiring the monitor, queue, interceptor and engine.

use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use outbox_common::{Notifier, Result, TracingNotifier};
use outbox_connectivity::{Connectivity, ConnectivityMonitor, ProbeConfig};
use outbox_intercept::OfflineClient;
use outbox_queue::{FileBackend, QueueBackend, QueueStore};
use outbox_sync::{SyncEngine, SyncOutcome, SyncScheduler};
use outbox_transport::{HttpClient, ReqwestClient};

use crate::config::OutboxConfig;

/// Builder for [`Outbox`].
///
/// Anything not supplied is created from the configuration: a `reqwest`
/// client, a file backend under the data directory and a notifier that
/// writes to the log.
pub struct OutboxBuilder {
    config: OutboxConfig,
    network: Option<Arc<dyn HttpClient>>,
    backend: Option<Arc<dyn QueueBackend>>,
    notifier: Option<Arc<dyn Notifier>>,
    initial: Connectivity,
}

impl OutboxBuilder {
    pub fn network(mut self, network: Arc<dyn HttpClient>) -> Self {
        self.network = Some(network);
        self
    }

    pub fn backend(mut self, backend: Arc<dyn QueueBackend>) -> Self {
        self.backend = Some(backend);
        self
    }

    pub fn notifier(mut self, notifier: Arc<dyn Notifier>) -> Self {
        self.notifier = Some(notifier);
        self
    }

    /// Connectivity assumed until the first probe or signal.
    pub fn initial_state(mut self, state: Connectivity) -> Self {
        self.initial = state;
        self
    }

    /// Build the context, loading the persisted queue.
    ///
    /// # Errors
    /// - Invalid configuration
    /// - HTTP client or data directory could not be created
    /// - Persisted queue could not be read
    pub async fn build(self) -> Result<Outbox> {
        let config = self.config;
        config.validate()?;

        let network = match self.network {
            Some(network) => network,
            None => Arc::new(ReqwestClient::new(config.http())?),
        };
        let backend = match self.backend {
            Some(backend) => backend,
            None => Arc::new(FileBackend::new(config.resolve_data_dir()?)?),
        };
        let notifier = self
            .notifier
            .unwrap_or_else(|| Arc::new(TracingNotifier));

        let store = Arc::new(QueueStore::open(backend).await?);
        let probe = ProbeConfig::new(config.probe_url()?).with_timeout(config.probe_timeout());
        let monitor = Arc::new(ConnectivityMonitor::new(
            network.clone(),
            probe,
            notifier.clone(),
            self.initial,
        ));
        let client = Arc::new(OfflineClient::new(
            network.clone(),
            monitor.clone(),
            store.clone(),
            notifier.clone(),
        ));
        let engine = Arc::new(SyncEngine::new(
            store.clone(),
            network,
            monitor.clone(),
            notifier,
            config.sync(),
        ));

        info!(
            "Outbox ready for {} ({} pending on {})",
            config.origin,
            store.size().await,
            store.backend_name()
        );

        Ok(Outbox {
            config,
            monitor,
            store,
            client,
            engine,
        })
    }
}

/// One offline-capable application context.
///
/// Owns a single monitor, queue, interceptor and engine. Several contexts
/// with different data directories can live in the same process.
pub struct Outbox {
    config: OutboxConfig,
    monitor: Arc<ConnectivityMonitor>,
    store: Arc<QueueStore>,
    client: Arc<OfflineClient>,
    engine: Arc<SyncEngine>,
}

impl Outbox {
    pub fn builder(config: OutboxConfig) -> OutboxBuilder {
        OutboxBuilder {
            config,
            network: None,
            backend: None,
            notifier: None,
            initial: Connectivity::Online,
        }
    }

    /// Build a context with default collaborators.
    pub async fn open(config: OutboxConfig) -> Result<Self> {
        Self::builder(config).build().await
    }

    pub fn config(&self) -> &OutboxConfig {
        &self.config
    }

    /// The interceptor the host sends its traffic through.
    pub fn client(&self) -> &Arc<OfflineClient> {
        &self.client
    }

    pub fn engine(&self) -> &Arc<SyncEngine> {
        &self.engine
    }

    pub fn monitor(&self) -> &Arc<ConnectivityMonitor> {
        &self.monitor
    }

    pub fn store(&self) -> &Arc<QueueStore> {
        &self.store
    }

    /// Start background syncing.
    ///
    /// Probes the origin first so the scheduler starts from the real state
    /// rather than the assumed one; leftover items are only drained if the
    /// origin answered. Must be called from within a tokio runtime.
    pub async fn start(&self) -> Running {
        let state = self.monitor.check_connection().await;

        let (scheduler, handle) = SyncScheduler::new(self.config.scheduler());
        let task = tokio::spawn(handle.run(self.engine.clone()));
        info!("Background sync started, origin {}", state);

        Running { scheduler, task }
    }
}

/// Handle to a started context's background sync.
pub struct Running {
    scheduler: SyncScheduler,
    task: JoinHandle<()>,
}

impl Running {
    /// Manual retry: run a pass now.
    ///
    /// # Errors
    /// - Background sync has stopped
    pub async fn retry(&self) -> Result<SyncOutcome> {
        self.scheduler.request_sync().await
    }

    /// Stop background syncing and wait for the task to finish.
    pub async fn shutdown(self) {
        self.scheduler.shutdown().await;
        if let Err(e) = self.task.await {
            warn!("Sync scheduler task ended abnormally: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use outbox_common::{Method, NotifyKind};
    use outbox_connectivity::LinkSignal;
    use outbox_intercept::{Dispatch, Form, QUEUED_HEADER};
    use outbox_queue::{MemoryBackend, Payload};
    use outbox_transport::{Request, ScriptedClient};
    use std::sync::Mutex;
    use std::time::Duration;
    use tempfile::TempDir;

    #[derive(Default)]
    struct Recorder(Mutex<Vec<(String, NotifyKind)>>);

    impl Recorder {
        fn messages(&self) -> Vec<String> {
            self.0.lock().unwrap().iter().map(|(m, _)| m.clone()).collect()
        }
    }

    impl Notifier for Recorder {
        fn notify(&self, message: &str, kind: NotifyKind) {
            self.0.lock().unwrap().push((message.to_string(), kind));
        }
    }

    fn test_config() -> OutboxConfig {
        OutboxConfig {
            origin: "https://todo.test".to_string(),
            probe_path: "/health".to_string(),
            restore_settle_ms: 10,
            ..OutboxConfig::default()
        }
    }

    async fn wait_until_empty(store: &QueueStore) -> bool {
        for _ in 0..100 {
            if store.is_empty().await {
                return true;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        false
    }

    #[tokio::test]
    async fn test_offline_form_roundtrip() {
        let network = ScriptedClient::new();
        let recorder = Arc::new(Recorder::default());
        let outbox = Outbox::builder(test_config())
            .network(Arc::new(network.clone()))
            .backend(Arc::new(MemoryBackend::new()))
            .notifier(recorder.clone())
            .build()
            .await
            .unwrap();
        let running = outbox.start().await;
        assert!(outbox.monitor().is_online());

        // Connection drops.
        network.set_reachable(false);
        outbox.monitor().handle_signal(LinkSignal::Offline).await;
        network.clear_requests();

        let form = Form::new("https://todo.test/todos")
            .offline(true)
            .field("title", "Buy milk");
        let dispatch = outbox.client().submit_form(&form).await.unwrap();
        assert!(dispatch.is_queued());
        assert_eq!(network.request_count(), 0);

        let items = outbox.store().all().await;
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].url, "https://todo.test/todos");
        assert_eq!(items[0].payload, Payload::form([("title", "Buy milk")]));

        // Connection returns.
        network.set_reachable(true);
        outbox.monitor().handle_signal(LinkSignal::Online).await;
        assert!(wait_until_empty(outbox.store()).await);

        let requests: Vec<Request> = network
            .requests()
            .into_iter()
            .filter(|r| r.method == Method::Post)
            .collect();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].url, "https://todo.test/todos");
        assert_eq!(requests[0].body.as_deref(), Some(&b"title=Buy+milk"[..]));
        assert!(recorder
            .messages()
            .contains(&"1 action synchronized".to_string()));

        running.shutdown().await;
    }

    #[tokio::test]
    async fn test_queue_survives_restart() {
        let temp = TempDir::new().unwrap();
        let config = OutboxConfig {
            data_dir: Some(temp.path().to_path_buf()),
            ..test_config()
        };
        let network = ScriptedClient::new();
        network.set_reachable(false);

        {
            let outbox = Outbox::builder(config.clone())
                .network(Arc::new(network.clone()))
                .initial_state(Connectivity::Offline)
                .build()
                .await
                .unwrap();
            let request = Request::post("https://todo.test/todos/7")
                .json(&serde_json::json!({ "done": true }))
                .unwrap();
            let response = outbox
                .client()
                .send(request)
                .await
                .unwrap();
            assert_eq!(response.status, 202);
            assert!(response.headers.contains_key(QUEUED_HEADER));
        }

        network.set_reachable(true);
        let outbox = Outbox::builder(config)
            .network(Arc::new(network.clone()))
            .build()
            .await
            .unwrap();
        assert_eq!(outbox.store().size().await, 1);

        // Startup drains what the previous session left.
        let running = outbox.start().await;
        assert!(wait_until_empty(outbox.store()).await);
        running.shutdown().await;
    }

    #[tokio::test]
    async fn test_start_during_outage_skips_startup_pass() {
        let network = ScriptedClient::new();
        let outbox = Outbox::builder(test_config())
            .network(Arc::new(network.clone()))
            .backend(Arc::new(MemoryBackend::new()))
            .build()
            .await
            .unwrap();
        outbox
            .store()
            .enqueue(Method::Post, "https://todo.test/todos", Payload::form([("title", "x")]))
            .await
            .unwrap();
        assert!(outbox.monitor().is_online());

        network.set_reachable(false);
        let running = outbox.start().await;
        tokio::time::sleep(Duration::from_millis(50)).await;

        assert!(!outbox.monitor().is_online());
        assert_eq!(outbox.store().size().await, 1);
        // Only the HEAD check went out.
        let requests = network.requests();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].method, Method::Head);
        assert!(outbox.engine().last_report().is_none());

        running.shutdown().await;
    }

    #[tokio::test]
    async fn test_manual_retry() {
        let network = ScriptedClient::new();
        let outbox = Outbox::builder(test_config())
            .network(Arc::new(network.clone()))
            .backend(Arc::new(MemoryBackend::new()))
            .initial_state(Connectivity::Offline)
            .build()
            .await
            .unwrap();

        network.set_reachable(false);
        let running = outbox.start().await;
        let dispatch = outbox
            .client()
            .dispatch(Request::new(Method::Delete, "https://todo.test/todos/3"))
            .await
            .unwrap();
        assert!(matches!(dispatch, Dispatch::Queued { .. }));

        network.set_reachable(true);
        let outcome = running.retry().await.unwrap();
        assert_eq!(outcome.report().unwrap().succeeded, 1);
        assert!(outbox.store().is_empty().await);

        running.shutdown().await;
    }

    #[tokio::test]
    async fn test_contexts_are_independent() {
        let first = Outbox::builder(test_config())
            .network(Arc::new(ScriptedClient::new()))
            .backend(Arc::new(MemoryBackend::new()))
            .initial_state(Connectivity::Offline)
            .build()
            .await
            .unwrap();
        let second = Outbox::builder(test_config())
            .network(Arc::new(ScriptedClient::new()))
            .backend(Arc::new(MemoryBackend::new()))
            .build()
            .await
            .unwrap();

        first
            .client()
            .dispatch(Request::post("https://todo.test/a"))
            .await
            .unwrap();

        assert_eq!(first.store().size().await, 1);
        assert!(second.store().is_empty().await);
        assert!(!first.monitor().is_online());
        assert!(second.monitor().is_online());
    }

    #[tokio::test]
    async fn test_invalid_config_rejected() {
        let config = OutboxConfig {
            origin: "nope".to_string(),
            ..OutboxConfig::default()
        };
        assert!(Outbox::builder(config)
            .network(Arc::new(ScriptedClient::new()))
            .backend(Arc::new(MemoryBackend::new()))
            .build()
            .await
            .is_err());
    }
}
