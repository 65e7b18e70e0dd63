//! Offline-aware client decorator.

use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, info, warn};
use url::Url;

use outbox_common::{Error, ItemId, Notifier, NotifyKind, Result};
use outbox_connectivity::ConnectivityMonitor;
use outbox_queue::{Durability, Payload, QueueItem, QueueStore};
use outbox_transport::{HttpClient, Request, Response};

use crate::form::Form;

/// Header carrying the queue id on synthetic responses.
pub const QUEUED_HEADER: &str = "x-outbox-queued";

const QUEUED_MESSAGE: &str = "Action queued, will run when back online";
const NOT_SAVED_MESSAGE: &str =
    "Action queued but could not be saved; it will be lost if the app restarts";

/// Outcome of an intercepted call.
#[derive(Debug, Clone)]
pub enum Dispatch {
    /// The network answered (with any status).
    Delivered(Response),
    /// The call was deferred and will be replayed by the sync engine.
    Queued {
        item: QueueItem,
        durability: Durability,
    },
}

impl Dispatch {
    pub fn is_queued(&self) -> bool {
        matches!(self, Dispatch::Queued { .. })
    }

    pub fn is_delivered(&self) -> bool {
        matches!(self, Dispatch::Delivered(_))
    }

    /// Queue id, for undo.
    pub fn queued_id(&self) -> Option<ItemId> {
        match self {
            Dispatch::Queued { item, .. } => Some(item.id),
            Dispatch::Delivered(_) => None,
        }
    }

    /// The real response, or a synthetic `202 {"queued": true}` receipt.
    pub fn into_response(self) -> Response {
        match self {
            Dispatch::Delivered(response) => response,
            Dispatch::Queued { item, .. } => queued_receipt(item.id),
        }
    }
}

fn queued_receipt(id: ItemId) -> Response {
    let mut response = Response::new(202)
        .with_header("content-type", "application/json")
        .with_header(QUEUED_HEADER, id.to_string());
    response.body = r#"{"queued":true}"#.into();
    response
}

/// Decorator that defers mutating calls while offline.
///
/// Read-only calls are never queued: they go to the network and fail there if
/// it is down.
pub struct OfflineClient {
    inner: Arc<dyn HttpClient>,
    monitor: Arc<ConnectivityMonitor>,
    store: Arc<QueueStore>,
    notifier: Arc<dyn Notifier>,
}

impl OfflineClient {
    pub fn new(
        inner: Arc<dyn HttpClient>,
        monitor: Arc<ConnectivityMonitor>,
        store: Arc<QueueStore>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        Self {
            inner,
            monitor,
            store,
            notifier,
        }
    }

    /// Issue `request`, deferring it if it mutates and the origin is
    /// unreachable.
    ///
    /// A mutating call that fails at connection level while the monitor still
    /// believed it was online is queued too, and the monitor flips to offline.
    ///
    /// # Errors
    /// - Read-only call failed
    /// - Queuing was refused (invalid request)
    pub async fn dispatch(&self, request: Request) -> Result<Dispatch> {
        if !request.method.is_mutating() {
            return self.pass_through(request).await.map(Dispatch::Delivered);
        }

        if !self.monitor.is_online() {
            return self.defer(request).await;
        }

        match self.inner.send(request.clone()).await {
            Ok(response) => Ok(Dispatch::Delivered(response)),
            Err(e) if e.is_connectivity() => {
                warn!("{} {} failed, queuing: {}", request.method, request.url, e);
                self.monitor.mark_offline(&e.to_string());
                self.defer(request).await
            }
            Err(e) => Err(e),
        }
    }

    /// Submit a form.
    ///
    /// Offline, forms that opted in are queued as `form-submission` items;
    /// all other forms go to the network.
    ///
    /// # Errors
    /// - `Error::UnsupportedPayload` if the form has file fields and would
    ///   have to be queued; file contents cannot be kept in the queue
    pub async fn submit_form(&self, form: &Form) -> Result<Dispatch> {
        let queueable = form.offline && form.method.is_mutating();

        if queueable && !self.monitor.is_online() {
            return self.defer_form(form).await;
        }

        let request = form.to_request();
        if !queueable {
            return self.pass_through(request).await.map(Dispatch::Delivered);
        }

        match self.inner.send(request).await {
            Ok(response) => Ok(Dispatch::Delivered(response)),
            Err(e) if e.is_connectivity() => {
                warn!("Form submission to {} failed, queuing: {}", form.action, e);
                self.monitor.mark_offline(&e.to_string());
                self.defer_form(form).await
            }
            Err(e) => Err(e),
        }
    }

    /// The queue this client writes to.
    pub fn store(&self) -> &Arc<QueueStore> {
        &self.store
    }

    async fn pass_through(&self, request: Request) -> Result<Response> {
        let result = self.inner.send(request).await;
        if let Err(e) = &result {
            if e.is_connectivity() {
                self.monitor.mark_offline(&e.to_string());
            }
        }
        result
    }

    async fn defer(&self, request: Request) -> Result<Dispatch> {
        check_replayable(&request)?;
        let payload = Payload::raw(request.headers, request.body.map(|b| b.to_vec()));
        let (item, durability) = self
            .store
            .enqueue(request.method, request.url, payload)
            .await?;
        Ok(self.queued(item, durability))
    }

    async fn defer_form(&self, form: &Form) -> Result<Dispatch> {
        if form.has_files() {
            warn!("Refusing to queue form for {}: it contains files", form.action);
            self.notifier.notify(
                "This form has attachments and cannot be saved offline. Try again when back online",
                NotifyKind::Error,
            );
            return Err(Error::UnsupportedPayload(format!(
                "form for {} contains file fields",
                form.action
            )));
        }

        check_url(&form.action)?;
        let payload = Payload::FormSubmission {
            fields: form.text_fields(),
        };
        let (item, durability) = self
            .store
            .enqueue(form.method, form.action.clone(), payload)
            .await?;
        Ok(self.queued(item, durability))
    }

    fn queued(&self, item: QueueItem, durability: Durability) -> Dispatch {
        match durability {
            Durability::Persisted => {
                info!("Queued {}", item);
                self.notifier.notify(QUEUED_MESSAGE, NotifyKind::Info);
            }
            Durability::MemoryOnly => {
                warn!("Queued {} in memory only", item);
                self.notifier.notify(NOT_SAVED_MESSAGE, NotifyKind::Error);
            }
        }
        Dispatch::Queued { item, durability }
    }
}

/// Refuse requests that could never be delivered, so they are not queued
/// and retried forever.
fn check_replayable(request: &Request) -> Result<()> {
    check_url(&request.url)?;
    for (name, value) in &request.headers {
        let bad_name = name.is_empty()
            || !name
                .bytes()
                .all(|b| b.is_ascii_graphic() && !b"()<>@,;:\\\"/[]?={}".contains(&b));
        let bad_value = value.bytes().any(|b| (b < 0x20 && b != b'\t') || b == 0x7f);
        if bad_name || bad_value {
            return Err(Error::InvalidInput(format!("Invalid header '{}'", name)));
        }
    }
    Ok(())
}

fn check_url(url: &str) -> Result<()> {
    let parsed =
        Url::parse(url).map_err(|e| Error::InvalidInput(format!("Invalid URL '{}': {}", url, e)))?;
    match parsed.scheme() {
        "http" | "https" => Ok(()),
        other => Err(Error::InvalidInput(format!(
            "Unsupported URL scheme '{}' in {}",
            other, url
        ))),
    }
}

/// Lets the decorator stand in wherever a plain client is expected. Queued
/// calls answer with the synthetic receipt; check [`QUEUED_HEADER`] to tell
/// them apart.
#[async_trait]
impl HttpClient for OfflineClient {
    fn name(&self) -> &str {
        "offline"
    }

    async fn send(&self, request: Request) -> Result<Response> {
        let dispatch = self.dispatch(request).await?;
        debug!("Dispatched (queued: {})", dispatch.is_queued());
        Ok(dispatch.into_response())
    }
}
