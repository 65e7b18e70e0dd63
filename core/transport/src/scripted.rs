//! In-memory scripted client for testing.

use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use outbox_common::{Error, Result};

use crate::client::{HttpClient, Request, Response};

type Handler = Box<dyn Fn(&Request) -> Result<Response> + Send + Sync>;

struct Inner {
    reachable: AtomicBool,
    latency: Mutex<Duration>,
    scripted: Mutex<VecDeque<Result<Response>>>,
    handler: Mutex<Option<Handler>>,
    log: Mutex<Vec<Request>>,
}

/// Scripted network client.
///
/// Useful for testing and development. Every request is recorded; answers
/// come from, in order of precedence: "unreachable" mode, the queue of
/// scripted outcomes, the handler, then a default `200 OK`.
///
/// Clones share the same script and log.
#[derive(Clone)]
pub struct ScriptedClient {
    inner: Arc<Inner>,
}

impl ScriptedClient {
    /// Create a reachable client answering `200 OK`.
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Inner {
                reachable: AtomicBool::new(true),
                latency: Mutex::new(Duration::ZERO),
                scripted: Mutex::new(VecDeque::new()),
                handler: Mutex::new(None),
                log: Mutex::new(Vec::new()),
            }),
        }
    }

    /// Simulate the network going away (every request fails with
    /// `Error::Network`) or coming back.
    pub fn set_reachable(&self, reachable: bool) {
        self.inner.reachable.store(reachable, Ordering::SeqCst);
    }

    /// Whether requests currently reach the "server".
    pub fn is_reachable(&self) -> bool {
        self.inner.reachable.load(Ordering::SeqCst)
    }

    /// Delay every answer, to keep calls in flight.
    pub fn set_latency(&self, latency: Duration) {
        *self.inner.latency.lock().unwrap() = latency;
    }

    /// Queue a one-shot outcome for the next request.
    pub fn push_outcome(&self, outcome: Result<Response>) {
        self.inner.scripted.lock().unwrap().push_back(outcome);
    }

    /// Queue a one-shot response with the given status.
    pub fn push_status(&self, status: u16) {
        self.push_outcome(Ok(Response::new(status)));
    }

    /// Answer requests with `handler` once the scripted outcomes run out.
    pub fn respond_with<F>(&self, handler: F)
    where
        F: Fn(&Request) -> Result<Response> + Send + Sync + 'static,
    {
        *self.inner.handler.lock().unwrap() = Some(Box::new(handler));
    }

    /// All requests received so far, in arrival order.
    pub fn requests(&self) -> Vec<Request> {
        self.inner.log.lock().unwrap().clone()
    }

    /// Number of requests received so far.
    pub fn request_count(&self) -> usize {
        self.inner.log.lock().unwrap().len()
    }

    /// Forget recorded requests.
    pub fn clear_requests(&self) {
        self.inner.log.lock().unwrap().clear();
    }

    fn answer(&self, request: &Request) -> Result<Response> {
        if !self.is_reachable() {
            return Err(Error::Network(format!(
                "connection refused: {}",
                request.url
            )));
        }

        if let Some(outcome) = self.inner.scripted.lock().unwrap().pop_front() {
            return outcome;
        }

        match self.inner.handler.lock().unwrap().as_ref() {
            Some(handler) => handler(request),
            None => Ok(Response::new(200)),
        }
    }
}

impl Default for ScriptedClient {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl HttpClient for ScriptedClient {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn send(&self, request: Request) -> Result<Response> {
        self.inner.log.lock().unwrap().push(request.clone());

        let latency = *self.inner.latency.lock().unwrap();
        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }

        self.answer(&request)
    }
}
