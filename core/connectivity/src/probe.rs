//! Active reachability probe.

use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

use outbox_common::Method;
use outbox_transport::{HttpClient, Request};

/// Where and how to probe.
#[derive(Debug, Clone)]
pub struct ProbeConfig {
    /// Cheap same-origin route that does not mutate server state.
    pub url: String,
    /// Deadline after which the origin is considered unreachable.
    pub timeout: Duration,
}

impl ProbeConfig {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            timeout: Duration::from_secs(5),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

/// Result of a single probe.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProbeOutcome {
    /// The origin answered with 2xx or 3xx.
    Reachable { status: u16 },
    /// The origin answered with another status.
    Rejected { status: u16 },
    /// The request never completed.
    Unreachable { reason: String },
    /// No answer before the deadline.
    TimedOut,
}

impl ProbeOutcome {
    pub fn is_reachable(&self) -> bool {
        matches!(self, ProbeOutcome::Reachable { .. })
    }
}

/// Issues HEAD requests against the probe route with caching disabled.
pub struct Probe {
    client: Arc<dyn HttpClient>,
    config: ProbeConfig,
}

impl Probe {
    pub fn new(client: Arc<dyn HttpClient>, config: ProbeConfig) -> Self {
        Self { client, config }
    }

    fn request(&self) -> Request {
        Request::new(Method::Head, self.config.url.clone())
            .header("cache-control", "no-cache, no-store")
            .header("pragma", "no-cache")
    }

    /// Probe once.
    pub async fn run(&self) -> ProbeOutcome {
        let outcome =
            match tokio::time::timeout(self.config.timeout, self.client.send(self.request())).await
            {
                Err(_) => ProbeOutcome::TimedOut,
                Ok(Err(e)) => ProbeOutcome::Unreachable {
                    reason: e.to_string(),
                },
                Ok(Ok(response)) if response.is_success() || response.is_redirect() => {
                    ProbeOutcome::Reachable {
                        status: response.status,
                    }
                }
                Ok(Ok(response)) => ProbeOutcome::Rejected {
                    status: response.status,
                },
            };

        debug!("Probe {} -> {:?}", self.config.url, outcome);
        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use outbox_common::Error;
    use outbox_transport::{Response, ScriptedClient};

    fn probe(client: &ScriptedClient) -> Probe {
        Probe::new(
            Arc::new(client.clone()),
            ProbeConfig::new("https://app.test/health").with_timeout(Duration::from_millis(50)),
        )
    }

    #[tokio::test]
    async fn test_probe_request_shape() {
        let client = ScriptedClient::new();
        probe(&client).run().await;

        let request = &client.requests()[0];
        assert_eq!(request.method, Method::Head);
        assert_eq!(request.url, "https://app.test/health");
        assert!(request.body.is_none());
        assert_eq!(request.header_value("cache-control"), Some("no-cache, no-store"));
    }

    #[tokio::test]
    async fn test_status_classification() {
        let client = ScriptedClient::new();
        let probe = probe(&client);

        client.push_status(204);
        assert_eq!(probe.run().await, ProbeOutcome::Reachable { status: 204 });

        client.push_status(304);
        assert!(probe.run().await.is_reachable());

        client.push_status(503);
        assert_eq!(probe.run().await, ProbeOutcome::Rejected { status: 503 });
    }

    #[tokio::test]
    async fn test_network_error_is_unreachable() {
        let client = ScriptedClient::new();
        client.push_outcome(Err(Error::Network("dns".to_string())));
        assert!(matches!(
            probe(&client).run().await,
            ProbeOutcome::Unreachable { .. }
        ));
    }

    #[tokio::test]
    async fn test_slow_origin_times_out() {
        let client = ScriptedClient::new();
        client.set_latency(Duration::from_millis(500));
        client.respond_with(|_| Ok(Response::new(200)));
        assert_eq!(probe(&client).run().await, ProbeOutcome::TimedOut);
    }
}
