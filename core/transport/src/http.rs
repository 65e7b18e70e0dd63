//! `reqwest`-backed network client.

use async_trait::async_trait;
use reqwest::{header, Client};
use std::collections::BTreeMap;
use std::time::Duration;
use tracing::debug;

use outbox_common::{Error, Method, Result};

use crate::client::{HttpClient, Request, Response};

/// Configuration for the real network client.
#[derive(Debug, Clone)]
pub struct ReqwestClientConfig {
    /// Per-request deadline.
    pub timeout: Duration,
    /// Connect deadline.
    pub connect_timeout: Duration,
    /// User agent sent with every request.
    pub user_agent: String,
}

impl Default for ReqwestClientConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            connect_timeout: Duration::from_secs(10),
            user_agent: "Outbox/0.1".to_string(),
        }
    }
}

/// Network client talking to real servers.
pub struct ReqwestClient {
    http: Client,
}

impl ReqwestClient {
    /// Create a client with the given configuration.
    ///
    /// # Errors
    /// - TLS backend could not be initialised
    pub fn new(config: ReqwestClientConfig) -> Result<Self> {
        let http = Client::builder()
            .user_agent(config.user_agent)
            .timeout(config.timeout)
            .connect_timeout(config.connect_timeout)
            .build()
            .map_err(|e| Error::Network(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self { http })
    }

    fn to_reqwest_method(method: Method) -> reqwest::Method {
        match method {
            Method::Get => reqwest::Method::GET,
            Method::Head => reqwest::Method::HEAD,
            Method::Options => reqwest::Method::OPTIONS,
            Method::Post => reqwest::Method::POST,
            Method::Put => reqwest::Method::PUT,
            Method::Patch => reqwest::Method::PATCH,
            Method::Delete => reqwest::Method::DELETE,
        }
    }

    /// Classify a reqwest failure.
    ///
    /// Only failures to reach or hear back from the server are connectivity
    /// errors. A request that could not even be built (relative URL, bad
    /// header) is the caller's fault and must not flip anyone offline.
    fn map_error(err: reqwest::Error) -> Error {
        if err.is_timeout() {
            Error::Timeout(err.to_string())
        } else if err.is_builder() {
            Error::InvalidInput(format!("Malformed request: {}", err))
        } else if err.is_redirect() {
            Error::InvalidInput(format!("Redirect policy violated: {}", err))
        } else {
            Error::Network(err.to_string())
        }
    }
}

#[async_trait]
impl HttpClient for ReqwestClient {
    fn name(&self) -> &str {
        "reqwest"
    }

    async fn send(&self, request: Request) -> Result<Response> {
        debug!("{} {}", request.method, request.url);

        let mut builder = self
            .http
            .request(Self::to_reqwest_method(request.method), &request.url);

        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        if let Some(body) = request.body {
            builder = builder.body(body);
        }

        let response = builder.send().await.map_err(Self::map_error)?;

        let status = response.status().as_u16();
        let headers: BTreeMap<String, String> = response
            .headers()
            .iter()
            .filter_map(|(name, value)| {
                value
                    .to_str()
                    .ok()
                    .map(|v| (name.as_str().to_string(), v.to_string()))
            })
            .collect();
        let body = response.bytes().await.map_err(Self::map_error)?;

        debug!(
            status,
            content_type = headers.get(header::CONTENT_TYPE.as_str()).map(String::as_str),
            "response received"
        );

        Ok(Response {
            status,
            headers,
            body,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_creation() {
        let client = ReqwestClient::new(ReqwestClientConfig::default()).unwrap();
        assert_eq!(client.name(), "reqwest");
    }

    #[tokio::test]
    async fn test_unreachable_host_is_network_error() {
        let client = ReqwestClient::new(ReqwestClientConfig {
            timeout: Duration::from_secs(2),
            connect_timeout: Duration::from_secs(1),
            ..Default::default()
        })
        .unwrap();

        // Port 9 on loopback is the discard port and is closed on test hosts.
        let err = client
            .send(Request::get("http://127.0.0.1:9/health"))
            .await
            .unwrap_err();
        assert!(err.is_connectivity());
    }

    #[tokio::test]
    async fn test_relative_url_is_not_connectivity() {
        let client = ReqwestClient::new(ReqwestClientConfig::default()).unwrap();

        let err = client
            .send(Request::post("/todos").body("x"))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::InvalidInput(_)));
        assert!(!err.is_connectivity());
    }

    #[tokio::test]
    async fn test_bad_header_value_is_not_connectivity() {
        let client = ReqwestClient::new(ReqwestClientConfig::default()).unwrap();

        // Refused while building, before any connection is attempted.
        let err = client
            .send(Request::post("http://127.0.0.1:9/todos").header("x-bad", "a\nb"))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::InvalidInput(_)));
        assert!(!err.is_connectivity());
    }
}
