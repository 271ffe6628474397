//! HTTP Client Implementation using Reqwest

use async_trait::async_trait;
use bridge_traits::{
    error::{BridgeError, Result},
    http::{HttpClient, HttpMethod, HttpRequest, HttpResponse},
};
use reqwest::Client;
use std::collections::HashMap;
use std::time::Duration;
use tracing::{debug, warn};

/// Reqwest-based HTTP client implementation
///
/// Provides HTTP operations with:
/// - Connection pooling via reqwest
/// - TLS through rustls
/// - WebDAV verbs (`PROPFIND`, `MKCOL`) as extension methods
///
/// Requests are never retried here. A failed sync stays failed until the
/// next explicit sync attempt.
pub struct ReqwestHttpClient {
    client: Client,
}

impl ReqwestHttpClient {
    /// Create a new HTTP client with default configuration
    pub fn new() -> Result<Self> {
        Self::with_timeout(Duration::from_secs(30))
    }

    /// Create a new HTTP client with custom timeout
    pub fn with_timeout(timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .connect_timeout(Duration::from_secs(10))
            .pool_max_idle_per_host(4)
            .user_agent(concat!("passvault-core/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| BridgeError::NotAvailable(format!("HTTP client: {}", e)))?;

        Ok(Self { client })
    }

    /// Create a new HTTP client with custom configuration
    pub fn with_client(client: Client) -> Self {
        Self { client }
    }

    /// Convert bridge HttpMethod to reqwest Method
    fn convert_method(method: HttpMethod) -> Result<reqwest::Method> {
        Ok(match method {
            HttpMethod::Get => reqwest::Method::GET,
            HttpMethod::Post => reqwest::Method::POST,
            HttpMethod::Put => reqwest::Method::PUT,
            HttpMethod::Delete => reqwest::Method::DELETE,
            HttpMethod::Head => reqwest::Method::HEAD,
            HttpMethod::Propfind | HttpMethod::Mkcol => {
                reqwest::Method::from_bytes(method.as_str().as_bytes())
                    .map_err(|e| BridgeError::OperationFailed(e.to_string()))?
            }
        })
    }

    /// Build reqwest request from bridge request
    fn build_request(&self, request: HttpRequest) -> Result<reqwest::RequestBuilder> {
        let method = Self::convert_method(request.method)?;
        let mut req = self.client.request(method, &request.url);

        for (key, value) in request.headers {
            req = req.header(key, value);
        }

        if let Some(body) = request.body {
            req = req.body(body);
        }

        if let Some(timeout) = request.timeout {
            req = req.timeout(timeout);
        }

        Ok(req)
    }

    fn map_transport_error(e: reqwest::Error) -> BridgeError {
        if e.is_timeout() {
            BridgeError::Network("Request timed out".to_string())
        } else if e.is_connect() {
            BridgeError::Network(format!("Connection failed: {}", e))
        } else if e.is_builder() {
            BridgeError::OperationFailed(e.to_string())
        } else {
            BridgeError::Network(e.to_string())
        }
    }
}

#[async_trait]
impl HttpClient for ReqwestHttpClient {
    async fn execute(&self, request: HttpRequest) -> Result<HttpResponse> {
        debug!(method = request.method.as_str(), "Executing HTTP request");

        let response = self
            .build_request(request)?
            .send()
            .await
            .map_err(|e| {
                warn!(error = %e, "HTTP request failed");
                Self::map_transport_error(e)
            })?;

        let status = response.status().as_u16();
        let headers: HashMap<String, String> = response
            .headers()
            .iter()
            .filter_map(|(k, v)| v.to_str().ok().map(|s| (k.to_string(), s.to_string())))
            .collect();

        let body = response.bytes().await.map_err(Self::map_transport_error)?;

        Ok(HttpResponse {
            status,
            headers,
            body,
        })
    }
}
