use async_trait::async_trait;
use reqwest::{Client, ClientBuilder, Method, Response};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;

use crate::error::TransportError;

/// Request handed to the HTTP collaborator
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HttpRequest {
    pub method: String,
    pub url: String,
    /// Header lines in declaration order
    pub headers: Vec<(String, String)>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<String>,
    #[serde(with = "duration_secs")]
    pub timeout: Duration,
}

/// Response received from the HTTP collaborator
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HttpResponse {
    pub status_code: u16,
    /// Lowercased header names; repeated headers are joined with ", "
    pub headers: BTreeMap<String, String>,
    pub body: String,
}

impl HttpResponse {
    pub fn new(status_code: u16, body: impl Into<String>) -> Self {
        Self {
            status_code,
            headers: BTreeMap::new(),
            body: body.into(),
        }
    }

    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        self.headers.insert(name.to_ascii_lowercase(), value.to_string());
        self
    }
}

/// Seam between the runner and the network
#[async_trait]
pub trait HttpTransport: Send + Sync {
    /// Perform one request.
    ///
    /// A transport that rejects error statuses must still return the response through
    /// [`TransportError::Status`] so it can be evaluated.
    async fn send(&self, request: &HttpRequest) -> Result<HttpResponse, TransportError>;
}

/// reqwest-backed transport with a shared connection pool
#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    client: Client,
    reject_error_status: bool,
}

impl ReqwestTransport {
    pub fn new() -> Result<Self, TransportError> {
        let client = ClientBuilder::new()
            .pool_max_idle_per_host(10)
            .pool_idle_timeout(Duration::from_secs(30))
            .tcp_keepalive(Duration::from_secs(60))
            .user_agent(format!("{}/{}", crate::NAME, crate::VERSION))
            .redirect(reqwest::redirect::Policy::limited(10))
            .build()
            .map_err(|e| {
                TransportError::InvalidRequest(format!("Failed to build HTTP client: {}", e))
            })?;

        Ok(Self {
            client,
            reject_error_status: true,
        })
    }

    /// Whether 4xx/5xx responses are surfaced as [`TransportError::Status`]
    pub fn reject_error_status(mut self, reject: bool) -> Self {
        self.reject_error_status = reject;
        self
    }

    fn convert_method(method: &str) -> Result<Method, TransportError> {
        Method::from_bytes(method.to_ascii_uppercase().as_bytes())
            .map_err(|_| TransportError::InvalidRequest(format!("Unsupported method: {}", method)))
    }

    fn extract_headers(response: &Response) -> BTreeMap<String, String> {
        let mut headers: BTreeMap<String, String> = BTreeMap::new();
        for (name, value) in response.headers() {
            let value = String::from_utf8_lossy(value.as_bytes()).into_owned();
            headers
                .entry(name.as_str().to_ascii_lowercase())
                .and_modify(|existing| {
                    existing.push_str(", ");
                    existing.push_str(&value);
                })
                .or_insert(value);
        }
        headers
    }
}

#[async_trait]
impl HttpTransport for ReqwestTransport {
    async fn send(&self, request: &HttpRequest) -> Result<HttpResponse, TransportError> {
        let method = Self::convert_method(&request.method)?;
        let mut req_builder = self.client.request(method, &request.url).timeout(request.timeout);

        for (name, value) in &request.headers {
            req_builder = req_builder.header(name.as_str(), value.as_str());
        }

        if let Some(body) = &request.body {
            req_builder = req_builder.body(body.clone());
        }

        let response = req_builder.send().await.map_err(|e| {
            if e.is_timeout() {
                TransportError::Timeout { timeout: request.timeout }
            } else if e.is_connect() {
                TransportError::ConnectionFailed(e.to_string())
            } else if e.is_builder() {
                TransportError::InvalidRequest(e.to_string())
            } else {
                TransportError::Network(e.to_string())
            }
        })?;

        let status = response.status();
        let headers = Self::extract_headers(&response);

        let body = response.bytes().await.map_err(|e| {
            if e.is_timeout() {
                TransportError::Timeout { timeout: request.timeout }
            } else {
                TransportError::Network(format!("Failed to read response body: {}", e))
            }
        })?;

        let response = HttpResponse {
            status_code: status.as_u16(),
            headers,
            body: String::from_utf8_lossy(&body).into_owned(),
        };

        if self.reject_error_status && (status.is_client_error() || status.is_server_error()) {
            log::debug!("HTTP error status: {}", response.status_code);
            return Err(TransportError::Status {
                response: Box::new(response),
            });
        }

        Ok(response)
    }
}

mod duration_secs {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_f64(duration.as_secs_f64())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let seconds = f64::deserialize(deserializer)?;
        Ok(Duration::from_secs_f64(seconds.max(0.0)))
    }
}
