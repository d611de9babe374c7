#![allow(dead_code)]

use async_trait::async_trait;
use mockall::mock;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::time::Duration;

use rulerunner::error::TransportError;
use rulerunner::transport::{HttpRequest, HttpResponse, HttpTransport};

// Mock HTTP transport for testing the runner
mock! {
    pub Transport {}

    #[async_trait]
    impl HttpTransport for Transport {
        async fn send(&self, request: &HttpRequest) -> Result<HttpResponse, TransportError>;
    }
}

/// Scripted transport answering by `"METHOD url"`, recording every request
#[derive(Default)]
pub struct StubTransport {
    routes: Mutex<HashMap<String, HttpResponse>>,
    delays: Mutex<HashMap<String, Duration>>,
    requests: Mutex<Vec<HttpRequest>>,
}

impl StubTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn route(self, method: &str, url: &str, response: HttpResponse) -> Self {
        self.routes.lock().insert(format!("{} {}", method, url), response);
        self
    }

    pub fn delay(self, url: &str, delay: Duration) -> Self {
        self.delays.lock().insert(url.to_string(), delay);
        self
    }

    pub fn requests(&self) -> Vec<HttpRequest> {
        self.requests.lock().clone()
    }

    pub fn urls(&self) -> Vec<String> {
        self.requests.lock().iter().map(|r| r.url.clone()).collect()
    }
}

#[async_trait]
impl HttpTransport for StubTransport {
    async fn send(&self, request: &HttpRequest) -> Result<HttpResponse, TransportError> {
        self.requests.lock().push(request.clone());

        let delay = self.delays.lock().get(&request.url).copied();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let response = self
            .routes
            .lock()
            .get(&format!("{} {}", request.method, request.url))
            .cloned();

        match response {
            Some(response) => Ok(response),
            None => Err(TransportError::ConnectionFailed(format!("no route for {}", request.url))),
        }
    }
}

/// JSON response with a content type header
pub fn json_response(status_code: u16, body: serde_json::Value) -> HttpResponse {
    HttpResponse::new(status_code, body.to_string()).with_header("Content-Type", "application/json")
}
