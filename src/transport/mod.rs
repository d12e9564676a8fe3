//! HTTP Transport
//!
//! Transport boundary consumed by the bridge: issue a request with
//! method, URL, headers, body, timeout, and a cancellation token, and get
//! back a status/headers/body triple or a network-level error. HTTP error
//! statuses are returned as responses here; classification happens in the
//! executor so retry and circuit decisions stay in one place.

use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use crate::error::{BridgeError, TransportError};

/// HTTP request definition.
#[derive(Clone, Debug)]
pub struct HttpRequest {
    pub method: HttpMethod,
    pub url: String,
    pub headers: HashMap<String, String>,
    pub body: Option<String>,
    pub timeout: Option<Duration>,
}

impl HttpRequest {
    pub fn new(method: HttpMethod, url: impl Into<String>) -> Self {
        Self {
            method,
            url: url.into(),
            headers: HashMap::new(),
            body: None,
            timeout: None,
        }
    }
}

/// HTTP method.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum HttpMethod {
    Get,
    Post,
    Put,
    Patch,
    Delete,
}

impl HttpMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Get => "GET",
            Self::Post => "POST",
            Self::Put => "PUT",
            Self::Patch => "PATCH",
            Self::Delete => "DELETE",
        }
    }
}

/// HTTP response definition. Header names are lowercased.
#[derive(Clone, Debug)]
pub struct HttpResponse {
    pub status: u16,
    pub headers: HashMap<String, String>,
    pub body: String,
}

impl HttpResponse {
    /// Case-insensitive header lookup.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .get(&name.to_ascii_lowercase())
            .map(|s| s.as_str())
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// HTTP transport interface (for dependency injection).
#[async_trait]
pub trait HttpTransport: Send + Sync {
    /// Send a request. Cancelling the token aborts the in-flight call
    /// with `TransportError::Cancelled`.
    async fn send(
        &self,
        request: HttpRequest,
        cancel: &CancellationToken,
    ) -> Result<HttpResponse, BridgeError>;
}

/// Default reqwest-based transport.
pub struct ReqwestHttpTransport {
    client: reqwest::Client,
    default_timeout: Duration,
}

impl ReqwestHttpTransport {
    pub fn new() -> Result<Self, BridgeError> {
        Self::with_timeout(Duration::from_secs(30))
    }

    pub fn with_timeout(timeout: Duration) -> Result<Self, BridgeError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| {
                BridgeError::Transport(TransportError::InvalidRequest {
                    message: format!("failed to build HTTP client: {}", e),
                })
            })?;

        Ok(Self {
            client,
            default_timeout: timeout,
        })
    }

    async fn dispatch(&self, request: HttpRequest) -> Result<HttpResponse, BridgeError> {
        let timeout = request.timeout.unwrap_or(self.default_timeout);

        let mut builder = match request.method {
            HttpMethod::Get => self.client.get(&request.url),
            HttpMethod::Post => self.client.post(&request.url),
            HttpMethod::Put => self.client.put(&request.url),
            HttpMethod::Patch => self.client.patch(&request.url),
            HttpMethod::Delete => self.client.delete(&request.url),
        };

        for (key, value) in &request.headers {
            builder = builder.header(key, value);
        }

        if let Some(body) = request.body {
            builder = builder.body(body);
        }

        let response = builder.timeout(timeout).send().await.map_err(|e| {
            if e.is_timeout() {
                BridgeError::Transport(TransportError::Timeout { timeout })
            } else {
                BridgeError::Transport(TransportError::ConnectionFailed {
                    message: e.to_string(),
                })
            }
        })?;

        let status = response.status().as_u16();

        let mut headers = HashMap::new();
        for (key, value) in response.headers() {
            if let Ok(v) = value.to_str() {
                headers.insert(key.as_str().to_ascii_lowercase(), v.to_string());
            }
        }

        let body = response.text().await.map_err(|e| {
            BridgeError::Transport(TransportError::ConnectionFailed {
                message: format!("failed to read response body: {}", e),
            })
        })?;

        Ok(HttpResponse {
            status,
            headers,
            body,
        })
    }
}

#[async_trait]
impl HttpTransport for ReqwestHttpTransport {
    async fn send(
        &self,
        request: HttpRequest,
        cancel: &CancellationToken,
    ) -> Result<HttpResponse, BridgeError> {
        tokio::select! {
            _ = cancel.cancelled() => Err(BridgeError::Transport(TransportError::Cancelled)),
            result = self.dispatch(request) => result,
        }
    }
}

/// One scripted outcome for the mock transport.
pub enum MockOutcome {
    Response(HttpResponse),
    Error(BridgeError),
}

/// Mock HTTP transport for testing. Outcomes are consumed in FIFO order;
/// every request is recorded.
#[derive(Default)]
pub struct MockHttpTransport {
    outcomes: std::sync::Mutex<VecDeque<MockOutcome>>,
    request_history: std::sync::Mutex<Vec<HttpRequest>>,
    default_response: std::sync::Mutex<Option<HttpResponse>>,
}

impl MockHttpTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a response to return.
    pub fn queue_response(&self, response: HttpResponse) -> &Self {
        self.outcomes
            .lock()
            .unwrap()
            .push_back(MockOutcome::Response(response));
        self
    }

    /// Queue a bare-status response.
    pub fn queue_status(&self, status: u16) -> &Self {
        self.queue_response(HttpResponse {
            status,
            headers: HashMap::new(),
            body: String::new(),
        })
    }

    /// Queue a status response with headers.
    pub fn queue_status_with_headers(&self, status: u16, headers: &[(&str, &str)]) -> &Self {
        self.queue_response(HttpResponse {
            status,
            headers: headers
                .iter()
                .map(|(k, v)| (k.to_ascii_lowercase(), v.to_string()))
                .collect(),
            body: String::new(),
        })
    }

    /// Queue a JSON response.
    pub fn queue_json_response<T: serde::Serialize>(&self, status: u16, body: &T) -> &Self {
        self.queue_response(HttpResponse {
            status,
            headers: [("content-type".to_string(), "application/json".to_string())]
                .into_iter()
                .collect(),
            body: serde_json::to_string(body).unwrap(),
        })
    }

    /// Queue a transport-level error.
    pub fn queue_error(&self, error: BridgeError) -> &Self {
        self.outcomes
            .lock()
            .unwrap()
            .push_back(MockOutcome::Error(error));
        self
    }

    /// Queue a connection failure.
    pub fn queue_connection_failure(&self) -> &Self {
        self.queue_error(BridgeError::Transport(TransportError::ConnectionFailed {
            message: "mock connection failure".to_string(),
        }))
    }

    /// Set the response returned when the queue is empty.
    pub fn set_default_response(&self, response: HttpResponse) -> &Self {
        *self.default_response.lock().unwrap() = Some(response);
        self
    }

    /// All requests seen so far.
    pub fn requests(&self) -> Vec<HttpRequest> {
        self.request_history.lock().unwrap().clone()
    }

    /// Number of requests seen so far.
    pub fn request_count(&self) -> usize {
        self.request_history.lock().unwrap().len()
    }

    /// The most recent request.
    pub fn last_request(&self) -> Option<HttpRequest> {
        self.request_history.lock().unwrap().last().cloned()
    }
}

#[async_trait]
impl HttpTransport for MockHttpTransport {
    async fn send(
        &self,
        request: HttpRequest,
        cancel: &CancellationToken,
    ) -> Result<HttpResponse, BridgeError> {
        if cancel.is_cancelled() {
            return Err(BridgeError::Transport(TransportError::Cancelled));
        }

        self.request_history.lock().unwrap().push(request);

        match self.outcomes.lock().unwrap().pop_front() {
            Some(MockOutcome::Response(response)) => Ok(response),
            Some(MockOutcome::Error(error)) => Err(error),
            None => self
                .default_response
                .lock()
                .unwrap()
                .clone()
                .ok_or_else(|| {
                    BridgeError::Transport(TransportError::ConnectionFailed {
                        message: "no mock response available".to_string(),
                    })
                }),
        }
    }
}
