//! Mock network for testing
//!
//! Responses are configured per URL; unconfigured URLs fail as if the
//! device were offline.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use super::{Network, Request, Response};
use crate::error::NetworkError;

/// What the mock does for a given URL
#[derive(Debug, Clone)]
pub enum MockBehavior {
    /// Return this response
    Respond(Response),
    /// Fail with a connection error
    Fail,
    /// Never resolve
    Hang,
}

/// Mock network for testing.
///
/// # Example
/// ```ignore
/// let net = MockNetwork::new()
///     .with_response("http://localhost:8080/api/tasks", Response::new(200, "[]"));
/// ```
#[derive(Clone, Default)]
pub struct MockNetwork {
    routes: Arc<Mutex<HashMap<String, MockBehavior>>>,
    offline: Arc<Mutex<bool>>,
    captured: Arc<Mutex<Vec<Request>>>,
}

impl MockNetwork {
    pub fn new() -> Self {
        Self::default()
    }

    /// Respond to `url` with `response`
    pub fn with_response(self, url: &str, response: Response) -> Self {
        self.set(url, MockBehavior::Respond(response));
        self
    }

    /// Fail requests to `url`
    pub fn with_failure(self, url: &str) -> Self {
        self.set(url, MockBehavior::Fail);
        self
    }

    /// Never resolve requests to `url`
    pub fn with_hang(self, url: &str) -> Self {
        self.set(url, MockBehavior::Hang);
        self
    }

    /// Replace the behavior for `url`
    pub fn set(&self, url: &str, behavior: MockBehavior) {
        self.routes
            .lock()
            .unwrap()
            .insert(url.to_string(), behavior);
    }

    /// Fail every request regardless of configured routes
    pub fn set_offline(&self, offline: bool) {
        *self.offline.lock().unwrap() = offline;
    }

    /// Requests seen so far
    pub fn captured(&self) -> Vec<Request> {
        self.captured.lock().unwrap().clone()
    }

    /// Number of requests made to `url`
    pub fn calls_to(&self, url: &str) -> usize {
        self.captured
            .lock()
            .unwrap()
            .iter()
            .filter(|r| r.url.as_str() == url)
            .count()
    }
}

#[async_trait]
impl Network for MockNetwork {
    async fn fetch(&self, request: &Request) -> Result<Response, NetworkError> {
        self.captured.lock().unwrap().push(request.clone());

        if *self.offline.lock().unwrap() {
            return Err(NetworkError::Connect("mock offline".to_string()));
        }

        let behavior = self
            .routes
            .lock()
            .unwrap()
            .get(request.url.as_str())
            .cloned();

        match behavior {
            Some(MockBehavior::Respond(response)) => Ok(response),
            Some(MockBehavior::Hang) => {
                futures::future::pending::<()>().await;
                Err(NetworkError::Timeout)
            }
            Some(MockBehavior::Fail) | None => Err(NetworkError::Connect(format!(
                "mock: no route for {}",
                request.url
            ))),
        }
    }
}
