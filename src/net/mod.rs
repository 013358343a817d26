//! Request/response exchange with the network
//!
//! The router, preloader and sync replayer all talk to the network through
//! the [`Network`] trait so that a transport failure (`Err`) stays distinct
//! from an HTTP error status (`Ok` with a non-2xx [`Response`]).

use std::collections::BTreeMap;

use async_trait::async_trait;
use reqwest::{Method, Url};
use serde::{Deserialize, Serialize};

use crate::error::NetworkError;

pub mod http;
#[cfg(test)]
pub mod mock;

pub use http::HttpNetwork;
#[cfg(test)]
#[allow(unused_imports)]
pub use mock::MockNetwork;

/// Network exchange trait
#[async_trait]
pub trait Network: Send + Sync {
    /// Perform one request. Transport failures are `Err`; any status is `Ok`.
    async fn fetch(&self, request: &Request) -> Result<Response, NetworkError>;
}

/// An outgoing request
#[derive(Debug, Clone)]
pub struct Request {
    pub method: Method,
    pub url: Url,
    /// Header names are stored lowercase
    pub headers: BTreeMap<String, String>,
    pub body: Option<Vec<u8>>,
}

impl Request {
    /// Create a request with no headers or body
    pub fn new(method: Method, url: Url) -> Self {
        Self {
            method,
            url,
            headers: BTreeMap::new(),
            body: None,
        }
    }

    /// Shorthand for a GET request
    pub fn get(url: Url) -> Self {
        Self::new(Method::GET, url)
    }

    /// Add a header (name is lowercased)
    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        self.headers
            .insert(name.to_ascii_lowercase(), value.to_string());
        self
    }

    /// Attach a body
    pub fn with_body(mut self, body: impl Into<Vec<u8>>) -> Self {
        self.body = Some(body.into());
        self
    }

    /// Look up a header, case-insensitively
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .get(&name.to_ascii_lowercase())
            .map(String::as_str)
    }

    /// Whether the `Accept` header asks for an HTML document
    pub fn accepts_html(&self) -> bool {
        self.header("accept")
            .is_some_and(|accept| accept.contains("text/html"))
    }

    /// Only GET responses are ever written to a response cache
    pub fn is_cacheable_method(&self) -> bool {
        self.method == Method::GET
    }
}

/// A response, either from the network or out of a cache
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Response {
    pub status: u16,
    /// Header names are stored lowercase
    pub headers: BTreeMap<String, String>,
    pub body: Vec<u8>,
}

impl Response {
    /// Create a response with no headers
    pub fn new(status: u16, body: impl Into<Vec<u8>>) -> Self {
        Self {
            status,
            headers: BTreeMap::new(),
            body: body.into(),
        }
    }

    /// Plain-text response
    pub fn text(status: u16, body: &str) -> Self {
        Self::new(status, body.as_bytes().to_vec())
            .with_header("content-type", "text/plain; charset=utf-8")
    }

    /// JSON response
    pub fn json(status: u16, value: &serde_json::Value) -> Self {
        Self::new(status, value.to_string().into_bytes())
            .with_header("content-type", "application/json")
    }

    /// Add a header (name is lowercased)
    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        self.headers
            .insert(name.to_ascii_lowercase(), value.to_string());
        self
    }

    /// Look up a header, case-insensitively
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .get(&name.to_ascii_lowercase())
            .map(String::as_str)
    }

    /// HTTP 2xx
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Body decoded lossily as UTF-8
    pub fn body_text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }

    /// Parse the body as JSON
    pub fn json_body<T: serde::de::DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        serde_json::from_slice(&self.body)
    }
}
