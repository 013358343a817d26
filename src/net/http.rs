//! reqwest-backed network adapter

use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client as HttpClient;

use super::{Network, Request, Response};
use crate::error::NetworkError;

/// Network adapter over a shared reqwest client
pub struct HttpNetwork {
    http: HttpClient,
}

impl HttpNetwork {
    /// Create a new adapter with the given per-request timeout
    pub fn new(timeout: Duration) -> Result<Self, NetworkError> {
        let http = HttpClient::builder()
            .timeout(timeout)
            .user_agent(concat!("frcpm-offline/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(NetworkError::from)?;

        Ok(Self { http })
    }
}

#[async_trait]
impl Network for HttpNetwork {
    async fn fetch(&self, request: &Request) -> Result<Response, NetworkError> {
        let mut builder = self
            .http
            .request(request.method.clone(), request.url.clone());

        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        if let Some(ref body) = request.body {
            builder = builder.body(body.clone());
        }

        log::debug!("{} {}", request.method, request.url);
        let response = builder.send().await.map_err(NetworkError::from)?;

        let status = response.status().as_u16();
        let headers: BTreeMap<String, String> = response
            .headers()
            .iter()
            .filter_map(|(name, value)| {
                value
                    .to_str()
                    .ok()
                    .map(|v| (name.as_str().to_ascii_lowercase(), v.to_string()))
            })
            .collect();
        let body = response.bytes().await.map_err(NetworkError::from)?.to_vec();

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
    use reqwest::{Method, Url};

    #[tokio::test]
    async fn test_fetch_returns_status_headers_and_body() {
        let mut server = mockito::Server::new_async().await;
        let _m = server
            .mock("GET", "/api/tasks")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"[{"id":1}]"#)
            .create_async()
            .await;

        let network = HttpNetwork::new(Duration::from_secs(5)).unwrap();
        let url = Url::parse(&format!("{}/api/tasks", server.url())).unwrap();
        let resp = network.fetch(&Request::get(url)).await.unwrap();

        assert_eq!(resp.status, 200);
        assert_eq!(resp.header("content-type"), Some("application/json"));
        assert_eq!(resp.body_text(), r#"[{"id":1}]"#);
    }

    #[tokio::test]
    async fn test_non_success_status_is_ok_response() {
        let mut server = mockito::Server::new_async().await;
        let _m = server
            .mock("PUT", "/api/tasks/7")
            .match_header("content-type", "application/json")
            .match_body(r#"{"progress":50}"#)
            .with_status(422)
            .create_async()
            .await;

        let network = HttpNetwork::new(Duration::from_secs(5)).unwrap();
        let url = Url::parse(&format!("{}/api/tasks/7", server.url())).unwrap();
        let req = Request::new(Method::PUT, url)
            .with_header("Content-Type", "application/json")
            .with_body(r#"{"progress":50}"#);

        let resp = network.fetch(&req).await.unwrap();
        assert_eq!(resp.status, 422);
        assert!(!resp.is_success());
    }

    #[tokio::test]
    async fn test_connection_refused_is_network_error() {
        let network = HttpNetwork::new(Duration::from_secs(2)).unwrap();
        // Port 9 (discard) is essentially never listening on test hosts
        let url = Url::parse("http://127.0.0.1:9/api/tasks").unwrap();
        let result = network.fetch(&Request::get(url)).await;
        assert!(result.is_err());
    }
}
