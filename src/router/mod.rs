//! Request interception and routing
//!
//! The [`Router`] decides whether a request is intercepted, picks a caching
//! strategy for it, and turns every strategy failure into an offline
//! fallback response. It also owns the install/activate lifecycle of the
//! response-cache generation it serves from.

use std::sync::{Arc, Mutex};

use reqwest::Url;

use crate::config::Config;
use crate::error::{ConfigError, Result};
use crate::net::{Network, Request, Response};
use crate::response_cache::{ResponseCache, ResponseStore};

pub mod classify;
pub mod lifecycle;
pub mod offline;
pub mod strategy;

pub use classify::{ResourceCategory, Strategy, classify};
pub use lifecycle::{ActivateReport, InstallReport, LifecycleState};

/// Request router over the current response-cache generation
pub struct Router {
    origin: Url,
    cdn_hosts: Vec<String>,
    offline_url: Url,
    precache: Vec<Url>,
    network: Arc<dyn Network>,
    responses: ResponseStore,
    cache: ResponseCache,
    state: Mutex<LifecycleState>,
}

impl Router {
    /// Create a router serving from `config.cache_name`
    pub fn new(config: &Config, network: Arc<dyn Network>, responses: ResponseStore) -> Result<Self> {
        let origin = config.origin_url()?;
        let offline_url = resolve(&origin, &config.offline_url)?;
        let precache = config
            .precache
            .iter()
            .map(|path| resolve(&origin, path))
            .collect::<Result<Vec<_>>>()?;
        let cache = responses.open(&config.cache_name)?;

        Ok(Self {
            origin,
            cdn_hosts: config.cdn_hosts.clone(),
            offline_url,
            precache,
            network,
            responses,
            cache,
            state: Mutex::new(LifecycleState::Parsed),
        })
    }

    /// The generation this router reads and writes
    pub fn cache(&self) -> &ResponseCache {
        &self.cache
    }

    /// All generations
    pub fn responses(&self) -> &ResponseStore {
        &self.responses
    }

    /// Application origin
    pub fn origin(&self) -> &Url {
        &self.origin
    }

    /// Resolve a path or absolute URL against the application origin
    pub fn resolve(&self, target: &str) -> Result<Url> {
        resolve(&self.origin, target)
    }

    /// Whether a request is intercepted at all.
    ///
    /// Only HTTP(S) requests to the application origin or an allow-listed
    /// CDN host are intercepted.
    pub fn intercepts(&self, request: &Request) -> bool {
        let url = &request.url;
        if !matches!(url.scheme(), "http" | "https") {
            return false;
        }
        if url.origin() == self.origin.origin() {
            return true;
        }
        url.host_str()
            .is_some_and(|host| self.cdn_hosts.iter().any(|cdn| host.contains(cdn.as_str())))
    }

    /// Handle an intercepted request with its classified strategy.
    ///
    /// Returns `None` when the request is not intercepted and should go to
    /// the network untouched.
    pub async fn handle(&self, request: &Request) -> Option<Response> {
        if !self.intercepts(request) {
            return None;
        }
        Some(self.respond(request, classify(request)).await)
    }

    /// Handle a request with an explicit strategy. Never fails: a strategy
    /// error becomes an offline fallback response.
    pub async fn respond(&self, request: &Request, strategy: Strategy) -> Response {
        log::debug!("{} {} via {}", request.method, request.url, strategy);
        match strategy::execute(strategy, &self.network, &self.cache, request).await {
            Ok(response) => response,
            Err(e) => {
                log::info!("Request failed, serving offline response: {}", e);
                offline::offline_response(&self.cache, &self.offline_url, request)
            }
        }
    }

    /// Current lifecycle state
    pub fn state(&self) -> LifecycleState {
        self.state
            .lock()
            .map(|s| *s)
            .unwrap_or(LifecycleState::Redundant)
    }

    fn set_state(&self, state: LifecycleState) {
        if let Ok(mut guard) = self.state.lock() {
            *guard = state;
        }
    }
}

fn resolve(origin: &Url, target: &str) -> Result<Url> {
    origin
        .join(target)
        .map_err(|e| ConfigError::Invalid(format!("'{}': {}", target, e)).into())
}
