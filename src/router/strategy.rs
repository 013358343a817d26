//! Strategy implementations
//!
//! Each strategy reads and writes one response-cache generation. Cache
//! storage failures are logged and treated as a cache miss.

use std::sync::Arc;

use crate::error::RouteError;
use crate::net::{Network, Request, Response};
use crate::response_cache::ResponseCache;

use super::Strategy;

/// Run one strategy for a request
pub async fn execute(
    strategy: Strategy,
    network: &Arc<dyn Network>,
    cache: &ResponseCache,
    request: &Request,
) -> Result<Response, RouteError> {
    match strategy {
        Strategy::NetworkFirst => network_first(network, cache, request).await,
        Strategy::CacheFirst => cache_first(network, cache, request).await,
        Strategy::StaleWhileRevalidate => stale_while_revalidate(network, cache, request).await,
        Strategy::NetworkOnly => Ok(network.fetch(request).await?),
        Strategy::CacheOnly => {
            cached(cache, request).ok_or_else(|| RouteError::NotCached(request.url.to_string()))
        }
    }
}

/// Try network, fall back to cache
pub async fn network_first(
    network: &Arc<dyn Network>,
    cache: &ResponseCache,
    request: &Request,
) -> Result<Response, RouteError> {
    match network.fetch(request).await {
        Ok(response) => {
            store(cache, request, &response);
            Ok(response)
        }
        Err(e) => {
            log::debug!("Network failed for {}, trying cache: {}", request.url, e);
            cached(cache, request).ok_or(RouteError::Network(e))
        }
    }
}

/// Try cache, fall back to network
pub async fn cache_first(
    network: &Arc<dyn Network>,
    cache: &ResponseCache,
    request: &Request,
) -> Result<Response, RouteError> {
    if let Some(response) = cached(cache, request) {
        log::debug!("Cache hit: {}", request.url);
        return Ok(response);
    }

    let response = network.fetch(request).await.map_err(|e| {
        log::warn!("Cache-first failed for {}: {}", request.url, e);
        e
    })?;
    store(cache, request, &response);
    Ok(response)
}

/// Return the cached copy immediately and refresh it in the background.
///
/// Without a cached copy the caller waits on the network instead.
pub async fn stale_while_revalidate(
    network: &Arc<dyn Network>,
    cache: &ResponseCache,
    request: &Request,
) -> Result<Response, RouteError> {
    if let Some(response) = cached(cache, request) {
        let network = Arc::clone(network);
        let cache = cache.clone();
        let request = request.clone();
        tokio::spawn(async move {
            revalidate(&network, &cache, &request).await;
        });
        return Ok(response);
    }

    let response = network.fetch(request).await?;
    store(cache, request, &response);
    Ok(response)
}

/// Background refresh; failures are logged and swallowed
async fn revalidate(network: &Arc<dyn Network>, cache: &ResponseCache, request: &Request) {
    match network.fetch(request).await {
        Ok(response) => store(cache, request, &response),
        Err(e) => log::debug!("Background update failed for {}: {}", request.url, e),
    }
}

/// Look up a cached response, treating storage errors as a miss
pub(crate) fn cached(cache: &ResponseCache, request: &Request) -> Option<Response> {
    match cache.match_request(request) {
        Ok(found) => found,
        Err(e) => {
            log::warn!("Response cache read failed for {}: {}", request.url, e);
            None
        }
    }
}

/// Store a successful GET response; anything else is left alone
fn store(cache: &ResponseCache, request: &Request, response: &Response) {
    if !response.is_success() || !request.is_cacheable_method() {
        return;
    }
    if let Err(e) = cache.put(request, response) {
        log::warn!("Response cache write failed for {}: {}", request.url, e);
    }
}
