//! Responses for requests that no strategy could satisfy

use serde_json::json;

use super::classify::is_api_path;
use super::strategy::cached;
use crate::net::{Request, Response};
use crate::response_cache::ResponseCache;

/// Build the fallback response for a failed request.
///
/// HTML documents get the cached offline page, API calls get a structured
/// JSON error, everything else gets whatever is cached or a plain 503.
pub fn offline_response(cache: &ResponseCache, offline_url: &reqwest::Url, request: &Request) -> Response {
    if request.accepts_html() {
        return match cache.match_url(offline_url) {
            Ok(Some(page)) => page,
            Ok(None) => Response::text(503, "Offline"),
            Err(e) => {
                log::warn!("Failed to read offline page: {}", e);
                Response::text(503, "Offline")
            }
        };
    }

    if let Some(response) = cached(cache, request) {
        return response;
    }

    if is_api_path(request.url.path()) {
        return Response::json(
            503,
            &json!({
                "error": "Offline",
                "message": "This request is not available offline",
                "cached": false
            }),
        );
    }

    Response::text(503, "Resource not available offline")
}
