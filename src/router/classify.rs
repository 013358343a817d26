//! Request classification
//!
//! Decides which caching strategy handles a request and which max-age
//! category a cached response belongs to.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::net::Request;

/// Static asset extensions served cache-first
const STATIC_EXTENSIONS: [&str; 6] = ["css", "js", "woff", "woff2", "ttf", "eot"];

/// Image extensions served cache-first
const IMAGE_EXTENSIONS: [&str; 6] = ["jpg", "jpeg", "png", "gif", "svg", "ico"];

/// Caching strategy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Strategy {
    /// Network, falling back to cache
    NetworkFirst,
    /// Cache, falling back to network
    CacheFirst,
    /// Cache immediately, refresh in the background
    StaleWhileRevalidate,
    /// Network only, never cached
    NetworkOnly,
    /// Cache only, never fetched
    CacheOnly,
}

impl Strategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            Strategy::NetworkFirst => "network-first",
            Strategy::CacheFirst => "cache-first",
            Strategy::StaleWhileRevalidate => "stale-while-revalidate",
            Strategy::NetworkOnly => "network-only",
            Strategy::CacheOnly => "cache-only",
        }
    }
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Strategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "network-first" => Ok(Strategy::NetworkFirst),
            "cache-first" => Ok(Strategy::CacheFirst),
            "stale-while-revalidate" => Ok(Strategy::StaleWhileRevalidate),
            "network-only" => Ok(Strategy::NetworkOnly),
            "cache-only" => Ok(Strategy::CacheOnly),
            other => Err(format!("unknown strategy '{}'", other)),
        }
    }
}

/// Max-age category of a cached response
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceCategory {
    Api,
    Static,
    Image,
    Page,
}

impl ResourceCategory {
    /// Categorize by URL path. Anything unmatched is a page.
    pub fn from_path(path: &str) -> Self {
        if is_api_path(path) {
            ResourceCategory::Api
        } else if has_extension(path, &STATIC_EXTENSIONS) {
            ResourceCategory::Static
        } else if has_extension(path, &IMAGE_EXTENSIONS) {
            ResourceCategory::Image
        } else {
            ResourceCategory::Page
        }
    }

    /// How long a cached response of this category stays valid
    pub fn max_age(&self) -> Duration {
        match self {
            ResourceCategory::Api => Duration::from_secs(5 * 60), // 5 min
            ResourceCategory::Static => Duration::from_secs(7 * 24 * 60 * 60), // 7 days
            ResourceCategory::Image => Duration::from_secs(30 * 24 * 60 * 60), // 30 days
            ResourceCategory::Page => Duration::from_secs(24 * 60 * 60), // 24 hr
        }
    }
}

/// Pick the strategy for a request. First match wins.
pub fn classify(request: &Request) -> Strategy {
    let path = request.url.path();

    if is_api_path(path) {
        return Strategy::NetworkFirst;
    }

    if has_extension(path, &STATIC_EXTENSIONS) || has_extension(path, &IMAGE_EXTENSIONS) {
        return Strategy::CacheFirst;
    }

    if request.accepts_html() {
        return Strategy::StaleWhileRevalidate;
    }

    Strategy::NetworkFirst
}

pub fn is_api_path(path: &str) -> bool {
    path.starts_with("/api/")
}

fn has_extension(path: &str, extensions: &[&str]) -> bool {
    let file = path.rsplit('/').next().unwrap_or(path);
    file.rsplit_once('.')
        .is_some_and(|(_, ext)| extensions.contains(&ext))
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::Url;

    fn req(path: &str, accept: Option<&str>) -> Request {
        let url = Url::parse(&format!("http://localhost:8080{}", path)).unwrap();
        let req = Request::get(url);
        match accept {
            Some(a) => req.with_header("accept", a),
            None => req,
        }
    }

    #[test]
    fn test_api_is_network_first_regardless_of_accept() {
        for accept in [None, Some("text/html"), Some("application/json"), Some("*/*")] {
            assert_eq!(
                classify(&req("/api/tasks", accept)),
                Strategy::NetworkFirst
            );
            assert_eq!(
                classify(&req("/api/robots/current.js", accept)),
                Strategy::NetworkFirst
            );
        }
    }

    #[test]
    fn test_static_assets_are_cache_first() {
        for path in [
            "/static/css/bootstrap.min.css",
            "/static/js/cache-manager.js",
            "/fonts/a.woff",
            "/fonts/a.woff2",
            "/fonts/a.ttf",
            "/fonts/a.eot",
        ] {
            assert_eq!(
                classify(&req(path, Some("text/html"))),
                Strategy::CacheFirst,
                "{}",
                path
            );
        }
    }

    #[test]
    fn test_images_are_cache_first() {
        for path in ["/a.jpg", "/a.jpeg", "/a.png", "/a.gif", "/a.svg", "/favicon.ico"] {
            assert_eq!(classify(&req(path, None)), Strategy::CacheFirst, "{}", path);
        }
    }

    #[test]
    fn test_html_is_stale_while_revalidate() {
        assert_eq!(
            classify(&req("/projects/3", Some("text/html,application/xhtml+xml"))),
            Strategy::StaleWhileRevalidate
        );
    }

    #[test]
    fn test_default_is_network_first() {
        assert_eq!(classify(&req("/projects/3", None)), Strategy::NetworkFirst);
        assert_eq!(classify(&req("/manifest.json", None)), Strategy::NetworkFirst);
    }

    #[test]
    fn test_extension_must_be_suffix_of_last_segment() {
        assert_eq!(classify(&req("/css.files/list", None)), Strategy::NetworkFirst);
        assert_eq!(classify(&req("/app.jsx", None)), Strategy::NetworkFirst);
    }

    #[test]
    fn test_category_max_ages() {
        assert_eq!(
            ResourceCategory::from_path("/api/tasks").max_age(),
            Duration::from_secs(300)
        );
        assert_eq!(
            ResourceCategory::from_path("/static/app.css"),
            ResourceCategory::Static
        );
        assert_eq!(
            ResourceCategory::from_path("/images/robot.png"),
            ResourceCategory::Image
        );
        assert_eq!(ResourceCategory::from_path("/"), ResourceCategory::Page);
        assert_eq!(
            ResourceCategory::Image.max_age(),
            Duration::from_secs(30 * 24 * 3600)
        );
    }

    #[test]
    fn test_strategy_parse_roundtrip() {
        for s in [
            Strategy::NetworkFirst,
            Strategy::CacheFirst,
            Strategy::StaleWhileRevalidate,
            Strategy::NetworkOnly,
            Strategy::CacheOnly,
        ] {
            assert_eq!(s.as_str().parse::<Strategy>().unwrap(), s);
        }
        assert!("cache-sometimes".parse::<Strategy>().is_err());
    }
}
