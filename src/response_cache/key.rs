//! Response-cache key generation using SHA-256 hashes

use reqwest::{Method, Url};
use sha2::{Digest, Sha256};

/// Generate a deterministic key for a request.
///
/// The key is a SHA-256 hash of the method and the URL with any fragment
/// removed. Query strings are part of the identity, in their original order.
pub fn request_key(method: &Method, url: &Url) -> String {
    let mut url = url.clone();
    url.set_fragment(None);

    let mut hasher = Sha256::new();
    hasher.update(method.as_str().as_bytes());
    hasher.update(b"|");
    hasher.update(url.as_str().as_bytes());

    format!("{:x}", hasher.finalize())
}
