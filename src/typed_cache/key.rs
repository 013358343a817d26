/// Build a cache key from a base and query parameters.
///
/// Parameters are sorted by name and joined as `base?k1=v1&k2=v2`; with no
/// parameters the base is returned unchanged.
pub fn create_cache_key<K, V, I>(base: &str, params: I) -> String
where
    K: AsRef<str>,
    V: std::fmt::Display,
    I: IntoIterator<Item = (K, V)>,
{
    let mut pairs: Vec<(K, V)> = params.into_iter().collect();
    if pairs.is_empty() {
        return base.to_string();
    }
    pairs.sort_by(|a, b| a.0.as_ref().cmp(b.0.as_ref()));

    let query = pairs
        .iter()
        .map(|(k, v)| format!("{}={}", k.as_ref(), v))
        .collect::<Vec<_>>()
        .join("&");
    format!("{}?{}", base, query)
}
