use chrono::serde::ts_milliseconds;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::policy::{CacheType, Priority};

/// One cached value with its bookkeeping
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheEntry {
    pub key: String,
    pub data: Value,
    #[serde(with = "ts_milliseconds")]
    pub timestamp: DateTime<Utc>,
    #[serde(rename = "type")]
    pub cache_type: CacheType,
    #[serde(with = "ts_milliseconds")]
    pub accessed: DateTime<Utc>,
    pub access_count: u64,
    pub size: usize,
    pub priority: Priority,
    #[serde(with = "ts_milliseconds")]
    pub expires: DateTime<Utc>,
}

impl CacheEntry {
    /// Build a fresh entry captured at `now`
    pub fn new(
        cache_type: CacheType,
        key: &str,
        data: Value,
        max_age: std::time::Duration,
        now: DateTime<Utc>,
    ) -> Self {
        let size = serde_json::to_vec(&data).map(|b| b.len()).unwrap_or(0);
        let max_age = chrono::Duration::from_std(max_age).unwrap_or(chrono::Duration::MAX);
        Self {
            key: key.to_string(),
            data,
            timestamp: now,
            cache_type,
            accessed: now,
            access_count: 1,
            size,
            priority: cache_type.descriptor().priority,
            expires: now.checked_add_signed(max_age).unwrap_or(DateTime::<Utc>::MAX_UTC),
        }
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now > self.expires
    }

    /// Record a successful read
    pub fn touch(&mut self, now: DateTime<Utc>) {
        self.accessed = now;
        self.access_count += 1;
    }

    /// Eviction score: accesses per millisecond since last access.
    /// Lower scores are evicted first.
    pub fn score(&self, now: DateTime<Utc>) -> f64 {
        let elapsed = (now - self.accessed).num_milliseconds().max(1);
        self.access_count as f64 / elapsed as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use serde_json::json;

    #[test]
    fn test_new_entry_fields() {
        let now = Utc::now();
        let data = json!({"id": 7, "title": "Wire the PDP"});
        let entry = CacheEntry::new(
            CacheType::Tasks,
            "all",
            data.clone(),
            std::time::Duration::from_secs(60),
            now,
        );

        assert_eq!(entry.access_count, 1);
        assert_eq!(entry.size, serde_json::to_vec(&data).unwrap().len());
        assert_eq!(entry.priority, Priority::Medium);
        assert_eq!(entry.expires, now + Duration::seconds(60));
        assert!(!entry.is_expired(now));
        assert!(entry.is_expired(now + Duration::seconds(61)));
    }

    #[test]
    fn test_serialized_shape() {
        let now = DateTime::from_timestamp_millis(1_700_000_000_000).unwrap();
        let entry = CacheEntry::new(
            CacheType::TeamMembers,
            "all",
            json!([]),
            std::time::Duration::from_secs(1),
            now,
        );
        let value = serde_json::to_value(&entry).unwrap();

        assert_eq!(value["type"], "teamMembers");
        assert_eq!(value["accessCount"], 1);
        assert_eq!(value["timestamp"], 1_700_000_000_000i64);
        assert_eq!(value["expires"], 1_700_000_001_000i64);
        assert_eq!(value["priority"], "high");
    }

    #[test]
    fn test_score_floors_elapsed_at_one_ms() {
        let now = Utc::now();
        let mut entry = CacheEntry::new(
            CacheType::Robots,
            "current",
            json!(null),
            std::time::Duration::from_secs(1),
            now,
        );
        entry.touch(now);
        assert_eq!(entry.score(now), 2.0);
        assert_eq!(entry.score(now + Duration::milliseconds(4)), 0.5);
    }
}
