use chrono::serde::ts_milliseconds_option;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::policy::CacheType;

/// Running hit/miss counters of one data type, persisted alongside the data
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CacheStatistics {
    pub hits: u64,
    pub misses: u64,
    pub size: u64,
    #[serde(with = "ts_milliseconds_option")]
    pub last_access: Option<DateTime<Utc>>,
}

impl CacheStatistics {
    pub fn record_hit(&mut self) {
        self.hits += 1;
        self.last_access = Some(Utc::now());
    }

    pub fn record_miss(&mut self) {
        self.misses += 1;
        self.last_access = Some(Utc::now());
    }

    pub fn record_store(&mut self) {
        self.size += 1;
        self.last_access = Some(Utc::now());
    }

    /// Lower the size counter, never below zero
    pub fn shrink(&mut self, by: u64) {
        self.size = self.size.saturating_sub(by);
    }

    /// `hits / (hits + misses)`, absent before the first lookup
    pub fn hit_rate(&self) -> Option<f64> {
        let lookups = self.hits + self.misses;
        (lookups > 0).then(|| self.hits as f64 / lookups as f64)
    }

    pub fn snapshot(&self, cache_type: CacheType) -> StatsSnapshot {
        StatsSnapshot {
            cache_type,
            hits: self.hits,
            misses: self.misses,
            size: self.size,
            last_access: self.last_access,
            hit_rate: self.hit_rate().map(|r| (r * 100.0).round() / 100.0),
        }
    }
}

/// Reported statistics of one type, hit rate rounded to two decimals
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatsSnapshot {
    #[serde(rename = "type")]
    pub cache_type: CacheType,
    pub hits: u64,
    pub misses: u64,
    pub size: u64,
    pub last_access: Option<DateTime<Utc>>,
    pub hit_rate: Option<f64>,
}

/// Stored entries of one type
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SizeInfo {
    #[serde(rename = "type")]
    pub cache_type: CacheType,
    pub entries: usize,
    pub total_size: usize,
    pub average_size: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hit_rate_absent_without_lookups() {
        let stats = CacheStatistics::default();
        assert_eq!(stats.hit_rate(), None);
    }

    #[test]
    fn test_hit_rate_three_hits_one_miss() {
        let mut stats = CacheStatistics::default();
        stats.record_hit();
        stats.record_hit();
        stats.record_hit();
        stats.record_miss();
        assert_eq!(stats.hit_rate(), Some(0.75));
    }

    #[test]
    fn test_snapshot_rounds_to_two_decimals() {
        let mut stats = CacheStatistics::default();
        stats.record_hit();
        stats.record_miss();
        stats.record_miss();
        let snap = stats.snapshot(CacheType::Tasks);
        assert_eq!(snap.hit_rate, Some(0.33));
    }

    #[test]
    fn test_shrink_saturates() {
        let mut stats = CacheStatistics::default();
        stats.record_store();
        stats.shrink(5);
        assert_eq!(stats.size, 0);
    }
}
