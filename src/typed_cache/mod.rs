//! Typed cache
//!
//! Structured application objects cached per data type, each type with its
//! own expiry, capacity and preload policy. Distinct from the router's raw
//! HTTP response cache.

pub mod entry;
pub mod key;
pub mod manager;
pub mod policy;
pub mod signal;
pub mod stats;

pub use entry::CacheEntry;
pub use key::create_cache_key;
pub use manager::{CacheOptions, PreloadOutcome, TypedCache, UpdateCallback};
pub use policy::{CacheType, Priority, StrategyDescriptor, Workflow};
pub use signal::{DataUpdated, UpdateSignal};
pub use stats::{CacheStatistics, SizeInfo, StatsSnapshot};
