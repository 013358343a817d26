//! Versioned caches of raw HTTP responses
//!
//! Responses are grouped into named generations. The router reads and writes
//! only the current generation; activation deletes all the others.

pub mod key;
pub mod storage;

pub use key::request_key;
pub use storage::{CachedEntry, GenerationStats, ResponseCache, ResponseStore};
