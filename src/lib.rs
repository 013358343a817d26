//! Offline layer of the FRC Project Management System
//!
//! Request routing with per-request caching strategies, a typed object
//! cache with expiry and eviction, and deferred-write queues replayed when
//! connectivity returns.

pub mod config;
pub mod context;
pub mod error;
pub mod monitor;
pub mod net;
pub mod response_cache;
pub mod router;
pub mod scheduler;
pub mod store;
pub mod sync;
pub mod typed_cache;

pub use context::OfflineContext;
pub use error::{Error, Result};
