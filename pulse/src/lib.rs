//! Local data layer for the analytics dashboard: a TTL cache over a
//! key-value store, a deduplicating prefetch orchestrator, the scheduler
//! driving it, and the screen-level loaders reading from the cache.

pub mod auth;
pub mod cache;
pub mod clock;
pub mod domain;
pub mod events;
pub mod loaders;
pub mod persistence;
pub mod ports;
pub mod prefetch;
pub mod preferences;

#[cfg(test)]
pub(crate) mod testing;

use shared::TtlMs;

/// Freshness window applied uniformly to every cached domain
pub const CACHE_TTL: TtlMs = TtlMs::from_secs(5 * 60);

/// Namespaces prefixed to every persisted key
pub mod namespaces {
    pub const CACHE: &str = "pulse-cache";
    pub const PREFETCH: &str = "pulse-prefetch";
    pub const AUTH: &str = "pulse-auth";
    pub const LANGUAGE: &str = "pulse-language";
}

pub use cache::{CacheLookup, CacheStore};
pub use clock::{Clock, ManualClock, SystemClock};
pub use domain::{CacheKey, Period, PrefetchContext};
pub use prefetch::{ListenerGuard, PrefetchOptions, PrefetchOrchestrator, PrefetchScheduler};
