//! # Caching System Module
//!
//! In-memory caching for upstream responses and tool-level listings.
//!
//! ## Components
//! - [`ExpiringCache`]: bounded FIFO cache with a fixed time-to-live
//! - [`CacheTiers`]: the `api`, `tool` and `guide` tiers, each an independent cache
//! - [`KeyGenerator`]: deterministic keys from endpoint + sorted parameters
//! - [`InFlightRequests`]: coalesces concurrent misses for the same key
//!
//! Nothing here persists across restarts.

pub mod deduplication;
pub mod key_generator;
pub mod store;
pub mod tiers;

pub use deduplication::{FlightGuard, InFlightRequests};
pub use key_generator::KeyGenerator;
pub use store::{CacheStats, CacheTierConfig, ExpiringCache};
pub use tiers::{CacheConfigs, CacheTier, CacheTiers, TierStats};
