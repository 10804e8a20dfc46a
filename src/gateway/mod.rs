//! # Fetch Gateway Module
//!
//! Composes the cache tiers, rate limiter, circuit breaker and retry policy
//! around a [`RemoteSource`] so callers see a single `fetch` operation.

pub mod fetch;
pub mod remote;

pub use fetch::{FetchConfig, FetchRequest, GatewayStats, ResilientGateway};
pub use remote::{HttpRemote, RemoteError, RemoteResponse, RemoteSource};
