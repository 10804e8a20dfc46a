//! # Achievement Intel
//!
//! Resilient parallel access and inference core for game achievement
//! intelligence.
//!
//! Upstream reads go through a [`ResilientGateway`]: a tiered expiring cache, a
//! token bucket, a circuit breaker and a retry policy wrapped around a
//! [`RemoteSource`]. Independent reads fan out on a bounded [`ParallelRunner`].
//! The fetched achievements feed a dependency graph engine, a difficulty
//! estimator and a missable-content detector, and [`IntelService`] combines
//! them into the operations a host layer calls.
//!
//! ## Module layout
//!
//! - `core`: errors, configuration, shared data types
//! - `caching`, `traffic`, `gateway`: the fetch pipeline
//! - `parallel`: bounded fan-out / fan-in
//! - `intel`: pure inference over fetched data
//! - `upstream`: Steam request builders and payload parsers
//! - `catalog`: local game metadata
//! - `tools`: host-facing operations
//! - `observability`: logging and metrics setup

pub mod caching;
pub mod catalog;
pub mod core;
pub mod gateway;
pub mod intel;
pub mod observability;
pub mod parallel;
pub mod tools;
pub mod traffic;
pub mod upstream;

pub use crate::core::config::IntelConfig;
pub use crate::core::error::{IntelError, IntelResult};
pub use crate::core::types::{Achievement, GameRecord};

pub use catalog::{GameCatalog, LibraryCatalog};
pub use gateway::{FetchRequest, HttpRemote, RemoteError, RemoteResponse, RemoteSource, ResilientGateway};
pub use parallel::ParallelRunner;
pub use tools::{IntelService, Section, SortStrategy};
