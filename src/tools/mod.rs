//! # Tool Operations
//!
//! [`IntelService`] is the surface the host layer calls. It owns the fetch
//! gateway, the parallel runner, the game catalog and the inference engines, and
//! is cheap to clone so each fan-out task can carry its own handle.
//!
//! Aggregating operations report enrichment and per-section failures through
//! [`Section`] markers instead of failing the whole response. A game that is not
//! in the catalog is always a hard error.

pub mod achievements;
pub mod dependencies;
pub mod missables;
pub mod roadmap;
pub mod session;
pub mod stats;

pub use achievements::{GameAchievements, GlobalRarityReport, RarityEntry};
pub use dependencies::DependencyAnalysis;
pub use missables::{GuideWarning, MissableReport};
pub use roadmap::{DependencySummary, Roadmap, RoadmapEnrichment, RoadmapEntry, SortStrategy};
pub use session::{SessionContext, SessionInsights, SessionStatus};
pub use stats::ServiceStats;

use crate::caching::{CacheTier, CacheTiers, KeyGenerator};
use crate::catalog::{GameCatalog, LibraryCatalog};
use crate::core::config::{IntelConfig, RoadmapConfig};
use crate::core::error::{IntelError, IntelResult};
use crate::gateway::{FetchRequest, HttpRemote, RemoteSource, ResilientGateway};
use crate::intel::DifficultyEstimator;
use crate::parallel::ParallelRunner;
use crate::traffic::{CircuitBreaker, RetryPolicy, TokenBucket};
use crate::upstream::SteamRequests;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::future::Future;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Name of the breaker guarding the Steam upstream
pub const UPSTREAM_BREAKER: &str = "steam_api";

/// Outcome of one independently fetched part of a response
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", content = "data", rename_all = "snake_case")]
pub enum Section<T> {
    Available(T),
    Unavailable { kind: String, message: String },
}

impl<T> Section<T> {
    pub fn is_available(&self) -> bool {
        matches!(self, Self::Available(_))
    }

    pub fn available(&self) -> Option<&T> {
        match self {
            Self::Available(value) => Some(value),
            Self::Unavailable { .. } => None,
        }
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Section<U> {
        match self {
            Self::Available(value) => Section::Available(f(value)),
            Self::Unavailable { kind, message } => Section::Unavailable { kind, message },
        }
    }
}

impl<T> From<IntelResult<T>> for Section<T> {
    fn from(result: IntelResult<T>) -> Self {
        match result {
            Ok(value) => Self::Available(value),
            Err(err) => Self::Unavailable {
                kind: err.error_type().to_string(),
                message: err.to_string(),
            },
        }
    }
}

struct ServiceInner {
    gateway: ResilientGateway,
    catalog: Arc<dyn GameCatalog>,
    runner: ParallelRunner,
    estimator: DifficultyEstimator,
    requests: SteamRequests,
    limits: RoadmapConfig,
    has_player: bool,
}

/// Host-facing achievement intelligence operations
#[derive(Clone)]
pub struct IntelService {
    inner: Arc<ServiceInner>,
}

impl IntelService {
    /// Wire the core around an explicit remote and catalog
    pub fn new(
        config: &IntelConfig,
        remote: Arc<dyn RemoteSource>,
        catalog: Arc<dyn GameCatalog>,
    ) -> IntelResult<Self> {
        Self::with_estimator(config, remote, catalog, DifficultyEstimator::default())
    }

    pub fn with_estimator(
        config: &IntelConfig,
        remote: Arc<dyn RemoteSource>,
        catalog: Arc<dyn GameCatalog>,
        estimator: DifficultyEstimator,
    ) -> IntelResult<Self> {
        config.validate()?;

        let gateway = ResilientGateway::new(
            remote,
            Arc::new(CacheTiers::new(&config.cache)),
            Arc::new(TokenBucket::new(config.rate_limit.clone())),
            Arc::new(CircuitBreaker::new(UPSTREAM_BREAKER, config.circuit_breaker.clone())),
            RetryPolicy::new(config.retry.clone()),
            config.gateway.clone(),
        );

        Ok(Self {
            inner: Arc::new(ServiceInner {
                gateway,
                catalog,
                runner: ParallelRunner::new(config.executor.clone()),
                estimator,
                requests: SteamRequests::new(
                    config.upstream.community_base_url.clone(),
                    config.upstream.steam_id.clone(),
                ),
                limits: config.roadmap.clone(),
                has_player: !config.upstream.steam_id.is_empty(),
            }),
        })
    }

    /// Production wiring: HTTP remote and a library file catalog
    pub async fn from_config(config: &IntelConfig) -> IntelResult<Self> {
        let upstream = &config.upstream;
        let remote = HttpRemote::new(&upstream.api_base_url, upstream.timeout)?
            .with_api_key(upstream.api_key.clone());

        let catalog = match &upstream.library_path {
            Some(path) => LibraryCatalog::from_json_file(path).await?,
            None => {
                warn!("No library_path configured, game lookups will fail");
                LibraryCatalog::default()
            }
        };

        if upstream.api_key.is_empty() || upstream.steam_id.is_empty() {
            warn!("Steam API key or steam id missing, player progress is unavailable");
        }
        info!(
            api = %upstream.api_base_url,
            games = catalog.len(),
            "Achievement intel service ready"
        );

        Self::new(config, Arc::new(remote), Arc::new(catalog))
    }

    pub fn gateway(&self) -> &ResilientGateway {
        &self.inner.gateway
    }

    pub(crate) fn catalog(&self) -> &dyn GameCatalog {
        self.inner.catalog.as_ref()
    }

    pub(crate) fn runner(&self) -> &ParallelRunner {
        &self.inner.runner
    }

    pub(crate) fn estimator(&self) -> &DifficultyEstimator {
        &self.inner.estimator
    }

    pub(crate) fn requests(&self) -> &SteamRequests {
        &self.inner.requests
    }

    pub(crate) fn limits(&self) -> &RoadmapConfig {
        &self.inner.limits
    }

    pub(crate) fn has_player(&self) -> bool {
        self.inner.has_player
    }

    pub(crate) async fn fetch(&self, request: &FetchRequest) -> IntelResult<Value> {
        self.inner.gateway.fetch(request).await
    }

    /// Serve a tool-level listing from the tool tier, computing it on a miss
    pub(crate) async fn cached_tool<T, F, Fut>(
        &self,
        operation: &str,
        params: &[(&str, String)],
        compute: F,
    ) -> IntelResult<T>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = IntelResult<T>>,
    {
        let params: BTreeMap<String, String> = params
            .iter()
            .map(|(name, value)| (name.to_string(), value.clone()))
            .collect();
        let key = KeyGenerator::new(CacheTier::Tool.as_str()).generate(operation, &params);
        let tier = self.inner.gateway.cache().tier(CacheTier::Tool);

        if let Some(cached) = tier.get(&key) {
            match serde_json::from_value(cached) {
                Ok(value) => {
                    debug!(operation, "Tool listing served from cache");
                    return Ok(value);
                }
                Err(e) => {
                    warn!(operation, error = %e, "Discarding unreadable cached tool result");
                    tier.remove(&key);
                }
            }
        }

        let value = compute().await?;
        let encoded = serde_json::to_value(&value).map_err(IntelError::from)?;
        tier.set(key, encoded);
        Ok(value)
    }
}

pub(crate) fn percentage(part: usize, total: usize, decimals: i32) -> f64 {
    if total == 0 {
        return 0.0;
    }
    let scale = 10f64.powi(decimals);
    (part as f64 / total as f64 * 100.0 * scale).round() / scale
}
