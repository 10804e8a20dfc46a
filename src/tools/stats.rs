//! Runtime statistics of the service.

use super::IntelService;
use crate::caching::TierStats;
use crate::core::error::IntelResult;
use crate::gateway::GatewayStats;
use crate::intel::{dependency, missable};
use crate::parallel::RunnerStats;
use crate::traffic::{CircuitBreakerStats, RateLimiterStats};
use serde::{Deserialize, Serialize};

/// Size of the inference vocabularies
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineStats {
    pub dependency_patterns: usize,
    pub missable_patterns: usize,
    pub difficulty_terms: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceStats {
    pub caches: Vec<TierStats>,
    pub gateway: GatewayStats,
    pub rate_limiter: RateLimiterStats,
    pub circuit_breaker: CircuitBreakerStats,
    pub executor: RunnerStats,
    pub engines: EngineStats,
}

impl IntelService {
    /// Cache, limiter, breaker and executor metrics
    pub async fn get_stats(&self) -> IntelResult<ServiceStats> {
        let gateway = self.gateway();
        Ok(ServiceStats {
            caches: gateway.cache().stats(),
            gateway: gateway.stats(),
            rate_limiter: gateway.limiter().stats(),
            circuit_breaker: gateway.breaker().stats(),
            executor: self.runner().stats(),
            engines: EngineStats {
                dependency_patterns: dependency::pattern_count(),
                missable_patterns: missable::pattern_count(),
                difficulty_terms: self.estimator().term_count(),
            },
        })
    }
}
