//! Three independent cache tiers sized for the three kinds of data the core
//! keeps: raw upstream responses, tool-level guide listings, and guide text.

use super::store::{CacheStats, CacheTierConfig, ExpiringCache};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::time::Duration;

/// Which tier a cached value belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CacheTier {
    /// Verbatim upstream API responses
    Api,
    /// Tool-level listings such as guide searches
    Tool,
    /// Long-lived guide content
    Guide,
}

impl CacheTier {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Api => "api",
            Self::Tool => "tool",
            Self::Guide => "guide",
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            Self::Api => "Steam Web API responses",
            Self::Tool => "Tool-level guide listings",
            Self::Guide => "Community guide content",
        }
    }
}

impl fmt::Display for CacheTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Per-tier configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfigs {
    pub api: CacheTierConfig,
    pub tool: CacheTierConfig,
    pub guide: CacheTierConfig,
}

impl Default for CacheConfigs {
    fn default() -> Self {
        Self {
            api: CacheTierConfig::new(200, Duration::from_secs(15 * 60)),
            tool: CacheTierConfig::new(100, Duration::from_secs(5 * 60)),
            guide: CacheTierConfig::new(500, Duration::from_secs(60 * 60)),
        }
    }
}

/// Stats for one tier plus its description
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TierStats {
    #[serde(flatten)]
    pub stats: CacheStats,
    pub description: String,
}

/// The three cache tiers, created together and never sharing entries
#[derive(Debug)]
pub struct CacheTiers {
    api: ExpiringCache<Value>,
    tool: ExpiringCache<Value>,
    guide: ExpiringCache<Value>,
}

impl CacheTiers {
    pub fn new(config: &CacheConfigs) -> Self {
        Self {
            api: ExpiringCache::new(CacheTier::Api.as_str(), config.api.clone()),
            tool: ExpiringCache::new(CacheTier::Tool.as_str(), config.tool.clone()),
            guide: ExpiringCache::new(CacheTier::Guide.as_str(), config.guide.clone()),
        }
    }

    pub fn tier(&self, tier: CacheTier) -> &ExpiringCache<Value> {
        match tier {
            CacheTier::Api => &self.api,
            CacheTier::Tool => &self.tool,
            CacheTier::Guide => &self.guide,
        }
    }

    /// Stats for all tiers in api, tool, guide order
    pub fn stats(&self) -> Vec<TierStats> {
        [CacheTier::Api, CacheTier::Tool, CacheTier::Guide]
            .into_iter()
            .map(|tier| TierStats {
                stats: self.tier(tier).stats(),
                description: tier.description().to_string(),
            })
            .collect()
    }
}

impl Default for CacheTiers {
    fn default() -> Self {
        Self::new(&CacheConfigs::default())
    }
}
