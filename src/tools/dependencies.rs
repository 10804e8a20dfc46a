//! Dependency analysis of a game's achievement set.

use super::IntelService;
use crate::core::error::IntelResult;
use crate::intel::{analyze, DependencyReport};
use serde::{Deserialize, Serialize};
use tracing::info;

const ORDER_LIMIT: usize = 20;
const READY_LIMIT: usize = 10;
const BLOCKED_LIMIT: usize = 10;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DependencyAnalysis {
    pub game: String,
    pub appid: u32,
    #[serde(flatten)]
    pub report: DependencyReport,
}

impl DependencyAnalysis {
    /// Cut the long lists down to what a reader acts on; details stay complete
    fn truncated(mut self) -> Self {
        self.report.optimal_order.truncate(ORDER_LIMIT);
        self.report.ready_to_unlock.truncate(READY_LIMIT);
        self.report.blocked.truncate(BLOCKED_LIMIT);
        self
    }
}

impl IntelService {
    /// Prerequisite graph, levels and readiness for a game
    pub async fn analyze_dependencies(&self, game: &str) -> IntelResult<DependencyAnalysis> {
        let record = self.catalog().lookup_game(game).await?;
        let achievements = self.achievements_for(&record).await?;
        let report = analyze(&achievements.achievements);
        if !report.anomalies.is_empty() {
            info!(
                game = %record.name,
                anomalies = report.anomalies.len(),
                "Dependency graph contains cycles"
            );
        }
        Ok(DependencyAnalysis {
            game: record.name,
            appid: record.appid,
            report,
        }
        .truncated())
    }
}
