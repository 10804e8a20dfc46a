//! Missable content scan over community guides and locked achievements.

use super::achievements::GameAchievements;
use super::{IntelService, Section};
use crate::core::error::IntelResult;
use crate::core::types::GameRecord;
use crate::intel::missable::{self, AchievementWarning};
use crate::upstream::GuideDetails;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// A community guide that mentions missable content
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GuideWarning {
    pub guide_title: String,
    pub guide_url: String,
    pub warning_type: String,
    pub patterns_found: Vec<String>,
    pub context: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MissableReport {
    pub game: String,
    pub appid: u32,
    pub missable_count: usize,
    pub guide_warnings: Vec<GuideWarning>,
    pub achievement_warnings: Vec<AchievementWarning>,
    /// Number of guides scanned, or why none could be
    pub guides: Section<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub recommendation: Option<String>,
}

impl IntelService {
    /// Warnings about achievements that can be permanently missed
    pub async fn scan_for_missables(&self, game: &str) -> IntelResult<MissableReport> {
        let record = self.catalog().lookup_game(game).await?;
        self.missables_for(&record).await
    }

    pub(crate) async fn missables_for(&self, record: &GameRecord) -> IntelResult<MissableReport> {
        let achievements = self.achievements_for(record).await?;
        if achievements.locked().next().is_none() {
            return Ok(MissableReport {
                game: record.name.clone(),
                appid: record.appid,
                missable_count: 0,
                guide_warnings: Vec::new(),
                achievement_warnings: Vec::new(),
                guides: Section::Available(0),
                message: Some("All achievements unlocked or no achievements available".to_string()),
                recommendation: None,
            });
        }

        let limits = self.limits();
        let guides: Section<Vec<GuideDetails>> = self
            .search_guides(record.appid, limits.guide_search_limit, None)
            .await
            .into();
        let scanned: Vec<&GuideDetails> = guides
            .available()
            .map(|all| {
                all.iter()
                    .filter(|g| missable::is_candidate_guide(&g.title, &g.description))
                    .take(limits.missable_guide_limit)
                    .collect()
            })
            .unwrap_or_default();

        let guide_warnings = scan_guides(&scanned);
        let achievement_warnings = scan_achievements(&achievements);
        debug!(
            game = %record.name,
            guides = scanned.len(),
            guide_warnings = guide_warnings.len(),
            achievement_warnings = achievement_warnings.len(),
            "Missable scan complete"
        );

        let scanned_count = scanned.len();
        Ok(MissableReport::new(
            record,
            guide_warnings,
            achievement_warnings,
            guides.map(|_| scanned_count),
        ))
    }
}

impl MissableReport {
    fn new(
        record: &GameRecord,
        guide_warnings: Vec<GuideWarning>,
        achievement_warnings: Vec<AchievementWarning>,
        guides: Section<usize>,
    ) -> Self {
        let missable_count = guide_warnings.len() + achievement_warnings.len();
        let (message, recommendation) = if missable_count == 0 {
            (
                Some("No missable content detected in guides or achievement descriptions".to_string()),
                None,
            )
        } else {
            (
                None,
                Some(format!(
                    "Found {} potential missable items. Review warnings before progressing in the game.",
                    missable_count
                )),
            )
        };

        Self {
            game: record.name.clone(),
            appid: record.appid,
            missable_count,
            guide_warnings,
            achievement_warnings,
            guides,
            message,
            recommendation,
        }
    }
}

fn scan_guides(guides: &[&GuideDetails]) -> Vec<GuideWarning> {
    guides
        .iter()
        .filter_map(|guide| {
            let content = format!("{}\n{}", guide.title, guide.description);
            missable::scan_guide_text(&content).map(|scan| GuideWarning {
                guide_title: guide.title.clone(),
                guide_url: guide.url.clone(),
                warning_type: "missable_content_detected".to_string(),
                patterns_found: scan.patterns_found,
                context: scan.context,
            })
        })
        .collect()
}

fn scan_achievements(achievements: &GameAchievements) -> Vec<AchievementWarning> {
    achievements.locked().filter_map(missable::scan_description).collect()
}
