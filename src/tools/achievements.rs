//! Achievement lists, global rarity and community guide lookups.

use super::{percentage, IntelService};
use crate::core::error::IntelResult;
use crate::core::types::{Achievement, GameRecord};
use crate::parallel::{task, TaskFuture};
use crate::upstream::steam::{self, GuideDetails, PlayerProgress, RarityBand};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use tracing::{debug, warn};

/// A game's achievements merged with the player's progress
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GameAchievements {
    pub game: String,
    pub appid: u32,
    pub total_achievements: usize,
    pub unlocked_achievements: usize,
    pub completion_percentage: f64,
    pub achievements: Vec<Achievement>,
}

impl GameAchievements {
    pub fn new(record: &GameRecord, achievements: Vec<Achievement>) -> Self {
        let unlocked = achievements.iter().filter(|a| a.unlocked).count();
        Self {
            game: record.name.clone(),
            appid: record.appid,
            total_achievements: achievements.len(),
            unlocked_achievements: unlocked,
            completion_percentage: percentage(unlocked, achievements.len(), 2),
            achievements,
        }
    }

    pub fn unlocked_names(&self) -> HashSet<String> {
        self.achievements
            .iter()
            .filter(|a| a.unlocked)
            .map(|a| a.name.clone())
            .collect()
    }

    pub fn locked(&self) -> impl Iterator<Item = &Achievement> {
        self.achievements.iter().filter(|a| !a.unlocked)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RarityEntry {
    pub api_name: String,
    /// Display name when the schema was available
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub percent: f64,
    pub band: RarityBand,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub unlocked: Option<bool>,
}

/// Global unlock percentages, rarest first
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GlobalRarityReport {
    pub game: String,
    pub appid: u32,
    pub total_achievements: usize,
    pub achievements: Vec<RarityEntry>,
}

impl IntelService {
    /// Achievements of a game with the player's unlock state
    pub async fn get_achievements(&self, game: &str) -> IntelResult<GameAchievements> {
        let record = self.catalog().lookup_game(game).await?;
        self.achievements_for(&record).await
    }

    pub(crate) async fn achievements_for(&self, record: &GameRecord) -> IntelResult<GameAchievements> {
        let schema_request = self.requests().schema(record.appid);
        let (schema, progress) =
            tokio::join!(self.fetch(&schema_request), self.player_progress(record.appid));

        let schema = steam::parse_schema(&schema?)?;
        let achievements = steam::merge_achievements(schema, progress.as_ref());
        debug!(
            game = %record.name,
            total = achievements.len(),
            with_progress = progress.is_some(),
            "Loaded achievements"
        );
        Ok(GameAchievements::new(record, achievements))
    }

    /// Player progress, or `None` when it cannot be read
    async fn player_progress(&self, appid: u32) -> Option<HashMap<String, PlayerProgress>> {
        if !self.has_player() {
            return None;
        }
        match self.fetch(&self.requests().player_achievements(appid)).await {
            Ok(body) => steam::parse_player_achievements(&body),
            Err(err) => {
                warn!(appid, error = %err, "Player progress unavailable");
                None
            }
        }
    }

    /// Global unlock percentages with the player's state where known
    pub async fn get_global_rarity(&self, game: &str) -> IntelResult<GlobalRarityReport> {
        let record = self.catalog().lookup_game(game).await?;
        let percentages_request = self.requests().global_percentages(record.appid);
        let schema_request = self.requests().schema(record.appid);

        let (percentages, schema, progress) = tokio::join!(
            self.fetch(&percentages_request),
            self.fetch(&schema_request),
            self.player_progress(record.appid)
        );

        let rarities = steam::parse_global_percentages(&percentages?)?;
        let names: HashMap<String, String> = schema
            .ok()
            .and_then(|body| steam::parse_schema(&body).ok())
            .map(|entries| {
                entries
                    .into_iter()
                    .filter(|e| !e.display_name.is_empty())
                    .map(|e| (e.api_name, e.display_name))
                    .collect()
            })
            .unwrap_or_default();

        let achievements: Vec<RarityEntry> = rarities
            .into_iter()
            .map(|rarity| RarityEntry {
                name: names.get(&rarity.api_name).cloned(),
                unlocked: progress
                    .as_ref()
                    .and_then(|p| p.get(&rarity.api_name))
                    .map(|p| p.achieved == 1),
                band: RarityBand::from_percent(rarity.percent),
                percent: rarity.percent,
                api_name: rarity.api_name,
            })
            .collect();

        Ok(GlobalRarityReport {
            game: record.name,
            appid: record.appid,
            total_achievements: achievements.len(),
            achievements,
        })
    }

    /// Global unlock percentage keyed by api name
    pub(crate) async fn rarity_map(&self, appid: u32) -> IntelResult<HashMap<String, f64>> {
        let body = self.fetch(&self.requests().global_percentages(appid)).await?;
        Ok(steam::parse_global_percentages(&body)?
            .into_iter()
            .map(|rarity| (rarity.api_name, rarity.percent))
            .collect())
    }

    /// Top-rated community guides, optionally restricted to one tag
    ///
    /// Guide details are fetched in parallel; a guide whose details fail is
    /// skipped.
    pub(crate) async fn search_guides(
        &self,
        appid: u32,
        limit: usize,
        tag: Option<&str>,
    ) -> IntelResult<Vec<GuideDetails>> {
        let tag_param = tag.unwrap_or_default().to_string();
        let params = [
            ("appid", appid.to_string()),
            ("limit", limit.to_string()),
            ("tag", tag_param.clone()),
        ];

        self.cached_tool("guides", &params, || async move {
            let page = self.fetch(&self.requests().guide_listing(appid)).await?;
            let page = match page.as_str() {
                Some(html) => html.to_string(),
                None => page.to_string(),
            };
            let ids = steam::scrape_guide_ids(&page, limit.saturating_mul(2));

            let tasks: Vec<(String, TaskFuture<GuideDetails>)> = ids
                .iter()
                .map(|id| {
                    let service = self.clone();
                    let id = id.clone();
                    task(id.clone(), async move { service.guide_details(&id).await })
                })
                .collect();
            let mut results = self.runner().run_all(tasks).await;

            let mut guides = Vec::new();
            for id in &ids {
                match results.take(id) {
                    Ok(guide) if tag_param.is_empty() || guide.has_tag(&tag_param) => guides.push(guide),
                    Ok(_) => {}
                    Err(err) => debug!(guide = %id, error = %err, "Skipping guide"),
                }
                if guides.len() >= limit {
                    break;
                }
            }
            Ok(guides)
        })
        .await
    }

    async fn guide_details(&self, guide_id: &str) -> IntelResult<GuideDetails> {
        let body = self.fetch(&self.requests().guide_details(guide_id)).await?;
        steam::parse_guide_details(&body, guide_id, self.requests().guide_url(guide_id))
    }
}

/// Known rarity of an achievement; percentages are keyed by api name
pub(crate) fn rarity_for(
    achievement: &Achievement,
    rarity: &HashMap<String, f64>,
) -> Option<f64> {
    rarity
        .get(&achievement.api_name)
        .or_else(|| rarity.get(&achievement.name))
        .copied()
        .or(achievement.rarity_percent)
}
