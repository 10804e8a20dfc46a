//! # Achievement Roadmap
//!
//! Ranks the locked achievements of a game. Rarity and guides are fetched in
//! parallel; either may be missing, in which case entries fall back to the
//! default rarity and no guide links. Every entry is annotated with its
//! predicted difficulty, its prerequisites and its position in the dependency
//! order before the chosen strategy sorts the list.

use super::achievements::{rarity_for, GameAchievements};
use super::{percentage, IntelService, Section};
use crate::core::config::RoadmapConfig;
use crate::core::error::{IntelError, IntelResult};
use crate::core::types::GameRecord;
use crate::intel::difficulty::DEFAULT_RARITY_PERCENT;
use crate::intel::{build_graph, missable, optimal_order, DifficultyCategory, DifficultyEstimator, GraphAnomaly};
use crate::parallel::task;
use crate::upstream::GuideDetails;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

/// Guides considered for achievement links
const ROADMAP_GUIDE_LIMIT: usize = 5;
const ACHIEVEMENTS_TAG: &str = "Achievements";

/// How the roadmap is ordered
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortStrategy {
    /// Highest priority first, then dependency order, then easiest
    #[default]
    Efficiency,
    /// Dependency order, then most common first
    Completion,
    /// Missable achievements first, then by priority
    Missable,
    /// Dependency order, then rarest first
    Rarity,
}

impl SortStrategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Efficiency => "efficiency",
            Self::Completion => "completion",
            Self::Missable => "missable",
            Self::Rarity => "rarity",
        }
    }
}

impl fmt::Display for SortStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SortStrategy {
    type Err = IntelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "efficiency" => Ok(Self::Efficiency),
            "completion" => Ok(Self::Completion),
            "missable" => Ok(Self::Missable),
            "rarity" => Ok(Self::Rarity),
            other => Err(IntelError::parse(format!(
                "Unknown sort strategy '{}', expected efficiency, completion, missable or rarity",
                other
            ))),
        }
    }
}

/// A locked achievement with everything known about it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoadmapEntry {
    pub name: String,
    pub api_name: String,
    pub description: String,
    pub priority_score: f64,
    pub rarity: f64,
    pub difficulty_score: f64,
    pub difficulty_category: DifficultyCategory,
    pub estimated_time: String,
    pub is_missable: bool,
    pub has_guide: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub guide_url: Option<String>,
    pub dependencies: Vec<String>,
    pub unmet_dependencies: Vec<String>,
    pub dependency_level: Option<usize>,
    /// Position in the dependency order; `None` inside or behind a cycle
    pub optimal_order_index: Option<usize>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub next_steps: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DependencySummary {
    pub total_dependency_levels: usize,
    pub achievements_with_dependencies: usize,
    pub anomalies: Vec<GraphAnomaly>,
}

/// Which enrichment sources contributed, with their entry counts
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoadmapEnrichment {
    pub rarity: Section<usize>,
    pub guides: Section<usize>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Roadmap {
    pub game: String,
    pub appid: u32,
    pub total_achievements: usize,
    pub unlocked: usize,
    pub completion_percentage: f64,
    pub sort_strategy: SortStrategy,
    pub roadmap: Vec<RoadmapEntry>,
    pub total_remaining: usize,
    pub dependency_analysis: DependencySummary,
    pub enrichment: RoadmapEnrichment,
}

/// Priority in [0, 1]; rarer, easier, guided and missable rank higher
pub fn priority_score(
    rarity_percent: f64,
    has_guide: bool,
    is_missable: bool,
    category: DifficultyCategory,
) -> f64 {
    let rarity = 1.0 - rarity_percent.clamp(0.0, 100.0) / 100.0;
    let guide = if has_guide { 0.2 } else { 0.0 };
    let score = rarity * 0.3 + category.ease_weight() * 0.4 + guide * 0.3;
    let multiplier = if is_missable { 3.0 } else { 1.0 };
    (score * multiplier).min(1.0)
}

enum Enrichment {
    Rarity(HashMap<String, f64>),
    Guides(Vec<GuideDetails>),
}

impl IntelService {
    /// Ranked plan for the locked achievements of a game
    pub async fn get_roadmap(&self, game: &str, strategy: SortStrategy) -> IntelResult<Roadmap> {
        let record = self.catalog().lookup_game(game).await?;
        self.roadmap_for(&record, strategy).await
    }

    pub(crate) async fn roadmap_for(&self, record: &GameRecord, strategy: SortStrategy) -> IntelResult<Roadmap> {
        let achievements = self.achievements_for(record).await?;
        let appid = record.appid;

        let rarity_service = self.clone();
        let guide_service = self.clone();
        let mut results = self
            .runner()
            .run_all(vec![
                task("rarity", async move {
                    rarity_service.rarity_map(appid).await.map(Enrichment::Rarity)
                }),
                task("guides", async move {
                    guide_service
                        .search_guides(appid, ROADMAP_GUIDE_LIMIT, Some(ACHIEVEMENTS_TAG))
                        .await
                        .map(Enrichment::Guides)
                }),
            ])
            .await;

        let rarity: Section<HashMap<String, f64>> = results
            .take("rarity")
            .and_then(|data| match data {
                Enrichment::Rarity(map) => Ok(map),
                Enrichment::Guides(_) => Err(IntelError::internal("rarity task returned guides")),
            })
            .into();
        let guides: Section<Vec<GuideDetails>> = results
            .take("guides")
            .and_then(|data| match data {
                Enrichment::Guides(guides) => Ok(guides),
                Enrichment::Rarity(_) => Err(IntelError::internal("guides task returned rarity")),
            })
            .into();

        let empty_rarity = HashMap::new();
        let (entries, dependency_analysis) = build_roadmap(
            &achievements,
            rarity.available().unwrap_or(&empty_rarity),
            guides.available().map(Vec::as_slice).unwrap_or(&[]),
            strategy,
            self.estimator(),
            self.limits(),
        );

        Ok(Roadmap {
            game: achievements.game.clone(),
            appid,
            total_achievements: achievements.total_achievements,
            unlocked: achievements.unlocked_achievements,
            completion_percentage: percentage(
                achievements.unlocked_achievements,
                achievements.total_achievements,
                1,
            ),
            sort_strategy: strategy,
            total_remaining: entries.len(),
            roadmap: entries.into_iter().take(self.limits().limit).collect(),
            dependency_analysis,
            enrichment: RoadmapEnrichment {
                rarity: rarity.map(|map| map.len()),
                guides: guides.map(|guides| guides.len()),
            },
        })
    }
}

/// Annotate, sort and hint every locked achievement
pub fn build_roadmap(
    achievements: &GameAchievements,
    rarity: &HashMap<String, f64>,
    guides: &[GuideDetails],
    strategy: SortStrategy,
    estimator: &DifficultyEstimator,
    limits: &RoadmapConfig,
) -> (Vec<RoadmapEntry>, DependencySummary) {
    let graph = build_graph(&achievements.achievements);
    let unlocked = achievements.unlocked_names();
    let order_index: HashMap<String, usize> = optimal_order(&graph, &unlocked)
        .into_iter()
        .enumerate()
        .map(|(idx, name)| (name, idx))
        .collect();
    let guide_titles: Vec<(String, &GuideDetails)> = guides
        .iter()
        .map(|guide| (guide.title.to_lowercase(), guide))
        .collect();

    let mut entries: Vec<RoadmapEntry> = achievements
        .locked()
        .map(|achievement| {
            let rarity = rarity_for(achievement, rarity).unwrap_or(DEFAULT_RARITY_PERCENT);
            let prediction = estimator.predict(achievement, rarity);
            let is_missable = missable::scan_description(achievement).is_some();

            let lowered = achievement.name.to_lowercase();
            let guide_url = guide_titles
                .iter()
                .find(|(title, _)| !lowered.is_empty() && title.contains(&lowered))
                .map(|(_, guide)| guide.url.clone());
            let has_guide = guide_url.is_some();

            let dependencies = graph.prerequisites(&achievement.name).to_vec();
            let unmet_dependencies = dependencies
                .iter()
                .filter(|dep| !unlocked.contains(dep.as_str()))
                .cloned()
                .collect();

            RoadmapEntry {
                name: achievement.name.clone(),
                api_name: achievement.api_name.clone(),
                description: achievement.description.clone(),
                priority_score: round_to(
                    priority_score(rarity, has_guide, is_missable, prediction.category),
                    3,
                ),
                rarity: round_to(rarity, 1),
                difficulty_score: prediction.score,
                difficulty_category: prediction.category,
                estimated_time: prediction.estimated_time,
                is_missable,
                has_guide,
                guide_url,
                dependencies,
                unmet_dependencies,
                dependency_level: graph.level_of(&achievement.name),
                optimal_order_index: order_index.get(&achievement.name).copied(),
                next_steps: Vec::new(),
            }
        })
        .collect();

    sort_entries(&mut entries, strategy);

    for entry in entries.iter_mut().take(limits.next_steps) {
        entry.next_steps = next_steps(entry);
    }

    let summary = DependencySummary {
        total_dependency_levels: graph.levels.len(),
        achievements_with_dependencies: entries.iter().filter(|e| !e.dependencies.is_empty()).count(),
        anomalies: graph.anomalies.clone(),
    };
    (entries, summary)
}

fn sort_entries(entries: &mut [RoadmapEntry], strategy: SortStrategy) {
    // Entries outside the dependency order go last
    let order = |entry: &RoadmapEntry| entry.optimal_order_index.unwrap_or(usize::MAX);
    let by_priority = |a: &RoadmapEntry, b: &RoadmapEntry| b.priority_score.total_cmp(&a.priority_score);

    entries.sort_by(|a, b| match strategy {
        SortStrategy::Efficiency => by_priority(a, b)
            .then_with(|| order(a).cmp(&order(b)))
            .then_with(|| a.difficulty_score.total_cmp(&b.difficulty_score)),
        SortStrategy::Completion => order(a)
            .cmp(&order(b))
            .then_with(|| b.rarity.total_cmp(&a.rarity))
            .then_with(|| a.difficulty_score.total_cmp(&b.difficulty_score)),
        SortStrategy::Missable => b
            .is_missable
            .cmp(&a.is_missable)
            .then_with(|| by_priority(a, b))
            .then_with(|| order(a).cmp(&order(b))),
        SortStrategy::Rarity => order(a)
            .cmp(&order(b))
            .then_with(|| a.rarity.total_cmp(&b.rarity))
            .then(Ordering::Equal),
    });
}

fn next_steps(entry: &RoadmapEntry) -> Vec<String> {
    let mut steps = Vec::new();
    if !entry.unmet_dependencies.is_empty() {
        let shown: Vec<&str> = entry.unmet_dependencies.iter().take(3).map(String::as_str).collect();
        steps.push(format!("Prerequisites needed: {}", shown.join(", ")));
    }
    if entry.is_missable {
        steps.push("Missable: do this before progressing further".to_string());
    }
    steps.push(format!(
        "Difficulty: {} ({}/100)",
        entry.difficulty_category, entry.difficulty_score
    ));
    steps.push(format!("Estimated time: {}", entry.estimated_time));
    if let Some(url) = &entry.guide_url {
        steps.push(format!("Community guide available: {}", url));
    }
    steps.push(format!("Focus: {}", entry.description));
    steps
}

fn round_to(value: f64, decimals: i32) -> f64 {
    let scale = 10f64.powi(decimals);
    (value * scale).round() / scale
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::Achievement;

    fn game(achievements: Vec<Achievement>) -> GameAchievements {
        GameAchievements::new(&GameRecord::new(1, "Test Game"), achievements)
    }

    fn guide(title: &str, url: &str) -> GuideDetails {
        GuideDetails {
            id: "1".to_string(),
            title: title.to_string(),
            description: String::new(),
            tags: vec![ACHIEVEMENTS_TAG.to_string()],
            views: 0,
            favorites: 0,
            subscriptions: 0,
            created: None,
            updated: None,
            url: url.to_string(),
        }
    }

    fn names(entries: &[RoadmapEntry]) -> Vec<&str> {
        entries.iter().map(|e| e.name.as_str()).collect()
    }

    #[test]
    fn test_priority_score() {
        let base = priority_score(50.0, false, false, DifficultyCategory::Easy);
        assert!((base - 0.55).abs() < 1e-9);
        let guided = priority_score(50.0, true, false, DifficultyCategory::Easy);
        assert!((guided - 0.61).abs() < 1e-9);
        assert_eq!(priority_score(50.0, false, true, DifficultyCategory::Easy), 1.0);
        assert!(
            priority_score(50.0, false, false, DifficultyCategory::VeryHard)
                < priority_score(50.0, false, false, DifficultyCategory::Medium)
        );
    }

    #[test]
    fn test_sort_strategy_parsing() {
        assert_eq!("Rarity".parse::<SortStrategy>().unwrap(), SortStrategy::Rarity);
        assert_eq!(SortStrategy::default(), SortStrategy::Efficiency);
        assert!(matches!(
            "fastest".parse::<SortStrategy>(),
            Err(IntelError::Parse { .. })
        ));
    }

    #[test]
    fn test_roadmap_skips_unlocked_and_annotates() {
        let achievements = game(vec![
            Achievement::new("Beginner", "Finish the tutorial").with_unlocked(true),
            Achievement::new("Veteran", "Requires Beginner and 10 wins"),
            Achievement::new("Legend", "Requires Veteran"),
        ]);
        let rarity: HashMap<String, f64> = [("Veteran".to_string(), 40.0)].into_iter().collect();
        let guides = vec![guide("Legend achievement walkthrough", "https://guides/legend")];

        let (entries, summary) = build_roadmap(
            &achievements,
            &rarity,
            &guides,
            SortStrategy::Completion,
            &DifficultyEstimator::default(),
            &RoadmapConfig::default(),
        );

        assert_eq!(names(&entries), vec!["Veteran", "Legend"]);
        let veteran = &entries[0];
        assert_eq!(veteran.rarity, 40.0);
        assert_eq!(veteran.dependencies, vec!["Beginner"]);
        assert!(veteran.unmet_dependencies.is_empty());
        assert_eq!(veteran.dependency_level, Some(1));
        assert_eq!(veteran.optimal_order_index, Some(1));

        let legend = &entries[1];
        assert_eq!(legend.rarity, DEFAULT_RARITY_PERCENT);
        assert_eq!(legend.guide_url.as_deref(), Some("https://guides/legend"));
        assert_eq!(legend.unmet_dependencies, vec!["Veteran"]);
        assert!(legend.next_steps[0].starts_with("Prerequisites needed: Veteran"));

        assert_eq!(summary.total_dependency_levels, 3);
        assert_eq!(summary.achievements_with_dependencies, 2);
    }

    #[test]
    fn test_missable_strategy_puts_missables_first() {
        let achievements = game(vec![
            Achievement::new("Common", "Open a chest"),
            Achievement::new("Farewell", "Say goodbye before chapter 5"),
        ]);
        let rarity: HashMap<String, f64> =
            [("Common".to_string(), 1.0), ("Farewell".to_string(), 99.0)].into_iter().collect();

        let (entries, _) = build_roadmap(
            &achievements,
            &rarity,
            &[],
            SortStrategy::Missable,
            &DifficultyEstimator::default(),
            &RoadmapConfig::default(),
        );

        assert_eq!(names(&entries), vec!["Farewell", "Common"]);
        assert!(entries[0].is_missable);
        assert!(entries[0].next_steps.iter().any(|s| s.starts_with("Missable")));
    }

    #[test]
    fn test_rarity_strategy_respects_dependency_order() {
        let achievements = game(vec![
            Achievement::new("Rare Start", "Do something unusual"),
            Achievement::new("Common Start", "Do something usual"),
            Achievement::new("Follow Up", "Requires Common Start"),
        ]);
        let rarity: HashMap<String, f64> = [
            ("Rare Start".to_string(), 2.0),
            ("Common Start".to_string(), 80.0),
            ("Follow Up".to_string(), 0.5),
        ]
        .into_iter()
        .collect();

        let (entries, _) = build_roadmap(
            &achievements,
            &rarity,
            &[],
            SortStrategy::Rarity,
            &DifficultyEstimator::default(),
            &RoadmapConfig::default(),
        );
        assert_eq!(names(&entries), vec!["Rare Start", "Common Start", "Follow Up"]);
    }

    #[test]
    fn test_next_steps_limited_to_leading_entries() {
        let achievements = game(
            (0..8)
                .map(|i| Achievement::new(format!("Task {}", i), "Open a door"))
                .collect(),
        );
        let (entries, _) = build_roadmap(
            &achievements,
            &HashMap::new(),
            &[],
            SortStrategy::Efficiency,
            &DifficultyEstimator::default(),
            &RoadmapConfig::default(),
        );

        assert_eq!(entries.iter().filter(|e| !e.next_steps.is_empty()).count(), 5);
        // ties keep dependency order
        assert_eq!(entries[0].name, "Task 0");
    }
}
