//! # Session Context
//!
//! Snapshot of what the player is doing right now: the current game, their
//! progress, missable alerts, the best next achievement, news and player count.
//! The five insights are gathered in one parallel batch and each one may be
//! unavailable on its own.

use super::roadmap::SortStrategy;
use super::{percentage, IntelService, Section};
use crate::core::error::{IntelError, IntelResult};
use crate::core::types::GameRecord;
use crate::parallel::task;
use crate::upstream::steam;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

/// Recent games listed next to the current one
const OTHER_RECENT_LIMIT: usize = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    /// Played within the last two weeks
    Active,
    /// Requested explicitly but not played recently
    Recent,
    NoRecentActivity,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CurrentGame {
    pub name: String,
    pub appid: u32,
    pub playtime_total_hours: f64,
    pub playtime_recent_hours: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgressInsight {
    pub total: usize,
    pub unlocked: usize,
    pub completion_percentage: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MissableAlert {
    pub count: usize,
    pub has_warnings: bool,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SuggestedAchievement {
    pub name: String,
    pub description: String,
    pub priority_score: f64,
    pub rarity: f64,
    pub has_guide: bool,
    pub next_steps: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewsInsight {
    pub count: usize,
    pub latest_title: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionInsights {
    pub progress: Section<ProgressInsight>,
    pub missable_alert: Section<MissableAlert>,
    /// `None` when every achievement is unlocked
    pub suggested_next: Section<Option<SuggestedAchievement>>,
    pub news: Section<NewsInsight>,
    pub current_players: Section<u64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionContext {
    pub session_status: SessionStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_game: Option<CurrentGame>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub other_recent_games: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub insights: Option<SessionInsights>,
}

impl SessionContext {
    fn idle() -> Self {
        Self {
            session_status: SessionStatus::NoRecentActivity,
            message: Some(
                "No games played in the last 2 weeks. Name a game to get its session context."
                    .to_string(),
            ),
            current_game: None,
            other_recent_games: Vec::new(),
            insights: None,
        }
    }
}

enum Insight {
    Progress(ProgressInsight),
    Missables(MissableAlert),
    Suggested(Option<SuggestedAchievement>),
    News(NewsInsight),
    Players(u64),
}

impl IntelService {
    /// Context for the game being played, or for `game` when given
    pub async fn get_session_context(&self, game: Option<&str>) -> IntelResult<SessionContext> {
        let recent = self.catalog().recently_played().await?;
        let record = match game {
            Some(identifier) => self.catalog().lookup_game(identifier).await?,
            None => match recent.first() {
                Some(record) => record.clone(),
                None => {
                    debug!("No recent activity");
                    return Ok(SessionContext::idle());
                }
            },
        };

        let session_status = if record.playtime_two_weeks_minutes > 0 {
            SessionStatus::Active
        } else {
            SessionStatus::Recent
        };
        let other_recent_games = recent
            .iter()
            .filter(|g| g.appid != record.appid)
            .take(OTHER_RECENT_LIMIT)
            .map(|g| g.name.clone())
            .collect();

        let insights = self.session_insights(&record).await;
        info!(
            game = %record.name,
            status = ?session_status,
            "Session context assembled"
        );

        Ok(SessionContext {
            session_status,
            message: None,
            current_game: Some(CurrentGame {
                name: record.name.clone(),
                appid: record.appid,
                playtime_total_hours: hours(record.playtime_forever_minutes),
                playtime_recent_hours: hours(record.playtime_two_weeks_minutes),
            }),
            other_recent_games,
            insights: Some(insights),
        })
    }

    async fn session_insights(&self, record: &GameRecord) -> SessionInsights {
        let appid = record.appid;
        let news_count = self.limits().news_count;

        let progress_task = {
            let (service, record) = (self.clone(), record.clone());
            task("progress", async move {
                let achievements = service.achievements_for(&record).await?;
                Ok(Insight::Progress(ProgressInsight {
                    total: achievements.total_achievements,
                    unlocked: achievements.unlocked_achievements,
                    completion_percentage: percentage(
                        achievements.unlocked_achievements,
                        achievements.total_achievements,
                        1,
                    ),
                }))
            })
        };
        let missables_task = {
            let (service, record) = (self.clone(), record.clone());
            task("missables", async move {
                let report = service.missables_for(&record).await?;
                let message = match report.missable_count {
                    0 => "No missable content detected".to_string(),
                    n => format!("{} potential missable items, review before progressing", n),
                };
                Ok(Insight::Missables(MissableAlert {
                    count: report.missable_count,
                    has_warnings: report.missable_count > 0,
                    message,
                }))
            })
        };
        let suggested_task = {
            let (service, record) = (self.clone(), record.clone());
            task("suggested", async move {
                let roadmap = service.roadmap_for(&record, SortStrategy::Efficiency).await?;
                Ok(Insight::Suggested(roadmap.roadmap.into_iter().next().map(|entry| {
                    SuggestedAchievement {
                        name: entry.name,
                        description: entry.description,
                        priority_score: entry.priority_score,
                        rarity: entry.rarity,
                        has_guide: entry.has_guide,
                        next_steps: entry.next_steps,
                    }
                })))
            })
        };
        let news_task = {
            let service = self.clone();
            task("news", async move {
                let body = service.fetch(&service.requests().news(appid, news_count)).await?;
                let news = steam::parse_news(&body)?;
                Ok(Insight::News(NewsInsight {
                    count: news.len(),
                    latest_title: news.into_iter().next().map(|item| item.title),
                }))
            })
        };
        let players_task = {
            let service = self.clone();
            task("players", async move {
                let body = service.fetch(&service.requests().current_players(appid)).await?;
                Ok(Insight::Players(steam::parse_player_count(&body)?))
            })
        };

        let mut results = self
            .runner()
            .run_all(vec![
                progress_task,
                missables_task,
                suggested_task,
                news_task,
                players_task,
            ])
            .await;

        SessionInsights {
            progress: results
                .take("progress")
                .and_then(|insight| match insight {
                    Insight::Progress(progress) => Ok(progress),
                    _ => Err(mismatched("progress")),
                })
                .into(),
            missable_alert: results
                .take("missables")
                .and_then(|insight| match insight {
                    Insight::Missables(alert) => Ok(alert),
                    _ => Err(mismatched("missables")),
                })
                .into(),
            suggested_next: results
                .take("suggested")
                .and_then(|insight| match insight {
                    Insight::Suggested(suggested) => Ok(suggested),
                    _ => Err(mismatched("suggested")),
                })
                .into(),
            news: results
                .take("news")
                .and_then(|insight| match insight {
                    Insight::News(news) => Ok(news),
                    _ => Err(mismatched("news")),
                })
                .into(),
            current_players: results
                .take("players")
                .and_then(|insight| match insight {
                    Insight::Players(count) => Ok(count),
                    _ => Err(mismatched("players")),
                })
                .into(),
        }
    }
}

fn mismatched(task: &str) -> IntelError {
    IntelError::internal(format!("Task '{}' returned an unexpected insight", task))
}

fn hours(minutes: u64) -> f64 {
    (minutes as f64 / 60.0 * 10.0).round() / 10.0
}
