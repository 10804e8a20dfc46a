//! # Steam Web API adapter
//!
//! Request builders for the endpoints the tools read and tolerant parsers that
//! turn their JSON bodies into typed records. Optional fields default; only a
//! missing top-level envelope is a parse error.

use crate::caching::CacheTier;
use crate::core::error::{IntelError, IntelResult};
use crate::core::types::Achievement;
use crate::gateway::FetchRequest;
use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use std::collections::{HashMap, HashSet};

pub const SCHEMA_ENDPOINT: &str = "ISteamUserStats/GetSchemaForGame/v2/";
pub const PLAYER_ACHIEVEMENTS_ENDPOINT: &str = "ISteamUserStats/GetPlayerAchievements/v1/";
pub const GLOBAL_PERCENTAGES_ENDPOINT: &str =
    "ISteamUserStats/GetGlobalAchievementPercentagesForApp/v2/";
pub const NEWS_ENDPOINT: &str = "ISteamNews/GetNewsForApp/v2/";
pub const CURRENT_PLAYERS_ENDPOINT: &str = "ISteamUserStats/GetNumberOfCurrentPlayers/v1/";
pub const PUBLISHED_FILE_ENDPOINT: &str = "ISteamRemoteStorage/GetPublishedFileDetails/v1/";

/// News bodies and guide descriptions are cut to this many characters
const MAX_TEXT_CHARS: usize = 500;

static GUIDE_ID: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"sharedfiles/filedetails/\?id=(\d+)").expect("guide id pattern must compile")
});

/// Builds [`FetchRequest`]s for one Steam account
#[derive(Debug, Clone)]
pub struct SteamRequests {
    community_base_url: String,
    steam_id: String,
}

impl SteamRequests {
    pub fn new(community_base_url: impl Into<String>, steam_id: impl Into<String>) -> Self {
        Self {
            community_base_url: community_base_url.into().trim_end_matches('/').to_string(),
            steam_id: steam_id.into(),
        }
    }

    pub fn schema(&self, appid: u32) -> FetchRequest {
        FetchRequest::new(SCHEMA_ENDPOINT, CacheTier::Api).param("appid", appid)
    }

    pub fn player_achievements(&self, appid: u32) -> FetchRequest {
        FetchRequest::new(PLAYER_ACHIEVEMENTS_ENDPOINT, CacheTier::Api)
            .param("appid", appid)
            .param("steamid", &self.steam_id)
    }

    pub fn global_percentages(&self, appid: u32) -> FetchRequest {
        FetchRequest::new(GLOBAL_PERCENTAGES_ENDPOINT, CacheTier::Api).param("gameid", appid)
    }

    pub fn news(&self, appid: u32, count: usize) -> FetchRequest {
        FetchRequest::new(NEWS_ENDPOINT, CacheTier::Api)
            .param("appid", appid)
            .param("count", count)
            .param("maxlength", MAX_TEXT_CHARS)
    }

    pub fn current_players(&self, appid: u32) -> FetchRequest {
        FetchRequest::new(CURRENT_PLAYERS_ENDPOINT, CacheTier::Api).param("appid", appid)
    }

    /// Top-rated community guide listing page (HTML)
    pub fn guide_listing(&self, appid: u32) -> FetchRequest {
        FetchRequest::new(
            format!("{}/app/{}/guides/", self.community_base_url, appid),
            CacheTier::Guide,
        )
        .param("browsefilter", "toprated")
        .param("browsesort", "toprated")
    }

    pub fn guide_details(&self, guide_id: &str) -> FetchRequest {
        FetchRequest::new(PUBLISHED_FILE_ENDPOINT, CacheTier::Guide)
            .param("itemcount", 1)
            .param("publishedfileids[0]", guide_id)
    }

    pub fn guide_url(&self, guide_id: &str) -> String {
        format!("{}/sharedfiles/filedetails/?id={}", self.community_base_url, guide_id)
    }
}

// Steam reports some numbers as strings depending on the endpoint version.
#[derive(Deserialize)]
#[serde(untagged)]
enum Loose {
    Float(f64),
    Text(String),
}

fn loose_f64<'de, D: Deserializer<'de>>(deserializer: D) -> Result<f64, D::Error> {
    match Loose::deserialize(deserializer)? {
        Loose::Float(value) => Ok(value),
        Loose::Text(text) => text.trim().parse().map_err(serde::de::Error::custom),
    }
}

fn loose_u64<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u64, D::Error> {
    let value = loose_f64(deserializer)?;
    Ok(if value.is_finite() && value > 0.0 { value as u64 } else { 0 })
}

fn timestamp(seconds: i64) -> Option<DateTime<Utc>> {
    if seconds > 0 {
        DateTime::from_timestamp(seconds, 0)
    } else {
        None
    }
}

fn truncate_chars(text: &str, max: usize) -> String {
    match text.char_indices().nth(max) {
        Some((cut, _)) => format!("{}...", &text[..cut]),
        None => text.to_string(),
    }
}

fn envelope<'a>(body: &'a Value, key: &str, what: &str) -> IntelResult<&'a Value> {
    body.get(key)
        .ok_or_else(|| IntelError::parse(format!("{} payload has no '{}' field", what, key)))
}

// ---------------------------------------------------------------------------
// Achievement schema and player progress
// ---------------------------------------------------------------------------

/// One schema entry; `name` upstream is the stable api name
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct SchemaAchievement {
    #[serde(rename = "name")]
    pub api_name: String,
    #[serde(rename = "displayName", default)]
    pub display_name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default, deserialize_with = "loose_u64")]
    pub hidden: u64,
}

#[derive(Deserialize, Default)]
struct RawSchemaGame {
    #[serde(rename = "availableGameStats", default)]
    available_game_stats: RawGameStats,
}

#[derive(Deserialize, Default)]
struct RawGameStats {
    #[serde(default)]
    achievements: Vec<SchemaAchievement>,
}

/// Parse `GetSchemaForGame`; a game without achievements yields an empty list
pub fn parse_schema(body: &Value) -> IntelResult<Vec<SchemaAchievement>> {
    let game = envelope(body, "game", "Schema")?;
    let game: RawSchemaGame = serde_json::from_value(game.clone())?;
    Ok(game.available_game_stats.achievements)
}

/// Unlock state of one achievement for the configured player
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct PlayerProgress {
    #[serde(rename = "apiname")]
    pub api_name: String,
    #[serde(default, deserialize_with = "loose_u64")]
    pub achieved: u64,
    #[serde(rename = "unlocktime", default)]
    pub unlock_time: i64,
}

#[derive(Deserialize)]
struct RawPlayerStats {
    #[serde(default)]
    success: bool,
    #[serde(default)]
    achievements: Vec<PlayerProgress>,
}

/// Parse `GetPlayerAchievements` into progress keyed by api name
///
/// Private profiles and unsuccessful answers yield `None`.
pub fn parse_player_achievements(body: &Value) -> Option<HashMap<String, PlayerProgress>> {
    let stats: RawPlayerStats = serde_json::from_value(body.get("playerstats")?.clone()).ok()?;
    if !stats.success {
        return None;
    }
    Some(
        stats
            .achievements
            .into_iter()
            .map(|progress| (progress.api_name.clone(), progress))
            .collect(),
    )
}

/// Combine the schema with optional player progress, in schema order
pub fn merge_achievements(
    schema: Vec<SchemaAchievement>,
    progress: Option<&HashMap<String, PlayerProgress>>,
) -> Vec<Achievement> {
    schema
        .into_iter()
        .map(|entry| {
            let player = progress.and_then(|p| p.get(&entry.api_name));
            let name = if entry.display_name.is_empty() {
                "Unknown".to_string()
            } else {
                entry.display_name
            };
            Achievement {
                api_name: entry.api_name,
                name,
                description: entry.description,
                unlocked: player.map(|p| p.achieved == 1).unwrap_or(false),
                unlock_time: player.and_then(|p| timestamp(p.unlock_time)),
                rarity_percent: None,
            }
        })
        .collect()
}

// ---------------------------------------------------------------------------
// Global rarity
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RarityBand {
    VeryRare,
    Rare,
    Uncommon,
    Common,
}

impl RarityBand {
    pub fn from_percent(percent: f64) -> Self {
        match percent {
            p if p < 5.0 => Self::VeryRare,
            p if p < 20.0 => Self::Rare,
            p if p < 50.0 => Self::Uncommon,
            _ => Self::Common,
        }
    }
}

/// Global unlock percentage of one achievement
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GlobalRarity {
    #[serde(rename = "name")]
    pub api_name: String,
    #[serde(deserialize_with = "loose_f64")]
    pub percent: f64,
}

#[derive(Deserialize)]
struct RawPercentages {
    #[serde(default)]
    achievements: Vec<GlobalRarity>,
}

/// Parse `GetGlobalAchievementPercentagesForApp`, rarest first
pub fn parse_global_percentages(body: &Value) -> IntelResult<Vec<GlobalRarity>> {
    let raw = envelope(body, "achievementpercentages", "Global percentages")?;
    let mut rarities = serde_json::from_value::<RawPercentages>(raw.clone())?.achievements;
    rarities.sort_by(|a, b| a.percent.total_cmp(&b.percent));
    Ok(rarities)
}

// ---------------------------------------------------------------------------
// News and player counts
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NewsItem {
    pub title: String,
    pub contents: String,
    pub author: String,
    pub date: Option<DateTime<Utc>>,
    pub url: String,
}

#[derive(Deserialize)]
struct RawNews {
    #[serde(rename = "newsitems", default)]
    news_items: Vec<RawNewsItem>,
}

#[derive(Deserialize)]
struct RawNewsItem {
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    contents: String,
    #[serde(default)]
    author: Option<String>,
    #[serde(default)]
    date: i64,
    #[serde(default)]
    url: String,
}

/// Parse `GetNewsForApp`
pub fn parse_news(body: &Value) -> IntelResult<Vec<NewsItem>> {
    let raw = envelope(body, "appnews", "News")?;
    let news: RawNews = serde_json::from_value(raw.clone())?;
    Ok(news
        .news_items
        .into_iter()
        .map(|item| NewsItem {
            title: item.title.filter(|t| !t.is_empty()).unwrap_or_else(|| "Untitled".to_string()),
            contents: truncate_chars(&item.contents, MAX_TEXT_CHARS),
            author: item.author.filter(|a| !a.is_empty()).unwrap_or_else(|| "Unknown".to_string()),
            date: timestamp(item.date),
            url: item.url,
        })
        .collect())
}

/// Parse `GetNumberOfCurrentPlayers`
pub fn parse_player_count(body: &Value) -> IntelResult<u64> {
    let response = envelope(body, "response", "Player count")?;
    Ok(response
        .get("player_count")
        .and_then(Value::as_u64)
        .unwrap_or(0))
}

// ---------------------------------------------------------------------------
// Community guides
// ---------------------------------------------------------------------------

/// Distinct guide ids in page order, at most `limit`
pub fn scrape_guide_ids(page: &str, limit: usize) -> Vec<String> {
    let mut seen = HashSet::new();
    GUIDE_ID
        .captures_iter(page)
        .filter_map(|captures| captures.get(1).map(|id| id.as_str().to_string()))
        .filter(|id| seen.insert(id.clone()))
        .take(limit)
        .collect()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GuideDetails {
    pub id: String,
    pub title: String,
    /// Guide body; for published guides this is the full text
    pub description: String,
    pub tags: Vec<String>,
    pub views: u64,
    pub favorites: u64,
    pub subscriptions: u64,
    pub created: Option<DateTime<Utc>>,
    pub updated: Option<DateTime<Utc>>,
    pub url: String,
}

impl GuideDetails {
    /// Description cut for listings
    pub fn summary(&self) -> String {
        truncate_chars(&self.description, MAX_TEXT_CHARS)
    }

    pub fn has_tag(&self, tag: &str) -> bool {
        self.tags.iter().any(|t| t.eq_ignore_ascii_case(tag))
    }
}

#[derive(Deserialize)]
struct RawFileResponse {
    #[serde(rename = "publishedfiledetails", default)]
    details: Vec<RawFileDetails>,
}

#[derive(Deserialize)]
struct RawFileDetails {
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    description: String,
    #[serde(default)]
    tags: Vec<RawTag>,
    #[serde(default, deserialize_with = "loose_u64")]
    views: u64,
    #[serde(default, deserialize_with = "loose_u64")]
    favorited: u64,
    #[serde(default, deserialize_with = "loose_u64")]
    subscriptions: u64,
    #[serde(default)]
    time_created: i64,
    #[serde(default)]
    time_updated: i64,
}

#[derive(Deserialize)]
struct RawTag {
    #[serde(default)]
    tag: String,
}

/// Parse `GetPublishedFileDetails` for a single requested file
pub fn parse_guide_details(body: &Value, guide_id: &str, url: String) -> IntelResult<GuideDetails> {
    let raw = envelope(body, "response", "Published file")?;
    let response: RawFileResponse = serde_json::from_value(raw.clone())?;
    let file = response
        .details
        .into_iter()
        .next()
        .ok_or_else(|| IntelError::not_found(format!("guide {}", guide_id)))?;

    Ok(GuideDetails {
        id: guide_id.to_string(),
        title: file.title.filter(|t| !t.is_empty()).unwrap_or_else(|| "Untitled".to_string()),
        description: file.description,
        tags: file.tags.into_iter().map(|t| t.tag).collect(),
        views: file.views,
        favorites: file.favorited,
        subscriptions: file.subscriptions,
        created: timestamp(file.time_created),
        updated: timestamp(file.time_updated),
        url,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_request_builders() {
        let requests = SteamRequests::new("https://steamcommunity.com/", "7656");
        let progress = requests.player_achievements(620);
        assert_eq!(progress.endpoint, PLAYER_ACHIEVEMENTS_ENDPOINT);
        assert_eq!(progress.params["steamid"], "7656");
        assert_eq!(progress.params["appid"], "620");
        assert_eq!(progress.tier, CacheTier::Api);

        let listing = requests.guide_listing(620);
        assert_eq!(listing.endpoint, "https://steamcommunity.com/app/620/guides/");
        assert_eq!(listing.tier, CacheTier::Guide);
        assert_eq!(
            requests.guide_url("42"),
            "https://steamcommunity.com/sharedfiles/filedetails/?id=42"
        );
    }

    #[test]
    fn test_schema_merge_with_progress() {
        let schema = parse_schema(&json!({
            "game": {"availableGameStats": {"achievements": [
                {"name": "ACH_WIN", "displayName": "Winner", "description": "Win a match"},
                {"name": "ACH_HIDDEN", "displayName": "", "hidden": 1}
            ]}}
        }))
        .unwrap();
        let progress = parse_player_achievements(&json!({
            "playerstats": {"success": true, "achievements": [
                {"apiname": "ACH_WIN", "achieved": 1, "unlocktime": 1700000000}
            ]}
        }));

        let achievements = merge_achievements(schema, progress.as_ref());
        assert_eq!(achievements.len(), 2);
        assert!(achievements[0].unlocked);
        assert!(achievements[0].unlock_time.is_some());
        assert_eq!(achievements[1].name, "Unknown");
        assert!(!achievements[1].unlocked);
    }

    #[test]
    fn test_schema_without_achievements_and_missing_envelope() {
        assert!(parse_schema(&json!({"game": {}})).unwrap().is_empty());
        assert!(matches!(parse_schema(&json!({})), Err(IntelError::Parse { .. })));
        assert!(parse_player_achievements(&json!({"playerstats": {"success": false}})).is_none());
    }

    #[test]
    fn test_global_percentages_accept_strings_and_sort() {
        let rarities = parse_global_percentages(&json!({
            "achievementpercentages": {"achievements": [
                {"name": "COMMON", "percent": "71.5"},
                {"name": "RARE", "percent": 1.25}
            ]}
        }))
        .unwrap();
        assert_eq!(rarities[0].api_name, "RARE");
        assert_eq!(rarities[1].percent, 71.5);
        assert_eq!(RarityBand::from_percent(rarities[0].percent), RarityBand::VeryRare);
        assert_eq!(RarityBand::from_percent(71.5), RarityBand::Common);
    }

    #[test]
    fn test_news_and_player_count() {
        let long = "a".repeat(600);
        let news = parse_news(&json!({
            "appnews": {"newsitems": [
                {"title": "Patch 1.1", "contents": long, "author": "dev", "date": 1700000000, "url": "u"},
                {"contents": "short"}
            ]}
        }))
        .unwrap();
        assert_eq!(news[0].contents.chars().count(), MAX_TEXT_CHARS + 3);
        assert_eq!(news[1].title, "Untitled");
        assert_eq!(news[1].author, "Unknown");
        assert!(news[1].date.is_none());

        assert_eq!(
            parse_player_count(&json!({"response": {"player_count": 1234, "result": 1}})).unwrap(),
            1234
        );
        assert!(parse_player_count(&json!({"error": "x"})).is_err());
    }

    #[test]
    fn test_scrape_guide_ids_dedupes_in_order() {
        let page = r#"
            <a href="https://steamcommunity.com/sharedfiles/filedetails/?id=300">x</a>
            <a href="https://steamcommunity.com/sharedfiles/filedetails/?id=100">y</a>
            <a href="https://steamcommunity.com/sharedfiles/filedetails/?id=300">z</a>
            <a href="https://steamcommunity.com/sharedfiles/filedetails/?id=200">w</a>
        "#;
        assert_eq!(scrape_guide_ids(page, 10), vec!["300", "100", "200"]);
        assert_eq!(scrape_guide_ids(page, 2), vec!["300", "100"]);
    }

    #[test]
    fn test_guide_details() {
        let details = parse_guide_details(
            &json!({"response": {"publishedfiledetails": [{
                "title": "100% Achievement Guide",
                "description": "Everything is missable after chapter 3",
                "tags": [{"tag": "Achievements"}],
                "views": "1500",
                "favorited": 20
            }]}}),
            "42",
            "https://example.com/42".to_string(),
        )
        .unwrap();
        assert_eq!(details.views, 1500);
        assert!(details.has_tag("achievements"));
        assert!(details.created.is_none());

        let missing = parse_guide_details(&json!({"response": {}}), "9", String::new());
        assert!(matches!(missing, Err(IntelError::NotFound { .. })));
    }
}
