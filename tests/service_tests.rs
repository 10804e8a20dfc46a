//! # Service Integration Tests
//!
//! Drives `IntelService` end to end over an in-process Steam fake and a
//! library catalog. The tokio clock is paused so retry backoff completes
//! instantly.

use achievement_intel::caching::CacheTier;
use achievement_intel::intel::GraphAnomaly;
use achievement_intel::tools::SessionStatus;
use achievement_intel::traffic::RateLimitConfig;
use achievement_intel::upstream::steam::{
    CURRENT_PLAYERS_ENDPOINT, GLOBAL_PERCENTAGES_ENDPOINT, NEWS_ENDPOINT, PLAYER_ACHIEVEMENTS_ENDPOINT,
    PUBLISHED_FILE_ENDPOINT, SCHEMA_ENDPOINT,
};
use achievement_intel::{
    GameRecord, IntelConfig, IntelError, IntelService, LibraryCatalog, RemoteError, RemoteResponse, RemoteSource,
    Section, SortStrategy,
};
use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::{json, Value};
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio_test::{assert_err, assert_ok};

const COMMUNITY: &str = "https://steamcommunity.com";
const HOLLOW: u32 = 100;
const LOOP: u32 = 300;

/// Canned Steam answers keyed by endpoint, plus the published file id for guides
#[derive(Default)]
struct FakeSteam {
    responses: Mutex<HashMap<String, RemoteResponse>>,
    calls: AtomicUsize,
}

impl FakeSteam {
    fn respond(&self, key: impl Into<String>, status: u16, body: Value) {
        self.responses.lock().insert(key.into(), RemoteResponse::new(status, body));
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn key(endpoint: &str, params: &BTreeMap<String, String>) -> String {
        let appid = params
            .get("appid")
            .or_else(|| params.get("gameid"))
            .or_else(|| params.get("publishedfileids[0]"))
            .cloned()
            .unwrap_or_default();
        format!("{}#{}", endpoint, appid)
    }
}

#[async_trait]
impl RemoteSource for FakeSteam {
    async fn call(
        &self,
        endpoint: &str,
        params: &BTreeMap<String, String>,
    ) -> Result<RemoteResponse, RemoteError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self
            .responses
            .lock()
            .get(&Self::key(endpoint, params))
            .cloned()
            .unwrap_or_else(|| RemoteResponse::new(404, Value::Null)))
    }
}

fn schema(entries: &[(&str, &str, &str)]) -> Value {
    let achievements: Vec<Value> = entries
        .iter()
        .map(|(api, name, description)| json!({"name": api, "displayName": name, "description": description}))
        .collect();
    json!({"game": {"gameName": "test", "availableGameStats": {"achievements": achievements}}})
}

fn guide(title: &str, description: &str, tags: &[&str]) -> Value {
    let tags: Vec<Value> = tags.iter().map(|tag| json!({"tag": tag})).collect();
    json!({"response": {"result": 1, "publishedfiledetails": [{
        "title": title,
        "description": description,
        "tags": tags,
        "views": "1200",
        "favorited": 40,
        "subscriptions": 300,
        "time_created": 1600000000,
        "time_updated": 1650000000
    }]}})
}

fn hollow_realms(fake: &FakeSteam) {
    fake.respond(
        format!("{}#{}", SCHEMA_ENDPOINT, HOLLOW),
        200,
        schema(&[
            ("FIRST_STEPS", "First Steps", "Complete the tutorial"),
            ("KNIGHT", "Knight", "Requires First Steps and defeat 10 enemies"),
            ("CHAMPION", "Champion", "Requires Knight. Win a flawless duel without taking damage"),
            ("FAREWELL", "Farewell", "Say goodbye to the queen before chapter 3"),
            ("COLLECTOR", "Collector", "Collect all 50 feathers"),
        ]),
    );
    fake.respond(
        format!("{}#{}", PLAYER_ACHIEVEMENTS_ENDPOINT, HOLLOW),
        200,
        json!({"playerstats": {"success": true, "achievements": [
            {"apiname": "FIRST_STEPS", "achieved": 1, "unlocktime": 1650000000},
            {"apiname": "KNIGHT", "achieved": 0, "unlocktime": 0}
        ]}}),
    );
    fake.respond(
        format!("{}#{}", GLOBAL_PERCENTAGES_ENDPOINT, HOLLOW),
        200,
        json!({"achievementpercentages": {"achievements": [
            {"name": "FIRST_STEPS", "percent": 90.1},
            {"name": "KNIGHT", "percent": "40.0"},
            {"name": "CHAMPION", "percent": 2.5},
            {"name": "FAREWELL", "percent": 30.0},
            {"name": "COLLECTOR", "percent": 10.0}
        ]}}),
    );
    fake.respond(
        format!("{}/app/{}/guides/#", COMMUNITY, HOLLOW),
        200,
        Value::String(
            [11, 12, 11, 13]
                .iter()
                .map(|id| format!(r#"<a href="{}/sharedfiles/filedetails/?id={}">guide</a>"#, COMMUNITY, id))
                .collect(),
        ),
    );
    fake.respond(
        format!("{}#11", PUBLISHED_FILE_ENDPOINT),
        200,
        guide(
            "Champion achievement guide",
            "Missable duel: there is a point of no return in act 2.",
            &["Achievements"],
        ),
    );
    fake.respond(
        format!("{}#12", PUBLISHED_FILE_ENDPOINT),
        200,
        guide("Fan art", "Pretty pictures", &["Screenshots"]),
    );
    fake.respond(
        format!("{}#13", PUBLISHED_FILE_ENDPOINT),
        200,
        guide("100% walkthrough", "Nothing dangerous here.", &["Achievements", "Walkthroughs"]),
    );
    fake.respond(
        format!("{}#{}", NEWS_ENDPOINT, HOLLOW),
        200,
        json!({"appnews": {"appid": HOLLOW, "newsitems": [
            {"title": "Patch 1.1", "contents": "Fixes", "author": "dev", "date": 1650000000, "url": "https://news/1"},
            {"title": "Launch", "contents": "Hello", "author": "dev", "date": 1600000000, "url": "https://news/0"}
        ]}}),
    );
    fake.respond(
        format!("{}#{}", CURRENT_PLAYERS_ENDPOINT, HOLLOW),
        200,
        json!({"response": {"player_count": 4321, "result": 1}}),
    );
}

fn looping(fake: &FakeSteam) {
    fake.respond(
        format!("{}#{}", SCHEMA_ENDPOINT, LOOP),
        200,
        schema(&[
            ("ALPHA", "Alpha", "Requires Beta"),
            ("BETA", "Beta", "Requires Alpha"),
            ("GAMMA", "Gamma", "Requires Alpha"),
            ("DELTA", "Delta", "Open the gate"),
        ]),
    );
}

fn library() -> LibraryCatalog {
    LibraryCatalog::new(vec![
        GameRecord {
            playtime_forever_minutes: 600,
            playtime_two_weeks_minutes: 120,
            ..GameRecord::new(HOLLOW, "Hollow Realms")
        },
        GameRecord::new(200, "Old Game"),
        GameRecord::new(LOOP, "Loop"),
    ])
}

fn config() -> IntelConfig {
    let mut config = IntelConfig::default();
    config.upstream.steam_id = "76561198000000000".to_string();
    config.upstream.community_base_url = COMMUNITY.to_string();
    config.rate_limit = RateLimitConfig {
        capacity: 100.0,
        refill_rate: 100.0,
    };
    config
}

fn service() -> (IntelService, Arc<FakeSteam>) {
    let fake = Arc::new(FakeSteam::default());
    hollow_realms(&fake);
    looping(&fake);
    let service = IntelService::new(&config(), fake.clone(), Arc::new(library())).unwrap();
    (service, fake)
}

#[tokio::test(start_paused = true)]
async fn test_roadmap_end_to_end() {
    let (service, _) = service();
    let roadmap = assert_ok!(service.get_roadmap("hollow realms", SortStrategy::Efficiency).await);

    assert_eq!(roadmap.appid, HOLLOW);
    assert_eq!(roadmap.total_achievements, 5);
    assert_eq!(roadmap.unlocked, 1);
    assert_eq!(roadmap.completion_percentage, 20.0);
    assert_eq!(roadmap.total_remaining, 4);
    assert_eq!(roadmap.sort_strategy, SortStrategy::Efficiency);

    // missable content outranks everything else
    assert_eq!(roadmap.roadmap[0].name, "Farewell");
    assert!(roadmap.roadmap[0].is_missable);

    let champion = roadmap.roadmap.iter().find(|e| e.name == "Champion").unwrap();
    assert_eq!(champion.rarity, 2.5);
    assert_eq!(champion.dependencies, vec!["Knight"]);
    assert_eq!(champion.unmet_dependencies, vec!["Knight"]);
    assert_eq!(champion.dependency_level, Some(2));
    assert_eq!(
        champion.guide_url.as_deref(),
        Some("https://steamcommunity.com/sharedfiles/filedetails/?id=11")
    );

    let knight = roadmap.roadmap.iter().find(|e| e.name == "Knight").unwrap();
    assert!(knight.unmet_dependencies.is_empty());
    assert_eq!(knight.rarity, 40.0);

    assert_eq!(roadmap.enrichment.rarity, Section::Available(5));
    // the fan art guide lacks the Achievements tag
    assert_eq!(roadmap.enrichment.guides, Section::Available(2));
    assert_eq!(roadmap.dependency_analysis.total_dependency_levels, 3);
    assert!(roadmap.dependency_analysis.anomalies.is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_roadmap_survives_missing_enrichment() {
    let (service, fake) = service();
    fake.respond(format!("{}#{}", GLOBAL_PERCENTAGES_ENDPOINT, HOLLOW), 500, Value::Null);
    fake.respond(format!("{}/app/{}/guides/#", COMMUNITY, HOLLOW), 403, Value::Null);

    let roadmap = service.get_roadmap("100", SortStrategy::Rarity).await.unwrap();

    assert_eq!(roadmap.total_remaining, 4);
    assert!(roadmap.roadmap.iter().all(|e| e.rarity == 50.0 && !e.has_guide));
    match &roadmap.enrichment.rarity {
        Section::Unavailable { kind, .. } => assert_eq!(kind, "transient_failure"),
        other => panic!("Expected rarity to be unavailable, got {:?}", other),
    }
    match &roadmap.enrichment.guides {
        Section::Unavailable { kind, .. } => assert_eq!(kind, "upstream_error"),
        other => panic!("Expected guides to be unavailable, got {:?}", other),
    }
}

#[tokio::test(start_paused = true)]
async fn test_repeated_roadmap_reuses_raw_payloads_only() {
    let (service, fake) = service();
    let first = service.get_roadmap("Hollow", SortStrategy::Completion).await.unwrap();
    let calls = fake.calls();

    let second = service.get_roadmap("Hollow", SortStrategy::Completion).await.unwrap();
    assert_eq!(first, second);
    assert_eq!(fake.calls(), calls);

    // new schema behind an emptied api tier: the roadmap is rebuilt from it
    fake.respond(
        format!("{}#{}", SCHEMA_ENDPOINT, HOLLOW),
        200,
        schema(&[
            ("FIRST_STEPS", "First Steps", "Complete the tutorial"),
            ("KNIGHT", "Knight", "Defeat 10 enemies"),
        ]),
    );
    service.gateway().cache().tier(CacheTier::Api).clear();

    let rebuilt = service.get_roadmap("Hollow", SortStrategy::Completion).await.unwrap();
    assert_eq!(rebuilt.total_achievements, 2);
    assert_eq!(rebuilt.total_remaining, 1);
    assert!(rebuilt.roadmap[0].dependencies.is_empty());
    assert!(fake.calls() > calls);
}

#[tokio::test(start_paused = true)]
async fn test_unknown_game_is_not_found() {
    let (service, fake) = service();
    let err = assert_err!(service.get_roadmap("Celeste", SortStrategy::Efficiency).await);

    assert!(matches!(err, IntelError::NotFound { .. }));
    assert_eq!(fake.calls(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_missable_scan() {
    let (service, _) = service();
    let report = service.scan_for_missables("Hollow Realms").await.unwrap();

    assert_eq!(report.missable_count, 2);
    assert_eq!(report.guides, Section::Available(2));
    assert_eq!(report.achievement_warnings.len(), 1);
    assert_eq!(report.achievement_warnings[0].achievement_name, "Farewell");
    assert_eq!(report.achievement_warnings[0].indicator, "before checkpoint");

    assert_eq!(report.guide_warnings.len(), 1);
    let warning = &report.guide_warnings[0];
    assert_eq!(warning.guide_title, "Champion achievement guide");
    assert_eq!(warning.patterns_found, vec!["missable", "point of no return"]);
    assert!(report.recommendation.unwrap().starts_with("Found 2 potential missable items"));
}

#[tokio::test(start_paused = true)]
async fn test_session_context_for_recent_game() {
    let (service, _) = service();
    let context = service.get_session_context(None).await.unwrap();

    assert_eq!(context.session_status, SessionStatus::Active);
    let game = context.current_game.unwrap();
    assert_eq!(game.name, "Hollow Realms");
    assert_eq!(game.playtime_total_hours, 10.0);
    assert_eq!(game.playtime_recent_hours, 2.0);

    let insights = context.insights.unwrap();
    let progress = insights.progress.available().unwrap();
    assert_eq!((progress.total, progress.unlocked), (5, 1));
    assert_eq!(progress.completion_percentage, 20.0);

    let alert = insights.missable_alert.available().unwrap();
    assert_eq!(alert.count, 2);
    assert!(alert.has_warnings);

    let suggested = insights.suggested_next.available().unwrap().as_ref().unwrap();
    assert_eq!(suggested.name, "Farewell");
    assert!(!suggested.next_steps.is_empty());

    let news = insights.news.available().unwrap();
    assert_eq!(news.count, 2);
    assert_eq!(news.latest_title.as_deref(), Some("Patch 1.1"));
    assert_eq!(insights.current_players, Section::Available(4321));
}

#[tokio::test(start_paused = true)]
async fn test_session_sections_fail_independently() {
    let (service, fake) = service();
    fake.respond(format!("{}#{}", NEWS_ENDPOINT, HOLLOW), 503, Value::Null);

    let context = service.get_session_context(Some("Hollow Realms")).await.unwrap();
    let insights = context.insights.unwrap();

    assert!(!insights.news.is_available());
    assert!(insights.progress.is_available());
    assert_eq!(insights.current_players, Section::Available(4321));
}

#[tokio::test(start_paused = true)]
async fn test_session_hint_for_idle_game() {
    let (service, _) = service();
    let context = service.get_session_context(Some("Old Game")).await.unwrap();
    assert_eq!(context.session_status, SessionStatus::Recent);
    assert_eq!(context.other_recent_games, vec!["Hollow Realms"]);
}

#[tokio::test(start_paused = true)]
async fn test_session_without_recent_activity() {
    let fake = Arc::new(FakeSteam::default());
    let catalog = LibraryCatalog::new(vec![GameRecord::new(1, "Dusty")]);
    let service = IntelService::new(&config(), fake.clone(), Arc::new(catalog)).unwrap();

    let context = service.get_session_context(None).await.unwrap();
    assert_eq!(context.session_status, SessionStatus::NoRecentActivity);
    assert!(context.insights.is_none());
    assert_eq!(fake.calls(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_dependency_cycle_is_reported() {
    let (service, _) = service();
    let analysis = service.analyze_dependencies("Loop").await.unwrap();

    assert_eq!(
        analysis.report.anomalies,
        vec![GraphAnomaly::DependencyCycle {
            members: vec!["Alpha".to_string(), "Beta".to_string()],
            blocked: vec!["Gamma".to_string()],
        }]
    );
    assert_eq!(analysis.report.optimal_order, vec!["Delta"]);
    // no player progress for this game, so nothing is unlocked
    assert_eq!(analysis.report.unlocked_count, 0);
}

#[tokio::test(start_paused = true)]
async fn test_dependency_graph_is_rebuilt_per_request() {
    let (service, fake) = service();
    let cyclic = service.analyze_dependencies("Loop").await.unwrap();
    assert_eq!(cyclic.report.anomalies.len(), 1);

    fake.respond(
        format!("{}#{}", SCHEMA_ENDPOINT, LOOP),
        200,
        schema(&[("ALPHA", "Alpha", "Open the gate"), ("BETA", "Beta", "Requires Alpha")]),
    );
    service.gateway().cache().tier(CacheTier::Api).clear();

    let acyclic = service.analyze_dependencies("Loop").await.unwrap();
    assert!(acyclic.report.anomalies.is_empty());
    assert_eq!(acyclic.report.total_achievements, 2);
    assert_eq!(acyclic.report.optimal_order, vec!["Alpha", "Beta"]);
}

#[tokio::test(start_paused = true)]
async fn test_global_rarity_and_achievements() {
    let (service, _) = service();

    let rarity = service.get_global_rarity("Hollow Realms").await.unwrap();
    assert_eq!(rarity.achievements[0].api_name, "CHAMPION");
    assert_eq!(rarity.achievements[0].name.as_deref(), Some("Champion"));
    assert_eq!(rarity.achievements.last().unwrap().unlocked, Some(true));

    let achievements = service.get_achievements("Hollow Realms").await.unwrap();
    assert_eq!(achievements.unlocked_achievements, 1);
    assert!(achievements.achievements[0].unlock_time.is_some());
}

#[tokio::test(start_paused = true)]
async fn test_stats_reflect_activity() {
    let (service, _) = service();
    service.get_roadmap("Hollow Realms", SortStrategy::Efficiency).await.unwrap();
    service.get_roadmap("Hollow Realms", SortStrategy::Efficiency).await.unwrap();

    let stats = service.get_stats().await.unwrap();
    assert_eq!(stats.caches.len(), 3);
    let tool = &stats.caches[1];
    assert!(tool.stats.hits >= 1);
    assert!(stats.gateway.remote_calls > 0);
    assert_eq!(stats.circuit_breaker.state, "closed");
    assert_eq!(stats.executor.max_workers, 5);
    assert!(stats.executor.batches >= 2);
    assert_eq!(stats.engines.dependency_patterns, 14);
    assert_eq!(stats.engines.missable_patterns, 11);

    let json = serde_json::to_value(&stats).unwrap();
    assert!(json["caches"][0]["description"].is_string());
}
