//! # Game Catalog
//!
//! Local metadata store resolving a user-supplied game identifier to a
//! [`GameRecord`] and listing recently played games.

use crate::core::error::{IntelError, IntelResult};
use crate::core::types::GameRecord;
use async_trait::async_trait;
use parking_lot::RwLock;
use serde::Deserialize;
use std::path::Path;
use tracing::info;

/// Lookup interface over the player's library
#[async_trait]
pub trait GameCatalog: Send + Sync {
    /// Resolve a numeric app id, an exact name (case-insensitive), or a name fragment
    async fn lookup_game(&self, identifier: &str) -> IntelResult<GameRecord>;

    /// Games with playtime in the last two weeks, most played first
    async fn recently_played(&self) -> IntelResult<Vec<GameRecord>>;
}

#[derive(Deserialize)]
#[serde(untagged)]
enum LibraryFile {
    Games(Vec<GameRecord>),
    Wrapped { games: Vec<GameRecord> },
}

/// In-memory catalog, in library order
#[derive(Debug, Default)]
pub struct LibraryCatalog {
    games: RwLock<Vec<GameRecord>>,
}

impl LibraryCatalog {
    pub fn new(games: Vec<GameRecord>) -> Self {
        Self {
            games: RwLock::new(games),
        }
    }

    /// Load a JSON array of games, or an object with a `games` array
    pub async fn from_json_file(path: impl AsRef<Path>) -> IntelResult<Self> {
        let path = path.as_ref();
        let content = tokio::fs::read_to_string(path).await.map_err(|e| IntelError::Io {
            message: format!("Failed to read library {}: {}", path.display(), e),
        })?;
        let games = match serde_json::from_str::<LibraryFile>(&content)? {
            LibraryFile::Games(games) | LibraryFile::Wrapped { games } => games,
        };
        info!(path = %path.display(), games = games.len(), "Loaded game library");
        Ok(Self::new(games))
    }

    /// Add or replace a game by app id
    pub fn upsert(&self, game: GameRecord) {
        let mut games = self.games.write();
        match games.iter_mut().find(|g| g.appid == game.appid) {
            Some(existing) => *existing = game,
            None => games.push(game),
        }
    }

    pub fn len(&self) -> usize {
        self.games.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.games.read().is_empty()
    }

    fn find(&self, identifier: &str) -> Option<GameRecord> {
        let identifier = identifier.trim();
        let games = self.games.read();

        if let Ok(appid) = identifier.parse::<u32>() {
            if let Some(game) = games.iter().find(|g| g.appid == appid) {
                return Some(game.clone());
            }
        }

        let wanted = identifier.to_lowercase();
        if wanted.is_empty() {
            return None;
        }
        games
            .iter()
            .find(|g| g.name.to_lowercase() == wanted)
            .or_else(|| games.iter().find(|g| g.name.to_lowercase().contains(&wanted)))
            .cloned()
    }
}

#[async_trait]
impl GameCatalog for LibraryCatalog {
    async fn lookup_game(&self, identifier: &str) -> IntelResult<GameRecord> {
        self.find(identifier)
            .ok_or_else(|| IntelError::not_found(format!("game '{}' in library", identifier)))
    }

    async fn recently_played(&self) -> IntelResult<Vec<GameRecord>> {
        let mut recent: Vec<GameRecord> = self
            .games
            .read()
            .iter()
            .filter(|g| g.playtime_two_weeks_minutes > 0)
            .cloned()
            .collect();
        recent.sort_by(|a, b| b.playtime_two_weeks_minutes.cmp(&a.playtime_two_weeks_minutes));
        Ok(recent)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn game(appid: u32, name: &str, recent: u64) -> GameRecord {
        GameRecord {
            playtime_two_weeks_minutes: recent,
            ..GameRecord::new(appid, name)
        }
    }

    fn catalog() -> LibraryCatalog {
        LibraryCatalog::new(vec![
            game(620, "Portal 2", 0),
            game(400, "Portal", 30),
            game(1145360, "Hades", 300),
        ])
    }

    #[tokio::test]
    async fn test_lookup_order() {
        let catalog = catalog();
        assert_eq!(catalog.lookup_game("620").await.unwrap().name, "Portal 2");
        // exact name beats the earlier substring match
        assert_eq!(catalog.lookup_game("portal").await.unwrap().appid, 400);
        assert_eq!(catalog.lookup_game("HAD").await.unwrap().appid, 1145360);

        let err = catalog.lookup_game("Celeste").await.unwrap_err();
        assert!(matches!(err, IntelError::NotFound { .. }));
        assert!(catalog.lookup_game("  ").await.is_err());
    }

    #[tokio::test]
    async fn test_recently_played_sorted() {
        let recent = catalog().recently_played().await.unwrap();
        let names: Vec<_> = recent.iter().map(|g| g.name.as_str()).collect();
        assert_eq!(names, vec!["Hades", "Portal"]);
    }

    #[tokio::test]
    async fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{"games": [{{"appid": 10, "name": "Counter-Strike", "playtime_forever": 120, "playtime_2weeks": 60}}]}}"#
        )
        .unwrap();

        let catalog = LibraryCatalog::from_json_file(file.path()).await.unwrap();
        assert_eq!(catalog.len(), 1);
        let cs = catalog.lookup_game("counter").await.unwrap();
        assert_eq!(cs.playtime_hours(), 2.0);
        assert_eq!(cs.playtime_two_weeks_minutes, 60);

        catalog.upsert(game(10, "Counter-Strike 1.6", 0));
        assert_eq!(catalog.len(), 1);
        assert!(catalog.recently_played().await.unwrap().is_empty());
    }
}
