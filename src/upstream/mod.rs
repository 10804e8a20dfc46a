//! Upstream request builders and payload parsers.

pub mod steam;

pub use steam::{
    GlobalRarity, GuideDetails, NewsItem, PlayerProgress, RarityBand, SchemaAchievement,
    SteamRequests,
};
