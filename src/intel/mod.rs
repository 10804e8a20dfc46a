//! # Inference Module
//!
//! Pure, synchronous analysis over fetched achievement data:
//!
//! - [`dependency`]: infers prerequisite edges from descriptions and levels the graph
//! - [`difficulty`]: four-factor difficulty model with an injectable vocabulary
//! - [`missable`]: flags content that can be permanently missed

pub mod dependency;
pub mod difficulty;
pub mod missable;

pub use dependency::{
    analyze, build_graph, optimal_order, DependencyDetail, DependencyGraph, DependencyReport,
    GraphAnomaly, PatternCategory, Requirement,
};
pub use difficulty::{
    DifficultyCategory, DifficultyEstimator, DifficultyPrediction, TermGroup, Vocabulary,
};
pub use missable::{AchievementWarning, GuideScan};
