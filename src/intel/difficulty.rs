//! # Difficulty Estimator
//!
//! Fixed-weight, four-factor difficulty model:
//!
//! ```text
//! score = 0.50 * rarity + 0.20 * keywords + 0.15 * time + 0.15 * skill
//! ```
//!
//! Each factor is a sub-score in [0, 100]. The rarity factor is the inverted
//! global unlock percentage. The other three are built from vocabulary matches in
//! the description: matched points are summed, multiplied by the factor's gain and
//! clamped. The vocabulary and the gains live in an injectable [`Vocabulary`].

use crate::core::error::{IntelError, IntelResult};
use crate::core::types::Achievement;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Rarity assumed when the global percentage is unknown
pub const DEFAULT_RARITY_PERCENT: f64 = 50.0;

/// Upper bound on reported indicators
const MAX_INDICATORS: usize = 3;

const RARITY_WEIGHT: f64 = 0.50;
const KEYWORD_WEIGHT: f64 = 0.20;
const TIME_WEIGHT: f64 = 0.15;
const SKILL_WEIGHT: f64 = 0.15;

/// Difficulty bands
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DifficultyCategory {
    Trivial,
    Easy,
    Medium,
    Hard,
    VeryHard,
}

impl DifficultyCategory {
    pub fn from_score(score: f64) -> Self {
        match score {
            s if s < 20.0 => Self::Trivial,
            s if s < 40.0 => Self::Easy,
            s if s < 60.0 => Self::Medium,
            s if s < 80.0 => Self::Hard,
            _ => Self::VeryHard,
        }
    }

    pub fn estimated_time(&self) -> &'static str {
        match self {
            Self::Trivial => "5-15 minutes",
            Self::Easy => "15-30 minutes",
            Self::Medium => "30-60 minutes",
            Self::Hard => "1-3 hours",
            Self::VeryHard => "3+ hours",
        }
    }

    /// Preference for easier achievements when prioritising, in [0, 1]
    pub fn ease_weight(&self) -> f64 {
        match self {
            Self::Trivial | Self::Easy => 1.0,
            Self::Medium => 0.7,
            Self::Hard => 0.4,
            Self::VeryHard => 0.2,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Trivial => "trivial",
            Self::Easy => "easy",
            Self::Medium => "medium",
            Self::Hard => "hard",
            Self::VeryHard => "very_hard",
        }
    }
}

impl fmt::Display for DifficultyCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A labelled list of terms worth a fixed number of raw points per match
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TermGroup {
    pub label: String,
    pub points: f64,
    pub terms: Vec<String>,
}

impl TermGroup {
    pub fn new(label: &str, points: f64, terms: &[&str]) -> Self {
        Self {
            label: label.to_string(),
            points,
            terms: terms.iter().map(|t| t.to_string()).collect(),
        }
    }
}

/// Term groups of one factor and the gain mapping raw points onto [0, 100]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FactorVocabulary {
    pub gain: f64,
    pub groups: Vec<TermGroup>,
}

/// Vocabulary table driving the keyword, time and skill factors
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Vocabulary {
    pub keywords: FactorVocabulary,
    pub time: FactorVocabulary,
    pub skill: FactorVocabulary,
}

impl Default for Vocabulary {
    fn default() -> Self {
        Self {
            keywords: FactorVocabulary {
                gain: 100.0 / 30.0,
                groups: vec![
                    TermGroup::new(
                        "very_hard",
                        15.0,
                        &["perfect", "flawless", "no damage", "no deaths", "speedrun", "deathless"],
                    ),
                    TermGroup::new(
                        "hard",
                        10.0,
                        &["difficult", "challenging", "master", "expert", "hardest", "nightmare"],
                    ),
                    TermGroup::new("medium", 5.0, &["complete", "finish", "defeat", "all"]),
                    TermGroup::new("easy", -10.0, &["first", "tutorial", "basic", "simple", "easy"]),
                    TermGroup::new("grind", 8.0, &["collect all", "every", "maximum", "grind"]),
                ],
            },
            time: FactorVocabulary {
                gain: 100.0 / 20.0,
                groups: vec![
                    TermGroup::new("long", 10.0, &["long", "marathon", "hours", "extended"]),
                    TermGroup::new("quick", -5.0, &["quick", "fast", "rapid"]),
                ],
            },
            skill: FactorVocabulary {
                gain: 100.0 / 20.0,
                groups: vec![
                    TermGroup::new(
                        "mechanical",
                        10.0,
                        &[
                            "precise",
                            "timing",
                            "reaction",
                            "perfect",
                            "flawless",
                            "no damage",
                            "no deaths",
                            "speedrun",
                        ],
                    ),
                    TermGroup::new("strategic", 8.0, &["strategy", "planning", "optimal"]),
                    TermGroup::new("endurance", 5.0, &["grind", "farm", "repeat"]),
                ],
            },
        }
    }
}

/// Weighted contribution of each factor to the final score
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DifficultyBreakdown {
    pub rarity_contribution: f64,
    pub keyword_contribution: f64,
    pub time_contribution: f64,
    pub skill_contribution: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DifficultyFactors {
    pub rarity_percentile: f64,
    /// First matched keyword indicators, as "group: term"
    pub indicators: Vec<String>,
    pub time_requirement: String,
    pub skill_requirement: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DifficultyPrediction {
    pub score: f64,
    pub category: DifficultyCategory,
    pub estimated_time: String,
    pub breakdown: DifficultyBreakdown,
    pub factors: DifficultyFactors,
}

struct CompiledGroup {
    label: String,
    points: f64,
    terms: Vec<(String, Regex)>,
}

struct CompiledFactor {
    gain: f64,
    groups: Vec<CompiledGroup>,
}

impl CompiledFactor {
    fn compile(vocabulary: &FactorVocabulary) -> IntelResult<Self> {
        let groups = vocabulary
            .groups
            .iter()
            .map(|group| {
                let terms = group
                    .terms
                    .iter()
                    .map(|term| {
                        let source = format!(r"(?i)\b{}\b", regex::escape(term));
                        Regex::new(&source)
                            .map(|regex| (term.clone(), regex))
                            .map_err(|e| IntelError::config(format!("Invalid vocabulary term '{}': {}", term, e)))
                    })
                    .collect::<IntelResult<Vec<_>>>()?;
                Ok(CompiledGroup {
                    label: group.label.clone(),
                    points: group.points,
                    terms,
                })
            })
            .collect::<IntelResult<Vec<_>>>()?;

        Ok(Self {
            gain: vocabulary.gain,
            groups,
        })
    }

    /// Sub-score in [0, 100] and the matched "group: term" indicators
    fn score(&self, text: &str) -> (f64, Vec<String>) {
        let mut raw = 0.0;
        let mut indicators = Vec::new();
        for group in &self.groups {
            for (term, regex) in &group.terms {
                if regex.is_match(text) {
                    raw += group.points;
                    indicators.push(format!("{}: {}", group.label, term));
                }
            }
        }
        ((raw * self.gain).clamp(0.0, 100.0), indicators)
    }
}

/// Pure difficulty model over a compiled vocabulary
pub struct DifficultyEstimator {
    keywords: CompiledFactor,
    time: CompiledFactor,
    skill: CompiledFactor,
}

impl fmt::Debug for DifficultyEstimator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DifficultyEstimator")
            .field("keyword_gain", &self.keywords.gain)
            .field("time_gain", &self.time.gain)
            .field("skill_gain", &self.skill.gain)
            .finish()
    }
}

impl DifficultyEstimator {
    pub fn new(vocabulary: &Vocabulary) -> IntelResult<Self> {
        Ok(Self {
            keywords: CompiledFactor::compile(&vocabulary.keywords)?,
            time: CompiledFactor::compile(&vocabulary.time)?,
            skill: CompiledFactor::compile(&vocabulary.skill)?,
        })
    }

    /// Compiled vocabulary terms across all factors
    pub fn term_count(&self) -> usize {
        [&self.keywords, &self.time, &self.skill]
            .iter()
            .flat_map(|factor| factor.groups.iter())
            .map(|group| group.terms.len())
            .sum()
    }

    /// Predict difficulty given the global unlock percentage
    pub fn predict(&self, achievement: &Achievement, global_rarity_percent: f64) -> DifficultyPrediction {
        let rarity = if global_rarity_percent.is_finite() {
            global_rarity_percent.clamp(0.0, 100.0)
        } else {
            DEFAULT_RARITY_PERCENT
        };
        let text = achievement.description.as_str();

        let rarity_score = 100.0 - rarity;
        let (keyword_score, mut indicators) = self.keywords.score(text);
        let (time_score, _) = self.time.score(text);
        let (skill_score, _) = self.skill.score(text);
        indicators.truncate(MAX_INDICATORS);

        let score = (rarity_score * RARITY_WEIGHT
            + keyword_score * KEYWORD_WEIGHT
            + time_score * TIME_WEIGHT
            + skill_score * SKILL_WEIGHT)
            .clamp(0.0, 100.0);
        // banded on the reported value so score and category never disagree
        let score = round1(score);
        let category = DifficultyCategory::from_score(score);

        DifficultyPrediction {
            score,
            category,
            estimated_time: category.estimated_time().to_string(),
            breakdown: DifficultyBreakdown {
                rarity_contribution: round1(rarity_score * RARITY_WEIGHT),
                keyword_contribution: round1(keyword_score * KEYWORD_WEIGHT),
                time_contribution: round1(time_score * TIME_WEIGHT),
                skill_contribution: round1(skill_score * SKILL_WEIGHT),
            },
            factors: DifficultyFactors {
                rarity_percentile: round1(rarity_score),
                indicators,
                time_requirement: time_label(time_score).to_string(),
                skill_requirement: skill_label(skill_score).to_string(),
            },
        }
    }

    /// Predict using the achievement's own rarity, or the default when unknown
    pub fn predict_achievement(&self, achievement: &Achievement) -> DifficultyPrediction {
        self.predict(
            achievement,
            achievement.rarity_percent.unwrap_or(DEFAULT_RARITY_PERCENT),
        )
    }
}

impl Default for DifficultyEstimator {
    fn default() -> Self {
        // Default terms are plain words; escaping makes them always compile.
        let vocabulary = Vocabulary::default();
        let compile = |factor: &FactorVocabulary| {
            CompiledFactor::compile(factor).unwrap_or(CompiledFactor {
                gain: factor.gain,
                groups: Vec::new(),
            })
        };
        Self {
            keywords: compile(&vocabulary.keywords),
            time: compile(&vocabulary.time),
            skill: compile(&vocabulary.skill),
        }
    }
}

fn time_label(score: f64) -> &'static str {
    match score {
        s if s < 25.0 => "quick",
        s if s < 50.0 => "moderate",
        s if s < 75.0 => "long",
        _ => "very_long",
    }
}

fn skill_label(score: f64) -> &'static str {
    match score {
        s if s < 30.0 => "casual",
        s if s < 60.0 => "intermediate",
        s if s < 80.0 => "advanced",
        _ => "expert",
    }
}

fn round1(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

#[cfg(test)]
mod tests {
    use super::*;

    fn predict(description: &str, rarity: f64) -> DifficultyPrediction {
        DifficultyEstimator::default().predict(&Achievement::new("Test", description), rarity)
    }

    #[test]
    fn test_common_plain_achievement_is_trivial() {
        let prediction = predict("Open the map", 95.0);
        assert!(prediction.score < 20.0, "score was {}", prediction.score);
        assert_eq!(prediction.category, DifficultyCategory::Trivial);
        assert_eq!(prediction.estimated_time, "5-15 minutes");
        assert_eq!(prediction.factors.time_requirement, "quick");
        assert_eq!(prediction.factors.skill_requirement, "casual");
    }

    #[test]
    fn test_category_follows_reported_score() {
        // 39.92 rarity points at half weight is 19.96 before rounding
        let prediction = predict("", 60.08);
        assert_eq!(prediction.score, 20.0);
        assert_eq!(prediction.category, DifficultyCategory::Easy);
        assert_eq!(prediction.estimated_time, DifficultyCategory::Easy.estimated_time());
    }

    #[test]
    fn test_rare_perfect_run_is_very_hard() {
        let prediction = predict("Finish a perfect run with no deaths", 2.0);
        assert!(prediction.score > 80.0, "score was {}", prediction.score);
        assert_eq!(prediction.category, DifficultyCategory::VeryHard);
        assert_eq!(prediction.estimated_time, "3+ hours");
        assert_eq!(prediction.factors.skill_requirement, "expert");
        assert_eq!(
            prediction.factors.indicators,
            vec!["very_hard: perfect", "very_hard: no deaths", "medium: finish"]
        );
    }

    #[test]
    fn test_rarity_is_clamped_and_breakdown_sums() {
        let high = predict("Win", 150.0);
        let low = predict("Win", -20.0);
        assert_eq!(high.factors.rarity_percentile, 0.0);
        assert_eq!(low.factors.rarity_percentile, 100.0);

        let prediction = predict("A long and difficult marathon", 40.0);
        let b = &prediction.breakdown;
        let sum = b.rarity_contribution + b.keyword_contribution + b.time_contribution + b.skill_contribution;
        assert!((sum - prediction.score).abs() < 0.2);
        assert_eq!(prediction.factors.time_requirement, "very_long");
    }

    #[test]
    fn test_easy_terms_pull_keywords_to_zero() {
        let prediction = predict("Complete the first tutorial", 50.0);
        assert_eq!(prediction.breakdown.keyword_contribution, 0.0);
        assert_eq!(prediction.score, 25.0);
        assert_eq!(prediction.category, DifficultyCategory::Easy);
    }

    #[test]
    fn test_terms_match_whole_words_only() {
        // "allow" must not count as "all"
        let prediction = predict("Allow the guard to pass", 100.0);
        assert!(prediction.factors.indicators.is_empty());
        assert_eq!(prediction.score, 0.0);
    }

    #[test]
    fn test_injected_vocabulary() {
        let mut vocabulary = Vocabulary::default();
        vocabulary.keywords.groups = vec![TermGroup::new("custom", 30.0, &["banana"])];
        let estimator = DifficultyEstimator::new(&vocabulary).unwrap();

        let prediction = estimator.predict(&Achievement::new("Fruit", "Eat a banana"), 100.0);
        assert_eq!(prediction.breakdown.keyword_contribution, 20.0);
        assert_eq!(prediction.factors.indicators, vec!["custom: banana"]);
    }

    #[test]
    fn test_unknown_rarity_uses_default() {
        let estimator = DifficultyEstimator::default();
        let achievement = Achievement::new("Test", "Open the map");
        assert_eq!(estimator.predict_achievement(&achievement).score, 25.0);
        assert_eq!(
            estimator.predict_achievement(&achievement.with_rarity(90.0)).score,
            5.0
        );
    }

    #[test]
    fn test_category_bands() {
        assert_eq!(DifficultyCategory::from_score(19.9), DifficultyCategory::Trivial);
        assert_eq!(DifficultyCategory::from_score(20.0), DifficultyCategory::Easy);
        assert_eq!(DifficultyCategory::from_score(59.9), DifficultyCategory::Medium);
        assert_eq!(DifficultyCategory::from_score(60.0), DifficultyCategory::Hard);
        assert_eq!(DifficultyCategory::from_score(100.0), DifficultyCategory::VeryHard);
        assert_eq!(DifficultyCategory::VeryHard.to_string(), "very_hard");
    }
}
