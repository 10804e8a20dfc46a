//! Missable-content detection over achievement descriptions and guide text.

use crate::core::types::Achievement;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

/// Characters of context kept on each side of a guide hit
pub const CONTEXT_WINDOW: usize = 100;

/// Patterns checked against achievement descriptions
const DESCRIPTION_PATTERN_COUNT: usize = 5;

/// Guide titles or descriptions containing one of these are worth scanning
const GUIDE_KEYWORDS: &[&str] = &["missable", "achievement", "guide", "100%"];

struct MissablePattern {
    label: &'static str,
    regex: Regex,
}

fn missable(label: &'static str, source: &str) -> MissablePattern {
    MissablePattern {
        label,
        regex: Regex::new(source).expect("missable pattern must compile"),
    }
}

// Ordered by urgency; descriptions only use the leading entries.
static PATTERNS: Lazy<Vec<MissablePattern>> = Lazy::new(|| {
    vec![
        missable("missable", r"(?i)\bmissable\b"),
        missable("point of no return", r"(?i)point of no return"),
        missable("before checkpoint", r"(?i)before (?:chapter|act|stage|level|mission) \d+"),
        missable("limited time", r"(?i)limited time"),
        missable("one chance", r"(?i)one (?:chance|shot|time|playthrough)"),
        missable("cannot go back", r"(?i)can(?:'|’)?t (?:go back|return|redo|replay)"),
        missable("permanently lost", r"(?i)permanently (?:locked|missed|unavailable)"),
        missable("story choice", r"(?i)(?:story|dialogue|conversation) (?:choice|decision)"),
        missable("must do before", r"(?i)must (?:do|complete|finish) before"),
        missable("time sensitive", r"(?i)(?:time|event)[-\s]sensitive"),
        missable("no second chance", r"(?i)no second chance"),
    ]
});

static WHITESPACE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").expect("whitespace pattern must compile"));

/// A locked achievement whose description hints at missable content
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AchievementWarning {
    pub achievement_name: String,
    pub achievement_description: String,
    pub indicator: String,
    pub urgency: String,
}

/// Missable indicators found in one guide body
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GuideScan {
    /// Up to three matched indicator labels, most urgent first
    pub patterns_found: Vec<String>,
    /// Whitespace-collapsed text around the first hit
    pub context: String,
}

/// Number of missable indicators in use
pub fn pattern_count() -> usize {
    PATTERNS.len()
}

/// Check a description against the most urgent indicators
pub fn scan_description(achievement: &Achievement) -> Option<AchievementWarning> {
    PATTERNS
        .iter()
        .take(DESCRIPTION_PATTERN_COUNT)
        .find(|pattern| pattern.regex.is_match(&achievement.description))
        .map(|pattern| AchievementWarning {
            achievement_name: achievement.name.clone(),
            achievement_description: achievement.description.clone(),
            indicator: pattern.label.to_string(),
            urgency: "medium".to_string(),
        })
}

/// Check guide text against every indicator
pub fn scan_guide_text(content: &str) -> Option<GuideScan> {
    let matched: Vec<&MissablePattern> = PATTERNS
        .iter()
        .filter(|pattern| pattern.regex.is_match(content))
        .collect();
    let first = matched.first()?;

    Some(GuideScan {
        context: extract_context(content, &first.regex, CONTEXT_WINDOW),
        patterns_found: matched.iter().take(3).map(|p| p.label.to_string()).collect(),
    })
}

/// Whether a guide looks like it covers achievements or missables
pub fn is_candidate_guide(title: &str, description: &str) -> bool {
    let title = title.to_lowercase();
    let description = description.to_lowercase();
    GUIDE_KEYWORDS
        .iter()
        .any(|keyword| title.contains(keyword) || description.contains(keyword))
}

/// Up to `window` characters on each side of the first match, whitespace collapsed
pub fn extract_context(content: &str, regex: &Regex, window: usize) -> String {
    let Some(found) = regex.find(content) else {
        return "Context unavailable".to_string();
    };

    let start = content[..found.start()]
        .char_indices()
        .rev()
        .nth(window.saturating_sub(1))
        .map(|(idx, _)| idx)
        .unwrap_or(0);
    let end = content[found.end()..]
        .char_indices()
        .nth(window)
        .map(|(idx, _)| found.end() + idx)
        .unwrap_or(content.len());

    let context = WHITESPACE.replace_all(content[start..end].trim(), " ");
    format!("...{}...", context)
}
