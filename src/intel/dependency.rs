//! # Dependency Graph Engine
//!
//! Infers "must be done before" relations between the achievements of one game
//! from their descriptions, then levels the resulting graph with Kahn's
//! algorithm.
//!
//! ## Pattern categories (applied in order, case-insensitive)
//! 1. explicit reference: "after getting X", "requires X", "must have X"
//! 2. numeric progression: "reach level N", "at level N"
//! 3. quantity threshold: "collect N", "defeat N", "find N"
//! 4. narrative checkpoint: "in chapter N", "during act N"
//! 5. sequence marker: "before X", "then X"
//!
//! Every extracted phrase is matched against the other achievement names of the
//! same game. An exact (case-insensitive) name match wins; otherwise names that
//! contain the phrase or are contained in it match, in input order. Phrases that
//! match nothing stay on record as requirements but create no edge.
//!
//! Categories 1-4 make the matched achievement a prerequisite of the described
//! one. Sequence markers point the other way: "do this before X" makes the
//! described achievement a prerequisite of X.
//!
//! Nodes caught in a cycle, and nodes that depend on one, cannot be leveled.
//! They are reported as [`GraphAnomaly::DependencyCycle`] and left out of the
//! levels and of [`optimal_order`].

use crate::core::error::IntelError;
use crate::core::types::Achievement;
use indexmap::IndexMap;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet, VecDeque};
use tracing::{debug, warn};

/// Shortest phrase or name used for substring matching
const MIN_SUBSTRING_LEN: usize = 3;

/// Kind of textual cue a requirement was extracted from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PatternCategory {
    ExplicitReference,
    NumericProgression,
    QuantityThreshold,
    NarrativeCheckpoint,
    SequenceMarker,
}

impl PatternCategory {
    /// Whether matches of this category point from the matched name to the described achievement
    fn is_reversed(&self) -> bool {
        matches!(self, Self::SequenceMarker)
    }

    /// Whether the phrase is free text (as opposed to a "<unit> <number>" token)
    fn is_free_text(&self) -> bool {
        matches!(self, Self::ExplicitReference | Self::SequenceMarker)
    }
}

struct DependencyPattern {
    category: PatternCategory,
    regex: Regex,
}

fn pattern(category: PatternCategory, source: &str) -> DependencyPattern {
    DependencyPattern {
        category,
        regex: Regex::new(source).expect("dependency pattern must compile"),
    }
}

static PATTERNS: Lazy<Vec<DependencyPattern>> = Lazy::new(|| {
    use PatternCategory::*;
    vec![
        pattern(ExplicitReference, r#"(?i)\bafter (?:getting|obtaining|unlocking|completing) ["']?([^"'.]+)["']?"#),
        pattern(ExplicitReference, r#"(?i)\brequires? ["']?([^"'.]+)["']?"#),
        pattern(ExplicitReference, r#"(?i)\bmust (?:first|have) ["']?([^"'.]+)["']?"#),
        pattern(ExplicitReference, r#"(?i)\bonce you(?:'ve| have) ["']?([^"'.]+)["']?"#),
        pattern(NumericProgression, r"(?i)\breach (level \d+)"),
        pattern(NumericProgression, r"(?i)\b(level \d+) or (?:higher|above)"),
        pattern(NumericProgression, r"(?i)\bat (level \d+)"),
        pattern(QuantityThreshold, r"(?i)\b(collect) (?:all )?(\d+)"),
        pattern(QuantityThreshold, r"(?i)\b(kill|defeat) (\d+)"),
        pattern(QuantityThreshold, r"(?i)\b(find) (?:all )?(\d+)"),
        pattern(QuantityThreshold, r"(?i)\b(complete) (\d+)"),
        pattern(NarrativeCheckpoint, r"(?i)\b(?:after|during|in) ((?:chapter|act|stage|mission) \d+)"),
        pattern(SequenceMarker, r"(?i)\bbefore ([a-zA-Z\s]+)"),
        pattern(SequenceMarker, r"(?i)\b(?:then|next) ([a-zA-Z\s]+)"),
    ]
});

/// A requirement phrase found in a description
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Requirement {
    pub category: PatternCategory,
    /// Lower-cased phrase as extracted
    pub phrase: String,
    /// Achievement names the phrase resolved to, possibly none
    pub matched: Vec<String>,
}

/// Structural problems found while leveling the graph
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum GraphAnomaly {
    DependencyCycle {
        /// Achievements that depend on each other, in input order
        members: Vec<String>,
        /// Achievements that transitively depend on the cycle
        blocked: Vec<String>,
    },
}

impl From<&GraphAnomaly> for IntelError {
    fn from(anomaly: &GraphAnomaly) -> Self {
        match anomaly {
            GraphAnomaly::DependencyCycle { members, blocked } => IntelError::DependencyCycle {
                members: members.clone(),
                blocked: blocked.clone(),
            },
        }
    }
}

/// Leveled prerequisite graph over one game's achievements
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DependencyGraph {
    /// Achievement names in input order
    pub nodes: Vec<String>,
    /// Name to prerequisite names; every node has an entry
    pub edges: IndexMap<String, Vec<String>>,
    /// Topological levels; level 0 has no prerequisites
    pub levels: Vec<Vec<String>>,
    /// Extracted requirement phrases per achievement (only non-empty entries)
    pub requirements: IndexMap<String, Vec<Requirement>>,
    pub anomalies: Vec<GraphAnomaly>,
}

impl DependencyGraph {
    pub fn prerequisites(&self, name: &str) -> &[String] {
        self.edges.get(name).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Achievements listing `name` as a prerequisite, in input order
    pub fn dependents(&self, name: &str) -> Vec<&str> {
        self.edges
            .iter()
            .filter(|(_, prerequisites)| prerequisites.iter().any(|p| p == name))
            .map(|(dependent, _)| dependent.as_str())
            .collect()
    }

    /// Level index of `name`; `None` for cycle members and nodes blocked by them
    pub fn level_of(&self, name: &str) -> Option<usize> {
        self.levels
            .iter()
            .position(|level| level.iter().any(|n| n == name))
    }

    pub fn total_dependencies(&self) -> usize {
        self.edges.values().map(Vec::len).sum()
    }

    /// Whether `name` takes part in, or is blocked by, a cycle
    pub fn is_unleveled(&self, name: &str) -> bool {
        self.anomalies.iter().any(|anomaly| match anomaly {
            GraphAnomaly::DependencyCycle { members, blocked } => {
                members.iter().chain(blocked).any(|n| n == name)
            }
        })
    }
}

/// Name lookup for one achievement set
struct NameIndex {
    lowered: Vec<String>,
    exact: HashMap<String, usize>,
}

impl NameIndex {
    fn new(nodes: &[String]) -> Self {
        let lowered: Vec<String> = nodes.iter().map(|n| n.to_lowercase()).collect();
        let mut exact = HashMap::with_capacity(lowered.len());
        for (idx, name) in lowered.iter().enumerate() {
            exact.entry(name.clone()).or_insert(idx);
        }
        Self { lowered, exact }
    }

    /// Resolve a phrase to node indices, never including `current`
    fn resolve(&self, phrase: &str, category: PatternCategory, current: usize) -> Vec<usize> {
        if phrase.is_empty() {
            return Vec::new();
        }
        if let Some(&idx) = self.exact.get(phrase) {
            if idx != current {
                return vec![idx];
            }
        }

        if category.is_free_text() {
            if phrase.chars().count() < MIN_SUBSTRING_LEN {
                return Vec::new();
            }
            self.lowered
                .iter()
                .enumerate()
                .filter(|(idx, name)| {
                    *idx != current
                        && name.chars().count() >= MIN_SUBSTRING_LEN
                        && (name.contains(phrase) || phrase.contains(name.as_str()))
                })
                .map(|(idx, _)| idx)
                .collect()
        } else {
            // "level 1" must not match "Level 10"
            let Ok(token) = Regex::new(&format!(r"\b{}\b", regex::escape(phrase))) else {
                return Vec::new();
            };
            self.lowered
                .iter()
                .enumerate()
                .filter(|(idx, name)| *idx != current && token.is_match(name))
                .map(|(idx, _)| idx)
                .collect()
        }
    }
}

/// Number of requirement patterns in use
pub fn pattern_count() -> usize {
    PATTERNS.len()
}

/// Extract requirement phrases from one description
fn extract_phrases(description: &str) -> Vec<(PatternCategory, String)> {
    let text = description.to_lowercase();
    let mut phrases = Vec::new();

    for pattern in PATTERNS.iter() {
        for captures in pattern.regex.captures_iter(&text) {
            let phrase = match pattern.category {
                PatternCategory::QuantityThreshold => match (captures.get(1), captures.get(2)) {
                    (Some(verb), Some(count)) => format!("{} {}", verb.as_str(), count.as_str()),
                    _ => continue,
                },
                _ => match captures.get(1) {
                    Some(found) => found.as_str().split_whitespace().collect::<Vec<_>>().join(" "),
                    None => continue,
                },
            };
            if !phrase.is_empty() {
                phrases.push((pattern.category, phrase));
            }
        }
    }
    phrases
}

/// Build the prerequisite graph for one game's achievements
pub fn build_graph(achievements: &[Achievement]) -> DependencyGraph {
    let mut nodes: Vec<String> = Vec::with_capacity(achievements.len());
    let mut seen = HashSet::with_capacity(achievements.len());
    for achievement in achievements {
        if seen.insert(achievement.name.as_str()) {
            nodes.push(achievement.name.clone());
        }
    }

    let names = NameIndex::new(&nodes);
    let position: HashMap<&str, usize> = nodes
        .iter()
        .enumerate()
        .map(|(idx, name)| (name.as_str(), idx))
        .collect();

    let mut prerequisites: Vec<Vec<usize>> = vec![Vec::new(); nodes.len()];
    let mut requirements: IndexMap<String, Vec<Requirement>> = IndexMap::new();

    for achievement in achievements {
        let Some(&current) = position.get(achievement.name.as_str()) else {
            continue;
        };

        for (category, phrase) in extract_phrases(&achievement.description) {
            let matched = names.resolve(&phrase, category, current);
            for &other in &matched {
                let (from, to) = if category.is_reversed() {
                    (other, current)
                } else {
                    (current, other)
                };
                if !prerequisites[from].contains(&to) {
                    prerequisites[from].push(to);
                }
            }

            requirements
                .entry(achievement.name.clone())
                .or_default()
                .push(Requirement {
                    category,
                    matched: matched.iter().map(|&idx| nodes[idx].clone()).collect(),
                    phrase,
                });
        }
    }

    let (levels, residual) = kahn_levels(&prerequisites);
    let anomalies = if residual.is_empty() {
        Vec::new()
    } else {
        cycle_anomalies(&prerequisites, &residual, &nodes)
    };
    for anomaly in &anomalies {
        warn!(anomaly = ?anomaly, "Achievement dependency cycle detected");
    }

    let edges = nodes
        .iter()
        .zip(&prerequisites)
        .map(|(name, prereqs)| {
            (
                name.clone(),
                prereqs.iter().map(|&idx| nodes[idx].clone()).collect(),
            )
        })
        .collect();

    let levels: Vec<Vec<String>> = levels
        .into_iter()
        .map(|level| level.into_iter().map(|idx| nodes[idx].clone()).collect())
        .collect();

    debug!(
        nodes = nodes.len(),
        levels = levels.len(),
        anomalies = anomalies.len(),
        "Dependency graph built"
    );

    DependencyGraph {
        nodes,
        edges,
        levels,
        requirements,
        anomalies,
    }
}

/// Kahn leveling; returns levels (input order within a level) and unleveled nodes
fn kahn_levels(prerequisites: &[Vec<usize>]) -> (Vec<Vec<usize>>, Vec<usize>) {
    let count = prerequisites.len();
    let mut in_degree: Vec<usize> = prerequisites.iter().map(Vec::len).collect();
    let mut dependents: Vec<Vec<usize>> = vec![Vec::new(); count];
    for (node, prereqs) in prerequisites.iter().enumerate() {
        for &prereq in prereqs {
            dependents[prereq].push(node);
        }
    }

    let mut leveled = vec![false; count];
    let mut levels = Vec::new();
    let mut current: Vec<usize> = (0..count).filter(|&n| in_degree[n] == 0).collect();

    while !current.is_empty() {
        let mut next = Vec::new();
        for &node in &current {
            leveled[node] = true;
            for &dependent in &dependents[node] {
                in_degree[dependent] -= 1;
                if in_degree[dependent] == 0 {
                    next.push(dependent);
                }
            }
        }
        next.sort_unstable();
        levels.push(std::mem::replace(&mut current, next));
    }

    let residual = (0..count).filter(|&n| !leveled[n]).collect();
    (levels, residual)
}

/// Strongly connected components among `residual`, iterative Tarjan
fn cycle_components(prerequisites: &[Vec<usize>], in_residual: &[bool]) -> Vec<Vec<usize>> {
    let count = prerequisites.len();
    let mut index: Vec<Option<usize>> = vec![None; count];
    let mut low = vec![0usize; count];
    let mut on_stack = vec![false; count];
    let mut stack = Vec::new();
    let mut components = Vec::new();
    let mut counter = 0;

    for start in (0..count).filter(|&n| in_residual[n]) {
        if index[start].is_some() {
            continue;
        }
        index[start] = Some(counter);
        low[start] = counter;
        counter += 1;
        stack.push(start);
        on_stack[start] = true;
        let mut frames: Vec<(usize, usize)> = vec![(start, 0)];

        while let Some(&(node, next_edge)) = frames.last() {
            if let Some(&target) = prerequisites[node].get(next_edge) {
                if let Some(top) = frames.last_mut() {
                    top.1 += 1;
                }
                if !in_residual[target] {
                    continue;
                }
                match index[target] {
                    None => {
                        index[target] = Some(counter);
                        low[target] = counter;
                        counter += 1;
                        stack.push(target);
                        on_stack[target] = true;
                        frames.push((target, 0));
                    }
                    Some(target_index) if on_stack[target] => {
                        low[node] = low[node].min(target_index);
                    }
                    Some(_) => {}
                }
            } else {
                frames.pop();
                if let Some(&(parent, _)) = frames.last() {
                    low[parent] = low[parent].min(low[node]);
                }
                if Some(low[node]) == index[node] {
                    let mut component = Vec::new();
                    while let Some(member) = stack.pop() {
                        on_stack[member] = false;
                        component.push(member);
                        if member == node {
                            break;
                        }
                    }
                    if component.len() > 1 {
                        component.sort_unstable();
                        components.push(component);
                    }
                }
            }
        }
    }

    components.sort_by_key(|component| component[0]);
    components
}

/// One anomaly per cycle, listing the residual nodes that depend on it
fn cycle_anomalies(prerequisites: &[Vec<usize>], residual: &[usize], nodes: &[String]) -> Vec<GraphAnomaly> {
    let count = prerequisites.len();
    let mut in_residual = vec![false; count];
    for &node in residual {
        in_residual[node] = true;
    }

    let mut dependents: Vec<Vec<usize>> = vec![Vec::new(); count];
    for (node, prereqs) in prerequisites.iter().enumerate() {
        for &prereq in prereqs {
            dependents[prereq].push(node);
        }
    }

    let components = cycle_components(prerequisites, &in_residual);
    let mut in_cycle = vec![false; count];
    for component in &components {
        for &member in component {
            in_cycle[member] = true;
        }
    }

    components
        .into_iter()
        .map(|members| {
            let mut reached = vec![false; count];
            let mut queue: VecDeque<usize> = members.iter().copied().collect();
            for &member in &members {
                reached[member] = true;
            }
            let mut blocked = Vec::new();
            while let Some(node) = queue.pop_front() {
                for &dependent in &dependents[node] {
                    if !reached[dependent] {
                        reached[dependent] = true;
                        if !in_cycle[dependent] {
                            blocked.push(dependent);
                        }
                        queue.push_back(dependent);
                    }
                }
            }
            blocked.sort_unstable();

            GraphAnomaly::DependencyCycle {
                members: members.into_iter().map(|idx| nodes[idx].clone()).collect(),
                blocked: blocked.into_iter().map(|idx| nodes[idx].clone()).collect(),
            }
        })
        .collect()
}

/// Completion order: levels in order, unlocked before locked within a level
///
/// Cycle members and the nodes they block are not part of the order.
pub fn optimal_order(graph: &DependencyGraph, unlocked: &HashSet<String>) -> Vec<String> {
    let mut order = Vec::with_capacity(graph.nodes.len());
    for level in &graph.levels {
        let (done, remaining): (Vec<&String>, Vec<&String>) =
            level.iter().partition(|name| unlocked.contains(name.as_str()));
        order.extend(done.into_iter().cloned());
        order.extend(remaining.into_iter().cloned());
    }
    order
}

/// Per-achievement dependency status
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DependencyDetail {
    pub name: String,
    pub description: String,
    pub unlocked: bool,
    pub dependencies: Vec<String>,
    pub unmet_dependencies: Vec<String>,
    pub all_dependencies_met: bool,
    pub dependency_level: Option<usize>,
    pub can_unlock_now: bool,
    pub requirements: Vec<Requirement>,
}

/// Dependency analysis of one game's achievement set
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DependencyReport {
    pub total_achievements: usize,
    pub unlocked_count: usize,
    pub total_levels: usize,
    /// Number of achievements per level
    pub level_breakdown: Vec<usize>,
    pub total_dependencies: usize,
    pub achievements_with_dependencies: usize,
    pub optimal_order: Vec<String>,
    /// Locked achievements whose prerequisites are all unlocked
    pub ready_to_unlock: Vec<String>,
    /// Locked achievements with at least one locked prerequisite
    pub blocked: Vec<String>,
    pub details: Vec<DependencyDetail>,
    pub anomalies: Vec<GraphAnomaly>,
}

/// Build the graph and evaluate it against the player's progress
pub fn analyze(achievements: &[Achievement]) -> DependencyReport {
    let graph = build_graph(achievements);
    let unlocked: HashSet<String> = achievements
        .iter()
        .filter(|a| a.unlocked)
        .map(|a| a.name.clone())
        .collect();

    let mut seen = HashSet::new();
    let details: Vec<DependencyDetail> = achievements
        .iter()
        .filter(|a| seen.insert(a.name.as_str()))
        .map(|achievement| {
            let dependencies = graph.prerequisites(&achievement.name).to_vec();
            let unmet_dependencies: Vec<String> = dependencies
                .iter()
                .filter(|dep| !unlocked.contains(dep.as_str()))
                .cloned()
                .collect();
            let all_dependencies_met = unmet_dependencies.is_empty();

            DependencyDetail {
                name: achievement.name.clone(),
                description: achievement.description.clone(),
                unlocked: achievement.unlocked,
                dependency_level: graph.level_of(&achievement.name),
                can_unlock_now: !achievement.unlocked && all_dependencies_met,
                requirements: graph
                    .requirements
                    .get(&achievement.name)
                    .cloned()
                    .unwrap_or_default(),
                dependencies,
                unmet_dependencies,
                all_dependencies_met,
            }
        })
        .collect();

    DependencyReport {
        total_achievements: details.len(),
        unlocked_count: details.iter().filter(|d| d.unlocked).count(),
        total_levels: graph.levels.len(),
        level_breakdown: graph.levels.iter().map(Vec::len).collect(),
        total_dependencies: graph.total_dependencies(),
        achievements_with_dependencies: details.iter().filter(|d| !d.dependencies.is_empty()).count(),
        optimal_order: optimal_order(&graph, &unlocked),
        ready_to_unlock: details
            .iter()
            .filter(|d| d.can_unlock_now)
            .map(|d| d.name.clone())
            .collect(),
        blocked: details
            .iter()
            .filter(|d| !d.unlocked && !d.all_dependencies_met)
            .map(|d| d.name.clone())
            .collect(),
        anomalies: graph.anomalies.clone(),
        details,
    }
}
