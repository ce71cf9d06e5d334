// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Rule aggregate
//!
//! A rule is a short guidance statement. Lifecycle:
//! `proposed → active → pruned`, with `proposed → pruned` on rejection.
//! Pruned rules are kept for audit and never count towards capacity.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Hard cap on simultaneously active rules
pub const MAX_ACTIVE_RULES: usize = 30;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RuleId(pub Uuid);

impl RuleId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for RuleId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for RuleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl FromStr for RuleId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s).map(Self)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RuleStatus {
    Proposed,
    Active,
    Pruned,
}

impl RuleStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RuleStatus::Proposed => "proposed",
            RuleStatus::Active => "active",
            RuleStatus::Pruned => "pruned",
        }
    }
}

impl fmt::Display for RuleStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum OriginType {
    InsightExtraction,
    Reflection,
    Manual,
}

impl OriginType {
    pub fn as_str(&self) -> &'static str {
        match self {
            OriginType::InsightExtraction => "insight-extraction",
            OriginType::Reflection => "reflection",
            OriginType::Manual => "manual",
        }
    }
}

impl fmt::Display for OriginType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Ephemeral candidate produced by one extraction run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuleCandidate {
    pub text: String,
    pub source_session_ids: Vec<String>,
    pub origin_type: OriginType,
    pub discovered_at: DateTime<Utc>,
}

impl RuleCandidate {
    pub fn new(text: impl Into<String>, origin_type: OriginType, source_session_ids: Vec<String>) -> Self {
        Self {
            text: text.into(),
            source_session_ids,
            origin_type,
            discovered_at: Utc::now(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Rule {
    pub id: RuleId,
    pub text: String,
    pub status: RuleStatus,
    #[serde(default)]
    pub categories: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub last_reinforced_at: DateTime<Utc>,
    #[serde(default)]
    pub reinforcement_count: u64,
    pub origin_type: OriginType,
    #[serde(default)]
    pub source_session_ids: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pruned_at: Option<DateTime<Utc>>,
}

impl Rule {
    pub fn from_candidate(candidate: &RuleCandidate, status: RuleStatus, now: DateTime<Utc>) -> Self {
        let text = candidate.text.trim().to_string();
        Self {
            id: RuleId::new(),
            categories: categorize(&text),
            text,
            status,
            created_at: now,
            last_reinforced_at: now,
            reinforcement_count: 0,
            origin_type: candidate.origin_type,
            source_session_ids: candidate.source_session_ids.clone(),
            pruned_at: None,
        }
    }

    pub fn normalized_text(&self) -> String {
        normalize_text(&self.text)
    }

    /// Active or proposed: participates in dedup
    pub fn is_live(&self) -> bool {
        self.status != RuleStatus::Pruned
    }

    pub fn days_since_reinforced(&self, now: DateTime<Utc>) -> i64 {
        (now - self.last_reinforced_at).num_days()
    }

    /// Stale when unreinforced for strictly longer than `staleness_days`
    /// and reinforced fewer than `min_reinforcement` times.
    pub fn is_stale(&self, now: DateTime<Utc>, staleness_days: i64, min_reinforcement: u64) -> bool {
        self.status == RuleStatus::Active
            && now - self.last_reinforced_at > Duration::days(staleness_days)
            && self.reinforcement_count < min_reinforcement
    }

    pub fn reinforce(&mut self, now: DateTime<Utc>) {
        self.reinforcement_count += 1;
        if now > self.last_reinforced_at {
            self.last_reinforced_at = now;
        }
    }

    pub fn prune(&mut self, now: DateTime<Utc>) {
        self.status = RuleStatus::Pruned;
        self.pruned_at = Some(now);
    }
}

/// Comparison form: trimmed, case-folded, internal whitespace collapsed.
pub fn normalize_text(text: &str) -> String {
    text.split_whitespace()
        .map(str::to_lowercase)
        .collect::<Vec<_>>()
        .join(" ")
}

fn tokens(text: &str) -> HashSet<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(str::to_lowercase)
        .collect()
}

/// Jaccard overlap of alphanumeric tokens, in `0.0..=1.0`
pub fn token_similarity(a: &str, b: &str) -> f64 {
    let ta = tokens(a);
    let tb = tokens(b);
    if ta.is_empty() || tb.is_empty() {
        return 0.0;
    }
    let intersection = ta.intersection(&tb).count() as f64;
    let union = ta.union(&tb).count() as f64;
    intersection / union
}

const CATEGORY_KEYWORDS: &[(&str, &[&str])] = &[
    ("testing", &["test", "tests", "testing", "assert", "coverage", "fixture"]),
    ("version-control", &["git", "commit", "commits", "branch", "rebase", "merge", "diff"]),
    ("dependencies", &["dependency", "dependencies", "import", "imports", "package", "crate", "version"]),
    ("error-handling", &["error", "errors", "exception", "panic", "unwrap", "retry", "fail", "failure"]),
    ("files", &["file", "files", "path", "paths", "directory", "read", "write"]),
    ("communication", &["ask", "confirm", "user", "clarify", "explain", "summarize"]),
    ("tooling", &["command", "cli", "shell", "build", "compile", "lint", "format"]),
];

/// Keyword categories for operator stats; `general` when nothing matches.
pub fn categorize(text: &str) -> Vec<String> {
    let words = tokens(text);
    let mut categories: Vec<String> = CATEGORY_KEYWORDS
        .iter()
        .filter(|(_, keywords)| keywords.iter().any(|k| words.contains(*k)))
        .map(|(name, _)| name.to_string())
        .collect();
    if categories.is_empty() {
        categories.push("general".to_string());
    }
    categories
}
