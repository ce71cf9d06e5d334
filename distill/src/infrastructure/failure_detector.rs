// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Line-marker failure detector
//!
//! Scans a transcript for error, panic, failing-test and user-correction
//! markers. Consecutive hits of the same kind within a few lines collapse
//! into one failure.

use once_cell::sync::Lazy;
use regex::Regex;

use crate::application::FailureDetector;
use crate::domain::{FailureSignal, Transcript};

const CONTEXT_LINES: usize = 2;
const MERGE_WINDOW: usize = 3;
const MAX_DESCRIPTION_CHARS: usize = 200;

static MARKERS: Lazy<Vec<(&'static str, Regex)>> = Lazy::new(|| {
    [
        ("panic", r"(?i)\bpanicked at\b|traceback \(most recent call last\)|\bsegmentation fault\b"),
        ("test_failure", r"(?i)\btests?\b.*\bfail(ed|ure|ing)?\b|^\s*FAILED\b|\bassertion\b.*\bfailed\b"),
        (
            "tool_error",
            r"(?i)^\s*(error|fatal)(\[[a-z0-9]+\])?:|\b[A-Z][A-Za-z]+(Error|Exception)\b|\bcommand not found\b|\bexit (code|status) [1-9]",
        ),
        (
            "user_correction",
            r"(?i)^\s*(user|human)\s*:\s*(no\b|that'?s (wrong|not)|undo|revert|stop\b|don'?t)",
        ),
    ]
    .into_iter()
    .map(|(kind, pattern)| (kind, Regex::new(pattern).expect("failure marker regex is valid")))
    .collect()
});

#[derive(Debug, Clone, Default)]
pub struct MarkerFailureDetector;

impl MarkerFailureDetector {
    pub fn new() -> Self {
        Self
    }

    fn classify(line: &str) -> Option<&'static str> {
        MARKERS
            .iter()
            .find(|(_, re)| re.is_match(line))
            .map(|(kind, _)| *kind)
    }
}

impl FailureDetector for MarkerFailureDetector {
    fn detect(&self, transcript: &Transcript) -> Vec<FailureSignal> {
        let lines: Vec<&str> = transcript.content.lines().collect();
        let mut failures = Vec::new();
        let mut last_hit: Option<(&'static str, usize)> = None;

        for (i, line) in lines.iter().enumerate() {
            let Some(kind) = Self::classify(line) else {
                continue;
            };
            if let Some((last_kind, at)) = last_hit {
                if last_kind == kind && i - at <= MERGE_WINDOW {
                    last_hit = Some((kind, i));
                    continue;
                }
            }
            last_hit = Some((kind, i));

            let start = i.saturating_sub(CONTEXT_LINES);
            let end = (i + CONTEXT_LINES + 1).min(lines.len());
            failures.push(FailureSignal {
                failure_type: kind.to_string(),
                description: line.trim().chars().take(MAX_DESCRIPTION_CHARS).collect(),
                context: lines[start..end].join("\n"),
            });
        }

        failures
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn transcript(content: &str) -> Transcript {
        Transcript {
            session_id: "s1".into(),
            date: Utc::now(),
            content: content.into(),
        }
    }

    #[test]
    fn test_detects_distinct_failures() {
        let content = "\
assistant: running the script
ModuleNotFoundError: No module named 'utils'
assistant: fixing import
ok
ok
ok
test result: FAILED. 3 passed; 1 failed
user: no, that's wrong, revert it";
        let failures = MarkerFailureDetector::new().detect(&transcript(content));

        let kinds: Vec<&str> = failures.iter().map(|f| f.failure_type.as_str()).collect();
        assert_eq!(kinds, vec!["tool_error", "test_failure", "user_correction"]);
        assert!(failures[0].context.contains("running the script"));
    }

    #[test]
    fn test_adjacent_hits_of_same_kind_merge() {
        let content = "error: first\nerror: second\nerror: third";
        assert_eq!(MarkerFailureDetector::new().detect(&transcript(content)).len(), 1);
    }

    #[test]
    fn test_clean_transcript_has_no_failures() {
        let content = "user: add a readme\nassistant: done, all checks pass";
        assert!(MarkerFailureDetector::new().detect(&transcript(content)).is_empty());
    }
}
