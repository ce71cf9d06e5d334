// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Prompt templates
//!
//! Each prompt pins the response grammar its parser expects: a bare integer
//! for scoring, `- ` bullets (optionally `[PAIR n]`-tagged) for insights,
//! and `FAILURE N:` blocks for reflections.

use std::fmt::Write;

use crate::application::insight_extractor::ContrastPair;
use crate::domain::{FailureSignal, Transcript};

pub const SCORE_MARKER: &str = "Rate the usefulness of this session excerpt";
pub const INSIGHT_MARKER: &str = "Compare each pair of session excerpts";
pub const REFLECTION_MARKER: &str = "Analyze the following failures";

/// Cut to at most `max_chars` characters, marking the cut
pub fn truncate_chars(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let mut cut: String = text.chars().take(max_chars).collect();
    cut.push_str(" …");
    cut
}

pub fn score_prompt(chunk_text: &str, max_chars: usize) -> String {
    format!(
        "{SCORE_MARKER} for learning how to work better in future sessions.\n\
         0 = noise or chit-chat, 10 = a decisive, reusable lesson.\n\
         Reply with a single integer from 0 to 10 and nothing else.\n\n\
         EXCERPT:\n{}\n",
        truncate_chars(chunk_text, max_chars)
    )
}

pub fn insight_prompt(pairs: &[ContrastPair], max_chars: usize) -> String {
    let mut prompt = format!(
        "{INSIGHT_MARKER}. In each pair the HIGH excerpt went well and the LOW excerpt went badly.\n\
         For each pair, state what the HIGH session did that the LOW session did not, as short imperative rules.\n\
         Output one rule per line, each starting with \"- \" and tagged with its pair, e.g. \"- [PAIR 1] Run the tests before committing\".\n\
         Output nothing else.\n"
    );
    for (i, pair) in pairs.iter().enumerate() {
        let _ = write!(
            prompt,
            "\nPAIR {n}\nHIGH (session {hs}):\n{high}\nLOW (session {ls}):\n{low}\n",
            n = i + 1,
            hs = pair.high.session_id,
            high = truncate_chars(&pair.high.text, max_chars),
            ls = pair.low.session_id,
            low = truncate_chars(&pair.low.text, max_chars),
        );
    }
    prompt
}

pub fn reflection_prompt(transcript: &Transcript, failures: &[FailureSignal], max_context_chars: usize) -> String {
    let mut prompt = format!(
        "{REFLECTION_MARKER} from session {}.\n\
         For every failure, answer in exactly this format:\n\n\
         FAILURE <n>:\n\
         ROOT_CAUSE: <one sentence>\n\
         REFLECTION: <what should have been done instead>\n\
         PREVENTION_RULE: <one short imperative rule, or leave empty>\n\n\
         Answer every failure in order and output nothing else.\n",
        transcript.session_id
    );
    for (i, failure) in failures.iter().enumerate() {
        let _ = write!(
            prompt,
            "\nFAILURE {n} ({kind}): {desc}\nCONTEXT:\n{ctx}\n",
            n = i + 1,
            kind = failure.failure_type,
            desc = failure.description,
            ctx = truncate_chars(&failure.context, max_context_chars),
        );
    }
    prompt
}
