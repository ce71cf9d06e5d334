// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Pipeline stage commands
//!
//! Commands: score, extract-insights, generate-reflections

use anyhow::Result;
use clap::Args;
use colored::Colorize;

use aegis_distill::application::{
    InsightReport, InsightStatus, ReflectionRunReport, ScoreReport, ScoreRequest, ScoreSelection,
};

use crate::embedded::EmbeddedPipeline;
use crate::output::{EventPrinter, Summary};

#[derive(Args, Debug, Clone, Default)]
pub struct ScoreArgs {
    /// Re-score every chunk, not just pending ones
    #[arg(long, conflicts_with = "pending_only")]
    pub all: bool,

    /// Score pending chunks only (default)
    #[arg(long)]
    pub pending_only: bool,

    /// Restrict to these sessions (repeatable)
    #[arg(long = "session", value_name = "SESSION_ID")]
    pub sessions: Vec<String>,
}

impl ScoreArgs {
    pub fn request(&self) -> ScoreRequest {
        ScoreRequest {
            selection: if self.all { ScoreSelection::All } else { ScoreSelection::Pending },
            session_ids: (!self.sessions.is_empty()).then(|| self.sessions.clone()),
        }
    }
}

#[derive(Args, Debug, Clone, Default)]
pub struct ExtractArgs {
    /// Report candidates without writing rules
    #[arg(long)]
    pub dry_run: bool,
}

#[derive(Args, Debug, Clone, Default)]
pub struct ReflectArgs {
    /// Only this session (default: every session in the transcripts directory)
    #[arg(value_name = "SESSION_ID")]
    pub session_id: Option<String>,

    /// Reflect again on sessions that already have reflections
    #[arg(long)]
    pub force: bool,
}

pub async fn score(pipeline: &EmbeddedPipeline, args: ScoreArgs) -> Result<()> {
    let scorer = pipeline.scorer().await?;
    let printer = EventPrinter::spawn(pipeline.event_bus().subscribe(), false);

    println!("{}", "Scoring chunks...".bold());
    let report = scorer.score_pending(&args.request()).await;
    printer.finish().await;
    let report = report?;

    if report.budget_exhausted {
        println!(
            "{}",
            format!("time budget of {:?} exhausted; remaining chunks stay pending", scorer.time_budget()).yellow()
        );
    }
    score_summary(&report).print(false);
    Ok(())
}

fn score_summary(report: &ScoreReport) -> Summary {
    Summary {
        processed: report.processed(),
        applied: report.scored,
        skipped: report.skipped,
        failed: report.failed,
    }
}

pub async fn extract_insights(pipeline: &EmbeddedPipeline, args: ExtractArgs) -> Result<()> {
    let extractor = pipeline.extractor().await?;
    let printer = EventPrinter::spawn(pipeline.event_bus().subscribe(), false);

    println!("{}", "Mining contrastive pairs...".bold());
    let report = extractor.extract_insights(args.dry_run).await;
    printer.finish().await;
    let report = report?;

    if report.status == InsightStatus::InsufficientData {
        println!("{}", "insufficient data: need both high- and low-scored chunks".yellow());
    } else {
        println!(
            "{} pairs in {} batches, {} candidates ({} duplicates, {} staged for capacity)",
            report.pairs, report.batches, report.candidates_found, report.duplicates, report.staged
        );
    }
    insight_summary(&report).print(report.dry_run);
    Ok(())
}

fn insight_summary(report: &InsightReport) -> Summary {
    Summary {
        processed: report.candidates_found,
        applied: report.applied,
        skipped: report
            .candidates_found
            .saturating_sub(report.applied + report.rule_failures),
        failed: report.failed_batches + report.rule_failures,
    }
}

pub async fn generate_reflections(pipeline: &EmbeddedPipeline, args: ReflectArgs) -> Result<()> {
    let source = pipeline.require_transcripts()?;
    let reflector = pipeline.reflector().await?;
    let printer = EventPrinter::spawn(pipeline.event_bus().subscribe(), false);

    println!("{}", "Generating failure reflections...".bold());
    let report = reflector
        .process_all(source.as_ref(), args.session_id.as_deref(), args.force)
        .await;
    printer.finish().await;
    let report = report?;

    if report.sessions_missing > 0 {
        println!("{}", format!("{} session(s) not found", report.sessions_missing).yellow());
    }
    if report.sessions_failed > 0 {
        println!("{}", format!("{} session(s) failed, see log", report.sessions_failed).yellow());
    }
    if report.sessions_skipped > 0 {
        println!(
            "{} session(s) already reflected on (use --force to redo)",
            report.sessions_skipped
        );
    }
    println!(
        "{} failures in {} session(s), {} reflections stored",
        report.failures_detected, report.sessions_processed, report.reflections_stored
    );
    reflection_summary(&report).print(false);
    Ok(())
}

fn reflection_summary(report: &ReflectionRunReport) -> Summary {
    Summary {
        processed: report.failures_detected,
        applied: report.rules_applied,
        skipped: report.sessions_skipped,
        failed: report.dropped + report.rules_failed + report.sessions_failed,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_score_args_build_request() {
        let args = ScoreArgs {
            all: true,
            sessions: vec!["s1".into()],
            ..Default::default()
        };
        let request = args.request();
        assert_eq!(request.selection, ScoreSelection::All);
        assert_eq!(request.session_ids, Some(vec!["s1".to_string()]));

        let request = ScoreArgs::default().request();
        assert_eq!(request.selection, ScoreSelection::Pending);
        assert!(request.session_ids.is_none());
    }

    #[test]
    fn test_insight_summary_counts_rejected_candidates_as_skipped() {
        let report = InsightReport {
            candidates_found: 5,
            applied: 3,
            failed_batches: 1,
            ..Default::default()
        };
        assert_eq!(insight_summary(&report).line(), "processed=5 applied=3 skipped=2 failed=1");
    }

    #[test]
    fn test_unpersisted_candidates_count_as_failed() {
        let report = InsightReport {
            candidates_found: 5,
            applied: 2,
            rule_failures: 2,
            ..Default::default()
        };
        assert_eq!(insight_summary(&report).line(), "processed=5 applied=2 skipped=1 failed=2");

        let report = ReflectionRunReport {
            failures_detected: 4,
            rules_applied: 1,
            dropped: 1,
            rules_failed: 1,
            sessions_failed: 1,
            ..Default::default()
        };
        assert_eq!(reflection_summary(&report).line(), "processed=4 applied=1 skipped=0 failed=3");
    }
}
