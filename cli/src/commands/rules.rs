// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Rule lifecycle commands
//!
//! Commands: review, apply, prune, stats, add-rule, reject, reinforce,
//! revert, history

use anyhow::{Context, Result};
use chrono::Utc;
use clap::Args;
use colored::Colorize;

use aegis_distill::application::{AddRuleReason, RejectOutcome, RevertOutcome};
use aegis_distill::domain::config::OperatingMode;
use aegis_distill::domain::{CommitId, OriginType, Rule, RuleCandidate, RuleId};

use crate::embedded::EmbeddedPipeline;
use crate::output::{print_json, truncate, EventPrinter, Summary};

const TEXT_WIDTH: usize = 72;

#[derive(Args, Debug, Clone, Default)]
pub struct OutputArgs {
    /// Print the report as JSON
    #[arg(long)]
    pub json: bool,
}

#[derive(Args, Debug, Clone, Default)]
pub struct ApplyArgs {
    /// Show what would be applied without writing
    #[arg(long)]
    pub dry_run: bool,

    /// Apply only these proposals (required in manual mode)
    #[arg(long = "id", value_name = "RULE_ID")]
    pub ids: Vec<RuleId>,
}

#[derive(Args, Debug, Clone, Default)]
pub struct PruneArgs {
    /// Show what would be pruned without writing
    #[arg(long)]
    pub dry_run: bool,
}

#[derive(Args, Debug, Clone)]
pub struct AddRuleArgs {
    /// Rule text
    pub text: String,

    /// Session the rule was learned from (repeatable)
    #[arg(long = "session", value_name = "SESSION_ID")]
    pub sessions: Vec<String>,

    /// Check dedup and capacity without writing
    #[arg(long)]
    pub dry_run: bool,
}

#[derive(Args, Debug, Clone)]
pub struct ReinforceArgs {
    pub rule_id: RuleId,

    /// Where the usage signal came from
    #[arg(long, default_value = "manual")]
    pub signal: String,
}

#[derive(Args, Debug, Clone)]
pub struct HistoryArgs {
    /// Newest commits to show
    #[arg(short = 'n', long, default_value_t = 20)]
    pub limit: usize,

    #[command(flatten)]
    pub output: OutputArgs,
}

pub async fn review(pipeline: &EmbeddedPipeline, output: OutputArgs) -> Result<()> {
    let report = pipeline.rules().review(Utc::now()).await?;
    if output.json {
        return print_json(&report);
    }

    let counts = report.counts;
    println!("{}", "Rule store:".bold());
    println!("  Mode: {}", pipeline.config().mode);
    println!("  Active: {}/{}", counts.active, report.capacity);
    println!("  Proposed: {}", counts.proposed);
    println!("  Pruned: {}", counts.pruned);
    println!();

    println!("{}", "Pending proposals (oldest first):".bold());
    if report.proposals.is_empty() {
        println!("  {}", "(none)".dimmed());
    }
    for rule in &report.proposals {
        print_rule(rule);
    }
    println!();

    println!("{}", "Stale prune candidates:".bold());
    if report.stale_candidates.is_empty() {
        println!("  {}", "(none)".dimmed());
    }
    let now = Utc::now();
    for rule in &report.stale_candidates {
        println!(
            "  {} {} ({}d since reinforced, count {})",
            rule.id.to_string().dimmed(),
            truncate(&rule.text, TEXT_WIDTH),
            rule.days_since_reinforced(now),
            rule.reinforcement_count
        );
    }
    Ok(())
}

fn print_rule(rule: &Rule) {
    let categories = if rule.categories.is_empty() {
        String::new()
    } else {
        format!(" [{}]", rule.categories.join(", "))
    };
    println!(
        "  {} {}{}",
        rule.id.to_string().dimmed(),
        truncate(&rule.text, TEXT_WIDTH),
        categories.cyan()
    );
}

pub async fn apply(pipeline: &EmbeddedPipeline, args: ApplyArgs) -> Result<()> {
    let printer = EventPrinter::spawn(pipeline.event_bus().subscribe(), false);
    let selection = (!args.ids.is_empty()).then_some(args.ids.as_slice());
    let report = pipeline.rules().apply_pending_proposals(selection, args.dry_run).await;
    printer.finish().await;
    let report = report?;

    if report.selection_required {
        println!(
            "{}",
            format!("{} mode: select proposals with --id", OperatingMode::Manual).yellow()
        );
    }
    for id in &report.unknown {
        println!("  {} {}", "not a pending proposal:".yellow(), id);
    }
    if !report.deferred.is_empty() {
        println!(
            "{}",
            format!("{} proposal(s) deferred: no active slot left", report.deferred.len()).yellow()
        );
    }
    if let Some(commit_id) = report.commit_id {
        println!("  commit {}", commit_id.to_string().dimmed());
    }

    Summary {
        processed: report.applied.len() + report.deferred.len() + report.unknown.len(),
        applied: report.applied.len(),
        skipped: report.deferred.len() + report.unknown.len(),
        failed: 0,
    }
    .print(report.dry_run);
    Ok(())
}

pub async fn prune(pipeline: &EmbeddedPipeline, args: PruneArgs) -> Result<()> {
    let rules = pipeline.rules();
    let printer = EventPrinter::spawn(pipeline.event_bus().subscribe(), false);
    let report = rules.prune_with_policy(Utc::now(), args.dry_run).await;
    printer.finish().await;
    let report = report?;

    let verb = if report.dry_run { "would prune" } else { "pruned" };
    for id in &report.pruned {
        println!("  {} {}", verb, id);
    }
    println!(
        "window: {} days, minimum reinforcements: {}",
        rules.config().staleness_days,
        rules.config().min_reinforcement
    );
    Summary {
        processed: report.pruned.len(),
        applied: report.pruned.len(),
        ..Default::default()
    }
    .print(report.dry_run);
    Ok(())
}

pub async fn stats(pipeline: &EmbeddedPipeline, output: OutputArgs) -> Result<()> {
    let stats = pipeline.tracker().stats().await?;
    if output.json {
        return print_json(&stats);
    }

    println!("{}", "Reinforcement by category:".bold());
    for (category, usage) in &stats.by_category {
        println!(
            "  {:<16} rules={} active={} reinforcements={}",
            category, usage.rules, usage.active, usage.reinforcements
        );
    }
    println!();

    println!("{}", "Rules (most reinforced first):".bold());
    for usage in &stats.rules {
        println!(
            "  {:>4}  {:<8} {} ({}d)",
            usage.reinforcement_count,
            usage.status.to_string(),
            truncate(&usage.text, TEXT_WIDTH),
            usage.days_since_reinforced
        );
    }
    println!();

    let counts = stats.by_status;
    println!(
        "active={} proposed={} pruned={} total_reinforcements={}",
        counts.active, counts.proposed, counts.pruned, stats.total_reinforcements
    );
    Ok(())
}

pub async fn add_rule(pipeline: &EmbeddedPipeline, args: AddRuleArgs) -> Result<()> {
    let candidate = RuleCandidate::new(args.text, OriginType::Manual, args.sessions);
    let outcome = pipeline.rules().add_rule(candidate, args.dry_run).await?;

    let line = match (outcome.reason, outcome.rule_id, outcome.duplicate_of) {
        (AddRuleReason::Duplicate, _, Some(existing)) => format!("duplicate of {}", existing).yellow(),
        (AddRuleReason::Empty, _, _) => "rule text is empty".yellow(),
        (AddRuleReason::Capacity, Some(id), _) => format!("{} staged as proposed (no active slot)", id).yellow(),
        (AddRuleReason::DryRun, _, _) => "dry run: rule would be accepted".normal(),
        (reason, Some(id), _) => format!("{} {}", reason, id).green(),
        (reason, None, _) => reason.to_string().normal(),
    };
    println!("{}", line);
    Ok(())
}

pub async fn reject(pipeline: &EmbeddedPipeline, rule_id: RuleId) -> Result<()> {
    match pipeline.rules().reject_proposal(rule_id).await? {
        RejectOutcome::Rejected(commit_id) => {
            println!("{}", format!("✓ Rejected {} (commit {})", rule_id, commit_id).green())
        }
        RejectOutcome::NotFound => anyhow::bail!("Rule {} not found", rule_id),
        RejectOutcome::NotProposed(status) => {
            anyhow::bail!("Rule {} is {}, only proposed rules can be rejected", rule_id, status)
        }
    }
    Ok(())
}

pub async fn reinforce(pipeline: &EmbeddedPipeline, args: ReinforceArgs) -> Result<()> {
    if pipeline.tracker().record(args.rule_id, &args.signal).await? {
        println!("{}", format!("✓ Reinforced {}", args.rule_id).green());
    } else {
        println!("{}", format!("{} is not an active rule; nothing recorded", args.rule_id).yellow());
    }
    Ok(())
}

pub async fn revert(pipeline: &EmbeddedPipeline, commit: String) -> Result<()> {
    let commit_id: CommitId = commit
        .parse()
        .with_context(|| format!("Invalid commit id '{}'", commit))?;

    match pipeline.rules().revert(commit_id).await? {
        RevertOutcome::Reverted(new_commit) => {
            println!("{}", format!("✓ Reverted {} as {}", commit_id, new_commit).green());
            Ok(())
        }
        RevertOutcome::Conflict(rule_ids) => {
            for id in &rule_ids {
                println!("  changed since: {}", id);
            }
            anyhow::bail!("Commit {} conflicts with later changes to {} rule(s)", commit_id, rule_ids.len())
        }
        RevertOutcome::Rejected(reason) => anyhow::bail!("Revert of {} rejected: {}", commit_id, reason),
    }
}

pub async fn history(pipeline: &EmbeddedPipeline, args: HistoryArgs) -> Result<()> {
    let commits = pipeline.rules().history(args.limit).await?;
    if args.output.json {
        return print_json(&commits);
    }
    if commits.is_empty() {
        println!("{}", "No commits yet".dimmed());
    }
    for commit in &commits {
        println!(
            "{} v{:<4} {} {} ({} change(s))",
            commit.id.to_string().yellow(),
            commit.version,
            commit.timestamp.format("%Y-%m-%d %H:%M:%S"),
            commit.message,
            commit.changes.len()
        );
    }
    Ok(())
}
