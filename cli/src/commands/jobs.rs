// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Job queue commands
//!
//! Commands: enqueue, run, list

use anyhow::Result;
use clap::{Subcommand, ValueEnum};
use colored::Colorize;

use aegis_distill::application::JobPayload;
use aegis_distill::domain::{JobStatus, JobType, RuleId};
use aegis_distill::infrastructure::Enqueued;

use crate::embedded::EmbeddedPipeline;
use crate::output::{EventPrinter, Summary};

#[derive(Subcommand)]
pub enum JobsCommand {
    /// Queue a pipeline stage for a later `jobs run`
    Enqueue {
        #[arg(value_enum)]
        job_type: JobKind,

        /// Higher runs first
        #[arg(long, default_value_t = 0)]
        priority: i32,

        /// score: re-score every chunk
        #[arg(long)]
        all: bool,

        /// score: restrict to these sessions
        #[arg(long = "session", value_name = "SESSION_ID")]
        sessions: Vec<String>,

        /// extract-insights, apply, prune: no writes
        #[arg(long)]
        dry_run: bool,

        /// generate-reflections: only this session
        #[arg(long)]
        session_id: Option<String>,

        /// generate-reflections: redo reflected sessions
        #[arg(long)]
        force: bool,

        /// apply: only these proposals
        #[arg(long = "id", value_name = "RULE_ID")]
        ids: Vec<RuleId>,
    },

    /// Drain queued jobs
    Run {
        /// Stop after this many jobs
        #[arg(long, default_value_t = 10)]
        max_jobs: usize,
    },

    /// List jobs
    List {
        #[arg(long, value_enum)]
        status: Option<StatusFilter>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum JobKind {
    Score,
    ExtractInsights,
    GenerateReflections,
    Apply,
    Prune,
}

impl From<JobKind> for JobType {
    fn from(kind: JobKind) -> Self {
        match kind {
            JobKind::Score => JobType::ScorePending,
            JobKind::ExtractInsights => JobType::ExtractInsights,
            JobKind::GenerateReflections => JobType::GenerateReflections,
            JobKind::Apply => JobType::ApplyProposals,
            JobKind::Prune => JobType::PruneStale,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum StatusFilter {
    Queued,
    Running,
    Done,
    Failed,
}

impl From<StatusFilter> for JobStatus {
    fn from(filter: StatusFilter) -> Self {
        match filter {
            StatusFilter::Queued => JobStatus::Queued,
            StatusFilter::Running => JobStatus::Running,
            StatusFilter::Done => JobStatus::Done,
            StatusFilter::Failed => JobStatus::Failed,
        }
    }
}

pub async fn handle_command(command: JobsCommand, pipeline: &EmbeddedPipeline) -> Result<()> {
    match command {
        JobsCommand::Enqueue {
            job_type,
            priority,
            all,
            sessions,
            dry_run,
            session_id,
            force,
            ids,
        } => {
            let payload = JobPayload {
                all,
                session_ids: (!sessions.is_empty()).then_some(sessions),
                dry_run,
                session_id,
                force,
                ids: (!ids.is_empty()).then_some(ids),
            };
            enqueue(pipeline, job_type.into(), priority, payload).await
        }
        JobsCommand::Run { max_jobs } => run(pipeline, max_jobs).await,
        JobsCommand::List { status } => list(pipeline, status.map(JobStatus::from)).await,
    }
}

async fn enqueue(pipeline: &EmbeddedPipeline, job_type: JobType, priority: i32, payload: JobPayload) -> Result<()> {
    match pipeline.jobs().enqueue(job_type, priority, payload.to_value()).await? {
        Enqueued::Created(job) => {
            println!("{}", format!("✓ Queued {} job {}", job.job_type, job.job_id).green())
        }
        Enqueued::Existing(job) => println!(
            "{}",
            format!("An identical {} job is already queued: {}", job.job_type, job.job_id).yellow()
        ),
    }
    Ok(())
}

async fn run(pipeline: &EmbeddedPipeline, max_jobs: usize) -> Result<()> {
    let runner = pipeline.job_runner().await?;
    let printer = EventPrinter::spawn(pipeline.event_bus().subscribe(), false);
    let report = runner.run(max_jobs).await;
    printer.finish().await;
    let report = report?;

    if report.requeued > 0 {
        println!("{}", format!("requeued {} orphaned job(s)", report.requeued).yellow());
    }
    Summary {
        processed: report.claimed,
        applied: report.done,
        skipped: 0,
        failed: report.failed,
    }
    .print(false);
    Ok(())
}

async fn list(pipeline: &EmbeddedPipeline, status: Option<JobStatus>) -> Result<()> {
    let jobs = pipeline.jobs().list(status).await?;
    if jobs.is_empty() {
        println!("{}", "No jobs".dimmed());
        return Ok(());
    }
    for job in &jobs {
        let status = match job.status {
            JobStatus::Queued => job.status.to_string().normal(),
            JobStatus::Running => job.status.to_string().cyan(),
            JobStatus::Done => job.status.to_string().green(),
            JobStatus::Failed => job.status.to_string().red(),
        };
        println!(
            "{} {:<8} {:<22} p={} attempts={} {}",
            job.job_id.to_string().dimmed(),
            status,
            job.job_type.to_string(),
            job.priority,
            job.attempts,
            job.created_at.format("%Y-%m-%d %H:%M:%S")
        );
        if let Some(error) = &job.error {
            println!("    {}", error.red());
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_job_kind_maps_to_job_type() {
        assert_eq!(JobType::from(JobKind::Score), JobType::ScorePending);
        assert_eq!(JobType::from(JobKind::Apply), JobType::ApplyProposals);
        assert_eq!(JobType::from(JobKind::Prune), JobType::PruneStale);
    }
}
