// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! # AEGIS Distill CLI
//!
//! The `aegis-distill` binary runs one pipeline stage per invocation against
//! the configured vector store, generation service and rule store.
//!
//! ## Commands
//!
//! - `aegis-distill score|extract-insights|generate-reflections` - Pipeline stages
//! - `aegis-distill review|apply|prune|stats` - Rule lifecycle
//! - `aegis-distill add-rule|reject|reinforce|revert|history` - Manual rule operations
//! - `aegis-distill jobs enqueue|run|list` - Job queue
//! - `aegis-distill config show|validate` - Configuration management
//!
//! Exit status is non-zero only when configuration is invalid or a required
//! service is unreachable at start; item-level failures are reported and skipped.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use colored::Colorize;
use std::path::PathBuf;

use aegis_distill::domain::RuleId;
use aegis_distill_cli::commands::pipeline::{ExtractArgs, ReflectArgs, ScoreArgs};
use aegis_distill_cli::commands::rules::{
    AddRuleArgs, ApplyArgs, HistoryArgs, OutputArgs, PruneArgs, ReinforceArgs,
};
use aegis_distill_cli::commands::{self, ConfigCommand, JobsCommand};
use aegis_distill_cli::embedded::EmbeddedPipeline;

/// AEGIS Distill - learn agent rules from session history
#[derive(Parser)]
#[command(name = "aegis-distill")]
#[command(version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Path to configuration file (overrides discovery)
    #[arg(short, long, global = true, env = "AEGIS_DISTILL_CONFIG", value_name = "FILE")]
    config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, global = true, env = "AEGIS_DISTILL_LOG_LEVEL", default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Rate pending session chunks 0-10
    Score(ScoreArgs),

    /// Mine rules from high/low scored chunk pairs
    #[command(name = "extract-insights")]
    ExtractInsights(ExtractArgs),

    /// Reflect on failures in session transcripts
    #[command(name = "generate-reflections")]
    GenerateReflections(ReflectArgs),

    /// Show rule counts, pending proposals and stale candidates
    Review(OutputArgs),

    /// Activate pending proposals
    Apply(ApplyArgs),

    /// Prune stale active rules
    Prune(PruneArgs),

    /// Reinforcement statistics
    Stats(OutputArgs),

    /// Add a rule by hand
    #[command(name = "add-rule")]
    AddRule(AddRuleArgs),

    /// Reject a pending proposal
    Reject {
        rule_id: RuleId,
    },

    /// Record a usage signal for an active rule
    Reinforce(ReinforceArgs),

    /// Undo one rule store commit
    Revert {
        #[arg(value_name = "COMMIT_ID")]
        commit: String,
    },

    /// Rule store commit log
    History(HistoryArgs),

    /// Job queue
    Jobs {
        #[command(subcommand)]
        command: JobsCommand,
    },

    /// Configuration management
    Config {
        #[command(subcommand)]
        command: ConfigCommand,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    init_logging(&cli.log_level)?;

    let Some(command) = cli.command else {
        eprintln!("{}", "No command specified. Use --help for usage.".yellow());
        std::process::exit(1);
    };

    let config_path = cli.config;
    let pipeline = || EmbeddedPipeline::load(config_path.clone());
    match command {
        Commands::Config { command } => commands::config::handle_command(command, config_path.clone()).await,
        Commands::Score(args) => commands::pipeline::score(&pipeline()?, args).await,
        Commands::ExtractInsights(args) => commands::pipeline::extract_insights(&pipeline()?, args).await,
        Commands::GenerateReflections(args) => commands::pipeline::generate_reflections(&pipeline()?, args).await,
        Commands::Review(output) => commands::rules::review(&pipeline()?, output).await,
        Commands::Apply(args) => commands::rules::apply(&pipeline()?, args).await,
        Commands::Prune(args) => commands::rules::prune(&pipeline()?, args).await,
        Commands::Stats(output) => commands::rules::stats(&pipeline()?, output).await,
        Commands::AddRule(args) => commands::rules::add_rule(&pipeline()?, args).await,
        Commands::Reject { rule_id } => commands::rules::reject(&pipeline()?, rule_id).await,
        Commands::Reinforce(args) => commands::rules::reinforce(&pipeline()?, args).await,
        Commands::Revert { commit } => commands::rules::revert(&pipeline()?, commit).await,
        Commands::History(args) => commands::rules::history(&pipeline()?, args).await,
        Commands::Jobs { command } => commands::jobs::handle_command(command, &pipeline()?).await,
    }
}

/// Initialize tracing subscriber for logging
///
/// Logs go to stderr so command output on stdout stays pipeable.
fn init_logging(level: &str) -> Result<()> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .or_else(|_| tracing_subscriber::EnvFilter::try_new(level))
        .context("Failed to create log filter")?;

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .compact()
        .init();

    Ok(())
}
