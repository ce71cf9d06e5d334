// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Configuration management commands
//!
//! Commands: show, validate

use anyhow::{Context, Result};
use clap::Subcommand;
use colored::Colorize;
use std::path::PathBuf;

use aegis_distill::domain::config::{DistillConfigManifest, CONFIG_ENV_VAR};

#[derive(Subcommand)]
pub enum ConfigCommand {
    /// Show the effective configuration
    Show {
        /// Show config file paths checked
        #[arg(long)]
        paths: bool,

        /// Print the full manifest as YAML
        #[arg(long)]
        yaml: bool,
    },

    /// Validate configuration file
    Validate {
        /// Path to config file (default: discover)
        #[arg(value_name = "FILE")]
        file: Option<PathBuf>,
    },
}

pub async fn handle_command(command: ConfigCommand, config_override: Option<PathBuf>) -> Result<()> {
    match command {
        ConfigCommand::Show { paths, yaml } => show(config_override, paths, yaml).await,
        ConfigCommand::Validate { file } => validate(file.or(config_override)).await,
    }
}

async fn show(config_override: Option<PathBuf>, show_paths: bool, as_yaml: bool) -> Result<()> {
    let manifest =
        DistillConfigManifest::load_or_default(config_override.clone()).context("Failed to load configuration")?;

    if show_paths {
        println!("{}", "Configuration discovery paths:".bold());
        if let Some(path) = &config_override {
            println!("  1. --config flag: {}", path.display());
        } else {
            println!("  1. --config flag: {}", "(not set)".dimmed());
        }
        println!(
            "  2. {}: {}",
            CONFIG_ENV_VAR,
            std::env::var(CONFIG_ENV_VAR)
                .unwrap_or_else(|_| "(not set)".to_string())
                .dimmed()
        );
        println!("  3. ./distill-config.yaml");
        println!("  4. ~/.aegis/distill.yaml");
        println!("  5. /etc/aegis/distill.yaml");
        println!();
    }

    if as_yaml {
        print!("{}", manifest.to_yaml_string()?);
        return Ok(());
    }

    let spec = &manifest.spec;
    println!("{}", "Current configuration:".bold());
    println!("  Name: {}", manifest.metadata.name);
    println!("  Mode: {}", spec.mode);
    println!("  State dir: {}", spec.state_dir.display());
    match &spec.transcripts_dir {
        Some(dir) => println!("  Transcripts: {}", dir.display()),
        None => println!("  Transcripts: {}", "(not set)".dimmed()),
    }
    println!();

    println!("{}", "Services:".bold());
    println!(
        "  Vector store: {:?} {} (chunks: {}, reflections: {})",
        spec.vector_store.backend,
        spec.vector_store.url,
        spec.vector_store.chunks_collection,
        spec.vector_store.reflections_collection
    );
    println!(
        "  Generation: {:?} {} → {}",
        spec.generation.provider, spec.generation.endpoint, spec.generation.model
    );
    println!(
        "  Embedding: {:?} {} → {} ({} dims)",
        spec.embedding.provider, spec.embedding.endpoint, spec.embedding.model, spec.embedding.dimension
    );
    println!();

    println!("{}", "Rules:".bold());
    println!("  Max active: {}", spec.rules.max_active);
    println!(
        "  Staleness: {} days, min {} reinforcement(s)",
        spec.rules.staleness_days, spec.rules.min_reinforcement
    );
    println!(
        "  Insight thresholds: high ≥ {}, low ≤ {}",
        spec.insights.high_threshold, spec.insights.low_threshold
    );

    Ok(())
}

async fn validate(config_path: Option<PathBuf>) -> Result<()> {
    println!("Validating configuration...");

    let manifest = DistillConfigManifest::load_or_default(config_path).context("Failed to load configuration")?;

    manifest.validate().context("Configuration validation failed")?;

    println!("{}", "✓ Configuration is valid".green());

    Ok(())
}
