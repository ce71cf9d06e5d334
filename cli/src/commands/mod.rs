// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Command implementations for the distillation CLI

pub mod config;
pub mod jobs;
pub mod pipeline;
pub mod rules;

pub use self::config::ConfigCommand;
pub use self::jobs::JobsCommand;
