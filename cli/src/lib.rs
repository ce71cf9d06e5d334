// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! AEGIS Distill CLI library - exposes testable components
//!
//! # Architecture
//!
//! - **Layer:** Interface / Presentation Layer
//! - **Purpose:** Command handlers and the in-process pipeline wiring

pub mod commands;
pub mod embedded;
pub mod output;
