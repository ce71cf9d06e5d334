// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

// LLM Provider Infrastructure - Anti-Corruption Layer Implementations
//
// Each adapter translates between the domain's LLMProvider contract and an
// external API, and enforces the per-call deadline in GenerationOptions.

pub mod factory;
pub mod ollama;
pub mod openai;

pub use factory::{build_provider, generation_options};
pub use ollama::OllamaAdapter;
pub use openai::OpenAIAdapter;
