// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

use anyhow::Result;
use async_trait::async_trait;

use crate::domain::DistillEvent;

/// Event bus trait for publishing domain events
#[async_trait]
pub trait EventBus: Send + Sync {
    async fn publish(&self, event: DistillEvent) -> Result<()>;
}
