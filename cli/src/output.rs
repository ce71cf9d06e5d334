// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Operator output: live event lines and run summaries

use colored::{ColoredString, Colorize};
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

use aegis_distill::domain::DistillEvent;
use aegis_distill::infrastructure::EventReceiver;

/// Events still buffered after the command finished are drained for this long
const DRAIN_WINDOW: Duration = Duration::from_millis(10);

/// Prints every pipeline event as one line while a command runs
pub struct EventPrinter {
    stop: Option<oneshot::Sender<()>>,
    handle: JoinHandle<usize>,
}

impl EventPrinter {
    pub fn spawn(mut receiver: EventReceiver, quiet: bool) -> Self {
        let (stop, mut stopped) = oneshot::channel::<()>();
        let handle = tokio::spawn(async move {
            let mut printed = 0;
            loop {
                tokio::select! {
                    event = receiver.recv() => match event {
                        Some(event) => {
                            if !quiet {
                                println!("  {}", event_line(&event));
                            }
                            printed += 1;
                        }
                        None => return printed,
                    },
                    _ = &mut stopped => break,
                }
            }
            while let Ok(Some(event)) = tokio::time::timeout(DRAIN_WINDOW, receiver.recv()).await {
                if !quiet {
                    println!("  {}", event_line(&event));
                }
                printed += 1;
            }
            printed
        });
        Self {
            stop: Some(stop),
            handle,
        }
    }

    /// Stop listening and return how many events were seen
    pub async fn finish(mut self) -> usize {
        if let Some(stop) = self.stop.take() {
            let _ = stop.send(());
        }
        (&mut self.handle).await.unwrap_or(0)
    }
}

fn event_line(event: &DistillEvent) -> ColoredString {
    let line = event.describe();
    match event {
        DistillEvent::ChunkScored { .. }
        | DistillEvent::InsightBatchCompleted { .. }
        | DistillEvent::ReflectionStored { .. }
        | DistillEvent::RuleReinforced { .. } => line.normal(),
        DistillEvent::RuleAdded { .. } | DistillEvent::ProposalsApplied { .. } => line.green(),
        DistillEvent::ChunkScoreSkipped { .. }
        | DistillEvent::RuleDuplicateRejected { .. }
        | DistillEvent::RuleStagedForCapacity { .. } => line.yellow(),
        DistillEvent::InsightBatchFailed { .. } | DistillEvent::ReflectionDropped { .. } => line.red(),
        DistillEvent::ProposalRejected { .. }
        | DistillEvent::RulesPruned { .. }
        | DistillEvent::CommitReverted { .. } => line.cyan(),
    }
}

/// Final tally printed by every batch command
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Summary {
    pub processed: usize,
    pub applied: usize,
    pub skipped: usize,
    pub failed: usize,
}

impl Summary {
    pub fn line(&self) -> String {
        format!(
            "processed={} applied={} skipped={} failed={}",
            self.processed, self.applied, self.skipped, self.failed
        )
    }

    pub fn print(&self, dry_run: bool) {
        let prefix = if dry_run { "dry run: " } else { "" };
        let line = format!("{}{}", prefix, self.line());
        if self.failed > 0 {
            println!("{}", line.yellow());
        } else {
            println!("{}", line.green());
        }
    }
}

pub fn print_json<T: serde::Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

pub fn truncate(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let mut cut: String = text.chars().take(max_chars.saturating_sub(3)).collect();
    cut.push_str("...");
    cut
}

#[cfg(test)]
mod tests {
    use super::*;
    use aegis_distill::application::EventBus;
    use aegis_distill::infrastructure::BroadcastEventBus;
    use chrono::Utc;

    #[test]
    fn test_summary_line_format() {
        let summary = Summary {
            processed: 10,
            applied: 2,
            skipped: 1,
            failed: 0,
        };
        assert_eq!(summary.line(), "processed=10 applied=2 skipped=1 failed=0");
    }

    #[test]
    fn test_truncate_respects_char_boundaries() {
        assert_eq!(truncate("short", 10), "short");
        assert_eq!(truncate("ééééééééééé", 6), "ééé...");
    }

    #[tokio::test]
    async fn test_printer_drains_events_published_before_finish() {
        let bus = BroadcastEventBus::new(16);
        let printer = EventPrinter::spawn(bus.subscribe(), true);
        for i in 0..3 {
            bus.publish(DistillEvent::ChunkScored {
                chunk_id: format!("c{}", i),
                score: 5,
                timestamp: Utc::now(),
            })
            .await
            .unwrap();
        }
        assert_eq!(printer.finish().await, 3);
    }
}
