// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

// Event Bus Implementation - Pub/Sub for Domain Events
//
// In-memory event streaming using tokio broadcast channels. The CLI
// subscribes to print one line per scored chunk, mined batch and rule
// transition. Events published with no subscriber are dropped.

use anyhow::Result;
use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{debug, warn};

use crate::application::EventBus;
use crate::domain::DistillEvent;

#[derive(Clone)]
pub struct BroadcastEventBus {
    sender: Arc<broadcast::Sender<DistillEvent>>,
}

impl BroadcastEventBus {
    /// Capacity determines how many events can be buffered before slow
    /// receivers start lagging
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self {
            sender: Arc::new(sender),
        }
    }

    pub fn with_default_capacity() -> Self {
        Self::new(1000)
    }

    pub fn subscribe(&self) -> EventReceiver {
        EventReceiver {
            receiver: self.sender.subscribe(),
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for BroadcastEventBus {
    fn default() -> Self {
        Self::with_default_capacity()
    }
}

#[async_trait]
impl EventBus for BroadcastEventBus {
    async fn publish(&self, event: DistillEvent) -> Result<()> {
        debug!(event_type = event.event_type(), "Publishing event");
        if self.sender.send(event).is_err() {
            debug!("No subscribers listening to event");
        }
        Ok(())
    }
}

pub struct EventReceiver {
    receiver: broadcast::Receiver<DistillEvent>,
}

impl EventReceiver {
    /// Next event; `None` once every sender is gone. Lagged receivers skip
    /// the dropped events and keep going.
    pub async fn recv(&mut self) -> Option<DistillEvent> {
        loop {
            match self.receiver.recv().await {
                Ok(event) => return Some(event),
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    warn!("Event receiver lagged by {} events", n);
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    #[tokio::test]
    async fn test_subscriber_receives_published_events() {
        let bus = BroadcastEventBus::with_default_capacity();
        let mut receiver = bus.subscribe();

        bus.publish(DistillEvent::ChunkScored {
            chunk_id: "c1".into(),
            score: 9,
            timestamp: Utc::now(),
        })
        .await
        .unwrap();

        let event = receiver.recv().await.unwrap();
        assert_eq!(event.event_type(), "chunk_scored");
    }

    #[tokio::test]
    async fn test_publish_without_subscribers_is_ok() {
        let bus = BroadcastEventBus::new(4);
        assert_eq!(bus.subscriber_count(), 0);
        bus.publish(DistillEvent::InsightBatchFailed {
            batch_index: 0,
            reason: "timeout".into(),
            timestamp: Utc::now(),
        })
        .await
        .unwrap();
    }

    #[tokio::test]
    async fn test_receiver_ends_when_bus_dropped() {
        let bus = BroadcastEventBus::new(4);
        let mut receiver = bus.subscribe();
        drop(bus);
        assert!(receiver.recv().await.is_none());
    }
}
