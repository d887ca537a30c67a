//! ==============================================================================
//! events.rs - hub event bus
//! ==============================================================================
//!
//! typed broadcast channel for things that happen around the registry but
//! are not readings themselves: a sensor showing up for the first time, or
//! a reading crossing an alert threshold. nobody listening is fine.
//!
//! ==============================================================================

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::broadcast;

use crate::alerts::Alert;

const CHANNEL_CAPACITY: usize = 100;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum HubEvent {
    SensorConnected {
        sensor_id: String,
        timestamp: DateTime<Utc>,
    },
    Alert(Alert),
}

#[derive(Debug, Clone)]
pub struct EventBus {
    sender: broadcast::Sender<HubEvent>,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl EventBus {
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(CHANNEL_CAPACITY);
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<HubEvent> {
        self.sender.subscribe()
    }

    /// returns how many listeners received the event
    pub fn publish(&self, event: HubEvent) -> usize {
        self.sender.send(event).unwrap_or(0)
    }
}
