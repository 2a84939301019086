//! Lifecycle events published on the tour event bus.

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use crate::tour::Step;

const DEFAULT_CAPACITY: usize = 64;

/// Transitions a tour goes through
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "event", content = "data")]
pub enum TourEvent {
    #[serde(rename = "tour.started")]
    Started { steps: usize },

    #[serde(rename = "step.changed")]
    StepChanged { index: usize, step: Step },

    /// A step's targets did not all resolve before the timeout
    #[serde(rename = "step.skipped")]
    StepSkipped { index: usize, missing: Vec<String> },

    #[serde(rename = "tour.finished")]
    Finished,
}

impl TourEvent {
    /// Get the event type string
    pub fn event_type(&self) -> &'static str {
        match self {
            TourEvent::Started { .. } => "tour.started",
            TourEvent::StepChanged { .. } => "step.changed",
            TourEvent::StepSkipped { .. } => "step.skipped",
            TourEvent::Finished => "tour.finished",
        }
    }
}

/// Broadcast side channel for tour events.
///
/// Subscribers that fall behind lose the oldest events; publishing never
/// blocks the sequencer.
#[derive(Clone)]
pub struct EventBus {
    sender: broadcast::Sender<TourEvent>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<TourEvent> {
        self.sender.subscribe()
    }

    pub fn publish(&self, event: TourEvent) {
        let event_type = event.event_type();
        // No subscribers is fine
        if self.sender.send(event).is_err() {
            tracing::trace!(event = event_type, "no event subscribers");
        }
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}
