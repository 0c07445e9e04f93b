//! Analysis progress notifications.
//!
//! One-way broadcast for presentation: observers cannot influence the
//! analysis and a missing observer changes nothing.

use serde::Serialize;
use std::sync::Mutex;

use crate::ai::provider::ProviderKind;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ProgressPhase {
    Preparing,
    Contacting,
    Processing,
    Done,
    Error,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProgressEvent {
    pub phase: ProgressPhase,
    pub provider: ProviderKind,
    pub message: String,
}

pub trait ProgressObserver: Send + Sync {
    fn on_progress(&self, event: &ProgressEvent);
}

/// Observer that ignores everything.
pub struct NoProgress;

impl ProgressObserver for NoProgress {
    fn on_progress(&self, _event: &ProgressEvent) {}
}

/// Records every event; handy for tests and for replaying a run.
#[derive(Default)]
pub struct ProgressLog {
    events: Mutex<Vec<ProgressEvent>>,
}

impl ProgressLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn phases(&self) -> Vec<ProgressPhase> {
        self.events
            .lock()
            .map(|events| events.iter().map(|e| e.phase).collect())
            .unwrap_or_default()
    }
}

impl ProgressObserver for ProgressLog {
    fn on_progress(&self, event: &ProgressEvent) {
        if let Ok(mut events) = self.events.lock() {
            events.push(event.clone());
        }
    }
}
