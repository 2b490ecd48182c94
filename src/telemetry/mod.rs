//! Engine telemetry.
//!
//! # PRIVACY INVARIANT
//! Events carry ids and counts only (fact ids, conversation ids, turn numbers,
//! capability names). User text and fact text never enter the recorder.
//!
//! Telemetry is a side-effect layer: nothing in the engine reads it back to
//! make a decision.

pub mod event;
pub mod metrics;
pub mod recorder;

pub use event::*;
pub use metrics::TelemetrySnapshot;
pub use recorder::TelemetryRecorder;

use std::sync::{Arc, Mutex};

/// Cloneable handle shared by the store path and every conversation.
#[derive(Debug, Clone, Default)]
pub struct Telemetry {
    inner: Arc<Mutex<TelemetryRecorder>>,
}

impl Telemetry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, event: TelemetryEvent) {
        let mut recorder = self.inner.lock().unwrap_or_else(|p| p.into_inner());
        recorder.record(event);
    }

    pub fn snapshot(&self) -> TelemetrySnapshot {
        let recorder = self.inner.lock().unwrap_or_else(|p| p.into_inner());
        recorder.snapshot()
    }
}
