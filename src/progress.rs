//! Best-effort progress broadcast for export jobs.

use log::debug;
use serde::Serialize;
use tokio::sync::broadcast;

/// Fire-and-forget progress message: `{ "type": "progress", "percent", "message" }`
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProgressEvent {
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub percent: u8,
    pub message: String,
}

impl ProgressEvent {
    pub fn new(percent: u8, message: impl Into<String>) -> Self {
        Self {
            kind: "progress",
            percent,
            message: message.into(),
        }
    }
}

/// Per-job progress writer.
///
/// Percentages never decrease within a job: a lower value than the last one
/// reported is raised to it. Delivery is not guaranteed; with no subscriber
/// the event is dropped.
#[derive(Debug)]
pub struct ProgressReporter {
    tx: Option<broadcast::Sender<ProgressEvent>>,
    last: u8,
    history: Vec<u8>,
}

impl ProgressReporter {
    pub fn new(tx: broadcast::Sender<ProgressEvent>) -> Self {
        Self {
            tx: Some(tx),
            last: 0,
            history: Vec::new(),
        }
    }

    /// A reporter that only records, with nobody listening
    pub fn detached() -> Self {
        Self {
            tx: None,
            last: 0,
            history: Vec::new(),
        }
    }

    pub fn report(&mut self, percent: f64, message: impl Into<String>) {
        let clamped = percent.clamp(0.0, 100.0).floor() as u8;
        let percent = clamped.max(self.last);
        self.last = percent;
        self.history.push(percent);

        let event = ProgressEvent::new(percent, message);
        debug!("progress {}%: {}", event.percent, event.message);
        if let Some(tx) = &self.tx {
            // Err only means no receiver is subscribed right now.
            let _ = tx.send(event);
        }
    }

    pub fn last(&self) -> u8 {
        self.last
    }

    /// Every percentage reported so far, in order
    pub fn history(&self) -> &[u8] {
        &self.history
    }
}
