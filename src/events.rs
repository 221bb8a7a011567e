//! Scan events published after every analysis.

use crate::types::{AnalysisResult, AnalysisStatus, ErrorReason, ThreatLevel};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScanEventType {
    ScanComplete,
    ScanFailed,
}

/// Summary of one analysis, suitable for live dashboards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScanEvent {
    pub event_type: ScanEventType,
    pub module: String,
    pub status: AnalysisStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub threat_level: Option<ThreatLevel>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub risk_score: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<ErrorReason>,
    pub elapsed_ms: u64,
    pub timestamp: DateTime<Utc>,
}

impl ScanEvent {
    pub fn from_result(result: &AnalysisResult, elapsed_ms: u64) -> Self {
        Self {
            event_type: if result.is_ok() {
                ScanEventType::ScanComplete
            } else {
                ScanEventType::ScanFailed
            },
            module: result.module.clone(),
            status: result.status,
            threat_level: result.threat_level,
            risk_score: result.risk_score,
            reason: result.reason,
            elapsed_ms,
            timestamp: result.timestamp,
        }
    }
}

/// Fan-out channel for [`ScanEvent`]s.
///
/// Slow subscribers lose the oldest events rather than blocking publishers.
#[derive(Debug, Clone)]
pub struct EventBus {
    sender: broadcast::Sender<ScanEvent>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ScanEvent> {
        self.sender.subscribe()
    }

    /// Publish an event. Having no subscribers is not an error.
    pub fn publish(&self, event: ScanEvent) {
        if self.sender.send(event).is_err() {
            tracing::trace!("No feed subscribers, event dropped");
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}
