//! Status Projection: a read-only aggregator trading engines publish into
//! and the external dashboard reads from. Readers never block a worker —
//! every write is a short critical section over `tokio::sync::RwLock`, and
//! readers accept whatever was last published.

use std::collections::{HashMap, VecDeque};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use crate::domain::signal::GateDiagnostics;

const HISTORY_CAPACITY: usize = 50;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EngineState {
    Idle,
    Polling,
    Evaluating,
    Sizing,
    Placing,
    OrderOpen,
    Paused,
    Stopped,
}

impl std::fmt::Display for EngineState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            EngineState::Idle => "idle",
            EngineState::Polling => "polling",
            EngineState::Evaluating => "evaluating",
            EngineState::Sizing => "sizing",
            EngineState::Placing => "placing",
            EngineState::OrderOpen => "order_open",
            EngineState::Paused => "paused",
            EngineState::Stopped => "stopped",
        };
        write!(f, "{s}")
    }
}

/// One evaluation outcome, either a veto reason or a placed-signal summary.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignalHistoryEntry {
    pub evaluated_at: DateTime<Utc>,
    pub outcome: String,
    pub detail: String,
}

impl SignalHistoryEntry {
    pub fn veto(evaluated_at: DateTime<Utc>, reason: impl Into<String>) -> Self {
        Self {
            evaluated_at,
            outcome: "veto".to_string(),
            detail: reason.into(),
        }
    }

    pub fn signal(evaluated_at: DateTime<Utc>, detail: impl Into<String>) -> Self {
        Self {
            evaluated_at,
            outcome: "signal".to_string(),
            detail: detail.into(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreamStatus {
    pub stream_name: String,
    pub state: EngineState,
    pub last_cycle_at: Option<DateTime<Utc>>,
    pub last_diagnostics: Option<GateDiagnostics>,
}

/// Shared handle; trading engines publish through it every cycle, the
/// status API reads a `snapshot()` of it. Safe to clone across workers.
#[derive(Default)]
pub struct StatusProjection {
    streams: RwLock<HashMap<String, StreamStatus>>,
    history: RwLock<HashMap<String, VecDeque<SignalHistoryEntry>>>,
}

impl StatusProjection {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn publish_state(&self, stream: &str, state: EngineState, at: DateTime<Utc>) {
        let mut streams = self.streams.write().await;
        let entry = streams
            .entry(stream.to_string())
            .or_insert_with(|| StreamStatus {
                stream_name: stream.to_string(),
                state,
                last_cycle_at: None,
                last_diagnostics: None,
            });
        entry.state = state;
        entry.last_cycle_at = Some(at);
    }

    pub async fn publish_result(
        &self,
        stream: &str,
        entry: SignalHistoryEntry,
        diagnostics: Option<GateDiagnostics>,
    ) {
        if let Some(diagnostics) = diagnostics {
            let mut streams = self.streams.write().await;
            if let Some(status) = streams.get_mut(stream) {
                status.last_diagnostics = Some(diagnostics);
            }
        }

        let mut history = self.history.write().await;
        let queue = history.entry(stream.to_string()).or_default();
        queue.push_front(entry);
        queue.truncate(HISTORY_CAPACITY);
    }

    pub async fn snapshot(&self) -> Vec<StreamStatus> {
        self.streams.read().await.values().cloned().collect()
    }

    pub async fn history(&self, stream: &str, limit: usize) -> Vec<SignalHistoryEntry> {
        self.history
            .read()
            .await
            .get(stream)
            .map(|q| q.iter().take(limit).cloned().collect())
            .unwrap_or_default()
    }
}
