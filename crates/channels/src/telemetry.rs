use serde::Serialize;

use crate::event::ProviderKey;

/// Pipeline stages that emit telemetry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum TelemetryStage {
    #[serde(rename = "ingest.accepted")]
    IngestAccepted,
    #[serde(rename = "ingest.duplicate")]
    IngestDuplicate,
    #[serde(rename = "ingest.rejected")]
    IngestRejected,
    #[serde(rename = "decision.processed")]
    DecisionProcessed,
    #[serde(rename = "outbox.accepted")]
    OutboxAccepted,
    #[serde(rename = "outbox.duplicate")]
    OutboxDuplicate,
    #[serde(rename = "ingest.processed")]
    IngestProcessed,
    #[serde(rename = "ingest.failed")]
    IngestFailed,
    #[serde(rename = "dispatch.claimed")]
    DispatchClaimed,
    #[serde(rename = "dispatch.sent")]
    DispatchSent,
    #[serde(rename = "dispatch.retry")]
    DispatchRetry,
    #[serde(rename = "dispatch.dead_letter")]
    DispatchDeadLetter,
}

impl TelemetryStage {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::IngestAccepted => "ingest.accepted",
            Self::IngestDuplicate => "ingest.duplicate",
            Self::IngestRejected => "ingest.rejected",
            Self::DecisionProcessed => "decision.processed",
            Self::OutboxAccepted => "outbox.accepted",
            Self::OutboxDuplicate => "outbox.duplicate",
            Self::IngestProcessed => "ingest.processed",
            Self::IngestFailed => "ingest.failed",
            Self::DispatchClaimed => "dispatch.claimed",
            Self::DispatchSent => "dispatch.sent",
            Self::DispatchRetry => "dispatch.retry",
            Self::DispatchDeadLetter => "dispatch.dead_letter",
        }
    }
}

impl std::fmt::Display for TelemetryStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One structured telemetry record.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TelemetryEvent {
    pub stage: TelemetryStage,
    /// `ok`, `duplicate`, `error`, or a verdict/status name.
    pub status: String,
    pub workspace_id: Option<String>,
    pub provider: Option<ProviderKey>,
    pub receipt_id: Option<String>,
    pub action_id: Option<String>,
    pub latency_ms: Option<i64>,
    pub attempt: Option<u32>,
    pub metadata: serde_json::Map<String, serde_json::Value>,
}

impl TelemetryEvent {
    pub fn new(stage: TelemetryStage, status: impl Into<String>) -> Self {
        Self {
            stage,
            status: status.into(),
            workspace_id: None,
            provider: None,
            receipt_id: None,
            action_id: None,
            latency_ms: None,
            attempt: None,
            metadata: serde_json::Map::new(),
        }
    }

    #[must_use]
    pub fn workspace(mut self, workspace_id: impl Into<String>) -> Self {
        self.workspace_id = Some(workspace_id.into());
        self
    }

    #[must_use]
    pub fn provider(mut self, provider: ProviderKey) -> Self {
        self.provider = Some(provider);
        self
    }

    #[must_use]
    pub fn receipt(mut self, receipt_id: impl Into<String>) -> Self {
        self.receipt_id = Some(receipt_id.into());
        self
    }

    #[must_use]
    pub fn action(mut self, action_id: impl Into<String>) -> Self {
        self.action_id = Some(action_id.into());
        self
    }

    #[must_use]
    pub fn latency_ms(mut self, latency_ms: i64) -> Self {
        self.latency_ms = Some(latency_ms);
        self
    }

    #[must_use]
    pub fn attempt(mut self, attempt: u32) -> Self {
        self.attempt = Some(attempt);
        self
    }

    #[must_use]
    pub fn meta(mut self, key: &str, value: impl Into<serde_json::Value>) -> Self {
        self.metadata.insert(key.to_string(), value.into());
        self
    }
}

/// Receives every telemetry record. Implementations must not block.
pub trait TelemetrySink: Send + Sync {
    fn record(&self, event: TelemetryEvent);
}
