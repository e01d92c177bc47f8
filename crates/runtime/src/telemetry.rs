//! Telemetry sinks shipped with the runtime.

use std::sync::{Arc, Mutex};

use {
    courier_channels::{TelemetryEvent, TelemetrySink, TelemetryStage},
    tracing::{info, warn},
};

#[cfg(feature = "metrics")]
use courier_metrics::{counter, histogram, ingest, labels, outbox, policy};

/// Emits one structured `tracing` event per pipeline stage and, with the
/// `metrics` feature, updates the courier counters and histograms.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingTelemetry;

impl TelemetrySink for TracingTelemetry {
    fn record(&self, event: TelemetryEvent) {
        let provider = event.provider.map(|p| p.as_str()).unwrap_or("-");
        let metadata = serde_json::Value::Object(event.metadata.clone());
        match event.stage {
            TelemetryStage::IngestFailed
            | TelemetryStage::IngestRejected
            | TelemetryStage::DispatchDeadLetter => warn!(
                stage = event.stage.as_str(),
                status = %event.status,
                workspace_id = event.workspace_id.as_deref(),
                provider,
                receipt_id = event.receipt_id.as_deref(),
                action_id = event.action_id.as_deref(),
                attempt = event.attempt,
                latency_ms = event.latency_ms,
                %metadata,
                "pipeline stage"
            ),
            _ => info!(
                stage = event.stage.as_str(),
                status = %event.status,
                workspace_id = event.workspace_id.as_deref(),
                provider,
                receipt_id = event.receipt_id.as_deref(),
                action_id = event.action_id.as_deref(),
                attempt = event.attempt,
                latency_ms = event.latency_ms,
                %metadata,
                "pipeline stage"
            ),
        }

        #[cfg(feature = "metrics")]
        record_metrics(&event, provider);
    }
}

#[cfg(feature = "metrics")]
fn record_metrics(event: &TelemetryEvent, provider: &'static str) {
    let status = event.status.clone();
    match event.stage {
        TelemetryStage::IngestAccepted
        | TelemetryStage::IngestDuplicate
        | TelemetryStage::IngestRejected => {
            counter!(ingest::EVENTS_TOTAL, labels::PROVIDER => provider, labels::STAGE => event.stage.as_str())
                .increment(1);
            if event.stage == TelemetryStage::IngestRejected {
                counter!(ingest::WEBHOOKS_REJECTED_TOTAL, labels::PROVIDER => provider, labels::STATUS => status)
                    .increment(1);
            }
        },
        TelemetryStage::DecisionProcessed => {
            let risk = event
                .metadata
                .get("risk_tier")
                .and_then(|v| v.as_str())
                .unwrap_or("unknown")
                .to_string();
            counter!(policy::DECISIONS_TOTAL, labels::VERDICT => status, labels::RISK_TIER => risk)
                .increment(1);
        },
        TelemetryStage::OutboxAccepted | TelemetryStage::OutboxDuplicate => {
            counter!(outbox::ENQUEUED_TOTAL, labels::PROVIDER => provider, labels::STATUS => status)
                .increment(1);
        },
        TelemetryStage::IngestProcessed | TelemetryStage::IngestFailed => {
            counter!(ingest::PROCESSED_TOTAL, labels::PROVIDER => provider, labels::STATUS => status)
                .increment(1);
            if let Some(ms) = event.latency_ms {
                histogram!(ingest::PROCESSING_DURATION_SECONDS).record(ms as f64 / 1000.0);
            }
        },
        TelemetryStage::DispatchClaimed => {
            counter!(outbox::CLAIMED_TOTAL, labels::PROVIDER => provider).increment(1);
        },
        TelemetryStage::DispatchSent => {
            counter!(outbox::SENT_TOTAL, labels::PROVIDER => provider).increment(1);
        },
        TelemetryStage::DispatchRetry => {
            counter!(outbox::RETRIED_TOTAL, labels::PROVIDER => provider, labels::ERROR_CODE => status)
                .increment(1);
        },
        TelemetryStage::DispatchDeadLetter => {
            counter!(outbox::DEAD_LETTERED_TOTAL, labels::PROVIDER => provider, labels::ERROR_CODE => status)
                .increment(1);
        },
    }

    if matches!(
        event.stage,
        TelemetryStage::DispatchSent | TelemetryStage::DispatchRetry | TelemetryStage::DispatchDeadLetter
    ) && let Some(ms) = event.latency_ms
    {
        histogram!(outbox::SEND_DURATION_SECONDS, labels::PROVIDER => provider)
            .record(ms as f64 / 1000.0);
    }
}

/// Discards every record.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopTelemetry;

impl TelemetrySink for NoopTelemetry {
    fn record(&self, _event: TelemetryEvent) {}
}

/// Keeps every record in memory, in emission order.
#[derive(Debug, Clone, Default)]
pub struct MemoryTelemetry {
    events: Arc<Mutex<Vec<TelemetryEvent>>>,
}

impl MemoryTelemetry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<TelemetryEvent> {
        self.events.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    pub fn stages(&self) -> Vec<TelemetryStage> {
        self.events().into_iter().map(|e| e.stage).collect()
    }

    pub fn clear(&self) {
        self.events.lock().unwrap_or_else(|e| e.into_inner()).clear();
    }
}

impl TelemetrySink for MemoryTelemetry {
    fn record(&self, event: TelemetryEvent) {
        self.events
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(event);
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use {super::*, courier_channels::ProviderKey};

    #[test]
    fn memory_sink_keeps_order() {
        let sink = MemoryTelemetry::new();
        let shared = sink.clone();
        shared.record(TelemetryEvent::new(TelemetryStage::IngestAccepted, "ok"));
        shared.record(
            TelemetryEvent::new(TelemetryStage::IngestProcessed, "ok").provider(ProviderKey::Slack),
        );
        assert_eq!(sink.stages(), vec![
            TelemetryStage::IngestAccepted,
            TelemetryStage::IngestProcessed
        ]);
        sink.clear();
        assert!(sink.events().is_empty());
    }

    #[test]
    fn tracing_sink_accepts_every_stage() {
        let sink = TracingTelemetry;
        for stage in [
            TelemetryStage::IngestFailed,
            TelemetryStage::DispatchSent,
            TelemetryStage::DecisionProcessed,
        ] {
            sink.record(TelemetryEvent::new(stage, "ok").latency_ms(3));
        }
    }
}
