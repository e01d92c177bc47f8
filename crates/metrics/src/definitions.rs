//! Metric name and label definitions.
//!
//! Every metric emitted by the channel runtime is named here so the set of
//! exported series is documented in one place.

/// Inbound webhook and ingest pipeline metrics
pub mod ingest {
    /// Webhooks rejected at the boundary (bad signature, malformed payload)
    pub const WEBHOOKS_REJECTED_TOTAL: &str = "courier_webhooks_rejected_total";
    /// Ingest calls by outcome (accepted, duplicate, rejected)
    pub const EVENTS_TOTAL: &str = "courier_ingest_events_total";
    /// Receipts that finished processing, by outcome (processed, failed)
    pub const PROCESSED_TOTAL: &str = "courier_ingest_processed_total";
    /// Time from receipt claim to processed/failed, in seconds
    pub const PROCESSING_DURATION_SECONDS: &str = "courier_ingest_processing_duration_seconds";
}

/// Policy engine metrics
pub mod policy {
    /// Decisions by verdict and risk tier
    pub const DECISIONS_TOTAL: &str = "courier_policy_decisions_total";
}

/// Outbox and dispatcher metrics
pub mod outbox {
    /// Enqueue calls by outcome (accepted, duplicate)
    pub const ENQUEUED_TOTAL: &str = "courier_outbox_enqueued_total";
    /// Actions claimed by a dispatcher
    pub const CLAIMED_TOTAL: &str = "courier_outbox_claimed_total";
    /// Actions delivered
    pub const SENT_TOTAL: &str = "courier_outbox_sent_total";
    /// Failed attempts scheduled for retry
    pub const RETRIED_TOTAL: &str = "courier_outbox_retried_total";
    /// Actions moved to dead-letter
    pub const DEAD_LETTERED_TOTAL: &str = "courier_outbox_dead_lettered_total";
    /// Sender latency per attempt, in seconds
    pub const SEND_DURATION_SECONDS: &str = "courier_outbox_send_duration_seconds";
}

/// Common label keys
pub mod labels {
    pub const PROVIDER: &str = "provider";
    pub const STATUS: &str = "status";
    pub const STAGE: &str = "stage";
    pub const VERDICT: &str = "verdict";
    pub const RISK_TIER: &str = "risk_tier";
    pub const ERROR_CODE: &str = "error_code";
}

/// Histogram buckets in seconds.
pub mod buckets {
    /// Sender round-trips: fast API calls up to slow provider timeouts.
    pub const SEND_DURATION: [f64; 10] = [0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0];
    /// In-process pipeline work.
    pub const PROCESSING_DURATION: [f64; 8] = [0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.5, 1.0];
}
