//! Persistence contract shared by the ingest service and the dispatcher.

use {
    async_trait::async_trait,
    courier_channels::{
        DeliveryAttempt, EventReceipt, NewEventReceipt, NewOutboxAction, NewPolicyDecision,
        OutboxAction, OutboxStatus, PolicyDecision, ReceiptStatus, Thread, ThreadUpsert,
    },
};

use crate::Result;

/// Outcome of claiming a receipt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReceiptClaim {
    pub receipt_id: String,
    /// `false` when a receipt for the same event already existed.
    pub claimed: bool,
}

/// Outcome of enqueuing an outbox action.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnqueueOutcome {
    pub action_id: String,
    /// `true` when an action with the same idempotency key already existed;
    /// `action_id` then names that action.
    pub duplicate: bool,
}

/// Receipt, thread, decision and outbox persistence.
///
/// The claim operations are the synchronization points: `claim_receipt` has
/// exactly one winner per event key, and `claim_outbox_batch` never hands the
/// same action to two callers.
#[async_trait]
pub trait RuntimeStore: Send + Sync {
    // ── Receipts ────────────────────────────────────────────────────────────

    /// Insert a receipt unless one exists for the same (workspace, provider,
    /// external event id). A previously `rejected` receipt is taken over.
    async fn claim_receipt(&self, receipt: NewEventReceipt) -> Result<ReceiptClaim>;

    /// Record an event that failed verification. Never overwrites an
    /// existing receipt.
    async fn record_rejected_receipt(&self, receipt: NewEventReceipt) -> Result<ReceiptClaim>;

    async fn get_receipt(&self, id: &str) -> Result<Option<EventReceipt>>;

    async fn update_receipt_status(
        &self,
        id: &str,
        status: ReceiptStatus,
        error_code: Option<&str>,
        error_message: Option<&str>,
        now_ms: i64,
    ) -> Result<()>;

    async fn receipt_counts(&self) -> Result<Vec<(ReceiptStatus, u64)>>;

    // ── Threads ─────────────────────────────────────────────────────────────

    /// Create the thread or merge into it. State is merged key by key and the
    /// last provider event time only moves forward.
    async fn upsert_thread(&self, upsert: ThreadUpsert) -> Result<Thread>;

    // ── Decisions ───────────────────────────────────────────────────────────

    async fn insert_decision(&self, decision: NewPolicyDecision) -> Result<PolicyDecision>;

    async fn decisions_for_receipt(&self, receipt_id: &str) -> Result<Vec<PolicyDecision>>;

    // ── Outbox ──────────────────────────────────────────────────────────────

    /// Insert a `pending` action unless its idempotency key is taken.
    async fn enqueue_outbox(&self, action: NewOutboxAction) -> Result<EnqueueOutcome>;

    /// Move up to `limit` due `pending`/`retryable` actions to `sending`,
    /// incrementing their attempt count. Ordered by next attempt time.
    async fn claim_outbox_batch(&self, now_ms: i64, limit: u32) -> Result<Vec<OutboxAction>>;

    // The claim operations below only apply while the caller still holds the
    // claim: the action is `sending` with `attempt_count == attempt`. They
    // return `false` when the claim was lost (expired and requeued, or taken
    // by another dispatcher) and leave the row untouched.

    /// Refresh the claim's `updated_at_ms` so it is not treated as stale.
    async fn touch_outbox_claim(&self, id: &str, attempt: u32, now_ms: i64) -> Result<bool>;

    async fn mark_outbox_sent(
        &self,
        id: &str,
        attempt: u32,
        provider_message_id: Option<&str>,
        now_ms: i64,
    ) -> Result<bool>;

    async fn mark_outbox_retryable(
        &self,
        id: &str,
        attempt: u32,
        error_code: &str,
        error_message: &str,
        next_attempt_at_ms: i64,
        now_ms: i64,
    ) -> Result<bool>;

    async fn mark_outbox_dead_letter(
        &self,
        id: &str,
        attempt: u32,
        error_code: &str,
        error_message: &str,
        now_ms: i64,
    ) -> Result<bool>;

    /// Return actions stuck in `sending` since before `cutoff_ms` to
    /// `retryable`, due immediately. Returns how many were requeued.
    async fn requeue_stale_sending(&self, cutoff_ms: i64, now_ms: i64) -> Result<u64>;

    async fn get_outbox_action(&self, id: &str) -> Result<Option<OutboxAction>>;

    async fn outbox_counts(&self) -> Result<Vec<(OutboxStatus, u64)>>;

    /// Most recently updated dead-lettered actions first.
    async fn list_dead_letters(&self, limit: u32) -> Result<Vec<OutboxAction>>;

    // ── Delivery attempts ───────────────────────────────────────────────────

    /// Insert or replace the attempt with the same (action, attempt number).
    async fn record_delivery_attempt(&self, attempt: DeliveryAttempt) -> Result<()>;

    async fn list_delivery_attempts(&self, action_id: &str) -> Result<Vec<DeliveryAttempt>>;
}

/// Fresh row identifier.
pub(crate) fn new_id() -> String {
    uuid::Uuid::new_v4().to_string()
}
