//! Persisted record shapes: receipts, threads, decisions, outbox actions and
//! delivery attempts.

use {
    courier_config::PolicyMode,
    serde::{Deserialize, Serialize},
};

use crate::event::{InboundEvent, ProviderKey};

/// Implements `as_str`, `Display` and `FromStr` for a status enum stored as
/// text.
macro_rules! text_enum {
    ($ty:ident { $($variant:ident => $text:literal),+ $(,)? }) => {
        impl $ty {
            pub fn as_str(self) -> &'static str {
                match self {
                    $(Self::$variant => $text,)+
                }
            }
        }

        impl std::fmt::Display for $ty {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl std::str::FromStr for $ty {
            type Err = crate::Error;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($text => Ok(Self::$variant),)+
                    other => Err(crate::Error::invalid_input(format!(
                        concat!("unknown ", stringify!($ty), ": {}"),
                        other
                    ))),
                }
            }
        }
    };
}

// ── Receipts ────────────────────────────────────────────────────────────────

/// Receipt lifecycle: accepted → processing → processed | failed.
/// `rejected` receipts never enter the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReceiptStatus {
    Accepted,
    Processing,
    Processed,
    Failed,
    Duplicate,
    Rejected,
}

text_enum!(ReceiptStatus {
    Accepted => "accepted",
    Processing => "processing",
    Processed => "processed",
    Failed => "failed",
    Duplicate => "duplicate",
    Rejected => "rejected",
});

/// Deduplication record for one inbound event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventReceipt {
    pub id: String,
    pub workspace_id: String,
    pub provider: ProviderKey,
    pub external_event_id: String,
    pub event_type: String,
    pub status: ReceiptStatus,
    pub payload_hash: Option<String>,
    pub trace_id: String,
    pub error_code: Option<String>,
    pub error_message: Option<String>,
    pub received_at_ms: i64,
    pub updated_at_ms: i64,
}

/// Input for claiming a receipt.
#[derive(Debug, Clone)]
pub struct NewEventReceipt {
    pub workspace_id: String,
    pub provider: ProviderKey,
    pub external_event_id: String,
    pub event_type: String,
    pub status: ReceiptStatus,
    pub payload_hash: Option<String>,
    pub trace_id: String,
    pub received_at_ms: i64,
}

impl NewEventReceipt {
    pub fn from_event(
        event: &InboundEvent,
        status: ReceiptStatus,
        trace_id: impl Into<String>,
        now_ms: i64,
    ) -> Self {
        Self {
            workspace_id: event.workspace_id.clone(),
            provider: event.provider,
            external_event_id: event.external_event_id.clone(),
            event_type: event.event_type.clone(),
            status,
            payload_hash: event.payload_hash(),
            trace_id: trace_id.into(),
            received_at_ms: now_ms,
        }
    }
}

// ── Threads ─────────────────────────────────────────────────────────────────

/// Conversational context shared by every event with the same thread key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Thread {
    pub id: String,
    pub workspace_id: String,
    pub provider: ProviderKey,
    pub external_thread_id: String,
    pub external_channel_id: Option<String>,
    pub external_user_id: Option<String>,
    pub state: serde_json::Map<String, serde_json::Value>,
    pub last_provider_event_at_ms: Option<i64>,
    pub created_at_ms: i64,
    pub updated_at_ms: i64,
}

/// Input for creating or updating a thread. `state` is merged into the
/// existing state, never substituted for it.
#[derive(Debug, Clone)]
pub struct ThreadUpsert {
    pub workspace_id: String,
    pub provider: ProviderKey,
    pub external_thread_id: String,
    pub external_channel_id: Option<String>,
    pub external_user_id: Option<String>,
    pub state: serde_json::Map<String, serde_json::Value>,
    pub provider_event_at_ms: i64,
    pub now_ms: i64,
}

// ── Decisions ───────────────────────────────────────────────────────────────

/// How an event should be handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Verdict {
    Autonomous,
    Assist,
    Blocked,
}

text_enum!(Verdict {
    Autonomous => "autonomous",
    Assist => "assist",
    Blocked => "blocked",
});

impl Verdict {
    /// Mode recorded on a decision with this verdict.
    pub fn mode(self) -> PolicyMode {
        match self {
            Self::Autonomous => PolicyMode::Autonomous,
            Self::Assist => PolicyMode::Assist,
            Self::Blocked => PolicyMode::Suggest,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskTier {
    Low,
    Medium,
    High,
    Blocked,
}

text_enum!(RiskTier {
    Low => "low",
    Medium => "medium",
    High => "high",
    Blocked => "blocked",
});

/// Verdict plus the signals that produced it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionPlan {
    pub verdict: Verdict,
    pub reasons: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response_text: Option<String>,
}

/// Persisted outcome of the policy engine for one receipt. Immutable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PolicyDecision {
    pub id: String,
    pub receipt_id: String,
    pub thread_id: String,
    pub workspace_id: String,
    pub policy_mode: PolicyMode,
    pub risk_tier: RiskTier,
    pub confidence: f64,
    pub model_name: String,
    pub model_version: String,
    pub action_plan: ActionPlan,
    pub requires_approval: bool,
    pub tool_trace: serde_json::Value,
    pub created_at_ms: i64,
}

#[derive(Debug, Clone)]
pub struct NewPolicyDecision {
    pub receipt_id: String,
    pub thread_id: String,
    pub workspace_id: String,
    pub policy_mode: PolicyMode,
    pub risk_tier: RiskTier,
    pub confidence: f64,
    pub model_name: String,
    pub model_version: String,
    pub action_plan: ActionPlan,
    pub requires_approval: bool,
    pub tool_trace: serde_json::Value,
    pub created_at_ms: i64,
}

// ── Outbox ──────────────────────────────────────────────────────────────────

/// pending → sending → sent | retryable → sending … | dead_letter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutboxStatus {
    Pending,
    Sending,
    Sent,
    Retryable,
    DeadLetter,
}

text_enum!(OutboxStatus {
    Pending => "pending",
    Sending => "sending",
    Sent => "sent",
    Retryable => "retryable",
    DeadLetter => "dead_letter",
});

impl OutboxStatus {
    pub const ALL: [Self; 5] = [
        Self::Pending,
        Self::Sending,
        Self::Sent,
        Self::Retryable,
        Self::DeadLetter,
    ];

    /// Whether a dispatcher may claim an action in this status.
    pub fn is_claimable(self) -> bool {
        matches!(self, Self::Pending | Self::Retryable)
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Sent | Self::DeadLetter)
    }
}

/// Where a reply goes, in provider-native terms.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OutboxTarget {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub channel_id: Option<String>,
    pub thread_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reply_to_message_id: Option<String>,
    #[serde(default)]
    pub metadata: serde_json::Map<String, serde_json::Value>,
}

impl OutboxTarget {
    /// Reply target for an inbound event: same thread, same channel, back to
    /// the author.
    pub fn reply_to(event: &InboundEvent) -> Self {
        Self {
            channel_id: event.thread.external_channel_id.clone(),
            thread_id: event.thread.external_thread_id.clone(),
            user_id: event.thread.external_user_id.clone(),
            reply_to_message_id: event
                .message
                .as_ref()
                .and_then(|m| m.external_message_id.clone()),
            metadata: event.metadata.clone(),
        }
    }

    /// String-valued metadata entry.
    pub fn meta_str(&self, key: &str) -> Option<&str> {
        self.metadata.get(key).and_then(|v| v.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutboxPayload {
    pub text: String,
}

/// One outbound effect awaiting (or past) delivery.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutboxAction {
    pub id: String,
    pub workspace_id: String,
    pub provider: ProviderKey,
    pub idempotency_key: String,
    pub action_type: String,
    pub status: OutboxStatus,
    pub target: OutboxTarget,
    pub payload: OutboxPayload,
    pub receipt_id: Option<String>,
    pub decision_id: Option<String>,
    pub thread_id: Option<String>,
    pub attempt_count: u32,
    pub next_attempt_at_ms: i64,
    pub last_error_code: Option<String>,
    pub last_error_message: Option<String>,
    pub provider_message_id: Option<String>,
    pub created_at_ms: i64,
    pub updated_at_ms: i64,
    pub sent_at_ms: Option<i64>,
}

#[derive(Debug, Clone)]
pub struct NewOutboxAction {
    pub workspace_id: String,
    pub provider: ProviderKey,
    pub idempotency_key: String,
    pub action_type: String,
    pub target: OutboxTarget,
    pub payload: OutboxPayload,
    pub receipt_id: Option<String>,
    pub decision_id: Option<String>,
    pub thread_id: Option<String>,
    pub next_attempt_at_ms: i64,
    pub created_at_ms: i64,
}

/// Outcome of a single send, kept whether or not the action ultimately
/// succeeds. Unique per (action, attempt number).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeliveryAttempt {
    pub action_id: String,
    pub attempt_number: u32,
    pub provider: ProviderKey,
    /// `sent`, or the error code of the failed attempt.
    pub status: String,
    pub response_status: Option<u16>,
    pub response_body: Option<String>,
    pub error_message: Option<String>,
    pub latency_ms: i64,
    pub attempted_at_ms: i64,
}
