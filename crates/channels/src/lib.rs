//! Provider-agnostic channel model.
//!
//! Inbound webhooks from every provider are normalized into [`InboundEvent`]s;
//! the runtime persists receipts, threads, decisions and outbox actions using
//! the record types in [`records`]. Providers plug in through
//! [`WebhookAdapter`] (inbound) and [`OutboundSender`] (outbound), and every
//! pipeline stage reports to a [`TelemetrySink`].

pub mod error;
pub mod event;
pub mod records;
pub mod registry;
pub mod sender;
pub mod signature;
pub mod state;
pub mod telemetry;
pub mod webhook;

pub use {
    error::{Error, Result},
    event::{InboundEvent, MessageRef, ProviderKey, ThreadRef},
    records::{
        ActionPlan, DeliveryAttempt, EventReceipt, NewEventReceipt, NewOutboxAction,
        NewPolicyDecision, OutboxAction, OutboxPayload, OutboxStatus, OutboxTarget,
        PolicyDecision, ReceiptStatus, RiskTier, Thread, ThreadUpsert, Verdict,
    },
    registry::SenderRegistry,
    sender::{OutboundSender, SendError, SendReceipt, SenderResolver},
    signature::{SignatureCheck, SignatureFailure},
    telemetry::{TelemetryEvent, TelemetrySink, TelemetryStage},
    webhook::{NormalizedWebhook, WebhookAdapter, WebhookRequest},
};
