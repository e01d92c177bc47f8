use http::HeaderMap;

use crate::{Result, event::{InboundEvent, ProviderKey}, signature::SignatureCheck};

/// A webhook as received by the transport layer, before any parsing.
#[derive(Debug, Clone, Copy)]
pub struct WebhookRequest<'a> {
    pub workspace_id: &'a str,
    /// Exact request bytes; signatures are computed over these.
    pub body: &'a [u8],
    pub headers: &'a HeaderMap,
    /// Full public URL the provider posted to. Only relay providers that sign
    /// the URL need it.
    pub url: Option<&'a str>,
    pub received_at_ms: i64,
}

/// What a payload turned into.
#[derive(Debug, Clone, PartialEq)]
pub enum NormalizedWebhook {
    /// Zero or more canonical events. Empty when every message was filtered.
    Events(Vec<InboundEvent>),
    /// Endpoint handshake; the value must be echoed back to the provider.
    Challenge(String),
}

impl NormalizedWebhook {
    pub fn events(self) -> Vec<InboundEvent> {
        match self {
            Self::Events(events) => events,
            Self::Challenge(_) => Vec::new(),
        }
    }
}

/// Inbound half of a provider: signature verification and payload
/// normalization. Both operations are pure.
pub trait WebhookAdapter: Send + Sync {
    fn provider(&self) -> ProviderKey;

    /// Recompute the provider's MAC over the request and compare it with the
    /// supplied one. `now_secs` is the verifier's clock for freshness checks.
    fn verify(&self, request: &WebhookRequest<'_>, now_secs: i64) -> SignatureCheck;

    /// Map the payload to canonical events. Malformed payloads are errors;
    /// payloads that are well-formed but irrelevant (bot echoes, status
    /// callbacks) yield an empty event list.
    fn normalize(&self, request: &WebhookRequest<'_>) -> Result<NormalizedWebhook>;
}
