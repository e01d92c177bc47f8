use {
    courier_channels::ProviderKey,
    sha2::{Digest, Sha256},
};

/// Action type of policy replies.
pub const SEND_MESSAGE: &str = "send_message";

/// Deterministic outbox key for one logical effect. Re-running ingestion for
/// the same event and reply yields the same key, so the enqueue is a no-op.
pub fn idempotency_key(
    workspace_id: &str,
    provider: ProviderKey,
    external_event_id: &str,
    action_type: &str,
    response_text: &str,
) -> String {
    let material = [
        workspace_id,
        provider.as_str(),
        external_event_id,
        action_type,
        response_text,
    ]
    .join("\n");
    hex::encode(Sha256::digest(material.as_bytes()))
}
