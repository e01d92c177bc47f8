//! WhatsApp webhook handling.

use {
    courier_channels::{InboundEvent, MessageRef, ProviderKey, Result, ThreadRef},
    courier_config::WhatsAppCloudConfig,
    serde_json::{Map, Value},
    tracing::{debug, warn},
};

use crate::types::{ChangeValue, Message, WebhookPayload};

/// WhatsApp sends a GET request with:
/// - `hub.mode=subscribe`
/// - `hub.verify_token=<your_verify_token>`
/// - `hub.challenge=<random_string>`
///
/// Returns `Some(challenge)` if verification succeeds.
pub fn verify_webhook_subscription(
    mode: Option<&str>,
    token: Option<&str>,
    challenge: Option<&str>,
    config: &WhatsAppCloudConfig,
) -> Option<String> {
    let mode = mode?;
    let token = token?;
    let challenge = challenge?;

    if mode == "subscribe" && !config.verify_token.is_empty() && token == config.verify_token {
        Some(challenge.to_string())
    } else {
        None
    }
}

pub fn parse(body: &[u8]) -> Result<(WebhookPayload, Value)> {
    let raw: Value = serde_json::from_slice(body)?;
    let payload = serde_json::from_value(raw.clone())?;
    Ok((payload, raw))
}

/// One event per inbound message across every entry and change. Status
/// callbacks and pushes for other phone numbers produce nothing.
pub fn normalize(
    workspace_id: &str,
    payload: &WebhookPayload,
    raw: &Value,
    expected_phone_number_id: Option<&str>,
    received_at_ms: i64,
) -> Vec<InboundEvent> {
    if payload
        .object
        .as_deref()
        .is_some_and(|o| o != "whatsapp_business_account")
    {
        warn!(object = ?payload.object, "whatsapp: unexpected webhook object");
        return Vec::new();
    }

    let mut events = Vec::new();
    for change in payload.entry.iter().flat_map(|e| &e.changes) {
        if change.field.as_deref().is_some_and(|f| f != "messages") {
            continue;
        }
        let value = &change.value;
        let Some(phone_number_id) = value
            .metadata
            .as_ref()
            .and_then(|m| m.phone_number_id.as_deref())
        else {
            debug!("whatsapp: change without phone_number_id");
            continue;
        };
        if let Some(expected) = expected_phone_number_id
            && expected != phone_number_id
        {
            debug!(phone_number_id, "whatsapp: push for another phone number");
            continue;
        }
        for message in &value.messages {
            if let Some(event) = normalize_message(
                workspace_id,
                phone_number_id,
                value,
                message,
                raw,
                received_at_ms,
            ) {
                events.push(event);
            }
        }
    }
    events
}

fn normalize_message(
    workspace_id: &str,
    phone_number_id: &str,
    value: &ChangeValue,
    message: &Message,
    raw: &Value,
    received_at_ms: i64,
) -> Option<InboundEvent> {
    let (Some(id), Some(from)) = (message.id.as_deref(), message.from.as_deref()) else {
        debug!("whatsapp: message without id or sender");
        return None;
    };

    // Our own number echoed back.
    let display_number = value
        .metadata
        .as_ref()
        .and_then(|m| m.display_phone_number.as_deref())
        .map(digits);
    if display_number.is_some_and(|own| own == digits(from)) {
        debug!(id, "whatsapp: dropping message from own number");
        return None;
    }

    let occurred_at_ms = message
        .timestamp
        .as_deref()
        .and_then(|t| t.parse::<i64>().ok())
        .and_then(|secs| secs.checked_mul(1000))
        .unwrap_or(received_at_ms);
    let message_type = message.message_type.clone().unwrap_or_else(|| "text".into());

    let mut metadata = Map::new();
    metadata.insert("phone_number_id".into(), phone_number_id.into());
    metadata.insert("message_type".into(), message_type.as_str().into());
    if let Some(name) = value
        .contacts
        .iter()
        .find(|c| c.wa_id.as_deref() == Some(from))
        .and_then(|c| c.profile.as_ref())
        .and_then(|p| p.name.as_deref())
    {
        metadata.insert("contact_name".into(), name.into());
    }

    Some(InboundEvent {
        workspace_id: workspace_id.to_string(),
        provider: ProviderKey::WhatsappCloud,
        external_event_id: id.to_string(),
        event_type: format!("message.{message_type}"),
        occurred_at_ms,
        signature_valid: false,
        thread: ThreadRef {
            external_thread_id: format!("{phone_number_id}:{from}"),
            external_channel_id: Some(phone_number_id.to_string()),
            external_user_id: Some(from.to_string()),
        },
        message: Some(MessageRef {
            text: message.text_content().unwrap_or_default().to_string(),
            external_message_id: Some(id.to_string()),
        }),
        metadata,
        raw_payload: Some(raw.clone()),
    })
}

fn digits(number: &str) -> String {
    number.chars().filter(char::is_ascii_digit).collect()
}
