use {
    courier_channels::{InboundEvent, MessageRef, NormalizedWebhook, ProviderKey, Result, ThreadRef},
    courier_common::time::fractional_secs_to_ms,
    serde_json::{Map, Value},
    tracing::debug,
};

use crate::types::{EventCallback, SlackEnvelope};

/// Event types that carry a human message worth classifying.
const MESSAGE_EVENT_TYPES: &[&str] = &["message", "app_mention"];

/// Deserialize the raw body, keeping the untyped payload for hashing.
pub fn parse(body: &[u8]) -> Result<(SlackEnvelope, Value)> {
    let raw: Value = serde_json::from_slice(body)?;
    let envelope = serde_json::from_value(raw.clone())?;
    Ok((envelope, raw))
}

/// Map an envelope to canonical events.
pub fn normalize(
    workspace_id: &str,
    envelope: SlackEnvelope,
    raw: Value,
    received_at_ms: i64,
) -> NormalizedWebhook {
    match envelope {
        SlackEnvelope::UrlVerification { challenge } => NormalizedWebhook::Challenge(challenge),
        SlackEnvelope::EventCallback(callback) => NormalizedWebhook::Events(
            normalize_callback(workspace_id, callback, raw, received_at_ms)
                .into_iter()
                .collect(),
        ),
        SlackEnvelope::Other => NormalizedWebhook::Events(Vec::new()),
    }
}

fn normalize_callback(
    workspace_id: &str,
    callback: EventCallback,
    raw: Value,
    received_at_ms: i64,
) -> Option<InboundEvent> {
    let event = &callback.event;
    if !MESSAGE_EVENT_TYPES.contains(&event.event_type.as_str()) {
        debug!(event_type = %event.event_type, "slack: ignoring non-message event");
        return None;
    }
    if event.is_machine_authored() {
        debug!(
            bot_id = ?event.bot_id,
            subtype = ?event.subtype,
            "slack: dropping machine-authored message"
        );
        return None;
    }

    let (Some(event_id), Some(channel), Some(ts)) = (
        callback.event_id.as_deref(),
        event.channel.as_deref(),
        event.ts.as_deref(),
    ) else {
        debug!("slack: event is missing event_id, channel or ts");
        return None;
    };
    let root_ts = event.thread_root_ts().unwrap_or(ts);

    let occurred_at_ms = fractional_secs_to_ms(ts)
        .or_else(|| callback.event_time.and_then(|secs| secs.checked_mul(1000)))
        .unwrap_or(received_at_ms);

    let mut metadata = Map::new();
    metadata.insert("channel".into(), channel.into());
    metadata.insert("thread_ts".into(), root_ts.into());
    if let Some(team) = &callback.team_id {
        metadata.insert("team_id".into(), team.as_str().into());
    }
    if let Some(channel_type) = &event.channel_type {
        metadata.insert("channel_type".into(), channel_type.as_str().into());
    }

    Some(InboundEvent {
        workspace_id: workspace_id.to_string(),
        provider: ProviderKey::Slack,
        external_event_id: event_id.to_string(),
        event_type: event.event_type.clone(),
        occurred_at_ms,
        signature_valid: false,
        thread: ThreadRef {
            external_thread_id: format!("{channel}:{root_ts}"),
            external_channel_id: Some(channel.to_string()),
            external_user_id: event.user.clone(),
        },
        message: Some(MessageRef {
            text: event.text.clone().unwrap_or_default(),
            external_message_id: Some(ts.to_string()),
        }),
        metadata,
        raw_payload: Some(raw),
    })
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use {super::*, serde_json::json};

    fn run(payload: Value) -> NormalizedWebhook {
        let body = serde_json::to_vec(&payload).unwrap();
        let (envelope, raw) = parse(&body).unwrap();
        normalize("ws1", envelope, raw, 42)
    }

    fn message(extra: Value) -> Value {
        let mut event = json!({
            "type": "message",
            "user": "U123",
            "text": "Can you share the docs?",
            "ts": "1712345678.000100",
            "channel": "C999",
        });
        for (k, v) in extra.as_object().unwrap() {
            event[k] = v.clone();
        }
        json!({
            "type": "event_callback",
            "team_id": "T1",
            "event_id": "Ev0001",
            "event_time": 1712345678,
            "event": event,
        })
    }

    #[test]
    fn url_verification_yields_challenge() {
        let out = run(json!({"type": "url_verification", "challenge": "abc", "token": "x"}));
        assert_eq!(out, NormalizedWebhook::Challenge("abc".into()));
    }

    #[test]
    fn top_level_message() {
        let events = run(message(json!({}))).events();
        assert_eq!(events.len(), 1);
        let e = &events[0];
        assert_eq!(e.provider, ProviderKey::Slack);
        assert_eq!(e.external_event_id, "Ev0001");
        assert_eq!(e.thread.external_thread_id, "C999:1712345678.000100");
        assert_eq!(e.thread.external_user_id.as_deref(), Some("U123"));
        assert_eq!(e.text(), "Can you share the docs?");
        assert_eq!(e.occurred_at_ms, 1_712_345_678_000);
        assert_eq!(e.metadata["thread_ts"], "1712345678.000100");
        assert!(e.payload_hash().is_some());
    }

    #[test]
    fn overflowing_event_time_falls_back_to_receipt_time() {
        let mut payload = message(json!({"ts": "99999999999999999999.1"}));
        payload["event_time"] = json!(i64::MAX);
        let events = run(payload).events();
        assert_eq!(events[0].occurred_at_ms, 42);
    }

    #[test]
    fn reply_keys_thread_by_root() {
        let events = run(message(json!({
            "ts": "1712345690.000200",
            "thread_ts": "1712345678.000100",
        })))
        .events();
        assert_eq!(events[0].thread.external_thread_id, "C999:1712345678.000100");
        assert_eq!(
            events[0]
                .message
                .as_ref()
                .unwrap()
                .external_message_id
                .as_deref(),
            Some("1712345690.000200")
        );
    }

    #[test]
    fn bot_and_subtype_messages_are_dropped() {
        assert!(run(message(json!({"bot_id": "B1"}))).events().is_empty());
        assert!(
            run(message(json!({"subtype": "message_changed"})))
                .events()
                .is_empty()
        );
    }

    #[test]
    fn missing_identifiers_yield_nothing() {
        let mut payload = message(json!({}));
        payload.as_object_mut().unwrap().remove("event_id");
        assert!(run(payload).events().is_empty());

        let mut payload = message(json!({}));
        payload["event"].as_object_mut().unwrap().remove("channel");
        assert!(run(payload).events().is_empty());
    }

    #[test]
    fn non_message_events_are_ignored() {
        let payload = json!({
            "type": "event_callback",
            "event_id": "Ev2",
            "event": {"type": "reaction_added", "user": "U1"},
        });
        assert!(run(payload).events().is_empty());
        assert!(run(json!({"type": "app_rate_limited"})).events().is_empty());
    }

    #[test]
    fn malformed_body_is_an_error() {
        assert!(parse(b"not json").is_err());
        assert!(parse(br#"{"type":"event_callback"}"#).is_err());
    }
}
