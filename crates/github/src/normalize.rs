use {
    courier_channels::{InboundEvent, MessageRef, ProviderKey, Result, ThreadRef},
    serde_json::{Map, Value},
    tracing::debug,
};

use crate::types::WebhookPayload;

pub const DELIVERY_HEADER: &str = "x-github-delivery";
pub const EVENT_HEADER: &str = "x-github-event";

/// Actions that carry new or changed human text.
const HANDLED_ACTIONS: &[&str] = &["created", "opened", "edited", "reopened"];

/// Per-delivery values GitHub sends as headers rather than in the body.
#[derive(Debug, Clone, Copy, Default)]
pub struct DeliveryInfo<'a> {
    /// `X-GitHub-Delivery`, a GUID unique per delivery.
    pub delivery_id: Option<&'a str>,
    /// `X-GitHub-Event`, e.g. `issue_comment`.
    pub event: Option<&'a str>,
}

pub fn parse(body: &[u8]) -> Result<(WebhookPayload, Value)> {
    let raw: Value = serde_json::from_slice(body)?;
    let payload = serde_json::from_value(raw.clone())?;
    Ok((payload, raw))
}

/// Map a webhook payload to at most one canonical event.
pub fn normalize(
    workspace_id: &str,
    payload: &WebhookPayload,
    raw: Value,
    delivery: DeliveryInfo<'_>,
    bot_login: Option<&str>,
    received_at_ms: i64,
) -> Option<InboundEvent> {
    let action = payload.action.as_deref()?;
    if !HANDLED_ACTIONS.contains(&action) {
        debug!(action, "github: ignoring action");
        return None;
    }

    let (Some(repo), Some(subject)) = (payload.repository.as_ref(), payload.subject()) else {
        debug!("github: payload has no repository or issue number");
        return None;
    };
    let owner = repo.owner.login.as_str();
    let name = repo.name.as_str();
    let number = subject.number;

    let author = payload.author();
    if author.is_some_and(|a| a.is_bot(bot_login))
        || payload.sender.as_ref().is_some_and(|s| s.is_bot(bot_login))
    {
        debug!(owner, repo = name, number, "github: dropping bot-authored event");
        return None;
    }

    let event_type = delivery
        .event
        .map(str::to_string)
        .unwrap_or_else(|| infer_event_type(payload).to_string());

    let comment = payload.comment.as_ref();
    let text = comment
        .and_then(|c| c.body.clone())
        .or_else(|| subject.body.clone())
        .unwrap_or_default();

    let timestamp = comment
        .and_then(|c| c.updated_at.as_deref().or(c.created_at.as_deref()))
        .or(subject.updated_at.as_deref())
        .or(subject.created_at.as_deref());
    let occurred_at_ms = timestamp
        .and_then(parse_rfc3339_ms)
        .unwrap_or(received_at_ms);

    let external_event_id = match delivery.delivery_id {
        Some(id) if !id.is_empty() => id.to_string(),
        _ => {
            let item = comment.map_or(0, |c| c.id);
            let stamp = timestamp.unwrap_or("");
            format!("{event_type}:{owner}/{name}#{number}:{item}:{action}:{stamp}")
        },
    };

    let mut metadata = Map::new();
    metadata.insert("owner".into(), owner.into());
    metadata.insert("repo".into(), name.into());
    metadata.insert("number".into(), number.into());
    metadata.insert("action".into(), action.into());
    metadata.insert("is_pull_request".into(), payload.is_pull_request().into());

    Some(InboundEvent {
        workspace_id: workspace_id.to_string(),
        provider: ProviderKey::Github,
        external_event_id,
        event_type,
        occurred_at_ms,
        signature_valid: false,
        thread: ThreadRef {
            external_thread_id: format!("{owner}/{name}#{number}"),
            external_channel_id: Some(format!("{owner}/{name}")),
            external_user_id: author.map(|a| a.login.clone()),
        },
        message: Some(MessageRef {
            text,
            external_message_id: comment.map(|c| c.id.to_string()),
        }),
        metadata,
        raw_payload: Some(raw),
    })
}

fn infer_event_type(payload: &WebhookPayload) -> &'static str {
    match (payload.comment.is_some(), payload.pull_request.is_some()) {
        (true, true) => "pull_request_review_comment",
        (true, false) => "issue_comment",
        (false, true) => "pull_request",
        (false, false) => "issues",
    }
}

fn parse_rfc3339_ms(raw: &str) -> Option<i64> {
    chrono::DateTime::parse_from_rfc3339(raw)
        .ok()
        .map(|dt| dt.timestamp_millis())
}
