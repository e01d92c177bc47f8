use {
    courier_channels::{InboundEvent, MessageRef, ProviderKey, ThreadRef},
    serde_json::{Map, Value},
    tracing::debug,
};

/// Decode an `application/x-www-form-urlencoded` body into name/value pairs,
/// in wire order.
pub fn parse_pairs(body: &[u8]) -> Vec<(String, String)> {
    url::form_urlencoded::parse(body).into_owned().collect()
}

/// Fields of an inbound Twilio message webhook.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InboundMessage {
    pub message_sid: Option<String>,
    pub account_sid: Option<String>,
    /// `whatsapp:+<E.164>` of the sender.
    pub from: Option<String>,
    /// `whatsapp:+<E.164>` of our number.
    pub to: Option<String>,
    pub body: Option<String>,
    pub profile_name: Option<String>,
    pub num_media: Option<String>,
    /// Set on delivery status callbacks, absent on inbound messages.
    pub message_status: Option<String>,
}

impl InboundMessage {
    pub fn from_pairs(pairs: &[(String, String)]) -> Self {
        let mut msg = Self::default();
        for (key, value) in pairs {
            let slot = match key.as_str() {
                "MessageSid" => &mut msg.message_sid,
                "SmsMessageSid" | "SmsSid" if msg.message_sid.is_none() => &mut msg.message_sid,
                "AccountSid" => &mut msg.account_sid,
                "From" => &mut msg.from,
                "To" => &mut msg.to,
                "Body" => &mut msg.body,
                "ProfileName" => &mut msg.profile_name,
                "NumMedia" => &mut msg.num_media,
                "MessageStatus" => &mut msg.message_status,
                _ => continue,
            };
            *slot = Some(value.clone());
        }
        msg
    }
}

/// The form as a JSON object, for payload hashing. Later duplicates win.
pub fn pairs_to_json(pairs: &[(String, String)]) -> Value {
    let mut map = Map::new();
    for (key, value) in pairs {
        map.insert(key.clone(), Value::String(value.clone()));
    }
    Value::Object(map)
}

/// Map a relayed message to a canonical event. Status callbacks, messages
/// for another account, and posts missing identifiers yield nothing.
pub fn normalize(
    workspace_id: &str,
    pairs: &[(String, String)],
    expected_account_sid: Option<&str>,
    received_at_ms: i64,
) -> Option<InboundEvent> {
    let msg = InboundMessage::from_pairs(pairs);
    if msg.message_status.is_some() {
        debug!(sid = ?msg.message_sid, "twilio: ignoring status callback");
        return None;
    }
    if let (Some(expected), Some(actual)) = (expected_account_sid, msg.account_sid.as_deref())
        && expected != actual
    {
        debug!(account_sid = actual, "twilio: message for another account");
        return None;
    }
    let (Some(sid), Some(from), Some(to)) = (
        msg.message_sid.as_deref(),
        msg.from.as_deref(),
        msg.to.as_deref(),
    ) else {
        debug!("twilio: message without MessageSid, From or To");
        return None;
    };
    if from == to {
        debug!(sid, "twilio: dropping message from own number");
        return None;
    }

    let mut metadata = Map::new();
    metadata.insert("from".into(), from.into());
    metadata.insert("to".into(), to.into());
    if let Some(account) = &msg.account_sid {
        metadata.insert("account_sid".into(), account.as_str().into());
    }
    if let Some(name) = &msg.profile_name {
        metadata.insert("profile_name".into(), name.as_str().into());
    }
    if let Some(n) = msg.num_media.as_deref().and_then(|n| n.parse::<u32>().ok()) {
        metadata.insert("num_media".into(), n.into());
    }

    Some(InboundEvent {
        workspace_id: workspace_id.to_string(),
        provider: ProviderKey::WhatsappTwilio,
        external_event_id: sid.to_string(),
        event_type: "message".into(),
        occurred_at_ms: received_at_ms,
        signature_valid: false,
        thread: ThreadRef {
            external_thread_id: format!("{to}:{from}"),
            external_channel_id: Some(to.to_string()),
            external_user_id: Some(from.to_string()),
        },
        message: Some(MessageRef {
            text: msg.body.clone().unwrap_or_default(),
            external_message_id: Some(sid.to_string()),
        }),
        metadata,
        raw_payload: Some(pairs_to_json(pairs)),
    })
}
