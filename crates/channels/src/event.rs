use serde::{Deserialize, Serialize};

/// The closed set of providers this runtime speaks to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderKey {
    /// Chat workspace events (Events API).
    Slack,
    /// Issue and pull-request comments.
    Github,
    /// WhatsApp structured push (Cloud API).
    WhatsappCloud,
    /// WhatsApp via a form-encoded relay (Twilio).
    WhatsappTwilio,
}

impl ProviderKey {
    pub const ALL: [Self; 4] = [
        Self::Slack,
        Self::Github,
        Self::WhatsappCloud,
        Self::WhatsappTwilio,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Slack => "slack",
            Self::Github => "github",
            Self::WhatsappCloud => "whatsapp_cloud",
            Self::WhatsappTwilio => "whatsapp_twilio",
        }
    }
}

impl std::fmt::Display for ProviderKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ProviderKey {
    type Err = crate::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|p| p.as_str() == s)
            .ok_or_else(|| crate::Error::unknown_provider(s))
    }
}

/// Provider-native identifiers locating the conversation an event belongs to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ThreadRef {
    /// Stable key of the conversation, unique per (workspace, provider).
    pub external_thread_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub external_channel_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub external_user_id: Option<String>,
}

/// The human-authored message carried by an event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageRef {
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub external_message_id: Option<String>,
}

/// Canonical inbound event produced by a provider normalizer.
///
/// Ephemeral: it is the input to ingestion and never stored as-is.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InboundEvent {
    pub workspace_id: String,
    pub provider: ProviderKey,
    /// Provider-native event identifier; the deduplication key together with
    /// workspace and provider.
    pub external_event_id: String,
    pub event_type: String,
    pub occurred_at_ms: i64,
    pub signature_valid: bool,
    pub thread: ThreadRef,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<MessageRef>,
    /// Provider-specific fields the sender needs to reply (e.g. Slack
    /// `thread_ts`, GitHub owner/repo/number).
    #[serde(default)]
    pub metadata: serde_json::Map<String, serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub raw_payload: Option<serde_json::Value>,
}

impl InboundEvent {
    /// Message text, or an empty string when the event carries none.
    pub fn text(&self) -> &str {
        self.message.as_ref().map_or("", |m| m.text.as_str())
    }

    /// Lowercase hex SHA-256 of the raw payload, if one was captured.
    pub fn payload_hash(&self) -> Option<String> {
        use sha2::{Digest, Sha256};

        let raw = self.raw_payload.as_ref()?;
        let bytes = serde_json::to_vec(raw).ok()?;
        Some(hex::encode(Sha256::digest(&bytes)))
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    fn event(raw: Option<serde_json::Value>) -> InboundEvent {
        InboundEvent {
            workspace_id: "ws".into(),
            provider: ProviderKey::Slack,
            external_event_id: "Ev1".into(),
            event_type: "message".into(),
            occurred_at_ms: 0,
            signature_valid: true,
            thread: ThreadRef {
                external_thread_id: "C1:1.0".into(),
                external_channel_id: Some("C1".into()),
                external_user_id: None,
            },
            message: None,
            metadata: serde_json::Map::new(),
            raw_payload: raw,
        }
    }

    #[test]
    fn provider_keys_round_trip_through_str() {
        for provider in ProviderKey::ALL {
            assert_eq!(provider.as_str().parse::<ProviderKey>().unwrap(), provider);
        }
        assert!("telegram".parse::<ProviderKey>().is_err());
    }

    #[test]
    fn provider_key_serializes_snake_case() {
        let json = serde_json::to_string(&ProviderKey::WhatsappCloud).unwrap();
        assert_eq!(json, "\"whatsapp_cloud\"");
    }

    #[test]
    fn text_defaults_to_empty() {
        assert_eq!(event(None).text(), "");
    }

    #[test]
    fn payload_hash_is_stable() {
        let a = event(Some(serde_json::json!({"a": 1})));
        let b = event(Some(serde_json::json!({"a": 1})));
        let hash = a.payload_hash().unwrap();
        assert_eq!(hash.len(), 64);
        assert_eq!(Some(hash), b.payload_hash());
        assert!(event(None).payload_hash().is_none());
    }
}
