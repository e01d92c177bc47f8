//! Cloud API webhook and response shapes.

use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct WebhookPayload {
    pub object: Option<String>,
    #[serde(default)]
    pub entry: Vec<Entry>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Entry {
    /// WhatsApp Business Account ID.
    pub id: Option<String>,
    #[serde(default)]
    pub changes: Vec<Change>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Change {
    pub field: Option<String>,
    pub value: ChangeValue,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChangeValue {
    pub messaging_product: Option<String>,
    pub metadata: Option<PhoneMetadata>,
    #[serde(default)]
    pub contacts: Vec<Contact>,
    #[serde(default)]
    pub messages: Vec<Message>,
    /// Delivery/read receipts for messages we sent; never normalized.
    #[serde(default)]
    pub statuses: Vec<serde_json::Value>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PhoneMetadata {
    pub display_phone_number: Option<String>,
    pub phone_number_id: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Contact {
    pub wa_id: Option<String>,
    pub profile: Option<Profile>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Profile {
    pub name: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Message {
    /// `wamid.*` message ID.
    pub id: Option<String>,
    pub from: Option<String>,
    /// Unix seconds, as a string.
    pub timestamp: Option<String>,
    #[serde(rename = "type")]
    pub message_type: Option<String>,
    pub text: Option<TextBody>,
    pub button: Option<ButtonBody>,
    pub interactive: Option<Interactive>,
    pub image: Option<Media>,
    pub video: Option<Media>,
    pub document: Option<Media>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TextBody {
    pub body: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ButtonBody {
    pub text: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Interactive {
    pub button_reply: Option<InteractiveReply>,
    pub list_reply: Option<InteractiveReply>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct InteractiveReply {
    pub id: Option<String>,
    pub title: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Media {
    pub id: Option<String>,
    pub caption: Option<String>,
}

impl Message {
    /// Human text carried by the message, whatever its type.
    pub fn text_content(&self) -> Option<&str> {
        if let Some(text) = &self.text {
            return Some(text.body.as_str());
        }
        if let Some(text) = self.button.as_ref().and_then(|b| b.text.as_deref()) {
            return Some(text);
        }
        if let Some(interactive) = &self.interactive {
            return interactive
                .button_reply
                .as_ref()
                .or(interactive.list_reply.as_ref())
                .and_then(|r| r.title.as_deref());
        }
        [&self.image, &self.video, &self.document]
            .into_iter()
            .flatten()
            .find_map(|m| m.caption.as_deref())
    }
}

/// Response body of `POST /{phone_number_id}/messages`.
#[derive(Debug, Clone, Deserialize)]
pub struct SendMessageResponse {
    #[serde(default)]
    pub messages: Vec<SentMessage>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SentMessage {
    pub id: String,
}

/// Graph API error envelope.
#[derive(Debug, Clone, Deserialize)]
pub struct GraphErrorResponse {
    pub error: GraphError,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GraphError {
    pub message: Option<String>,
    pub code: Option<i64>,
    pub error_subcode: Option<i64>,
}
