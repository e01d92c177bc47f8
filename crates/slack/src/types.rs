use serde::Deserialize;

/// Top-level Events API envelope.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SlackEnvelope {
    /// Endpoint ownership check sent when the request URL is configured.
    UrlVerification { challenge: String },
    EventCallback(EventCallback),
    #[serde(other)]
    Other,
}

#[derive(Debug, Clone, Deserialize)]
pub struct EventCallback {
    pub team_id: Option<String>,
    pub api_app_id: Option<String>,
    pub event_id: Option<String>,
    /// Unix seconds.
    pub event_time: Option<i64>,
    pub event: SlackEvent,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SlackEvent {
    #[serde(rename = "type")]
    pub event_type: String,
    pub user: Option<String>,
    pub text: Option<String>,
    /// Message timestamp, `"<secs>.<micros>"`; also the message id.
    pub ts: Option<String>,
    /// Timestamp of the thread root when the message is a reply.
    pub thread_ts: Option<String>,
    pub channel: Option<String>,
    pub channel_type: Option<String>,
    /// Present on messages authored by an app or bot, including our own.
    pub bot_id: Option<String>,
    /// Edits, joins, bot messages and other non-human message variants.
    pub subtype: Option<String>,
}

impl SlackEvent {
    pub fn is_machine_authored(&self) -> bool {
        self.bot_id.is_some() || self.subtype.is_some()
    }

    /// Timestamp identifying the thread: the root's when replying, else the
    /// message's own.
    pub fn thread_root_ts(&self) -> Option<&str> {
        self.thread_ts.as_deref().or(self.ts.as_deref())
    }
}

/// Response body of `chat.postMessage`.
#[derive(Debug, Clone, Deserialize)]
pub struct PostMessageResponse {
    pub ok: bool,
    pub ts: Option<String>,
    pub channel: Option<String>,
    pub error: Option<String>,
}
