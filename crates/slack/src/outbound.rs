use {
    async_trait::async_trait,
    courier_channels::{OutboundSender, OutboxAction, SendError, SendReceipt},
    courier_config::SlackConfig,
    secrecy::{ExposeSecret, Secret},
    serde_json::json,
    tracing::debug,
};

use crate::types::PostMessageResponse;

/// `ok: false` errors worth retrying; every other Slack error is permanent.
const RETRYABLE_ERRORS: &[&str] = &[
    "ratelimited",
    "internal_error",
    "fatal_error",
    "service_unavailable",
    "request_timeout",
];

/// Posts replies with `chat.postMessage`, threaded under the inbound message.
pub struct SlackSender {
    http: reqwest::Client,
    bot_token: Secret<String>,
    api_base_url: String,
}

impl SlackSender {
    pub fn new(config: &SlackConfig) -> Self {
        Self::with_client(reqwest::Client::new(), config)
    }

    pub fn with_client(http: reqwest::Client, config: &SlackConfig) -> Self {
        Self {
            http,
            bot_token: config.bot_token.clone(),
            api_base_url: config.api_base_url.trim_end_matches('/').to_string(),
        }
    }
}

#[async_trait]
impl OutboundSender for SlackSender {
    async fn send(&self, action: &OutboxAction) -> Result<SendReceipt, SendError> {
        let target = &action.target;
        let channel = target
            .channel_id
            .as_deref()
            .or_else(|| target.meta_str("channel"))
            .ok_or_else(|| SendError::permanent("INVALID_TARGET", "slack target has no channel"))?;

        let mut body = json!({
            "channel": channel,
            "text": action.payload.text,
        });
        if let Some(ts) = target
            .meta_str("thread_ts")
            .or(target.reply_to_message_id.as_deref())
        {
            body["thread_ts"] = ts.into();
        }

        let url = format!("{}/api/chat.postMessage", self.api_base_url);
        debug!(action_id = %action.id, channel, "slack: posting message");
        let resp = self
            .http
            .post(url)
            .bearer_auth(self.bot_token.expose_secret())
            .json(&body)
            .send()
            .await
            .map_err(|e| SendError::transient(format!("slack request failed: {e}")))?;

        let status = resp.status().as_u16();
        let text = resp.text().await.unwrap_or_default();
        if !(200..300).contains(&status) {
            return Err(SendError::from_http_status(status, text));
        }

        let parsed: PostMessageResponse = serde_json::from_str(&text).map_err(|e| SendError {
            response_status: Some(status),
            response_body: Some(text.clone()),
            ..SendError::transient(format!("unreadable slack response: {e}"))
        })?;
        if !parsed.ok {
            let code = parsed.error.unwrap_or_else(|| "unknown_error".into());
            return Err(SendError {
                retryable: RETRYABLE_ERRORS.contains(&code.as_str()),
                message: format!("slack rejected message: {code}"),
                code: Some(code),
                response_status: Some(status),
                response_body: Some(text),
            });
        }

        Ok(SendReceipt {
            provider_message_id: parsed.ts,
            response_status: Some(status),
            response_body: Some(text),
        })
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use {
        super::*,
        courier_channels::{OutboxPayload, OutboxStatus, OutboxTarget, ProviderKey},
        mockito::Matcher,
    };

    fn action(channel: Option<&str>) -> OutboxAction {
        let mut metadata = serde_json::Map::new();
        metadata.insert("thread_ts".into(), "1712345678.000100".into());
        OutboxAction {
            id: "a1".into(),
            workspace_id: "ws".into(),
            provider: ProviderKey::Slack,
            idempotency_key: "k".into(),
            action_type: "send_message".into(),
            status: OutboxStatus::Sending,
            target: OutboxTarget {
                channel_id: channel.map(str::to_string),
                thread_id: "C1:1712345678.000100".into(),
                user_id: Some("U1".into()),
                reply_to_message_id: Some("1712345690.000200".into()),
                metadata,
            },
            payload: OutboxPayload { text: "hello".into() },
            receipt_id: None,
            decision_id: None,
            thread_id: None,
            attempt_count: 1,
            next_attempt_at_ms: 0,
            last_error_code: None,
            last_error_message: None,
            provider_message_id: None,
            created_at_ms: 0,
            updated_at_ms: 0,
            sent_at_ms: None,
        }
    }

    fn sender(base: String) -> SlackSender {
        SlackSender::new(&SlackConfig {
            bot_token: Secret::new("xoxb-1".into()),
            api_base_url: base,
            ..SlackConfig::default()
        })
    }

    #[tokio::test]
    async fn posts_into_thread() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/api/chat.postMessage")
            .match_header("authorization", "Bearer xoxb-1")
            .match_body(Matcher::PartialJson(json!({
                "channel": "C1",
                "text": "hello",
                "thread_ts": "1712345678.000100",
            })))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"ok":true,"channel":"C1","ts":"1712345700.000300"}"#)
            .create_async()
            .await;

        let receipt = sender(server.url()).send(&action(Some("C1"))).await.unwrap();
        assert_eq!(receipt.provider_message_id.as_deref(), Some("1712345700.000300"));
        assert_eq!(receipt.response_status, Some(200));
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn api_error_is_permanent_unless_transient() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", "/api/chat.postMessage")
            .with_status(200)
            .with_body(r#"{"ok":false,"error":"channel_not_found"}"#)
            .create_async()
            .await;
        let err = sender(server.url()).send(&action(Some("C1"))).await.unwrap_err();
        assert_eq!(err.code.as_deref(), Some("channel_not_found"));
        assert!(!err.retryable);

        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", "/api/chat.postMessage")
            .with_status(200)
            .with_body(r#"{"ok":false,"error":"ratelimited"}"#)
            .create_async()
            .await;
        let err = sender(server.url()).send(&action(Some("C1"))).await.unwrap_err();
        assert!(err.retryable);
    }

    #[tokio::test]
    async fn http_errors_are_classified() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", "/api/chat.postMessage")
            .with_status(503)
            .with_body("unavailable")
            .create_async()
            .await;
        let err = sender(server.url()).send(&action(Some("C1"))).await.unwrap_err();
        assert_eq!(err.code.as_deref(), Some("HTTP_503"));
        assert!(err.retryable);
        assert_eq!(err.response_body.as_deref(), Some("unavailable"));
    }

    #[tokio::test]
    async fn channel_falls_back_to_metadata_or_fails() {
        let mut action = action(None);
        let err = sender("http://127.0.0.1:9".into())
            .send(&action)
            .await
            .unwrap_err();
        assert_eq!(err.code.as_deref(), Some("INVALID_TARGET"));

        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/api/chat.postMessage")
            .match_body(Matcher::PartialJson(json!({"channel": "C7"})))
            .with_status(200)
            .with_body(r#"{"ok":true,"ts":"1.0"}"#)
            .create_async()
            .await;
        action.target.metadata.insert("channel".into(), "C7".into());
        sender(server.url()).send(&action).await.unwrap();
        mock.assert_async().await;
    }
}
