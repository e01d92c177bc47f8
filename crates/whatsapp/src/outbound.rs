use {
    async_trait::async_trait,
    courier_channels::{OutboundSender, OutboxAction, SendError, SendReceipt},
    courier_config::WhatsAppCloudConfig,
    secrecy::{ExposeSecret, Secret},
    serde_json::json,
    tracing::debug,
};

use crate::types::{GraphErrorResponse, SendMessageResponse};

/// Graph error codes that mean "slow down", not "give up".
const THROTTLING_CODES: &[i64] = &[4, 80007, 130429, 131056];

/// Sends text replies through the Cloud API `messages` endpoint.
pub struct WhatsAppCloudSender {
    http: reqwest::Client,
    access_token: Secret<String>,
    phone_number_id: String,
    api_base_url: String,
    api_version: String,
}

impl WhatsAppCloudSender {
    pub fn new(config: &WhatsAppCloudConfig) -> Self {
        Self::with_client(reqwest::Client::new(), config)
    }

    pub fn with_client(http: reqwest::Client, config: &WhatsAppCloudConfig) -> Self {
        Self {
            http,
            access_token: config.access_token.clone(),
            phone_number_id: config.phone_number_id.clone(),
            api_base_url: config.api_base_url.trim_end_matches('/').to_string(),
            api_version: config.api_version.clone(),
        }
    }

    fn error_from_response(status: u16, body: String) -> SendError {
        let mut err = SendError::from_http_status(status, body.clone());
        if let Ok(parsed) = serde_json::from_str::<GraphErrorResponse>(&body) {
            if let Some(message) = parsed.error.message {
                err.message = format!("whatsapp rejected message: {message}");
            }
            if parsed
                .error
                .code
                .is_some_and(|code| THROTTLING_CODES.contains(&code))
            {
                err.retryable = true;
            }
        }
        err
    }
}

#[async_trait]
impl OutboundSender for WhatsAppCloudSender {
    async fn send(&self, action: &OutboxAction) -> Result<SendReceipt, SendError> {
        let target = &action.target;
        let to = target
            .user_id
            .as_deref()
            .ok_or_else(|| SendError::permanent("INVALID_TARGET", "whatsapp target has no recipient"))?;
        let phone_number_id = target
            .meta_str("phone_number_id")
            .or(target.channel_id.as_deref())
            .filter(|id| !id.is_empty())
            .unwrap_or(self.phone_number_id.as_str());
        if phone_number_id.is_empty() {
            return Err(SendError::permanent(
                "INVALID_TARGET",
                "no whatsapp phone_number_id to send from",
            ));
        }

        let mut body = json!({
            "messaging_product": "whatsapp",
            "recipient_type": "individual",
            "to": to,
            "type": "text",
            "text": { "body": action.payload.text, "preview_url": false },
        });
        if let Some(reply_to) = &target.reply_to_message_id {
            body["context"] = json!({ "message_id": reply_to });
        }

        let url = format!(
            "{}/{}/{}/messages",
            self.api_base_url, self.api_version, phone_number_id
        );
        debug!(action_id = %action.id, phone_number_id, "whatsapp: sending message");
        let resp = self
            .http
            .post(url)
            .bearer_auth(self.access_token.expose_secret())
            .json(&body)
            .send()
            .await
            .map_err(|e| SendError::transient(format!("whatsapp request failed: {e}")))?;

        let status = resp.status().as_u16();
        let text = resp.text().await.unwrap_or_default();
        if !(200..300).contains(&status) {
            return Err(Self::error_from_response(status, text));
        }

        let parsed: SendMessageResponse = serde_json::from_str(&text).map_err(|e| SendError {
            response_status: Some(status),
            response_body: Some(text.clone()),
            ..SendError::transient(format!("unreadable whatsapp response: {e}"))
        })?;

        Ok(SendReceipt {
            provider_message_id: parsed.messages.into_iter().next().map(|m| m.id),
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

    fn action() -> OutboxAction {
        OutboxAction {
            id: "a1".into(),
            workspace_id: "ws".into(),
            provider: ProviderKey::WhatsappCloud,
            idempotency_key: "k".into(),
            action_type: "send_message".into(),
            status: OutboxStatus::Sending,
            target: OutboxTarget {
                channel_id: Some("PN1".into()),
                thread_id: "PN1:15550123".into(),
                user_id: Some("15550123".into()),
                reply_to_message_id: Some("wamid.IN".into()),
                metadata: serde_json::Map::new(),
            },
            payload: OutboxPayload {
                text: "Thanks!".into(),
            },
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

    fn sender(base: String) -> WhatsAppCloudSender {
        WhatsAppCloudSender::new(&WhatsAppCloudConfig {
            access_token: Secret::new("EAAG".into()),
            api_base_url: base,
            ..WhatsAppCloudConfig::default()
        })
    }

    #[tokio::test]
    async fn sends_text_reply_with_context() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/v21.0/PN1/messages")
            .match_header("authorization", "Bearer EAAG")
            .match_body(Matcher::PartialJson(json!({
                "to": "15550123",
                "text": {"body": "Thanks!"},
                "context": {"message_id": "wamid.IN"},
            })))
            .with_status(200)
            .with_body(r#"{"messaging_product":"whatsapp","contacts":[{"wa_id":"15550123"}],"messages":[{"id":"wamid.OUT"}]}"#)
            .create_async()
            .await;

        let receipt = sender(server.url()).send(&action()).await.unwrap();
        assert_eq!(receipt.provider_message_id.as_deref(), Some("wamid.OUT"));
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn throttling_is_retryable_other_errors_are_not() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", "/v21.0/PN1/messages")
            .with_status(400)
            .with_body(r#"{"error":{"message":"(#130429) Rate limit hit","code":130429}}"#)
            .create_async()
            .await;
        let err = sender(server.url()).send(&action()).await.unwrap_err();
        assert!(err.retryable);
        assert_eq!(err.code.as_deref(), Some("HTTP_400"));

        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", "/v21.0/PN1/messages")
            .with_status(400)
            .with_body(r#"{"error":{"message":"Recipient not in allowed list","code":131030}}"#)
            .create_async()
            .await;
        let err = sender(server.url()).send(&action()).await.unwrap_err();
        assert!(!err.retryable);
        assert!(err.message.contains("Recipient not in allowed list"));
    }

    #[tokio::test]
    async fn missing_recipient_is_permanent() {
        let mut action = action();
        action.target.user_id = None;
        let err = sender("http://127.0.0.1:9".into())
            .send(&action)
            .await
            .unwrap_err();
        assert_eq!(err.code.as_deref(), Some("INVALID_TARGET"));
    }
}
