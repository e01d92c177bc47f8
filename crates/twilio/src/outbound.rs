use {
    async_trait::async_trait,
    courier_channels::{OutboundSender, OutboxAction, SendError, SendReceipt},
    courier_config::TwilioConfig,
    secrecy::{ExposeSecret, Secret},
    serde::Deserialize,
    tracing::debug,
};

/// Sends replies through the Twilio Messages API.
pub struct TwilioSender {
    http: reqwest::Client,
    account_sid: String,
    auth_token: Secret<String>,
    api_base_url: String,
}

#[derive(Debug, Deserialize)]
struct MessageResource {
    sid: String,
}

#[derive(Debug, Deserialize)]
struct TwilioErrorBody {
    code: Option<i64>,
    message: Option<String>,
}

impl TwilioSender {
    pub fn new(config: &TwilioConfig) -> Self {
        Self::with_client(reqwest::Client::new(), config)
    }

    pub fn with_client(http: reqwest::Client, config: &TwilioConfig) -> Self {
        Self {
            http,
            account_sid: config.account_sid.clone(),
            auth_token: config.auth_token.clone(),
            api_base_url: config.api_base_url.trim_end_matches('/').to_string(),
        }
    }
}

#[async_trait]
impl OutboundSender for TwilioSender {
    async fn send(&self, action: &OutboxAction) -> Result<SendReceipt, SendError> {
        let target = &action.target;
        // Reply from the number that received the message, to its sender.
        let (Some(from), Some(to)) = (
            target.channel_id.as_deref().or_else(|| target.meta_str("to")),
            target.user_id.as_deref().or_else(|| target.meta_str("from")),
        ) else {
            return Err(SendError::permanent(
                "INVALID_TARGET",
                "twilio target needs both sender and recipient numbers",
            ));
        };
        if self.account_sid.is_empty() {
            return Err(SendError::permanent(
                "SENDER_MISCONFIGURED",
                "twilio account_sid is not configured",
            ));
        }

        let url = format!(
            "{}/2010-04-01/Accounts/{}/Messages.json",
            self.api_base_url, self.account_sid
        );
        debug!(action_id = %action.id, to, "twilio: creating message");
        let resp = self
            .http
            .post(url)
            .basic_auth(&self.account_sid, Some(self.auth_token.expose_secret()))
            .form(&[
                ("To", to),
                ("From", from),
                ("Body", action.payload.text.as_str()),
            ])
            .send()
            .await
            .map_err(|e| SendError::transient(format!("twilio request failed: {e}")))?;

        let status = resp.status().as_u16();
        let text = resp.text().await.unwrap_or_default();
        if !(200..300).contains(&status) {
            let mut err = SendError::from_http_status(status, text.clone());
            if let Ok(body) = serde_json::from_str::<TwilioErrorBody>(&text)
                && let Some(message) = body.message
            {
                err.message = match body.code {
                    Some(code) => format!("twilio rejected message ({code}): {message}"),
                    None => format!("twilio rejected message: {message}"),
                };
            }
            return Err(err);
        }

        let resource: MessageResource = serde_json::from_str(&text).map_err(|e| SendError {
            response_status: Some(status),
            response_body: Some(text.clone()),
            ..SendError::transient(format!("unreadable twilio response: {e}"))
        })?;

        Ok(SendReceipt {
            provider_message_id: Some(resource.sid),
            response_status: Some(status),
            response_body: Some(text),
        })
    }
}
