use {
    courier_channels::{
        NormalizedWebhook, ProviderKey, Result, SignatureCheck, WebhookAdapter, WebhookRequest,
    },
    courier_config::SlackConfig,
    secrecy::{ExposeSecret, Secret},
};

use crate::{normalize, verify};

/// Inbound Slack webhooks.
pub struct SlackAdapter {
    signing_secret: Secret<String>,
    timestamp_tolerance_secs: i64,
}

impl SlackAdapter {
    pub fn new(config: &SlackConfig) -> Self {
        Self {
            signing_secret: config.signing_secret.clone(),
            timestamp_tolerance_secs: config.timestamp_tolerance_secs,
        }
    }
}

impl WebhookAdapter for SlackAdapter {
    fn provider(&self) -> ProviderKey {
        ProviderKey::Slack
    }

    fn verify(&self, request: &WebhookRequest<'_>, now_secs: i64) -> SignatureCheck {
        verify::verify_signature(
            request.headers,
            request.body,
            self.signing_secret.expose_secret(),
            self.timestamp_tolerance_secs,
            now_secs,
        )
    }

    fn normalize(&self, request: &WebhookRequest<'_>) -> Result<NormalizedWebhook> {
        let (envelope, raw) = normalize::parse(request.body)?;
        Ok(normalize::normalize(
            request.workspace_id,
            envelope,
            raw,
            request.received_at_ms,
        ))
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use {
        super::*,
        http::{HeaderMap, HeaderValue},
    };

    #[test]
    fn verifies_then_normalizes() {
        let config = SlackConfig {
            signing_secret: Secret::new("shh".into()),
            ..SlackConfig::default()
        };
        let adapter = SlackAdapter::new(&config);
        let body = br#"{"type":"url_verification","challenge":"c-1"}"#;
        let now = 1_700_000_000;
        let sig = verify::sign("shh", &now.to_string(), body).unwrap();

        let mut headers = HeaderMap::new();
        headers.insert(verify::TIMESTAMP_HEADER, HeaderValue::from_str(&now.to_string()).unwrap());
        headers.insert(verify::SIGNATURE_HEADER, HeaderValue::from_str(&sig).unwrap());
        let request = WebhookRequest {
            workspace_id: "ws",
            body,
            headers: &headers,
            url: None,
            received_at_ms: now * 1000,
        };

        assert!(adapter.verify(&request, now).is_valid());
        assert!(!adapter.verify(&request, now + 3600).is_valid());
        assert_eq!(
            adapter.normalize(&request).unwrap(),
            NormalizedWebhook::Challenge("c-1".into())
        );
    }
}
