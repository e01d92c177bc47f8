use {
    courier_channels::{
        NormalizedWebhook, ProviderKey, Result, SignatureCheck, WebhookAdapter, WebhookRequest,
    },
    courier_config::TwilioConfig,
    secrecy::{ExposeSecret, Secret},
};

use crate::{form, verify};

/// Inbound Twilio WhatsApp webhooks.
pub struct TwilioAdapter {
    auth_token: Secret<String>,
    account_sid: Option<String>,
}

impl TwilioAdapter {
    pub fn new(config: &TwilioConfig) -> Self {
        Self {
            auth_token: config.auth_token.clone(),
            account_sid: (!config.account_sid.is_empty()).then(|| config.account_sid.clone()),
        }
    }
}

impl WebhookAdapter for TwilioAdapter {
    fn provider(&self) -> ProviderKey {
        ProviderKey::WhatsappTwilio
    }

    fn verify(&self, request: &WebhookRequest<'_>, _now_secs: i64) -> SignatureCheck {
        verify::verify_signature(
            request.headers,
            request.url,
            request.body,
            self.auth_token.expose_secret(),
        )
    }

    fn normalize(&self, request: &WebhookRequest<'_>) -> Result<NormalizedWebhook> {
        let pairs = form::parse_pairs(request.body);
        let event = form::normalize(
            request.workspace_id,
            &pairs,
            self.account_sid.as_deref(),
            request.received_at_ms,
        );
        Ok(NormalizedWebhook::Events(event.into_iter().collect()))
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
    fn verify_uses_request_url() {
        let adapter = TwilioAdapter::new(&TwilioConfig {
            auth_token: Secret::new("tok".into()),
            account_sid: "AC1".into(),
            ..TwilioConfig::default()
        });
        let url = "https://hooks.example.com/twilio";
        let body = b"MessageSid=SM1&AccountSid=AC1&From=whatsapp%3A%2B1&To=whatsapp%3A%2B2&Body=hi";
        let sig = verify::sign("tok", url, &form::parse_pairs(body)).unwrap();
        let mut headers = HeaderMap::new();
        headers.insert(verify::SIGNATURE_HEADER, HeaderValue::from_str(&sig).unwrap());

        let request = WebhookRequest {
            workspace_id: "ws",
            body,
            headers: &headers,
            url: Some(url),
            received_at_ms: 1,
        };
        assert!(adapter.verify(&request, 0).is_valid());
        let without_url = WebhookRequest { url: None, ..request };
        assert!(!adapter.verify(&without_url, 0).is_valid());

        let events = adapter.normalize(&request).unwrap().events();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].thread.external_user_id.as_deref(), Some("whatsapp:+1"));
    }
}
