use {
    courier_channels::{
        NormalizedWebhook, ProviderKey, Result, SignatureCheck, WebhookAdapter, WebhookRequest,
        signature::{header_str, verify_hub_signature},
    },
    courier_config::GithubConfig,
    secrecy::{ExposeSecret, Secret},
};

use crate::normalize::{self, DELIVERY_HEADER, DeliveryInfo, EVENT_HEADER};

/// Inbound GitHub webhooks.
pub struct GithubAdapter {
    webhook_secret: Secret<String>,
    bot_login: Option<String>,
}

impl GithubAdapter {
    pub fn new(config: &GithubConfig) -> Self {
        Self {
            webhook_secret: config.webhook_secret.clone(),
            bot_login: config.bot_login.clone(),
        }
    }
}

impl WebhookAdapter for GithubAdapter {
    fn provider(&self) -> ProviderKey {
        ProviderKey::Github
    }

    fn verify(&self, request: &WebhookRequest<'_>, _now_secs: i64) -> SignatureCheck {
        verify_hub_signature(
            request.headers,
            request.body,
            self.webhook_secret.expose_secret(),
        )
    }

    fn normalize(&self, request: &WebhookRequest<'_>) -> Result<NormalizedWebhook> {
        let (payload, raw) = normalize::parse(request.body)?;
        let delivery = DeliveryInfo {
            delivery_id: header_str(request.headers, DELIVERY_HEADER),
            event: header_str(request.headers, EVENT_HEADER),
        };
        let event = normalize::normalize(
            request.workspace_id,
            &payload,
            raw,
            delivery,
            self.bot_login.as_deref(),
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
        courier_channels::signature::{HUB_SIGNATURE_HEADER, hmac_sha256_hex},
        http::{HeaderMap, HeaderValue},
    };

    #[test]
    fn signed_delivery_round_trip() {
        let adapter = GithubAdapter::new(&GithubConfig {
            webhook_secret: Secret::new("It's a Secret to Everybody".into()),
            ..GithubConfig::default()
        });
        let body = br#"{"action":"opened","repository":{"name":"r","owner":{"login":"o"}},"issue":{"number":1,"body":"hi"}}"#;
        let sig = hmac_sha256_hex(b"It's a Secret to Everybody", &[body]).unwrap();

        let mut headers = HeaderMap::new();
        headers.insert(HUB_SIGNATURE_HEADER, HeaderValue::from_str(&format!("sha256={sig}")).unwrap());
        headers.insert(DELIVERY_HEADER, HeaderValue::from_static("d-1"));
        headers.insert(EVENT_HEADER, HeaderValue::from_static("issues"));
        let request = WebhookRequest {
            workspace_id: "ws",
            body,
            headers: &headers,
            url: None,
            received_at_ms: 0,
        };
        assert!(adapter.verify(&request, 0).is_valid());

        let mut tampered = body.to_vec();
        tampered[12] = b'c';
        let bad = WebhookRequest {
            body: &tampered,
            ..request
        };
        assert!(!adapter.verify(&bad, 0).is_valid());

        let events = adapter.normalize(&request).unwrap().events();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].external_event_id, "d-1");
        assert_eq!(events[0].event_type, "issues");
        assert_eq!(events[0].thread.external_thread_id, "o/r#1");
    }
}
