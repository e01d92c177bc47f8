use {
    courier_channels::{
        NormalizedWebhook, ProviderKey, Result, SignatureCheck, WebhookAdapter, WebhookRequest,
        signature::verify_hub_signature,
    },
    courier_config::WhatsAppCloudConfig,
    secrecy::{ExposeSecret, Secret},
};

use crate::webhook;

/// Inbound Cloud API pushes.
pub struct WhatsAppCloudAdapter {
    app_secret: Secret<String>,
    /// Only pushes for this number are accepted when set.
    phone_number_id: Option<String>,
}

impl WhatsAppCloudAdapter {
    pub fn new(config: &WhatsAppCloudConfig) -> Self {
        Self {
            app_secret: config.app_secret.clone(),
            phone_number_id: (!config.phone_number_id.is_empty())
                .then(|| config.phone_number_id.clone()),
        }
    }
}

impl WebhookAdapter for WhatsAppCloudAdapter {
    fn provider(&self) -> ProviderKey {
        ProviderKey::WhatsappCloud
    }

    fn verify(&self, request: &WebhookRequest<'_>, _now_secs: i64) -> SignatureCheck {
        verify_hub_signature(request.headers, request.body, self.app_secret.expose_secret())
    }

    fn normalize(&self, request: &WebhookRequest<'_>) -> Result<NormalizedWebhook> {
        let (payload, raw) = webhook::parse(request.body)?;
        Ok(NormalizedWebhook::Events(webhook::normalize(
            request.workspace_id,
            &payload,
            &raw,
            self.phone_number_id.as_deref(),
            request.received_at_ms,
        )))
    }
}
