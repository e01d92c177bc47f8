//! Adapters and senders for the providers enabled in configuration.

use std::{sync::Arc, time::Duration};

use {
    courier_channels::{ProviderKey, SenderRegistry, WebhookAdapter},
    courier_config::{DispatchConfig, ProvidersConfig},
    courier_github::{GithubAdapter, GithubSender},
    courier_slack::{SlackAdapter, SlackSender},
    courier_twilio::{TwilioAdapter, TwilioSender},
    courier_whatsapp::{WhatsAppCloudAdapter, WhatsAppCloudSender},
    tracing::warn,
};

/// One inbound adapter per configured provider.
pub fn adapters(config: &ProvidersConfig) -> Vec<Arc<dyn WebhookAdapter>> {
    let mut adapters: Vec<Arc<dyn WebhookAdapter>> = Vec::new();
    if let Some(slack) = &config.slack {
        adapters.push(Arc::new(SlackAdapter::new(slack)));
    }
    if let Some(github) = &config.github {
        adapters.push(Arc::new(GithubAdapter::new(github)));
    }
    if let Some(cloud) = &config.whatsapp_cloud {
        adapters.push(Arc::new(WhatsAppCloudAdapter::new(cloud)));
    }
    if let Some(twilio) = &config.whatsapp_twilio {
        adapters.push(Arc::new(TwilioAdapter::new(twilio)));
    }
    adapters
}

/// One sender per configured provider, sharing a single HTTP client whose
/// timeout is `dispatch.send_timeout_secs`.
pub fn senders(config: &ProvidersConfig, dispatch: &DispatchConfig) -> SenderRegistry {
    let http = reqwest::Client::builder()
        .timeout(Duration::from_secs(dispatch.send_timeout_secs))
        .build()
        .unwrap_or_else(|e| {
            warn!(error = %e, "failed to build HTTP client, using defaults");
            reqwest::Client::new()
        });
    let mut registry = SenderRegistry::new();
    if let Some(slack) = &config.slack {
        registry.register(
            ProviderKey::Slack,
            Arc::new(SlackSender::with_client(http.clone(), slack)),
        );
    }
    if let Some(github) = &config.github {
        registry.register(
            ProviderKey::Github,
            Arc::new(GithubSender::with_client(http.clone(), github)),
        );
    }
    if let Some(cloud) = &config.whatsapp_cloud {
        registry.register(
            ProviderKey::WhatsappCloud,
            Arc::new(WhatsAppCloudSender::with_client(http.clone(), cloud)),
        );
    }
    if let Some(twilio) = &config.whatsapp_twilio {
        registry.register(
            ProviderKey::WhatsappTwilio,
            Arc::new(TwilioSender::with_client(http, twilio)),
        );
    }
    registry
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use {
        super::*,
        courier_config::{GithubConfig, SlackConfig, TwilioConfig},
    };

    #[test]
    fn only_configured_providers_are_wired() {
        let config = ProvidersConfig {
            slack: Some(SlackConfig::default()),
            github: Some(GithubConfig::default()),
            whatsapp_cloud: None,
            whatsapp_twilio: Some(TwilioConfig::default()),
        };
        let providers: Vec<_> = adapters(&config).iter().map(|a| a.provider()).collect();
        assert_eq!(providers, vec![
            ProviderKey::Slack,
            ProviderKey::Github,
            ProviderKey::WhatsappTwilio
        ]);
        let dispatch = DispatchConfig::default();
        assert_eq!(senders(&config, &dispatch).providers(), vec![
            ProviderKey::Slack,
            ProviderKey::Github,
            ProviderKey::WhatsappTwilio
        ]);
        assert!(senders(&ProvidersConfig::default(), &dispatch).is_empty());
    }
}
