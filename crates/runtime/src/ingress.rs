//! Webhook boundary: verify, normalize, then ingest.
//!
//! Requests that fail verification or parsing are rejected here and never
//! reach the pipeline. A request with a bad signature is not parsed and leaves
//! nothing in the store: it is reported through telemetry with a digest of the
//! body, so forged traffic cannot grow the receipt table.

use std::{collections::HashMap, sync::Arc};

use {
    courier_channels::{
        NormalizedWebhook, ProviderKey, SignatureFailure, TelemetryEvent, TelemetryStage,
        WebhookAdapter, WebhookRequest,
    },
    courier_common::time::now_secs,
    courier_config::ProvidersConfig,
    serde::Serialize,
    sha2::{Digest, Sha256},
    tracing::{debug, warn},
};

use crate::{
    providers,
    service::{IngestResult, RuntimeService},
};

/// Why a webhook was refused.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum WebhookRejection {
    #[error("provider {0} is not configured")]
    UnknownProvider(ProviderKey),
    #[error("signature rejected: {0}")]
    Signature(SignatureFailure),
    #[error("malformed payload: {0}")]
    Malformed(String),
    #[error("ingest failed: {0}")]
    Internal(String),
}

impl WebhookRejection {
    /// Stable reason code for callers and telemetry.
    pub fn code(&self) -> &'static str {
        match self {
            Self::UnknownProvider(_) => "unknown_provider",
            Self::Signature(reason) => reason.code(),
            Self::Malformed(_) => "malformed_payload",
            Self::Internal(_) => "internal_error",
        }
    }

    /// HTTP status a transport should answer with.
    pub fn http_status(&self) -> u16 {
        match self {
            Self::UnknownProvider(_) => 404,
            Self::Signature(_) => 401,
            Self::Malformed(_) => 400,
            Self::Internal(_) => 500,
        }
    }
}

/// Result of an accepted webhook.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct WebhookOutcome {
    /// Handshake value to echo back, for endpoint verification requests.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub challenge: Option<String>,
    /// One entry per normalized event, in payload order.
    pub results: Vec<IngestResult>,
}

/// Routes raw webhooks to their provider adapter and into the runtime.
pub struct WebhookIngress {
    adapters: HashMap<ProviderKey, Arc<dyn WebhookAdapter>>,
    service: Arc<RuntimeService>,
}

impl WebhookIngress {
    pub fn new(service: Arc<RuntimeService>) -> Self {
        Self {
            adapters: HashMap::new(),
            service,
        }
    }

    /// Ingress with an adapter for every provider present in `config`.
    pub fn from_config(service: Arc<RuntimeService>, config: &ProvidersConfig) -> Self {
        providers::adapters(config)
            .into_iter()
            .fold(Self::new(service), Self::with_adapter)
    }

    #[must_use]
    pub fn with_adapter(mut self, adapter: Arc<dyn WebhookAdapter>) -> Self {
        self.adapters.insert(adapter.provider(), adapter);
        self
    }

    pub fn providers(&self) -> Vec<ProviderKey> {
        let mut keys: Vec<_> = self.adapters.keys().copied().collect();
        keys.sort();
        keys
    }

    pub fn service(&self) -> &Arc<RuntimeService> {
        &self.service
    }

    pub async fn handle(
        &self,
        provider: ProviderKey,
        request: &WebhookRequest<'_>,
    ) -> Result<WebhookOutcome, WebhookRejection> {
        let Some(adapter) = self.adapters.get(&provider) else {
            return Err(self.reject(provider, request, WebhookRejection::UnknownProvider(provider)));
        };

        if let Some(reason) = adapter.verify(request, now_secs()).failure() {
            warn!(
                provider = %provider,
                workspace_id = request.workspace_id,
                reason = reason.code(),
                "webhook signature rejected"
            );
            return Err(self.reject(provider, request, WebhookRejection::Signature(reason)));
        }

        let normalized = match adapter.normalize(request) {
            Ok(normalized) => normalized,
            Err(e) => {
                warn!(provider = %provider, error = %e, "malformed webhook payload");
                return Err(self.reject(
                    provider,
                    request,
                    WebhookRejection::Malformed(e.to_string()),
                ));
            },
        };

        let events = match normalized {
            NormalizedWebhook::Challenge(challenge) => {
                debug!(provider = %provider, "answering endpoint handshake");
                return Ok(WebhookOutcome {
                    challenge: Some(challenge),
                    results: Vec::new(),
                });
            },
            NormalizedWebhook::Events(events) => events,
        };

        let mut results = Vec::with_capacity(events.len());
        for mut event in events {
            event.signature_valid = true;
            let result = self
                .service
                .ingest(event)
                .await
                .map_err(|e| WebhookRejection::Internal(e.to_string()))?;
            results.push(result);
        }
        if results.is_empty() {
            debug!(provider = %provider, "webhook carried no actionable events");
        }
        Ok(WebhookOutcome {
            challenge: None,
            results,
        })
    }

    fn reject(
        &self,
        provider: ProviderKey,
        request: &WebhookRequest<'_>,
        rejection: WebhookRejection,
    ) -> WebhookRejection {
        self.service.telemetry().record(
            TelemetryEvent::new(TelemetryStage::IngestRejected, rejection.code())
                .workspace(request.workspace_id)
                .provider(provider)
                .meta("body_sha256", hex::encode(Sha256::digest(request.body)))
                .meta("body_bytes", request.body.len()),
        );
        rejection
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use {
        super::*,
        crate::{
            store::RuntimeStore, store_memory::InMemoryStore, telemetry::MemoryTelemetry,
        },
        courier_channels::ReceiptStatus,
        courier_config::{GithubConfig, SlackConfig},
        courier_policy::PolicyEngine,
        http::{HeaderMap, HeaderValue},
        secrecy::Secret,
    };

    const SECRET: &str = "8f742231b10e8888abcd99yyyzzz85a5";

    fn ingress() -> (WebhookIngress, Arc<InMemoryStore>, MemoryTelemetry) {
        let store = Arc::new(InMemoryStore::new());
        let telemetry = MemoryTelemetry::new();
        let service = Arc::new(RuntimeService::new(
            store.clone(),
            PolicyEngine::default(),
            Arc::new(telemetry.clone()),
        ));
        let config = ProvidersConfig {
            slack: Some(SlackConfig {
                signing_secret: Secret::new(SECRET.into()),
                ..SlackConfig::default()
            }),
            ..ProvidersConfig::default()
        };
        (WebhookIngress::from_config(service, &config), store, telemetry)
    }

    fn slack_headers(body: &[u8], secret: &str) -> HeaderMap {
        let now = now_secs().to_string();
        let sig = courier_slack::verify::sign(secret, &now, body).unwrap();
        let mut headers = HeaderMap::new();
        headers.insert(
            courier_slack::verify::TIMESTAMP_HEADER,
            HeaderValue::from_str(&now).unwrap(),
        );
        headers.insert(
            courier_slack::verify::SIGNATURE_HEADER,
            HeaderValue::from_str(&sig).unwrap(),
        );
        headers
    }

    fn request<'a>(body: &'a [u8], headers: &'a HeaderMap) -> WebhookRequest<'a> {
        WebhookRequest {
            workspace_id: "ws",
            body,
            headers,
            url: None,
            received_at_ms: 0,
        }
    }

    const MESSAGE: &[u8] = br#"{"type":"event_callback","team_id":"T1","event_id":"Ev1","event_time":1712345678,"event":{"type":"message","user":"U1","text":"Can you share the latest docs link for setup?","ts":"1712345678.000100","channel":"C1"}}"#;

    #[tokio::test]
    async fn signed_message_is_ingested() {
        let (ingress, store, _) = ingress();
        let headers = slack_headers(MESSAGE, SECRET);
        let outcome = ingress
            .handle(ProviderKey::Slack, &request(MESSAGE, &headers))
            .await
            .unwrap();
        assert_eq!(outcome.challenge, None);
        assert_eq!(outcome.results.len(), 1);
        let receipt = store
            .get_receipt(&outcome.results[0].receipt_id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(receipt.external_event_id, "Ev1");
        assert_eq!(receipt.status, ReceiptStatus::Processed);
    }

    #[tokio::test]
    async fn bad_signature_is_rejected_without_touching_the_store() {
        let (ingress, store, telemetry) = ingress();
        let headers = slack_headers(MESSAGE, "wrong-secret");
        let err = ingress
            .handle(ProviderKey::Slack, &request(MESSAGE, &headers))
            .await
            .unwrap_err();
        assert_eq!(err, WebhookRejection::Signature(SignatureFailure::Mismatch));
        assert_eq!(err.code(), "signature_mismatch");
        assert_eq!(err.http_status(), 401);

        assert!(store.receipt_counts().await.unwrap().is_empty());
        assert!(store.outbox_counts().await.unwrap().is_empty());
        let events = telemetry.events();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].stage, TelemetryStage::IngestRejected);
        assert_eq!(events[0].status, "signature_mismatch");
        assert_eq!(
            events[0].metadata["body_sha256"],
            hex::encode(Sha256::digest(MESSAGE))
        );
        assert_eq!(events[0].metadata["body_bytes"], MESSAGE.len());
    }

    #[tokio::test]
    async fn forged_flood_leaves_no_receipts() {
        let (ingress, store, telemetry) = ingress();
        for n in 0..200 {
            let body = format!(
                r#"{{"type":"event_callback","team_id":"T1","event_id":"Ev{n}","event":{{"type":"message","user":"U1","text":"hi","ts":"1.{n}","channel":"C1"}}}}"#
            );
            let mut headers = HeaderMap::new();
            headers.insert(
                courier_slack::verify::TIMESTAMP_HEADER,
                HeaderValue::from_str(&now_secs().to_string()).unwrap(),
            );
            headers.insert(
                courier_slack::verify::SIGNATURE_HEADER,
                HeaderValue::from_static("v0=00"),
            );
            let err = ingress
                .handle(ProviderKey::Slack, &request(body.as_bytes(), &headers))
                .await
                .unwrap_err();
            assert_eq!(err.http_status(), 401);
        }
        assert!(store.receipt_counts().await.unwrap().is_empty());
        assert_eq!(telemetry.events().len(), 200);
    }

    #[tokio::test]
    async fn out_of_range_timestamp_is_stale() {
        let (ingress, store, _) = ingress();
        let mut headers = HeaderMap::new();
        headers.insert(
            courier_slack::verify::TIMESTAMP_HEADER,
            HeaderValue::from_static("-9223372036854775808"),
        );
        headers.insert(
            courier_slack::verify::SIGNATURE_HEADER,
            HeaderValue::from_static("v0=00"),
        );
        let err = ingress
            .handle(ProviderKey::Slack, &request(MESSAGE, &headers))
            .await
            .unwrap_err();
        assert_eq!(err, WebhookRejection::Signature(SignatureFailure::StaleTimestamp));
        assert!(store.receipt_counts().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn url_verification_returns_challenge() {
        let (ingress, store, _) = ingress();
        let body = br#"{"type":"url_verification","token":"t","challenge":"3eZbrw1aBm2rZgRNFdxV2595E9CY3gmdALWMmHkvFXO7tYXAYM8P"}"#;
        let headers = slack_headers(body, SECRET);
        let outcome = ingress
            .handle(ProviderKey::Slack, &request(body, &headers))
            .await
            .unwrap();
        assert_eq!(
            outcome.challenge.as_deref(),
            Some("3eZbrw1aBm2rZgRNFdxV2595E9CY3gmdALWMmHkvFXO7tYXAYM8P")
        );
        assert!(store.receipt_counts().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn malformed_payload_never_reaches_the_pipeline() {
        let (ingress, store, telemetry) = ingress();
        let body = b"{not json";
        let headers = slack_headers(body, SECRET);
        let err = ingress
            .handle(ProviderKey::Slack, &request(body, &headers))
            .await
            .unwrap_err();
        assert!(matches!(err, WebhookRejection::Malformed(_)));
        assert!(store.receipt_counts().await.unwrap().is_empty());
        let rejected = telemetry.events();
        assert_eq!(rejected.len(), 1);
        assert_eq!(rejected[0].status, "malformed_payload");
    }

    #[tokio::test]
    async fn unconfigured_provider_is_refused() {
        let (ingress, _, _) = ingress();
        assert_eq!(ingress.providers(), vec![ProviderKey::Slack]);
        let headers = HeaderMap::new();
        let err = ingress
            .handle(ProviderKey::Github, &request(b"{}", &headers))
            .await
            .unwrap_err();
        assert_eq!(err, WebhookRejection::UnknownProvider(ProviderKey::Github));
        assert_eq!(err.http_status(), 404);
    }

    #[tokio::test]
    async fn redelivery_is_a_duplicate() {
        let (ingress, _, _) = ingress();
        let ingress = ingress.with_adapter(Arc::new(courier_github::GithubAdapter::new(
            &GithubConfig::default(),
        )));
        let headers = slack_headers(MESSAGE, SECRET);
        let first = ingress
            .handle(ProviderKey::Slack, &request(MESSAGE, &headers))
            .await
            .unwrap();
        let second = ingress
            .handle(ProviderKey::Slack, &request(MESSAGE, &headers))
            .await
            .unwrap();
        assert_eq!(first.results[0].receipt_id, second.results[0].receipt_id);
        assert_eq!(
            second.results[0].status,
            crate::service::IngestStatus::Duplicate
        );
        assert_eq!(ingress.providers(), vec![ProviderKey::Slack, ProviderKey::Github]);
    }
}
